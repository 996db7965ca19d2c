//! Pipeline entry points for ETL operations.
//!
//! - `run_pipeline`: Extract, clean and load every configured forum
//! - `ensure_schema`: Create the dataset and tables if absent
//! - `run_validate`: Check configuration without touching any service

pub mod clean;
pub mod extract;
pub mod load;
pub mod run;
pub mod validate;

#[cfg(test)]
pub(crate) mod fixtures;

pub use clean::{clean_comments, clean_posts, normalize_text};
pub use extract::{RecencyWindow, extract_comments, extract_posts, is_recent};
pub use load::{ensure_schema, load_rows};
pub use run::{ForumOutcome, RunSummary, Stage, run_pipeline};
pub use validate::run_validate;
