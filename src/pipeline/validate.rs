// src/pipeline/validate.rs

use crate::error::Result;
use crate::models::Config;
use crate::storage::ALL_TABLES;

/// Validate the effective configuration and log what a run would use.
pub fn run_validate(config: &Config) -> Result<()> {
    log::info!("Validating configuration...");

    if let Err(e) = config.validate() {
        log::error!("Config validation failed: {}", e);
        return Err(e);
    }

    log::info!("✓ Config OK");
    log::info!("  Forums: {}", config.forums.join(", "));
    log::info!(
        "  Window: {}h ({})",
        config.extraction.window_hours,
        if config.extraction.stop_at_first_old {
            "stop at first old post"
        } else {
            "scan all pages"
        }
    );
    log::info!("  Max pages per forum: {}", config.extraction.max_pages);
    log::info!("  User agent: {}", config.source.user_agent);
    log::info!(
        "  Source credentials: {}",
        if config.source.client_id.trim().is_empty() || config.source.client_secret.is_empty() {
            if config.secrets.is_enabled() {
                "from Secret Manager"
            } else {
                "missing"
            }
        } else {
            "configured"
        }
    );
    log::info!(
        "  Destination: {}:{} ({})",
        if config.warehouse.project_id.is_empty() {
            "<unset>"
        } else {
            config.warehouse.project_id.as_str()
        },
        config.warehouse.dataset_id,
        config.warehouse.location
    );
    for table in ALL_TABLES {
        log::info!("  Table {}: {} columns", table.name, table.fields.len());
    }

    Ok(())
}
