use log::{error, info, warn};
use std::fs;
use std::path::Path;

use crate::config::{AppConfig, StorageBackend, CONFIG_FILE};

#[derive(Debug, Default, PartialEq)]
pub struct BootReport {
    pub warnings: u32,
    pub errors: u32,
}

/// Run all boot checks. Call this before Rocket launches.
/// Creates the data directory if missing and verifies it is writable.
/// Problems are logged but never abort: a read-only data directory only
/// means writes report failure and generated links land in the fallback store.
pub fn run(config: &AppConfig) -> BootReport {
    info!("Confirmly boot check starting...");

    let mut report = BootReport::default();

    // ── 1. Data directory ──────────────────────────────
    if config.storage.backend == StorageBackend::File {
        let dir = &config.storage.data_dir;
        if !dir.exists() {
            match fs::create_dir_all(dir) {
                Ok(_) => info!("  Created data directory: {}", dir.display()),
                Err(e) => {
                    error!("  FAILED to create data directory {}: {}", dir.display(), e);
                    report.errors += 1;
                }
            }
        }

        // ── 2. Data directory writable ─────────────────
        if dir.is_dir() {
            let test_file = dir.join(".write_test");
            match fs::write(&test_file, "test") {
                Ok(_) => {
                    let _ = fs::remove_file(&test_file);
                }
                Err(e) => {
                    error!("  Data directory not writable: {}", e);
                    report.errors += 1;
                }
            }
        }
    } else {
        warn!("  Memory storage selected — records are lost on restart");
        report.warnings += 1;
    }

    // ── 3. Base URL parses ─────────────────────────────
    if url::Url::parse(&config.links.base_url).is_err() {
        warn!(
            "  links.base_url '{}' is not a valid URL (generate-link needs an explicit baseUrl)",
            config.links.base_url
        );
        report.warnings += 1;
    }

    // ── 4. Config files exist ──────────────────────────
    if !Path::new(CONFIG_FILE).exists() {
        warn!("  {} not found — using default config", CONFIG_FILE);
        report.warnings += 1;
    }
    if !Path::new("Rocket.toml").exists() {
        warn!("  Rocket.toml not found — using default server config");
        report.warnings += 1;
    }

    // ── Summary ─────────────────────────────────────────
    if report.errors > 0 {
        error!(
            "Boot check found {} error(s), {} warning(s). Storage writes will fail.",
            report.errors, report.warnings
        );
    } else if report.warnings > 0 {
        warn!(
            "Boot check passed with {} warning(s). Some features may not work correctly.",
            report.warnings
        );
    } else {
        info!("Boot check passed. All systems go.");
    }

    report
}
