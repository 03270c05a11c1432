//! CLI subcommands.

pub mod batch;
pub mod cache;
pub mod config;
pub mod process;

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use docrecon_core::models::config::ReconConfig;
use docrecon_core::ContactCache;

/// Load configuration from an explicit path or fall back to defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<ReconConfig> {
    match config_path {
        Some(path) => Ok(ReconConfig::from_file(std::path::Path::new(path))?),
        None => Ok(ReconConfig::default()),
    }
}

/// Default cache file location under the user's data directory.
pub fn default_cache_file() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docrecon")
        .join("contact_cache.json")
}

/// Open the shared contact cache for this invocation.
pub fn open_cache(config: &ReconConfig, override_path: Option<&PathBuf>) -> Arc<RwLock<ContactCache>> {
    let path = override_path
        .cloned()
        .unwrap_or_else(|| {
            if config.cache.cache_file == ReconConfig::default().cache.cache_file {
                default_cache_file()
            } else {
                config.cache.cache_file.clone()
            }
        });
    Arc::new(RwLock::new(ContactCache::load(path)))
}

/// Guess the mime type from a file extension.
pub fn mime_for_path(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("pdf") | Some("PDF") => "application/pdf",
        _ => "text/plain",
    }
}
