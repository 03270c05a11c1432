//! Configuration structures for the reconciliation pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the docrecon pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    /// Our legal entities, injected rather than hard-coded so tests can
    /// substitute alternate reference sets.
    pub our_companies: Vec<OurCompany>,

    /// Field extraction configuration.
    pub extraction: ExtractionConfig,

    /// Contact cache configuration.
    pub cache: CacheConfig,

    /// External backend configuration.
    pub backends: BackendConfig,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            our_companies: Vec::new(),
            extraction: ExtractionConfig::default(),
            cache: CacheConfig::default(),
            backends: BackendConfig::default(),
        }
    }
}

/// One of our legal entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OurCompany {
    /// Legal name as registered.
    pub name: String,

    /// Tax identifier with country prefix (e.g. "PL5272956146").
    pub tax_id: String,

    /// Registered address.
    #[serde(default)]
    pub address: String,

    /// Country name.
    #[serde(default)]
    pub country: String,

    /// The accounting platform's organization id for this entity's books.
    #[serde(default)]
    pub organization_id: String,
}

/// Field extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Enable tax-id checksum validation where a country defines one.
    pub validate_checksums: bool,

    /// Minimum confidence to accept a tax-id candidate from free text.
    pub min_taxid_confidence: f32,

    /// Minimum confidence to accept a backfilled supplier country.
    pub min_country_confidence: f32,

    /// Default currency if not detected.
    pub default_currency: String,

    /// Default tax rate for rows with no resolvable marker.
    pub default_tax_percent: u8,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            validate_checksums: true,
            min_taxid_confidence: 0.3,
            min_country_confidence: 0.6,
            default_currency: "EUR".to_string(),
            default_tax_percent: 8,
        }
    }
}

/// Contact cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Path of the persisted cache file.
    pub cache_file: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_file: PathBuf::from("data/contact_cache.json"),
        }
    }
}

/// External backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Per-call timeout for OCR and LLM backends, in seconds.
    pub call_timeout_secs: u64,

    /// Backoff before the single retry, in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 60,
            retry_backoff_ms: 500,
        }
    }
}

impl ReconConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip() {
        let config = ReconConfig {
            our_companies: vec![OurCompany {
                name: "Parkentertainment Sp. z o.o.".to_string(),
                tax_id: "PL5272956146".to_string(),
                address: "UL. KROCHMALNA 54/U6, 00-864, Warszawa".to_string(),
                country: "Poland".to_string(),
                organization_id: "20082562863".to_string(),
            }],
            ..ReconConfig::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        let back: ReconConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.our_companies.len(), 1);
        assert_eq!(back.our_companies[0].tax_id, "PL5272956146");
        assert_eq!(back.extraction.default_tax_percent, 8);
    }
}
