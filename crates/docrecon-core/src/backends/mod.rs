//! External collaborator boundaries: OCR, LLM extraction, accounting API.
//!
//! The pipeline only ever sees these narrow traits. Out-of-process calls go
//! through [`with_retry`]: a bounded timeout and a single retry with fixed
//! backoff, after which the pipeline degrades to heuristic-only extraction
//! rather than dropping the document.

pub mod accounting;
pub mod pdftext;

pub use accounting::{
    Account, AccountingPlatform, BillLineItem, BillPayload, ContactPayload, TaxRateEntry,
};
pub use pdftext::PdfTextSource;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::BackendError;
use crate::models::config::BackendConfig;

/// Source of raw text for a document (the OCR boundary).
#[async_trait]
pub trait TextSource: Send + Sync {
    /// Extract plain text from document bytes, all pages concatenated.
    ///
    /// An empty result is an error: a document with no text cannot be
    /// processed at all.
    async fn extract_text(&self, bytes: &[u8], mime_type: &str) -> Result<String, BackendError>;
}

/// One field the LLM collaborator is asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaField {
    /// Field name, e.g. "supplier_name".
    pub name: String,
    /// Expected kind: "string", "number", "list".
    pub kind: String,
    /// Free-text instructions (locale conventions, disambiguation).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instructions: String,
}

/// Extraction schema handed to the LLM collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionSchema {
    pub fields: Vec<SchemaField>,
    /// Document-level instructions (languages, formats to expect).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instructions: String,
}

impl ExtractionSchema {
    /// The schema used for business documents.
    pub fn document_fields() -> Self {
        let field = |name: &str, kind: &str| SchemaField {
            name: name.to_string(),
            kind: kind.to_string(),
            instructions: String::new(),
        };

        Self {
            fields: vec![
                field("document_type", "string"),
                field("bill_number", "string"),
                field("issue_date", "string"),
                field("due_date", "string"),
                field("supplier_name", "string"),
                field("supplier_tax_id", "string"),
                field("supplier_email", "string"),
                field("supplier_address", "string"),
                field("supplier_country", "string"),
                field("our_company_name", "string"),
                field("our_company_tax_id", "string"),
                field("currency", "string"),
                field("net_amount", "number"),
                field("tax_amount", "number"),
                field("line_items", "list"),
            ],
            instructions: "Documents may be Polish, English, German, or Lithuanian. \
                           Dates may use DD.MM.YYYY. Amounts may use comma decimals."
                .to_string(),
        }
    }
}

/// Advisory field extraction (the LLM boundary).
///
/// The returned JSON object follows the schema's field names; missing fields
/// are absent keys. Results are mergeable hints, never authoritative over a
/// validated heuristic value.
#[async_trait]
pub trait FieldSuggester: Send + Sync {
    async fn suggest_fields(
        &self,
        text: &str,
        schema: &ExtractionSchema,
    ) -> Result<serde_json::Value, BackendError>;
}

/// Run a backend call with a bounded timeout and a single retry.
pub async fn with_retry<T, F, Fut>(
    service: &'static str,
    config: &BackendConfig,
    mut call: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let timeout = Duration::from_secs(config.call_timeout_secs);

    for attempt in 0..2 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(config.retry_backoff_ms)).await;
        }

        match tokio::time::timeout(timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if attempt == 0 => {
                warn!("{} failed, retrying once: {}", service, e);
            }
            Ok(Err(e)) => return Err(e),
            Err(_) if attempt == 0 => {
                warn!("{} timed out, retrying once", service);
            }
            Err(_) => {
                return Err(BackendError::Timeout {
                    service,
                    seconds: config.call_timeout_secs,
                })
            }
        }
    }

    unreachable!("retry loop returns on the second attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retry_succeeds_second_time() {
        let attempts = AtomicUsize::new(0);
        let config = BackendConfig { call_timeout_secs: 5, retry_backoff_ms: 1 };

        let result = with_retry("test", &config, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(BackendError::Service { service: "test", reason: "flaky".into() })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_two_failures() {
        let config = BackendConfig { call_timeout_secs: 5, retry_backoff_ms: 1 };

        let result: Result<(), _> = with_retry("test", &config, || async {
            Err(BackendError::Service { service: "test", reason: "down".into() })
        })
        .await;

        assert!(result.is_err());
    }
}
