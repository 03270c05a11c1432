//! Document reconciliation pipeline.
//!
//! One document moves through a strict dependency chain:
//! `Extracted → OwnershipResolved → CountryBackfilled → CacheChecked →
//! {SkippedNotOurs | ReadyForPosting}`. The pipeline is stateless between
//! documents; the contact cache is the only shared mutable resource and is
//! written only at or after the cache-check step, so a document abandoned
//! between steps leaves no partial state behind.

pub mod country;
pub mod merge;

pub use country::{backfill_country, CountrySignal};
pub use merge::{merge_fields, FieldValue, MergedFields, SuggestedFields};

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backends::{with_retry, ExtractionSchema, FieldSuggester, TextSource};
use crate::cache::{CacheLookup, ContactCache, LookupQuery, RecommendedAction};
use crate::company::CompanyMatcher;
use crate::error::{ReconError, Result};
use crate::extract::patterns::EMAIL;
use crate::extract::HeuristicExtractor;
use crate::lineitems::LineItemExtractor;
use crate::models::config::ReconConfig;
use crate::models::document::{Company, ReconciledDocument, TaxRate};
use crate::taxid::{self, TaxIdValidator};

/// How far a document progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Extracted,
    OwnershipResolved,
    CountryBackfilled,
    CacheChecked,
    /// Terminal: the document does not belong to our books.
    SkippedNotOurs,
    /// Terminal success.
    ReadyForPosting,
}

/// Pipeline output for the presentation layer.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub document: ReconciledDocument,
    pub stage: PipelineStage,
    /// Cache verdict on the supplier; absent for skipped documents.
    pub cache_lookup: Option<CacheLookup>,
    /// Caller-facing action derived from the cache verdict.
    pub recommended_action: Option<RecommendedAction>,
}

/// The reconciliation pipeline.
pub struct DocumentPipeline {
    config: ReconConfig,
    matcher: CompanyMatcher,
    validator: TaxIdValidator,
    extractor: HeuristicExtractor,
    cache: Arc<RwLock<ContactCache>>,
    text_source: Arc<dyn TextSource>,
    suggester: Option<Arc<dyn FieldSuggester>>,
}

impl DocumentPipeline {
    pub fn new(
        config: ReconConfig,
        cache: Arc<RwLock<ContactCache>>,
        text_source: Arc<dyn TextSource>,
        suggester: Option<Arc<dyn FieldSuggester>>,
    ) -> Self {
        let matcher = CompanyMatcher::new(config.our_companies.clone());
        let validator = TaxIdValidator::new()
            .with_checksums(config.extraction.validate_checksums)
            .with_scan_threshold(config.extraction.min_taxid_confidence);

        Self {
            config,
            matcher,
            validator,
            extractor: HeuristicExtractor::new(),
            cache,
            text_source,
            suggester,
        }
    }

    /// Shared contact cache handle.
    pub fn cache(&self) -> Arc<RwLock<ContactCache>> {
        Arc::clone(&self.cache)
    }

    /// Process a document from its bytes.
    ///
    /// An unreadable or empty document is fatal for that document; there is
    /// no partial result without text.
    pub async fn process_bytes(&self, bytes: &[u8], mime_type: &str) -> Result<PipelineOutcome> {
        let text = with_retry("text-source", &self.config.backends, || {
            self.text_source.extract_text(bytes, mime_type)
        })
        .await
        .map_err(|e| ReconError::Input(format!("no text extracted: {}", e)))?;

        if text.trim().is_empty() {
            return Err(ReconError::Input("document yielded empty text".to_string()));
        }

        self.process_text(&text, None).await
    }

    /// Process a document from already extracted text, with an optional
    /// pre-segmented table grid.
    pub async fn process_text(
        &self,
        text: &str,
        table: Option<&[Vec<String>]>,
    ) -> Result<PipelineOutcome> {
        if text.trim().is_empty() {
            return Err(ReconError::Input("document yielded empty text".to_string()));
        }

        let mut warnings = Vec::new();

        // --- Extracted: heuristics always, suggestions when available. ---
        let heuristic = self.extractor.extract(text);
        let suggested = self.suggest_fields(text, &mut warnings).await;
        let merged = merge_fields(&heuristic, suggested.as_ref(), &self.validator);
        debug!(stage = ?PipelineStage::Extracted, supplier = %merged.supplier.name);

        // --- OwnershipResolved: classify parties, correct swapped roles. ---
        let (mut supplier, mut our_company) = (merged.supplier, merged.our_company);
        let resolution = self.matcher.resolve_ownership(&supplier, &our_company, text);

        if resolution.skip {
            let reason = resolution
                .skip_reason
                .unwrap_or_else(|| "document is not part of our books".to_string());
            info!("document skipped: {}", reason);
            let document = ReconciledDocument {
                document_type: merged.document_type,
                bill_number: merged.bill_number,
                issue_date: merged.issue_date,
                due_date: merged.due_date,
                supplier,
                our_company,
                currency: merged.currency,
                total_amount_net: merged.total_net,
                tax_amount: merged.tax_amount,
                line_items: Vec::new(),
                skip_processing: true,
                skip_reason: Some(reason),
                warnings,
            };
            return Ok(PipelineOutcome {
                document,
                stage: PipelineStage::SkippedNotOurs,
                cache_lookup: None,
                recommended_action: None,
            });
        }

        if resolution.swapped {
            std::mem::swap(&mut supplier, &mut our_company);
        }

        // Replace the our-side party with the resolved reference entity so
        // downstream steps see confirmed data, not extraction noise.
        if let Some(idx) = resolution.our_company {
            our_company = self.reference_company(idx);
        }
        supplier.is_our_company = false;

        // --- CountryBackfilled. ---
        backfill_country(
            &mut supplier,
            text,
            merged.currency.as_deref(),
            &self.validator,
            self.config.extraction.min_country_confidence,
        );

        if supplier.email.is_none() {
            supplier.email = EMAIL.find(text).map(|m| m.as_str().to_string());
        }

        // --- Line items (multi-row documents only). ---
        let line_extractor =
            LineItemExtractor::new(TaxRate::from_percent(self.config.extraction.default_tax_percent));
        let mut extraction = line_extractor.extract(text, table);

        if extraction.needs_enrichment() && !merged.suggested_rows.is_empty() {
            info!(
                "line-item enrichment: {} extracted vs {} declared",
                extraction.rows.len(),
                extraction.declared_rows
            );
            let mut suggested_rows = merged.suggested_rows;
            for row in &mut suggested_rows {
                row.is_tax_inclusive = extraction.tax_inclusive;
            }
            LineItemExtractor::merge_suggested_rows(&mut extraction.rows, suggested_rows);
        }
        if extraction.needs_enrichment() {
            warnings.push(format!(
                "extracted {} of {} declared rows",
                extraction.rows.len(),
                extraction.declared_rows
            ));
        }

        // --- CacheChecked: the only step that touches shared state. ---
        let lookup = {
            let cache = self.cache.read().expect("contact cache lock poisoned");
            cache.lookup(&LookupQuery {
                tax_id: supplier.tax_id_normalized().map(str::to_string),
                company_name: Some(supplier.name.clone()).filter(|s| !s.is_empty()),
                email: supplier.email.clone(),
            })
        };
        let action = lookup.recommended_action();
        debug!(stage = ?PipelineStage::CacheChecked, status = ?lookup.status);

        let document = ReconciledDocument {
            document_type: merged.document_type,
            bill_number: merged.bill_number,
            issue_date: merged.issue_date,
            due_date: merged.due_date,
            supplier,
            our_company,
            currency: merged.currency,
            total_amount_net: merged.total_net,
            tax_amount: merged.tax_amount,
            line_items: extraction.rows,
            skip_processing: false,
            skip_reason: None,
            warnings,
        };

        Ok(PipelineOutcome {
            document,
            stage: PipelineStage::ReadyForPosting,
            cache_lookup: Some(lookup),
            recommended_action: Some(action),
        })
    }

    /// Record a platform-confirmed contact in the shared cache and persist.
    ///
    /// Called after create/update/refresh operations against the accounting
    /// platform; never from extraction.
    pub fn record_confirmed_contact(
        &self,
        contact: crate::models::contact::CachedContact,
    ) -> Result<()> {
        let mut cache = self.cache.write().expect("contact cache lock poisoned");
        cache.upsert(contact);
        if let Err(e) = cache.save() {
            warn!("cache persistence failed (in-memory state intact): {}", e);
            return Err(e.into());
        }
        Ok(())
    }

    async fn suggest_fields(
        &self,
        text: &str,
        warnings: &mut Vec<String>,
    ) -> Option<SuggestedFields> {
        let suggester = self.suggester.as_ref()?;
        let schema = ExtractionSchema::document_fields();

        match with_retry("field-suggester", &self.config.backends, || {
            suggester.suggest_fields(text, &schema)
        })
        .await
        {
            Ok(value) if value.is_object() => Some(SuggestedFields::from_json(&value)),
            Ok(_) => {
                warnings.push("field suggester returned no usable object".to_string());
                None
            }
            Err(e) => {
                warn!("field suggester unavailable, heuristics only: {}", e);
                warnings.push(format!("field suggester unavailable: {}", e));
                None
            }
        }
    }

    /// Build the confirmed-company view of a reference entity.
    fn reference_company(&self, idx: usize) -> Company {
        let reference = &self.config.our_companies[idx];
        let tax_id = self
            .validator
            .validate(&reference.tax_id, None)
            .into_identifier(&reference.tax_id);

        Company {
            name: reference.name.clone(),
            tax_id: Some(tax_id),
            address: crate::models::document::Address {
                raw: Some(reference.address.clone()).filter(|s| !s.is_empty()),
                ..Default::default()
            },
            email: None,
            phone: None,
            country: Some(reference.country.clone()).filter(|s| !s.is_empty()),
            is_our_company: true,
        }
    }

    /// The validator in use (thresholds applied from config).
    pub fn validator(&self) -> &TaxIdValidator {
        &self.validator
    }

    /// Normalized tax id for an arbitrary candidate, prefix backfilled from
    /// a country when known. Utility for the presentation layer.
    pub fn normalize_tax_id(&self, candidate: &str, country: Option<&str>) -> String {
        let code = country.and_then(taxid::country_code_for_name);
        self.validator.add_country_prefix(candidate, code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::PdfTextSource;
    use crate::cache::CacheLookupStatus;
    use crate::error::BackendError;
    use crate::models::config::OurCompany;
    use crate::models::contact::{CachedContact, ContactAddress, PartyType};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    const INVOICE: &str = "\
FAKTURA VAT nr FV A/3538/2025

Sprzedawca:
HIBISPOL Sp. z o.o.
ul. Wileńska 87
03-416 Warszawa
NIP: 951-249-51-27
biuro@hibispol.pl

Nabywca:
Parkentertainment Sp. z o.o.
UL. KROCHMALNA 54/U6
00-864 Warszawa
NIP: 527-295-61-46

Data wystawienia: 16.08.2025
Termin płatności: 30.08.2025

Lp Nazwa Ilość Cena netto VAT
1 Dahl Karma Prospero 10 szt 4,14 41,40 3,31 44,71 8%
2 Hydr M Ch Verena 5 szt 16,56 82,80 6,62 89,42 8%

Razem netto: 124,20 zł
Kwota VAT: 9,93 zł
Do zapłaty: 134,13 zł
";

    fn config() -> ReconConfig {
        ReconConfig {
            our_companies: vec![
                OurCompany {
                    name: "TaVie Europe OÜ".to_string(),
                    tax_id: "EE102288270".to_string(),
                    address: String::new(),
                    country: "Estonia".to_string(),
                    organization_id: "20092948714".to_string(),
                },
                OurCompany {
                    name: "Parkentertainment Sp. z o.o.".to_string(),
                    tax_id: "PL5272956146".to_string(),
                    address: "UL. KROCHMALNA 54/U6, 00-864, Warszawa".to_string(),
                    country: "Poland".to_string(),
                    organization_id: "20082562863".to_string(),
                },
            ],
            ..ReconConfig::default()
        }
    }

    fn pipeline() -> DocumentPipeline {
        DocumentPipeline::new(
            config(),
            Arc::new(RwLock::new(ContactCache::new("unused.json"))),
            Arc::new(PdfTextSource::new()),
            None,
        )
    }

    struct FixedSuggester(serde_json::Value);

    #[async_trait]
    impl FieldSuggester for FixedSuggester {
        async fn suggest_fields(
            &self,
            _text: &str,
            _schema: &ExtractionSchema,
        ) -> std::result::Result<serde_json::Value, BackendError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_full_pipeline_ready_for_posting() {
        let pipeline = pipeline();
        let outcome = pipeline.process_text(INVOICE, None).await.unwrap();

        assert_eq!(outcome.stage, PipelineStage::ReadyForPosting);
        let doc = &outcome.document;
        assert!(!doc.skip_processing);
        assert_eq!(doc.supplier.name, "HIBISPOL Sp. z o.o.");
        assert_eq!(
            doc.supplier.tax_id.as_ref().map(|t| t.normalized.as_str()),
            Some("PL9512495127")
        );
        assert!(!doc.supplier.is_our_company);
        assert_eq!(doc.our_company.name, "Parkentertainment Sp. z o.o.");
        assert!(doc.our_company.is_our_company);
        assert_eq!(doc.line_items.len(), 2);
        assert_eq!(doc.currency.as_deref(), Some("PLN"));

        // Nothing cached yet: the caller should create the contact.
        assert_eq!(
            outcome.recommended_action,
            Some(RecommendedAction::CreateContact)
        );
    }

    #[tokio::test]
    async fn test_cache_hit_gives_exact_match() {
        let pipeline = pipeline();
        {
            let mut cache = pipeline.cache.write().unwrap();
            cache.upsert(CachedContact {
                contact_id: "460000000026049".to_string(),
                display_name: "HIBISPOL".to_string(),
                company_name: "Hibispol Sp. z o.o.".to_string(),
                email: "biuro@hibispol.pl".to_string(),
                tax_id: Some("PL9512495127".to_string()),
                party_type: PartyType::Vendor,
                billing_address: ContactAddress::default(),
                shipping_address: ContactAddress::default(),
                phone: None,
                contact_person: None,
                notes: None,
                organization_id: "20082562863".to_string(),
                last_modified: String::new(),
            });
        }

        let outcome = pipeline.process_text(INVOICE, None).await.unwrap();
        let lookup = outcome.cache_lookup.unwrap();
        assert_eq!(lookup.status, CacheLookupStatus::ExactMatch);
        assert_eq!(outcome.recommended_action, Some(RecommendedAction::UseExisting));
    }

    #[tokio::test]
    async fn test_swapped_roles_are_corrected() {
        // Upstream extraction reversed the parties: our company appears as
        // the supplier.
        let text = "\
Sprzedawca:
Parkentertainment Sp. z o.o.
NIP: 527-295-61-46

Nabywca:
HIBISPOL Sp. z o.o.
NIP: 951-249-51-27

Faktura VAT 1/2025, Razem: 100,00 zł
";
        let pipeline = pipeline();
        let outcome = pipeline.process_text(text, None).await.unwrap();

        let doc = &outcome.document;
        assert!(!doc.skip_processing);
        assert_eq!(doc.our_company.name, "Parkentertainment Sp. z o.o.");
        assert!(doc.our_company.is_our_company);
        assert_eq!(doc.supplier.name, "HIBISPOL Sp. z o.o.");
    }

    #[tokio::test]
    async fn test_foreign_document_is_skipped() {
        let text = "\
Sprzedawca:
HIBISPOL Sp. z o.o.
NIP: 951-249-51-27

Nabywca:
Kwiaciarnia Róża Sp. z o.o.
NIP: 526-104-08-28

Faktura VAT 2/2025
";
        let pipeline = pipeline();
        let outcome = pipeline.process_text(text, None).await.unwrap();

        assert_eq!(outcome.stage, PipelineStage::SkippedNotOurs);
        assert!(outcome.document.skip_processing);
        assert!(outcome.document.skip_reason.is_some());
        assert!(outcome.cache_lookup.is_none());
    }

    #[tokio::test]
    async fn test_suggester_fills_missing_fields() {
        let suggester = FixedSuggester(serde_json::json!({
            "supplier_name": "HIBISPOL Spółka z o.o.",
            "bill_number": "FV A/3538/2025",
            "currency": "PLN",
            "net_amount": 124.20
        }));

        let pipeline = DocumentPipeline::new(
            config(),
            Arc::new(RwLock::new(ContactCache::new("unused.json"))),
            Arc::new(PdfTextSource::new()),
            Some(Arc::new(suggester)),
        );

        let outcome = pipeline.process_text(INVOICE, None).await.unwrap();
        let doc = &outcome.document;
        // Suggested values win when present.
        assert_eq!(doc.bill_number.as_deref(), Some("FV A/3538/2025"));
        assert_eq!(doc.supplier.name, "HIBISPOL Spółka z o.o.");
        assert_eq!(doc.total_amount_net, Some("124.20".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_empty_text_is_fatal() {
        let pipeline = pipeline();
        let result = pipeline.process_text("   \n  ", None).await;
        assert!(matches!(result, Err(ReconError::Input(_))));
    }
}
