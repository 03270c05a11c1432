//! Core library for business-document reconciliation.
//!
//! This crate provides:
//! - Heuristic field extraction from noisy OCR/PDF text (amounts, dates,
//!   parties, document type)
//! - Country-aware tax-identifier validation and normalization
//! - Legal-entity name normalization and ownership resolution against a
//!   configured set of our companies
//! - A multi-index, file-persisted contact cache
//! - A chain of line-item extraction strategies with arbitration
//! - The document reconciliation pipeline tying it all together

pub mod backends;
pub mod cache;
pub mod company;
pub mod error;
pub mod extract;
pub mod lineitems;
pub mod models;
pub mod pipeline;
pub mod taxid;

pub use error::{BackendError, CacheError, ExtractionError, ReconError, Result};
pub use models::config::{OurCompany, ReconConfig};
pub use models::contact::{CachedContact, PartyType};
pub use models::document::{
    Address, Company, DocumentType, LineItem, ReconciledDocument, TaxRate,
};

pub use cache::{CacheLookup, CacheLookupStatus, ContactCache, LookupQuery, RecommendedAction};
pub use company::{normalize_company_name, CompanyMatcher};
pub use lineitems::{LineItemExtraction, LineItemExtractor};
pub use pipeline::{DocumentPipeline, PipelineOutcome, PipelineStage};
pub use taxid::{TaxIdValidation, TaxIdValidator, TaxIdentifier};

pub use backends::{
    AccountingPlatform, ExtractionSchema, FieldSuggester, PdfTextSource, TextSource,
};
