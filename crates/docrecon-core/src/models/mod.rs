//! Data models for document reconciliation.

pub mod config;
pub mod contact;
pub mod document;

pub use config::{BackendConfig, CacheConfig, ExtractionConfig, OurCompany, ReconConfig};
pub use contact::{CachedContact, ContactAddress, PartyType};
pub use document::{
    Address, Company, DocumentType, LineItem, ReconciledDocument, TaxRate,
};
