//! Cached counterparty records.
//!
//! A [`CachedContact`] mirrors what the accounting platform knows about a
//! trading partner. Records are created and refreshed only from confirmed
//! platform responses, never speculatively from document extraction, and are
//! replaced wholesale on update so the owning cache can keep its indexes
//! consistent.

use serde::{Deserialize, Serialize};

/// Customer/vendor classification used by the accounting platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyType {
    Customer,
    Vendor,
}

/// One address slot of a cached contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactAddress {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub country: String,
}

impl ContactAddress {
    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
            && self.city.is_empty()
            && self.state.is_empty()
            && self.zip.is_empty()
            && self.country.is_empty()
    }
}

/// A previously seen counterparty, as confirmed by the accounting platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedContact {
    /// The external platform's stable contact id.
    pub contact_id: String,

    /// Display name used by the platform.
    pub display_name: String,

    /// Legal company name.
    pub company_name: String,

    /// Primary email.
    #[serde(default)]
    pub email: String,

    /// Normalized tax identifier (A-Z0-9, uppercase), if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,

    /// Customer or vendor.
    pub party_type: PartyType,

    /// Billing address.
    #[serde(default, skip_serializing_if = "ContactAddress::is_empty")]
    pub billing_address: ContactAddress,

    /// Shipping address.
    #[serde(default, skip_serializing_if = "ContactAddress::is_empty")]
    pub shipping_address: ContactAddress,

    /// Phone number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// Named contact person.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_person: Option<String>,

    /// Free-form notes (bank details and similar).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// Which of our organizations' books this contact lives in.
    #[serde(default)]
    pub organization_id: String,

    /// Last-modified timestamp as reported by the platform.
    #[serde(default)]
    pub last_modified: String,
}
