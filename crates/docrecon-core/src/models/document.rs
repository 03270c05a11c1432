//! Document data models produced by the reconciliation pipeline.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::taxid::TaxIdentifier;

/// Type of business document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Standard incoming invoice.
    Invoice,
    /// Proforma invoice (pre-payment request).
    Proforma,
    /// Credit note.
    CreditNote,
    /// Sale/purchase contract.
    Contract,
    /// Payment receipt.
    Receipt,
    /// Could not be determined.
    Unknown,
}

impl Default for DocumentType {
    fn default() -> Self {
        Self::Unknown
    }
}

/// A party (supplier or one of our companies) on a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Company {
    /// Full legal name.
    pub name: String,

    /// Validated tax identifier, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<TaxIdentifier>,

    /// Postal address.
    #[serde(default, skip_serializing_if = "Address::is_empty")]
    pub address: Address,

    /// Email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Phone number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// Country name (e.g. "Poland"), possibly backfilled by the pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// Whether this party resolved to one of our legal entities.
    ///
    /// Derived by the matcher from tax id/name, never taken from upstream
    /// extraction, which routinely mislabels the parties.
    #[serde(default)]
    pub is_our_company: bool,
}

impl Company {
    /// Normalized tax id string, when one is present.
    pub fn tax_id_normalized(&self) -> Option<&str> {
        self.tax_id.as_ref().map(|t| t.normalized.as_str())
    }
}

/// Address structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    /// Street name and number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,

    /// Postal code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,

    /// City name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    /// Country name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// Full address as a single string when parsing fails to separate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl Address {
    /// Check if the address has any data.
    pub fn is_empty(&self) -> bool {
        self.street.is_none()
            && self.postal_code.is_none()
            && self.city.is_none()
            && self.raw.is_none()
    }

    /// Format address as a single string.
    pub fn format(&self) -> String {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }

        let mut parts = Vec::new();
        if let Some(street) = &self.street {
            parts.push(street.clone());
        }
        if let (Some(postal), Some(city)) = (&self.postal_code, &self.city) {
            parts.push(format!("{} {}", postal, city));
        } else if let Some(city) = &self.city {
            parts.push(city.clone());
        }
        if let Some(country) = &self.country {
            parts.push(country.clone());
        }
        parts.join(", ")
    }
}

/// Tax rates seen on incoming documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaxRate {
    /// Standard rate: 23%
    #[serde(rename = "23")]
    Standard23,

    /// Reduced rate: 8%
    #[serde(rename = "8")]
    Reduced8,

    /// Reduced rate: 5%
    #[serde(rename = "5")]
    Reduced5,

    /// Zero rate: 0%
    #[serde(rename = "0")]
    Zero,

    /// Exempt from tax.
    #[serde(rename = "exempt")]
    Exempt,

    /// Other/custom rate.
    #[serde(untagged)]
    Other(u8),
}

impl TaxRate {
    /// Percent value of this rate.
    pub fn as_percent(&self) -> u8 {
        match self {
            TaxRate::Standard23 => 23,
            TaxRate::Reduced8 => 8,
            TaxRate::Reduced5 => 5,
            TaxRate::Zero | TaxRate::Exempt => 0,
            TaxRate::Other(rate) => *rate,
        }
    }

    /// Parse a rate from a document marker such as "23%", "8", or "zw".
    pub fn from_label(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        let s = s.trim_end_matches('%');

        match s {
            "23" => Some(TaxRate::Standard23),
            "8" => Some(TaxRate::Reduced8),
            "5" => Some(TaxRate::Reduced5),
            "0" => Some(TaxRate::Zero),
            "zw" | "zw." | "zwolniony" | "exempt" => Some(TaxRate::Exempt),
            _ => s.parse::<u8>().ok().map(TaxRate::from_percent),
        }
    }

    /// Map a percent value onto the known domain set.
    pub fn from_percent(p: u8) -> Self {
        match p {
            23 => TaxRate::Standard23,
            8 => TaxRate::Reduced8,
            5 => TaxRate::Reduced5,
            0 => TaxRate::Zero,
            other => TaxRate::Other(other),
        }
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        Self::Reduced8
    }
}

/// A single row of a document's goods/services table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    /// Sequential number on the document, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u32>,

    /// Product/service name.
    pub name: String,

    /// Quantity.
    pub quantity: Decimal,

    /// Unit price. Net or gross per `is_tax_inclusive`.
    pub unit_price: Decimal,

    /// Applicable tax rate.
    pub tax_percent: TaxRate,

    /// Whether `unit_price` already contains tax.
    ///
    /// Decided once per document from the table header; every row of one
    /// document carries the same value.
    pub is_tax_inclusive: bool,
}

impl LineItem {
    /// A row is usable when it has a name, a positive quantity, and a price.
    pub fn is_consistent(&self) -> bool {
        !self.name.trim().is_empty()
            && self.quantity > Decimal::ZERO
            && self.unit_price > Decimal::ZERO
    }
}

/// The pipeline's output: one document, reconciled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciledDocument {
    /// Detected document type.
    pub document_type: DocumentType,

    /// Bill/invoice number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_number: Option<String>,

    /// Date the document was issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<NaiveDate>,

    /// Payment due date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,

    /// The external counterparty.
    pub supplier: Company,

    /// The legal entity of ours this document belongs to.
    pub our_company: Company,

    /// Currency code (EUR, PLN, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    /// Total net amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount_net: Option<Decimal>,

    /// Total tax amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<Decimal>,

    /// Extracted line items (empty for single-position documents).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub line_items: Vec<LineItem>,

    /// Terminal skip flag: the document does not belong to our books.
    ///
    /// Once set, no further enrichment happens; only a subsequent successful
    /// ownership re-resolution clears it.
    #[serde(default)]
    pub skip_processing: bool,

    /// Human-readable reason when `skip_processing` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,

    /// Non-fatal issues collected along the way.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_tax_rate_from_label() {
        assert_eq!(TaxRate::from_label("23%"), Some(TaxRate::Standard23));
        assert_eq!(TaxRate::from_label("23"), Some(TaxRate::Standard23));
        assert_eq!(TaxRate::from_label("8%"), Some(TaxRate::Reduced8));
        assert_eq!(TaxRate::from_label("zw"), Some(TaxRate::Exempt));
        assert_eq!(TaxRate::from_label("19"), Some(TaxRate::Other(19)));
        assert_eq!(TaxRate::from_label("n/a"), None);
    }

    #[test]
    fn test_tax_rate_percent() {
        assert_eq!(TaxRate::Standard23.as_percent(), 23);
        assert_eq!(TaxRate::Exempt.as_percent(), 0);
        assert_eq!(TaxRate::Other(19).as_percent(), 19);
    }

    #[test]
    fn test_line_item_consistency() {
        let row = LineItem {
            ordinal: Some(1),
            name: "Dahl Karma Prospero".to_string(),
            quantity: Decimal::from(10),
            unit_price: Decimal::new(414, 2),
            tax_percent: TaxRate::Reduced8,
            is_tax_inclusive: false,
        };
        assert!(row.is_consistent());

        let mut bad = row.clone();
        bad.quantity = Decimal::ZERO;
        assert!(!bad.is_consistent());

        let mut unnamed = row;
        unnamed.name = "  ".to_string();
        assert!(!unnamed.is_consistent());
    }

    #[test]
    fn test_address_format() {
        let addr = Address {
            street: Some("ul. Krochmalna 54/U6".to_string()),
            postal_code: Some("00-864".to_string()),
            city: Some("Warszawa".to_string()),
            country: Some("Poland".to_string()),
            raw: None,
        };
        assert_eq!(addr.format(), "ul. Krochmalna 54/U6, 00-864 Warszawa, Poland");
    }
}
