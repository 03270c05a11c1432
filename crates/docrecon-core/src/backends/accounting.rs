//! Accounting-platform API boundary.
//!
//! The HTTP client itself lives outside this crate; the pipeline and the
//! presentation layer consume this trait. Every call is keyed by an
//! `organization_id` selecting one of our legal entities' books.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::models::contact::{CachedContact, PartyType};

/// Payload for creating or updating a contact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactPayload {
    pub company_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_person: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub party_type: Option<PartyType>,
}

/// One line of a bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillLineItem {
    pub name: String,
    pub quantity: Decimal,
    /// Unit price; gross when the bill is tax-inclusive.
    pub rate: Decimal,
    /// Platform tax-rate id resolved from the percent table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    /// Expense account to book the line against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

/// Payload for creating a bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillPayload {
    pub vendor_id: String,
    pub bill_number: String,
    /// Issue date, ISO format.
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    pub currency: String,
    pub is_inclusive_tax: bool,
    pub line_items: Vec<BillLineItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One chart-of-accounts entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub account_name: String,
    pub account_type: String,
}

impl Account {
    /// Income accounts must not receive incoming bills.
    pub fn is_expense(&self) -> bool {
        !matches!(
            self.account_type.to_lowercase().as_str(),
            "income" | "other_income" | "revenue"
        )
    }
}

/// One tax-rate table entry of the target organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxRateEntry {
    pub tax_id: String,
    pub tax_name: String,
    pub tax_percentage: Decimal,
}

/// The accounting platform's operations this system consumes.
#[async_trait]
pub trait AccountingPlatform: Send + Sync {
    /// Create a contact; returns the confirmed record.
    async fn create_contact(
        &self,
        organization_id: &str,
        payload: &ContactPayload,
    ) -> Result<CachedContact, BackendError>;

    /// Update an existing contact; returns the refreshed record.
    async fn update_contact(
        &self,
        organization_id: &str,
        contact_id: &str,
        payload: &ContactPayload,
    ) -> Result<CachedContact, BackendError>;

    /// Search contacts by name or tax id.
    async fn search_contacts(
        &self,
        organization_id: &str,
        query: &str,
    ) -> Result<Vec<CachedContact>, BackendError>;

    /// Create a bill with line items; returns the platform's bill id.
    async fn create_bill(
        &self,
        organization_id: &str,
        payload: &BillPayload,
    ) -> Result<String, BackendError>;

    /// Attach the source file to a created bill.
    async fn attach_file(
        &self,
        organization_id: &str,
        bill_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<(), BackendError>;

    /// Chart of accounts for the organization.
    async fn chart_of_accounts(
        &self,
        organization_id: &str,
    ) -> Result<Vec<Account>, BackendError>;

    /// Tax-rate table for the organization.
    async fn tax_rates(&self, organization_id: &str) -> Result<Vec<TaxRateEntry>, BackendError>;
}

/// Pick the platform tax id matching a document rate percent.
pub fn find_tax_by_percent(rates: &[TaxRateEntry], percent: u8) -> Option<&TaxRateEntry> {
    rates
        .iter()
        .find(|r| r.tax_percentage == Decimal::from(percent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expense_account_filter() {
        let expense = Account {
            account_id: "1".into(),
            account_name: "Flowers".into(),
            account_type: "expense".into(),
        };
        let income = Account {
            account_id: "2".into(),
            account_name: "Sales".into(),
            account_type: "Income".into(),
        };
        assert!(expense.is_expense());
        assert!(!income.is_expense());
    }

    #[test]
    fn test_find_tax_by_percent() {
        let rates = vec![
            TaxRateEntry {
                tax_id: "t8".into(),
                tax_name: "VAT 8%".into(),
                tax_percentage: Decimal::from(8),
            },
            TaxRateEntry {
                tax_id: "t23".into(),
                tax_name: "VAT 23%".into(),
                tax_percentage: Decimal::from(23),
            },
        ];

        assert_eq!(find_tax_by_percent(&rates, 23).unwrap().tax_id, "t23");
        assert!(find_tax_by_percent(&rates, 19).is_none());
    }
}
