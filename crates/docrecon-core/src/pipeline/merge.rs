//! Merging heuristic and LLM-suggested fields.
//!
//! The LLM returns a loosely shaped JSON object: a field may be a string, a
//! number, a list, or absent. Each field is lifted into a [`FieldValue`] and
//! normalized to one scalar at this boundary, so everything downstream
//! consumes a single canonical type. Merge rule: the suggested value wins
//! only when non-empty; a checksum-validated heuristic tax id is never
//! displaced by an invalid suggestion.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::extract::dates::DateExtractor;
use crate::extract::{parse_amount, FieldExtractor, HeuristicFields};
use crate::models::document::{Company, DocumentType, LineItem, TaxRate};
use crate::taxid::{TaxIdValidator, TaxIdentifier};

/// One loosely typed field from the LLM response.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    List(Vec<String>),
    Missing,
}

impl FieldValue {
    /// Lift a JSON value into the union.
    pub fn from_json(value: Option<&serde_json::Value>) -> Self {
        match value {
            None | Some(serde_json::Value::Null) => FieldValue::Missing,
            Some(serde_json::Value::String(s)) if s.trim().is_empty() => FieldValue::Missing,
            Some(serde_json::Value::String(s)) => FieldValue::Text(s.trim().to_string()),
            Some(serde_json::Value::Number(n)) => {
                n.as_f64().map(FieldValue::Number).unwrap_or(FieldValue::Missing)
            }
            Some(serde_json::Value::Array(items)) => {
                let texts: Vec<String> = items
                    .iter()
                    .filter_map(|v| match v {
                        serde_json::Value::String(s) if !s.trim().is_empty() => {
                            Some(s.trim().to_string())
                        }
                        serde_json::Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect();
                if texts.is_empty() { FieldValue::Missing } else { FieldValue::List(texts) }
            }
            Some(other) => {
                // Objects have no scalar reading.
                debug!("ignoring non-scalar suggested field: {}", other);
                FieldValue::Missing
            }
        }
    }

    /// Normalize to one scalar string: lists collapse to their first entry.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Number(n) => Some(n.to_string()),
            FieldValue::List(items) => items.first().cloned(),
            FieldValue::Missing => None,
        }
    }

    /// Numeric reading, accepting comma-decimal strings.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Number(n) => Decimal::try_from(*n).ok(),
            FieldValue::Text(s) => parse_amount(s),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }
}

/// The LLM response lifted field-by-field.
#[derive(Debug, Clone, Default)]
pub struct SuggestedFields {
    pub document_type: Option<String>,
    pub bill_number: Option<String>,
    pub issue_date: Option<String>,
    pub due_date: Option<String>,
    pub supplier_name: Option<String>,
    pub supplier_tax_id: Option<String>,
    pub supplier_email: Option<String>,
    pub supplier_address: Option<String>,
    pub supplier_country: Option<String>,
    pub our_company_name: Option<String>,
    pub our_company_tax_id: Option<String>,
    pub currency: Option<String>,
    pub net_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub line_items: Vec<LineItem>,
}

impl SuggestedFields {
    /// Parse the raw LLM JSON object.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let field = |name: &str| FieldValue::from_json(value.get(name));
        let text = |name: &str| field(name).as_text();

        Self {
            document_type: text("document_type"),
            bill_number: text("bill_number"),
            issue_date: text("issue_date"),
            due_date: text("due_date"),
            supplier_name: text("supplier_name"),
            supplier_tax_id: text("supplier_tax_id"),
            supplier_email: text("supplier_email"),
            supplier_address: text("supplier_address"),
            supplier_country: text("supplier_country"),
            our_company_name: text("our_company_name"),
            our_company_tax_id: text("our_company_tax_id"),
            currency: text("currency"),
            net_amount: field("net_amount").as_decimal(),
            tax_amount: field("tax_amount").as_decimal(),
            line_items: parse_suggested_rows(value.get("line_items")),
        }
    }
}

fn parse_suggested_rows(value: Option<&serde_json::Value>) -> Vec<LineItem> {
    let Some(serde_json::Value::Array(items)) = value else { return Vec::new() };

    items
        .iter()
        .filter_map(|item| {
            let name = FieldValue::from_json(item.get("name")).as_text()?;
            let quantity = FieldValue::from_json(item.get("quantity")).as_decimal()?;
            let unit_price = FieldValue::from_json(item.get("unit_price")).as_decimal()?;
            let tax_percent = FieldValue::from_json(item.get("tax_percent"))
                .as_decimal()
                .and_then(|d| d.to_u8())
                .map(TaxRate::from_percent)
                .unwrap_or_default();

            Some(LineItem {
                ordinal: None,
                name,
                quantity,
                unit_price,
                tax_percent,
                is_tax_inclusive: false,
            })
        })
        .collect()
}

/// Field set after merging heuristics with the suggestion pass.
#[derive(Debug, Clone, Default)]
pub struct MergedFields {
    pub document_type: DocumentType,
    pub bill_number: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub supplier: Company,
    pub our_company: Company,
    pub currency: Option<String>,
    pub total_net: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub total_gross: Option<Decimal>,
    /// Advisory rows from the suggestion pass, used only for enrichment.
    pub suggested_rows: Vec<LineItem>,
}

/// Merge the two extraction passes field-by-field.
///
/// The suggested (LLM) value wins when present; the heuristic value fills
/// every gap. Exception: a validated heuristic tax id beats a suggestion
/// that does not validate.
pub fn merge_fields(
    heuristic: &HeuristicFields,
    suggested: Option<&SuggestedFields>,
    validator: &TaxIdValidator,
) -> MergedFields {
    let date_extractor = DateExtractor::new();
    let parse_date = |s: &Option<String>| -> Option<NaiveDate> {
        s.as_deref()
            .and_then(|s| date_extractor.extract(s))
            .map(|m| m.value)
    };

    let empty = SuggestedFields::default();
    let suggestion = suggested.unwrap_or(&empty);

    let document_type = suggestion
        .document_type
        .as_deref()
        .map(crate::extract::guess_document_type)
        .filter(|t| *t != DocumentType::Unknown)
        .unwrap_or(heuristic.document_type);

    let supplier_tax = merge_tax_id(
        suggestion.supplier_tax_id.as_deref(),
        heuristic.seller.tax_id.as_ref(),
        validator,
    );
    let our_tax = merge_tax_id(
        suggestion.our_company_tax_id.as_deref(),
        heuristic.buyer.tax_id.as_ref(),
        validator,
    );

    let supplier = Company {
        name: suggestion
            .supplier_name
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| heuristic.seller.name.clone()),
        tax_id: supplier_tax,
        address: match &suggestion.supplier_address {
            Some(raw) if !raw.is_empty() => crate::models::document::Address {
                raw: Some(raw.clone()),
                ..heuristic.seller.address.clone()
            },
            _ => heuristic.seller.address.clone(),
        },
        email: suggestion
            .supplier_email
            .clone()
            .or_else(|| heuristic.seller.email.clone()),
        phone: heuristic.seller.phone.clone(),
        country: suggestion.supplier_country.clone(),
        is_our_company: false,
    };

    let our_company = Company {
        name: suggestion
            .our_company_name
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| heuristic.buyer.name.clone()),
        tax_id: our_tax,
        address: heuristic.buyer.address.clone(),
        email: heuristic.buyer.email.clone(),
        phone: heuristic.buyer.phone.clone(),
        country: None,
        is_our_company: false,
    };

    let total_gross = heuristic.total_gross;
    let total_net = suggestion
        .net_amount
        .or(heuristic.total_net)
        .or_else(|| match (total_gross, suggestion.tax_amount.or(heuristic.total_tax)) {
            (Some(gross), Some(tax)) => Some(gross - tax),
            _ => None,
        });
    let tax_amount = suggestion
        .tax_amount
        .or(heuristic.total_tax)
        .or_else(|| match (total_gross, total_net) {
            (Some(gross), Some(net)) if gross >= net => Some(gross - net),
            _ => None,
        });

    MergedFields {
        document_type,
        bill_number: suggestion
            .bill_number
            .clone()
            .filter(|s| looks_informative(s))
            .or_else(|| heuristic.bill_number.clone()),
        issue_date: parse_date(&suggestion.issue_date).or(heuristic.issue_date),
        due_date: parse_date(&suggestion.due_date).or(heuristic.due_date),
        supplier,
        our_company,
        currency: suggestion
            .currency
            .clone()
            .map(|c| normalize_currency(&c))
            .or_else(|| heuristic.currency.clone()),
        total_net,
        tax_amount,
        total_gross,
        suggested_rows: suggestion.line_items.clone(),
    }
}

/// Merge a suggested tax id with the heuristic one.
///
/// The suggestion wins only when it validates at least as well: a heuristic
/// id that passed format+checksum is kept over a suggestion that does not.
fn merge_tax_id(
    suggested: Option<&str>,
    heuristic: Option<&TaxIdentifier>,
    validator: &TaxIdValidator,
) -> Option<TaxIdentifier> {
    let suggested = suggested
        .filter(|s| !s.trim().is_empty())
        .map(|s| validator.validate(s, None).into_identifier(s));

    match (suggested, heuristic) {
        (Some(s), Some(h)) if h.is_valid && !s.is_valid => Some(h.clone()),
        (Some(s), _) => Some(s),
        (None, h) => h.cloned(),
    }
}

/// Collapse currency symbols to ISO codes.
pub fn normalize_currency(value: &str) -> String {
    let value = value.trim();
    if value.contains('€') {
        return "EUR".to_string();
    }
    if value.contains('$') {
        return "USD".to_string();
    }
    if value.contains("zł") {
        return "PLN".to_string();
    }
    value.to_uppercase()
}

/// A bill number worth keeping over the heuristic one.
fn looks_informative(s: &str) -> bool {
    !s.trim().is_empty() && s.chars().any(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::HeuristicExtractor;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_field_value_lifting() {
        let json = serde_json::json!({
            "a": "text",
            "b": 4.2,
            "c": ["x", "y"],
            "d": null,
            "e": ""
        });

        assert_eq!(FieldValue::from_json(json.get("a")), FieldValue::Text("text".into()));
        assert_eq!(FieldValue::from_json(json.get("b")), FieldValue::Number(4.2));
        assert_eq!(
            FieldValue::from_json(json.get("c")),
            FieldValue::List(vec!["x".into(), "y".into()])
        );
        assert!(FieldValue::from_json(json.get("d")).is_missing());
        assert!(FieldValue::from_json(json.get("e")).is_missing());
        assert!(FieldValue::from_json(json.get("missing")).is_missing());
    }

    #[test]
    fn test_list_normalizes_to_first_entry() {
        let value = FieldValue::List(vec!["first".into(), "second".into()]);
        assert_eq!(value.as_text(), Some("first".into()));
    }

    #[test]
    fn test_suggestion_wins_when_present() {
        let heuristic = HeuristicExtractor::new().extract("Invoice no: 1/2025\nTotal due: 100.00");
        let suggested = SuggestedFields {
            bill_number: Some("FV/3538/2025".into()),
            currency: Some("€".into()),
            ..SuggestedFields::default()
        };

        let merged = merge_fields(&heuristic, Some(&suggested), &TaxIdValidator::new());
        assert_eq!(merged.bill_number.as_deref(), Some("FV/3538/2025"));
        assert_eq!(merged.currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn test_heuristic_fills_empty_suggestion() {
        let heuristic = HeuristicExtractor::new().extract("Invoice no: 1/2025\nTotal due: 100.00");
        let merged = merge_fields(&heuristic, None, &TaxIdValidator::new());

        assert_eq!(merged.bill_number.as_deref(), Some("1/2025"));
        assert_eq!(merged.total_gross, Some("100.00".parse().unwrap()));
    }

    #[test]
    fn test_validated_heuristic_tax_id_kept() {
        let text = "Supplier Ltd\nNIP: 527-295-61-46";
        let heuristic = HeuristicExtractor::new().extract(text);
        let suggested = SuggestedFields {
            supplier_tax_id: Some("PL1234567890".into()), // fails the checksum
            ..SuggestedFields::default()
        };

        let merged = merge_fields(&heuristic, Some(&suggested), &TaxIdValidator::new());
        assert_eq!(
            merged.supplier.tax_id.as_ref().map(|t| t.normalized.as_str()),
            Some("PL5272956146")
        );
    }

    #[test]
    fn test_valid_suggested_tax_id_wins() {
        let heuristic = HeuristicExtractor::new().extract("Supplier Ltd, no ids here");
        let suggested = SuggestedFields {
            supplier_tax_id: Some("PL9512495127".into()),
            ..SuggestedFields::default()
        };

        let merged = merge_fields(&heuristic, Some(&suggested), &TaxIdValidator::new());
        assert_eq!(
            merged.supplier.tax_id.as_ref().map(|t| t.normalized.as_str()),
            Some("PL9512495127")
        );
    }

    #[test]
    fn test_net_derived_from_gross_and_tax() {
        let heuristic =
            HeuristicExtractor::new().extract("Kwota VAT: 80,00\nDo zapłaty: 1 080,00");
        let merged = merge_fields(&heuristic, None, &TaxIdValidator::new());

        assert_eq!(merged.total_net, Some("1000.00".parse().unwrap()));
        assert_eq!(merged.tax_amount, Some("80.00".parse().unwrap()));
    }

    #[test]
    fn test_suggested_rows_parsed() {
        let json = serde_json::json!({
            "line_items": [
                {"name": "Dahl Karma", "quantity": 10, "unit_price": "4,14", "tax_percent": 8},
                {"name": "", "quantity": 1, "unit_price": 1.0},
                {"quantity": 5, "unit_price": 2.0}
            ]
        });
        let suggested = SuggestedFields::from_json(&json);

        assert_eq!(suggested.line_items.len(), 1);
        assert_eq!(suggested.line_items[0].name, "Dahl Karma");
        assert_eq!(suggested.line_items[0].tax_percent, TaxRate::Reduced8);
    }
}
