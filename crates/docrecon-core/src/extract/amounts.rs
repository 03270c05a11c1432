//! Amount extraction over mixed-locale documents.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::patterns::{AMOUNT_PATTERN, TOTAL_GROSS, TOTAL_NET, TOTAL_TAX};
use super::{ExtractionMatch, FieldExtractor};

/// Amount field extractor.
pub struct AmountExtractor;

impl AmountExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AmountExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for AmountExtractor {
    type Output = ExtractionMatch<Decimal>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results = Vec::new();

        for caps in AMOUNT_PATTERN.captures_iter(text) {
            let full_match = caps.get(0).unwrap();
            if let Some(amount) = parse_amount(full_match.as_str()) {
                results.push(
                    ExtractionMatch::new(amount, 0.8, full_match.as_str())
                        .with_position(full_match.start(), full_match.end()),
                );
            }
        }

        results
    }
}

/// Extracted document totals.
#[derive(Debug, Clone, Default)]
pub struct DocumentAmounts {
    /// Total net amount (before tax).
    pub total_net: Option<ExtractionMatch<Decimal>>,
    /// Total tax amount.
    pub total_tax: Option<ExtractionMatch<Decimal>>,
    /// Total gross amount (after tax).
    pub total_gross: Option<ExtractionMatch<Decimal>>,
    /// Every amount seen in the text.
    pub all_amounts: Vec<ExtractionMatch<Decimal>>,
}

/// Extract document totals from raw text.
pub fn extract_amounts(text: &str) -> DocumentAmounts {
    let mut result = DocumentAmounts::default();
    let extractor = AmountExtractor::new();

    result.all_amounts = extractor.extract_all(text);

    if let Some(caps) = TOTAL_GROSS.captures(text) {
        if let Some(amount) = parse_amount(&caps[1]) {
            result.total_gross = Some(ExtractionMatch::new(amount, 0.95, &caps[0]));
        }
    }

    if let Some(caps) = TOTAL_NET.captures(text) {
        if let Some(amount) = parse_amount(&caps[1]) {
            result.total_net = Some(ExtractionMatch::new(amount, 0.95, &caps[0]));
        }
    }

    if let Some(caps) = TOTAL_TAX.captures(text) {
        if let Some(amount) = parse_amount(&caps[1]) {
            result.total_tax = Some(ExtractionMatch::new(amount, 0.95, &caps[0]));
        }
    }

    // Derive the missing leg when two of the three are labeled.
    if result.total_tax.is_none() {
        if let (Some(gross), Some(net)) = (&result.total_gross, &result.total_net) {
            let tax = gross.value - net.value;
            if tax >= Decimal::ZERO {
                result.total_tax = Some(ExtractionMatch::new(tax, 0.8, "derived"));
            }
        }
    }
    if result.total_net.is_none() {
        if let (Some(gross), Some(tax)) = (&result.total_gross, &result.total_tax) {
            let net = gross.value - tax.value;
            result.total_net = Some(ExtractionMatch::new(net, 0.8, "derived"));
        }
    }

    // Last resort: the largest amount on the page is usually the total due.
    if result.total_gross.is_none() && !result.all_amounts.is_empty() {
        result.total_gross = result
            .all_amounts
            .iter()
            .max_by(|a, b| a.value.cmp(&b.value))
            .cloned();
    }

    result
}

/// Parse an amount in either "1 234,56" or "1,234.56" convention.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(c), None) => {
            // A lone comma is a decimal separator unless it groups thousands.
            if cleaned.len() - c == 4 && cleaned.len() > 6 {
                cleaned.replace(',', "")
            } else {
                cleaned.replace(',', ".")
            }
        }
        (None, _) => cleaned,
    };

    Decimal::from_str(&normalized).ok()
}
