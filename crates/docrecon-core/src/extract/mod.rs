//! Heuristic (rule-based) field extraction from raw document text.
//!
//! This is the always-available half of the pipeline's `Extracted` stage:
//! regex-table extractors producing confidence-scored matches. The LLM
//! collaborator supplies the other half; the pipeline merges the two.

pub mod amounts;
pub mod dates;
pub mod doctype;
pub mod patterns;

pub use amounts::{extract_amounts, parse_amount, AmountExtractor, DocumentAmounts};
pub use dates::{extract_dates, DateExtractor, DocumentDates};
pub use doctype::guess_document_type;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

use crate::models::document::{Address, DocumentType};
use crate::taxid::{TaxIdValidator, TaxIdentifier};
use patterns::*;

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the field from text.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences of the field.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}

/// Extraction result with a confidence score.
#[derive(Debug, Clone)]
pub struct ExtractionMatch<T> {
    /// Extracted value.
    pub value: T,
    /// Confidence score (0.0 - 1.0).
    pub confidence: f32,
    /// Position in source text.
    pub position: Option<(usize, usize)>,
    /// Source text that was matched.
    pub source: String,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, confidence: f32, source: impl Into<String>) -> Self {
        Self {
            value,
            confidence,
            position: None,
            source: source.into(),
        }
    }

    pub fn with_position(mut self, start: usize, end: usize) -> Self {
        self.position = Some((start, end));
        self
    }
}

/// One party as heuristically recovered from its text section.
#[derive(Debug, Clone, Default)]
pub struct ExtractedParty {
    pub name: String,
    pub tax_id: Option<TaxIdentifier>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Address,
}

/// Everything the heuristic pass recovered from a document.
#[derive(Debug, Clone, Default)]
pub struct HeuristicFields {
    pub document_type: DocumentType,
    pub bill_number: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub currency: Option<String>,
    pub total_net: Option<Decimal>,
    pub total_tax: Option<Decimal>,
    pub total_gross: Option<Decimal>,
    /// The seller/issuer section's party.
    pub seller: ExtractedParty,
    /// The buyer/receiver section's party.
    pub buyer: ExtractedParty,
}

/// Rule-based extractor over the whole document.
pub struct HeuristicExtractor {
    validator: TaxIdValidator,
}

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self { validator: TaxIdValidator::new() }
    }

    /// Run every rule extractor against the text.
    pub fn extract(&self, text: &str) -> HeuristicFields {
        let document_type = guess_document_type(text);
        let bill_number = self.extract_bill_number(text);
        let dates = extract_dates(text);
        let amounts = extract_amounts(text);
        let (seller, buyer) = self.extract_parties(text);

        debug!(
            ?document_type,
            bill_number = bill_number.as_deref().unwrap_or(""),
            "heuristic extraction done"
        );

        HeuristicFields {
            document_type,
            bill_number,
            issue_date: dates.issue_date.map(|m| m.value),
            due_date: dates.due_date.map(|m| m.value),
            currency: extract_currency(text),
            total_net: amounts.total_net.map(|m| m.value),
            total_tax: amounts.total_tax.map(|m| m.value),
            total_gross: amounts.total_gross.map(|m| m.value),
            seller,
            buyer,
        }
    }

    /// Bill number: labeled form first, then the Lithuanian "serija" form,
    /// then the longest generic prefix-number candidate.
    pub fn extract_bill_number(&self, text: &str) -> Option<String> {
        if let Some(caps) = BILL_NUMBER.captures(text) {
            let number = caps[1].trim_matches(|c| c == '.' || c == ':').to_string();
            if number.chars().any(|c| c.is_ascii_digit()) {
                return Some(number);
            }
        }

        if let Some(caps) = BILL_NUMBER_SERIJA.captures(text) {
            return Some(caps[1].trim().to_string());
        }

        BILL_NUMBER_GENERIC
            .captures_iter(text)
            .map(|caps| caps[1].trim().to_string())
            .max_by_key(String::len)
    }

    /// Split the text at the seller/buyer section markers and extract each
    /// party from its own region; with no markers, both parties are drawn
    /// from the whole text and the tax-id assignment (first/second hit)
    /// disambiguates them.
    fn extract_parties(&self, text: &str) -> (ExtractedParty, ExtractedParty) {
        let seller_pos = SELLER_SECTION.find(text).map(|m| m.start());
        let buyer_pos = BUYER_SECTION.find(text).map(|m| m.start());

        let (seller_text, buyer_text) = match (seller_pos, buyer_pos) {
            (Some(s), Some(b)) if s < b => (&text[s..b], &text[b..]),
            (Some(s), Some(b)) => (&text[s..], &text[b..s]),
            (Some(s), None) => (&text[s..], ""),
            (None, Some(b)) => ("", &text[b..]),
            (None, None) => (text, text),
        };

        let mut seller = self.extract_party(seller_text);
        let mut buyer = self.extract_party(buyer_text);

        // With no usable sections, assign scanned ids in reading order.
        if seller_text == buyer_text {
            let ids = self.validator.scan_text(text);
            if seller.tax_id.is_none() {
                if let Some(first) = ids.first() {
                    seller.tax_id = Some(first.clone().into_identifier(&first.normalized_id));
                }
            }
            if let Some(second) = ids.get(1) {
                buyer.tax_id = Some(second.clone().into_identifier(&second.normalized_id));
            } else {
                buyer.tax_id = None;
            }
        }

        (seller, buyer)
    }

    fn extract_party(&self, section: &str) -> ExtractedParty {
        if section.is_empty() {
            return ExtractedParty::default();
        }

        let tax_id = self
            .validator
            .scan_text(section)
            .into_iter()
            .next()
            .map(|v| v.clone().into_identifier(&v.normalized_id));

        let email = EMAIL.find(section).map(|m| m.as_str().to_string());
        let phone = PHONE.find(section).map(|m| m.as_str().trim().to_string());

        ExtractedParty {
            name: extract_party_name(section),
            tax_id,
            email,
            phone,
            address: extract_address(section),
        }
    }
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// First plausible name line of a party section.
fn extract_party_name(section: &str) -> String {
    section
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| {
            // Drop an inline section label ("Sprzedawca: ABC Sp. z o.o.").
            match SELLER_SECTION.find(l).or_else(|| BUYER_SECTION.find(l)) {
                Some(m) if m.start() == 0 => l[m.end()..].trim(),
                _ => l,
            }
        })
        .filter(|l| !l.is_empty())
        .find(|l| {
            !l.starts_with("NIP")
                && !l.starts_with("VAT")
                && !l.starts_with("REGON")
                && !EMAIL.is_match(l)
                && l.chars().any(char::is_alphabetic)
        })
        .map(str::to_string)
        .unwrap_or_default()
}

/// Postal-code + street heuristics; falls back to raw lines.
fn extract_address(section: &str) -> Address {
    let mut address = Address::default();

    if let Some(caps) = POSTAL_CODE.captures(section) {
        address.postal_code = Some(format!("{}-{}", &caps[1], &caps[2]));

        let after_postal = &section[caps.get(0).unwrap().end()..];
        let city: String = after_postal
            .trim_start()
            .chars()
            .take_while(|c| c.is_alphabetic() || *c == ' ' || *c == '-')
            .collect();
        let city = city.trim();
        if !city.is_empty() {
            address.city = Some(city.to_string());
        }
    }

    if let Some(m) = STREET.find(section) {
        address.street = Some(m.as_str().trim().to_string());
    }

    if address.street.is_none() && address.city.is_none() {
        let lines: Vec<&str> = section
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .filter(|l| {
                !SELLER_SECTION.is_match(l)
                    && !BUYER_SECTION.is_match(l)
                    && !l.starts_with("NIP")
                    && !EMAIL.is_match(l)
            })
            .skip(1)
            .take(2)
            .collect();
        if !lines.is_empty() {
            address.raw = Some(lines.join(", "));
        }
    }

    address
}

/// Currency from an explicit code or a symbol.
pub fn extract_currency(text: &str) -> Option<String> {
    if let Some(caps) = CURRENCY_CODE.captures(text) {
        return Some(caps[1].to_string());
    }
    if text.contains('€') {
        return Some("EUR".to_string());
    }
    if text.contains('$') {
        return Some("USD".to_string());
    }
    if text.contains("zł") {
        return Some("PLN".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
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

Razem netto: 1 000,00 zł
Kwota VAT: 80,00 zł
Do zapłaty: 1 080,00 zł
";

    #[test]
    fn test_full_heuristic_extraction() {
        let extractor = HeuristicExtractor::new();
        let fields = extractor.extract(INVOICE);

        assert_eq!(fields.document_type, DocumentType::Invoice);
        // The labeled capture stops at the space inside "FV A/3538/2025";
        // the generic pattern recovers the informative part.
        assert_eq!(fields.bill_number.as_deref(), Some("A/3538/2025"));
        assert_eq!(
            fields.issue_date,
            NaiveDate::from_ymd_opt(2025, 8, 16)
        );
        assert_eq!(fields.currency.as_deref(), Some("PLN"));
        assert_eq!(
            fields.total_gross,
            Some("1080.00".parse().unwrap())
        );

        assert_eq!(fields.seller.name, "HIBISPOL Sp. z o.o.");
        assert_eq!(
            fields.seller.tax_id.as_ref().map(|t| t.normalized.as_str()),
            Some("PL9512495127")
        );
        assert_eq!(fields.seller.email.as_deref(), Some("biuro@hibispol.pl"));

        assert_eq!(fields.buyer.name, "Parkentertainment Sp. z o.o.");
        assert_eq!(
            fields.buyer.tax_id.as_ref().map(|t| t.normalized.as_str()),
            Some("PL5272956146")
        );
    }

    #[test]
    fn test_bill_number_forms() {
        let extractor = HeuristicExtractor::new();

        assert_eq!(
            extractor.extract_bill_number("Invoice no: 2025-0042"),
            Some("2025-0042".to_string())
        );
        assert_eq!(
            extractor.extract_bill_number("TR serija Nr.0189 issued today"),
            Some("TR serija Nr.0189".to_string())
        );
        assert_eq!(
            extractor.extract_bill_number("ref FV/123/2025/A attached"),
            Some("FV/123/2025/A".to_string())
        );
        assert_eq!(extractor.extract_bill_number("no numbers here"), None);
    }

    #[test]
    fn test_party_name_skips_labels() {
        let section = "Sprzedawca:\nNIP: 951-249-51-27\nHIBISPOL Sp. z o.o.";
        assert_eq!(extract_party_name(section), "HIBISPOL Sp. z o.o.");
    }

    #[test]
    fn test_address_extraction() {
        let section = "HIBISPOL Sp. z o.o.\nul. Wileńska 87\n03-416 Warszawa";
        let address = extract_address(section);
        assert_eq!(address.street.as_deref(), Some("ul. Wileńska 87"));
        assert_eq!(address.postal_code.as_deref(), Some("03-416"));
        assert_eq!(address.city.as_deref(), Some("Warszawa"));
    }

    #[test]
    fn test_currency_symbols() {
        assert_eq!(extract_currency("Total: 100,00 €"), Some("EUR".to_string()));
        assert_eq!(extract_currency("Total: $100.00"), Some("USD".to_string()));
        assert_eq!(extract_currency("Razem 100,00 zł"), Some("PLN".to_string()));
        assert_eq!(extract_currency("Summe 100,00"), None);
    }
}
