//! Common regex patterns for heuristic document-field extraction.
//!
//! Documents arrive in several languages (Polish, English, German, Lithuanian
//! and friends), so the label alternations are deliberately broad.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Amount patterns: both "1 234,56" and "1,234.56" conventions.
    pub static ref AMOUNT_PATTERN: Regex = Regex::new(
        r"(\d{1,3}(?:[\s\u{00a0},.]?\d{3})*)[,.](\d{2})\b"
    ).unwrap();

    // Total amounts by label.
    pub static ref TOTAL_GROSS: Regex = Regex::new(
        r"(?i)\b(?:razem|suma|do\s+zap[łl]aty|warto[śs][ćc]\s+brutto|kwota\s+brutto|total\s+amount|amount\s+due|total\s+due|gesamtbetrag|grand\s+total|total)[\s:]*(\d{1,3}(?:[\s\u{00a0},.]?\d{3})*[,.]\d{2})"
    ).unwrap();

    pub static ref TOTAL_NET: Regex = Regex::new(
        r"(?i)\b(?:razem\s+netto|warto[śs][ćc]\s+netto|netto|net\s+amount|net\s+total|subtotal|zwischensumme)[\s:]*(\d{1,3}(?:[\s\u{00a0},.]?\d{3})*[,.]\d{2})"
    ).unwrap();

    pub static ref TOTAL_TAX: Regex = Regex::new(
        r"(?i)\b(?:kwota\s+VAT|razem\s+VAT|VAT|podatek|tax\s+amount|mwst|ust)[\s:%\d]*[\s:]*(\d{1,3}(?:[\s\u{00a0},.]?\d{3})*[,.]\d{2})"
    ).unwrap();

    // Date patterns.
    pub static ref DATE_DMY: Regex = Regex::new(
        r"\b(\d{1,2})[./\-](\d{1,2})[./\-](\d{4}|\d{2})\b"
    ).unwrap();

    pub static ref DATE_YMD: Regex = Regex::new(
        r"\b(\d{4})[./\-](\d{1,2})[./\-](\d{1,2})\b"
    ).unwrap();

    pub static ref DATE_MONTH_NAME: Regex = Regex::new(
        r"\b([A-Za-z]{3,9})\s+(\d{1,2}),?\s+(\d{4})\b"
    ).unwrap();

    // Labeled dates.
    pub static ref ISSUE_DATE: Regex = Regex::new(
        r"(?i)(?:data\s+wystawienia|date\s+of\s+issue|issue\s+date|invoice\s+date|rechnungsdatum|document\s+date)[\s:\-]*(.+?)(?:\n|$)"
    ).unwrap();

    pub static ref DUE_DATE: Regex = Regex::new(
        r"(?i)(?:termin\s+p[łl]atno[śs]ci|due\s+date|date\s+due|payment\s+due|payable\s+(?:by|until)|zahlbar\s+bis)[\s:\-]*(.+?)(?:\n|$)"
    ).unwrap();

    // Bill/invoice numbers.
    pub static ref BILL_NUMBER: Regex = Regex::new(
        r"(?i)(?:faktura\s+(?:VAT\s+)?(?:nr|numer)|invoice\s+(?:no|nr|number|#)|rechnung(?:s-?nr)?|proforma\s+(?:no|nr|number)?|bill\s+(?:no|number))\.?[\s:#]*([A-Za-z0-9/\-_.]+)"
    ).unwrap();

    // Lithuanian "TR serija Nr.0189" style numbers.
    pub static ref BILL_NUMBER_SERIJA: Regex = Regex::new(
        r"\b([A-Z]{1,5}\s*serija\s*Nr\.?\s*\d{1,8})\b"
    ).unwrap();

    pub static ref BILL_NUMBER_GENERIC: Regex = Regex::new(
        r"\b([A-Z]{1,5}[/\-]\d{1,6}(?:[/\-][\dA-Z]{1,6}){0,2})\b"
    ).unwrap();

    // Party sections.
    pub static ref SELLER_SECTION: Regex = Regex::new(
        r"(?i)(?:sprzedawca|wystawca|dostawca|seller|supplier|vendor|issuer|verk[äa]ufer|lieferant)[\s:]*"
    ).unwrap();

    pub static ref BUYER_SECTION: Regex = Regex::new(
        r"(?i)(?:nabywca|kupuj[ąa]cy|odbiorca|zamawiaj[ąa]cy|buyer|customer|bill\s+to|client|kunde|k[äa]ufer)[\s:]*"
    ).unwrap();

    // Contact details.
    pub static ref EMAIL: Regex = Regex::new(
        r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}"
    ).unwrap();

    pub static ref PHONE: Regex = Regex::new(
        r"(?:\+\d{1,3}[\s\-]?)?(?:\d{3}[\s\-]?\d{3}[\s\-]?\d{3}|\d{2}[\s\-]?\d{3}[\s\-]?\d{2}[\s\-]?\d{2})"
    ).unwrap();

    // Polish postal code.
    pub static ref POSTAL_CODE: Regex = Regex::new(
        r"\b(\d{2})-(\d{3})\b"
    ).unwrap();

    // Street line.
    pub static ref STREET: Regex = Regex::new(
        r"(?i)(?:ul\.|al\.|pl\.|str\.|strasse|street)\s*[^\n,]+"
    ).unwrap();

    // Currency.
    pub static ref CURRENCY_CODE: Regex = Regex::new(
        r"\b(EUR|USD|PLN|GBP|SEK|CHF|CZK)\b"
    ).unwrap();
}
