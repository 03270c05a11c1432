//! Document-type detection from header keywords.
//!
//! The type is decided by the top of the document first, since footers often
//! mention "invoice" regardless of what the document is. When both proforma
//! and invoice words appear, proforma wins.

use crate::models::document::DocumentType;

const INVOICE_WORDS: &[&str] = &[
    "invoice", "rechnung", "facture", "fattura", "factura", "faktura", "bill", "retainer",
    "sąskaita",
];
const CONTRACT_WORDS: &[&str] = &["contract", "agreement", "umowa", "vertrag", "kaufvertrag"];
const RECEIPT_WORDS: &[&str] = &["receipt", "paragon", "quittung"];

/// Guess the document type from its text.
pub fn guess_document_type(text: &str) -> DocumentType {
    let lower = text.to_lowercase();
    let top: String = lower.chars().take(300).collect();

    // Header zone has priority.
    if top.contains("proforma") {
        return DocumentType::Proforma;
    }
    if top.contains("credit note") || top.contains("gutschrift") || top.contains("korygująca") {
        return DocumentType::CreditNote;
    }
    if INVOICE_WORDS.iter().any(|w| top.contains(w)) {
        return DocumentType::Invoice;
    }
    if CONTRACT_WORDS.iter().any(|w| top.contains(w)) {
        return DocumentType::Contract;
    }

    // Whole text, proforma still outranking invoice.
    if lower.contains("proforma") {
        return DocumentType::Proforma;
    }
    if lower.contains("credit note") || lower.contains("gutschrift") {
        return DocumentType::CreditNote;
    }
    if INVOICE_WORDS.iter().any(|w| lower.contains(w)) {
        return DocumentType::Invoice;
    }
    if CONTRACT_WORDS.iter().any(|w| lower.contains(w)) {
        return DocumentType::Contract;
    }
    if RECEIPT_WORDS.iter().any(|w| lower.contains(w)) {
        return DocumentType::Receipt;
    }

    DocumentType::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_invoice_detection() {
        assert_eq!(guess_document_type("FAKTURA VAT nr 3538/2025"), DocumentType::Invoice);
        assert_eq!(guess_document_type("Rechnung Nr. 42"), DocumentType::Invoice);
    }

    #[test]
    fn test_proforma_outranks_invoice() {
        assert_eq!(
            guess_document_type("PROFORMA INVOICE no. 17/2025"),
            DocumentType::Proforma
        );
    }

    #[test]
    fn test_header_zone_priority() {
        // "invoice" deep in the body does not outrank a contract header.
        let mut text = String::from("CONTRACT OF SALE\n");
        text.push_str(&" \n".repeat(200));
        text.push_str("payment against invoice");
        assert_eq!(guess_document_type(&text), DocumentType::Contract);
    }

    #[test]
    fn test_unknown() {
        assert_eq!(guess_document_type("weather report"), DocumentType::Unknown);
    }
}
