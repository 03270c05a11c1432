//! Supplier-country backfill from indirect signals.
//!
//! When the extracted supplier has no country, it is inferred from — in
//! priority order — the tax-id prefix, the bare tax-id format, address city
//! keywords, and language-keyword density, with a currency-agreement boost.
//! Only a guess above the configured threshold is applied; otherwise the
//! country stays blank rather than guessed.

use tracing::info;

use crate::models::document::Company;
use crate::taxid::{self, TaxIdValidator};

/// One applied country inference.
#[derive(Debug, Clone, PartialEq)]
pub struct CountrySignal {
    pub country: String,
    pub confidence: f32,
    pub source: &'static str,
}

/// City keywords mapped to countries.
const CITY_COUNTRIES: &[(&str, &str)] = &[
    ("warszawa", "Poland"), ("kraków", "Poland"), ("gdansk", "Poland"),
    ("wrocław", "Poland"), ("łódź", "Poland"), ("poznań", "Poland"), ("łochów", "Poland"),
    ("berlin", "Germany"), ("münchen", "Germany"), ("hamburg", "Germany"),
    ("köln", "Germany"), ("frankfurt", "Germany"), ("stuttgart", "Germany"),
    ("düsseldorf", "Germany"),
    ("stockholm", "Sweden"), ("göteborg", "Sweden"), ("malmö", "Sweden"),
    ("uppsala", "Sweden"), ("södertälje", "Sweden"), ("växjö", "Sweden"),
    ("tallinn", "Estonia"), ("tartu", "Estonia"), ("narva", "Estonia"), ("pärnu", "Estonia"),
    ("vilnius", "Lithuania"), ("kaunas", "Lithuania"),
    ("paris", "France"), ("rome", "Italy"), ("madrid", "Spain"),
    ("amsterdam", "Netherlands"), ("brussels", "Belgium"), ("vienna", "Austria"),
    ("prague", "Czech Republic"),
];

/// Language keyword sets per country; two hits are the entry bar.
const LANGUAGE_KEYWORDS: &[(&str, &[&str])] = &[
    ("Poland", &["sprzedawca", "nabywca", "faktura", "nip:", "zł", "pln", "warszawa", "ul.", "do zapłaty"]),
    ("Germany", &["rechnung", "lieferant", "kunde", "ustid", "ust-id", "mwst", "deutschland"]),
    ("Sweden", &["försäljare", "köpare", "org.nr", "organisationsnummer", "sverige", "sek"]),
    ("Estonia", &["müüja", "ostja", "arve", "kmkr", "eesti", "tallinn"]),
    ("Lithuania", &["pardavėjas", "pirkėjas", "sąskaita", "serija", "lietuva"]),
    ("France", &["vendeur", "acheteur", "facture", "n° tva", "france"]),
    ("Italy", &["venditore", "acquirente", "fattura", "p.iva", "italia"]),
];

/// Currencies that corroborate a country guess.
const CURRENCY_COUNTRIES: &[(&str, &[&str])] = &[
    ("PLN", &["Poland"]),
    ("SEK", &["Sweden"]),
    (
        "EUR",
        &["Germany", "France", "Italy", "Spain", "Netherlands", "Belgium", "Austria", "Estonia", "Lithuania"],
    ),
];

/// Infer and apply the supplier country when it is missing.
///
/// A supplier that already has a country only gets its tax-id prefix
/// backfilled. Returns the applied signal, if any.
pub fn backfill_country(
    supplier: &mut Company,
    raw_text: &str,
    currency: Option<&str>,
    validator: &TaxIdValidator,
    min_confidence: f32,
) -> Option<CountrySignal> {
    if let Some(existing) = supplier.country.clone().filter(|c| !c.trim().is_empty()) {
        apply_prefix(supplier, &existing, validator);
        return None;
    }

    let signal = infer_country(supplier, raw_text, currency)?;
    if signal.confidence < min_confidence {
        info!(
            "country guess {} ({:.2}) below threshold, leaving blank",
            signal.country, signal.confidence
        );
        return None;
    }

    info!(
        "supplier country backfilled: {} ({:.2}, {})",
        signal.country, signal.confidence, signal.source
    );
    supplier.country = Some(signal.country.clone());
    apply_prefix(supplier, &signal.country, validator);
    Some(signal)
}

/// Signal evaluation, in priority order.
fn infer_country(supplier: &Company, raw_text: &str, currency: Option<&str>) -> Option<CountrySignal> {
    let mut detected: Option<CountrySignal> = None;

    // 1. Tax-id prefix, or bare-format inference.
    if let Some(tax) = supplier.tax_id_normalized() {
        let clean = taxid::normalize(tax);
        if clean.len() >= 2 && clean.as_bytes()[..2].iter().all(u8::is_ascii_alphabetic) {
            if let Some(country) = taxid::country_name_for_code(&clean[..2]) {
                detected = Some(CountrySignal {
                    country: country.to_string(),
                    confidence: 0.9,
                    source: "tax-id prefix",
                });
            }
        } else if clean.len() == 10 && clean.bytes().all(|b| b.is_ascii_digit()) {
            detected = Some(CountrySignal {
                country: "Poland".to_string(),
                confidence: 0.8,
                source: "tax-id format",
            });
        } else if clean.len() == 12 && clean.ends_with("01") {
            detected = Some(CountrySignal {
                country: "Sweden".to_string(),
                confidence: 0.85,
                source: "tax-id format",
            });
        } else if clean.len() == 9
            && clean.bytes().all(|b| b.is_ascii_digit())
            && currency == Some("EUR")
        {
            detected = Some(CountrySignal {
                country: "Germany".to_string(),
                confidence: 0.6,
                source: "tax-id format",
            });
        }
    }

    // 2. Address city keywords.
    let address = supplier.address.format().to_lowercase();
    if !address.is_empty() {
        for (city, country) in CITY_COUNTRIES {
            if address.contains(city) {
                match &mut detected {
                    None => {
                        detected = Some(CountrySignal {
                            country: country.to_string(),
                            confidence: 0.75,
                            source: "address city",
                        });
                    }
                    Some(signal) if signal.country == *country => {
                        signal.confidence = signal.confidence.max(0.85);
                    }
                    Some(_) => {}
                }
                break;
            }
        }
    }

    // 3. Language-keyword density.
    if detected.as_ref().map(|s| s.confidence < 0.7).unwrap_or(true) {
        let lower = raw_text.to_lowercase();
        for (country, keywords) in LANGUAGE_KEYWORDS {
            let matches = keywords.iter().filter(|k| lower.contains(*k)).count();
            if matches >= 2 {
                match &mut detected {
                    None => {
                        detected = Some(CountrySignal {
                            country: country.to_string(),
                            confidence: 0.5 + matches as f32 * 0.1,
                            source: "language keywords",
                        });
                    }
                    Some(signal) if signal.country == *country => {
                        signal.confidence =
                            signal.confidence.max(0.7 + matches as f32 * 0.05);
                    }
                    Some(_) => {}
                }
                break;
            }
        }
    }

    // 4. Currency agreement boost.
    if let (Some(signal), Some(currency)) = (&mut detected, currency) {
        let agrees = CURRENCY_COUNTRIES
            .iter()
            .find(|(code, _)| *code == currency)
            .is_some_and(|(_, countries)| countries.contains(&signal.country.as_str()));
        if agrees {
            signal.confidence = (signal.confidence + 0.1).min(0.95);
        }
    }

    detected
}

/// Ensure the supplier's tax id carries its country prefix.
fn apply_prefix(supplier: &mut Company, country: &str, validator: &TaxIdValidator) {
    let Some(code) = taxid::country_code_for_name(country) else { return };
    let Some(tax) = supplier.tax_id.as_mut() else { return };

    let prefixed = validator.add_country_prefix(&tax.normalized, Some(code));
    if prefixed != tax.normalized {
        let validation = validator.validate(&prefixed, None);
        tax.normalized = validation.normalized_id;
        tax.country_code = validation.country_code;
        tax.is_valid = validation.is_valid;
        tax.confidence = validation.confidence;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::Address;
    use crate::taxid::TaxIdentifier;
    use pretty_assertions::assert_eq;

    fn supplier_with_tax(raw: &str, normalized: &str) -> Company {
        Company {
            name: "Supplier".to_string(),
            tax_id: Some(TaxIdentifier {
                raw: raw.to_string(),
                normalized: normalized.to_string(),
                country_code: None,
                is_valid: false,
                confidence: 0.0,
            }),
            ..Company::default()
        }
    }

    #[test]
    fn test_prefix_signal_dominates() {
        let mut supplier = supplier_with_tax("EE102288270", "EE102288270");
        let signal =
            backfill_country(&mut supplier, "", None, &TaxIdValidator::new(), 0.6).unwrap();

        assert_eq!(signal.country, "Estonia");
        assert_eq!(signal.source, "tax-id prefix");
        assert_eq!(supplier.country.as_deref(), Some("Estonia"));
    }

    #[test]
    fn test_bare_nip_format_infers_poland() {
        let mut supplier = supplier_with_tax("5272956146", "5272956146");
        let signal =
            backfill_country(&mut supplier, "", None, &TaxIdValidator::new(), 0.6).unwrap();

        assert_eq!(signal.country, "Poland");
        // Prefix added alongside the country.
        assert_eq!(
            supplier.tax_id.as_ref().map(|t| t.normalized.as_str()),
            Some("PL5272956146")
        );
        assert!(supplier.tax_id.as_ref().unwrap().is_valid);
    }

    #[test]
    fn test_city_keyword() {
        let mut supplier = Company {
            address: Address { city: Some("Warszawa".to_string()), ..Address::default() },
            ..Company::default()
        };
        let signal =
            backfill_country(&mut supplier, "", None, &TaxIdValidator::new(), 0.6).unwrap();

        assert_eq!(signal.country, "Poland");
        assert_eq!(signal.source, "address city");
    }

    #[test]
    fn test_language_keywords_with_currency_boost() {
        let mut supplier = Company::default();
        let text = "Sprzedawca: X\nNabywca: Y\nFaktura VAT\ndo zapłaty: 100 zł";
        let signal =
            backfill_country(&mut supplier, text, Some("PLN"), &TaxIdValidator::new(), 0.6)
                .unwrap();

        assert_eq!(signal.country, "Poland");
        assert!(signal.confidence > 0.8);
    }

    #[test]
    fn test_below_threshold_stays_blank() {
        let mut supplier = Company::default();
        // One weak signal only: a 9-digit id with EUR.
        let mut weak = supplier_with_tax("102288270", "102288270");
        let signal =
            backfill_country(&mut weak, "", Some("EUR"), &TaxIdValidator::new(), 0.75);
        assert!(signal.is_none());
        assert!(weak.country.is_none());

        // No signals at all.
        let signal = backfill_country(&mut supplier, "", None, &TaxIdValidator::new(), 0.6);
        assert!(signal.is_none());
    }

    #[test]
    fn test_existing_country_only_prefixes() {
        let mut supplier = supplier_with_tax("5272956146", "5272956146");
        supplier.country = Some("Poland".to_string());

        let signal =
            backfill_country(&mut supplier, "", None, &TaxIdValidator::new(), 0.6);
        assert!(signal.is_none());
        assert_eq!(
            supplier.tax_id.as_ref().map(|t| t.normalized.as_str()),
            Some("PL5272956146")
        );
    }
}
