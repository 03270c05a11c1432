//! Country-aware tax-identifier validation and normalization.
//!
//! Handles VAT/NIP/EIN-style registration numbers: separator stripping,
//! label-prefix removal, country detection from an unprefixed number,
//! per-country format regexes, and checksum validation where a country
//! defines one. The same routine serves both single-candidate validation and
//! free-text scanning for ranked candidates.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A validated/normalized tax identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxIdentifier {
    /// The caller-supplied string, untouched.
    pub raw: String,

    /// Uppercase A-Z0-9, no separators. Carries a country prefix only when
    /// the caller supplied one or detection/backfill added it; a prefix is
    /// never stripped from caller data.
    pub normalized: String,

    /// Detected or declared 2-letter country code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,

    /// Whether format (and checksum, where defined) checks passed.
    pub is_valid: bool,

    /// Weighted confidence (0.0 - 1.0), not a boolean: callers threshold it.
    pub confidence: f32,
}

impl TaxIdentifier {
    /// The identifier without its country prefix, digits and suffix only.
    pub fn bare(&self) -> &str {
        let n = &self.normalized;
        if n.len() > 2 && n.as_bytes()[..2].iter().all(u8::is_ascii_alphabetic) {
            &n[2..]
        } else {
            n
        }
    }
}

/// Outcome of a [`TaxIdValidator::validate`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxIdValidation {
    pub is_valid: bool,
    pub normalized_id: String,
    pub country_code: Option<String>,
    pub confidence: f32,
    pub errors: Vec<ValidationError>,
}

impl TaxIdValidation {
    /// Package the result as a [`TaxIdentifier`] keeping the raw input.
    pub fn into_identifier(self, raw: &str) -> TaxIdentifier {
        TaxIdentifier {
            raw: raw.to_string(),
            normalized: self.normalized_id,
            country_code: self.country_code,
            is_valid: self.is_valid,
            confidence: self.confidence,
        }
    }
}

/// Why a candidate failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Nothing left after normalization.
    Empty,
    /// No country could be determined for the number.
    UnknownCountry,
    /// The number does not match its country's format.
    BadFormat { country: String },
    /// The country-specific checksum failed.
    BadChecksum { country: String },
    /// Declared country disagrees with the detected one.
    CountryMismatch { expected: String, detected: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Empty => write!(f, "empty or invalid input"),
            ValidationError::UnknownCountry => write!(f, "cannot determine country"),
            ValidationError::BadFormat { country } => {
                write!(f, "format invalid for {}", country)
            }
            ValidationError::BadChecksum { country } => {
                write!(f, "{} checksum failed", country)
            }
            ValidationError::CountryMismatch { expected, detected } => {
                write!(f, "country mismatch: expected {}, detected {}", expected, detected)
            }
        }
    }
}

/// Per-country format rule.
struct CountrySpec {
    code: &'static str,
    pattern: &'static str,
    checksum: Option<fn(&str) -> bool>,
}

/// Known country formats. Detection of an unprefixed number walks this table
/// in order and the first match wins, so the order is part of the contract.
const COUNTRY_SPECS: &[CountrySpec] = &[
    CountrySpec { code: "AT", pattern: r"^ATU\d{8}$", checksum: None },
    CountrySpec { code: "BE", pattern: r"^BE0\d{9}$", checksum: None },
    CountrySpec { code: "BG", pattern: r"^BG\d{9,10}$", checksum: None },
    CountrySpec { code: "CY", pattern: r"^CY\d{8}[A-Z]$", checksum: None },
    CountrySpec { code: "CZ", pattern: r"^CZ\d{8,10}$", checksum: None },
    CountrySpec { code: "DE", pattern: r"^DE\d{9}$", checksum: None },
    CountrySpec { code: "DK", pattern: r"^DK\d{8}$", checksum: None },
    CountrySpec { code: "EE", pattern: r"^EE\d{9}$", checksum: None },
    CountrySpec { code: "ES", pattern: r"^ES[A-Z0-9]\d{7}[A-Z0-9]$", checksum: None },
    CountrySpec { code: "FI", pattern: r"^FI\d{8}$", checksum: None },
    CountrySpec { code: "FR", pattern: r"^FR[A-Z0-9]{2}\d{9}$", checksum: None },
    CountrySpec {
        code: "GB",
        pattern: r"^GB\d{9}$|^GB\d{12}$|^GBGD\d{3}$|^GBHA\d{3}$",
        checksum: None,
    },
    CountrySpec { code: "GR", pattern: r"^GR\d{9}$", checksum: None },
    CountrySpec { code: "HR", pattern: r"^HR\d{11}$", checksum: None },
    CountrySpec { code: "HU", pattern: r"^HU\d{8}$", checksum: None },
    CountrySpec { code: "IE", pattern: r"^IE\d[A-Z0-9]\d{5}[A-Z]$", checksum: None },
    CountrySpec { code: "IT", pattern: r"^IT\d{11}$", checksum: None },
    CountrySpec { code: "LT", pattern: r"^LT\d{9}$|^LT\d{12}$", checksum: None },
    CountrySpec { code: "LU", pattern: r"^LU\d{8}$", checksum: None },
    CountrySpec { code: "LV", pattern: r"^LV\d{11}$", checksum: None },
    CountrySpec { code: "MT", pattern: r"^MT\d{8}$", checksum: None },
    CountrySpec { code: "NL", pattern: r"^NL\d{9}B\d{2}$", checksum: None },
    CountrySpec { code: "PL", pattern: r"^PL\d{10}$", checksum: Some(validate_nip_checksum) },
    CountrySpec { code: "PT", pattern: r"^PT\d{9}$", checksum: None },
    CountrySpec { code: "RO", pattern: r"^RO\d{2,10}$", checksum: None },
    CountrySpec { code: "SE", pattern: r"^SE\d{12}$", checksum: None },
    CountrySpec { code: "SI", pattern: r"^SI\d{8}$", checksum: None },
    CountrySpec { code: "SK", pattern: r"^SK\d{10}$", checksum: None },
    // Non-EU
    CountrySpec { code: "US", pattern: r"^US\d{9}$", checksum: None },
    CountrySpec { code: "CH", pattern: r"^CHE\d{9}$", checksum: None },
    CountrySpec { code: "NO", pattern: r"^NO\d{9}$", checksum: None },
    CountrySpec { code: "IS", pattern: r"^IS\d{5,6}$", checksum: None },
];

/// Alternative codes some registries use.
const COUNTRY_ALIASES: &[(&str, &str)] = &[("EL", "GR"), ("UK", "GB")];

/// Label prefixes that precede tax ids in documents but are not part of them.
const LABEL_PREFIXES: &[&str] = &[
    "VATNUMBER", "VATNR", "VATID", "VAT", "BTWNR", "BTW", "USTID", "NIP", "EIN", "TAXID", "MVA",
];

lazy_static! {
    static ref SPEC_REGEXES: Vec<Regex> = COUNTRY_SPECS
        .iter()
        .map(|s| Regex::new(s.pattern).expect("country pattern"))
        .collect();

    // Candidates in free text: labeled, EU-prefixed, or US EIN with a dash.
    static ref SCAN_LABELED: Regex = Regex::new(
        r"(?i)\b(?:VAT|NIP|EIN|BTW|MOMS|MVA|TAX\s*ID|UST-?ID)\s*(?:NO\.?|NR\.?)?\s*[:#]?\s*([A-Z]{0,3}\d[\d \-\.]{5,16}\d[A-Z0-9]{0,3})"
    ).unwrap();
    static ref SCAN_PREFIXED: Regex = Regex::new(r"\b([A-Z]{2}\d{8,12}[A-Z0-9]{0,3})\b").unwrap();
    static ref SCAN_EIN: Regex = Regex::new(r"\b(\d{2}-\d{7})\b").unwrap();
}

/// Validate a Polish NIP using the weighted mod-11 checksum.
///
/// 10 digits; weights 6,5,7,2,3,4,5,6,7 over the first nine; a remainder of
/// 10 means the number is invalid.
pub fn validate_nip_checksum(bare: &str) -> bool {
    let digits: Vec<u32> = bare.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 10 {
        return false;
    }

    let weights = [6, 5, 7, 2, 3, 4, 5, 6, 7];
    let sum: u32 = digits
        .iter()
        .take(9)
        .zip(weights.iter())
        .map(|(d, w)| d * w)
        .sum();

    let checksum = sum % 11;
    if checksum == 10 {
        return false;
    }

    checksum == digits[9]
}

/// Country-aware tax identifier validator.
pub struct TaxIdValidator {
    validate_checksums: bool,
    scan_threshold: f32,
}

impl TaxIdValidator {
    pub fn new() -> Self {
        Self {
            validate_checksums: true,
            scan_threshold: 0.3,
        }
    }

    /// Disable checksum validation (useful on heavily degraded OCR text).
    pub fn with_checksums(mut self, validate: bool) -> Self {
        self.validate_checksums = validate;
        self
    }

    /// Minimum confidence for free-text scan candidates.
    pub fn with_scan_threshold(mut self, threshold: f32) -> Self {
        self.scan_threshold = threshold;
        self
    }

    /// Validate and normalize a candidate tax identifier.
    ///
    /// When `expected_country` is given and disagrees with the detected
    /// country, the result is invalid with a country-mismatch error rather
    /// than silently overridden.
    pub fn validate(&self, candidate: &str, expected_country: Option<&str>) -> TaxIdValidation {
        let normalized = normalize(candidate);
        if normalized.is_empty() {
            return TaxIdValidation {
                is_valid: false,
                normalized_id: String::new(),
                country_code: None,
                confidence: 0.0,
                errors: vec![ValidationError::Empty],
            };
        }

        let detected = self.detect_country(&normalized);

        let mut errors = Vec::new();
        let mut format_valid = false;
        let mut normalized_id = normalized.clone();

        match &detected {
            Some(country) => {
                let has_alpha_prefix = normalized_id.len() >= 2
                    && normalized_id.as_bytes()[..2].iter().all(u8::is_ascii_alphabetic);

                // The detection step may add the prefix; a caller-supplied
                // prefix (canonical or alias) is never removed.
                let check_form = if !has_alpha_prefix {
                    normalized_id = format!("{}{}", country, normalized_id);
                    normalized_id.clone()
                } else if normalized_id.starts_with(country.as_str()) {
                    normalized_id.clone()
                } else {
                    // Alias prefix (EL/UK): match against the canonical form.
                    format!("{}{}", country, &normalized_id[2..])
                };

                match spec_index(country) {
                    Some(idx) => {
                        format_valid = SPEC_REGEXES[idx].is_match(&check_form);
                        if !format_valid {
                            errors.push(ValidationError::BadFormat { country: country.clone() });
                        } else if self.validate_checksums {
                            if let Some(check) = COUNTRY_SPECS[idx].checksum {
                                if !check(&check_form[2..]) {
                                    format_valid = false;
                                    errors.push(ValidationError::BadChecksum {
                                        country: country.clone(),
                                    });
                                }
                            }
                        }
                    }
                    None => {
                        errors.push(ValidationError::BadFormat { country: country.clone() });
                    }
                }
            }
            None => errors.push(ValidationError::UnknownCountry),
        }

        let mut country_match = true;
        if let (Some(expected), Some(found)) = (expected_country, &detected) {
            let expected = resolve_alias(&expected.to_uppercase());
            if expected != *found {
                country_match = false;
                errors.push(ValidationError::CountryMismatch {
                    expected,
                    detected: found.clone(),
                });
            }
        }

        let confidence = confidence_score(format_valid, country_match, &normalized_id, &detected);

        TaxIdValidation {
            is_valid: format_valid && country_match,
            normalized_id,
            country_code: detected,
            confidence,
            errors,
        }
    }

    /// Validate a candidate whose country is already declared, prepending the
    /// prefix when the candidate carries none.
    pub fn validate_with_country(&self, candidate: &str, country: &str) -> TaxIdValidation {
        let normalized = normalize(candidate);
        let country = resolve_alias(&country.to_uppercase());

        let has_prefix = normalized.len() >= 2
            && normalized.as_bytes()[..2].iter().all(u8::is_ascii_alphabetic);
        let prefixed = if has_prefix {
            normalized
        } else {
            format!("{}{}", country, normalized)
        };

        self.validate(&prefixed, Some(&country))
    }

    /// Detect the country of a normalized identifier.
    ///
    /// An explicit alphabetic two-letter prefix wins; otherwise every known
    /// country's format is tried with that country's prefix prepended, in
    /// table order, and the first match wins.
    pub fn detect_country(&self, normalized: &str) -> Option<String> {
        if normalized.len() < 2 {
            return None;
        }

        let prefix = &normalized[..2];
        if prefix.bytes().all(|b| b.is_ascii_alphabetic()) {
            let resolved = resolve_alias(prefix);
            if spec_index(&resolved).is_some() {
                return Some(resolved);
            }
            // CHE... carries a three-letter prefix.
            if normalized.starts_with("CHE") {
                return Some("CH".to_string());
            }
            return None;
        }

        // Countries with a checksum are tried first: a passing checksum is
        // far stronger evidence than a bare length match.
        for (idx, spec) in COUNTRY_SPECS.iter().enumerate() {
            let Some(check) = spec.checksum else { continue };
            let test = format!("{}{}", spec.code, normalized);
            if SPEC_REGEXES[idx].is_match(&test)
                && (!self.validate_checksums || check(normalized))
            {
                return Some(spec.code.to_string());
            }
        }

        for (idx, spec) in COUNTRY_SPECS.iter().enumerate() {
            if spec.checksum.is_some() {
                continue;
            }
            let test = format!("{}{}", spec.code, normalized);
            if SPEC_REGEXES[idx].is_match(&test) {
                return Some(spec.code.to_string());
            }
        }

        None
    }

    /// Add a country prefix to an unprefixed identifier.
    pub fn add_country_prefix(&self, candidate: &str, country: Option<&str>) -> String {
        let normalized = normalize(candidate);
        if normalized.is_empty() {
            return candidate.to_string();
        }

        if normalized.len() >= 2 && normalized.as_bytes()[..2].iter().all(u8::is_ascii_alphabetic)
        {
            return normalized;
        }

        if let Some(country) = country {
            let code = resolve_alias(&country.to_uppercase());
            return format!("{}{}", code, normalized);
        }

        match self.detect_country(&normalized) {
            Some(code) => format!("{}{}", code, normalized),
            None => normalized,
        }
    }

    /// Scan free text for tax-id candidates, ranked by confidence.
    ///
    /// Used when upstream extraction produced no identifier but the raw text
    /// may still carry one. Only candidates above the scan threshold are
    /// returned.
    pub fn scan_text(&self, text: &str) -> Vec<TaxIdValidation> {
        if text.is_empty() {
            return Vec::new();
        }

        let upper = text.to_uppercase();
        let mut seen = std::collections::HashSet::new();
        let mut results = Vec::new();

        let mut consider = |candidate: &str, results: &mut Vec<TaxIdValidation>| {
            let normalized = normalize(candidate);
            if normalized.len() < 8 || !seen.insert(normalized) {
                return;
            }
            let validation = self.validate(candidate, None);
            if validation.confidence > self.scan_threshold {
                results.push(validation);
            }
        };

        for caps in SCAN_LABELED.captures_iter(&upper) {
            consider(&caps[1], &mut results);
        }
        for caps in SCAN_PREFIXED.captures_iter(&upper) {
            consider(&caps[1], &mut results);
        }
        for caps in SCAN_EIN.captures_iter(&upper) {
            consider(&caps[1], &mut results);
        }

        results.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        debug!("tax-id scan found {} candidates", results.len());
        results
    }
}

impl Default for TaxIdValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip separators, uppercase, and drop label prefixes (VAT/NIP/EIN/...).
pub fn normalize(input: &str) -> String {
    let mut normalized: String = input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    for prefix in LABEL_PREFIXES {
        if normalized.starts_with(prefix) && normalized.len() > prefix.len() {
            normalized = normalized[prefix.len()..].to_string();
            break;
        }
    }

    normalized
}

/// Map a country name (in the handful of spellings documents use) to its
/// 2-letter code.
pub fn country_code_for_name(name: &str) -> Option<&'static str> {
    let name = name.trim().to_lowercase();
    let code = match name.as_str() {
        "poland" | "polska" | "pl" => "PL",
        "germany" | "deutschland" | "de" => "DE",
        "estonia" | "eesti" | "ee" => "EE",
        "sweden" | "sverige" | "se" => "SE",
        "france" | "fr" => "FR",
        "spain" | "españa" | "es" => "ES",
        "italy" | "italia" | "it" => "IT",
        "netherlands" | "nederland" | "nl" => "NL",
        "united kingdom" | "uk" | "gb" => "GB",
        "czech republic" | "czechia" | "cz" => "CZ",
        "hungary" | "magyarország" | "hu" => "HU",
        "austria" | "österreich" | "at" => "AT",
        "belgium" | "belgië" | "be" => "BE",
        "latvia" | "latvija" | "lv" => "LV",
        "lithuania" | "lietuva" | "lt" => "LT",
        "greece" | "gr" | "el" => "GR",
        "united states" | "usa" | "us" => "US",
        _ => return None,
    };
    Some(code)
}

/// Map a 2-letter code back to the country name used in documents.
pub fn country_name_for_code(code: &str) -> Option<&'static str> {
    let name = match code.to_uppercase().as_str() {
        "PL" => "Poland",
        "DE" => "Germany",
        "EE" => "Estonia",
        "SE" => "Sweden",
        "FR" => "France",
        "ES" => "Spain",
        "IT" => "Italy",
        "NL" => "Netherlands",
        "GB" | "UK" => "United Kingdom",
        "CZ" => "Czech Republic",
        "HU" => "Hungary",
        "AT" => "Austria",
        "BE" => "Belgium",
        "LV" => "Latvia",
        "LT" => "Lithuania",
        "GR" | "EL" => "Greece",
        "US" => "United States",
        _ => return None,
    };
    Some(name)
}

fn spec_index(code: &str) -> Option<usize> {
    COUNTRY_SPECS.iter().position(|s| s.code == code)
}

fn resolve_alias(code: &str) -> String {
    COUNTRY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == code)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| code.to_string())
}

/// Weighted sum of format match, country match, known country, and length
/// plausibility. Callers threshold it (≈0.3 for free-text candidates).
fn confidence_score(
    format_valid: bool,
    country_match: bool,
    normalized: &str,
    country: &Option<String>,
) -> f32 {
    let mut score: f32 = 0.0;

    if format_valid {
        score += 0.6;
    }
    if country_match {
        score += 0.2;
    }
    if country.as_deref().map(|c| spec_index(c).is_some()).unwrap_or(false) {
        score += 0.1;
    }
    if normalized.len() >= 8 {
        score += 0.1;
    }

    score.min(1.0)
}
