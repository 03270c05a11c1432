//! Legal-entity name normalization and identity matching.
//!
//! Decides whether a named/identified company is the same legal entity as a
//! reference company. The priority order is a business rule, not a style
//! choice: an exact tax-id match is final regardless of name similarity, and
//! a present-but-different tax id is never overruled by a similar name.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use crate::models::config::OurCompany;
use crate::models::document::Company;
use crate::taxid::{self, TaxIdValidator};

/// Diacritic foldings seen in supplier names, Polish set included.
const DIACRITICS: &[(char, &str)] = &[
    ('ü', "u"), ('ö', "o"), ('ä', "a"), ('ß', "ss"),
    ('ç', "c"), ('ñ', "n"),
    ('é', "e"), ('è', "e"), ('ê', "e"), ('ë', "e"),
    ('à', "a"), ('á', "a"), ('â', "a"), ('ã', "a"), ('å', "a"),
    ('ì', "i"), ('í', "i"), ('î', "i"), ('ï', "i"),
    ('ò', "o"), ('ó', "o"), ('ô', "o"), ('õ', "o"), ('ø', "o"),
    ('ù', "u"), ('ú', "u"), ('û', "u"),
    ('ý', "y"), ('ÿ', "y"),
    ('ł', "l"), ('ą', "a"), ('ć', "c"), ('ę', "e"), ('ń', "n"),
    ('ś', "s"), ('ź', "z"), ('ż', "z"),
];

/// Legal-form spellings collapsed to one token. Longest variants first so
/// "spółka z ograniczoną odpowiedzialnością" never leaves a partial behind.
const LEGAL_FORMS: &[(&str, &str)] = &[
    ("spolka z ograniczona odpowiedzialnoscia", "spzoo"),
    ("gesellschaft mit beschrankter haftung", "gmbh"),
    ("spolka z o.o.", "spzoo"),
    ("sp. z o.o.", "spzoo"),
    ("sp.z o.o.", "spzoo"),
    ("sp z o.o.", "spzoo"),
    ("sp z o o", "spzoo"),
    ("sp. z o. o.", "spzoo"),
    ("incorporated", "inc"),
    ("corporation", "corp"),
    ("limited", "ltd"),
    ("o.u.", "ou"),
];

lazy_static! {
    static ref PUNCT: Regex = Regex::new(r"[^\w\s]").unwrap();
    static ref MULTISPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Normalize a legal-entity name to its canonical comparison form.
///
/// Folds diacritics, collapses legal-form variants, strips punctuation,
/// lowercases, and squeezes whitespace.
pub fn normalize_company_name(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut name = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        match DIACRITICS.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => name.push_str(to),
            None => name.push(c),
        }
    }

    for (variant, canonical) in LEGAL_FORMS {
        if name.contains(variant) {
            name = name.replace(variant, canonical);
        }
    }

    let name = PUNCT.replace_all(&name, "");
    let name = MULTISPACE.replace_all(name.trim(), " ");
    name.into_owned()
}

/// How a candidate matched a reference company.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Normalized tax ids are equal. Final; name similarity is irrelevant.
    TaxIdExact,
    /// Canonical names are equal (no tax id on the candidate).
    NameExact,
    /// One canonical name contains the other.
    NameContains,
    /// At least half of the candidate's name tokens appear in the reference.
    NameTokenOverlap,
}

impl MatchKind {
    /// Confidence attributed to this match tier.
    pub fn confidence(&self) -> f32 {
        match self {
            MatchKind::TaxIdExact => 1.0,
            MatchKind::NameExact => 0.9,
            MatchKind::NameContains => 0.75,
            MatchKind::NameTokenOverlap => 0.7,
        }
    }
}

/// Result of resolving a document's parties against our companies.
#[derive(Debug, Clone)]
pub struct OwnershipResolution {
    /// Index into the reference set of the entity this document belongs to.
    pub our_company: Option<usize>,
    /// The extracted supplier and our-company roles were swapped.
    pub swapped: bool,
    /// Neither party (nor the raw text) resolved to one of our entities.
    pub skip: bool,
    /// Explanation when `skip` is set.
    pub skip_reason: Option<String>,
}

/// Matches candidate companies against the injected "our companies" set.
pub struct CompanyMatcher {
    companies: Vec<OurCompany>,
    normalized_names: Vec<String>,
    normalized_ids: Vec<String>,
    validator: TaxIdValidator,
}

impl CompanyMatcher {
    /// Build a matcher over an explicit reference set.
    pub fn new(companies: Vec<OurCompany>) -> Self {
        let normalized_names = companies
            .iter()
            .map(|c| normalize_company_name(&c.name))
            .collect();
        let normalized_ids = companies
            .iter()
            .map(|c| taxid::normalize(&c.tax_id))
            .collect();
        Self {
            companies,
            normalized_names,
            normalized_ids,
            validator: TaxIdValidator::new(),
        }
    }

    /// The injected reference set.
    pub fn our_companies(&self) -> &[OurCompany] {
        &self.companies
    }

    /// Score a candidate against one reference company.
    ///
    /// Priority: (1) tax-id exact match is authoritative; (2) name
    /// comparison applies only when the candidate carries no tax id; (3) a
    /// present-but-different tax id always loses, however similar the names.
    pub fn match_against(
        &self,
        candidate_name: &str,
        candidate_tax_id: Option<&str>,
        reference_name: &str,
        reference_tax_id: Option<&str>,
    ) -> Option<MatchKind> {
        if let Some(candidate_id) = candidate_tax_id.filter(|s| !s.trim().is_empty()) {
            let reference_id = reference_tax_id.filter(|s| !s.trim().is_empty())?;
            if tax_ids_equal(candidate_id, reference_id) {
                return Some(MatchKind::TaxIdExact);
            }
            // A conflicting id is never rescued by the name.
            return None;
        }

        let candidate = normalize_company_name(candidate_name);
        let reference = normalize_company_name(reference_name);
        if candidate.is_empty() || reference.is_empty() {
            return None;
        }

        if candidate == reference {
            return Some(MatchKind::NameExact);
        }
        if candidate.contains(&reference) || reference.contains(&candidate) {
            return Some(MatchKind::NameContains);
        }

        let candidate_tokens: std::collections::HashSet<&str> =
            candidate.split_whitespace().collect();
        let reference_tokens: std::collections::HashSet<&str> =
            reference.split_whitespace().collect();
        if !candidate_tokens.is_empty() {
            let overlap = candidate_tokens.intersection(&reference_tokens).count() as f32
                / candidate_tokens.len() as f32;
            if overlap >= 0.5 {
                return Some(MatchKind::NameTokenOverlap);
            }
        }

        None
    }

    /// Is this candidate one of our companies?
    pub fn is_our_company(&self, name: &str, tax_id: Option<&str>) -> bool {
        self.find_our_company(name, tax_id).is_some()
    }

    /// Find the reference company a candidate resolves to, best match first.
    pub fn find_our_company(
        &self,
        name: &str,
        tax_id: Option<&str>,
    ) -> Option<(usize, MatchKind)> {
        let mut best: Option<(usize, MatchKind)> = None;
        for (idx, company) in self.companies.iter().enumerate() {
            if let Some(kind) =
                self.match_against(name, tax_id, &company.name, Some(company.tax_id.as_str()))
            {
                let better = match &best {
                    Some((_, current)) => kind.confidence() > current.confidence(),
                    None => true,
                };
                if better {
                    best = Some((idx, kind));
                }
            }
        }
        best
    }

    /// Scan raw document text for any of our companies' tax ids.
    ///
    /// Tries the prefixed form, the bare digits, a separator-stripped copy of
    /// the text, and the NNN-NNN-NN-NN spacing used on Polish documents.
    /// Returns the index of the first reference entity found.
    pub fn find_our_tax_id_in_text(&self, text: &str) -> Option<usize> {
        if text.is_empty() {
            return None;
        }

        let stripped: String = text.chars().filter(|c| !matches!(c, ' ' | '-')).collect();

        for (idx, full_id) in self.normalized_ids.iter().enumerate() {
            if text.contains(full_id.as_str()) {
                return Some(idx);
            }

            let digits: String = full_id.chars().filter(char::is_ascii_digit).collect();
            if digits.len() >= 7 && (text.contains(&digits) || stripped.contains(&digits)) {
                return Some(idx);
            }

            if digits.len() == 10 {
                let dashed = format!(
                    "{}-{}-{}-{}",
                    &digits[0..3],
                    &digits[3..6],
                    &digits[6..8],
                    &digits[8..10]
                );
                let spaced = dashed.replace('-', " ");
                if text.contains(&dashed) || text.contains(&spaced) {
                    return Some(idx);
                }
            }
        }

        None
    }

    /// Fallback ownership check by name, used only when the document carries
    /// no tax-id data at all.
    fn find_our_name_in_text(&self, text: &str) -> Option<usize> {
        let normalized_text = normalize_company_name(text);
        self.normalized_names
            .iter()
            .position(|name| !name.is_empty() && normalized_text.contains(name.as_str()))
    }

    /// Resolve which party is "us", correcting swapped roles.
    ///
    /// The extracted roles are advisory: when the supplier resolves to one of
    /// our companies and the extracted our-company party does not, the roles
    /// are swapped (an outgoing document must not be posted as incoming).
    /// When neither party nor the raw text shows one of our entities, the
    /// document is skipped.
    pub fn resolve_ownership(
        &self,
        supplier: &Company,
        our_party: &Company,
        raw_text: &str,
    ) -> OwnershipResolution {
        let supplier_is_ours =
            self.is_our_company(&supplier.name, supplier.tax_id_normalized());
        let party_is_ours =
            self.is_our_company(&our_party.name, our_party.tax_id_normalized());

        if supplier_is_ours && !party_is_ours {
            info!("swapping supplier and our-company roles (supplier matched our entity)");
            let ours = self
                .find_our_company(&supplier.name, supplier.tax_id_normalized())
                .map(|(idx, _)| idx);
            return OwnershipResolution {
                our_company: ours,
                swapped: true,
                skip: false,
                skip_reason: None,
            };
        }

        if party_is_ours {
            let ours = self
                .find_our_company(&our_party.name, our_party.tax_id_normalized())
                .map(|(idx, _)| idx);
            return OwnershipResolution {
                our_company: ours,
                swapped: false,
                skip: false,
                skip_reason: None,
            };
        }

        // Neither extracted party matched; look at the raw text.
        if let Some(idx) = self.find_our_tax_id_in_text(raw_text) {
            debug!("our company found in raw text by tax id: {}", self.companies[idx].name);
            return OwnershipResolution {
                our_company: Some(idx),
                swapped: false,
                skip: false,
                skip_reason: None,
            };
        }

        // Name-only rescue is allowed only when the document has no tax-id
        // data; an id that is present but foreign rejects the document.
        let has_tax_data = supplier.tax_id.is_some() || our_party.tax_id.is_some();
        if !has_tax_data {
            if let Some(idx) = self.find_our_name_in_text(raw_text) {
                info!("our company found by name fallback: {}", self.companies[idx].name);
                return OwnershipResolution {
                    our_company: Some(idx),
                    swapped: false,
                    skip: false,
                    skip_reason: None,
                };
            }
        }

        OwnershipResolution {
            our_company: None,
            swapped: false,
            skip: true,
            skip_reason: Some("no party matches any of our legal entities".to_string()),
        }
    }

    /// Validator shared with the pipeline for prefix backfill.
    pub fn validator(&self) -> &TaxIdValidator {
        &self.validator
    }
}

/// Prefix-tolerant tax-id equality.
fn tax_ids_equal(a: &str, b: &str) -> bool {
    let a = taxid::normalize(a);
    let b = taxid::normalize(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }

    let bare = |s: &str| -> String {
        if s.len() > 2 && s.as_bytes()[..2].iter().all(u8::is_ascii_alphabetic) {
            s[2..].to_string()
        } else {
            s.to_string()
        }
    };
    bare(&a) == bare(&b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reference_set() -> Vec<OurCompany> {
        vec![
            OurCompany {
                name: "TaVie Europe OÜ".to_string(),
                tax_id: "EE102288270".to_string(),
                address: String::new(),
                country: "Estonia".to_string(),
                organization_id: String::new(),
            },
            OurCompany {
                name: "Parkentertainment Sp. z o.o.".to_string(),
                tax_id: "PL5272956146".to_string(),
                address: String::new(),
                country: "Poland".to_string(),
                organization_id: String::new(),
            },
        ]
    }

    #[test]
    fn test_normalize_company_name() {
        assert_eq!(
            normalize_company_name("Parkentertainment Sp. z o.o."),
            "parkentertainment spzoo"
        );
        assert_eq!(
            normalize_company_name("Parkentertainment Spółka z ograniczoną odpowiedzialnością"),
            "parkentertainment spzoo"
        );
        assert_eq!(normalize_company_name("TaVie Europe OÜ"), "tavie europe ou");
        assert_eq!(normalize_company_name("TaVie Europe OU"), "tavie europe ou");
        assert_eq!(normalize_company_name("Kwiaciarnia \"Różą\" łódź"), "kwiaciarnia roza lodz");
    }

    #[test]
    fn test_tax_id_match_overrides_name() {
        let matcher = CompanyMatcher::new(reference_set());

        // Unrelated name, matching id: still our company.
        assert!(matcher.is_our_company("Completely Different GmbH", Some("PL5272956146")));
        // Bare digits match the prefixed reference id.
        assert!(matcher.is_our_company("", Some("5272956146")));
    }

    #[test]
    fn test_conflicting_tax_id_never_overruled_by_name() {
        let matcher = CompanyMatcher::new(reference_set());

        // Same name as ours, different id: a look-alike, not us.
        assert!(!matcher.is_our_company(
            "Parkentertainment Sp. z o.o.",
            Some("PL9512495127")
        ));
    }

    #[test]
    fn test_name_fallback_without_tax_id() {
        let matcher = CompanyMatcher::new(reference_set());

        assert!(matcher.is_our_company("Parkentertainment Sp. z o.o.", None));
        assert!(matcher.is_our_company("PARKENTERTAINMENT SPÓŁKA Z O.O.", None));
        assert!(!matcher.is_our_company("Hibispol Sp. z o.o.", None));
    }

    #[test]
    fn test_token_overlap_match() {
        let matcher = CompanyMatcher::new(reference_set());

        let kind = matcher.match_against(
            "Europe TaVie",
            None,
            "TaVie Europe OÜ",
            None,
        );
        assert!(matches!(
            kind,
            Some(MatchKind::NameTokenOverlap) | Some(MatchKind::NameContains)
        ));
    }

    #[test]
    fn test_role_swap_when_supplier_is_ours() {
        let matcher = CompanyMatcher::new(reference_set());

        let supplier = Company {
            name: "Parkentertainment Sp. z o.o.".to_string(),
            tax_id: Some(crate::taxid::TaxIdentifier {
                raw: "PL5272956146".to_string(),
                normalized: "PL5272956146".to_string(),
                country_code: Some("PL".to_string()),
                is_valid: true,
                confidence: 1.0,
            }),
            ..Company::default()
        };
        let our_party = Company {
            name: "Hibispol Sp. z o.o.".to_string(),
            ..Company::default()
        };

        let resolution = matcher.resolve_ownership(&supplier, &our_party, "");
        assert!(resolution.swapped);
        assert!(!resolution.skip);
        assert_eq!(resolution.our_company, Some(1));
    }

    #[test]
    fn test_skip_when_nobody_is_ours() {
        let matcher = CompanyMatcher::new(reference_set());

        let supplier = Company {
            name: "Hibispol Sp. z o.o.".to_string(),
            tax_id: Some(crate::taxid::TaxIdentifier {
                raw: "PL9512495127".to_string(),
                normalized: "PL9512495127".to_string(),
                country_code: Some("PL".to_string()),
                is_valid: true,
                confidence: 1.0,
            }),
            ..Company::default()
        };
        let our_party = Company::default();

        let resolution =
            matcher.resolve_ownership(&supplier, &our_party, "Faktura VAT 3538/2025");
        assert!(resolution.skip);
        assert!(resolution.skip_reason.is_some());
    }

    #[test]
    fn test_ownership_from_raw_text_digits() {
        let matcher = CompanyMatcher::new(reference_set());

        let supplier = Company {
            name: "Hibispol Sp. z o.o.".to_string(),
            ..Company::default()
        };
        // Our NIP appears only in the text, formatted with dashes.
        let text = "Nabywca: Parkentertainment\nNIP: 527-295-61-46";
        let resolution = matcher.resolve_ownership(&supplier, &Company::default(), text);
        assert!(!resolution.skip);
        assert_eq!(resolution.our_company, Some(1));
    }

    #[test]
    fn test_find_our_tax_id_in_text_forms() {
        let matcher = CompanyMatcher::new(reference_set());

        assert_eq!(matcher.find_our_tax_id_in_text("VAT: PL5272956146"), Some(1));
        assert_eq!(matcher.find_our_tax_id_in_text("NIP 5272956146"), Some(1));
        assert_eq!(matcher.find_our_tax_id_in_text("NIP 527 295 61 46"), Some(1));
        assert_eq!(matcher.find_our_tax_id_in_text("EE102288270"), Some(0));
        assert_eq!(matcher.find_our_tax_id_in_text("nothing here"), None);
    }
}
