//! Tabular line-item extraction: a chain of strategies with arbitration.
//!
//! Several independent strategies run against the same input — a linear
//! regex-window scan, structured table-cell extraction when a pre-segmented
//! grid is available, and ordinal row-block segmentation. Each produces a
//! candidate row list; the candidate with the largest self-consistent row
//! count wins outright, ties preferring structured extraction (less prone to
//! cross-row field bleed). When the winner still trails the document's
//! declared row markers, the pipeline escalates to the LLM collaborator and
//! merges in rows it does not already have.

mod blocks;
mod linear;
mod table;

pub use blocks::OrdinalBlockStrategy;
pub use linear::LinearScanStrategy;
pub use table::StructuredTableStrategy;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::models::document::{LineItem, TaxRate};

lazy_static! {
    static ref ROW_ORDINAL: Regex = Regex::new(r"^(\d{1,3})[\s.)]+\S").unwrap();
    static ref RATE_MARKER: Regex = Regex::new(r"(\d{1,2})\s*%").unwrap();
    static ref DOC_RATE: Regex = Regex::new(r"(?i)VAT\s*:?\s*(\d{1,2})\s*%").unwrap();
    static ref GROSS_HEADER: Regex =
        Regex::new(r"(?i)cena\s+brutto|gross\s+(?:unit\s+)?price|price\s+incl|brutto\s+cena")
            .unwrap();
    static ref NET_HEADER: Regex =
        Regex::new(r"(?i)cena\s+netto|net\s+(?:unit\s+)?price|price\s+excl|netto\s+cena").unwrap();
}

/// Product-category keywords with their default rates, consulted when a row
/// carries no explicit marker.
const CATEGORY_RATES: &[(&str, u8)] = &[
    ("ruscus", 23),
    ("transport", 23),
    ("usługa", 23),
    ("usluga", 23),
    ("service", 23),
];

/// Per-row tax-rate resolution, in fixed order: explicit marker adjacent to
/// the row, category default for the product name, document-wide declared
/// rate, configured default.
#[derive(Debug, Clone, Copy)]
pub struct RateResolver {
    document_rate: Option<TaxRate>,
    default_rate: TaxRate,
}

impl RateResolver {
    pub fn new(document_rate: Option<TaxRate>, default_rate: TaxRate) -> Self {
        Self { document_rate, default_rate }
    }

    /// Resolve the rate for one row given its surrounding text window.
    pub fn resolve(&self, row_window: &str, name: &str) -> TaxRate {
        if let Some(caps) = RATE_MARKER.captures(row_window) {
            if let Ok(pct) = caps[1].parse::<u8>() {
                if pct <= 30 {
                    return TaxRate::from_percent(pct);
                }
            }
        }

        let name_lower = name.to_lowercase();
        for (keyword, rate) in CATEGORY_RATES {
            if name_lower.contains(keyword) {
                return TaxRate::from_percent(*rate);
            }
        }

        self.document_rate.unwrap_or(self.default_rate)
    }
}

/// Input shared by every strategy in the chain.
pub struct ExtractionInput<'a> {
    /// Raw document text.
    pub text: &'a str,
    /// Pre-segmented table cells, when the upstream layout step produced one.
    pub table: Option<&'a [Vec<String>]>,
    /// Whether unit prices on this document include tax. Decided once per
    /// document before the chain runs; strategies never re-derive it.
    pub tax_inclusive: bool,
    /// Row rate resolution.
    pub rates: RateResolver,
}

/// One strategy's candidate row set.
#[derive(Debug, Clone)]
pub struct RowCandidate {
    /// Strategy that produced the candidate.
    pub strategy: &'static str,
    /// Structured extraction (cell-based) rather than linear scanning.
    pub structured: bool,
    /// The candidate rows.
    pub rows: Vec<LineItem>,
}

impl RowCandidate {
    /// Rows with a name, a positive quantity, and a price.
    pub fn consistent_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_consistent()).count()
    }
}

/// One independent extraction strategy.
pub trait RowStrategy {
    /// Stable strategy name for logs and arbitration traces.
    fn name(&self) -> &'static str;

    /// Whether this strategy reads structured cells.
    fn structured(&self) -> bool {
        false
    }

    /// Produce candidate rows from the input.
    fn run(&self, input: &ExtractionInput<'_>) -> Vec<LineItem>;
}

/// Arbitration: largest self-consistent row count wins outright; ties are
/// broken in favor of structured extraction.
pub fn select_candidate(candidates: Vec<RowCandidate>) -> Option<RowCandidate> {
    candidates
        .into_iter()
        .filter(|c| c.consistent_count() > 0)
        .max_by_key(|c| (c.consistent_count(), c.structured))
}

/// Outcome of running the full chain.
#[derive(Debug, Clone)]
pub struct LineItemExtraction {
    /// Winning rows, kept in document order.
    pub rows: Vec<LineItem>,
    /// Name of the winning strategy, if any produced rows.
    pub winning_strategy: Option<&'static str>,
    /// Row count the document itself declares via leading ordinals.
    pub declared_rows: usize,
    /// Whether unit prices include tax (document-wide decision).
    pub tax_inclusive: bool,
}

impl LineItemExtraction {
    /// The winner trails the declared ordinals: worth an LLM enrichment pass.
    pub fn needs_enrichment(&self) -> bool {
        self.declared_rows > self.rows.len()
    }
}

/// The strategy chain with its arbitration rule.
pub struct LineItemExtractor {
    default_rate: TaxRate,
}

impl LineItemExtractor {
    pub fn new(default_rate: TaxRate) -> Self {
        Self { default_rate }
    }

    /// Run every strategy against the same input and arbitrate.
    pub fn extract(&self, text: &str, table: Option<&[Vec<String>]>) -> LineItemExtraction {
        let tax_inclusive = detect_tax_inclusive(text);
        let input = ExtractionInput {
            text,
            table,
            tax_inclusive,
            rates: RateResolver::new(document_rate(text), self.default_rate),
        };

        let strategies: Vec<Box<dyn RowStrategy>> = vec![
            Box::new(LinearScanStrategy::new()),
            Box::new(OrdinalBlockStrategy::new()),
            Box::new(StructuredTableStrategy::new()),
        ];

        let candidates: Vec<RowCandidate> = strategies
            .iter()
            .map(|s| {
                let rows = s.run(&input);
                debug!(strategy = s.name(), rows = rows.len(), "strategy candidate");
                RowCandidate { strategy: s.name(), structured: s.structured(), rows }
            })
            .collect();

        let declared_rows = declared_row_count(text);
        let winner = select_candidate(candidates);

        match winner {
            Some(candidate) => {
                debug!(
                    strategy = candidate.strategy,
                    rows = candidate.rows.len(),
                    declared = declared_rows,
                    "line-item arbitration"
                );
                LineItemExtraction {
                    winning_strategy: Some(candidate.strategy),
                    rows: candidate.rows,
                    declared_rows,
                    tax_inclusive,
                }
            }
            None => LineItemExtraction {
                rows: Vec::new(),
                winning_strategy: None,
                declared_rows,
                tax_inclusive,
            },
        }
    }

    /// Merge advisory rows (from the LLM pass) into an extracted set.
    ///
    /// Rows already present — keyed by normalized name and quantity — are
    /// kept as extracted; advisory rows never replace them.
    pub fn merge_suggested_rows(existing: &mut Vec<LineItem>, suggested: Vec<LineItem>) {
        let key = |item: &LineItem| {
            let name = item.name.split_whitespace().collect::<Vec<_>>().join(" ");
            (name.to_lowercase(), item.quantity)
        };

        let mut seen: std::collections::HashSet<_> = existing.iter().map(&key).collect();
        for row in suggested {
            if seen.insert(key(&row)) {
                existing.push(row);
            }
        }
    }
}

/// Decide once per document whether listed prices include tax.
///
/// Looks at structural column-header vocabulary; a gross-price header
/// implies inclusive pricing for the whole table.
pub fn detect_tax_inclusive(text: &str) -> bool {
    if GROSS_HEADER.is_match(text) {
        return true;
    }
    if NET_HEADER.is_match(text) {
        return false;
    }
    false
}

/// Document-wide declared rate, e.g. a "VAT 23%" summary line.
pub fn document_rate(text: &str) -> Option<TaxRate> {
    DOC_RATE
        .captures(text)
        .and_then(|caps| caps[1].parse::<u8>().ok())
        .filter(|pct| *pct <= 30)
        .map(TaxRate::from_percent)
}

/// Row count the document declares through leading ordinal markers.
///
/// The largest line-leading ordinal is trusted only when enough distinct
/// ordinals actually appear; a lone stray number does not declare a table.
pub fn declared_row_count(text: &str) -> usize {
    let mut ordinals = std::collections::BTreeSet::new();
    for line in text.lines() {
        if let Some(caps) = ROW_ORDINAL.captures(line.trim()) {
            if let Ok(n) = caps[1].parse::<usize>() {
                if (1..=100).contains(&n) {
                    ordinals.insert(n);
                }
            }
        }
    }

    let max = ordinals.iter().next_back().copied().unwrap_or(0);
    if max > 0 && ordinals.len() * 2 >= max {
        max
    } else {
        ordinals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    fn row(name: &str, qty: i64, price: &str) -> LineItem {
        LineItem {
            ordinal: None,
            name: name.to_string(),
            quantity: Decimal::from(qty),
            unit_price: price.parse().unwrap(),
            tax_percent: TaxRate::Reduced8,
            is_tax_inclusive: false,
        }
    }

    #[test]
    fn test_arbitration_largest_consistent_wins() {
        let linear = RowCandidate {
            strategy: "linear-scan",
            structured: false,
            rows: (0..12).map(|i| row(&format!("flower {}", i), 5, "4.14")).collect(),
        };
        let table = RowCandidate {
            strategy: "structured-table",
            structured: true,
            rows: (0..27).map(|i| row(&format!("flower {}", i), 5, "4.14")).collect(),
        };

        let winner = select_candidate(vec![linear, table]).unwrap();
        assert_eq!(winner.strategy, "structured-table");
        assert_eq!(winner.rows.len(), 27);
    }

    #[test]
    fn test_arbitration_tie_prefers_structured() {
        let linear = RowCandidate {
            strategy: "linear-scan",
            structured: false,
            rows: vec![row("a", 1, "1.00"), row("b", 1, "2.00")],
        };
        let table = RowCandidate {
            strategy: "structured-table",
            structured: true,
            rows: vec![row("c", 1, "1.00"), row("d", 1, "2.00")],
        };

        let winner = select_candidate(vec![linear, table]).unwrap();
        assert_eq!(winner.strategy, "structured-table");
    }

    #[test]
    fn test_arbitration_counts_only_consistent_rows() {
        let mut bad_rows: Vec<LineItem> = (0..5).map(|i| row(&format!("x {}", i), 1, "1.00")).collect();
        for r in bad_rows.iter_mut().take(4) {
            r.quantity = Decimal::ZERO;
        }
        let mostly_bad = RowCandidate { strategy: "linear-scan", structured: false, rows: bad_rows };
        let small_good = RowCandidate {
            strategy: "ordinal-blocks",
            structured: false,
            rows: vec![row("a", 1, "1.00"), row("b", 2, "2.00")],
        };

        let winner = select_candidate(vec![mostly_bad, small_good]).unwrap();
        assert_eq!(winner.strategy, "ordinal-blocks");
    }

    #[test]
    fn test_rate_resolver_order() {
        let resolver = RateResolver::new(Some(TaxRate::Standard23), TaxRate::Reduced8);

        // Explicit marker beats everything.
        assert_eq!(resolver.resolve("5 szt 4,14 8%", "Dahlia"), TaxRate::Reduced8);
        // Category default beats the document rate.
        assert_eq!(resolver.resolve("no marker", "RUSCUS STANDARD 50-70 cm"), TaxRate::Standard23);
        // Document rate when nothing else resolves.
        assert_eq!(resolver.resolve("no marker", "Dahlia"), TaxRate::Standard23);

        let bare = RateResolver::new(None, TaxRate::Reduced8);
        assert_eq!(bare.resolve("no marker", "Dahlia"), TaxRate::Reduced8);
    }

    #[test]
    fn test_detect_tax_inclusive() {
        assert!(detect_tax_inclusive("Lp Nazwa Ilość Cena brutto Wartość"));
        assert!(!detect_tax_inclusive("Lp Nazwa Ilość Cena netto Wartość"));
        assert!(!detect_tax_inclusive("no table headers at all"));
    }

    #[test]
    fn test_declared_row_count() {
        let text = "1 Dahl Karma Prospero\n2 Hydr M Ch Verena\n3 Hydr M Verena\n";
        assert_eq!(declared_row_count(text), 3);

        // A lone stray ordinal does not declare a 90-row table.
        let stray = "90 day payment terms\n";
        assert_eq!(declared_row_count(stray), 1);
    }

    #[test]
    fn test_merge_never_replaces() {
        let mut rows = vec![row("Dahl Karma Prospero", 10, "4.14")];
        LineItemExtractor::merge_suggested_rows(
            &mut rows,
            vec![
                row("Dahl  Karma Prospero", 10, "9.99"), // duplicate, different price
                row("Ruscus Standard", 50, "1.84"),
            ],
        );

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].unit_price, "4.14".parse::<Decimal>().unwrap());
        assert_eq!(rows[1].name, "Ruscus Standard");
    }

    #[test]
    fn test_extraction_idempotent() {
        let text = "Lp Nazwa Ilość Cena netto VAT\n\
                    1 Dahl Karma Prospero 10 szt 4,14 41,40 8%\n\
                    2 Hydr M Ch Verena 5 szt 16,56 82,80 8%\n";
        let extractor = LineItemExtractor::new(TaxRate::Reduced8);

        let first = extractor.extract(text, None);
        let second = extractor.extract(text, None);

        assert_eq!(first.winning_strategy, second.winning_strategy);
        assert_eq!(first.rows.len(), second.rows.len());
        assert_eq!(first.tax_inclusive, second.tax_inclusive);
    }
}
