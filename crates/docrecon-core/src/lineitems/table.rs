//! Structured table-cell extraction.
//!
//! Runs only when the upstream layout step handed over a pre-segmented cell
//! grid. Columns are mapped from header vocabulary when a header row is
//! present, with a positional fallback matching the common Polish invoice
//! layout (ordinal, name, unit, quantity, net price, net total, gross price,
//! ..., rate). Cell-based extraction is immune to cross-row field bleed, so
//! arbitration prefers it on ties.

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;

use crate::models::document::LineItem;

use super::{ExtractionInput, RowStrategy};

lazy_static! {
    static ref DECIMAL: Regex = Regex::new(r"\d{1,3}(?:\s?\d{3})*[.,]\d{1,2}").unwrap();
    static ref RATE: Regex = Regex::new(r"(\d{1,2})\s*%").unwrap();
    static ref HAS_LETTERS: Regex = Regex::new(r"[A-Za-zÀ-ž]").unwrap();
}

/// Column roles a header can declare.
#[derive(Debug, Clone, Copy, Default)]
struct ColumnMap {
    ordinal: Option<usize>,
    name: Option<usize>,
    quantity: Option<usize>,
    price_net: Option<usize>,
    price_gross: Option<usize>,
    rate: Option<usize>,
}

impl ColumnMap {
    /// Map columns from a header row's vocabulary.
    fn from_header(header: &[String]) -> Option<Self> {
        let mut map = ColumnMap::default();
        let mut hits = 0;

        for (idx, cell) in header.iter().enumerate() {
            let cell = cell.to_lowercase();
            if map.ordinal.is_none() && (cell.starts_with("lp") || cell == "no" || cell == "#" || cell.starts_with("poz")) {
                map.ordinal = Some(idx);
                hits += 1;
            } else if map.name.is_none()
                && (cell.contains("nazwa") || cell.contains("name") || cell.contains("opis") || cell.contains("description"))
            {
                map.name = Some(idx);
                hits += 1;
            } else if map.quantity.is_none()
                && (cell.contains("ilość") || cell.contains("ilosc") || cell.contains("qty") || cell.contains("quantity"))
            {
                map.quantity = Some(idx);
                hits += 1;
            } else if map.price_gross.is_none()
                && (cell.contains("brutto") || cell.contains("gross"))
                && (cell.contains("cena") || cell.contains("price"))
            {
                map.price_gross = Some(idx);
                hits += 1;
            } else if map.price_net.is_none()
                && (cell.contains("cena") || cell.contains("price") || cell.contains("rate"))
            {
                map.price_net = Some(idx);
                hits += 1;
            } else if map.rate.is_none()
                && (cell.contains("vat") || cell.contains("stawka") || cell.contains("tax"))
            {
                map.rate = Some(idx);
                hits += 1;
            }
        }

        // A header is trusted only when it names at least the essentials.
        (hits >= 3 && map.name.is_some()).then_some(map)
    }

    /// Positional fallback for the common wide layout.
    fn positional(width: usize) -> Self {
        if width >= 7 {
            ColumnMap {
                ordinal: Some(0),
                name: Some(1),
                quantity: Some(3),
                price_net: Some(4),
                price_gross: Some(6),
                rate: width.checked_sub(3),
            }
        } else {
            ColumnMap {
                ordinal: Some(0),
                name: Some(1),
                quantity: Some(2),
                price_net: Some(3),
                price_gross: None,
                rate: (width >= 5).then_some(4),
            }
        }
    }
}

/// Structured table-cell extraction over a pre-segmented grid.
pub struct StructuredTableStrategy;

impl StructuredTableStrategy {
    pub fn new() -> Self {
        Self
    }

    fn parse_row(
        row: &[String],
        map: &ColumnMap,
        input: &ExtractionInput<'_>,
    ) -> Option<LineItem> {
        let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i)).map(|s| s.trim());

        let ordinal = cell(map.ordinal)
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| (1..=100).contains(n));

        let name = cell(map.name)?.to_string();
        if name.len() < 3 || !HAS_LETTERS.is_match(&name) {
            return None;
        }
        // Rows in the grid that are not positions (carried-over totals,
        // page footers) have no ordinal in the ordinal column.
        if map.ordinal.is_some() && ordinal.is_none() {
            return None;
        }

        let quantity = cell(map.quantity)
            .and_then(parse_decimal)
            .filter(|q| *q > Decimal::ZERO)?;

        let price_cell = if input.tax_inclusive {
            cell(map.price_gross).or(cell(map.price_net))
        } else {
            cell(map.price_net).or(cell(map.price_gross))
        };
        let unit_price = price_cell.and_then(parse_decimal)?;

        let tax_percent = match cell(map.rate).and_then(|s| RATE.captures(s)) {
            Some(caps) => input.rates.resolve(&format!("{}%", &caps[1]), &name),
            None => {
                let joined = row.join(" ");
                input.rates.resolve(&joined, &name)
            }
        };

        Some(LineItem {
            ordinal,
            name,
            quantity,
            unit_price,
            tax_percent,
            is_tax_inclusive: input.tax_inclusive,
        })
    }
}

impl Default for StructuredTableStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RowStrategy for StructuredTableStrategy {
    fn name(&self) -> &'static str {
        "structured-table"
    }

    fn structured(&self) -> bool {
        true
    }

    fn run(&self, input: &ExtractionInput<'_>) -> Vec<LineItem> {
        let Some(table) = input.table else { return Vec::new() };
        if table.is_empty() {
            return Vec::new();
        }

        let (map, data_rows): (ColumnMap, &[Vec<String>]) =
            match ColumnMap::from_header(&table[0]) {
                Some(map) => (map, &table[1..]),
                None => (
                    ColumnMap::positional(table.iter().map(Vec::len).max().unwrap_or(0)),
                    table,
                ),
            };

        data_rows
            .iter()
            .filter_map(|row| Self::parse_row(row, &map, input))
            .collect()
    }
}

/// Parse a cell holding "4,14", "1 234.56", or a bare integer.
fn parse_decimal(cell: &str) -> Option<Decimal> {
    if let Some(m) = DECIMAL.find(cell) {
        return m.as_str().replace(' ', "").replace(',', ".").parse().ok();
    }
    let digits: String = cell.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() || digits.len() != cell.trim().len() {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lineitems::RateResolver;
    use crate::models::document::TaxRate;
    use pretty_assertions::assert_eq;

    fn cells(row: &[&str]) -> Vec<String> {
        row.iter().map(|s| s.to_string()).collect()
    }

    fn input<'a>(table: &'a [Vec<String>], inclusive: bool) -> ExtractionInput<'a> {
        ExtractionInput {
            text: "",
            table: Some(table),
            tax_inclusive: inclusive,
            rates: RateResolver::new(None, TaxRate::Reduced8),
        }
    }

    #[test]
    fn test_header_mapped_table() {
        let table = vec![
            cells(&["Lp", "Nazwa", "Ilość", "Cena netto", "VAT"]),
            cells(&["1", "Dahl Karma Prospero", "10", "4,14", "8%"]),
            cells(&["2", "Ruscus Standard", "50", "1,84", "23%"]),
            cells(&["", "Razem", "", "133,40", ""]),
        ];
        let rows = StructuredTableStrategy::new().run(&input(&table, false));

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Dahl Karma Prospero");
        assert_eq!(rows[0].quantity, Decimal::from(10));
        assert_eq!(rows[0].unit_price, "4.14".parse::<Decimal>().unwrap());
        assert_eq!(rows[0].tax_percent, TaxRate::Reduced8);
        assert_eq!(rows[1].tax_percent, TaxRate::Standard23);
    }

    #[test]
    fn test_positional_wide_layout() {
        // Ordinal, name, unit, qty, net price, net total, gross price,
        // net total again, rate, tax amount, gross total.
        let row = |n: &str, name: &str, qty: &str, net: &str, gross: &str| {
            cells(&[n, name, "szt", qty, net, "", gross, "", "8%", "", ""])
        };
        let table = vec![
            row("1", "Dahl Karma Prospero", "10", "4,14", "4,47"),
            row("2", "Hydr M Ch Verena", "5", "16,56", "17,88"),
        ];

        let exclusive = StructuredTableStrategy::new().run(&input(&table, false));
        assert_eq!(exclusive.len(), 2);
        assert_eq!(exclusive[0].unit_price, "4.14".parse::<Decimal>().unwrap());

        let inclusive = StructuredTableStrategy::new().run(&input(&table, true));
        assert_eq!(inclusive[0].unit_price, "4.47".parse::<Decimal>().unwrap());
        assert!(inclusive[0].is_tax_inclusive);
    }

    #[test]
    fn test_no_table_no_rows() {
        let strategy = StructuredTableStrategy::new();
        let input = ExtractionInput {
            text: "1 Dahlia 10 szt 4,14",
            table: None,
            tax_inclusive: false,
            rates: RateResolver::new(None, TaxRate::Reduced8),
        };
        assert!(strategy.run(&input).is_empty());
    }

    #[test]
    fn test_footer_rows_dropped() {
        let table = vec![
            cells(&["Lp", "Nazwa", "Ilość", "Cena", "VAT"]),
            cells(&["1", "Dahlia", "10", "4,14", "8%"]),
            cells(&["", "Do zapłaty", "", "44,70", ""]),
        ];
        let rows = StructuredTableStrategy::new().run(&input(&table, false));
        assert_eq!(rows.len(), 1);
    }
}
