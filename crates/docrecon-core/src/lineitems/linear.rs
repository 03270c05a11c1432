//! Linear regex-window scan over an OCR token stream.
//!
//! Built for scans where every table cell lands on its own line: a row is
//! announced by an ordinal + name line, and its quantity, unit price, and
//! rate marker appear somewhere in the next few lines.

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;

use crate::models::document::LineItem;

use super::{ExtractionInput, RowStrategy};

/// Lines that never start a product row.
const WINDOW: usize = 10;

lazy_static! {
    static ref SKIP_LINE: Regex = Regex::new(
        r"(?i)^(Strona|Page|Razem|IBAN|Numer rachunku|Odebrał|Zestawienie|Netto|Brutto|Kwota VAT|Wartość|Sprzedawca|Nabywca|NIP|REGON|Tel\.|VAT$|Lp\b)"
    )
    .unwrap();
    static ref ROW_START: Regex = Regex::new(r"^(\d{1,3})\s+(.+)$").unwrap();
    static ref BARE_NUMBER: Regex = Regex::new(r"^\d{1,4}(?:[.,]\d+)?$").unwrap();
    static ref PRICE: Regex = Regex::new(r"(\d{1,3}(?:\s?\d{3})*[.,]\d{2})").unwrap();
    static ref HAS_LETTERS: Regex = Regex::new(r"[A-Za-zÀ-žŁłŚśŻżŹźĆćŃńĄąĘęÓó]").unwrap();
}

/// Regex-window scanning of a linear token stream.
pub struct LinearScanStrategy;

impl LinearScanStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LinearScanStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RowStrategy for LinearScanStrategy {
    fn name(&self) -> &'static str {
        "linear-scan"
    }

    fn run(&self, input: &ExtractionInput<'_>) -> Vec<LineItem> {
        let lines: Vec<&str> = input
            .text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let mut rows = Vec::new();
        let mut seen: std::collections::HashSet<(String, Decimal)> =
            std::collections::HashSet::new();

        for (i, line) in lines.iter().enumerate() {
            if SKIP_LINE.is_match(line) || line.eq_ignore_ascii_case("szt") {
                continue;
            }

            let Some(caps) = ROW_START.captures(line) else { continue };
            let ordinal: u32 = match caps[1].parse() {
                Ok(n) if (1..=100).contains(&n) => n,
                _ => continue,
            };
            let name = caps[2].trim().to_string();
            if name.len() < 3 || !HAS_LETTERS.is_match(&name) {
                continue;
            }

            let mut quantity: Option<Decimal> = None;
            let mut unit_price: Option<Decimal> = None;
            let mut window_text = String::new();

            for window_line in lines.iter().skip(i + 1).take(WINDOW) {
                // Stop when the next row begins.
                if ROW_START.is_match(window_line) && HAS_LETTERS.is_match(window_line) {
                    break;
                }
                window_text.push_str(window_line);
                window_text.push(' ');

                if quantity.is_none() && BARE_NUMBER.is_match(window_line) {
                    if let Ok(value) = window_line.replace(',', ".").parse::<Decimal>() {
                        if value.fract().is_zero() && value > Decimal::ZERO {
                            quantity = Some(value);
                            continue;
                        }
                    }
                }

                if unit_price.is_none() {
                    if let Some(price_caps) = PRICE.captures(window_line) {
                        let cleaned = price_caps[1].replace(' ', "").replace(',', ".");
                        if let Ok(value) = cleaned.parse::<Decimal>() {
                            // Larger figures in the window are line totals.
                            if value < Decimal::from(1000) {
                                unit_price = Some(value);
                            }
                        }
                    }
                }
            }

            let (Some(quantity), Some(unit_price)) = (quantity, unit_price) else {
                continue;
            };

            let key = (name.to_lowercase(), quantity);
            if !seen.insert(key) {
                continue;
            }

            let tax_percent = input.rates.resolve(&window_text, &name);
            rows.push(LineItem {
                ordinal: Some(ordinal),
                name,
                quantity,
                unit_price,
                tax_percent,
                is_tax_inclusive: input.tax_inclusive,
            });
        }

        rows
    }
}
