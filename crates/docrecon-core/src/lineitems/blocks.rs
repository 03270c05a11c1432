//! Row-block segmentation by leading ordinal markers.
//!
//! Splits the text into blocks at every `<ordinal> <letter...>` line, then
//! parses each flattened block: the name runs up to the quantity anchor
//! (`10 szt`, `2 pcs`), and decimal figures are assigned positionally
//! (unit net, line net, tax amount, line gross) the way these tables are
//! printed.

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;

use crate::models::document::LineItem;

use super::{ExtractionInput, RowStrategy};

lazy_static! {
    static ref BLOCK_START: Regex = Regex::new(r"^\d{1,3}\s+[A-Za-zÀ-ž]").unwrap();
    static ref NAME_TO_QTY: Regex =
        Regex::new(r"^(\d{1,3})\s+(.*?)\s+(\d+(?:[.,]\d+)?)\s*(?:szt\.?|pcs\.?|pc\.?|ea)\b")
            .unwrap();
    static ref DECIMAL: Regex = Regex::new(r"\d{1,3}(?:\s?\d{3})*[.,]\d{2}").unwrap();
}

/// Ordinal row-block segmentation.
pub struct OrdinalBlockStrategy;

impl OrdinalBlockStrategy {
    pub fn new() -> Self {
        Self
    }

    /// Split the text into blocks, one per leading-ordinal row.
    fn split_blocks(text: &str) -> Vec<String> {
        let mut blocks = Vec::new();
        let mut current = String::new();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if BLOCK_START.is_match(line) && !current.trim().is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            current.push_str(line);
            current.push(' ');
        }
        if !current.trim().is_empty() {
            blocks.push(current);
        }

        blocks
    }

    /// Parse one flattened block into a row, if it holds one.
    fn parse_block(block: &str, input: &ExtractionInput<'_>) -> Option<LineItem> {
        let flat = block.trim();
        let caps = NAME_TO_QTY.captures(flat)?;

        let ordinal: u32 = caps[1].parse().ok().filter(|n| (1..=100).contains(n))?;
        let name = caps[2].trim().to_string();
        if name.len() < 3 {
            return None;
        }
        let quantity: Decimal = caps[3].replace(',', ".").parse().ok()?;
        if quantity <= Decimal::ZERO {
            return None;
        }

        // Figures after the quantity anchor, in print order.
        let tail = &flat[caps.get(0)?.end()..];
        let figures: Vec<Decimal> = DECIMAL
            .find_iter(tail)
            .filter_map(|m| m.as_str().replace(' ', "").replace(',', ".").parse().ok())
            .collect();
        if figures.is_empty() {
            return None;
        }

        // unit net, line net, tax amount, line gross — when all four are
        // printed; otherwise the first figure is the unit price.
        let unit_net = figures[0];
        let line_gross = if figures.len() >= 4 { Some(figures[3]) } else { None };

        let unit_price = if input.tax_inclusive {
            match line_gross {
                Some(gross) if !quantity.is_zero() => (gross / quantity).round_dp(2),
                _ => unit_net,
            }
        } else {
            unit_net
        };

        let tax_percent = input.rates.resolve(flat, &name);

        Some(LineItem {
            ordinal: Some(ordinal),
            name,
            quantity,
            unit_price,
            tax_percent,
            is_tax_inclusive: input.tax_inclusive,
        })
    }
}

impl Default for OrdinalBlockStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RowStrategy for OrdinalBlockStrategy {
    fn name(&self) -> &'static str {
        "ordinal-blocks"
    }

    fn run(&self, input: &ExtractionInput<'_>) -> Vec<LineItem> {
        Self::split_blocks(input.text)
            .iter()
            .filter_map(|block| Self::parse_block(block, input))
            .collect()
    }
}
