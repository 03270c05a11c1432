//! Date extraction for mixed-locale documents.

use chrono::NaiveDate;

use super::patterns::{DATE_DMY, DATE_MONTH_NAME, DATE_YMD, DUE_DATE, ISSUE_DATE};
use super::{ExtractionMatch, FieldExtractor};

/// Date field extractor.
pub struct DateExtractor;

impl DateExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for DateExtractor {
    type Output = ExtractionMatch<NaiveDate>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results: Vec<Self::Output> = Vec::new();

        // YYYY-MM-DD first: it is unambiguous.
        for caps in DATE_YMD.captures_iter(text) {
            let year: i32 = caps[1].parse().unwrap_or(0);
            let month: u32 = caps[2].parse().unwrap_or(0);
            let day: u32 = caps[3].parse().unwrap_or(0);

            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                let full_match = caps.get(0).unwrap();
                results.push(
                    ExtractionMatch::new(date, 0.95, full_match.as_str())
                        .with_position(full_match.start(), full_match.end()),
                );
            }
        }

        // DD.MM.YYYY / DD-MM-YY.
        for caps in DATE_DMY.captures_iter(text) {
            let day: u32 = caps[1].parse().unwrap_or(0);
            let month: u32 = caps[2].parse().unwrap_or(0);
            let year: i32 = parse_year(&caps[3]);

            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                if results.iter().any(|r| r.value == date) {
                    continue;
                }
                let full_match = caps.get(0).unwrap();
                results.push(
                    ExtractionMatch::new(date, 0.9, full_match.as_str())
                        .with_position(full_match.start(), full_match.end()),
                );
            }
        }

        // "August 16, 2025".
        for caps in DATE_MONTH_NAME.captures_iter(text) {
            let month = month_name_to_number(&caps[1]);
            let day: u32 = caps[2].parse().unwrap_or(0);
            let year: i32 = caps[3].parse().unwrap_or(0);

            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                if results.iter().any(|r| r.value == date) {
                    continue;
                }
                let full_match = caps.get(0).unwrap();
                results.push(
                    ExtractionMatch::new(date, 0.9, full_match.as_str())
                        .with_position(full_match.start(), full_match.end()),
                );
            }
        }

        results
    }
}

/// Labeled document dates.
#[derive(Debug, Clone, Default)]
pub struct DocumentDates {
    /// Issue date.
    pub issue_date: Option<ExtractionMatch<NaiveDate>>,
    /// Payment due date.
    pub due_date: Option<ExtractionMatch<NaiveDate>>,
}

/// Extract labeled dates, falling back to the first date on the page for the
/// issue date.
pub fn extract_dates(text: &str) -> DocumentDates {
    let mut result = DocumentDates::default();
    let date_extractor = DateExtractor::new();

    if let Some(caps) = ISSUE_DATE.captures(text) {
        if let Some(date) = date_extractor.extract(&caps[1]) {
            result.issue_date = Some(ExtractionMatch::new(date.value, 0.95, &caps[1]));
        }
    }

    if let Some(caps) = DUE_DATE.captures(text) {
        if let Some(date) = date_extractor.extract(&caps[1]) {
            result.due_date = Some(ExtractionMatch::new(date.value, 0.95, &caps[1]));
        }
    }

    if result.issue_date.is_none() {
        result.issue_date = date_extractor.extract_all(text).into_iter().next();
    }

    result
}

fn parse_year(s: &str) -> i32 {
    let year: i32 = s.parse().unwrap_or(0);
    if year < 100 {
        if year <= 50 { 2000 + year } else { 1900 + year }
    } else {
        year
    }
}

fn month_name_to_number(month: &str) -> u32 {
    match month.to_lowercase().as_str() {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_date_formats() {
        let extractor = DateExtractor::new();

        assert_eq!(
            extractor.extract("15.01.2024").unwrap().value,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert_eq!(
            extractor.extract("2024-01-15").unwrap().value,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert_eq!(
            extractor.extract("August 16, 2025").unwrap().value,
            NaiveDate::from_ymd_opt(2025, 8, 16).unwrap()
        );
        assert_eq!(
            extractor.extract("15.01.24").unwrap().value,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn test_labeled_dates() {
        let text = "Faktura VAT nr FV/3538/2025\n\
                    Data wystawienia: 16.08.2025\n\
                    Termin płatności: 30.08.2025";
        let dates = extract_dates(text);

        assert_eq!(
            dates.issue_date.unwrap().value,
            NaiveDate::from_ymd_opt(2025, 8, 16).unwrap()
        );
        assert_eq!(
            dates.due_date.unwrap().value,
            NaiveDate::from_ymd_opt(2025, 8, 30).unwrap()
        );
    }

    #[test]
    fn test_english_labels() {
        let text = "Invoice\nDate of issue: August 16, 2025\nDue date: 2025-08-30";
        let dates = extract_dates(text);

        assert_eq!(
            dates.issue_date.unwrap().value,
            NaiveDate::from_ymd_opt(2025, 8, 16).unwrap()
        );
        assert_eq!(
            dates.due_date.unwrap().value,
            NaiveDate::from_ymd_opt(2025, 8, 30).unwrap()
        );
    }

    #[test]
    fn test_fallback_to_first_date() {
        let dates = extract_dates("Some text 05.03.2025 more text");
        assert_eq!(
            dates.issue_date.unwrap().value,
            NaiveDate::from_ymd_opt(2025, 3, 5).unwrap()
        );
    }
}
