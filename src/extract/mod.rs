//! Turns raw OCR text into forecast records.

pub mod normalize;
pub mod rows;
pub mod submission;

pub use normalize::{normalize_row, ExtractError, ForecastRecord, EXPECTED_TOKENS, HEADERS};
pub use rows::{extract_rows, RawRow};
pub use submission::extract_submission_date;

use tracing::warn;

/// Records parsed from one OCR text, plus the rows that had to be dropped.
#[derive(Debug, Default)]
pub struct Extraction {
    pub submission_date: Option<String>,
    pub records: Vec<ForecastRecord>,
    pub rejected: Vec<ExtractError>,
}

/// Run row extraction, submission-date extraction and normalization over
/// the whole text. Malformed rows are logged and skipped.
pub fn extract_records(text: &str) -> Extraction {
    let submission_date = extract_submission_date(text);
    if submission_date.is_none() {
        warn!("no submission date found; Submission_Date will be empty");
    }

    let mut out = Extraction {
        submission_date,
        ..Default::default()
    };
    for row in extract_rows(text) {
        match normalize_row(&row, out.submission_date.as_deref()) {
            Ok(rec) => out.records.push(rec),
            Err(e) => {
                warn!(tokens = row.len(), line = %row.line, "skipping row: {}", e);
                out.rejected.push(e);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_text_end_to_end() {
        let text = "\
Passenger Forecast
Submitted 1/5/2024 11:32:10 AM
Day Date TSA Dom TSA Intl O&D Conn Total Seats LF T A B C D E F
Monday, January 5, 2024 150 25 100 75 175 3500 0.05 10 20 5 15 8 12 20
Tuesday, January 6, 2024 150 25
";
        let out = extract_records(text);
        assert_eq!(out.submission_date.as_deref(), Some("1/5/2024 11:32:10 AM"));
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.rejected.len(), 1);

        let rec = &out.records[0];
        assert_eq!(rec.day, "Monday");
        assert_eq!(rec.month, "January");
        assert_eq!(rec.date, "5");
        assert_eq!(rec.year, "2024");
        assert_eq!(
            rec.to_row()[5..],
            ["150", "25", "100", "75", "175", "3500", "0.05", "10", "20", "5", "15", "8", "12", "20"]
        );
    }

    #[test]
    fn every_record_shares_the_submission_date() {
        let text = "\
Monday, January 5, 2024 1 2 3 4 5 6 7 8 9 10 11 12 13 14
9/9/2024 1:00:00 PM
Tuesday, January 6, 2024 1 2 3 4 5 6 7 8 9 10 11 12 13 14
";
        let out = extract_records(text);
        assert_eq!(out.records.len(), 2);
        assert!(out
            .records
            .iter()
            .all(|r| r.submission_date.as_deref() == Some("9/9/2024 1:00:00 PM")));
    }
}
