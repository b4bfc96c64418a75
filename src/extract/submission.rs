use once_cell::sync::Lazy;
use regex::Regex;

static SUBMISSION_STAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{1,2}/\d{1,2}/\d{4}\s+\d{1,2}:\d{2}:\d{2}\s+(AM|PM)")
        .expect("submission timestamp regex should compile")
});

/// Find the report's submission timestamp, e.g. `1/5/2024 11:32:10 AM`.
///
/// Lines are scanned in order and the first match wins. Matching is done per
/// line so a stamp never spans a line break.
pub fn extract_submission_date(text: &str) -> Option<String> {
    text.lines()
        .find_map(|line| SUBMISSION_STAMP.find(line))
        .map(|m| m.as_str().to_string())
}
