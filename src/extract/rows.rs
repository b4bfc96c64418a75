use once_cell::sync::Lazy;
use regex::Regex;

/// A data line is any trimmed line starting with a weekday name and a comma,
/// e.g. `Monday, January 5, 2024 150 25 ...`.
static DAY_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(Monday|Tuesday|Wednesday|Thursday|Friday|Saturday|Sunday),")
        .expect("weekday prefix regex should compile")
});

/// Whitespace-separated tokens of one OCR line that looked like a data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// The trimmed source line, kept for diagnostics.
    pub line: String,
    pub tokens: Vec<String>,
}

impl RawRow {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Lazily yield a `RawRow` for every line whose trimmed text starts with a
/// weekday prefix, in source order.
///
/// Lines that do not match are dropped without error: headers, blank lines
/// and OCR noise are filtered out this way. A data line whose weekday was
/// garbled by OCR is dropped too.
pub fn extract_rows(text: &str) -> impl Iterator<Item = RawRow> + '_ {
    text.lines().filter_map(|line| {
        let trimmed = line.trim();
        if !DAY_PREFIX.is_match(trimmed) {
            return None;
        }
        Some(RawRow {
            line: trimmed.to_string(),
            tokens: trimmed.split_whitespace().map(str::to_string).collect(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
PASSENGER FORECAST REPORT
Day Month Date Year TSA Dom TSA Intl
  Monday, January 5, 2024 150 25 100 75 175 3500 0.05 10 20 5 15 8 12 20
Tuesday, January 6, 2024 160 30 110 80 190 3600 0.05 11 21 6 16 9 13 21

Wednesdy, January 7, 2024 1 2 3
Total 310 55
";

    #[test]
    fn keeps_only_weekday_lines_in_order() {
        let rows: Vec<RawRow> = extract_rows(SAMPLE).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].tokens[0], "Monday,");
        assert_eq!(rows[1].tokens[0], "Tuesday,");
        assert_eq!(rows[0].len(), 18);
    }

    #[test]
    fn leading_whitespace_is_trimmed_before_matching() {
        let rows: Vec<RawRow> = extract_rows("\t  Sunday, March 3, 2024 1").collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].line, "Sunday, March 3, 2024 1");
        assert_eq!(rows[0].tokens, vec!["Sunday,", "March", "3,", "2024", "1"]);
    }

    #[test]
    fn weekday_without_comma_is_not_a_row() {
        assert_eq!(extract_rows("Monday January 5 2024 1 2 3").count(), 0);
        assert_eq!(extract_rows("monday, January 5, 2024").count(), 0);
        assert_eq!(extract_rows("Report for Monday, January 5").count(), 0);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert_eq!(extract_rows("").count(), 0);
        assert_eq!(extract_rows("\n\n   \n").count(), 0);
    }

    #[test]
    fn runs_of_whitespace_split_as_one() {
        let rows: Vec<RawRow> = extract_rows("Friday,   May\t10,  2024    7").collect();
        assert_eq!(rows[0].tokens, vec!["Friday,", "May", "10,", "2024", "7"]);
    }
}
