use serde::Serialize;
use thiserror::Error;

use super::rows::RawRow;

/// Day, Month, Date, Year followed by the 14 passenger figures.
pub const EXPECTED_TOKENS: usize = 18;

/// Column names in sheet order.
pub const HEADERS: [&str; 19] = [
    "Day",
    "Month",
    "Date",
    "Year",
    "Submission_Date",
    "TSA_Domestic",
    "TSA_International",
    "O&D",
    "Connecting",
    "Total_Passengers",
    "Scheduled_Seats",
    "Load_Factor",
    "T_Con",
    "A_Con",
    "B_Con",
    "C_Con",
    "D_Con",
    "E_Con",
    "F_Con",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error(
        "malformed row: expected {expected} tokens, found {tokens} in {line:?}",
        expected = EXPECTED_TOKENS
    )]
    MalformedRow { tokens: usize, line: String },
}

/// One normalized forecast row. Figures are kept exactly as OCR produced
/// them; the sheet does its own number parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForecastRecord {
    #[serde(rename = "Day")]
    pub day: String,
    #[serde(rename = "Month")]
    pub month: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Year")]
    pub year: String,
    #[serde(rename = "Submission_Date")]
    pub submission_date: Option<String>,
    #[serde(rename = "TSA_Domestic")]
    pub tsa_domestic: String,
    #[serde(rename = "TSA_International")]
    pub tsa_international: String,
    #[serde(rename = "O&D")]
    pub origin_destination: String,
    #[serde(rename = "Connecting")]
    pub connecting: String,
    #[serde(rename = "Total_Passengers")]
    pub total_passengers: String,
    #[serde(rename = "Scheduled_Seats")]
    pub scheduled_seats: String,
    #[serde(rename = "Load_Factor")]
    pub load_factor: String,
    #[serde(rename = "T_Con")]
    pub t_con: String,
    #[serde(rename = "A_Con")]
    pub a_con: String,
    #[serde(rename = "B_Con")]
    pub b_con: String,
    #[serde(rename = "C_Con")]
    pub c_con: String,
    #[serde(rename = "D_Con")]
    pub d_con: String,
    #[serde(rename = "E_Con")]
    pub e_con: String,
    #[serde(rename = "F_Con")]
    pub f_con: String,
}

impl ForecastRecord {
    /// Cells in `HEADERS` order. A missing submission date becomes an empty cell.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.day.clone(),
            self.month.clone(),
            self.date.clone(),
            self.year.clone(),
            self.submission_date.clone().unwrap_or_default(),
            self.tsa_domestic.clone(),
            self.tsa_international.clone(),
            self.origin_destination.clone(),
            self.connecting.clone(),
            self.total_passengers.clone(),
            self.scheduled_seats.clone(),
            self.load_factor.clone(),
            self.t_con.clone(),
            self.a_con.clone(),
            self.b_con.clone(),
            self.c_con.clone(),
            self.d_con.clone(),
            self.e_con.clone(),
            self.f_con.clone(),
        ]
    }
}

fn strip_comma(token: &str) -> String {
    token.trim_end_matches(',').to_string()
}

/// Map a raw row onto the fixed 19-column schema.
///
/// Rows that do not carry exactly `EXPECTED_TOKENS` tokens are rejected
/// instead of being shifted into the wrong columns.
pub fn normalize_row(
    row: &RawRow,
    submission_date: Option<&str>,
) -> Result<ForecastRecord, ExtractError> {
    let t = &row.tokens;
    if t.len() != EXPECTED_TOKENS {
        return Err(ExtractError::MalformedRow {
            tokens: t.len(),
            line: row.line.clone(),
        });
    }

    Ok(ForecastRecord {
        day: strip_comma(&t[0]),
        month: t[1].clone(),
        date: strip_comma(&t[2]),
        year: t[3].clone(),
        submission_date: submission_date.map(str::to_string),
        tsa_domestic: t[4].clone(),
        tsa_international: t[5].clone(),
        origin_destination: t[6].clone(),
        connecting: t[7].clone(),
        total_passengers: t[8].clone(),
        scheduled_seats: t[9].clone(),
        load_factor: t[10].clone(),
        t_con: t[11].clone(),
        a_con: t[12].clone(),
        b_con: t[13].clone(),
        c_con: t[14].clone(),
        d_con: t[15].clone(),
        e_con: t[16].clone(),
        f_con: t[17].clone(),
    })
}
