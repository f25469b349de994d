//! Sums the cost column of TSV report payloads.
//!
//! The service may emit placeholder rows, so parsing is permissive: blank
//! and `-` cells count as zero, anything else that is not a finite number
//! is skipped and counted in [`SpendTally::skipped`].

use csv::ReaderBuilder;

/// Result of summing one payload.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SpendTally {
    pub total: f64,
    /// Rows whose cost cell could not be parsed.
    pub skipped: usize,
}

/// Sums the first cell of every row, see [`tally_cost`].
pub fn sum_cost(text: &str) -> f64 {
    tally_cost(text).total
}

pub fn tally_cost(text: &str) -> SpendTally {
    let mut tally = SpendTally::default();
    if text.trim().is_empty() {
        return tally;
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(text.as_bytes());

    for record in reader.records() {
        let Ok(record) = record else {
            tally.skipped += 1;
            continue;
        };
        let cell = record.get(0).map(str::trim).unwrap_or_default();
        if cell.is_empty() || cell == "-" {
            continue;
        }
        match cell.parse::<f64>() {
            Ok(cost) if cost.is_finite() => tally.total += cost,
            _ => tally.skipped += 1,
        }
    }

    tally
}
