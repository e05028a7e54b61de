// # Reading Source Implementations
//
// This module provides implementations of the ReadingSource trait.

pub mod memory;
pub mod ndjson;

pub use memory::MemoryReadingSource;
pub use ndjson::NdjsonReadingSource;

use chrono::{DateTime, Utc};

use crate::traits::Reading;

/// Keep readings newer than `after`, newest-first, at most `limit`
pub(crate) fn newest_after(
    readings: impl IntoIterator<Item = Reading>,
    after: DateTime<Utc>,
    limit: usize,
) -> Vec<Reading> {
    let mut selected: Vec<Reading> = readings
        .into_iter()
        .filter(|reading| reading.timestamp > after)
        .collect();
    selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    selected.truncate(limit);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_after_orders_and_limits() {
        let base: DateTime<Utc> = "2026-01-09T12:00:00Z".parse().unwrap();
        let readings = (0..5).map(|i| Reading::new(base + chrono::Duration::minutes(5 * i), 100.0));

        let selected = newest_after(readings, base, 3);
        let minutes: Vec<i64> = selected
            .iter()
            .map(|r| (r.timestamp - base).num_minutes())
            .collect();

        // Strictly after `base`, newest first, limited to 3
        assert_eq!(minutes, vec![20, 15, 10]);
    }
}
