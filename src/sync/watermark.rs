// ABOUTME: WatermarkStore - in-memory high-water marks per replicated table
// ABOUTME: Owned by the orchestrator and lent to each table sync; lost on restart

use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::fmt;

/// Position up to which a table has been replicated (an ordering-column timestamp).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(NaiveDateTime);

impl Watermark {
    pub fn new(position: NaiveDateTime) -> Self {
        Self(position)
    }

    pub fn position(&self) -> NaiveDateTime {
        self.0
    }
}

impl From<NaiveDateTime> for Watermark {
    fn from(position: NaiveDateTime) -> Self {
        Self(position)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S%.6f"))
    }
}

/// Per-table watermarks for the lifetime of the process.
///
/// There is no persistence: a restart begins every table from its earliest
/// record again. Only one table sync runs at a time, so `&mut` access is the
/// only synchronization needed.
#[derive(Debug, Default, Clone)]
pub struct WatermarkStore {
    marks: HashMap<String, Watermark>,
}

impl WatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current watermark for `table`, or `None` before its first successful load.
    pub fn get(&self, table: &str) -> Option<Watermark> {
        self.marks.get(table).copied()
    }

    /// Record the maximum position of a batch the sink has accepted.
    ///
    /// Overwrites unconditionally; callers only pass positions drawn from
    /// records fetched strictly after the previous watermark.
    pub fn advance(&mut self, table: &str, watermark: Watermark) {
        self.marks.insert(table.to_string(), watermark);
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Watermark)> {
        self.marks.iter().map(|(table, mark)| (table.as_str(), *mark))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_absent_before_first_advance() {
        let store = WatermarkStore::new();
        assert!(store.get("users").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_advance_overwrites() {
        let mut store = WatermarkStore::new();
        store.advance("users", Watermark::new(ts(1)));
        store.advance("users", Watermark::new(ts(2)));
        assert_eq!(store.get("users"), Some(Watermark::new(ts(2))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_tables_are_independent() {
        let mut store = WatermarkStore::new();
        store.advance("users", Watermark::new(ts(1)));
        store.advance("alerts", Watermark::new(ts(5)));
        assert_eq!(store.get("users"), Some(Watermark::new(ts(1))));
        assert_eq!(store.get("alerts"), Some(Watermark::new(ts(5))));
        assert!(store.get("wallets").is_none());

        let mut tables: Vec<&str> = store.iter().map(|(t, _)| t).collect();
        tables.sort();
        assert_eq!(tables, vec!["alerts", "users"]);
    }

    #[test]
    fn test_watermark_ordering_and_display() {
        assert!(Watermark::new(ts(1)) < Watermark::new(ts(2)));
        assert_eq!(
            Watermark::new(ts(1)).to_string(),
            "2024-03-01 12:00:00.000000"
        );
    }
}
