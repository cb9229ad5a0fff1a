use chrono::{Datelike, NaiveDate};

pub const DECADE_KEY: &str = "Decade";
pub const YEAR_KEY: &str = "Year";
pub const MONTH_KEY: &str = "Month";
pub const DAY_KEY: &str = "Day";

/// One metadata record: column name -> cell value, in column order.
///
/// Blank cells are never stored, so `get` returning `Some` always means a
/// non-empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(String, String)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a cell. Values are trimmed; blank values are dropped.
    pub fn insert(&mut self, key: impl Into<String>, value: impl AsRef<str>) {
        let key = key.into();
        let value = value.as_ref().trim();
        if key.is_empty() || value.is_empty() {
            return;
        }

        match self.cells.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.cells.push((key, value.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Store `Decade`, `Year`, `Month` and `Day` derived from a date cell.
    pub fn insert_date_parts(&mut self, date: NaiveDate) {
        let year = format!("{:04}", date.year());
        self.insert(DECADE_KEY, decade_of(&year));
        self.insert(MONTH_KEY, format!("{:02}", date.month()));
        self.insert(DAY_KEY, format!("{:02}", date.day()));
        self.insert(YEAR_KEY, year);
    }
}

impl<K: Into<String>, V: AsRef<str>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

/// `"1987"` -> `"1980s"`: first three digits of the year plus `0s`.
pub fn decade_of(year: &str) -> String {
    let prefix: String = year.chars().take(3).collect();
    format!("{}0s", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_cells_are_absent() {
        let mut row = Row::new();
        row.insert("GUID", "  ");
        row.insert("Title", " Pilot ");
        assert!(!row.contains("GUID"));
        assert_eq!(row.get("Title"), Some("Pilot"));
        assert_eq!(row.len(), 1);
    }

    #[test]
    fn test_insert_replaces_and_keeps_order() {
        let mut row: Row = [("A", "1"), ("B", "2")].into_iter().collect();
        row.insert("A", "3");
        let cells: Vec<_> = row.iter().collect();
        assert_eq!(cells, vec![("A", "3"), ("B", "2")]);
    }

    #[test]
    fn test_date_parts() {
        let mut row = Row::new();
        row.insert_date_parts(NaiveDate::from_ymd_opt(1987, 3, 9).unwrap());
        assert_eq!(row.get(DECADE_KEY), Some("1980s"));
        assert_eq!(row.get(YEAR_KEY), Some("1987"));
        assert_eq!(row.get(MONTH_KEY), Some("03"));
        assert_eq!(row.get(DAY_KEY), Some("09"));
    }

    #[test]
    fn test_decade_of() {
        assert_eq!(decade_of("2004"), "2000s");
        assert_eq!(decade_of("1999"), "1990s");
    }
}
