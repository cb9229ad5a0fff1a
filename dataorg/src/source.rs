use chrono::NaiveDate;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{DataorgError, DataorgResult};
use crate::row::Row;

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Metadata rows read from a CSV file. The header record is row 0, so the
/// first data row has index 1.
pub struct CsvSource {
    path: PathBuf,
    reader: csv::Reader<File>,
    headers: Vec<String>,
    date_format: String,
    next_index: u64,
}

impl CsvSource {
    pub fn open(path: impl Into<PathBuf>, date_format: &str) -> DataorgResult<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(DataorgError::InputNotFound { path });
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| DataorgError::InputReadFailed {
                row: 0,
                reason: e.to_string(),
            })?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| DataorgError::InputReadFailed {
                row: 0,
                reason: e.to_string(),
            })?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        info!("Reading {:?} with columns {:?}", path, headers);

        Ok(Self {
            path,
            reader,
            headers,
            date_format: date_format.to_string(),
            next_index: 1,
        })
    }

    /// Key the checkpoint for this input is stored under.
    pub fn input_id(&self) -> String {
        input_id(&self.path)
    }

    fn to_row(&self, record: &csv::StringRecord) -> Row {
        let mut row = Row::new();
        for (header, value) in self.headers.iter().zip(record.iter()) {
            row.insert(header.as_str(), value);
            if let Ok(date) = NaiveDate::parse_from_str(value.trim(), &self.date_format) {
                row.insert_date_parts(date);
            }
        }
        row
    }
}

impl Iterator for CsvSource {
    type Item = DataorgResult<(u64, Row)>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = csv::StringRecord::new();
        let index = self.next_index;

        match self.reader.read_record(&mut record) {
            Ok(false) => None,
            Ok(true) => {
                self.next_index += 1;
                let row = self.to_row(&record);
                debug!("Read row {} with {} cells", index, row.len());
                Some(Ok((index, row)))
            }
            Err(e) => {
                self.next_index += 1;
                Some(Err(DataorgError::InputReadFailed {
                    row: index,
                    reason: e.to_string(),
                }))
            }
        }
    }
}

/// Canonical full path of the input, or the path as given when it cannot be
/// resolved. Two inputs with the same file name never share a checkpoint.
pub fn input_id(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rows_are_indexed_after_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.csv");
        std::fs::write(
            &path,
            "GUID,Series Title,Air Date\nabc, Show ,1987-03-09\ndef,,not a date\n",
        )
        .unwrap();

        let source = CsvSource::open(&path, DEFAULT_DATE_FORMAT).unwrap();
        let canonical = std::fs::canonicalize(&path).unwrap();
        assert_eq!(source.input_id(), canonical.display().to_string());
        let rows: Vec<_> = source.map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);

        let (index, first) = &rows[0];
        assert_eq!(*index, 1);
        assert_eq!(first.get("Series Title"), Some("Show"));
        assert_eq!(first.get("Air Date"), Some("1987-03-09"));
        assert_eq!(first.get("Decade"), Some("1980s"));
        assert_eq!(first.get("Year"), Some("1987"));
        assert_eq!(first.get("Month"), Some("03"));
        assert_eq!(first.get("Day"), Some("09"));

        let (index, second) = &rows[1];
        assert_eq!(*index, 2);
        assert!(!second.contains("Series Title"));
        assert!(!second.contains("Decade"));
    }

    #[test]
    fn test_short_records_are_accepted() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("short.csv");
        std::fs::write(&path, "GUID,Title,Year\nabc\n").unwrap();

        let rows: Vec<_> = CsvSource::open(&path, DEFAULT_DATE_FORMAT)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows[0].1.get("GUID"), Some("abc"));
        assert!(!rows[0].1.contains("Title"));
    }

    #[test]
    fn test_missing_input() {
        let result = CsvSource::open("/definitely/not/here.csv", DEFAULT_DATE_FORMAT);
        assert!(matches!(result, Err(DataorgError::InputNotFound { .. })));
    }
}
