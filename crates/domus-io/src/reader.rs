//! JSON listing reader with input validation and column type inference.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Number, Value};
use tracing::{debug, info, instrument};

use crate::domain::{Column, ListingTable};
use crate::IoError;

/// Reads property listings from a JSON file.
///
/// Two layouts are accepted:
/// - records: `[{"Price": 250000, "Kitchen": "installed", ...}, ...]`
/// - columns: `{"Price": {"0": 250000, "1": 310000}, "Kitchen": {...}}`,
///   where row keys are integers (sorted numerically to give row order).
///
/// A column is numeric when every present value is a number or boolean,
/// text otherwise. `null` and absent keys are missing values.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::JsonParse`] | Malformed JSON |
/// | [`IoError::UnsupportedLayout`] | Top level is not an array of records or object of columns |
/// | [`IoError::RecordNotObject`] | A records-array element is not an object |
/// | [`IoError::NonScalarValue`] | A cell is an array or object |
/// | [`IoError::InvalidRowKey`] | A column-layout row key is not an integer |
/// | [`IoError::EmptyDataset`] | Zero listings |
pub struct ListingReader {
    path: PathBuf,
}

/// A scalar JSON cell before the column type is decided.
enum Cell {
    Missing,
    Number(Number),
    Bool(bool),
    Text(String),
}

/// Column builder: cells accumulated in row order.
struct RawColumn {
    name: String,
    cells: Vec<Cell>,
}

impl ListingReader {
    /// Create a new reader for the given JSON file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read and validate the JSON file, returning a [`ListingTable`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<ListingTable, IoError> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;
        self.parse(&text)
    }

    /// Parse JSON text already in memory. `read` delegates here.
    ///
    /// # Errors
    ///
    /// Same as [`read`](Self::read), minus [`IoError::FileNotFound`].
    pub fn parse(&self, text: &str) -> Result<ListingTable, IoError> {
        let value: Value = serde_json::from_str(text).map_err(|e| IoError::JsonParse {
            path: self.path.clone(),
            line: e.line(),
            column: e.column(),
            source: e,
        })?;

        let (raw_columns, n_rows) = match value {
            Value::Array(records) => {
                debug!(n_records = records.len(), "records layout");
                self.collect_records(records)?
            }
            Value::Object(columns) => {
                debug!(n_columns = columns.len(), "columns layout");
                self.collect_columns(columns)?
            }
            other => {
                return Err(IoError::UnsupportedLayout {
                    path: self.path.clone(),
                    found: value_kind(&other),
                });
            }
        };

        if n_rows == 0 {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        let mut table = ListingTable::new(n_rows);
        for raw in raw_columns {
            let column = infer_column(raw.cells);
            table.insert_column(raw.name, column)?;
        }

        info!(
            n_listings = table.n_rows(),
            n_columns = table.n_columns(),
            "listings loaded"
        );

        Ok(table)
    }

    fn collect_records(&self, records: Vec<Value>) -> Result<(Vec<RawColumn>, usize), IoError> {
        let n_rows = records.len();
        let mut columns: Vec<RawColumn> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for (row_index, record) in records.into_iter().enumerate() {
            let Value::Object(fields) = record else {
                return Err(IoError::RecordNotObject {
                    path: self.path.clone(),
                    row_index,
                });
            };
            for (name, value) in fields {
                let cell = self.to_cell(value, row_index, &name)?;
                let col = match index.get(&name) {
                    Some(&i) => i,
                    None => {
                        // Rows before this column first appeared are missing.
                        let mut cells = Vec::with_capacity(n_rows);
                        cells.resize_with(row_index, || Cell::Missing);
                        columns.push(RawColumn {
                            name: name.clone(),
                            cells,
                        });
                        index.insert(name, columns.len() - 1);
                        columns.len() - 1
                    }
                };
                let cells = &mut columns[col].cells;
                cells.resize_with(row_index, || Cell::Missing);
                cells.push(cell);
            }
        }

        for column in &mut columns {
            column.cells.resize_with(n_rows, || Cell::Missing);
        }

        Ok((columns, n_rows))
    }

    fn collect_columns(&self, object: Map<String, Value>) -> Result<(Vec<RawColumn>, usize), IoError> {
        // First pass: collect every row key so that all columns share one row order.
        let mut per_column: Vec<(String, Vec<(u64, Value)>)> = Vec::with_capacity(object.len());
        let mut all_keys: Vec<u64> = Vec::new();

        for (name, value) in object {
            let Value::Object(cells) = value else {
                return Err(IoError::UnsupportedLayout {
                    path: self.path.clone(),
                    found: "object whose values are not column objects",
                });
            };
            let mut entries = Vec::with_capacity(cells.len());
            for (key, cell) in cells {
                let row_key: u64 = key.parse().map_err(|_| IoError::InvalidRowKey {
                    path: self.path.clone(),
                    column: name.clone(),
                    key: key.clone(),
                })?;
                all_keys.push(row_key);
                entries.push((row_key, cell));
            }
            per_column.push((name, entries));
        }

        all_keys.sort_unstable();
        all_keys.dedup();
        let n_rows = all_keys.len();
        let position: HashMap<u64, usize> =
            all_keys.iter().enumerate().map(|(i, &k)| (k, i)).collect();

        let mut columns = Vec::with_capacity(per_column.len());
        for (name, entries) in per_column {
            let mut cells = Vec::with_capacity(n_rows);
            cells.resize_with(n_rows, || Cell::Missing);
            for (row_key, value) in entries {
                let row_index = position[&row_key];
                cells[row_index] = self.to_cell(value, row_index, &name)?;
            }
            columns.push(RawColumn { name, cells });
        }

        Ok((columns, n_rows))
    }

    fn to_cell(&self, value: Value, row_index: usize, column: &str) -> Result<Cell, IoError> {
        match value {
            Value::Null => Ok(Cell::Missing),
            Value::Bool(b) => Ok(Cell::Bool(b)),
            Value::Number(n) => Ok(Cell::Number(n)),
            Value::String(s) => Ok(Cell::Text(s)),
            Value::Array(_) | Value::Object(_) => Err(IoError::NonScalarValue {
                path: self.path.clone(),
                row_index,
                column: column.to_string(),
            }),
        }
    }
}

/// Decide a column's type from its cells and convert.
fn infer_column(cells: Vec<Cell>) -> Column {
    let is_text = cells.iter().any(|c| matches!(c, Cell::Text(_)));
    if is_text {
        Column::Text(
            cells
                .into_iter()
                .map(|c| match c {
                    Cell::Missing => None,
                    Cell::Number(n) => Some(n.to_string()),
                    Cell::Bool(b) => Some(b.to_string()),
                    Cell::Text(s) => Some(s),
                })
                .collect(),
        )
    } else {
        Column::Numeric(
            cells
                .into_iter()
                .map(|c| match c {
                    Cell::Number(n) => n.as_f64().filter(|v| v.is_finite()),
                    Cell::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
                    Cell::Missing | Cell::Text(_) => None,
                })
                .collect(),
        )
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_json(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn read_records_layout() {
        let json = r#"[
            {"PropertyId": 1, "Price": 250000, "Kitchen": "installed", "Terrace": true},
            {"PropertyId": 2, "Price": 310000, "Kitchen": null, "Terrace": false}
        ]"#;
        let f = write_json(json);
        let table = ListingReader::new(f.path()).read().unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.column_names()[0], "PropertyId");
        assert_eq!(table.numeric("Price").unwrap(), &[Some(250000.0), Some(310000.0)]);
        assert_eq!(table.numeric("Terrace").unwrap(), &[Some(1.0), Some(0.0)]);
        assert_eq!(table.text("Kitchen").unwrap()[1], None);
    }

    #[test]
    fn absent_keys_are_missing() {
        let json = r#"[{"Price": 1}, {"Price": 2, "Openfire": 1}, {"Price": 3}]"#;
        let f = write_json(json);
        let table = ListingReader::new(f.path()).read().unwrap();
        assert_eq!(table.numeric("Openfire").unwrap(), &[None, Some(1.0), None]);
    }

    #[test]
    fn read_columns_layout_sorted_numerically() {
        let json = r#"{
            "Price": {"10": 3.0, "2": 2.0, "1": 1.0},
            "Heating": {"1": "gas", "10": "wood"}
        }"#;
        let f = write_json(json);
        let table = ListingReader::new(f.path()).read().unwrap();
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.numeric("Price").unwrap(), &[Some(1.0), Some(2.0), Some(3.0)]);
        let heating = table.text("Heating").unwrap();
        assert_eq!(heating[0].as_deref(), Some("gas"));
        assert_eq!(heating[1], None);
        assert_eq!(heating[2].as_deref(), Some("wood"));
    }

    #[test]
    fn mixed_column_becomes_text() {
        let json = r#"[{"PostalCode": 1000}, {"PostalCode": "B-2000"}]"#;
        let f = write_json(json);
        let table = ListingReader::new(f.path()).read().unwrap();
        let codes = table.text("PostalCode").unwrap();
        assert_eq!(codes[0].as_deref(), Some("1000"));
        assert_eq!(codes[1].as_deref(), Some("B-2000"));
    }

    #[test]
    fn error_file_not_found() {
        let result = ListingReader::new(Path::new("/nonexistent/train.json")).read();
        assert!(matches!(result, Err(IoError::FileNotFound { .. })));
    }

    #[test]
    fn error_malformed_json() {
        let f = write_json("[{\"Price\": 1,}");
        let result = ListingReader::new(f.path()).read();
        assert!(matches!(result, Err(IoError::JsonParse { .. })));
    }

    #[test]
    fn error_empty_dataset() {
        let f = write_json("[]");
        let result = ListingReader::new(f.path()).read();
        assert!(matches!(result, Err(IoError::EmptyDataset { .. })));
    }

    #[test]
    fn error_scalar_top_level() {
        let f = write_json("42");
        let result = ListingReader::new(f.path()).read();
        assert!(matches!(result, Err(IoError::UnsupportedLayout { found: "number", .. })));
    }

    #[test]
    fn error_record_not_object() {
        let f = write_json(r#"[{"Price": 1}, 7]"#);
        let result = ListingReader::new(f.path()).read();
        assert!(matches!(result, Err(IoError::RecordNotObject { row_index: 1, .. })));
    }

    #[test]
    fn error_nested_value() {
        let f = write_json(r#"[{"Price": [1, 2]}]"#);
        let result = ListingReader::new(f.path()).read();
        assert!(matches!(result, Err(IoError::NonScalarValue { row_index: 0, .. })));
    }

    #[test]
    fn error_bad_row_key() {
        let f = write_json(r#"{"Price": {"a": 1}}"#);
        let result = ListingReader::new(f.path()).read();
        assert!(matches!(result, Err(IoError::InvalidRowKey { .. })));
    }
}
