//! Domain types for domus-io.

use std::collections::HashSet;

use crate::IoError;

/// One typed column of a [`ListingTable`].
///
/// Missing cells (JSON `null` or an absent key) are `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Numbers and booleans (`true` = 1.0, `false` = 0.0).
    Numeric(Vec<Option<f64>>),
    /// Free text, such as categorical levels or URLs.
    Text(Vec<Option<String>>),
}

impl Column {
    /// Return the number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    /// Return `true` if the column holds no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return `"numeric"` or `"text"`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Column::Numeric(_) => "numeric",
            Column::Text(_) => "text",
        }
    }

    /// Return `true` if the cell at `row` is missing.
    #[must_use]
    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            Column::Numeric(v) => v[row].is_none(),
            Column::Text(v) => v[row].is_none(),
        }
    }

    fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::Numeric(v) => Column::Numeric(rows.iter().map(|&r| v[r]).collect()),
            Column::Text(v) => Column::Text(rows.iter().map(|&r| v[r].clone()).collect()),
        }
    }

    fn cell_key(&self, row: usize) -> CellKey<'_> {
        match self {
            Column::Numeric(v) => v[row].map_or(CellKey::Missing, |x| CellKey::Number(x.to_bits())),
            Column::Text(v) => v[row].as_deref().map_or(CellKey::Missing, CellKey::Text),
        }
    }
}

#[derive(PartialEq, Eq, Hash)]
enum CellKey<'a> {
    Missing,
    Number(u64),
    Text(&'a str),
}

/// A table of property listings: one row per listing, one named column per
/// attribute.
///
/// Produced by [`ListingReader`](crate::ListingReader). Column names are
/// unique; every column has exactly [`n_rows`](Self::n_rows) cells.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingTable {
    names: Vec<String>,
    columns: Vec<Column>,
    n_rows: usize,
}

impl ListingTable {
    /// Create an empty table with `n_rows` rows and no columns.
    #[must_use]
    pub fn new(n_rows: usize) -> Self {
        Self {
            names: Vec::new(),
            columns: Vec::new(),
            n_rows,
        }
    }

    /// Build a table from `(name, column)` pairs.
    ///
    /// Later pairs replace earlier pairs with the same name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::LengthMismatch`] if the columns differ in length.
    pub fn from_columns(columns: Vec<(String, Column)>) -> Result<Self, IoError> {
        let n_rows = columns.first().map_or(0, |(_, c)| c.len());
        let mut table = Self::new(n_rows);
        for (name, column) in columns {
            table.insert_column(name, column)?;
        }
        Ok(table)
    }

    /// Return the number of rows (listings).
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Return the number of columns.
    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Return the column names in table order.
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Return `true` if a column with this name exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Look up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.position(name).map(|i| &self.columns[i])
    }

    /// Iterate over `(name, column)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    /// Borrow a numeric column.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::MissingColumn`] | No column with this name |
    /// | [`IoError::ColumnType`] | The column holds text |
    pub fn numeric(&self, name: &str) -> Result<&[Option<f64>], IoError> {
        match self.column(name) {
            Some(Column::Numeric(v)) => Ok(v),
            Some(other) => Err(IoError::ColumnType {
                name: name.to_string(),
                expected: "numeric",
                found: other.kind(),
            }),
            None => Err(IoError::MissingColumn { name: name.to_string() }),
        }
    }

    /// Borrow a text column.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::MissingColumn`] | No column with this name |
    /// | [`IoError::ColumnType`] | The column holds numbers |
    pub fn text(&self, name: &str) -> Result<&[Option<String>], IoError> {
        match self.column(name) {
            Some(Column::Text(v)) => Ok(v),
            Some(other) => Err(IoError::ColumnType {
                name: name.to_string(),
                expected: "text",
                found: other.kind(),
            }),
            None => Err(IoError::MissingColumn { name: name.to_string() }),
        }
    }

    /// Insert a column, replacing any existing column of the same name in place.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::LengthMismatch`] if the column length differs from
    /// the table height.
    pub fn insert_column(&mut self, name: impl Into<String>, column: Column) -> Result<(), IoError> {
        let name = name.into();
        if column.len() != self.n_rows {
            return Err(IoError::LengthMismatch {
                name,
                expected: self.n_rows,
                got: column.len(),
            });
        }
        match self.position(&name) {
            Some(i) => self.columns[i] = column,
            None => {
                self.names.push(name);
                self.columns.push(column);
            }
        }
        Ok(())
    }

    /// Insert a numeric column. See [`insert_column`](Self::insert_column).
    ///
    /// # Errors
    ///
    /// Returns [`IoError::LengthMismatch`] on a height mismatch.
    pub fn insert_numeric(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<(), IoError> {
        self.insert_column(name, Column::Numeric(values))
    }

    /// Remove the named columns. Names that do not exist are ignored.
    ///
    /// Returns the number of columns removed.
    pub fn drop_columns(&mut self, names: &[&str]) -> usize {
        let before = self.columns.len();
        let mut i = 0;
        while i < self.names.len() {
            if names.contains(&self.names[i].as_str()) {
                self.names.remove(i);
                self.columns.remove(i);
            } else {
                i += 1;
            }
        }
        before - self.columns.len()
    }

    /// Keep only the rows where `mask[row]` is `true`.
    ///
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::LengthMismatch`] if `mask.len() != n_rows`.
    pub fn retain_rows(&mut self, mask: &[bool]) -> Result<usize, IoError> {
        if mask.len() != self.n_rows {
            return Err(IoError::LengthMismatch {
                name: "row mask".to_string(),
                expected: self.n_rows,
                got: mask.len(),
            });
        }
        let keep: Vec<usize> = (0..self.n_rows).filter(|&r| mask[r]).collect();
        let removed = self.n_rows - keep.len();
        if removed > 0 {
            self.take_rows(&keep);
        }
        Ok(removed)
    }

    /// Return a table holding the given rows, in the given order.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds.
    #[must_use]
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            n_rows: rows.len(),
        }
    }

    /// Remove rows identical (cell by cell, across every column) to an
    /// earlier row. Returns the number of rows removed.
    pub fn drop_duplicate_rows(&mut self) -> usize {
        self.drop_duplicate_rows_except(&[])
    }

    /// Like [`drop_duplicate_rows`](Self::drop_duplicate_rows), but the
    /// columns named in `ignore` take no part in the comparison.
    pub fn drop_duplicate_rows_except(&mut self, ignore: &[&str]) -> usize {
        let keep: Vec<usize> = {
            let compared: Vec<&Column> = self
                .names
                .iter()
                .zip(&self.columns)
                .filter(|(name, _)| !ignore.contains(&name.as_str()))
                .map(|(_, column)| column)
                .collect();
            let mut seen: HashSet<Vec<CellKey<'_>>> = HashSet::with_capacity(self.n_rows);
            (0..self.n_rows)
                .filter(|&r| {
                    let key: Vec<CellKey<'_>> = compared.iter().map(|c| c.cell_key(r)).collect();
                    seen.insert(key)
                })
                .collect()
        };
        let removed = self.n_rows - keep.len();
        if removed > 0 {
            self.take_rows(&keep);
        }
        removed
    }

    fn take_rows(&mut self, rows: &[usize]) {
        self.columns = self.columns.iter().map(|c| c.take(rows)).collect();
        self.n_rows = rows.len();
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// A validated experiment name for output file naming.
///
/// Must match `[a-zA-Z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentName(String);

impl ExperimentName {
    /// Parse and validate an experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidExperimentName`] if the name is empty or
    /// contains characters outside `[a-zA-Z0-9_-]`.
    pub fn new(name: String) -> Result<Self, IoError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(IoError::InvalidExperimentName { name });
        }
        Ok(Self(name))
    }

    /// Return the experiment name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExperimentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> ListingTable {
        ListingTable::from_columns(vec![
            (
                "Price".to_string(),
                Column::Numeric(vec![Some(100.0), Some(200.0), Some(100.0), None]),
            ),
            (
                "Kitchen".to_string(),
                Column::Text(vec![
                    Some("installed".into()),
                    None,
                    Some("installed".into()),
                    Some("semi equipped".into()),
                ]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn from_columns_rejects_ragged() {
        let result = ListingTable::from_columns(vec![
            ("a".to_string(), Column::Numeric(vec![Some(1.0)])),
            ("b".to_string(), Column::Numeric(vec![Some(1.0), Some(2.0)])),
        ]);
        assert!(matches!(result, Err(IoError::LengthMismatch { expected: 1, got: 2, .. })));
    }

    #[test]
    fn typed_access() {
        let table = sample_table();
        assert_eq!(table.numeric("Price").unwrap()[1], Some(200.0));
        assert_eq!(table.text("Kitchen").unwrap()[3].as_deref(), Some("semi equipped"));
        assert!(matches!(table.text("Price"), Err(IoError::ColumnType { .. })));
        assert!(matches!(table.numeric("Nope"), Err(IoError::MissingColumn { .. })));
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut table = sample_table();
        table
            .insert_numeric("Price", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)])
            .unwrap();
        assert_eq!(table.column_names(), &["Price".to_string(), "Kitchen".to_string()]);
        assert_eq!(table.numeric("Price").unwrap()[3], Some(4.0));
    }

    #[test]
    fn drop_columns_ignores_unknown() {
        let mut table = sample_table();
        assert_eq!(table.drop_columns(&["Kitchen", "Url"]), 1);
        assert_eq!(table.n_columns(), 1);
    }

    #[test]
    fn retain_rows_filters_every_column() {
        let mut table = sample_table();
        let removed = table.retain_rows(&[true, false, true, false]).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.numeric("Price").unwrap(), &[Some(100.0), Some(100.0)]);
        assert!(matches!(table.retain_rows(&[true]), Err(IoError::LengthMismatch { .. })));
    }

    #[test]
    fn select_rows_reorders_and_keeps_names() {
        let table = sample_table();
        let subset = table.select_rows(&[3, 1]);
        assert_eq!(subset.n_rows(), 2);
        assert_eq!(subset.column_names(), table.column_names());
        assert_eq!(subset.numeric("Price").unwrap(), &[None, Some(200.0)]);
        assert_eq!(subset.text("Kitchen").unwrap(), &[Some("semi equipped".to_string()), None]);
        assert_eq!(table.n_rows(), 4);
    }

    #[test]
    fn drop_duplicate_rows_keeps_first() {
        let mut table = sample_table();
        assert_eq!(table.drop_duplicate_rows(), 1);
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.numeric("Price").unwrap(), &[Some(100.0), Some(200.0), None]);
    }

    #[test]
    fn drop_duplicate_rows_except_ignores_id_column() {
        let mut table = sample_table();
        table
            .insert_column(
                "id",
                Column::Text(vec![Some("a".into()), Some("b".into()), Some("c".into()), Some("d".into())]),
            )
            .unwrap();
        assert_eq!(table.drop_duplicate_rows(), 0);
        assert_eq!(table.drop_duplicate_rows_except(&["id"]), 1);
        assert_eq!(table.text("id").unwrap()[2].as_deref(), Some("d"));
    }

    #[test]
    fn experiment_name_valid() {
        let name = ExperimentName::new("immo-run_01".to_string());
        assert_eq!(name.unwrap().as_str(), "immo-run_01");
    }

    #[test]
    fn experiment_name_rejects_empty() {
        let name = ExperimentName::new(String::new());
        assert!(matches!(name, Err(IoError::InvalidExperimentName { .. })));
    }

    #[test]
    fn experiment_name_rejects_special_chars() {
        let name = ExperimentName::new("my experiment!".to_string());
        assert!(matches!(name, Err(IoError::InvalidExperimentName { .. })));
    }
}
