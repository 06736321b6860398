//! Categorical encoding with fixed ordered or fitted vocabularies.

use std::collections::BTreeSet;

use domus_io::{Column, ListingTable};
use tracing::debug;

use crate::error::PrepError;

/// Code assigned to missing values and to levels outside the vocabulary.
pub const UNKNOWN_CODE: f64 = -1.0;

/// An ordered list of categorical levels.
///
/// A level's code is its position in the list. Missing values and values not
/// in the list encode as [`UNKNOWN_CODE`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Vocabulary {
    levels: Vec<String>,
}

impl Vocabulary {
    /// Build a vocabulary from levels in their intended order.
    pub fn ordered<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            levels: levels.into_iter().map(Into::into).collect(),
        }
    }

    /// Learn an unordered vocabulary: the distinct present values, sorted
    /// lexicographically.
    #[must_use]
    pub fn fit(values: &[Option<String>]) -> Self {
        let distinct: BTreeSet<&str> = values.iter().flatten().map(String::as_str).collect();
        Self::ordered(distinct)
    }

    /// Kitchen equipment, from least to most equipped.
    #[must_use]
    pub fn kitchen() -> Self {
        Self::ordered([
            "usa uninstalled",
            "semi equipped",
            "usa semi equipped",
            "hyper equipped",
            "usa hyper equipped",
            "installed",
            "usa installed",
        ])
    }

    /// Building condition, from worst to best.
    #[must_use]
    pub fn building_state() -> Self {
        Self::ordered([
            "to be done up",
            "to restore",
            "to renovate",
            "just renovated",
            "good",
            "as new",
        ])
    }

    /// Heating energy source.
    #[must_use]
    pub fn heating() -> Self {
        Self::ordered([
            "fueloil", "gas", "carbon", "wood", "pellet", "electric", "solar",
        ])
    }

    /// Return the levels in code order.
    #[must_use]
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// Return the number of levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Return `true` if there are no levels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Return the code of `value`.
    #[must_use]
    pub fn code(&self, value: Option<&str>) -> f64 {
        value
            .and_then(|v| self.levels.iter().position(|l| l == v))
            .map_or(UNKNOWN_CODE, |i| i as f64)
    }

    /// Encode a text column.
    #[must_use]
    pub fn encode(&self, values: &[Option<String>]) -> Vec<Option<f64>> {
        values.iter().map(|v| Some(self.code(v.as_deref()))).collect()
    }
}

/// Replace a categorical column of `table` with its codes.
///
/// A text column is encoded with `vocabulary`. A numeric column with no
/// present value (every level missing in the input, so the reader could not
/// tell it was text) becomes all [`UNKNOWN_CODE`]. Other numeric columns are
/// taken as already encoded and left alone, as are absent columns.
///
/// Returns `true` if the column was rewritten.
///
/// # Errors
///
/// Returns [`PrepError::Table`] if the replacement column cannot be inserted.
pub fn encode_column(
    table: &mut ListingTable,
    name: &str,
    vocabulary: &Vocabulary,
) -> Result<bool, PrepError> {
    let encoded = match table.column(name) {
        Some(Column::Text(values)) => vocabulary.encode(values),
        Some(Column::Numeric(values)) if values.iter().all(Option::is_none) => {
            vec![Some(UNKNOWN_CODE); values.len()]
        }
        Some(Column::Numeric(_)) => {
            debug!(column = name, "column already numeric, left as is");
            return Ok(false);
        }
        None => {
            debug!(column = name, "categorical column absent");
            return Ok(false);
        }
    };
    table.insert_numeric(name, encoded)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_string)).collect()
    }

    #[test]
    fn ordered_codes_follow_position() {
        let vocab = Vocabulary::building_state();
        assert_eq!(vocab.code(Some("to be done up")), 0.0);
        assert_eq!(vocab.code(Some("just renovated")), 3.0);
        assert_eq!(vocab.code(Some("as new")), 5.0);
    }

    #[test]
    fn missing_and_unknown_are_minus_one() {
        let vocab = Vocabulary::kitchen();
        assert_eq!(vocab.code(None), UNKNOWN_CODE);
        assert_eq!(vocab.code(Some("not installed")), UNKNOWN_CODE);
        // Matching is exact, as for categorical dtypes.
        assert_eq!(vocab.code(Some("Installed")), UNKNOWN_CODE);
    }

    #[test]
    fn fit_sorts_distinct_levels() {
        let vocab = Vocabulary::fit(&text(&[Some("villa"), Some("house"), None, Some("villa")]));
        assert_eq!(vocab.levels(), &["house".to_string(), "villa".to_string()]);
        assert_eq!(
            vocab.encode(&text(&[Some("villa"), None, Some("loft")])),
            vec![Some(1.0), Some(-1.0), Some(-1.0)]
        );
    }

    #[test]
    fn heating_has_seven_levels() {
        let vocab = Vocabulary::heating();
        assert_eq!(vocab.len(), 7);
        assert_eq!(vocab.code(Some("solar")), 6.0);
    }

    #[test]
    fn encode_column_rewrites_text() {
        let mut table = ListingTable::from_columns(vec![(
            "Heating".to_string(),
            Column::Text(text(&[Some("gas"), None])),
        )])
        .unwrap();
        assert!(encode_column(&mut table, "Heating", &Vocabulary::heating()).unwrap());
        assert_eq!(table.numeric("Heating").unwrap(), &[Some(1.0), Some(-1.0)]);
    }

    #[test]
    fn encode_column_all_missing_numeric() {
        let mut table = ListingTable::from_columns(vec![(
            "Kitchen".to_string(),
            Column::Numeric(vec![None, None]),
        )])
        .unwrap();
        assert!(encode_column(&mut table, "Kitchen", &Vocabulary::kitchen()).unwrap());
        assert_eq!(table.numeric("Kitchen").unwrap(), &[Some(-1.0), Some(-1.0)]);
    }

    #[test]
    fn encode_column_leaves_codes_and_absent() {
        let mut table = ListingTable::from_columns(vec![(
            "Kitchen".to_string(),
            Column::Numeric(vec![Some(3.0), None]),
        )])
        .unwrap();
        assert!(!encode_column(&mut table, "Kitchen", &Vocabulary::kitchen()).unwrap());
        assert!(!encode_column(&mut table, "Heating", &Vocabulary::heating()).unwrap());
        assert_eq!(table.numeric("Kitchen").unwrap(), &[Some(3.0), None]);
    }
}
