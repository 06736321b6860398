//! The cleaning and feature-engineering pipeline, its fitted encoder, and the
//! model-ready feature matrix.

use domus_io::{Column, ListingTable};
use tracing::{debug, info, instrument, warn};

use crate::encode::{Vocabulary, encode_column};
use crate::error::PrepError;
use crate::features::{PostalStats, YearImputer, add_amenities, add_living_area_category, fill_surface_of_good};
use crate::outlier::{OutlierRule, drop_rare, level_keys, remove_outliers};
use crate::schema;

/// Whether the input carries the `Price` target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    /// Labelled data: rows without a price are dropped and targets returned.
    Required,
    /// Unlabelled data: every row is kept, no targets.
    Absent,
}

/// Configuration for fitting the preprocessing pipeline.
///
/// Construct via [`PrepConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter            | Default                                              |
/// |----------------------|------------------------------------------------------|
/// | `outlier_rule`       | `OutlierRule::iqr()` (0.25 / 0.75 / 1.5)             |
/// | `outlier_column`     | `"Price"`                                            |
/// | `min_postal_count`   | `None`                                               |
/// | `excluded_sale_type` | `Some(2.0)`                                          |
/// | `reference_year`     | 2023                                                 |
/// | `dropped_columns`    | `Url`, `PropertyId`, `TypeOfSale`, `SubtypeOfProperty` |
/// | `missing_fill`       | -1.0                                                 |
/// | ordinal vocabularies | `Kitchen`, `StateOfBuilding`, `Heating`              |
#[derive(Debug, Clone)]
pub struct PrepConfig {
    outlier_rule: OutlierRule,
    outlier_column: String,
    min_postal_count: Option<usize>,
    excluded_sale_type: Option<f64>,
    reference_year: i32,
    dropped_columns: Vec<String>,
    missing_fill: f64,
    ordinal: Vec<(String, Vocabulary)>,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PrepConfig {
    /// Create a config with the defaults above.
    #[must_use]
    pub fn new() -> Self {
        Self {
            outlier_rule: OutlierRule::iqr(),
            outlier_column: schema::PRICE.to_string(),
            min_postal_count: None,
            excluded_sale_type: Some(2.0),
            reference_year: 2023,
            dropped_columns: schema::DEFAULT_DROPPED.iter().map(|s| (*s).to_string()).collect(),
            missing_fill: -1.0,
            ordinal: vec![
                (schema::KITCHEN.to_string(), Vocabulary::kitchen()),
                (schema::STATE_OF_BUILDING.to_string(), Vocabulary::building_state()),
                (schema::HEATING.to_string(), Vocabulary::heating()),
            ],
        }
    }

    // --- Setters ---

    /// Set the outlier rule.
    #[must_use]
    pub fn with_outlier_rule(mut self, rule: OutlierRule) -> Self {
        self.outlier_rule = rule;
        self
    }

    /// Set the column the outlier rule is computed and filtered on.
    #[must_use]
    pub fn with_outlier_column(mut self, column: impl Into<String>) -> Self {
        self.outlier_column = column.into();
        self
    }

    /// Drop postal codes with fewer than `min_count` listings. `None` keeps all.
    #[must_use]
    pub fn with_min_postal_count(mut self, min_count: Option<usize>) -> Self {
        self.min_postal_count = min_count;
        self
    }

    /// Set the `TypeOfSale` code whose rows are dropped. `None` keeps all.
    #[must_use]
    pub fn with_excluded_sale_type(mut self, sale_type: Option<f64>) -> Self {
        self.excluded_sale_type = sale_type;
        self
    }

    /// Set the year `BuildingAge` is measured from.
    #[must_use]
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = year;
        self
    }

    /// Replace the list of columns dropped before modeling.
    #[must_use]
    pub fn with_dropped_columns(mut self, columns: Vec<String>) -> Self {
        self.dropped_columns = columns;
        self
    }

    /// Set the value written in place of any remaining missing feature.
    #[must_use]
    pub fn with_missing_fill(mut self, fill: f64) -> Self {
        self.missing_fill = fill;
        self
    }

    /// Encode `column` with an ordered vocabulary, replacing any existing one.
    #[must_use]
    pub fn with_ordinal(mut self, column: impl Into<String>, vocabulary: Vocabulary) -> Self {
        let column = column.into();
        self.ordinal.retain(|(name, _)| *name != column);
        self.ordinal.push((column, vocabulary));
        self
    }

    // --- Getters ---

    /// Return the outlier rule.
    #[must_use]
    pub fn outlier_rule(&self) -> OutlierRule {
        self.outlier_rule
    }

    /// Return the outlier column.
    #[must_use]
    pub fn outlier_column(&self) -> &str {
        &self.outlier_column
    }

    /// Return the rare postal code threshold.
    #[must_use]
    pub fn min_postal_count(&self) -> Option<usize> {
        self.min_postal_count
    }

    /// Return the excluded sale type.
    #[must_use]
    pub fn excluded_sale_type(&self) -> Option<f64> {
        self.excluded_sale_type
    }

    /// Return the reference year.
    #[must_use]
    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    /// Return the dropped columns.
    #[must_use]
    pub fn dropped_columns(&self) -> &[String] {
        &self.dropped_columns
    }

    /// Return the missing-value fill.
    #[must_use]
    pub fn missing_fill(&self) -> f64 {
        self.missing_fill
    }

    /// Clean `table`, derive features, and fit the encoder on what remains.
    ///
    /// Equivalent to [`scope`](Self::scope) followed by
    /// [`fit_scoped`](Self::fit_scoped) on every scoped row. To hold rows out
    /// for evaluation, split the [`Scoped`] rows first and fit on the training
    /// part only.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`PrepError::Table`] | `Price` is absent or a used column has the wrong type |
    /// | [`PrepError::NoRowsLeft`] | a cleaning stage leaves no rows |
    /// | [`PrepError::NoFeatures`] | only the target survives |
    /// | [`PrepError::InvalidQuantiles`], [`PrepError::InvalidOutlierParameter`] | bad outlier rule |
    /// | [`PrepError::InvalidMinCount`] | `min_postal_count` is `Some(0)` |
    pub fn fit(&self, table: &ListingTable) -> Result<Prepared, PrepError> {
        self.fit_scoped(&self.scope(table)?)
    }

    /// Apply the cleaning stages that learn nothing from the data: drop rows
    /// without a price, exact duplicates, and the excluded sale type.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`PrepError::Table`] | `Price` is absent or not numeric |
    /// | [`PrepError::NoRowsLeft`] | a stage leaves no rows |
    #[instrument(skip_all, fields(n_rows = table.n_rows(), n_columns = table.n_columns()))]
    pub fn scope(&self, table: &ListingTable) -> Result<Scoped, PrepError> {
        let mut report = PrepReport {
            n_input: table.n_rows(),
            ..PrepReport::default()
        };
        let mut table = table.clone();
        attach_row_ids(&mut table)?;

        report.missing_price = drop_missing_price(&mut table)?;
        ensure_rows(&table, "dropping rows without a price")?;
        report.duplicates = table.drop_duplicate_rows_except(&[schema::ROW_ID]);

        if let Some(code) = self.excluded_sale_type
            && table.has_column(schema::TYPE_OF_SALE)
        {
            let mask: Vec<bool> = table
                .numeric(schema::TYPE_OF_SALE)?
                .iter()
                .map(|v| *v != Some(code))
                .collect();
            report.excluded_sale_type = table.retain_rows(&mask)?;
            ensure_rows(&table, "excluding the sale type")?;
        }

        debug!(n_rows = table.n_rows(), "listings scoped");
        Ok(Scoped { table, report })
    }

    /// Fit the encoder on scoped rows: impute, derive features, remove
    /// outliers, drop rare postal codes, and fit the postal aggregates and
    /// nominal vocabularies on what remains.
    ///
    /// The report keeps the scope counts of `scoped`; its `n_output` counts
    /// the rows fitted here.
    ///
    /// # Errors
    ///
    /// As [`fit`](Self::fit).
    #[instrument(skip_all, fields(n_rows = scoped.n_rows()))]
    pub fn fit_scoped(&self, scoped: &Scoped) -> Result<Prepared, PrepError> {
        self.outlier_rule.validate()?;
        if self.min_postal_count == Some(0) {
            return Err(PrepError::InvalidMinCount { min_count: 0 });
        }

        let mut report = scoped.report;
        let mut table = scoped.table.clone();
        ensure_rows(&table, "selecting training rows")?;

        let year = YearImputer::fit(&table, self.reference_year)?;
        derive_row_features(&mut table, &self.ordinal, &year)?;

        report.outliers = remove_outliers(&mut table, &self.outlier_column, self.outlier_rule)?;
        ensure_rows(&table, "outlier removal")?;

        if let Some(min_count) = self.min_postal_count {
            if table.has_column(schema::POSTAL_CODE) {
                report.rare_postal = drop_rare(&mut table, schema::POSTAL_CODE, min_count)?;
                ensure_rows(&table, "dropping rare postal codes")?;
            } else {
                warn!("no PostalCode column, rare postal code filter skipped");
            }
        }

        let postal = if table.has_column(schema::POSTAL_CODE) {
            let stats = PostalStats::fit(&table)?;
            stats.apply(&mut table)?;
            Some(stats)
        } else {
            warn!("no PostalCode column, postal aggregates skipped");
            None
        };

        let dropped: Vec<&str> = self.dropped_columns.iter().map(String::as_str).collect();
        table.drop_columns(&dropped);

        let mut nominal = Vec::new();
        let mut feature_names = Vec::new();
        for (name, column) in table.iter() {
            if name == schema::PRICE || name == schema::ROW_ID {
                continue;
            }
            if let Column::Text(values) = column {
                let vocabulary = Vocabulary::fit(values);
                debug!(column = name, n_levels = vocabulary.len(), "nominal vocabulary fitted");
                nominal.push((name.to_string(), vocabulary));
            }
            feature_names.push(name.to_string());
        }
        if feature_names.is_empty() {
            return Err(PrepError::NoFeatures);
        }

        let encoder = FittedEncoder {
            ordinal: self.ordinal.clone(),
            nominal,
            year,
            postal,
            dropped_columns: self.dropped_columns.clone(),
            missing_fill: self.missing_fill,
            feature_names,
        };
        let features = encoder.assemble(&table, TargetMode::Required)?;
        report.n_output = features.n_rows();
        report.n_features = features.n_features();

        info!(
            n_input = report.n_input,
            n_output = report.n_output,
            n_features = report.n_features,
            outliers = report.outliers,
            "preprocessing fitted"
        );
        Ok(Prepared {
            features,
            encoder,
            report,
        })
    }
}

/// Listings that passed [`PrepConfig::scope`], carrying their row ids.
///
/// Split with [`select_rows`](Self::select_rows) before
/// [`PrepConfig::fit_scoped`] so fitted statistics see training rows only;
/// transform the held-out part with [`FittedEncoder::transform`].
#[derive(Debug, Clone)]
pub struct Scoped {
    table: ListingTable,
    report: PrepReport,
}

impl Scoped {
    /// Return the number of scoped rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.table.n_rows()
    }

    /// Return the scoped listings.
    #[must_use]
    pub fn table(&self) -> &ListingTable {
        &self.table
    }

    /// Return the counts of the scope stages.
    #[must_use]
    pub fn report(&self) -> PrepReport {
        self.report
    }

    /// Return the given rows, in the given order, with the same scope counts.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds.
    #[must_use]
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            table: self.table.select_rows(rows),
            report: self.report,
        }
    }
}

/// Row counts removed by each cleaning stage of [`PrepConfig::fit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PrepReport {
    /// Listings read.
    pub n_input: usize,
    /// Rows dropped for a missing price.
    pub missing_price: usize,
    /// Exact duplicate rows dropped.
    pub duplicates: usize,
    /// Rows dropped for the excluded sale type.
    pub excluded_sale_type: usize,
    /// Rows dropped as outliers.
    pub outliers: usize,
    /// Rows dropped for a rare postal code.
    pub rare_postal: usize,
    /// Rows in the feature matrix.
    pub n_output: usize,
    /// Columns in the feature matrix.
    pub n_features: usize,
}

/// Output of [`PrepConfig::fit`].
#[derive(Debug, Clone)]
pub struct Prepared {
    /// The training feature matrix, with targets.
    pub features: FeatureMatrix,
    /// The encoder to apply to new data.
    pub encoder: FittedEncoder,
    /// Per-stage row counts.
    pub report: PrepReport,
}

/// Everything learned at fit time that new data must be transformed with.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FittedEncoder {
    pub(crate) ordinal: Vec<(String, Vocabulary)>,
    pub(crate) nominal: Vec<(String, Vocabulary)>,
    pub(crate) year: YearImputer,
    pub(crate) postal: Option<PostalStats>,
    pub(crate) dropped_columns: Vec<String>,
    pub(crate) missing_fill: f64,
    pub(crate) feature_names: Vec<String>,
}

impl FittedEncoder {
    /// Return the feature names in matrix column order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the number of features.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Transform new listings into a feature matrix with the fitted columns.
    ///
    /// No rows are removed as outliers. With [`TargetMode::Required`], rows
    /// without a price are dropped and targets are returned. A fitted feature
    /// absent from `table` is filled with the missing-value fill.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`PrepError::Table`] | `Price` absent in `Required` mode, or a used column has the wrong type |
    /// | [`PrepError::NoRowsLeft`] | no row has a price in `Required` mode |
    /// | [`PrepError::UnencodedText`] | a feature that was numeric at fit time holds text |
    #[instrument(skip_all, fields(n_rows = table.n_rows(), mode = ?mode))]
    pub fn transform(&self, table: &ListingTable, mode: TargetMode) -> Result<FeatureMatrix, PrepError> {
        let mut table = table.clone();
        attach_row_ids(&mut table)?;
        if mode == TargetMode::Required {
            let removed = drop_missing_price(&mut table)?;
            if removed > 0 {
                info!(removed, "rows without a price dropped");
            }
            ensure_rows(&table, "dropping rows without a price")?;
        }

        derive_row_features(&mut table, &self.ordinal, &self.year)?;
        if let Some(postal) = &self.postal
            && table.has_column(schema::POSTAL_CODE)
        {
            postal.apply(&mut table)?;
        }
        let dropped: Vec<&str> = self.dropped_columns.iter().map(String::as_str).collect();
        table.drop_columns(&dropped);

        self.assemble(&table, mode)
    }

    fn assemble(&self, table: &ListingTable, mode: TargetMode) -> Result<FeatureMatrix, PrepError> {
        let n_rows = table.n_rows();
        let fill = self.missing_fill;
        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(self.feature_names.len());
        for name in &self.feature_names {
            let values = match table.column(name) {
                Some(Column::Numeric(values)) => values.iter().map(|v| v.unwrap_or(fill)).collect(),
                Some(Column::Text(values)) => {
                    let vocabulary = self
                        .nominal
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| PrepError::UnencodedText { name: name.clone() })?;
                    vocabulary.encode(values).into_iter().map(|v| v.unwrap_or(fill)).collect()
                }
                None => {
                    debug!(column = %name, "feature absent, filled");
                    vec![fill; n_rows]
                }
            };
            columns.push(values);
        }

        let rows: Vec<Vec<f64>> = (0..n_rows)
            .map(|r| columns.iter().map(|c| c[r]).collect())
            .collect();
        let targets = match mode {
            TargetMode::Required => Some(table.numeric(schema::PRICE)?.iter().flatten().copied().collect()),
            TargetMode::Absent => None,
        };
        let row_ids = table.text(schema::ROW_ID)?.iter().map(|id| id.clone().unwrap_or_default()).collect();

        Ok(FeatureMatrix {
            feature_names: self.feature_names.clone(),
            rows,
            targets,
            row_ids,
        })
    }
}

/// Model-ready data: row-major features, optional targets, and an identifier
/// per row.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    feature_names: Vec<String>,
    rows: Vec<Vec<f64>>,
    targets: Option<Vec<f64>>,
    row_ids: Vec<String>,
}

impl FeatureMatrix {
    /// Return the feature names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the rows; `rows()[sample][feature]`.
    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Return the targets, if the data was labelled.
    #[must_use]
    pub fn targets(&self) -> Option<&[f64]> {
        self.targets.as_deref()
    }

    /// Return the row identifiers: the `PropertyId` when present, otherwise
    /// the input row index.
    #[must_use]
    pub fn row_ids(&self) -> &[String] {
        &self.row_ids
    }

    /// Return the number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Return the number of features.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Return a matrix holding the given rows, in the given order.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds.
    #[must_use]
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            feature_names: self.feature_names.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            targets: self
                .targets
                .as_ref()
                .map(|t| indices.iter().map(|&i| t[i]).collect()),
            row_ids: indices.iter().map(|&i| self.row_ids[i].clone()).collect(),
        }
    }
}

/// Encode ordinal columns and add the row-local derived features.
fn derive_row_features(
    table: &mut ListingTable,
    ordinal: &[(String, Vocabulary)],
    year: &YearImputer,
) -> Result<(), PrepError> {
    for (name, vocabulary) in ordinal {
        encode_column(table, name, vocabulary)?;
    }
    let filled = fill_surface_of_good(table)?;
    debug!(filled, "surface of good filled from living area");
    year.apply(table)?;
    add_living_area_category(table)?;
    add_amenities(table)?;
    Ok(())
}

fn attach_row_ids(table: &mut ListingTable) -> Result<(), PrepError> {
    if table.has_column(schema::ROW_ID) {
        return Ok(());
    }
    let ids: Vec<Option<String>> = if table.has_column(schema::PROPERTY_ID) {
        level_keys(table, schema::PROPERTY_ID)?
            .into_iter()
            .enumerate()
            .map(|(row, id)| Some(id.unwrap_or_else(|| row.to_string())))
            .collect()
    } else {
        (0..table.n_rows()).map(|row| Some(row.to_string())).collect()
    };
    table.insert_column(schema::ROW_ID, Column::Text(ids))?;
    Ok(())
}

fn drop_missing_price(table: &mut ListingTable) -> Result<usize, PrepError> {
    let mask: Vec<bool> = table.numeric(schema::PRICE)?.iter().map(Option::is_some).collect();
    Ok(table.retain_rows(&mask)?)
}

fn ensure_rows(table: &ListingTable, stage: &'static str) -> Result<(), PrepError> {
    if table.n_rows() == 0 {
        Err(PrepError::NoRowsLeft { stage })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listings(n: usize) -> ListingTable {
        let price = (0..n).map(|i| Some(200_000.0 + 1_000.0 * i as f64)).collect();
        let area = (0..n).map(|i| Some(80.0 + i as f64)).collect();
        let postal = (0..n).map(|i| Some(if i % 2 == 0 { 1000.0 } else { 2000.0 })).collect();
        let kitchen = (0..n)
            .map(|i| Some(if i % 3 == 0 { "installed" } else { "semi equipped" }.to_string()))
            .collect();
        let city = (0..n)
            .map(|i| Some(if i % 2 == 0 { "Brussels" } else { "Ghent" }.to_string()))
            .collect();
        let id = (0..n).map(|i| Some(5000.0 + i as f64)).collect();
        ListingTable::from_columns(vec![
            ("PropertyId".to_string(), Column::Numeric(id)),
            ("Price".to_string(), Column::Numeric(price)),
            ("LivingArea".to_string(), Column::Numeric(area)),
            ("PostalCode".to_string(), Column::Numeric(postal)),
            ("Kitchen".to_string(), Column::Text(kitchen)),
            ("Locality".to_string(), Column::Text(city)),
        ])
        .unwrap()
    }

    #[test]
    fn fit_produces_numeric_features_without_target() {
        let prepared = PrepConfig::new().fit(&listings(12)).unwrap();
        let names = prepared.features.feature_names();
        assert!(!names.iter().any(|n| n == "Price" || n == "PropertyId" || n == schema::ROW_ID));
        for derived in [schema::AMENITIES, schema::LIVING_AREA_CATEGORY, schema::PRICE_MEAN_BY_POSTAL] {
            assert!(names.iter().any(|n| n == derived), "missing {derived}");
        }
        assert_eq!(prepared.features.n_rows(), 12);
        assert_eq!(prepared.features.targets().unwrap().len(), 12);
        assert_eq!(prepared.features.row_ids()[0], "5000");
        assert_eq!(prepared.report.n_features, names.len());
    }

    #[test]
    fn nominal_text_is_encoded() {
        let prepared = PrepConfig::new().fit(&listings(6)).unwrap();
        let j = prepared
            .features
            .feature_names()
            .iter()
            .position(|n| n == "Locality")
            .unwrap();
        let codes: Vec<f64> = prepared.features.rows().iter().map(|r| r[j]).collect();
        assert_eq!(codes, vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn transform_matches_fitted_order() {
        let table = listings(10);
        let prepared = PrepConfig::new().fit(&table).unwrap();
        let again = prepared.encoder.transform(&table, TargetMode::Required).unwrap();
        assert_eq!(again.feature_names(), prepared.features.feature_names());
        assert_eq!(again.rows(), prepared.features.rows());
    }

    #[test]
    fn transform_without_price_keeps_rows() {
        let table = listings(8);
        let prepared = PrepConfig::new().fit(&table).unwrap();
        let mut unlabelled = table.clone();
        unlabelled.drop_columns(&["Price", "Locality"]);
        let matrix = prepared.encoder.transform(&unlabelled, TargetMode::Absent).unwrap();
        assert_eq!(matrix.n_rows(), 8);
        assert!(matrix.targets().is_none());
        let j = matrix.feature_names().iter().position(|n| n == "Locality").unwrap();
        assert!(matrix.rows().iter().all(|r| r[j] == -1.0));
    }

    #[test]
    fn sale_type_and_missing_price_dropped() {
        let mut table = listings(6);
        table
            .insert_numeric(
                "TypeOfSale",
                vec![Some(1.0), Some(2.0), Some(1.0), None, Some(1.0), Some(1.0)],
            )
            .unwrap();
        let mut price = table.numeric("Price").unwrap().to_vec();
        price[0] = None;
        table.insert_numeric("Price", price).unwrap();

        let prepared = PrepConfig::new()
            .with_outlier_rule(OutlierRule::None)
            .fit(&table)
            .unwrap();
        assert_eq!(prepared.report.missing_price, 1);
        assert_eq!(prepared.report.excluded_sale_type, 1);
        assert_eq!(prepared.features.n_rows(), 4);
    }

    #[test]
    fn duplicates_dropped_despite_row_ids() {
        let mut table = listings(4);
        table.drop_columns(&["PropertyId"]);
        let rows: Vec<(String, Column)> = table
            .iter()
            .map(|(name, column)| {
                let joined = match column {
                    Column::Numeric(v) => Column::Numeric(v.iter().chain(v).copied().collect()),
                    Column::Text(v) => Column::Text(v.iter().chain(v).cloned().collect()),
                };
                (name.to_string(), joined)
            })
            .collect();
        let doubled = ListingTable::from_columns(rows).unwrap();
        let prepared = PrepConfig::new()
            .with_outlier_rule(OutlierRule::None)
            .fit(&doubled)
            .unwrap();
        assert_eq!(prepared.report.duplicates, 4);
        assert_eq!(prepared.features.row_ids(), &["0", "1", "2", "3"]);
    }

    #[test]
    fn missing_price_column_is_an_error() {
        let mut table = listings(4);
        table.drop_columns(&["Price"]);
        assert!(matches!(PrepConfig::new().fit(&table), Err(PrepError::Table(_))));
    }

    #[test]
    fn everything_filtered_is_an_error() {
        let table = listings(4);
        let config = PrepConfig::new().with_min_postal_count(Some(10));
        assert!(matches!(config.fit(&table), Err(PrepError::NoRowsLeft { .. })));
    }

    #[test]
    fn scoped_split_keeps_row_ids() {
        let mut table = listings(6);
        table.drop_columns(&["PropertyId"]);
        let config = PrepConfig::new().with_outlier_rule(OutlierRule::None);
        let scoped = config.scope(&table).unwrap();
        assert_eq!(scoped.n_rows(), 6);

        let prepared = config.fit_scoped(&scoped.select_rows(&[0, 2, 3, 5])).unwrap();
        assert_eq!(prepared.features.row_ids(), &["0", "2", "3", "5"]);
        assert_eq!(prepared.report.n_input, 6);
        assert_eq!(prepared.report.n_output, 4);

        let held_out = prepared
            .encoder
            .transform(scoped.select_rows(&[1, 4]).table(), TargetMode::Required)
            .unwrap();
        assert_eq!(held_out.row_ids(), &["1", "4"]);
        assert_eq!(held_out.feature_names(), prepared.features.feature_names());
    }

    #[test]
    fn empty_selection_is_an_error() {
        let config = PrepConfig::new();
        let scoped = config.scope(&listings(4)).unwrap();
        assert!(matches!(
            config.fit_scoped(&scoped.select_rows(&[])),
            Err(PrepError::NoRowsLeft { .. })
        ));
    }

    #[test]
    fn select_rows_keeps_alignment() {
        let prepared = PrepConfig::new().fit(&listings(5)).unwrap();
        let subset = prepared.features.select_rows(&[4, 1]);
        assert_eq!(subset.row_ids(), &["5004", "5001"]);
        assert_eq!(subset.targets().unwrap(), &[204_000.0, 201_000.0]);
    }
}
