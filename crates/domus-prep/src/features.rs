//! Derived features: postal-code aggregates, living-area bins, amenity counts,
//! building age.

use std::collections::BTreeMap;

use domus_io::ListingTable;
use tracing::{debug, instrument};

use crate::encode::UNKNOWN_CODE;
use crate::error::PrepError;
use crate::outlier::{level_keys, quantile};
use crate::schema;

/// Upper edges of the living-area bins; values above the last edge fall in
/// the final bin.
const LIVING_AREA_EDGES: [f64; 5] = [0.0, 50.0, 100.0, 150.0, 200.0];

/// Property type code of a house.
const HOUSE: f64 = 1.0;

/// Mean price and mean living area per postal code, fitted on training rows.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PostalStats {
    by_code: BTreeMap<String, PostalMeans>,
    global: PostalMeans,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
struct PostalMeans {
    price: Option<f64>,
    living_area: Option<f64>,
}

impl PostalMeans {
    fn price_per_sqm(&self) -> Option<f64> {
        match (self.price, self.living_area) {
            (Some(p), Some(a)) if a > 0.0 => Some(p / a),
            _ => None,
        }
    }
}

#[derive(Default)]
struct RunningMean {
    sum: f64,
    count: usize,
}

impl RunningMean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

impl PostalStats {
    /// Fit the per-code means on `table`.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::Table`] if `PostalCode` or `Price` is absent, or
    /// if `Price` or `LivingArea` is not numeric.
    #[instrument(skip_all, fields(n_rows = table.n_rows()))]
    pub fn fit(table: &ListingTable) -> Result<Self, PrepError> {
        let codes = level_keys(table, schema::POSTAL_CODE)?;
        let prices = table.numeric(schema::PRICE)?;
        let areas = optional_numeric(table, schema::LIVING_AREA)?;

        let mut groups: BTreeMap<String, (RunningMean, RunningMean)> = BTreeMap::new();
        let mut global = (RunningMean::default(), RunningMean::default());
        for (row, code) in codes.into_iter().enumerate() {
            let area = areas.and_then(|a| a[row]);
            global.0.push(prices[row]);
            global.1.push(area);
            if let Some(code) = code {
                let group = groups.entry(code).or_default();
                group.0.push(prices[row]);
                group.1.push(area);
            }
        }

        let global = PostalMeans {
            price: global.0.mean(),
            living_area: global.1.mean(),
        };
        let by_code: BTreeMap<String, PostalMeans> = groups
            .into_iter()
            .map(|(code, (price, area))| {
                let means = PostalMeans {
                    price: price.mean().or(global.price),
                    living_area: area.mean().or(global.living_area),
                };
                (code, means)
            })
            .collect();
        debug!(n_codes = by_code.len(), "postal statistics fitted");
        Ok(Self { by_code, global })
    }

    /// Return the number of postal codes seen at fit time.
    #[must_use]
    pub fn n_codes(&self) -> usize {
        self.by_code.len()
    }

    /// Add the `Price_mean/PostalCode` and `Price/SQMeter/PostalCode` columns.
    ///
    /// Codes not seen at fit time, and missing codes, use the global means.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::Table`] if `PostalCode` is absent.
    pub fn apply(&self, table: &mut ListingTable) -> Result<(), PrepError> {
        let codes = level_keys(table, schema::POSTAL_CODE)?;
        let means: Vec<&PostalMeans> = codes
            .iter()
            .map(|code| {
                code.as_deref()
                    .and_then(|c| self.by_code.get(c))
                    .unwrap_or(&self.global)
            })
            .collect();
        let price_mean = means.iter().map(|m| m.price).collect();
        let per_sqm = means.iter().map(|m| m.price_per_sqm()).collect();
        table.insert_numeric(schema::PRICE_MEAN_BY_POSTAL, price_mean)?;
        table.insert_numeric(schema::PRICE_PER_SQM_BY_POSTAL, per_sqm)?;
        Ok(())
    }
}

/// Bin code of a living area: `(-inf, 0]` is 0, `(0, 50]` is 1, up to
/// `(200, inf)` which is 5. Missing is [`UNKNOWN_CODE`].
#[must_use]
pub fn living_area_bin(area: Option<f64>) -> f64 {
    match area {
        Some(a) if !a.is_nan() => LIVING_AREA_EDGES
            .iter()
            .position(|&edge| a <= edge)
            .unwrap_or(LIVING_AREA_EDGES.len()) as f64,
        _ => UNKNOWN_CODE,
    }
}

/// Add the `LivingAreaCategory` column. Returns `false` when the table has no
/// `LivingArea` column.
///
/// # Errors
///
/// Returns [`PrepError::Table`] if `LivingArea` is not numeric.
pub fn add_living_area_category(table: &mut ListingTable) -> Result<bool, PrepError> {
    let Some(areas) = optional_numeric(table, schema::LIVING_AREA)? else {
        return Ok(false);
    };
    let bins = areas.iter().map(|&a| Some(living_area_bin(a))).collect();
    table.insert_numeric(schema::LIVING_AREA_CATEGORY, bins)?;
    Ok(true)
}

/// Add the `Amenities` column: the row sum of the amenity flags and the
/// kitchen and heating codes, skipping missing values and absent columns.
///
/// # Errors
///
/// Returns [`PrepError::Table`] if one of the summed columns holds text.
pub fn add_amenities(table: &mut ListingTable) -> Result<(), PrepError> {
    let mut totals = vec![0.0; table.n_rows()];
    let summed = schema::AMENITY_FLAGS
        .iter()
        .chain(&[schema::KITCHEN, schema::HEATING]);
    for &name in summed {
        if let Some(values) = optional_numeric(table, name)? {
            for (total, value) in totals.iter_mut().zip(values) {
                *total += value.unwrap_or(0.0);
            }
        }
    }
    table.insert_numeric(schema::AMENITIES, totals.into_iter().map(Some).collect())?;
    Ok(())
}

/// Fill a missing `SurfaceOfGood` from `LivingArea` on rows that are not
/// houses. Returns the number of cells filled.
///
/// # Errors
///
/// Returns [`PrepError::Table`] if one of the three columns is not numeric.
pub fn fill_surface_of_good(table: &mut ListingTable) -> Result<usize, PrepError> {
    let (Some(surface), Some(area), Some(kind)) = (
        optional_numeric(table, schema::SURFACE_OF_GOOD)?,
        optional_numeric(table, schema::LIVING_AREA)?,
        optional_numeric(table, schema::TYPE_OF_PROPERTY)?,
    ) else {
        return Ok(0);
    };
    let mut filled = 0;
    let surface: Vec<Option<f64>> = surface
        .iter()
        .zip(area)
        .zip(kind)
        .map(|((&s, &a), &k)| {
            if s.is_none() && k != Some(HOUSE) && a.is_some() {
                filled += 1;
                a
            } else {
                s
            }
        })
        .collect();
    table.insert_numeric(schema::SURFACE_OF_GOOD, surface)?;
    Ok(filled)
}

/// Imputes `ConstructionYear` with the training median and derives
/// `BuildingAge`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct YearImputer {
    median: Option<f64>,
    reference_year: f64,
}

impl YearImputer {
    /// Fit the median construction year. With no `ConstructionYear` column or
    /// no present value, nothing is imputed.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::Table`] if `ConstructionYear` holds text.
    pub fn fit(table: &ListingTable, reference_year: i32) -> Result<Self, PrepError> {
        let median = match optional_numeric(table, schema::CONSTRUCTION_YEAR)? {
            Some(years) => {
                let present: Vec<f64> = years.iter().flatten().copied().collect();
                quantile(&present, 0.5)
            }
            None => None,
        };
        Ok(Self {
            median,
            reference_year: f64::from(reference_year),
        })
    }

    /// Return the fitted median year.
    #[must_use]
    pub fn median(&self) -> Option<f64> {
        self.median
    }

    /// Fill missing years and add `BuildingAge = max(reference - year, 0)`.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::Table`] if `ConstructionYear` holds text.
    pub fn apply(&self, table: &mut ListingTable) -> Result<(), PrepError> {
        let Some(years) = optional_numeric(table, schema::CONSTRUCTION_YEAR)? else {
            return Ok(());
        };
        let years: Vec<Option<f64>> = years.iter().map(|y| y.or(self.median)).collect();
        let ages = years
            .iter()
            .map(|y| y.map(|y| (self.reference_year - y).max(0.0)))
            .collect();
        table.insert_numeric(schema::CONSTRUCTION_YEAR, years)?;
        table.insert_numeric(schema::BUILDING_AGE, ages)?;
        Ok(())
    }
}

/// Numeric view of `name`, or `None` when the column is absent.
fn optional_numeric<'a>(
    table: &'a ListingTable,
    name: &str,
) -> Result<Option<&'a [Option<f64>]>, PrepError> {
    if table.has_column(name) {
        Ok(Some(table.numeric(name)?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use domus_io::Column;

    use super::*;

    fn numeric(name: &str, values: &[Option<f64>]) -> (String, Column) {
        (name.to_string(), Column::Numeric(values.to_vec()))
    }

    #[test]
    fn living_area_bins() {
        assert_eq!(living_area_bin(Some(-3.0)), 0.0);
        assert_eq!(living_area_bin(Some(0.0)), 0.0);
        assert_eq!(living_area_bin(Some(50.0)), 1.0);
        assert_eq!(living_area_bin(Some(50.5)), 2.0);
        assert_eq!(living_area_bin(Some(200.0)), 4.0);
        assert_eq!(living_area_bin(Some(900.0)), 5.0);
        assert_eq!(living_area_bin(None), UNKNOWN_CODE);
    }

    #[test]
    fn postal_means_and_fallback() {
        let mut table = ListingTable::from_columns(vec![
            numeric("PostalCode", &[Some(1000.0), Some(1000.0), Some(2000.0)]),
            numeric("Price", &[Some(100.0), Some(300.0), Some(500.0)]),
            numeric("LivingArea", &[Some(10.0), Some(30.0), None]),
        ])
        .unwrap();
        let stats = PostalStats::fit(&table).unwrap();
        assert_eq!(stats.n_codes(), 2);
        stats.apply(&mut table).unwrap();
        let price_mean = table.numeric(schema::PRICE_MEAN_BY_POSTAL).unwrap();
        assert_eq!(price_mean, &[Some(200.0), Some(200.0), Some(500.0)]);
        // 2000 has no living area: the global mean (20) stands in.
        let per_sqm = table.numeric(schema::PRICE_PER_SQM_BY_POSTAL).unwrap();
        assert_eq!(per_sqm, &[Some(10.0), Some(10.0), Some(25.0)]);

        let mut unseen = ListingTable::from_columns(vec![numeric("PostalCode", &[Some(9999.0), None])]).unwrap();
        stats.apply(&mut unseen).unwrap();
        assert_eq!(unseen.numeric(schema::PRICE_MEAN_BY_POSTAL).unwrap(), &[Some(300.0), Some(300.0)]);
    }

    #[test]
    fn amenities_skip_missing() {
        let mut table = ListingTable::from_columns(vec![
            numeric("Openfire", &[Some(1.0), None]),
            numeric("Terrace", &[Some(1.0), Some(1.0)]),
            numeric("Kitchen", &[Some(5.0), Some(-1.0)]),
        ])
        .unwrap();
        add_amenities(&mut table).unwrap();
        assert_eq!(table.numeric(schema::AMENITIES).unwrap(), &[Some(7.0), Some(0.0)]);
    }

    #[test]
    fn surface_filled_for_non_houses_only() {
        let mut table = ListingTable::from_columns(vec![
            numeric("SurfaceOfGood", &[None, None, Some(400.0)]),
            numeric("LivingArea", &[Some(80.0), Some(120.0), Some(90.0)]),
            numeric("TypeOfProperty", &[Some(2.0), Some(1.0), Some(2.0)]),
        ])
        .unwrap();
        assert_eq!(fill_surface_of_good(&mut table).unwrap(), 1);
        assert_eq!(table.numeric("SurfaceOfGood").unwrap(), &[Some(80.0), None, Some(400.0)]);
    }

    #[test]
    fn year_imputed_with_median() {
        let mut table = ListingTable::from_columns(vec![numeric(
            "ConstructionYear",
            &[Some(1990.0), None, Some(2010.0), Some(2030.0)],
        )])
        .unwrap();
        let imputer = YearImputer::fit(&table, 2023).unwrap();
        assert_eq!(imputer.median(), Some(2010.0));
        imputer.apply(&mut table).unwrap();
        assert_eq!(table.numeric("ConstructionYear").unwrap()[1], Some(2010.0));
        assert_eq!(
            table.numeric(schema::BUILDING_AGE).unwrap(),
            &[Some(33.0), Some(13.0), Some(13.0), Some(0.0)]
        );
    }

    #[test]
    fn year_imputer_without_column_is_noop() {
        let mut table = ListingTable::from_columns(vec![numeric("Price", &[Some(1.0)])]).unwrap();
        let imputer = YearImputer::fit(&table, 2023).unwrap();
        imputer.apply(&mut table).unwrap();
        assert!(!table.has_column(schema::BUILDING_AGE));
    }
}
