//! A fitted model of either ensemble family behind one type.

use std::fmt;

use crate::boosting::{GradientBoostedModel, GradientBoostingConfig};
use crate::error::BoostError;
use crate::forest::{RandomForest, RandomForestConfig};
use crate::importance::RankedFeature;

/// Which ensemble family a model belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Gradient-boosted trees.
    Boosting,
    /// Random forest.
    Forest,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boosting => f.write_str("boosting"),
            Self::Forest => f.write_str("forest"),
        }
    }
}

/// A fitted regressor.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Model {
    /// Gradient-boosted ensemble.
    Boosting(GradientBoostedModel),
    /// Random forest ensemble.
    Forest(RandomForest),
}

impl Model {
    /// Predict the target for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`BoostError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<f64, BoostError> {
        match self {
            Self::Boosting(m) => m.predict(sample),
            Self::Forest(m) => m.predict(sample),
        }
    }

    /// Predict a batch of samples in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`BoostError::PredictionFeatureMismatch`] if any sample has the wrong feature count.
    pub fn predict_batch(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, BoostError> {
        match self {
            Self::Boosting(m) => m.predict_batch(features),
            Self::Forest(m) => m.predict_batch(features),
        }
    }

    /// Return the number of features this model was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        match self {
            Self::Boosting(m) => m.n_features(),
            Self::Forest(m) => m.n_features(),
        }
    }

    /// Return the feature names in training order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        match self {
            Self::Boosting(m) => m.feature_names(),
            Self::Forest(m) => m.feature_names(),
        }
    }

    /// Return the ensemble family.
    #[must_use]
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Boosting(_) => ModelKind::Boosting,
            Self::Forest(_) => ModelKind::Forest,
        }
    }

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        match self {
            Self::Boosting(m) => m.n_trees(),
            Self::Forest(m) => m.n_trees(),
        }
    }

    /// Rank features by importance.
    #[must_use]
    pub fn importances(&self) -> Vec<RankedFeature> {
        match self {
            Self::Boosting(m) => m.feature_importances(),
            Self::Forest(m) => m.feature_importances(),
        }
    }
}

impl From<GradientBoostedModel> for Model {
    fn from(model: GradientBoostedModel) -> Self {
        Self::Boosting(model)
    }
}

impl From<RandomForest> for Model {
    fn from(forest: RandomForest) -> Self {
        Self::Forest(forest)
    }
}

/// A training configuration for either family.
#[derive(Debug, Clone)]
pub enum ModelSpec {
    /// Train gradient-boosted trees.
    Boosting(GradientBoostingConfig),
    /// Train a random forest.
    Forest(RandomForestConfig),
}

impl ModelSpec {
    /// Return the family this spec trains.
    #[must_use]
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Boosting(_) => ModelKind::Boosting,
            Self::Forest(_) => ModelKind::Forest,
        }
    }

    /// Return the seed of the wrapped config.
    #[must_use]
    pub fn seed(&self) -> u64 {
        match self {
            Self::Boosting(config) => config.seed(),
            Self::Forest(config) => config.seed(),
        }
    }

    /// Replace the seed of the wrapped config.
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        match self {
            Self::Boosting(config) => Self::Boosting(config.with_seed(seed)),
            Self::Forest(config) => Self::Forest(config.with_seed(seed)),
        }
    }

    /// Train a model.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`GradientBoostingConfig::fit`] or
    /// [`RandomForestConfig::fit`].
    pub fn fit(&self, features: &[Vec<f64>], targets: &[f64], feature_names: &[String]) -> Result<Model, BoostError> {
        match self {
            Self::Boosting(config) => config.fit(features, targets, feature_names).map(Model::from),
            Self::Forest(config) => config
                .fit(features, targets, feature_names)
                .map(|result| Model::from(result.into_forest())),
        }
    }

    /// Train a model, tracking an evaluation set where the family supports it.
    ///
    /// Boosting uses the evaluation set for early stopping; the forest ignores it.
    ///
    /// # Errors
    ///
    /// As [`fit`](Self::fit).
    pub fn fit_with_eval(
        &self,
        features: &[Vec<f64>],
        targets: &[f64],
        feature_names: &[String],
        eval_features: &[Vec<f64>],
        eval_targets: &[f64],
    ) -> Result<Model, BoostError> {
        match self {
            Self::Boosting(config) => config
                .fit_with_eval(features, targets, feature_names, eval_features, eval_targets)
                .map(Model::from),
            Self::Forest(_) => self.fit(features, targets, feature_names),
        }
    }
}
