//! Seeded random hyperparameter search.
//!
//! A [`Study`] samples [`ParamSet`]s from a [`SearchSpace`] and calls an
//! objective for each one. Failing or non-finite trials are recorded and
//! skipped; the best completed trial wins, with ties going to the earlier
//! trial. [`tune`] wraps a study around model training on a fixed
//! train/validation split.

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, instrument, warn};

use crate::boosting::GradientBoostingConfig;
use crate::error::BoostError;
use crate::forest::{OobMode, OobScore, RandomForestConfig};
use crate::metrics::RegressionMetrics;
use crate::model::{Model, ModelKind, ModelSpec};
use crate::split::SplitMethod;

/// The range of one hyperparameter.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub enum ParamSpec {
    /// Integer drawn uniformly from `[low, high]`.
    Int {
        /// Inclusive lower bound.
        low: i64,
        /// Inclusive upper bound.
        high: i64,
    },
    /// Float drawn uniformly (or log-uniformly) from `[low, high]`.
    Float {
        /// Inclusive lower bound.
        low: f64,
        /// Inclusive upper bound.
        high: f64,
        /// Sample uniformly in log space; requires `low > 0`.
        log: bool,
    },
}

impl ParamSpec {
    fn sample(&self, rng: &mut impl Rng) -> f64 {
        match *self {
            Self::Int { low, high } => rng.gen_range(low..=high) as f64,
            Self::Float { low, high, log: true } => rng.gen_range(low.ln()..=high.ln()).exp().clamp(low, high),
            Self::Float { low, high, log: false } => rng.gen_range(low..=high),
        }
    }
}

/// Named hyperparameter ranges, sampled in insertion order.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SearchSpace {
    params: Vec<(String, ParamSpec)>,
}

impl SearchSpace {
    /// Create an empty space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an integer parameter.
    ///
    /// # Errors
    ///
    /// Returns [`BoostError::InvalidParamRange`] if `low > high`.
    pub fn with_int(mut self, name: &str, low: i64, high: i64) -> Result<Self, BoostError> {
        if low > high {
            return Err(BoostError::InvalidParamRange {
                name: name.to_string(),
                low: low as f64,
                high: high as f64,
            });
        }
        self.insert(name, ParamSpec::Int { low, high });
        Ok(self)
    }

    /// Add a float parameter.
    ///
    /// # Errors
    ///
    /// Returns [`BoostError::InvalidParamRange`] if a bound is not finite,
    /// `low > high`, or `log` is set with `low <= 0`.
    pub fn with_float(mut self, name: &str, low: f64, high: f64, log: bool) -> Result<Self, BoostError> {
        if !low.is_finite() || !high.is_finite() || low > high || (log && low <= 0.0) {
            return Err(BoostError::InvalidParamRange {
                name: name.to_string(),
                low,
                high,
            });
        }
        self.insert(name, ParamSpec::Float { low, high, log });
        Ok(self)
    }

    fn insert(&mut self, name: &str, spec: ParamSpec) {
        match self.params.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = spec,
            None => self.params.push((name.to_string(), spec)),
        }
    }

    /// The boosting search: learning rate, depth, row and column subsampling,
    /// and minimum leaf size.
    #[must_use]
    pub fn boosting_default() -> Self {
        Self {
            params: vec![
                ("learning_rate".into(), ParamSpec::Float { low: 1e-3, high: 0.1, log: true }),
                ("depth".into(), ParamSpec::Int { low: 1, high: 10 }),
                ("subsample".into(), ParamSpec::Float { low: 0.05, high: 1.0, log: false }),
                ("colsample_bylevel".into(), ParamSpec::Float { low: 0.05, high: 1.0, log: false }),
                ("min_data_in_leaf".into(), ParamSpec::Int { low: 1, high: 100 }),
            ],
        }
    }

    /// The forest search: tree count, depth and split/leaf sizes.
    #[must_use]
    pub fn forest_default() -> Self {
        Self {
            params: vec![
                ("n_estimators".into(), ParamSpec::Int { low: 10, high: 200 }),
                ("max_depth".into(), ParamSpec::Int { low: 2, high: 32 }),
                ("min_samples_split".into(), ParamSpec::Int { low: 2, high: 150 }),
                ("min_samples_leaf".into(), ParamSpec::Int { low: 2, high: 60 }),
            ],
        }
    }

    /// Return the default space for a model family.
    #[must_use]
    pub fn default_for(kind: ModelKind) -> Self {
        match kind {
            ModelKind::Boosting => Self::boosting_default(),
            ModelKind::Forest => Self::forest_default(),
        }
    }

    /// Return the parameters in sampling order.
    #[must_use]
    pub fn params(&self) -> &[(String, ParamSpec)] {
        &self.params
    }

    /// Return the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Return `true` when the space has no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    fn sample(&self, rng: &mut impl Rng) -> ParamSet {
        ParamSet(
            self.params
                .iter()
                .map(|(name, spec)| (name.clone(), spec.sample(rng)))
                .collect(),
        )
    }
}

/// One sampled assignment of hyperparameters.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct ParamSet(BTreeMap<String, f64>);

impl ParamSet {
    /// Return a parameter as a float.
    ///
    /// # Errors
    ///
    /// Returns [`BoostError::MissingParam`] if `name` was not sampled.
    pub fn get_f64(&self, name: &str) -> Result<f64, BoostError> {
        self.0.get(name).copied().ok_or_else(|| BoostError::MissingParam {
            name: name.to_string(),
        })
    }

    /// Return a parameter as a count.
    ///
    /// # Errors
    ///
    /// Returns [`BoostError::MissingParam`] if `name` was not sampled, or
    /// [`BoostError::InvalidParamRange`] if its value is negative.
    pub fn get_usize(&self, name: &str) -> Result<usize, BoostError> {
        let value = self.get_f64(name)?;
        if value < 0.0 {
            return Err(BoostError::InvalidParamRange {
                name: name.to_string(),
                low: value,
                high: value,
            });
        }
        Ok(value.round() as usize)
    }

    /// Return every parameter by name.
    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.0
    }
}

impl FromIterator<(String, f64)> for ParamSet {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Whether the objective should be minimized or maximized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Lower is better.
    Minimize,
    /// Higher is better.
    Maximize,
}

impl Direction {
    /// Return `true` when `candidate` is strictly better than `incumbent`.
    #[must_use]
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Minimize => candidate < incumbent,
            Self::Maximize => candidate > incumbent,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minimize => f.write_str("minimize"),
            Self::Maximize => f.write_str("maximize"),
        }
    }
}

/// A trial handed to the objective.
#[derive(Debug, Clone)]
pub struct Trial {
    /// Zero-based trial number.
    pub number: usize,
    /// The sampled parameters.
    pub params: ParamSet,
}

/// The outcome of one trial.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TrialRecord {
    /// Zero-based trial number.
    pub number: usize,
    /// The sampled parameters.
    pub params: ParamSet,
    /// Objective value, `None` if the trial failed.
    pub value: Option<f64>,
    /// Failure message, if the trial failed.
    pub error: Option<String>,
}

/// Configuration of a random search.
///
/// # Defaults
///
/// | Parameter   | Default    |
/// |-------------|------------|
/// | `direction` | `Minimize` |
/// | `seed`      | 42         |
#[derive(Debug, Clone)]
pub struct Study {
    n_trials: usize,
    direction: Direction,
    seed: u64,
}

/// Everything a finished study produced.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StudyResult {
    /// Every trial, in order.
    pub trials: Vec<TrialRecord>,
    /// Number of the best trial.
    pub best_trial: usize,
    /// Objective value of the best trial.
    pub best_value: f64,
    /// Parameters of the best trial.
    pub best_params: ParamSet,
}

impl Study {
    /// Create a study running `n_trials` trials.
    ///
    /// # Errors
    ///
    /// Returns [`BoostError::InvalidTrialCount`] if `n_trials` is zero.
    pub fn new(n_trials: usize) -> Result<Self, BoostError> {
        if n_trials == 0 {
            return Err(BoostError::InvalidTrialCount);
        }
        Ok(Self {
            n_trials,
            direction: Direction::Minimize,
            seed: 42,
        })
    }

    /// The study for a model family: 30 trials minimizing MSE for boosting,
    /// 10 trials maximizing R² for the forest.
    #[must_use]
    pub fn default_for(kind: ModelKind) -> Self {
        match kind {
            ModelKind::Boosting => Self {
                n_trials: 30,
                direction: Direction::Minimize,
                seed: 42,
            },
            ModelKind::Forest => Self {
                n_trials: 10,
                direction: Direction::Maximize,
                seed: 42,
            },
        }
    }

    /// Set the optimization direction.
    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Set the sampler seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the number of trials.
    ///
    /// # Errors
    ///
    /// Returns [`BoostError::InvalidTrialCount`] if `n_trials` is zero.
    pub fn with_n_trials(mut self, n_trials: usize) -> Result<Self, BoostError> {
        if n_trials == 0 {
            return Err(BoostError::InvalidTrialCount);
        }
        self.n_trials = n_trials;
        Ok(self)
    }

    /// Return the number of trials.
    #[must_use]
    pub fn n_trials(&self) -> usize {
        self.n_trials
    }

    /// Return the optimization direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Return the sampler seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Run the study.
    ///
    /// # Errors
    ///
    /// Returns [`BoostError::AllTrialsFailed`] if no trial produced a finite value.
    #[instrument(skip_all, fields(n_trials = self.n_trials, direction = %self.direction))]
    pub fn optimize<F, E>(&self, space: &SearchSpace, mut objective: F) -> Result<StudyResult, BoostError>
    where
        F: FnMut(&Trial) -> Result<f64, E>,
        E: fmt::Display,
    {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut trials = Vec::with_capacity(self.n_trials);
        let mut best: Option<(usize, f64)> = None;

        for number in 0..self.n_trials {
            let trial = Trial {
                number,
                params: space.sample(&mut rng),
            };
            let (value, error) = match objective(&trial) {
                Ok(value) if value.is_finite() => (Some(value), None),
                Ok(value) => (None, Some(format!("objective returned non-finite value {value}"))),
                Err(e) => (None, Some(e.to_string())),
            };

            match (value, &error) {
                (Some(value), _) => {
                    info!(trial = number, value, "trial complete");
                    if best.is_none_or(|(_, incumbent)| self.direction.is_better(value, incumbent)) {
                        best = Some((number, value));
                    }
                }
                (None, Some(message)) => warn!(trial = number, error = %message, "trial failed"),
                (None, None) => {}
            }

            trials.push(TrialRecord {
                number,
                params: trial.params,
                value,
                error,
            });
        }

        let Some((best_trial, best_value)) = best else {
            let last_error = trials
                .last()
                .and_then(|t| t.error.clone())
                .unwrap_or_default();
            return Err(BoostError::AllTrialsFailed {
                n_trials: self.n_trials,
                last_error,
            });
        };

        info!(best_trial, best_value, "study complete");
        Ok(StudyResult {
            best_params: trials[best_trial].params.clone(),
            trials,
            best_trial,
            best_value,
        })
    }
}

/// Configuration of a hyperparameter search over one model family.
///
/// # Defaults
///
/// | Parameter               | Default                             |
/// |-------------------------|-------------------------------------|
/// | `study`                 | [`Study::default_for`] the kind     |
/// | `space`                 | [`SearchSpace::default_for`] the kind |
/// | `iterations`            | 1000 (boosting rounds)              |
/// | `early_stopping_rounds` | `None`                              |
/// | `split_method`          | `Exact`                             |
/// | `oob_mode`              | `Enabled` (forest only)             |
/// | `seed`                  | 42                                  |
#[derive(Debug, Clone)]
pub struct TuneConfig {
    kind: ModelKind,
    study: Study,
    space: SearchSpace,
    iterations: usize,
    early_stopping_rounds: Option<usize>,
    split_method: SplitMethod,
    oob_mode: OobMode,
    seed: u64,
}

impl TuneConfig {
    /// Create the default search for `kind`.
    #[must_use]
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            study: Study::default_for(kind),
            space: SearchSpace::default_for(kind),
            iterations: 1000,
            early_stopping_rounds: None,
            split_method: SplitMethod::Exact,
            oob_mode: OobMode::Enabled,
            seed: 42,
        }
    }

    /// Replace the study.
    #[must_use]
    pub fn with_study(mut self, study: Study) -> Self {
        self.study = study;
        self
    }

    /// Replace the search space.
    #[must_use]
    pub fn with_space(mut self, space: SearchSpace) -> Self {
        self.space = space;
        self
    }

    /// Set the number of boosting rounds per trial.
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the boosting early-stopping patience.
    #[must_use]
    pub fn with_early_stopping_rounds(mut self, rounds: Option<usize>) -> Self {
        self.early_stopping_rounds = rounds;
        self
    }

    /// Set the split-finding strategy for every trial.
    #[must_use]
    pub fn with_split_method(mut self, split_method: SplitMethod) -> Self {
        self.split_method = split_method;
        self
    }

    /// Set whether forest trials compute an out-of-bag score.
    #[must_use]
    pub fn with_oob_mode(mut self, oob_mode: OobMode) -> Self {
        self.oob_mode = oob_mode;
        self
    }

    /// Set the seed used by every trained model.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the model family.
    #[must_use]
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Return the study.
    #[must_use]
    pub fn study(&self) -> &Study {
        &self.study
    }

    /// Return the search space.
    #[must_use]
    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    /// Return the number of boosting rounds per trial.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Return the forest out-of-bag mode.
    #[must_use]
    pub fn oob_mode(&self) -> OobMode {
        self.oob_mode
    }

    /// Build the training config for one parameter set.
    ///
    /// # Errors
    ///
    /// Returns [`BoostError::MissingParam`] when `params` lacks a parameter
    /// the family needs, or a config error for an invalid count.
    pub fn spec_for(&self, params: &ParamSet) -> Result<ModelSpec, BoostError> {
        Ok(match self.kind {
            ModelKind::Boosting => ModelSpec::Boosting(
                GradientBoostingConfig::new(self.iterations)?
                    .with_learning_rate(params.get_f64("learning_rate")?)
                    .with_max_depth(params.get_usize("depth")?)
                    .with_subsample(params.get_f64("subsample")?)
                    .with_colsample(params.get_f64("colsample_bylevel")?)
                    .with_min_samples_leaf(params.get_usize("min_data_in_leaf")?)
                    .with_early_stopping_rounds(self.early_stopping_rounds)
                    .with_split_method(self.split_method)
                    .with_seed(self.seed),
            ),
            ModelKind::Forest => ModelSpec::Forest(
                RandomForestConfig::new(params.get_usize("n_estimators")?)?
                    .with_max_depth(Some(params.get_usize("max_depth")?))
                    .with_min_samples_split(params.get_usize("min_samples_split")?)
                    .with_min_samples_leaf(params.get_usize("min_samples_leaf")?)
                    .with_split_method(self.split_method)
                    .with_oob_mode(self.oob_mode)
                    .with_seed(self.seed),
            ),
        })
    }
}

/// Result of [`tune`].
#[derive(Debug, Clone)]
pub struct TuneResult {
    /// The model of the best trial.
    pub model: Model,
    /// The study outcome.
    pub study: StudyResult,
    /// Validation metrics of the best trial.
    pub best_metrics: RegressionMetrics,
    /// Validation metrics of each trial, `None` for failed trials.
    pub trial_metrics: Vec<Option<RegressionMetrics>>,
    /// Out-of-bag score of the best forest; `None` for boosting or when
    /// out-of-bag scoring is disabled.
    pub oob_score: Option<OobScore>,
}

/// Search hyperparameters by training on `train` and scoring on `valid`.
///
/// The objective is the validation MSE when the study minimizes and the
/// validation R² when it maximizes. The best model is kept, so it is never
/// retrained.
///
/// # Errors
///
/// Returns [`BoostError::AllTrialsFailed`] when no trial succeeds.
#[instrument(skip_all, fields(kind = %config.kind, n_train = train.0.len(), n_valid = valid.0.len()))]
pub fn tune(
    config: &TuneConfig,
    train: (&[Vec<f64>], &[f64]),
    valid: (&[Vec<f64>], &[f64]),
    feature_names: &[String],
) -> Result<TuneResult, BoostError> {
    let direction = config.study.direction();
    let mut trial_metrics: Vec<Option<RegressionMetrics>> = vec![None; config.study.n_trials()];
    let mut best: Option<(f64, Model, RegressionMetrics, Option<OobScore>)> = None;

    let study = config.study.optimize(&config.space, |trial| -> Result<f64, BoostError> {
        let (model, oob_score) = match config.spec_for(&trial.params)? {
            ModelSpec::Forest(forest) => {
                let result = forest.fit(train.0, train.1, feature_names)?;
                let oob_score = result.oob_score().cloned();
                (Model::from(result.into_forest()), oob_score)
            }
            spec => (spec.fit_with_eval(train.0, train.1, feature_names, valid.0, valid.1)?, None),
        };
        let predictions = model.predict_batch(valid.0)?;
        let metrics = RegressionMetrics::compute(valid.1, &predictions)?;
        trial_metrics[trial.number] = Some(metrics);

        let value = match direction {
            Direction::Minimize => metrics.mse,
            Direction::Maximize => metrics.r2,
        };
        if value.is_finite() && best.as_ref().is_none_or(|(incumbent, ..)| direction.is_better(value, *incumbent)) {
            best = Some((value, model, metrics, oob_score));
        }
        Ok(value)
    })?;

    let Some((_, model, best_metrics, oob_score)) = best else {
        return Err(BoostError::AllTrialsFailed {
            n_trials: config.study.n_trials(),
            last_error: "no model was kept".to_string(),
        });
    };

    info!(
        best_trial = study.best_trial,
        r2 = best_metrics.r2,
        mse = best_metrics.mse,
        oob_r2 = oob_score.as_ref().map(|s| s.metrics.r2),
        "search complete"
    );
    Ok(TuneResult {
        model,
        study,
        best_metrics,
        trial_metrics,
        oob_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadratic_space() -> SearchSpace {
        SearchSpace::new().with_float("x", -5.0, 5.0, false).unwrap()
    }

    #[test]
    fn finds_best_trial_in_direction() {
        let space = quadratic_space();
        let result = Study::new(50)
            .unwrap()
            .optimize(&space, |t| -> Result<f64, BoostError> {
                let x = t.params.get_f64("x")?;
                Ok((x - 1.0).powi(2))
            })
            .unwrap();
        let min = result
            .trials
            .iter()
            .filter_map(|t| t.value)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(result.best_value, min);
        assert_eq!(result.trials[result.best_trial].value, Some(min));

        let result = Study::new(50)
            .unwrap()
            .with_direction(Direction::Maximize)
            .optimize(&space, |t| t.params.get_f64("x"))
            .unwrap();
        assert!(result.trials.iter().all(|t| t.value.unwrap() <= result.best_value));
    }

    #[test]
    fn failures_recorded_and_skipped() {
        let space = quadratic_space();
        let result = Study::new(6)
            .unwrap()
            .optimize(&space, |t| match t.number % 3 {
                0 => Err("boom".to_string()),
                1 => Ok(f64::NAN),
                _ => Ok(t.number as f64),
            })
            .unwrap();
        assert_eq!(result.trials.len(), 6);
        assert_eq!(result.trials[0].error.as_deref(), Some("boom"));
        assert!(result.trials[1].value.is_none());
        assert!(result.trials[1].error.is_some());
        assert_eq!(result.best_trial, 2);
        assert_eq!(result.best_value, 2.0);
    }

    #[test]
    fn ties_keep_earlier_trial() {
        let result = Study::new(5)
            .unwrap()
            .optimize(&quadratic_space(), |_| Ok::<_, BoostError>(1.0))
            .unwrap();
        assert_eq!(result.best_trial, 0);
    }

    #[test]
    fn all_failed_is_error() {
        let err = Study::new(3)
            .unwrap()
            .optimize(&quadratic_space(), |_| Err::<f64, _>("nope"))
            .unwrap_err();
        assert!(matches!(err, BoostError::AllTrialsFailed { n_trials: 3, .. }));
    }

    #[test]
    fn sampling_respects_ranges_and_seed() {
        let space = SearchSpace::boosting_default();
        let collect = |seed| {
            Study::new(40)
                .unwrap()
                .with_seed(seed)
                .optimize(&space, |_| Ok::<_, BoostError>(0.0))
                .unwrap()
                .trials
        };
        let trials = collect(3);
        for t in &trials {
            let lr = t.params.get_f64("learning_rate").unwrap();
            assert!((1e-3..=0.1).contains(&lr));
            let depth = t.params.get_f64("depth").unwrap();
            assert!((1.0..=10.0).contains(&depth) && depth.fract() == 0.0);
            assert!((1..=100).contains(&t.params.get_usize("min_data_in_leaf").unwrap()));
        }
        assert_eq!(trials, collect(3));
        assert_ne!(trials, collect(4));
    }

    #[test]
    fn invalid_ranges_rejected() {
        assert!(SearchSpace::new().with_int("a", 3, 1).is_err());
        assert!(SearchSpace::new().with_float("b", 0.0, 1.0, true).is_err());
        assert!(SearchSpace::new().with_float("c", 1.0, f64::INFINITY, false).is_err());
        assert!(matches!(Study::new(0), Err(BoostError::InvalidTrialCount)));
        assert!(matches!(
            ParamSet::default().get_f64("missing"),
            Err(BoostError::MissingParam { .. })
        ));
    }

    #[test]
    fn default_studies() {
        assert_eq!(Study::default_for(ModelKind::Boosting).n_trials(), 30);
        assert_eq!(Study::default_for(ModelKind::Boosting).direction(), Direction::Minimize);
        assert_eq!(Study::default_for(ModelKind::Forest).n_trials(), 10);
        assert_eq!(Study::default_for(ModelKind::Forest).direction(), Direction::Maximize);
        assert_eq!(SearchSpace::forest_default().len(), 4);
    }

    #[test]
    fn spec_for_maps_params() {
        let params: ParamSet = [
            ("learning_rate".to_string(), 0.05),
            ("depth".to_string(), 4.0),
            ("subsample".to_string(), 0.5),
            ("colsample_bylevel".to_string(), 0.75),
            ("min_data_in_leaf".to_string(), 7.0),
        ]
        .into_iter()
        .collect();
        let ModelSpec::Boosting(config) = TuneConfig::new(ModelKind::Boosting)
            .with_iterations(50)
            .spec_for(&params)
            .unwrap()
        else {
            panic!("expected boosting spec");
        };
        assert_eq!(config.n_estimators(), 50);
        assert_eq!(config.max_depth(), 4);
        assert_eq!(config.min_samples_leaf(), 7);
        assert_eq!(config.colsample(), 0.75);

        let err = TuneConfig::new(ModelKind::Forest).spec_for(&params).unwrap_err();
        assert!(matches!(err, BoostError::MissingParam { .. }));
    }

    #[test]
    fn tune_keeps_best_model() {
        let features: Vec<Vec<f64>> = (0..60).map(|i| vec![f64::from(i)]).collect();
        let targets: Vec<f64> = (0..60).map(|i| f64::from(i / 10)).collect();
        let names = vec!["x".to_string()];
        let (train_x, valid_x) = features.split_at(45);
        let (train_y, valid_y) = targets.split_at(45);
        let config = TuneConfig::new(ModelKind::Forest)
            .with_study(Study::default_for(ModelKind::Forest).with_n_trials(4).unwrap());
        let result = tune(&config, (train_x, train_y), (valid_x, valid_y), &names).unwrap();

        assert_eq!(result.study.trials.len(), 4);
        assert_eq!(result.trial_metrics.len(), 4);
        assert_eq!(result.trial_metrics[result.study.best_trial], Some(result.best_metrics));
        assert_eq!(result.best_metrics.r2, result.study.best_value);
        let predictions = result.model.predict_batch(valid_x).unwrap();
        assert_eq!(RegressionMetrics::compute(valid_y, &predictions).unwrap(), result.best_metrics);
        let oob = result.oob_score.expect("forest search reports an out-of-bag score");
        assert!(oob.n_oob_samples > 0 && oob.n_oob_samples <= 45);
    }

    #[test]
    fn oob_score_follows_config() {
        let features: Vec<Vec<f64>> = (0..40).map(|i| vec![f64::from(i)]).collect();
        let targets: Vec<f64> = (0..40).map(|i| f64::from(i % 7)).collect();
        let names = vec!["x".to_string()];
        let (train_x, valid_x) = features.split_at(30);
        let (train_y, valid_y) = targets.split_at(30);
        let study = Study::default_for(ModelKind::Forest).with_n_trials(2).unwrap();

        let disabled = TuneConfig::new(ModelKind::Forest)
            .with_study(study.clone())
            .with_oob_mode(OobMode::Disabled);
        let result = tune(&disabled, (train_x, train_y), (valid_x, valid_y), &names).unwrap();
        assert!(result.oob_score.is_none());

        let boosting = TuneConfig::new(ModelKind::Boosting)
            .with_iterations(5)
            .with_study(Study::default_for(ModelKind::Boosting).with_n_trials(2).unwrap());
        let result = tune(&boosting, (train_x, train_y), (valid_x, valid_y), &names).unwrap();
        assert!(result.oob_score.is_none());
    }
}
