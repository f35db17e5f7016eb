//! # Hyperparameter Selection
//!
//! Chooses `(lambda, psigx, psigy)` by minimizing the cross-validated squared
//! error with the box-constrained optimizer. Dimensions marked fixed are left
//! out of the search and copied through unchanged; the elastic-net mix `alpha`
//! is always fixed.

use crate::EdgenetError;
use crate::bobyqa::{Bobyqa, BobyqaStatus};
use crate::ccd::{Convergence, Penalty};
use crate::cross_validation::CrossValidator;
use crate::cv_set::{CvSet, DEFAULT_SEED};
use crate::data::{Family, ModelData};
use crate::model::{FitConfig, FittedModel, fit};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Search settings for one hyperparameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchDimension {
    /// Searched by the optimizer when true, held at `value` otherwise.
    pub free: bool,
    /// Fixed value, or the starting point of the search.
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

impl SearchDimension {
    pub fn free(value: f64, lower: f64, upper: f64) -> Self {
        Self {
            free: true,
            value,
            lower,
            upper,
        }
    }

    pub fn fixed(value: f64) -> Self {
        Self {
            free: false,
            value,
            lower: value,
            upper: value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    pub n_folds: usize,
    pub seed: u64,
    pub lambda: SearchDimension,
    pub psigx: SearchDimension,
    pub psigy: SearchDimension,
    pub alpha: f64,
    /// Objective evaluations allowed to the optimizer; each one fits every fold.
    pub max_evaluations: usize,
    pub radius_start: f64,
    pub radius_stop: f64,
    /// Stopping rule of the per-fold coordinate descent.
    pub convergence: Convergence,
    pub parallel_folds: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            n_folds: 10,
            seed: DEFAULT_SEED,
            lambda: SearchDimension::free(1.0, 0.0, 100.0),
            psigx: SearchDimension::free(1.0, 0.0, 10_000.0),
            psigy: SearchDimension::free(1.0, 0.0, 10_000.0),
            alpha: 1.0,
            max_evaluations: 1000,
            radius_start: 0.49,
            radius_stop: 1e-3,
            convergence: Convergence::default(),
            parallel_folds: true,
        }
    }
}

/// Selected regularization strengths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HyperParameters {
    pub lambda: f64,
    pub psigx: f64,
    pub psigy: f64,
}

impl HyperParameters {
    pub fn to_map(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("lambda", self.lambda),
            ("psigx", self.psigx),
            ("psigy", self.psigy),
        ])
    }

    pub fn penalty(&self, alpha: f64) -> Penalty {
        Penalty {
            lambda: self.lambda,
            alpha,
            psigx: self.psigx,
            psigy: self.psigy,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub parameters: HyperParameters,
    /// Sample index to cross-validation fold.
    pub fold_ids: Vec<usize>,
    /// Cross-validated loss at `parameters`; infinite if no evaluation succeeded.
    pub loss: f64,
    pub evaluations: usize,
    pub status: BobyqaStatus,
}

/// Runs the cross-validated search. Optimizer failures are not errors: the
/// best parameters seen so far are returned with the failure in `status`.
pub fn select_hyperparameters(
    data: &ModelData,
    config: &SelectionConfig,
) -> Result<Selection, EdgenetError> {
    if data.family() == Family::Binomial {
        return Err(EdgenetError::NotImplemented(
            "model selection for the binomial family",
        ));
    }

    let cv = CvSet::new(data.n(), config.n_folds, config.seed)?;
    let validator = CrossValidator::new(data, &cv, config.convergence)
        .with_parallel_folds(config.parallel_folds);

    let dimensions = [config.lambda, config.psigx, config.psigy];
    let free: Vec<usize> = (0..dimensions.len())
        .filter(|&i| dimensions[i].free)
        .collect();
    let lower: Array1<f64> = free.iter().map(|&i| dimensions[i].lower).collect();
    let upper: Array1<f64> = free.iter().map(|&i| dimensions[i].upper).collect();
    let start: Array1<f64> = free.iter().map(|&i| dimensions[i].value).collect();

    log::info!(
        "Selecting hyperparameters with {}-fold cross-validation over {} free dimension(s)",
        config.n_folds,
        free.len()
    );

    let assemble = |point: &[f64]| {
        let mut values = dimensions.map(|d| d.value);
        for (&i, &v) in free.iter().zip(point) {
            values[i] = v;
        }
        HyperParameters {
            lambda: values[0],
            psigx: values[1],
            psigy: values[2],
        }
    };

    let optimizer = Bobyqa::new(lower, upper)
        .with_radius(config.radius_start, config.radius_stop)
        .with_max_evaluations(config.max_evaluations);
    let solution = optimizer.minimize(start.view(), |point| {
        let params = assemble(&point.to_vec());
        validator.evaluate(&params.penalty(config.alpha))
    })?;

    let parameters = assemble(&solution.point.to_vec());
    log::info!(
        "Selected lambda={:.6}, psigx={:.6}, psigy={:.6} (CV loss {:.6e}, {} evaluations, {:?})",
        parameters.lambda,
        parameters.psigx,
        parameters.psigy,
        solution.value,
        solution.evaluations,
        solution.status
    );

    Ok(Selection {
        parameters,
        fold_ids: cv.fold_ids().to_vec(),
        loss: solution.value,
        evaluations: solution.evaluations,
        status: solution.status,
    })
}

/// Selects hyperparameters, then fits the full data with them.
pub fn select_and_fit(
    data: &ModelData,
    config: &SelectionConfig,
    final_convergence: Convergence,
) -> Result<(Selection, FittedModel), EdgenetError> {
    let selection = select_hyperparameters(data, config)?;
    let fit_config = FitConfig {
        penalty: selection.parameters.penalty(config.alpha),
        convergence: final_convergence,
    };
    let model = fit(data, &fit_config)?;
    Ok((selection, model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sparse_signal(seed: u64) -> ModelData {
        let mut rng = StdRng::seed_from_u64(seed);
        let x = Array2::from_shape_fn((60, 4), |_| rng.gen_range(-1.0..1.0));
        let beta = array![[2.0, 1.0], [0.0, 0.0], [-1.0, 0.5], [0.0, 0.0]];
        let noise = Array2::from_shape_fn((60, 2), |_| rng.gen_range(-0.1..0.1));
        let y = x.dot(&beta) + noise;
        ModelData::without_graphs(Family::Gaussian, x, y).unwrap()
    }

    fn quick_config() -> SelectionConfig {
        SelectionConfig {
            n_folds: 5,
            lambda: SearchDimension::free(5.0, 0.0, 100.0),
            psigx: SearchDimension::fixed(0.0),
            psigy: SearchDimension::fixed(0.0),
            max_evaluations: 40,
            convergence: Convergence {
                max_iterations: 500,
                threshold: 1e-6,
            },
            ..SelectionConfig::default()
        }
    }

    #[test]
    fn test_hyperparameter_map_keys() {
        let params = HyperParameters {
            lambda: 1.0,
            psigx: 2.0,
            psigy: 3.0,
        };
        let map = params.to_map();
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), ["lambda", "psigx", "psigy"]);
        assert_eq!(map["psigy"], 3.0);
    }

    #[test]
    fn test_fixed_dimensions_are_copied_through() {
        let data = sparse_signal(1);
        let config = SelectionConfig {
            psigx: SearchDimension::fixed(0.25),
            psigy: SearchDimension::fixed(7.0),
            ..quick_config()
        };
        let selection = select_hyperparameters(&data, &config).unwrap();

        assert_eq!(selection.parameters.psigx, 0.25);
        assert_eq!(selection.parameters.psigy, 7.0);
        assert!((0.0..=100.0).contains(&selection.parameters.lambda));
        assert!(selection.evaluations <= config.max_evaluations);
        assert_eq!(selection.fold_ids.len(), data.n());
    }

    #[test]
    fn test_search_improves_on_start() {
        let data = sparse_signal(2);
        let config = quick_config();
        let cv = CvSet::new(data.n(), config.n_folds, config.seed).unwrap();
        let start_loss = CrossValidator::new(&data, &cv, config.convergence)
            .evaluate(&Penalty {
                lambda: config.lambda.value,
                alpha: 1.0,
                psigx: 0.0,
                psigy: 0.0,
            })
            .unwrap();

        let selection = select_hyperparameters(&data, &config).unwrap();
        assert!(selection.loss <= start_loss);
        assert!(selection.parameters.lambda < config.lambda.value);
    }

    #[test]
    fn test_all_fixed_skips_search() {
        let data = sparse_signal(3);
        let config = SelectionConfig {
            lambda: SearchDimension::fixed(0.5),
            ..quick_config()
        };
        let selection = select_hyperparameters(&data, &config).unwrap();
        assert_eq!(selection.evaluations, 1);
        assert_eq!(selection.status, BobyqaStatus::Converged);
        assert_eq!(
            selection.parameters,
            HyperParameters {
                lambda: 0.5,
                psigx: 0.0,
                psigy: 0.0
            }
        );
    }

    #[test]
    fn test_select_and_fit_uses_selected_penalty() {
        let data = sparse_signal(4);
        let (selection, model) =
            select_and_fit(&data, &quick_config(), Convergence::default()).unwrap();
        assert_eq!(model.config.penalty.lambda, selection.parameters.lambda);
        assert_eq!(model.coefficients.dim(), (4, 2));
    }

    #[test]
    fn test_binomial_selection_fails_fast() {
        let data = ModelData::without_graphs(
            Family::Binomial,
            Array2::ones((10, 2)),
            Array2::ones((10, 1)),
        )
        .unwrap();
        assert!(matches!(
            select_hyperparameters(&data, &quick_config()),
            Err(EdgenetError::NotImplemented(_))
        ));
    }
}
