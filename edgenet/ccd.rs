//! # Cyclic Coordinate Descent
//!
//! Estimates the `P x Q` coefficient matrix `B` minimizing squared error plus
//!
//! - an elastic-net penalty `lambda * (alpha * |B|_1 + (1 - alpha) * |B|_2^2)`,
//! - a covariate-graph penalty `psigx * tr(B' LX B)`,
//! - a response-graph penalty `psigy * tr(B LY B')`.
//!
//! The outer loop sweeps response columns; each column is refined by an inner
//! pass over covariate rows until its coefficients settle. Every coordinate
//! update reads coefficients written earlier in the same sweep, so neither
//! loop may run in parallel.

use crate::EdgenetError;
use crate::data::{Family, ModelData};
use crate::laplacian::Laplacian;
use ndarray::{Array1, Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

/// Graph penalty weights at or below this value switch the penalty off.
pub const GRAPH_PENALTY_EPSILON: f64 = 0.001;

/// Regularization strengths of one fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Penalty {
    pub lambda: f64,
    /// Elastic-net mix: 1 is pure Lasso, 0 pure ridge.
    pub alpha: f64,
    pub psigx: f64,
    pub psigy: f64,
}

impl Default for Penalty {
    fn default() -> Self {
        Self {
            lambda: 1.0,
            alpha: 1.0,
            psigx: 1.0,
            psigy: 1.0,
        }
    }
}

/// Stopping rule shared by the inner and outer loops.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Convergence {
    pub max_iterations: usize,
    /// Sum of absolute coefficient changes below which a loop stops.
    pub threshold: f64,
}

impl Default for Convergence {
    fn default() -> Self {
        Self {
            max_iterations: 100_000,
            threshold: 1e-5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CcdStatus {
    Converged,
    /// The sweep cap was hit. The coefficients are the last iterate.
    MaxIterationsReached,
}

#[derive(Debug, Clone)]
pub struct CcdResult {
    pub coefficients: Array2<f64>,
    pub status: CcdStatus,
    pub sweeps: usize,
    pub last_change: f64,
}

/// Everything the solver reads: cached cross products and the two Laplacians.
/// Cross-validation builds one of these per fold from the training rows while
/// sharing the Laplacians of the full data.
#[derive(Debug, Clone, Copy)]
pub struct Problem<'a> {
    pub txx: ArrayView2<'a, f64>,
    pub txy: ArrayView2<'a, f64>,
    pub lx: &'a Laplacian,
    pub ly: &'a Laplacian,
}

impl<'a> Problem<'a> {
    pub fn from_data(data: &'a ModelData) -> Self {
        Self {
            txx: data.txx(),
            txy: data.txy(),
            lx: data.lx(),
            ly: data.ly(),
        }
    }

    pub fn p(&self) -> usize {
        self.txx.nrows()
    }

    pub fn q(&self) -> usize {
        self.txy.ncols()
    }
}

/// Soft-thresholds `s` at `lalph` and scales by `1 / norm`.
#[inline]
pub fn softnorm(s: f64, lalph: f64, norm: f64) -> f64 {
    if s.abs() <= lalph {
        0.0
    } else if s > 0.0 {
        (s - lalph) / norm
    } else {
        (s + lalph) / norm
    }
}

/// Fits the coefficient matrix for `family`.
pub fn fit_coefficients(
    family: Family,
    problem: &Problem<'_>,
    penalty: &Penalty,
    convergence: &Convergence,
) -> Result<CcdResult, EdgenetError> {
    match family {
        Family::Gaussian => Ok(GaussianCcd::new(problem, penalty, convergence).run()),
        Family::Binomial => Err(EdgenetError::NotImplemented(
            "coordinate descent for the binomial family",
        )),
    }
}

/// Solver state for real-valued responses. Which graph terms apply is decided
/// once here, not per coordinate.
struct GaussianCcd<'a, 'b> {
    problem: &'a Problem<'b>,
    convergence: Convergence,
    lalph: f64,
    enorm: f64,
    psigx: Option<f64>,
    psigy: Option<f64>,
}

impl<'a, 'b> GaussianCcd<'a, 'b> {
    fn new(problem: &'a Problem<'b>, penalty: &Penalty, convergence: &Convergence) -> Self {
        let use_gx = penalty.psigx > GRAPH_PENALTY_EPSILON && problem.lx.applies_to(problem.p());
        let use_gy = penalty.psigy > GRAPH_PENALTY_EPSILON
            && problem.q() > 1
            && problem.ly.applies_to(problem.q());
        Self {
            problem,
            convergence: *convergence,
            lalph: penalty.alpha * penalty.lambda,
            enorm: 1.0 + penalty.lambda * (1.0 - penalty.alpha),
            psigx: use_gx.then_some(penalty.psigx),
            psigy: use_gy.then_some(penalty.psigy),
        }
    }

    fn run(&self) -> CcdResult {
        let (p, q) = (self.problem.p(), self.problem.q());
        // Non-zero warm start.
        let mut b = Array2::ones((p, q));
        let mut previous = b.clone();
        let mut last_change = f64::INFINITY;

        for sweep in 1..=self.convergence.max_iterations {
            previous.assign(&b);
            for qi in 0..q {
                self.uccd(&mut b, qi);
            }
            last_change = l1_distance(b.view(), previous.view());
            log::trace!("CCD sweep {sweep}: total change {last_change:.3e}");

            if last_change < self.convergence.threshold {
                log::debug!("CCD converged after {sweep} sweeps");
                return CcdResult {
                    coefficients: b,
                    status: CcdStatus::Converged,
                    sweeps: sweep,
                    last_change,
                };
            }
        }

        log::debug!(
            "CCD stopped at the cap of {} sweeps, last change {:.3e}",
            self.convergence.max_iterations,
            last_change
        );
        CcdResult {
            coefficients: b,
            status: CcdStatus::MaxIterationsReached,
            sweeps: self.convergence.max_iterations,
            last_change,
        }
    }

    /// Univariate coordinate descent over the rows of column `qi`.
    fn uccd(&self, b: &mut Array2<f64>, qi: usize) {
        let p = self.problem.p();
        let mut old = Array1::zeros(p);
        for _ in 0..self.convergence.max_iterations {
            old.assign(&b.column(qi));
            for pi in 0..p {
                self.update_coordinate(b, pi, qi);
            }
            let change: f64 = Zip::from(&old)
                .and(b.column(qi))
                .fold(0.0, |acc, &o, &n| acc + (n - o).abs());
            if change < self.convergence.threshold {
                break;
            }
        }
    }

    #[inline]
    fn update_coordinate(&self, b: &mut Array2<f64>, pi: usize, qi: usize) {
        let txx = &self.problem.txx;
        let bpq = b[[pi, qi]];

        let mut norm = txx[[pi, pi]];
        let mut s = self.problem.txy[[pi, qi]] + norm * bpq - txx.row(pi).dot(&b.column(qi));

        if let Some(psigx) = self.psigx {
            let lx = self.problem.lx;
            let off: f64 = lx.neighbors(pi).iter().map(|&(j, l)| l * b[[j, qi]]).sum();
            s -= 2.0 * psigx * off;
            norm += 2.0 * psigx * lx.diagonal(pi);
        }
        if let Some(psigy) = self.psigy {
            let ly = self.problem.ly;
            let off: f64 = ly.neighbors(qi).iter().map(|&(k, l)| l * b[[pi, k]]).sum();
            s -= 2.0 * psigy * off;
            norm += 2.0 * psigy * ly.diagonal(qi);
        }

        b[[pi, qi]] = softnorm(s, self.lalph, self.enorm * norm);
    }
}

fn l1_distance(a: ArrayView2<f64>, b: ArrayView2<f64>) -> f64 {
    Zip::from(a).and(b).fold(0.0, |acc, &x, &y| acc + (x - y).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-1.0..1.0))
    }

    /// Residual-based elastic-net coordinate descent written directly against
    /// `X` and `Y`, with the same warm start and sweep order.
    fn plain_elastic_net(
        x: &Array2<f64>,
        y: &Array2<f64>,
        penalty: &Penalty,
        convergence: &Convergence,
    ) -> Array2<f64> {
        let (p, q) = (x.ncols(), y.ncols());
        let lalph = penalty.alpha * penalty.lambda;
        let enorm = 1.0 + penalty.lambda * (1.0 - penalty.alpha);
        let mut b = Array2::<f64>::ones((p, q));
        for _ in 0..convergence.max_iterations {
            let before = b.clone();
            for qi in 0..q {
                for _ in 0..convergence.max_iterations {
                    let col_before = b.column(qi).to_owned();
                    for pi in 0..p {
                        let xp = x.column(pi);
                        let mut partial = y.column(qi).to_owned();
                        for j in 0..p {
                            if j != pi {
                                partial.scaled_add(-b[[j, qi]], &x.column(j));
                            }
                        }
                        let s = xp.dot(&partial);
                        b[[pi, qi]] = softnorm(s, lalph, enorm * xp.dot(&xp));
                    }
                    let change: f64 = (&b.column(qi) - &col_before).mapv(f64::abs).sum();
                    if change < convergence.threshold {
                        break;
                    }
                }
            }
            if (&b - &before).mapv(f64::abs).sum() < convergence.threshold {
                break;
            }
        }
        b
    }

    #[test]
    fn test_softnorm_boundaries() {
        assert_eq!(softnorm(0.5, 0.5, 2.0), 0.0);
        assert_eq!(softnorm(-0.5, 0.5, 2.0), 0.0);
        assert_eq!(softnorm(0.2, 0.5, 2.0), 0.0);
        assert_abs_diff_eq!(softnorm(3.0, 1.0, 4.0), 0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(softnorm(-3.0, 1.0, 4.0), -0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(softnorm(2.0, 0.0, 4.0), 0.5, epsilon = 1e-15);
    }

    #[test]
    fn test_unpenalized_fit_recovers_least_squares() {
        // Orthogonal design: least squares is X'Y / diag(X'X).
        let x = array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0]];
        let y = array![[2.0], [4.0], [2.0], [4.0]];
        let data = ModelData::without_graphs(Family::Gaussian, x, y).unwrap();
        let penalty = Penalty {
            lambda: 0.0,
            alpha: 1.0,
            psigx: 0.0,
            psigy: 0.0,
        };
        let result = fit_coefficients(
            Family::Gaussian,
            &Problem::from_data(&data),
            &penalty,
            &Convergence::default(),
        )
        .unwrap();

        assert_eq!(result.status, CcdStatus::Converged);
        assert_abs_diff_eq!(result.coefficients[[0, 0]], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.coefficients[[1, 0]], 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_large_lambda_zeroes_all_coefficients() {
        let mut rng = StdRng::seed_from_u64(7);
        let x = random_matrix(&mut rng, 30, 4);
        let y = random_matrix(&mut rng, 30, 2);
        let data = ModelData::without_graphs(Family::Gaussian, x, y).unwrap();
        let penalty = Penalty {
            lambda: 1e6,
            ..Penalty::default()
        };
        let result = fit_coefficients(
            Family::Gaussian,
            &Problem::from_data(&data),
            &penalty,
            &Convergence::default(),
        )
        .unwrap();
        assert!(result.coefficients.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_disabled_graphs_match_plain_elastic_net() {
        let mut rng = StdRng::seed_from_u64(42);
        let x = random_matrix(&mut rng, 40, 5);
        let y = random_matrix(&mut rng, 40, 3);
        let mut gx = Array2::ones((5, 5));
        gx.diag_mut().fill(0.0);
        let mut gy = Array2::ones((3, 3));
        gy.diag_mut().fill(0.0);

        let convergence = Convergence {
            max_iterations: 10_000,
            threshold: 1e-10,
        };
        let zero_psi = Penalty {
            lambda: 0.7,
            alpha: 0.6,
            psigx: 0.0,
            psigy: 0.0,
        };

        let with_graphs =
            ModelData::new(Family::Gaussian, x.clone(), y.clone(), gx.view(), gy.view()).unwrap();
        let placeholder = ModelData::without_graphs(Family::Gaussian, x.clone(), y.clone()).unwrap();

        let a = fit_coefficients(
            Family::Gaussian,
            &Problem::from_data(&with_graphs),
            &zero_psi,
            &convergence,
        )
        .unwrap();
        // Placeholder graphs ignore psi entirely.
        let b = fit_coefficients(
            Family::Gaussian,
            &Problem::from_data(&placeholder),
            &Penalty {
                psigx: 5.0,
                psigy: 5.0,
                ..zero_psi
            },
            &convergence,
        )
        .unwrap();
        assert_eq!(a.coefficients, b.coefficients);

        let reference = plain_elastic_net(&x, &y, &zero_psi, &convergence);
        for (got, want) in a.coefficients.iter().zip(reference.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_covariate_graph_pulls_neighbors_together() {
        let mut rng = StdRng::seed_from_u64(3);
        let x = random_matrix(&mut rng, 50, 2);
        // Response depends on the two covariates with very different weights.
        let beta = array![[3.0], [-1.0]];
        let y = x.dot(&beta);
        let gx = array![[0.0, 1.0], [1.0, 0.0]];
        let gy = Array2::zeros((1, 1));
        let data = ModelData::new(Family::Gaussian, x, y, gx.view(), gy.view()).unwrap();
        let problem = Problem::from_data(&data);
        let convergence = Convergence {
            max_iterations: 10_000,
            threshold: 1e-9,
        };
        let base = Penalty {
            lambda: 0.0,
            alpha: 1.0,
            psigx: 0.0,
            psigy: 0.0,
        };

        let free = fit_coefficients(Family::Gaussian, &problem, &base, &convergence).unwrap();
        let smoothed = fit_coefficients(
            Family::Gaussian,
            &problem,
            &Penalty { psigx: 50.0, ..base },
            &convergence,
        )
        .unwrap();

        let gap = |b: &Array2<f64>| (b[[0, 0]] - b[[1, 0]]).abs();
        assert!(gap(&smoothed.coefficients) < gap(&free.coefficients));
    }

    #[test]
    fn test_single_response_skips_response_graph() {
        let mut rng = StdRng::seed_from_u64(11);
        let x = random_matrix(&mut rng, 20, 3);
        let y = random_matrix(&mut rng, 20, 1);
        let gy = array![[1.0]];
        let gx = Array2::zeros((1, 1));
        let data = ModelData::new(Family::Gaussian, x, y, gx.view(), gy.view()).unwrap();
        let problem = Problem::from_data(&data);
        let convergence = Convergence::default();

        let a = fit_coefficients(Family::Gaussian, &problem, &Penalty::default(), &convergence).unwrap();
        let b = fit_coefficients(
            Family::Gaussian,
            &problem,
            &Penalty {
                psigy: 0.0,
                ..Penalty::default()
            },
            &convergence,
        )
        .unwrap();
        assert_eq!(a.coefficients, b.coefficients);
    }

    #[test]
    fn test_iteration_cap_returns_best_effort() {
        let mut rng = StdRng::seed_from_u64(5);
        let x = random_matrix(&mut rng, 15, 6);
        let y = random_matrix(&mut rng, 15, 2);
        let data = ModelData::without_graphs(Family::Gaussian, x, y).unwrap();
        let result = fit_coefficients(
            Family::Gaussian,
            &Problem::from_data(&data),
            &Penalty::default(),
            &Convergence {
                max_iterations: 1,
                threshold: 0.0,
            },
        )
        .unwrap();
        assert_eq!(result.status, CcdStatus::MaxIterationsReached);
        assert_eq!(result.sweeps, 1);
        assert!(result.coefficients.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_binomial_family_is_not_implemented() {
        let data =
            ModelData::without_graphs(Family::Binomial, Array2::ones((4, 2)), Array2::ones((4, 1)))
                .unwrap();
        let err = fit_coefficients(
            data.family(),
            &Problem::from_data(&data),
            &Penalty::default(),
            &Convergence::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EdgenetError::NotImplemented(_)));
    }
}
