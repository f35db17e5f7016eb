//! # Box-Constrained Derivative-Free Minimization
//!
//! A trust-region method in the spirit of Powell's BOBYQA for minimizing an
//! expensive black-box objective over a box `[lower, upper]`.
//!
//! The search runs in unit-scaled coordinates, where every free dimension maps
//! to `[0, 1]`, so a single radius is meaningful for bounds of very different
//! widths. Each iteration:
//!
//! 1.  Builds a separable quadratic model around the current point from `2n`
//!     interpolation points placed at distance `rho` along each axis. Next to a
//!     bound both points sit on the inner side, at `rho` and `rho / 2`, so every
//!     point stays feasible.
//! 2.  Minimizes the model exactly over the intersection of the box with the
//!     infinity-norm trust region of radius `delta`.
//! 3.  Compares actual and predicted reduction to grow or shrink `delta`.
//!
//! When the model can no longer produce a useful step, the resolution `rho` is
//! lowered from `radius_start` towards `radius_stop`; reaching `radius_stop`
//! ends the search. The evaluation budget is a hard cap. An objective error or
//! a non-finite value ends the search as well, keeping the best point seen.

use crate::EdgenetError;
use ndarray::{Array1, ArrayView1, Zip};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BobyqaStatus {
    /// The radius shrank to `radius_stop`.
    Converged,
    /// The evaluation budget ran out first.
    MaxEvaluationsReached,
    /// The objective failed; the best point evaluated before the failure is returned.
    ObjectiveFailed,
}

#[derive(Debug, Clone)]
pub struct BobyqaSolution {
    pub point: Array1<f64>,
    pub value: f64,
    pub evaluations: usize,
    pub status: BobyqaStatus,
}

#[derive(Debug, Clone)]
pub struct Bobyqa {
    lower: Array1<f64>,
    upper: Array1<f64>,
    radius_start: f64,
    radius_stop: f64,
    max_evaluations: usize,
}

/// Why a run stopped early inside the evaluation wrapper.
enum Stop {
    Budget,
    Failed(String),
}

impl Bobyqa {
    pub fn new(lower: Array1<f64>, upper: Array1<f64>) -> Self {
        Self {
            lower,
            upper,
            radius_start: 0.49,
            radius_stop: 1e-3,
            max_evaluations: 1000,
        }
    }

    /// Initial and final trust-region radius in unit-scaled coordinates.
    pub fn with_radius(mut self, start: f64, stop: f64) -> Self {
        self.radius_start = start;
        self.radius_stop = stop;
        self
    }

    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }

    fn validate(&self, x0: ArrayView1<f64>) -> Result<(), EdgenetError> {
        let invalid = |msg: String| Err(EdgenetError::InvalidOptimizer(msg));
        if self.lower.len() != self.upper.len() || self.lower.len() != x0.len() {
            return invalid(format!(
                "bounds have lengths {} and {} but the start point has {}",
                self.lower.len(),
                self.upper.len(),
                x0.len()
            ));
        }
        for (i, (&lo, &hi)) in self.lower.iter().zip(self.upper.iter()).enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return invalid(format!("bounds of dimension {i} are [{lo}, {hi}]"));
            }
        }
        if !(self.radius_stop > 0.0 && self.radius_stop <= self.radius_start) {
            return invalid(format!(
                "radius must shrink from start to a positive stop, got {} -> {}",
                self.radius_start, self.radius_stop
            ));
        }
        if self.radius_start >= 0.5 {
            return invalid(format!(
                "radius start {} must be below half the unit box",
                self.radius_start
            ));
        }
        if self.max_evaluations == 0 {
            return invalid("at least one objective evaluation is required".to_string());
        }
        Ok(())
    }

    /// Minimizes `objective` starting from `x0`, which is clamped into the box.
    ///
    /// Only configuration problems are errors. Objective failures are logged
    /// and reported through [`BobyqaStatus::ObjectiveFailed`].
    pub fn minimize<F, E>(
        &self,
        x0: ArrayView1<f64>,
        mut objective: F,
    ) -> Result<BobyqaSolution, EdgenetError>
    where
        F: FnMut(ArrayView1<f64>) -> Result<f64, E>,
        E: Display,
    {
        self.validate(x0)?;

        let width = &self.upper - &self.lower;
        let free: Vec<usize> = (0..width.len()).filter(|&i| width[i] > 0.0).collect();
        let start = Zip::from(&x0)
            .and(&self.lower)
            .and(&width)
            .map_collect(|&x, &lo, &w| {
                if w > 0.0 { ((x - lo) / w).clamp(0.0, 1.0) } else { 0.0 }
            });

        let mut wrapped = |x: ArrayView1<f64>| objective(x).map_err(|e| e.to_string());
        let mut tracker = Tracker {
            objective: &mut wrapped,
            lower: &self.lower,
            width: &width,
            evaluations: 0,
            max_evaluations: self.max_evaluations,
            best_u: start.clone(),
            best_f: f64::INFINITY,
        };

        let status = match self.search(&mut tracker, start, &free) {
            Ok(()) => BobyqaStatus::Converged,
            Err(Stop::Budget) => {
                log::info!(
                    "Optimizer stopped at the budget of {} evaluations",
                    self.max_evaluations
                );
                BobyqaStatus::MaxEvaluationsReached
            }
            Err(Stop::Failed(msg)) => {
                log::warn!(
                    "Objective failed after {} evaluations: {}. Keeping the best point found.",
                    tracker.evaluations,
                    msg
                );
                BobyqaStatus::ObjectiveFailed
            }
        };

        Ok(BobyqaSolution {
            point: tracker.to_point(tracker.best_u.view()),
            value: tracker.best_f,
            evaluations: tracker.evaluations,
            status,
        })
    }

    fn search(
        &self,
        tracker: &mut Tracker<'_>,
        start: Array1<f64>,
        free: &[usize],
    ) -> Result<(), Stop> {
        let mut u = start;
        let mut f = tracker.eval(u.view())?;
        if free.is_empty() {
            return Ok(());
        }

        let mut rho = self.radius_start;
        let mut delta = rho;

        loop {
            let f_before = f;
            let (g, h) = quadratic_model(tracker, &u, f, rho, free)?;
            let d = trust_region_step(&g, &h, &u, delta, free);

            let step_len = d.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
            let predicted = -(g.dot(&d) + 0.5 * (&h * &d * &d).sum());

            let mut ratio = 0.0;
            if step_len >= 0.5 * rho && predicted > 0.0 {
                let trial = (&u + &d).mapv(|v| v.clamp(0.0, 1.0));
                let f_trial = tracker.eval(trial.view())?;
                ratio = (f - f_trial) / predicted;
                delta = if ratio <= 0.1 {
                    0.5 * delta
                } else if ratio <= 0.7 {
                    (0.5 * delta).max(step_len)
                } else {
                    (0.5 * delta).max(2.0 * step_len)
                };
                delta = delta.min(0.5);
            } else {
                delta *= 0.1;
            }
            if delta <= 1.5 * rho {
                delta = rho;
            }

            u.assign(&tracker.best_u);
            f = tracker.best_f;
            log::debug!(
                "Optimizer: f={:.6e}, rho={:.3e}, delta={:.3e}, ratio={:.3}, evaluations={}",
                f,
                rho,
                delta,
                ratio,
                tracker.evaluations
            );

            let improved = f < f_before;
            if !improved && ratio <= 0.1 && delta <= rho {
                if rho <= self.radius_stop {
                    return Ok(());
                }
                let previous = rho;
                rho = next_rho(rho, self.radius_stop);
                delta = (0.5 * previous).max(rho);
            }
        }
    }
}

/// Powell's schedule for lowering the resolution towards `stop`.
fn next_rho(rho: f64, stop: f64) -> f64 {
    let ratio = rho / stop;
    if ratio <= 16.0 {
        stop
    } else if ratio <= 250.0 {
        (rho * stop).sqrt()
    } else {
        0.1 * rho
    }
}

/// Gradient and diagonal curvature of a quadratic through `f0` and two more
/// samples along each free axis.
fn quadratic_model(
    tracker: &mut Tracker<'_>,
    u: &Array1<f64>,
    f0: f64,
    rho: f64,
    free: &[usize],
) -> Result<(Array1<f64>, Array1<f64>), Stop> {
    let n = u.len();
    let mut g = Array1::zeros(n);
    let mut h = Array1::zeros(n);
    let mut probe = u.clone();

    for &i in free {
        let (a, b) = if u[i] + rho > 1.0 {
            (-rho, -0.5 * rho)
        } else if u[i] - rho < 0.0 {
            (rho, 0.5 * rho)
        } else {
            (rho, -rho)
        };

        probe[i] = u[i] + a;
        let fa = tracker.eval(probe.view())?;
        probe[i] = u[i] + b;
        let fb = tracker.eval(probe.view())?;
        probe[i] = u[i];

        let slope_a = (fa - f0) / a;
        let slope_b = (fb - f0) / b;
        h[i] = 2.0 * (slope_a - slope_b) / (a - b);
        g[i] = slope_a - 0.5 * h[i] * a;
    }
    Ok((g, h))
}

/// Exact minimizer of the separable model over the box and the trust region.
fn trust_region_step(
    g: &Array1<f64>,
    h: &Array1<f64>,
    u: &Array1<f64>,
    delta: f64,
    free: &[usize],
) -> Array1<f64> {
    let mut d = Array1::zeros(u.len());
    for &i in free {
        let lo = (-delta).max(-u[i]);
        let hi = delta.min(1.0 - u[i]);
        let model = |t: f64| g[i] * t + 0.5 * h[i] * t * t;

        let mut best = if model(lo) <= model(hi) { lo } else { hi };
        if h[i] > 0.0 {
            let interior = (-g[i] / h[i]).clamp(lo, hi);
            if model(interior) < model(best) {
                best = interior;
            }
        }
        d[i] = best;
    }
    d
}

/// Counts evaluations, enforces the budget and remembers the best point.
struct Tracker<'a> {
    objective: &'a mut dyn FnMut(ArrayView1<f64>) -> Result<f64, String>,
    lower: &'a Array1<f64>,
    width: &'a Array1<f64>,
    evaluations: usize,
    max_evaluations: usize,
    best_u: Array1<f64>,
    best_f: f64,
}

impl Tracker<'_> {
    fn to_point(&self, u: ArrayView1<f64>) -> Array1<f64> {
        // Clamp guards against rounding just past a bound.
        Zip::from(&u)
            .and(self.lower)
            .and(self.width)
            .map_collect(|&ui, &lo, &w| lo + ui.clamp(0.0, 1.0) * w)
    }

    fn eval(&mut self, u: ArrayView1<f64>) -> Result<f64, Stop> {
        if self.evaluations >= self.max_evaluations {
            return Err(Stop::Budget);
        }
        self.evaluations += 1;

        let x = self.to_point(u);
        let value = (self.objective)(x.view()).map_err(Stop::Failed)?;
        if !value.is_finite() {
            return Err(Stop::Failed(format!("non-finite objective value {value}")));
        }
        if value < self.best_f {
            self.best_f = value;
            self.best_u.assign(&u);
        }
        Ok(value)
    }
}
