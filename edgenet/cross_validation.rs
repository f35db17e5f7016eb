//! # Cross-Validated Loss
//!
//! Scores a candidate [`Penalty`] by refitting on each fold's training rows and
//! measuring squared error on its held-out rows. The Laplacians come from the
//! full data; only the cross products are rebuilt per fold. Each fold owns its
//! coefficient matrix, so folds run in parallel over the shared, read-only
//! [`ModelData`].

use crate::EdgenetError;
use crate::ccd::{Convergence, Penalty, Problem, fit_coefficients};
use crate::cv_set::{CvSet, Fold};
use crate::data::{ModelData, cross_products};
use crate::stat::sse;
use ndarray::Axis;
use rayon::prelude::*;

pub struct CrossValidator<'a> {
    data: &'a ModelData,
    cv: &'a CvSet,
    convergence: Convergence,
    parallel: bool,
}

impl<'a> CrossValidator<'a> {
    pub fn new(data: &'a ModelData, cv: &'a CvSet, convergence: Convergence) -> Self {
        Self {
            data,
            cv,
            convergence,
            parallel: true,
        }
    }

    /// Evaluate folds one after another instead of on the rayon pool.
    pub fn with_parallel_folds(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Held-out sum of squared errors for every fold, in fold order.
    pub fn fold_losses(&self, penalty: &Penalty) -> Result<Vec<f64>, EdgenetError> {
        let folds = self.cv.folds();
        if self.parallel {
            folds
                .par_iter()
                .map(|fold| self.fold_loss(fold, penalty))
                .collect()
        } else {
            folds
                .iter()
                .map(|fold| self.fold_loss(fold, penalty))
                .collect()
        }
    }

    /// Total held-out squared error summed over all folds.
    pub fn evaluate(&self, penalty: &Penalty) -> Result<f64, EdgenetError> {
        let total: f64 = self.fold_losses(penalty)?.iter().sum();
        log::debug!(
            "CV loss {:.6e} at lambda={:.4}, psigx={:.4}, psigy={:.4}",
            total,
            penalty.lambda,
            penalty.psigx,
            penalty.psigy
        );
        Ok(total)
    }

    fn fold_loss(&self, fold: &Fold, penalty: &Penalty) -> Result<f64, EdgenetError> {
        let x = self.data.x();
        let y = self.data.y();

        let x_train = x.select(Axis(0), fold.train());
        let y_train = y.select(Axis(0), fold.train());
        let (train_txx, train_txy) = cross_products(x_train.view(), y_train.view());

        let problem = Problem {
            txx: train_txx.view(),
            txy: train_txy.view(),
            lx: self.data.lx(),
            ly: self.data.ly(),
        };
        let fit = fit_coefficients(self.data.family(), &problem, penalty, &self.convergence)?;

        let x_test = x.select(Axis(0), fold.test());
        let y_test = y.select(Axis(0), fold.test());
        Ok(sse(x_test.view(), y_test.view(), fit.coefficients.view()))
    }
}
