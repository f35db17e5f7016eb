#![deny(dead_code)]
#![deny(unused_imports)]

//! Network-regularized multivariate regression.
//!
//! Fits `Y ≈ X·B` under an elastic-net penalty plus two graph penalties: one
//! over covariates (rows of `B`) and one over responses (columns of `B`), each
//! expressed through a normalized graph Laplacian. Coefficients are estimated by
//! cyclic coordinate descent; the regularization strengths can be chosen by
//! k-fold cross-validation driven by a box-constrained derivative-free
//! trust-region search.

pub mod bobyqa;
pub mod ccd;
pub mod cross_validation;
pub mod cv_set;
pub mod data;
pub mod io;
pub mod laplacian;
pub mod model;
pub mod model_selection;
pub mod stat;

use thiserror::Error;

/// Errors raised by the numeric core.
#[derive(Error, Debug)]
pub enum EdgenetError {
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("Cannot split {samples} samples into {folds} folds. Need 2 <= folds <= samples.")]
    InvalidFolds { samples: usize, folds: usize },

    #[error("Invalid optimizer configuration: {0}")]
    InvalidOptimizer(String),

    #[error(transparent)]
    Data(#[from] data::DataError),
}
