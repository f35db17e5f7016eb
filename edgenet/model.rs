use crate::EdgenetError;
use crate::ccd::{CcdStatus, Convergence, Penalty, Problem, fit_coefficients};
use crate::data::{Family, ModelData};
use crate::stat;
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Settings of a single fit with known hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FitConfig {
    pub penalty: Penalty,
    pub convergence: Convergence,
}

/// A fitted model, saved to and loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedModel {
    pub family: Family,
    pub status: CcdStatus,
    pub sweeps: usize,
    pub config: FitConfig,
    /// One intercept per response.
    pub intercept: Array1<f64>,
    /// Shape: [n_covariates, n_responses].
    pub coefficients: Array2<f64>,
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write model file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML model file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Prediction data has {found} covariates, but the model was trained on {expected}.")]
    MismatchedCovariates { found: usize, expected: usize },
}

/// Fits coefficients by coordinate descent, then the intercepts from the
/// converged coefficients.
pub fn fit(data: &ModelData, config: &FitConfig) -> Result<FittedModel, EdgenetError> {
    log::info!(
        "Fitting {} samples, {} covariates, {} responses (lambda={}, alpha={}, psigx={}, psigy={})",
        data.n(),
        data.p(),
        data.q(),
        config.penalty.lambda,
        config.penalty.alpha,
        config.penalty.psigx,
        config.penalty.psigy
    );

    let result = fit_coefficients(
        data.family(),
        &Problem::from_data(data),
        &config.penalty,
        &config.convergence,
    )?;

    match result.status {
        CcdStatus::Converged => log::info!("Converged after {} sweeps", result.sweeps),
        CcdStatus::MaxIterationsReached => log::warn!(
            "Coordinate descent hit the cap of {} sweeps (last change {:.3e}); returning the last iterate",
            result.sweeps,
            result.last_change
        ),
    }

    let intercept = stat::intercept(data.x(), data.y(), result.coefficients.view());
    Ok(FittedModel {
        family: data.family(),
        config: *config,
        status: result.status,
        sweeps: result.sweeps,
        intercept,
        coefficients: result.coefficients,
    })
}

impl FittedModel {
    pub fn n_covariates(&self) -> usize {
        self.coefficients.nrows()
    }

    pub fn n_responses(&self) -> usize {
        self.coefficients.ncols()
    }

    /// Predicts responses for new samples, shape [n_samples, n_responses].
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ModelError> {
        if x.ncols() != self.n_covariates() {
            return Err(ModelError::MismatchedCovariates {
                found: x.ncols(),
                expected: self.n_covariates(),
            });
        }
        Ok(stat::predict(
            x,
            self.coefficients.view(),
            self.intercept.view(),
        ))
    }

    /// Saves the model in a human-readable TOML format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let model = toml::from_str(&toml_string)?;
        Ok(model)
    }
}
