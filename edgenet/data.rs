//! # Model Data Container
//!
//! Owns the design and response matrices of one fitting problem and everything
//! derived from them that stays fixed while coefficients are estimated: the
//! cross products `X'X` and `X'Y`, and the Laplacians of the two affinity
//! graphs. Building these once turns each coordinate update into a lookup over
//! cached rows instead of a pass over all samples.

use crate::laplacian::Laplacian;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Distribution family of the responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Real-valued responses with squared-error loss.
    #[default]
    Gaussian,
    /// Binary responses. Accepted at construction so callers can select it, but
    /// fitting it is not implemented.
    Binomial,
}

/// Errors raised while loading or assembling model inputs.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to read delimited file: {0}")]
    CsvError(#[from] csv::Error),

    #[error("The file '{0}' contains no data rows.")]
    EmptyFile(String),

    #[error("Row {line} of '{path}' has {found} columns, but the first row has {expected}.")]
    RaggedRow {
        path: String,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Could not parse '{value}' as a number (row {line}, column {column} of '{path}').")]
    ParseError {
        path: String,
        line: usize,
        column: usize,
        value: String,
    },

    #[error("Non-finite value found at row {line}, column {column} of '{path}'.")]
    NonFiniteValue {
        path: String,
        line: usize,
        column: usize,
    },

    #[error("Design matrix has {design} rows but response matrix has {response}.")]
    RowMismatch { design: usize, response: usize },

    #[error("Affinity matrix '{name}' must be square, got {rows}x{cols}.")]
    NonSquareGraph {
        name: &'static str,
        rows: usize,
        cols: usize,
    },
}

/// Computes `(X'X, X'Y)`.
pub fn cross_products(x: ArrayView2<f64>, y: ArrayView2<f64>) -> (Array2<f64>, Array2<f64>) {
    let xt = x.t();
    (xt.dot(&x), xt.dot(&y))
}

/// Fixed inputs of a fit: data, cross products and graph Laplacians.
#[derive(Debug, Clone)]
pub struct ModelData {
    family: Family,
    x: Array2<f64>,
    y: Array2<f64>,
    txx: Array2<f64>,
    txy: Array2<f64>,
    lx: Laplacian,
    ly: Laplacian,
}

impl ModelData {
    /// Assembles the container. A 1x1 affinity matrix is the "no graph"
    /// placeholder and disables the corresponding penalty.
    pub fn new(
        family: Family,
        x: Array2<f64>,
        y: Array2<f64>,
        gx: ArrayView2<f64>,
        gy: ArrayView2<f64>,
    ) -> Result<Self, DataError> {
        if x.nrows() != y.nrows() {
            return Err(DataError::RowMismatch {
                design: x.nrows(),
                response: y.nrows(),
            });
        }
        check_square("gx", gx)?;
        check_square("gy", gy)?;

        let (txx, txy) = cross_products(x.view(), y.view());
        let lx = Laplacian::new(gx, gx.nrows() > 1);
        let ly = Laplacian::new(gy, gy.nrows() > 1);

        log::debug!(
            "Model data: n={}, p={}, q={}, covariate graph {}, response graph {}",
            x.nrows(),
            x.ncols(),
            y.ncols(),
            if lx.is_enabled() { "on" } else { "off" },
            if ly.is_enabled() { "on" } else { "off" },
        );

        Ok(Self {
            family,
            x,
            y,
            txx,
            txy,
            lx,
            ly,
        })
    }

    /// Container without graph penalties, i.e. plain elastic net.
    pub fn without_graphs(family: Family, x: Array2<f64>, y: Array2<f64>) -> Result<Self, DataError> {
        let placeholder = Array2::zeros((1, 1));
        Self::new(family, x, y, placeholder.view(), placeholder.view())
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// Number of samples.
    pub fn n(&self) -> usize {
        self.x.nrows()
    }

    /// Number of covariates.
    pub fn p(&self) -> usize {
        self.x.ncols()
    }

    /// Number of responses.
    pub fn q(&self) -> usize {
        self.y.ncols()
    }

    pub fn x(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView2<'_, f64> {
        self.y.view()
    }

    pub fn txx(&self) -> ArrayView2<'_, f64> {
        self.txx.view()
    }

    pub fn txy(&self) -> ArrayView2<'_, f64> {
        self.txy.view()
    }

    pub fn lx(&self) -> &Laplacian {
        &self.lx
    }

    pub fn ly(&self) -> &Laplacian {
        &self.ly
    }
}

fn check_square(name: &'static str, g: ArrayView2<f64>) -> Result<(), DataError> {
    if g.nrows() != g.ncols() {
        return Err(DataError::NonSquareGraph {
            name,
            rows: g.nrows(),
            cols: g.ncols(),
        });
    }
    Ok(())
}
