//! Normalized graph Laplacians for the covariate and response graphs.
//!
//! An affinity matrix `A` with degrees `d_i = Σ_j A_ij` becomes
//!
//! ```text
//! L_ii = 1 - A_ii / d_i          (0 when d_i == 0)
//! L_ij = -A_ij / sqrt(d_i d_j)   (i != j, A_ij != 0)
//! ```
//!
//! Isolated nodes get an all-zero row and therefore never contribute to the
//! penalty. A disabled graph is represented by a 1x1 zero matrix, which the
//! solver recognizes as "no penalty" because its dimension never matches the
//! coefficient matrix.

use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayView2, Axis};

/// Builds the normalized Laplacian of `weights`, or a 1x1 zero placeholder when
/// `enabled` is false.
///
/// # Panics
///
/// Panics if `enabled` is true and `weights` is not square.
pub fn normalized_laplacian(weights: ArrayView2<f64>, enabled: bool) -> Array2<f64> {
    if !enabled {
        return Array2::zeros((1, 1));
    }
    assert_eq!(
        weights.nrows(),
        weights.ncols(),
        "affinity matrix must be square"
    );

    let n = weights.nrows();
    let degrees = weights.sum_axis(Axis(1));
    let mut laplacian = Array2::zeros((n, n));

    laplacian
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut row)| {
            let deg_i = degrees[i];
            for j in 0..n {
                let w = weights[[i, j]];
                row[j] = if i == j {
                    if deg_i > 0.0 { 1.0 - w / deg_i } else { 0.0 }
                } else if w != 0.0 && deg_i > 0.0 && degrees[j] > 0.0 {
                    -w / (deg_i * degrees[j]).sqrt()
                } else {
                    0.0
                };
            }
        });

    laplacian
}

/// A Laplacian together with a per-row cache of its non-zero off-diagonal
/// entries. Coordinate descent touches one row at a time, so walking the
/// cached neighbors avoids scanning the full dense row.
#[derive(Debug, Clone)]
pub struct Laplacian {
    matrix: Array2<f64>,
    neighbors: Vec<Vec<(usize, f64)>>,
    enabled: bool,
}

impl Laplacian {
    pub fn new(weights: ArrayView2<f64>, enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }
        let matrix = normalized_laplacian(weights, true);
        let neighbors = matrix
            .axis_iter(Axis(0))
            .into_par_iter()
            .enumerate()
            .map(|(i, row)| {
                row.iter()
                    .enumerate()
                    .filter(|&(j, &v)| j != i && v != 0.0)
                    .map(|(j, &v)| (j, v))
                    .collect::<Vec<_>>()
            })
            .collect();
        Self {
            matrix,
            neighbors,
            enabled: true,
        }
    }

    /// The placeholder used when no graph is supplied.
    pub fn disabled() -> Self {
        Self {
            matrix: Array2::zeros((1, 1)),
            neighbors: Vec::new(),
            enabled: false,
        }
    }

    pub fn dim(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether this Laplacian can penalize a coefficient axis of length `n`.
    pub fn applies_to(&self, n: usize) -> bool {
        self.enabled && self.dim() == n
    }

    #[inline]
    pub fn diagonal(&self, i: usize) -> f64 {
        self.matrix[[i, i]]
    }

    /// Non-zero off-diagonal entries of row `i` as `(column, value)` pairs.
    #[inline]
    pub fn neighbors(&self, i: usize) -> &[(usize, f64)] {
        &self.neighbors[i]
    }
}
