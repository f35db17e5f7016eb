//! Intercepts, predictions and squared-error metrics.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Linear predictor `X·B` without intercept.
pub fn linear_predictor(x: ArrayView2<f64>, b: ArrayView2<f64>) -> Array2<f64> {
    x.dot(&b)
}

/// Residuals `Y - X·B`.
pub fn residuals(x: ArrayView2<f64>, y: ArrayView2<f64>, b: ArrayView2<f64>) -> Array2<f64> {
    &y - &linear_predictor(x, b)
}

/// Column-wise mean residual, one intercept per response.
///
/// Empty inputs yield zero intercepts.
pub fn intercept(x: ArrayView2<f64>, y: ArrayView2<f64>, b: ArrayView2<f64>) -> Array1<f64> {
    residuals(x, y, b)
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(y.ncols()))
}

/// Predictions `X·B + 1·intercept'`.
pub fn predict(x: ArrayView2<f64>, b: ArrayView2<f64>, intercept: ArrayView1<f64>) -> Array2<f64> {
    let mut fitted = linear_predictor(x, b);
    fitted += &intercept;
    fitted
}

/// Sum of squared residuals over all samples and responses.
pub fn sse(x: ArrayView2<f64>, y: ArrayView2<f64>, b: ArrayView2<f64>) -> f64 {
    residuals(x, y, b).iter().map(|r| r * r).sum()
}

/// Mean squared residual per matrix entry; 0 for empty inputs.
pub fn mse(x: ArrayView2<f64>, y: ArrayView2<f64>, b: ArrayView2<f64>) -> f64 {
    let count = y.len();
    if count == 0 {
        return 0.0;
    }
    sse(x, y, b) / count as f64
}
