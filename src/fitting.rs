//! Nonlinear least-squares curve fitting.
//!
//! A small bounded Levenberg-Marquardt optimizer over 1-D curve models
//! with analytic Jacobians. This is the whole of the fitting machinery the
//! periodic-error pipeline needs; anything fancier belongs in a dedicated
//! optimization crate.

use anyhow::{bail, Result};
use nalgebra::{DMatrix, DVector};

/// A parametric curve y = f(x; params).
pub trait CurveModel: Send + Sync {
    /// Evaluate the model at `x` with the given parameters.
    fn value(&self, x: f64, params: &[f64]) -> f64;

    /// Partial derivatives of the model with respect to each parameter.
    fn gradient(&self, x: f64, params: &[f64], grad: &mut [f64]);

    fn param_count(&self) -> usize;
}

/// Worm-gear periodic error: amplitude * sin(x * freq + phase) + offset.
///
/// Parameters are ordered [freq, amplitude, phase, offset].
pub struct SineModel;

impl CurveModel for SineModel {
    fn value(&self, x: f64, params: &[f64]) -> f64 {
        let (freq, amplitude, phase, offset) = (params[0], params[1], params[2], params[3]);
        amplitude * (x * freq + phase).sin() + offset
    }

    fn gradient(&self, x: f64, params: &[f64], grad: &mut [f64]) {
        let (freq, amplitude, phase) = (params[0], params[1], params[2]);
        let arg = x * freq + phase;
        grad[0] = amplitude * x * arg.cos();
        grad[1] = arg.sin();
        grad[2] = amplitude * arg.cos();
        grad[3] = 1.0;
    }

    fn param_count(&self) -> usize {
        4
    }
}

/// Goodness-of-fit summary for a converged model.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct FitQuality {
    /// R-squared against the sample mean.
    pub r_squared: f64,
    /// Root mean square residual.
    pub rmse: f64,
}

pub fn fit_quality(model: &dyn CurveModel, xs: &[f64], ys: &[f64], params: &[f64]) -> FitQuality {
    let mean = ys.iter().sum::<f64>() / ys.len() as f64;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        ss_res += (y - model.value(x, params)).powi(2);
        ss_tot += (y - mean).powi(2);
    }
    FitQuality {
        r_squared: if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 },
        rmse: (ss_res / xs.len() as f64).sqrt(),
    }
}

/// Simple Levenberg-Marquardt optimizer for curve fitting
pub struct LevenbergMarquardt {
    max_iterations: usize,
    tolerance: f64,
    lambda: f64,
    lambda_factor: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-10,
            lambda: 0.01,
            lambda_factor: 10.0,
        }
    }
}

impl LevenbergMarquardt {
    /// Fit `model` to the sample points, starting from `initial_params`
    /// and clamping every update to the given bounds.
    pub fn fit(
        &mut self,
        model: &dyn CurveModel,
        xs: &[f64],
        ys: &[f64],
        initial_params: &[f64],
        lower_bounds: &[f64],
        upper_bounds: &[f64],
    ) -> Result<Vec<f64>> {
        let n_params = initial_params.len();
        let n_points = xs.len();

        if n_params != model.param_count() {
            bail!(
                "Model takes {} parameters, got {}",
                model.param_count(),
                n_params
            );
        }
        if xs.len() != ys.len() {
            bail!("Sample arrays differ in length: {} vs {}", xs.len(), ys.len());
        }
        if n_points < n_params {
            bail!(
                "Not enough data points for fitting: {} points for {} parameters",
                n_points,
                n_params
            );
        }

        let mut params = initial_params.to_vec();
        let mut best_params = params.clone();
        let mut best_error = f64::MAX;

        let mut jacobian = DMatrix::<f64>::zeros(n_points, n_params);
        let mut residuals = DVector::<f64>::zeros(n_points);
        let mut gradient = vec![0.0; n_params];

        for _iter in 0..self.max_iterations {
            // Calculate residuals and Jacobian
            let mut current_error = 0.0;
            for (i, (&x, &observed)) in xs.iter().zip(ys.iter()).enumerate() {
                let residual = observed - model.value(x, &params);
                residuals[i] = residual;
                current_error += residual * residual;

                model.gradient(x, &params, &mut gradient);
                for (j, &grad) in gradient.iter().enumerate() {
                    jacobian[(i, j)] = -grad; // Negative because residual = observed - predicted
                }
            }

            if current_error < best_error {
                best_error = current_error;
                best_params = params.clone();
            }

            if current_error < self.tolerance {
                break;
            }

            let jt = jacobian.transpose();
            let jtj = &jt * &jacobian;
            let jtr = &jt * &residuals;

            loop {
                // Add lambda to the diagonal (LM damping)
                let mut damped = jtj.clone();
                for i in 0..n_params {
                    damped[(i, i)] += self.lambda;
                }

                match damped.lu().solve(&jtr) {
                    Some(delta) => {
                        let mut new_params = params.clone();
                        for i in 0..n_params {
                            new_params[i] = (params[i] + delta[i])
                                .max(lower_bounds[i])
                                .min(upper_bounds[i]);
                        }

                        let mut new_error = 0.0;
                        for (&x, &observed) in xs.iter().zip(ys.iter()) {
                            let residual = observed - model.value(x, &new_params);
                            new_error += residual * residual;
                        }

                        if new_error < current_error {
                            // Accept update
                            params = new_params;
                            self.lambda /= self.lambda_factor;
                            break;
                        } else {
                            // Reject update, increase damping
                            self.lambda *= self.lambda_factor;
                            if self.lambda > 1e10 {
                                return Ok(best_params);
                            }
                        }
                    }
                    None => {
                        // Singular system, increase damping
                        self.lambda *= self.lambda_factor;
                        if self.lambda > 1e10 {
                            return Ok(best_params);
                        }
                    }
                }
            }
        }

        Ok(best_params)
    }

    /// Fit with no parameter bounds.
    pub fn fit_unbounded(
        &mut self,
        model: &dyn CurveModel,
        xs: &[f64],
        ys: &[f64],
        initial_params: &[f64],
    ) -> Result<Vec<f64>> {
        let lower = vec![f64::NEG_INFINITY; initial_params.len()];
        let upper = vec![f64::INFINITY; initial_params.len()];
        self.fit(model, xs, ys, initial_params, &lower, &upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_samples(freq: f64, amplitude: f64, phase: f64, offset: f64, n: usize) -> (Vec<f64>, Vec<f64>) {
        let xs: Vec<f64> = (0..n).map(|i| i as f64 * 0.1).collect();
        let ys: Vec<f64> = xs
            .iter()
            .map(|&x| amplitude * (x * freq + phase).sin() + offset)
            .collect();
        (xs, ys)
    }

    #[test]
    fn test_sine_model_gradient_matches_finite_difference() {
        let params = [1.7, 3.2, 0.4, -1.0];
        let mut grad = [0.0; 4];
        let x = 2.3;
        SineModel.gradient(x, &params, &mut grad);

        let eps = 1e-7;
        for j in 0..4 {
            let mut bumped = params;
            bumped[j] += eps;
            let numeric = (SineModel.value(x, &bumped) - SineModel.value(x, &params)) / eps;
            assert!(
                (grad[j] - numeric).abs() < 1e-4,
                "param {}: analytic {} vs numeric {}",
                j,
                grad[j],
                numeric
            );
        }
    }

    #[test]
    fn test_fit_recovers_clean_sine() {
        let (xs, ys) = sine_samples(2.0, 3.0, 0.5, 1.0, 100);
        let mut optimizer = LevenbergMarquardt::default();
        let params = optimizer
            .fit_unbounded(&SineModel, &xs, &ys, &[1.8, 2.0, 0.0, 0.5])
            .unwrap();
        assert!((params[0] - 2.0).abs() < 1e-3, "freq = {}", params[0]);
        assert!((params[1] - 3.0).abs() < 1e-3, "amplitude = {}", params[1]);
        assert!((params[2] - 0.5).abs() < 1e-2, "phase = {}", params[2]);
        assert!((params[3] - 1.0).abs() < 1e-3, "offset = {}", params[3]);
    }

    #[test]
    fn test_fit_respects_bounds() {
        let (xs, ys) = sine_samples(2.0, 3.0, 0.0, 0.0, 60);
        let mut optimizer = LevenbergMarquardt::default();
        let params = optimizer
            .fit(
                &SineModel,
                &xs,
                &ys,
                &[2.0, 1.0, 0.0, 0.0],
                &[1.5, 0.0, -1.0, -1.0],
                &[2.5, 2.0, 1.0, 1.0],
            )
            .unwrap();
        assert!(params[1] <= 2.0 + 1e-12);
    }

    #[test]
    fn test_fit_rejects_underdetermined_input() {
        let mut optimizer = LevenbergMarquardt::default();
        let result = optimizer.fit_unbounded(&SineModel, &[0.0, 1.0], &[0.0, 1.0], &[1.0, 1.0, 0.0, 0.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_fit_quality_perfect_fit() {
        let (xs, ys) = sine_samples(2.0, 3.0, 0.5, 1.0, 50);
        let quality = fit_quality(&SineModel, &xs, &ys, &[2.0, 3.0, 0.5, 1.0]);
        assert!(quality.r_squared > 0.999999);
        assert!(quality.rmse < 1e-9);
    }
}
