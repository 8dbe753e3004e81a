use crate::error::PredictorError;
use crate::Result;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ScaleParams {
    min: Vec<f64>,
    max: Vec<f64>,
}

/// Per-column min-max scaling into [0, 1]
///
/// Fit once, then applied unchanged to training, test and live rows. Values
/// outside the fitted range map outside [0, 1]. A constant column maps to 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MinMaxNormalizer {
    params: Option<ScaleParams>,
}

impl MinMaxNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    /// Fitted column count, if any
    pub fn columns(&self) -> Option<usize> {
        self.params.as_ref().map(|p| p.min.len())
    }

    /// Learn column minima and maxima. May only be called once.
    pub fn fit(&mut self, matrix: &Array2<f64>) -> Result<()> {
        if self.params.is_some() {
            return Err(PredictorError::config("normalizer is already fitted"));
        }
        if matrix.nrows() == 0 || matrix.ncols() == 0 {
            return Err(PredictorError::InsufficientData {
                what: "normalizer fit (rows)",
                needed: 1,
                got: matrix.nrows(),
            });
        }

        let mut min = Vec::with_capacity(matrix.ncols());
        let mut max = Vec::with_capacity(matrix.ncols());

        for (col, column) in matrix.axis_iter(Axis(1)).enumerate() {
            if let Some(row) = column.iter().position(|v| !v.is_finite()) {
                return Err(PredictorError::degenerate(format!(
                    "non-finite value in column {} at row {}",
                    col, row
                )));
            }

            let lo = column.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            if !(hi - lo).is_finite() {
                return Err(PredictorError::degenerate(format!(
                    "range of column {} overflows",
                    col
                )));
            }
            if hi == lo {
                tracing::warn!("Column {} is constant ({}), it will scale to 0", col, lo);
            }

            min.push(lo);
            max.push(hi);
        }

        self.params = Some(ScaleParams { min, max });
        Ok(())
    }

    /// Range of one fitted column
    pub fn range(&self, column: usize) -> Option<(f64, f64)> {
        let params = self.params.as_ref()?;
        Some((*params.min.get(column)?, *params.max.get(column)?))
    }

    pub fn transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        let params = self.checked_params(matrix)?;
        let mut out = matrix.clone();

        for (col, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let lo = params.min[col];
            let span = params.max[col] - lo;
            column.mapv_inplace(|v| if span > 0.0 { (v - lo) / span } else { 0.0 });
        }

        Ok(out)
    }

    pub fn inverse_transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        let params = self.checked_params(matrix)?;
        let mut out = matrix.clone();

        for (col, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let lo = params.min[col];
            let span = params.max[col] - lo;
            column.mapv_inplace(|v| if span > 0.0 { v * span + lo } else { lo });
        }

        Ok(out)
    }

    fn checked_params(&self, matrix: &Array2<f64>) -> Result<&ScaleParams> {
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| PredictorError::NotFitted("normalizer has not been fitted".into()))?;

        if matrix.ncols() != params.min.len() {
            return Err(PredictorError::config(format!(
                "expected {} columns, got {}",
                params.min.len(),
                matrix.ncols()
            )));
        }

        Ok(params)
    }
}
