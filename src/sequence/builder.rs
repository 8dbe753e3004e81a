use super::normalizer::MinMaxNormalizer;
use crate::error::PredictorError;
use crate::models::{FeatureRow, FEATURE_COUNT};
use crate::Result;
use ndarray::{s, Array2, Array3};

/// Labelled windows in chronological order
#[derive(Debug, Clone)]
pub struct WindowSet {
    /// `[windows, sequence_length, features]`
    pub inputs: Array3<f64>,
    /// 1 when the bar after the window closes above the window's last bar
    pub labels: Vec<u8>,
    /// Row index (into the feature rows) where each window starts
    pub start_indices: Vec<usize>,
}

impl WindowSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Fraction of windows labelled up
    pub fn up_ratio(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        self.labels.iter().filter(|&&l| l == 1).count() as f64 / self.labels.len() as f64
    }

    fn slice(&self, range: std::ops::Range<usize>) -> WindowSet {
        WindowSet {
            inputs: self.inputs.slice(s![range.clone(), .., ..]).to_owned(),
            labels: self.labels[range.clone()].to_vec(),
            start_indices: self.start_indices[range].to_vec(),
        }
    }
}

/// Chronological train/test partition; every train window precedes every test window
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub train: WindowSet,
    pub test: WindowSet,
}

/// Normalizes feature rows and cuts them into overlapping labelled windows
#[derive(Debug, Clone)]
pub struct SequenceBuilder {
    sequence_length: usize,
    normalizer: MinMaxNormalizer,
}

impl SequenceBuilder {
    pub fn new(sequence_length: usize) -> Result<Self> {
        if sequence_length == 0 {
            return Err(PredictorError::config("sequence_length must be positive"));
        }

        Ok(Self {
            sequence_length,
            normalizer: MinMaxNormalizer::new(),
        })
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn normalizer(&self) -> &MinMaxNormalizer {
        &self.normalizer
    }

    /// Fit the normalizer, build every window and split train/test
    ///
    /// The normalizer is fit on ALL rows, test rows included, before the
    /// split. Test windows therefore see min/max values taken from their own
    /// future. Do not treat the test metrics as strictly out-of-sample.
    pub fn fit_transform(
        &mut self,
        rows: &[FeatureRow],
        test_fraction: f64,
    ) -> Result<DatasetSplit> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(PredictorError::config(format!(
                "test_fraction must be in (0, 1), got {}",
                test_fraction
            )));
        }
        if self.sequence_length >= rows.len() {
            return Err(PredictorError::config(format!(
                "sequence_length {} must be smaller than the number of feature rows {}",
                self.sequence_length,
                rows.len()
            )));
        }

        let matrix = feature_matrix(rows)?;
        let (close_min, close_max) = column_range(&matrix, 0);
        if close_max == close_min {
            return Err(PredictorError::degenerate(
                "close column has zero range, up/down labels are undefined",
            ));
        }

        self.normalizer.fit(&matrix)?;
        let scaled = self.normalizer.transform(&matrix)?;
        let windows = self.build_windows(&scaled);

        let split = (windows.len() as f64 * (1.0 - test_fraction)).floor() as usize;
        if split == 0 || split == windows.len() {
            return Err(PredictorError::InsufficientData {
                what: "train/test split (windows)",
                needed: 2,
                got: windows.len(),
            });
        }

        let train = windows.slice(0..split);
        let test = windows.slice(split..windows.len());

        tracing::info!(
            "Built {} windows of length {}: {} train ({:.1}% up), {} test ({:.1}% up)",
            windows.len(),
            self.sequence_length,
            train.len(),
            train.up_ratio() * 100.0,
            test.len(),
            test.up_ratio() * 100.0
        );

        Ok(DatasetSplit { train, test })
    }

    /// The single most recent window, scaled with the already-fit normalizer
    pub fn transform(&self, rows: &[FeatureRow]) -> Result<Array3<f64>> {
        if !self.normalizer.is_fitted() {
            return Err(PredictorError::NotFitted(
                "sequence builder has no fitted normalizer".into(),
            ));
        }
        if rows.len() < self.sequence_length {
            return Err(PredictorError::InsufficientData {
                what: "live window (feature rows)",
                needed: self.sequence_length,
                got: rows.len(),
            });
        }

        let recent = &rows[rows.len() - self.sequence_length..];
        let scaled = self.normalizer.transform(&feature_matrix(recent)?)?;

        scaled
            .into_shape((1, self.sequence_length, FEATURE_COUNT))
            .map_err(|e| PredictorError::config(e.to_string()))
    }

    fn build_windows(&self, scaled: &Array2<f64>) -> WindowSet {
        let seq = self.sequence_length;
        let count = scaled.nrows() - seq;

        let mut inputs = Array3::zeros((count, seq, scaled.ncols()));
        let mut labels = Vec::with_capacity(count);

        for i in 0..count {
            inputs
                .slice_mut(s![i, .., ..])
                .assign(&scaled.slice(s![i..i + seq, ..]));

            let next_close = scaled[[i + seq, 0]];
            let last_close = scaled[[i + seq - 1, 0]];
            labels.push(u8::from(next_close > last_close));
        }

        WindowSet {
            inputs,
            labels,
            start_indices: (0..count).collect(),
        }
    }
}

fn feature_matrix(rows: &[FeatureRow]) -> Result<Array2<f64>> {
    let flat: Vec<f64> = rows.iter().flat_map(|r| r.values()).collect();
    Array2::from_shape_vec((rows.len(), FEATURE_COUNT), flat)
        .map_err(|e| PredictorError::config(e.to_string()))
}

fn column_range(matrix: &Array2<f64>, col: usize) -> (f64, f64) {
    matrix.column(col).iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(lo, hi), &v| (lo.min(v), hi.max(v)),
    )
}
