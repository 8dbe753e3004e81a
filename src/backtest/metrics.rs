use serde::{Deserialize, Serialize};

/// Counts of predicted vs actual classes, "up" being positive
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(predicted: &[u8], actual: &[u8]) -> Self {
        let mut matrix = Self::default();
        for (&p, &a) in predicted.iter().zip(actual) {
            match (p == 1, a == 1) {
                (true, true) => matrix.true_positives += 1,
                (true, false) => matrix.false_positives += 1,
                (false, false) => matrix.true_negatives += 1,
                (false, true) => matrix.false_negatives += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    /// TP / (TP + FP); 0 with no positive predictions
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// TP / (TP + FN); 0 with no positive labels
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r > 0.0 {
            2.0 * p * r / (p + r)
        } else {
            0.0
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Classification metrics and long/short PnL over the held-out windows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestResult {
    // Classification
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub confusion: ConfusionMatrix,

    // Signals
    pub windows: usize,
    pub long_signals: usize,
    pub short_signals: usize,

    // P&L (label-based proxy, see `Backtester`)
    pub pnl: Vec<f64>,
    pub cumulative_returns: Vec<f64>,
    pub total_pnl: f64,
    pub max_drawdown: f64,
}

impl BacktestResult {
    /// Build the result from thresholded predictions, positions and labels
    pub fn from_signals(predicted: &[u8], positions: &[f64], actual: &[u8]) -> Self {
        let confusion = ConfusionMatrix::from_predictions(predicted, actual);

        let pnl: Vec<f64> = positions
            .iter()
            .zip(actual)
            .map(|(position, &label)| position * f64::from(label))
            .collect();

        let cumulative_returns: Vec<f64> = pnl
            .iter()
            .scan(0.0, |acc, step| {
                *acc += step;
                Some(*acc)
            })
            .collect();

        let total_pnl = cumulative_returns.last().copied().unwrap_or(0.0);
        let max_drawdown = Self::calculate_drawdown(&cumulative_returns);
        let long_signals = predicted.iter().filter(|&&p| p == 1).count();

        Self {
            accuracy: confusion.accuracy(),
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1: confusion.f1(),
            confusion,
            windows: predicted.len(),
            long_signals,
            short_signals: predicted.len() - long_signals,
            pnl,
            cumulative_returns,
            total_pnl,
            max_drawdown,
        }
    }

    /// Largest fall of the cumulative series from a running peak (starting at 0)
    fn calculate_drawdown(cumulative: &[f64]) -> f64 {
        let mut peak = 0.0_f64;
        let mut max_dd = 0.0_f64;

        for &value in cumulative {
            if value > peak {
                peak = value;
            }

            let drawdown = peak - value;
            if drawdown > max_dd {
                max_dd = drawdown;
            }
        }

        max_dd
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║              BACKTEST PERFORMANCE REPORT              ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");

        println!("📊 CLASSIFICATION");
        println!("  Test Windows:          {}", self.windows);
        println!("  Accuracy:              {:.2}%", self.accuracy * 100.0);
        println!("  Precision:             {:.2}%", self.precision * 100.0);
        println!("  Recall:                {:.2}%", self.recall * 100.0);
        println!("  F1 Score:              {:.3}", self.f1);

        println!("\n🔢 CONFUSION MATRIX");
        println!(
            "  Predicted UP:          {} correct / {} wrong",
            self.confusion.true_positives, self.confusion.false_positives
        );
        println!(
            "  Predicted DOWN:        {} correct / {} wrong",
            self.confusion.true_negatives, self.confusion.false_negatives
        );

        println!("\n📈 SIGNALS");
        println!("  Long:                  {}", self.long_signals);
        println!("  Short:                 {}", self.short_signals);

        println!("\n💰 P&L (label proxy)");
        println!("  Total P&L:             {:+.0}", self.total_pnl);
        println!("  Max Drawdown:          {:.0}", self.max_drawdown);

        println!("\n═══════════════════════════════════════════════════════\n");
    }
}
