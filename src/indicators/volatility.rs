/// Relative change of each price vs the previous one; the first entry is `None`
pub fn calculate_returns(prices: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(prices.len());
    if prices.is_empty() {
        return out;
    }

    out.push(None);
    out.extend(prices.windows(2).map(|w| Some(w[1] / w[0] - 1.0)));
    out
}

/// Rolling sample standard deviation (n - 1 denominator)
///
/// An entry is defined only when every value in its trailing window is
/// defined, so a leading `None` pushes the first result one bar further out.
pub fn rolling_std(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window < 2 || values.len() < window {
        return out;
    }

    for end in (window - 1)..values.len() {
        let slice = &values[end + 1 - window..=end];
        let defined: Option<Vec<f64>> = slice.iter().copied().collect();

        if let Some(samples) = defined {
            let mean = samples.iter().sum::<f64>() / window as f64;
            let variance = samples
                .iter()
                .map(|v| {
                    let diff = v - mean;
                    diff * diff
                })
                .sum::<f64>()
                / (window - 1) as f64;
            out[end] = Some(variance.sqrt());
        }
    }

    out
}
