/// Exponential moving average over a full series
///
/// Smoothing factor is `2 / (period + 1)` and the average is seeded at the first
/// value with no bias correction, so every index has a value. A run of equal
/// values leaves the average exactly unchanged.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut series = Vec::with_capacity(values.len());
    let Some(&first) = values.first() else {
        return series;
    };

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut ema = first;
    series.push(ema);

    for value in &values[1..] {
        ema += alpha * (value - ema);
        series.push(ema);
    }

    series
}

/// Simple rolling mean, `None` until `period` defined samples are in the window
///
/// Undefined inputs reset readiness: a window containing any `None` is not ready.
pub fn rolling_mean(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |window| {
        window.iter().sum::<f64>() / window.len() as f64
    })
}

/// Rolling minimum over `period` defined samples
pub fn rolling_min(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |window| {
        window.iter().copied().fold(f64::INFINITY, f64::min)
    })
}

/// Rolling maximum over `period` defined samples
pub fn rolling_max(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |window| {
        window.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    })
}

fn rolling<F>(values: &[Option<f64>], period: usize, reduce: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    if period == 0 {
        return vec![None; values.len()];
    }

    let mut out = Vec::with_capacity(values.len());
    let mut window = Vec::with_capacity(period);

    for i in 0..values.len() {
        if i + 1 < period {
            out.push(None);
            continue;
        }

        window.clear();
        let complete = values[i + 1 - period..=i].iter().all(|v| match v {
            Some(v) => {
                window.push(*v);
                true
            }
            None => false,
        });

        out.push(if complete { Some(reduce(&window)) } else { None });
    }

    out
}
