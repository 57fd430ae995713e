use std::time::Duration;

pub fn mean(data: &[f64]) -> Option<f64> {
    let sum = data.iter().sum::<f64>();
    let count = data.len();

    match count {
        positive if positive > 0 => Some(sum / count as f64),
        _ => None,
    }
}

pub fn std_dev(data: &[f64]) -> Option<f64> {
    match (mean(data), data.len()) {
        (Some(data_mean), count) if count > 0 => {
            let variance = data
                .iter()
                .map(|value| {
                    let diff = data_mean - *value;

                    diff * diff
                })
                .sum::<f64>()
                / count as f64;

            Some(variance.sqrt())
        }
        _ => None,
    }
}

/// `mm:ss` clock text, rounding to the nearest second from tenths
pub fn format_clock(elapsed: Duration) -> String {
    let tenths = elapsed.as_millis() / 100;
    let secs = (tenths + 5) / 10;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
