/// Fixed-window arithmetic mean backed by a ring buffer for O(1) push.
#[derive(Debug, Clone)]
pub struct RollingMean {
    window: usize,
    buffer: Vec<f64>,
    head: usize,
    filled: usize,
    sum: f64,
}

impl RollingMean {
    pub fn new(window: usize) -> Self {
        assert!(window > 0, "rolling window must be > 0");
        Self {
            window,
            buffer: vec![0.0; window],
            head: 0,
            filled: 0,
            sum: 0.0,
        }
    }

    /// Push a value and return the mean once the window is full.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        if self.filled == self.window {
            self.sum -= self.buffer[self.head];
        } else {
            self.filled += 1;
        }
        self.buffer[self.head] = value;
        self.sum += value;
        self.head = (self.head + 1) % self.window;
        self.value()
    }

    pub fn value(&self) -> Option<f64> {
        (self.filled == self.window).then(|| self.sum / self.window as f64)
    }

    pub fn is_ready(&self) -> bool {
        self.filled == self.window
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

/// Trailing mean at every index (inclusive of that index), `None` during warm-up.
pub fn rolling_means(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut mean = RollingMean::new(window);
    values.iter().map(|v| mean.push(*v)).collect()
}

/// Mean of the `window` values strictly before each index.
pub fn prior_means(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut mean = RollingMean::new(window);
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        out.push(mean.value());
        mean.push(*v);
    }
    out
}

/// Plain mean of the last `window` values, `None` when there are fewer.
pub fn tail_mean(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    let tail = &values[values.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_wraps_correctly() {
        let mut m = RollingMean::new(3);
        assert_eq!(m.push(10.0), None);
        assert_eq!(m.push(20.0), None);
        assert!((m.push(30.0).unwrap() - 20.0).abs() < f64::EPSILON);
        assert!((m.push(40.0).unwrap() - 30.0).abs() < f64::EPSILON);
        assert!((m.push(50.0).unwrap() - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn prior_means_exclude_current() {
        let out = prior_means(&[1.0, 2.0, 3.0, 10.0], 3);
        assert_eq!(out[..3], [None, None, None]);
        assert!((out[3].unwrap() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn tail_mean_needs_full_window() {
        assert_eq!(tail_mean(&[1.0, 2.0], 3), None);
        assert!((tail_mean(&[5.0, 1.0, 2.0, 3.0], 3).unwrap() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    #[should_panic(expected = "rolling window must be > 0")]
    fn zero_window_panics() {
        RollingMean::new(0);
    }
}
