use super::Indicator;
use crate::data::Candle;

/// Exponential moving average of bar closes.
///
/// `alpha = 2 / (period + 1)`. The first input seeds the value. Initialized
/// once `period` inputs have been seen.
#[derive(Debug, Clone)]
pub struct ExponentialMovingAverage {
    pub period: usize,
    pub alpha: f64,
    pub value: f64,
    pub count: usize,
    has_inputs: bool,
    initialized: bool,
}

impl ExponentialMovingAverage {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            value: 0.0,
            count: 0,
            has_inputs: false,
            initialized: false,
        }
    }

    pub fn update_raw(&mut self, value: f64) {
        if !self.has_inputs {
            self.has_inputs = true;
            self.value = value;
        }

        self.value = self.alpha * value + (1.0 - self.alpha) * self.value;
        self.count += 1;

        if !self.initialized && self.count >= self.period {
            self.initialized = true;
        }
    }
}

impl Indicator for ExponentialMovingAverage {
    fn name(&self) -> String {
        format!("EMA({})", self.period)
    }

    fn has_inputs(&self) -> bool {
        self.has_inputs
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    fn handle_bar(&mut self, bar: &Candle) {
        self.update_raw(bar.close);
    }

    fn reset(&mut self) {
        self.value = 0.0;
        self.count = 0;
        self.has_inputs = false;
        self.initialized = false;
    }
}
