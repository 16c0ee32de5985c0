use std::collections::VecDeque;

use super::Indicator;
use crate::data::Candle;

/// Stochastic oscillator (%K and a smoothed %D).
///
/// %K compares the close with the high/low range of the last `period_k` bars.
/// %D is the ratio of the summed `close - low` to the summed `high - low`
/// over the last `period_d` updates. A flat range (`high == low`) leaves both
/// values unchanged.
#[derive(Debug, Clone)]
pub struct Stochastics {
    pub period_k: usize,
    pub period_d: usize,
    pub value_k: f64,
    pub value_d: f64,
    highs: VecDeque<f64>,
    lows: VecDeque<f64>,
    c_sub_l: VecDeque<f64>,
    h_sub_l: VecDeque<f64>,
    has_inputs: bool,
    initialized: bool,
}

fn push_bounded(window: &mut VecDeque<f64>, value: f64, cap: usize) {
    if window.len() == cap {
        window.pop_front();
    }
    window.push_back(value);
}

impl Stochastics {
    pub fn new(period_k: usize, period_d: usize) -> Self {
        let period_k = period_k.max(1);
        let period_d = period_d.max(1);
        Self {
            period_k,
            period_d,
            value_k: 0.0,
            value_d: 0.0,
            highs: VecDeque::with_capacity(period_k),
            lows: VecDeque::with_capacity(period_k),
            c_sub_l: VecDeque::with_capacity(period_d),
            h_sub_l: VecDeque::with_capacity(period_d),
            has_inputs: false,
            initialized: false,
        }
    }

    pub fn update_raw(&mut self, high: f64, low: f64, close: f64) {
        self.has_inputs = true;
        push_bounded(&mut self.highs, high, self.period_k);
        push_bounded(&mut self.lows, low, self.period_k);

        if !self.initialized
            && self.highs.len() == self.period_k
            && self.lows.len() == self.period_k
        {
            self.initialized = true;
        }

        let max_high = self.highs.iter().copied().fold(f64::MIN, f64::max);
        let min_low = self.lows.iter().copied().fold(f64::MAX, f64::min);

        if max_high == min_low {
            return;
        }

        push_bounded(&mut self.c_sub_l, close - min_low, self.period_d);
        push_bounded(&mut self.h_sub_l, max_high - min_low, self.period_d);

        self.value_k = 100.0 * (close - min_low) / (max_high - min_low);
        let h_sum: f64 = self.h_sub_l.iter().sum();
        self.value_d = 100.0 * self.c_sub_l.iter().sum::<f64>() / h_sum;
    }
}

impl Indicator for Stochastics {
    fn name(&self) -> String {
        format!("Stochastics({},{})", self.period_k, self.period_d)
    }

    fn has_inputs(&self) -> bool {
        self.has_inputs
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    fn handle_bar(&mut self, bar: &Candle) {
        self.update_raw(bar.high, bar.low, bar.close);
    }

    fn reset(&mut self) {
        self.highs.clear();
        self.lows.clear();
        self.c_sub_l.clear();
        self.h_sub_l.clear();
        self.value_k = 0.0;
        self.value_d = 0.0;
        self.has_inputs = false;
        self.initialized = false;
    }
}
