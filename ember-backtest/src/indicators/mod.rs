//! Streaming technical indicators fed one bar at a time.

mod ema;
mod stochastics;

pub use ema::ExponentialMovingAverage;
pub use stochastics::Stochastics;

use crate::data::Candle;

/// A bar-driven indicator.
pub trait Indicator {
    fn name(&self) -> String;

    /// At least one input has been received.
    fn has_inputs(&self) -> bool;

    /// Enough inputs have been received for the value to be meaningful.
    fn initialized(&self) -> bool;

    fn handle_bar(&mut self, bar: &Candle);

    fn reset(&mut self);
}
