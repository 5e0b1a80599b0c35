pub mod tuner;

pub use tuner::{ThresholdBias, ThresholdTuner, TuneError, TuneParams, TuneReport};
