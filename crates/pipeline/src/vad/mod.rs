//! Voice Activity Detection
//!
//! Telephony audio arrives as 20ms mu-law frames with a wide spread of line
//! noise between callers, so a fixed energy gate does not hold up. The adaptive
//! detector tracks the noise floor between utterances and derives the speech
//! threshold from it.

mod adaptive;

pub use adaptive::{AdaptiveVad, ThresholdState, VadConfig, VadDecision};
