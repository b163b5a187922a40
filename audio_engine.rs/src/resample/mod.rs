//! Kaiser-windowed polyphase sinc resampling (`FilterKit`) and the
//! streaming `RateTransposer` built on top of it.

mod filter_kit;
mod transposer;

pub use filter_kit::{FilterKit, FilterResult};
pub use transposer::RateTransposer;
