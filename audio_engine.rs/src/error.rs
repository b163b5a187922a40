//! Error enums for each crate-scope boundary.
//!
//! Every fatal condition in the engine surfaces through one of these types;
//! anything merely logged (e.g. a failure while closing an already-finished
//! byte stream) never appears here — see the `log::error!`/`log::warn!`
//! call sites in `dispatcher.rs` and `player.rs` instead.

#[derive(thiserror::Error, Debug, Clone)]
pub enum DispatcherError {
	#[error("expected to skip {expected} bytes but only skipped {actual}")]
	ShortSkip { expected: usize, actual: usize },
	#[error(
		"partial read that is neither EOF nor a full block: expected {expected} bytes, got {actual}"
	)]
	PartialRead { expected: usize, actual: usize },
	#[error("byte source is unreadable: {0}")]
	Unreadable(String),
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum WsolaError {
	#[error("input event carries {actual} samples, expected exactly {expected}")]
	UnexpectedInputLength { expected: usize, actual: usize },
	#[error("invalid WSOLA parameters: {0}")]
	InvalidParams(String),
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum PlayerError {
	#[error("illegal transition: {action} is not valid from state {state}")]
	IllegalState {
		action: &'static str,
		state: &'static str,
	},
	#[error("unable to open source: {0}")]
	Unreadable(String),
	#[error("sink unavailable: {0}")]
	SinkUnavailable(String),
	#[error(transparent)]
	Dispatcher(#[from] DispatcherError),
	/// Not a failure: the reason recorded when the worker thread winds down
	/// because the controller called `stop()`/`pause()`/`eject()`, or
	/// because the byte source was exhausted.
	#[error("worker stopped")]
	Stopped,
}
