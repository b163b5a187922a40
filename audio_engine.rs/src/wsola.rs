//! Streaming WSOLA (Waveform-Similarity-Based Overlap-Add) time-stretcher.
//!
//! Searches for the best overlap-add alignment between successive input
//! sequences via normalized cross-correlation and cross-fades across the
//! boundary, changing playback tempo without shifting pitch.

use std::sync::{Arc, Mutex, Weak};

use arc_swap::ArcSwapOption;
use atomic_float::AtomicF64;
use mutex_ext::LockExt;
use std::sync::atomic::Ordering;

use crate::audio_event::AudioEvent;
use crate::chain::AudioProcessor;
use crate::dispatcher::DispatcherControl;
use crate::error::WsolaError;
use crate::sample_math::{SampleIndex, SampleMath};

/// `tempo`, `sample_rate` in Hz, and the three millisecond knobs from which
/// every derived sample count is computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WsolaParams {
	pub tempo: f64,
	pub sample_rate: f64,
	pub sequence_ms: f64,
	pub seek_window_ms: f64,
	pub overlap_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DerivedSizes {
	overlap_len: SampleIndex,
	seek_window: SampleIndex,
	seek: SampleIndex,
	int_skip: SampleIndex,
	sample_req: SampleIndex,
	output_len: SampleIndex,
	dispatcher_overlap: SampleIndex,
}

impl DerivedSizes {
	fn compute(p: &WsolaParams) -> Self {
		let sr = p.sample_rate;
		let overlap_len = (sr * p.overlap_ms / 1000.0).round() as usize;
		let seek_window = (sr * p.sequence_ms / 1000.0).round() as usize;
		let seek = (sr * p.seek_window_ms / 1000.0).round() as usize;
		let int_skip = (p.tempo * (seek_window as f64 - overlap_len as f64))
			.round()
			.max(0.0) as usize;
		let sample_req = (int_skip + overlap_len).max(seek_window) + seek;
		let output_len = seek_window - overlap_len;
		let dispatcher_overlap = sample_req - int_skip;
		Self {
			overlap_len: SampleIndex(overlap_len),
			seek_window: SampleIndex(seek_window),
			seek: SampleIndex(seek),
			int_skip: SampleIndex(int_skip),
			sample_req: SampleIndex(sample_req),
			output_len: SampleIndex(output_len),
			dispatcher_overlap: SampleIndex(dispatcher_overlap),
		}
	}
}

/// Validated builder for [`WsolaParams`], mirroring the teacher's
/// `AudioPlayerBuilder`/`InputStreamBuilder` pattern.
#[derive(Debug, Clone, Copy)]
pub struct WsolaParamsBuilder {
	tempo: f64,
	sample_rate: f64,
	sequence_ms: f64,
	seek_window_ms: f64,
	overlap_ms: f64,
}

impl Default for WsolaParamsBuilder {
	fn default() -> Self {
		Self {
			tempo: 1.0,
			sample_rate: 44100.0,
			sequence_ms: 82.0,
			seek_window_ms: 28.0,
			overlap_ms: 12.0,
		}
	}
}

impl WsolaParamsBuilder {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub const fn tempo(mut self, tempo: f64) -> Self {
		self.tempo = tempo;
		self
	}

	#[must_use]
	pub const fn sample_rate(mut self, sample_rate: f64) -> Self {
		self.sample_rate = sample_rate;
		self
	}

	#[must_use]
	pub const fn sequence_ms(mut self, sequence_ms: f64) -> Self {
		self.sequence_ms = sequence_ms;
		self
	}

	#[must_use]
	pub const fn seek_window_ms(mut self, seek_window_ms: f64) -> Self {
		self.seek_window_ms = seek_window_ms;
		self
	}

	#[must_use]
	pub const fn overlap_ms(mut self, overlap_ms: f64) -> Self {
		self.overlap_ms = overlap_ms;
		self
	}

	/// # Errors
	/// - if `tempo` or `sample_rate` are not finite and positive.
	/// - if the resulting `overlap_len` is not strictly smaller than
	///   `seek_window` (the cross-fade region must fit inside the sequence).
	pub fn build(self) -> Result<WsolaParams, WsolaError> {
		if !(self.tempo.is_finite() && self.tempo > 0.0) {
			return Err(WsolaError::InvalidParams(format!(
				"tempo must be finite and positive, got {}",
				self.tempo
			)));
		}
		if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
			return Err(WsolaError::InvalidParams(format!(
				"sample_rate must be finite and positive, got {}",
				self.sample_rate
			)));
		}
		let params = WsolaParams {
			tempo: self.tempo,
			sample_rate: self.sample_rate,
			sequence_ms: self.sequence_ms,
			seek_window_ms: self.seek_window_ms,
			overlap_ms: self.overlap_ms,
		};
		let sizes = DerivedSizes::compute(&params);
		if sizes.seek_window.0 < 2 * sizes.overlap_len.0 {
			return Err(WsolaError::InvalidParams(format!(
				"seek_window ({}) must be at least twice overlap_len ({}), so the cross-faded \
				 sequence body never has negative length",
				sizes.seek_window.0, sizes.overlap_len.0
			)));
		}
		Ok(params)
	}
}

struct WsolaState {
	sizes: DerivedSizes,
	mid: Vec<f32>,
	ref_mid: Vec<f32>,
	output: Vec<f32>,
}

impl WsolaState {
	fn new(sample_math: SampleMath, sizes: DerivedSizes) -> Self {
		Self {
			mid: sample_math.realloc(None, sizes.overlap_len),
			ref_mid: sample_math.realloc(None, sizes.overlap_len),
			output: sample_math.realloc(None, sizes.output_len),
			sizes,
		}
	}

	/// Reallocate `mid`/`ref_mid` when `overlap_len` grew or they were never
	/// allocated; always reallocate `output` to the new size.
	fn apply(&mut self, sample_math: SampleMath, new_sizes: DerivedSizes) {
		let grown_or_unallocated =
			new_sizes.overlap_len.0 > self.sizes.overlap_len.0 || self.mid.is_empty();
		if grown_or_unallocated {
			self.mid = sample_math.realloc(Some(&self.mid), new_sizes.overlap_len);
			self.ref_mid = sample_math.realloc(Some(&self.ref_mid), new_sizes.overlap_len);
		}
		self.output = sample_math.realloc(None, new_sizes.output_len);
		self.sizes = new_sizes;
	}

	fn recompute_ref_mid(&mut self, sample_math: SampleMath) {
		let n_ch = sample_math.n_ch();
		let overlap_len = self.sizes.overlap_len.0;
		for i in 0..overlap_len {
			let weight = (i * (overlap_len - i)) as f32;
			for c in 0..n_ch {
				self.ref_mid[i * n_ch + c] = self.mid[i * n_ch + c] * weight;
			}
		}
	}
}

fn mono_at(buf: &[f32], n_ch: usize, sample: usize) -> f32 {
	let start = sample * n_ch;
	buf[start..start + n_ch].iter().sum::<f32>() / n_ch as f32
}

/// Streaming time-stretcher; one instance consumes one dispatcher's worth
/// of fixed-size input events and emits re-timed output events.
pub struct WsolaProcessor {
	sample_math: SampleMath,
	state: Mutex<WsolaState>,
	pending: ArcSwapOption<WsolaParams>,
	tempo_mirror: AtomicF64,
	dispatcher: Mutex<Option<Weak<dyn DispatcherControl>>>,
}

impl WsolaProcessor {
	#[must_use]
	pub fn new(n_ch: usize, initial: WsolaParams) -> Self {
		let sample_math = SampleMath::new(n_ch);
		let sizes = DerivedSizes::compute(&initial);
		Self {
			sample_math,
			state: Mutex::new(WsolaState::new(sample_math, sizes)),
			pending: ArcSwapOption::from(None),
			tempo_mirror: AtomicF64::new(initial.tempo),
			dispatcher: Mutex::new(None),
		}
	}

	/// The sample count the next event must carry, for wiring up the
	/// dispatcher ahead of the first `process()` call.
	#[must_use]
	pub fn required_input_samples(&self) -> usize {
		self.state.with_lock(|s| s.sizes.sample_req.0).unwrap()
	}

	/// The overlap the dispatcher must request alongside
	/// [`Self::required_input_samples`].
	#[must_use]
	pub fn required_dispatcher_overlap(&self) -> usize {
		self.state.with_lock(|s| s.sizes.dispatcher_overlap.0).unwrap()
	}

	/// Weak/optional back-channel: WSOLA never owns the dispatcher, and
	/// tolerates its absence by simply skipping the geometry update.
	pub fn set_dispatcher(&self, handle: Weak<dyn DispatcherControl>) {
		self.dispatcher.with_lock_mut(|d| *d = Some(handle)).unwrap();
	}

	/// Queue a new parameter set; picked up at the end of the in-flight (or
	/// next, if none in flight) `process()` call. Only the latest update
	/// before it is consumed survives.
	pub fn set_params(&self, params: WsolaParams) {
		self.tempo_mirror.store(params.tempo, Ordering::Relaxed);
		self.pending.store(Some(Arc::new(params)));
	}

	pub fn set_tempo(&self, tempo: f64, sample_rate: f64, sequence_ms: f64, seek_window_ms: f64, overlap_ms: f64) {
		self.set_params(WsolaParams {
			tempo,
			sample_rate,
			sequence_ms,
			seek_window_ms,
			overlap_ms,
		});
	}

	/// Last tempo requested via [`Self::set_params`]/[`Self::set_tempo`], or
	/// the initial tempo if none has been requested yet. May briefly lead
	/// the tempo actually in effect (applied no later than the next event).
	#[must_use]
	pub fn tempo(&self) -> f64 {
		self.tempo_mirror.load(Ordering::Relaxed)
	}

	fn search_best_offset(&self, input: &[f32], state: &WsolaState) -> SampleIndex {
		let n_ch = self.sample_math.n_ch();
		let overlap_len = state.sizes.overlap_len.0;
		let seek = state.sizes.seek.0;

		if seek == 0 {
			return SampleIndex(0);
		}

		let mut norm: f32 = (0..overlap_len)
			.map(|i| {
				let r = mono_at(&state.ref_mid, n_ch, i);
				r * r
			})
			.sum();
		if norm < 1e-8 {
			norm = 1.0;
		}
		let norm_sqrt = norm.sqrt();

		let mut best_beta = 0usize;
		let mut best_score = f64::NEG_INFINITY;
		for beta in 0..seek {
			let corr: f32 = (0..overlap_len)
				.map(|i| {
					let r = mono_at(&state.ref_mid, n_ch, i);
					let s = mono_at(input, n_ch, i + beta);
					r * s
				})
				.sum();
			let normalized = f64::from(corr / norm_sqrt);
			let t = (2.0 * beta as f64 - seek as f64) / seek as f64;
			let score = (normalized + 0.1) * (1.0 - 0.25 * t * t);
			if score > best_score {
				best_score = score;
				best_beta = beta;
			}
		}
		SampleIndex(best_beta)
	}
}

impl AudioProcessor for WsolaProcessor {
	fn process(&self, event: &mut AudioEvent) -> bool {
		let n_ch = self.sample_math.n_ch();
		let tempo_for_this_event = self.tempo_mirror.load(Ordering::Relaxed).max(f64::MIN_POSITIVE);
		let input = event.float_buffer().to_vec();

		let outcome = self
			.state
			.with_lock_mut(|state| {
				let expected = self.sample_math.sample_to_array(state.sizes.sample_req).0;
				if input.len() != expected {
					return Err(expected);
				}

				let beta = self.search_best_offset(&input, state);

				let overlap_len = state.sizes.overlap_len.0;
				let output_len = state.sizes.output_len.0;

				for i in 0..overlap_len {
					let weight = i as f32;
					let inv_weight = (overlap_len - i) as f32;
					for c in 0..n_ch {
						let in_sample = input[(beta.0 + i) * n_ch + c];
						let mid_sample = state.mid[i * n_ch + c];
						let blended = if overlap_len == 0 {
							in_sample
						} else {
							(in_sample * weight + mid_sample * inv_weight) / overlap_len as f32
						};
						state.output[i * n_ch + c] = blended;
					}
				}

				let body_len = output_len - overlap_len;
				let body_src_start = (beta.0 + overlap_len) * n_ch;
				let body_dst_start = overlap_len * n_ch;
				state.output[body_dst_start..body_dst_start + body_len * n_ch]
					.copy_from_slice(&input[body_src_start..body_src_start + body_len * n_ch]);

				// Tail of the chosen sequence, not `beta + seek_window`: that would
				// run `overlap_len` samples past `sample_req` whenever
				// `beta` reaches its maximum (`seek - 1`).
				let mid_src_start = (beta.0 + output_len) * n_ch;
				state.mid.copy_from_slice(&input[mid_src_start..mid_src_start + overlap_len * n_ch]);
				state.recompute_ref_mid(self.sample_math);

				let output = state.output.clone();
				let pending_sizes = self.pending.swap(None).map(|pending| {
					let new_sizes = DerivedSizes::compute(&pending);
					state.apply(self.sample_math, new_sizes);
					new_sizes
				});

				Ok((output, pending_sizes))
			})
			.unwrap();

		match outcome {
			Err(expected) => {
				log::error!(
					"{}",
					WsolaError::UnexpectedInputLength {
						expected,
						actual: input.len(),
					}
				);
				false
			}
			Ok((output, pending_sizes)) => {
				event.set_float_buffer(output);
				event.set_overlap(SampleIndex(0));
				event.set_output_to_input_ratio(event.output_to_input_ratio() / tempo_for_this_event);

				if let Some(new_sizes) = pending_sizes {
					let handle = self
						.dispatcher
						.with_lock(|d| d.as_ref().and_then(Weak::upgrade))
						.unwrap();
					if let Some(handle) = handle {
						handle.set_step_and_overlap(new_sizes.sample_req.0, new_sizes.dispatcher_overlap.0);
					}
				}

				true
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::format::{AudioFormat, Endian, SampleEncoding};
	use approx::assert_abs_diff_eq;

	fn params(tempo: f64) -> WsolaParams {
		WsolaParamsBuilder::new()
			.tempo(tempo)
			.sample_rate(1000.0)
			.sequence_ms(40.0)
			.seek_window_ms(10.0)
			.overlap_ms(1.0)
			.build()
			.unwrap()
	}

	fn event_with(samples: &[f32]) -> AudioEvent {
		let format = AudioFormat::new(
			1000.0,
			1,
			SampleEncoding::Float32 {
				endian: Endian::Little,
			},
		);
		let mut event = AudioEvent::new(format);
		event.set_float_buffer(samples.to_vec());
		event
	}

	#[test]
	fn test_builder_rejects_overlap_not_smaller_than_seek_window() {
		let result = WsolaParamsBuilder::new()
			.tempo(1.0)
			.sample_rate(1000.0)
			.sequence_ms(10.0)
			.seek_window_ms(10.0)
			.overlap_ms(10.0)
			.build();
		assert!(result.is_err());
	}

	/// `mid_src_start + overlap_len` must stay within `sample_req` for
	/// every `beta` the search can return, including its maximum
	/// (`seek - 1`) — not just for the `overlap_ms = 1.0` case the other
	/// tests in this module happen to use.
	#[test]
	fn test_mid_refresh_window_never_overruns_sample_req_at_max_beta() {
		for tempo in [0.5, 1.0, 1.5, 2.0] {
			let p = WsolaParamsBuilder::new().tempo(tempo).build().unwrap();
			let sizes = DerivedSizes::compute(&p);
			let max_beta = sizes.seek.0.saturating_sub(1);
			let mid_src_start = max_beta + sizes.output_len.0;
			assert!(
				mid_src_start + sizes.overlap_len.0 <= sizes.sample_req.0,
				"tempo {tempo}: mid refresh window [{mid_src_start}, {}) overruns sample_req {}",
				mid_src_start + sizes.overlap_len.0,
				sizes.sample_req.0
			);
		}
	}

	/// Regression test for the default builder parameters
	/// (`overlap_ms = 12.0`, `sequence_ms = 82.0`, `seek_window_ms = 28.0`):
	/// driving enough events through a real (non-silent) signal lets the
	/// search land on a wide range of `beta`, including values that used to
	/// overrun the mid buffer and panic.
	#[test]
	fn test_process_survives_many_events_at_default_params() {
		let p = WsolaParamsBuilder::new().build().unwrap();
		let wsola = WsolaProcessor::new(1, p);
		let n_samples = wsola.required_input_samples();

		for event_idx in 0..60 {
			let phase = event_idx as f32 * 0.37;
			let input: Vec<f32> = (0..n_samples)
				.map(|i| (i as f32 * 0.05 + phase).sin() * 0.8)
				.collect();
			let mut event = event_with(&input);
			assert!(wsola.process(&mut event));
		}
	}

	#[test]
	fn test_process_produces_configured_output_length() {
		let p = params(1.0);
		let sizes = DerivedSizes::compute(&p);
		let wsola = WsolaProcessor::new(1, p);

		let input: Vec<f32> = (0..sizes.sample_req.0).map(|i| (i as f32 * 0.01).sin()).collect();
		let mut event = event_with(&input);
		assert!(wsola.process(&mut event));

		assert_eq!(event.float_buffer().len(), sizes.output_len.0);
		assert_eq!(event.overlap().0, 0);
	}

	#[test]
	fn test_rejects_wrong_length_input_without_panicking() {
		let p = params(1.0);
		let wsola = WsolaProcessor::new(1, p);
		let mut event = event_with(&[0.0; 3]);
		assert!(!wsola.process(&mut event));
	}

	#[test]
	fn test_pending_params_applied_after_current_event() {
		let p = params(1.0);
		let sizes_before = DerivedSizes::compute(&p);
		let wsola = WsolaProcessor::new(1, p);

		let slower = params(0.5);
		wsola.set_params(slower);
		assert_abs_diff_eq!(wsola.tempo(), 0.5, epsilon = 1e-9);

		let input: Vec<f32> = vec![0.0; sizes_before.sample_req.0];
		let mut event = event_with(&input);
		assert!(wsola.process(&mut event));
		assert_eq!(event.float_buffer().len(), sizes_before.output_len.0);

		let sizes_after = DerivedSizes::compute(&slower);
		assert_eq!(wsola.required_input_samples(), sizes_after.sample_req.0);
	}

	#[test]
	fn test_output_to_input_ratio_is_inverse_tempo() {
		let p = params(2.0);
		let sizes = DerivedSizes::compute(&p);
		let wsola = WsolaProcessor::new(1, p);
		let input = vec![0.0_f32; sizes.sample_req.0];
		let mut event = event_with(&input);
		wsola.process(&mut event);
		assert_abs_diff_eq!(event.output_to_input_ratio(), 0.5, epsilon = 1e-9);
	}
}
