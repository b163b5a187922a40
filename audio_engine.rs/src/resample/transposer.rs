//! Streaming variable-ratio sample-rate conversion, one event at a time.

use crate::audio_event::AudioEvent;
use crate::chain::AudioProcessor;
use crate::resample::filter_kit::FilterKit;
use crate::sample_math::SampleIndex;
use mutex_ext::LockExt;
use std::sync::Mutex;

/// Resamples every event's float buffer by a fixed ratio: `factor > 1`
/// up-samples (more output samples than input), `factor < 1` down-samples.
/// A ratio-changing rebuild of the filter kit is not supported mid-stream;
/// construct a new `RateTransposer` for a new ratio.
pub struct RateTransposer {
	kit: FilterKit,
	factor: f64,
	n_ch: usize,
	/// Reused output buffer, grown to the exact required length on demand.
	output: Mutex<Vec<f32>>,
}

impl RateTransposer {
	/// `factor` is `output_rate / input_rate`. `n_ch` is the number of
	/// interleaved channels every event's buffer carries.
	///
	/// # Panics
	/// - if `factor` is not finite and positive, or `n_ch` is zero.
	#[must_use]
	pub fn new(factor: f64, n_ch: usize) -> Self {
		assert!(factor.is_finite() && factor > 0.0, "factor must be finite and positive");
		assert!(n_ch > 0, "n_ch must be nonzero");
		let cutoff = if factor < 1.0 { factor } else { 1.0 };
		let kit = FilterKit::new(cutoff, 7.0, 16, 32);
		Self {
			kit,
			factor,
			n_ch,
			output: Mutex::new(Vec::new()),
		}
	}

	#[must_use]
	pub const fn factor(&self) -> f64 {
		self.factor
	}

	/// Number of output samples a block of `in_len` input samples yields.
	#[must_use]
	pub fn factor_adjusted_length(&self, in_len: SampleIndex) -> SampleIndex {
		SampleIndex((in_len.0 as f64 * self.factor).round() as usize)
	}

	fn resample(&self, input: &[f32]) -> Vec<f32> {
		let in_samples = input.len() / self.n_ch;
		let out_samples = self.factor_adjusted_length(SampleIndex(in_samples)).0;
		let half_window = self.kit.nwing() + 1;

		let mut out = vec![0.0_f32; out_samples * self.n_ch];
		for (o, out_frame) in out.chunks_exact_mut(self.n_ch).enumerate() {
			let t = o as f64 / self.factor;
			let center = t.floor() as usize;
			let frac = t - t.floor();
			if center < half_window || center + half_window >= in_samples {
				continue;
			}
			let result = if self.factor >= 1.0 {
				self.kit.filter_up(input, self.n_ch, center, frac)
			} else {
				self.kit.filter_ud(input, self.n_ch, center, frac, self.factor)
			};
			for (c, slot) in out_frame.iter_mut().enumerate() {
				*slot = result.channel(c);
			}
		}
		out
	}
}

impl AudioProcessor for RateTransposer {
	fn process(&self, event: &mut AudioEvent) -> bool {
		let resampled = self.resample(event.float_buffer());
		let out = self
			.output
			.with_lock_mut(|buf| {
				buf.clear();
				buf.extend_from_slice(&resampled);
				buf.clone()
			})
			.unwrap();
		event.set_float_buffer(out);
		let new_overlap = self.factor_adjusted_length(event.overlap());
		let cap = event.n_of_samples().0.saturating_sub(1);
		event.set_overlap(SampleIndex(new_overlap.0.min(cap)));
		let ratio = event.output_to_input_ratio() * self.factor;
		event.set_output_to_input_ratio(ratio);
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_abs_diff_eq;
	use crate::format::{AudioFormat, Endian, SampleEncoding};

	fn event_with(samples: &[f32], n_ch: usize) -> AudioEvent {
		let format = AudioFormat::new(
			44100.0,
			n_ch,
			SampleEncoding::Float32 {
				endian: Endian::Little,
			},
		);
		let mut event = AudioEvent::new(format);
		event.set_float_buffer(samples.to_vec());
		event
	}

	#[test]
	fn test_upsampling_grows_buffer() {
		let transposer = RateTransposer::new(2.0, 1);
		let input: Vec<f32> = (0..256).map(|i| (i as f32 * 0.05).sin()).collect();
		let mut event = event_with(&input, 1);
		transposer.process(&mut event);
		assert!(event.float_buffer().len() > input.len());
	}

	#[test]
	fn test_downsampling_shrinks_buffer() {
		let transposer = RateTransposer::new(0.5, 1);
		let input: Vec<f32> = (0..256).map(|i| (i as f32 * 0.05).sin()).collect();
		let mut event = event_with(&input, 1);
		transposer.process(&mut event);
		assert!(event.float_buffer().len() < input.len());
	}

	#[test]
	fn test_output_to_input_ratio_tracks_factor() {
		let transposer = RateTransposer::new(1.5, 2);
		let input: Vec<f32> = vec![0.0; 256 * 2];
		let mut event = event_with(&input, 2);
		transposer.process(&mut event);
		assert_abs_diff_eq!(event.output_to_input_ratio(), 1.5, epsilon = 1e-9);
	}
}
