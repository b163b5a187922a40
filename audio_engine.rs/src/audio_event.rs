//! The per-call mutable carrier threaded through the processor chain.

use crate::format::AudioFormat;
use crate::sample_math::{SampleIndex, SampleMath};

/// Carries the current buffer, overlap, and position metadata through one
/// pass of the processor chain. Mutations a processor makes to the buffer
/// or overlap are visible to every processor downstream of it.
///
/// Invariant: `float_buffer.len() == event_sample_count * channels` and
/// `0 <= overlap < event_sample_count`.
#[derive(Debug, Clone)]
pub struct AudioEvent {
	float_buffer: Vec<f32>,
	byte_buffer: Vec<u8>,
	overlap: SampleIndex,
	bytes_processed: u64,
	format: AudioFormat,
	sample_math: SampleMath,
	/// Output-sample-count / input-sample-count ratio contributed by
	/// rate-changing stages upstream of the current point in the chain.
	output_to_input_ratio: f64,
}

impl AudioEvent {
	#[must_use]
	pub fn new(format: AudioFormat) -> Self {
		Self {
			float_buffer: Vec::new(),
			byte_buffer: Vec::new(),
			overlap: SampleIndex(0),
			bytes_processed: 0,
			format,
			sample_math: SampleMath::new(format.channels()),
			output_to_input_ratio: 1.0,
		}
	}

	#[must_use]
	pub fn float_buffer(&self) -> &[f32] {
		&self.float_buffer
	}

	#[must_use]
	pub fn float_buffer_mut(&mut self) -> &mut Vec<f32> {
		&mut self.float_buffer
	}

	pub fn set_float_buffer(&mut self, buffer: Vec<f32>) {
		debug_assert_eq!(buffer.len() % self.sample_math.n_ch(), 0);
		self.float_buffer = buffer;
	}

	#[must_use]
	pub fn byte_buffer(&self) -> &[u8] {
		&self.byte_buffer
	}

	#[must_use]
	pub fn byte_buffer_mut(&mut self) -> &mut Vec<u8> {
		&mut self.byte_buffer
	}

	#[must_use]
	pub fn overlap(&self) -> SampleIndex {
		self.overlap
	}

	pub fn set_overlap(&mut self, overlap: SampleIndex) {
		debug_assert!(overlap.0 < self.sample_math.n_of_samples(self.float_buffer.len()).0.max(1));
		self.overlap = overlap;
	}

	#[must_use]
	pub fn bytes_processed(&self) -> u64 {
		self.bytes_processed
	}

	pub fn set_bytes_processed(&mut self, bytes_processed: u64) {
		self.bytes_processed = bytes_processed;
	}

	#[must_use]
	pub fn format(&self) -> &AudioFormat {
		&self.format
	}

	#[must_use]
	pub fn sample_math(&self) -> SampleMath {
		self.sample_math
	}

	#[must_use]
	pub fn output_to_input_ratio(&self) -> f64 {
		self.output_to_input_ratio
	}

	pub fn set_output_to_input_ratio(&mut self, ratio: f64) {
		self.output_to_input_ratio = ratio;
	}

	/// `bytes_processed / (frame_size * sample_rate) * output_to_input_ratio`.
	#[must_use]
	pub fn time_stamp_secs(&self) -> f64 {
		self.bytes_processed as f64 / (self.format.frame_size() as f64 * self.format.sample_rate())
			* self.output_to_input_ratio
	}

	#[must_use]
	pub fn n_of_samples(&self) -> SampleIndex {
		self.sample_math.n_of_samples(self.float_buffer.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::format::SampleEncoding;

	fn format() -> AudioFormat {
		AudioFormat::new(
			44100.0,
			2,
			SampleEncoding::PcmSigned {
				bits: 16,
				endian: crate::format::Endian::Little,
			},
		)
	}

	#[test]
	fn test_time_stamp() {
		let mut event = AudioEvent::new(format());
		event.set_bytes_processed(4 * 44100);
		assert!((event.time_stamp_secs() - 1.0).abs() < 1e-9);
	}

	#[test]
	fn test_time_stamp_scaled_by_ratio() {
		let mut event = AudioEvent::new(format());
		event.set_bytes_processed(4 * 44100);
		event.set_output_to_input_ratio(0.5);
		assert!((event.time_stamp_secs() - 0.5).abs() < 1e-9);
	}
}
