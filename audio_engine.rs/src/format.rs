//! Immutable audio format descriptor.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
	Little,
	Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleEncoding {
	PcmSigned { bits: u8, endian: Endian },
	PcmUnsigned { bits: u8, endian: Endian },
	Float32 { endian: Endian },
	Float64 { endian: Endian },
}

impl SampleEncoding {
	#[must_use]
	pub const fn bytes_per_channel_sample(&self) -> usize {
		match self {
			Self::PcmSigned { bits, .. } | Self::PcmUnsigned { bits, .. } => (*bits as usize).div_ceil(8),
			Self::Float32 { .. } => 4,
			Self::Float64 { .. } => 8,
		}
	}
}

/// Immutable description of a multi-channel PCM stream.
///
/// Invariant: `frame_size == channels * encoding.bytes_per_channel_sample()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFormat {
	sample_rate: f64,
	channels: usize,
	encoding: SampleEncoding,
}

impl AudioFormat {
	/// # Panics
	/// - if `channels` is zero or `sample_rate` is not finite and positive.
	#[must_use]
	pub fn new(sample_rate: f64, channels: usize, encoding: SampleEncoding) -> Self {
		assert!(channels > 0, "channels-per-sample must be at least 1");
		assert!(
			sample_rate.is_finite() && sample_rate > 0.0,
			"sample rate must be finite and positive"
		);
		Self {
			sample_rate,
			channels,
			encoding,
		}
	}

	#[must_use]
	pub const fn sample_rate(&self) -> f64 {
		self.sample_rate
	}

	#[must_use]
	pub const fn channels(&self) -> usize {
		self.channels
	}

	#[must_use]
	pub const fn encoding(&self) -> SampleEncoding {
		self.encoding
	}

	#[must_use]
	pub const fn frame_size(&self) -> usize {
		self.channels * self.encoding.bytes_per_channel_sample()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_frame_size_invariant() {
		let format = AudioFormat::new(
			44100.0,
			2,
			SampleEncoding::PcmSigned {
				bits: 16,
				endian: Endian::Little,
			},
		);
		assert_eq!(format.frame_size(), 4);
	}

	#[test]
	#[should_panic(expected = "channels-per-sample")]
	fn test_rejects_zero_channels() {
		AudioFormat::new(44100.0, 0, SampleEncoding::Float32 { endian: Endian::Little });
	}
}
