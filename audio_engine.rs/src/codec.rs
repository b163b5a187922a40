//! Byte <-> `f32` sample conversion.
//!
//! Pure and allocation-free per sample; the dispatcher is the only caller
//! and it owns the byte/float buffers this writes into. Kept below
//! [`crate::sample_math::SampleMath`] in the dependency graph: nothing in
//! here knows about channel counts, it only knows about one scalar sample's
//! worth of bytes at a time.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::format::{Endian, SampleEncoding};

/// Decode one channel sample's worth of bytes into a normalized `f32`.
///
/// Integer PCM is normalized by the encoding's full-scale magnitude; float
/// encodings pass through bit-for-bit. `bytes.len()` must equal
/// `encoding.bytes_per_channel_sample()`.
#[must_use]
pub fn decode_sample(bytes: &[u8], encoding: SampleEncoding) -> f32 {
	debug_assert_eq!(bytes.len(), encoding.bytes_per_channel_sample());
	match encoding {
		SampleEncoding::PcmSigned { bits, endian } => {
			let raw = read_int(bytes, endian);
			let full_scale = 1_i64 << (bits - 1);
			raw as f32 / full_scale as f32
		}
		SampleEncoding::PcmUnsigned { bits, endian } => {
			let raw = read_int(bytes, endian);
			let half = 1_i64 << (bits - 1);
			let centered = raw - half;
			centered as f32 / half as f32
		}
		SampleEncoding::Float32 { endian } => match endian {
			Endian::Little => LittleEndian::read_f32(bytes),
			Endian::Big => BigEndian::read_f32(bytes),
		},
		SampleEncoding::Float64 { endian } => (match endian {
			Endian::Little => LittleEndian::read_f64(bytes),
			Endian::Big => BigEndian::read_f64(bytes),
		}) as f32,
	}
}

/// Encode a normalized `f32` sample into `out`, the exact inverse of
/// [`decode_sample`]. `out.len()` must equal
/// `encoding.bytes_per_channel_sample()`.
pub fn encode_sample(value: f32, encoding: SampleEncoding, out: &mut [u8]) {
	debug_assert_eq!(out.len(), encoding.bytes_per_channel_sample());
	match encoding {
		SampleEncoding::PcmSigned { bits, endian } => {
			let full_scale = 1_i64 << (bits - 1);
			let raw = (value * full_scale as f32).round() as i64;
			write_int(raw, bits, endian, out);
		}
		SampleEncoding::PcmUnsigned { bits, endian } => {
			let half = 1_i64 << (bits - 1);
			let raw = (value * half as f32).round() as i64 + half;
			write_int(raw, bits, endian, out);
		}
		SampleEncoding::Float32 { endian } => match endian {
			Endian::Little => LittleEndian::write_f32(out, value),
			Endian::Big => BigEndian::write_f32(out, value),
		},
		SampleEncoding::Float64 { endian } => match endian {
			Endian::Little => LittleEndian::write_f64(out, f64::from(value)),
			Endian::Big => BigEndian::write_f64(out, f64::from(value)),
		},
	}
}

/// Decode a full interleaved byte region into the corresponding region of
/// `out` (already allocated by the caller, one `f32` per channel sample).
pub fn decode_buffer(bytes: &[u8], encoding: SampleEncoding, out: &mut [f32]) {
	let step = encoding.bytes_per_channel_sample();
	debug_assert_eq!(bytes.len(), out.len() * step);
	for (chunk, slot) in bytes.chunks_exact(step).zip(out.iter_mut()) {
		*slot = decode_sample(chunk, encoding);
	}
}

/// Encode a region of `f32` samples into the corresponding interleaved byte
/// region of `out` (already allocated by the caller).
pub fn encode_buffer(samples: &[f32], encoding: SampleEncoding, out: &mut [u8]) {
	let step = encoding.bytes_per_channel_sample();
	debug_assert_eq!(out.len(), samples.len() * step);
	for (chunk, &value) in out.chunks_exact_mut(step).zip(samples.iter()) {
		encode_sample(value, encoding, chunk);
	}
}

fn read_int(bytes: &[u8], endian: Endian) -> i64 {
	let mut buf = [0u8; 8];
	match endian {
		Endian::Little => buf[..bytes.len()].copy_from_slice(bytes),
		Endian::Big => buf[8 - bytes.len()..].copy_from_slice(bytes),
	}
	match endian {
		Endian::Little => {
			let unsigned = LittleEndian::read_uint(&buf, bytes.len());
			sign_extend(unsigned, bytes.len())
		}
		Endian::Big => {
			let unsigned = BigEndian::read_uint(bytes, bytes.len());
			sign_extend(unsigned, bytes.len())
		}
	}
}

fn sign_extend(unsigned: u64, n_bytes: usize) -> i64 {
	let bits = n_bytes * 8;
	let shift = 64 - bits;
	((unsigned << shift) as i64) >> shift
}

fn write_int(value: i64, bits: u8, endian: Endian, out: &mut [u8]) {
	let n_bytes = (bits as usize).div_ceil(8);
	let mask = if bits >= 64 { u64::MAX } else { (1_u64 << bits) - 1 };
	let unsigned = (value as u64) & mask;
	match endian {
		Endian::Little => LittleEndian::write_uint(out, unsigned, n_bytes),
		Endian::Big => BigEndian::write_uint(out, unsigned, n_bytes),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_abs_diff_eq;

	fn round_trip(encoding: SampleEncoding, value: f32) {
		let len = encoding.bytes_per_channel_sample();
		let mut bytes = vec![0u8; len];
		encode_sample(value, encoding, &mut bytes);
		let decoded = decode_sample(&bytes, encoding);
		assert_abs_diff_eq!(decoded, value, epsilon = 1e-3);
	}

	#[test]
	fn test_pcm16_round_trip() {
		let encoding = SampleEncoding::PcmSigned {
			bits: 16,
			endian: Endian::Little,
		};
		for v in [-1.0, -0.5, 0.0, 0.1, 0.2, 0.9] {
			round_trip(encoding, v);
		}
	}

	#[test]
	fn test_pcm8_unsigned_round_trip() {
		let encoding = SampleEncoding::PcmUnsigned {
			bits: 8,
			endian: Endian::Big,
		};
		for v in [-1.0, -0.25, 0.0, 0.5, 0.99] {
			round_trip(encoding, v);
		}
	}

	#[test]
	fn test_pcm24_round_trip() {
		let encoding = SampleEncoding::PcmSigned {
			bits: 24,
			endian: Endian::Little,
		};
		for v in [-1.0, -0.3, 0.0, 0.3, 0.75] {
			round_trip(encoding, v);
		}
	}

	#[test]
	fn test_float32_bit_exact() {
		let encoding = SampleEncoding::Float32 {
			endian: Endian::Little,
		};
		let mut bytes = [0u8; 4];
		encode_sample(0.123_456_79, encoding, &mut bytes);
		assert_eq!(decode_sample(&bytes, encoding), 0.123_456_79_f32);
	}

	#[test]
	fn test_decode_buffer_matches_per_sample() {
		let encoding = SampleEncoding::PcmSigned {
			bits: 16,
			endian: Endian::Little,
		};
		let mut bytes = vec![0u8; 8];
		for (i, chunk) in bytes.chunks_exact_mut(2).enumerate() {
			encode_sample(0.1 * i as f32, encoding, chunk);
		}
		let mut out = vec![0.0_f32; 4];
		decode_buffer(&bytes, encoding, &mut out);
		for (i, v) in out.iter().enumerate() {
			assert_abs_diff_eq!(*v, 0.1 * i as f32, epsilon = 1e-3);
		}
	}
}
