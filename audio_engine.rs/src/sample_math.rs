//! Channel-aware index math.
//!
//! Two newtypes keep "a position among sampling points in time" and "a
//! position in the underlying interleaved `f32` array" from ever being
//! mixed up: [`SampleIndex`] counts samples (frames), [`ArrayIndex`] counts
//! floats. [`SampleMath::sample_to_array`] and [`SampleMath::array_to_sample`]
//! are the only legal crossing points between the two, mirroring
//! `audio_analysis.rs`'s `InterleavedAudioSamples`, generalized with
//! conversions that panic (in debug builds) the moment an off-by-`C` bug
//! would otherwise silently corrupt a buffer.

use derive_more::derive::{Add, AddAssign, From, Sub, SubAssign};

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash, Add, AddAssign, Sub, SubAssign, From,
)]
pub struct SampleIndex(pub usize);

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash, Add, AddAssign, Sub, SubAssign, From,
)]
pub struct ArrayIndex(pub usize);

impl std::ops::Deref for SampleIndex {
	type Target = usize;
	fn deref(&self) -> &usize {
		&self.0
	}
}

impl std::ops::Deref for ArrayIndex {
	type Target = usize;
	fn deref(&self) -> &usize {
		&self.0
	}
}

/// Channel-aware index math and buffer management, parameterized by the
/// number of interleaved channels per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleMath {
	n_ch: usize,
}

impl SampleMath {
	/// # Panics
	/// - if `n_ch` is zero.
	#[must_use]
	pub fn new(n_ch: usize) -> Self {
		assert!(n_ch > 0, "channels-per-sample must be at least 1");
		Self { n_ch }
	}

	#[must_use]
	pub const fn n_ch(&self) -> usize {
		self.n_ch
	}

	#[must_use]
	pub fn sample_to_array(&self, i: SampleIndex) -> ArrayIndex {
		ArrayIndex(i.0 * self.n_ch)
	}

	/// # Panics (debug only)
	/// - if `a` does not fall on a sample boundary, i.e. `a mod n_ch != 0`.
	#[must_use]
	pub fn array_to_sample(&self, a: ArrayIndex) -> SampleIndex {
		debug_assert_eq!(
			a.0 % self.n_ch,
			0,
			"array index {} is not a multiple of n_ch {}",
			a.0,
			self.n_ch
		);
		SampleIndex(a.0 / self.n_ch)
	}

	#[must_use]
	pub fn n_of_samples(&self, buffer_len: usize) -> SampleIndex {
		self.array_to_sample(ArrayIndex(buffer_len))
	}

	/// Allocate a buffer of `new_sample_count` samples (`new_sample_count * n_ch`
	/// floats), copying over the shorter of the two buffers' worth of samples
	/// from `old` when provided.
	#[must_use]
	pub fn realloc(&self, old: Option<&[f32]>, new_sample_count: SampleIndex) -> Vec<f32> {
		let mut buf = vec![0.0_f32; self.sample_to_array(new_sample_count).0];
		if let Some(old) = old {
			let to_copy = old.len().min(buf.len());
			buf[..to_copy].copy_from_slice(&old[..to_copy]);
		}
		buf
	}

	/// Fill `[from, from + count)` samples of `buffer` with `value`.
	pub fn fill(&self, buffer: &mut [f32], from: SampleIndex, count: SampleIndex, value: f32) {
		let start = self.sample_to_array(from).0;
		let end = self.sample_to_array(from + count).0;
		buffer[start..end].fill(value);
	}

	/// Scale `[from, from + count)` samples of `buffer` by `factor`, in place.
	pub fn scale(&self, buffer: &mut [f32], from: SampleIndex, count: SampleIndex, factor: f32) {
		let start = self.sample_to_array(from).0;
		let end = self.sample_to_array(from + count).0;
		buffer[start..end].iter_mut().for_each(|v| *v *= factor);
	}

	/// Shift `count` samples starting at `from` down to position `to` (`to <
	/// from`), e.g. moving a dispatcher's overlap tail to the head of its
	/// reusable buffer ahead of the next read.
	pub fn shift(
		&self,
		buffer: &mut [f32],
		from: SampleIndex,
		to: SampleIndex,
		count: SampleIndex,
	) {
		let src_start = self.sample_to_array(from).0;
		let src_end = self.sample_to_array(from + count).0;
		let dst_start = self.sample_to_array(to).0;
		buffer.copy_within(src_start..src_end, dst_start);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_sample_to_array_and_back() {
		let math = SampleMath::new(2);
		assert_eq!(math.sample_to_array(SampleIndex(3)), ArrayIndex(6));
		assert_eq!(math.array_to_sample(ArrayIndex(6)), SampleIndex(3));
	}

	#[test]
	fn test_realloc_copies_shorter_prefix() {
		let math = SampleMath::new(2);
		let old = [1.0_f32, 2.0, 3.0, 4.0];
		let grown = math.realloc(Some(&old), SampleIndex(3));
		assert_eq!(grown, vec![1.0, 2.0, 3.0, 4.0, 0.0, 0.0]);

		let shrunk = math.realloc(Some(&old), SampleIndex(1));
		assert_eq!(shrunk, vec![1.0, 2.0]);
	}

	#[test]
	fn test_fill_and_scale() {
		let math = SampleMath::new(2);
		let mut buf = vec![1.0_f32; 8];
		math.fill(&mut buf, SampleIndex(1), SampleIndex(2), 0.5);
		assert_eq!(buf, vec![1.0, 1.0, 0.5, 0.5, 0.5, 0.5, 1.0, 1.0]);

		math.scale(&mut buf, SampleIndex(0), SampleIndex(1), 2.0);
		assert_eq!(&buf[0..2], &[2.0, 2.0]);
	}

	#[test]
	fn test_shift_moves_overlap_tail() {
		let math = SampleMath::new(1);
		let mut buf = vec![1.0_f32, 2.0, 3.0, 4.0, 0.0, 0.0];
		math.shift(&mut buf, SampleIndex(2), SampleIndex(0), SampleIndex(2));
		assert_eq!(&buf[0..2], &[3.0, 4.0]);
	}

	#[test]
	fn test_n_of_samples() {
		let math = SampleMath::new(2);
		assert_eq!(math.n_of_samples(8), SampleIndex(4));
	}
}
