//! Prototype low-pass filter design and the two convolution kernels
//! (up-sampling / down-sampling) that consume it.
//!
//! Named after the classic `FilterKit` of the public-domain bandlimited
//! interpolation resamplers this is grounded on: a single symmetric,
//! Kaiser-windowed sinc prototype (`lrs_lp_filter`) is sampled at `Npc`
//! phases per zero crossing out to `Nwing` taps, and the two kernels walk
//! that one table outward from a continuous input-time cursor.

/// One phase of the prototype filter, `Nwing + 1` samples long, sampled at
/// `Npc` sub-sample phases per zero crossing.
#[derive(Debug, Clone)]
pub struct FilterKit {
	imp: Vec<f64>,
	npc: usize,
	nwing: usize,
}

impl FilterKit {
	/// `cutoff` is the filter's cutoff as a fraction of the input Nyquist
	/// (`0 < cutoff <= 1`); `beta` is the Kaiser window parameter; `nwing`
	/// is the filter half-length in original-rate samples; `npc` is the
	/// number of phases the half-length is subdivided into.
	///
	/// # Panics
	/// - if `cutoff` is not in `(0, 1]`, or `nwing`/`npc` are zero.
	#[must_use]
	pub fn new(cutoff: f64, beta: f64, nwing: usize, npc: usize) -> Self {
		assert!(cutoff > 0.0 && cutoff <= 1.0, "cutoff must be in (0, 1]");
		assert!(nwing > 0 && npc > 0, "nwing and npc must be nonzero");
		let imp = lrs_lp_filter(nwing * npc, cutoff, beta, npc as f64);
		Self { imp, npc, nwing }
	}

	#[must_use]
	pub const fn nwing(&self) -> usize {
		self.nwing
	}

	#[must_use]
	pub const fn npc(&self) -> usize {
		self.npc
	}

	/// Value of the prototype filter at a fractional table index, linearly
	/// interpolating between adjacent table entries.
	fn tap(&self, table_index: f64) -> f64 {
		if table_index >= (self.imp.len() - 1) as f64 {
			return 0.0;
		}
		let lo = table_index.floor();
		let frac = table_index - lo;
		let lo = lo as usize;
		self.imp[lo] + frac * (self.imp[lo + 1] - self.imp[lo])
	}

	/// Up-sampling kernel (output rate >= input rate): walks outward from
	/// the continuous input-time cursor `center + frac` one input sample at
	/// a time, since every output sample needs the full input-rate-spaced
	/// filter.
	#[must_use]
	pub fn filter_up(&self, input: &[f32], n_ch: usize, center: usize, frac: f64) -> FilterResult {
		let mut res = FilterResult::new(n_ch);
		let scale = (self.nwing * self.npc) as f64;

		let mut d = 0usize;
		loop {
			let table_index = (d as f64 + frac) * self.npc as f64;
			if table_index >= scale || center + d >= input.len() / n_ch {
				break;
			}
			let t = self.tap(table_index);
			let base = (center + d) * n_ch;
			for c in 0..n_ch {
				res.acc[c] += f64::from(input[base + c]) * t;
			}
			d += 1;
		}

		let mut d = 1usize;
		loop {
			let table_index = (d as f64 - frac) * self.npc as f64;
			if table_index >= scale || d > center {
				break;
			}
			let t = self.tap(table_index);
			let base = (center - d) * n_ch;
			for c in 0..n_ch {
				res.acc[c] += f64::from(input[base + c]) * t;
			}
			d += 1;
		}
		res
	}

	/// Down-sampling kernel (output rate < input rate): the filter's
	/// effective taps are spaced `1/dhb` input samples apart instead of 1,
	/// scaling the prototype's time axis by the down-sampling ratio so the
	/// anti-alias cutoff tracks the new (lower) Nyquist.
	#[must_use]
	pub fn filter_ud(&self, input: &[f32], n_ch: usize, center: usize, frac: f64, dhb: f64) -> FilterResult {
		let mut res = FilterResult::new(n_ch);
		let scale = (self.nwing * self.npc) as f64;

		let mut d = 0usize;
		loop {
			let table_index = (d as f64 + frac) * self.npc as f64 * dhb;
			if table_index >= scale || center + d >= input.len() / n_ch {
				break;
			}
			let t = self.tap(table_index) * dhb;
			let base = (center + d) * n_ch;
			for c in 0..n_ch {
				res.acc[c] += f64::from(input[base + c]) * t;
			}
			d += 1;
		}

		let mut d = 1usize;
		loop {
			let table_index = (d as f64 - frac) * self.npc as f64 * dhb;
			if table_index >= scale || d > center {
				break;
			}
			let t = self.tap(table_index) * dhb;
			let base = (center - d) * n_ch;
			for c in 0..n_ch {
				res.acc[c] += f64::from(input[base + c]) * t;
			}
			d += 1;
		}
		res
	}
}

/// Per-channel accumulator a convolution kernel writes its output into.
#[derive(Debug, Clone)]
pub struct FilterResult {
	acc: Vec<f64>,
}

impl FilterResult {
	fn new(n_ch: usize) -> Self {
		Self { acc: vec![0.0; n_ch] }
	}

	#[must_use]
	pub fn channel(&self, c: usize) -> f32 {
		self.acc[c] as f32
	}

	#[must_use]
	pub fn n_ch(&self) -> usize {
		self.acc.len()
	}
}

/// Builds a Kaiser-windowed sinc low-pass prototype of `n` samples: `c[0] =
/// 2 * frq`, and for `i in 1..n`, `sinc(i * frq / num)` windowed by
/// `I0(beta * sqrt(1 - (i/(n-1))^2)) / I0(beta)`.
fn lrs_lp_filter(n: usize, frq: f64, beta: f64, num: f64) -> Vec<f64> {
	use std::f64::consts::PI;
	let mut c = vec![0.0_f64; n];
	if n == 0 {
		return c;
	}
	c[0] = 2.0 * frq;
	let i0_beta = bessel_i0(beta);
	for i in 1..n {
		let sinc = (2.0 * PI * i as f64 * frq / num).sin() / (PI * i as f64 / num);
		let windowed_arg = beta * (1.0 - (i as f64 / (n - 1) as f64).powi(2)).max(0.0).sqrt();
		let window = bessel_i0(windowed_arg) / i0_beta;
		c[i] = sinc * window;
	}
	c
}

/// Zeroth-order modified Bessel function of the first kind, via the series
/// `sum_n (x/2)^(2n) / (n!)^2`, truncated once a term drops below `1e-21`
/// relative to the running sum.
fn bessel_i0(x: f64) -> f64 {
	let mut sum = 1.0_f64;
	let mut term = 1.0_f64;
	let half_x_sq = (x / 2.0).powi(2);
	let mut n = 1_u32;
	loop {
		term *= half_x_sq / f64::from(n * n);
		if term < 1e-21 * sum {
			break;
		}
		sum += term;
		n += 1;
		if n > 1000 {
			break;
		}
	}
	sum
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_abs_diff_eq;

	#[test]
	fn test_bessel_i0_at_zero_is_one() {
		assert_abs_diff_eq!(bessel_i0(0.0), 1.0, epsilon = 1e-12);
	}

	#[test]
	fn test_bessel_i0_matches_known_value() {
		// I0(2) ~= 2.2795853
		assert_abs_diff_eq!(bessel_i0(2.0), 2.279_585_3, epsilon = 1e-6);
	}

	#[test]
	fn test_dc_gain_near_one_for_full_band_filter() {
		let kit = FilterKit::new(1.0, 5.0, 16, 32);
		let n_ch = 1;
		let input = vec![1.0_f32; 64];
		let res = kit.filter_up(&input, n_ch, 32, 0.0);
		assert!(res.channel(0) > 0.5);
	}

	#[test]
	fn test_filter_up_and_ud_agree_at_unity_ratio() {
		let kit = FilterKit::new(0.9, 5.0, 16, 32);
		let input: Vec<f32> = (0..64).map(|i| (i as f32 * 0.1).sin()).collect();
		let up = kit.filter_up(&input, 1, 32, 0.0);
		let ud = kit.filter_ud(&input, 1, 32, 0.0, 1.0);
		assert_abs_diff_eq!(up.channel(0), ud.channel(0), epsilon = 1e-6);
	}
}
