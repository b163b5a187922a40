//! Per-sample linear gain with hard-clip.

use atomic_float::AtomicF32;
use std::sync::atomic::Ordering;

use crate::audio_event::AudioEvent;
use crate::chain::AudioProcessor;

/// Multiplies every non-overlap sample by a volatile gain, then clamps to
/// `[-1, 1]`. The overlap prefix is left untouched since it duplicates
/// samples an earlier event already processed.
pub struct GainProcessor {
	gain: AtomicF32,
}

impl GainProcessor {
	#[must_use]
	pub fn new(initial_gain: f32) -> Self {
		Self {
			gain: AtomicF32::new(initial_gain),
		}
	}

	pub fn set_gain(&self, gain: f32) {
		self.gain.store(gain, Ordering::Relaxed);
	}

	#[must_use]
	pub fn gain(&self) -> f32 {
		self.gain.load(Ordering::Relaxed)
	}
}

impl AudioProcessor for GainProcessor {
	fn process(&self, event: &mut AudioEvent) -> bool {
		let gain = self.gain();
		let overlap = event.overlap();
		let overlap_offset = event.sample_math().sample_to_array(overlap).0;

		for sample in &mut event.float_buffer_mut()[overlap_offset..] {
			*sample = (*sample * gain).clamp(-1.0, 1.0);
		}
		true
	}
}
