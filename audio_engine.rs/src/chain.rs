//! The ordered, concurrently-modifiable chain of audio processors.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::audio_event::AudioEvent;

/// Capability every stage of the chain implements: mutate the event and
/// decide whether the chain should continue to the next processor, and
/// tear down exactly once when removed or when the chain is dropped.
pub trait AudioProcessor: Send + Sync {
	/// Returning `false` short-circuits the chain for this event. Mutations
	/// made to `event` before returning are visible to whatever processor
	/// would have run next, had the chain not been short-circuited.
	fn process(&self, event: &mut AudioEvent) -> bool;

	/// Called exactly once: either when this processor is removed from the
	/// chain, or when the chain itself is torn down.
	fn finished(&self) {}
}

/// Ordered sequence of processors supporting concurrent append/remove
/// during iteration.
///
/// Readers of [`ProcessorChain::for_each`] see a stable snapshot: the
/// current `Arc<Vec<_>>` is cloned once up front via an `ArcSwap`, so a
/// concurrent `add`/`remove` never mutates a list a reader is midway
/// through, and insertion order is preserved across snapshots.
pub struct ProcessorChain {
	processors: ArcSwap<Vec<Arc<dyn AudioProcessor>>>,
}

impl Default for ProcessorChain {
	fn default() -> Self {
		Self::new()
	}
}

impl ProcessorChain {
	#[must_use]
	pub fn new() -> Self {
		Self {
			processors: ArcSwap::from_pointee(Vec::new()),
		}
	}

	/// Append `processor`; it takes effect starting with the next event.
	pub fn add(&self, processor: Arc<dyn AudioProcessor>) {
		let current = self.processors.load_full();
		let mut next = (*current).clone();
		next.push(processor);
		self.processors.store(Arc::new(next));
	}

	/// Detach `processor` (compared by pointer identity) and invoke its
	/// `finished()` exactly once. No-op if `processor` is not in the chain.
	pub fn remove(&self, processor: &Arc<dyn AudioProcessor>) {
		let current = self.processors.load_full();
		if !current.iter().any(|p| Arc::ptr_eq(p, processor)) {
			return;
		}
		let next = current
			.iter()
			.filter(|p| !Arc::ptr_eq(p, processor))
			.cloned()
			.collect::<Vec<_>>();
		self.processors.store(Arc::new(next));
		processor.finished();
	}

	/// Visit processors in insertion order on a stable snapshot, stopping
	/// early if `f` returns `false`.
	pub fn for_each(&self, mut f: impl FnMut(&Arc<dyn AudioProcessor>) -> bool) {
		let snapshot = self.processors.load_full();
		for processor in snapshot.iter() {
			if !f(processor) {
				break;
			}
		}
	}

	/// Tear down the chain: call `finished()` on every processor currently
	/// present, then empty the chain.
	pub fn finish_all(&self) {
		let snapshot = self.processors.swap(Arc::new(Vec::new()));
		for processor in snapshot.iter() {
			processor.finished();
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.processors.load().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct CountingProcessor {
		calls: AtomicUsize,
		finishes: Arc<AtomicUsize>,
		continue_chain: bool,
	}

	impl AudioProcessor for CountingProcessor {
		fn process(&self, _event: &mut AudioEvent) -> bool {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.continue_chain
		}

		fn finished(&self) {
			self.finishes.fetch_add(1, Ordering::SeqCst);
		}
	}

	fn event() -> AudioEvent {
		AudioEvent::new(crate::format::AudioFormat::new(
			44100.0,
			1,
			crate::format::SampleEncoding::Float32 {
				endian: crate::format::Endian::Little,
			},
		))
	}

	#[test]
	fn test_insertion_order_preserved() {
		let chain = ProcessorChain::new();
		let order = Arc::new(std::sync::Mutex::new(Vec::new()));

		struct Tagged(usize, Arc<std::sync::Mutex<Vec<usize>>>);
		impl AudioProcessor for Tagged {
			fn process(&self, _event: &mut AudioEvent) -> bool {
				self.1.lock().unwrap().push(self.0);
				true
			}
		}

		for i in 0..3 {
			chain.add(Arc::new(Tagged(i, order.clone())));
		}
		let mut e = event();
		chain.for_each(|p| p.process(&mut e));
		assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
	}

	#[test]
	fn test_short_circuit_stops_iteration() {
		let chain = ProcessorChain::new();
		let finishes = Arc::new(AtomicUsize::new(0));
		let stopping = Arc::new(CountingProcessor {
			calls: AtomicUsize::new(0),
			finishes: finishes.clone(),
			continue_chain: false,
		});
		let never_called = Arc::new(CountingProcessor {
			calls: AtomicUsize::new(0),
			finishes: finishes.clone(),
			continue_chain: true,
		});
		chain.add(stopping.clone());
		chain.add(never_called.clone());

		let mut e = event();
		chain.for_each(|p| p.process(&mut e));

		assert_eq!(stopping.calls.load(Ordering::SeqCst), 1);
		assert_eq!(never_called.calls.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn test_remove_calls_finished_exactly_once() {
		let chain = ProcessorChain::new();
		let finishes = Arc::new(AtomicUsize::new(0));
		let p: Arc<dyn AudioProcessor> = Arc::new(CountingProcessor {
			calls: AtomicUsize::new(0),
			finishes: finishes.clone(),
			continue_chain: true,
		});
		chain.add(p.clone());
		chain.remove(&p);
		chain.remove(&p);
		assert_eq!(finishes.load(Ordering::SeqCst), 1);
		assert!(chain.is_empty());
	}

	#[test]
	fn test_finish_all_visits_every_processor_once() {
		let chain = ProcessorChain::new();
		let finishes = Arc::new(AtomicUsize::new(0));
		for _ in 0..3 {
			chain.add(Arc::new(CountingProcessor {
				calls: AtomicUsize::new(0),
				finishes: finishes.clone(),
				continue_chain: true,
			}));
		}
		chain.finish_all();
		assert_eq!(finishes.load(Ordering::SeqCst), 3);
		assert!(chain.is_empty());
	}
}
