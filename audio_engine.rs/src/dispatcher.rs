//! The byte-to-float dispatch loop: the buffered, overlap-aware pull
//! pipeline that drives the processor chain.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mutex_ext::LockExt;

use crate::audio_event::AudioEvent;
use crate::chain::ProcessorChain;
use crate::codec;
use crate::error::DispatcherError;
use crate::format::AudioFormat;
use crate::sample_math::{SampleIndex, SampleMath};

/// A readable, skippable, closeable byte stream with a fixed format. The
/// concrete decoder (file format, network source, ...) lives outside this
/// crate; this is only the contract the dispatcher drives.
///
/// `read` follows `std::io::Read`'s convention: `Ok(0)` means EOF.
pub trait ByteSource: Send {
	fn format(&self) -> AudioFormat;
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
	/// Returns the number of bytes actually skipped, which may be less than
	/// `n` if the stream is shorter.
	fn skip(&mut self, n: u64) -> io::Result<u64>;
	fn close(&mut self) -> io::Result<()>;
}

/// A writable, blocking-back-pressure byte destination with a fixed format.
/// `write` follows `std::io::Write`'s convention: `Ok(0)` means the sink can
/// accept no more data right now.
pub trait AudioSink: Send {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
	fn drain(&mut self) -> io::Result<()>;
	fn close(&mut self) -> io::Result<()>;
	/// Playback position, when the sink can report one.
	fn microsecond_position(&self) -> Option<u64> {
		None
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
	buffer_size: SampleIndex,
	overlap: SampleIndex,
}

/// The back-channel a rate-changing processor (WSOLA, the resampler) uses
/// to tell the dispatcher its geometry must change. Held weakly by such a
/// processor (installed via a `set_dispatcher`-style setter) so the
/// dispatcher remains the sole owner of its own lifecycle; an absent
/// handle is tolerated, not an error.
pub trait DispatcherControl: Send + Sync {
	fn set_step_and_overlap(&self, buffer_size_samples: usize, overlap_samples: usize);
}

/// Shared geometry cell: the dispatcher reads it once per "between frames"
/// point (top of the read loop); a processor writes it from inside its own
/// `process()` call, which — because the chain is driven synchronously by
/// the dispatcher's own run loop — always happens on the same thread.
pub struct DispatcherHandle(Mutex<Geometry>);

impl DispatcherControl for DispatcherHandle {
	fn set_step_and_overlap(&self, buffer_size_samples: usize, overlap_samples: usize) {
		self.0
			.with_lock_mut(|g| {
				*g = Geometry {
					buffer_size: SampleIndex(buffer_size_samples),
					overlap: SampleIndex(overlap_samples),
				};
			})
			.unwrap();
	}
}

enum BlockOutcome {
	NoData,
	Stopped,
	Event { is_final: bool },
}

/// Builder for [`AudioDispatcher`], mirroring the teacher's
/// `AudioPlayerBuilder`/`InputStreamBuilder` construction pattern.
pub struct DispatcherBuilder<S: ByteSource, K: AudioSink> {
	source: S,
	sink: K,
	buffer_size_samples: usize,
	overlap_samples: usize,
	first_buffer_zero_pad: bool,
	last_buffer_zero_pad: bool,
	chain: Arc<ProcessorChain>,
}

impl<S: ByteSource, K: AudioSink> DispatcherBuilder<S, K> {
	#[must_use]
	pub fn new(source: S, sink: K, chain: Arc<ProcessorChain>) -> Self {
		Self {
			source,
			sink,
			buffer_size_samples: 0,
			overlap_samples: 0,
			first_buffer_zero_pad: false,
			last_buffer_zero_pad: true,
			chain,
		}
	}

	#[must_use]
	pub const fn buffer_size_samples(mut self, buffer_size_samples: usize) -> Self {
		self.buffer_size_samples = buffer_size_samples;
		self
	}

	#[must_use]
	pub const fn overlap_samples(mut self, overlap_samples: usize) -> Self {
		self.overlap_samples = overlap_samples;
		self
	}

	#[must_use]
	pub const fn first_buffer_zero_pad(mut self, first_buffer_zero_pad: bool) -> Self {
		self.first_buffer_zero_pad = first_buffer_zero_pad;
		self
	}

	#[must_use]
	pub const fn last_buffer_zero_pad(mut self, last_buffer_zero_pad: bool) -> Self {
		self.last_buffer_zero_pad = last_buffer_zero_pad;
		self
	}

	/// # Panics
	/// - if `overlap_samples >= buffer_size_samples`.
	#[must_use]
	pub fn build(self) -> AudioDispatcher<S, K> {
		AudioDispatcher::new(
			self.source,
			self.sink,
			self.buffer_size_samples,
			self.overlap_samples,
			self.first_buffer_zero_pad,
			self.last_buffer_zero_pad,
			self.chain,
		)
	}
}

/// Decodes raw bytes into normalized `f32` buffers and drives the
/// processor chain, one overlap-aware block at a time.
pub struct AudioDispatcher<S: ByteSource, K: AudioSink> {
	source: S,
	sink: K,
	format: AudioFormat,
	sample_math: SampleMath,
	chain: Arc<ProcessorChain>,
	handle: Arc<DispatcherHandle>,
	geometry: Geometry,
	float_buffer: Vec<f32>,
	byte_buffer: Vec<u8>,
	out_byte_buffer: Vec<u8>,
	bytes_to_skip: u64,
	bytes_processed: u64,
	stopped: Arc<AtomicBool>,
	first_buffer_zero_pad: bool,
	last_buffer_zero_pad: bool,
	event: AudioEvent,
}

impl<S: ByteSource, K: AudioSink> AudioDispatcher<S, K> {
	/// # Panics
	/// - if `overlap_samples >= buffer_size_samples`.
	#[must_use]
	pub fn new(
		source: S,
		sink: K,
		buffer_size_samples: usize,
		overlap_samples: usize,
		first_buffer_zero_pad: bool,
		last_buffer_zero_pad: bool,
		chain: Arc<ProcessorChain>,
	) -> Self {
		assert!(
			overlap_samples < buffer_size_samples,
			"overlap ({overlap_samples}) must be smaller than the buffer size ({buffer_size_samples})"
		);
		let format = source.format();
		let sample_math = SampleMath::new(format.channels());
		let geometry = Geometry {
			buffer_size: SampleIndex(buffer_size_samples),
			overlap: SampleIndex(overlap_samples),
		};
		Self {
			source,
			sink,
			format,
			sample_math,
			chain,
			handle: Arc::new(DispatcherHandle(Mutex::new(geometry))),
			geometry,
			float_buffer: sample_math.realloc(None, geometry.buffer_size),
			byte_buffer: vec![0u8; buffer_size_samples * format.frame_size()],
			out_byte_buffer: Vec::new(),
			bytes_to_skip: 0,
			bytes_processed: 0,
			stopped: Arc::new(AtomicBool::new(false)),
			first_buffer_zero_pad,
			last_buffer_zero_pad,
			event: AudioEvent::new(format),
		}
	}

	/// The back-channel handle a rate-changing processor installs via its
	/// own `set_dispatcher`.
	#[must_use]
	pub fn handle(&self) -> Arc<DispatcherHandle> {
		self.handle.clone()
	}

	/// A clone of the dispatcher's stop flag; the controller thread sets it
	/// to request the worker exit at the next loop boundary.
	#[must_use]
	pub fn stop_flag(&self) -> Arc<AtomicBool> {
		self.stopped.clone()
	}

	/// Must be called before [`Self::run`].
	pub fn skip(&mut self, seconds: f64) {
		let frames = (seconds * self.format.sample_rate()).round().max(0.0) as u64;
		self.bytes_to_skip = frames * self.format.frame_size() as u64;
	}

	fn step_samples(&self) -> SampleIndex {
		self.geometry.buffer_size - self.geometry.overlap
	}

	/// Reconcile pending geometry written through the back-channel. Only
	/// ever called between frames (top of the read loop), never mid-read.
	fn reconcile_geometry(&mut self) {
		let desired = self.handle.0.with_lock(|g| *g).unwrap();
		if desired == self.geometry {
			return;
		}
		self.float_buffer = self.sample_math.realloc(Some(&self.float_buffer), desired.buffer_size);
		self.byte_buffer = vec![0u8; desired.buffer_size.0 * self.format.frame_size()];
		self.geometry = desired;
	}

	fn do_initial_skip(&mut self) -> Result<(), DispatcherError> {
		if self.bytes_to_skip == 0 {
			return Ok(());
		}
		let skipped = self
			.source
			.skip(self.bytes_to_skip)
			.map_err(|e| DispatcherError::Unreadable(e.to_string()))?;
		if skipped != self.bytes_to_skip {
			return Err(DispatcherError::ShortSkip {
				expected: self.bytes_to_skip as usize,
				actual: skipped as usize,
			});
		}
		Ok(())
	}

	/// Drives the dispatch loop until the stream is exhausted or `stop()`
	/// (via the shared stop flag) is requested. Tears down the chain
	/// exactly once on the way out.
	pub fn run(&mut self) -> Result<(), DispatcherError> {
		let result = self.run_inner();
		self.stopped.store(true, Ordering::Release);
		self.chain.finish_all();
		if let Err(e) = self.sink.drain() {
			log::error!("error draining audio sink: {e}");
		}
		if let Err(e) = self.sink.close() {
			log::error!("error closing audio sink: {e}");
		}
		if let Err(e) = self.source.close() {
			log::error!("error closing byte stream: {e}");
		}
		result
	}

	fn run_inner(&mut self) -> Result<(), DispatcherError> {
		self.do_initial_skip()?;
		let mut is_first = true;
		loop {
			if self.stopped.load(Ordering::Acquire) {
				break;
			}
			self.reconcile_geometry();
			match self.read_next_block(is_first)? {
				BlockOutcome::NoData | BlockOutcome::Stopped => break,
				BlockOutcome::Event { is_final } => {
					self.dispatch_event();
					self.write_event_to_sink(is_first)?;
					if is_final {
						break;
					}
				}
			}
			is_first = false;
		}
		Ok(())
	}

	fn dispatch_event(&mut self) {
		let chain = &self.chain;
		let event = &mut self.event;
		chain.for_each(|p| p.process(event));
	}

	/// Encodes the post-chain event buffer back to bytes and writes it to
	/// the sink: the whole buffer for the first event, only the
	/// non-overlap tail afterwards (the overlap prefix duplicates samples
	/// the previous event already wrote).
	fn write_event_to_sink(&mut self, is_first: bool) -> Result<(), DispatcherError> {
		let n_samples = self.event.n_of_samples();
		let start_sample = if is_first { SampleIndex(0) } else { self.event.overlap() };
		if start_sample.0 >= n_samples.0 {
			return Ok(());
		}
		let array_start = self.sample_math.sample_to_array(start_sample).0;
		let n_to_write = SampleIndex(n_samples.0 - start_sample.0);
		let byte_len = n_to_write.0 * self.format.frame_size();

		if self.out_byte_buffer.len() < byte_len {
			self.out_byte_buffer.resize(byte_len, 0);
		}
		codec::encode_buffer(
			&self.event.float_buffer()[array_start..],
			self.format.encoding(),
			&mut self.out_byte_buffer[..byte_len],
		);

		let mut written = 0usize;
		while written < byte_len {
			let n = self
				.sink
				.write(&self.out_byte_buffer[written..byte_len])
				.map_err(|e| DispatcherError::Unreadable(e.to_string()))?;
			if n == 0 {
				break;
			}
			written += n;
		}
		Ok(())
	}

	fn read_next_block(&mut self, is_first: bool) -> Result<BlockOutcome, DispatcherError> {
		let frame_size = self.format.frame_size();
		let overlap_samples = self.geometry.overlap;

		let (bytes_to_read, byte_dest_offset, sample_dest_offset) = if is_first && !self.first_buffer_zero_pad
		{
			(self.geometry.buffer_size.0 * frame_size, 0, SampleIndex(0))
		} else {
			if !is_first {
				self.sample_math.shift(
					&mut self.float_buffer,
					self.step_samples(),
					SampleIndex(0),
					overlap_samples,
				);
			}
			let byte_step = self.step_samples().0 * frame_size;
			let byte_overlap = overlap_samples.0 * frame_size;
			(byte_step, byte_overlap, overlap_samples)
		};

		let mut read_so_far = 0usize;
		let mut eof = false;
		while read_so_far < bytes_to_read {
			if self.stopped.load(Ordering::Acquire) {
				return Ok(BlockOutcome::Stopped);
			}
			let dest = byte_dest_offset + read_so_far;
			let n = self
				.source
				.read(&mut self.byte_buffer[dest..byte_dest_offset + bytes_to_read])
				.map_err(|e| DispatcherError::Unreadable(e.to_string()))?;
			if n == 0 {
				eof = true;
				break;
			}
			read_so_far += n;
		}

		if read_so_far == 0 {
			return Ok(BlockOutcome::NoData);
		}

		if read_so_far == bytes_to_read {
			self.decode_region(byte_dest_offset, bytes_to_read, sample_dest_offset);
			self.bytes_processed += read_so_far as u64;
			self.publish_event(self.geometry.buffer_size, sample_dest_offset);
			return Ok(BlockOutcome::Event { is_final: false });
		}

		if !eof {
			// The inner loop only exits early on a full read, an EOF (n == 0),
			// or a stop request (handled above); reaching here would mean a
			// source violated the read-until-exhausted contract.
			return Err(DispatcherError::PartialRead {
				expected: bytes_to_read,
				actual: read_so_far,
			});
		}

		self.bytes_processed += read_so_far as u64;
		let samples_read = SampleIndex(read_so_far / frame_size);
		let aligned_bytes = samples_read.0 * frame_size;

		if self.last_buffer_zero_pad {
			self.byte_buffer[byte_dest_offset + read_so_far..byte_dest_offset + bytes_to_read].fill(0);
			self.decode_region(byte_dest_offset, bytes_to_read, sample_dest_offset);
			self.publish_event(self.geometry.buffer_size, sample_dest_offset);
		} else {
			let new_total = sample_dest_offset + samples_read;
			self.float_buffer = self.sample_math.realloc(Some(&self.float_buffer), new_total);
			self.decode_region(byte_dest_offset, aligned_bytes, sample_dest_offset);
			self.publish_event(new_total, sample_dest_offset);
		}
		Ok(BlockOutcome::Event { is_final: true })
	}

	fn decode_region(&mut self, byte_offset: usize, byte_len: usize, sample_offset: SampleIndex) {
		let n_samples = SampleIndex(byte_len / self.format.frame_size());
		let array_start = self.sample_math.sample_to_array(sample_offset).0;
		let array_len = self.sample_math.sample_to_array(n_samples).0;
		codec::decode_buffer(
			&self.byte_buffer[byte_offset..byte_offset + byte_len],
			self.format.encoding(),
			&mut self.float_buffer[array_start..array_start + array_len],
		);
	}

	fn publish_event(&mut self, total_samples: SampleIndex, overlap: SampleIndex) {
		let array_len = self.sample_math.sample_to_array(total_samples).0;
		self.event.set_float_buffer(self.float_buffer[..array_len].to_vec());
		self.event.set_overlap(overlap);
		self.event.set_bytes_processed(self.bytes_processed);
	}
}
