//! The load/play/pause/stop state machine that owns the worker thread.
//!
//! Exactly two threads ever touch a `Player`: the controller thread calling
//! these methods, and the worker thread spawned by `play()` that drives one
//! `AudioDispatcher`'s run loop start to finish. Mirrors the teacher's
//! `AudioPlayer`/`InputStream` wrapping of a `cpal::Stream` in a
//! `resource_daemon::ResourceDaemon`, except the "resource" here is the
//! blocking `dispatcher.run()` call itself rather than an already-async
//! OS stream: the worker self-dispatches `PlayerError::Stopped` the moment
//! `run()` returns, so the daemon reaches `Quit` immediately instead of
//! idling in `Holding` after playback has actually finished.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mutex_ext::LockExt;
use resource_daemon::ResourceDaemon;

use crate::chain::ProcessorChain;
use crate::dispatcher::{AudioSink, ByteSource, DispatcherBuilder, DispatcherControl};
use crate::error::PlayerError;
use crate::format::AudioFormat;
use crate::processors::GainProcessor;
use crate::wsola::{WsolaParamsBuilder, WsolaProcessor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerState {
	NoFileLoaded,
	FileLoaded,
	Playing,
	Paused,
	Stopped,
}

impl PlayerState {
	const fn name(self) -> &'static str {
		match self {
			Self::NoFileLoaded => "NO_FILE_LOADED",
			Self::FileLoaded => "FILE_LOADED",
			Self::Playing => "PLAYING",
			Self::Paused => "PAUSED",
			Self::Stopped => "STOPPED",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
	StateChanged { old: PlayerState, new: PlayerState },
	TempoChanged { old: f64, new: f64 },
	GainChanged { old: f32, new: f32 },
}

/// Metadata a caller supplies alongside an opened byte source: parsing the
/// container format to discover these is explicitly out of scope here (the
/// concrete `ByteSource` impl lives outside this crate).
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackInfo {
	pub duration_secs: Option<f64>,
	pub total_frames: Option<u64>,
}

/// Coordinates the dispatch pipeline's lifecycle: load/play/pause/stop,
/// tempo/gain pass-through to the live processors, and observer
/// notifications. `S` is the byte-source type a caller `load()`s; `K` is
/// the sink type a caller hands to `play()` — a fresh instance each time,
/// since `play()` always rebuilds the pipeline from scratch.
pub struct Player<S: ByteSource + Send + 'static, K: AudioSink + Send + 'static> {
	state: PlayerState,
	source: Option<S>,
	format: Option<AudioFormat>,
	track_info: TrackInfo,
	gain: f32,
	tempo: f64,
	sequence_ms: f64,
	seek_window_ms: f64,
	overlap_ms: f64,
	resume_position_secs: f64,
	worker: Option<ResourceDaemon<(), PlayerError>>,
	stop_flag: Option<Arc<AtomicBool>>,
	gain_processor: Option<Arc<GainProcessor>>,
	wsola_processor: Option<Arc<WsolaProcessor>>,
	listeners: Mutex<Vec<Box<dyn Fn(PlayerEvent) + Send>>>,
}

impl<S: ByteSource + Send + 'static, K: AudioSink + Send + 'static> Default for Player<S, K> {
	fn default() -> Self {
		Self::new()
	}
}

/// Chainable construction of a `Player` with non-default initial tunables.
/// Mirrors `AudioPlayerBuilder`: a `Player` built bare is just
/// `Player::new()`, but the WSOLA windowing knobs and the initial
/// gain/tempo are awkward to set one at a time before any file is loaded.
#[derive(Debug, Clone, Copy)]
pub struct PlayerBuilder {
	gain: f32,
	tempo: f64,
	sequence_ms: f64,
	seek_window_ms: f64,
	overlap_ms: f64,
}

impl Default for PlayerBuilder {
	fn default() -> Self {
		// Mirrors the defaults `Player::new()` sets directly.
		Self {
			gain: 1.0,
			tempo: 1.0,
			sequence_ms: 82.0,
			seek_window_ms: 28.0,
			overlap_ms: 12.0,
		}
	}
}

impl PlayerBuilder {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub const fn gain(mut self, gain: f32) -> Self {
		self.gain = gain;
		self
	}

	#[must_use]
	pub const fn tempo(mut self, tempo: f64) -> Self {
		self.tempo = tempo;
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

	#[must_use]
	pub fn build<S: ByteSource + Send + 'static, K: AudioSink + Send + 'static>(self) -> Player<S, K> {
		let mut player = Player::new();
		player.gain = self.gain;
		player.tempo = self.tempo;
		player.sequence_ms = self.sequence_ms;
		player.seek_window_ms = self.seek_window_ms;
		player.overlap_ms = self.overlap_ms;
		player
	}
}

impl<S: ByteSource + Send + 'static, K: AudioSink + Send + 'static> Player<S, K> {
	#[must_use]
	pub fn new() -> Self {
		Self {
			state: PlayerState::NoFileLoaded,
			source: None,
			format: None,
			track_info: TrackInfo::default(),
			gain: 1.0,
			tempo: 1.0,
			sequence_ms: 82.0,
			seek_window_ms: 28.0,
			overlap_ms: 12.0,
			resume_position_secs: 0.0,
			worker: None,
			stop_flag: None,
			gain_processor: None,
			wsola_processor: None,
			listeners: Mutex::new(Vec::new()),
		}
	}

	#[must_use]
	pub fn state(&self) -> PlayerState {
		self.state
	}

	#[must_use]
	pub fn track_info(&self) -> TrackInfo {
		self.track_info
	}

	#[must_use]
	pub fn gain(&self) -> f32 {
		self.gain
	}

	#[must_use]
	pub fn tempo(&self) -> f64 {
		self.tempo
	}

	/// Registers a listener invoked synchronously, on the caller's thread,
	/// for every subsequent state/tempo/gain change.
	pub fn on_event(&self, listener: impl Fn(PlayerEvent) + Send + 'static) {
		self.listeners.with_lock_mut(|l| l.push(Box::new(listener))).unwrap();
	}

	fn notify(&self, event: PlayerEvent) {
		self.listeners
			.with_lock(|listeners| {
				for listener in listeners {
					listener(event);
				}
			})
			.unwrap();
	}

	fn transition(&mut self, new: PlayerState) {
		let old = self.state;
		self.state = new;
		self.notify(PlayerEvent::StateChanged { old, new });
	}

	fn require(&self, allowed: &[PlayerState], action: &'static str) -> Result<(), PlayerError> {
		if allowed.contains(&self.state) {
			Ok(())
		} else {
			Err(PlayerError::IllegalState {
				action,
				state: self.state.name(),
			})
		}
	}

	/// `NO_FILE_LOADED -> FILE_LOADED` (or any state, ejecting first).
	pub fn load(&mut self, source: S, track_info: TrackInfo) -> Result<(), PlayerError> {
		if self.state != PlayerState::NoFileLoaded {
			self.eject();
		}
		self.format = Some(source.format());
		self.source = Some(source);
		self.track_info = track_info;
		self.resume_position_secs = 0.0;
		self.transition(PlayerState::FileLoaded);
		Ok(())
	}

	/// `FILE_LOADED | PAUSED | STOPPED -> PLAYING`, resuming from whatever
	/// position was recorded by a previous `pause()`/`stop()`.
	pub fn play(&mut self, sink: K) -> Result<(), PlayerError> {
		let at = self.resume_position_secs;
		self.play_from(sink, at)
	}

	/// `FILE_LOADED | PAUSED | STOPPED -> PLAYING`, seeking to `start_secs`
	/// first.
	pub fn play_from(&mut self, sink: K, start_secs: f64) -> Result<(), PlayerError> {
		self.require(
			&[PlayerState::FileLoaded, PlayerState::Paused, PlayerState::Stopped],
			"play",
		)?;
		let source = self
			.source
			.take()
			.ok_or(PlayerError::Unreadable("no source loaded".to_string()))?;
		let format = source.format();

		let gain = Arc::new(GainProcessor::new(self.gain));
		let wsola_params = WsolaParamsBuilder::new()
			.tempo(self.tempo)
			.sample_rate(format.sample_rate())
			.sequence_ms(self.sequence_ms)
			.seek_window_ms(self.seek_window_ms)
			.overlap_ms(self.overlap_ms)
			.build()
			.map_err(|e| PlayerError::Unreadable(e.to_string()))?;
		let wsola = Arc::new(WsolaProcessor::new(format.channels(), wsola_params));

		let chain = Arc::new(ProcessorChain::new());
		// WSOLA first: it always resets overlap to 0, so the gain stage
		// downstream never needs to special-case a duplicated prefix.
		chain.add(wsola.clone());
		chain.add(gain.clone());

		let mut dispatcher = DispatcherBuilder::new(source, sink, chain)
			.buffer_size_samples(wsola.required_input_samples())
			.overlap_samples(wsola.required_dispatcher_overlap())
			.first_buffer_zero_pad(false)
			.last_buffer_zero_pad(true)
			.build();
		let control_handle: Arc<dyn DispatcherControl> = dispatcher.handle();
		wsola.set_dispatcher(Arc::downgrade(&control_handle));
		dispatcher.skip(start_secs);

		let stop_flag = dispatcher.stop_flag();

		let worker = ResourceDaemon::new(move |quit_signal| {
			let result = dispatcher.run().map_err(PlayerError::from);
			quit_signal.dispatch(PlayerError::Stopped);
			result
		});

		self.stop_flag = Some(stop_flag);
		self.gain_processor = Some(gain);
		self.wsola_processor = Some(wsola);
		self.worker = Some(worker);
		self.transition(PlayerState::Playing);
		Ok(())
	}

	/// `PLAYING | PAUSED -> PAUSED`, recording `t` as the position to
	/// `play()` resume from.
	pub fn pause(&mut self, t: f64) -> Result<(), PlayerError> {
		self.require(&[PlayerState::Playing, PlayerState::Paused], "pause")?;
		self.stop_worker();
		self.resume_position_secs = t;
		self.transition(PlayerState::Paused);
		Ok(())
	}

	/// `PLAYING | PAUSED -> STOPPED`.
	pub fn stop(&mut self) -> Result<(), PlayerError> {
		self.require(&[PlayerState::Playing, PlayerState::Paused], "stop")?;
		self.stop_worker();
		self.resume_position_secs = 0.0;
		self.transition(PlayerState::Stopped);
		Ok(())
	}

	/// `* -> NO_FILE_LOADED`, stopping first if still running.
	pub fn eject(&mut self) {
		if matches!(self.state, PlayerState::Playing | PlayerState::Paused) {
			self.stop_worker();
		}
		self.source = None;
		self.format = None;
		self.track_info = TrackInfo::default();
		self.resume_position_secs = 0.0;
		self.gain_processor = None;
		self.wsola_processor = None;
		self.transition(PlayerState::NoFileLoaded);
	}

	fn stop_worker(&mut self) {
		if let Some(stop_flag) = &self.stop_flag {
			stop_flag.store(true, Ordering::Release);
		}
		if let Some(mut worker) = self.worker.take() {
			worker.quit(PlayerError::Stopped);
		}
		self.stop_flag = None;
	}

	/// Writes through to the live `WsolaProcessor` when `PLAYING`;
	/// otherwise only updates the pending scalar applied on the next
	/// `play()`.
	pub fn set_tempo(&mut self, tempo: f64) {
		let old = self.tempo;
		self.tempo = tempo;
		if let Some(wsola) = &self.wsola_processor {
			let sample_rate = self.format.map_or(44100.0, |f| f.sample_rate());
			wsola.set_tempo(tempo, sample_rate, self.sequence_ms, self.seek_window_ms, self.overlap_ms);
		}
		self.notify(PlayerEvent::TempoChanged { old, new: tempo });
	}

	/// Writes through to the live `GainProcessor` when `PLAYING`; otherwise
	/// only updates the pending scalar applied on the next `play()`.
	pub fn set_gain(&mut self, gain: f32) {
		let old = self.gain;
		self.gain = gain;
		if let Some(g) = &self.gain_processor {
			g.set_gain(gain);
		}
		self.notify(PlayerEvent::GainChanged { old, new: gain });
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::format::{Endian, SampleEncoding};
	use std::io;
	use std::sync::atomic::AtomicUsize;

	struct MemorySource {
		format: AudioFormat,
		bytes: Vec<u8>,
		pos: usize,
	}

	impl ByteSource for MemorySource {
		fn format(&self) -> AudioFormat {
			self.format
		}

		fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
			let remaining = self.bytes.len() - self.pos;
			let n = remaining.min(buf.len());
			buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
			self.pos += n;
			Ok(n)
		}

		fn skip(&mut self, n: u64) -> io::Result<u64> {
			let n = n as usize;
			let remaining = self.bytes.len() - self.pos;
			let actual = remaining.min(n);
			self.pos += actual;
			Ok(actual as u64)
		}

		fn close(&mut self) -> io::Result<()> {
			Ok(())
		}
	}

	#[derive(Default)]
	struct MemorySink {
		written: Arc<Mutex<Vec<u8>>>,
	}

	impl AudioSink for MemorySink {
		fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
			self.written.lock().unwrap().extend_from_slice(buf);
			Ok(buf.len())
		}

		fn drain(&mut self) -> io::Result<()> {
			Ok(())
		}

		fn close(&mut self) -> io::Result<()> {
			Ok(())
		}
	}

	fn format() -> AudioFormat {
		AudioFormat::new(
			1000.0,
			1,
			SampleEncoding::Float32 {
				endian: Endian::Little,
			},
		)
	}

	fn source_with(n_samples: usize) -> MemorySource {
		let format = format();
		let values = vec![0.0_f32; n_samples];
		let mut bytes = vec![0u8; values.len() * format.frame_size()];
		crate::codec::encode_buffer(&values, format.encoding(), &mut bytes);
		MemorySource { format, bytes, pos: 0 }
	}

	#[test]
	fn test_load_then_play_then_stop() {
		let mut player: Player<MemorySource, MemorySink> = Player::new();
		assert_eq!(player.state(), PlayerState::NoFileLoaded);

		player.load(source_with(2000), TrackInfo::default()).unwrap();
		assert_eq!(player.state(), PlayerState::FileLoaded);

		player.play(MemorySink::default()).unwrap();
		assert_eq!(player.state(), PlayerState::Playing);

		player.stop().unwrap();
		assert_eq!(player.state(), PlayerState::Stopped);
	}

	#[test]
	fn test_play_rejected_without_a_loaded_file() {
		let mut player: Player<MemorySource, MemorySink> = Player::new();
		assert!(player.play(MemorySink::default()).is_err());
	}

	#[test]
	fn test_pause_records_resume_position() {
		let mut player: Player<MemorySource, MemorySink> = Player::new();
		player.load(source_with(2000), TrackInfo::default()).unwrap();
		player.play(MemorySink::default()).unwrap();
		player.pause(1.5).unwrap();
		assert_eq!(player.state(), PlayerState::Paused);
		assert!((player.resume_position_secs - 1.5).abs() < 1e-9);
	}

	#[test]
	fn test_eject_returns_to_no_file_loaded_from_any_state() {
		let mut player: Player<MemorySource, MemorySink> = Player::new();
		player.load(source_with(2000), TrackInfo::default()).unwrap();
		player.play(MemorySink::default()).unwrap();
		player.eject();
		assert_eq!(player.state(), PlayerState::NoFileLoaded);
	}

	#[test]
	fn test_set_gain_notifies_listeners_with_old_and_new() {
		let mut player: Player<MemorySource, MemorySink> = Player::new();
		let seen = Arc::new(Mutex::new(Vec::new()));
		{
			let seen = seen.clone();
			player.on_event(move |event| {
				if let PlayerEvent::GainChanged { old, new } = event {
					seen.lock().unwrap().push((old, new));
				}
			});
		}
		player.set_gain(0.5);
		assert_eq!(seen.lock().unwrap().as_slice(), &[(1.0, 0.5)]);
	}

	#[test]
	fn test_state_changes_fire_observer_notifications() {
		let mut player: Player<MemorySource, MemorySink> = Player::new();
		let transitions = Arc::new(AtomicUsize::new(0));
		{
			let transitions = transitions.clone();
			player.on_event(move |event| {
				if matches!(event, PlayerEvent::StateChanged { .. }) {
					transitions.fetch_add(1, Ordering::SeqCst);
				}
			});
		}
		player.load(source_with(100), TrackInfo::default()).unwrap();
		player.play(MemorySink::default()).unwrap();
		player.stop().unwrap();
		assert_eq!(transitions.load(Ordering::SeqCst), 3);
	}

	#[test]
	fn test_illegal_transition_reports_action_and_state() {
		let mut player: Player<MemorySource, MemorySink> = Player::new();
		let err = player.pause(0.0).unwrap_err();
		match err {
			PlayerError::IllegalState { action, state } => {
				assert_eq!(action, "pause");
				assert_eq!(state, "NO_FILE_LOADED");
			}
			other => panic!("expected IllegalState, got {other:?}"),
		}
	}
}
