use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// The authoritative song position. Polled once per frame, never awaited.
pub trait PlaybackClock {
    /// Milliseconds from song start. Monotonic except across explicit seeks.
    fn current_position_ms(&self) -> i64;
    fn is_playing(&self) -> bool;
}

/// Clock fed by an audio thread. Handles are cheap to clone and share the
/// same position.
#[derive(Clone, Debug, Default)]
pub struct AudioClock {
    position_ms: Arc<AtomicI64>,
    playing: Arc<AtomicBool>,
}

impl AudioClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called from the audio callback after each mixed buffer.
    #[inline(always)]
    pub fn publish(&self, position_ms: i64) {
        self.position_ms.store(position_ms, Ordering::Release);
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub fn seek(&self, position_ms: i64) {
        log::info!("Audio clock seek to {position_ms}ms");
        self.publish(position_ms);
    }
}

impl PlaybackClock for AudioClock {
    #[inline(always)]
    fn current_position_ms(&self) -> i64 {
        self.position_ms.load(Ordering::Acquire)
    }

    #[inline(always)]
    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }
}

/// Hand-driven clock for headless runs and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ManualClock {
    pub position_ms: i64,
    pub playing: bool,
}

impl ManualClock {
    pub const fn new(position_ms: i64) -> Self {
        Self { position_ms, playing: true }
    }

    pub fn advance(&mut self, delta_ms: i64) {
        self.position_ms += delta_ms;
    }

    pub fn set(&mut self, position_ms: i64) {
        self.position_ms = position_ms;
    }
}

impl PlaybackClock for ManualClock {
    fn current_position_ms(&self) -> i64 {
        self.position_ms
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_clock_handles_share_position() {
        let clock = AudioClock::new();
        let audio_side = clock.clone();
        std::thread::spawn(move || {
            audio_side.set_playing(true);
            audio_side.publish(1234);
        })
        .join()
        .expect("audio thread");
        assert_eq!(clock.current_position_ms(), 1234);
        assert!(clock.is_playing());
        clock.seek(10);
        assert_eq!(clock.current_position_ms(), 10);
    }

    #[test]
    fn manual_clock_advances() {
        let mut clock = ManualClock::new(0);
        clock.advance(16);
        clock.advance(17);
        assert_eq!(clock.current_position_ms(), 33);
        clock.set(5);
        assert_eq!(clock.current_position_ms(), 5);
    }
}
