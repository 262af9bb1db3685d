use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputSource {
    Keyboard,
    Gamepad,
}

/// One key transition as reported by the platform listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputEdge {
    pub lane: usize,
    pub pressed: bool,
    pub source: InputSource,
}

impl InputEdge {
    pub const fn press(lane: usize) -> Self {
        Self { lane, pressed: true, source: InputSource::Keyboard }
    }

    pub const fn release(lane: usize) -> Self {
        Self { lane, pressed: false, source: InputSource::Keyboard }
    }
}

/// Lock-guarded edge queue shared between an input thread (producer) and the
/// frame loop (single consumer). Cloning yields another handle to the same
/// queue.
#[derive(Clone, Debug, Default)]
pub struct InputQueue {
    inner: Arc<Mutex<VecDeque<InputEdge>>>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // A producer that panicked mid-push leaves the deque itself intact.
    #[inline(always)]
    fn lock(&self) -> MutexGuard<'_, VecDeque<InputEdge>> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn push(&self, edge: InputEdge) {
        self.lock().push_back(edge);
    }

    /// Take every queued edge in arrival order.
    pub fn drain(&self) -> Vec<InputEdge> {
        self.lock().drain(..).collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// What a lane reports for one frame: `activated` is the edge (a fresh press
/// happened this frame), `held` the level at the end of the frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LaneInput {
    pub activated: bool,
    pub held: bool,
}

/// Per-lane key levels folded from edges. A lane is down while any source
/// holds it; only an up-to-down transition counts as an activation.
#[derive(Clone, Debug)]
pub struct LaneStates {
    keyboard: Vec<bool>,
    gamepad: Vec<bool>,
    activated: Vec<bool>,
}

impl LaneStates {
    pub fn new(lanes: usize) -> Self {
        Self {
            keyboard: vec![false; lanes],
            gamepad: vec![false; lanes],
            activated: vec![false; lanes],
        }
    }

    #[inline(always)]
    pub fn lane_count(&self) -> usize {
        self.keyboard.len()
    }

    #[inline(always)]
    pub fn is_down(&self, lane: usize) -> bool {
        self.keyboard.get(lane).copied().unwrap_or(false) || self.gamepad.get(lane).copied().unwrap_or(false)
    }

    pub fn apply(&mut self, edge: InputEdge) {
        let lane = edge.lane;
        if lane >= self.lane_count() {
            debug!("Ignoring input for lane {lane}; only {} lanes.", self.lane_count());
            return;
        }
        let was_down = self.is_down(lane);
        match edge.source {
            InputSource::Keyboard => self.keyboard[lane] = edge.pressed,
            InputSource::Gamepad => self.gamepad[lane] = edge.pressed,
        }
        if edge.pressed && !was_down && self.is_down(lane) {
            self.activated[lane] = true;
        }
    }

    /// Snapshot for this frame; clears the activation edges.
    pub fn take_frame(&mut self) -> Vec<LaneInput> {
        let frame = (0..self.lane_count())
            .map(|lane| LaneInput { activated: self.activated[lane], held: self.is_down(lane) })
            .collect();
        self.activated.fill(false);
        frame
    }

    pub fn reset(&mut self) {
        self.keyboard.fill(false);
        self.gamepad.fill(false);
        self.activated.fill(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_preserves_order_across_handles() {
        let queue = InputQueue::new();
        let producer = queue.clone();
        let handle = std::thread::spawn(move || {
            producer.push(InputEdge::press(1));
            producer.push(InputEdge::release(1));
        });
        handle.join().expect("producer thread");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain(), vec![InputEdge::press(1), InputEdge::release(1)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn press_and_release_in_one_frame_still_activates() {
        let mut lanes = LaneStates::new(2);
        lanes.apply(InputEdge::press(0));
        lanes.apply(InputEdge::release(0));
        let frame = lanes.take_frame();
        assert_eq!(frame[0], LaneInput { activated: true, held: false });
        assert_eq!(lanes.take_frame()[0], LaneInput::default(), "edges last one frame");
    }

    #[test]
    fn second_source_on_a_held_lane_is_not_a_new_press() {
        let mut lanes = LaneStates::new(1);
        lanes.apply(InputEdge::press(0));
        lanes.take_frame();
        lanes.apply(InputEdge { lane: 0, pressed: true, source: InputSource::Gamepad });
        lanes.apply(InputEdge::release(0));
        assert_eq!(lanes.take_frame()[0], LaneInput { activated: false, held: true });
    }

    #[test]
    fn out_of_range_lanes_are_ignored() {
        let mut lanes = LaneStates::new(1);
        lanes.apply(InputEdge::press(4));
        assert_eq!(lanes.take_frame(), vec![LaneInput::default()]);
    }
}
