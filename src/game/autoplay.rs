//! Scripted input for headless runs: presses every note on its target and
//! releases holds on their release target.

use crate::core::input::{InputEdge, InputQueue};
use crate::game::note::Note;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScriptedEdge {
    time_ms: i64,
    edge: InputEdge,
}

#[derive(Debug, Clone, Default)]
pub struct AutoplayScript {
    edges: Vec<ScriptedEdge>,
    cursor: usize,
}

impl AutoplayScript {
    /// How long a tap stays down when the next note leaves room.
    pub const PRESS_DURATION_MS: i64 = 40;

    /// `lanes[i]` is lane `i`'s note list in target order.
    pub fn new<'a>(lanes: impl IntoIterator<Item = &'a [Note]>) -> Self {
        let mut edges = Vec::new();
        for (lane, notes) in lanes.into_iter().enumerate() {
            for (i, note) in notes.iter().enumerate() {
                let next_target = notes.get(i + 1).map(|n| n.target_ms);
                let release_at = match note.release_ms {
                    Some(release_ms) => release_ms,
                    None => {
                        let natural = note.target_ms + Self::PRESS_DURATION_MS;
                        next_target.map_or(natural, |next| natural.min(next - 1).max(note.target_ms))
                    }
                };
                edges.push(ScriptedEdge { time_ms: note.target_ms, edge: InputEdge::press(lane) });
                edges.push(ScriptedEdge { time_ms: release_at, edge: InputEdge::release(lane) });
            }
        }
        // Releases go first at equal times so back-to-back notes re-press.
        edges.sort_by_key(|e| (e.time_ms, e.edge.pressed));
        Self { edges, cursor: 0 }
    }

    /// Push every edge due by `now_ms`. Returns how many were pushed.
    pub fn feed(&mut self, now_ms: i64, queue: &InputQueue) -> usize {
        let start = self.cursor;
        while let Some(scripted) = self.edges.get(self.cursor) {
            if scripted.time_ms > now_ms {
                break;
            }
            queue.push(scripted.edge);
            self.cursor += 1;
        }
        self.cursor - start
    }

    pub fn is_done(&self) -> bool {
        self.cursor >= self.edges.len()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}
