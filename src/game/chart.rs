//! Hand-off types between chart ingestion and the engine.
//!
//! Ingestion (outside this crate) produces a `ChartData` document. `build`
//! validates it once and yields per-lane sorted notes plus the event list, so
//! nothing downstream has to re-check the data per tick.

use std::fmt;

use log::info;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::game::event::{Event, EventKind};
use crate::game::note::Note;
use crate::game::timing::{BpmSegment, TimingData};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartNote {
    pub lane: usize,
    #[serde(default)]
    pub time_ms: Option<i64>,
    #[serde(default)]
    pub beat: Option<f64>,
    #[serde(default)]
    pub release_ms: Option<i64>,
    #[serde(default)]
    pub release_beat: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartEvent {
    #[serde(default)]
    pub time_ms: Option<i64>,
    #[serde(default)]
    pub beat: Option<f64>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub lane_count: usize,
    #[serde(default)]
    pub offset_ms: f64,
    #[serde(default)]
    pub bpms: Vec<BpmSegment>,
    pub notes: Vec<ChartNote>,
    #[serde(default)]
    pub events: Vec<ChartEvent>,
}

#[derive(Debug)]
pub enum ChartError {
    Json(serde_json::Error),
    NoLanes,
    UnknownLane { index: usize, lane: usize, lane_count: usize },
    MissingTime { index: usize },
    MissingEventTime { index: usize },
    NonPositiveHold { index: usize, target_ms: i64, release_ms: i64 },
}

impl fmt::Display for ChartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartError::Json(e) => write!(f, "malformed chart document: {e}"),
            ChartError::NoLanes => write!(f, "chart declares no lanes"),
            ChartError::UnknownLane { index, lane, lane_count } => write!(
                f,
                "note {index} references lane {lane}, but the chart has {lane_count} lanes"
            ),
            ChartError::MissingTime { index } => {
                write!(f, "note {index} has neither a time nor a beat")
            }
            ChartError::MissingEventTime { index } => {
                write!(f, "event {index} has neither a time nor a beat")
            }
            ChartError::NonPositiveHold { index, target_ms, release_ms } => write!(
                f,
                "hold note {index} releases at {release_ms}ms, not after its target {target_ms}ms"
            ),
        }
    }
}

impl std::error::Error for ChartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChartError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ChartError {
    fn from(e: serde_json::Error) -> Self {
        ChartError::Json(e)
    }
}

/// Validated chart, ready for a play session.
#[derive(Clone, Debug)]
pub struct ChartBuild {
    pub timing: TimingData,
    pub lanes: Vec<Vec<Note>>,
    pub events: Vec<Event>,
}

impl ChartBuild {
    pub fn total_notes(&self) -> usize {
        self.lanes.iter().map(Vec::len).sum()
    }
}

impl ChartData {
    pub fn from_json(text: &str) -> Result<Self, ChartError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn timing(&self) -> TimingData {
        TimingData::new(self.offset_ms, &self.bpms)
    }

    fn build_note(&self, index: usize, raw: &ChartNote, timing: &TimingData) -> Result<Note, ChartError> {
        if raw.lane >= self.lane_count {
            return Err(ChartError::UnknownLane { index, lane: raw.lane, lane_count: self.lane_count });
        }
        let target_ms = match (raw.beat, raw.time_ms) {
            (Some(beat), _) => timing.project_ms(beat),
            (None, Some(ms)) => ms,
            (None, None) => return Err(ChartError::MissingTime { index }),
        };
        let release_ms = match (raw.release_beat, raw.release_ms) {
            (Some(beat), _) => Some(timing.project_ms(beat)),
            (None, ms) => ms,
        };
        let mut note = match release_ms {
            Some(release_ms) if release_ms <= target_ms => {
                return Err(ChartError::NonPositiveHold { index, target_ms, release_ms });
            }
            Some(release_ms) => Note::hold(raw.lane, target_ms, release_ms),
            None => Note::tap(raw.lane, target_ms),
        };
        note.beat = raw.beat;
        note.release_beat = raw.release_beat.filter(|_| release_ms.is_some());
        Ok(note)
    }

    pub fn build(&self) -> Result<ChartBuild, ChartError> {
        if self.lane_count == 0 {
            return Err(ChartError::NoLanes);
        }
        let timing = self.timing();

        let mut lanes: Vec<Vec<Note>> = vec![Vec::new(); self.lane_count];
        let mut per_time: FxHashMap<i64, u32> = FxHashMap::default();
        for (index, raw) in self.notes.iter().enumerate() {
            let note = self.build_note(index, raw, &timing)?;
            *per_time.entry(note.target_ms).or_insert(0) += 1;
            lanes[note.lane].push(note);
        }
        for lane in &mut lanes {
            lane.sort_by_key(|n| n.target_ms);
            for note in lane.iter_mut() {
                note.solo = per_time.get(&note.target_ms).copied().unwrap_or(0) <= 1;
            }
        }

        let mut events = Vec::with_capacity(self.events.len());
        for (index, raw) in self.events.iter().enumerate() {
            let event = match (raw.beat, raw.time_ms) {
                (Some(beat), _) => Event::at_beat(beat, raw.kind.clone(), &timing),
                (None, Some(ms)) => Event::at_ms(ms, raw.kind.clone()),
                (None, None) => return Err(ChartError::MissingEventTime { index }),
            };
            events.push(event);
        }

        let build = ChartBuild { timing, lanes, events };
        info!(
            "Chart built: {} lanes, {} notes, {} events.",
            self.lane_count,
            build.total_notes(),
            build.events.len()
        );
        Ok(build)
    }
}
