//! Real-time judgment and timing engine for lane-based rhythm games.
//!
//! The engine is driven once per frame by [`crate::game::session::PlaySession`],
//! which polls a [`crate::core::clock::PlaybackClock`], folds queued input edges
//! into per-lane state, judges notes, keeps score and fires chart events.

pub mod config;
pub mod core;
pub mod game;
