pub mod autoplay;
pub mod beat;
pub mod chart;
pub mod event;
pub mod hold;
pub mod judgment;
pub mod note;
pub mod score;
pub mod session;
pub mod timing;
pub mod timing_stats;
pub mod timing_windows;
pub mod track;
