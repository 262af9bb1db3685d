use std::path::PathBuf;

use beatline::config;
use beatline::core::clock::ManualClock;
use beatline::game::autoplay::AutoplayScript;
use beatline::game::chart::ChartData;
use beatline::game::event::EventSink;
use beatline::game::session::PlaySession;
use clap::Parser;
use log::info;

const DEMO_CHART: &str = include_str!("../demos/demo_chart.json");
const FRAME_MS: i64 = 16;
// How long to keep ticking past the last note before giving up.
const TAIL_MS: i64 = 5000;

/// Logs every effect; stands in for the audio and render layers.
struct LogSink;

impl EventSink for LogSink {
    fn set_tempo(&mut self, bpm: f64) {
        info!("Tempo -> {bpm} BPM");
    }
    fn lane_effect(&mut self, lane: usize, effect: &str) {
        info!("Lane {lane} effect: {effect}");
    }
    fn set_background(&mut self, name: &str) {
        info!("Background: {name}");
    }
    fn set_scroll_speed(&mut self, multiplier: f64) {
        info!("Scroll speed x{multiplier}");
    }
    fn set_color(&mut self, rgba: [f32; 4]) {
        info!("Color: {rgba:?}");
    }
    fn spawn_particles(&mut self, name: &str) {
        info!("Particles: {name}");
    }
    fn start_song(&mut self, offset_ms: i64) {
        info!("Start song at {offset_ms}ms");
    }
    fn countdown(&mut self, count: u32) {
        info!("Countdown {count}");
    }
}

/// Headless autoplay run of one chart.
#[derive(Parser, Debug)]
#[command(name = "beatline", version, about)]
struct Args {
    /// Chart document (JSON). Plays the bundled demo chart when omitted.
    chart: Option<PathBuf>,

    /// Config file to use instead of the per-user default.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install logger immediately, then set runtime max level from config after loading it.
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    // Startup default when config is missing or malformed.
    log::set_max_level(log::LevelFilter::Warn);

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(config::default_path);
    let config = config::load(&config_path);
    log::set_max_level(config.log_level.as_level_filter());

    let text = match &args.chart {
        Some(path) => std::fs::read_to_string(path)?,
        None => DEMO_CHART.to_string(),
    };
    let chart = ChartData::from_json(&text)?.build()?;
    let last_ms = chart
        .lanes
        .iter()
        .flatten()
        .map(|n| n.release_ms.unwrap_or(n.target_ms))
        .max()
        .unwrap_or(0);

    let mut session = PlaySession::new(config, chart);
    let queue = session.input_queue();
    let mut autoplay = AutoplayScript::new(session.tracks().iter().map(|t| t.notes()));
    let mut clock = ManualClock::new(0);
    let mut sink = LogSink;

    while !session.is_complete() && clock.position_ms <= last_ms + TAIL_MS {
        autoplay.feed(clock.position_ms, &queue);
        session.tick(&clock, &mut sink);
        clock.advance(FRAME_MS);
    }

    let result = session.finish();
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
