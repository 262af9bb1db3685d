use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use directories::ProjectDirs;
use ini::Ini;
use log::{info, warn};

use crate::game::judgment::ScoreWeights;
use crate::game::timing_windows::{RELEASE_WINDOW_MULTIPLIER, TierWindow, WindowTable};
use crate::game::track::{DEFAULT_HOLD_INTERVAL_MS, DEFAULT_TRAVEL_TIME_MS};

const CONFIG_PATH: &str = "beatline.ini";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Off => log::LevelFilter::Off,
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(ini::ParseError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "could not read config: {e}"),
            ConfigError::Parse(e) => write!(f, "malformed config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

impl From<ini::Error> for ConfigError {
    fn from(e: ini::Error) -> Self {
        match e {
            ini::Error::Io(e) => ConfigError::Io(e),
            ini::Error::Parse(e) => ConfigError::Parse(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Input latency compensation; subtracted from playback time before judging.
    pub input_offset_ms: i64,
    pub travel_time_ms: i64,
    pub hold_interval_ms: i64,
    pub release_window_multiplier: f64,
    pub beats_per_bar: u32,
    pub log_level: LogLevel,
    pub windows: WindowTable,
    pub weights: ScoreWeights,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_offset_ms: 0,
            travel_time_ms: DEFAULT_TRAVEL_TIME_MS,
            hold_interval_ms: DEFAULT_HOLD_INTERVAL_MS,
            release_window_multiplier: RELEASE_WINDOW_MULTIPLIER,
            beats_per_bar: 4,
            log_level: LogLevel::Warn,
            windows: WindowTable::default(),
            weights: ScoreWeights::default(),
        }
    }
}

/// Read one key, falling back to `default` when it is missing or does not
/// parse or fails `valid`.
fn read<T>(conf: &Ini, section: &str, key: &str, default: T, valid: impl Fn(&T) -> bool) -> T
where
    T: FromStr + Copy,
{
    let Some(raw) = conf.get_from(Some(section), key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(v) if valid(&v) => v,
        _ => {
            warn!("Invalid value '{raw}' for [{section}] {key}; using default.");
            default
        }
    }
}

#[inline(always)]
fn positive(v: &f64) -> bool {
    v.is_finite() && *v > 0.0
}

impl Config {
    pub fn from_ini(conf: &Ini) -> Self {
        let default = Self::default();
        let dw = default.windows;
        let weights = default.weights;

        let log_level = match conf.get_from(Some("Options"), "LogLevel") {
            Some(v) => LogLevel::from_str(v).unwrap_or_else(|()| {
                warn!("Unknown LogLevel '{v}'; using {}.", default.log_level.as_str());
                default.log_level
            }),
            None => default.log_level,
        };

        Self {
            input_offset_ms: read(conf, "Options", "InputOffsetMs", default.input_offset_ms, |_| true),
            travel_time_ms: read(conf, "Options", "TravelTimeMs", default.travel_time_ms, |v| *v >= 0),
            hold_interval_ms: read(conf, "Options", "HoldIntervalMs", default.hold_interval_ms, |v| *v > 0),
            release_window_multiplier: read(
                conf,
                "Options",
                "ReleaseWindowMultiplier",
                default.release_window_multiplier,
                |v| positive(v),
            ),
            beats_per_bar: read(conf, "Options", "BeatsPerBar", default.beats_per_bar, |v| *v > 0),
            log_level,
            windows: WindowTable {
                slap: TierWindow {
                    base_ms: read(conf, "Windows", "SlapMs", dw.slap.base_ms, positive),
                    early_scale: read(conf, "Windows", "SlapEarlyScale", dw.slap.early_scale, positive),
                },
                slip: TierWindow {
                    base_ms: read(conf, "Windows", "SlipMs", dw.slip.base_ms, positive),
                    early_scale: read(conf, "Windows", "SlipEarlyScale", dw.slip.early_scale, positive),
                },
            },
            weights: ScoreWeights {
                slap: read(conf, "Weights", "Slap", weights.slap, |_| true),
                slip: read(conf, "Weights", "Slip", weights.slip, |_| true),
                miss: read(conf, "Weights", "Miss", weights.miss, |_| true),
                interval: read(conf, "Weights", "Interval", weights.interval, |_| true),
                release: read(conf, "Weights", "Release", weights.release, |_| true),
            },
        }
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let conf = Ini::load_from_str(text).map_err(ConfigError::Parse)?;
        Ok(Self::from_ini(&conf))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let conf = Ini::load_from_file(path)?;
        Ok(Self::from_ini(&conf))
    }

    pub fn to_ini(&self) -> Ini {
        let mut conf = Ini::new();
        // Keys in alphabetical order
        conf.with_section(Some("Options"))
            .set("BeatsPerBar", self.beats_per_bar.to_string())
            .set("HoldIntervalMs", self.hold_interval_ms.to_string())
            .set("InputOffsetMs", self.input_offset_ms.to_string())
            .set("LogLevel", self.log_level.as_str())
            .set("ReleaseWindowMultiplier", self.release_window_multiplier.to_string())
            .set("TravelTimeMs", self.travel_time_ms.to_string());
        conf.with_section(Some("Windows"))
            .set("SlapEarlyScale", self.windows.slap.early_scale.to_string())
            .set("SlapMs", self.windows.slap.base_ms.to_string())
            .set("SlipEarlyScale", self.windows.slip.early_scale.to_string())
            .set("SlipMs", self.windows.slip.base_ms.to_string());
        conf.with_section(Some("Weights"))
            .set("Interval", self.weights.interval.to_string())
            .set("Miss", self.weights.miss.to_string())
            .set("Release", self.weights.release.to_string())
            .set("Slap", self.weights.slap.to_string())
            .set("Slip", self.weights.slip.to_string());
        conf
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let path = path.as_ref();
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        self.to_ini().write_to_file(path)
    }
}

/// `beatline.ini` in the platform config directory, or the working
/// directory when no home is available.
pub fn default_path() -> PathBuf {
    ProjectDirs::from("", "", "beatline")
        .map(|dirs| dirs.config_dir().join(CONFIG_PATH))
        .unwrap_or_else(|| PathBuf::from(CONFIG_PATH))
}

/// Load the config, writing a default file first when none exists. Never
/// fails: any problem is logged and the defaults are used.
pub fn load(path: &Path) -> Config {
    if !path.exists() {
        info!("'{}' not found, creating with default values.", path.display());
        if let Err(e) = Config::default().save(path) {
            warn!("Failed to create default config file: {e}");
            return Config::default();
        }
    }
    match Config::load_from_file(path) {
        Ok(config) => {
            info!("Configuration loaded from '{}'.", path.display());
            config
        }
        Err(e) => {
            warn!("Failed to load '{}': {e}. Using default configuration.", path.display());
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = Config::load_from_str("[Options]\nInputOffsetMs=-12\n").expect("valid ini");
        assert_eq!(config.input_offset_ms, -12);
        assert_eq!(config.travel_time_ms, DEFAULT_TRAVEL_TIME_MS);
        assert_eq!(config.windows, WindowTable::default());
        assert_eq!(config.weights, ScoreWeights::default());
    }

    #[test]
    fn malformed_values_fall_back_per_key() {
        let text = "[Options]\nHoldIntervalMs=0\nLogLevel=loud\nBeatsPerBar=3\n\
                    [Windows]\nSlapMs=abc\nSlipMs=60\nSlipEarlyScale=-1\n";
        let config = Config::load_from_str(text).expect("valid ini");
        assert_eq!(config.hold_interval_ms, DEFAULT_HOLD_INTERVAL_MS);
        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.beats_per_bar, 3);
        assert!((config.windows.slap.base_ms - 30.0).abs() < f64::EPSILON);
        assert!((config.windows.slip.base_ms - 60.0).abs() < f64::EPSILON);
        assert!((config.windows.slip.early_scale - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn written_file_reads_back_identically() {
        let config = Config {
            input_offset_ms: 7,
            log_level: LogLevel::Debug,
            weights: ScoreWeights { slap: 1000, ..ScoreWeights::default() },
            ..Config::default()
        };
        let mut buf = Vec::new();
        config.to_ini().write_to(&mut buf).expect("in-memory write");
        let text = String::from_utf8(buf).expect("utf8");
        assert_eq!(Config::load_from_str(&text).expect("valid ini"), config);
    }

    #[test]
    fn parse_errors_surface_as_config_errors() {
        let err = Config::load_from_str("[Options\nInputOffsetMs=1").expect_err("unterminated section");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_creates_the_default_file() {
        let dir = std::env::temp_dir().join(format!("beatline-config-{}", std::process::id()));
        let path = dir.join("beatline.ini");
        let _ = std::fs::remove_file(&path);
        let config = load(&path);
        assert_eq!(config, Config::default());
        assert!(path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn log_levels_parse_case_insensitively() {
        assert_eq!("INFO".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert_eq!(" warning ".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("verbose".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Trace.as_level_filter(), log::LevelFilter::Trace);
    }
}
