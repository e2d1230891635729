//! Centralized logging for the APU core.
//!
//! The APU runs once per CPU cycle, so logging must cost nothing when it is
//! switched off and must not flood the console when it is on.
//!
//! - **LogConfig**: global configuration held in atomics
//! - **LogLevel**: Off < Error < Warn < Info < Debug < Trace
//! - **LogCategory**: APU, FrameCounter, DMC, MIDI, Bus
//! - **log()**: lazily formatted, rate-limited output to stderr or a file
//!
//! A category without its own level falls back to the global level. File
//! output is handed to a background writer thread over a channel.
//!
//! # Usage
//!
//! ```rust
//! use famidi_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::DMC, LogLevel::Info, || {
//!     format!("dmc: {:016X} not found", 0x82A9954CEA45D76Au64)
//! });
//! ```

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

/// Verbosity, ordered from silent to everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

const LEVELS: [LogLevel; 6] = [
    LogLevel::Off,
    LogLevel::Error,
    LogLevel::Warn,
    LogLevel::Info,
    LogLevel::Debug,
    LogLevel::Trace,
];

impl LogLevel {
    /// Accepts a level name, a short alias (`err`, `warning`) or its digit.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let name = s.trim().to_ascii_lowercase();
        if let Ok(n) = name.parse::<usize>() {
            return LEVELS.get(n).copied();
        }
        let level = match name.as_str() {
            "off" => Self::Off,
            "error" | "err" => Self::Error,
            "warn" | "warning" => Self::Warn,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => return None,
        };
        Some(level)
    }

    fn from_u8(raw: u8) -> Self {
        LEVELS.get(raw as usize).copied().unwrap_or(Self::Off)
    }
}

/// Log category for the parts of the sound core
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Register decode, power/reset
    APU,
    /// Quarter/half-frame clocks and frame IRQ
    FrameCounter,
    /// Sample playback, DMA and sample-library lookups
    DMC,
    /// MIDI transcription and bandwidth
    MIDI,
    /// Host bus interaction (open bus, undefined registers)
    Bus,
}

const CATEGORY_COUNT: usize = 5;

impl LogCategory {
    pub const ALL: [LogCategory; CATEGORY_COUNT] = [
        LogCategory::APU,
        LogCategory::FrameCounter,
        LogCategory::DMC,
        LogCategory::MIDI,
        LogCategory::Bus,
    ];

    /// Parse a category name (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "apu" => Some(LogCategory::APU),
            "frame" | "framecounter" | "frame_counter" => Some(LogCategory::FrameCounter),
            "dmc" => Some(LogCategory::DMC),
            "midi" => Some(LogCategory::MIDI),
            "bus" => Some(LogCategory::Bus),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            LogCategory::APU => 0,
            LogCategory::FrameCounter => 1,
            LogCategory::DMC => 2,
            LogCategory::MIDI => 3,
            LogCategory::Bus => 4,
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct Window {
    stamps: VecDeque<Instant>,
    dropped: usize,
    last_drop_report: Option<Instant>,
}

/// Sliding one-second window per category.
struct RateLimiter {
    max_per_second: AtomicUsize,
    window: Duration,
    windows: Mutex<[Window; CATEGORY_COUNT]>,
}

impl RateLimiter {
    fn new(max_per_second: usize) -> Self {
        Self {
            max_per_second: AtomicUsize::new(max_per_second),
            window: Duration::from_secs(1),
            windows: Mutex::new(Default::default()),
        }
    }

    /// Returns (allowed, dropped) where `dropped` is a count to report now.
    fn should_allow(&self, category: LogCategory) -> (bool, Option<usize>) {
        let now = Instant::now();
        let mut windows = lock(&self.windows);
        let w = &mut windows[category.index()];

        while let Some(&front) = w.stamps.front() {
            if now.duration_since(front) > self.window {
                w.stamps.pop_front();
            } else {
                break;
            }
        }

        if w.stamps.len() < self.max_per_second.load(Ordering::Relaxed) {
            w.stamps.push_back(now);
            if w.dropped > 0 {
                w.last_drop_report = Some(now);
                return (true, Some(std::mem::take(&mut w.dropped)));
            }
            return (true, None);
        }

        w.dropped += 1;
        let due = w
            .last_drop_report
            .map_or(true, |last| now.duration_since(last) >= self.window);
        if due {
            w.last_drop_report = Some(now);
            (false, Some(std::mem::take(&mut w.dropped)))
        } else {
            (false, None)
        }
    }
}

/// Global logging configuration
pub struct LogConfig {
    global_level: AtomicU8,
    levels: [AtomicU8; CATEGORY_COUNT],
    log_sender: Mutex<Option<Sender<String>>>,
    file_logging_enabled: AtomicBool,
    rate_limiter: RateLimiter,
}

impl LogConfig {
    /// All logging off, 60 messages per second per category.
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            levels: Default::default(),
            log_sender: Mutex::new(None),
            file_logging_enabled: AtomicBool::new(false),
            rate_limiter: RateLimiter::new(60),
        }
    }

    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.levels[category.index()].load(Ordering::Relaxed))
    }

    /// A category level other than Off wins over the global level.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        if level == LogLevel::Off {
            return false;
        }
        match self.get_level(category) {
            LogLevel::Off => level <= self.get_global_level(),
            own => level <= own,
        }
    }

    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in LogCategory::ALL {
            self.set_level(category, LogLevel::Off);
        }
    }

    pub fn set_rate_limit(&self, max_logs_per_second: usize) {
        self.rate_limiter
            .max_per_second
            .store(max_logs_per_second, Ordering::Relaxed);
    }

    pub fn get_rate_limit(&self) -> usize {
        self.rate_limiter.max_per_second.load(Ordering::Relaxed)
    }

    /// Send output to `path` (appending) through a background writer thread.
    pub fn set_log_file(&self, path: PathBuf) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let (sender, receiver) = channel::<String>();

        thread::Builder::new()
            .name("famidi-log".to_string())
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    let _ = writeln!(file, "{}", message);
                    let _ = file.flush();
                }
            })?;

        *lock(&self.log_sender) = Some(sender);
        self.file_logging_enabled.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Stop file output; the writer thread exits when the sender drops.
    pub fn clear_log_file(&self) {
        *lock(&self.log_sender) = None;
        self.file_logging_enabled.store(false, Ordering::Relaxed);
    }

    fn write_message(&self, message: String) {
        if self.file_logging_enabled.load(Ordering::Relaxed) {
            if let Some(sender) = lock(&self.log_sender).as_ref() {
                if let Err(unsent) = sender.send(message) {
                    eprintln!("{}", unsent.0);
                }
                return;
            }
        }
        eprintln!("{}", message);
    }
}

/// Log a message with the specified category and level.
///
/// `message_fn` only runs when the category/level is enabled and the
/// category is under its rate limit.
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.should_log(category, level) {
        return;
    }

    let (allowed, dropped) = config.rate_limiter.should_allow(category);
    if let Some(count) = dropped.filter(|&c| c > 0) {
        config.write_message(format!(
            "[{:?}] WARNING: rate limit exceeded, {} log message(s) dropped",
            category, count
        ));
    }
    if allowed {
        config.write_message(message_fn());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_aliases_and_digits() {
        assert_eq!(LogLevel::from_str("OFF"), Some(LogLevel::Off));
        assert_eq!(LogLevel::from_str("err"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_str("Warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str(" 3 "), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str("5"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str("6"), None);
        assert_eq!(LogLevel::from_str("loud"), None);
    }

    #[test]
    fn category_names() {
        assert_eq!(LogCategory::from_str("DMC"), Some(LogCategory::DMC));
        assert_eq!(LogCategory::from_str("frame"), Some(LogCategory::FrameCounter));
        assert_eq!(LogCategory::from_str("midi"), Some(LogCategory::MIDI));
        assert_eq!(LogCategory::from_str("ppu"), None);
        for category in LogCategory::ALL {
            assert!(LogCategory::from_str(&format!("{category:?}")).is_some());
        }
    }

    #[test]
    fn levels_are_ordered_by_verbosity() {
        assert!(LEVELS.windows(2).all(|pair| pair[0] < pair[1]));
        for (raw, level) in LEVELS.iter().enumerate() {
            assert_eq!(LogLevel::from_u8(raw as u8), *level);
        }
        assert_eq!(LogLevel::from_u8(200), LogLevel::Off);
    }

    #[test]
    fn category_level_wins_over_global() {
        let cfg = LogConfig::new();
        cfg.set_global_level(LogLevel::Error);
        cfg.set_level(LogCategory::DMC, LogLevel::Debug);

        assert!(cfg.should_log(LogCategory::DMC, LogLevel::Debug));
        assert!(!cfg.should_log(LogCategory::MIDI, LogLevel::Warn));
        assert!(cfg.should_log(LogCategory::MIDI, LogLevel::Error));
    }

    #[test]
    fn off_is_never_logged() {
        let cfg = LogConfig::new();
        cfg.set_global_level(LogLevel::Trace);
        assert!(!cfg.should_log(LogCategory::APU, LogLevel::Off));
    }

    #[test]
    fn reset_silences_everything() {
        let cfg = LogConfig::new();
        cfg.set_global_level(LogLevel::Debug);
        cfg.set_level(LogCategory::Bus, LogLevel::Info);
        cfg.reset();
        assert_eq!(cfg.get_global_level(), LogLevel::Off);
        assert!(LogCategory::ALL
            .iter()
            .all(|&c| cfg.get_level(c) == LogLevel::Off));
    }

    #[test]
    fn rate_limit_is_per_category() {
        let limiter = RateLimiter::new(3);
        for _ in 0..3 {
            assert!(limiter.should_allow(LogCategory::DMC).0);
        }
        let (allowed, dropped) = limiter.should_allow(LogCategory::DMC);
        assert!(!allowed);
        assert_eq!(dropped, Some(1));
        assert!(limiter.should_allow(LogCategory::MIDI).0);
    }

    #[test]
    fn drops_are_reported_once_per_window() {
        let limiter = RateLimiter::new(2);
        for _ in 0..2 {
            limiter.should_allow(LogCategory::APU);
        }
        // First drop is reported immediately, the rest accumulate.
        limiter.should_allow(LogCategory::APU);
        for _ in 0..4 {
            assert_eq!(limiter.should_allow(LogCategory::APU), (false, None));
        }

        thread::sleep(Duration::from_millis(1_100));
        assert_eq!(limiter.should_allow(LogCategory::APU), (true, Some(4)));
    }
}
