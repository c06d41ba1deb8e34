//! In-memory devices for host runs and tests. Every device is a cheap handle, clones
//! share the same underlying value.
use crate::hal::{AnalogInput, Button, Console, Indicator, Rgb};
use log::info;
use parking_lot::Mutex;
use std::io::{self, Write as _};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Potentiometer-like analog input
#[derive(Clone)]
pub struct SimAnalog {
    raw: Arc<AtomicU32>,
    max_raw: u32,
}

impl SimAnalog {
    pub fn new(max_raw: u32) -> Self {
        Self {
            raw: <_>::default(),
            max_raw,
        }
    }
    /// Values above the full scale are clipped
    pub fn set_raw(&self, raw: u32) {
        self.raw.store(raw.min(self.max_raw), Ordering::SeqCst);
    }
    /// Sets the raw value which converts to the given temperature
    pub fn set_temperature(&self, temperature_c: u8) {
        let raw = (u64::from(temperature_c) * u64::from(self.max_raw)).div_ceil(45);
        self.set_raw(u32::try_from(raw).unwrap_or(u32::MAX));
    }
}

impl AnalogInput for SimAnalog {
    fn max_raw(&self) -> u32 {
        self.max_raw
    }
    fn read_channel(&mut self) -> u32 {
        self.raw.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub struct SimButton {
    pressed: Arc<AtomicBool>,
}

impl SimButton {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn press(&self) {
        self.pressed.store(true, Ordering::SeqCst);
    }
    pub fn release(&self) {
        self.pressed.store(false, Ordering::SeqCst);
    }
}

impl Button for SimButton {
    fn is_pressed(&self) -> bool {
        self.pressed.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub struct SimIndicator {
    color: Arc<Mutex<Rgb>>,
    writes: Arc<AtomicUsize>,
}

impl SimIndicator {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn color(&self) -> Rgb {
        *self.color.lock()
    }
    /// Number of set_color calls
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Indicator for SimIndicator {
    fn set_color(&mut self, color: Rgb) {
        *self.color.lock() = color;
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Collects console lines in memory
#[derive(Clone, Default)]
pub struct MemoryConsole {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryConsole {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
    pub fn contains(&self, pat: &str) -> bool {
        self.lines.lock().iter().any(|l| l.contains(pat))
    }
}

impl Console for MemoryConsole {
    fn write_line(&self, line: &str) {
        self.lines.lock().push(line.to_owned());
    }
    fn write_block(&self, lines: &[String]) {
        self.lines.lock().extend_from_slice(lines);
    }
}

/// Writes to stdout, a block is written under a single stdout lock
#[derive(Default)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn write_line(&self, line: &str) {
        let _ = writeln!(io::stdout().lock(), "{}", line);
    }
    fn write_block(&self, lines: &[String]) {
        let mut out = io::stdout().lock();
        for line in lines {
            if writeln!(out, "{}", line).is_err() {
                break;
            }
        }
    }
}

/// Sends console lines to the log
#[derive(Default)]
pub struct LogConsole;

impl Console for LogConsole {
    fn write_line(&self, line: &str) {
        info!("{}", line);
    }
}
