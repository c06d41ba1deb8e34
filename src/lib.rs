use log::{debug, info};
use once_cell::sync::{Lazy, OnceCell};
use std::env;
use std::panic;
use std::sync::atomic;
use std::sync::Arc;

pub mod config;
pub mod hal;
pub mod interval;
pub mod report;
pub mod seat;
pub mod sim;
pub mod state;
pub mod system;
pub mod telemetry;
pub mod tasks;

pub mod prelude {
    pub use super::config::Config;
    pub use super::hal::{AnalogInput, AnyPressed, Button, Console, Indicator, Rgb};
    pub use super::state::{HeaterIntensity, HeatingLevel, SeatId, SharedState, SystemState};
    pub use super::system::{spawn_system, SeatIo};
    pub use super::tasks::Runtime;
    pub use super::{init, run};
    pub use log::{debug, error, info, trace, warn};
}

pub mod export {
    pub use eva_common;
    pub use log;
    pub use parking_lot;
}

pub static NAME: OnceCell<String> = OnceCell::new();
pub static VERSION: OnceCell<String> = OnceCell::new();
pub static CPUS: OnceCell<usize> = OnceCell::new();

static HOSTNAME: OnceCell<String> = OnceCell::new();

static TERM_FLAG: Lazy<Arc<atomic::AtomicBool>> =
    Lazy::new(|| Arc::new(atomic::AtomicBool::new(false)));

fn sigterm_received() -> bool {
    TERM_FLAG.load(atomic::Ordering::SeqCst)
}

#[inline]
pub fn hostname() -> &'static str {
    HOSTNAME.get().map_or("", String::as_str)
}

/// Sets up the panic hook and logging
///
/// The log goes to stdout (`VERBOSE=1` enables trace messages) or to syslog if `SYSLOG=1`
///
/// # Panics
///
/// Will panic if called twice or if syslog is selected but can not be connected
pub fn init(name: &str, version: &str) {
    panic::set_hook(Box::new(|s| {
        println!("PANIC: {}", s);
        std::process::exit(1);
    }));
    HOSTNAME
        .set(
            hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_default(),
        )
        .unwrap();
    NAME.set(name.to_owned()).unwrap();
    VERSION.set(version.to_owned()).unwrap();
    let verbose: bool = env::var("VERBOSE").ok().map_or(false, |v| v == "1");
    let syslog: bool = env::var("SYSLOG").ok().map_or(false, |v| v == "1");
    let level = if verbose {
        log::LevelFilter::Trace
    } else {
        log::LevelFilter::Info
    };
    if syslog {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_USER,
            hostname: None,
            process: name.to_owned(),
            pid: std::process::id(),
        };
        log::set_boxed_logger(Box::new(syslog::BasicLogger::new(
            syslog::unix(formatter).unwrap(),
        )))
        .unwrap();
        log::set_max_level(level);
    } else {
        env_logger::Builder::new()
            .target(env_logger::Target::Stdout)
            .filter_level(level)
            .init();
    }
    debug!("log initialization completed");
}

/// # Panics
///
/// Will panic if unable to register SIGTERM/SIGINT handler
fn register_signals() {
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&TERM_FLAG)).unwrap();
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&TERM_FLAG)).unwrap();
}

/// Releases the spawned tasks and blocks until SIGTERM/SIGINT
///
/// Control tasks have no stop path, they end with the process
pub fn run(runtime: &tasks::Runtime) {
    let name = NAME.get().map_or("seatheat", String::as_str);
    let version = VERSION.get().map_or("", String::as_str);
    info!("system: {}, cpus: {}", hostname(), cpus());
    info!("{} {}", name, version);
    register_signals();
    runtime.start();
    while !sigterm_received() {
        tasks::step_sleep();
    }
    info!("termination signal received, uptime: {:?}", runtime.uptime());
}

pub fn cpus() -> usize {
    if let Some(cpus) = CPUS.get() {
        *cpus
    } else {
        let cpus = if let Ok(s) = std::fs::read_to_string("/proc/cpuinfo") {
            let mut c = 0;
            for line in s.split('\n') {
                if line.starts_with("processor\t") {
                    c += 1;
                }
            }
            c
        } else {
            0
        };
        let _ = CPUS.set(cpus);
        cpus
    }
}
