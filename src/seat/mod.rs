//! Per-seat control tasks
pub mod controller;
pub mod sampler;
pub mod selector;

pub use controller::{HeaterController, Palette};
pub use sampler::TemperatureSampler;
pub use selector::{DebounceState, Delay, LevelSelector, ThreadDelay};
