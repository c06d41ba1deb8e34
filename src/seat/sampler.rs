use crate::hal::AnalogInput;
use crate::state::{SeatId, SharedState};
use log::trace;

/// Top of the displayed temperature scale, °C
pub const SCALE_MAX_C: u64 = 45;

/// Converts a raw conversion to °C: `floor(raw * 45 / max_raw)`, raw is clipped to the
/// full scale
pub fn convert(raw: u32, max_raw: u32) -> u8 {
    if max_raw == 0 {
        return 0;
    }
    let raw = u64::from(raw.min(max_raw));
    let t = raw * SCALE_MAX_C / u64::from(max_raw);
    u8::try_from(t).unwrap_or(u8::MAX)
}

/// Publishes one sensor sample per period, no filtering
pub struct TemperatureSampler<A> {
    seat: SeatId,
    state: SharedState,
    sensor: A,
}

impl<A: AnalogInput> TemperatureSampler<A> {
    pub fn new(seat: SeatId, state: SharedState, sensor: A) -> Self {
        Self {
            seat,
            state,
            sensor,
        }
    }

    /// Samples the sensor and stores the temperature, returns the stored value
    pub fn step(&mut self) -> u8 {
        let raw = self.sensor.read_channel();
        let temperature_c = convert(raw, self.sensor.max_raw());
        self.state.lock().seat_mut(self.seat).temperature_c = temperature_c;
        trace!("{} raw: {}, temperature: {}", self.seat, raw, temperature_c);
        temperature_c
    }
}
