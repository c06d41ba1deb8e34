use crate::hal::Console;
use crate::state::{SeatId, SharedState, SystemState};
use std::sync::Arc;

const SEPARATOR: &str =
    "=====================================================================";

/// Renders both seats, one line per field
pub fn render(state: &SystemState) -> Vec<String> {
    let s1 = state.seat(SeatId::Seat1);
    let s2 = state.seat(SeatId::Seat2);
    let (l1, l2) = (SeatId::Seat1.label(), SeatId::Seat2.label());
    vec![
        format!(
            "{} Temperature: {}°C\t\t|\t{} Temperature: {}°C",
            l1, s1.temperature_c, l2, s2.temperature_c
        ),
        format!(
            "{} Heating Level: {}\t|\t{} Heating Level: {}",
            l1, s1.heating_level, l2, s2.heating_level
        ),
        format!(
            "{} Heater Intensity: {}\t|\t{} Heater Intensity: {}",
            l1, s1.heater_intensity, l2, s2.heater_intensity
        ),
        SEPARATOR.to_owned(),
    ]
}

/// Periodic state dump to the console
pub struct StateReporter {
    state: SharedState,
    console: Arc<dyn Console>,
}

impl StateReporter {
    pub fn new(state: SharedState, console: Arc<dyn Console>) -> Self {
        Self { state, console }
    }

    pub fn step(&self) {
        let lines = render(&self.state.lock());
        self.console.write_block(&lines);
    }
}
