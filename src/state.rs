use bmart_derive::EnumStr;
use parking_lot::Mutex;
use std::sync::Arc;

pub type LockedState = Mutex<SystemState>;
pub type SharedState = Arc<LockedState>;

/// Lower bound of the safe sensing band, °C
pub const SAFE_TEMP_MIN: u8 = 5;
/// Upper bound of the safe sensing band, °C
pub const SAFE_TEMP_MAX: u8 = 40;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, EnumStr)]
#[enumstr(rename_all = "lowercase")]
pub enum SeatId {
    Seat1,
    Seat2,
}

impl SeatId {
    pub const ALL: [SeatId; 2] = [SeatId::Seat1, SeatId::Seat2];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            SeatId::Seat1 => 0,
            SeatId::Seat2 => 1,
        }
    }

    /// Console label ("Seat1", "Seat2")
    pub fn label(self) -> &'static str {
        match self {
            SeatId::Seat1 => "Seat1",
            SeatId::Seat2 => "Seat2",
        }
    }
}

/// Heating level selected by the seat occupant
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Default, EnumStr)]
#[repr(u8)]
#[enumstr(rename_all = "UPPERCASE")]
pub enum HeatingLevel {
    #[default]
    Off = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl HeatingLevel {
    pub const ALL: [HeatingLevel; 4] = [
        HeatingLevel::Off,
        HeatingLevel::Low,
        HeatingLevel::Medium,
        HeatingLevel::High,
    ];

    /// The level selected by one more button press, wraps High -> Off
    #[inline]
    pub fn next(self) -> Self {
        Self::ALL[(self as usize + 1) % Self::ALL.len()]
    }

    /// Desired seat temperature, °C. None for Off
    #[inline]
    pub fn target_temperature(self) -> Option<u8> {
        match self {
            HeatingLevel::Off => None,
            HeatingLevel::Low => Some(25),
            HeatingLevel::Medium => Some(30),
            HeatingLevel::High => Some(35),
        }
    }
}

/// Heater output derived by the controller
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Default, EnumStr)]
#[repr(u8)]
#[enumstr(rename_all = "UPPERCASE")]
pub enum HeaterIntensity {
    #[default]
    Off = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct SeatState {
    pub temperature_c: u8,
    pub heating_level: HeatingLevel,
    pub heater_intensity: HeaterIntensity,
}

impl SeatState {
    #[inline]
    pub fn in_safe_band(&self) -> bool {
        (SAFE_TEMP_MIN..=SAFE_TEMP_MAX).contains(&self.temperature_c)
    }
}

/// Shared record of both seats. Cloning it under the lock gives a consistent snapshot
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct SystemState {
    seats: [SeatState; 2],
}

impl SystemState {
    /// Creates the process-wide state handle, all seats off
    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(SystemState::default()))
    }

    #[inline]
    pub fn seat(&self, seat: SeatId) -> &SeatState {
        &self.seats[seat.index()]
    }

    #[inline]
    pub fn seat_mut(&mut self, seat: SeatId) -> &mut SeatState {
        &mut self.seats[seat.index()]
    }

    pub fn seats(&self) -> impl Iterator<Item = (SeatId, &SeatState)> {
        SeatId::ALL.into_iter().map(|id| (id, self.seat(id)))
    }
}
