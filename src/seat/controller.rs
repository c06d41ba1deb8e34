use crate::hal::{Indicator, Rgb};
use crate::state::{
    HeaterIntensity, HeatingLevel, SeatId, SharedState, SAFE_TEMP_MAX, SAFE_TEMP_MIN,
};
use eva_common::{EResult, Error};
use log::{debug, info, warn};

/// Result of one control cycle
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Decision {
    /// heating level is off
    Idle,
    /// temperature is outside of the safe sensing band, the heater is forced off
    Fault,
    Heat(HeaterIntensity),
}

impl Decision {
    #[inline]
    pub fn intensity(self) -> HeaterIntensity {
        match self {
            Decision::Idle | Decision::Fault => HeaterIntensity::Off,
            Decision::Heat(intensity) => intensity,
        }
    }
}

/// Derives the heater intensity
///
/// `previous` is the intensity set by the previous cycle. A gap of 2-3 °C keeps an already
/// running heater at Low but does not start an idle one
pub fn decide(level: HeatingLevel, temperature_c: u8, previous: HeaterIntensity) -> Decision {
    let Some(target) = level.target_temperature() else {
        return Decision::Idle;
    };
    if !(SAFE_TEMP_MIN..=SAFE_TEMP_MAX).contains(&temperature_c) {
        return Decision::Fault;
    }
    if target <= temperature_c {
        return Decision::Heat(HeaterIntensity::Off);
    }
    let gap = target - temperature_c;
    let intensity = if gap >= 10 {
        HeaterIntensity::High
    } else if gap >= 5 {
        HeaterIntensity::Medium
    } else if (gap >= 2 && previous != HeaterIntensity::Off) || gap > 3 {
        HeaterIntensity::Low
    } else {
        HeaterIntensity::Off
    };
    Decision::Heat(intensity)
}

/// Indicator colors of a seat
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Palette {
    pub low: Rgb,
    pub medium: Rgb,
    pub high: Rgb,
    pub fault: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            low: Rgb::CYAN,
            medium: Rgb::BLUE,
            high: Rgb::GREEN,
            fault: Rgb::RED,
        }
    }
}

impl Palette {
    /// Checks that every output has its own lit color
    pub fn validate(&self) -> EResult<()> {
        let colors = [self.low, self.medium, self.high, self.fault];
        for (i, c) in colors.iter().enumerate() {
            if c.is_dark() {
                return Err(Error::invalid_params("palette colors must not be dark"));
            }
            if colors[i + 1..].contains(c) {
                return Err(Error::invalid_params(format!(
                    "palette color {} is used twice",
                    c
                )));
            }
        }
        Ok(())
    }

    pub fn color(&self, decision: Decision) -> Rgb {
        match decision {
            Decision::Idle | Decision::Heat(HeaterIntensity::Off) => Rgb::NONE,
            Decision::Fault => self.fault,
            Decision::Heat(HeaterIntensity::Low) => self.low,
            Decision::Heat(HeaterIntensity::Medium) => self.medium,
            Decision::Heat(HeaterIntensity::High) => self.high,
        }
    }
}

/// Seat heater control task
pub struct HeaterController<I> {
    seat: SeatId,
    state: SharedState,
    indicator: I,
    palette: Palette,
    fault: bool,
}

impl<I: Indicator> HeaterController<I> {
    pub fn new(seat: SeatId, state: SharedState, indicator: I) -> Self {
        Self {
            seat,
            state,
            indicator,
            palette: Palette::default(),
            fault: false,
        }
    }

    pub fn with_palette(mut self, palette: Palette) -> EResult<Self> {
        palette.validate()?;
        self.palette = palette;
        Ok(self)
    }

    #[inline]
    pub fn seat(&self) -> SeatId {
        self.seat
    }

    /// Runs one control cycle
    pub fn step(&mut self) -> Decision {
        let (decision, previous, temperature_c) = {
            let mut st = self.state.lock();
            let seat = st.seat_mut(self.seat);
            let previous = seat.heater_intensity;
            let decision = decide(seat.heating_level, seat.temperature_c, previous);
            seat.heater_intensity = decision.intensity();
            (decision, previous, seat.temperature_c)
        };
        self.indicator.set_color(self.palette.color(decision));
        let fault = decision == Decision::Fault;
        if fault != self.fault {
            if fault {
                warn!(
                    "{} temperature {} outside of {}..={}, heater forced off",
                    self.seat, temperature_c, SAFE_TEMP_MIN, SAFE_TEMP_MAX
                );
            } else {
                info!("{} temperature back in range: {}", self.seat, temperature_c);
            }
            self.fault = fault;
        }
        if previous != decision.intensity() {
            debug!(
                "{} heater intensity {} -> {}",
                self.seat,
                previous,
                decision.intensity()
            );
        }
        decision
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::SimIndicator;
    use crate::state::SystemState;
    use proptest::prelude::*;

    fn level_strategy() -> impl Strategy<Value = HeatingLevel> {
        prop::sample::select(HeatingLevel::ALL.to_vec())
    }

    fn intensity_strategy() -> impl Strategy<Value = HeaterIntensity> {
        prop::sample::select(vec![
            HeaterIntensity::Off,
            HeaterIntensity::Low,
            HeaterIntensity::Medium,
            HeaterIntensity::High,
        ])
    }

    proptest! {
        #[test]
        fn off_level_keeps_heater_off(t in any::<u8>(), prev in intensity_strategy()) {
            prop_assert_eq!(decide(HeatingLevel::Off, t, prev), Decision::Idle);
        }

        #[test]
        fn unsafe_temperature_forces_off(
            level in level_strategy(),
            t in prop_oneof![0u8..5, 41u8..=255],
            prev in intensity_strategy(),
        ) {
            prop_assert_eq!(decide(level, t, prev).intensity(), HeaterIntensity::Off);
            if level != HeatingLevel::Off {
                prop_assert_eq!(decide(level, t, prev), Decision::Fault);
            }
        }

        #[test]
        fn at_or_above_target_is_off(
            level in level_strategy(),
            t in 5u8..=40,
            prev in intensity_strategy(),
        ) {
            if let Some(target) = level.target_temperature() {
                if t >= target {
                    prop_assert_eq!(decide(level, t, prev), Decision::Heat(HeaterIntensity::Off));
                }
            }
        }
    }

    #[test]
    fn test_bands() {
        let off = HeaterIntensity::Off;
        assert_eq!(
            decide(HeatingLevel::High, 20, off),
            Decision::Heat(HeaterIntensity::High)
        );
        assert_eq!(
            decide(HeatingLevel::Medium, 24, off),
            Decision::Heat(HeaterIntensity::Medium)
        );
        assert_eq!(
            decide(HeatingLevel::Medium, 25, off),
            Decision::Heat(HeaterIntensity::Medium)
        );
        assert_eq!(
            decide(HeatingLevel::Medium, 21, off),
            Decision::Heat(HeaterIntensity::Medium)
        );
        assert_eq!(
            decide(HeatingLevel::Medium, 20, off),
            Decision::Heat(HeaterIntensity::High)
        );
        assert_eq!(
            decide(HeatingLevel::Low, 21, off),
            Decision::Heat(HeaterIntensity::Low)
        );
    }

    #[test]
    fn test_hysteresis() {
        // gap 3
        assert_eq!(
            decide(HeatingLevel::Low, 22, HeaterIntensity::Off),
            Decision::Heat(HeaterIntensity::Off)
        );
        assert_eq!(
            decide(HeatingLevel::Low, 22, HeaterIntensity::Low),
            Decision::Heat(HeaterIntensity::Low)
        );
        // gap 2
        assert_eq!(
            decide(HeatingLevel::Low, 23, HeaterIntensity::Medium),
            Decision::Heat(HeaterIntensity::Low)
        );
        assert_eq!(
            decide(HeatingLevel::Low, 23, HeaterIntensity::Off),
            Decision::Heat(HeaterIntensity::Off)
        );
        // gap 1
        assert_eq!(
            decide(HeatingLevel::Low, 24, HeaterIntensity::Low),
            Decision::Heat(HeaterIntensity::Off)
        );
    }

    #[test]
    fn test_safe_band_edges() {
        let off = HeaterIntensity::Off;
        assert_eq!(decide(HeatingLevel::High, 4, off), Decision::Fault);
        assert_eq!(
            decide(HeatingLevel::High, 5, off),
            Decision::Heat(HeaterIntensity::High)
        );
        assert_eq!(
            decide(HeatingLevel::High, 40, off),
            Decision::Heat(HeaterIntensity::Off)
        );
        assert_eq!(decide(HeatingLevel::High, 41, off), Decision::Fault);
        assert_eq!(decide(HeatingLevel::Off, 41, off), Decision::Idle);
    }

    #[test]
    fn test_palette() {
        let palette = Palette::default();
        assert!(palette.validate().is_ok());
        let colors = [
            palette.color(Decision::Heat(HeaterIntensity::Off)),
            palette.color(Decision::Heat(HeaterIntensity::Low)),
            palette.color(Decision::Heat(HeaterIntensity::Medium)),
            palette.color(Decision::Heat(HeaterIntensity::High)),
            palette.color(Decision::Fault),
        ];
        for (i, c) in colors.iter().enumerate() {
            assert!(!colors[i + 1..].contains(c));
        }
        assert_eq!(palette.color(Decision::Idle), Rgb::NONE);
        let bad = Palette {
            medium: Rgb::CYAN,
            ..Palette::default()
        };
        assert!(bad.validate().is_err());
        let dark = Palette {
            fault: Rgb::NONE,
            ..Palette::default()
        };
        assert!(dark.validate().is_err());
    }

    #[test]
    fn test_step() {
        let state = SystemState::shared();
        let indicator = SimIndicator::new();
        let mut ctl = HeaterController::new(SeatId::Seat2, state.clone(), indicator.clone());
        {
            let mut st = state.lock();
            let seat = st.seat_mut(SeatId::Seat2);
            seat.heating_level = HeatingLevel::High;
            seat.temperature_c = 20;
        }
        assert_eq!(ctl.step(), Decision::Heat(HeaterIntensity::High));
        assert_eq!(indicator.color(), Rgb::GREEN);
        assert_eq!(
            state.lock().seat(SeatId::Seat2).heater_intensity,
            HeaterIntensity::High
        );
        state.lock().seat_mut(SeatId::Seat2).temperature_c = 42;
        assert_eq!(ctl.step(), Decision::Fault);
        assert_eq!(indicator.color(), Rgb::RED);
        assert_eq!(
            state.lock().seat(SeatId::Seat2).heater_intensity,
            HeaterIntensity::Off
        );
        // fault clears as soon as the reading is back in range
        state.lock().seat_mut(SeatId::Seat2).temperature_c = 27;
        assert_eq!(ctl.step(), Decision::Heat(HeaterIntensity::Medium));
        assert_eq!(indicator.color(), Rgb::BLUE);
        state.lock().seat_mut(SeatId::Seat2).heating_level = HeatingLevel::Off;
        assert_eq!(ctl.step(), Decision::Idle);
        assert_eq!(indicator.color(), Rgb::NONE);
        assert_eq!(
            state.lock().seat(SeatId::Seat2).heater_intensity,
            HeaterIntensity::Off
        );
        // every cycle drives the indicator
        assert_eq!(indicator.writes(), 4);
        assert_eq!(
            state.lock().seat(SeatId::Seat1).heater_intensity,
            HeaterIntensity::Off
        );
    }

    #[test]
    fn test_hysteresis_over_cycles() {
        let state = SystemState::shared();
        let mut ctl = HeaterController::new(SeatId::Seat1, state.clone(), SimIndicator::new());
        let set_temp = |t: u8| state.lock().seat_mut(SeatId::Seat1).temperature_c = t;
        state.lock().seat_mut(SeatId::Seat1).heating_level = HeatingLevel::Low;
        set_temp(22);
        assert_eq!(ctl.step().intensity(), HeaterIntensity::Off);
        set_temp(21);
        assert_eq!(ctl.step().intensity(), HeaterIntensity::Low);
        set_temp(22);
        assert_eq!(ctl.step().intensity(), HeaterIntensity::Low);
        set_temp(23);
        assert_eq!(ctl.step().intensity(), HeaterIntensity::Low);
        set_temp(24);
        assert_eq!(ctl.step().intensity(), HeaterIntensity::Off);
        set_temp(23);
        assert_eq!(ctl.step().intensity(), HeaterIntensity::Off);
    }

    #[test]
    fn test_custom_palette() {
        let palette = Palette {
            low: Rgb::YELLOW,
            medium: Rgb::MAGENTA,
            high: Rgb::WHITE,
            fault: Rgb::RED,
        };
        let state = SystemState::shared();
        let indicator = SimIndicator::new();
        let mut ctl = HeaterController::new(SeatId::Seat1, state.clone(), indicator.clone())
            .with_palette(palette)
            .unwrap();
        {
            let mut st = state.lock();
            let seat = st.seat_mut(SeatId::Seat1);
            seat.heating_level = HeatingLevel::Low;
            seat.temperature_c = 20;
        }
        ctl.step();
        assert_eq!(indicator.color(), Rgb::MAGENTA);
        assert!(HeaterController::new(SeatId::Seat1, state, SimIndicator::new())
            .with_palette(Palette {
                low: Rgb::NONE,
                ..palette
            })
            .is_err());
    }
}
