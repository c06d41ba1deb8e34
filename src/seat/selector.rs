use crate::hal::Button;
use crate::state::{HeatingLevel, SeatId, SharedState};
use crate::tasks;
use log::{debug, info, trace};
use std::time::Duration;

/// Bounded suspension used by the debounce machine, `phase` is the state being waited in
pub trait Delay: Send {
    fn delay(&mut self, phase: DebounceState, duration: Duration);
}

/// Sleeps the current thread
#[derive(Default)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    #[inline]
    fn delay(&mut self, _phase: DebounceState, duration: Duration) {
        tasks::sleep(duration);
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DebounceState {
    /// seen pressed, waiting for the confirming read
    Candidate,
    /// a press has been accepted, further presses are ignored
    Lockout,
}

/// Debounces the seat button and cycles the heating level
pub struct LevelSelector<B, D = ThreadDelay> {
    seat: SeatId,
    state: SharedState,
    button: B,
    delay: D,
    settle: Duration,
    lockout: Duration,
    rejected: u64,
}

impl<B: Button> LevelSelector<B> {
    pub fn new(seat: SeatId, state: SharedState, button: B) -> Self {
        Self::with_delay(seat, state, button, ThreadDelay)
    }
}

impl<B: Button, D: Delay> LevelSelector<B, D> {
    pub fn with_delay(seat: SeatId, state: SharedState, button: B, delay: D) -> Self {
        Self {
            seat,
            state,
            button,
            delay,
            settle: Duration::from_millis(30),
            lockout: Duration::from_millis(500),
            rejected: 0,
        }
    }

    pub fn set_timing(mut self, settle: Duration, lockout: Duration) -> Self {
        self.settle = settle;
        self.lockout = lockout;
        self
    }

    /// Presses dropped by the confirming read
    #[inline]
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Polls the button once. Returns the new level if a press has been accepted
    pub fn step(&mut self) -> Option<HeatingLevel> {
        if !self.button.is_pressed() {
            return None;
        }
        self.wait(DebounceState::Candidate, self.settle);
        if !self.button.is_pressed() {
            self.rejected += 1;
            debug!("{} button glitch rejected", self.seat);
            return None;
        }
        let level = {
            let mut st = self.state.lock();
            let seat = st.seat_mut(self.seat);
            seat.heating_level = seat.heating_level.next();
            seat.heating_level
        };
        info!("{} heating level: {}", self.seat, level);
        self.wait(DebounceState::Lockout, self.lockout);
        Some(level)
    }

    fn wait(&mut self, phase: DebounceState, duration: Duration) {
        trace!("{} button {:?} for {:?}", self.seat, phase, duration);
        self.delay.delay(phase, duration);
    }
}
