use seatheat::prelude::*;
use seatheat::sim::{SimAnalog, SimButton, SimIndicator, StdoutConsole};
use std::env;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const MAX_RAW: u32 = 4095;

/// Seat temperatures follow a slow triangle wave crossing the safe band
fn spawn_thermal_model(sensors: [SimAnalog; 2]) {
    thread::spawn(move || {
        let mut t: [i16; 2] = [10, 30];
        let mut dir: [i16; 2] = [1, -1];
        loop {
            for i in 0..2 {
                t[i] += dir[i];
                if t[i] >= 44 || t[i] <= 2 {
                    dir[i] = -dir[i];
                }
                sensors[i].set_temperature(u8::try_from(t[i]).unwrap_or_default());
            }
            thread::sleep(Duration::from_millis(700));
        }
    });
}

/// Presses a button every few seconds, holding it long enough to pass the debounce
fn spawn_occupant(button: SimButton, every: Duration) {
    thread::spawn(move || loop {
        thread::sleep(every);
        button.press();
        thread::sleep(Duration::from_millis(150));
        button.release();
    });
}

fn main() {
    init("seatheat-sim", env!("CARGO_PKG_VERSION"));
    let config = match env::args().nth(1) {
        Some(path) => Config::load(path).expect("invalid config"),
        None => Config::default(),
    };
    let runtime = Runtime::new(config.scheduler.clone()).expect("invalid scheduler config");
    let state = SystemState::shared();
    let sensors = [SimAnalog::new(MAX_RAW), SimAnalog::new(MAX_RAW)];
    let (button1, external1, button2) = (SimButton::new(), SimButton::new(), SimButton::new());
    let seats = [
        SeatIo::new(
            sensors[0].clone(),
            AnyPressed(button1.clone(), external1),
            SimIndicator::new(),
        ),
        SeatIo::new(sensors[1].clone(), button2.clone(), SimIndicator::new()),
    ];
    spawn_system(&runtime, &config, &state, seats, Arc::new(StdoutConsole))
        .expect("unable to spawn tasks");
    spawn_thermal_model(sensors);
    spawn_occupant(button1, Duration::from_secs(7));
    spawn_occupant(button2, Duration::from_secs(11));
    run(&runtime);
}
