use crate::config::{Config, TimingConfig};
use crate::hal::{AnalogInput, Button, Console, Indicator};
use crate::report::StateReporter;
use crate::seat::{HeaterController, LevelSelector, Palette, TemperatureSampler};
use crate::state::{SeatId, SharedState};
use crate::tasks::{Kind, Priority, Runtime, Task};
use crate::telemetry::{dump_task_times, LoadMonitor};
use eva_common::EResult;
use log::info;
use std::sync::Arc;

/// Devices of one seat
pub struct SeatIo {
    pub sensor: Box<dyn AnalogInput>,
    pub button: Box<dyn Button>,
    pub indicator: Box<dyn Indicator>,
    pub palette: Palette,
}

impl SeatIo {
    pub fn new<A, B, I>(sensor: A, button: B, indicator: I) -> Self
    where
        A: AnalogInput + 'static,
        B: Button + 'static,
        I: Indicator + 'static,
    {
        Self {
            sensor: Box::new(sensor),
            button: Box::new(button),
            indicator: Box::new(indicator),
            palette: Palette::default(),
        }
    }

    pub fn palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }
}

/// Spawns all controller tasks. The tasks wait for [`Runtime::start`]
///
/// Per seat: level selector, temperature sampler and heater controller. Shared: state
/// reporter, CPU load monitor and the one-shot task time dump. Task scheduling follows the
/// runtime settings. If any task can not be spawned, the already spawned ones are cancelled
pub fn spawn_system(
    runtime: &Runtime,
    config: &Config,
    state: &SharedState,
    seats: [SeatIo; 2],
    console: Arc<dyn Console>,
) -> EResult<()> {
    config.validate()?;
    let timing = &config.timing;
    let mut units = Vec::with_capacity(seats.len());
    for (seat, io) in SeatId::ALL.into_iter().zip(seats) {
        let controller =
            HeaterController::new(seat, state.clone(), io.indicator).with_palette(io.palette)?;
        let selector = LevelSelector::new(seat, state.clone(), io.button)
            .set_timing(timing.settle, timing.lockout);
        let sampler = TemperatureSampler::new(seat, state.clone(), io.sensor);
        units.push((seat, selector, sampler, controller));
    }
    let mut spawned = Vec::new();
    let result = spawn_tasks(runtime, timing, state, units, console, &mut spawned);
    if let Err(e) = result {
        for name in spawned {
            runtime.cancel(&name);
        }
        return Err(e);
    }
    info!("{} tasks spawned", runtime.tasks().len());
    Ok(())
}

type SeatUnit = (
    SeatId,
    LevelSelector<Box<dyn Button>>,
    TemperatureSampler<Box<dyn AnalogInput>>,
    HeaterController<Box<dyn Indicator>>,
);

fn spawn_tasks(
    runtime: &Runtime,
    timing: &TimingConfig,
    state: &SharedState,
    units: Vec<SeatUnit>,
    console: Arc<dyn Console>,
    spawned: &mut Vec<String>,
) -> EResult<()> {
    for (seat, mut selector, mut sampler, mut controller) in units {
        let n = seat.index() + 1;
        spawned.push(runtime.spawn_loop(
            &Task::new(&format!("select{}", n), Kind::Input, Priority::Input),
            timing.control_period,
            move || {
                selector.step();
            },
        )?);
        spawned.push(runtime.spawn_loop(
            &Task::new(&format!("sample{}", n), Kind::Input, Priority::Control),
            timing.control_period,
            move || {
                sampler.step();
            },
        )?);
        spawned.push(runtime.spawn_loop(
            &Task::new(&format!("heat{}", n), Kind::Program, Priority::Control),
            timing.control_period,
            move || {
                controller.step();
            },
        )?);
    }
    let reporter = StateReporter::new(state.clone(), console.clone());
    spawned.push(runtime.spawn_loop(
        &Task::new("state", Kind::Report, Priority::Control),
        timing.report_period,
        move || reporter.step(),
    )?);
    let monitor = LoadMonitor::new(runtime.clone(), console.clone());
    spawned.push(runtime.spawn_loop(
        &Task::new("cpuload", Kind::Service, Priority::Load),
        timing.load_period,
        move || {
            monitor.step();
        },
    )?);
    let rt = runtime.clone();
    spawned.push(runtime.spawn_once(
        &Task::new("taskdump", Kind::Service, Priority::Diagnostic),
        timing.diagnostic_delay,
        move || dump_task_times(&rt, console.as_ref()),
    )?);
    Ok(())
}
