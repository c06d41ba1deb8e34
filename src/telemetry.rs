use crate::hal::Console;
use crate::tasks::{ExecutionTiming, Runtime};
use std::sync::Arc;
use std::time::Duration;

/// Share of `elapsed` spent in control and report tasks, percent
///
/// None if no time has elapsed yet
pub fn cpu_load(timing: &ExecutionTiming, elapsed: Duration) -> Option<f64> {
    if elapsed.is_zero() {
        return None;
    }
    Some(timing.busy_total().as_secs_f64() * 100.0 / elapsed.as_secs_f64())
}

/// Periodic CPU load reporter
pub struct LoadMonitor {
    runtime: Runtime,
    console: Arc<dyn Console>,
}

impl LoadMonitor {
    pub fn new(runtime: Runtime, console: Arc<dyn Console>) -> Self {
        Self { runtime, console }
    }

    pub fn step(&self) -> Option<f64> {
        let elapsed = self.runtime.uptime();
        let load = cpu_load(&self.runtime.timing().lock(), elapsed)?;
        self.console.write_line(&format!(
            "------------------------ CPU load is {:.1}% ------------------------",
            load
        ));
        Some(load)
    }
}

/// Average execution time of every task, one line per task
pub fn render_task_times(timing: &ExecutionTiming) -> Vec<String> {
    timing
        .iter()
        .map(|(name, t)| match t.busy_avg() {
            Some(avg) => format!(
                "task {} ({}, {}) average execution time is {} us, {} runs",
                name,
                t.kind(),
                t.priority(),
                avg.as_micros(),
                t.iters()
            ),
            None => format!("task {} ({}, {}) has not run", name, t.kind(), t.priority()),
        })
        .collect()
}

/// Prints the task execution times once
pub fn dump_task_times(runtime: &Runtime, console: &dyn Console) {
    let lines = render_task_times(&runtime.timing().lock());
    console.write_block(&lines);
}
