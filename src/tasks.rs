use crate::config::SchedulerConfig;
use crate::cpus;
use crate::interval::Loop;
use bmart_derive::EnumStr;
use eva_common::{EResult, Error};
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::{btree_map, BTreeMap};
use std::env;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const WAIT_STEP: Duration = Duration::from_secs(1);
pub const SLEEP_STEP: Duration = Duration::from_millis(500);

/// Linux limits thread names to 15 bytes, one is taken by the kind prefix
const MAX_TASK_NAME_LEN: usize = 14;

const AFFINITY_VAR_PREFIX: &str = "SEATHEAT_TASK_AFFINITY_";

#[inline]
pub fn step_sleep() {
    sleep(SLEEP_STEP);
}

#[inline]
pub fn sleep(duration: Duration) {
    thread::sleep(duration);
}

pub fn sleep_until(t: Instant) {
    let now = Instant::now();
    if t > now {
        sleep(t - now);
    }
}

pub fn thread_name() -> String {
    let th = thread::current();
    if let Some(name) = th.name() {
        name.to_owned()
    } else {
        format!("{:?}", th.id())
    }
}

/// CPU time consumed by the calling thread
pub fn thread_cpu_time() -> Duration {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let res = unsafe { libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, &mut ts) };
    if res == 0 {
        Duration::new(
            u64::try_from(ts.tv_sec).unwrap_or_default(),
            u32::try_from(ts.tv_nsec).unwrap_or_default(),
        )
    } else {
        Duration::ZERO
    }
}

#[derive(Eq, PartialEq, Copy, Clone, Debug, EnumStr)]
#[enumstr(rename_all = "lowercase")]
pub enum Kind {
    /// samples sensors and buttons
    Input,
    /// control logic
    Program,
    /// renders the system state
    Report,
    /// telemetry, excluded from the CPU load sum
    Service,
}

impl Kind {
    fn thread_prefix(self) -> &'static str {
        match self {
            Kind::Input => "I",
            Kind::Program => "P",
            Kind::Report => "R",
            Kind::Service => "S",
        }
    }
}

/// Relative task priority, mapped on SCHED_RR when real-time scheduling is enabled
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, EnumStr)]
#[repr(u8)]
#[enumstr(rename_all = "lowercase")]
pub enum Priority {
    Diagnostic = 1,
    Load = 2,
    Control = 3,
    Input = 4,
}

impl Priority {
    #[inline]
    pub fn value(self) -> u8 {
        self as u8
    }
}

pub struct Task<'a> {
    pub name: &'a str,
    pub kind: Kind,
    pub priority: Priority,
}

impl<'a> Task<'a> {
    #[inline]
    pub fn new(name: &'a str, kind: Kind, priority: Priority) -> Self {
        Self {
            name,
            kind,
            priority,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskTiming {
    kind: Kind,
    priority: Priority,
    iters: u32,
    last_entry: Option<Duration>,
    last_exit: Option<Duration>,
    busy: Option<BusyStats>,
}

#[derive(Debug, Clone, Copy)]
struct BusyStats {
    min: Duration,
    max: Duration,
    last: Duration,
    total: Duration,
}

impl BusyStats {
    #[inline]
    fn new(busy: Duration) -> Self {
        Self {
            min: busy,
            max: busy,
            last: busy,
            total: busy,
        }
    }
}

#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct TaskInfo {
    pub iters: u32,
    pub busy_min: Duration,
    pub busy_max: Duration,
    pub busy_last: Duration,
    pub busy_avg: Duration,
    pub last_entry: Duration,
    pub last_exit: Duration,
}

impl TaskTiming {
    fn new(kind: Kind, priority: Priority) -> Self {
        Self {
            kind,
            priority,
            iters: 0,
            last_entry: None,
            last_exit: None,
            busy: None,
        }
    }
    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }
    #[inline]
    pub fn priority(&self) -> Priority {
        self.priority
    }
    #[inline]
    pub fn iters(&self) -> u32 {
        self.iters
    }
    /// Accumulated execution time
    #[inline]
    pub fn busy_total(&self) -> Duration {
        self.busy.map_or(Duration::ZERO, |b| b.total)
    }
    pub fn busy_avg(&self) -> Option<Duration> {
        self.busy.map(|b| b.total / self.iters.max(1))
    }
    pub fn info(&self) -> Option<TaskInfo> {
        let busy = self.busy?;
        Some(TaskInfo {
            iters: self.iters,
            busy_min: busy.min,
            busy_max: busy.max,
            busy_last: busy.last,
            busy_avg: busy.total / self.iters.max(1),
            last_entry: self.last_entry.unwrap_or_default(),
            last_exit: self.last_exit.unwrap_or_default(),
        })
    }
    fn record(&mut self, entry: Duration, exit: Duration, busy: Duration) {
        self.last_entry.replace(entry);
        self.last_exit.replace(exit);
        let was_reset = if self.iters == u32::MAX {
            self.iters = 1;
            true
        } else {
            self.iters += 1;
            false
        };
        if let Some(ref mut b_stats) = self.busy {
            if b_stats.min > busy {
                b_stats.min = busy;
            }
            if b_stats.max < busy {
                b_stats.max = busy;
            }
            b_stats.last = busy;
            if was_reset {
                b_stats.total = busy;
            } else if let Some(total) = b_stats.total.checked_add(busy) {
                b_stats.total = total;
            } else {
                self.iters = 1;
                b_stats.total = busy;
            }
        } else {
            self.busy.replace(BusyStats::new(busy));
        }
    }
    fn reset(&mut self) {
        self.iters = 0;
        self.last_entry.take();
        self.last_exit.take();
        self.busy.take();
    }
}

/// Entry/exit and execution time samples, one slot per task
#[derive(Debug, Default)]
pub struct ExecutionTiming {
    tasks: BTreeMap<String, TaskTiming>,
}

impl ExecutionTiming {
    fn register(&mut self, name: &str, kind: Kind, priority: Priority) -> EResult<()> {
        if let btree_map::Entry::Vacant(v) = self.tasks.entry(name.to_owned()) {
            v.insert(TaskTiming::new(kind, priority));
            Ok(())
        } else {
            Err(Error::busy(format!("task {} is already registered", name)))
        }
    }
    fn unregister(&mut self, name: &str) {
        self.tasks.remove(name);
    }
    pub fn record(&mut self, name: &str, entry: Duration, exit: Duration, busy: Duration) {
        if let Some(timing) = self.tasks.get_mut(name) {
            timing.record(entry, exit, busy);
        } else {
            warn!("task {} not registered", name);
        }
    }
    pub fn get(&self, name: &str) -> Option<&TaskTiming> {
        self.tasks.get(name)
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskTiming)> {
        self.tasks.iter().map(|(name, t)| (name.as_str(), t))
    }
    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
    /// Accumulated execution time of all tasks except telemetry services
    pub fn busy_total(&self) -> Duration {
        self.tasks
            .values()
            .filter(|t| t.kind != Kind::Service)
            .map(TaskTiming::busy_total)
            .sum()
    }
    pub fn reset(&mut self) {
        self.tasks.values_mut().for_each(TaskTiming::reset);
    }
}

/// Measures one execution of a task body, the sample is stored when the probe is dropped
pub struct Probe<'a> {
    timing: &'a Mutex<ExecutionTiming>,
    name: &'a str,
    boot: Instant,
    entry: Duration,
    cpu_entry: Duration,
}

impl<'a> Probe<'a> {
    pub fn enter(timing: &'a Mutex<ExecutionTiming>, name: &'a str, boot: Instant) -> Self {
        Self {
            timing,
            name,
            boot,
            entry: boot.elapsed(),
            cpu_entry: thread_cpu_time(),
        }
    }
}

impl Drop for Probe<'_> {
    fn drop(&mut self) {
        let busy = thread_cpu_time().saturating_sub(self.cpu_entry);
        let exit = self.boot.elapsed();
        self.timing.lock().record(self.name, self.entry, exit, busy);
    }
}

pub struct Affinity {
    pub cpu_id: usize,
    pub sched_priority: libc::c_int,
}

impl FromStr for Affinity {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut sp = s.split(',');
        let cpu_id: usize = sp
            .next()
            .unwrap_or_default()
            .parse()
            .map_err(|e| Error::invalid_params(format!("invalid task cpu id: {e}")))?;
        let sched_priority: libc::c_int = sp
            .next()
            .ok_or_else(|| Error::invalid_params("no priority specified"))?
            .parse()
            .map_err(|e| Error::invalid_params(format!("invalid task priority: {e}")))?;
        if let Some(s) = sp.next() {
            return Err(Error::invalid_params(format!(
                "extra affinity params not supported: {}",
                s
            )));
        }
        if cpu_id >= cpus() {
            return Err(Error::invalid_params(format!("CPU not found: {}", cpu_id)));
        }
        if !(1..=99).contains(&sched_priority) {
            return Err(Error::invalid_params(format!(
                "invalid scheduler priority: {}",
                sched_priority
            )));
        }
        Ok(Self {
            cpu_id,
            sched_priority,
        })
    }
}

enum Placement {
    Default,
    Realtime(libc::c_int),
    Pinned(Affinity),
}

impl Placement {
    fn apply(&self) {
        let name = thread_name();
        let sched_priority = match self {
            Placement::Default => return,
            Placement::Realtime(p) => *p,
            Placement::Pinned(affinity) => {
                info!(
                    "setting {} affinity to CPU {}, priority: {}",
                    name, affinity.cpu_id, affinity.sched_priority
                );
                if !core_affinity::set_for_current(core_affinity::CoreId {
                    id: affinity.cpu_id,
                }) {
                    warn!("unable to pin {} to CPU {}", name, affinity.cpu_id);
                }
                affinity.sched_priority
            }
        };
        let res = unsafe {
            libc::sched_setscheduler(0, libc::SCHED_RR, &libc::sched_param { sched_priority })
        };
        if res == 0 {
            debug!("{} scheduled SCHED_RR, priority: {}", name, sched_priority);
        } else {
            warn!(
                "unable to set {} real-time priority {}, error code: {}, running with the default policy",
                name, sched_priority, res
            );
        }
    }
}

struct TaskHandle {
    thread: thread::JoinHandle<()>,
    cancelled: Arc<AtomicBool>,
}

struct Inner {
    boot: Mutex<Option<Instant>>,
    started: Condvar,
    timing: Mutex<ExecutionTiming>,
    handles: Mutex<BTreeMap<String, TaskHandle>>,
    scheduler: SchedulerConfig,
}

/// Spawns task threads, holds them until started and collects their execution timing
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<Inner>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::create(<_>::default())
    }
}

impl Runtime {
    pub fn new(scheduler: SchedulerConfig) -> EResult<Self> {
        scheduler.validate()?;
        Ok(Self::create(scheduler))
    }

    fn create(scheduler: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                boot: <_>::default(),
                started: Condvar::new(),
                timing: <_>::default(),
                handles: <_>::default(),
                scheduler,
            }),
        }
    }

    #[inline]
    pub fn timing(&self) -> &Mutex<ExecutionTiming> {
        &self.inner.timing
    }

    /// Releases all spawned tasks, the release instant is the boot time
    pub fn start(&self) {
        let mut boot = self.inner.boot.lock();
        if boot.is_none() {
            boot.replace(Instant::now());
            info!("tasks released");
            self.inner.started.notify_all();
        } else {
            warn!("runtime is already started");
        }
    }

    pub fn boot_time(&self) -> Option<Instant> {
        *self.inner.boot.lock()
    }

    pub fn is_started(&self) -> bool {
        self.boot_time().is_some()
    }

    /// Time since start, zero if not started
    pub fn uptime(&self) -> Duration {
        self.boot_time().map_or(Duration::ZERO, |b| b.elapsed())
    }

    /// Blocks until the start, None if the task has been cancelled before
    fn wait_started(&self, cancelled: &AtomicBool) -> Option<Instant> {
        let mut boot = self.inner.boot.lock();
        loop {
            if cancelled.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(b) = *boot {
                return Some(b);
            }
            let _ = self.inner.started.wait_for(&mut boot, WAIT_STEP);
        }
    }

    /// Drops a task which has not been started yet, its thread exits without running the
    /// body. Returns false if there is no such task or the runtime is already started
    pub fn cancel(&self, name: &str) -> bool {
        let boot = self.inner.boot.lock();
        if boot.is_some() {
            return false;
        }
        let Some(handle) = self.inner.handles.lock().remove(name) else {
            return false;
        };
        handle.cancelled.store(true, Ordering::SeqCst);
        self.inner.timing.lock().unregister(name);
        self.inner.started.notify_all();
        debug!("task {} cancelled", name);
        true
    }

    /// Names of the spawned task threads
    pub fn tasks(&self) -> Vec<String> {
        self.inner.handles.lock().keys().cloned().collect()
    }

    /// None if no such task
    pub fn is_finished(&self, name: &str) -> Option<bool> {
        self.inner
            .handles
            .lock()
            .get(name)
            .map(|h| h.thread.is_finished())
    }

    fn placement(&self, name: &str, priority: Priority) -> EResult<Placement> {
        let var = format!("{}{}", AFFINITY_VAR_PREFIX, name.replace('.', "__"));
        if let Ok(aff) = env::var(var) {
            return Ok(Placement::Pinned(aff.parse()?));
        }
        let sched = &self.inner.scheduler;
        if sched.realtime {
            Ok(Placement::Realtime(
                sched.rt_priority_base + libc::c_int::from(priority.value()),
            ))
        } else {
            Ok(Placement::Default)
        }
    }

    /// Spawns a task thread, returns the thread name (the task name with the kind prefix)
    ///
    /// The thread body is started immediately, use [`Runtime::spawn_loop`] and
    /// [`Runtime::spawn_once`] for bodies which must wait for the start
    pub fn spawn<F>(&self, task: &Task, f: F) -> EResult<String>
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn_task(task, <_>::default(), f)
    }

    fn spawn_task<F>(&self, task: &Task, cancelled: Arc<AtomicBool>, f: F) -> EResult<String>
    where
        F: FnOnce() + Send + 'static,
    {
        if task.name.is_empty() || task.name.len() > MAX_TASK_NAME_LEN {
            return Err(Error::invalid_params(format!(
                "task name MUST be 1-{} characters ({})",
                MAX_TASK_NAME_LEN, task.name
            )));
        }
        let name = format!("{}{}", task.kind.thread_prefix(), task.name);
        let placement = self.placement(&name, task.priority)?;
        self.inner
            .timing
            .lock()
            .register(&name, task.kind, task.priority)?;
        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            placement.apply();
            f();
        });
        match spawned {
            Ok(thread) => {
                self.inner
                    .handles
                    .lock()
                    .insert(name.clone(), TaskHandle { thread, cancelled });
                debug!(
                    "task {} spawned, kind: {}, priority: {}",
                    name, task.kind, task.priority
                );
                Ok(name)
            }
            Err(e) => {
                self.inner.timing.lock().unregister(&name);
                Err(e.into())
            }
        }
    }

    /// Spawns a periodic task. After the start the body runs every `interval`, each run is
    /// measured by a [`Probe`]
    pub fn spawn_loop<F>(&self, task: &Task, interval: Duration, mut f: F) -> EResult<String>
    where
        F: FnMut() + Send + 'static,
    {
        let rt = self.clone();
        let cancelled: Arc<AtomicBool> = <_>::default();
        let gate = cancelled.clone();
        self.spawn_task(task, cancelled, move || {
            let Some(boot) = rt.wait_started(&gate) else {
                return;
            };
            let name = thread_name();
            let mut int = Loop::prepare_at(boot, interval);
            log_running();
            loop {
                {
                    let _probe = Probe::enter(rt.timing(), &name, boot);
                    f();
                }
                int.tick();
            }
        })
    }

    /// Spawns a task which runs its body once, `delay` after the start, and exits
    pub fn spawn_once<F>(&self, task: &Task, delay: Duration, f: F) -> EResult<String>
    where
        F: FnOnce() + Send + 'static,
    {
        let rt = self.clone();
        let cancelled: Arc<AtomicBool> = <_>::default();
        let gate = cancelled.clone();
        self.spawn_task(task, cancelled, move || {
            let Some(boot) = rt.wait_started(&gate) else {
                return;
            };
            let name = thread_name();
            sleep_until(boot + delay);
            log_running();
            {
                let _probe = Probe::enter(rt.timing(), &name, boot);
                f();
            }
            log_finished();
        })
    }
}

#[inline]
fn log_running() {
    debug!("task {} running", thread_name());
}

#[inline]
fn log_finished() {
    debug!("task {} finished", thread_name());
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn wait_for<F: Fn() -> bool>(f: F) -> bool {
        let until = Instant::now() + Duration::from_secs(5);
        while Instant::now() < until {
            if f() {
                return true;
            }
            sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_timing_record() {
        let mut timing = ExecutionTiming::default();
        timing
            .register("Pheat1", Kind::Program, Priority::Control)
            .unwrap();
        timing
            .register("Sload", Kind::Service, Priority::Load)
            .unwrap();
        assert!(timing
            .register("Pheat1", Kind::Program, Priority::Control)
            .is_err());
        let ms = Duration::from_millis;
        timing.record("Pheat1", ms(0), ms(3), ms(2));
        timing.record("Pheat1", ms(100), ms(104), ms(4));
        timing.record("Sload", ms(0), ms(50), ms(50));
        let info = timing.get("Pheat1").unwrap().info().unwrap();
        assert_eq!(info.iters, 2);
        assert_eq!(info.busy_min, ms(2));
        assert_eq!(info.busy_max, ms(4));
        assert_eq!(info.busy_last, ms(4));
        assert_eq!(info.busy_avg, ms(3));
        assert_eq!(info.last_entry, ms(100));
        assert_eq!(info.last_exit, ms(104));
        // services are not a part of the load
        assert_eq!(timing.busy_total(), ms(6));
        timing.reset();
        assert!(timing.get("Pheat1").unwrap().info().is_none());
        assert_eq!(timing.busy_total(), Duration::ZERO);
    }

    #[test]
    fn test_affinity_parse() {
        assert!("0".parse::<Affinity>().is_err());
        assert!("0,0".parse::<Affinity>().is_err());
        assert!("0,100".parse::<Affinity>().is_err());
        assert!("0,10,1".parse::<Affinity>().is_err());
        assert!("x,10".parse::<Affinity>().is_err());
    }

    #[test]
    fn test_task_name() {
        let rt = Runtime::default();
        assert!(rt
            .spawn(&Task::new("", Kind::Input, Priority::Input), || {})
            .is_err());
        assert!(rt
            .spawn(
                &Task::new("a_very_long_name", Kind::Input, Priority::Input),
                || {}
            )
            .is_err());
        assert_eq!(
            rt.spawn(&Task::new("ok", Kind::Input, Priority::Input), || {})
                .unwrap(),
            "Iok"
        );
        assert!(rt
            .spawn(&Task::new("ok", Kind::Input, Priority::Input), || {})
            .is_err());
    }

    #[test]
    fn test_loop_waits_for_start() {
        let rt = Runtime::default();
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let name = rt
            .spawn_loop(
                &Task::new("count", Kind::Program, Priority::Control),
                Duration::from_millis(5),
                move || {
                    c.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();
        sleep(Duration::from_millis(30));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(rt.uptime(), Duration::ZERO);
        rt.start();
        assert!(wait_for(|| counter.load(Ordering::SeqCst) >= 3));
        assert!(wait_for(|| rt.timing().lock().get(&name).unwrap().iters() >= 3));
        assert_eq!(rt.is_finished(&name), Some(false));
    }

    #[test]
    fn test_once_finishes() {
        let rt = Runtime::default();
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let name = rt
            .spawn_once(
                &Task::new("dump", Kind::Service, Priority::Diagnostic),
                Duration::from_millis(10),
                move || {
                    c.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();
        rt.start();
        assert!(wait_for(|| rt.is_finished(&name) == Some(true)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(rt.timing().lock().get(&name).unwrap().iters(), 1);
        assert_eq!(rt.is_finished("Snothing"), None);
    }

    #[test]
    fn test_cancel_before_start() {
        let rt = Runtime::default();
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let name = rt
            .spawn_loop(
                &Task::new("gone", Kind::Program, Priority::Control),
                Duration::from_millis(5),
                move || {
                    c.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();
        assert!(rt.cancel(&name));
        assert!(!rt.cancel(&name));
        assert!(rt.tasks().is_empty());
        assert!(rt.timing().lock().get(&name).is_none());
        // the name is free again
        let name = rt
            .spawn_once(
                &Task::new("gone", Kind::Program, Priority::Control),
                Duration::ZERO,
                || {},
            )
            .unwrap();
        rt.start();
        assert!(!rt.cancel(&name));
        assert!(wait_for(|| rt.is_finished(&name) == Some(true)));
        sleep(Duration::from_millis(30));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_scheduler_validated() {
        assert!(Runtime::new(SchedulerConfig {
            realtime: true,
            rt_priority_base: 0,
        })
        .is_err());
        assert!(Runtime::new(SchedulerConfig {
            realtime: true,
            rt_priority_base: i32::MAX,
        })
        .is_err());
        assert!(Runtime::new(SchedulerConfig::default()).is_ok());
    }
}
