use crate::interval::deserialize_interval;
use eva_common::{EResult, Error};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_VERSION: u16 = 1;

/// Highest Linux SCHED_RR priority
const RT_PRIORITY_MAX: i32 = 99;

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    version: u16,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            timing: <_>::default(),
            scheduler: <_>::default(),
        }
    }
}

fn default_control_period() -> Duration {
    Duration::from_millis(100)
}

fn default_settle() -> Duration {
    Duration::from_millis(30)
}

fn default_lockout() -> Duration {
    Duration::from_millis(500)
}

fn default_report_period() -> Duration {
    Duration::from_secs(1)
}

fn default_load_period() -> Duration {
    Duration::from_secs(1)
}

fn default_diagnostic_delay() -> Duration {
    Duration::from_secs(2)
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct TimingConfig {
    /// sampling, selection and control cadence
    #[serde(
        default = "default_control_period",
        deserialize_with = "deserialize_interval"
    )]
    pub control_period: Duration,
    /// button settle time before the confirming read
    #[serde(default = "default_settle", deserialize_with = "deserialize_interval")]
    pub settle: Duration,
    /// hold-off after an accepted press
    #[serde(default = "default_lockout", deserialize_with = "deserialize_interval")]
    pub lockout: Duration,
    #[serde(
        default = "default_report_period",
        deserialize_with = "deserialize_interval"
    )]
    pub report_period: Duration,
    #[serde(
        default = "default_load_period",
        deserialize_with = "deserialize_interval"
    )]
    pub load_period: Duration,
    /// delay before the one-shot execution time dump
    #[serde(
        default = "default_diagnostic_delay",
        deserialize_with = "deserialize_interval"
    )]
    pub diagnostic_delay: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            control_period: default_control_period(),
            settle: default_settle(),
            lockout: default_lockout(),
            report_period: default_report_period(),
            load_period: default_load_period(),
            diagnostic_delay: default_diagnostic_delay(),
        }
    }
}

fn default_rt_priority_base() -> i32 {
    10
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// switch task threads to SCHED_RR
    #[serde(default)]
    pub realtime: bool,
    #[serde(default = "default_rt_priority_base")]
    pub rt_priority_base: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            realtime: false,
            rt_priority_base: default_rt_priority_base(),
        }
    }
}

impl SchedulerConfig {
    /// Every task priority must fit into the SCHED_RR range
    pub fn validate(&self) -> EResult<()> {
        let base = self.rt_priority_base;
        let top = base.checked_add(i32::from(crate::tasks::Priority::Input.value()));
        if base < 1 || top.map_or(true, |top| top > RT_PRIORITY_MAX) {
            return Err(Error::invalid_params(format!(
                "invalid rt priority base: {}",
                base
            )));
        }
        Ok(())
    }
}

impl Config {
    pub fn from_yaml(s: &str) -> EResult<Self> {
        let config: Config = serde_yaml::from_str(s).map_err(Error::invalid_data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> EResult<Self> {
        let s = fs::read_to_string(path)?;
        Self::from_yaml(&s)
    }

    pub fn validate(&self) -> EResult<()> {
        if self.version != CONFIG_VERSION {
            return Err(Error::unsupported(format!(
                "config version not supported: {}",
                self.version
            )));
        }
        let t = &self.timing;
        for (name, value) in [
            ("control_period", t.control_period),
            ("settle", t.settle),
            ("lockout", t.lockout),
            ("report_period", t.report_period),
            ("load_period", t.load_period),
        ] {
            if value.is_zero() {
                return Err(Error::invalid_params(format!("{} must be non-zero", name)));
            }
        }
        self.scheduler.validate()
    }
}
