use crate::tasks;
use eva_common::{EResult, Error};
use log::warn;
use serde::{Deserialize, Deserializer};
use std::cmp::Ordering;
use std::time::{Duration, Instant};

/// Delay-until cadence of a periodic task
pub struct Loop {
    next_iter: Instant,
    interval: Duration,
    overruns: u64,
}

#[negative_impl::negative_impl]
impl !Send for Loop {}

impl Loop {
    pub fn prepare(interval: Duration) -> Self {
        Self::prepare_at(Instant::now(), interval)
    }
    /// Starts the cadence at a common release instant
    pub fn prepare_at(start: Instant, interval: Duration) -> Self {
        Loop {
            next_iter: start + interval,
            interval,
            overruns: 0,
        }
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[inline]
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Sleeps until the next period boundary. Returns false if the boundary has already
    /// been missed, in this case the cadence is re-based on the current time
    pub fn tick(&mut self) -> bool {
        let t = Instant::now();
        let result = match t.cmp(&self.next_iter) {
            Ordering::Greater => false,
            Ordering::Equal => true,
            Ordering::Less => {
                tasks::sleep(self.next_iter - t);
                true
            }
        };
        if result {
            self.next_iter += self.interval;
        } else {
            let late = t - self.next_iter;
            self.next_iter = Instant::now() + self.interval;
            self.overruns += 1;
            warn!(
                "{} loop timeout ({:?} + {:?})",
                tasks::thread_name(),
                self.interval,
                late
            );
        }
        result
    }
}

pub(crate) fn parse_interval(s: &str) -> EResult<u64> {
    let (v, mul) = if let Some(v) = s.strip_suffix("ms") {
        (v, 1_000_000)
    } else if let Some(v) = s.strip_suffix("us") {
        (v, 1_000)
    } else if let Some(v) = s.strip_suffix("ns") {
        (v, 1)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, 1_000_000_000)
    } else {
        (s, 1_000_000_000)
    };
    v.parse::<u64>()?
        .checked_mul(mul)
        .ok_or_else(|| Error::invalid_params("interval overflow"))
}

pub fn parse_duration(s: &str) -> EResult<Duration> {
    parse_interval(s.trim())
        .map(Duration::from_nanos)
        .map_err(|e| Error::invalid_params(format!("invalid interval {}: {}", s, e)))
}

#[inline]
pub(crate) fn deserialize_interval<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let buf = String::deserialize(deserializer)?;
    parse_duration(&buf).map_err(serde::de::Error::custom)
}
