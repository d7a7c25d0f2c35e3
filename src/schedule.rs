// src/schedule.rs
//
// Operating-hours gate for the detection pipeline. Outside the window the
// per-frame pipeline is skipped entirely (night-mode cost saving, not a
// correctness rule), so the check must be cheap and re-evaluated every frame.

use crate::types::ScheduleConfig;
use anyhow::{Context, Result};
use chrono::{Duration, NaiveTime, Utc};

/// Time-of-day window during which detection is active.
#[derive(Debug, Clone, Copy)]
pub struct OperatingWindow {
    start: NaiveTime,
    end: NaiveTime,
    utc_offset_hours: i32,
}

impl OperatingWindow {
    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        let start = parse_hhmm(&config.start)
            .with_context(|| format!("invalid schedule start '{}'", config.start))?;
        let end = parse_hhmm(&config.end)
            .with_context(|| format!("invalid schedule end '{}'", config.end))?;
        Ok(Self {
            start,
            end,
            utc_offset_hours: config.utc_offset_hours,
        })
    }

    /// Current time of day in the camera's timezone. Callers pass this to
    /// `contains`, which keeps the window evaluable at any chosen instant.
    pub fn local_now(&self) -> NaiveTime {
        (Utc::now() + Duration::hours(self.utc_offset_hours as i64)).time()
    }

    /// Inclusive bounds. A window with end < start wraps across midnight.
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= t && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }
}

fn parse_hhmm(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(Into::into)
}
