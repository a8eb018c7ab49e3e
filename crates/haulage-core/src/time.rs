//! Simulated time and deterministic fixed-point helpers.
//!
//! The engine never reads a wall clock. Every instant is a [`SimTime`]
//! supplied by the simulation driver, measured in whole seconds since the
//! simulation epoch. Fractional hours (unload durations, configured travel
//! times) are computed in Q32.32 fixed point so that results are identical
//! on every platform.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 3_600;

// ---------------------------------------------------------------------------
// SimDuration
// ---------------------------------------------------------------------------

/// A span of simulated time in whole seconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SimDuration(pub u64);

impl SimDuration {
    pub const ZERO: SimDuration = SimDuration(0);

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub const fn from_minutes(minutes: u64) -> Self {
        Self(minutes.saturating_mul(SECS_PER_MINUTE))
    }

    pub const fn from_hours(hours: u64) -> Self {
        Self(hours.saturating_mul(SECS_PER_HOUR))
    }

    /// Convert fractional hours to a duration, rounded to the nearest second.
    /// Negative values clamp to zero; values beyond the fixed-point range saturate.
    pub fn from_fractional_hours(hours: Fixed64) -> Self {
        let hours = hours.max(Fixed64::ZERO);
        let secs = hours
            .saturating_mul(Fixed64::from_num(SECS_PER_HOUR))
            .saturating_round();
        Self(secs.to_num::<u64>())
    }

    pub const fn as_secs(self) -> u64 {
        self.0
    }

    /// The duration in fractional hours. Saturates for spans beyond ~2^31 hours.
    pub fn as_hours(self) -> Fixed64 {
        Fixed64::saturating_from_num(self.0) / Fixed64::from_num(SECS_PER_HOUR)
    }

    pub const fn saturating_add(self, other: SimDuration) -> SimDuration {
        SimDuration(self.0.saturating_add(other.0))
    }
}

impl Add for SimDuration {
    type Output = SimDuration;

    fn add(self, rhs: SimDuration) -> SimDuration {
        self.saturating_add(rhs)
    }
}

impl AddAssign for SimDuration {
    fn add_assign(&mut self, rhs: SimDuration) {
        *self = self.saturating_add(rhs);
    }
}

impl fmt::Display for SimDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / SECS_PER_HOUR;
        let minutes = (self.0 % SECS_PER_HOUR) / SECS_PER_MINUTE;
        let secs = self.0 % SECS_PER_MINUTE;
        if secs == 0 {
            write!(f, "{hours}h{minutes:02}m")
        } else {
            write!(f, "{hours}h{minutes:02}m{secs:02}s")
        }
    }
}

// ---------------------------------------------------------------------------
// SimTime
// ---------------------------------------------------------------------------

/// An instant on the simulation clock, in whole seconds since the epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SimTime(pub u64);

impl SimTime {
    /// Start of simulated time. Trucks never dispatched are free from here.
    pub const EPOCH: SimTime = SimTime(0);

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub const fn from_minutes(minutes: u64) -> Self {
        Self(minutes.saturating_mul(SECS_PER_MINUTE))
    }

    pub const fn from_hours(hours: u64) -> Self {
        Self(hours.saturating_mul(SECS_PER_HOUR))
    }

    pub const fn as_secs(self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is in the future.
    pub const fn saturating_since(self, earlier: SimTime) -> SimDuration {
        SimDuration(self.0.saturating_sub(earlier.0))
    }
}

impl Add<SimDuration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimDuration) -> SimTime {
        SimTime(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign<SimDuration> for SimTime {
    fn add_assign(&mut self, rhs: SimDuration) {
        *self = *self + rhs;
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T+{}", SimDuration(self.0))
    }
}

// ---------------------------------------------------------------------------
// f64 conversion (configuration and display only)
// ---------------------------------------------------------------------------

/// Convert an f64 to Fixed64. Use only when loading configuration.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::saturating_from_num(v)
}

/// Convert Fixed64 to f64. Use only for display and export.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}
