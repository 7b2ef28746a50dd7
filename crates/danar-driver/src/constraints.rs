//! Constraint pipeline.
//!
//! User-entered values pass through an ordered list of limiters before they
//! are placed into an outbound command. Limiters never fail; each clamps to
//! the nearest bound and records why.
//!
//! | Value            | Order                                                   |
//! |------------------|---------------------------------------------------------|
//! | carbs            | non-negative, hard max, configured max                  |
//! | bolus            | non-negative, configured max, device max, device step   |
//! | temp target      | hard range, configured range (each bound), high >= low, duration |
//! | temp basal       | percent range, duration range                           |
//! | extended bolus   | amount as bolus without step, duration range            |
//!
//! NaN clamps to the lower bound.

use std::fmt::Display;

use danar_protocol::PumpState;
use tracing::debug;

use crate::config::ConstraintConfig;

// ============================================================================
// Hard Limits
// ============================================================================

/// Largest carbohydrate entry regardless of configuration.
pub const HARD_MAX_CARBS_GRAMS: i32 = 250;
/// Highest temp basal percent the pump accepts.
pub const HARD_MAX_BASAL_PERCENT: i32 = 200;
/// Longest temp basal the pump accepts.
pub const HARD_MAX_TEMP_BASAL_HOURS: i32 = 24;
/// Temp target low bound range (mg/dL).
pub const HARD_TT_LOW_RANGE: (f64, f64) = (72.0, 180.0);
/// Temp target high bound range (mg/dL).
pub const HARD_TT_HIGH_RANGE: (f64, f64) = (72.0, 225.0);

// ============================================================================
// Constrained Values
// ============================================================================

/// A value after limiting, with the input and the limiters that changed it.
#[derive(Debug, Clone, PartialEq)]
pub struct Constrained<T> {
    /// Limited value.
    pub value: T,
    /// Value as entered.
    pub original: T,
    /// One entry per limiter that changed the value, in order.
    pub reasons: Vec<String>,
}

impl<T: Clone> Constrained<T> {
    /// Start from an unconstrained value.
    pub fn new(value: T) -> Self {
        Constrained {
            original: value.clone(),
            value,
            reasons: Vec::new(),
        }
    }
}

impl<T> Constrained<T> {
    /// Whether any limiter changed the value.
    pub fn was_constrained(&self) -> bool {
        !self.reasons.is_empty()
    }
}

impl<T: Copy + PartialOrd + Display> Constrained<T> {
    /// Raise the value to `min`. NaN counts as below.
    pub fn limit_min(&mut self, min: T, reason: &str) -> &mut Self {
        if !(self.value >= min) {
            self.record(min, reason);
        }
        self
    }

    /// Lower the value to `max`.
    pub fn limit_max(&mut self, max: T, reason: &str) -> &mut Self {
        if self.value > max {
            self.record(max, reason);
        }
        self
    }

    fn record(&mut self, value: T, reason: &str) {
        self.reasons
            .push(format!("{}: {} -> {}", reason, self.value, value));
        self.value = value;
    }
}

/// Requested temporary target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempTarget {
    /// Low bound in mg/dL.
    pub low_mgdl: f64,
    /// High bound in mg/dL.
    pub high_mgdl: f64,
    /// Duration in minutes.
    pub duration_min: u32,
}

/// Requested temporary basal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempBasalRequest {
    /// Percent of the profile rate.
    pub percent: u8,
    /// Duration in hours.
    pub duration_hours: u8,
}

/// Requested extended bolus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtendedBolusRequest {
    /// Amount in units.
    pub amount: f64,
    /// Duration in half hours.
    pub half_hours: u8,
}

/// Bolus limits reported by the pump.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceLimits {
    /// Largest single bolus, if known.
    pub max_bolus: Option<f64>,
    /// Bolus increment, if known.
    pub bolus_step: Option<f64>,
}

impl DeviceLimits {
    /// Read the limits from decoded pump state. Zero means not yet known.
    pub fn from_state(state: &PumpState) -> Self {
        let known = |v: f64| if v > 0.0 { Some(v) } else { None };
        DeviceLimits {
            max_bolus: known(state.max_values.max_bolus),
            bolus_step: known(state.bolus_settings.bolus_step),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Applies the configured limits in a fixed order.
#[derive(Debug, Clone, Default)]
pub struct ConstraintPipeline {
    config: ConstraintConfig,
}

impl ConstraintPipeline {
    /// Create a pipeline with the given limits.
    pub fn new(config: ConstraintConfig) -> Self {
        ConstraintPipeline { config }
    }

    /// Configured limits.
    pub fn config(&self) -> &ConstraintConfig {
        &self.config
    }

    /// Limit a carbohydrate entry in grams.
    pub fn apply_carbs(&self, grams: i32) -> Constrained<i32> {
        let mut c = Constrained::new(grams);
        c.limit_min(0, "carbs must not be negative")
            .limit_max(HARD_MAX_CARBS_GRAMS, "hard carbs limit")
            .limit_max(self.config.max_carbs_grams, "max carbs setting");
        log_constrained("carbs", &c);
        c
    }

    /// Limit a bolus amount in units.
    pub fn apply_bolus(&self, amount: f64, device: &DeviceLimits) -> Constrained<f64> {
        let mut c = self.limit_insulin(amount, device);
        if let Some(step) = device.bolus_step {
            let rounded = round_down(c.value, step);
            if (c.value - rounded).abs() > 1e-9 {
                c.record(rounded, "pump bolus step");
            }
        }
        log_constrained("bolus", &c);
        c
    }

    /// Limit a temporary target.
    pub fn apply_temp_target(&self, target: TempTarget) -> Constrained<TempTarget> {
        let cfg = &self.config;
        let mut low = Constrained::new(target.low_mgdl);
        low.limit_min(HARD_TT_LOW_RANGE.0, "hard temp target low minimum")
            .limit_max(HARD_TT_LOW_RANGE.1, "hard temp target low maximum")
            .limit_min(cfg.tt_low_min_mgdl, "temp target low minimum setting")
            .limit_max(cfg.tt_low_max_mgdl, "temp target low maximum setting");

        let mut high = Constrained::new(target.high_mgdl);
        high.limit_min(HARD_TT_HIGH_RANGE.0, "hard temp target high minimum")
            .limit_max(HARD_TT_HIGH_RANGE.1, "hard temp target high maximum")
            .limit_min(cfg.tt_high_min_mgdl, "temp target high minimum setting")
            .limit_max(cfg.tt_high_max_mgdl, "temp target high maximum setting")
            .limit_min(low.value, "temp target high below low");

        let mut duration = Constrained::new(target.duration_min);
        duration.limit_max(cfg.tt_max_duration_min, "temp target duration setting");

        let mut reasons = low.reasons;
        reasons.extend(high.reasons);
        reasons.extend(duration.reasons);
        let c = Constrained {
            value: TempTarget {
                low_mgdl: low.value,
                high_mgdl: high.value,
                duration_min: duration.value,
            },
            original: target,
            reasons,
        };
        if c.was_constrained() {
            debug!(reasons = ?c.reasons, "temp target constrained");
        }
        c
    }

    /// Limit a temporary basal.
    pub fn apply_temp_basal(&self, percent: i32, duration_hours: i32) -> Constrained<TempBasalRequest> {
        let mut p = Constrained::new(percent);
        p.limit_min(0, "temp basal percent must not be negative")
            .limit_max(HARD_MAX_BASAL_PERCENT, "pump temp basal maximum")
            .limit_max(self.config.max_basal_percent, "max basal percent setting");

        let mut h = Constrained::new(duration_hours);
        h.limit_min(1, "temp basal shorter than one hour")
            .limit_max(HARD_MAX_TEMP_BASAL_HOURS, "pump temp basal duration maximum")
            .limit_max(self.config.max_temp_basal_hours, "temp basal duration setting");

        let mut reasons = p.reasons;
        reasons.extend(h.reasons);
        let c = Constrained {
            value: TempBasalRequest {
                percent: clamp_u8(p.value),
                duration_hours: clamp_u8(h.value),
            },
            original: TempBasalRequest {
                percent: clamp_u8(percent),
                duration_hours: clamp_u8(duration_hours),
            },
            reasons,
        };
        if c.was_constrained() {
            debug!(reasons = ?c.reasons, "temp basal constrained");
        }
        c
    }

    /// Limit an extended bolus.
    pub fn apply_extended_bolus(
        &self,
        amount: f64,
        half_hours: i32,
        device: &DeviceLimits,
    ) -> Constrained<ExtendedBolusRequest> {
        let a = self.limit_insulin(amount, device);

        let mut h = Constrained::new(half_hours);
        h.limit_min(1, "extended bolus shorter than half an hour")
            .limit_max(self.config.max_extended_half_hours, "extended bolus duration setting");

        let mut reasons = a.reasons;
        reasons.extend(h.reasons);
        let c = Constrained {
            value: ExtendedBolusRequest {
                amount: a.value,
                half_hours: clamp_u8(h.value),
            },
            original: ExtendedBolusRequest {
                amount,
                half_hours: clamp_u8(half_hours),
            },
            reasons,
        };
        if c.was_constrained() {
            debug!(reasons = ?c.reasons, "extended bolus constrained");
        }
        c
    }

    fn limit_insulin(&self, amount: f64, device: &DeviceLimits) -> Constrained<f64> {
        let mut c = Constrained::new(amount);
        c.limit_min(0.0, "insulin must not be negative")
            .limit_max(self.config.max_bolus_units, "max bolus setting");
        if let Some(max) = device.max_bolus {
            c.limit_max(max, "pump max bolus");
        }
        c
    }
}

fn round_down(value: f64, step: f64) -> f64 {
    ((value / step) + 1e-9).floor() * step
}

fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, u8::MAX as i32) as u8
}

fn log_constrained<T: Display>(what: &str, c: &Constrained<T>) {
    if c.was_constrained() {
        debug!(
            original = %c.original,
            value = %c.value,
            reasons = ?c.reasons,
            "{} constrained",
            what
        );
    }
}
