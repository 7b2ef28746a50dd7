//! Common types used in the protocol.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::constants::*;

/// A calendar timestamp as transmitted by the pump.
///
/// Components are kept exactly as decoded. The pump does not validate its
/// own clock, so a field may hold an impossible value (month 0, hour 25);
/// use [`PumpDateTime::to_naive`] to get a checked timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PumpDateTime {
    /// Full year (2000 + the transmitted two-digit year).
    pub year: u16,
    /// Month, 1-based.
    pub month: u8,
    /// Day of month, 1-based.
    pub day: u8,
    /// Hour of day.
    pub hour: u8,
    /// Minute.
    pub minute: u8,
    /// Second.
    pub second: u8,
}

impl PumpDateTime {
    /// Create a timestamp from its components.
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        PumpDateTime {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// Create a date-only timestamp (midnight).
    pub fn date(year: u16, month: u8, day: u8) -> Self {
        PumpDateTime::new(year, month, day, 0, 0, 0)
    }

    /// Convert to a chrono timestamp. Returns None for impossible values.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)?.and_hms_opt(
            self.hour as u32,
            self.minute as u32,
            self.second as u32,
        )
    }
}

impl From<NaiveDateTime> for PumpDateTime {
    fn from(dt: NaiveDateTime) -> Self {
        PumpDateTime {
            year: dt.year().clamp(0, u16::MAX as i32) as u16,
            month: dt.month() as u8,
            day: dt.day() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
        }
    }
}

impl std::fmt::Display for PumpDateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Glucose units configured on the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GlucoseUnits {
    /// mg/dL.
    #[default]
    MgDl,
    /// mmol/L.
    MmolL,
}

impl From<u8> for GlucoseUnits {
    fn from(value: u8) -> Self {
        match value {
            1 => GlucoseUnits::MmolL,
            _ => GlucoseUnits::MgDl,
        }
    }
}

impl From<GlucoseUnits> for u8 {
    fn from(units: GlucoseUnits) -> Self {
        match units {
            GlucoseUnits::MgDl => 0,
            GlucoseUnits::MmolL => 1,
        }
    }
}

/// 24 hourly basal rates in units per hour.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BasalProfile(pub [f64; BASAL_PROFILE_ENTRIES]);

impl BasalProfile {
    /// Create a profile from hourly rates.
    pub fn new(rates: [f64; BASAL_PROFILE_ENTRIES]) -> Self {
        BasalProfile(rates)
    }

    /// Create a profile with the same rate for every hour.
    pub fn flat(rate: f64) -> Self {
        BasalProfile([rate; BASAL_PROFILE_ENTRIES])
    }

    /// Rate for the given hour (0-23).
    pub fn rate_at(&self, hour: usize) -> Option<f64> {
        self.0.get(hour).copied()
    }

    /// Sum of all hourly rates.
    pub fn daily_total(&self) -> f64 {
        self.0.iter().sum()
    }
}

/// User options block (read with 0x320B, written with 0x330B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserOptions {
    /// 24-hour clock display.
    pub time_display_24h: bool,
    /// Button scroll enabled.
    pub button_scroll: bool,
    /// Beep and alarm mode (1 sound, 2 vibrate, 3 both).
    pub beep_and_alarm: u8,
    /// LCD on time in seconds.
    pub lcd_on_secs: u8,
    /// Backlight on time in seconds.
    pub backlight_on_secs: u8,
    /// Menu language.
    pub language: u8,
    /// Glucose units.
    pub units: GlucoseUnits,
    /// Auto-shutdown after this many hours without interaction.
    pub shutdown_hours: u8,
    /// Low reservoir warning level in units.
    pub low_reservoir_warning: u8,
}

/// Size of the user options block on the wire.
pub const USER_OPTIONS_SIZE: usize = 9;

/// Calculator ratios currently in effect.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProfileRatios {
    /// Carbohydrate-to-insulin ratio (g/U).
    pub cir: f64,
    /// Correction factor (glucose units per U).
    pub cf: f64,
    /// Active insulin time in hours.
    pub active_insulin_hours: f64,
    /// Glucose target.
    pub target: f64,
}

/// CIR and CF pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CirCf {
    /// Carbohydrate-to-insulin ratio.
    pub cir: f64,
    /// Correction factor.
    pub cf: f64,
}

/// Ratios for the four day periods.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PeriodRatios {
    /// 06:00 - 11:00.
    pub morning: CirCf,
    /// 11:00 - 17:00.
    pub afternoon: CirCf,
    /// 17:00 - 22:00.
    pub evening: CirCf,
    /// 22:00 - 06:00.
    pub night: CirCf,
}

/// Temporary basal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TempBasalStatus {
    /// Whether a temporary basal is running.
    pub in_progress: bool,
    /// Rate as percent of the profile basal.
    pub percent: u16,
    /// Programmed duration in seconds.
    pub total_secs: u32,
    /// Seconds since the temporary basal started.
    pub running_secs: u32,
}

impl TempBasalStatus {
    /// Seconds left on the temporary basal.
    pub fn remaining_secs(&self) -> u32 {
        self.total_secs.saturating_sub(self.running_secs)
    }
}

/// Extended bolus status.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExtendedBolusStatus {
    /// Whether an extended bolus is running.
    pub in_progress: bool,
    /// Programmed duration in half hours.
    pub half_hours: u8,
    /// Programmed amount in units.
    pub amount: f64,
    /// Seconds since the extended bolus started.
    pub elapsed_secs: u32,
}

impl ExtendedBolusStatus {
    /// Programmed duration in minutes.
    pub fn duration_minutes(&self) -> u32 {
        self.half_hours as u32 * 30
    }

    /// Delivery rate in units per hour.
    pub fn rate_per_hour(&self) -> f64 {
        if self.half_hours == 0 {
            0.0
        } else {
            self.amount / (self.half_hours as f64 / 2.0)
        }
    }
}

/// Errors reported by the pump through the system status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpErrorCode {
    /// Generic pump error (codes 1-3).
    PumpError(u8),
    /// Pump shut down.
    Shutdown,
    /// Occlusion detected.
    Occlusion,
    /// Battery low.
    LowBattery,
    /// Battery discharged.
    BatteryDischarged,
    /// Unknown error code.
    Unknown(u8),
}

impl PumpErrorCode {
    /// Whether this error halts a running bolus.
    pub fn stops_bolus(&self) -> bool {
        u8::from(*self) < 8
    }
}

impl std::fmt::Display for PumpErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PumpErrorCode::PumpError(code) => write!(f, "pump error {}", code),
            PumpErrorCode::Shutdown => write!(f, "pump shutdown"),
            PumpErrorCode::Occlusion => write!(f, "occlusion"),
            PumpErrorCode::LowBattery => write!(f, "low battery"),
            PumpErrorCode::BatteryDischarged => write!(f, "battery discharged"),
            PumpErrorCode::Unknown(code) => write!(f, "unknown error (0x{:02X})", code),
        }
    }
}

impl From<u8> for PumpErrorCode {
    fn from(code: u8) -> Self {
        match code {
            1..=3 => PumpErrorCode::PumpError(code),
            4 => PumpErrorCode::Shutdown,
            5 => PumpErrorCode::Occlusion,
            7 => PumpErrorCode::LowBattery,
            8 => PumpErrorCode::BatteryDischarged,
            _ => PumpErrorCode::Unknown(code),
        }
    }
}

impl From<PumpErrorCode> for u8 {
    fn from(code: PumpErrorCode) -> Self {
        match code {
            PumpErrorCode::PumpError(code) => code,
            PumpErrorCode::Shutdown => 4,
            PumpErrorCode::Occlusion => 5,
            PumpErrorCode::LowBattery => 7,
            PumpErrorCode::BatteryDischarged => 8,
            PumpErrorCode::Unknown(code) => code,
        }
    }
}
