//! In-memory pump state, mutated by message handlers during decode.
//!
//! Plain status and settings live in public fields grouped by what reports
//! them. History loading goes through methods so the per-category
//! `Idle -> Loading -> Done` transitions stay consistent.

use crate::constants::*;
use crate::history::{HistoryCategory, HistoryRecord, HISTORY_CATEGORY_COUNT};
use crate::types::*;

/// Loading state of one history category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// No request outstanding.
    #[default]
    Idle,
    /// Request issued, records arriving.
    Loading,
    /// End-of-stream marker received.
    Done,
}

/// Bolus delivery state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BolusState {
    /// A bolus was accepted and has not finished.
    pub in_progress: bool,
    /// Requested amount in units.
    pub requested: f64,
    /// Delivered so far in units.
    pub delivered: f64,
    /// The pump reported the bolus stopped.
    pub stopped: bool,
    /// Result code of the last rejected bolus start.
    pub start_error_code: Option<u8>,
}

impl BolusState {
    /// Reset for a new bolus of `amount` units.
    pub fn begin(&mut self, amount: f64) {
        *self = BolusState {
            requested: amount,
            ..BolusState::default()
        };
    }
}

/// Result of the last set command the pump answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResult {
    /// Command code.
    pub command: u16,
    /// Raw result byte.
    pub code: u8,
    /// Whether the pump accepted the command.
    pub accepted: bool,
}

/// Hardware identification from the model check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModelInfo {
    /// Hardware model code.
    pub hw_model: u8,
    /// Protocol version.
    pub protocol: u8,
    /// Product code.
    pub product_code: u8,
}

/// Shipping information.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShippingInfo {
    /// Serial number.
    pub serial_number: String,
    /// Shipping date.
    pub shipping_date: PumpDateTime,
    /// Country code.
    pub country: String,
}

/// Bolus and basal configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BolusSettings {
    /// Bolus increment in units.
    pub bolus_step: f64,
    /// Basal increment in units per hour.
    pub basal_step: f64,
    /// Bolus calculator enabled.
    pub bolus_enabled: bool,
    /// Extended bolus enabled.
    pub extended_bolus_enabled: bool,
    /// Calculator enabled.
    pub calculator_enabled: bool,
    /// Melody time.
    pub melody_time: u8,
    /// Block time.
    pub block_time: u8,
    /// Up/down key configuration.
    pub config_ud: bool,
}

/// Device maxima.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MaxValues {
    /// Maximum single bolus in units.
    pub max_bolus: f64,
    /// Maximum basal rate in units per hour.
    pub max_basal: f64,
    /// Maximum daily total in units.
    pub max_daily_total: f64,
}

/// Current device status.
#[derive(Debug, Clone, PartialEq)]
pub struct PumpState {
    /// Hardware model, once checked.
    pub model: Option<ModelInfo>,
    /// Pump clock as last reported.
    pub pump_time: Option<PumpDateTime>,
    /// Pump password.
    pub password: u16,
    /// Raw option bytes from the connect sequence.
    pub options: [u8; 9],
    /// Shipping information.
    pub shipping: ShippingInfo,

    /// Glucose units.
    pub units: GlucoseUnits,
    /// Easy mode setting.
    pub easy_basal_mode: u8,
    /// Active basal profile number.
    pub active_profile: u8,
    /// All basal profiles.
    pub basal_profiles: [BasalProfile; BASAL_PROFILE_COUNT],
    /// Ratios in effect.
    pub current_ratios: ProfileRatios,
    /// Ratios per day period.
    pub period_ratios: PeriodRatios,
    /// Bolus and basal configuration.
    pub bolus_settings: BolusSettings,
    /// Device maxima.
    pub max_values: MaxValues,
    /// User options.
    pub user_options: UserOptions,

    /// Current basal rate in units per hour.
    pub current_basal: f64,
    /// Battery percentage.
    pub battery_remaining: u8,
    /// Reservoir contents in units.
    pub reservoir_remaining: f64,
    /// Insulin delivered today in units.
    pub daily_total: f64,
    /// Pump suspended.
    pub suspended: bool,
    /// Temporary basal.
    pub temp_basal: TempBasalStatus,
    /// Extended bolus.
    pub extended_bolus: ExtendedBolusStatus,
    /// Bolus delivery.
    pub bolus: BolusState,

    /// Last set-command result.
    pub last_command_result: Option<CommandResult>,
    /// Last non-zero device error.
    pub last_error: Option<PumpErrorCode>,

    history: Vec<HistoryRecord>,
    history_loads: [LoadState; HISTORY_CATEGORY_COUNT],
    active_history: Option<HistoryCategory>,
}

impl Default for PumpState {
    fn default() -> Self {
        PumpState {
            model: None,
            pump_time: None,
            password: 0,
            options: [0u8; 9],
            shipping: ShippingInfo::default(),
            units: GlucoseUnits::default(),
            easy_basal_mode: 0,
            active_profile: 0,
            basal_profiles: [BasalProfile::default(); BASAL_PROFILE_COUNT],
            current_ratios: ProfileRatios::default(),
            period_ratios: PeriodRatios::default(),
            bolus_settings: BolusSettings::default(),
            max_values: MaxValues::default(),
            user_options: UserOptions::default(),
            current_basal: 0.0,
            battery_remaining: 0,
            reservoir_remaining: 0.0,
            daily_total: 0.0,
            suspended: false,
            temp_basal: TempBasalStatus::default(),
            extended_bolus: ExtendedBolusStatus::default(),
            bolus: BolusState::default(),
            last_command_result: None,
            last_error: None,
            history: Vec::new(),
            history_loads: [LoadState::Idle; HISTORY_CATEGORY_COUNT],
            active_history: None,
        }
    }
}

impl PumpState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Basal profile currently active on the pump.
    pub fn active_basal_profile(&self) -> Option<&BasalProfile> {
        self.basal_profiles.get(self.active_profile as usize)
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Loading state of a category.
    pub fn history_state(&self, category: HistoryCategory) -> LoadState {
        self.history_loads[category.index()]
    }

    /// Whether the last batch of a category has completed.
    pub fn is_history_done(&self, category: HistoryCategory) -> bool {
        self.history_state(category) == LoadState::Done
    }

    /// Whether any category is waiting for records.
    pub fn is_any_history_loading(&self) -> bool {
        self.history_loads.iter().any(|s| *s == LoadState::Loading)
    }

    /// Clear the done flag and mark the request as the one on the wire.
    ///
    /// Called by whoever sends the history request, as it is released to
    /// the transport.
    pub fn begin_history_load(&mut self, category: HistoryCategory) {
        self.history_loads[category.index()] = LoadState::Loading;
        self.active_history = Some(category);
    }

    /// Category whose request was sent last and has not completed.
    pub fn active_history(&self) -> Option<HistoryCategory> {
        self.active_history
    }

    /// Return a category to idle, e.g. after the request was abandoned.
    pub fn reset_history(&mut self, category: HistoryCategory) {
        self.history_loads[category.index()] = LoadState::Idle;
        if self.active_history == Some(category) {
            self.active_history = None;
        }
    }

    /// Return every loading category to idle.
    pub fn abandon_history_loads(&mut self) -> Vec<HistoryCategory> {
        let mut abandoned = Vec::new();
        for category in HistoryCategory::ALL {
            if self.history_state(category) == LoadState::Loading {
                self.reset_history(category);
                abandoned.push(category);
            }
        }
        self.active_history = None;
        abandoned
    }

    /// Store a received record; its category is loading until its end marker.
    pub fn push_history_record(&mut self, record: HistoryRecord) {
        self.history_loads[record.category.index()] = LoadState::Loading;
        self.history.push(record);
    }

    /// Mark a category done. Returns false if it was already done.
    pub fn complete_history(&mut self, category: HistoryCategory) -> bool {
        if self.active_history == Some(category) {
            self.active_history = None;
        }
        let slot = &mut self.history_loads[category.index()];
        if *slot == LoadState::Done {
            return false;
        }
        *slot = LoadState::Done;
        true
    }

    /// Records received so far.
    pub fn history(&self) -> &[HistoryRecord] {
        &self.history
    }

    /// Remove and return the records received so far.
    pub fn take_history(&mut self) -> Vec<HistoryRecord> {
        std::mem::take(&mut self.history)
    }
}
