//! Inbound message handlers.
//!
//! Each command code the pump sends has one [`Handler`] variant. Decoding
//! reads every field of the payload first and only then writes the result
//! into [`PumpState`], so a failed decode never leaves a half-updated state.

use crate::codec::PayloadReader;
use crate::constants::*;
use crate::error::*;
use crate::events::PumpEvent;
use crate::history::{decode_record, HistoryCategory};
use crate::state::{CommandResult, LoadState, MaxValues, ModelInfo, PumpState, ShippingInfo};
use crate::types::*;

/// Decodes one inbound message into pump state.
pub trait MessageHandler: Send + Sync + std::fmt::Debug {
    /// Command code this handler decodes.
    fn command(&self) -> u16;

    /// Human-readable message name.
    fn name(&self) -> &'static str;

    /// Smallest payload the decoder accepts.
    fn min_payload_len(&self) -> usize;

    /// Decode a payload of at least [`MessageHandler::min_payload_len`]
    /// bytes. Trailing bytes are ignored.
    fn decode(&self, payload: &[u8], state: &mut PumpState)
        -> ProtocolResult<Option<PumpEvent>>;
}

/// Handler for codes nobody registered. Decodes nothing and touches nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl MessageHandler for NoopHandler {
    fn command(&self) -> u16 {
        0
    }

    fn name(&self) -> &'static str {
        "unknown"
    }

    fn min_payload_len(&self) -> usize {
        0
    }

    fn decode(&self, _payload: &[u8], _state: &mut PumpState) -> ProtocolResult<Option<PumpEvent>> {
        Ok(None)
    }
}

/// Built-in handlers, one per inbound command code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handler {
    // Bolus
    BolusStop,
    BolusStart,
    BolusStartWithSpeed,
    BolusProgress,

    // Status
    StatusProfile,
    StatusTempBasal,
    StatusBolusExtended,
    StatusBasic,
    Status,

    // Connect sequence
    InitConnStatusTime,
    InitConnStatusBolus,
    InitConnStatusBasic,
    InitConnStatusOption,

    // Set command results
    SetTempBasalStart,
    SetCarbsEntry,
    SetTempBasalStop,
    SetExtendedBolusStop,
    SetExtendedBolusStart,
    SetSingleBasalProfile,
    SetBasalProfile,
    SetUserOptions,
    SetActivateBasalProfile,

    Error,
    PcCommStart,
    PcCommStop,

    // History
    History(HistoryCategory),
    HistoryDone,
    HistoryAllDone,
    HistoryNewDone,

    // Settings
    SettingBasal,
    SettingMeal,
    SettingProfileRatios,
    SettingMaxValues,
    SettingBasalProfileAll,
    SettingShippingInfo,
    SettingGlucose,
    SettingPumpTime,
    SettingUserOptions,
    SettingActiveProfile,
    SettingProfileRatiosAll,

    CheckValue,
}

impl Handler {
    /// Every built-in handler.
    pub fn all() -> Vec<Handler> {
        let mut handlers = vec![
            Handler::BolusStop,
            Handler::BolusStart,
            Handler::BolusStartWithSpeed,
            Handler::BolusProgress,
            Handler::StatusProfile,
            Handler::StatusTempBasal,
            Handler::StatusBolusExtended,
            Handler::StatusBasic,
            Handler::Status,
            Handler::InitConnStatusTime,
            Handler::InitConnStatusBolus,
            Handler::InitConnStatusBasic,
            Handler::InitConnStatusOption,
            Handler::SetTempBasalStart,
            Handler::SetCarbsEntry,
            Handler::SetTempBasalStop,
            Handler::SetExtendedBolusStop,
            Handler::SetExtendedBolusStart,
            Handler::SetSingleBasalProfile,
            Handler::SetBasalProfile,
            Handler::SetUserOptions,
            Handler::SetActivateBasalProfile,
            Handler::Error,
            Handler::PcCommStart,
            Handler::PcCommStop,
            Handler::HistoryDone,
            Handler::HistoryAllDone,
            Handler::HistoryNewDone,
            Handler::SettingBasal,
            Handler::SettingMeal,
            Handler::SettingProfileRatios,
            Handler::SettingMaxValues,
            Handler::SettingBasalProfileAll,
            Handler::SettingShippingInfo,
            Handler::SettingGlucose,
            Handler::SettingPumpTime,
            Handler::SettingUserOptions,
            Handler::SettingActiveProfile,
            Handler::SettingProfileRatiosAll,
            Handler::CheckValue,
        ];
        handlers.extend(HistoryCategory::ALL.iter().copied().map(Handler::History));
        handlers
    }

    /// Result byte that means the command was accepted, for set commands.
    fn accepted_result(&self) -> Option<u8> {
        match self {
            Handler::BolusStart | Handler::BolusStartWithSpeed => Some(RESULT_BOLUS_ACCEPTED),
            Handler::SetTempBasalStart
            | Handler::SetCarbsEntry
            | Handler::SetTempBasalStop
            | Handler::SetExtendedBolusStop
            | Handler::SetExtendedBolusStart
            | Handler::SetSingleBasalProfile
            | Handler::SetBasalProfile
            | Handler::SetUserOptions
            | Handler::SetActivateBasalProfile => Some(RESULT_ACCEPTED),
            _ => None,
        }
    }
}

impl MessageHandler for Handler {
    fn command(&self) -> u16 {
        match self {
            Handler::BolusStop => CMD_MEALINS_STOP,
            Handler::BolusStart => CMD_MEALINS_START_DATA,
            Handler::BolusStartWithSpeed => CMD_MEALINS_START_DATA_SPEED,
            Handler::BolusProgress => CMD_PUMP_THIS_REMAINDER_MEAL_INS,
            Handler::StatusProfile => CMD_PUMP_CALCULATION_SETTING,
            Handler::StatusTempBasal => CMD_PUMP_EXERCISE_MODE,
            Handler::StatusBolusExtended => CMD_PUMP_EXPANS_INS_I,
            Handler::StatusBasic => CMD_PUMP_INITVIEW_I,
            Handler::Status => CMD_PUMP_STATUS,
            Handler::InitConnStatusTime => CMD_PUMPINIT_TIME_INFO,
            Handler::InitConnStatusBolus => CMD_PUMPINIT_BOLUS_INFO,
            Handler::InitConnStatusBasic => CMD_PUMPINIT_INIT_INFO,
            Handler::InitConnStatusOption => CMD_PUMPINIT_OPTION,
            Handler::SetTempBasalStart => CMD_PUMPSET_EXERCISE_S,
            Handler::SetCarbsEntry => CMD_PUMPSET_HIS_S,
            Handler::SetTempBasalStop => CMD_PUMPSET_EXERCISE_STOP,
            Handler::SetExtendedBolusStop => CMD_PUMPSET_EXPANS_INS_STOP,
            Handler::SetExtendedBolusStart => CMD_PUMPSET_EXPANS_INS_S,
            Handler::SetSingleBasalProfile => CMD_SETTING_BASAL_INS_S,
            Handler::SetBasalProfile => CMD_SETTING_BASAL_PROFILE_S,
            Handler::SetUserOptions => CMD_SETTING_USER_OPTIONS_S,
            Handler::SetActivateBasalProfile => CMD_SETTING_PROFILE_NUMBER_S,
            Handler::Error => CMD_PUMPOWAY_SYSTEM_STATUS,
            Handler::PcCommStart => CMD_CONNECT,
            Handler::PcCommStop => CMD_DISCONNECT,
            Handler::History(category) => category.command(),
            Handler::HistoryDone => CMD_HISTORY_DONE,
            Handler::HistoryAllDone => CMD_HISTORY_ALL_DONE,
            Handler::HistoryNewDone => CMD_HISTORY_NEW_DONE,
            Handler::SettingBasal => CMD_SETTING_V_BASAL_INS_I,
            Handler::SettingMeal => CMD_SETTING_V_MEAL_SETTING_I,
            Handler::SettingProfileRatios => CMD_SETTING_V_CCC_I,
            Handler::SettingMaxValues => CMD_SETTING_V_MAX_VALUE_I,
            Handler::SettingBasalProfileAll => CMD_SETTING_V_BASAL_PROFILE_ALL,
            Handler::SettingShippingInfo => CMD_SETTING_V_SHIPPING_I,
            Handler::SettingGlucose => CMD_SETTING_V_GLUCOSE_AND_EASY,
            Handler::SettingPumpTime => CMD_SETTING_V_TIME_I,
            Handler::SettingUserOptions => CMD_SETTING_V_USER_OPTIONS,
            Handler::SettingActiveProfile => CMD_SETTING_V_PROFILE_NUMBER,
            Handler::SettingProfileRatiosAll => CMD_SETTING_V_CIR_CF_VALUE,
            Handler::CheckValue => CMD_PUMP_CHECK_VALUE,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Handler::BolusStop => "bolus_stop",
            Handler::BolusStart => "bolus_start",
            Handler::BolusStartWithSpeed => "bolus_start_with_speed",
            Handler::BolusProgress => "bolus_progress",
            Handler::StatusProfile => "status_profile",
            Handler::StatusTempBasal => "status_temp_basal",
            Handler::StatusBolusExtended => "status_bolus_extended",
            Handler::StatusBasic => "status_basic",
            Handler::Status => "status",
            Handler::InitConnStatusTime => "init_conn_status_time",
            Handler::InitConnStatusBolus => "init_conn_status_bolus",
            Handler::InitConnStatusBasic => "init_conn_status_basic",
            Handler::InitConnStatusOption => "init_conn_status_option",
            Handler::SetTempBasalStart => "set_temp_basal_start",
            Handler::SetCarbsEntry => "set_carbs_entry",
            Handler::SetTempBasalStop => "set_temp_basal_stop",
            Handler::SetExtendedBolusStop => "set_extended_bolus_stop",
            Handler::SetExtendedBolusStart => "set_extended_bolus_start",
            Handler::SetSingleBasalProfile => "set_single_basal_profile",
            Handler::SetBasalProfile => "set_basal_profile",
            Handler::SetUserOptions => "set_user_options",
            Handler::SetActivateBasalProfile => "set_activate_basal_profile",
            Handler::Error => "error",
            Handler::PcCommStart => "pc_comm_start",
            Handler::PcCommStop => "pc_comm_stop",
            Handler::History(HistoryCategory::Bolus) => "history_bolus",
            Handler::History(HistoryCategory::DailyInsulin) => "history_daily_insulin",
            Handler::History(HistoryCategory::Glucose) => "history_glucose",
            Handler::History(HistoryCategory::Alarm) => "history_alarm",
            Handler::History(HistoryCategory::Error) => "history_error",
            Handler::History(HistoryCategory::Carbohydrate) => "history_carbohydrate",
            Handler::History(HistoryCategory::Refill) => "history_refill",
            Handler::History(HistoryCategory::Suspend) => "history_suspend",
            Handler::History(HistoryCategory::BasalHour) => "history_basal_hour",
            Handler::History(HistoryCategory::All) => "history_all",
            Handler::History(HistoryCategory::New) => "history_new",
            Handler::History(HistoryCategory::Events) => "history_events",
            Handler::HistoryDone => "history_done",
            Handler::HistoryAllDone => "history_all_done",
            Handler::HistoryNewDone => "history_new_done",
            Handler::SettingBasal => "setting_basal",
            Handler::SettingMeal => "setting_meal",
            Handler::SettingProfileRatios => "setting_profile_ratios",
            Handler::SettingMaxValues => "setting_max_values",
            Handler::SettingBasalProfileAll => "setting_basal_profile_all",
            Handler::SettingShippingInfo => "setting_shipping_info",
            Handler::SettingGlucose => "setting_glucose",
            Handler::SettingPumpTime => "setting_pump_time",
            Handler::SettingUserOptions => "setting_user_options",
            Handler::SettingActiveProfile => "setting_active_profile",
            Handler::SettingProfileRatiosAll => "setting_profile_ratios_all",
            Handler::CheckValue => "check_value",
        }
    }

    fn min_payload_len(&self) -> usize {
        match self {
            Handler::BolusStop
            | Handler::PcCommStart
            | Handler::PcCommStop
            | Handler::HistoryDone
            | Handler::HistoryAllDone
            | Handler::HistoryNewDone => 0,
            Handler::BolusStart
            | Handler::BolusStartWithSpeed
            | Handler::SetTempBasalStart
            | Handler::SetCarbsEntry
            | Handler::SetTempBasalStop
            | Handler::SetExtendedBolusStop
            | Handler::SetExtendedBolusStart
            | Handler::SetSingleBasalProfile
            | Handler::SetBasalProfile
            | Handler::SetUserOptions
            | Handler::SetActivateBasalProfile
            | Handler::Error
            | Handler::SettingActiveProfile => 1,
            // Only the record code is needed to spot the end marker
            Handler::History(_) => 1,
            Handler::BolusProgress | Handler::SettingGlucose => 2,
            Handler::CheckValue => 3,
            Handler::InitConnStatusBolus => 4,
            Handler::StatusTempBasal
            | Handler::InitConnStatusTime
            | Handler::SettingMeal
            | Handler::SettingMaxValues
            | Handler::SettingPumpTime => 6,
            Handler::StatusBolusExtended => 7,
            Handler::StatusProfile | Handler::Status | Handler::SettingProfileRatios => 8,
            Handler::SettingUserOptions => USER_OPTIONS_SIZE,
            Handler::InitConnStatusBasic => 10,
            Handler::StatusBasic | Handler::InitConnStatusOption => 11,
            Handler::SettingShippingInfo => 16,
            Handler::SettingProfileRatiosAll => 16,
            Handler::SettingBasal => BASAL_PROFILE_ENTRIES * 2,
            Handler::SettingBasalProfileAll => BASAL_PROFILE_COUNT * (1 + BASAL_PROFILE_ENTRIES * 2),
        }
    }

    fn decode(&self, payload: &[u8], state: &mut PumpState) -> ProtocolResult<Option<PumpEvent>> {
        let r = PayloadReader::new(self.command(), payload);
        r.require(self.min_payload_len())?;

        if let Some(accepted) = self.accepted_result() {
            return decode_command_result(*self, accepted, &r, state);
        }

        match self {
            Handler::BolusStop => {
                log::debug!("bolus stopped after {:.2} U", state.bolus.delivered);
                state.bolus.stopped = true;
                state.bolus.in_progress = false;
                Ok(Some(PumpEvent::BolusStopped {
                    delivered: state.bolus.delivered,
                }))
            }

            Handler::BolusProgress => {
                let remaining = r.read_hundredths_at(0)?;
                let delivered = (state.bolus.requested - remaining).max(0.0);
                state.bolus.delivered = delivered;
                log::trace!("bolus delivered {:.2} U, remaining {:.2} U", delivered, remaining);
                Ok(Some(PumpEvent::BolusProgress {
                    delivered,
                    remaining,
                }))
            }

            Handler::StatusProfile | Handler::SettingProfileRatios => {
                let cir = r.read_u16_at(0)? as f64;
                let cf = r.read_u16_at(2)? as f64;
                let active_insulin_hours = r.read_hundredths_at(4)?;
                let target = r.read_u16_at(6)? as f64;
                let scale = glucose_scale(state.units);
                state.current_ratios = ProfileRatios {
                    cir,
                    cf: cf / scale,
                    active_insulin_hours,
                    target: target / scale,
                };
                log::debug!("{}: {:?}", self.name(), state.current_ratios);
                Ok(None)
            }

            Handler::StatusTempBasal => {
                let in_progress = r.read_u8_at(0)? & 0x01 != 0;
                let raw_percent = r.read_u8_at(1)?;
                let duration_code = r.read_u8_at(2)?;
                let running_secs = r.read_u24_at(3)?;
                let percent = if raw_percent > 200 {
                    (raw_percent as u16 - 200) * 10
                } else {
                    raw_percent as u16
                };
                let total_secs = match duration_code {
                    150 => 15 * 60,
                    160 => 30 * 60,
                    hours => hours as u32 * 3600,
                };
                state.temp_basal = TempBasalStatus {
                    in_progress,
                    percent,
                    total_secs,
                    running_secs,
                };
                log::debug!("temp basal: {:?}", state.temp_basal);
                Ok(None)
            }

            Handler::StatusBolusExtended => {
                state.extended_bolus = ExtendedBolusStatus {
                    in_progress: r.read_flag_at(0)?,
                    half_hours: r.read_u8_at(1)?,
                    amount: r.read_hundredths_at(2)?,
                    elapsed_secs: r.read_u24_at(4)?,
                };
                log::debug!("extended bolus: {:?}", state.extended_bolus);
                Ok(None)
            }

            Handler::StatusBasic => {
                let current_basal = r.read_hundredths_at(0)?;
                let battery = r.read_u8_at(2)?;
                let reservoir = r.read_insulin_counts_at(3)?;
                let daily_total = r.read_insulin_counts_at(6)?;
                let max_daily = r.read_hundredths_at(9)?;
                state.current_basal = current_basal;
                state.battery_remaining = battery;
                state.reservoir_remaining = reservoir;
                state.daily_total = daily_total;
                state.max_values.max_daily_total = max_daily;
                log::debug!(
                    "basal {:.2} U/h, battery {}%, reservoir {:.2} U, daily {:.2} U",
                    current_basal,
                    battery,
                    reservoir,
                    daily_total
                );
                Ok(None)
            }

            Handler::Status => {
                let daily_total = r.read_insulin_counts_at(0)?;
                let extended_in_progress = r.read_flag_at(3)?;
                let extended_minutes = r.read_u16_at(4)?;
                let extended_amount = r.read_hundredths_at(6)?;
                state.daily_total = daily_total;
                state.extended_bolus.in_progress = extended_in_progress;
                state.extended_bolus.half_hours = (extended_minutes / 30).min(u8::MAX as u16) as u8;
                state.extended_bolus.amount = extended_amount;
                Ok(None)
            }

            Handler::InitConnStatusTime => {
                let time = r.read_datetime_sec_at(0)?;
                log::debug!("pump time {}", time);
                state.pump_time = Some(time);
                Ok(None)
            }

            Handler::InitConnStatusBolus => {
                let extended_enabled = r.read_u8_at(0)? & 0x01 != 0;
                let bolus_step = r.read_u8_at(1)? as f64 / 100.0;
                let max_bolus = r.read_hundredths_at(2)?;
                state.bolus_settings.extended_bolus_enabled = extended_enabled;
                state.bolus_settings.bolus_step = bolus_step;
                state.max_values.max_bolus = max_bolus;
                Ok(None)
            }

            Handler::InitConnStatusBasic => {
                let suspended = r.read_flag_at(0)?;
                let calculator_enabled = r.read_flag_at(1)?;
                let daily_total = r.read_insulin_counts_at(2)?;
                let max_daily = r.read_hundredths_at(5)?;
                let reservoir = r.read_insulin_counts_at(7)?;
                state.suspended = suspended;
                state.bolus_settings.calculator_enabled = calculator_enabled;
                state.daily_total = daily_total;
                state.max_values.max_daily_total = max_daily;
                state.reservoir_remaining = reservoir;
                Ok(None)
            }

            Handler::InitConnStatusOption => {
                let mut options = [0u8; 9];
                options.copy_from_slice(&r.as_bytes()[..9]);
                let password = r.read_u16_at(9)? ^ PASSWORD_XOR_KEY;
                state.options = options;
                state.password = password;
                Ok(None)
            }

            Handler::Error => {
                let code = r.read_u8_at(0)?;
                if code == 0 {
                    return Ok(None);
                }
                let error = PumpErrorCode::from(code);
                log::warn!("pump reported {}", error);
                state.last_error = Some(error);
                if error.stops_bolus() && state.bolus.in_progress {
                    state.bolus.in_progress = false;
                    state.bolus.stopped = true;
                }
                Ok(Some(PumpEvent::ErrorOccurred(error)))
            }

            Handler::PcCommStart | Handler::PcCommStop => {
                log::debug!("{}", self.name());
                Ok(None)
            }

            Handler::History(category) => decode_history(*category, &r, state),

            Handler::HistoryDone => {
                // Only the category on the wire owns this marker
                let active = state.active_history().filter(|c| {
                    c.is_per_category() && state.history_state(*c) == LoadState::Loading
                });
                match active {
                    Some(category) => Ok(complete_history(category, state)),
                    None => {
                        log::debug!("history done with no per-category load in progress");
                        Ok(None)
                    }
                }
            }

            Handler::HistoryAllDone => Ok(complete_history(HistoryCategory::All, state)),

            Handler::HistoryNewDone => Ok(complete_history(HistoryCategory::New, state)),

            Handler::SettingBasal => {
                let profile = r.read_basal_profile_at(0)?;
                let index = state.active_profile as usize;
                match state.basal_profiles.get_mut(index) {
                    Some(slot) => *slot = profile,
                    None => log::warn!("active profile {} out of range", index),
                }
                Ok(None)
            }

            Handler::SettingMeal => {
                let basal_step = r.read_u8_at(0)? as f64 / 100.0;
                let bolus_step = r.read_u8_at(1)? as f64 / 100.0;
                let bolus_enabled = r.read_flag_at(2)?;
                let melody_time = r.read_u8_at(3)?;
                let block_time = r.read_u8_at(4)?;
                let config_ud = r.read_flag_at(5)?;
                let settings = &mut state.bolus_settings;
                settings.basal_step = basal_step;
                settings.bolus_step = bolus_step;
                settings.bolus_enabled = bolus_enabled;
                settings.melody_time = melody_time;
                settings.block_time = block_time;
                settings.config_ud = config_ud;
                Ok(None)
            }

            Handler::SettingMaxValues => {
                state.max_values = MaxValues {
                    max_bolus: r.read_hundredths_at(0)?,
                    max_basal: r.read_hundredths_at(2)?,
                    max_daily_total: r.read_hundredths_at(4)?,
                };
                Ok(None)
            }

            Handler::SettingBasalProfileAll => {
                const STRIDE: usize = 1 + BASAL_PROFILE_ENTRIES * 2;
                let mut profiles = state.basal_profiles;
                for slot in 0..BASAL_PROFILE_COUNT {
                    let offset = slot * STRIDE;
                    let index = r.read_u8_at(offset)? as usize;
                    let profile = r.read_basal_profile_at(offset + 1)?;
                    match profiles.get_mut(index) {
                        Some(target) => *target = profile,
                        None => log::warn!("basal profile index {} out of range", index),
                    }
                }
                state.basal_profiles = profiles;
                Ok(None)
            }

            Handler::SettingShippingInfo => {
                let serial_number = r.read_string_at(0, 10)?;
                let shipping_date = r.read_date_at(10)?;
                let country = r.read_string_at(13, 3)?;
                log::debug!("serial {} shipped {} to {}", serial_number, shipping_date, country);
                state.shipping = ShippingInfo {
                    serial_number,
                    shipping_date,
                    country,
                };
                Ok(None)
            }

            Handler::SettingGlucose => {
                let units = GlucoseUnits::from(r.read_u8_at(0)?);
                let easy = r.read_u8_at(1)?;
                state.units = units;
                state.easy_basal_mode = easy;
                Ok(None)
            }

            Handler::SettingPumpTime => {
                let time = r.read_datetime_sec_reversed_at(0)?;
                log::debug!("pump time {}", time);
                state.pump_time = Some(time);
                Ok(None)
            }

            Handler::SettingUserOptions => {
                state.user_options = decode_user_options(&r)?;
                Ok(None)
            }

            Handler::SettingActiveProfile => {
                state.active_profile = r.read_u8_at(0)?;
                Ok(None)
            }

            Handler::SettingProfileRatiosAll => {
                let scale = glucose_scale(state.units);
                let mut pairs = [CirCf::default(); 4];
                for (i, pair) in pairs.iter_mut().enumerate() {
                    *pair = CirCf {
                        cir: r.read_u16_at(i * 4)? as f64,
                        cf: r.read_u16_at(i * 4 + 2)? as f64 / scale,
                    };
                }
                state.period_ratios = PeriodRatios {
                    morning: pairs[0],
                    afternoon: pairs[1],
                    evening: pairs[2],
                    night: pairs[3],
                };
                Ok(None)
            }

            Handler::CheckValue => {
                let model = ModelInfo {
                    hw_model: r.read_u8_at(0)?,
                    protocol: r.read_u8_at(1)?,
                    product_code: r.read_u8_at(2)?,
                };
                log::debug!(
                    "hw model 0x{:02X}, protocol {}, product {}",
                    model.hw_model,
                    model.protocol,
                    model.product_code
                );
                state.model = Some(model);
                if model.hw_model != HW_MODEL_EXPORT {
                    log::warn!("unsupported hardware model 0x{:02X}", model.hw_model);
                    return Ok(Some(PumpEvent::UnsupportedModel {
                        hw_model: model.hw_model,
                    }));
                }
                Ok(None)
            }

            // Covered by decode_command_result above
            Handler::BolusStart
            | Handler::BolusStartWithSpeed
            | Handler::SetTempBasalStart
            | Handler::SetCarbsEntry
            | Handler::SetTempBasalStop
            | Handler::SetExtendedBolusStop
            | Handler::SetExtendedBolusStart
            | Handler::SetSingleBasalProfile
            | Handler::SetBasalProfile
            | Handler::SetUserOptions
            | Handler::SetActivateBasalProfile => Ok(None),
        }
    }
}

/// CF and targets travel multiplied by 100 when the pump is set to mmol/L.
fn glucose_scale(units: GlucoseUnits) -> f64 {
    match units {
        GlucoseUnits::MgDl => 1.0,
        GlucoseUnits::MmolL => 100.0,
    }
}

fn decode_user_options(r: &PayloadReader<'_>) -> ProtocolResult<UserOptions> {
    Ok(UserOptions {
        time_display_24h: r.read_flag_at(0)?,
        button_scroll: r.read_flag_at(1)?,
        beep_and_alarm: r.read_u8_at(2)?,
        lcd_on_secs: r.read_u8_at(3)?,
        backlight_on_secs: r.read_u8_at(4)?,
        language: r.read_u8_at(5)?,
        units: GlucoseUnits::from(r.read_u8_at(6)?),
        shutdown_hours: r.read_u8_at(7)?,
        low_reservoir_warning: r.read_u8_at(8)?,
    })
}

fn decode_command_result(
    handler: Handler,
    accepted_code: u8,
    r: &PayloadReader<'_>,
    state: &mut PumpState,
) -> ProtocolResult<Option<PumpEvent>> {
    let code = r.read_u8_at(0)?;
    let accepted = code == accepted_code;
    let command = handler.command();
    state.last_command_result = Some(CommandResult {
        command,
        code,
        accepted,
    });

    match handler {
        Handler::BolusStart | Handler::BolusStartWithSpeed => {
            state.bolus.in_progress = accepted;
            state.bolus.start_error_code = if accepted { None } else { Some(code) };
        }
        Handler::SetTempBasalStop if accepted => {
            state.temp_basal.in_progress = false;
        }
        Handler::SetExtendedBolusStop if accepted => {
            state.extended_bolus.in_progress = false;
        }
        _ => {}
    }

    if accepted {
        log::debug!("{} accepted", handler.name());
        Ok(None)
    } else {
        log::warn!("{} rejected with result {}", handler.name(), code);
        Ok(Some(PumpEvent::CommandRejected { command, code }))
    }
}

fn decode_history(
    category: HistoryCategory,
    r: &PayloadReader<'_>,
    state: &mut PumpState,
) -> ProtocolResult<Option<PumpEvent>> {
    let record_code = r.read_u8_at(0)?;
    if category.is_terminal(record_code) {
        return Ok(complete_history(category, state));
    }

    let record = decode_record(category, r)?;
    log::trace!(
        "{} record 0x{:02X} at {}",
        category,
        record.record_code,
        record.timestamp
    );
    state.push_history_record(record);
    Ok(None)
}

fn complete_history(category: HistoryCategory, state: &mut PumpState) -> Option<PumpEvent> {
    if state.complete_history(category) {
        log::debug!("{} history loaded", category);
        Some(PumpEvent::HistoryBatchComplete(category))
    } else {
        None
    }
}
