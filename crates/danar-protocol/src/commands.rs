//! Commands that can be sent to the pump.

use crate::codec::FrameWriter;
use crate::constants::*;
use crate::error::*;
use crate::frame::FrameCodec;
use crate::history::HistoryCategory;
use crate::types::*;

/// Parameterless status and settings requests.
///
/// The pump answers each with a message under the same command code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusQuery {
    /// Current calculator ratios (0x0204).
    Profile,
    /// Temporary basal status (0x0205).
    TempBasal,
    /// Extended bolus status (0x0207).
    BolusExtended,
    /// Basal, battery and reservoir (0x020A).
    Basic,
    /// Daily total and extended bolus (0x020B).
    Status,
    /// Pump time at connect (0x0301).
    InitTime,
    /// Bolus configuration at connect (0x0302).
    InitBolus,
    /// Basic status at connect (0x0303).
    InitBasic,
    /// Options and password at connect (0x0304).
    InitOption,
    /// Active basal profile rates (0x3202).
    SettingBasal,
    /// Meal settings (0x3203).
    SettingMeal,
    /// Current CIR/CF (0x3204).
    SettingProfileRatios,
    /// Device maxima (0x3205).
    SettingMaxValues,
    /// All basal profiles (0x3206).
    SettingBasalProfileAll,
    /// Shipping information (0x3207).
    SettingShippingInfo,
    /// Units and easy mode (0x3209).
    SettingGlucose,
    /// Pump clock (0x320A).
    SettingPumpTime,
    /// User options (0x320B).
    SettingUserOptions,
    /// Active profile number (0x320C).
    SettingActiveProfile,
    /// CIR/CF per day period (0x320D).
    SettingProfileRatiosAll,
    /// Hardware model check (0xF0F1).
    CheckValue,
}

impl StatusQuery {
    /// Every query, in command-code order.
    pub const ALL: [StatusQuery; 21] = [
        StatusQuery::Profile,
        StatusQuery::TempBasal,
        StatusQuery::BolusExtended,
        StatusQuery::Basic,
        StatusQuery::Status,
        StatusQuery::InitTime,
        StatusQuery::InitBolus,
        StatusQuery::InitBasic,
        StatusQuery::InitOption,
        StatusQuery::SettingBasal,
        StatusQuery::SettingMeal,
        StatusQuery::SettingProfileRatios,
        StatusQuery::SettingMaxValues,
        StatusQuery::SettingBasalProfileAll,
        StatusQuery::SettingShippingInfo,
        StatusQuery::SettingGlucose,
        StatusQuery::SettingPumpTime,
        StatusQuery::SettingUserOptions,
        StatusQuery::SettingActiveProfile,
        StatusQuery::SettingProfileRatiosAll,
        StatusQuery::CheckValue,
    ];

    /// Command code of the request.
    pub fn code(&self) -> u16 {
        match self {
            StatusQuery::Profile => CMD_PUMP_CALCULATION_SETTING,
            StatusQuery::TempBasal => CMD_PUMP_EXERCISE_MODE,
            StatusQuery::BolusExtended => CMD_PUMP_EXPANS_INS_I,
            StatusQuery::Basic => CMD_PUMP_INITVIEW_I,
            StatusQuery::Status => CMD_PUMP_STATUS,
            StatusQuery::InitTime => CMD_PUMPINIT_TIME_INFO,
            StatusQuery::InitBolus => CMD_PUMPINIT_BOLUS_INFO,
            StatusQuery::InitBasic => CMD_PUMPINIT_INIT_INFO,
            StatusQuery::InitOption => CMD_PUMPINIT_OPTION,
            StatusQuery::SettingBasal => CMD_SETTING_V_BASAL_INS_I,
            StatusQuery::SettingMeal => CMD_SETTING_V_MEAL_SETTING_I,
            StatusQuery::SettingProfileRatios => CMD_SETTING_V_CCC_I,
            StatusQuery::SettingMaxValues => CMD_SETTING_V_MAX_VALUE_I,
            StatusQuery::SettingBasalProfileAll => CMD_SETTING_V_BASAL_PROFILE_ALL,
            StatusQuery::SettingShippingInfo => CMD_SETTING_V_SHIPPING_I,
            StatusQuery::SettingGlucose => CMD_SETTING_V_GLUCOSE_AND_EASY,
            StatusQuery::SettingPumpTime => CMD_SETTING_V_TIME_I,
            StatusQuery::SettingUserOptions => CMD_SETTING_V_USER_OPTIONS,
            StatusQuery::SettingActiveProfile => CMD_SETTING_V_PROFILE_NUMBER,
            StatusQuery::SettingProfileRatiosAll => CMD_SETTING_V_CIR_CF_VALUE,
            StatusQuery::CheckValue => CMD_PUMP_CHECK_VALUE,
        }
    }

    /// Look up the query for a command code.
    pub fn from_code(code: u16) -> Option<Self> {
        StatusQuery::ALL.iter().copied().find(|q| q.code() == code)
    }
}

/// Commands that can be sent to the pump.
///
/// Amounts and durations are written as given. Callers are expected to pass
/// values that already went through the constraint pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Stop the running bolus.
    BolusStop,

    /// Start a bolus.
    BolusStart {
        /// Amount in units.
        amount: f64,
    },

    /// Start a bolus with a delivery speed.
    BolusStartWithSpeed {
        /// Amount in units.
        amount: f64,
        /// Speed index (0 = 12 s/U, 1 = 30 s/U, 2 = 60 s/U).
        speed: u8,
    },

    /// Start a temporary basal.
    SetTempBasalStart {
        /// Percent of the profile rate.
        percent: u8,
        /// Duration in hours.
        duration_hours: u8,
    },

    /// Write a carbohydrate entry into the pump history.
    SetCarbsEntry {
        /// Time of the meal.
        time: PumpDateTime,
        /// Grams of carbohydrate.
        grams: u16,
    },

    /// Stop the temporary basal.
    SetTempBasalStop,

    /// Stop the extended bolus.
    SetExtendedBolusStop,

    /// Start an extended bolus.
    SetExtendedBolusStart {
        /// Amount in units.
        amount: f64,
        /// Duration in half hours.
        half_hours: u8,
    },

    /// Open the PC communication session.
    CommStart,

    /// Close the PC communication session.
    CommStop,

    /// Request a history batch.
    RequestHistory(HistoryCategory),

    /// Request treatment events, from the given time or from the start.
    RequestEvents {
        /// Earliest event to return.
        from: Option<PumpDateTime>,
    },

    /// Write the basal profile of the active profile.
    SetSingleBasalProfile {
        /// Hourly rates.
        profile: BasalProfile,
    },

    /// Write a numbered basal profile.
    SetBasalProfile {
        /// Profile number (0-3).
        index: u8,
        /// Hourly rates.
        profile: BasalProfile,
    },

    /// Write the user options block.
    SetUserOptions {
        /// New options.
        options: UserOptions,
    },

    /// Switch the active basal profile.
    SetActivateBasalProfile {
        /// Profile number (0-3).
        index: u8,
    },

    /// Read a status or setting message.
    Query(StatusQuery),
}

impl Command {
    /// Build the parameterless command for a code.
    ///
    /// History categories other than events need no parameters; the events
    /// request built here starts from the beginning of the log.
    pub fn request(code: u16) -> ProtocolResult<Self> {
        match code {
            CMD_MEALINS_STOP => Ok(Command::BolusStop),
            CMD_PUMPSET_EXERCISE_STOP => Ok(Command::SetTempBasalStop),
            CMD_PUMPSET_EXPANS_INS_STOP => Ok(Command::SetExtendedBolusStop),
            CMD_CONNECT => Ok(Command::CommStart),
            CMD_DISCONNECT => Ok(Command::CommStop),
            CMD_HISTORY_EVENTS_V2 => Ok(Command::RequestEvents { from: None }),
            _ => {
                if let Some(category) = HistoryCategory::from_command(code) {
                    Ok(Command::RequestHistory(category))
                } else if let Some(query) = StatusQuery::from_code(code) {
                    Ok(Command::Query(query))
                } else {
                    Err(ProtocolError::UnsupportedEncode(code))
                }
            }
        }
    }

    /// Get the command code for this command.
    pub fn code(&self) -> u16 {
        match self {
            Command::BolusStop => CMD_MEALINS_STOP,
            Command::BolusStart { .. } => CMD_MEALINS_START_DATA,
            Command::BolusStartWithSpeed { .. } => CMD_MEALINS_START_DATA_SPEED,
            Command::SetTempBasalStart { .. } => CMD_PUMPSET_EXERCISE_S,
            Command::SetCarbsEntry { .. } => CMD_PUMPSET_HIS_S,
            Command::SetTempBasalStop => CMD_PUMPSET_EXERCISE_STOP,
            Command::SetExtendedBolusStop => CMD_PUMPSET_EXPANS_INS_STOP,
            Command::SetExtendedBolusStart { .. } => CMD_PUMPSET_EXPANS_INS_S,
            Command::CommStart => CMD_CONNECT,
            Command::CommStop => CMD_DISCONNECT,
            Command::RequestHistory(category) => category.command(),
            Command::RequestEvents { .. } => CMD_HISTORY_EVENTS_V2,
            Command::SetSingleBasalProfile { .. } => CMD_SETTING_BASAL_INS_S,
            Command::SetBasalProfile { .. } => CMD_SETTING_BASAL_PROFILE_S,
            Command::SetUserOptions { .. } => CMD_SETTING_USER_OPTIONS_S,
            Command::SetActivateBasalProfile { .. } => CMD_SETTING_PROFILE_NUMBER_S,
            Command::Query(query) => query.code(),
        }
    }

    /// History category this command starts loading, if any.
    pub fn history_category(&self) -> Option<HistoryCategory> {
        match self {
            Command::RequestHistory(category) => Some(*category),
            Command::RequestEvents { .. } => Some(HistoryCategory::Events),
            _ => None,
        }
    }

    /// Encode the command payload.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut w = FrameWriter::new();

        match self {
            Command::BolusStart { amount } => {
                w.put_hundredths(*amount)?;
            }

            Command::BolusStartWithSpeed { amount, speed } => {
                w.put_hundredths(*amount)?.put_u8(*speed)?;
            }

            Command::SetTempBasalStart {
                percent,
                duration_hours,
            } => {
                w.put_u8(*percent)?.put_u8(*duration_hours)?;
            }

            Command::SetCarbsEntry { time, grams } => {
                w.put_u8(RECORD_TYPE_CARBO)?
                    .put_datetime_sec(time)?
                    .put_u8(CARBS_ENTRY_MARKER)?
                    .put_u16(*grams)?;
            }

            Command::SetExtendedBolusStart { amount, half_hours } => {
                w.put_hundredths(*amount)?.put_u8(*half_hours)?;
            }

            Command::RequestEvents { from } => match from {
                Some(from) => {
                    w.put_datetime_sec(from)?;
                }
                None => {
                    w.put_bytes(&[0u8; 6])?;
                }
            },

            Command::SetSingleBasalProfile { profile } => {
                w.put_basal_profile(profile)?;
            }

            Command::SetBasalProfile { index, profile } => {
                w.put_u8(*index)?.put_basal_profile(profile)?;
            }

            Command::SetUserOptions { options } => {
                w.put_flag(options.time_display_24h)?
                    .put_flag(options.button_scroll)?
                    .put_u8(options.beep_and_alarm)?
                    .put_u8(options.lcd_on_secs)?
                    .put_u8(options.backlight_on_secs)?
                    .put_u8(options.language)?
                    .put_u8(options.units.into())?
                    .put_u8(options.shutdown_hours)?
                    .put_u8(options.low_reservoir_warning)?;
            }

            Command::SetActivateBasalProfile { index } => {
                w.put_u8(*index)?;
            }

            // Empty payload
            Command::BolusStop
            | Command::SetTempBasalStop
            | Command::SetExtendedBolusStop
            | Command::CommStart
            | Command::CommStop
            | Command::RequestHistory(_)
            | Command::Query(_) => {}
        }

        Ok(w.finish())
    }

    /// Encode the command inside a complete packet envelope.
    pub fn to_frame(&self) -> ProtocolResult<Vec<u8>> {
        FrameCodec::encode(self.code(), &self.encode()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::parse_packet;

    #[test]
    fn test_bolus_start_encode() {
        let cmd = Command::BolusStart { amount: 1.25 };
        assert_eq!(cmd.code(), 0x0102);
        assert_eq!(cmd.encode().unwrap(), vec![0x00, 0x7D]);

        let cmd = Command::BolusStartWithSpeed {
            amount: 10.0,
            speed: 2,
        };
        assert_eq!(cmd.encode().unwrap(), vec![0x03, 0xE8, 0x02]);
    }

    #[test]
    fn test_carbs_entry_encode() {
        let cmd = Command::SetCarbsEntry {
            time: PumpDateTime::new(2024, 6, 15, 12, 30, 45),
            grams: 48,
        };
        assert_eq!(
            cmd.encode().unwrap(),
            vec![0x09, 0x24, 0x06, 0x15, 0x12, 0x30, 0x45, 0x43, 0x00, 0x30]
        );
    }

    #[test]
    fn test_temp_basal_and_extended_encode() {
        let cmd = Command::SetTempBasalStart {
            percent: 150,
            duration_hours: 2,
        };
        assert_eq!(cmd.encode().unwrap(), vec![150, 2]);

        let cmd = Command::SetExtendedBolusStart {
            amount: 2.0,
            half_hours: 4,
        };
        assert_eq!(cmd.encode().unwrap(), vec![0x00, 0xC8, 4]);
    }

    #[test]
    fn test_events_request_encode() {
        let cmd = Command::RequestEvents { from: None };
        assert_eq!(cmd.encode().unwrap(), vec![0u8; 6]);
        assert_eq!(cmd.history_category(), Some(HistoryCategory::Events));

        let cmd = Command::RequestEvents {
            from: Some(PumpDateTime::new(2024, 1, 2, 3, 4, 5)),
        };
        assert_eq!(
            cmd.encode().unwrap(),
            vec![0x24, 0x01, 0x02, 0x03, 0x04, 0x05]
        );
    }

    #[test]
    fn test_basal_profile_encode() {
        let cmd = Command::SetBasalProfile {
            index: 2,
            profile: BasalProfile::flat(0.8),
        };
        let payload = cmd.encode().unwrap();
        assert_eq!(payload.len(), 1 + 48);
        assert_eq!(payload[0], 2);
        assert_eq!(&payload[1..3], &[0x00, 0x50]);
    }

    #[test]
    fn test_empty_payload_commands() {
        for cmd in [
            Command::BolusStop,
            Command::CommStart,
            Command::RequestHistory(HistoryCategory::Glucose),
            Command::Query(StatusQuery::CheckValue),
        ] {
            assert!(cmd.encode().unwrap().is_empty());
        }
    }

    #[test]
    fn test_request_by_code() {
        assert_eq!(Command::request(0x3104).unwrap(), Command::RequestHistory(HistoryCategory::Glucose));
        assert_eq!(Command::request(0x320C).unwrap(), Command::Query(StatusQuery::SettingActiveProfile));
        assert_eq!(Command::request(0x0101).unwrap(), Command::BolusStop);
        assert_eq!(
            Command::request(0x0102),
            Err(ProtocolError::UnsupportedEncode(0x0102))
        );
        assert_eq!(
            Command::request(0xBEEF),
            Err(ProtocolError::UnsupportedEncode(0xBEEF))
        );
    }

    #[test]
    fn test_query_codes_are_unique() {
        for query in StatusQuery::ALL {
            assert_eq!(StatusQuery::from_code(query.code()), Some(query));
        }
    }

    #[test]
    fn test_to_frame() {
        let cmd = Command::SetActivateBasalProfile { index: 1 };
        let packet = cmd.to_frame().unwrap();
        let frame = parse_packet(&packet).unwrap();
        assert_eq!(frame.command, CMD_SETTING_PROFILE_NUMBER_S);
        assert_eq!(frame.payload, vec![1]);
    }
}
