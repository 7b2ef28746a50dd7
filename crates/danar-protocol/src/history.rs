//! History categories and record decoding.
//!
//! History is read in batches: the host sends the request command of a
//! category and the pump answers with one message per record, all carrying
//! the same command code, followed by an end-of-stream marker. Record
//! messages of the classic categories are 10 bytes:
//!
//! | Offset | Size | Field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 1    | record code (0xFF = end of stream)      |
//! | 1      | 3-6  | BCD date / datetime / datetime+secs     |
//! | 4      | 2    | daily basal (daily records only)        |
//! | 6      | 2    | daily bolus (daily records only)        |
//! | 6      | 1    | parameter byte 7                        |
//! | 7      | 1    | parameter byte 8                        |
//! | 8      | 2    | record value                            |
//!
//! The date fields overlap the parameter bytes; which ones a record uses
//! depends on its record code. Treatment events (v2 firmware) are 11 bytes:
//! record code, 6-byte datetime, then two u16 parameters at 7 and 9.

use crate::codec::PayloadReader;
use crate::constants::*;
use crate::error::*;
use crate::types::*;

/// Payload length of one history record message.
pub const HISTORY_RECORD_SIZE: usize = 10;

/// Payload length of one treatment event record.
pub const EVENT_RECORD_SIZE: usize = 11;

/// Number of history categories.
pub const HISTORY_CATEGORY_COUNT: usize = 12;

/// A class of history records loaded as one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HistoryCategory {
    /// Boluses.
    Bolus,
    /// Daily insulin totals.
    DailyInsulin,
    /// Glucose readings entered on the pump.
    Glucose,
    /// Alarms.
    Alarm,
    /// Errors.
    Error,
    /// Carbohydrate entries.
    Carbohydrate,
    /// Reservoir refills.
    Refill,
    /// Suspend on/off.
    Suspend,
    /// Hourly basal deliveries.
    BasalHour,
    /// Every record type.
    All,
    /// Records not yet read by the host.
    New,
    /// Treatment events (v2 firmware).
    Events,
}

impl HistoryCategory {
    /// Every category, in command-code order.
    pub const ALL: [HistoryCategory; HISTORY_CATEGORY_COUNT] = [
        HistoryCategory::Bolus,
        HistoryCategory::DailyInsulin,
        HistoryCategory::Glucose,
        HistoryCategory::Alarm,
        HistoryCategory::Error,
        HistoryCategory::Carbohydrate,
        HistoryCategory::Refill,
        HistoryCategory::Suspend,
        HistoryCategory::BasalHour,
        HistoryCategory::All,
        HistoryCategory::New,
        HistoryCategory::Events,
    ];

    /// Dense index for per-category tables.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Command code used both to request the batch and to deliver records.
    pub fn command(&self) -> u16 {
        match self {
            HistoryCategory::Bolus => CMD_HISTORY_MEAL_INS,
            HistoryCategory::DailyInsulin => CMD_HISTORY_DAY_INS,
            HistoryCategory::Glucose => CMD_HISTORY_GLUCOSE,
            HistoryCategory::Alarm => CMD_HISTORY_ALARM,
            HistoryCategory::Error => CMD_HISTORY_ERROR,
            HistoryCategory::Carbohydrate => CMD_HISTORY_CARBOHY,
            HistoryCategory::Refill => CMD_HISTORY_REFILL,
            HistoryCategory::Suspend => CMD_HISTORY_SUSPEND,
            HistoryCategory::BasalHour => CMD_HISTORY_BASAL_HOUR,
            HistoryCategory::All => CMD_HISTORY_ALL,
            HistoryCategory::New => CMD_HISTORY_NEW,
            HistoryCategory::Events => CMD_HISTORY_EVENTS_V2,
        }
    }

    /// Look up the category delivered under a command code.
    pub fn from_command(command: u16) -> Option<Self> {
        HistoryCategory::ALL
            .iter()
            .copied()
            .find(|category| category.command() == command)
    }

    /// Separate done message that also ends this category's batch, if any.
    pub fn done_command(&self) -> Option<u16> {
        match self {
            HistoryCategory::Bolus
            | HistoryCategory::DailyInsulin
            | HistoryCategory::Glucose
            | HistoryCategory::Alarm
            | HistoryCategory::Error
            | HistoryCategory::Carbohydrate
            | HistoryCategory::Refill
            | HistoryCategory::Suspend
            | HistoryCategory::BasalHour => Some(CMD_HISTORY_DONE),
            HistoryCategory::All => Some(CMD_HISTORY_ALL_DONE),
            HistoryCategory::New => Some(CMD_HISTORY_NEW_DONE),
            HistoryCategory::Events => None,
        }
    }

    /// Whether a record message with this first byte ends the batch.
    ///
    /// Device traces show 0xFF in the record-code position for every stream.
    /// Kept as an explicit per-category match so a category with a different
    /// sentinel only changes its own arm.
    pub fn is_terminal(&self, record_code: u8) -> bool {
        match self {
            HistoryCategory::Bolus
            | HistoryCategory::DailyInsulin
            | HistoryCategory::Glucose
            | HistoryCategory::Alarm
            | HistoryCategory::Error
            | HistoryCategory::Carbohydrate
            | HistoryCategory::Refill
            | HistoryCategory::Suspend
            | HistoryCategory::BasalHour => record_code == RECORD_END_OF_STREAM,
            HistoryCategory::All | HistoryCategory::New => record_code == RECORD_END_OF_STREAM,
            HistoryCategory::Events => record_code == RECORD_END_OF_STREAM,
        }
    }

    /// Record code the category normally carries (None for mixed streams).
    pub fn record_code(&self) -> Option<u8> {
        match self {
            HistoryCategory::Bolus => Some(RECORD_TYPE_BOLUS),
            HistoryCategory::DailyInsulin => Some(RECORD_TYPE_DAILY),
            HistoryCategory::Glucose => Some(RECORD_TYPE_GLUCOSE),
            HistoryCategory::Alarm => Some(RECORD_TYPE_ALARM),
            HistoryCategory::Error => Some(RECORD_TYPE_ERROR),
            HistoryCategory::Carbohydrate => Some(RECORD_TYPE_CARBO),
            HistoryCategory::Refill => Some(RECORD_TYPE_REFILL),
            HistoryCategory::Suspend => Some(RECORD_TYPE_SUSPEND),
            HistoryCategory::BasalHour => Some(RECORD_TYPE_BASALHOUR),
            HistoryCategory::All | HistoryCategory::New | HistoryCategory::Events => None,
        }
    }

    /// Whether this batch is ended by the shared per-category done message.
    pub fn is_per_category(&self) -> bool {
        self.done_command() == Some(CMD_HISTORY_DONE)
    }

    /// Payload length of one record in this category's stream.
    pub fn record_size(&self) -> usize {
        match self {
            HistoryCategory::Events => EVENT_RECORD_SIZE,
            _ => HISTORY_RECORD_SIZE,
        }
    }

    /// Short lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryCategory::Bolus => "bolus",
            HistoryCategory::DailyInsulin => "daily_insulin",
            HistoryCategory::Glucose => "glucose",
            HistoryCategory::Alarm => "alarm",
            HistoryCategory::Error => "error",
            HistoryCategory::Carbohydrate => "carbohydrate",
            HistoryCategory::Refill => "refill",
            HistoryCategory::Suspend => "suspend",
            HistoryCategory::BasalHour => "basal_hour",
            HistoryCategory::All => "all",
            HistoryCategory::New => "new",
            HistoryCategory::Events => "events",
        }
    }
}

impl std::fmt::Display for HistoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bolus delivery type from a bolus record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BolusType {
    /// Standard bolus.
    Standard,
    /// Extended bolus.
    Extended,
    /// Dual wave, standard part.
    DualStandard,
    /// Dual wave, extended part.
    DualExtended,
    /// Unrecognised type nibble.
    None,
}

impl From<u8> for BolusType {
    fn from(param: u8) -> Self {
        match param & 0xF0 {
            0x80 => BolusType::Standard,
            0x90 => BolusType::DualExtended,
            0xA0 => BolusType::DualStandard,
            0xC0 => BolusType::Extended,
            _ => BolusType::None,
        }
    }
}

/// Alarm kind from an alarm record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmKind {
    /// Basal compare.
    BasalCompare,
    /// Reservoir empty.
    EmptyReservoir,
    /// Check.
    Check,
    /// Occlusion.
    Occlusion,
    /// Basal max.
    BasalMax,
    /// Daily max.
    DailyMax,
    /// Low battery.
    LowBattery,
    /// Shutdown.
    Shutdown,
    /// Unknown alarm letter.
    Unknown(u8),
}

impl From<u8> for AlarmKind {
    fn from(letter: u8) -> Self {
        match letter {
            b'P' => AlarmKind::BasalCompare,
            b'R' => AlarmKind::EmptyReservoir,
            b'C' => AlarmKind::Check,
            b'O' => AlarmKind::Occlusion,
            b'M' => AlarmKind::BasalMax,
            b'D' => AlarmKind::DailyMax,
            b'B' => AlarmKind::LowBattery,
            b'S' => AlarmKind::Shutdown,
            other => AlarmKind::Unknown(other),
        }
    }
}

/// Decoded fields of a history record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordDetail {
    /// Bolus delivery.
    Bolus {
        /// Delivery type.
        bolus_type: BolusType,
        /// Amount in units.
        amount: f64,
        /// Duration in minutes (extended and dual boluses).
        duration_minutes: u16,
    },
    /// Daily insulin totals.
    DailyTotals {
        /// Basal units.
        basal: f64,
        /// Bolus units.
        bolus: f64,
    },
    /// Prime.
    Prime {
        /// Amount in units.
        amount: f64,
    },
    /// Error entry.
    Error {
        /// Raw value / 100.
        value: f64,
    },
    /// Refill.
    Refill {
        /// Amount in units.
        amount: f64,
    },
    /// Hourly basal.
    BasalHour {
        /// Rate in units per hour.
        rate: f64,
    },
    /// Temporary basal.
    TempBasal {
        /// Raw value / 100.
        value: f64,
    },
    /// Glucose reading.
    Glucose {
        /// Reading in mg/dL.
        mgdl: u16,
    },
    /// Carbohydrates.
    Carbohydrate {
        /// Grams.
        grams: u16,
    },
    /// Alarm.
    Alarm {
        /// Alarm kind.
        kind: AlarmKind,
        /// Raw value / 100.
        value: f64,
    },
    /// Suspend state change.
    Suspend {
        /// Whether suspend was switched on.
        on: bool,
    },
    /// Treatment event (v2 firmware).
    Event {
        /// Event code.
        code: u8,
        /// First parameter.
        param1: u16,
        /// Second parameter.
        param2: u16,
    },
    /// Record code not recognised; value kept raw.
    Unknown {
        /// Raw value.
        value: u16,
    },
}

/// One decoded history record.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    /// Category whose batch delivered the record.
    pub category: HistoryCategory,
    /// Record code from byte 0.
    pub record_code: u8,
    /// Record timestamp.
    pub timestamp: PumpDateTime,
    /// Decoded fields.
    pub detail: RecordDetail,
    /// The raw record bytes.
    pub raw: Vec<u8>,
}

/// Decode a non-terminal history record.
pub fn decode_record(
    category: HistoryCategory,
    reader: &PayloadReader<'_>,
) -> ProtocolResult<HistoryRecord> {
    let size = category.record_size();
    reader.require(size)?;

    let record_code = reader.read_u8_at(0)?;
    let raw = reader.as_bytes()[..size].to_vec();

    if category == HistoryCategory::Events {
        return Ok(HistoryRecord {
            category,
            record_code,
            timestamp: reader.read_datetime_sec_at(1)?,
            detail: RecordDetail::Event {
                code: record_code,
                param1: reader.read_u16_at(7)?,
                param2: reader.read_u16_at(9)?,
            },
            raw,
        });
    }

    let param7 = reader.read_u8_at(6)?;
    let param8 = reader.read_u8_at(7)?;
    let value = reader.read_u16_at(8)?;
    let hundredths = value as f64 / 100.0;

    let (timestamp, detail) = match record_code {
        RECORD_TYPE_BOLUS => (
            reader.read_datetime_at(1)?,
            RecordDetail::Bolus {
                bolus_type: BolusType::from(param8),
                amount: hundredths,
                duration_minutes: (param8 & 0x0F) as u16 * 60 + param7 as u16,
            },
        ),
        RECORD_TYPE_DAILY => (
            reader.read_date_at(1)?,
            RecordDetail::DailyTotals {
                basal: reader.read_hundredths_at(4)?,
                bolus: reader.read_hundredths_at(6)?,
            },
        ),
        RECORD_TYPE_PRIME => (
            reader.read_datetime_sec_at(1)?,
            RecordDetail::Prime { amount: hundredths },
        ),
        RECORD_TYPE_ERROR => (
            reader.read_datetime_sec_at(1)?,
            RecordDetail::Error { value: hundredths },
        ),
        RECORD_TYPE_REFILL => (
            reader.read_datetime_sec_at(1)?,
            RecordDetail::Refill { amount: hundredths },
        ),
        RECORD_TYPE_BASALHOUR => (
            reader.read_datetime_sec_at(1)?,
            RecordDetail::BasalHour { rate: hundredths },
        ),
        RECORD_TYPE_TB => (
            reader.read_datetime_sec_at(1)?,
            RecordDetail::TempBasal { value: hundredths },
        ),
        RECORD_TYPE_GLUCOSE => (
            reader.read_datetime_sec_at(1)?,
            RecordDetail::Glucose { mgdl: value },
        ),
        RECORD_TYPE_CARBO => (
            reader.read_datetime_sec_at(1)?,
            RecordDetail::Carbohydrate { grams: value },
        ),
        RECORD_TYPE_ALARM => (
            reader.read_datetime_sec_at(1)?,
            RecordDetail::Alarm {
                kind: AlarmKind::from(param8),
                value: hundredths,
            },
        ),
        RECORD_TYPE_SUSPEND => (
            reader.read_datetime_sec_at(1)?,
            RecordDetail::Suspend { on: param8 == b'O' },
        ),
        _ => (
            reader.read_datetime_sec_at(1)?,
            RecordDetail::Unknown { value },
        ),
    };

    Ok(HistoryRecord {
        category,
        record_code,
        timestamp,
        detail,
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(bytes: &[u8], category: HistoryCategory) -> HistoryRecord {
        let reader = PayloadReader::new(category.command(), bytes);
        decode_record(category, &reader).unwrap()
    }

    #[test]
    fn test_category_command_lookup() {
        for category in HistoryCategory::ALL {
            assert_eq!(HistoryCategory::from_command(category.command()), Some(category));
        }
        assert_eq!(HistoryCategory::from_command(CMD_HISTORY_DONE), None);
        assert_eq!(HistoryCategory::Glucose.index(), 2);
    }

    #[test]
    fn test_done_commands() {
        assert_eq!(HistoryCategory::Glucose.done_command(), Some(CMD_HISTORY_DONE));
        assert_eq!(HistoryCategory::All.done_command(), Some(CMD_HISTORY_ALL_DONE));
        assert_eq!(HistoryCategory::New.done_command(), Some(CMD_HISTORY_NEW_DONE));
        assert_eq!(HistoryCategory::Events.done_command(), None);
        assert!(HistoryCategory::Refill.is_per_category());
        assert!(!HistoryCategory::All.is_per_category());
    }

    #[test]
    fn test_terminal_marker() {
        for category in HistoryCategory::ALL {
            assert!(category.is_terminal(0xFF), "{} should end on 0xFF", category);
            assert!(!category.is_terminal(0x01));
        }
    }

    #[test]
    fn test_decode_bolus_record() {
        // 2024-03-05 08:15, dual standard, 1h30 duration, 2.50 U
        let rec = record(
            &[0x01, 0x24, 0x03, 0x05, 0x08, 0x15, 30, 0xA1, 0x00, 0xFA],
            HistoryCategory::Bolus,
        );
        assert_eq!(rec.timestamp, PumpDateTime::new(2024, 3, 5, 8, 15, 0));
        assert_eq!(
            rec.detail,
            RecordDetail::Bolus {
                bolus_type: BolusType::DualStandard,
                amount: 2.5,
                duration_minutes: 90,
            }
        );
    }

    #[test]
    fn test_decode_daily_record() {
        let rec = record(
            &[0x02, 0x24, 0x03, 0x05, 0x04, 0xB0, 0x03, 0xE8, 0, 0],
            HistoryCategory::DailyInsulin,
        );
        assert_eq!(rec.timestamp, PumpDateTime::date(2024, 3, 5));
        assert_eq!(
            rec.detail,
            RecordDetail::DailyTotals {
                basal: 12.0,
                bolus: 10.0,
            }
        );
    }

    #[test]
    fn test_decode_glucose_and_alarm() {
        let rec = record(
            &[0x08, 0x24, 0x03, 0x05, 0x23, 0x59, 0x30, 0x00, 0x00, 0x7B],
            HistoryCategory::Glucose,
        );
        assert_eq!(rec.timestamp, PumpDateTime::new(2024, 3, 5, 23, 59, 30));
        assert_eq!(rec.detail, RecordDetail::Glucose { mgdl: 123 });

        let rec = record(
            &[0x0A, 0x24, 0x03, 0x05, 0x10, 0x00, 0x00, b'O', 0x00, 0x00],
            HistoryCategory::Alarm,
        );
        assert_eq!(
            rec.detail,
            RecordDetail::Alarm {
                kind: AlarmKind::Occlusion,
                value: 0.0,
            }
        );
    }

    #[test]
    fn test_decode_suspend_and_unknown() {
        let rec = record(
            &[0x0B, 0x24, 0x01, 0x01, 0, 0, 0, b'O', 0, 0],
            HistoryCategory::Suspend,
        );
        assert_eq!(rec.detail, RecordDetail::Suspend { on: true });

        let rec = record(&[0x3C, 0x24, 0x01, 0x01, 0, 0, 0, 0, 0x01, 0x02], HistoryCategory::All);
        assert_eq!(rec.record_code, 0x3C);
        assert_eq!(rec.detail, RecordDetail::Unknown { value: 0x0102 });
    }

    #[test]
    fn test_decode_event_record() {
        let rec = record(
            &[0x05, 0x24, 0x02, 0x10, 0x07, 0x30, 0x00, 0x00, 0x96, 0x00, 0x00],
            HistoryCategory::Events,
        );
        assert_eq!(
            rec.detail,
            RecordDetail::Event {
                code: 0x05,
                param1: 150,
                param2: 0,
            }
        );
    }

    #[test]
    fn test_short_record_is_rejected() {
        let bytes = [0x01, 0x24, 0x03];
        let reader = PayloadReader::new(CMD_HISTORY_MEAL_INS, &bytes);
        assert!(matches!(
            decode_record(HistoryCategory::Bolus, &reader),
            Err(ProtocolError::FrameTooShort { expected: 10, .. })
        ));
    }

    #[test]
    fn test_device_record_is_ten_bytes() {
        let bytes = [0x08, 0x24, 0x03, 0x05, 0x23, 0x59, 0x30, 0x00, 0x00, 0x7B];
        let rec = record(&bytes, HistoryCategory::Glucose);
        assert_eq!(rec.detail, RecordDetail::Glucose { mgdl: 123 });
        assert_eq!(rec.raw, bytes.to_vec());

        // Trailing padding does not shift the fields
        let mut padded = bytes.to_vec();
        padded.push(0xEE);
        let rec = record(&padded, HistoryCategory::Glucose);
        assert_eq!(rec.detail, RecordDetail::Glucose { mgdl: 123 });
        assert_eq!(rec.raw.len(), HISTORY_RECORD_SIZE);
    }

    #[test]
    fn test_event_record_needs_eleven_bytes() {
        let bytes = [0x05, 0x24, 0x02, 0x10, 0x07, 0x30, 0x00, 0x00, 0x96, 0x00];
        let reader = PayloadReader::new(CMD_HISTORY_EVENTS_V2, &bytes);
        assert!(matches!(
            decode_record(HistoryCategory::Events, &reader),
            Err(ProtocolError::FrameTooShort { expected: EVENT_RECORD_SIZE, .. })
        ));
        assert_eq!(HistoryCategory::Bolus.record_size(), HISTORY_RECORD_SIZE);
    }
}
