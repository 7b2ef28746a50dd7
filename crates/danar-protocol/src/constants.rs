//! Protocol constants
//!
//! Command codes, record codes and envelope bytes used by the DanaR
//! serial protocol. Command codes are 16-bit and travel big-endian in the
//! packet header.

// ============================================================================
// Packet Envelope
// ============================================================================

/// Start marker byte (appears twice).
pub const PACKET_START: u8 = 0x7E;
/// End marker byte (appears twice).
pub const PACKET_END: u8 = 0x2E;
/// Packet type byte that follows the length.
pub const PACKET_TYPE: u8 = 0xF1;
/// Bytes before the payload: start(2) + len(1) + type(1) + command(2).
pub const HEADER_SIZE: usize = 6;
/// Bytes after the payload: crc(2) + end(2).
pub const TRAILER_SIZE: usize = 4;
/// Capacity of a single packet buffer.
pub const FRAME_CAPACITY: usize = 512;
/// Largest payload that fits in one packet.
pub const MAX_PAYLOAD_SIZE: usize = FRAME_CAPACITY - HEADER_SIZE - TRAILER_SIZE;

// ============================================================================
// Bolus Control
// ============================================================================

/// Stop a running bolus.
pub const CMD_MEALINS_STOP: u16 = 0x0101;
/// Start a bolus.
pub const CMD_MEALINS_START_DATA: u16 = 0x0102;
/// Start a bolus with a delivery speed.
pub const CMD_MEALINS_START_DATA_SPEED: u16 = 0x0104;

// ============================================================================
// Status
// ============================================================================

/// Remaining insulin of the running bolus.
pub const CMD_PUMP_THIS_REMAINDER_MEAL_INS: u16 = 0x0202;
/// Current calculator ratios.
pub const CMD_PUMP_CALCULATION_SETTING: u16 = 0x0204;
/// Temporary basal status.
pub const CMD_PUMP_EXERCISE_MODE: u16 = 0x0205;
/// Extended bolus status.
pub const CMD_PUMP_EXPANS_INS_I: u16 = 0x0207;
/// Basic status (basal, battery, reservoir).
pub const CMD_PUMP_INITVIEW_I: u16 = 0x020A;
/// General status.
pub const CMD_PUMP_STATUS: u16 = 0x020B;

// ============================================================================
// Connection Init
// ============================================================================

/// Pump time at connect.
pub const CMD_PUMPINIT_TIME_INFO: u16 = 0x0301;
/// Bolus configuration at connect.
pub const CMD_PUMPINIT_BOLUS_INFO: u16 = 0x0302;
/// Basic status at connect.
pub const CMD_PUMPINIT_INIT_INFO: u16 = 0x0303;
/// Option bytes and pump password at connect.
pub const CMD_PUMPINIT_OPTION: u16 = 0x0304;

// ============================================================================
// Set Commands
// ============================================================================

/// Start a temporary basal.
pub const CMD_PUMPSET_EXERCISE_S: u16 = 0x0401;
/// Write a carbohydrate history entry.
pub const CMD_PUMPSET_HIS_S: u16 = 0x0402;
/// Stop the temporary basal.
pub const CMD_PUMPSET_EXERCISE_STOP: u16 = 0x0403;
/// Stop the extended bolus.
pub const CMD_PUMPSET_EXPANS_INS_STOP: u16 = 0x0406;
/// Start an extended bolus.
pub const CMD_PUMPSET_EXPANS_INS_S: u16 = 0x0407;

// ============================================================================
// Device Events
// ============================================================================

/// Pump system error report.
pub const CMD_PUMPOWAY_SYSTEM_STATUS: u16 = 0x0601;

// ============================================================================
// Connection
// ============================================================================

/// Open a PC communication session.
pub const CMD_CONNECT: u16 = 0x3001;
/// Close the PC communication session.
pub const CMD_DISCONNECT: u16 = 0x3002;

// ============================================================================
// History
// ============================================================================

/// Bolus history.
pub const CMD_HISTORY_MEAL_INS: u16 = 0x3101;
/// Daily insulin totals.
pub const CMD_HISTORY_DAY_INS: u16 = 0x3102;
/// Glucose history.
pub const CMD_HISTORY_GLUCOSE: u16 = 0x3104;
/// Alarm history.
pub const CMD_HISTORY_ALARM: u16 = 0x3105;
/// Error history.
pub const CMD_HISTORY_ERROR: u16 = 0x3106;
/// Carbohydrate history.
pub const CMD_HISTORY_CARBOHY: u16 = 0x3107;
/// Refill history.
pub const CMD_HISTORY_REFILL: u16 = 0x3108;
/// Suspend history.
pub const CMD_HISTORY_SUSPEND: u16 = 0x3109;
/// Basal-hour history.
pub const CMD_HISTORY_BASAL_HOUR: u16 = 0x310A;
/// End of a per-category history stream.
pub const CMD_HISTORY_DONE: u16 = 0x31F1;
/// End of the "all" history stream.
pub const CMD_HISTORY_ALL_DONE: u16 = 0x41F1;
/// Complete history, all record types.
pub const CMD_HISTORY_ALL: u16 = 0x41F2;
/// End of the "new" history stream.
pub const CMD_HISTORY_NEW_DONE: u16 = 0x42F1;
/// Records not yet read by the host.
pub const CMD_HISTORY_NEW: u16 = 0x42F2;
/// Event history (v2 firmware).
pub const CMD_HISTORY_EVENTS_V2: u16 = 0xE003;

// ============================================================================
// Settings (read)
// ============================================================================

/// Basal profile of the active profile.
pub const CMD_SETTING_V_BASAL_INS_I: u16 = 0x3202;
/// Meal/bolus settings.
pub const CMD_SETTING_V_MEAL_SETTING_I: u16 = 0x3203;
/// Current CIR/CF ratios.
pub const CMD_SETTING_V_CCC_I: u16 = 0x3204;
/// Maximum bolus, basal and daily totals.
pub const CMD_SETTING_V_MAX_VALUE_I: u16 = 0x3205;
/// All four basal profiles.
pub const CMD_SETTING_V_BASAL_PROFILE_ALL: u16 = 0x3206;
/// Serial number and shipping data.
pub const CMD_SETTING_V_SHIPPING_I: u16 = 0x3207;
/// Glucose units and easy mode.
pub const CMD_SETTING_V_GLUCOSE_AND_EASY: u16 = 0x3209;
/// Pump clock.
pub const CMD_SETTING_V_TIME_I: u16 = 0x320A;
/// User options block.
pub const CMD_SETTING_V_USER_OPTIONS: u16 = 0x320B;
/// Active basal profile number.
pub const CMD_SETTING_V_PROFILE_NUMBER: u16 = 0x320C;
/// CIR/CF for the four day periods.
pub const CMD_SETTING_V_CIR_CF_VALUE: u16 = 0x320D;

// ============================================================================
// Settings (write)
// ============================================================================

/// Write the basal profile of the active profile.
pub const CMD_SETTING_BASAL_INS_S: u16 = 0x3302;
/// Write a numbered basal profile.
pub const CMD_SETTING_BASAL_PROFILE_S: u16 = 0x3306;
/// Write the user options block.
pub const CMD_SETTING_USER_OPTIONS_S: u16 = 0x330B;
/// Switch the active basal profile.
pub const CMD_SETTING_PROFILE_NUMBER_S: u16 = 0x330C;

// ============================================================================
// Model Check
// ============================================================================

/// Hardware model and protocol version.
pub const CMD_PUMP_CHECK_VALUE: u16 = 0xF0F1;

// ============================================================================
// History Record Codes
// ============================================================================

/// Bolus record.
pub const RECORD_TYPE_BOLUS: u8 = 0x01;
/// Daily totals record.
pub const RECORD_TYPE_DAILY: u8 = 0x02;
/// Prime record.
pub const RECORD_TYPE_PRIME: u8 = 0x03;
/// Error record.
pub const RECORD_TYPE_ERROR: u8 = 0x04;
/// Refill record.
pub const RECORD_TYPE_REFILL: u8 = 0x05;
/// Basal-hour record.
pub const RECORD_TYPE_BASALHOUR: u8 = 0x06;
/// Temporary basal record.
pub const RECORD_TYPE_TB: u8 = 0x07;
/// Glucose record.
pub const RECORD_TYPE_GLUCOSE: u8 = 0x08;
/// Carbohydrate record.
pub const RECORD_TYPE_CARBO: u8 = 0x09;
/// Alarm record.
pub const RECORD_TYPE_ALARM: u8 = 0x0A;
/// Suspend record.
pub const RECORD_TYPE_SUSPEND: u8 = 0x0B;
/// End-of-stream sentinel in the record-code position.
pub const RECORD_END_OF_STREAM: u8 = 0xFF;

// ============================================================================
// Command Results
// ============================================================================

/// Result byte of an accepted set command.
pub const RESULT_ACCEPTED: u8 = 1;
/// Result byte of an accepted bolus start.
pub const RESULT_BOLUS_ACCEPTED: u8 = 2;

// ============================================================================
// Misc
// ============================================================================

/// Marker byte the pump expects inside a carbohydrate entry.
pub const CARBS_ENTRY_MARKER: u8 = 0x43;
/// XOR key applied to the pump password on the wire.
pub const PASSWORD_XOR_KEY: u16 = 0x3463;
/// Hardware model code of export (non-Korean) pumps.
pub const HW_MODEL_EXPORT: u8 = 0x01;
/// Insulin units per reservoir/daily-total count.
pub const INSULIN_COUNTS_PER_UNIT: f64 = 750.0;
/// Entries in a basal profile.
pub const BASAL_PROFILE_ENTRIES: usize = 24;
/// Number of basal profiles the pump stores.
pub const BASAL_PROFILE_COUNT: usize = 4;
