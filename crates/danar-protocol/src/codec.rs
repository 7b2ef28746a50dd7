//! Field-level payload codec.
//!
//! Every message payload is a fixed layout of big-endian integers, BCD
//! date/time bytes and 24-entry basal arrays. [`PayloadReader`] reads those
//! fields from a received payload, [`FrameWriter`] lays them out into a
//! fixed-capacity buffer for an outbound command.
//!
//! All accesses are bounds checked. A read past the end of the payload or a
//! write past the capacity returns an error instead of truncating.
//!
//! ## Date/time layouts
//!
//! | Field            | Size | Bytes (each BCD)       |
//! |------------------|------|------------------------|
//! | date             | 3    | year month day         |
//! | datetime         | 5    | year month day hour min|
//! | datetime + secs  | 6    | year month day hour min sec |
//!
//! Years are transmitted as an offset from 2000.

use crate::constants::*;
use crate::error::*;
use crate::types::*;

/// Base year of the two-digit year fields.
pub const YEAR_BASE: u16 = 2000;

/// Decode one BCD byte. Nibbles above 9 decode to their raw value.
pub fn bcd_to_u8(byte: u8) -> u8 {
    (byte >> 4) * 10 + (byte & 0x0F)
}

/// Encode a value 0-99 as one BCD byte.
pub fn u8_to_bcd(value: u8) -> ProtocolResult<u8> {
    if value > 99 {
        return Err(ProtocolError::InvalidBcd(value as u32));
    }
    Ok(((value / 10) << 4) | (value % 10))
}

/// Read-only view over a received payload.
#[derive(Debug, Clone, Copy)]
pub struct PayloadReader<'a> {
    command: u16,
    data: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    /// Wrap the payload of a message with the given command code.
    pub fn new(command: u16, data: &'a [u8]) -> Self {
        PayloadReader { command, data }
    }

    /// Command code of the payload.
    pub fn command(&self) -> u16 {
        self.command
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Underlying bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Fail unless the payload holds at least `min` bytes.
    pub fn require(&self, min: usize) -> ProtocolResult<()> {
        if self.data.len() < min {
            return Err(ProtocolError::FrameTooShort {
                command: self.command,
                expected: min,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    fn field(&self, offset: usize, width: usize) -> ProtocolResult<&'a [u8]> {
        offset
            .checked_add(width)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(ProtocolError::OffsetOutOfBounds {
                offset,
                width,
                len: self.data.len(),
            })
    }

    /// Read one byte.
    pub fn read_u8_at(&self, offset: usize) -> ProtocolResult<u8> {
        Ok(self.field(offset, 1)?[0])
    }

    /// Read a flag byte (1 means set).
    pub fn read_flag_at(&self, offset: usize) -> ProtocolResult<bool> {
        Ok(self.read_u8_at(offset)? == 1)
    }

    /// Read a big-endian u16.
    pub fn read_u16_at(&self, offset: usize) -> ProtocolResult<u16> {
        let b = self.field(offset, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a big-endian 24-bit value.
    pub fn read_u24_at(&self, offset: usize) -> ProtocolResult<u32> {
        let b = self.field(offset, 3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    /// Read a u16 in hundredths and scale it.
    pub fn read_hundredths_at(&self, offset: usize) -> ProtocolResult<f64> {
        Ok(self.read_u16_at(offset)? as f64 / 100.0)
    }

    /// Read a u24 insulin count (1/750 U) and scale it to units.
    pub fn read_insulin_counts_at(&self, offset: usize) -> ProtocolResult<f64> {
        Ok(self.read_u24_at(offset)? as f64 / INSULIN_COUNTS_PER_UNIT)
    }

    /// Read one BCD byte.
    pub fn read_bcd_at(&self, offset: usize) -> ProtocolResult<u8> {
        Ok(bcd_to_u8(self.read_u8_at(offset)?))
    }

    /// Read a 3-byte BCD date.
    pub fn read_date_at(&self, offset: usize) -> ProtocolResult<PumpDateTime> {
        let b = self.field(offset, 3)?;
        Ok(PumpDateTime::date(
            YEAR_BASE + bcd_to_u8(b[0]) as u16,
            bcd_to_u8(b[1]),
            bcd_to_u8(b[2]),
        ))
    }

    /// Read a 5-byte BCD date and time (no seconds).
    pub fn read_datetime_at(&self, offset: usize) -> ProtocolResult<PumpDateTime> {
        let b = self.field(offset, 5)?;
        Ok(PumpDateTime::new(
            YEAR_BASE + bcd_to_u8(b[0]) as u16,
            bcd_to_u8(b[1]),
            bcd_to_u8(b[2]),
            bcd_to_u8(b[3]),
            bcd_to_u8(b[4]),
            0,
        ))
    }

    /// Read a 6-byte BCD date and time with seconds.
    pub fn read_datetime_sec_at(&self, offset: usize) -> ProtocolResult<PumpDateTime> {
        let b = self.field(offset, 6)?;
        Ok(PumpDateTime::new(
            YEAR_BASE + bcd_to_u8(b[0]) as u16,
            bcd_to_u8(b[1]),
            bcd_to_u8(b[2]),
            bcd_to_u8(b[3]),
            bcd_to_u8(b[4]),
            bcd_to_u8(b[5]),
        ))
    }

    /// Read a 6-byte BCD date and time stored seconds first.
    pub fn read_datetime_sec_reversed_at(&self, offset: usize) -> ProtocolResult<PumpDateTime> {
        let b = self.field(offset, 6)?;
        Ok(PumpDateTime::new(
            YEAR_BASE + bcd_to_u8(b[5]) as u16,
            bcd_to_u8(b[4]),
            bcd_to_u8(b[3]),
            bcd_to_u8(b[2]),
            bcd_to_u8(b[1]),
            bcd_to_u8(b[0]),
        ))
    }

    /// Read 24 hourly basal rates (u16 hundredths each).
    pub fn read_basal_profile_at(&self, offset: usize) -> ProtocolResult<BasalProfile> {
        let b = self.field(offset, BASAL_PROFILE_ENTRIES * 2)?;
        let mut rates = [0.0; BASAL_PROFILE_ENTRIES];
        for (rate, pair) in rates.iter_mut().zip(b.chunks_exact(2)) {
            *rate = u16::from_be_bytes([pair[0], pair[1]]) as f64 / 100.0;
        }
        Ok(BasalProfile(rates))
    }

    /// Read a fixed-width, NUL-padded ASCII string.
    pub fn read_string_at(&self, offset: usize, width: usize) -> ProtocolResult<String> {
        let b = self.field(offset, width)?;
        let end = b.iter().position(|&c| c == 0).unwrap_or(width);
        Ok(String::from_utf8_lossy(&b[..end]).trim_end().to_string())
    }
}

/// Fixed-capacity payload builder for outbound commands.
#[derive(Debug, Clone)]
pub struct FrameWriter {
    buf: [u8; MAX_PAYLOAD_SIZE],
    position: usize,
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        FrameWriter {
            buf: [0u8; MAX_PAYLOAD_SIZE],
            position: 0,
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.position
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.position == 0
    }

    fn reserve(&mut self, width: usize) -> ProtocolResult<&mut [u8]> {
        let start = self.position;
        let end = start + width;
        if end > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameOverflow {
                position: start,
                width,
                capacity: MAX_PAYLOAD_SIZE,
            });
        }
        self.position = end;
        Ok(&mut self.buf[start..end])
    }

    /// Append one byte.
    pub fn put_u8(&mut self, value: u8) -> ProtocolResult<&mut Self> {
        self.reserve(1)?[0] = value;
        Ok(self)
    }

    /// Append a flag byte (1 or 0).
    pub fn put_flag(&mut self, value: bool) -> ProtocolResult<&mut Self> {
        self.put_u8(u8::from(value))
    }

    /// Append a big-endian u16.
    pub fn put_u16(&mut self, value: u16) -> ProtocolResult<&mut Self> {
        self.reserve(2)?.copy_from_slice(&value.to_be_bytes());
        Ok(self)
    }

    /// Append an amount as u16 hundredths.
    ///
    /// Amounts are expected to be pre-validated; out-of-range values
    /// saturate at the u16 bounds.
    pub fn put_hundredths(&mut self, value: f64) -> ProtocolResult<&mut Self> {
        self.put_u16((value * 100.0).round() as u16)
    }

    /// Append one BCD byte.
    pub fn put_bcd(&mut self, value: u8) -> ProtocolResult<&mut Self> {
        let byte = u8_to_bcd(value)?;
        self.put_u8(byte)
    }

    fn year_offset(year: u16) -> ProtocolResult<u8> {
        year.checked_sub(YEAR_BASE)
            .filter(|offset| *offset <= 99)
            .map(|offset| offset as u8)
            .ok_or(ProtocolError::InvalidBcd(year as u32))
    }

    /// Append a 6-byte BCD date and time with seconds.
    pub fn put_datetime_sec(&mut self, dt: &PumpDateTime) -> ProtocolResult<&mut Self> {
        let year = Self::year_offset(dt.year)?;
        self.put_bcd(year)?
            .put_bcd(dt.month)?
            .put_bcd(dt.day)?
            .put_bcd(dt.hour)?
            .put_bcd(dt.minute)?
            .put_bcd(dt.second)
    }

    /// Append 24 hourly basal rates.
    pub fn put_basal_profile(&mut self, profile: &BasalProfile) -> ProtocolResult<&mut Self> {
        for rate in profile.0.iter() {
            self.put_hundredths(*rate)?;
        }
        Ok(self)
    }

    /// Append raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> ProtocolResult<&mut Self> {
        self.reserve(bytes.len())?.copy_from_slice(bytes);
        Ok(self)
    }

    /// Bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.position]
    }

    /// Consume the writer and return the payload.
    pub fn finish(self) -> Vec<u8> {
        self.buf[..self.position].to_vec()
    }
}
