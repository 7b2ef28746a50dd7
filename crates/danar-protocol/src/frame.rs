//! Packet envelope encoding/decoding.
//!
//! Every message travels inside the same envelope. The length byte counts
//! the type byte, the two command bytes and the payload; the CRC covers the
//! same span.
//!
//! ```text
//! +------+------+-----+------+--------+--------+-------------+--------+--------+------+------+
//! | 0x7E | 0x7E | len | 0xF1 | cmd_hi | cmd_lo | payload ... | crc_hi | crc_lo | 0x2E | 0x2E |
//! +------+------+-----+------+--------+--------+-------------+--------+--------+------+------+
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::constants::*;
use crate::error::*;

/// A decoded packet: command code plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Command code from the packet header.
    pub command: u16,
    /// Payload bytes between the header and the CRC.
    pub payload: Vec<u8>,
}

/// CRC-16 used by the pump (CCITT polynomial, zero initial value).
pub fn checksum(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc = crc.swap_bytes();
        crc ^= byte as u16;
        crc ^= (crc & 0xFF) >> 4;
        crc ^= crc << 12;
        crc ^= (crc & 0xFF) << 5;
    }
    crc
}

/// Parse one complete packet.
pub fn parse_packet(packet: &[u8]) -> ProtocolResult<RawFrame> {
    if packet.len() < HEADER_SIZE + TRAILER_SIZE {
        return Err(ProtocolError::BadEnvelope(format!(
            "packet of {} bytes is shorter than header and trailer",
            packet.len()
        )));
    }
    if packet[0] != PACKET_START || packet[1] != PACKET_START {
        return Err(ProtocolError::BadEnvelope("missing start marker".to_string()));
    }
    let len = packet[2] as usize;
    if len < 3 || packet.len() != len + 7 {
        return Err(ProtocolError::BadEnvelope(format!(
            "length byte {} does not match packet of {} bytes",
            len,
            packet.len()
        )));
    }
    if packet[3] != PACKET_TYPE {
        return Err(ProtocolError::BadEnvelope(format!(
            "unexpected packet type 0x{:02X}",
            packet[3]
        )));
    }
    let crc_at = 3 + len;
    if packet[crc_at + 2] != PACKET_END || packet[crc_at + 3] != PACKET_END {
        return Err(ProtocolError::BadEnvelope("missing end marker".to_string()));
    }

    let expected = checksum(&packet[3..crc_at]);
    let actual = u16::from_be_bytes([packet[crc_at], packet[crc_at + 1]]);
    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }

    Ok(RawFrame {
        command: u16::from_be_bytes([packet[4], packet[5]]),
        payload: packet[HEADER_SIZE..crc_at].to_vec(),
    })
}

/// A codec for reading and writing enveloped packets.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl FrameCodec {
    /// Create a new frame codec.
    pub fn new() -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(FRAME_CAPACITY),
        }
    }

    /// Wrap a payload in the packet envelope.
    pub fn encode(command: u16, payload: &[u8]) -> ProtocolResult<Vec<u8>> {
        if payload.len() > MAX_PAYLOAD_SIZE || payload.len() + 3 > u8::MAX as usize {
            return Err(ProtocolError::FrameOverflow {
                position: 0,
                width: payload.len(),
                capacity: MAX_PAYLOAD_SIZE.min(u8::MAX as usize - 3),
            });
        }

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + TRAILER_SIZE);
        buf.put_u8(PACKET_START);
        buf.put_u8(PACKET_START);
        buf.put_u8((payload.len() + 3) as u8);
        buf.put_u8(PACKET_TYPE);
        buf.put_u16(command);
        buf.extend_from_slice(payload);
        let crc = checksum(&buf[3..]);
        buf.put_u16(crc);
        buf.put_u8(PACKET_END);
        buf.put_u8(PACKET_END);
        Ok(buf)
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode a complete packet from the buffer.
    ///
    /// Returns `Ok(None)` if more data is needed. A packet that fails
    /// validation is dropped from the buffer and reported as an error, so the
    /// next call continues with the following packet.
    pub fn decode(&mut self) -> ProtocolResult<Option<RawFrame>> {
        // Discard anything before a start marker pair
        while self.buffer.len() >= 2
            && !(self.buffer[0] == PACKET_START && self.buffer[1] == PACKET_START)
        {
            self.buffer.advance(1);
        }

        if self.buffer.len() < 3 {
            return Ok(None);
        }

        let total = self.buffer[2] as usize + 7;
        if self.buffer.len() < total {
            return Ok(None);
        }

        match parse_packet(&self.buffer[..total]) {
            Ok(frame) => {
                self.buffer.advance(total);
                Ok(Some(frame))
            }
            Err(err @ ProtocolError::BadEnvelope(_)) => {
                // The start marker was not a real packet start; resync past it
                self.buffer.advance(1);
                Err(err)
            }
            Err(err) => {
                self.buffer.advance(total);
                Err(err)
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_reference_vector() {
        assert_eq!(checksum(b"123456789"), 0x31C3);
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_encode_layout() {
        let packet = FrameCodec::encode(CMD_MEALINS_START_DATA, &[0x00, 0x7D]).unwrap();
        assert_eq!(packet.len(), HEADER_SIZE + 2 + TRAILER_SIZE);
        assert_eq!(&packet[..6], &[0x7E, 0x7E, 0x05, 0xF1, 0x01, 0x02]);
        assert_eq!(&packet[6..8], &[0x00, 0x7D]);
        assert_eq!(&packet[10..], &[0x2E, 0x2E]);
        let crc = checksum(&packet[3..8]);
        assert_eq!(&packet[8..10], &crc.to_be_bytes());
    }

    #[test]
    fn test_frame_codec_encode_decode() {
        let mut codec = FrameCodec::new();
        let packet = FrameCodec::encode(CMD_SETTING_V_PROFILE_NUMBER, &[0x02]).unwrap();
        codec.push(&packet);
        let frame = codec.decode().unwrap().expect("should decode frame");
        assert_eq!(frame.command, CMD_SETTING_V_PROFILE_NUMBER);
        assert_eq!(frame.payload, vec![0x02]);
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_frame_codec_partial() {
        let mut codec = FrameCodec::new();
        let packet = FrameCodec::encode(CMD_PUMP_STATUS, &[1, 2, 3, 4, 5]).unwrap();

        codec.push(&packet[..4]);
        assert!(codec.decode().unwrap().is_none());

        codec.push(&packet[4..]);
        let frame = codec.decode().unwrap().expect("should decode frame");
        assert_eq!(frame.payload, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_frame_codec_skips_garbage_and_reads_multiple() {
        let mut codec = FrameCodec::new();
        let first = FrameCodec::encode(CMD_CONNECT, &[]).unwrap();
        let second = FrameCodec::encode(CMD_DISCONNECT, &[0xAA]).unwrap();

        codec.push(&[0x00, 0x13, 0x2E]);
        codec.push(&first);
        codec.push(&second);

        assert_eq!(codec.decode().unwrap().unwrap().command, CMD_CONNECT);
        assert_eq!(codec.decode().unwrap().unwrap().command, CMD_DISCONNECT);
        assert!(codec.decode().unwrap().is_none());
    }

    #[test]
    fn test_corrupted_packet_is_dropped() {
        let mut codec = FrameCodec::new();
        let mut bad = FrameCodec::encode(CMD_PUMP_STATUS, &[1, 2, 3]).unwrap();
        bad[7] ^= 0xFF;
        let good = FrameCodec::encode(CMD_CONNECT, &[]).unwrap();

        codec.push(&bad);
        codec.push(&good);

        assert!(matches!(
            codec.decode(),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
        assert_eq!(codec.decode().unwrap().unwrap().command, CMD_CONNECT);
    }

    #[test]
    fn test_parse_rejects_bad_markers() {
        let mut packet = FrameCodec::encode(CMD_CONNECT, &[]).unwrap();
        let last = packet.len() - 1;
        packet[last] = 0x00;
        assert!(matches!(
            parse_packet(&packet),
            Err(ProtocolError::BadEnvelope(_))
        ));
    }
}
