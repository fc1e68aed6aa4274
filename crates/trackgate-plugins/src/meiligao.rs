//! Meiligao (VT300/GT60 family) binary-framed protocol with ASCII payloads.
//!
//! Frames are `$$`, a big-endian total length, a 7-byte BCD device id padded
//! with `f` nibbles, a command word, the payload, a CCITT CRC over everything
//! before it, and `\r\n`. Position payloads are GPRMC-style comma-separated
//! text.

use trackgate_core::{keys, Command, PositionRecord};
use trackgate_protocol::bytes::{bcd_to_string, be_u16};
use trackgate_protocol::checksum::{crc16_ccitt, luhn_check_digit};
use trackgate_protocol::frame::{Endianness, FrameDecoder, LengthPrefixedDecoder};
use trackgate_protocol::{
    ConnectionContext, CoordinateFormat, DateTimeBuilder, Pattern, PatternBuilder, ProtocolPlugin,
};

const PROTOCOL: &str = "meiligao";

const MSG_LOGIN: u16 = 0x5000;
const MSG_LOGIN_RESPONSE: u16 = 0x4000;
const MSG_POSITION: u16 = 0x9955;
const MSG_ALARM: u16 = 0x9999;
const MSG_TRACK_ON_DEMAND: u16 = 0x4101;

pub struct MeiligaoPlugin {
    pattern: Pattern,
}

impl MeiligaoPlugin {
    pub fn new() -> Self {
        let pattern = PatternBuilder::new()
            .number("(dd)(dd)(dd).?d*,")        // time (hhmmss)
            .expression("([AV]),")              // validity
            .number("(d+)(dd.d+),")             // latitude (ddmm.mmmm)
            .expression("([NS]),")
            .number("(d+)(dd.d+),")             // longitude (dddmm.mmmm)
            .expression("([EW]),")
            .number("(d+.?d*)?,")               // speed (knots)
            .number("(d+.?d*)?,")               // course
            .number("(dd)(dd)(dd)")             // date (ddmmyy)
            .expression("[^|]*")
            .expression(r"(?:\|(\d+\.?\d*)?")   // hdop
            .expression(r"\|(-?\d+\.?\d*)?)?")  // altitude
            .any()
            .compile();
        Self { pattern }
    }

    /// Unique-id candidates for the 7-byte BCD field. A 14-digit id is also
    /// tried with its Luhn check digit appended, matching trackers that
    /// report the IMEI without it.
    fn id_candidates(id: &[u8]) -> Vec<String> {
        let hex = bcd_to_string(id);
        let digits = hex.trim_end_matches('f');
        let mut candidates = vec![digits.to_string()];
        let trimmed = digits.trim_start_matches('0');
        if trimmed != digits {
            candidates.push(trimmed.to_string());
        }
        if digits.len() == 14 {
            if let Some(check) = luhn_check_digit(digits) {
                candidates.push(format!("{digits}{check}"));
            }
        }
        candidates
    }

    fn decode_position(&self, device_id: u64, data: &str) -> Option<PositionRecord> {
        let mut parser = self.pattern.parse(data)?;

        let hour = parser.next_int_or(0) as u32;
        let minute = parser.next_int_or(0) as u32;
        let second = parser.next_int_or(0) as u32;

        let mut position = PositionRecord::new(PROTOCOL, device_id);
        position.valid = parser.next()? == "A";
        position.latitude = parser.next_coordinate(CoordinateFormat::DegMinHem);
        position.longitude = parser.next_coordinate(CoordinateFormat::DegMinHem);
        position.speed = parser.next_double_or(0.0);
        position.course = parser.next_double_or(0.0);

        let day = parser.next_int_or(0) as u32;
        let month = parser.next_int_or(0) as u32;
        let year = parser.next_int_or(0) as i32;
        position.set_time(
            DateTimeBuilder::new()
                .date_reverse(day, month, year)
                .time(hour, minute, second)
                .build()?,
        );

        if let Some(hdop) = parser.next_double() {
            position.set(keys::HDOP, hdop);
        }
        position.altitude = parser.next_double_or(0.0);

        Some(position)
    }
}

impl Default for MeiligaoPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_alarm(code: u8) -> Option<&'static str> {
    match code {
        0x01 => Some("sos"),
        0x10 => Some("lowBattery"),
        0x11 => Some("overspeed"),
        0x12 => Some("geofence"),
        _ => None,
    }
}

/// Frame an outbound message for the given raw 7-byte id.
fn build_frame(id: &[u8; 7], command: u16, data: &[u8]) -> Vec<u8> {
    let total = 2 + 2 + 7 + 2 + data.len() + 2 + 2;
    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(b"$$");
    frame.extend_from_slice(&(total as u16).to_be_bytes());
    frame.extend_from_slice(id);
    frame.extend_from_slice(&command.to_be_bytes());
    frame.extend_from_slice(data);
    let crc = crc16_ccitt(&frame);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame.extend_from_slice(b"\r\n");
    frame
}

/// Pack a decimal unique id into the 7-byte field, `f`-padded on the right.
fn id_bcd(digits: &str) -> Option<[u8; 7]> {
    if digits.len() > 14 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{digits:f<14}");
    let bytes = padded.as_bytes();
    let mut out = [0u8; 7];
    for (i, slot) in out.iter_mut().enumerate() {
        let nibble = |b: u8| if b == b'f' { 0xf } else { b - b'0' };
        *slot = (nibble(bytes[2 * i]) << 4) | nibble(bytes[2 * i + 1]);
    }
    Some(out)
}

impl ProtocolPlugin for MeiligaoPlugin {
    fn name(&self) -> &'static str {
        PROTOCOL
    }

    fn frame_decoder(&self, max_frame_size: usize) -> Box<dyn FrameDecoder> {
        // Declared length counts the whole frame, header and trailer
        // included.
        Box::new(
            LengthPrefixedDecoder::new(2, 2, Endianness::Big, 0, max_frame_size)
                .with_header(b"$$"),
        )
    }

    fn decode(&self, ctx: &mut ConnectionContext, frame: &[u8]) -> Vec<PositionRecord> {
        if frame.len() < 17 {
            return Vec::new();
        }
        let Some(declared_crc) = be_u16(frame, frame.len() - 4) else {
            return Vec::new();
        };
        if crc16_ccitt(&frame[..frame.len() - 4]) != declared_crc {
            tracing::warn!(connection = ctx.id(), "checksum mismatch, frame dropped");
            return Vec::new();
        }

        let id: [u8; 7] = match frame[4..11].try_into() {
            Ok(id) => id,
            Err(_) => return Vec::new(),
        };
        let Some(command) = be_u16(frame, 11) else {
            return Vec::new();
        };
        let data = &frame[13..frame.len() - 4];

        let candidates = Self::id_candidates(&id);
        let candidates: Vec<&str> = candidates.iter().map(String::as_str).collect();
        let identity = ctx.resume().or_else(|| ctx.identify(&candidates));

        match command {
            MSG_LOGIN => {
                if identity.is_some() {
                    ctx.reply(build_frame(&id, MSG_LOGIN_RESPONSE, &[0x01]));
                }
                Vec::new()
            }
            MSG_POSITION | MSG_ALARM => {
                let Some(identity) = identity else {
                    return Vec::new();
                };
                let (alarm, text) = if command == MSG_ALARM {
                    match data.split_first() {
                        Some((&code, rest)) => (decode_alarm(code), rest),
                        None => return Vec::new(),
                    }
                } else {
                    (None, data)
                };
                let Ok(text) = std::str::from_utf8(text) else {
                    return Vec::new();
                };
                let mut records: Vec<_> =
                    self.decode_position(identity.id, text).into_iter().collect();
                if let (Some(alarm), Some(position)) = (alarm, records.first_mut()) {
                    position.set(keys::ALARM, alarm);
                }
                records
            }
            _ => Vec::new(),
        }
    }

    fn encode(&self, command: &Command) -> Option<Vec<u8>> {
        use trackgate_core::model::command_types::*;

        match command.command_type.as_str() {
            POSITION_SINGLE => {
                let id = id_bcd(command.get_string("uniqueId")?)?;
                Some(build_frame(&id, MSG_TRACK_ON_DEMAND, &[]))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use trackgate_core::AttributeValue;
    use trackgate_protocol::{DeviceSessionRegistry, MemoryDeviceDirectory};

    // 14-digit id; the directory stores the 15-digit IMEI with Luhn digit.
    const ID_DIGITS: &str = "35958601582980";
    const IMEI: &str = "359586015829802";

    fn context() -> ConnectionContext {
        let directory = MemoryDeviceDirectory::new();
        directory.register(11, IMEI);
        ConnectionContext::new(1, Arc::new(DeviceSessionRegistry::new(Arc::new(directory))))
    }

    fn device_frame(command: u16, data: &[u8]) -> Vec<u8> {
        let id = id_bcd(ID_DIGITS).unwrap();
        build_frame(&id, command, data)
    }

    const POSITION_DATA: &[u8] =
        b"114825.000,A,2232.9806,N,11404.9355,E,0.00,,030109,,|1.2|53";

    #[test]
    fn test_login_matches_imei_via_check_digit() {
        let plugin = MeiligaoPlugin::new();
        let mut ctx = context();

        plugin.decode(&mut ctx, &device_frame(MSG_LOGIN, &[]));
        assert_eq!(ctx.resume().unwrap().id, 11);

        let replies = ctx.take_replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(&replies[0][..2], b"$$");
        assert_eq!(be_u16(&replies[0], 11), Some(MSG_LOGIN_RESPONSE));
        assert_eq!(&replies[0][replies[0].len() - 2..], b"\r\n");
    }

    #[test]
    fn test_position_decode() {
        let plugin = MeiligaoPlugin::new();
        let mut ctx = context();
        let records = plugin.decode(&mut ctx, &device_frame(MSG_POSITION, POSITION_DATA));

        assert_eq!(records.len(), 1);
        let position = &records[0];
        assert_eq!(position.device_id, 11);
        assert!(position.valid);
        assert!((position.latitude - 22.549677).abs() < 0.0001);
        assert!((position.longitude - 114.082258).abs() < 0.0001);
        assert_eq!(position.speed, 0.0);
        assert_eq!(position.course, 0.0);
        assert_eq!(position.altitude, 53.0);
        assert_eq!(position.get(keys::HDOP), Some(&AttributeValue::Float(1.2)));
        assert_eq!(position.fix_time.to_rfc3339(), "2009-01-03T11:48:25+00:00");
    }

    #[test]
    fn test_position_without_optional_tail() {
        let plugin = MeiligaoPlugin::new();
        let mut ctx = context();
        let data = b"114825.000,A,2232.9806,N,11404.9355,E,0.00,,030109";
        let records = plugin.decode(&mut ctx, &device_frame(MSG_POSITION, data));

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].altitude, 0.0);
        assert_eq!(records[0].get(keys::HDOP), None);
    }

    #[test]
    fn test_alarm_decode() {
        let plugin = MeiligaoPlugin::new();
        let mut ctx = context();
        let mut data = vec![0x01];
        data.extend_from_slice(POSITION_DATA);
        let records = plugin.decode(&mut ctx, &device_frame(MSG_ALARM, &data));

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get(keys::ALARM), Some(&AttributeValue::String("sos".into())));
    }

    #[test]
    fn test_bad_checksum_dropped() {
        let plugin = MeiligaoPlugin::new();
        let mut ctx = context();
        let mut frame = device_frame(MSG_POSITION, POSITION_DATA);
        let at = frame.len() - 3;
        frame[at] ^= 0x55;
        assert!(plugin.decode(&mut ctx, &frame).is_empty());
    }

    #[test]
    fn test_frame_decoder_skips_garbage_and_reassembles() {
        let plugin = MeiligaoPlugin::new();
        let mut decoder = plugin.frame_decoder(1024);
        let frame = device_frame(MSG_POSITION, POSITION_DATA);

        let mut stream = b"noise".to_vec();
        stream.extend_from_slice(&frame);

        let (head, tail) = stream.split_at(stream.len() / 2);
        let mut frames = decoder.feed(head).unwrap();
        frames.extend(decoder.feed(tail).unwrap());
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_encode_track_on_demand() {
        let plugin = MeiligaoPlugin::new();
        let mut command = Command::new(11, trackgate_core::model::command_types::POSITION_SINGLE);
        command.set("uniqueId", ID_DIGITS);
        let frame = plugin.encode(&command).unwrap();

        assert_eq!(&frame[..2], b"$$");
        assert_eq!(be_u16(&frame, 2), Some(frame.len() as u16));
        assert_eq!(be_u16(&frame, 11), Some(MSG_TRACK_ON_DEMAND));
        let crc = crc16_ccitt(&frame[..frame.len() - 4]);
        assert_eq!(be_u16(&frame, frame.len() - 4), Some(crc));
    }
}
