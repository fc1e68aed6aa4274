//! Huabao / JT808 binary protocol.
//!
//! Frames are delimited by `0x7e` and byte-stuffed: `0x7d 0x01` encodes a
//! literal `0x7d`, `0x7d 0x02` a literal `0x7e`. The unstuffed frame is a
//! 12-byte header (message type, attributes, BCD phone number, index), the
//! body, and a trailing XOR checksum over everything before it.

use trackgate_core::{keys, units, Command, PositionRecord};
use trackgate_protocol::bytes::{bcd_byte, bcd_to_string, be_u16, be_u32};
use trackgate_protocol::checksum::xor_sum;
use trackgate_protocol::frame::{FrameDecoder, StuffedDecoder};
use trackgate_protocol::{ConnectionContext, DateTimeBuilder, ProtocolPlugin};

const PROTOCOL: &str = "huabao";

const MSG_GENERAL_RESPONSE: u16 = 0x8001;
const MSG_HEARTBEAT: u16 = 0x0002;
const MSG_TERMINAL_REGISTER: u16 = 0x0100;
const MSG_REGISTER_RESPONSE: u16 = 0x8100;
const MSG_TERMINAL_AUTH: u16 = 0x0102;
const MSG_TERMINAL_CONTROL: u16 = 0x8105;
const MSG_LOCATION_REPORT: u16 = 0x0200;
const MSG_LOCATION_BATCH: u16 = 0x0704;

const HEADER_LEN: usize = 12;

pub struct HuabaoPlugin;

impl HuabaoPlugin {
    pub fn new() -> Self {
        Self
    }

    fn identify(ctx: &mut ConnectionContext, phone: &[u8]) -> Option<u64> {
        let hex = bcd_to_string(phone);
        let trimmed = hex.trim_start_matches('0');
        ctx.resume()
            .or_else(|| ctx.identify(&[hex.as_str(), trimmed]))
            .map(|identity| identity.id)
    }

    fn decode_location(&self, device_id: u64, body: &[u8]) -> Option<PositionRecord> {
        if body.len() < 28 {
            return None;
        }
        let alarm = be_u32(body, 0)?;
        let status = be_u32(body, 4)?;

        let mut position = PositionRecord::new(PROTOCOL, device_id);
        position.valid = status & (1 << 1) != 0;
        position.set(keys::IGNITION, status & 1 != 0);
        if alarm & 1 != 0 {
            position.set(keys::ALARM, "sos");
        }

        let mut latitude = be_u32(body, 8)? as f64 * 0.000001;
        let mut longitude = be_u32(body, 12)? as f64 * 0.000001;
        if status & (1 << 2) != 0 {
            latitude = -latitude;
        }
        if status & (1 << 3) != 0 {
            longitude = -longitude;
        }
        position.latitude = latitude;
        position.longitude = longitude;

        position.altitude = be_u16(body, 16)? as f64;
        position.speed = units::knots_from_kph(be_u16(body, 18)? as f64 * 0.1);
        position.course = be_u16(body, 20)? as f64;

        let time = &body[22..28];
        position.set_time(
            DateTimeBuilder::new()
                .date(
                    bcd_byte(time[0]) as i32,
                    bcd_byte(time[1]),
                    bcd_byte(time[2]),
                )
                .time(bcd_byte(time[3]), bcd_byte(time[4]), bcd_byte(time[5]))
                .build()?,
        );

        Some(position)
    }

    fn decode_batch(&self, device_id: u64, body: &[u8]) -> Vec<PositionRecord> {
        let Some(count) = be_u16(body, 0) else {
            return Vec::new();
        };
        let Some(&batch_type) = body.get(2) else {
            return Vec::new();
        };

        let mut positions = Vec::with_capacity(count as usize);
        let mut offset = 3;
        while offset + 2 <= body.len() {
            let Some(len) = be_u16(body, offset) else {
                break;
            };
            let start = offset + 2;
            let end = start + len as usize;
            if end > body.len() {
                break;
            }
            if let Some(mut position) = self.decode_location(device_id, &body[start..end]) {
                if batch_type == 1 {
                    position.set(keys::ARCHIVE, true);
                }
                positions.push(position);
            }
            offset = end;
        }
        positions
    }
}

impl Default for HuabaoPlugin {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble, checksum and stuff an outbound message.
fn build_response(msg_type: u16, phone: &[u8], body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(HEADER_LEN + body.len() + 1);
    payload.extend_from_slice(&msg_type.to_be_bytes());
    payload.extend_from_slice(&(body.len() as u16).to_be_bytes());
    payload.extend_from_slice(phone);
    payload.extend_from_slice(&0u16.to_be_bytes()); // platform message index
    payload.extend_from_slice(body);
    payload.push(xor_sum(&payload));

    let mut frame = vec![0x7e];
    for &b in &payload {
        match b {
            0x7d => frame.extend_from_slice(&[0x7d, 0x01]),
            0x7e => frame.extend_from_slice(&[0x7d, 0x02]),
            other => frame.push(other),
        }
    }
    frame.push(0x7e);
    frame
}

/// The standard `0x8001` acknowledgement for a device message.
fn general_response(phone: &[u8], device_index: u16, device_type: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(5);
    body.extend_from_slice(&device_index.to_be_bytes());
    body.extend_from_slice(&device_type.to_be_bytes());
    body.push(0); // success
    build_response(MSG_GENERAL_RESPONSE, phone, &body)
}

impl ProtocolPlugin for HuabaoPlugin {
    fn name(&self) -> &'static str {
        PROTOCOL
    }

    fn frame_decoder(&self, max_frame_size: usize) -> Box<dyn FrameDecoder> {
        Box::new(StuffedDecoder::new(
            max_frame_size,
            0x7e,
            0x7d,
            &[(0x01, 0x7d), (0x02, 0x7e)],
        ))
    }

    fn decode(&self, ctx: &mut ConnectionContext, frame: &[u8]) -> Vec<PositionRecord> {
        if frame.len() < HEADER_LEN + 1 {
            return Vec::new();
        }
        let Some(&checksum) = frame.last() else {
            return Vec::new();
        };
        if xor_sum(&frame[..frame.len() - 1]) != checksum {
            tracing::warn!(connection = ctx.id(), "checksum mismatch, frame dropped");
            return Vec::new();
        }

        let Some(msg_type) = be_u16(frame, 0) else {
            return Vec::new();
        };
        let Some(attributes) = be_u16(frame, 2) else {
            return Vec::new();
        };
        let body_len = (attributes & 0x03ff) as usize;
        let phone: [u8; 6] = match frame[4..10].try_into() {
            Ok(phone) => phone,
            Err(_) => return Vec::new(),
        };
        let Some(index) = be_u16(frame, 10) else {
            return Vec::new();
        };
        let body = &frame[HEADER_LEN..frame.len() - 1];
        if body.len() != body_len {
            return Vec::new();
        }

        match msg_type {
            MSG_TERMINAL_REGISTER => {
                if Self::identify(ctx, &phone).is_some() {
                    let mut response = Vec::new();
                    response.extend_from_slice(&index.to_be_bytes());
                    response.push(0); // accepted
                    response.extend_from_slice(b"authorized");
                    ctx.reply(build_response(MSG_REGISTER_RESPONSE, &phone, &response));
                }
                Vec::new()
            }
            MSG_TERMINAL_AUTH => {
                if Self::identify(ctx, &phone).is_some() {
                    ctx.reply(general_response(&phone, index, msg_type));
                }
                Vec::new()
            }
            MSG_HEARTBEAT => {
                if ctx.resume().is_some() {
                    ctx.reply(general_response(&phone, index, msg_type));
                }
                Vec::new()
            }
            MSG_LOCATION_REPORT => {
                let Some(device_id) = Self::identify(ctx, &phone) else {
                    return Vec::new();
                };
                ctx.reply(general_response(&phone, index, msg_type));
                self.decode_location(device_id, body).into_iter().collect()
            }
            MSG_LOCATION_BATCH => {
                let Some(device_id) = Self::identify(ctx, &phone) else {
                    return Vec::new();
                };
                ctx.reply(general_response(&phone, index, msg_type));
                self.decode_batch(device_id, body)
            }
            _ => Vec::new(),
        }
    }

    fn encode(&self, command: &Command) -> Option<Vec<u8>> {
        use trackgate_core::model::command_types::*;

        let control = match command.command_type.as_str() {
            ENGINE_STOP => 0x64u8,
            ENGINE_RESUME => 0x65u8,
            _ => return None,
        };
        let phone = phone_bcd(command.get_string("uniqueId")?)?;
        Some(build_response(MSG_TERMINAL_CONTROL, &phone, &[control]))
    }
}

/// Pack a decimal phone number into 6 BCD bytes, left-padded with zeros.
fn phone_bcd(digits: &str) -> Option<[u8; 6]> {
    if digits.len() > 12 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{digits:0>12}");
    let bytes = padded.as_bytes();
    let mut out = [0u8; 6];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = ((bytes[2 * i] - b'0') << 4) | (bytes[2 * i + 1] - b'0');
    }
    Some(out)
}
