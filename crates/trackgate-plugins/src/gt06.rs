//! GT06 (Concox) binary protocol.
//!
//! Frames open with `0x78 0x78` (one length byte) or `0x79 0x79` (two length
//! bytes) and close with `0x0d 0x0a`. The length field counts from the message
//! type through the CRC, so the full frame is `length + 5` or `length + 6`
//! bytes. The CRC is X.25 over the bytes from the length field through the
//! serial number.

use trackgate_core::{keys, units, CellTower, Command, Network, PositionRecord};
use trackgate_protocol::bytes::{be_u16, be_u32, be_uint};
use trackgate_protocol::checksum::crc16_x25;
use trackgate_protocol::frame::{FrameDecoder, FrameLength, MarkerDecoder};
use trackgate_protocol::{ConnectionContext, DateTimeBuilder, ProtocolPlugin};

const PROTOCOL: &str = "gt06";

const MSG_LOGIN: u8 = 0x01;
const MSG_GPS_LBS_1: u8 = 0x12;
const MSG_STATUS: u8 = 0x13;
const MSG_GPS_LBS_2: u8 = 0x22;
const MSG_COMMAND: u8 = 0x80;

pub struct Gt06Plugin;

impl Gt06Plugin {
    pub fn new() -> Self {
        Self
    }

    fn decode_login(&self, ctx: &mut ConnectionContext, content: &[u8], serial: u16) {
        if content.len() < 8 {
            return;
        }
        // 8 BCD bytes carry a 16-digit field; the IMEI is the trailing 15.
        let mut imei = String::with_capacity(16);
        for b in &content[..8] {
            imei.push_str(&format!("{b:02x}"));
        }
        let imei = &imei[1..];
        if ctx.identify(&[imei]).is_some() {
            ctx.reply(acknowledge(MSG_LOGIN, serial));
        }
    }

    fn decode_gps(
        &self,
        ctx: &mut ConnectionContext,
        content: &[u8],
    ) -> Option<PositionRecord> {
        let identity = ctx.resume()?;
        if content.len() < 18 {
            return None;
        }

        let mut position = PositionRecord::new(PROTOCOL, identity.id);
        position.set_time(
            DateTimeBuilder::new()
                .date(content[0] as i32, content[1] as u32, content[2] as u32)
                .time(content[3] as u32, content[4] as u32, content[5] as u32)
                .build()?,
        );
        position.set(keys::SATELLITES, (content[6] & 0x0f) as i64);

        let mut latitude = be_u32(content, 7)? as f64 / 60.0 / 30000.0;
        let mut longitude = be_u32(content, 11)? as f64 / 60.0 / 30000.0;
        position.speed = units::knots_from_kph(content[15] as f64);

        let flags = be_u16(content, 16)?;
        position.course = (flags & 0x03ff) as f64;
        position.valid = flags & (1 << 12) != 0;
        if flags & (1 << 10) == 0 {
            latitude = -latitude;
        }
        if flags & (1 << 11) != 0 {
            longitude = -longitude;
        }
        position.latitude = latitude;
        position.longitude = longitude;

        // Cell tower block, present on the GPS+LBS variants.
        if content.len() >= 26 {
            let mcc = be_u16(content, 18)?;
            let mnc = content[20] as u16;
            let lac = be_u16(content, 21)? as u32;
            let cid = be_uint(content, 23, 3)?;
            position.network = Some(Network::single(CellTower::new(mcc, mnc, lac, cid)));
        }

        Some(position)
    }
}

impl Default for Gt06Plugin {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the standard four-byte acknowledgement for a message type.
fn acknowledge(msg_type: u8, serial: u16) -> Vec<u8> {
    let checked = [0x05, msg_type, (serial >> 8) as u8, serial as u8];
    let crc = crc16_x25(&checked);
    let mut frame = vec![0x78, 0x78];
    frame.extend_from_slice(&checked);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame.extend_from_slice(&[0x0d, 0x0a]);
    frame
}

/// Wrap `content` (type byte through last payload byte) into a `0x78 0x78`
/// frame with serial number, CRC and trailer.
fn wrap(content: &[u8], serial: u16) -> Vec<u8> {
    let length = (content.len() + 4) as u8;
    let mut checked = vec![length];
    checked.extend_from_slice(content);
    checked.extend_from_slice(&serial.to_be_bytes());
    let crc = crc16_x25(&checked);

    let mut frame = vec![0x78, 0x78];
    frame.extend_from_slice(&checked);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame.extend_from_slice(&[0x0d, 0x0a]);
    frame
}

impl ProtocolPlugin for Gt06Plugin {
    fn name(&self) -> &'static str {
        PROTOCOL
    }

    fn frame_decoder(&self, max_frame_size: usize) -> Box<dyn FrameDecoder> {
        Box::new(MarkerDecoder::new(max_frame_size, |buf| {
            match (buf.first(), buf.get(1)) {
                (Some(&0x78), Some(&0x78)) => match buf.get(2) {
                    Some(&len) => FrameLength::Total(len as usize + 5),
                    None => FrameLength::NeedMore,
                },
                (Some(&0x79), Some(&0x79)) => match be_u16(buf, 2) {
                    Some(len) => FrameLength::Total(len as usize + 6),
                    None => FrameLength::NeedMore,
                },
                (Some(_), Some(_)) => FrameLength::Unrecognized,
                _ => FrameLength::NeedMore,
            }
        }))
    }

    fn decode(&self, ctx: &mut ConnectionContext, frame: &[u8]) -> Vec<PositionRecord> {
        // Short-header frames only; the long header carries photo and other
        // bulk payloads this gateway does not consume.
        if frame.len() < 10 || frame[0] != 0x78 {
            return Vec::new();
        }
        let msg_type = frame[3];
        let Some(serial) = be_u16(frame, frame.len() - 6) else {
            return Vec::new();
        };
        let content = &frame[4..frame.len() - 6];

        match msg_type {
            MSG_LOGIN => {
                self.decode_login(ctx, content, serial);
                Vec::new()
            }
            MSG_STATUS => {
                if let Some(identity) = ctx.resume() {
                    tracing::debug!(device = identity.id, "status heartbeat");
                    ctx.reply(acknowledge(MSG_STATUS, serial));
                }
                Vec::new()
            }
            MSG_GPS_LBS_1 | MSG_GPS_LBS_2 => {
                self.decode_gps(ctx, content).into_iter().collect()
            }
            _ => Vec::new(),
        }
    }

    fn encode(&self, command: &Command) -> Option<Vec<u8>> {
        use trackgate_core::model::command_types::*;

        let text = match command.command_type.as_str() {
            ENGINE_STOP => "DYD,000000#",
            ENGINE_RESUME => "HFYD,000000#",
            _ => return None,
        };
        let mut content = vec![MSG_COMMAND, (text.len() + 4) as u8];
        content.extend_from_slice(&[0, 0, 0, 0]); // server flag
        content.extend_from_slice(text.as_bytes());
        Some(wrap(&content, 0))
    }
}
