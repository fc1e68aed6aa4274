//! GPS103 (TK102/TK103 family) text protocol.
//!
//! Sentences are ASCII, delimited by `;`. A connection opens with a
//! `##,imei:...,A` handshake answered by `LOAD`, sends bare-IMEI heartbeats
//! answered by `ON`, and reports positions as comma-separated fields with
//! degrees-plus-decimal-minutes coordinates.

use trackgate_core::{keys, Command, PositionRecord};
use trackgate_protocol::frame::{DelimitedDecoder, FrameDecoder};
use trackgate_protocol::{
    ConnectionContext, CoordinateFormat, DateTimeBuilder, Pattern, PatternBuilder, ProtocolPlugin,
};

const PROTOCOL: &str = "gps103";

pub struct Gps103Plugin {
    pattern: Pattern,
}

impl Gps103Plugin {
    pub fn new() -> Self {
        let pattern = PatternBuilder::new()
            .text("imei:")
            .number("(d+),")                    // imei
            .expression("([^,]*),")             // alarm
            .number("(dd)(dd)(dd)")             // local date (yymmdd)
            .number("(dd)(dd),")                // local time (hhmm)
            .expression("([^,]*),")             // phone
            .text("F,")
            .number("(dd)(dd)(dd)")             // utc time (hhmmss)
            .number("(?:.d+)?,")
            .expression("([AV]),")              // validity
            .number("(d+)(dd.d+),")             // latitude (ddmm.mmmm)
            .expression("([NS]),")
            .number("(d+)(dd.d+),")             // longitude (dddmm.mmmm)
            .expression("([EW]),?")
            .number("(d+.?d*)?,?")              // speed (knots)
            .number("(d+.?d*)?")                // course
            .any()
            .compile();
        Self { pattern }
    }

    fn decode_position(&self, ctx: &mut ConnectionContext, sentence: &str) -> Option<PositionRecord> {
        let mut parser = self.pattern.parse(sentence)?;

        let imei = parser.next()?.to_string();
        let identity = ctx
            .resume()
            .or_else(|| ctx.identify(&[imei.as_str()]))?;

        let alarm = parser.next().map(str::to_string);

        let year = parser.next_int_or(0);
        let month = parser.next_int_or(0);
        let day = parser.next_int_or(0);
        parser.skip(2); // local hh:mm; the fix carries UTC time below
        parser.skip(1); // phone
        let hour = parser.next_int_or(0);
        let minute = parser.next_int_or(0);
        let second = parser.next_int_or(0);

        let mut position = PositionRecord::new(PROTOCOL, identity.id);
        position.set_time(
            DateTimeBuilder::new()
                .date(year as i32, month as u32, day as u32)
                .time(hour as u32, minute as u32, second as u32)
                .build()?,
        );
        position.valid = parser.next()? == "A";
        position.latitude = parser.next_coordinate(CoordinateFormat::DegMinHem);
        position.longitude = parser.next_coordinate(CoordinateFormat::DegMinHem);
        position.speed = parser.next_double_or(0.0);
        position.course = parser.next_double_or(0.0);

        if let Some(alarm) = alarm.as_deref().and_then(decode_alarm) {
            position.set(keys::ALARM, alarm);
        }
        match alarm.as_deref() {
            Some("acc on") => position.set(keys::IGNITION, true),
            Some("acc off") => position.set(keys::IGNITION, false),
            _ => {}
        }

        Some(position)
    }
}

impl Default for Gps103Plugin {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_alarm(value: &str) -> Option<&'static str> {
    match value {
        "help me" => Some("sos"),
        "low battery" => Some("lowBattery"),
        "stockade" => Some("geofence"),
        "move" => Some("movement"),
        "speed" => Some("overspeed"),
        "door alarm" => Some("door"),
        _ => None,
    }
}

impl ProtocolPlugin for Gps103Plugin {
    fn name(&self) -> &'static str {
        PROTOCOL
    }

    fn frame_decoder(&self, max_frame_size: usize) -> Box<dyn FrameDecoder> {
        // Sentences start with the handshake prefix, a bare IMEI digit or
        // the "imei:" literal; anything else before a ';' is garbage.
        Box::new(DelimitedDecoder::new(
            max_frame_size,
            1,
            |buf| matches!(buf[0], b'#' | b'i') || buf[0].is_ascii_digit(),
            b";",
        ))
    }

    fn decode(&self, ctx: &mut ConnectionContext, frame: &[u8]) -> Vec<PositionRecord> {
        let Ok(text) = std::str::from_utf8(frame) else {
            return Vec::new();
        };
        let sentence = text.trim().trim_end_matches(';');

        if let Some(rest) = sentence.strip_prefix("##,imei:") {
            // Handshake: "##,imei:<digits>,A"
            let imei = rest.split(',').next().unwrap_or("");
            if ctx.identify(&[imei]).is_some() {
                ctx.reply(b"LOAD".to_vec());
            }
            return Vec::new();
        }

        if !sentence.is_empty() && sentence.bytes().all(|b| b.is_ascii_digit()) {
            // Heartbeat: bare IMEI, only acknowledged once identified.
            if ctx.resume().is_some() {
                ctx.reply(b"ON".to_vec());
            }
            return Vec::new();
        }

        self.decode_position(ctx, sentence).into_iter().collect()
    }

    fn encode(&self, command: &Command) -> Option<Vec<u8>> {
        use trackgate_core::model::command_types::*;

        let unique_id = command.get_string("uniqueId")?;
        let text = match command.command_type.as_str() {
            ENGINE_STOP => format!("**,imei:{unique_id},J"),
            ENGINE_RESUME => format!("**,imei:{unique_id},K"),
            POSITION_PERIODIC => {
                let frequency = command.get_int("frequency").unwrap_or(30);
                format!("**,imei:{unique_id},C,{frequency}s")
            }
            CUSTOM => format!("**,imei:{unique_id},{}", command.get_string("data")?),
            _ => return None,
        };
        Some(text.into_bytes())
    }
}
