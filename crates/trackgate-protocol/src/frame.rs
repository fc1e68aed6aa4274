//! Incremental frame extraction.
//!
//! One [`FrameDecoder`] instance exists per connection and owns that
//! connection's buffer of unconsumed bytes. Feeding it newly read bytes
//! yields every complete frame buffered so far; incomplete tails are
//! retained for the next call. Decoders never block and never perform I/O.
//!
//! The concatenation of frames returned across any sequence of `feed` calls
//! equals the frames produced by one call with all bytes concatenated,
//! regardless of where the network split the reads.

use tracing::warn;

/// One complete, self-delimited application-level message.
pub type Frame = Vec<u8>;

/// Fatal framing failures. Anything recoverable (garbage before a frame,
/// an unparsable span) is handled by resyncing, not by an error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FrameError {
    /// A declared or buffered frame exceeded the per-connection cap. The
    /// connection must be closed; the decoder's buffer is already discarded.
    #[error("frame of {size} bytes exceeds limit of {limit}")]
    Oversized { size: usize, limit: usize },
}

/// Stateful decoder turning an append-only byte stream into discrete frames.
pub trait FrameDecoder: Send {
    /// Append newly read bytes and return every complete frame now
    /// available, in stream order. Returns an empty vector when the buffer
    /// does not yet contain a complete frame.
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>, FrameError>;
}

/// Result of a length formula applied to the buffered bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLength {
    /// Not enough bytes buffered to determine the frame length yet.
    NeedMore,
    /// Total frame length in bytes, counted from the first buffered byte.
    Total(usize),
    /// The leading bytes do not begin any known frame; resync.
    Unrecognized,
}

/// Byte order of a length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

fn read_uint(bytes: &[u8], endianness: Endianness) -> usize {
    let mut value: usize = 0;
    match endianness {
        Endianness::Big => {
            for &b in bytes {
                value = (value << 8) | b as usize;
            }
        }
        Endianness::Little => {
            for &b in bytes.iter().rev() {
                value = (value << 8) | b as usize;
            }
        }
    }
    value
}

/// Fixed header + length field framing.
///
/// An optional literal header is validated at the start of every frame
/// (scanning forward past garbage to find it); the length field at a fixed
/// offset declares the frame length, adjusted by a constant to obtain the
/// total frame size including header and trailer.
pub struct LengthPrefixedDecoder {
    header: Option<Vec<u8>>,
    length_offset: usize,
    length_size: usize,
    endianness: Endianness,
    /// Added to the declared length to obtain the total frame size.
    length_adjustment: isize,
    max_frame_size: usize,
    buffer: Vec<u8>,
}

impl LengthPrefixedDecoder {
    pub fn new(
        length_offset: usize,
        length_size: usize,
        endianness: Endianness,
        length_adjustment: isize,
        max_frame_size: usize,
    ) -> Self {
        Self {
            header: None,
            length_offset,
            length_size,
            endianness,
            length_adjustment,
            max_frame_size,
            buffer: Vec::new(),
        }
    }

    /// Require a literal byte sequence at the start of every frame. Bytes
    /// before the next occurrence of the header are garbage and skipped.
    pub fn with_header(mut self, header: &[u8]) -> Self {
        assert!(!header.is_empty());
        self.header = Some(header.to_vec());
        self
    }

    /// Skip to the next header occurrence. Returns false when the buffer
    /// should wait for more bytes.
    fn align_to_header(&mut self) -> bool {
        let Some(header) = &self.header else {
            return true;
        };
        if let Some(start) = find(&self.buffer, header) {
            if start > 0 {
                warn!(skipped = start, "skipping garbage before frame header");
                self.buffer.drain(..start);
            }
            true
        } else {
            // No header anywhere; keep only a tail that could still be the
            // beginning of one.
            let keep = header.len().saturating_sub(1).min(self.buffer.len());
            let drop = self.buffer.len() - keep;
            if drop > 0 {
                self.buffer.drain(..drop);
            }
            false
        }
    }
}

impl FrameDecoder for LengthPrefixedDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>, FrameError> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            if !self.align_to_header() {
                break;
            }
            let needed = self.length_offset + self.length_size;
            if self.buffer.len() < needed {
                break;
            }
            let declared = read_uint(
                &self.buffer[self.length_offset..needed],
                self.endianness,
            );
            let total = declared as isize + self.length_adjustment;
            if total < needed as isize {
                // Structurally impossible; skip one byte and rescan.
                warn!(declared, "impossible declared frame length, resyncing");
                self.buffer.drain(..1);
                continue;
            }
            let total = total as usize;
            if total > self.max_frame_size {
                self.buffer.clear();
                return Err(FrameError::Oversized {
                    size: total,
                    limit: self.max_frame_size,
                });
            }
            if self.buffer.len() < total {
                break;
            }
            frames.push(self.buffer.drain(..total).collect());
        }

        if self.buffer.len() > self.max_frame_size {
            let size = self.buffer.len();
            self.buffer.clear();
            return Err(FrameError::Oversized {
                size,
                limit: self.max_frame_size,
            });
        }
        Ok(frames)
    }
}

/// Marker byte + per-subtype length formula framing, with an optional
/// reserved keepalive byte that forms a one-byte frame on its own.
///
/// The formula sees the entire buffered slice and decides, from the leading
/// discriminator byte(s), how long the frame is. Unrecognized discriminators
/// trigger a forward resync scan for the next position the formula
/// recognizes; if none exists yet, the decoder waits for more bytes.
pub struct MarkerDecoder {
    formula: Box<dyn Fn(&[u8]) -> FrameLength + Send>,
    keepalive: Option<u8>,
    max_frame_size: usize,
    buffer: Vec<u8>,
}

impl MarkerDecoder {
    pub fn new<F>(max_frame_size: usize, formula: F) -> Self
    where
        F: Fn(&[u8]) -> FrameLength + Send + 'static,
    {
        Self {
            formula: Box::new(formula),
            keepalive: None,
            max_frame_size,
            buffer: Vec::new(),
        }
    }

    /// Treat this leading byte value as a zero-payload keepalive frame.
    pub fn with_keepalive(mut self, byte: u8) -> Self {
        self.keepalive = Some(byte);
        self
    }

    fn classify(&self, offset: usize) -> FrameLength {
        if self.keepalive == Some(self.buffer[offset]) {
            return FrameLength::Total(1);
        }
        (self.formula)(&self.buffer[offset..])
    }
}

impl FrameDecoder for MarkerDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>, FrameError> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while !self.buffer.is_empty() {
            match self.classify(0) {
                FrameLength::NeedMore => break,
                FrameLength::Total(total) => {
                    if total > self.max_frame_size {
                        self.buffer.clear();
                        return Err(FrameError::Oversized {
                            size: total,
                            limit: self.max_frame_size,
                        });
                    }
                    if self.buffer.len() < total {
                        break;
                    }
                    frames.push(self.buffer.drain(..total).collect());
                }
                FrameLength::Unrecognized => {
                    // Scan forward for the next recognizable marker; without
                    // one, wait for more bytes rather than aborting.
                    let resync = (1..self.buffer.len())
                        .find(|&i| self.classify(i) != FrameLength::Unrecognized);
                    match resync {
                        Some(skip) => {
                            warn!(skipped = skip, "unrecognized marker, resyncing");
                            self.buffer.drain(..skip);
                        }
                        None => break,
                    }
                }
            }
        }

        if self.buffer.len() > self.max_frame_size {
            let size = self.buffer.len();
            self.buffer.clear();
            return Err(FrameError::Oversized {
                size,
                limit: self.max_frame_size,
            });
        }
        Ok(frames)
    }
}

/// Delimiter-scanned framing with structural start validation.
///
/// Scans forward for a position where the start predicate accepts the
/// remaining bytes (skipping leading garbage), then for the end delimiter.
/// The emitted frame includes the start bytes and the end delimiter.
pub struct DelimitedDecoder {
    start: Box<dyn Fn(&[u8]) -> bool + Send>,
    /// Minimum bytes the predicate needs to judge a candidate start.
    min_start_len: usize,
    end: Vec<u8>,
    max_frame_size: usize,
    buffer: Vec<u8>,
}

impl DelimitedDecoder {
    pub fn new<F>(max_frame_size: usize, min_start_len: usize, start: F, end: &[u8]) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + 'static,
    {
        assert!(!end.is_empty());
        Self {
            start: Box::new(start),
            min_start_len,
            end: end.to_vec(),
            max_frame_size,
            buffer: Vec::new(),
        }
    }
}

impl FrameDecoder for DelimitedDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>, FrameError> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            // Locate a valid frame start, discarding garbage before it.
            let mut start = None;
            let mut i = 0;
            while i + self.min_start_len <= self.buffer.len() {
                if (self.start)(&self.buffer[i..]) {
                    start = Some(i);
                    break;
                }
                i += 1;
            }
            let Some(start) = start else {
                // Everything judged so far is garbage; the unjudged tail may
                // still begin a frame.
                let keep = (self.min_start_len.saturating_sub(1)).min(self.buffer.len());
                let drop = self.buffer.len() - keep;
                if drop > 0 {
                    warn!(skipped = drop, "no frame start in buffer, discarding");
                    self.buffer.drain(..drop);
                }
                break;
            };
            if start > 0 {
                warn!(skipped = start, "skipping garbage before frame start");
                self.buffer.drain(..start);
            }

            let Some(end) = find(&self.buffer[self.min_start_len..], &self.end) else {
                break;
            };
            let total = self.min_start_len + end + self.end.len();
            frames.push(self.buffer.drain(..total).collect());
        }

        if self.buffer.len() > self.max_frame_size {
            let size = self.buffer.len();
            self.buffer.clear();
            return Err(FrameError::Oversized {
                size,
                limit: self.max_frame_size,
            });
        }
        Ok(frames)
    }
}

/// Escape/byte-stuffed framing delimited by a marker byte on both sides.
///
/// Within a frame the escape byte announces a substitution: the following
/// code byte maps through a fixed table back to the original byte. A code
/// absent from the table is a frame error; the span is dropped and scanning
/// resumes at its closing marker. Emitted frames are fully unescaped and
/// carry no markers.
pub struct StuffedDecoder {
    marker: u8,
    escape: u8,
    /// escape-code byte -> original byte
    table: Vec<(u8, u8)>,
    max_frame_size: usize,
    buffer: Vec<u8>,
}

impl StuffedDecoder {
    pub fn new(max_frame_size: usize, marker: u8, escape: u8, table: &[(u8, u8)]) -> Self {
        Self {
            marker,
            escape,
            table: table.to_vec(),
            max_frame_size,
            buffer: Vec::new(),
        }
    }

    fn unescape(&self, span: &[u8]) -> Option<Vec<u8>> {
        let mut out = Vec::with_capacity(span.len());
        let mut iter = span.iter();
        while let Some(&b) = iter.next() {
            if b == self.escape {
                let &code = iter.next()?;
                let original = self
                    .table
                    .iter()
                    .find(|(c, _)| *c == code)
                    .map(|(_, original)| *original)?;
                out.push(original);
            } else {
                out.push(b);
            }
        }
        Some(out)
    }
}

impl FrameDecoder for StuffedDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>, FrameError> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            let Some(open) = self.buffer.iter().position(|&b| b == self.marker) else {
                if !self.buffer.is_empty() {
                    warn!(skipped = self.buffer.len(), "no frame marker, discarding");
                    self.buffer.clear();
                }
                break;
            };
            if open > 0 {
                warn!(skipped = open, "skipping garbage before frame marker");
                self.buffer.drain(..open);
            }
            // Closing marker strictly after the opening one. It is retained
            // in the buffer: devices that share one marker between frames
            // reuse it as the next frame's opener, and fully wrapped frames
            // just produce an empty span next round, skipped silently.
            let Some(close) = self.buffer[1..].iter().position(|&b| b == self.marker) else {
                break;
            };
            let close = close + 1;
            let span: Vec<u8> = self.buffer[1..close].to_vec();
            self.buffer.drain(..close);
            if span.is_empty() {
                // Adjacent markers; the drain above already removed the
                // first of the pair, rescan from the second.
                continue;
            }
            match self.unescape(&span) {
                Some(frame) => frames.push(frame),
                None => warn!(len = span.len(), "bad escape sequence, frame dropped"),
            }
        }

        if self.buffer.len() > self.max_frame_size {
            let size = self.buffer.len();
            self.buffer.clear();
            return Err(FrameError::Oversized {
                size,
                limit: self.max_frame_size,
            });
        }
        Ok(frames)
    }
}

/// First occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| &haystack[i..i + needle.len()] == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1024;

    /// Frame starts "$$", u16 BE total length at offset 2.
    fn length_prefixed() -> LengthPrefixedDecoder {
        LengthPrefixedDecoder::new(2, 2, Endianness::Big, 0, MAX).with_header(b"$$")
    }

    /// 0x78 0x78 frames with a one-byte length at offset 2 counting
    /// everything after itself except the trailing 0x0d 0x0a.
    fn marker() -> MarkerDecoder {
        MarkerDecoder::new(MAX, |buf| match (buf.first(), buf.get(1)) {
            (Some(&0x78), Some(&0x78)) => match buf.get(2) {
                Some(&len) => FrameLength::Total(len as usize + 5),
                None => FrameLength::NeedMore,
            },
            (Some(&0x78), None) => FrameLength::NeedMore,
            _ => FrameLength::Unrecognized,
        })
    }

    fn delimited() -> DelimitedDecoder {
        DelimitedDecoder::new(MAX, 1, |buf| buf[0] == b'*', b"#")
    }

    fn stuffed() -> StuffedDecoder {
        StuffedDecoder::new(MAX, 0x7e, 0x7d, &[(0x01, 0x7d), (0x02, 0x7e)])
    }

    fn feed_all(decoder: &mut dyn FrameDecoder, bytes: &[u8]) -> Vec<Frame> {
        decoder.feed(bytes).unwrap()
    }

    /// Feed `stream` split at every pair of cut points and require the same
    /// frames as one whole-stream call.
    fn assert_incremental_equivalence<D, F>(make: F, stream: &[u8])
    where
        D: FrameDecoder,
        F: Fn() -> D,
    {
        let mut whole = make();
        let expected = feed_all(&mut whole, stream);
        assert!(!expected.is_empty(), "fixture produced no frames");

        for a in 0..=stream.len() {
            for b in a..=stream.len() {
                let mut decoder = make();
                let mut got = Vec::new();
                got.extend(feed_all(&mut decoder, &stream[..a]));
                got.extend(feed_all(&mut decoder, &stream[a..b]));
                got.extend(feed_all(&mut decoder, &stream[b..]));
                assert_eq!(got, expected, "split at {a}/{b}");
            }
        }
    }

    #[test]
    fn test_length_prefixed_single() {
        let mut frame = b"$$\x00\x0aABCDEF".to_vec();
        assert_eq!(frame.len(), 10);
        let mut decoder = length_prefixed();
        let frames = decoder.feed(&frame).unwrap();
        assert_eq!(frames, vec![frame.drain(..).collect::<Vec<u8>>()]);
    }

    #[test]
    fn test_length_prefixed_three_reads() {
        // Header only, then header + partial body, then the rest.
        let mut decoder = length_prefixed();
        assert!(decoder.feed(b"$$\x00").unwrap().is_empty());
        assert!(decoder.feed(b"\x0aABC").unwrap().is_empty());
        let frames = decoder.feed(b"DEF").unwrap();
        assert_eq!(frames, vec![b"$$\x00\x0aABCDEF".to_vec()]);
    }

    #[test]
    fn test_length_prefixed_skips_garbage() {
        let mut decoder = length_prefixed();
        let frames = decoder.feed(b"junk$$\x00\x06XY").unwrap();
        assert_eq!(frames, vec![b"$$\x00\x06XY".to_vec()]);
    }

    #[test]
    fn test_length_prefixed_incremental() {
        assert_incremental_equivalence(length_prefixed, b"$$\x00\x06XY$$\x00\x08quux");
    }

    #[test]
    fn test_length_prefixed_oversized_fails() {
        let mut decoder = LengthPrefixedDecoder::new(2, 2, Endianness::Big, 0, 16).with_header(b"$$");
        let result = decoder.feed(b"$$\x40\x00");
        assert!(matches!(result, Err(FrameError::Oversized { size: 0x4000, limit: 16 })));
        // Buffer discarded; the connection is expected to be closed.
        assert!(decoder.feed(b"").unwrap().is_empty());
    }

    #[test]
    fn test_length_prefixed_little_endian() {
        let mut decoder = LengthPrefixedDecoder::new(0, 2, Endianness::Little, 2, MAX);
        // Declared payload length 4, adjustment +2 for the prefix itself.
        let frames = decoder.feed(b"\x04\x00ABCD").unwrap();
        assert_eq!(frames, vec![b"\x04\x00ABCD".to_vec()]);
    }

    #[test]
    fn test_marker_basic() {
        // 0x78 0x78, len 1 -> total 6
        let frame = [0x78, 0x78, 0x01, 0x13, 0x0d, 0x0a];
        let mut decoder = marker();
        assert_eq!(decoder.feed(&frame).unwrap(), vec![frame.to_vec()]);
    }

    #[test]
    fn test_marker_resync_on_unknown() {
        let frame = [0x78, 0x78, 0x01, 0x13, 0x0d, 0x0a];
        let mut stream = vec![0xde, 0xad];
        stream.extend_from_slice(&frame);
        let mut decoder = marker();
        assert_eq!(decoder.feed(&stream).unwrap(), vec![frame.to_vec()]);
    }

    #[test]
    fn test_marker_waits_without_resync_point() {
        let mut decoder = marker();
        // Garbage with no recognizable marker: wait, do not abort.
        assert!(decoder.feed(&[0xde, 0xad, 0xbe]).unwrap().is_empty());
        // A frame arriving later is still recovered.
        let frame = [0x78, 0x78, 0x01, 0x13, 0x0d, 0x0a];
        assert_eq!(decoder.feed(&frame).unwrap(), vec![frame.to_vec()]);
    }

    #[test]
    fn test_marker_keepalive() {
        let mut decoder = marker().with_keepalive(0xff);
        let frame = [0x78, 0x78, 0x01, 0x13, 0x0d, 0x0a];
        let mut stream = vec![0xff];
        stream.extend_from_slice(&frame);
        stream.push(0xff);
        let frames = decoder.feed(&stream).unwrap();
        assert_eq!(frames, vec![vec![0xff], frame.to_vec(), vec![0xff]]);
    }

    #[test]
    fn test_marker_incremental() {
        let mut stream = vec![0x78, 0x78, 0x01, 0x13, 0x0d, 0x0a];
        stream.extend_from_slice(&[0x78, 0x78, 0x02, 0x22, 0x01, 0x0d, 0x0a]);
        assert_incremental_equivalence(marker, &stream);
    }

    #[test]
    fn test_delimited_basic() {
        let mut decoder = delimited();
        let frames = decoder.feed(b"*HQ,123#").unwrap();
        assert_eq!(frames, vec![b"*HQ,123#".to_vec()]);
    }

    #[test]
    fn test_delimited_garbage_and_wait() {
        let mut decoder = delimited();
        assert!(decoder.feed(b"xx*HQ,12").unwrap().is_empty());
        let frames = decoder.feed(b"3#*HQ").unwrap();
        assert_eq!(frames, vec![b"*HQ,123#".to_vec()]);
        let frames = decoder.feed(b",9#").unwrap();
        assert_eq!(frames, vec![b"*HQ,9#".to_vec()]);
    }

    #[test]
    fn test_delimited_incremental() {
        assert_incremental_equivalence(delimited, b"*HQ,123#*HQ,456#");
    }

    #[test]
    fn test_stuffed_round_trip() {
        // Payload contains both the marker and the escape byte raw.
        let payload = [0x01, 0x7e, 0x02, 0x7d, 0x03];
        let wire = [0x7e, 0x01, 0x7d, 0x02, 0x02, 0x7d, 0x01, 0x03, 0x7e];
        let mut decoder = stuffed();
        assert_eq!(decoder.feed(&wire).unwrap(), vec![payload.to_vec()]);
    }

    #[test]
    fn test_stuffed_back_to_back_frames() {
        // Two individually wrapped frames; the close of one is adjacent to
        // the open of the next.
        let mut decoder = stuffed();
        let frames = decoder
            .feed(&[0x7e, 0x0a, 0x0b, 0x7e, 0x7e, 0x0c, 0x0d, 0x7e])
            .unwrap();
        assert_eq!(frames, vec![vec![0x0a, 0x0b], vec![0x0c, 0x0d]]);
    }

    #[test]
    fn test_stuffed_unknown_escape_drops_frame() {
        let mut decoder = stuffed();
        let mut stream = vec![0x7e, 0x01, 0x7d, 0x99, 0x7e]; // bad code 0x99
        stream.extend_from_slice(&[0x7e, 0x05, 0x06, 0x7e]);
        let frames = decoder.feed(&stream).unwrap();
        assert_eq!(frames, vec![vec![0x05, 0x06]]);
    }

    #[test]
    fn test_stuffed_shared_delimiter() {
        // Two frames sharing one marker between them.
        let mut decoder = stuffed();
        let frames = decoder.feed(&[0x7e, 0x0a, 0x7e, 0x0b, 0x7e]).unwrap();
        assert_eq!(frames, vec![vec![0x0a], vec![0x0b]]);
    }

    #[test]
    fn test_stuffed_incremental() {
        assert_incremental_equivalence(stuffed, &[0x7e, 0x01, 0x7d, 0x02, 0x03, 0x7e, 0x7e, 0x04, 0x7e]);
    }

    #[test]
    fn test_buffer_cap_without_any_frame() {
        let mut decoder = MarkerDecoder::new(8, |_| FrameLength::NeedMore);
        let result = decoder.feed(&[0u8; 16]);
        assert!(matches!(result, Err(FrameError::Oversized { .. })));
    }
}
