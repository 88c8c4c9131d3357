//! Decoder for `application/vnd.amazon.eventstream` bodies
//!
//! Each frame is a 12-byte prelude (total length, headers length, prelude
//! CRC32), typed headers, the payload and a trailing CRC32 over everything
//! before it. All integers are big-endian.

use thiserror::Error;

const PRELUDE_LEN: usize = 12;
const CRC_LEN: usize = 4;
const MIN_MESSAGE_LEN: usize = PRELUDE_LEN + CRC_LEN;
const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EventStreamError {
    #[error("Prelude checksum mismatch (expected {expected:#010x}, computed {computed:#010x})")]
    PreludeChecksum { expected: u32, computed: u32 },

    #[error("Message checksum mismatch (expected {expected:#010x}, computed {computed:#010x})")]
    MessageChecksum { expected: u32, computed: u32 },

    #[error("Invalid message length {0}")]
    InvalidLength(usize),

    #[error("Truncated header: {0}")]
    TruncatedHeader(String),

    #[error("Unknown header value type {0}")]
    UnknownHeaderType(u8),

    #[error("Header {0} is not valid UTF-8")]
    InvalidUtf8(String),

    #[error("Stream ended with {0} undecoded byte(s)")]
    TrailingBytes(usize),
}

const CRC_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// CRC-32 (IEEE 802.3)
pub fn crc32(bytes: &[u8]) -> u32 {
    !bytes.iter().fold(!0u32, |crc, &byte| {
        CRC_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8)
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Bytes(Vec<u8>),
    String(String),
    Timestamp(i64),
    Uuid([u8; 16]),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::String(value) => Some(value),
            _ => None,
        }
    }
}

/// One decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub headers: Vec<(String, HeaderValue)>,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// String value of a header
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.header(name).and_then(HeaderValue::as_str)
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

struct HeaderReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> HeaderReader<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], EventStreamError> {
        let bytes: &'a [u8] = self.bytes;
        let end = self.pos + len;
        if end > bytes.len() {
            return Err(EventStreamError::TruncatedHeader(what.to_string()));
        }
        let slice = &bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn fixed<const N: usize>(&mut self, what: &str) -> Result<[u8; N], EventStreamError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    fn utf8(bytes: &[u8], what: &str) -> Result<String, EventStreamError> {
        String::from_utf8(bytes.to_vec()).map_err(|_| EventStreamError::InvalidUtf8(what.to_string()))
    }

    fn header(&mut self) -> Result<(String, HeaderValue), EventStreamError> {
        let [name_len] = self.fixed::<1>("name length")?;
        let name = Self::utf8(self.take(name_len as usize, "name")?, "name")?;
        let [value_type] = self.fixed::<1>(&name)?;

        let value = match value_type {
            0 => HeaderValue::Bool(true),
            1 => HeaderValue::Bool(false),
            2 => HeaderValue::Byte(i8::from_be_bytes(self.fixed(&name)?)),
            3 => HeaderValue::Short(i16::from_be_bytes(self.fixed(&name)?)),
            4 => HeaderValue::Int(i32::from_be_bytes(self.fixed(&name)?)),
            5 => HeaderValue::Long(i64::from_be_bytes(self.fixed(&name)?)),
            6 | 7 => {
                let len = u16::from_be_bytes(self.fixed(&name)?) as usize;
                let bytes = self.take(len, &name)?;
                if value_type == 6 {
                    HeaderValue::Bytes(bytes.to_vec())
                } else {
                    HeaderValue::String(Self::utf8(bytes, &name)?)
                }
            }
            8 => HeaderValue::Timestamp(i64::from_be_bytes(self.fixed(&name)?)),
            9 => HeaderValue::Uuid(self.fixed(&name)?),
            other => return Err(EventStreamError::UnknownHeaderType(other)),
        };

        Ok((name, value))
    }
}

/// Incremental frame decoder
///
/// Feed bytes as they arrive with `push`, then drain complete frames with
/// `next_message`.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: Vec<u8>,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Error unless every received byte belongs to a decoded frame
    pub fn finish(&self) -> Result<(), EventStreamError> {
        match self.buffer.len() {
            0 => Ok(()),
            n => Err(EventStreamError::TrailingBytes(n)),
        }
    }

    /// Next complete frame, or `None` when more bytes are needed
    pub fn next_message(&mut self) -> Result<Option<Message>, EventStreamError> {
        if self.buffer.len() < PRELUDE_LEN {
            return Ok(None);
        }

        let total_len = read_u32(&self.buffer, 0) as usize;
        let headers_len = read_u32(&self.buffer, 4) as usize;
        let expected = read_u32(&self.buffer, 8);
        let computed = crc32(&self.buffer[..8]);
        if expected != computed {
            return Err(EventStreamError::PreludeChecksum { expected, computed });
        }
        if !(MIN_MESSAGE_LEN..=MAX_MESSAGE_LEN).contains(&total_len)
            || headers_len > total_len - MIN_MESSAGE_LEN
        {
            return Err(EventStreamError::InvalidLength(total_len));
        }

        if self.buffer.len() < total_len {
            return Ok(None);
        }

        let frame: Vec<u8> = self.buffer.drain(..total_len).collect();
        let expected = read_u32(&frame, total_len - CRC_LEN);
        let computed = crc32(&frame[..total_len - CRC_LEN]);
        if expected != computed {
            return Err(EventStreamError::MessageChecksum { expected, computed });
        }

        let header_bytes = &frame[PRELUDE_LEN..PRELUDE_LEN + headers_len];
        let mut reader = HeaderReader {
            bytes: header_bytes,
            pos: 0,
        };
        let mut headers = Vec::new();
        while reader.pos < header_bytes.len() {
            headers.push(reader.header()?);
        }

        Ok(Some(Message {
            headers,
            payload: frame[PRELUDE_LEN + headers_len..total_len - CRC_LEN].to_vec(),
        }))
    }
}

/// Encode a frame with string headers
#[cfg(test)]
pub(crate) fn encode_message(headers: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
    let mut header_bytes = Vec::new();
    for (name, value) in headers {
        header_bytes.push(name.len() as u8);
        header_bytes.extend_from_slice(name.as_bytes());
        header_bytes.push(7);
        header_bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        header_bytes.extend_from_slice(value.as_bytes());
    }

    let total_len = MIN_MESSAGE_LEN + header_bytes.len() + payload.len();
    let mut frame = Vec::with_capacity(total_len);
    frame.extend_from_slice(&(total_len as u32).to_be_bytes());
    frame.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    let prelude_crc = crc32(&frame);
    frame.extend_from_slice(&prelude_crc.to_be_bytes());
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(payload);
    let message_crc = crc32(&frame);
    frame.extend_from_slice(&message_crc.to_be_bytes());
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_decode_single_frame() {
        let frame = encode_message(
            &[(":event-type", "chunk"), (":message-type", "event")],
            br#"{"bytes":"SGk="}"#,
        );

        let mut decoder = EventStreamDecoder::new();
        decoder.push(&frame);
        let message = decoder.next_message().unwrap().unwrap();

        assert_eq!(message.header_str(":event-type"), Some("chunk"));
        assert_eq!(message.header_str(":message-type"), Some("event"));
        assert_eq!(message.payload, br#"{"bytes":"SGk="}"#);
        assert!(decoder.next_message().unwrap().is_none());
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_incremental_push() {
        let mut stream = encode_message(&[(":event-type", "trace")], b"{}");
        stream.extend(encode_message(&[(":event-type", "chunk")], b"{\"bytes\":\"\"}"));

        let mut decoder = EventStreamDecoder::new();
        let mut decoded = Vec::new();
        for byte in stream.chunks(5) {
            decoder.push(byte);
            while let Some(message) = decoder.next_message().unwrap() {
                decoded.push(message);
            }
        }

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].header_str(":event-type"), Some("trace"));
        assert_eq!(decoded[1].header_str(":event-type"), Some("chunk"));
    }

    #[test]
    fn test_corrupted_payload() {
        let mut frame = encode_message(&[(":event-type", "chunk")], b"payload");
        let index = frame.len() - 6;
        frame[index] ^= 0xFF;

        let mut decoder = EventStreamDecoder::new();
        decoder.push(&frame);
        assert!(matches!(
            decoder.next_message(),
            Err(EventStreamError::MessageChecksum { .. })
        ));
    }

    #[test]
    fn test_corrupted_prelude() {
        let mut frame = encode_message(&[], b"x");
        frame[1] ^= 0x01;

        let mut decoder = EventStreamDecoder::new();
        decoder.push(&frame);
        assert!(matches!(
            decoder.next_message(),
            Err(EventStreamError::PreludeChecksum { .. })
        ));
    }

    #[test]
    fn test_typed_headers() {
        let mut headers = Vec::new();
        headers.extend_from_slice(&[4, b'f', b'l', b'a', b'g', 0]);
        headers.extend_from_slice(&[3, b'n', b'u', b'm', 4]);
        headers.extend_from_slice(&42i32.to_be_bytes());

        let total = MIN_MESSAGE_LEN + headers.len();
        let mut frame = Vec::new();
        frame.extend_from_slice(&(total as u32).to_be_bytes());
        frame.extend_from_slice(&(headers.len() as u32).to_be_bytes());
        let crc = crc32(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());
        frame.extend_from_slice(&headers);
        let crc = crc32(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());

        let mut decoder = EventStreamDecoder::new();
        decoder.push(&frame);
        let message = decoder.next_message().unwrap().unwrap();
        assert_eq!(message.header("flag"), Some(&HeaderValue::Bool(true)));
        assert_eq!(message.header("num"), Some(&HeaderValue::Int(42)));
        assert!(message.payload.is_empty());
    }

    #[test]
    fn test_truncated_header() {
        let headers = [10u8, b'a'];
        let total = MIN_MESSAGE_LEN + headers.len();
        let mut frame = Vec::new();
        frame.extend_from_slice(&(total as u32).to_be_bytes());
        frame.extend_from_slice(&(headers.len() as u32).to_be_bytes());
        let crc = crc32(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());
        frame.extend_from_slice(&headers);
        let crc = crc32(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());

        let mut decoder = EventStreamDecoder::new();
        decoder.push(&frame);
        assert!(matches!(
            decoder.next_message(),
            Err(EventStreamError::TruncatedHeader(_))
        ));
    }

    #[test]
    fn test_partial_frame_waits() {
        let frame = encode_message(&[(":event-type", "chunk")], b"abc");
        let mut decoder = EventStreamDecoder::new();
        decoder.push(&frame[..frame.len() - 1]);
        assert!(decoder.next_message().unwrap().is_none());
        assert!(matches!(decoder.finish(), Err(EventStreamError::TrailingBytes(_))));
    }
}
