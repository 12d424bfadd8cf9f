//! # Wire Codec
//!
//! Frames carried by adapters as opaque bytes.
//!
//! ## Frame Layout
//!
//! ```text
//! byte 0        version (2 bits, = 1) | message type (2 bits) | token length (4 bits)
//! byte 1        code: class (3 bits) . detail (5 bits)
//!               class 0 is a request (detail = method), classes 2..=5 are responses
//! bytes 2..4    message id, big endian
//! token         token length bytes (1..=8)
//! byte          option count (<= 16)
//! options       id (u16 BE) | length (u16 BE) | value, in caller order
//! uri           length (u16 BE) | UTF-8 resource URI
//! payload       optional: 0xFF marker followed by at least one byte
//! ```
//!
//! Options are written in the order given, never sorted, so order survives
//! a round trip.

use thiserror::Error;

use crate::domain::{
    CaError, CaResult, HeaderOption, Message, MessageInfo, MessageType, Method, RequestInfo,
    ResponseCode, ResponseInfo, Token, MAX_HEADER_OPTIONS, MAX_OPTION_VALUE_LENGTH,
    MAX_TOKEN_LENGTH,
};

/// Frame format version.
pub const FRAME_VERSION: u8 = 1;

/// Marks the start of the payload.
pub const PAYLOAD_MARKER: u8 = 0xFF;

/// Fixed header: version/type/tkl, code, message id.
const HEADER_LEN: usize = 4;

/// Why an inbound frame was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame truncated at offset {0}")]
    Truncated(usize),

    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid token length {0}")]
    InvalidTokenLength(u8),

    #[error("empty message code")]
    EmptyMessage,

    #[error("unknown request method {0}")]
    UnknownMethod(u8),

    #[error("unknown code class {0}")]
    UnknownCodeClass(u8),

    #[error("{0} options exceed the limit")]
    TooManyOptions(u8),

    #[error("option {id} value of {len} bytes exceeds the limit")]
    OptionTooLong { id: u16, len: usize },

    #[error("resource URI is not valid UTF-8")]
    InvalidUri,

    #[error("payload marker without payload")]
    EmptyPayload,

    #[error("unexpected byte {0:#04x} where payload marker expected")]
    TrailingBytes(u8),
}

/// A decoded frame: the message plus the resource it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub resource_uri: String,
    pub message: Message,
}

// =============================================================================
// ENCODING
// =============================================================================

/// Encode a request for `resource_uri`.
///
/// # Errors
///
/// `InvalidParam` when the message breaks option limits or the URI is too long.
pub fn encode_request(request: &RequestInfo, resource_uri: &str) -> CaResult<Vec<u8>> {
    encode(request.method as u8, &request.info, resource_uri)
}

/// Encode a response for `resource_uri`.
///
/// # Errors
///
/// See [`encode_request`].
pub fn encode_response(response: &ResponseInfo, resource_uri: &str) -> CaResult<Vec<u8>> {
    let code = (response.result.class() << 5) | response.result.detail();
    encode(code, &response.info, resource_uri)
}

fn encode(code: u8, info: &MessageInfo, resource_uri: &str) -> CaResult<Vec<u8>> {
    info.validate()?;
    let uri_len = u16::try_from(resource_uri.len())
        .map_err(|_| CaError::invalid("resource URI too long"))?;

    let token = info.token.as_bytes();
    let options_len: usize = info.options.iter().map(|o| 4 + o.value.len()).sum();
    let mut out = Vec::with_capacity(
        HEADER_LEN + token.len() + 1 + options_len + 2 + resource_uri.len() + 1 + info.payload.len(),
    );

    out.push((FRAME_VERSION << 6) | ((info.message_type as u8) << 4) | token.len() as u8);
    out.push(code);
    out.extend_from_slice(&info.message_id.to_be_bytes());
    out.extend_from_slice(token);

    out.push(info.options.len() as u8);
    for opt in &info.options {
        out.extend_from_slice(&opt.id.to_be_bytes());
        out.extend_from_slice(&(opt.value.len() as u16).to_be_bytes());
        out.extend_from_slice(&opt.value);
    }

    out.extend_from_slice(&uri_len.to_be_bytes());
    out.extend_from_slice(resource_uri.as_bytes());

    if !info.payload.is_empty() {
        out.push(PAYLOAD_MARKER);
        out.extend_from_slice(&info.payload);
    }
    Ok(out)
}

// =============================================================================
// DECODING
// =============================================================================

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DecodeError::Truncated(self.pos))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }
}

/// Decode a frame into a request or response.
///
/// # Errors
///
/// A [`DecodeError`] for any malformed input. Nothing is partially returned.
pub fn decode(buf: &[u8]) -> Result<Frame, DecodeError> {
    let mut r = Reader { buf, pos: 0 };

    let first = r.u8()?;
    let version = first >> 6;
    if version != FRAME_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let message_type = MessageType::from_bits(first >> 4);
    let tkl = first & 0x0F;
    if tkl == 0 || tkl as usize > MAX_TOKEN_LENGTH {
        return Err(DecodeError::InvalidTokenLength(tkl));
    }

    let code = r.u8()?;
    let message_id = r.u16()?;
    let token =
        Token::from_slice(r.take(tkl as usize)?).map_err(|_| DecodeError::InvalidTokenLength(tkl))?;

    let count = r.u8()?;
    if count as usize > MAX_HEADER_OPTIONS {
        return Err(DecodeError::TooManyOptions(count));
    }
    let mut options = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = r.u16()?;
        let len = r.u16()? as usize;
        if len > MAX_OPTION_VALUE_LENGTH {
            return Err(DecodeError::OptionTooLong { id, len });
        }
        options.push(HeaderOption::new(id, r.take(len)?));
    }

    let uri_len = r.u16()? as usize;
    let resource_uri = std::str::from_utf8(r.take(uri_len)?)
        .map_err(|_| DecodeError::InvalidUri)?
        .to_string();

    let payload = match r.rest() {
        [] => Vec::new(),
        [PAYLOAD_MARKER] => return Err(DecodeError::EmptyPayload),
        [PAYLOAD_MARKER, body @ ..] => body.to_vec(),
        [other, ..] => return Err(DecodeError::TrailingBytes(*other)),
    };

    let info = MessageInfo {
        message_type,
        message_id,
        token,
        options,
        payload,
    };

    let class = code >> 5;
    let detail = code & 0x1F;
    let message = match class {
        0 if detail == 0 => return Err(DecodeError::EmptyMessage),
        0 => {
            let method = Method::from_code(detail).ok_or(DecodeError::UnknownMethod(detail))?;
            Message::Request(RequestInfo { method, info })
        }
        2..=5 => {
            let result =
                ResponseCode::new(class, detail).map_err(|_| DecodeError::UnknownCodeClass(class))?;
            Message::Response(ResponseInfo { result, info })
        }
        other => return Err(DecodeError::UnknownCodeClass(other)),
    };

    Ok(Frame {
        resource_uri,
        message,
    })
}
