//! # Request / Response Model
//!
//! `RequestInfo` and `ResponseInfo` carry a method or response code plus the
//! shared [`MessageInfo`]: message type, id, token, ordered header options
//! and an opaque payload.

use std::fmt;

use super::errors::{CaError, CaResult};
use super::token::Token;

/// Most header options a single message may carry.
pub const MAX_HEADER_OPTIONS: usize = 16;

/// Longest value a single header option may carry.
pub const MAX_OPTION_VALUE_LENGTH: usize = 1034;

// =============================================================================
// METHOD / CODE / TYPE
// =============================================================================

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Method {
    Get = 1,
    Post = 2,
    Put = 3,
    Delete = 4,
}

impl Method {
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Get),
            2 => Some(Self::Post),
            3 => Some(Self::Put),
            4 => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Response code as `class.detail`, e.g. 2.05.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode {
    class: u8,
    detail: u8,
}

impl ResponseCode {
    pub const CREATED: Self = Self::new_unchecked(2, 1);
    pub const DELETED: Self = Self::new_unchecked(2, 2);
    pub const VALID: Self = Self::new_unchecked(2, 3);
    pub const CHANGED: Self = Self::new_unchecked(2, 4);
    pub const CONTENT: Self = Self::new_unchecked(2, 5);
    pub const BAD_REQUEST: Self = Self::new_unchecked(4, 0);
    pub const UNAUTHORIZED: Self = Self::new_unchecked(4, 1);
    pub const BAD_OPTION: Self = Self::new_unchecked(4, 2);
    pub const FORBIDDEN: Self = Self::new_unchecked(4, 3);
    pub const NOT_FOUND: Self = Self::new_unchecked(4, 4);
    pub const METHOD_NOT_ALLOWED: Self = Self::new_unchecked(4, 5);
    pub const INTERNAL_SERVER_ERROR: Self = Self::new_unchecked(5, 0);
    pub const SERVICE_UNAVAILABLE: Self = Self::new_unchecked(5, 3);

    const fn new_unchecked(class: u8, detail: u8) -> Self {
        Self { class, detail }
    }

    /// Build a response code. Classes 2 to 5 are responses; detail is 0..=31.
    ///
    /// # Errors
    ///
    /// `InvalidParam` outside those ranges.
    pub fn new(class: u8, detail: u8) -> CaResult<Self> {
        if !(2..=5).contains(&class) || detail > 31 {
            return Err(CaError::invalid(format!(
                "response code {class}.{detail:02} out of range"
            )));
        }
        Ok(Self { class, detail })
    }

    #[must_use]
    pub const fn class(&self) -> u8 {
        self.class
    }

    #[must_use]
    pub const fn detail(&self) -> u8 {
        self.detail
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.class == 2
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class, self.detail)
    }
}

/// Reliability class of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MessageType {
    Confirmable = 0,
    #[default]
    NonConfirmable = 1,
    Acknowledgement = 2,
    Reset = 3,
}

impl MessageType {
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgement,
            _ => Self::Reset,
        }
    }
}

// =============================================================================
// OPTIONS AND SHARED INFO
// =============================================================================

/// One header option. Order within a message is preserved end to end.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeaderOption {
    pub id: u16,
    pub value: Vec<u8>,
}

impl HeaderOption {
    #[must_use]
    pub fn new(id: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }
}

/// Fields shared by requests and responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    pub message_type: MessageType,
    /// 0 means "assign on send".
    pub message_id: u16,
    pub token: Token,
    pub options: Vec<HeaderOption>,
    pub payload: Vec<u8>,
}

impl MessageInfo {
    #[must_use]
    pub fn new(token: Token) -> Self {
        Self {
            message_type: MessageType::default(),
            message_id: 0,
            token,
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Check option bounds.
    ///
    /// # Errors
    ///
    /// `InvalidParam` for too many options or an oversized option value.
    pub fn validate(&self) -> CaResult<()> {
        if self.options.len() > MAX_HEADER_OPTIONS {
            return Err(CaError::invalid(format!(
                "{} header options exceed {MAX_HEADER_OPTIONS}",
                self.options.len()
            )));
        }
        if let Some(opt) = self
            .options
            .iter()
            .find(|o| o.value.len() > MAX_OPTION_VALUE_LENGTH)
        {
            return Err(CaError::invalid(format!(
                "option {} value is {} bytes",
                opt.id,
                opt.value.len()
            )));
        }
        Ok(())
    }
}

// =============================================================================
// REQUEST / RESPONSE
// =============================================================================

/// An outbound or inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: Method,
    pub info: MessageInfo,
}

impl RequestInfo {
    #[must_use]
    pub fn new(method: Method, token: Token) -> Self {
        Self {
            method,
            info: MessageInfo::new(token),
        }
    }

    #[must_use]
    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.info.message_type = message_type;
        self
    }

    #[must_use]
    pub fn with_option(mut self, option: HeaderOption) -> Self {
        self.info.options.push(option);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: impl IntoIterator<Item = HeaderOption>) -> Self {
        self.info.options.extend(options);
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.info.payload = payload.into();
        self
    }

    #[must_use]
    pub fn token(&self) -> Token {
        self.info.token
    }
}

/// An outbound or inbound response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseInfo {
    pub result: ResponseCode,
    pub info: MessageInfo,
}

impl ResponseInfo {
    #[must_use]
    pub fn new(result: ResponseCode, token: Token) -> Self {
        Self {
            result,
            info: MessageInfo::new(token),
        }
    }

    #[must_use]
    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.info.message_type = message_type;
        self
    }

    #[must_use]
    pub fn with_message_id(mut self, message_id: u16) -> Self {
        self.info.message_id = message_id;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: impl IntoIterator<Item = HeaderOption>) -> Self {
        self.info.options.extend(options);
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.info.payload = payload.into();
        self
    }

    #[must_use]
    pub fn token(&self) -> Token {
        self.info.token
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request(RequestInfo),
    Response(ResponseInfo),
}

impl Message {
    #[must_use]
    pub fn info(&self) -> &MessageInfo {
        match self {
            Self::Request(r) => &r.info,
            Self::Response(r) => &r.info,
        }
    }
}
