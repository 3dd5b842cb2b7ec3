//! Response definitions
//!
//! Represents responses to clients.

/// Response codes carried in the low bits of the control byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseCode {
    Ok = 0,
    ProtoError = 1,
    ServerError = 2,
    NoData = 3,
    Undefined = 4,
}

impl ResponseCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(ResponseCode::Ok),
            1 => Some(ResponseCode::ProtoError),
            2 => Some(ResponseCode::ServerError),
            3 => Some(ResponseCode::NoData),
            4 => Some(ResponseCode::Undefined),
            _ => None,
        }
    }
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub code: ResponseCode,

    /// COMPRESS option: the value is stored compressed
    pub compressed: bool,

    /// DATA option: value returned by a GET
    pub value: Option<Vec<u8>>,
}

impl Response {
    /// Create a bare response carrying only a code
    pub fn code(code: ResponseCode) -> Self {
        Self {
            code,
            compressed: false,
            value: None,
        }
    }

    /// Create an OK response without data
    pub fn ok() -> Self {
        Self::code(ResponseCode::Ok)
    }

    /// Create an OK response carrying a value
    pub fn data(value: Vec<u8>, compressed: bool) -> Self {
        Self {
            code: ResponseCode::Ok,
            compressed,
            value: Some(value),
        }
    }

    /// Create a NO_DATA response
    pub fn no_data() -> Self {
        Self::code(ResponseCode::NoData)
    }

    /// Create a PROTO_ERROR response
    pub fn proto_error() -> Self {
        Self::code(ResponseCode::ProtoError)
    }

    /// Create a SERVER_ERROR response
    pub fn server_error() -> Self {
        Self::code(ResponseCode::ServerError)
    }

    /// DATA option
    pub fn has_data(&self) -> bool {
        self.value.is_some()
    }
}
