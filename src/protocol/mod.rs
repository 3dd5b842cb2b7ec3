//! Protocol Module
//!
//! Defines the binary wire protocol for client-server communication.
//!
//! Every frame starts with one control byte. For requests the low bit is the
//! command and the high bits are independent options; for responses the low
//! three bits are the response code and the same high bits announce a value.
//!
//! ### Request Control Byte
//! ```text
//!   bit:   7          6      5        4      3            2..1       0
//!        ┌──────────┬──────┬────────┬──────┬────────────┬──────────┬─────┐
//!        │ COMPRESS │ DATA │ DBNAME │ SYNC │ REPLICATION│ reserved │ CMD │
//!        └──────────┴──────┴────────┴──────┴────────────┴──────────┴─────┘
//! ```
//!
//! ### Request Body
//! ```text
//! [DBNAME: name_len (1) + name] [key_len (2) + key] [DATA: value_len (4) + value]
//! ```
//!
//! ### Response
//! ```text
//! [code | DATA | COMPRESS (1)] [DATA: value_len (4) + value]
//! ```
//!
//! ### Response Codes
//! - 0: OK
//! - 1: PROTO_ERROR
//! - 2: SERVER_ERROR
//! - 3: NO_DATA
//! - 4: UNDEFINED

mod command;
mod response;
mod codec;

pub use command::{Command, Request, RequestOptions};
pub use response::{Response, ResponseCode};
pub use codec::{
    decode_request, decode_response, encode_request, encode_response, read_request,
    read_response, write_request, write_response,
};
pub use codec::{
    COMMAND_MASK, MAX_DBNAME_LEN, MAX_KEY_LEN, MAX_VALUE_SIZE, OPT_COMPRESS, OPT_DATA,
    OPT_DBNAME, OPT_REPLICATION, OPT_SYNC, RESERVED_MASK, RESPONSE_CODE_MASK,
};
