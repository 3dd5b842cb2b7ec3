//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol. The bit positions
//! below are only meaningful at this boundary; the rest of the crate works
//! with `Command`, `RequestOptions` and `ResponseCode`.
//!
//! ## Wire Format
//!
//! ### Request
//! ```text
//! ┌──────────┬─────────────────────┬──────────────────┬─────────────────────┐
//! │ Ctrl (1) │ [NameLen (1) + Name]│ KeyLen (2) + Key │ [ValLen (4) + Value]│
//! └──────────┴─────────────────────┴──────────────────┴─────────────────────┘
//! ```
//! The name is present iff DBNAME is set, the value iff DATA is set.
//!
//! ### Response
//! ```text
//! ┌──────────┬─────────────────────┐
//! │ Ctrl (1) │ [ValLen (4) + Value]│
//! └──────────┴─────────────────────┘
//! ```
//!
//! All lengths are big-endian.

use std::io::{self, Read, Write};

use bytes::{Buf, BufMut};

use super::{Command, Request, RequestOptions, Response, ResponseCode};
use crate::error::{QuillError, Result};

/// Low bit of a request control byte: 0 = GET, 1 = PUT
pub const COMMAND_MASK: u8 = 0x01;

/// Request bits with no assigned meaning
pub const RESERVED_MASK: u8 = 0x06;

pub const OPT_REPLICATION: u8 = 0x08;
pub const OPT_SYNC: u8 = 0x10;
pub const OPT_DBNAME: u8 = 0x20;
pub const OPT_DATA: u8 = 0x40;
pub const OPT_COMPRESS: u8 = 0x80;

/// Low bits of a response control byte holding the code
pub const RESPONSE_CODE_MASK: u8 = 0x07;

/// Maximum database name length (1-byte length prefix)
pub const MAX_DBNAME_LEN: usize = u8::MAX as usize;

/// Maximum key length (2-byte length prefix)
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

/// Maximum value size (16 MB)
pub const MAX_VALUE_SIZE: u32 = 16 * 1024 * 1024;

fn protocol_error(message: impl Into<String>) -> QuillError {
    QuillError::Protocol(message.into())
}

// =============================================================================
// Control Byte
// =============================================================================

fn request_control(request: &Request) -> u8 {
    let mut control = match request.command {
        Command::Get => 0,
        Command::Put => COMMAND_MASK,
    };
    if request.options.replication {
        control |= OPT_REPLICATION;
    }
    if request.options.sync {
        control |= OPT_SYNC;
    }
    if request.has_dbname() {
        control |= OPT_DBNAME;
    }
    if request.has_data() {
        control |= OPT_DATA;
    }
    if request.options.compress {
        control |= OPT_COMPRESS;
    }
    control
}

/// Split a request control byte into command and options, rejecting
/// combinations no body can satisfy.
fn parse_request_control(control: u8) -> Result<(Command, RequestOptions)> {
    if control & RESERVED_MASK != 0 {
        return Err(protocol_error(format!(
            "reserved bits set in control byte 0x{:02x}",
            control
        )));
    }

    let command = if control & COMMAND_MASK == 0 {
        Command::Get
    } else {
        Command::Put
    };
    let options = RequestOptions {
        replication: control & OPT_REPLICATION != 0,
        sync: control & OPT_SYNC != 0,
        compress: control & OPT_COMPRESS != 0,
    };

    let has_data = control & OPT_DATA != 0;
    if command == Command::Put && !has_data {
        return Err(protocol_error("PUT without DATA option"));
    }
    if options.compress && !has_data {
        return Err(protocol_error("COMPRESS option without DATA option"));
    }

    Ok((command, options))
}

fn response_control(response: &Response) -> u8 {
    let mut control = response.code as u8;
    if response.has_data() {
        control |= OPT_DATA;
    }
    if response.compressed {
        control |= OPT_COMPRESS;
    }
    control
}

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request to bytes
///
/// Fails only when a field exceeds what its length prefix can express.
pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
    if request.key.is_empty() {
        return Err(protocol_error("empty key"));
    }
    if request.key.len() > MAX_KEY_LEN {
        return Err(protocol_error(format!(
            "key too long: {} bytes (max {})",
            request.key.len(),
            MAX_KEY_LEN
        )));
    }

    let name_len = request.dbname.as_ref().map(|n| n.len()).unwrap_or(0);
    let value_len = request.value.as_ref().map(|v| v.len()).unwrap_or(0);
    let mut message = Vec::with_capacity(1 + 1 + name_len + 2 + request.key.len() + 4 + value_len);
    message.put_u8(request_control(request));

    if let Some(name) = &request.dbname {
        if name.is_empty() || name.len() > MAX_DBNAME_LEN {
            return Err(protocol_error(format!(
                "database name must be 1..={} bytes, got {}",
                MAX_DBNAME_LEN,
                name.len()
            )));
        }
        message.put_u8(name.len() as u8);
        message.put_slice(name.as_bytes());
    }

    message.put_u16(request.key.len() as u16);
    message.put_slice(&request.key);

    if let Some(value) = &request.value {
        if value.len() > MAX_VALUE_SIZE as usize {
            return Err(protocol_error(format!(
                "value too large: {} bytes (max {})",
                value.len(),
                MAX_VALUE_SIZE
            )));
        }
        message.put_u32(value.len() as u32);
        message.put_slice(value);
    }

    Ok(message)
}

/// Decode a request from a complete frame
///
/// The buffer must hold exactly one frame; trailing bytes are rejected.
pub fn decode_request(bytes: &[u8]) -> Result<Request> {
    let mut buf = bytes;
    if !buf.has_remaining() {
        return Err(protocol_error("missing control byte"));
    }

    let control = buf.get_u8();
    let (command, options) = parse_request_control(control)?;

    let dbname = if control & OPT_DBNAME != 0 {
        need(&buf, 1, "database name length")?;
        let name_len = buf.get_u8() as usize;
        if name_len == 0 {
            return Err(protocol_error("empty database name"));
        }
        let name = take(&mut buf, name_len, "database name")?;
        let name = String::from_utf8(name)
            .map_err(|_| protocol_error("database name is not valid UTF-8"))?;
        Some(name)
    } else {
        None
    };

    need(&buf, 2, "key length")?;
    let key_len = buf.get_u16() as usize;
    if key_len == 0 {
        return Err(protocol_error("empty key"));
    }
    let key = take(&mut buf, key_len, "key")?;

    let value = if control & OPT_DATA != 0 {
        need(&buf, 4, "value length")?;
        let value_len = buf.get_u32();
        if value_len > MAX_VALUE_SIZE {
            return Err(protocol_error(format!(
                "value too large: {} bytes (max {})",
                value_len, MAX_VALUE_SIZE
            )));
        }
        Some(take(&mut buf, value_len as usize, "value")?)
    } else {
        None
    };

    if buf.has_remaining() {
        return Err(protocol_error(format!(
            "{} trailing bytes after frame",
            buf.remaining()
        )));
    }

    Ok(Request {
        command,
        options,
        dbname,
        key,
        value,
    })
}

fn need(buf: &&[u8], len: usize, what: &str) -> Result<()> {
    if buf.remaining() < len {
        return Err(protocol_error(format!(
            "incomplete {}: expected {} bytes, got {}",
            what,
            len,
            buf.remaining()
        )));
    }
    Ok(())
}

fn take(buf: &mut &[u8], len: usize, what: &str) -> Result<Vec<u8>> {
    need(buf, len, what)?;
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    Ok(bytes)
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: control (1) + [value_len (4) + value]
pub fn encode_response(response: &Response) -> Vec<u8> {
    let value_len = response.value.as_ref().map(|v| v.len()).unwrap_or(0);
    let mut message = Vec::with_capacity(1 + 4 + value_len);
    message.put_u8(response_control(response));

    if let Some(value) = &response.value {
        message.put_u32(value.len() as u32);
        message.put_slice(value);
    }

    message
}

/// Decode a response from a complete frame
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let mut buf = bytes;
    if !buf.has_remaining() {
        return Err(protocol_error("missing response control byte"));
    }

    let control = buf.get_u8();
    let code = ResponseCode::from_u8(control & RESPONSE_CODE_MASK).ok_or_else(|| {
        protocol_error(format!(
            "unknown response code: {}",
            control & RESPONSE_CODE_MASK
        ))
    })?;

    let value = if control & OPT_DATA != 0 {
        need(&buf, 4, "response value length")?;
        let value_len = buf.get_u32();
        if value_len > MAX_VALUE_SIZE {
            return Err(protocol_error(format!(
                "response value too large: {} bytes (max {})",
                value_len, MAX_VALUE_SIZE
            )));
        }
        Some(take(&mut buf, value_len as usize, "response value")?)
    } else {
        None
    };

    if buf.has_remaining() {
        return Err(protocol_error(format!(
            "{} trailing bytes after response",
            buf.remaining()
        )));
    }

    Ok(Response {
        code,
        compressed: control & OPT_COMPRESS != 0,
        value,
    })
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete request from a stream
///
/// End of stream before the control byte surfaces as an I/O
/// `UnexpectedEof` (the peer closed cleanly). End of stream anywhere after it
/// is a truncated frame and surfaces as a protocol error.
pub fn read_request<R: Read>(reader: &mut R) -> Result<Request> {
    let mut control = [0u8; 1];
    reader.read_exact(&mut control)?;

    // Reject impossible option combinations before waiting on a body.
    parse_request_control(control[0])?;

    let mut frame = vec![control[0]];

    if control[0] & OPT_DBNAME != 0 {
        read_field(reader, &mut frame, 1, "database name length")?;
        let name_len = frame[frame.len() - 1] as usize;
        read_field(reader, &mut frame, name_len, "database name")?;
    }

    read_field(reader, &mut frame, 2, "key length")?;
    let key_len = u16::from_be_bytes([frame[frame.len() - 2], frame[frame.len() - 1]]) as usize;
    read_field(reader, &mut frame, key_len, "key")?;

    if control[0] & OPT_DATA != 0 {
        let value_len = read_length(reader, &mut frame, "value length")?;
        read_field(reader, &mut frame, value_len, "value")?;
    }

    decode_request(&frame)
}

/// Write a request to a stream
pub fn write_request<W: Write>(writer: &mut W, request: &Request) -> Result<()> {
    let bytes = encode_request(request)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let mut control = [0u8; 1];
    reader.read_exact(&mut control)?;

    let mut frame = vec![control[0]];
    if control[0] & OPT_DATA != 0 {
        let value_len = read_length(reader, &mut frame, "response value length")?;
        read_field(reader, &mut frame, value_len, "response value")?;
    }

    decode_response(&frame)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    let bytes = encode_response(response);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a 4-byte length prefix, validating it before anything is allocated
fn read_length<R: Read>(reader: &mut R, frame: &mut Vec<u8>, what: &str) -> Result<usize> {
    read_field(reader, frame, 4, what)?;
    let n = frame.len();
    let len = u32::from_be_bytes([frame[n - 4], frame[n - 3], frame[n - 2], frame[n - 1]]);
    if len > MAX_VALUE_SIZE {
        return Err(protocol_error(format!(
            "value too large: {} bytes (max {})",
            len, MAX_VALUE_SIZE
        )));
    }
    Ok(len as usize)
}

/// Read part of a frame whose control byte has already arrived
///
/// Running out of input here, whether by end of stream or by the read
/// timeout expiring, leaves an incomplete frame and is a protocol error.
fn read_field<R: Read>(reader: &mut R, frame: &mut Vec<u8>, len: usize, what: &str) -> Result<()> {
    let start = frame.len();
    frame.resize(start + len, 0);
    reader.read_exact(&mut frame[start..]).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            protocol_error(format!("truncated frame: missing {}", what))
        }
        _ => QuillError::Io(e),
    })
}
