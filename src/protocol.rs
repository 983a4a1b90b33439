//! Wire-level constants for PostgreSQL frontend/backend protocol 2.0.
use crate::stream::{ByteStream, Encoding};
use crate::Result;
use std::io::{Read, Write};

pub const PROTOCOL_MAJOR: i32 = 2;
pub const PROTOCOL_MINOR: i32 = 0;

/// Total length of a v2.0 `StartupPacket`, per the fixed field layout below.
pub const STARTUP_PACKET_LEN: i32 = 296;

const DATABASE_FIELD_LEN: usize = 64;
const USER_FIELD_LEN: usize = 32;
const ARGS_FIELD_LEN: usize = 64;
const UNUSED_FIELD_LEN: usize = 64;
const TTY_FIELD_LEN: usize = 64;

pub mod backend_tag {
    pub const AUTH: u8 = b'R';
    pub const BACKEND_KEY_DATA: u8 = b'K';
    pub const ERROR_RESPONSE: u8 = b'E';
    pub const NOTICE_RESPONSE: u8 = b'N';
    pub const NOTIFICATION: u8 = b'A';
    pub const ROW_DESCRIPTION: u8 = b'T';
    pub const DATA_ROW: u8 = b'D';
    pub const BINARY_ROW: u8 = b'B';
    pub const COMMAND_COMPLETE: u8 = b'C';
    pub const EMPTY_QUERY: u8 = b'I';
    pub const CURSOR: u8 = b'P';
    pub const READY_FOR_QUERY: u8 = b'Z';
}

pub mod frontend_tag {
    pub const QUERY: u8 = b'Q';
    /// Fast-path function call; the fast-path subsystem is out of scope for this core.
    #[allow(dead_code)]
    pub const FUNCTION_CALL: u8 = b'F';
    pub const TERMINATE: u8 = b'X';
    /// `PasswordMessage` in v2.0 carries no leading tag byte; see [`crate::protocol::send_password_response`].
    #[allow(dead_code)]
    pub const PASSWORD: u8 = b'p';
}

pub mod auth_code {
    pub const OK: i32 = 0;
    pub const KERBEROS_V4: i32 = 1;
    pub const KERBEROS_V5: i32 = 2;
    pub const CLEARTEXT: i32 = 3;
    pub const CRYPT: i32 = 4;
    pub const MD5: i32 = 5;
}

/// Write a string into a fixed-size, 0-padded field; truncates if too long
/// (the wire format has no way to signal overflow here).
fn write_fixed_field(buf: &mut Vec<u8>, s: &str, len: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(len);
    buf.extend_from_slice(&bytes[..n]);
    buf.resize(buf.len() + (len - n), 0);
}

/// Send the fixed 296-byte v2.0 `StartupPacket` and flush.
pub fn send_startup_packet<S: Read + Write>(
    stream: &mut ByteStream<S>,
    user: &str,
    database: &str,
) -> Result<()> {
    let mut body = Vec::with_capacity(STARTUP_PACKET_LEN as usize - 4);
    let protocol_version = (PROTOCOL_MAJOR << 16) | PROTOCOL_MINOR;
    body.extend_from_slice(&protocol_version.to_be_bytes());
    write_fixed_field(&mut body, database, DATABASE_FIELD_LEN);
    write_fixed_field(&mut body, user, USER_FIELD_LEN);
    body.resize(body.len() + ARGS_FIELD_LEN, 0);
    body.resize(body.len() + UNUSED_FIELD_LEN, 0);
    body.resize(body.len() + TTY_FIELD_LEN, 0);

    debug_assert_eq!(body.len() as i32 + 4, STARTUP_PACKET_LEN);

    stream.send_int(STARTUP_PACKET_LEN, 4);
    stream.send_bytes(&body);
    stream.flush()
}

/// Send a simple `Query` message: tag, C-string SQL. Unlike v3, v2.0's `Q`
/// carries no length field (no backend message does either).
pub fn send_query<S: Read + Write>(stream: &mut ByteStream<S>, sql: &str) -> Result<()> {
    stream.send_char(frontend_tag::QUERY);
    stream.send_cstring(sql, Encoding::Utf8);
    stream.flush()
}

/// Send the one-byte `Terminate` message (no body) and flush.
pub fn send_terminate<S: Read + Write>(stream: &mut ByteStream<S>) -> Result<()> {
    stream.send_char(frontend_tag::TERMINATE);
    stream.flush()
}

/// Send a `PasswordMessage`-shaped response: `int32(5+len(bytes))`, bytes, `0`.
pub fn send_password_response<S: Read + Write>(stream: &mut ByteStream<S>, bytes: &[u8]) -> Result<()> {
    stream.send_int(5 + bytes.len() as i32, 4);
    stream.send_bytes(bytes);
    stream.send_char(0);
    stream.flush()
}
