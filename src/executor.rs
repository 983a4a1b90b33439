//! The query-execution message loop: the heart of the driver.
use std::io::{Read, Write};

use crate::protocol::{backend_tag, send_query};
use crate::session::{Oid, SessionState};
use crate::stream::{ByteStream, Encoding};
use crate::{Error, Result};

/// A column descriptor from a `RowDescription` message.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub oid: Oid,
    pub size: i16,
    pub modifier: i32,
}

/// One row: a field's value is `None` when the wire null bitmap marked it null.
#[derive(Debug, Clone, Default)]
pub struct Tuple {
    pub values: Vec<Option<Vec<u8>>>,
}

/// The outcome of executing one SQL string.
#[derive(Debug, Clone)]
pub enum QueryResult {
    Rows { fields: Vec<Field>, tuples: Vec<Tuple>, binary: bool },
    UpdateCount { count: i64, insert_oid: Option<Oid> },
    Empty,
    CursorRef { name: String },
}

/// A completed query: its result plus the backend's human-readable status string.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub result: QueryResult,
    pub status: String,
}

enum LoopState {
    Idle,
    Receiving { fields: Vec<Field>, tuples: Vec<Tuple>, binary: bool },
}

/// Send `Q <sql> \0` and drive the response message loop to `ReadyForQuery`,
/// mutating `session` for side-band messages (warnings, notifications,
/// cursor names) along the way.
///
/// `sql` may be a compound, semicolon-joined string: the backend answers
/// each statement with its own `RowDescription`/`DataRow*`/`CommandComplete`
/// group (or `EmptyQuery`/`ErrorResponse`) before a single final
/// `ReadyForQuery`. The returned [`Outcome`] reflects the *last* statement's
/// result, which is what every caller in this core wants (bootstrap wants
/// `select version()`'s row, not `set datestyle`'s).
///
/// A fatal `ErrorResponse` does not abort the loop early: per the ordering
/// guarantee, the executor keeps reading until `Z` so the connection remains
/// usable, then raises [`Error`] to the caller. Real backends stop executing
/// the remaining statements in the string once one errors, so no further
/// `CommandComplete` arrives after that point.
pub fn execute<S: Read + Write>(
    stream: &mut ByteStream<S>,
    session: &mut SessionState,
    sql: &str,
) -> Result<Outcome> {
    send_query(stream, sql)?;

    let mut state = LoopState::Idle;
    let mut sql_error: Option<String> = None;
    let mut last_result = QueryResult::Empty;
    let mut last_status = String::new();

    loop {
        let tag = stream.recv_char()?;
        state = match (state, tag) {
            (LoopState::Idle, backend_tag::ROW_DESCRIPTION) => {
                let fields = read_row_description(stream)?;
                LoopState::Receiving { fields, tuples: Vec::new(), binary: false }
            }
            (LoopState::Idle, backend_tag::COMMAND_COMPLETE) => {
                let status = stream.recv_cstring(Encoding::Utf8)?;
                last_result = finalize_command(&status);
                last_status = status;
                LoopState::Idle
            }
            (LoopState::Idle, backend_tag::EMPTY_QUERY) => {
                last_result = QueryResult::Empty;
                last_status = String::new();
                LoopState::Idle
            }
            (LoopState::Idle, backend_tag::ERROR_RESPONSE) => {
                let msg = stream.recv_cstring(Encoding::Default)?;
                sql_error = Some(msg);
                LoopState::Idle
            }
            (LoopState::Idle, backend_tag::NOTICE_RESPONSE) => {
                let msg = stream.recv_cstring(Encoding::Default)?;
                session.push_warning(msg);
                LoopState::Idle
            }
            (LoopState::Idle, backend_tag::NOTIFICATION) => {
                let pid = stream.recv_int32()?;
                let relname = stream.recv_cstring(Encoding::Default)?;
                session.push_notification(relname, pid);
                LoopState::Idle
            }
            (LoopState::Idle, backend_tag::CURSOR) => {
                let name = stream.recv_cstring(Encoding::Default)?;
                session.set_cursor_name(Some(name));
                LoopState::Idle
            }
            (LoopState::Idle, backend_tag::READY_FOR_QUERY) => {
                if let Some(msg) = sql_error {
                    return Err(Error::sql(msg));
                }
                return Ok(Outcome { result: last_result, status: last_status });
            }

            (LoopState::Receiving { fields, mut tuples, binary }, backend_tag::DATA_ROW) => {
                let tuple = read_tuple(stream, fields.len())?;
                tuples.push(tuple);
                LoopState::Receiving { fields, tuples, binary }
            }
            (LoopState::Receiving { fields, mut tuples, .. }, backend_tag::BINARY_ROW) => {
                let tuple = read_tuple(stream, fields.len())?;
                tuples.push(tuple);
                LoopState::Receiving { fields, tuples, binary: true }
            }
            (LoopState::Receiving { fields, tuples, binary }, backend_tag::COMMAND_COMPLETE) => {
                let status = stream.recv_cstring(Encoding::Utf8)?;
                last_result = QueryResult::Rows { fields, tuples, binary };
                last_status = status;
                LoopState::Idle
            }
            (LoopState::Receiving { fields, tuples, binary }, backend_tag::ERROR_RESPONSE) => {
                let msg = stream.recv_cstring(Encoding::Default)?;
                sql_error = Some(msg);
                last_result = QueryResult::Rows { fields, tuples, binary };
                last_status = String::new();
                LoopState::Idle
            }
            (LoopState::Receiving { fields, tuples, binary }, backend_tag::NOTICE_RESPONSE) => {
                let msg = stream.recv_cstring(Encoding::Default)?;
                session.push_warning(msg);
                LoopState::Receiving { fields, tuples, binary }
            }
            (LoopState::Receiving { fields, tuples, binary }, backend_tag::NOTIFICATION) => {
                let pid = stream.recv_int32()?;
                let relname = stream.recv_cstring(Encoding::Default)?;
                session.push_notification(relname, pid);
                LoopState::Receiving { fields, tuples, binary }
            }

            (_, other) => return Err(Error::protocol(format!("unexpected tag {other:#x} during query"))),
        };
    }
}

fn read_row_description<S: Read + Write>(stream: &mut ByteStream<S>) -> Result<Vec<Field>> {
    let n = stream.recv_int16()? as usize;
    let mut fields = Vec::with_capacity(n);
    for _ in 0..n {
        let name = stream.recv_cstring(Encoding::Utf8)?;
        let oid = stream.recv_int32()? as u32;
        let size = stream.recv_int16()?;
        let modifier = stream.recv_int32()?;
        fields.push(Field { name, oid, size, modifier });
    }
    Ok(fields)
}

/// Read a `D`/`B` tuple: int16 field count, a packed null bitmap (MSB-first,
/// set bit = non-null), then length-prefixed payloads for each non-null field.
fn read_tuple<S: Read + Write>(stream: &mut ByteStream<S>, expected_fields: usize) -> Result<Tuple> {
    let n = stream.recv_int16()? as usize;
    let bitmap_len = n.div_ceil(8);
    let bitmap = stream.recv_exact(bitmap_len)?;

    let mut values = Vec::with_capacity(n);
    for i in 0..n {
        let byte = bitmap[i / 8];
        let non_null = (byte >> (7 - (i % 8))) & 1 == 1;
        if !non_null {
            values.push(None);
            continue;
        }
        let len = stream.recv_int32()?;
        let payload = stream.recv_exact((len - 4).max(0) as usize)?;
        values.push(Some(payload));
    }

    debug_assert!(expected_fields == 0 || expected_fields == n);
    Ok(Tuple { values })
}

/// Parse a `CommandComplete` status string into an update result, per §4.4.
fn finalize_command(status: &str) -> QueryResult {
    let mut parts = status.split_whitespace();
    match parts.next() {
        Some("INSERT") => {
            let oid: Oid = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            let rows: i64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(-1);
            QueryResult::UpdateCount { count: rows, insert_oid: (oid != 0).then_some(oid) }
        }
        Some("UPDATE") | Some("DELETE") | Some("MOVE") | Some("FETCH") => {
            let n: i64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(-1);
            QueryResult::UpdateCount { count: n, insert_oid: None }
        }
        Some("SELECT") | Some("BEGIN") | Some("COMMIT") | Some("ROLLBACK") | Some("SET") | Some("SHOW") => {
            QueryResult::UpdateCount { count: -1, insert_oid: None }
        }
        _ => QueryResult::UpdateCount { count: -1, insert_oid: None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::stream::Duplex;

    fn mock(bytes: &[u8]) -> ByteStream<Duplex> {
        ByteStream::new(Duplex::new(bytes))
    }

    #[test]
    fn status_string_parsing() {
        assert!(matches!(
            finalize_command("INSERT 12345 1"),
            QueryResult::UpdateCount { count: 1, insert_oid: Some(12345) }
        ));
        assert!(matches!(
            finalize_command("INSERT 0 3"),
            QueryResult::UpdateCount { count: 3, insert_oid: None }
        ));
        assert!(matches!(finalize_command("UPDATE 7"), QueryResult::UpdateCount { count: 7, .. }));
        assert!(matches!(finalize_command("SELECT"), QueryResult::UpdateCount { count: -1, .. }));
    }

    #[test]
    fn simple_select_scenario() {
        // T: one field "?column?" oid 23; D: one tuple "1"; C: "SELECT"; Z
        let mut body = Vec::new();
        body.push(backend_tag::ROW_DESCRIPTION);
        let mut row_desc_body = Vec::new();
        row_desc_body.extend_from_slice(&1i16.to_be_bytes());
        row_desc_body.extend_from_slice(b"?column?\0");
        row_desc_body.extend_from_slice(&23i32.to_be_bytes());
        row_desc_body.extend_from_slice(&4i16.to_be_bytes());
        row_desc_body.extend_from_slice(&(-1i32).to_be_bytes());
        body.extend_from_slice(&row_desc_body);

        body.push(backend_tag::DATA_ROW);
        body.extend_from_slice(&1i16.to_be_bytes());
        body.push(0b1000_0000); // bitmap: field 0 non-null
        body.extend_from_slice(&5i32.to_be_bytes()); // len incl self = 4 + 1
        body.push(b'1');

        body.push(backend_tag::COMMAND_COMPLETE);
        body.extend_from_slice(b"SELECT\0");
        body.push(backend_tag::READY_FOR_QUERY);

        let mut stream = mock(&body);
        let mut session = SessionState::new("1.0".into());
        let outcome = execute(&mut stream, &mut session, "select 1").unwrap();
        match outcome.result {
            QueryResult::Rows { fields, tuples, binary } => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].name, "?column?");
                assert_eq!(fields[0].oid, 23);
                assert!(!binary);
                assert_eq!(tuples.len(), 1);
                assert_eq!(tuples[0].values[0].as_deref(), Some(b"1".as_slice()));
            }
            other => panic!("expected Rows, got {other:?}"),
        }
    }

    #[test]
    fn warning_with_no_rows() {
        let mut body = Vec::new();
        body.push(backend_tag::NOTICE_RESPONSE);
        body.extend_from_slice(b"NOTICE: x\0");
        body.push(backend_tag::COMMAND_COMPLETE);
        body.extend_from_slice(b"SELECT\0");
        body.push(backend_tag::READY_FOR_QUERY);

        let mut stream = mock(&body);
        let mut session = SessionState::new("1.0".into());
        let outcome = execute(&mut stream, &mut session, "select * from t where 1=0").unwrap();
        assert!(matches!(outcome.result, QueryResult::UpdateCount { count: -1, .. }));
        let warnings = session.take_warnings();
        assert_eq!(warnings, vec!["NOTICE: x".to_string()]);
    }

    #[test]
    fn error_mid_query_keeps_connection_usable() {
        let mut body = Vec::new();
        body.push(backend_tag::ROW_DESCRIPTION);
        body.extend_from_slice(&0i16.to_be_bytes());
        body.push(backend_tag::DATA_ROW);
        body.extend_from_slice(&0i16.to_be_bytes());
        body.push(backend_tag::ERROR_RESPONSE);
        body.extend_from_slice(b"ERROR: boom\0");
        body.push(backend_tag::READY_FOR_QUERY);

        let mut stream = mock(&body);
        let mut session = SessionState::new("1.0".into());
        let err = execute(&mut stream, &mut session, "select boom()").unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::Sql(_)));
    }
}
