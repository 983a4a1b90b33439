//! Post-authentication handshake: backend key data, session defaults.
use std::io::{Read, Write};

use crate::executor::{self, QueryResult};
use crate::protocol::backend_tag;
use crate::session::{ServerVersion, SessionState};
use crate::stream::{ByteStream, Encoding};
use crate::{Error, Result};

/// Backend process ID and cancellation key, captured during startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendKeyData {
    pub process_id: i32,
    pub cancellation_key: i32,
}

/// Drain `K`/`N`/`E`/`Z` until `ReadyForQuery`, then issue the bootstrap
/// query and apply version-gated session defaults, per §4.3.
pub fn post_startup<S: Read + Write>(
    stream: &mut ByteStream<S>,
    session: &mut SessionState,
    char_set_override: Option<&str>,
) -> Result<BackendKeyData> {
    let mut key_data = None;

    loop {
        match stream.recv_char()? {
            backend_tag::BACKEND_KEY_DATA => {
                let process_id = stream.recv_int32()?;
                let cancellation_key = stream.recv_int32()?;
                key_data = Some(BackendKeyData { process_id, cancellation_key });
            }
            backend_tag::NOTICE_RESPONSE => {
                let msg = stream.recv_cstring(Encoding::Default)?;
                session.push_warning(msg);
            }
            backend_tag::ERROR_RESPONSE => {
                let msg = stream.recv_cstring(Encoding::Default)?;
                return Err(Error::auth(msg));
            }
            backend_tag::READY_FOR_QUERY => break,
            other => return Err(Error::protocol(format!("unexpected tag {other:#x} during startup"))),
        }
    }

    let key_data = key_data.ok_or_else(|| Error::protocol("backend never sent BackendKeyData"))?;

    bootstrap(stream, session, char_set_override)?;

    Ok(key_data)
}

fn bootstrap<S: Read + Write>(
    stream: &mut ByteStream<S>,
    session: &mut SessionState,
    char_set_override: Option<&str>,
) -> Result<()> {
    let enc_expr = "case when pg_encoding_to_char(1) = '' then 'UNKNOWN' else getdatabaseencoding() end";
    let sql = format!("set datestyle to 'ISO'; select version(), {enc_expr};");
    let outcome = executor::execute(stream, session, &sql)?;

    let QueryResult::Rows { tuples, .. } = outcome.result else {
        return Err(Error::protocol("bootstrap query returned no rows"));
    };
    let first = tuples.first().ok_or_else(|| Error::protocol("bootstrap query returned no rows"))?;

    let version_col = first
        .values
        .first()
        .and_then(|v| v.as_ref())
        .ok_or_else(|| Error::protocol("missing version() column"))?;
    let version_text = String::from_utf8_lossy(version_col);
    let version_token = version_text
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| Error::protocol("unrecognized version() output"))?;

    session.server_version_string = version_token.to_string();
    session.server_version = ServerVersion::parse(version_token);

    let encoding_col = first.values.get(1).and_then(|v| v.as_ref());
    let encoding_name = char_set_override
        .map(|s| s.to_string())
        .or_else(|| encoding_col.map(|b| String::from_utf8_lossy(b).into_owned()));

    if session.server_version.map(|v| v.at_least(7, 3)).unwrap_or(false) {
        session.client_encoding = Encoding::Utf8;
        let outcome = executor::execute(stream, session, "set client_encoding = 'UNICODE'; show autocommit")?;
        // `CommandComplete` for `show autocommit` is always the literal word
        // "SHOW"; the reported value is in the result set's first row/column.
        let autocommit_text = match outcome.result {
            QueryResult::Rows { tuples, .. } => tuples
                .first()
                .and_then(|t| t.values.first())
                .and_then(|v| v.as_ref())
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default(),
            _ => String::new(),
        };
        if autocommit_text.to_lowercase().contains("off") {
            executor::execute(stream, session, "set autocommit = on; commit;")?;
        }
        session.autocommit = true;
    } else if let Some(name) = encoding_name {
        session.client_encoding = if name.eq_ignore_ascii_case("UNICODE") || name.eq_ignore_ascii_case("UTF8") {
            Encoding::Utf8
        } else {
            Encoding::Default
        };
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::backend_tag;
    use crate::stream::Duplex;

    fn mock(bytes: &[u8]) -> ByteStream<Duplex> {
        ByteStream::new(Duplex::new(bytes))
    }

    #[test]
    fn captures_backend_key_data() {
        let mut body = Vec::new();
        body.push(backend_tag::BACKEND_KEY_DATA);
        body.extend_from_slice(&42i32.to_be_bytes());
        body.extend_from_slice(&0xDEADBEEFu32.to_be_bytes());
        body.push(backend_tag::READY_FOR_QUERY);

        // bootstrap query is compound: `set datestyle ...; select version(), ...;`
        // a real backend answers with one CommandComplete per statement.
        body.push(backend_tag::COMMAND_COMPLETE);
        body.extend_from_slice(b"SET\0");
        body.push(backend_tag::ROW_DESCRIPTION);
        body.extend_from_slice(&2i16.to_be_bytes());
        for name in ["version", "encoding"] {
            body.extend_from_slice(name.as_bytes());
            body.push(0);
            body.extend_from_slice(&25i32.to_be_bytes());
            body.extend_from_slice(&(-1i16).to_be_bytes());
            body.extend_from_slice(&(-1i32).to_be_bytes());
        }
        body.push(backend_tag::DATA_ROW);
        body.extend_from_slice(&2i16.to_be_bytes());
        body.push(0b1100_0000);
        let version_text = b"PostgreSQL 9.6.2 on x86_64";
        body.extend_from_slice(&(4 + version_text.len() as i32).to_be_bytes());
        body.extend_from_slice(version_text);
        let enc_text = b"UTF8";
        body.extend_from_slice(&(4 + enc_text.len() as i32).to_be_bytes());
        body.extend_from_slice(enc_text);
        body.push(backend_tag::COMMAND_COMPLETE);
        body.extend_from_slice(b"SELECT\0");
        body.push(backend_tag::READY_FOR_QUERY);

        // `set client_encoding ...; show autocommit` roundtrip for >=7.3: again
        // one CommandComplete per statement, and `show`'s CommandComplete tag
        // is always the literal word "SHOW" — the value is in the row.
        body.push(backend_tag::COMMAND_COMPLETE);
        body.extend_from_slice(b"SET\0");
        body.push(backend_tag::ROW_DESCRIPTION);
        body.extend_from_slice(&1i16.to_be_bytes());
        body.extend_from_slice(b"autocommit\0");
        body.extend_from_slice(&25i32.to_be_bytes());
        body.extend_from_slice(&(-1i16).to_be_bytes());
        body.extend_from_slice(&(-1i32).to_be_bytes());
        body.push(backend_tag::DATA_ROW);
        body.extend_from_slice(&1i16.to_be_bytes());
        body.push(0b1000_0000);
        body.extend_from_slice(&(4 + 2i32).to_be_bytes());
        body.extend_from_slice(b"on");
        body.push(backend_tag::COMMAND_COMPLETE);
        body.extend_from_slice(b"SHOW\0");
        body.push(backend_tag::READY_FOR_QUERY);

        let mut stream = mock(&body);
        let mut session = SessionState::new("1.0".into());
        let key_data = post_startup(&mut stream, &mut session, None).unwrap();
        assert_eq!(key_data.process_id, 42);
        assert_eq!(key_data.cancellation_key, 0xDEADBEEFu32 as i32);
        assert_eq!(session.server_version_string, "9.6.2");
        assert_eq!(session.server_version, ServerVersion::parse("9.6.2"));
        assert!(session.autocommit);
    }

    #[test]
    fn turns_autocommit_back_on_when_server_reports_it_off() {
        let mut body = Vec::new();
        body.push(backend_tag::BACKEND_KEY_DATA);
        body.extend_from_slice(&1i32.to_be_bytes());
        body.extend_from_slice(&1i32.to_be_bytes());
        body.push(backend_tag::READY_FOR_QUERY);

        body.push(backend_tag::COMMAND_COMPLETE);
        body.extend_from_slice(b"SET\0");
        body.push(backend_tag::ROW_DESCRIPTION);
        body.extend_from_slice(&2i16.to_be_bytes());
        for name in ["version", "encoding"] {
            body.extend_from_slice(name.as_bytes());
            body.push(0);
            body.extend_from_slice(&25i32.to_be_bytes());
            body.extend_from_slice(&(-1i16).to_be_bytes());
            body.extend_from_slice(&(-1i32).to_be_bytes());
        }
        body.push(backend_tag::DATA_ROW);
        body.extend_from_slice(&2i16.to_be_bytes());
        body.push(0b1100_0000);
        let version_text = b"PostgreSQL 9.6.2 on x86_64";
        body.extend_from_slice(&(4 + version_text.len() as i32).to_be_bytes());
        body.extend_from_slice(version_text);
        let enc_text = b"UTF8";
        body.extend_from_slice(&(4 + enc_text.len() as i32).to_be_bytes());
        body.extend_from_slice(enc_text);
        body.push(backend_tag::COMMAND_COMPLETE);
        body.extend_from_slice(b"SELECT\0");
        body.push(backend_tag::READY_FOR_QUERY);

        // `show autocommit` reports "off" ...
        body.push(backend_tag::COMMAND_COMPLETE);
        body.extend_from_slice(b"SET\0");
        body.push(backend_tag::ROW_DESCRIPTION);
        body.extend_from_slice(&1i16.to_be_bytes());
        body.extend_from_slice(b"autocommit\0");
        body.extend_from_slice(&25i32.to_be_bytes());
        body.extend_from_slice(&(-1i16).to_be_bytes());
        body.extend_from_slice(&(-1i32).to_be_bytes());
        body.push(backend_tag::DATA_ROW);
        body.extend_from_slice(&1i16.to_be_bytes());
        body.push(0b1000_0000);
        body.extend_from_slice(&(4 + 3i32).to_be_bytes());
        body.extend_from_slice(b"off");
        body.push(backend_tag::COMMAND_COMPLETE);
        body.extend_from_slice(b"SHOW\0");
        body.push(backend_tag::READY_FOR_QUERY);

        // ... so the driver issues `set autocommit = on; commit;` to fix it up.
        body.push(backend_tag::COMMAND_COMPLETE);
        body.extend_from_slice(b"SET\0");
        body.push(backend_tag::COMMAND_COMPLETE);
        body.extend_from_slice(b"COMMIT\0");
        body.push(backend_tag::READY_FOR_QUERY);

        let mut stream = mock(&body);
        let mut session = SessionState::new("1.0".into());
        post_startup(&mut stream, &mut session, None).unwrap();
        assert!(session.autocommit);
    }
}
