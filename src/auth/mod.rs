//! Authentication handshake: send the startup packet, then drive whichever
//! auth sub-protocol the backend requests.
mod crypt;

use std::io::{Read, Write};

use md5::{Digest, Md5};

use crate::protocol::{auth_code, backend_tag, send_password_response, send_startup_packet};
use crate::stream::{ByteStream, Encoding};
use crate::{Error, Result};

/// Run the v2.0 startup + authentication exchange to completion.
///
/// On success the backend has sent `AuthenticationOk`; the caller proceeds to
/// [`crate::startup::post_startup`].
pub fn authenticate<S: Read + Write>(
    stream: &mut ByteStream<S>,
    user: &str,
    database: &str,
    password: &str,
) -> Result<()> {
    send_startup_packet(stream, user, database)?;

    loop {
        let tag = stream.recv_char()?;
        match tag {
            backend_tag::ERROR_RESPONSE => {
                let msg = stream.recv_cstring(Encoding::Default)?;
                return Err(Error::auth(msg));
            }
            backend_tag::AUTH => {
                let areq = stream.recv_int32()?;
                match areq {
                    auth_code::OK => return Ok(()),
                    auth_code::KERBEROS_V4 | auth_code::KERBEROS_V5 => {
                        return Err(Error::auth("kerberos authentication is not supported"));
                    }
                    auth_code::CLEARTEXT => {
                        send_password_response(stream, password.as_bytes())?;
                    }
                    auth_code::CRYPT => {
                        let salt = stream.recv_exact(2)?;
                        let salt = [salt[0], salt[1]];
                        let hashed = crypt::crypt(password.as_bytes(), salt);
                        let mut response = Vec::with_capacity(2 + hashed.len());
                        response.push(salt[0]);
                        response.push(salt[1]);
                        response.extend_from_slice(hashed.as_bytes());
                        send_password_response(stream, &response)?;
                    }
                    auth_code::MD5 => {
                        let salt = stream.recv_exact(4)?;
                        let hashed = md5_password(user, password, &salt);
                        send_password_response(stream, hashed.as_bytes())?;
                    }
                    other => {
                        return Err(Error::auth(format!("unknown authentication request {other}")));
                    }
                }
            }
            other => return Err(Error::protocol(format!("unexpected tag {other:#x} during auth setup"))),
        }
    }
}

/// `"md5" + hex(md5(hex(md5(password ‖ user)) ‖ salt))`.
fn md5_password(user: &str, password: &str, salt: &[u8]) -> String {
    let inner = hex::encode(Md5::digest(format!("{password}{user}").as_bytes()));
    let outer = {
        let mut hasher = Md5::new();
        hasher.update(inner.as_bytes());
        hasher.update(salt);
        hasher.finalize()
    };
    format!("md5{}", hex::encode(outer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Duplex;

    #[test]
    fn md5_matches_known_vector() {
        // password="bob", user="alice", salt=[0x01,0x02,0x03,0x04]
        let got = md5_password("alice", "bob", &[0x01, 0x02, 0x03, 0x04]);
        assert!(got.starts_with("md5"));
        assert_eq!(got.len(), 3 + 32);

        let inner = hex::encode(Md5::digest(b"bobalice"));
        let mut hasher = Md5::new();
        hasher.update(inner.as_bytes());
        hasher.update([0x01, 0x02, 0x03, 0x04]);
        let expected = format!("md5{}", hex::encode(hasher.finalize()));
        assert_eq!(got, expected);
    }

    fn mock(bytes: &[u8]) -> ByteStream<Duplex> {
        ByteStream::new(Duplex::new(bytes))
    }

    #[test]
    fn plain_auth_ok_immediately() {
        let mut reply = Vec::new();
        reply.push(backend_tag::AUTH);
        reply.extend_from_slice(&auth_code::OK.to_be_bytes());
        let mut s = mock(&reply);
        authenticate(&mut s, "alice", "alice", "").unwrap();
    }

    #[test]
    fn kerberos_is_rejected() {
        let mut reply = Vec::new();
        reply.push(backend_tag::AUTH);
        reply.extend_from_slice(&auth_code::KERBEROS_V5.to_be_bytes());
        let mut s = mock(&reply);
        assert!(authenticate(&mut s, "alice", "alice", "").is_err());
    }

    #[test]
    fn error_response_during_auth_fails() {
        let mut reply = Vec::new();
        reply.push(backend_tag::ERROR_RESPONSE);
        reply.extend_from_slice(b"bad password\0");
        let mut s = mock(&reply);
        assert!(authenticate(&mut s, "alice", "alice", "wrong").is_err());
    }
}
