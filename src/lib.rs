//! A blocking client for PostgreSQL's frontend/backend wire protocol,
//! version 2.0.
//!
//! This crate is the connection-establishment and query-execution core of a
//! database driver: opening a TCP stream, negotiating authentication,
//! tracking post-startup session state, and running the request/response
//! message loop to completion. It does not provide a result-set navigation
//! API, SQL string rewriting, or connection pooling — see the crate's
//! `DESIGN.md` for the full list of what is out of scope.
//!
//! # Example
//!
//! ```no_run
//! use pgwire2::Connection;
//!
//! # fn app() -> pgwire2::Result<()> {
//! let mut conn = Connection::from_env()?;
//! let outcome = conn.execute("select 1")?;
//! conn.commit()?;
//! # Ok(())
//! # }
//! ```
mod auth;
mod common;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod session;
pub mod sql_type;
pub mod startup;
pub mod stream;
mod protocol;

pub use config::Config;
pub use connection::Connection;
pub use error::{Error, ErrorKind, Result};
pub use executor::{Field, Outcome, QueryResult, Tuple};
pub use session::IsolationLevel;
pub use sql_type::SQLType;
