//! Session-scoped and process-wide state tracked for an open connection.
use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::sql_type::{self, SQLType};
use crate::{Error, Result};

pub type Oid = u32;

/// A server-reported transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Classify backend text by substring match, defaulting to `ReadCommitted`.
    ///
    /// Case-insensitive: the `>=7.3` result-set path reports lowercase values
    /// (`"serializable"`), while the older NOTICE path echoes the uppercase
    /// `SET ... TRANSACTION ISOLATION LEVEL ...` statement text.
    pub fn from_status_text(text: &str) -> Self {
        let text = text.to_uppercase();
        if text.contains("READ UNCOMMITTED") {
            Self::ReadUncommitted
        } else if text.contains("REPEATABLE READ") {
            Self::RepeatableRead
        } else if text.contains("SERIALIZABLE") {
            Self::Serializable
        } else {
            Self::ReadCommitted
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }

    /// Only READ COMMITTED and SERIALIZABLE are accepted by `SET SESSION
    /// CHARACTERISTICS`; anything else is an `InvalidArg` at the call site.
    pub fn is_settable(self) -> bool {
        matches!(self, Self::ReadCommitted | Self::Serializable)
    }
}

/// A server version, compared component-wise (numeric), never lexically.
///
/// The source driver this was ported from compared version strings
/// lexically, which misclassifies e.g. `"10.0"` as less than `"7.3"`; this
/// implementation parses major/minor/patch and compares them as integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Some(Self { major, minor, patch })
    }

    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        *self >= Self { major, minor, patch: 0 }
    }
}

/// Either a pre-constructed type handler or a factory for one, per the
/// tagged-variant redesign of the source's reflective class-name registry.
pub enum TypeHandler<T> {
    Factory(fn() -> T),
    Instance(T),
}

/// Mutable, per-connection session state.
pub struct SessionState {
    pub autocommit: bool,
    pub read_only: bool,
    pub isolation_level: IsolationLevel,
    pub server_version: Option<ServerVersion>,
    pub server_version_string: String,
    pub client_encoding: crate::stream::Encoding,
    pub compatible_version: String,
    warnings: Vec<String>,
    notifications: Vec<(String, i32)>,
    cursor_name: Option<String>,
    object_type_registry: HashMap<String, TypeHandler<()>>,
}

impl SessionState {
    pub fn new(compatible_version: String) -> Self {
        Self {
            autocommit: true,
            read_only: false,
            isolation_level: IsolationLevel::ReadCommitted,
            server_version: None,
            server_version_string: String::new(),
            client_encoding: crate::stream::Encoding::Default,
            compatible_version,
            warnings: Vec::new(),
            notifications: Vec::new(),
            cursor_name: None,
            object_type_registry: HashMap::new(),
        }
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Returns and empties the collected warnings, in wire arrival order.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    pub fn push_notification(&mut self, relname: impl Into<String>, pid: i32) {
        self.notifications.push((relname.into(), pid));
    }

    /// Returns and empties the collected notifications, in wire arrival order.
    pub fn take_notifications(&mut self) -> Vec<(String, i32)> {
        std::mem::take(&mut self.notifications)
    }

    pub fn set_cursor_name(&mut self, name: Option<String>) {
        self.cursor_name = name;
    }

    pub fn cursor_name(&self) -> Option<&str> {
        self.cursor_name.as_deref()
    }

    pub fn register_type_handler(&mut self, pg_type_name: impl Into<String>, handler: TypeHandler<()>) {
        self.object_type_registry.insert(pg_type_name.into(), handler);
    }

    fn server_version_at_least(&self, major: u32, minor: u32) -> bool {
        self.server_version.map(|v| v.at_least(major, minor)).unwrap_or(false)
    }

    /// SQL statements to run to turn autocommit on or off, per §4.5.
    pub fn set_autocommit_sql(&self, enable: bool) -> Vec<&'static str> {
        if enable {
            if self.server_version_at_least(7, 3) {
                vec!["select 1;", "commit; set autocommit = on;"]
            } else {
                vec!["end"]
            }
        } else if self.server_version_at_least(7, 3) {
            vec!["set autocommit = off;", self.isolation_sql_fragment()]
        } else if self.server_version_at_least(7, 1) {
            vec!["begin;", self.isolation_sql_fragment()]
        } else {
            vec!["begin", self.isolation_sql_fragment()]
        }
    }

    /// SQL statements for `commit()`/`rollback()`, per §4.5. Empty if autocommit is on (no-op).
    pub fn end_transaction_sql(&self, commit: bool) -> Vec<String> {
        if self.autocommit {
            return Vec::new();
        }
        let verb = if commit { "commit" } else { "rollback" };
        if self.server_version_at_least(7, 3) {
            vec![format!("{verb};")]
        } else if self.server_version_at_least(7, 1) {
            vec![format!("{verb};begin;{}", self.isolation_sql_fragment())]
        } else {
            vec![verb.into(), "begin".into(), self.isolation_sql_fragment().into()]
        }
    }

    fn isolation_sql_fragment(&self) -> &'static str {
        // Only used pre-7.1/older-server code paths; the isolation SQL is
        // prepended verbatim ahead of each transaction start there.
        match self.isolation_level {
            IsolationLevel::Serializable => "set transaction isolation level serializable;",
            _ => "set transaction isolation level read committed;",
        }
    }

    /// SQL for `setTransactionIsolation`, per §4.5. `None` if the server is
    /// too old for the session-level SET (the isolation SQL instead gets
    /// prepended to each transaction start via [`Self::set_autocommit_sql`]).
    pub fn set_transaction_isolation_sql(&self, level: IsolationLevel) -> Result<Option<String>> {
        if !level.is_settable() {
            return Err(Error::invalid_arg(format!("unsupported isolation level {:?}", level)));
        }
        if self.server_version_at_least(7, 1) {
            Ok(Some(format!(
                "SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL {}",
                level.as_sql()
            )))
        } else {
            Ok(None)
        }
    }

    /// SQL for `getTransactionIsolation`. The statement text is the same on
    /// every supported server version; only the reply framing (NOTICE vs.
    /// a real result set) differs, and the caller handles both.
    pub fn get_transaction_isolation_sql(&self) -> &'static str {
        "show transaction isolation level"
    }

    /// `true` once `SHOW` replies with a real result set (`T`/`D`/`C "SHOW"`)
    /// rather than emitting the value as a `NOTICE` ahead of an empty reply.
    pub fn reports_show_as_result_set(&self) -> bool {
        self.server_version_at_least(7, 3)
    }

    /// Qualified `pg_type` lookup SQL for an OID miss in the type cache.
    pub fn type_name_lookup_sql(&self, oid: Oid) -> String {
        if self.server_version_at_least(7, 3) {
            format!("select typname from pg_catalog.pg_type where oid = {oid}")
        } else {
            format!("select typname from pg_type where oid = {oid}")
        }
    }
}

static SQL_TYPE_CACHE: Lazy<RwLock<HashMap<Oid, SQLType>>> = Lazy::new(|| RwLock::new(HashMap::new()));
static PG_TYPE_CACHE: Lazy<RwLock<HashMap<Oid, String>>> = Lazy::new(|| RwLock::new(HashMap::new()));
static TYPE_OID_CACHE: Lazy<RwLock<HashMap<String, Oid>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Consult the process-wide OID→SQLType cache.
pub fn cached_sql_type(oid: Oid) -> Option<SQLType> {
    SQL_TYPE_CACHE.read().unwrap().get(&oid).copied()
}

/// Populate the process-wide caches after a `pg_type` lookup. Idempotent:
/// entries are immutable once inserted, so a racing insert is harmless.
pub fn populate_type_cache(oid: Oid, typname: String) -> SQLType {
    let kind = sql_type::from_type_name(&typname);
    SQL_TYPE_CACHE.write().unwrap().entry(oid).or_insert(kind);
    TYPE_OID_CACHE.write().unwrap().entry(typname.clone()).or_insert(oid);
    PG_TYPE_CACHE.write().unwrap().entry(oid).or_insert(typname);
    kind
}

pub fn cached_type_name(oid: Oid) -> Option<String> {
    PG_TYPE_CACHE.read().unwrap().get(&oid).cloned()
}

pub fn cached_oid_for_type(name: &str) -> Option<Oid> {
    TYPE_OID_CACHE.read().unwrap().get(name).copied()
}
