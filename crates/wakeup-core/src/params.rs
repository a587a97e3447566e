//! Connection parameters supplied by the caller.

use std::fmt;

/// Default SQL Server port.
pub const DEFAULT_PORT: u16 = 1433;

/// Discrete connection fields, or a raw connection string that overrides them.
///
/// Built once by the outer layer and treated as immutable afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    /// Server hostname or IP address.
    pub server: String,

    /// Server port (default: 1433).
    pub port: u16,

    /// Instance name (for named instances).
    pub instance_name: Option<String>,

    /// Database name.
    pub database: Option<String>,

    /// SQL login name.
    pub user: String,

    /// SQL login password.
    pub password: String,

    /// Complete connection string. When non-empty, every other field is
    /// ignored for string assembly.
    pub raw_dsn: Option<String>,
}

/// Where the connection string comes from, resolved once at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionSource<'a> {
    /// A caller-supplied connection string, used verbatim.
    Raw(&'a str),
    /// Discrete fields to be assembled into a URL.
    Fields(&'a ConnectionParameters),
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: DEFAULT_PORT,
            instance_name: None,
            database: None,
            user: String::new(),
            password: String::new(),
            raw_dsn: None,
        }
    }
}

impl ConnectionParameters {
    /// Create empty parameters with the default port.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create parameters that wrap a complete connection string.
    #[must_use]
    pub fn from_dsn(dsn: impl Into<String>) -> Self {
        Self::default().raw_dsn(dsn)
    }

    /// Set the server host.
    #[must_use]
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the instance name.
    #[must_use]
    pub fn instance_name(mut self, instance: impl Into<String>) -> Self {
        self.instance_name = Some(instance.into());
        self
    }

    /// Set the database name.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the SQL login.
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Set the raw connection string.
    #[must_use]
    pub fn raw_dsn(mut self, dsn: impl Into<String>) -> Self {
        self.raw_dsn = Some(dsn.into());
        self
    }

    /// Resolve which input shape drives string assembly.
    #[must_use]
    pub fn source(&self) -> ConnectionSource<'_> {
        match self.raw_dsn.as_deref() {
            Some(dsn) if !dsn.is_empty() => ConnectionSource::Raw(dsn),
            _ => ConnectionSource::Fields(self),
        }
    }

    /// True when neither a raw string nor server, user or password is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self.source(), ConnectionSource::Fields(_))
            && self.server.is_empty()
            && self.user.is_empty()
            && self.password.is_empty()
    }
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("instance_name", &self.instance_name)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("raw_dsn", &self.raw_dsn.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
