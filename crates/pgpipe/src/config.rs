//! Connection and pool configuration.

use crate::error::{PipeError, PipeResult};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Settings for [`Db::connect`](crate::Db::connect) and [`create_pool`](crate::create_pool).
///
/// Either set `dsn` directly or fill in the individual fields and let
/// [`PgConfig::build_dsn`] assemble a key/value connection string.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct PgConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub sslmode: String,
    /// Full connection string; takes precedence over the individual fields.
    pub dsn: Option<String>,
    /// Maximum number of pooled connections.
    pub max_size: usize,
    /// How long `pool.get()` waits for a free connection.
    pub wait_timeout_ms: Option<u64>,
    /// How long opening a new connection may take.
    pub create_timeout_ms: Option<u64>,
    /// How long recycling a returned connection may take.
    pub recycle_timeout_ms: Option<u64>,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            user: String::new(),
            password: String::new(),
            dbname: String::new(),
            sslmode: String::new(),
            dsn: None,
            max_size: 16,
            wait_timeout_ms: None,
            create_timeout_ms: None,
            recycle_timeout_ms: None,
        }
    }
}

impl fmt::Debug for PgConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("dbname", &self.dbname)
            .field("sslmode", &self.sslmode)
            .field("dsn", &self.dsn.as_ref().map(|_| "***"))
            .field("max_size", &self.max_size)
            .field("wait_timeout_ms", &self.wait_timeout_ms)
            .field("create_timeout_ms", &self.create_timeout_ms)
            .field("recycle_timeout_ms", &self.recycle_timeout_ms)
            .finish()
    }
}

impl PgConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn dbname(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = dbname.into();
        self
    }

    /// e.g. `disable`, `prefer`, `require`.
    pub fn sslmode(mut self, sslmode: impl Into<String>) -> Self {
        self.sslmode = sslmode.into();
        self
    }

    /// Use a ready-made connection string (URL or key/value form).
    pub fn dsn(mut self, dsn: impl Into<String>) -> Self {
        self.dsn = Some(dsn.into());
        self
    }

    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn create_timeout(mut self, timeout: Duration) -> Self {
        self.create_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn recycle_timeout(mut self, timeout: Duration) -> Self {
        self.recycle_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn wait_timeout_duration(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    pub fn create_timeout_duration(&self) -> Option<Duration> {
        self.create_timeout_ms.map(Duration::from_millis)
    }

    pub fn recycle_timeout_duration(&self) -> Option<Duration> {
        self.recycle_timeout_ms.map(Duration::from_millis)
    }

    /// Assemble `host=... port=... user=... password=... dbname=... sslmode=...`.
    ///
    /// Every field is required.
    pub fn build_dsn(&self) -> PipeResult<String> {
        if self.host.is_empty() {
            return Err(PipeError::config("host is required"));
        }
        if self.port == 0 {
            return Err(PipeError::config("port is required"));
        }
        if self.user.is_empty() {
            return Err(PipeError::config("username is required"));
        }
        if self.password.is_empty() {
            return Err(PipeError::config("password is required"));
        }
        if self.dbname.is_empty() {
            return Err(PipeError::config("database name is required"));
        }
        if self.sslmode.is_empty() {
            return Err(PipeError::config("ssl mode is required"));
        }

        Ok(format!(
            "host={} port={} user={} password={} dbname={} sslmode={}",
            quote_value(&self.host),
            self.port,
            quote_value(&self.user),
            quote_value(&self.password),
            quote_value(&self.dbname),
            quote_value(&self.sslmode),
        ))
    }

    /// The `dsn` if set, otherwise [`PgConfig::build_dsn`].
    pub fn connection_string(&self) -> PipeResult<String> {
        match &self.dsn {
            Some(dsn) if !dsn.is_empty() => Ok(dsn.clone()),
            _ => self.build_dsn(),
        }
    }

    /// Read `DATABASE_URL` and `PGPIPE_*` variables from the environment.
    pub fn from_env() -> PipeResult<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Like [`PgConfig::from_env`] but with a custom variable lookup.
    ///
    /// Recognised names: `DATABASE_URL`, `PGPIPE_HOST`, `PGPIPE_PORT`,
    /// `PGPIPE_USER`, `PGPIPE_PASSWORD`, `PGPIPE_DBNAME`, `PGPIPE_SSLMODE`,
    /// `PGPIPE_MAX_SIZE`, `PGPIPE_WAIT_TIMEOUT_MS`.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> PipeResult<Self> {
        let mut cfg = Self::default();

        if let Some(dsn) = lookup("DATABASE_URL") {
            cfg.dsn = Some(dsn);
        }
        if let Some(host) = lookup("PGPIPE_HOST") {
            cfg.host = host;
        }
        if let Some(port) = lookup("PGPIPE_PORT") {
            cfg.port = parse_var("PGPIPE_PORT", &port)?;
        }
        if let Some(user) = lookup("PGPIPE_USER") {
            cfg.user = user;
        }
        if let Some(password) = lookup("PGPIPE_PASSWORD") {
            cfg.password = password;
        }
        if let Some(dbname) = lookup("PGPIPE_DBNAME") {
            cfg.dbname = dbname;
        }
        if let Some(sslmode) = lookup("PGPIPE_SSLMODE") {
            cfg.sslmode = sslmode;
        }
        if let Some(max_size) = lookup("PGPIPE_MAX_SIZE") {
            cfg.max_size = parse_var("PGPIPE_MAX_SIZE", &max_size)?;
        }
        if let Some(ms) = lookup("PGPIPE_WAIT_TIMEOUT_MS") {
            cfg.wait_timeout_ms = Some(parse_var("PGPIPE_WAIT_TIMEOUT_MS", &ms)?);
        }

        Ok(cfg)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> PipeResult<T>
where
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| PipeError::config(format!("invalid {name} '{raw}': {e}")))
}

// Key/value connection strings need quoting around spaces, quotes and backslashes.
fn quote_value(v: &str) -> String {
    if !v.is_empty() && !v.chars().any(|c| c.is_whitespace() || c == '\'' || c == '\\') {
        return v.to_string();
    }
    let mut out = String::with_capacity(v.len() + 2);
    out.push('\'');
    for c in v.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}
