//! Command-line arguments.
//!
//! Every flag falls back to a `WAKEUP_<NAME>` environment variable.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use wakeup_core::{ConnectionParameters, RetryPolicy};

const ABOUT: &str = "Connect to awaken a paused Azure SQL database.";

const LONG_ABOUT: &str = "Connect to awaken a paused Azure SQL database.

Provide connection details as flags or environment variables. Every option \
has a corresponding environment variable named WAKEUP_<OPTION>:

    --server=myserver  ->  WAKEUP_SERVER=myserver";

/// Parsed command line.
#[derive(Debug, Parser)]
#[command(name = "azure-wakeup-db", version, about = ABOUT, long_about = LONG_ABOUT)]
pub struct Cli {
    /// Database server
    #[arg(long, env = "WAKEUP_SERVER", default_value = "")]
    pub server: String,

    /// Database port
    #[arg(long, env = "WAKEUP_PORT", default_value_t = wakeup_core::params::DEFAULT_PORT)]
    pub port: u16,

    /// SQL Server instance name
    #[arg(long, env = "WAKEUP_INSTANCE")]
    pub instance: Option<String>,

    /// Database name
    #[arg(long, env = "WAKEUP_DATABASE")]
    pub database: Option<String>,

    /// Database user
    #[arg(long, env = "WAKEUP_USER", default_value = "")]
    pub user: String,

    /// Database password
    #[arg(long, env = "WAKEUP_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Database connection string; overrides every other connection flag
    #[arg(long, env = "WAKEUP_DSN", hide_env_values = true)]
    pub dsn: Option<String>,

    /// Give up after this many seconds
    #[arg(long, env = "WAKEUP_TIMEOUT", default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Maximum number of connection attempts
    #[arg(long, env = "WAKEUP_MAX_ATTEMPTS", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: Option<u32>,

    /// Seconds to wait before the first retry
    #[arg(long, env = "WAKEUP_DELAY")]
    pub delay: Option<u64>,

    /// How the delay grows between retries
    #[arg(long, env = "WAKEUP_BACKOFF", value_enum, default_value_t = BackoffKind::Fixed)]
    pub backoff: BackoffKind,

    /// Echo the (redacted) connection string and log debug details
    #[arg(short, long, env = "WAKEUP_VERBOSE")]
    pub verbose: bool,
}

/// Backoff flavour selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackoffKind {
    /// Same delay before every retry (15 attempts, 20 s apart)
    Fixed,
    /// Doubling delay (6 attempts, starting at 5 s)
    Exponential,
}

impl Cli {
    /// Connection parameters for the core.
    #[must_use]
    pub fn connection_parameters(&self) -> ConnectionParameters {
        let mut params = ConnectionParameters::new()
            .server(&self.server)
            .port(self.port)
            .credentials(&self.user, &self.password);
        if let Some(instance) = &self.instance {
            params = params.instance_name(instance);
        }
        if let Some(database) = &self.database {
            params = params.database(database);
        }
        if let Some(dsn) = &self.dsn {
            params = params.raw_dsn(dsn);
        }
        params
    }

    /// Retry policy for the core.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        let mut policy = match self.backoff {
            BackoffKind::Fixed => RetryPolicy::default(),
            BackoffKind::Exponential => RetryPolicy::exponential(),
        };
        policy = policy.overall_deadline(Duration::from_secs(self.timeout));
        if let Some(attempts) = self.max_attempts {
            policy = policy.max_attempts(attempts);
        }
        if let Some(delay) = self.delay {
            policy = policy.base_delay(Duration::from_secs(delay));
        }
        policy
    }
}
