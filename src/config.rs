//! Harness configuration
//!
//! Defaults suit a local developer machine; every field can be overridden
//! from the environment (see [`HarnessConfig::from_env`]) or with the
//! `with_*` builders.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default regular listener port of host 0
pub const DEFAULT_LISTENER_BASE_PORT: u16 = 21212;

/// Default admin listener port of host 0
pub const DEFAULT_ADMIN_BASE_PORT: u16 = 21312;

/// Default internal (host-to-host) port of host 0
pub const DEFAULT_INTERNAL_BASE_PORT: u16 = 21412;

/// Generous so slow CI machines do not produce false failures
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Generous so slow CI machines do not produce false failures
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(300);

/// How long a launched topology has to accept connections
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Login credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            password: String::new(),
        }
    }
}

/// How the password is presented to the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthScheme {
    /// Challenge/response with a hashed password
    #[default]
    NativePassword,
    /// Plain password (only sensible over TLS)
    ClearPassword,
}

impl FromStr for AuthScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" | "native_password" | "mysql_native_password" => Ok(AuthScheme::NativePassword),
            "clear" | "clear_password" | "mysql_clear_password" => Ok(AuthScheme::ClearPassword),
            other => Err(format!("unknown auth scheme: {}", other)),
        }
    }
}

/// Per-client settings: credentials, auth scheme and the two timeouts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub credentials: Credentials,
    pub auth: AuthScheme,
    /// Bound on establishing one connection
    pub connect_timeout: Duration,
    /// Bound on one procedure call
    pub call_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            auth: AuthScheme::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl ClientOptions {
    pub fn with_credentials(mut self, user: &str, password: &str) -> Self {
        self.credentials = Credentials {
            user: user.to_string(),
            password: password.to_string(),
        };
        self
    }

    pub fn with_auth(mut self, auth: AuthScheme) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

/// How to launch one native server host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    /// Server binary
    pub program: PathBuf,
    /// Argument template; see [`crate::topology::HostProcess`] for placeholders
    pub args: Vec<String>,
}

impl ServerCommand {
    pub fn new(program: impl Into<PathBuf>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// The data directory initializer run before a fresh launch
    pub fn default_init() -> Self {
        Self::new("roodb_init", &["--data-dir", "{data_dir}"])
    }
}

impl Default for ServerCommand {
    fn default() -> Self {
        Self::new("roodb", &["--port", "{port}", "--data-dir", "{data_dir}"])
    }
}

/// Harness-wide configuration
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub server: ServerCommand,
    /// Run once per host against a freshly wiped data directory
    pub init: Option<ServerCommand>,
    /// Interface every host listens on
    pub host: String,
    pub listener_base_port: u16,
    pub admin_base_port: u16,
    pub internal_base_port: u16,
    /// Connect to native hosts with TLS (certificates are not verified)
    pub tls: bool,
    pub client: ClientOptions,
    pub startup_timeout: Duration,
    /// Seed for random address selection; random when unset
    pub seed: Option<u64>,
    /// Whether the engine under test is a debug build
    pub debug_build: bool,
    /// Default database selected by MySQL-protocol clients
    pub database: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            server: ServerCommand::default(),
            init: Some(ServerCommand::default_init()),
            host: "127.0.0.1".to_string(),
            listener_base_port: DEFAULT_LISTENER_BASE_PORT,
            admin_base_port: DEFAULT_ADMIN_BASE_PORT,
            internal_base_port: DEFAULT_INTERNAL_BASE_PORT,
            tls: true,
            client: ClientOptions::default(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            seed: None,
            debug_build: cfg!(debug_assertions),
            database: None,
        }
    }
}

impl HarnessConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `REGRESS_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(bin) = env::var("REGRESS_SERVER_BIN") {
            config.server.program = PathBuf::from(bin);
        }
        if let Ok(args) = env::var("REGRESS_SERVER_ARGS") {
            config.server.args = args.split_whitespace().map(str::to_string).collect();
        }
        if let Ok(bin) = env::var("REGRESS_INIT_BIN") {
            config.init = if bin.is_empty() {
                None
            } else {
                let args = env::var("REGRESS_INIT_ARGS")
                    .map(|a| a.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_else(|_| ServerCommand::default_init().args);
                Some(ServerCommand {
                    program: PathBuf::from(bin),
                    args,
                })
            };
        }
        if let Ok(host) = env::var("REGRESS_HOST") {
            config.host = host;
        }
        config.listener_base_port =
            env_parse("REGRESS_LISTENER_BASE_PORT", config.listener_base_port);
        config.admin_base_port = env_parse("REGRESS_ADMIN_BASE_PORT", config.admin_base_port);
        config.internal_base_port =
            env_parse("REGRESS_INTERNAL_BASE_PORT", config.internal_base_port);
        config.tls = env_parse("REGRESS_TLS", config.tls);

        if let Ok(user) = env::var("REGRESS_USER") {
            config.client.credentials.user = user;
        }
        if let Ok(password) = env::var("REGRESS_PASSWORD") {
            config.client.credentials.password = password;
        }
        config.client.auth = env_parse("REGRESS_AUTH", config.client.auth);
        config.client.connect_timeout = Duration::from_secs(env_parse(
            "REGRESS_CONNECT_TIMEOUT_SECS",
            config.client.connect_timeout.as_secs(),
        ));
        config.client.call_timeout = Duration::from_secs(env_parse(
            "REGRESS_CALL_TIMEOUT_SECS",
            config.client.call_timeout.as_secs(),
        ));
        config.startup_timeout = Duration::from_secs(env_parse(
            "REGRESS_STARTUP_TIMEOUT_SECS",
            config.startup_timeout.as_secs(),
        ));
        config.seed = env::var("REGRESS_SEED").ok().and_then(|s| s.parse().ok());
        config.debug_build = env_parse("REGRESS_DEBUG_BUILD", config.debug_build);
        config.database = env::var("REGRESS_DATABASE").ok().filter(|db| !db.is_empty());

        config
    }

    pub fn with_server(mut self, server: ServerCommand) -> Self {
        self.server = server;
        self
    }

    pub fn with_init(mut self, init: Option<ServerCommand>) -> Self {
        self.init = init;
        self
    }

    pub fn with_base_ports(mut self, listener: u16, admin: u16, internal: u16) -> Self {
        self.listener_base_port = listener;
        self.admin_base_port = admin;
        self.internal_base_port = internal;
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_client(mut self, client: ClientOptions) -> Self {
        self.client = client;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring unparseable setting");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::new();
        assert_eq!(config.listener_base_port, 21212);
        assert_eq!(config.client.credentials.user, "root");
        assert_eq!(config.client.connect_timeout, Duration::from_secs(60));
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_builders() {
        let config = HarnessConfig::new()
            .with_base_ports(1, 2, 3)
            .with_seed(7)
            .with_client(ClientOptions::default().with_auth(AuthScheme::ClearPassword));
        assert_eq!(
            (config.listener_base_port, config.admin_base_port, config.internal_base_port),
            (1, 2, 3)
        );
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.client.auth, AuthScheme::ClearPassword);
    }

    #[test]
    fn test_env_parse_falls_back() {
        std::env::set_var("REGRESS_TEST_ENV_PARSE", "not-a-number");
        assert_eq!(env_parse("REGRESS_TEST_ENV_PARSE", 5u16), 5);
        std::env::set_var("REGRESS_TEST_ENV_PARSE", "9");
        assert_eq!(env_parse("REGRESS_TEST_ENV_PARSE", 5u16), 9);
        std::env::remove_var("REGRESS_TEST_ENV_PARSE");
    }

    #[test]
    fn test_auth_scheme_from_str() {
        assert_eq!("native".parse::<AuthScheme>(), Ok(AuthScheme::NativePassword));
        assert_eq!(
            "mysql_clear_password".parse::<AuthScheme>(),
            Ok(AuthScheme::ClearPassword)
        );
        assert!("kerberos".parse::<AuthScheme>().is_err());
    }
}
