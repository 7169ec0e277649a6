use std::time::Duration;

/// Environment variable seeding the default auth token.
pub const AUTH_TOKEN_ENV: &str = "SFX_API_TOKEN";

/// Default ingest endpoint.
pub const DEFAULT_URL: &str = "https://ingest.signalfx.com/v2/datapoint";

const DEFAULT_MAX_IDLE_CONNECTIONS: u32 = 2;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for submitting datapoints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    max_idle_connections: u32,
    timeout: Duration,
    url: String,
    auth_token: String,
    user_agent: String,
    tls_insecure_skip_verify: bool,
}

impl Config {
    /// Creates a `Config` with default settings, taking the auth token from `SFX_API_TOKEN` if it is set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the upper bound on idle persistent connections kept to the ingest endpoint.
    ///
    /// Defaults to 2.
    #[must_use]
    pub fn with_max_idle_connections(mut self, max_idle_connections: u32) -> Self {
        self.max_idle_connections = max_idle_connections;
        self
    }

    /// Sets the timeout applied both to connecting and to waiting for response headers.
    ///
    /// Defaults to 60 seconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the URL datapoints are posted to.
    ///
    /// Defaults to `https://ingest.signalfx.com/v2/datapoint`.
    #[must_use]
    pub fn with_url<U: Into<String>>(mut self, url: U) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the auth token sent in the `X-SF-TOKEN` header.
    ///
    /// Defaults to the value of `SFX_API_TOKEN`, or an empty token if it is unset.
    #[must_use]
    pub fn with_auth_token<T: Into<String>>(mut self, auth_token: T) -> Self {
        self.auth_token = auth_token.into();
        self
    }

    /// Sets the `User-Agent` header.
    ///
    /// Defaults to `sfxclient/<version>`.
    #[must_use]
    pub fn with_user_agent<A: Into<String>>(mut self, user_agent: A) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets whether to skip verification of the endpoint's TLS certificate.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_tls_insecure_skip_verify(mut self, skip: bool) -> Self {
        self.tls_insecure_skip_verify = skip;
        self
    }

    /// Returns the maximum number of idle persistent connections.
    pub const fn max_idle_connections(&self) -> u32 {
        self.max_idle_connections
    }

    /// Returns the connect and response-header timeout.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the ingest URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the auth token.
    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    /// Returns the user agent.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Returns `true` if TLS certificate verification is disabled.
    pub const fn tls_insecure_skip_verify(&self) -> bool {
        self.tls_insecure_skip_verify
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_idle_connections: DEFAULT_MAX_IDLE_CONNECTIONS,
            timeout: DEFAULT_TIMEOUT,
            url: DEFAULT_URL.to_string(),
            auth_token: std::env::var(AUTH_TOKEN_ENV).unwrap_or_default(),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            tls_insecure_skip_verify: false,
        }
    }
}
