use bon::Builder;
use secrecy::SecretString;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

pub const DEFAULT_ZEPHYR_BASE_URL: &str = "https://prod-api.zephyr4jiracloud.com";
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// What happens to the rest of a batch when one test case fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// The first external failure aborts the whole batch.
    #[default]
    FailFast,
    /// Failures are recorded per test case and the batch carries on.
    Isolate,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail-fast" | "fail_fast" | "failfast" => Ok(FailurePolicy::FailFast),
            "isolate" => Ok(FailurePolicy::Isolate),
            other => Err(format!("expected `fail-fast` or `isolate`, got `{}`", other)),
        }
    }
}

#[derive(Builder)]
pub struct JiraConfig {
    #[builder(into)]
    pub base_url: String,
    #[builder(into)]
    pub email: String,
    pub api_token: SecretString,
    #[builder(into, default = "Test".to_string())]
    pub issue_type: String,
    #[builder(into, default = "Relates".to_string())]
    pub link_type: String,
    #[builder(default = false)]
    pub send_priority: bool,
}

#[derive(Builder)]
pub struct ZephyrConfig {
    #[builder(into, default = DEFAULT_ZEPHYR_BASE_URL.to_string())]
    pub base_url: String,
    #[builder(into)]
    pub access_key: String,
    pub secret_key: SecretString,
}

#[derive(Builder)]
pub struct Config {
    pub jira: JiraConfig,
    pub zephyr: ZephyrConfig,
    #[builder(default)]
    pub failure_policy: FailurePolicy,
    #[builder(into, default = DEFAULT_BIND_ADDRESS.to_string())]
    pub bind_address: String,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads every setting through `lookup`, so tests can feed a map instead
    /// of mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &'static str| -> Option<String> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &'static str| read(name).ok_or(ConfigError::Missing(name));

        let jira_base_url = validate_url("JIRA_BASE_URL", &required("JIRA_BASE_URL")?)?;
        let zephyr_base_url = validate_url(
            "ZEPHYR_BASE_URL",
            &read("ZEPHYR_BASE_URL").unwrap_or_else(|| DEFAULT_ZEPHYR_BASE_URL.to_string()),
        )?;

        let failure_policy = match read("FAILURE_POLICY") {
            None => FailurePolicy::default(),
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                name: "FAILURE_POLICY",
                reason,
            })?,
        };

        let send_priority = match read("JIRA_SEND_PRIORITY") {
            None => false,
            Some(raw) => raw.parse::<bool>().map_err(|e| ConfigError::Invalid {
                name: "JIRA_SEND_PRIORITY",
                reason: e.to_string(),
            })?,
        };

        Ok(Config {
            jira: JiraConfig {
                base_url: jira_base_url,
                email: required("JIRA_EMAIL")?,
                api_token: SecretString::from(required("JIRA_API_TOKEN")?),
                issue_type: read("TEST_ISSUE_TYPE").unwrap_or_else(|| "Test".to_string()),
                link_type: read("TEST_LINK_TYPE").unwrap_or_else(|| "Relates".to_string()),
                send_priority,
            },
            zephyr: ZephyrConfig {
                base_url: zephyr_base_url,
                access_key: required("ZEPHYR_ACCESS_KEY")?,
                secret_key: SecretString::from(required("ZEPHYR_SECRET_KEY")?),
            },
            failure_policy,
            bind_address: read("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
        })
    }
}

fn validate_url(name: &'static str, raw: &str) -> Result<String, ConfigError> {
    let parsed = Url::parse(raw).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;
    if parsed.host_str().is_none() {
        return Err(ConfigError::Invalid {
            name,
            reason: "url has no host".to_string(),
        });
    }
    Ok(raw.trim_end_matches('/').to_string())
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("jira_base_url", &self.jira.base_url)
            .field("jira_email", &self.jira.email)
            .field("jira_api_token", &"[REDACTED]")
            .field("zephyr_base_url", &self.zephyr.base_url)
            .field("zephyr_access_key", &self.zephyr.access_key)
            .field("zephyr_secret_key", &"[REDACTED]")
            .field("failure_policy", &self.failure_policy)
            .field("bind_address", &self.bind_address)
            .finish()
    }
}
