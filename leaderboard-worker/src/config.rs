use std::path::PathBuf;
use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use leaderboard_common::retry::RetryPolicy;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3303")]
    pub port: u16,

    /// GroupMe access token.
    #[envconfig(from = "TOKEN")]
    pub groupme_token: NonEmptyString,

    #[envconfig(from = "GROUPME_ID")]
    pub group_id: NonEmptyString,

    #[envconfig(from = "GROUPME_API_URL", default = "https://api.groupme.com/v3")]
    pub groupme_api_url: String,

    #[envconfig(from = "SPREADSHEET_ID")]
    pub spreadsheet_id: NonEmptyString,

    /// Bearer token for the Sheets API, minted outside of this worker.
    #[envconfig(from = "SHEETS_ACCESS_TOKEN")]
    pub sheets_access_token: NonEmptyString,

    #[envconfig(from = "SHEETS_API_URL", default = "https://sheets.googleapis.com/v4")]
    pub sheets_api_url: String,

    #[envconfig(from = "WORKSHEET", default = "Sheet1")]
    pub worksheet: NonEmptyString,

    #[envconfig(from = "CSV_PATH", default = "out.csv")]
    pub csv_path: PathBuf,

    #[envconfig(from = "PAGE_SIZE", default = "100")]
    pub page_size: u32,

    #[envconfig(from = "TOP_MESSAGES", default = "15")]
    pub top_messages: usize,

    #[envconfig(from = "THROTTLE_MS", default = "500")]
    pub throttle: EnvMsDuration,

    #[envconfig(from = "REQUEST_TIMEOUT_MS", default = "30000")]
    pub request_timeout: EnvMsDuration,

    // 45 minutes
    #[envconfig(from = "RUN_INTERVAL_SECS", default = "2700")]
    pub run_interval_secs: u64,

    #[envconfig(from = "RUN_ONCE", default = "false")]
    pub run_once: bool,

    #[envconfig(nested = true)]
    pub retry_policy: RetryPolicyConfig,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::build(
            self.retry_policy.backoff_coefficient,
            self.retry_policy.initial_interval.0,
        )
        .maximum_interval(self.retry_policy.maximum_interval.map(|interval| interval.0))
        .max_retries(self.retry_policy.max_retries)
        .provide()
    }
}

#[derive(Envconfig, Clone)]
pub struct RetryPolicyConfig {
    #[envconfig(from = "MAX_RETRIES", default = "5")]
    pub max_retries: u32,

    #[envconfig(from = "BACKOFF_COEFFICIENT", default = "2")]
    pub backoff_coefficient: u32,

    #[envconfig(from = "INITIAL_INTERVAL_MS", default = "1000")]
    pub initial_interval: EnvMsDuration,

    #[envconfig(from = "MAXIMUM_INTERVAL_MS")]
    pub maximum_interval: Option<EnvMsDuration>,
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(trimmed.to_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn required_env() -> HashMap<String, String> {
        HashMap::from([
            ("TOKEN".to_owned(), "groupme-token".to_owned()),
            ("GROUPME_ID".to_owned(), "12345".to_owned()),
            ("SPREADSHEET_ID".to_owned(), "sheet-abc".to_owned()),
            ("SHEETS_ACCESS_TOKEN".to_owned(), "ya29.token".to_owned()),
        ])
    }

    #[test]
    fn test_defaults() {
        let config = Config::init_from_hashmap(&required_env()).unwrap();

        assert_eq!(config.group_id.as_str(), "12345");
        assert_eq!(config.groupme_api_url, "https://api.groupme.com/v3");
        assert_eq!(config.worksheet.as_str(), "Sheet1");
        assert_eq!(config.csv_path, PathBuf::from("out.csv"));
        assert_eq!(config.top_messages, 15);
        assert_eq!(config.throttle.0, time::Duration::from_millis(500));
        assert_eq!(config.run_interval_secs, 2700);
        assert!(!config.run_once);
        assert_eq!(config.bind(), "0.0.0.0:3303");
    }

    #[test]
    fn test_retry_policy_defaults() {
        let config = Config::init_from_hashmap(&required_env()).unwrap();
        let policy = config.retry_policy();

        assert_eq!(policy.max_retries(), 5);
        assert_eq!(policy.time_until_next_retry(0), time::Duration::from_secs(1));
        assert_eq!(policy.time_until_next_retry(3), time::Duration::from_secs(8));
    }

    #[test]
    fn test_maximum_interval_is_applied() {
        let mut env = required_env();
        env.insert("MAXIMUM_INTERVAL_MS".to_owned(), "3000".to_owned());
        env.insert("MAX_RETRIES".to_owned(), "2".to_owned());

        let policy = Config::init_from_hashmap(&env).unwrap().retry_policy();

        assert_eq!(policy.max_retries(), 2);
        assert_eq!(policy.time_until_next_retry(4), time::Duration::from_secs(3));
    }

    #[test]
    fn test_missing_required_value_is_an_error() {
        for name in ["TOKEN", "GROUPME_ID", "SPREADSHEET_ID", "SHEETS_ACCESS_TOKEN"] {
            let mut env = required_env();
            env.remove(name);

            assert!(
                Config::init_from_hashmap(&env).is_err(),
                "{name} should be required"
            );
        }
    }

    #[test]
    fn test_blank_required_value_is_an_error() {
        let mut env = required_env();
        env.insert("TOKEN".to_owned(), "   ".to_owned());

        assert!(Config::init_from_hashmap(&env).is_err());
    }

    #[test]
    fn test_invalid_duration_is_an_error() {
        let mut env = required_env();
        env.insert("THROTTLE_MS".to_owned(), "half a second".to_owned());

        assert!(Config::init_from_hashmap(&env).is_err());
    }
}
