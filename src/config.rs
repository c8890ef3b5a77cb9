use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::constants::{DEFAULT_STAGE_ID, DEFAULT_SUBREDDITS, DEFAULT_SUCCESSOR, DEFAULT_USER_AGENT};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("missing required setting: {0}")]
    Missing(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Archive representations a run may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// Full records as pretty JSON, partitioned by day.
    Json,
    /// Slim records as CSV, partitioned by month.
    Csv,
    /// Slim records as Parquet, partitioned by month.
    Parquet,
}

/// Application configuration.
///
/// Loaded from a TOML file and then overridden by environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Reddit API
    pub reddit_client_id: String,
    pub reddit_client_secret: String,
    pub reddit_user_agent: String,
    pub reddit_api_base: String,
    pub reddit_auth_base: String,

    // S3 Storage
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,

    // Extraction
    pub max_requests_per_minute: u32,
    pub post_limit: usize,
    pub subreddits: Vec<String>,
    pub formats: Vec<ArchiveFormat>,

    // Downstream trigger
    pub trigger_url: Option<String>,
    pub trigger_token: Option<String>,
    pub trigger_successor: String,
    pub stage_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    reddit: RedditSection,
    aws: AwsSection,
    extract: ExtractSection,
    trigger: TriggerSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RedditSection {
    client_id: Option<String>,
    client_secret: Option<String>,
    user_agent: Option<String>,
    api_base: Option<String>,
    auth_base: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AwsSection {
    s3_bucket: Option<String>,
    region_name: Option<String>,
    endpoint: Option<String>,
    aws_access_key_id: Option<String>,
    aws_secret_access_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtractSection {
    max_requests_per_minute: Option<u32>,
    post_limit: Option<usize>,
    subreddits: Option<Vec<String>>,
    formats: Option<Vec<ArchiveFormat>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TriggerSection {
    url: Option<String>,
    token: Option<String>,
    successor: Option<String>,
    stage_id: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    ///
    /// A missing file is not an error; everything may come from the
    /// environment instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if an
    /// environment override is malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = if path.exists() {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            FileConfig::default()
        };

        Self::from_file_config(file)
    }

    /// Parse configuration from TOML text, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Self::from_file_config(file)
    }

    fn from_file_config(file: FileConfig) -> Result<Self, ConfigError> {
        let FileConfig {
            reddit,
            aws,
            extract,
            trigger,
        } = file;

        Ok(Self {
            // Reddit API
            reddit_client_id: env_or("REDDIT_CLIENT_ID", reddit.client_id).unwrap_or_default(),
            reddit_client_secret: env_or("REDDIT_CLIENT_SECRET", reddit.client_secret)
                .unwrap_or_default(),
            reddit_user_agent: env_or("REDDIT_USER_AGENT", reddit.user_agent)
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            reddit_api_base: reddit
                .api_base
                .unwrap_or_else(|| "https://oauth.reddit.com".to_string()),
            reddit_auth_base: reddit
                .auth_base
                .unwrap_or_else(|| "https://www.reddit.com".to_string()),

            // S3 Storage
            s3_bucket: env_or("S3_BUCKET", aws.s3_bucket).unwrap_or_default(),
            s3_region: env_or("S3_REGION", aws.region_name)
                .unwrap_or_else(|| "us-east-1".to_string()),
            s3_endpoint: env_or("S3_ENDPOINT", aws.endpoint),
            aws_access_key_id: env_or("AWS_ACCESS_KEY_ID", aws.aws_access_key_id)
                .unwrap_or_default(),
            aws_secret_access_key: env_or("AWS_SECRET_ACCESS_KEY", aws.aws_secret_access_key)
                .unwrap_or_default(),

            // Extraction
            max_requests_per_minute: parse_env_u32(
                "MAX_REQUESTS_PER_MINUTE",
                extract.max_requests_per_minute.unwrap_or(60),
            )?,
            post_limit: parse_env_usize("POST_LIMIT", extract.post_limit.unwrap_or(10))?,
            subreddits: extract.subreddits.unwrap_or_else(|| {
                DEFAULT_SUBREDDITS.iter().map(ToString::to_string).collect()
            }),
            formats: extract.formats.unwrap_or_else(|| vec![ArchiveFormat::Json]),

            // Downstream trigger
            trigger_url: env_or("TRIGGER_URL", trigger.url),
            trigger_token: env_or("TRIGGER_TOKEN", trigger.token),
            trigger_successor: trigger
                .successor
                .unwrap_or_else(|| DEFAULT_SUCCESSOR.to_string()),
            stage_id: trigger
                .stage_id
                .unwrap_or_else(|| DEFAULT_STAGE_ID.to_string()),
        })
    }

    /// Minimum spacing between upstream calls implied by the rate ceiling.
    #[must_use]
    pub fn request_interval(&self) -> Duration {
        Duration::from_secs(60) / self.max_requests_per_minute.max(1)
    }

    /// Validate that the configuration is usable for a real run.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests_per_minute == 0 {
            return Err(ConfigError::InvalidValue {
                name: "max_requests_per_minute".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.post_limit == 0 {
            return Err(ConfigError::InvalidValue {
                name: "post_limit".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.subreddits.is_empty() || self.subreddits.iter().any(String::is_empty) {
            return Err(ConfigError::InvalidValue {
                name: "subreddits".to_string(),
                message: "must name at least one non-empty subreddit".to_string(),
            });
        }
        if let Some(url) = &self.trigger_url {
            url::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
                name: "trigger.url".to_string(),
                message: e.to_string(),
            })?;
        }
        if self.formats.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "formats".to_string(),
                message: "must include at least one archive format".to_string(),
            });
        }
        Ok(())
    }

    /// Validate the credentials needed to talk to Reddit and S3.
    ///
    /// Dry runs skip this check for S3.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing credential.
    pub fn validate_credentials(&self, need_s3: bool) -> Result<(), ConfigError> {
        let mut required = vec![
            ("reddit.client_id", &self.reddit_client_id),
            ("reddit.client_secret", &self.reddit_client_secret),
        ];
        if need_s3 {
            required.extend([
                ("aws.s3_bucket", &self.s3_bucket),
                ("aws.aws_access_key_id", &self.aws_access_key_id),
                ("aws.aws_secret_access_key", &self.aws_secret_access_key),
            ]);
        }
        match required.into_iter().find(|(_, value)| value.is_empty()) {
            Some((name, _)) => Err(ConfigError::Missing(name.to_string())),
            None => Ok(()),
        }
    }

    /// Configuration suitable for tests: no credentials, no throttling.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            reddit_client_id: "test-client".to_string(),
            reddit_client_secret: "test-secret".to_string(),
            reddit_user_agent: DEFAULT_USER_AGENT.to_string(),
            reddit_api_base: "http://127.0.0.1:9".to_string(),
            reddit_auth_base: "http://127.0.0.1:9".to_string(),
            s3_bucket: "test-bucket".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_endpoint: None,
            aws_access_key_id: "test-access".to_string(),
            aws_secret_access_key: "test-secret".to_string(),
            max_requests_per_minute: 60,
            post_limit: 10,
            subreddits: vec!["ProductReviews".to_string()],
            formats: vec![ArchiveFormat::Json],
            trigger_url: None,
            trigger_token: None,
            trigger_successor: DEFAULT_SUCCESSOR.to_string(),
            stage_id: DEFAULT_STAGE_ID.to_string(),
        }
    }
}

/// Environment variable if set and non-empty, else the file value.
fn env_or(name: &str, file_value: Option<String>) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| file_value.filter(|s| !s.is_empty()))
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}
