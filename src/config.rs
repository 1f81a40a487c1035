use secrecy::SecretString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

static CONFIG_FILE_NAME: &str = "notifeed.toml";
const CONFIG_PATH_VAR: &str = "NOTIFEED_CONFIG";

/// Referral id appended to every published item link.
pub const DEFAULT_REFERRAL_ID: &str = "7576d561-2573-4396-89d0-974bdb625f46";

#[derive(PartialEq, Debug, Clone, serde::Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Directory holding every JSON/text document the jobs share.
    pub data_dir: PathBuf,
    pub provider: ProviderConfig,
    pub posting: PostingConfig,
    pub engagement: EngagementConfig,
}

#[derive(PartialEq, Debug, Clone, serde::Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ProviderConfig {
    /// Scheme and host of the notification provider, e.g. `https://delice.love`.
    pub origin: String,
    /// Path and query of the notification page, relative to `origin`.
    pub notification_path: String,
    pub referral_id: String,
    /// Maximum number of items kept in `items.json`.
    pub retention_cap: usize,
    /// Saves the fetched page as `debug_collect.html` on every run.
    pub debug_artifacts: bool,
    /// Local storage-state document used when `AUTH_JSON_BASE64` is unset.
    pub auth_file: PathBuf,
}

#[derive(PartialEq, Debug, Clone, serde::Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct PostingConfig {
    pub policy: PostingPolicy,
    /// Pause between two publishes when draining the backlog.
    pub drain_delay_secs: u64,
    pub twitter_api_url: String,
    pub threads_api_url: String,
    pub threads_refresh_url: String,
}

#[derive(PartialEq, Debug, Clone, serde::Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct EngagementConfig {
    pub keywords: Vec<String>,
    pub min_followers: u64,
    pub exclude_words: Vec<String>,
    pub exclude_accounts: Vec<String>,
    pub targets_per_run: usize,
    pub recency_hours: i64,
    pub min_score: i64,
    pub rapidapi_host: String,
    pub gemini_model: String,
    pub gemini_api_url: String,
    pub account_concept: String,
}

/// How many pending items a poster publishes per invocation.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PostingPolicy {
    /// One item per run.
    #[default]
    #[serde(alias = "drip")]
    #[value(alias = "drip")]
    DripFeed,
    /// Every pending item, with `drain-delay-secs` between publishes.
    #[serde(alias = "drain")]
    #[value(alias = "drain")]
    DrainAll,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("data"),
            provider: ProviderConfig::default(),
            posting: PostingConfig::default(),
            engagement: EngagementConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            origin: "https://delice.love".to_string(),
            notification_path: "/mypage/notification?openedNotificationIds=%2C1".to_string(),
            referral_id: DEFAULT_REFERRAL_ID.to_string(),
            retention_cap: 500,
            debug_artifacts: false,
            auth_file: PathBuf::from("auth.json"),
        }
    }
}

impl Default for PostingConfig {
    fn default() -> Self {
        PostingConfig {
            policy: PostingPolicy::DripFeed,
            drain_delay_secs: 10,
            twitter_api_url: "https://api.twitter.com".to_string(),
            threads_api_url: "https://graph.threads.net/v1.0".to_string(),
            threads_refresh_url: "https://graph.threads.net/refresh_access_token".to_string(),
        }
    }
}

impl Default for EngagementConfig {
    fn default() -> Self {
        let owned = |words: &[&str]| words.iter().map(|w| w.to_string()).collect::<Vec<_>>();
        EngagementConfig {
            keywords: owned(&[
                "モテない男 共通点",
                "マッチングアプリ プロフィール",
                "モテる男 マインド",
                "女性心理 恋愛",
                "マッチングアプリ メッセージ",
                "モテテク",
                "デート 誘い方",
                "恋愛 初心者",
                "彼女欲しい",
                "非モテ 脱出",
                "男磨き",
                "婚活 アプリ",
                "片思い 男",
                "彼女 作り方",
                "恋愛コンサル",
                "復縁 男",
                "既読スルー 対策",
            ]),
            min_followers: 1000,
            exclude_words: owned(&[
                "彼氏", "推し", "イケメン", "旦那", "夫", "ママ", "宣伝", "PR", "ご来店", "予約",
                "営業中", "#ad", "grok", "ChatGPT",
            ]),
            exclude_accounts: owned(&["grok", "chatgpt", "openai", "claude", "gemini"]),
            targets_per_run: 3,
            recency_hours: 24,
            min_score: 60,
            rapidapi_host: "twitter-api45.p.rapidapi.com".to_string(),
            gemini_model: "gemini-2.5-flash".to_string(),
            gemini_api_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            account_concept: "An affiliate account for a dating service, written for men in \
                              their 20s to 40s who want to meet someone. Tone: empathetic peer, \
                              never an advertisement."
                .to_string(),
        }
    }
}

impl Config {
    /// Loads `notifeed.toml` (or the file named by `NOTIFEED_CONFIG`).
    ///
    /// The default file is optional; a path given explicitly through the
    /// environment must exist.
    pub fn load() -> Result<Config, ConfigurationError> {
        match std::env::var_os(CONFIG_PATH_VAR) {
            Some(path) => Config::from_file(Path::new(&path)),
            None => {
                let path = Path::new(CONFIG_FILE_NAME);
                if path.exists() {
                    Config::from_file(path)
                } else {
                    tracing::debug!("no {CONFIG_FILE_NAME} found, using defaults");
                    Ok(Config::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Config, ConfigurationError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Unreadable(path.to_path_buf(), Arc::new(e)))?;
        let config = toml::from_str::<Config>(&contents).map_err(ConfigurationError::Toml)?;
        tracing::debug!("configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn items_path(&self) -> PathBuf {
        self.data_dir.join("items.json")
    }

    pub fn queue_path(&self) -> PathBuf {
        self.data_dir.join("tweets.txt")
    }

    pub fn queue_status_path(&self) -> PathBuf {
        self.data_dir.join("tweets_status.json")
    }

    pub fn engagement_status_path(&self) -> PathBuf {
        self.data_dir.join("quote_engagement_status.json")
    }

    pub fn target_accounts_path(&self) -> PathBuf {
        self.data_dir.join("target_accounts.json")
    }

    pub fn debug_html_path(&self) -> PathBuf {
        self.data_dir.join("debug_collect.html")
    }

    pub fn notification_url(&self) -> String {
        format!(
            "{}{}",
            self.provider.origin.trim_end_matches('/'),
            self.provider.notification_path
        )
    }
}

impl PostingConfig {
    pub fn drain_delay(&self) -> Duration {
        Duration::from_secs(self.drain_delay_secs)
    }
}

/// Reads a secret from the environment.
///
/// Empty values and the `your_...` placeholders shipped in `.env.example`
/// count as unset.
pub fn optional_secret(name: &str) -> Option<SecretString> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() && !v.starts_with("your_") => Some(v.into()),
        _ => None,
    }
}

pub fn required_secret(name: &'static str) -> Result<SecretString, ConfigurationError> {
    optional_secret(name).ok_or(ConfigurationError::MissingEnv(name))
}

#[derive(Clone, Debug)]
pub enum ConfigurationError {
    MissingEnv(&'static str),
    MissingSession,
    Unreadable(PathBuf, Arc<std::io::Error>),
    Toml(toml::de::Error),
}

impl std::error::Error for ConfigurationError {}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigurationError::MissingEnv(name) => {
                write!(f, "environment variable `{name}` is not set")
            }
            ConfigurationError::MissingSession => write!(
                f,
                "auth session not found.\n\
                 Set AUTH_JSON_BASE64, place an `auth.json` storage state next to the \
                 binary, or upload one with `upload-session`."
            ),
            ConfigurationError::Unreadable(path, e) => {
                write!(f, "failed to read `{}`: {e}", path.display())
            }
            ConfigurationError::Toml(e) => {
                write!(f, "malformed `{CONFIG_FILE_NAME}`.\n{e}")
            }
        }
    }
}
