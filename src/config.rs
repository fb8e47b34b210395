//! Jirae configuration.
//!
//! Credentials and the editor always come from the environment.
//! The tracker base URL and network timeout resolve through a chain:
//!
//! 1. `--base-url <url>`: explicit per-invocation override (base URL only)
//! 2. `JIRA_URL` / `JIRAE_TIMEOUT_SECS` env vars
//! 3. `~/.jirae/config.toml`: optional defaults, a missing file is fine
//!
//! Everything is read once at startup into [`Settings`] and passed by reference from there.

use std::{
    env, fmt, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

pub const EDITOR: &str = "EDITOR";
pub const USER: &str = "JIRA_USER";
pub const TOKEN: &str = "JIRA_TOKEN";
pub const BASE_URL: &str = "JIRA_URL";
pub const TIMEOUT_SECS: &str = "JIRAE_TIMEOUT_SECS";

/// Errors that stop the run before any network activity.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {reason}")]
    InvalidVar { name: &'static str, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type Result<T> = core::result::Result<T, ConfigError>;

/// Optional defaults loaded from `~/.jirae/config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    /// Tracker base URL used for bare issue keys, e.g. `https://acme.atlassian.net`.
    pub base_url: Option<String>,

    /// Network timeout in seconds. Zero or absent means no timeout.
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Load the config file from its default location.
    ///
    /// Returns the empty default when the home directory or the file is missing.
    pub fn load() -> Result<Self> {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load the config file at `path`, treating a missing file as empty.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The config file path: `~/.jirae/config.toml`.
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".jirae").join("config.toml"))
    }
}

/// HTTP Basic credentials for the tracker.
#[derive(Clone)]
pub struct Credentials {
    user: String,
    token: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: token.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// The user's editor: a program plus any arguments given in `EDITOR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl EditorCommand {
    /// Split an `EDITOR` value such as `code --wait` into program and arguments.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut words = raw.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }
}

/// Process-wide settings, constructed once at startup.
#[derive(Debug)]
pub struct Settings {
    pub editor: EditorCommand,
    pub credentials: Credentials,
    /// Base URL for bare issue keys. Permalinks carry their own.
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
}

impl Settings {
    /// Build settings from the process environment and the optional config file.
    pub fn from_env(base_url: Option<&str>) -> Result<Self> {
        let file = FileConfig::load()?;
        Self::resolve(|name| env::var(name).ok(), base_url, &file)
    }

    /// Build settings from an arbitrary variable lookup.
    ///
    /// Variables are checked in a fixed order (`EDITOR`, `JIRA_USER`, `JIRA_TOKEN`)
    /// so the first missing one is the one reported. Blank values count as missing.
    pub fn resolve(
        lookup: impl Fn(&str) -> Option<String>,
        base_url: Option<&str>,
        file: &FileConfig,
    ) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &'static str| var(name).ok_or(ConfigError::MissingVar(name));

        let editor =
            EditorCommand::parse(&require(EDITOR)?).ok_or(ConfigError::MissingVar(EDITOR))?;
        let user = require(USER)?;
        let token = require(TOKEN)?;

        let base_url = base_url
            .map(str::to_string)
            .or_else(|| var(BASE_URL))
            .or_else(|| file.base_url.clone())
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        let timeout_secs = match var(TIMEOUT_SECS) {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|e| {
                ConfigError::InvalidVar {
                    name: TIMEOUT_SECS,
                    reason: e.to_string(),
                }
            })?),
            None => file.timeout_secs,
        };

        Ok(Self {
            editor,
            credentials: Credentials::new(user, token),
            base_url,
            timeout: timeout_secs.filter(|s| *s > 0).map(Duration::from_secs),
        })
    }
}
