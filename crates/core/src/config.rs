use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Environment lookups for one profile: `{PROFILE}_{KEY}` wins over `{KEY}`.
/// Empty values count as unset.
struct ProfiledEnv<'a> {
    profile: &'a str,
}

impl ProfiledEnv<'_> {
    fn raw(&self, key: &str) -> Option<String> {
        let prefixed = (!self.profile.is_empty()).then(|| format!("{}_{key}", self.profile));
        prefixed
            .into_iter()
            .chain(std::iter::once(key.to_string()))
            .find_map(|name| env::var(name).ok().filter(|v| !v.is_empty()))
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse the value, falling back to `default` when unset or malformed.
    fn parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        self.raw(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub queue: QueueConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TAGBUFFER_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env::var("TAGBUFFER_PROFILE").unwrap_or_default();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let profile = profile.to_uppercase();
        let lookup = ProfiledEnv { profile: &profile };
        Self {
            queue: QueueConfig::from_env(&lookup),
            storage: StorageConfig::from_env(&lookup),
            profile,
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  queue:       workers={}, poll_interval_ms={}, failure_policy={}",
            self.queue.workers,
            self.queue.poll_interval_ms,
            self.queue.failure_policy
        );
        tracing::info!(
            "  storage:     input_dir={}, archive_dir={}",
            self.storage.input_dir.display(),
            self.storage.archive_dir.display()
        );
    }

    /// Return a JSON view of the active config.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "queue": {
                "workers": self.queue.workers,
                "poll_interval_ms": self.queue.poll_interval_ms,
                "failure_policy": self.queue.failure_policy,
            },
            "storage": {
                "input_dir": self.storage.input_dir,
                "archive_dir": self.storage.archive_dir,
            },
        })
    }
}

// ── Queue ─────────────────────────────────────────────────────

/// What the worker does with a file the processor reported as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicyKind {
    /// Delete it from the buffer anyway (at-most-once).
    Remove,
    /// Leave it in the buffer and queue it again.
    Retain,
}

impl FailurePolicyKind {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remove" => Some(Self::Remove),
            "retain" => Some(Self::Retain),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailurePolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicyKind::Remove => write!(f, "remove"),
            FailurePolicyKind::Retain => write!(f, "retain"),
        }
    }
}

impl std::str::FromStr for FailurePolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown failure policy: {s}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of concurrently running workers.
    pub workers: u32,
    /// Sleep between polls when no group is available.
    pub poll_interval_ms: u64,
    pub failure_policy: FailurePolicyKind,
}

impl QueueConfig {
    fn from_env(env: &ProfiledEnv<'_>) -> Self {
        let defaults = Self::default();
        let policy = env.string("TAGBUFFER_FAILURE_POLICY", "remove");
        Self {
            workers: env.parsed("TAGBUFFER_WORKERS", defaults.workers).max(1),
            poll_interval_ms: env.parsed("TAGBUFFER_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            failure_policy: FailurePolicyKind::parse(&policy).unwrap_or_else(|| {
                tracing::warn!(value = %policy, "unknown failure policy, using remove");
                FailurePolicyKind::Remove
            }),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            poll_interval_ms: 1000,
            failure_policy: FailurePolicyKind::Remove,
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory scanned for incoming TAG files.
    pub input_dir: PathBuf,
    /// Directory the archive processor writes processed batches to.
    pub archive_dir: PathBuf,
}

impl StorageConfig {
    fn from_env(env: &ProfiledEnv<'_>) -> Self {
        Self {
            input_dir: env.string("TAGBUFFER_INPUT_DIR", "data/incoming").into(),
            archive_dir: env.string("TAGBUFFER_ARCHIVE_DIR", "data/archive").into(),
        }
    }
}
