//! Runtime configuration for the `gistvault` CLI.
//!
//! Every setting is a global flag with a `GISTVAULT_*` environment fallback
//! (see [`GlobalArgs`]). This module turns the parsed flags into the pieces
//! the commands need: backend config, vault options, session path, and the
//! tracing subscriber.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};
use gistvault_core::partition::TagIdentity;
use gistvault_core::{EntryPolicy, VaultOptions};
use gistvault_storage::{DEFAULT_API_URL, GistConfig};
use tracing_subscriber::EnvFilter;

/// Session cache filename, placed in the system temp directory by default.
pub const DEFAULT_SESSION_FILE: &str = "gistvault-session.json";

/// Flags shared by every command.
#[derive(Args)]
pub struct GlobalArgs {
    /// GitHub username owning the vault gist.
    #[arg(long, global = true, env = "GISTVAULT_USERNAME")]
    pub username: Option<String>,

    /// GitHub password or personal access token (gist scope).
    #[arg(long, global = true, env = "GISTVAULT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Base-58 vault key. Required except by `init`, which generates one when omitted.
    #[arg(long, global = true, env = "GISTVAULT_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// GitHub REST API base URL.
    #[arg(long, global = true, env = "GISTVAULT_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Per-request timeout in seconds.
    #[arg(long, global = true, env = "GISTVAULT_TIMEOUT_SECS", default_value = "30")]
    pub timeout_secs: u64,

    /// Where encrypted credentials are cached between runs.
    #[arg(long, global = true, env = "GISTVAULT_SESSION_FILE")]
    pub session_file: Option<PathBuf>,

    /// Log filter when `RUST_LOG` is unset (e.g. `info`, `gistvault_core=debug`).
    #[arg(long, global = true, env = "GISTVAULT_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "GISTVAULT_LOG_JSON")]
    pub log_json: bool,

    /// How tags identify a record.
    #[arg(long, global = true, env = "GISTVAULT_TAG_IDENTITY", value_enum, default_value_t = IdentityArg::Sequence)]
    pub tag_identity: IdentityArg,

    /// Leave out unreadable entries instead of failing the lookup.
    #[arg(long, global = true, env = "GISTVAULT_SKIP_CORRUPT")]
    pub skip_corrupt: bool,
}

/// Command-line spelling of [`TagIdentity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IdentityArg {
    /// `[a, b]` and `[b, a]` are different records.
    Sequence,
    /// Tag order and repeats are ignored.
    Set,
}

impl From<IdentityArg> for TagIdentity {
    fn from(arg: IdentityArg) -> Self {
        match arg {
            IdentityArg::Sequence => Self::Sequence,
            IdentityArg::Set => Self::Set,
        }
    }
}

impl GlobalArgs {
    /// Vault behavior selected by the flags.
    #[must_use]
    pub fn vault_options(&self) -> VaultOptions {
        VaultOptions {
            tag_identity: self.tag_identity.into(),
            entry_policy: if self.skip_corrupt {
                EntryPolicy::Skip
            } else {
                EntryPolicy::Abort
            },
        }
    }

    /// Session cache path, defaulting to the system temp directory.
    #[must_use]
    pub fn session_path(&self) -> PathBuf {
        self.session_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_SESSION_FILE))
    }

    /// Backend configuration for the given account.
    #[must_use]
    pub fn gist_config(&self, username: &str, password: &str) -> GistConfig {
        GistConfig {
            api_url: self.api_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            ..GistConfig::new(username, password)
        }
    }
}

/// Install the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
