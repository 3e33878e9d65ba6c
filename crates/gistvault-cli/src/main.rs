//! `gistvault` CLI — encrypted secrets, passwords, and notes in a private
//! GitHub gist.
//!
//! The gist only ever holds ciphertext and keyed-hash names; the base-58
//! vault key never leaves this machine.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod config;
mod session;

use std::io::BufRead as _;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use gistvault_core::{SecretMatch, Vault, VaultKey};
use gistvault_storage::{GistBackend, ObservedBackend, TracingObserver};
use tracing::info;

use crate::config::GlobalArgs;
use crate::session::{Credentials, Session};

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ── CLI structure ────────────────────────────────────────────────────

/// gistvault — secrets in a gist, readable only with your key.
#[derive(Parser)]
#[command(
    name = "gistvault",
    version,
    about = "gistvault CLI — encrypted secrets, passwords, and notes in a private GitHub gist",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         GISTVAULT_USERNAME   GitHub username\n  \
         GISTVAULT_PASSWORD   GitHub password or token\n  \
         GISTVAULT_KEY        Base-58 vault key\n\n\
         {DIM}Examples:{RESET}\n  \
         gistvault key new\n  \
         gistvault secret set aws prod --value 'AKIA...'\n  \
         gistvault password get https://example.com alice\n  \
         gistvault note get wifi --json"
    ),
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Vault key operations.
    Key {
        #[command(subcommand)]
        action: KeyCommands,
    },
    /// Locate or create the vault gist for this key, generating a key if none is given.
    Init,
    /// Secrets addressed by free-form tags.
    Secret {
        #[command(subcommand)]
        action: SecretCommands,
    },
    /// Site passwords addressed by URL and account name.
    Password {
        #[command(subcommand)]
        action: PasswordCommands,
    },
    /// Secure notes, kept apart from other secrets.
    Note {
        #[command(subcommand)]
        action: NoteCommands,
    },
    /// Forget cached credentials.
    Logout,
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Generate a new vault key and print it.
    New,
}

#[derive(clap::Args)]
struct ValueArg {
    /// The secret. Read from the first line of stdin when omitted.
    #[arg(long)]
    value: Option<String>,
}

#[derive(clap::Args)]
struct LookupArgs {
    /// Hide results matching fewer tags than this.
    #[arg(long, default_value = "0")]
    min_matches: usize,
    /// Print results as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum SecretCommands {
    /// Store a secret under tags. The first tag selects the shard.
    Set {
        tags: Vec<String>,
        #[command(flatten)]
        value: ValueArg,
    },
    /// Look up secrets sharing the first tag, best match first.
    Get {
        tags: Vec<String>,
        #[command(flatten)]
        lookup: LookupArgs,
    },
}

#[derive(Subcommand)]
enum PasswordCommands {
    /// Store a password for an account on a site.
    Set {
        url: String,
        account: String,
        #[command(flatten)]
        value: ValueArg,
    },
    /// Look up passwords for a site, the given account first.
    Get {
        url: String,
        #[arg(default_value = "")]
        account: String,
        #[command(flatten)]
        lookup: LookupArgs,
    },
}

#[derive(Subcommand)]
enum NoteCommands {
    /// Store a note under one or more tags.
    Set {
        #[arg(required = true)]
        tags: Vec<String>,
        #[command(flatten)]
        value: ValueArg,
    },
    /// Look up notes by tags.
    Get {
        #[arg(required = true)]
        tags: Vec<String>,
        #[command(flatten)]
        lookup: LookupArgs,
    },
}

// ── Pretty output helpers ────────────────────────────────────────────

fn header(title: &str) {
    println!("{BOLD}{CYAN}{title}{RESET}");
    println!("{DIM}─────────────────────────────────────────{RESET}");
}

fn kv_line(key: &str, value: &str) {
    println!("  {DIM}{key:<12}{RESET} {WHITE}{value}{RESET}");
}

fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

fn warning(msg: &str) {
    eprintln!("{YELLOW}{BOLD}⚠{RESET} {YELLOW}{msg}{RESET}");
}

fn print_matches(results: &[SecretMatch]) {
    header(&format!("{} match(es)", results.len()));
    for (i, found) in results.iter().enumerate() {
        println!(
            "  {BOLD}{}.{RESET} {DIM}[{} tag(s) matched]{RESET} {}",
            i + 1,
            found.matches,
            found.tags.join(" · ")
        );
        println!("     {WHITE}{}{RESET}", found.secret);
    }
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    config::init_logging(&cli.global.log_level, cli.global.log_json);

    match run(&cli.global, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("  {RED}{BOLD}✗ Error:{RESET} {e:#}");
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

async fn run(global: &GlobalArgs, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Key {
            action: KeyCommands::New,
        } => {
            println!("{}", VaultKey::generate().to_base58());
            Ok(())
        }
        Commands::Init => cmd_init(global).await,
        Commands::Secret { action } => cmd_secret(global, action).await,
        Commands::Password { action } => cmd_password(global, action).await,
        Commands::Note { action } => cmd_note(global, action).await,
        Commands::Logout => cmd_logout(global),
    }
}

// ── Vault access ─────────────────────────────────────────────────────

/// What to do when no vault key is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MissingKey {
    /// Start a new vault under a fresh key.
    Generate,
    Reject,
}

/// The vault key from `--key`. A supplied key that does not decode is an
/// error, never silently replaced; a missing one is generated only when
/// `missing` allows it.
fn resolve_key(global: &GlobalArgs, missing: MissingKey) -> Result<(VaultKey, bool)> {
    match global.key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(token) => {
            let key = VaultKey::from_base58(token).context("--key is not a valid vault key")?;
            Ok((key, false))
        }
        None if missing == MissingKey::Generate => Ok(VaultKey::from_token_or_generate(None)),
        None => bail!(
            "no vault key: pass --key or set GISTVAULT_KEY \
             (create one with `gistvault init` or `gistvault key new`)"
        ),
    }
}

/// Explicit credentials win; otherwise fall back to the session cache.
fn resolve_credentials(
    global: &GlobalArgs,
    session: &Session,
    key: &VaultKey,
) -> Result<(Credentials, bool)> {
    if let (Some(username), Some(password)) = (&global.username, &global.password) {
        let credentials = Credentials {
            username: username.clone(),
            password: password.clone(),
        };
        return Ok((credentials, false));
    }

    match session.load(key)? {
        Some(cached) => Ok((cached, true)),
        None => bail!(
            "no credentials: pass --username and --password \
             (or set GISTVAULT_USERNAME and GISTVAULT_PASSWORD)"
        ),
    }
}

/// Open the vault and make sure its gist exists.
async fn open_vault(global: &GlobalArgs, missing: MissingKey) -> Result<Vault> {
    let (key, generated) = resolve_key(global, missing)?;
    if generated {
        warning(&format!(
            "no vault key given; generated {}. Keep it: it is the only way back into this vault.",
            key.to_base58()
        ));
    }

    let session = Session::new(global.session_path());
    let (credentials, from_session) = resolve_credentials(global, &session, &key)?;

    let backend = GistBackend::new(global.gist_config(&credentials.username, &credentials.password))
        .context("failed to create GitHub client")?;
    let backend = ObservedBackend::new(backend, Arc::new(TracingObserver));
    let vault = Vault::new(
        Arc::new(backend),
        credentials.username.clone(),
        key,
        global.vault_options(),
    );

    if let Err(e) = vault.ready().await {
        if e.is_credentials_rejected() && from_session {
            session.clear()?;
            bail!("stored credentials were rejected and have been cleared; log in again with --username and --password");
        }
        return Err(e).context("failed to open vault");
    }

    session.save(vault.key(), &credentials)?;
    info!(session = %session.path().display(), "credentials cached");
    Ok(vault)
}

/// The secret from `--value`, else the first line of stdin.
fn read_value(arg: ValueArg) -> Result<String> {
    let value = match arg.value {
        Some(value) => value,
        None => {
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("failed to read secret from stdin")?;
            line.trim_end_matches(['\r', '\n']).to_owned()
        }
    };

    if value.is_empty() {
        bail!("refusing to store an empty secret");
    }
    Ok(value)
}

fn show(results: Option<Vec<SecretMatch>>, lookup: &LookupArgs) -> Result<()> {
    let results: Vec<_> = results
        .unwrap_or_default()
        .into_iter()
        .filter(|found| found.matches >= lookup.min_matches)
        .collect();

    if results.is_empty() {
        bail!("no matching secrets found");
    }

    if lookup.json {
        let json = serde_json::to_string_pretty(&results).context("failed to format JSON")?;
        println!("{json}");
    } else {
        print_matches(&results);
    }
    Ok(())
}

// ── Commands ─────────────────────────────────────────────────────────

async fn cmd_init(global: &GlobalArgs) -> Result<()> {
    let vault = open_vault(global, MissingKey::Generate).await?;
    let collection_id = vault.collection_id().await?;

    println!();
    success("Vault ready");
    kv_line("gist", collection_id);
    kv_line("key", &vault.key().to_base58());
    println!();
    Ok(())
}

async fn cmd_secret(global: &GlobalArgs, action: SecretCommands) -> Result<()> {
    match action {
        SecretCommands::Set { tags, value } => {
            let value = read_value(value)?;
            let vault = open_vault(global, MissingKey::Reject).await?;
            vault.set_secret(&value, &tags).await?;
            success("Secret stored");
            Ok(())
        }
        SecretCommands::Get { tags, lookup } => {
            let vault = open_vault(global, MissingKey::Reject).await?;
            show(vault.get_secrets(&tags).await?, &lookup)
        }
    }
}

async fn cmd_password(global: &GlobalArgs, action: PasswordCommands) -> Result<()> {
    match action {
        PasswordCommands::Set {
            url,
            account,
            value,
        } => {
            if account.is_empty() {
                bail!("an account name is required to store a password");
            }
            let value = read_value(value)?;
            let vault = open_vault(global, MissingKey::Reject).await?;
            vault.set_password(&url, &account, &value).await?;
            success(&format!("Password stored for {account} at {url}"));
            Ok(())
        }
        PasswordCommands::Get {
            url,
            account,
            lookup,
        } => {
            let vault = open_vault(global, MissingKey::Reject).await?;
            show(vault.get_passwords(&url, &account).await?, &lookup)
        }
    }
}

async fn cmd_note(global: &GlobalArgs, action: NoteCommands) -> Result<()> {
    match action {
        NoteCommands::Set { tags, value } => {
            let value = read_value(value)?;
            let vault = open_vault(global, MissingKey::Reject).await?;
            vault.set_note(&value, &tags).await?;
            success("Note stored");
            Ok(())
        }
        NoteCommands::Get { tags, lookup } => {
            let vault = open_vault(global, MissingKey::Reject).await?;
            show(vault.get_notes(&tags).await?, &lookup)
        }
    }
}

fn cmd_logout(global: &GlobalArgs) -> Result<()> {
    let session = Session::new(global.session_path());
    if session.clear()? {
        success("Cached credentials removed");
    } else {
        println!("{DIM}No cached credentials{RESET}");
    }
    Ok(())
}
