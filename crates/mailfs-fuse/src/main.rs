//! mailfs - Mount an IMAP mailbox as a directory of plain-text files.
//!
//! Usage: mailfs <MOUNTPOINT> --host imap.example.com --user me@example.com

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use mailfs_core::{Credentials, ImapConfig, ImapStore, MailStore};
use mailfs_fuse::{FuseBackend, MailFs, MountConfig, MountOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "mailfs")]
#[command(about = "Mount an IMAP mailbox as a directory of plain-text files")]
#[command(version)]
struct Cli {
    /// Directory to mount the mailbox on
    mountpoint: PathBuf,

    /// IMAP server host
    #[arg(long, env = "MAILFS_HOST")]
    host: String,

    /// IMAP server port (implicit TLS)
    #[arg(long, env = "MAILFS_PORT", default_value_t = 993)]
    port: u16,

    /// Login name
    #[arg(short, long, env = "MAILFS_USER")]
    user: String,

    /// Password (if neither this nor an access token is given, prompts)
    #[arg(short, long, env = "MAILFS_PASSWORD", hide_env_values = true, conflicts_with = "access_token")]
    password: Option<String>,

    /// OAuth2 access token, sent with SASL XOAUTH2
    #[arg(long, env = "MAILFS_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Mailbox to expose
    #[arg(long, default_value = "INBOX")]
    mailbox: String,

    /// Number of most recent messages to show
    #[arg(long)]
    window: Option<u32>,

    /// Time between mailbox polls (e.g. "30s", "2m")
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    poll_interval: Option<Duration>,

    /// TOML file with mount settings
    #[arg(short, long, env = "MAILFS_CONFIG")]
    config: Option<PathBuf>,

    /// Let other users access the mount
    #[arg(long)]
    allow_other: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    if !cli.mountpoint.is_dir() {
        anyhow::bail!("Mountpoint is not a directory: {}", cli.mountpoint.display());
    }

    let config = load_config(&cli)?;
    let credentials = get_credentials(&cli)?;

    let imap = ImapConfig::new(&cli.host, &cli.user)
        .port(cli.port)
        .mailbox(&cli.mailbox);
    info!(host = %imap.host, user = %imap.username, mailbox = %imap.mailbox, "Connecting");
    let store = Arc::new(
        ImapStore::connect(&imap, &credentials).context("Failed to open IMAP session")?,
    );
    drop(credentials);

    let result = mount_and_wait(&cli, Arc::clone(&store) as Arc<dyn MailStore>, config);
    store.logout();
    result
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Config file first, then command-line overrides.
fn load_config(cli: &Cli) -> Result<MountConfig> {
    let mut config = match &cli.config {
        Some(path) => MountConfig::from_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => MountConfig::default(),
    };
    if let Some(window) = cli.window {
        config = config.window_size(window);
    }
    if let Some(interval) = cli.poll_interval {
        config = config.poll_interval(interval);
    }
    Ok(config)
}

/// Get credentials from CLI, environment, or prompt.
fn get_credentials(cli: &Cli) -> Result<Credentials> {
    if let Some(ref token) = cli.access_token {
        Ok(Credentials::AccessToken(Zeroizing::new(token.clone())))
    } else if let Some(ref pwd) = cli.password {
        Ok(Credentials::Password(Zeroizing::new(pwd.clone())))
    } else {
        let prompt = format!("Password for {}: ", cli.user);
        Ok(Credentials::Password(Zeroizing::new(
            rpassword::prompt_password(prompt).context("Failed to read password")?,
        )))
    }
}

/// Mount the filesystem and wait for Ctrl+C.
fn mount_and_wait(cli: &Cli, store: Arc<dyn MailStore>, config: MountConfig) -> Result<()> {
    let fs = MailFs::with_config(store, config).context("Failed to initialize filesystem")?;

    let options = MountOptions {
        fsname: format!("mailfs:{}@{}", cli.mailbox, cli.host),
        allow_other: cli.allow_other,
        ..MountOptions::default()
    };

    let (tx, rx) = mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("Failed to set signal handler")?;

    let handle = FuseBackend::new()
        .mount(fs, &cli.mountpoint, &options)
        .context("Failed to mount filesystem")?;
    info!("Mailbox mounted at {} (press Ctrl+C to unmount)", cli.mountpoint.display());

    match rx.recv() {
        Ok(()) => info!("Received interrupt signal, unmounting..."),
        Err(_) => warn!("Signal channel closed unexpectedly"),
    }

    let stats = handle.stats();
    handle.unmount();
    info!(stats = %stats.snapshot(), "Filesystem unmounted");
    Ok(())
}
