//! Mount configuration for the mail filesystem.
//!
//! Defaults suit a remote IMAP server polled once a minute. Use
//! [`MountConfig::fast()`] in tests for short intervals and timeouts.
//!
//! A config can also be loaded from TOML; durations use humantime syntax:
//!
//! ```toml
//! poll_interval = "2m"
//! window_size = 200
//! io_timeout = "45s"
//! trash_folders = ["Deleted Items", "Trash"]
//! ```

use mailfs_core::RemovalPolicy;
use mailfs_core::removal::DEFAULT_TRASH_FOLDERS;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default time between reconciliation cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of most recent messages listed per cycle.
pub const DEFAULT_WINDOW_SIZE: u32 = 100;

/// Default capacity of each event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 500;

/// Default timeout for a single remote call (listing, body fetch).
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration options for the mounted mailbox.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MountConfig {
    /// Time between reconciliation cycles. Zero disables background refresh.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// How many of the newest messages each cycle lists.
    pub window_size: u32,

    /// Capacity of the `Added` and `Removed` event channels.
    pub channel_capacity: usize,

    /// How long the loop waits on a full channel before abandoning the cycle.
    #[serde(with = "humantime_serde")]
    pub send_timeout: Duration,

    /// Timeout for a listing or a body fetch.
    #[serde(with = "humantime_serde")]
    pub io_timeout: Duration,

    /// Timeout for the whole removal protocol (all moves, flag, purge).
    #[serde(with = "humantime_serde")]
    pub removal_timeout: Duration,

    /// Time-to-live the kernel may cache attributes and entries for.
    #[serde(with = "humantime_serde")]
    pub attr_ttl: Duration,

    /// How long a successfully unlinked message ignores `Added` events.
    ///
    /// `None` means twice the poll interval.
    #[serde(with = "humantime_serde")]
    pub tombstone_ttl: Option<Duration>,

    /// Trash folders tried in order when removing a message.
    pub trash_folders: Vec<String>,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            window_size: DEFAULT_WINDOW_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            send_timeout: Duration::from_secs(5),
            io_timeout: DEFAULT_IO_TIMEOUT,
            removal_timeout: Duration::from_secs(120),
            attr_ttl: Duration::from_secs(1),
            tombstone_ttl: None,
            trash_folders: DEFAULT_TRASH_FOLDERS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl MountConfig {
    /// Short intervals and timeouts for tests and local servers.
    pub fn fast() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            send_timeout: Duration::from_millis(100),
            io_timeout: Duration::from_secs(2),
            removal_timeout: Duration::from_secs(5),
            attr_ttl: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Parses a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Reads and parses a TOML config file.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Effective tombstone lifetime.
    pub fn effective_tombstone_ttl(&self) -> Duration {
        self.tombstone_ttl.unwrap_or(self.poll_interval * 2)
    }

    pub fn removal_policy(&self) -> RemovalPolicy {
        RemovalPolicy::with_folders(self.trash_folders.iter().cloned())
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn window_size(mut self, window: u32) -> Self {
        self.window_size = window;
        self
    }

    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    #[must_use]
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    #[must_use]
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    #[must_use]
    pub fn removal_timeout(mut self, timeout: Duration) -> Self {
        self.removal_timeout = timeout;
        self
    }

    #[must_use]
    pub fn attr_ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self
    }

    #[must_use]
    pub fn tombstone_ttl(mut self, ttl: Duration) -> Self {
        self.tombstone_ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn trash_folders<I, S>(mut self, folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trash_folders = folders.into_iter().map(Into::into).collect();
        self
    }
}
