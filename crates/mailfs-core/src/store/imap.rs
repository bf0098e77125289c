//! IMAP implementation of [`MailStore`].
//!
//! One authenticated session is opened by [`ImapStore::connect`] and shared
//! behind a mutex, since IMAP commands on a single connection are strictly
//! sequential. Listing and fetching reopen the session once if it was lost;
//! removal commands are never replayed.

use super::{MailStore, MetadataStream};
use crate::decode::decode_subject;
use crate::error::{StoreError, StoreResult};
use crate::message::MessageMetadata;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};
use zeroize::Zeroizing;

/// Default IMAPS port.
pub const DEFAULT_PORT: u16 = 993;

/// Default mailbox to expose.
pub const DEFAULT_MAILBOX: &str = "INBOX";

/// Where to connect and which mailbox to select.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub mailbox: String,
}

impl ImapConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            mailbox: DEFAULT_MAILBOX.to_string(),
        }
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = mailbox.into();
        self
    }
}

/// Authentication material. Wiped from memory on drop.
#[derive(Clone)]
pub enum Credentials {
    /// Plain `LOGIN`.
    Password(Zeroizing<String>),
    /// SASL `XOAUTH2` with an already obtained OAuth2 access token.
    AccessToken(Zeroizing<String>),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Password(_) => f.write_str("Credentials::Password(..)"),
            Credentials::AccessToken(_) => f.write_str("Credentials::AccessToken(..)"),
        }
    }
}

struct XOAuth2 {
    user: String,
    access_token: Zeroizing<String>,
}

impl imap::Authenticator for XOAuth2 {
    type Response = String;

    fn process(&self, _challenge: &[u8]) -> Self::Response {
        format!(
            "user={}\x01auth=Bearer {}\x01\x01",
            self.user,
            self.access_token.as_str()
        )
    }
}

type Session = imap::Session<imap::Connection>;

/// [`MailStore`] backed by a live IMAP session.
pub struct ImapStore {
    session: Mutex<Session>,
    config: ImapConfig,
    credentials: Credentials,
}

impl ImapStore {
    /// Connects, authenticates and selects the configured mailbox.
    ///
    /// Failure here means there is nothing to serve; callers treat it as fatal.
    pub fn connect(config: &ImapConfig, credentials: &Credentials) -> StoreResult<Self> {
        info!(
            host = %config.host,
            port = config.port,
            user = %config.username,
            mailbox = %config.mailbox,
            "Connecting to IMAP server"
        );
        let session = open_session(config, credentials)?;
        Ok(Self {
            session: Mutex::new(session),
            config: config.clone(),
            credentials: credentials.clone(),
        })
    }

    /// Ends the session. Errors are logged, not returned, since the process
    /// is shutting down anyway.
    pub fn logout(&self) {
        if let Err(e) = self.session.lock().logout() {
            warn!(error = %e, "IMAP logout failed");
        }
    }

    /// Runs `op` on the session. If the connection turns out to be gone,
    /// opens a new session and runs `op` once more.
    fn with_session<T>(&self, op: impl Fn(&mut Session) -> StoreResult<T>) -> StoreResult<T> {
        let mut session = self.session.lock();
        match op(&mut session) {
            Err(e) if e.is_connection_lost() => {
                warn!(error = %e, host = %self.config.host, "IMAP session lost, reconnecting");
                *session = open_session(&self.config, &self.credentials)?;
                info!("IMAP session re-established");
                op(&mut session)
            }
            result => result,
        }
    }
}

fn open_session(config: &ImapConfig, credentials: &Credentials) -> StoreResult<Session> {
    let client = imap::ClientBuilder::new(config.host.as_str(), config.port)
        .connect()
        .map_err(|e| StoreError::Connection(e.to_string()))?;

    let mut session = match credentials {
        Credentials::AccessToken(token) => {
            let auth = XOAuth2 {
                user: config.username.clone(),
                access_token: token.clone(),
            };
            client
                .authenticate("XOAUTH2", &auth)
                .map_err(|(e, _client)| StoreError::Connection(format!("XOAUTH2 failed: {e}")))?
        }
        Credentials::Password(password) => client
            .login(config.username.as_str(), password.as_str())
            .map_err(|(e, _client)| StoreError::Connection(format!("LOGIN failed: {e}")))?,
    };

    let mailbox = session.select(&config.mailbox).map_err(map_imap_error)?;
    info!(exists = mailbox.exists, "Mailbox selected");
    Ok(session)
}

impl MailStore for ImapStore {
    fn list_recent(&self, window: u32) -> StoreResult<MetadataStream> {
        self.with_session(|session| {
            // Re-select to refresh the message count.
            let mailbox = session
                .select(&self.config.mailbox)
                .map_err(map_imap_error)?;
            let Some(range) = recent_range(mailbox.exists, window) else {
                return Ok(Box::new(std::iter::empty()) as MetadataStream);
            };
            trace!(range = %range, "Fetching recent metadata");

            let fetches = session
                .fetch(&range, "(UID RFC822.SIZE ENVELOPE)")
                .map_err(map_imap_error)?;

            let items: Vec<StoreResult<MessageMetadata>> = fetches
                .iter()
                .filter_map(|fetch| {
                    let Some(uid) = fetch.uid else {
                        debug!(seq = fetch.message, "FETCH response without UID, skipping");
                        return None;
                    };
                    let subject = fetch
                        .envelope()
                        .and_then(|env| env.subject.as_deref())
                        .map(decode_subject)
                        .unwrap_or_default();
                    let size = fetch.size.map_or(0, i64::from);
                    Some(Ok(MessageMetadata::new(u64::from(uid), subject, size)))
                })
                .collect();

            Ok(Box::new(items.into_iter()) as MetadataStream)
        })
    }

    fn fetch_body(&self, id: u64) -> StoreResult<Vec<u8>> {
        self.with_session(|session| {
            let fetches = session
                .uid_fetch(id.to_string(), "BODY.PEEK[]")
                .map_err(map_imap_error)?;
            fetches
                .iter()
                .find_map(|fetch| fetch.body().map(<[u8]>::to_vec))
                .ok_or(StoreError::NotFound(id))
        })
    }

    fn move_to_folder(&self, id: u64, folder: &str) -> StoreResult<()> {
        self.session
            .lock()
            .uid_mv(id.to_string(), folder)
            .map_err(map_imap_error)
    }

    fn flag_deleted(&self, id: u64) -> StoreResult<()> {
        self.session
            .lock()
            .uid_store(id.to_string(), "+FLAGS (\\Deleted)")
            .map(|_| ())
            .map_err(map_imap_error)
    }

    fn purge(&self) -> StoreResult<()> {
        self.session
            .lock()
            .expunge()
            .map(|_| ())
            .map_err(map_imap_error)
    }
}

/// Sequence set covering the `window` newest of `exists` messages.
///
/// Returns `None` for an empty mailbox or an empty window.
fn recent_range(exists: u32, window: u32) -> Option<String> {
    if exists == 0 || window == 0 {
        return None;
    }
    let start = exists.saturating_sub(window) + 1;
    Some(format!("{start}:{exists}"))
}

fn map_imap_error(e: imap::Error) -> StoreError {
    match e {
        imap::Error::Io(io) => StoreError::Io(io),
        imap::Error::ConnectionLost => StoreError::Connection("connection lost".to_string()),
        bye @ imap::Error::Bye(_) => StoreError::Connection(bye.to_string()),
        other => StoreError::Protocol(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imap::Authenticator;

    #[test]
    fn recent_range_covers_window() {
        assert_eq!(recent_range(250, 100).as_deref(), Some("151:250"));
        assert_eq!(recent_range(100, 100).as_deref(), Some("1:100"));
    }

    #[test]
    fn recent_range_small_mailbox() {
        assert_eq!(recent_range(3, 100).as_deref(), Some("1:3"));
    }

    #[test]
    fn recent_range_empty() {
        assert_eq!(recent_range(0, 100), None);
        assert_eq!(recent_range(10, 0), None);
    }

    #[test]
    fn xoauth2_response_format() {
        let auth = XOAuth2 {
            user: "me@example.com".to_string(),
            access_token: Zeroizing::new("tok".to_string()),
        };
        assert_eq!(
            auth.process(b""),
            "user=me@example.com\x01auth=Bearer tok\x01\x01"
        );
    }

    #[test]
    fn map_imap_error_marks_lost_connections() {
        assert!(map_imap_error(imap::Error::ConnectionLost).is_connection_lost());
        assert!(
            map_imap_error(imap::Error::Io(std::io::Error::other("reset"))).is_connection_lost()
        );
        assert!(!map_imap_error(imap::Error::Append).is_connection_lost());
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let creds = Credentials::Password(Zeroizing::new("hunter2".to_string()));
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn config_builder() {
        let config = ImapConfig::new("imap.example.com", "me")
            .port(1993)
            .mailbox("Archive");
        assert_eq!(config.port, 1993);
        assert_eq!(config.mailbox, "Archive");
    }
}
