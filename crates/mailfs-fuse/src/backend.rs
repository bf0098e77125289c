//! Mounting and unmounting a [`MailFs`].

use crate::filesystem::MailFs;
use fuser::{BackgroundSession, MountOption};
use mailfs_mount::MountStats;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors while mounting.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("FUSE is not available: {0}")]
    Unavailable(String),

    #[error("Mountpoint is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Mount failed: {0}")]
    Mount(#[source] std::io::Error),
}

/// Options passed to the kernel at mount time.
#[derive(Debug, Clone)]
pub struct MountOptions {
    /// Name shown in the mount table.
    pub fsname: String,
    /// Unmount when the process exits.
    pub auto_unmount: bool,
    /// Allow users other than the mounting user.
    pub allow_other: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            fsname: "mailfs".to_string(),
            auto_unmount: true,
            allow_other: false,
        }
    }
}

impl MountOptions {
    fn to_fuser(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName(self.fsname.clone()),
            MountOption::Subtype("mailfs".to_string()),
            MountOption::NoExec,
            MountOption::NoSuid,
            MountOption::NoDev,
        ];
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        options
    }
}

/// Handle to a mounted mailbox.
///
/// Wraps the fuser `BackgroundSession`. Dropping this handle triggers unmount.
pub struct MailMountHandle {
    session: Option<BackgroundSession>,
    mountpoint: PathBuf,
    stats: Arc<MountStats>,
}

impl MailMountHandle {
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    pub fn stats(&self) -> Arc<MountStats> {
        Arc::clone(&self.stats)
    }

    /// Unmounts and waits for the session to finish.
    pub fn unmount(mut self) {
        tracing::info!(mountpoint = %self.mountpoint.display(), "Unmounting mailbox");
        if let Some(session) = self.session.take() {
            session.join();
        }
        tracing::info!(mountpoint = %self.mountpoint.display(), "Unmount successful");
    }

    /// Lazy-unmounts with system tools, for when the session is stuck.
    fn force_unmount_impl(&self) {
        #[cfg(target_os = "macos")]
        {
            let _ = std::process::Command::new("umount")
                .arg("-f")
                .arg(&self.mountpoint)
                .output();
        }

        #[cfg(target_os = "linux")]
        {
            let _ = std::process::Command::new("fusermount")
                .args(["-uz"])
                .arg(&self.mountpoint)
                .output();
        }
    }
}

/// Timeout for graceful session.join() before forcing unmount.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

impl Drop for MailMountHandle {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!("Unmounting FUSE filesystem at {}", self.mountpoint.display());

            let (tx, rx) = mpsc::channel();
            std::thread::spawn(move || {
                session.join();
                let _ = tx.send(());
            });

            if rx.recv_timeout(JOIN_TIMEOUT).is_err() {
                tracing::warn!(
                    "session.join() timed out after {:?} for {}, forcing unmount",
                    JOIN_TIMEOUT,
                    self.mountpoint.display()
                );
                self.force_unmount_impl();
            }
        }
    }
}

/// Mounts a [`MailFs`] with fuser.
#[derive(Debug, Clone, Copy)]
pub struct FuseBackend {
    /// Timeout for the mount call and for the mount to become visible.
    pub mount_timeout: Duration,
    /// Polling interval while waiting for the mount.
    pub poll_interval: Duration,
}

impl Default for FuseBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FuseBackend {
    pub fn new() -> Self {
        Self {
            mount_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(50),
        }
    }

    pub fn is_available(&self) -> bool {
        #[cfg(target_os = "macos")]
        {
            Path::new("/Library/Filesystems/macfuse.fs").exists()
        }
        #[cfg(target_os = "linux")]
        {
            Path::new("/dev/fuse").exists()
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux")))]
        {
            false
        }
    }

    pub fn unavailable_reason(&self) -> Option<String> {
        if self.is_available() {
            return None;
        }
        #[cfg(target_os = "macos")]
        {
            Some("macFUSE is not installed".to_string())
        }
        #[cfg(not(target_os = "macos"))]
        {
            Some("the fuse kernel module is not loaded (/dev/fuse missing)".to_string())
        }
    }

    /// Mounts `fs` at `mountpoint` and waits until the mount is live.
    pub fn mount(
        &self,
        fs: MailFs,
        mountpoint: &Path,
        options: &MountOptions,
    ) -> Result<MailMountHandle, MountError> {
        if let Some(reason) = self.unavailable_reason() {
            return Err(MountError::Unavailable(reason));
        }
        if !mountpoint.is_dir() {
            return Err(MountError::NotADirectory(mountpoint.to_path_buf()));
        }

        let stats = fs.stats();
        let session = self.spawn_mount_with_timeout(fs, mountpoint, &options.to_fuser())?;
        let handle = MailMountHandle {
            session: Some(session),
            mountpoint: mountpoint.to_path_buf(),
            stats,
        };
        self.wait_for_mount(mountpoint)?;
        tracing::info!(mountpoint = %mountpoint.display(), "Mailbox mounted");
        Ok(handle)
    }

    /// Polls until the mountpoint's device differs from its parent's.
    fn wait_for_mount(&self, mount_point: &Path) -> Result<(), MountError> {
        #[cfg(unix)]
        use std::os::unix::fs::MetadataExt;

        let deadline = Instant::now() + self.mount_timeout;
        let parent = mount_point.parent().unwrap_or(Path::new("/"));

        while Instant::now() < deadline {
            #[cfg(unix)]
            {
                if let (Ok(path_meta), Ok(parent_meta)) =
                    (std::fs::metadata(mount_point), std::fs::metadata(parent))
                    && path_meta.dev() != parent_meta.dev()
                {
                    tracing::debug!(mountpoint = %mount_point.display(), "FUSE mount active");
                    return Ok(());
                }
            }
            #[cfg(not(unix))]
            {
                if mount_point.is_dir() {
                    return Ok(());
                }
            }
            std::thread::sleep(self.poll_interval);
        }

        Err(MountError::Mount(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!(
                "FUSE mount did not become ready within {:?}",
                self.mount_timeout
            ),
        )))
    }

    /// Runs `spawn_mount2` on a helper thread so a mount syscall blocked by
    /// a stale mountpoint cannot hang the caller.
    fn spawn_mount_with_timeout(
        &self,
        fs: MailFs,
        mountpoint: &Path,
        options: &[MountOption],
    ) -> Result<BackgroundSession, MountError> {
        let mountpoint = mountpoint.to_path_buf();
        let options: Vec<MountOption> = options.to_vec();
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let result = fuser::spawn_mount2(fs, &mountpoint, &options);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.mount_timeout) {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(e)) => Err(MountError::Mount(e)),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(MountError::Mount(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Mount operation timed out - the mountpoint may be on a stale FUSE mount",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(MountError::Mount(
                std::io::Error::other("Mount thread terminated unexpectedly"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_options() {
        let options = MountOptions::default().to_fuser();
        assert!(options.contains(&MountOption::FSName("mailfs".to_string())));
        assert!(options.contains(&MountOption::AutoUnmount));
        assert!(!options.contains(&MountOption::AllowOther));
        assert!(!options.contains(&MountOption::RW));
    }

    #[test]
    fn test_mount_rejects_missing_dir() {
        let backend = FuseBackend::new();
        let fs = MailFs::with_config(
            Arc::new(mailfs_core::MemoryStore::new()),
            crate::MountConfig::fast(),
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let result = backend.mount(fs, &dir.path().join("missing"), &MountOptions::default());
        assert!(matches!(
            result,
            Err(MountError::NotADirectory(_) | MountError::Unavailable(_))
        ));
    }
}
