//! FUSE filesystem exposing a mailbox as a flat, read-only directory.
//!
//! This module implements the fuser `Filesystem` trait on top of
//! [`MailboxView`]. Every callback translates inodes to message ids, calls
//! the view, and maps [`FuseError`] to an errno.
//!
//! | Operation | Notes |
//! |-----------|-------|
//! | init/destroy | Starts and stops the reconciliation loop |
//! | lookup/getattr | Root is inode 1, message `id` is inode `id + 2` |
//! | opendir/readdir | Applies pending events, name-hash offsets |
//! | open/read/release | Body fetched on open, `FOPEN_DIRECT_IO` |
//! | unlink | Runs the removal protocol |
//! | access/statfs | Read-only |

use crate::async_bridge::BridgeStats;
use crate::config::MountConfig;
use crate::error::{FuseError, FuseResult};
use crate::inode::{ROOT_INODE, id_for, inode_for};
use crate::reconcile::{Reconciler, ReconcilerHandle, TickSource};
use crate::view::{Attributes, MailboxView, fill_from};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, Request,
};
use libc::c_int;
use mailfs_core::MailStore;
use mailfs_mount::{MountStats, to_path};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info, trace, warn};

/// Block size for `st_blocks` and statfs.
const BLOCK_SIZE: u32 = 4096;

/// Root directory: owner and group may list, nobody may write.
const ROOT_DIR_PERM: u16 = 0o550;

/// Message files: readable by owner and group.
const FILE_PERM: u16 = 0o440;

/// A directory row as handed to the kernel.
struct DirRow {
    ino: u64,
    kind: FileType,
    name: String,
}

/// The mail filesystem.
pub struct MailFs {
    view: Arc<MailboxView>,
    /// Loop waiting for `init`.
    pending: Option<(Reconciler, TickSource)>,
    reconciler: Option<ReconcilerHandle>,
    /// Kept alive while the filesystem owns its runtime.
    _owned_runtime: Option<Runtime>,
    handle: Handle,
    uid: u32,
    gid: u32,
    mounted_at: SystemTime,
}

impl MailFs {
    /// Creates a filesystem over `store` with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the tokio runtime cannot be created.
    pub fn new(store: Arc<dyn MailStore>) -> FuseResult<Self> {
        Self::with_config(store, MountConfig::default())
    }

    /// Creates a filesystem with its own runtime, polling every
    /// `config.poll_interval` (never, if it is zero).
    pub fn with_config(store: Arc<dyn MailStore>, config: MountConfig) -> FuseResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("mailfs-worker")
            .build()
            .map_err(|e| {
                FuseError::Io(std::io::Error::other(format!(
                    "Failed to create tokio runtime: {e}"
                )))
            })?;
        let handle = runtime.handle().clone();
        let ticks = TickSource::every(config.poll_interval);
        Ok(Self::with_runtime_internal(
            store,
            Some(runtime),
            handle,
            config,
            ticks,
        ))
    }

    /// Creates a filesystem that runs on an existing multi-threaded runtime.
    ///
    /// The runtime must outlive the filesystem.
    pub fn with_runtime_handle(
        store: Arc<dyn MailStore>,
        handle: Handle,
        config: MountConfig,
        ticks: TickSource,
    ) -> Self {
        Self::with_runtime_internal(store, None, handle, config, ticks)
    }

    fn with_runtime_internal(
        store: Arc<dyn MailStore>,
        owned_runtime: Option<Runtime>,
        handle: Handle,
        config: MountConfig,
        ticks: TickSource,
    ) -> Self {
        let stats = Arc::new(MountStats::new());
        let (view, reconciler) =
            MailboxView::with_reconciler(store, handle.clone(), config, stats);

        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };

        Self {
            view,
            pending: Some((reconciler, ticks)),
            reconciler: None,
            _owned_runtime: owned_runtime,
            handle,
            uid,
            gid,
            mounted_at: SystemTime::now(),
        }
    }

    /// Shared view, for stats or for driving it outside FUSE.
    pub fn view(&self) -> Arc<MailboxView> {
        Arc::clone(&self.view)
    }

    pub fn stats(&self) -> Arc<MountStats> {
        Arc::clone(self.view.stats())
    }

    pub fn bridge_stats(&self) -> Arc<BridgeStats> {
        Arc::clone(self.view.bridge_stats())
    }

    /// Starts the reconciliation loop if it is not running yet.
    fn start_reconciler(&mut self) {
        if let Some((reconciler, ticks)) = self.pending.take() {
            self.reconciler = Some(reconciler.spawn(&self.handle, ticks));
            info!("Reconciliation loop scheduled");
        }
    }

    /// Converts a name-hash into a readdir offset.
    ///
    /// Offsets encode the last returned name rather than a position so that
    /// a listing which changes between two readdir calls can still resume
    /// after the right entry. Offset 0 means "from the beginning", so a zero
    /// hash becomes 1.
    fn name_to_offset(name: &str) -> i64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        let masked = hasher.finish() & 0x7FFF_FFFF_FFFF_FFFF;
        let offset = i64::from_ne_bytes(masked.to_ne_bytes());
        if offset == 0 { 1 } else { offset }
    }

    fn ttl(&self) -> std::time::Duration {
        self.view.config().attr_ttl
    }

    fn make_dir_attr(&self) -> FileAttr {
        let time = self.mounted_at;
        FileAttr {
            ino: ROOT_INODE,
            size: 0,
            blocks: 0,
            atime: time,
            mtime: time,
            ctime: time,
            crtime: time,
            kind: FileType::Directory,
            perm: ROOT_DIR_PERM,
            nlink: 2,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    fn make_file_attr(&self, id: u64, size: u64) -> FileAttr {
        let time = self.mounted_at;
        FileAttr {
            ino: inode_for(id),
            size,
            blocks: size.div_ceil(u64::from(BLOCK_SIZE)),
            atime: time,
            mtime: time,
            ctime: time,
            crtime: time,
            kind: FileType::RegularFile,
            perm: FILE_PERM,
            nlink: 1,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    fn make_attr(&self, attrs: Attributes) -> FileAttr {
        match attrs {
            Attributes::Root => self.make_dir_attr(),
            Attributes::File { id, size } => self.make_file_attr(id, size),
        }
    }

    /// Path of a child of the root, or `None` for another parent or a
    /// non-UTF-8 name.
    fn child_path(parent: u64, name: &OsStr) -> Option<String> {
        if parent != ROOT_INODE {
            return None;
        }
        name.to_str().map(to_path)
    }

    /// Message id behind a file inode that is currently listed.
    fn known_id(&self, ino: u64) -> FuseResult<u64> {
        id_for(ino)
            .filter(|&id| self.view.contains(id))
            .ok_or(FuseError::InvalidInode(ino))
    }

    fn fail(&self, op: &str, error: &FuseError) -> c_int {
        if error.is_not_found() {
            trace!(op, error = %error, "Not found");
        } else {
            warn!(op, error = %error, "Operation failed");
            self.view.stats().record_error();
        }
        error.to_errno()
    }
}

impl Filesystem for MailFs {
    fn init(&mut self, _req: &Request<'_>, config: &mut KernelConfig) -> Result<(), c_int> {
        info!("FUSE filesystem initialized");
        config.add_capabilities(fuser::consts::FUSE_ASYNC_READ).ok();
        self.start_reconciler();
        Ok(())
    }

    fn destroy(&mut self) {
        if let Some(reconciler) = self.reconciler.take() {
            reconciler.shutdown();
        }
        info!(stats = %self.view.stats().snapshot(), "FUSE filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        trace!(parent, name = ?name, "lookup");
        let Some(path) = Self::child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };

        self.view.apply_pending_events();
        match self.view.attributes(&path) {
            Ok(attrs) => reply.entry(&self.ttl(), &self.make_attr(attrs), 0),
            Err(e) => reply.error(self.fail("lookup", &e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        trace!(inode = ino, "getattr");
        if ino == ROOT_INODE {
            reply.attr(&self.ttl(), &self.make_dir_attr());
            return;
        }
        match self.known_id(ino).and_then(|id| {
            self.view
                .attributes_by_id(id)
                .ok_or(FuseError::InvalidInode(ino))
        }) {
            Ok(attrs) => reply.attr(&self.ttl(), &self.make_attr(attrs)),
            Err(e) => reply.error(self.fail("getattr", &e)),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        if ino == ROOT_INODE {
            reply.opened(0, 0);
            return;
        }
        match self.known_id(ino) {
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(e) => reply.error(self.fail("opendir", &e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        trace!(inode = ino, offset, "readdir");
        if ino != ROOT_INODE {
            reply.error(libc::ENOTDIR);
            return;
        }

        let listing = self.view.list();
        let mut rows: Vec<DirRow> = Vec::with_capacity(listing.len() + 2);
        rows.push(DirRow {
            ino: ROOT_INODE,
            kind: FileType::Directory,
            name: ".".to_string(),
        });
        rows.push(DirRow {
            ino: ROOT_INODE,
            kind: FileType::Directory,
            name: "..".to_string(),
        });
        rows.extend(listing.entries().iter().map(|e| DirRow {
            ino: inode_for(e.id),
            kind: FileType::RegularFile,
            name: e.name.clone(),
        }));
        rows.sort_by(|a, b| a.name.cmp(&b.name));

        let start = if offset == 0 {
            0
        } else {
            rows.iter()
                .position(|r| Self::name_to_offset(&r.name) == offset)
                .map_or_else(
                    || {
                        warn!(
                            offset,
                            entries = rows.len(),
                            "readdir resume offset not found, restarting from beginning"
                        );
                        0
                    },
                    |idx| idx + 1,
                )
        };

        let filled = fill_from(&rows, start, |row| {
            !reply.add(row.ino, Self::name_to_offset(&row.name), row.kind, &row.name)
        });
        match filled {
            Ok(delivered) => trace!(delivered, "readdir complete"),
            Err(FuseError::ListingTruncated { delivered }) => {
                debug!(delivered, "readdir buffer full, kernel will resume");
            }
            Err(e) => warn!(error = %e, "readdir fill failed"),
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, flags, "open");
        if ino == ROOT_INODE {
            reply.error(libc::EISDIR);
            return;
        }
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            reply.error(libc::EACCES);
            return;
        }
        match self.known_id(ino).and_then(|id| self.view.open_id(id)) {
            Ok(fh) => reply.opened(fh, fuser::consts::FOPEN_DIRECT_IO),
            Err(e) => reply.error(self.fail("open", &e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!(inode = ino, fh, offset, size, "read");
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let len = usize::try_from(size).unwrap_or(usize::MAX);
        match self.view.read(fh, offset, len) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(self.fail("read", &e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        trace!(fh, "release");
        self.view.release(fh);
        reply.ok();
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!(parent, name = ?name, "unlink");
        let Some(path) = Self::child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.view.unlink(&path) {
            Ok(_) => reply.ok(),
            Err(e) => reply.error(self.fail("unlink", &e)),
        }
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        trace!(inode = ino, mask, "access");
        if ino != ROOT_INODE
            && let Err(e) = self.known_id(ino)
        {
            reply.error(self.fail("access", &e));
        } else if mask & libc::W_OK != 0 {
            reply.error(libc::EACCES);
        } else {
            reply.ok();
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        // Nautilus checks namelen + 1, so Linux reports 254.
        #[cfg(target_os = "linux")]
        let namelen = 254u32;
        #[cfg(not(target_os = "linux"))]
        let namelen = 255u32;

        let files = self.view.len() as u64;
        reply.statfs(0, 0, 0, files, 0, BLOCK_SIZE, namelen, BLOCK_SIZE);
    }
}

impl Drop for MailFs {
    fn drop(&mut self) {
        if let Some(reconciler) = self.reconciler.take() {
            reconciler.shutdown();
        }
    }
}
