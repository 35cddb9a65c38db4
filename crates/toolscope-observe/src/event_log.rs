//! Durable, rotating, dual-sink event log.
//!
//! Every entry is written twice: a readable line to `<name>.log` and a JSON
//! line to `structured/<name>.jsonl`. One mutex guards both active files,
//! the machine byte counter, and the archive sequence, so appends and
//! rotation never interleave.
//!
//! # Sharing a directory between processes
//!
//! Appends and rotation also hold an advisory `flock` on `<log_dir>/.lock`
//! (unix). Under it, a writer checks that its open handles still refer to
//! the active paths and reopens them if another process rotated in the
//! meantime, and rotation recomputes the next sequence from the archive
//! directory. An archive is never renamed over.
//!
//! # Rotation
//!
//! After a write that brings the machine sink to `max_file_bytes`, both
//! active files are renamed into `archive/` under the next sequence number
//! and fresh files are opened. Sequence numbers continue from the highest
//! archive found on disk, so they keep increasing across restarts. Only the
//! newest `max_archives` of each family are kept.
//!
//! # Failure isolation
//!
//! [`EventLog::log`] never returns an error. A failed write is reported
//! through `tracing` instead, counted, and the files are reopened on the
//! next write.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use toolscope_core::{
    Context, ContextValue, LogEntry, LogLayout, LogLevel, ObservabilityConfig, sanitize,
};

use crate::error::Result;
use crate::formatter::{Render, parse_log_entry};

/// Settings for an [`EventLog`].
#[derive(Debug, Clone)]
pub struct EventLogSettings {
    /// File layout.
    pub layout: LogLayout,
    /// Machine sink size that triggers rotation.
    pub max_file_bytes: u64,
    /// Archives kept per family.
    pub max_archives: usize,
    /// Forward entries to `tracing`.
    pub echo_to_tracing: bool,
}

impl EventLogSettings {
    /// Derives settings from an observability configuration.
    #[must_use]
    pub fn from_config(config: &ObservabilityConfig) -> Self {
        Self {
            layout: config.layout(),
            max_file_bytes: config.max_file_bytes,
            max_archives: config.max_archives,
            echo_to_tracing: config.echo_to_tracing,
        }
    }
}

/// The pair of active files.
#[derive(Debug)]
struct ActiveFiles {
    human: File,
    machine: File,
    machine_bytes: u64,
}

impl ActiveFiles {
    fn open(layout: &LogLayout) -> io::Result<Self> {
        fs::create_dir_all(&layout.structured_dir)?;
        fs::create_dir_all(&layout.archive_dir)?;
        let human = append_file(&layout.human_path())?;
        let machine = append_file(&layout.machine_path())?;
        let machine_bytes = machine.metadata()?.len();
        Ok(Self {
            human,
            machine,
            machine_bytes,
        })
    }

    fn append(&mut self, human_line: &str, machine_line: &str) -> io::Result<()> {
        self.human.write_all(human_line.as_bytes())?;
        self.machine.write_all(machine_line.as_bytes())?;
        self.machine_bytes += machine_line.len() as u64;
        Ok(())
    }

    fn sync(&self) -> io::Result<()> {
        self.human.sync_all()?;
        self.machine.sync_all()
    }

    /// Checks that both handles still refer to the active paths and picks up
    /// the machine sink's on-disk size. Returns false if either was moved.
    fn refresh(&mut self, layout: &LogLayout) -> io::Result<bool> {
        let (Some(machine), Some(human)) = (
            metadata_if_exists(&layout.machine_path())?,
            metadata_if_exists(&layout.human_path())?,
        ) else {
            return Ok(false);
        };
        if !same_file(&self.machine, &machine)? || !same_file(&self.human, &human)? {
            return Ok(false);
        }
        self.machine_bytes = machine.len();
        Ok(true)
    }
}

fn metadata_if_exists(path: &Path) -> io::Result<Option<fs::Metadata>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn same_file(handle: &File, path_meta: &fs::Metadata) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;
    let open = handle.metadata()?;
    Ok(open.dev() == path_meta.dev() && open.ino() == path_meta.ino())
}

#[cfg(not(unix))]
fn same_file(handle: &File, path_meta: &fs::Metadata) -> io::Result<bool> {
    // No inode to compare here; a swapped file almost always differs in size.
    Ok(handle.metadata()?.len() == path_meta.len())
}

fn append_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Advisory lock file shared by every writer of one log directory.
#[derive(Debug)]
struct DirLock {
    file: File,
}

impl DirLock {
    fn open(layout: &LogLayout) -> io::Result<Self> {
        fs::create_dir_all(&layout.log_dir)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(layout.lock_path())?;
        Ok(Self { file })
    }

    /// Blocks until no other writer holds the directory.
    #[cfg(unix)]
    fn acquire(&self) -> io::Result<DirGuard> {
        use nix::fcntl::{Flock, FlockArg};
        let flock = Flock::lock(self.file.try_clone()?, FlockArg::LockExclusive)
            .map_err(|(_, errno)| io::Error::from(errno))?;
        Ok(DirGuard { _flock: flock })
    }

    #[cfg(not(unix))]
    #[allow(clippy::unnecessary_wraps, clippy::unused_self)]
    fn acquire(&self) -> io::Result<DirGuard> {
        Ok(DirGuard {})
    }
}

/// Released on drop.
#[cfg(unix)]
struct DirGuard {
    _flock: nix::fcntl::Flock<File>,
}

#[cfg(not(unix))]
struct DirGuard {}

#[derive(Debug)]
struct SinkState {
    files: Option<ActiveFiles>,
    dir_lock: Option<DirLock>,
    next_sequence: u64,
}

/// Rotating dual-sink event log.
#[derive(Debug)]
pub struct EventLog {
    settings: EventLogSettings,
    state: Mutex<SinkState>,
    write_failures: AtomicU64,
    degraded: AtomicBool,
}

impl EventLog {
    /// Opens (or creates) the log files described by `settings`.
    ///
    /// Never fails: if the files cannot be opened the log starts degraded and
    /// retries on every write.
    #[must_use]
    pub fn open(settings: EventLogSettings) -> Self {
        let next_sequence = highest_sequence(&settings.layout).map_or(1, |seq| seq + 1);
        let log = Self {
            state: Mutex::new(SinkState {
                files: None,
                dir_lock: None,
                next_sequence,
            }),
            settings,
            write_failures: AtomicU64::new(0),
            degraded: AtomicBool::new(false),
        };

        let opened = ActiveFiles::open(&log.settings.layout);
        match opened {
            Ok(files) => {
                tracing::debug!(
                    dir = %log.settings.layout.log_dir.display(),
                    next_sequence,
                    "event log opened"
                );
                log.state.lock().files = Some(files);
            }
            Err(e) => log.report_open_failure(&e),
        }
        log
    }

    /// Opens the log configured by `config`.
    #[must_use]
    pub fn from_config(config: &ObservabilityConfig) -> Self {
        Self::open(EventLogSettings::from_config(config))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Writing
    // ═══════════════════════════════════════════════════════════════════════════

    /// Appends one entry to both sinks.
    pub fn log(&self, level: LogLevel, component: &str, message: &str, context: Context) {
        self.append(LogEntry::new(level, component, message).with_context(context));
    }

    /// Appends a prepared entry to both sinks.
    pub fn append(&self, entry: LogEntry) {
        let entry = sanitize_entry(entry);
        if self.settings.echo_to_tracing {
            echo(&entry);
        }

        let mut human_line = entry.render_human(false);
        human_line.push('\n');
        let mut machine_line = entry.to_machine_line();
        machine_line.push('\n');

        let mut state = self.state.lock();
        let guard = match self.lock_dir(&mut state) {
            Ok(guard) => guard,
            Err(e) => {
                state.dir_lock = None;
                drop(state);
                self.report_write_failure(&e, &entry);
                return;
            }
        };

        if let Err(e) = self.write_active(&mut state, &human_line, &machine_line) {
            state.files = None;
            drop(guard);
            drop(state);
            self.report_write_failure(&e, &entry);
            return;
        }

        if self.degraded.swap(false, Ordering::Relaxed) {
            tracing::info!(
                failures = self.write_failures.load(Ordering::Relaxed),
                "event log writable again"
            );
        }

        let needs_rotation = state
            .files
            .as_ref()
            .is_some_and(|f| f.machine_bytes >= self.settings.max_file_bytes);
        if needs_rotation {
            if let Err(e) = self.rotate(&mut state) {
                drop(guard);
                drop(state);
                self.report_rotation_failure(&e);
            }
        }
    }

    fn lock_dir(&self, state: &mut SinkState) -> io::Result<DirGuard> {
        if state.dir_lock.is_none() {
            state.dir_lock = Some(DirLock::open(&self.settings.layout)?);
        }
        state
            .dir_lock
            .as_ref()
            .map_or_else(|| Err(io::Error::other("log lock not open")), DirLock::acquire)
    }

    /// Appends to the active pair, reopening it first if another writer
    /// rotated it away. Caller holds the directory lock.
    fn write_active(
        &self,
        state: &mut SinkState,
        human_line: &str,
        machine_line: &str,
    ) -> io::Result<()> {
        let layout = &self.settings.layout;
        let current = match state.files.as_mut() {
            Some(files) => files.refresh(layout)?,
            None => false,
        };
        if !current {
            state.files = Some(ActiveFiles::open(layout)?);
        }
        state
            .files
            .as_mut()
            .map_or_else(|| Err(io::Error::other("log files not open")), |f| {
                f.append(human_line, machine_line)
            })
    }

    fn rotate(&self, state: &mut SinkState) -> io::Result<()> {
        let layout = &self.settings.layout;
        // Another process may have archived since this log was opened.
        let on_disk = highest_sequence(layout).map_or(1, |seq| seq + 1);
        let sequence = state.next_sequence.max(on_disk);
        let machine_archive = layout.machine_archive(sequence);
        let human_archive = layout.human_archive(sequence);
        if machine_archive.exists() || human_archive.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("archive sequence {sequence} already exists"),
            ));
        }

        // Close both handles before renaming; Windows refuses to rename open files.
        state.files = None;
        fs::create_dir_all(&layout.archive_dir)?;
        fs::rename(layout.machine_path(), &machine_archive)?;
        state.next_sequence = sequence + 1;
        if layout.human_path().exists() {
            fs::rename(layout.human_path(), &human_archive)?;
        }

        prune_archives(
            &layout.archive_dir,
            &layout.machine_archive_prefix(),
            self.settings.max_archives,
        )?;
        prune_archives(
            &layout.archive_dir,
            &layout.human_archive_prefix(),
            self.settings.max_archives,
        )?;

        state.files = Some(ActiveFiles::open(layout)?);
        tracing::info!(sequence, "event log rotated");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Failure reporting (secondary channel)
    // ═══════════════════════════════════════════════════════════════════════════

    fn mark_degraded(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
        self.degraded.store(true, Ordering::Relaxed);
    }

    fn report_write_failure(&self, err: &io::Error, entry: &LogEntry) {
        self.mark_degraded();
        tracing::warn!(
            target: "toolscope::fallback",
            error = %err,
            level = %entry.level,
            component = %entry.component,
            message = %entry.message,
            "event log write failed; entry kept only in this notice"
        );
    }

    fn report_rotation_failure(&self, err: &io::Error) {
        self.mark_degraded();
        tracing::warn!(
            target: "toolscope::fallback",
            error = %err,
            "event log rotation failed; will reopen on next write"
        );
    }

    fn report_open_failure(&self, err: &io::Error) {
        self.degraded.store(true, Ordering::Relaxed);
        tracing::warn!(
            target: "toolscope::fallback",
            error = %err,
            dir = %self.settings.layout.log_dir.display(),
            "event log could not be opened; will retry on next write"
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Reading
    // ═══════════════════════════════════════════════════════════════════════════

    /// Returns up to `n` most recent entries of the active machine sink whose
    /// level equals `level`, oldest first. Archives are not read and
    /// unparseable lines are skipped.
    ///
    /// The file is read backwards in chunks without taking the writer lock;
    /// an open handle keeps reading the same file even if it is rotated.
    ///
    /// # Errors
    /// Returns an error if the active file exists but cannot be read.
    pub fn tail(&self, n: usize, level: Option<LogLevel>) -> Result<Vec<LogEntry>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let file = match File::open(self.settings.layout.machine_path()) {
            Ok(file) => file,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(tail_entries(file, n, level)?)
    }

    /// Syncs both active files to disk.
    ///
    /// # Errors
    /// Returns the I/O error from `fsync`.
    pub fn flush(&self) -> Result<()> {
        let state = self.state.lock();
        if let Some(files) = state.files.as_ref() {
            files.sync()?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Status
    // ═══════════════════════════════════════════════════════════════════════════

    /// True when the files are open and the last write succeeded.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        !self.degraded.load(Ordering::Relaxed) && self.state.lock().files.is_some()
    }

    /// Entries that could not be written since the log was opened.
    #[must_use]
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Current size of the active machine sink.
    #[must_use]
    pub fn active_size(&self) -> u64 {
        self.state
            .lock()
            .files
            .as_ref()
            .map_or(0, |f| f.machine_bytes)
    }

    /// Machine archives on disk, oldest first.
    #[must_use]
    pub fn archives(&self) -> Vec<PathBuf> {
        let layout = &self.settings.layout;
        list_archives(&layout.archive_dir, &layout.machine_archive_prefix())
            .into_iter()
            .map(|(_, path)| path)
            .collect()
    }

    /// Human archives on disk, oldest first.
    #[must_use]
    pub fn human_archives(&self) -> Vec<PathBuf> {
        let layout = &self.settings.layout;
        list_archives(&layout.archive_dir, &layout.human_archive_prefix())
            .into_iter()
            .map(|(_, path)| path)
            .collect()
    }

    /// File layout.
    #[must_use]
    pub const fn layout(&self) -> &LogLayout {
        &self.settings.layout
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn sanitize_entry(mut entry: LogEntry) -> LogEntry {
    entry.component = sanitize(&entry.component).into_owned();
    entry.message = sanitize(&entry.message).into_owned();
    for value in entry.context.values_mut() {
        if let ContextValue::Str(s) = value {
            *s = sanitize(s).into_owned();
        }
    }
    entry
}

fn echo(entry: &LogEntry) {
    let component = entry.component.as_str();
    let message = entry.message.as_str();
    match entry.level {
        LogLevel::Debug => tracing::debug!(target: "toolscope", component, "{message}"),
        LogLevel::Info => tracing::info!(target: "toolscope", component, "{message}"),
        LogLevel::Warning => tracing::warn!(target: "toolscope", component, "{message}"),
        LogLevel::Error => tracing::error!(target: "toolscope", component, "{message}"),
    }
}

/// Archives with `prefix`, sorted by sequence.
fn list_archives(dir: &Path, prefix: &str) -> Vec<(u64, PathBuf)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut archives: Vec<(u64, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            LogLayout::parse_sequence(prefix, &name.to_string_lossy())
                .map(|seq| (seq, entry.path()))
        })
        .collect();
    archives.sort_by_key(|(seq, _)| *seq);
    archives
}

const TAIL_CHUNK: u64 = 64 * 1024;

/// Scans `file` from the end until `n` matching entries are found.
fn tail_entries(mut file: File, n: usize, level: Option<LogLevel>) -> io::Result<Vec<LogEntry>> {
    let mut pos = file.metadata()?.len();
    // Bytes before the first newline of the chunk read last; their line
    // starts further back in the file.
    let mut partial: Vec<u8> = Vec::new();
    let mut newest_first: Vec<LogEntry> = Vec::new();

    while pos > 0 && newest_first.len() < n {
        let start = pos.saturating_sub(TAIL_CHUNK);
        let mut chunk = vec![0; (pos - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut chunk)?;
        chunk.append(&mut partial);
        pos = start;

        let complete = if pos == 0 {
            &chunk[..]
        } else if let Some(first_newline) = chunk.iter().position(|&b| b == b'\n') {
            partial = chunk[..first_newline].to_vec();
            &chunk[first_newline + 1..]
        } else {
            partial = chunk;
            continue;
        };

        for line in complete.split(|&b| b == b'\n').rev() {
            let Ok(entry) = parse_log_entry(&String::from_utf8_lossy(line)) else {
                continue;
            };
            if level.is_some_and(|l| l != entry.level) {
                continue;
            }
            newest_first.push(entry);
            if newest_first.len() == n {
                break;
            }
        }
    }

    newest_first.reverse();
    Ok(newest_first)
}

fn highest_sequence(layout: &LogLayout) -> Option<u64> {
    let machine = list_archives(&layout.archive_dir, &layout.machine_archive_prefix());
    let human = list_archives(&layout.archive_dir, &layout.human_archive_prefix());
    machine.into_iter().chain(human).map(|(seq, _)| seq).max()
}

fn prune_archives(dir: &Path, prefix: &str, keep: usize) -> io::Result<()> {
    let archives = list_archives(dir, prefix);
    let excess = archives.len().saturating_sub(keep);
    for (seq, path) in archives.into_iter().take(excess) {
        fs::remove_file(&path)?;
        tracing::debug!(sequence = seq, path = %path.display(), "pruned archive");
    }
    Ok(())
}
