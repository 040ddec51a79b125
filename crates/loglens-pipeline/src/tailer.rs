// Tailing producer
//
// One cycle: load offsets, walk the application_* directories, read
// each .log file from its stored offset, stitch multi-line entries and
// ship them to the broker in batches. Offsets only ever move forward,
// except when a file shrank (rotation) and the read restarts at 0.
//
// Offsets for a file are persisted only if every batch carrying that
// file's entries was published successfully; otherwise the tail is
// re-read next cycle and the entries go out again (at-least-once).

use crate::broker::LogProducer;
use crate::filestate::{FileStateError, FileStateManager};
use loglens_core::parser::{
    extract_application_id, HeaderParser, LogHeader, COMPONENT_ORPHAN, LEVEL_UNKNOWN,
};
use loglens_core::LogEntry;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum TailError {
    #[error("failed to read log directory {path}: {source}")]
    Discovery {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    State(#[from] FileStateError),

    #[error("cycle cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TailerConfig {
    /// Root directory containing application_* folders
    pub log_directory: PathBuf,
    /// Entries per broker batch
    pub batch_size: usize,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            log_directory: PathBuf::from("./logs"),
            batch_size: 100,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct CycleStats {
    pub files_processed: usize,
    pub lines_read: u64,
    pub entries_sent: u64,
    /// true when another cycle was already running and this one was a no-op
    pub skipped: bool,
}

pub struct LogTailer {
    parser: HeaderParser,
    producer: Arc<dyn LogProducer>,
    state: Arc<FileStateManager>,
    config: TailerConfig,
    cycle_lock: Mutex<()>,
}

/// In-flight entry while stitching continuation lines.
struct EntryBuilder {
    header: LogHeader,
    application: String,
    source_file: String,
    content: String,
    raw: String,
}

impl EntryBuilder {
    fn new(header: LogHeader, raw_line: &str, application: &str, source_file: &str) -> Self {
        Self {
            content: header.content.clone(),
            raw: raw_line.to_string(),
            header,
            application: application.to_string(),
            source_file: source_file.to_string(),
        }
    }

    fn append(&mut self, line: &str) {
        self.content.push('\n');
        self.content.push_str(line);
        self.raw.push('\n');
        self.raw.push_str(line);
    }

    fn finish(self) -> LogEntry {
        LogEntry {
            timestamp: self.header.timestamp,
            level: self.header.level,
            component: self.header.component,
            content: self.content,
            application: self.application,
            source_file: self.source_file,
            raw: self.raw,
        }
    }
}

/// What one file read produced.
struct FileRead {
    lines_read: u64,
    new_offset: u64,
    entries: Vec<LogEntry>,
    cancelled: bool,
}

impl LogTailer {
    pub fn new(
        config: TailerConfig,
        state: Arc<FileStateManager>,
        producer: Arc<dyn LogProducer>,
    ) -> Self {
        Self {
            parser: HeaderParser::new(),
            producer,
            state,
            config,
            cycle_lock: Mutex::new(()),
        }
    }

    /// One full tailing cycle. Single-flight: a second caller while a
    /// cycle runs gets a successful no-op.
    pub async fn process_logs(&self, cancel: &CancellationToken) -> Result<CycleStats, TailError> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!("Log processing already in progress, skipping run");
            return Ok(CycleStats {
                skipped: true,
                ..Default::default()
            });
        };

        info!("Starting log processing cycle");
        let started = Instant::now();

        let current_state = self.state.load().await?;
        let mut new_state = current_state.clone();

        let log_files = self.find_log_files().await?;
        debug!(file_count = log_files.len(), "Found log files to process");

        let mut stats = CycleStats::default();
        let mut pending: Vec<LogEntry> = Vec::new();
        let mut failed_files: HashSet<String> = HashSet::new();
        let mut was_cancelled = false;

        for file_path in &log_files {
            let key = file_path.to_string_lossy().to_string();
            let prior_offset = current_state.get(&key).copied().unwrap_or(0);

            match self.process_single_file(file_path, prior_offset, cancel).await {
                Ok(read) => {
                    // the offset advances even when the tail produced no
                    // complete entries, otherwise continuation-only tails
                    // would be re-read forever
                    new_state.insert(key, read.new_offset);
                    stats.files_processed += 1;
                    stats.lines_read += read.lines_read;

                    if !read.entries.is_empty() {
                        debug!(
                            file = %file_path.display(),
                            lines_read = read.lines_read,
                            entries_found = read.entries.len(),
                            "Processed file"
                        );
                        pending.extend(read.entries);

                        while pending.len() >= self.config.batch_size {
                            let batch: Vec<LogEntry> =
                                pending.drain(..self.config.batch_size).collect();
                            self.dispatch(batch, &mut failed_files, &mut stats).await;
                        }
                    }

                    if read.cancelled {
                        was_cancelled = true;
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, file = %file_path.display(), "Failed to process file");
                    // offset stays wherever it was
                    continue;
                }
            }
        }

        if !pending.is_empty() {
            self.dispatch(pending, &mut failed_files, &mut stats).await;
        }

        // a file whose entries rode a failed publish keeps its prior
        // offset so the tail is re-read (and re-sent) next cycle
        for file in &failed_files {
            match current_state.get(file) {
                Some(prior) => {
                    new_state.insert(file.clone(), *prior);
                }
                None => {
                    new_state.remove(file);
                }
            }
        }

        if let Err(e) = self.state.save(&new_state).await {
            error!(error = %e, "Failed to save final file state");
            return Err(e.into());
        }

        info!(
            lines_read = stats.lines_read,
            entries_sent = stats.entries_sent,
            files_processed = stats.files_processed,
            duration_ms = started.elapsed().as_millis() as u64,
            "Finished log processing cycle"
        );

        if was_cancelled {
            return Err(TailError::Cancelled);
        }
        Ok(stats)
    }

    async fn dispatch(
        &self,
        batch: Vec<LogEntry>,
        failed_files: &mut HashSet<String>,
        stats: &mut CycleStats,
    ) {
        if batch.is_empty() {
            return;
        }
        debug!(batch_size = batch.len(), "Sending batch to broker");
        match self.producer.publish(&batch).await {
            Ok(()) => {
                stats.entries_sent += batch.len() as u64;
            }
            Err(e) => {
                error!(error = %e, batch_size = batch.len(), "Failed to publish batch");
                failed_files.extend(batch.iter().map(|entry| entry.source_file.clone()));
            }
        }
    }

    /// Direct children of the log root named application*, and inside
    /// each their direct *.log children.
    async fn find_log_files(&self) -> Result<Vec<PathBuf>, TailError> {
        let root = &self.config.log_directory;
        let mut app_dirs = fs::read_dir(root).await.map_err(|e| TailError::Discovery {
            path: root.clone(),
            source: e,
        })?;

        let mut log_files = Vec::new();
        while let Ok(Some(dir_entry)) = app_dirs.next_entry().await {
            let path = dir_entry.path();
            let name = dir_entry.file_name();
            let name = name.to_string_lossy();

            let is_dir = dir_entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir || !name.starts_with("application") {
                continue;
            }

            let mut children = match fs::read_dir(&path).await {
                Ok(children) => children,
                Err(e) => {
                    warn!(error = %e, dir = %path.display(), "Failed to read application directory");
                    continue;
                }
            };

            while let Ok(Some(child)) = children.next_entry().await {
                let is_file = child
                    .file_type()
                    .await
                    .map(|t| t.is_file())
                    .unwrap_or(false);
                if is_file && child.file_name().to_string_lossy().ends_with(".log") {
                    log_files.push(child.path());
                }
            }
        }

        Ok(log_files)
    }

    async fn process_single_file(
        &self,
        path: &Path,
        last_offset: u64,
        cancel: &CancellationToken,
    ) -> Result<FileRead, std::io::Error> {
        let file = fs::File::open(path).await?;
        let meta = file.metadata().await?;
        let current_size = meta.len();

        let mut offset = last_offset;
        if current_size < offset {
            warn!(
                file = %path.display(),
                last_offset,
                current_size,
                "File truncated or rotated? Resetting offset"
            );
            offset = 0;
        }

        let mut reader = BufReader::new(file);
        reader.seek(std::io::SeekFrom::Start(offset)).await?;

        let application = extract_application_id(path);
        let source_file = path.to_string_lossy().to_string();

        let mut entries = Vec::new();
        let mut current: Option<EntryBuilder> = None;
        let mut lines_read = 0u64;
        let mut line = String::new();
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                info!(file = %path.display(), "Cancelled during file processing");
                cancelled = true;
                break;
            }

            line.clear();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                break;
            }
            let text = line.strip_suffix('\n').unwrap_or(&line);
            lines_read += 1;

            match self.parser.parse_header(text) {
                Some(header) => {
                    if let Some(builder) = current.take() {
                        entries.push(builder.finish());
                    }
                    current = Some(EntryBuilder::new(header, text, &application, &source_file));
                }
                None => match current.as_mut() {
                    Some(builder) => builder.append(text),
                    None => {
                        warn!(file = %path.display(), line = %text, "Orphan continuation line detected");
                        entries.push(LogEntry {
                            timestamp: chrono::Utc::now(),
                            level: LEVEL_UNKNOWN.to_string(),
                            component: COMPONENT_ORPHAN.to_string(),
                            content: text.to_string(),
                            application: application.clone(),
                            source_file: source_file.clone(),
                            raw: text.to_string(),
                        });
                    }
                },
            }

            // the stripped newline counts too
            offset += text.len() as u64 + 1;
        }

        if let Some(builder) = current.take() {
            entries.push(builder.finish());
        }

        debug!(
            file = %path.display(),
            lines_read,
            entries_created = entries.len(),
            "Finished processing file"
        );

        Ok(FileRead {
            lines_read,
            new_offset: offset,
            entries,
            cancelled,
        })
    }
}
