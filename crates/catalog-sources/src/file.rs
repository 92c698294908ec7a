//! Tail of a single plain-text log file.
//!
//! Opens at the current end of the file, then returns at most
//! `max_lines` complete lines per poll. A partial line at EOF is held until
//! its newline arrives. Rotation (inode change) and truncation (file shorter
//! than the read position) restart reading at offset 0 of the new content.
//! Polls read on the blocking pool; the open file travels with the read and
//! comes back with its lines.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use catalog_core::{Fragment, SourceKey, StreamRecorder};

use crate::stream::{LogStream, PollOutcome, StreamError, StreamEvent};

/// Lines read per poll at most.
pub const DEFAULT_MAX_LINES: usize = 100;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct FileTailStream {
    path: PathBuf,
    /// `None` only while a read is out on the blocking pool, or after that
    /// read's worker died.
    tail: Option<Tail>,
    max_lines: usize,
    interval: Duration,
    recorder: StreamRecorder,
}

/// Open file plus read position.
#[derive(Debug)]
struct Tail {
    reader: BufReader<File>,
    /// Byte offset of the next unread byte.
    position: u64,
    inode: u64,
    incomplete: Vec<u8>,
}

impl FileTailStream {
    /// Open `path` positioned at its current end.
    pub fn open(path: impl Into<PathBuf>, recorder: StreamRecorder) -> io::Result<Self> {
        let path = path.into();
        let tail = Tail::open_at_end(&path)?;
        Ok(Self {
            path,
            tail: Some(tail),
            max_lines: DEFAULT_MAX_LINES,
            interval: DEFAULT_INTERVAL,
            recorder,
        })
    }

    #[must_use]
    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines.max(1);
        self
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read up to `max_lines` complete lines from the current position.
    /// Blocks on the file.
    pub fn read_lines(&mut self) -> io::Result<(Vec<String>, Vec<StreamEvent>)> {
        let mut tail = match self.tail.take() {
            Some(tail) => tail,
            None => Tail::open_at_end(&self.path)?,
        };
        let read = tail.read_lines(&self.path, self.max_lines);
        self.tail = Some(tail);
        read
    }
}

impl Tail {
    fn open_at_end(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let position = file.seek(SeekFrom::End(0))?;
        let inode = inode_of(&file.metadata()?);
        Ok(Self {
            reader: BufReader::new(file),
            position,
            inode,
            incomplete: Vec::new(),
        })
    }

    /// Lines that are not valid UTF-8 are decoded lossily. An IO error after
    /// some lines were read ends the read early and keeps those lines; the
    /// error surfaces on the next read.
    fn read_lines(&mut self, path: &Path, max_lines: usize) -> io::Result<(Vec<String>, Vec<StreamEvent>)> {
        let mut events = Vec::new();
        if let Some(event) = self.check_replaced(path)? {
            events.push(event);
        }

        let mut lines = Vec::new();
        let mut buf = Vec::new();
        while lines.len() < max_lines {
            buf.clear();
            let n = match self.reader.read_until(b'\n', &mut buf) {
                Ok(n) => n,
                Err(e) if lines.is_empty() => return Err(e),
                Err(_) => break,
            };
            if n == 0 {
                break;
            }
            self.position += n as u64;
            if buf.ends_with(b"\n") {
                let mut line = std::mem::take(&mut self.incomplete);
                line.extend_from_slice(&buf);
                lines.push(decode_line(&line));
            } else {
                // Partial line at EOF; completed by a later poll.
                self.incomplete.extend_from_slice(&buf);
                break;
            }
        }
        Ok((lines, events))
    }

    /// Detect rotation or truncation of the watched path and reposition.
    ///
    /// A missing path (rotated away, not yet recreated) keeps reading the
    /// already open file.
    fn check_replaced(&mut self, path: &Path) -> io::Result<Option<StreamEvent>> {
        let Ok(meta) = fs::metadata(path) else {
            return Ok(None);
        };
        let inode = inode_of(&meta);
        if inode != self.inode {
            let file = File::open(path)?;
            self.reader = BufReader::new(file);
            self.inode = inode;
            self.reset_position();
            return Ok(Some(StreamEvent::Rotated));
        }
        if meta.len() < self.position {
            self.reader.seek(SeekFrom::Start(0))?;
            self.reset_position();
            return Ok(Some(StreamEvent::Truncated));
        }
        Ok(None)
    }

    fn reset_position(&mut self) {
        self.position = 0;
        self.incomplete.clear();
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

impl LogStream for FileTailStream {
    fn key(&self) -> &SourceKey {
        self.recorder.key()
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn poll(&mut self) -> Result<PollOutcome, StreamError> {
        let tail = self.tail.take();
        let path = self.path.clone();
        let max_lines = self.max_lines;
        let (tail, read) = tokio::task::spawn_blocking(move || {
            let mut tail = match tail {
                Some(tail) => tail,
                None => match Tail::open_at_end(&path) {
                    Ok(tail) => tail,
                    Err(e) => return (None, Err(e)),
                },
            };
            let read = tail.read_lines(&path, max_lines);
            (Some(tail), read)
        })
        .await?;
        self.tail = tail;

        let (lines, events) = read?;
        let recorded = lines.len();
        self.recorder.record(Fragment::new(lines));
        let mut outcome = PollOutcome::recorded(recorded);
        outcome.events = events;
        Ok(outcome)
    }
}

fn inode_of(meta: &fs::Metadata) -> u64 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        meta.ino()
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        0
    }
}
