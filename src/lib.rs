#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/", "README.md"))]

use std::{
    fs::{File, OpenOptions},
    io::ErrorKind,
    net::{TcpStream, ToSocketAddrs},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use chrono::Local;
use tracing::{error, info, warn};

pub mod record;

pub use record::SampleRecord;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("network timeout")]
    Timeout,
    #[error("short frame: got {got} of {expected} bytes")]
    ShortFrame { got: usize, expected: usize },
    #[error("invalid address: {0}")]
    Addr(String),
}

pub const DEFAULT_PORT: u16 = 5510;

const TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

pub mod protocol {
    //! Client half of the acquisition protocol.
    //!
    //! The client sends the sampling request as bare ASCII decimal digits,
    //! then the server streams back fixed-size binary frames until it closes
    //! the connection. There is no framing beyond the fixed record size and
    //! no end-of-stream message.

    use std::io::{ErrorKind, Read, Write};

    use crate::record::SampleRecord;
    use crate::Error;

    /// Writes the sampling request, the sole outbound message on a
    /// connection.
    pub fn write_request<W>(mut stream: W, samples: u32) -> Result<(), Error>
    where
        W: Write,
    {
        stream.write_all(samples.to_string().as_bytes())?;
        Ok(())
    }

    /// Reads exactly one record, looping over short reads until the frame
    /// is full.
    ///
    /// Returns `Ok(None)` on a clean end of stream before the first byte.
    /// An end of stream in the middle of a frame is reported as
    /// [`Error::ShortFrame`]; the partial data is never decoded. A read
    /// timeout on the socket surfaces as [`Error::Timeout`].
    pub fn read_record<R>(mut stream: R) -> Result<Option<SampleRecord>, Error>
    where
        R: Read,
    {
        let mut buf = [0u8; SampleRecord::WIRE_SIZE];
        let mut filled = 0;
        while filled < buf.len() {
            match stream.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(Error::ShortFrame {
                        got: filled,
                        expected: buf.len(),
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(Error::Timeout)
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Some(SampleRecord::decode(&buf)))
    }
}

/// When the log file is opened and synced relative to each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Open, append one block, close. Every record is durable on its own
    /// and no handle outlives the write.
    #[default]
    OpenPerRecord,
    /// Open once, keep the handle, sync after each block. The handle is
    /// dropped on a write error so the next append reopens.
    KeepOpen,
}

/// Append-only writer for rendered log blocks.
pub struct LogSink {
    path: PathBuf,
    policy: SyncPolicy,
    file: Option<File>,
}

impl LogSink {
    pub fn new<P: Into<PathBuf>>(path: P, policy: SyncPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
            file: None,
        }
    }

    fn open(path: &Path) -> std::io::Result<File> {
        OpenOptions::new().append(true).create(true).open(path)
    }

    /// Appends one block. A failure affects only this record; the sink
    /// stays usable for the next append.
    pub fn append(&mut self, record: &SampleRecord, timestamp: &str) -> Result<(), Error> {
        match self.policy {
            SyncPolicy::OpenPerRecord => {
                let mut file = Self::open(&self.path)?;
                record.write_block(&mut file, timestamp)?;
            }
            SyncPolicy::KeepOpen => {
                if self.file.is_none() {
                    self.file = Some(Self::open(&self.path)?);
                }
                if let Some(file) = self.file.as_mut() {
                    let written = record
                        .write_block(&mut *file, timestamp)
                        .and_then(|()| file.sync_data());
                    if let Err(e) = written {
                        self.file = None;
                        return Err(e.into());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Counters for one acquisition run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AcqStats {
    /// Records received and decoded.
    pub received: u64,
    /// Records appended to the log file.
    pub logged: u64,
    /// Records received but dropped on a log write failure.
    pub dropped: u64,
}

/// Bounded exponential backoff for [`TelemetryLogger::run_supervised`].
///
/// The default is no retries, matching single-shot acquisition.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Telemetry acquisition client.
///
/// Holds the immutable connection target and the acquisition policies; no
/// I/O happens until [`run`](Self::run).
pub struct TelemetryLogger {
    host: String,
    port: u16,
    log_path: PathBuf,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    sync_policy: SyncPolicy,
}

impl TelemetryLogger {
    pub fn new(host: impl Into<String>, port: u16, log_path: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            port,
            log_path: log_path.into(),
            connect_timeout: None,
            read_timeout: None,
            sync_policy: SyncPolicy::default(),
        }
    }

    /// Bounds the TCP connect. Without it the connect blocks indefinitely.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Bounds each receive. Without it a silent server stalls the run
    /// indefinitely; with it the run fails with [`Error::Timeout`], which
    /// the supervisor treats like any other retryable failure.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    fn connect(&self) -> Result<TcpStream, Error> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Addr(format!("{}:{}", self.host, self.port)))?;
        let stream = match self.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
                if e.kind() == ErrorKind::TimedOut {
                    Error::Timeout
                } else {
                    Error::Io(e)
                }
            })?,
            None => TcpStream::connect(addr)?,
        };
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.read_timeout)?;
        Ok(stream)
    }

    /// One acquisition pass: connect, send the sampling request, then
    /// receive and log records until the server closes the connection.
    ///
    /// Orderly closure by the server (including a trailing partial frame)
    /// ends the run normally with the accumulated [`AcqStats`]. Connect,
    /// send and receive failures are terminal for the run and returned to
    /// the caller; a log write failure drops only that record's entry and
    /// the loop keeps receiving.
    pub fn run(&self, samples: u32) -> Result<AcqStats, Error> {
        let mut stream = match self.connect() {
            Ok(stream) => stream,
            Err(error) => {
                error!(?error, host = %self.host, port = self.port, "error connecting to server");
                return Err(error);
            }
        };
        if let Err(error) = protocol::write_request(&mut stream, samples) {
            error!(?error, "error sending request to server");
            return Err(error);
        }
        info!(host = %self.host, port = self.port, samples, "connected, receiving");
        let mut sink = LogSink::new(&self.log_path, self.sync_policy);
        let mut stats = AcqStats::default();
        loop {
            match protocol::read_record(&mut stream) {
                Ok(Some(record)) => {
                    stats.received += 1;
                    let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
                    match sink.append(&record, &timestamp) {
                        Ok(()) => stats.logged += 1,
                        Err(error) => {
                            stats.dropped += 1;
                            error!(?error, path = ?self.log_path, "unable to write log block");
                        }
                    }
                }
                Ok(None) => {
                    info!("connection closed by server");
                    break;
                }
                Err(Error::ShortFrame { got, expected }) => {
                    warn!(got, expected, "partial record before close, discarding");
                    break;
                }
                Err(error) => {
                    error!(?error, "error receiving data from server");
                    return Err(error);
                }
            }
        }
        Ok(stats)
    }

    /// Runs acquisition under a supervising retry loop.
    ///
    /// A run that ends with orderly closure returns its stats; a failed run
    /// is retried after a backoff that doubles up to `max_backoff`, until
    /// `max_retries` consecutive failures, when the last error is returned.
    /// Retry policy lives here, outside the protocol logic.
    pub fn run_supervised(&self, samples: u32, retry: &RetryPolicy) -> Result<AcqStats, Error> {
        let mut backoff = retry.initial_backoff;
        let mut failures = 0;
        loop {
            match self.run(samples) {
                Ok(stats) => return Ok(stats),
                Err(error) => {
                    failures += 1;
                    if failures > retry.max_retries {
                        return Err(error);
                    }
                    warn!(?error, attempt = failures, ?backoff, "acquisition failed, retrying");
                    thread::sleep(backoff);
                    backoff = (backoff * 2).min(retry.max_backoff);
                }
            }
        }
    }
}
