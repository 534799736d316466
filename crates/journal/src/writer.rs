use crate::{exit, CallerType, Entry, Level, Record};
use chrono::{DateTime, Local, NaiveDate};
use common::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};

/// Pending records the queue holds before submission blocks.
const QUEUE_CAPACITY: usize = 100;

type Clock = Box<dyn Fn() -> DateTime<Local> + Send + Sync>;

enum Submission {
    Record(Box<dyn Record>),
    Close {
        run_hooks: bool,
        done: oneshot::Sender<()>,
    },
}

/// Handle to the journal writer.
///
/// Cloning is cheap; all clones feed the same queue and the same pair of
/// log files. The files and the queue are owned exclusively by the
/// writer task.
#[derive(Clone)]
pub struct Logger {
    tx: mpsc::Sender<Submission>,
}

impl Logger {
    /// Open (or create) the log directory and start the writer task.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Logger, Error> {
        Self::spawn(dir.into(), Box::new(Local::now), true)
    }

    /// Like [`Logger::new`], with an injected wall clock. Rotation and
    /// record timestamps both consult it.
    pub fn with_clock<C>(dir: impl Into<PathBuf>, clock: C) -> Result<Logger, Error>
    where
        C: Fn() -> DateTime<Local> + Send + Sync + 'static,
    {
        Self::spawn(dir.into(), Box::new(clock), true)
    }

    fn spawn(dir: PathBuf, clock: Clock, exit_on_panic: bool) -> Result<Logger, Error> {
        std::fs::create_dir_all(&dir).map_err(|source| Error::LogFileExecuting {
            path: dir.display().to_string(),
            op: "open",
            source,
        })?;

        let opened_on = clock().date_naive();
        let (stdout, stderr) = open_files(&dir, opened_on)?;
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);

        let writer = Writer {
            dir,
            clock,
            opened_on,
            stdout,
            stderr,
            exit_on_panic,
        };
        tokio::spawn(writer.run(rx));

        Ok(Logger { tx })
    }

    /// Submit a record. Suspends while the queue is at capacity; after
    /// the writer has terminated, submission is a no-op.
    pub async fn log(&self, record: impl Record) {
        let _ = self.tx.send(Submission::Record(Box::new(record))).await;
    }

    /// Submit a record without suspending. Returns false when the queue
    /// is full or the writer is gone.
    pub fn try_log(&self, record: impl Record) -> bool {
        self.tx
            .try_send(Submission::Record(Box::new(record)))
            .is_ok()
    }

    /// Drain the queue and close the files, without running exit hooks
    /// or touching the process. For embedders and tests.
    pub async fn close(&self) {
        self.request_close(false).await
    }

    /// Drain the queue, run the registered exit hooks in registration
    /// order, and close the files.
    pub async fn shutdown(&self) {
        self.request_close(true).await
    }

    async fn request_close(&self, run_hooks: bool) {
        let (done, done_rx) = oneshot::channel();
        if self
            .tx
            .send(Submission::Close { run_hooks, done })
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
    }

    /// Listen for SIGINT, SIGTERM and SIGQUIT; on the first signal,
    /// drain the queue, run exit hooks, close the files and exit the
    /// process. The writer owns this handler; nothing else in the
    /// process should register one.
    pub fn spawn_signal_handler(&self) -> tokio::task::JoinHandle<()> {
        let logger = self.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut interrupt =
                signal(SignalKind::interrupt()).expect("SIGINT handler installs once");
            let mut terminate =
                signal(SignalKind::terminate()).expect("SIGTERM handler installs once");
            let mut quit = signal(SignalKind::quit()).expect("SIGQUIT handler installs once");

            let received = tokio::select! {
                _ = interrupt.recv() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
                _ = quit.recv() => "SIGQUIT",
            };

            logger
                .log(
                    Entry::new("os signal received")
                        .with_level(Level::Info)
                        .with_caller(CallerType::Internal)
                        .with_extra(received.into()),
                )
                .await;
            logger.shutdown().await;
            std::process::exit(0);
        })
    }
}

struct Writer {
    dir: PathBuf,
    clock: Clock,
    opened_on: NaiveDate,
    stdout: std::fs::File,
    stderr: std::fs::File,
    exit_on_panic: bool,
}

impl Writer {
    async fn run(mut self, mut rx: mpsc::Receiver<Submission>) {
        while let Some(submission) = rx.recv().await {
            match submission {
                Submission::Record(record) => {
                    if self.write_record(record.as_ref()) == Level::Panic {
                        self.drain(&mut rx);
                        if self.exit_on_panic {
                            std::process::exit(1);
                        }
                        return;
                    }
                }
                Submission::Close { run_hooks, done } => {
                    self.drain(&mut rx);
                    if run_hooks {
                        self.run_exit_hooks();
                    }
                    let _ = done.send(());
                    return;
                }
            }
        }
    }

    fn drain(&mut self, rx: &mut mpsc::Receiver<Submission>) {
        while let Ok(submission) = rx.try_recv() {
            match submission {
                Submission::Record(record) => {
                    let _ = self.write_record(record.as_ref());
                }
                // A racing closer; acknowledge so it doesn't hang.
                Submission::Close { done, .. } => {
                    let _ = done.send(());
                }
            }
        }
    }

    fn run_exit_hooks(&mut self) {
        for hook in exit::hooks() {
            if let Err(err) = hook() {
                let entry = Entry::new("exit function error")
                    .with_level(Level::Error)
                    .with_caller(CallerType::Internal)
                    .with_extra(err.to_string().into());
                let _ = self.write_record(&entry);
            }
        }
    }

    /// Write one record to the routed files, rotating first if the local
    /// calendar day changed. Returns the record's level.
    fn write_record(&mut self, record: &dyn Record) -> Level {
        self.rotate_if_needed();
        let now = (self.clock)();
        let level = record.level();

        match level {
            Level::Debug | Level::Info | Level::Warn => {
                let line = encode_line(now, level.as_str(), record);
                _ = self.stdout.write_all(&line); // Best-effort.
            }
            Level::Error => {
                let line = encode_line(now, level.as_str(), record);
                _ = self.stdout.write_all(&line);
                _ = self.stderr.write_all(&line);
            }
            Level::Panic => {
                // The stdout stream records the event at error level; the
                // stderr stream keeps the fatal marker.
                let line = encode_line(now, Level::Error.as_str(), record);
                _ = self.stdout.write_all(&line);
                let line = encode_line(now, Level::Panic.as_str(), record);
                _ = self.stderr.write_all(&line);
            }
        }
        level
    }

    fn rotate_if_needed(&mut self) {
        let today = (self.clock)().date_naive();
        if today == self.opened_on {
            return;
        }
        // Reopen failure keeps the current files.
        if let Ok((stdout, stderr)) = open_files(&self.dir, today) {
            self.stdout = stdout;
            self.stderr = stderr;
            self.opened_on = today;
        }
    }
}

fn open_files(dir: &Path, date: NaiveDate) -> Result<(std::fs::File, std::fs::File), Error> {
    let open = |name: String| {
        let path = dir.join(name);
        let mut options = std::fs::OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o755);
        }
        options.open(&path).map_err(|source| Error::LogFileExecuting {
            path: path.display().to_string(),
            op: "open",
            source,
        })
    };

    let day = date.format("%Y-%m-%d");
    Ok((
        open(format!("stdout_{day}.log"))?,
        open(format!("stderr_{day}.log"))?,
    ))
}

fn encode_line(now: DateTime<Local>, level: &str, record: &dyn Record) -> Vec<u8> {
    let mut map = record.encode_payload();
    map.insert(
        "time".to_string(),
        now.to_rfc3339_opts(chrono::SecondsFormat::Secs, false).into(),
    );
    map.insert("level".to_string(), level.into());
    map.insert("msg".to_string(), record.message().into());

    let mut line = serde_json::to_vec(&map).expect("record payload always serializes");
    line.push(b'\n');
    line
}
