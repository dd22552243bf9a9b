//! Pipe Stage: bridges TS in/out of a child process's stdio, with
//! backpressure that drops-and-counts rather than queueing unbounded,
//! and an auto-restart/backoff state machine. Modeled directly on the
//! `pipe_generic` module this crate replaces (`on_child_restart`,
//! `on_child_close`, `on_upstream_ts`, `on_child_ready`).

pub mod process;
pub mod sync;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::config::PipeConfig;
use crate::constants::TS_PACKET_SIZE;
use crate::packet::TsPacket;
use process::ChildProcess;
use sync::{FifoSyncBuffer, SyncBuffer};

/// Lifecycle state of a [`PipeHandle`]'s underlying child process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipeLifecycle {
    Spawning,
    Running,
    Backoff,
    Terminated,
}

/// A cheaply-cloneable handle to a running pipe supervisor. The
/// supervisor itself runs as a detached task; this handle only holds the
/// channels and shared counters needed to feed it input and observe its
/// state.
#[derive(Clone)]
pub struct PipeHandle {
    ts_tx: mpsc::Sender<TsPacket>,
    text_tx: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
    pid: Arc<AtomicI64>,
    ts_input: bool,
}

impl PipeHandle {
    /// Forwards one TS packet to the child's stdin. If the child isn't
    /// keeping up, the packet is dropped and counted rather than queued.
    pub fn send_ts(&self, pkt: TsPacket) {
        if self.ts_tx.try_send(pkt).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Sends a line of text to the child's stdin. Rejected when this pipe
    /// is configured for TS input (`ts_input = true` in [`PipeConfig`]),
    /// matching the original's "can't send text while in TS mode" check.
    pub fn send_text(&self, text: impl Into<String>) -> anyhow::Result<()> {
        if self.ts_input {
            anyhow::bail!("pipe: can't send text while in TS mode");
        }
        self.text_tx
            .try_send(text.into())
            .map_err(|_| anyhow::anyhow!("pipe: process is not running"))
    }

    /// The child's OS pid, or `None` if not currently running.
    pub fn pid(&self) -> Option<u32> {
        let v = self.pid.load(Ordering::Relaxed);
        if v < 0 {
            None
        } else {
            Some(v as u32)
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Spawns the pipe supervisor as a background task and returns a handle
/// to it. TS read from the child's stdout (when `config.stream` is set)
/// is forwarded to `downstream`.
pub fn spawn(config: PipeConfig, downstream: mpsc::Sender<TsPacket>) -> anyhow::Result<PipeHandle> {
    config.validate()?;

    let (ts_tx, ts_rx) = mpsc::channel(4096);
    let (text_tx, text_rx) = mpsc::channel(64);
    let dropped = Arc::new(AtomicU64::new(0));
    let pid = Arc::new(AtomicI64::new(-1));

    let handle = PipeHandle {
        ts_tx,
        text_tx,
        dropped: dropped.clone(),
        pid: pid.clone(),
        ts_input: config.ts_input,
    };

    tokio::spawn(supervisor_loop(config, downstream, ts_rx, text_rx, dropped, pid));

    Ok(handle)
}

async fn supervisor_loop(
    config: PipeConfig,
    downstream: mpsc::Sender<TsPacket>,
    mut ts_rx: mpsc::Receiver<TsPacket>,
    mut text_rx: mpsc::Receiver<String>,
    dropped: Arc<AtomicU64>,
    pid: Arc<AtomicI64>,
) {
    let mut sync_buf = if config.sync {
        Some(FifoSyncBuffer::new(4096))
    } else {
        None
    };
    let sync_ration_size = sync_buf.as_ref().map(|b| b.max_size() / 2).unwrap_or(0);

    loop {
        match ChildProcess::spawn(&config.command) {
            Ok(mut child) => {
                let child_pid = child.pid();
                pid.store(child_pid.map(|p| p as i64).unwrap_or(-1), Ordering::Relaxed);
                tracing::info!(pipe = %config.name, pid = ?child_pid, "process started");

                let exit_code = run_session(
                    &config,
                    &mut child,
                    &downstream,
                    &mut ts_rx,
                    &mut text_rx,
                    sync_buf.as_mut(),
                    sync_ration_size,
                    &dropped,
                )
                .await;

                pid.store(-1, Ordering::Relaxed);
                if let Some(buf) = sync_buf.as_mut() {
                    buf.reset();
                }

                match exit_code {
                    Some(0) => tracing::info!(pipe = %config.name, "process exited successfully"),
                    Some(code) => tracing::error!(pipe = %config.name, code, "process exited with error"),
                    None => tracing::error!(pipe = %config.name, "failed to terminate process"),
                }
            }
            Err(err) => {
                tracing::error!(pipe = %config.name, error = %err, "failed to create process");
            }
        }

        if config.restart == 0 {
            tracing::info!(pipe = %config.name, "auto restart disabled, giving up");
            return;
        }

        tracing::info!(pipe = %config.name, seconds = config.restart, "retrying");
        sleep(Duration::from_secs(config.restart as u64)).await;
    }
}

/// Drives one child process instance from spawn to exit. Returns the
/// exit code, or `None` if the process could not be waited on.
async fn run_session(
    config: &PipeConfig,
    child: &mut ChildProcess,
    downstream: &mpsc::Sender<TsPacket>,
    ts_rx: &mut mpsc::Receiver<TsPacket>,
    text_rx: &mut mpsc::Receiver<String>,
    mut sync_buf: Option<&mut FifoSyncBuffer>,
    sync_ration_size: usize,
    dropped: &Arc<AtomicU64>,
) -> Option<i32> {
    let mut stdin = child.take_stdin();
    let stdout = child.take_stdout();
    let stderr = child.take_stderr();

    let mut stdout_reader = stdout;
    let mut stderr_lines = stderr.map(|s| BufReader::new(s).lines());

    let mut sync_feed: i64 = sync_ration_size as i64;
    let mut reading_stdout = true;
    let mut ts_buf = [0u8; TS_PACKET_SIZE];

    loop {
        tokio::select! {
            biased;

            exit = child.child.wait() => {
                return exit.ok().and_then(|status| status.code());
            }

            Some(pkt) = ts_rx.recv() => {
                if let Some(stdin) = stdin.as_mut() {
                    if stdin.write_all(&pkt).await.is_err() {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                } else {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            }

            Some(text) = text_rx.recv() => {
                if let Some(stdin) = stdin.as_mut() {
                    let _ = stdin.write_all(text.as_bytes()).await;
                    let _ = stdin.write_all(b"\n").await;
                }
            }

            Some(Ok(line)) = async {
                match stderr_lines.as_mut() {
                    Some(lines) => lines.next_line().await.transpose(),
                    None => None,
                }
            } => {
                tracing::warn!(pipe = %config.name, "{line}");
            }

            result = async {
                if reading_stdout && config.stream {
                    match stdout_reader.as_mut() {
                        Some(reader) => Some(reader.read_exact(&mut ts_buf).await),
                        None => None,
                    }
                } else {
                    std::future::pending().await
                }
            }, if reading_stdout && config.stream => {
                match result {
                    Some(Ok(_)) => {
                        if let Some(buf) = sync_buf.as_deref_mut() {
                            if !buf.push(&[ts_buf]) {
                                tracing::error!(pipe = %config.name, "sync push failed, resetting buffer");
                                buf.reset();
                            } else if sync_ration_size > 0 {
                                sync_feed -= 1;
                                if sync_feed <= 0 {
                                    reading_stdout = false;
                                }
                            }
                        } else if downstream.send(ts_buf).await.is_err() {
                            return None;
                        }
                    }
                    Some(Err(_)) | None => return None,
                }
            }

            _ = tick(sync_buf.is_some()) => {
                if let Some(buf) = sync_buf.as_deref_mut() {
                    for pkt in buf.tick() {
                        if downstream.send(pkt).await.is_err() {
                            return None;
                        }
                    }
                    if !reading_stdout {
                        reading_stdout = true;
                        sync_feed = sync_ration_size as i64;
                    }
                }
            }
        }
    }
}

async fn tick(enabled: bool) {
    if enabled {
        sleep(Duration::from_millis(1)).await;
    } else {
        std::future::pending::<()>().await;
    }
}
