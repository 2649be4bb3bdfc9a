//! TokioProcessSpawner - real OS processes via `tokio::process`.
//!
//! Per child, three background tasks:
//! - one pump per output pipe, forwarding chunks as `Output` events
//! - one stdin feeder draining an unbounded queue, so writes never block the loop
//! - one reaper that waits for exit, lets the pumps drain, then sends `Exit`

use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::{ChildStream, ExitReport, LifecycleError, ProcessName, RunId, SpawnError};
use crate::ports::{
    ChildEvent, ChildEventKind, ChildEventSender, ChildHandle, ProcessSpawner, SpawnRequest,
};

const READ_CHUNK: usize = 8 * 1024;

/// After the child is reaped, how long the pumps may keep draining.
/// Grandchildren holding the pipes open must not delay the exit report forever.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessSpawner;

impl TokioProcessSpawner {
    pub fn new() -> Self {
        Self
    }
}

fn build_command(request: &SpawnRequest) -> Command {
    let mut cmd = if request.shell {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(request.shell_line());
        cmd
    } else {
        let mut cmd = Command::new(&request.path);
        cmd.args(&request.args);
        cmd
    };

    if let Some(cwd) = &request.cwd {
        cmd.current_dir(cwd);
    }
    if let Some(env) = &request.env {
        cmd.env_clear();
        cmd.envs(env);
    }
    if let Some(uid) = request.uid {
        cmd.uid(uid);
    }
    if let Some(gid) = request.gid {
        cmd.gid(gid);
    }

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Tags events with the process/run they belong to.
#[derive(Clone)]
struct EventTx {
    process: ProcessName,
    run: RunId,
    tx: ChildEventSender,
}

impl EventTx {
    /// Returns `false` once the supervisor stopped listening.
    async fn send(&self, kind: ChildEventKind) -> bool {
        self.tx
            .send(ChildEvent {
                process: self.process.clone(),
                run: self.run,
                kind,
            })
            .await
            .is_ok()
    }
}

impl ProcessSpawner for TokioProcessSpawner {
    fn spawn(
        &self,
        request: SpawnRequest,
        events: ChildEventSender,
    ) -> Result<Box<dyn ChildHandle>, SpawnError> {
        let mut child = build_command(&request)
            .spawn()
            .map_err(|source| SpawnError::Io {
                path: request.path.clone(),
                source,
            })?;

        let Some(pid) = child.id() else {
            return Err(SpawnError::NoPid { path: request.path });
        };

        let tx = EventTx {
            process: request.name,
            run: request.run,
            tx: events,
        };

        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        if let Some(stdin) = child.stdin.take() {
            tokio::spawn(feed_stdin(stdin, stdin_rx, tx.clone()));
        }

        let stdout = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(pump(pipe, ChildStream::Stdout, tx.clone())));
        let stderr = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(pump(pipe, ChildStream::Stderr, tx.clone())));

        tokio::spawn(async move {
            let report = match child.wait().await {
                Ok(status) => ExitReport {
                    code: status.code(),
                    signal: status.signal().map(signal_name),
                },
                Err(e) => {
                    tx.send(ChildEventKind::Error(format!("wait: {e}"))).await;
                    ExitReport::default()
                }
            };

            let drained = tokio::time::timeout(PIPE_DRAIN_GRACE, async {
                for pump in [stdout, stderr].into_iter().flatten() {
                    let _ = pump.await;
                }
            })
            .await;
            if drained.is_err() {
                debug!(process = %tx.process, "output pipes still open after exit");
            }

            tx.send(ChildEventKind::Exit(report)).await;
        });

        Ok(Box::new(TokioChild {
            pid,
            stdin: Some(stdin_tx),
        }))
    }
}

async fn pump<R>(mut pipe: R, stream: ChildStream, tx: EventTx)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let event = ChildEventKind::Output {
                    stream,
                    data: buf[..n].to_vec(),
                };
                if !tx.send(event).await {
                    break;
                }
            }
            Err(e) => {
                tx.send(ChildEventKind::Error(format!("{}: {e}", stream.descriptor())))
                    .await;
                break;
            }
        }
    }
}

async fn feed_stdin(
    mut stdin: ChildStdin,
    mut queue: mpsc::UnboundedReceiver<Vec<u8>>,
    tx: EventTx,
) {
    while let Some(chunk) = queue.recv().await {
        let written = async {
            stdin.write_all(&chunk).await?;
            stdin.flush().await
        };
        if let Err(e) = written.await {
            tx.send(ChildEventKind::Error(format!("stdin: {e}"))).await;
            return;
        }
    }
    // Queue closed: dropping `stdin` delivers end-of-input to the child.
}

fn signal_name(raw: i32) -> String {
    Signal::try_from(raw)
        .map(|sig| sig.as_str().to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Accepts `SIGTERM` style names and plain numbers.
fn parse_signal(raw: &str) -> Result<Signal, String> {
    if let Ok(number) = raw.trim().parse::<i32>() {
        return Signal::try_from(number).map_err(|e| e.to_string());
    }
    Signal::from_str(raw.trim()).map_err(|e| e.to_string())
}

struct TokioChild {
    pid: u32,
    stdin: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl ChildHandle for TokioChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn write_stdin(&mut self, data: Vec<u8>) -> Result<(), LifecycleError> {
        let stdin = self.stdin.as_ref().ok_or(LifecycleError::StdinClosed)?;
        stdin.send(data).map_err(|_| LifecycleError::StdinClosed)
    }

    fn close_stdin(&mut self) {
        self.stdin = None;
    }

    fn signal(&self, signal: &str) -> Result<(), LifecycleError> {
        let failed = |reason: String| LifecycleError::SignalFailed {
            signal: signal.to_string(),
            reason,
        };
        let sig = parse_signal(signal).map_err(failed)?;
        let pid = i32::try_from(self.pid).map_err(|e| failed(e.to_string()))?;
        kill(Pid::from_raw(pid), sig).map_err(|e| failed(e.to_string()))
    }
}
