// src/exec/shell.rs

//! Production process backend.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::exec::backend::{
    LaunchSpec, OutputLine, OutputMessage, ProcessBackend, ProcessControl, SpawnedProcess,
};
use crate::types::{ExitOutcome, LogStream};

const OUTPUT_CHANNEL_CAPACITY: usize = 1024;

/// Runs command lines through the platform shell (`sh -c` / `cmd /C`).
///
/// On Unix each command gets its own process group so stopping it also
/// reaches the processes the shell started.
#[derive(Debug, Clone, Default)]
pub struct ShellBackend;

impl ShellBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessBackend for ShellBackend {
    fn spawn(&self, spec: &LaunchSpec) -> io::Result<SpawnedProcess> {
        info!(
            command = %spec.command_id,
            cmd = %spec.command_line,
            dir = %spec.working_dir.display(),
            "starting command process"
        );

        let mut cmd = shell_command(&spec.command_line);
        cmd.current_dir(&spec.working_dir)
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn()?;
        let pid = child.id();

        let (tx, output) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, LogStream::Stdout, tx.clone(), spec.command_id.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, LogStream::Stderr, tx.clone(), spec.command_id.clone());
        }
        drop(tx);

        let (kill_tx, kill_rx) = mpsc::unbounded_channel();
        let exited = Arc::new(AtomicBool::new(false));
        let control = Arc::new(ShellControl {
            pid,
            exited: exited.clone(),
            kill_tx,
        });

        let exit = Box::pin(wait_exit(child, kill_rx, exited, spec.command_id.clone()));

        Ok(SpawnedProcess {
            pid,
            output,
            exit,
            control,
        })
    }
}

fn shell_command(line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(line);
        c
    }
}

async fn wait_exit(
    child: Child,
    kill_rx: mpsc::UnboundedReceiver<()>,
    exited: Arc<AtomicBool>,
    command_id: String,
) -> io::Result<ExitOutcome> {
    let status = wait_child(child, kill_rx).await;
    exited.store(true, Ordering::SeqCst);
    let outcome = exit_outcome(status?);
    info!(command = %command_id, ?outcome, "command process exited");
    Ok(outcome)
}

async fn wait_child(
    mut child: Child,
    mut kill_rx: mpsc::UnboundedReceiver<()>,
) -> io::Result<ExitStatus> {
    loop {
        tokio::select! {
            status = child.wait() => return status,
            Some(()) = kill_rx.recv() => {
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "start_kill on child failed");
                }
            }
        }
    }
}

fn exit_outcome(status: ExitStatus) -> ExitOutcome {
    match status.code() {
        Some(code) => ExitOutcome::Exited(code),
        None => ExitOutcome::Signalled,
    }
}

fn spawn_line_reader<R>(
    reader: R,
    stream: LogStream,
    tx: mpsc::Sender<OutputMessage>,
    command_id: String,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = decode_line(&buf);
                    if tx.send(Ok(OutputLine { stream, line })).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(command = %command_id, ?stream, error = %e, "reading process output failed");
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
        debug!(command = %command_id, ?stream, "output stream closed");
    });
}

/// Lossy UTF-8 with trailing `\n` / `\r\n` removed.
pub fn decode_line(bytes: &[u8]) -> String {
    let mut end = bytes.len();
    while end > 0 && matches!(bytes[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[derive(Debug)]
struct ShellControl {
    pid: Option<u32>,
    exited: Arc<AtomicBool>,
    kill_tx: mpsc::UnboundedSender<()>,
}

impl ShellControl {
    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        // The group outlives its leader while any member is alive, so it is
        // signalled even after the shell was reaped.
        let Some(pid) = self.pid else {
            return Ok(());
        };
        match killpg(Pid::from_raw(pid as i32), signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::from(e)),
        }
    }
}

impl ProcessControl for ShellControl {
    #[cfg(unix)]
    fn terminate(&self) -> io::Result<()> {
        debug!(pid = ?self.pid, "sending SIGTERM to process group");
        self.signal_group(nix::sys::signal::Signal::SIGTERM)
    }

    #[cfg(not(unix))]
    fn terminate(&self) -> io::Result<()> {
        self.kill()
    }

    fn kill(&self) -> io::Result<()> {
        #[cfg(unix)]
        {
            debug!(pid = ?self.pid, "sending SIGKILL to process group");
            self.signal_group(nix::sys::signal::Signal::SIGKILL)?;
        }
        if !self.has_exited() {
            // The waiter may already be gone; nothing left to kill then.
            let _ = self.kill_tx.send(());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_strips_terminators_and_replaces_invalid_bytes() {
        assert_eq!(decode_line(b"hello\n"), "hello");
        assert_eq!(decode_line(b"windows\r\n"), "windows");
        assert_eq!(decode_line(b"no newline"), "no newline");
        assert_eq!(decode_line(b"\n"), "");
        assert_eq!(decode_line(b"bad \xff byte\n"), "bad \u{fffd} byte");
    }

    #[test]
    fn exit_codes_map_to_outcomes() {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            assert_eq!(exit_outcome(ExitStatus::from_raw(0)), ExitOutcome::Exited(0));
            assert_eq!(exit_outcome(ExitStatus::from_raw(3 << 8)), ExitOutcome::Exited(3));
            assert_eq!(exit_outcome(ExitStatus::from_raw(9)), ExitOutcome::Signalled);
        }
    }
}
