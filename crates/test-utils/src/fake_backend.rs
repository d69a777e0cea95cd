use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use gomander::exec::{
    LaunchSpec, OutputLine, OutputMessage, ProcessBackend, ProcessControl, SpawnedProcess,
};
use gomander::types::{CommandId, ExitOutcome, LogStream};

/// How a scripted process ends once its output was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptedExit {
    /// Exit on its own with this code.
    Code(i32),
    /// Run until terminated or killed (a server).
    #[default]
    UntilStopped,
    /// Ignore SIGTERM; only a kill ends it.
    IgnoreTerm,
    /// Report a read error on its output, then run until killed.
    ReadError,
}

/// Scripted behaviour for one command.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub exit: ScriptedExit,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdout(mut self, line: &str) -> Self {
        self.stdout.push(line.to_string());
        self
    }

    pub fn stderr(mut self, line: &str) -> Self {
        self.stderr.push(line.to_string());
        self
    }

    pub fn exit(mut self, exit: ScriptedExit) -> Self {
        self.exit = exit;
        self
    }
}

/// Signals observed by fake processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeSignal {
    Terminate,
    Kill,
    /// Sent by the test through [`FakeBackend::exit`].
    Exit(i32),
}

/// A fake process backend that:
/// - records every launch
/// - refuses to spawn selected commands
/// - plays a [`Script`] per command (default: a silent server)
/// - records the signals sent to each process
#[derive(Debug, Default)]
pub struct FakeBackend {
    scripts: Mutex<HashMap<CommandId, Script>>,
    fail_spawn: Mutex<HashSet<CommandId>>,
    launches: Mutex<Vec<LaunchSpec>>,
    signals: Arc<Mutex<Vec<(CommandId, FakeSignal)>>>,
    live: Mutex<HashMap<CommandId, mpsc::UnboundedSender<FakeSignal>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, command_id: &str, script: Script) {
        self.scripts.lock().insert(command_id.to_string(), script);
    }

    pub fn fail_spawn(&self, command_id: &str) {
        self.fail_spawn.lock().insert(command_id.to_string());
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.launches.lock().clone()
    }

    pub fn launch_count(&self, command_id: &str) -> usize {
        self.launches
            .lock()
            .iter()
            .filter(|s| s.command_id == command_id)
            .count()
    }

    pub fn signals(&self, command_id: &str) -> Vec<FakeSignal> {
        self.signals
            .lock()
            .iter()
            .filter(|(id, _)| id == command_id)
            .map(|(_, s)| *s)
            .collect()
    }

    /// Make the latest process of `command_id` exit with `code`.
    pub fn exit(&self, command_id: &str, code: i32) -> bool {
        match self.live.lock().get(command_id) {
            Some(tx) => tx.send(FakeSignal::Exit(code)).is_ok(),
            None => false,
        }
    }
}

impl ProcessBackend for FakeBackend {
    fn spawn(&self, spec: &LaunchSpec) -> io::Result<SpawnedProcess> {
        let id = spec.command_id.clone();
        if self.fail_spawn.lock().contains(&id) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "scripted spawn failure"));
        }
        self.launches.lock().push(spec.clone());
        let script = self.scripts.lock().get(&id).cloned().unwrap_or_default();

        let (out_tx, output) = mpsc::channel(64);
        let (sig_tx, sig_rx) = mpsc::unbounded_channel();
        self.live.lock().insert(id.clone(), sig_tx.clone());
        let control = Arc::new(FakeControl {
            command_id: id.clone(),
            tx: sig_tx,
            log: self.signals.clone(),
        });

        let exit = Box::pin(play(script, out_tx, sig_rx, id));

        Ok(SpawnedProcess {
            pid: None,
            output,
            exit,
            control,
        })
    }
}

async fn play(
    script: Script,
    out_tx: mpsc::Sender<OutputMessage>,
    mut sig_rx: mpsc::UnboundedReceiver<FakeSignal>,
    id: CommandId,
) -> io::Result<ExitOutcome> {
    for line in script.stdout {
        let _ = out_tx
            .send(Ok(OutputLine { stream: LogStream::Stdout, line }))
            .await;
    }
    for line in script.stderr {
        let _ = out_tx
            .send(Ok(OutputLine { stream: LogStream::Stderr, line }))
            .await;
    }
    if script.exit == ScriptedExit::ReadError {
        let _ = out_tx.send(Err(io::Error::other("scripted read failure"))).await;
    }
    drop(out_tx);

    if let ScriptedExit::Code(code) = script.exit {
        return Ok(ExitOutcome::Exited(code));
    }
    while let Some(signal) = sig_rx.recv().await {
        match (signal, script.exit) {
            (FakeSignal::Exit(code), _) => return Ok(ExitOutcome::Exited(code)),
            (FakeSignal::Terminate, ScriptedExit::IgnoreTerm) => {
                debug!(command = %id, "fake process ignoring SIGTERM");
            }
            _ => return Ok(ExitOutcome::Signalled),
        }
    }
    Ok(ExitOutcome::Signalled)
}

#[derive(Debug)]
struct FakeControl {
    command_id: CommandId,
    tx: mpsc::UnboundedSender<FakeSignal>,
    log: Arc<Mutex<Vec<(CommandId, FakeSignal)>>>,
}

impl FakeControl {
    fn send(&self, signal: FakeSignal) -> io::Result<()> {
        self.log.lock().push((self.command_id.clone(), signal));
        // The process may already be gone.
        let _ = self.tx.send(signal);
        Ok(())
    }
}

impl ProcessControl for FakeControl {
    fn terminate(&self) -> io::Result<()> {
        self.send(FakeSignal::Terminate)
    }

    fn kill(&self) -> io::Result<()> {
        self.send(FakeSignal::Kill)
    }
}
