//! Lifecycle supervisor for the named external processes.
//!
//! Each started process gets a monitor task that owns the OS child handle. The
//! supervisor keeps only a control channel to that task, so stop requests and
//! self-exit both funnel through the one place that can touch the child.

mod signal;

use crate::logging;
use crate::model::{LogLevel, PanelEvent, ProcessName, ProcessStatus};
use signal::StopOutcome;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};

/// Timing policy for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Delay after spawn before a still-alive process counts as running.
    pub grace_period: Duration,
    /// How long a stop waits for a graceful exit before killing.
    pub stop_timeout: Duration,
    /// Pause between stopping everything and starting again in `restart_all`.
    pub restart_pause: Duration,
    /// Pause between starting the API and the desktop app in `restart_all`.
    pub restart_stagger: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(5),
            restart_pause: Duration::from_secs(2),
            restart_stagger: Duration::from_secs(3),
        }
    }
}

/// What to run for a managed process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, args: &[&str], cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: cwd.into(),
        }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

enum ProcessControl {
    Stop,
}

/// A tracked process. The entry stays in the table until its monitor settles
/// it, so a stop in flight is still visible to `stop_all`.
struct Entry {
    generation: u64,
    pid: Option<u32>,
    stopping: bool,
    ctrl_tx: mpsc::UnboundedSender<ProcessControl>,
    // Dropped with the entry; receivers see the channel close once settled.
    settled: watch::Sender<()>,
}

/// What `stop` has to do for a tracked entry.
enum PendingStop {
    Request(mpsc::UnboundedSender<ProcessControl>, watch::Receiver<()>),
    AlreadyStopping(watch::Receiver<()>),
}

async fn wait_settled(mut settled: watch::Receiver<()>) {
    while settled.changed().await.is_ok() {}
}

#[derive(Default)]
struct Table {
    entries: HashMap<ProcessName, Entry>,
    statuses: HashMap<ProcessName, ProcessStatus>,
    next_generation: u64,
}

#[derive(Clone)]
pub struct Supervisor {
    cfg: SupervisorConfig,
    table: Arc<Mutex<Table>>,
    events: mpsc::UnboundedSender<PanelEvent>,
}

impl Supervisor {
    pub fn new(cfg: SupervisorConfig, events: mpsc::UnboundedSender<PanelEvent>) -> Self {
        Self {
            cfg,
            table: Arc::new(Mutex::new(Table::default())),
            events,
        }
    }

    // The table holds plain data; a panic mid-update cannot leave it half-written.
    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        logging::emit(&self.events, level, message);
    }

    // Callers must not hold the table lock.
    fn publish_status(&self, name: ProcessName, status: ProcessStatus) {
        let pid = self.pid_of(name);
        tracing::debug!(process = %name, ?status, ?pid, "status changed");
        let _ = self.events.send(PanelEvent::StatusChanged { name, status, pid });
    }

    fn set_status(&self, name: ProcessName, status: ProcessStatus) {
        self.table().statuses.insert(name, status);
        self.publish_status(name, status);
    }

    /// Apply a terminal status unless a newer entry for `name` already owns it.
    fn settle(&self, name: ProcessName, generation: u64, status: ProcessStatus) {
        let applied = {
            let mut table = self.table();
            match table.entries.get(&name).map(|e| e.generation) {
                Some(current) if current != generation => false,
                Some(_) => {
                    table.entries.remove(&name);
                    table.statuses.insert(name, status);
                    true
                }
                None => {
                    table.statuses.insert(name, status);
                    true
                }
            }
        };
        if applied {
            self.publish_status(name, status);
        }
    }

    pub fn status_of(&self, name: ProcessName) -> ProcessStatus {
        self.table().statuses.get(&name).copied().unwrap_or_default()
    }

    pub fn is_tracked(&self, name: ProcessName) -> bool {
        self.table().entries.contains_key(&name)
    }

    pub fn tracked(&self) -> Vec<ProcessName> {
        let mut names: Vec<_> = self.table().entries.keys().copied().collect();
        names.sort();
        names
    }

    pub fn pid_of(&self, name: ProcessName) -> Option<u32> {
        self.table().entries.get(&name).and_then(|e| e.pid)
    }

    /// Launch `spec` under `name`. A second start for a tracked name is a logged no-op.
    pub fn start(&self, name: ProcessName, spec: &ProcessSpec) {
        let mut table = self.table();
        let existing = table.entries.get(&name).map(|e| e.stopping);
        if let Some(stopping) = existing {
            drop(table);
            let message = if stopping {
                format!("{} is still stopping", name.title())
            } else {
                format!("{} is already running", name.title())
            };
            self.log(LogLevel::Info, message);
            return;
        }

        let mut child = match spec.to_command().spawn() {
            Ok(child) => child,
            Err(e) => {
                table.statuses.insert(name, ProcessStatus::Error);
                drop(table);
                self.publish_status(name, ProcessStatus::Error);
                self.log(
                    LogLevel::Error,
                    format!("Failed to start {}: {} ({e})", name.title(), spec.command_line()),
                );
                return;
            }
        };

        let generation = table.next_generation;
        table.next_generation += 1;
        let pid = child.id();
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        table.entries.insert(
            name,
            Entry {
                generation,
                pid,
                stopping: false,
                ctrl_tx,
                settled: watch::channel(()).0,
            },
        );
        table.statuses.insert(name, ProcessStatus::Starting);
        drop(table);

        tracing::info!(process = %name, ?pid, command = %spec.command_line(), "spawned");
        self.publish_status(name, ProcessStatus::Starting);
        self.log(
            LogLevel::Info,
            format!("Running command: {}", spec.command_line()),
        );
        self.log(LogLevel::Info, format!("{} starting...", name.title()));

        if let Some(out) = child.stdout.take() {
            self.forward_output(name, out);
        }
        if let Some(err) = child.stderr.take() {
            self.forward_output(name, err);
        }

        let this = self.clone();
        tokio::spawn(async move { this.monitor(name, generation, child, ctrl_rx).await });
    }

    fn forward_output<R>(&self, name: ProcessName, stream: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if events.send(PanelEvent::ProcessOutput { name, line }).is_err() {
                    break;
                }
            }
        });
    }

    async fn monitor(
        self,
        name: ProcessName,
        generation: u64,
        mut child: Child,
        mut ctrl_rx: mpsc::UnboundedReceiver<ProcessControl>,
    ) {
        let grace = tokio::time::sleep(self.cfg.grace_period);
        tokio::pin!(grace);
        let mut in_grace = true;

        loop {
            tokio::select! {
                _ = &mut grace, if in_grace => {
                    in_grace = false;
                    match child.try_wait() {
                        Ok(None) => {
                            // A stopping entry never reports running.
                            let current = self
                                .table()
                                .entries
                                .get(&name)
                                .filter(|e| !e.stopping)
                                .map(|e| e.generation);
                            if current == Some(generation) {
                                self.set_status(name, ProcessStatus::Running);
                                self.log(LogLevel::Info, format!("{} started successfully", name.title()));
                            }
                        }
                        // Exit is picked up by the wait branch on the next turn.
                        Ok(Some(_)) => {}
                        Err(e) => {
                            self.log(LogLevel::Error, format!("Error monitoring {name}: {e}"));
                            self.settle(name, generation, ProcessStatus::Error);
                            return;
                        }
                    }
                }
                res = child.wait() => {
                    match res {
                        Ok(status) => {
                            tracing::info!(process = %name, code = ?status.code(), "exited");
                            self.log(LogLevel::Info, format!("{} stopped ({status})", name.title()));
                            self.settle(name, generation, ProcessStatus::Stopped);
                        }
                        Err(e) => {
                            self.log(LogLevel::Error, format!("Error monitoring {name}: {e}"));
                            self.settle(name, generation, ProcessStatus::Error);
                        }
                    }
                    return;
                }
                ctrl = ctrl_rx.recv() => {
                    let outcome = signal::terminate(&mut child, self.cfg.stop_timeout).await;
                    if ctrl.is_none() {
                        tracing::warn!(process = %name, ?outcome, "control channel closed; child terminated");
                    }
                    self.report_stop(name, outcome);
                    self.settle(name, generation, ProcessStatus::Stopped);
                    return;
                }
            }
        }
    }

    fn report_stop(&self, name: ProcessName, outcome: StopOutcome) {
        match outcome {
            StopOutcome::Graceful | StopOutcome::AlreadyExited => {
                self.log(LogLevel::Info, format!("{} stopped", name.title()));
            }
            StopOutcome::Killed => {
                self.log(LogLevel::Warning, format!("{} force killed", name.title()));
            }
            StopOutcome::Failed(e) => {
                self.log(LogLevel::Error, format!("Error stopping {name}: {e}"));
            }
        }
    }

    /// Stop `name` with graceful-then-forced escalation and return once it has
    /// settled. Unknown names are ignored; a stop already in flight is awaited.
    ///
    /// The monitor task owns the termination, so dropping this future part way
    /// does not leave the child running.
    pub async fn stop(&self, name: ProcessName) {
        let pending = {
            let mut table = self.table();
            let pending = match table.entries.get_mut(&name) {
                None => return,
                Some(entry) if entry.stopping => {
                    PendingStop::AlreadyStopping(entry.settled.subscribe())
                }
                Some(entry) => {
                    entry.stopping = true;
                    PendingStop::Request(entry.ctrl_tx.clone(), entry.settled.subscribe())
                }
            };
            pending
        };

        match pending {
            PendingStop::AlreadyStopping(settled) => wait_settled(settled).await,
            PendingStop::Request(ctrl_tx, settled) => {
                // A closed channel means the monitor saw the exit and settled first.
                let _ = ctrl_tx.send(ProcessControl::Stop);
                wait_settled(settled).await;
            }
        }
    }

    /// Stop every tracked process concurrently, including stops already in
    /// flight; returns once all have settled. Used on shutdown.
    pub async fn stop_all(&self) {
        let names = self.tracked();
        futures::future::join_all(names.into_iter().map(|name| self.stop(name))).await;
    }

    /// Stop every tracked process one at a time, then bring the API and
    /// desktop app back up in order.
    pub async fn restart_all(&self, api: &ProcessSpec, desktop: &ProcessSpec) {
        self.log(LogLevel::Info, "Restarting all services...");
        for name in self.tracked() {
            self.stop(name).await;
        }
        tokio::time::sleep(self.cfg.restart_pause).await;
        self.start(ProcessName::Api, api);
        tokio::time::sleep(self.cfg.restart_stagger).await;
        self.start(ProcessName::Desktop, desktop);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn fast_config() -> SupervisorConfig {
        SupervisorConfig {
            grace_period: Duration::from_millis(200),
            stop_timeout: Duration::from_millis(500),
            restart_pause: Duration::from_millis(50),
            restart_stagger: Duration::from_millis(50),
        }
    }

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::new("sh", &["-c", script], std::env::temp_dir())
    }

    fn supervisor() -> (Supervisor, mpsc::UnboundedReceiver<PanelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Supervisor::new(fast_config(), tx), rx)
    }

    async fn wait_for_status(sup: &Supervisor, name: ProcessName, want: ProcessStatus) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if sup.status_of(name) == want {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PanelEvent>) -> Vec<PanelEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn unknown_name_defaults_to_stopped() {
        let (sup, _rx) = supervisor();
        for name in ProcessName::ALL {
            assert_eq!(sup.status_of(name), ProcessStatus::Stopped);
        }
    }

    #[tokio::test]
    async fn stop_untracked_is_noop() {
        let (sup, mut rx) = supervisor();
        sup.stop(ProcessName::Desktop).await;
        assert_eq!(sup.status_of(ProcessName::Desktop), ProcessStatus::Stopped);
        assert!(!sup.is_tracked(ProcessName::Desktop));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn start_goes_through_starting_to_running() {
        let (sup, mut rx) = supervisor();
        sup.start(ProcessName::Api, &sh("sleep 30"));
        assert_eq!(sup.status_of(ProcessName::Api), ProcessStatus::Starting);
        assert!(sup.pid_of(ProcessName::Api).is_some());

        assert!(wait_for_status(&sup, ProcessName::Api, ProcessStatus::Running).await);

        let statuses: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|ev| match ev {
                PanelEvent::StatusChanged { status, .. } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![ProcessStatus::Starting, ProcessStatus::Running]);

        sup.stop(ProcessName::Api).await;
        assert_eq!(sup.status_of(ProcessName::Api), ProcessStatus::Stopped);
    }

    #[tokio::test]
    async fn second_start_is_noop() {
        let (sup, _rx) = supervisor();
        sup.start(ProcessName::Api, &sh("sleep 30"));
        let first_pid = sup.pid_of(ProcessName::Api);
        sup.start(ProcessName::Api, &sh("sleep 30"));

        assert_eq!(sup.tracked(), vec![ProcessName::Api]);
        assert_eq!(sup.pid_of(ProcessName::Api), first_pid);
        sup.stop(ProcessName::Api).await;
    }

    #[tokio::test]
    async fn early_exit_ends_stopped_without_running() {
        let (sup, mut rx) = supervisor();
        sup.start(ProcessName::Indexer, &sh("exit 3"));

        assert!(wait_for_status(&sup, ProcessName::Indexer, ProcessStatus::Stopped).await);
        assert!(!sup.is_tracked(ProcessName::Indexer));

        // Let the grace timer elapse; it must not resurrect the status.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(sup.status_of(ProcessName::Indexer), ProcessStatus::Stopped);
        let saw_running = drain(&mut rx).into_iter().any(|ev| {
            matches!(
                ev,
                PanelEvent::StatusChanged {
                    status: ProcessStatus::Running,
                    ..
                }
            )
        });
        assert!(!saw_running);
    }

    #[tokio::test]
    async fn stop_terminates_gracefully() {
        let (sup, mut rx) = supervisor();
        sup.start(ProcessName::Desktop, &sh("sleep 30"));
        sup.stop(ProcessName::Desktop).await;

        assert_eq!(sup.status_of(ProcessName::Desktop), ProcessStatus::Stopped);
        assert!(!sup.is_tracked(ProcessName::Desktop));
        let logs: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|ev| match ev {
                PanelEvent::Log(line) => Some(line.message),
                _ => None,
            })
            .collect();
        assert!(logs.iter().any(|m| m == "Desktop stopped"));
    }

    #[tokio::test]
    async fn stop_escalates_to_kill_when_term_is_ignored() {
        let (sup, mut rx) = supervisor();
        sup.start(ProcessName::Api, &sh("trap '' TERM; exec sleep 30"));
        assert!(wait_for_status(&sup, ProcessName::Api, ProcessStatus::Running).await);

        let started = Instant::now();
        sup.stop(ProcessName::Api).await;
        assert!(started.elapsed() >= Duration::from_millis(500));

        assert_eq!(sup.status_of(ProcessName::Api), ProcessStatus::Stopped);
        assert!(sup.tracked().is_empty());
        let killed = drain(&mut rx).into_iter().any(|ev| {
            matches!(ev, PanelEvent::Log(ref line) if line.message == "Api force killed")
        });
        assert!(killed);
    }

    #[tokio::test]
    async fn spawn_failure_sets_error_and_tracks_nothing() {
        let (sup, _rx) = supervisor();
        let spec = ProcessSpec::new("definitely-not-a-real-program-xyz", &[], std::env::temp_dir());
        sup.start(ProcessName::Api, &spec);

        assert_eq!(sup.status_of(ProcessName::Api), ProcessStatus::Error);
        assert!(!sup.is_tracked(ProcessName::Api));
    }

    #[tokio::test]
    async fn output_lines_are_forwarded() {
        let (sup, mut rx) = supervisor();
        sup.start(ProcessName::Indexer, &sh("echo indexed 3 files; echo oops >&2"));
        assert!(wait_for_status(&sup, ProcessName::Indexer, ProcessStatus::Stopped).await);
        tokio::time::sleep(Duration::from_millis(150)).await;

        let lines: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|ev| match ev {
                PanelEvent::ProcessOutput { line, .. } => Some(line),
                _ => None,
            })
            .collect();
        assert!(lines.contains(&"indexed 3 files".to_string()));
        assert!(lines.contains(&"oops".to_string()));
    }

    #[tokio::test]
    async fn stop_all_waits_for_a_stop_already_in_flight() {
        let (sup, _rx) = supervisor();
        sup.start(ProcessName::Api, &sh("trap '' TERM; exec sleep 30"));
        assert!(wait_for_status(&sup, ProcessName::Api, ProcessStatus::Running).await);
        let pid = sup.pid_of(ProcessName::Api).expect("pid");

        let background = sup.clone();
        let stopping = tokio::spawn(async move { background.stop(ProcessName::Api).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sup.is_tracked(ProcessName::Api));

        let started = Instant::now();
        sup.stop_all().await;
        assert!(started.elapsed() >= Duration::from_millis(400));
        assert!(sup.tracked().is_empty());
        assert_eq!(sup.status_of(ProcessName::Api), ProcessStatus::Stopped);
        let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok();
        assert!(!alive);
        stopping.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_stop_still_settles_the_process() {
        let (sup, _rx) = supervisor();
        sup.start(ProcessName::Desktop, &sh("trap '' TERM; exec sleep 30"));
        assert!(wait_for_status(&sup, ProcessName::Desktop, ProcessStatus::Running).await);

        let background = sup.clone();
        let stopping = tokio::spawn(async move { background.stop(ProcessName::Desktop).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        stopping.abort();

        assert!(wait_for_status(&sup, ProcessName::Desktop, ProcessStatus::Stopped).await);
        assert!(sup.tracked().is_empty());
    }

    #[tokio::test]
    async fn start_during_stop_is_refused() {
        let (sup, mut rx) = supervisor();
        sup.start(ProcessName::Api, &sh("trap '' TERM; exec sleep 30"));
        assert!(wait_for_status(&sup, ProcessName::Api, ProcessStatus::Running).await);
        let pid = sup.pid_of(ProcessName::Api);

        let background = sup.clone();
        let stopping = tokio::spawn(async move { background.stop(ProcessName::Api).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        sup.start(ProcessName::Api, &sh("sleep 30"));
        assert_eq!(sup.pid_of(ProcessName::Api), pid);

        stopping.await.unwrap();
        assert!(sup.tracked().is_empty());
        let refused = drain(&mut rx).into_iter().any(|ev| {
            matches!(ev, PanelEvent::Log(ref line) if line.message == "Api is still stopping")
        });
        assert!(refused);
    }

    #[tokio::test]
    async fn restart_all_stops_processes_one_at_a_time() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let sup = Supervisor::new(
            SupervisorConfig {
                restart_pause: Duration::ZERO,
                restart_stagger: Duration::ZERO,
                ..fast_config()
            },
            tx,
        );
        sup.start(ProcessName::Api, &sh("trap '' TERM; exec sleep 30"));
        sup.start(ProcessName::Indexer, &sh("trap '' TERM; exec sleep 30"));
        assert!(wait_for_status(&sup, ProcessName::Api, ProcessStatus::Running).await);
        assert!(wait_for_status(&sup, ProcessName::Indexer, ProcessStatus::Running).await);

        // Each ignores TERM, so each stop waits out the full 500ms timeout.
        let started = Instant::now();
        sup.restart_all(&sh("sleep 30"), &sh("sleep 30")).await;
        assert!(started.elapsed() >= Duration::from_millis(1000));
        assert_eq!(sup.status_of(ProcessName::Indexer), ProcessStatus::Stopped);
        assert_eq!(sup.tracked(), vec![ProcessName::Api, ProcessName::Desktop]);

        sup.stop_all().await;
    }

    #[tokio::test]
    async fn restart_all_brings_up_api_then_desktop() {
        let (sup, _rx) = supervisor();
        sup.start(ProcessName::Indexer, &sh("sleep 30"));
        sup.restart_all(&sh("sleep 30"), &sh("sleep 30")).await;

        assert_eq!(sup.tracked(), vec![ProcessName::Api, ProcessName::Desktop]);
        assert_eq!(sup.status_of(ProcessName::Indexer), ProcessStatus::Stopped);

        sup.stop_all().await;
        assert!(sup.tracked().is_empty());
        for name in ProcessName::ALL {
            assert_eq!(sup.status_of(name), ProcessStatus::Stopped);
        }
    }
}
