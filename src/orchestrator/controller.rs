//! Control loop.
//!
//! Owns the supervisor and the query client, runs every slow operation on a
//! background task, and reports back to presentation layers through events.

use super::chat;
use crate::client::QueryClient;
use crate::config::Config;
use crate::launch::{self, LaunchPlan};
use crate::logging;
use crate::model::{LogLevel, OllamaHealth, PanelEvent, ProcessName};
use crate::supervisor::Supervisor;
use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Start(ProcessName),
    Stop(ProcessName),
    RestartAll,
    InstallDependencies,
    CheckDependencies,
    CheckOllama,
    TestConnection,
    Ask(String),
    SaveConfig(Box<Config>),
    OpenWebInterface,
    OpenDataDirectory,
    Quit,
}

/// Everything the controller needs to start.
pub(crate) struct ControllerSetup {
    pub config: Config,
    pub config_path: PathBuf,
    pub plan: LaunchPlan,
    pub supervisor: Supervisor,
    pub client: QueryClient,
    pub start_api: bool,
}

struct Controller {
    config: Config,
    config_path: PathBuf,
    plan: LaunchPlan,
    supervisor: Supervisor,
    client: QueryClient,
    events: UnboundedSender<PanelEvent>,
    // Cancelled on quit so a pending restart cannot start anything after shutdown.
    restarts: JoinSet<()>,
}

impl Controller {
    fn log(&self, level: LogLevel, message: impl Into<String>) {
        logging::emit(&self.events, level, message);
    }

    fn handle(&mut self, cmd: UiCommand) {
        match cmd {
            UiCommand::Start(ProcessName::Indexer) => {
                let dir = self.config.corpus_path.clone();
                if !self.plan.resolve(&dir).is_dir() {
                    self.log(LogLevel::Warning, format!("Corpus directory not found: {dir}"));
                }
                self.log(LogLevel::Info, format!("Indexing documents from: {dir}"));
                self.supervisor
                    .start(ProcessName::Indexer, &self.plan.indexer(&dir));
            }
            UiCommand::Start(ProcessName::Api) => {
                self.supervisor.start(ProcessName::Api, &self.plan.api());
            }
            UiCommand::Start(ProcessName::Desktop) => {
                self.supervisor
                    .start(ProcessName::Desktop, &self.plan.desktop());
            }
            // In-flight stops stay tracked by the supervisor; shutdown waits for them.
            UiCommand::Stop(name) => {
                let sup = self.supervisor.clone();
                tokio::spawn(async move { sup.stop(name).await });
            }
            UiCommand::RestartAll => {
                let sup = self.supervisor.clone();
                let api = self.plan.api();
                let desktop = self.plan.desktop();
                while self.restarts.try_join_next().is_some() {}
                self.restarts
                    .spawn(async move { sup.restart_all(&api, &desktop).await });
            }
            UiCommand::InstallDependencies => self.spawn_install(),
            UiCommand::CheckDependencies => self.spawn_dependency_check(),
            UiCommand::CheckOllama => self.spawn_ollama_check(),
            UiCommand::TestConnection => self.spawn_connection_test(),
            UiCommand::Ask(question) => self.spawn_ask(question),
            UiCommand::SaveConfig(cfg) => self.save_config(*cfg),
            UiCommand::OpenWebInterface => {
                let url = self.config.desktop_url();
                match launch::open_external(&url) {
                    Ok(()) => self.log(LogLevel::Info, format!("Opening web interface: {url}")),
                    Err(e) => self.log(LogLevel::Error, format!("Could not open {url}: {e:#}")),
                }
            }
            UiCommand::OpenDataDirectory => {
                let dir = self.plan.data_dir();
                if !dir.exists() {
                    self.log(
                        LogLevel::Warning,
                        format!("Data directory not found: {}", dir.display()),
                    );
                } else if let Err(e) = launch::open_external(&dir.to_string_lossy()) {
                    self.log(LogLevel::Error, format!("{e:#}"));
                }
            }
            // Handled by the loop.
            UiCommand::Quit => {}
        }
    }

    fn save_config(&mut self, cfg: Config) {
        match cfg.save(&self.config_path) {
            Ok(()) => {
                self.client = self
                    .client
                    .with_endpoints(cfg.api_base_url(), cfg.ollama_url.clone());
                self.config = cfg.clone();
                self.log(LogLevel::Info, "Configuration saved successfully");
                let _ = self.events.send(PanelEvent::ConfigApplied(Box::new(cfg)));
            }
            Err(e) => self.log(LogLevel::Error, format!("Error saving configuration: {e}")),
        }
    }

    fn spawn_ask(&self, question: String) {
        let client = self.client.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = client.ask(&question).await;
            tracing::debug!(?outcome, "ask finished");
            for msg in chat::reply_messages(&outcome) {
                let _ = events.send(PanelEvent::Chat(msg));
            }
            let _ = events.send(PanelEvent::Connectivity(client.is_connected()));
            let _ = events.send(PanelEvent::AskFinished);
        });
    }

    fn spawn_connection_test(&self) {
        let client = self.client.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let check = client.test_connection().await;
            let _ = events.send(PanelEvent::Connectivity(check.is_healthy()));
            let _ = events.send(PanelEvent::Chat(chat::connection_message(&check)));
        });
    }

    fn spawn_ollama_check(&self) {
        let client = self.client.clone();
        let events = self.events.clone();
        tokio::spawn(async move { report_ollama(&client, &events).await });
    }

    fn spawn_dependency_check(&self) {
        let client = self.client.clone();
        let events = self.events.clone();
        let pm = self.plan.package_manager.clone();
        tokio::spawn(async move {
            for tool in ["node", pm.as_str()] {
                match launch::tool_version(tool).await {
                    Some(v) => logging::emit(&events, LogLevel::Info, format!("{tool} version: {v}")),
                    None => logging::emit(&events, LogLevel::Warning, format!("{tool} not found")),
                }
            }
            report_ollama(&client, &events).await;
        });
    }

    fn spawn_install(&self) {
        let spec = self.plan.install();
        let events = self.events.clone();
        tokio::spawn(async move {
            logging::emit(&events, LogLevel::Info, "Installing dependencies...");
            match launch::run_to_completion(&spec, "install", &events).await {
                Ok(status) if status.success() => {
                    logging::emit(&events, LogLevel::Info, "Dependencies installed successfully")
                }
                Ok(status) => logging::emit(
                    &events,
                    LogLevel::Error,
                    format!("Failed to install dependencies ({status})"),
                ),
                Err(e) => logging::emit(
                    &events,
                    LogLevel::Error,
                    format!("Error installing dependencies: {e:#}"),
                ),
            }
        });
    }
}

async fn report_ollama(client: &QueryClient, events: &UnboundedSender<PanelEvent>) {
    let health = client.check_ollama().await;
    match &health {
        OllamaHealth::Running { models } => logging::emit(
            events,
            LogLevel::Info,
            format!("Ollama is running with {models} models"),
        ),
        OllamaHealth::Error { status } => logging::emit(
            events,
            LogLevel::Warning,
            format!("Ollama responded with error (HTTP {status})"),
        ),
        OllamaHealth::NotRunning { reason } => logging::emit(
            events,
            LogLevel::Warning,
            format!("Ollama not accessible: {reason}"),
        ),
        OllamaHealth::Unknown => {}
    }
    let _ = events.send(PanelEvent::Ollama(health));
}

/// Run commands until the UI quits, then stop every managed process.
///
/// Returns the processes that were still tracked at shutdown, after all of
/// them have been stopped.
pub(crate) async fn run_controller(
    setup: ControllerSetup,
    event_tx: UnboundedSender<PanelEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<Vec<ProcessName>> {
    let start_api = setup.start_api;
    let mut ctl = Controller {
        config: setup.config,
        config_path: setup.config_path,
        plan: setup.plan,
        supervisor: setup.supervisor,
        client: setup.client,
        events: event_tx,
        restarts: JoinSet::new(),
    };

    ctl.log(LogLevel::Info, "Control panel started");
    ctl.handle(UiCommand::CheckDependencies);
    ctl.handle(UiCommand::TestConnection);
    if start_api {
        ctl.handle(UiCommand::Start(ProcessName::Api));
    }

    while let Some(cmd) = cmd_rx.recv().await {
        if matches!(cmd, UiCommand::Quit) {
            break;
        }
        ctl.handle(cmd);
    }

    ctl.restarts.abort_all();
    while ctl.restarts.join_next().await.is_some() {}

    let tracked = ctl.supervisor.tracked();
    if !tracked.is_empty() {
        tracing::info!(?tracked, "shutting down managed processes");
    }
    ctl.supervisor.stop_all().await;
    Ok(tracked)
}
