//! Plann Assist - Entry Point
//!
//! Reads sentences from the command line or stdin, turns them into calendar
//! events and tasks, and prints progress as it arrives. The main thread is
//! the single consumer: it polls for input and drains notifications on a
//! fixed interval while parsing and calendar writes run on the runtime.

use plann_assist::calendar::{CalendarBackend, CalendarRegistry, PlannCli};
use plann_assist::core::config::{
    AssistConfig, ModelSettings, Settings, DEFAULT_OLLAMA_HOST, DEFAULT_OLLAMA_MODEL,
    DEFAULT_SECTION,
};
use plann_assist::core::error::{AssistError, Result};
use plann_assist::dispatch::{
    DispatchSnapshot, Dispatcher, Notification, Progress, SubmitRejection, TaskState,
};
use plann_assist::llm::{IntentParser, OllamaClient};

use chrono::Local;
use clap::Parser;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

/// Add calendar events and tasks from plain sentences
#[derive(Parser, Debug, Clone)]
#[command(name = "plann-assist")]
#[command(about = "Turn a sentence like \"dentist tomorrow 14h\" into a calendar event or task")]
struct Args {
    /// Ollama model used for extraction
    #[arg(long, env = "OLLAMA_MODEL", default_value = DEFAULT_OLLAMA_MODEL)]
    model: String,

    /// Ollama API base URL
    #[arg(long, env = "OLLAMA_HOST", default_value = DEFAULT_OLLAMA_HOST)]
    ollama_host: String,

    /// Settings section (or comma separated sections) to use
    #[arg(long, default_value = DEFAULT_SECTION)]
    config_section: String,

    /// Settings file (defaults to ~/.config/calendar.conf)
    #[arg(long)]
    config: Option<PathBuf>,

    /// plann executable used for calendar writes
    #[arg(long, default_value = "plann")]
    plann: String,

    /// Print the models installed on the Ollama host and exit
    #[arg(long)]
    list_models: bool,

    /// Sentence to add; interactive mode when omitted
    text: Vec<String>,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("plann_assist=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = AssistConfig::default();
    config.validate().map_err(AssistError::Config)?;

    // Runtime for model calls and background submissions
    let rt = Runtime::new()?;
    let backend: Arc<dyn CalendarBackend> = Arc::new(PlannCli::new(args.plann.clone()));

    if args.list_models {
        let client = OllamaClient::new(args.ollama_host.clone(), &config);
        let models = rt.block_on(client.list_models());
        if models.is_empty() {
            println!("No models found on {} (install one with: ollama pull llama2)", client.base_url());
        }
        for model in models {
            println!("{}", model);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let loaded = rt.block_on(build_snapshot(args.clone(), config.clone(), Arc::clone(&backend)));
    loaded.report();
    let snapshot = loaded.snapshot;
    let mut dispatcher = Dispatcher::new(
        rt.handle().clone(),
        Arc::clone(&backend),
        snapshot,
        config.clone(),
    );

    if !args.text.is_empty() {
        return Ok(run_once(&mut dispatcher, &args.text.join(" "), &config));
    }

    run_interactive(&mut dispatcher, &args, &config, &rt, backend)?;
    Ok(ExitCode::SUCCESS)
}

/// A rebuilt snapshot plus the lines to show the user about it
struct Loaded {
    snapshot: DispatchSnapshot,
    messages: Vec<String>,
}

impl Loaded {
    fn report(&self) {
        for message in &self.messages {
            log_line(message);
        }
    }
}

/// Load settings, discover calendars and probe the model
///
/// Runs on the runtime so the probe never holds up the consumer loop.
/// Failures are reported and leave an empty registry so the session stays
/// usable and `:reload` can recover.
async fn build_snapshot(
    args: Args,
    config: AssistConfig,
    backend: Arc<dyn CalendarBackend>,
) -> Loaded {
    let mut messages = Vec::new();
    let path = args.config.clone().unwrap_or_else(Settings::default_path);
    let sections = match Settings::load(&path).and_then(|s| s.resolve(&args.config_section)) {
        Ok(sections) => sections,
        Err(e) => {
            messages.push(format!("Configuration error: {}", e));
            messages.push(format!(
                "Expected a JSON object keyed by section in {}, e.g. {{\"default\": {{\"caldav_url\": \"...\", \"caldav_user\": \"...\", \"caldav_pass\": \"...\"}}}}",
                path.display()
            ));
            Vec::new()
        }
    };

    // Discovery may block on the calendar tool
    let discovery_sections = sections.clone();
    let registry = tokio::task::spawn_blocking(move || {
        CalendarRegistry::load(backend.as_ref(), &discovery_sections)
    })
    .await
    .unwrap_or_else(|e| {
        tracing::error!(error = %e, "Calendar discovery aborted");
        CalendarRegistry::new()
    });

    if registry.is_empty() {
        messages.push("No calendar found. Configure plann first.".to_string());
    } else {
        messages.push(format!(
            "{} calendar(s) found. Events: {} / Tasks: {}",
            registry.calendars().len(),
            registry.event_calendars().len(),
            registry.task_calendars().len()
        ));
    }

    let model = ModelSettings::resolve(&sections, &args.ollama_host, &args.model);
    let client = OllamaClient::new(model.host.clone(), &config);
    let parser = if client.probe().await {
        messages.push(format!("Model {} ready on {}", model.model, client.base_url()));
        IntentParser::new(client, model.model)
    } else {
        messages.push(format!(
            "Ollama not reachable on {} (start it with: ollama serve); using heuristics",
            client.base_url()
        ));
        IntentParser::offline()
    };

    Loaded {
        snapshot: DispatchSnapshot { parser, registry },
        messages,
    }
}

fn run_once(dispatcher: &mut Dispatcher, text: &str, config: &AssistConfig) -> ExitCode {
    if let Err(rejection) = dispatcher.submit(text) {
        log_line(&format!("Not submitted: {}", rejection));
        return ExitCode::FAILURE;
    }

    // Generation timeout plus headroom for the calendar write
    let budget = config.generate_timeout + Duration::from_secs(30);
    for notification in dispatcher.wait_idle(budget) {
        print_notification(&notification);
    }

    match dispatcher.last_finished().map(|task| task.state) {
        Some(TaskState::Completed) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}

/// Rebuild the snapshot on the runtime; the result arrives on `done`
fn start_reload(
    rt: &Runtime,
    args: &Args,
    config: &AssistConfig,
    backend: &Arc<dyn CalendarBackend>,
    done: mpsc::Sender<Loaded>,
) {
    let job = build_snapshot(args.clone(), config.clone(), Arc::clone(backend));
    rt.spawn(async move {
        let _ = done.send(job.await);
    });
}

/// Let the active request reach its terminal notification
fn finish(dispatcher: &mut Dispatcher, config: &AssistConfig) {
    let budget = config.generate_timeout + Duration::from_secs(30);
    for notification in dispatcher.wait_idle(budget) {
        print_notification(&notification);
    }
}

fn run_interactive(
    dispatcher: &mut Dispatcher,
    args: &Args,
    config: &AssistConfig,
    rt: &Runtime,
    backend: Arc<dyn CalendarBackend>,
) -> Result<()> {
    println!("\n=== PLANN ASSIST ===");
    println!("Type a sentence to add an event or a task, e.g. \"Dentist tomorrow at 14h\"");
    println!();
    println!("Commands:");
    println!("  :status   - Show model, calendars and current request");
    println!("  :reload   - Re-read settings and rediscover calendars");
    println!("  :quit     - Exit");
    println!();

    // Stdin blocks, so it gets its own thread; lines arrive over a channel
    let (line_tx, line_rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let (reload_tx, reload_rx) = mpsc::channel::<Loaded>();
    let mut reloading = false;

    loop {
        for notification in dispatcher.drain() {
            print_notification(&notification);
        }
        if let Ok(loaded) = reload_rx.try_recv() {
            loaded.report();
            dispatcher.reconfigure(loaded.snapshot);
            reloading = false;
        }

        let line = match line_rx.recv_timeout(config.poll_interval) {
            Ok(line) => line?,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                finish(dispatcher, config);
                break;
            }
        };
        let input = line.trim();

        match input {
            "" => continue,
            ":quit" | ":q" => {
                finish(dispatcher, config);
                break;
            }
            ":status" => print_status(dispatcher),
            ":reload" if reloading => log_line("Reload already in progress"),
            ":reload" => {
                log_line("Reloading settings...");
                start_reload(rt, args, config, &backend, reload_tx.clone());
                reloading = true;
            }
            text => match dispatcher.submit(text) {
                Ok(_) => {}
                Err(SubmitRejection::Busy) => log_line("Still working on the previous request"),
                Err(SubmitRejection::Empty) => {}
            },
        }
    }

    println!("\nGoodbye!");
    Ok(())
}

fn print_status(dispatcher: &Dispatcher) {
    let snapshot = dispatcher.snapshot();
    let registry = &snapshot.registry;

    println!();
    println!("Model: {}", snapshot.parser.model().unwrap_or("none (heuristics only)"));
    println!(
        "Calendars: {} (events: {}, tasks: {})",
        registry.calendars().len(),
        registry.event_calendars().len(),
        registry.task_calendars().len()
    );
    for handle in registry.calendars() {
        println!("  - {}", if handle.url().is_empty() { "<no url>" } else { handle.url() });
    }
    match dispatcher.active() {
        Some(task) => println!(
            "Current: \"{}\" ({:?}, since {})",
            task.text,
            task.state,
            task.submitted_at.format("%H:%M:%S")
        ),
        None => println!("Current: idle"),
    }
    if let Some(task) = dispatcher.last_finished() {
        println!(
            "Last: \"{}\" -> {:?}{}",
            task.text,
            task.state,
            task.error
                .as_ref()
                .map(|e| format!(" ({})", e))
                .unwrap_or_default()
        );
    }
    println!();
}

fn print_notification(notification: &Notification) {
    let marker = match notification.progress {
        Progress::Completed { .. } => "+",
        Progress::Failed { .. } => "!",
        _ => "-",
    };
    println!(
        "[{}] {} {}",
        Local::now().format("%H:%M:%S"),
        marker,
        notification
    );
}

fn log_line(message: &str) {
    println!("[{}] {}", Local::now().format("%H:%M:%S"), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn args(host: &str) -> Args {
        Args::try_parse_from([
            "plann-assist",
            "--config",
            "/nonexistent/plann-assist/calendar.conf",
            "--ollama-host",
            host,
            "--model",
            "mistral",
        ])
        .unwrap()
    }

    #[test]
    fn test_reload_result_arrives_later() {
        let rt = Runtime::new().unwrap();
        let server = rt.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/tags"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(json!({"models": []}))
                        .set_delay(Duration::from_millis(300)),
                )
                .mount(&server)
                .await;
            server
        });

        let backend: Arc<dyn CalendarBackend> = Arc::new(PlannCli::default());
        let (tx, rx) = mpsc::channel();
        start_reload(&rt, &args(&server.uri()), &AssistConfig::default(), &backend, tx);

        // The caller is back before the model service has answered
        assert!(matches!(rx.try_recv(), Err(mpsc::TryRecvError::Empty)));

        let loaded = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(loaded.snapshot.parser.model(), Some("mistral"));
        assert!(loaded.snapshot.registry.is_empty());
        assert!(loaded.messages[0].starts_with("Configuration error"));
    }

    #[test]
    fn test_unreachable_model_loads_offline() {
        let rt = Runtime::new().unwrap();
        let backend: Arc<dyn CalendarBackend> = Arc::new(PlannCli::default());
        let loaded = rt.block_on(build_snapshot(
            args("http://127.0.0.1:9"),
            AssistConfig::default(),
            backend,
        ));
        assert_eq!(loaded.snapshot.parser.model(), None);
        assert!(loaded
            .messages
            .iter()
            .any(|m| m.starts_with("Ollama not reachable")));
    }

    #[test]
    fn test_finish_waits_for_terminal_notification() {
        let rt = Runtime::new().unwrap();
        let config = AssistConfig {
            poll_interval: Duration::from_millis(10),
            ..AssistConfig::default()
        };
        let mut dispatcher = Dispatcher::new(
            rt.handle().clone(),
            Arc::new(PlannCli::default()),
            DispatchSnapshot {
                parser: IntentParser::offline(),
                registry: CalendarRegistry::new(),
            },
            config.clone(),
        );

        dispatcher.submit("Buy bread").unwrap();
        finish(&mut dispatcher, &config);

        assert!(dispatcher.is_idle());
        assert_eq!(
            dispatcher.last_finished().map(|t| t.state),
            Some(TaskState::Failed)
        );
    }
}
