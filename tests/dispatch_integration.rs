//! Integration tests for background submissions
//!
//! A recording backend stands in for plann; parsing runs offline (or
//! against a mock Ollama) so each test controls exactly which calendars
//! exist and what gets written.

use chrono::NaiveDate;
use plann_assist::calendar::{CalendarBackend, CalendarCollection, CalendarHandle, CalendarRegistry};
use plann_assist::command::OperationDescriptor;
use plann_assist::core::config::{AssistConfig, SectionConfig};
use plann_assist::core::error::{AssistError, Result};
use plann_assist::dispatch::{DispatchSnapshot, Dispatcher, Progress, TaskState};
use plann_assist::llm::{IntentKind, IntentParser, OllamaClient, ParseSource};
use serde_json::json;
use std::any::Any;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug)]
struct Collection {
    url: &'static str,
    components: &'static [&'static str],
}

impl CalendarCollection for Collection {
    fn url(&self) -> Option<String> {
        Some(self.url.to_string())
    }

    fn supported_components(&self) -> Result<Vec<String>> {
        Ok(self.components.iter().map(|c| c.to_string()).collect())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
struct Recorder {
    writes: Mutex<Vec<(String, OperationDescriptor)>>,
    refuse: bool,
    explode: bool,
}

impl CalendarBackend for Recorder {
    fn discover(
        &self,
        _section: &SectionConfig,
        _raise_errors: bool,
    ) -> Result<Vec<Arc<dyn CalendarCollection>>> {
        Ok(Vec::new())
    }

    fn write(&self, targets: &[CalendarHandle], op: &OperationDescriptor) -> Result<()> {
        if self.explode {
            panic!("calendar driver crashed");
        }
        if self.refuse {
            return Err(AssistError::Discovery("401 Unauthorized".into()));
        }
        self.writes
            .lock()
            .unwrap()
            .push((targets[0].url().to_string(), op.clone()));
        Ok(())
    }
}

fn registry(collections: Vec<Collection>) -> CalendarRegistry {
    let mut registry = CalendarRegistry::new();
    registry.register(
        collections
            .into_iter()
            .map(|c| Arc::new(c) as Arc<dyn CalendarCollection>),
    );
    registry
}

fn config() -> AssistConfig {
    AssistConfig {
        poll_interval: Duration::from_millis(10),
        ..AssistConfig::default()
    }
}

fn dispatcher_with(
    rt: &Runtime,
    backend: Arc<Recorder>,
    parser: IntentParser,
    registry: CalendarRegistry,
    config: AssistConfig,
) -> Dispatcher {
    Dispatcher::new(
        rt.handle().clone(),
        backend,
        DispatchSnapshot { parser, registry },
        config,
    )
    .with_today(NaiveDate::from_ymd_opt(2025, 10, 22).unwrap())
}

fn dispatcher(rt: &Runtime, backend: Arc<Recorder>, registry: CalendarRegistry) -> Dispatcher {
    dispatcher_with(rt, backend, IntentParser::offline(), registry, config())
}

fn inbox() -> CalendarRegistry {
    registry(vec![Collection {
        url: "https://dav/inbox/",
        components: &["VEVENT", "VTODO"],
    }])
}

#[test]
fn test_task_without_any_calendar_fails() {
    let rt = Runtime::new().unwrap();
    let backend = Arc::new(Recorder::default());
    let mut dispatcher = dispatcher(&rt, backend.clone(), CalendarRegistry::new());

    let id = dispatcher.submit("Buy bread").unwrap();
    let notes = dispatcher.wait_idle(Duration::from_secs(5));

    assert!(dispatcher.is_idle());
    let last = dispatcher.last_finished().unwrap();
    assert_eq!(last.id, id);
    assert_eq!(last.state, TaskState::Failed);
    assert_eq!(last.error.as_deref(), Some("No calendar accepts tasks"));

    assert!(matches!(
        notes.last().map(|n| &n.progress),
        Some(Progress::Failed { .. })
    ));
    assert!(backend.writes.lock().unwrap().is_empty());
}

#[test]
fn test_event_lands_in_event_calendar() {
    let rt = Runtime::new().unwrap();
    let backend = Arc::new(Recorder::default());
    let mut dispatcher = dispatcher(
        &rt,
        backend.clone(),
        registry(vec![
            Collection {
                url: "https://dav/todo/",
                components: &["VTODO"],
            },
            Collection {
                url: "https://dav/personal/",
                components: &["VEVENT"],
            },
        ]),
    );

    dispatcher.submit("Meeting tomorrow at 14h").unwrap();
    let notes = dispatcher.wait_idle(Duration::from_secs(5));

    let steps: Vec<_> = notes.iter().map(|n| &n.progress).collect();
    assert!(matches!(steps[0], Progress::Submitted { .. }));
    assert!(matches!(steps[1], Progress::Parsing));
    assert!(matches!(
        steps[2],
        Progress::Parsed {
            kind: IntentKind::Event,
            source: ParseSource::Fallback,
            ..
        }
    ));
    assert!(matches!(steps[3], Progress::Dispatching { targets: 1 }));
    assert!(matches!(steps[4], Progress::Completed { .. }));
    assert_eq!(steps.len(), 5);

    let writes = backend.writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, "https://dav/personal/");
    assert_eq!(writes[0].1.timespec.as_deref(), Some("2025-10-23T14:00+1h"));
    assert_eq!(
        dispatcher.last_finished().and_then(|t| t.result_summary.clone()),
        Some("Meeting tomorrow at 14h".to_string())
    );
}

#[test]
fn test_task_falls_back_to_full_list() {
    let rt = Runtime::new().unwrap();
    let backend = Arc::new(Recorder::default());
    let mut dispatcher = dispatcher(
        &rt,
        backend.clone(),
        registry(vec![Collection {
            url: "https://dav/personal/",
            components: &["VEVENT"],
        }]),
    );

    dispatcher.submit("Call the bank").unwrap();
    dispatcher.wait_idle(Duration::from_secs(5));

    assert_eq!(
        dispatcher.last_finished().map(|t| t.state),
        Some(TaskState::Completed)
    );
    let writes = backend.writes.lock().unwrap();
    assert_eq!(writes[0].0, "https://dav/personal/");
    assert_eq!(writes[0].1.kind, IntentKind::Task);
}

#[test]
fn test_backend_error_reported_as_write_failure() {
    let rt = Runtime::new().unwrap();
    let backend = Arc::new(Recorder {
        refuse: true,
        ..Recorder::default()
    });
    let mut dispatcher = dispatcher(
        &rt,
        backend,
        registry(vec![Collection {
            url: "https://dav/personal/",
            components: &[],
        }]),
    );

    dispatcher.submit("Lunch today").unwrap();
    dispatcher.wait_idle(Duration::from_secs(5));

    let last = dispatcher.last_finished().unwrap();
    assert_eq!(last.state, TaskState::Failed);
    let error = last.error.as_deref().unwrap();
    assert!(error.starts_with("Calendar write failed"), "{}", error);
    assert!(error.contains("401 Unauthorized"));
}

#[test]
fn test_accepts_new_submission_after_finish() {
    let rt = Runtime::new().unwrap();
    let backend = Arc::new(Recorder::default());
    let mut dispatcher = dispatcher(
        &rt,
        backend.clone(),
        registry(vec![Collection {
            url: "https://dav/inbox/",
            components: &["VEVENT", "VTODO"],
        }]),
    );

    let first = dispatcher.submit("Buy bread").unwrap();
    dispatcher.wait_idle(Duration::from_secs(5));
    let second = dispatcher.submit("Dinner tonight at 20h").unwrap();
    dispatcher.wait_idle(Duration::from_secs(5));

    assert_ne!(first, second);
    assert_eq!(backend.writes.lock().unwrap().len(), 2);
}

#[test]
fn test_reconfigure_replaces_registry() {
    let rt = Runtime::new().unwrap();
    let backend = Arc::new(Recorder::default());
    let mut dispatcher = dispatcher(&rt, backend.clone(), CalendarRegistry::new());

    dispatcher.reconfigure(DispatchSnapshot {
        parser: IntentParser::offline(),
        registry: registry(vec![Collection {
            url: "https://dav/tasks/",
            components: &["VTODO"],
        }]),
    });
    assert_eq!(dispatcher.snapshot().registry.task_calendars().len(), 1);

    dispatcher.submit("Send the invoice").unwrap();
    dispatcher.wait_idle(Duration::from_secs(5));
    assert_eq!(
        dispatcher.last_finished().map(|t| t.state),
        Some(TaskState::Completed)
    );
}

#[test]
fn test_panicking_write_fails_and_releases() {
    let rt = Runtime::new().unwrap();
    let backend = Arc::new(Recorder {
        explode: true,
        ..Recorder::default()
    });
    let mut dispatcher = dispatcher(&rt, backend, inbox());

    dispatcher.submit("Buy bread").unwrap();
    let notes = dispatcher.wait_idle(Duration::from_secs(5));

    assert!(dispatcher.is_idle());
    assert_eq!(notes.iter().filter(|n| n.progress.is_terminal()).count(), 1);
    let last = dispatcher.last_finished().unwrap();
    assert_eq!(last.state, TaskState::Failed);
    assert!(last.error.as_deref().unwrap().contains("aborted"));

    // The coordinator takes new work afterwards
    assert!(dispatcher.submit("Call mom").is_ok());
}

#[test]
fn test_unknown_model_kind_fails_submission() {
    let rt = Runtime::new().unwrap();
    let server = rt.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "{\"type\": \"journal\", \"summary\": \"Dear diary\"}"
            })))
            .mount(&server)
            .await;
        server
    });

    let backend = Arc::new(Recorder::default());
    let parser = IntentParser::new(OllamaClient::new(server.uri(), &config()), "llama2");
    let mut dispatcher = dispatcher_with(&rt, backend.clone(), parser, inbox(), config());

    dispatcher.submit("Dear diary, today was long").unwrap();
    dispatcher.wait_idle(Duration::from_secs(10));

    assert!(dispatcher.is_idle());
    let last = dispatcher.last_finished().unwrap();
    assert_eq!(last.state, TaskState::Failed);
    assert!(last.error.as_deref().unwrap().contains("journal"));
    assert!(backend.writes.lock().unwrap().is_empty());
}

#[test]
fn test_error_text_capped_by_config() {
    let rt = Runtime::new().unwrap();
    let backend = Arc::new(Recorder {
        refuse: true,
        ..Recorder::default()
    });
    let config = AssistConfig {
        max_error_chars: 20,
        ..config()
    };
    let mut dispatcher = dispatcher_with(&rt, backend, IntentParser::offline(), inbox(), config);

    dispatcher.submit("Lunch today").unwrap();
    dispatcher.wait_idle(Duration::from_secs(5));

    let error = dispatcher.last_finished().unwrap().error.clone().unwrap();
    assert_eq!(error.chars().count(), 20);
    assert!(error.ends_with('…'));
}
