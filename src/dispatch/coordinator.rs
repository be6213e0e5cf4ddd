//! Dispatch coordinator
//!
//! Lives on the consumer thread. `submit` hands one utterance to a task on
//! the tokio runtime; that task parses, maps and writes, pushing a
//! [`Notification`] after each step. The consumer calls [`Dispatcher::drain`]
//! on a fixed interval, which is the only place the pending task's state
//! changes. At most one submission is active; it always ends in Completed
//! or Failed, after which the coordinator is idle again.

use crate::calendar::backend::CalendarBackend;
use crate::calendar::registry::CalendarRegistry;
use crate::command::executor::{CommandExecutor, ExecutionResult};
use crate::command::operation::to_operation;
use crate::core::config::AssistConfig;
use crate::core::error::{truncate_message, AssistError, Result};
use crate::core::types::TaskId;
use crate::dispatch::notification::{Notification, Progress};
use crate::llm::parser::IntentParser;
use chrono::{DateTime, Local, NaiveDate};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Lifecycle of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Submitted,
    Parsing,
    Dispatching,
    Completed,
    Failed,
}

/// The in-flight submission, as seen by the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTask {
    pub id: TaskId,
    pub text: String,
    pub submitted_at: DateTime<Local>,
    pub state: TaskState,
    pub result_summary: Option<String>,
    pub error: Option<String>,
}

/// Why a submission was refused
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    #[error("nothing to submit")]
    Empty,
    #[error("a request is already in progress")]
    Busy,
}

/// Parser and calendar groups, replaced wholesale on reconfiguration
#[derive(Debug, Clone)]
pub struct DispatchSnapshot {
    pub parser: IntentParser,
    pub registry: CalendarRegistry,
}

type TodayFn = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Single-consumer coordinator for background submissions
pub struct Dispatcher {
    runtime: Handle,
    backend: Arc<dyn CalendarBackend>,
    snapshot: Arc<DispatchSnapshot>,
    config: AssistConfig,
    today: TodayFn,
    sender: UnboundedSender<Notification>,
    receiver: UnboundedReceiver<Notification>,
    active: Option<PendingTask>,
    last_finished: Option<PendingTask>,
}

impl Dispatcher {
    pub fn new(
        runtime: Handle,
        backend: Arc<dyn CalendarBackend>,
        snapshot: DispatchSnapshot,
        config: AssistConfig,
    ) -> Self {
        let (sender, receiver) = unbounded_channel();
        Self {
            runtime,
            backend,
            snapshot: Arc::new(snapshot),
            config,
            today: Arc::new(|| Local::now().date_naive()),
            sender,
            receiver,
            active: None,
            last_finished: None,
        }
    }

    /// Resolve relative dates against a fixed day instead of the clock
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Arc::new(move || today);
        self
    }

    /// Swap in a new parser/registry; in-flight work keeps the old one
    pub fn reconfigure(&mut self, snapshot: DispatchSnapshot) {
        tracing::info!(
            calendars = snapshot.registry.calendars().len(),
            model = ?snapshot.parser.model(),
            "Dispatcher reconfigured"
        );
        self.snapshot = Arc::new(snapshot);
    }

    pub fn snapshot(&self) -> &DispatchSnapshot {
        &self.snapshot
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn active(&self) -> Option<&PendingTask> {
        self.active.as_ref()
    }

    /// Most recent submission that reached a terminal state
    pub fn last_finished(&self) -> Option<&PendingTask> {
        self.last_finished.as_ref()
    }

    /// Start processing `text` in the background
    pub fn submit(&mut self, text: &str) -> std::result::Result<TaskId, SubmitRejection> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitRejection::Empty);
        }
        if self.active.is_some() {
            tracing::debug!("Submission rejected, request in progress");
            return Err(SubmitRejection::Busy);
        }

        let id = TaskId::new();
        self.active = Some(PendingTask {
            id,
            text: text.to_string(),
            submitted_at: Local::now(),
            state: TaskState::Submitted,
            result_summary: None,
            error: None,
        });
        let _ = self.sender.send(Notification::new(
            id,
            Progress::Submitted {
                text: text.to_string(),
            },
        ));

        let job = Submission {
            id,
            text: text.to_string(),
            today: (self.today)(),
            snapshot: Arc::clone(&self.snapshot),
            backend: Arc::clone(&self.backend),
            sender: self.sender.clone(),
            max_error_chars: self.config.max_error_chars,
        };

        let worker = self.runtime.spawn(job.run());
        self.supervise(id, worker);

        tracing::info!(task = %id, "Submitted");
        Ok(id)
    }

    /// A panicking worker still has to release the coordinator
    fn supervise(&self, id: TaskId, worker: JoinHandle<()>) {
        let sender = self.sender.clone();
        self.runtime.spawn(async move {
            if let Err(e) = worker.await {
                tracing::error!(task = %id, error = %e, "Submission worker aborted");
                let _ = sender.send(Notification::new(
                    id,
                    Progress::Failed {
                        error: format!("internal error: {}", e),
                    },
                ));
            }
        });
    }

    /// Take every queued notification, in order, applying it to the active task
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut drained = Vec::new();
        while let Ok(notification) = self.receiver.try_recv() {
            self.apply(&notification);
            drained.push(notification);
        }
        drained
    }

    fn apply(&mut self, notification: &Notification) {
        let Some(task) = self.active.as_mut().filter(|t| t.id == notification.task) else {
            tracing::debug!(task = %notification.task, "Notification for inactive task");
            return;
        };

        match &notification.progress {
            Progress::Submitted { .. } => task.state = TaskState::Submitted,
            Progress::Parsing | Progress::Parsed { .. } => task.state = TaskState::Parsing,
            Progress::Dispatching { .. } => task.state = TaskState::Dispatching,
            Progress::Completed { summary, .. } => {
                task.state = TaskState::Completed;
                task.result_summary = Some(summary.clone());
            }
            Progress::Failed { error } => {
                task.state = TaskState::Failed;
                task.error = Some(error.clone());
            }
        }

        if notification.progress.is_terminal() {
            self.last_finished = self.active.take();
        }
    }

    /// Drain on the poll interval until idle or `timeout` elapses
    ///
    /// Blocks the calling thread; meant for the consumer thread only.
    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<Notification> {
        let deadline = Instant::now() + timeout;
        let mut drained = self.drain();
        while !self.is_idle() && Instant::now() < deadline {
            std::thread::sleep(self.config.poll_interval);
            drained.extend(self.drain());
        }
        drained
    }
}

/// Everything a background unit needs, moved onto the runtime
struct Submission {
    id: TaskId,
    text: String,
    today: NaiveDate,
    snapshot: Arc<DispatchSnapshot>,
    backend: Arc<dyn CalendarBackend>,
    sender: UnboundedSender<Notification>,
    max_error_chars: usize,
}

impl Submission {
    async fn run(self) {
        let terminal = match self.process().await {
            Ok(result) => {
                tracing::info!(task = %self.id, summary = %result.summary, "Completed");
                Progress::Completed {
                    kind: result.kind,
                    summary: result.summary,
                    calendar_url: result.calendar_url,
                }
            }
            Err(e) => {
                tracing::warn!(task = %self.id, error = %e, "Failed");
                Progress::Failed {
                    error: truncate_message(&e.to_string(), self.max_error_chars),
                }
            }
        };
        self.notify(terminal);
    }

    fn notify(&self, progress: Progress) {
        // The consumer may already be gone at shutdown
        let _ = self.sender.send(Notification::new(self.id, progress));
    }

    async fn process(&self) -> Result<ExecutionResult> {
        self.notify(Progress::Parsing);
        let outcome = self.snapshot.parser.parse(&self.text, self.today).await?;
        self.notify(Progress::Parsed {
            kind: outcome.intent.kind,
            summary: outcome.intent.summary.clone(),
            source: outcome.source,
        });

        let op = to_operation(&outcome.intent);
        let targets = self.snapshot.registry.targets_for(op.kind)?.len();
        self.notify(Progress::Dispatching { targets });

        let snapshot = Arc::clone(&self.snapshot);
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || {
            CommandExecutor::execute(&snapshot.registry, backend.as_ref(), &op)
        })
        .await
        .map_err(|e| AssistError::WriteFailure(format!("calendar write aborted: {}", e)))?
    }
}
