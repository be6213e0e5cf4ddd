//! Calendar backend that drives the `plann` command line tool
//!
//! Each settings section contributes one collection per configured calendar
//! URL (`calendar_url`, a string or list, else `caldav_url`). Components can
//! be declared in the section as `"components": ["VTODO"]`; otherwise none
//! are declared and the registry falls back on its URL rules.

use crate::calendar::backend::{CalendarBackend, CalendarCollection};
use crate::calendar::registry::CalendarHandle;
use crate::command::operation::{OperationDescriptor, ATTR_ALARM, ATTR_DUE, ATTR_LOCATION};
use crate::core::config::SectionConfig;
use crate::core::error::{AssistError, Result};
use crate::llm::intent::IntentKind;
use serde_json::Value;
use std::any::Any;
use std::process::Command;
use std::sync::Arc;

/// Collection defined by a settings section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionCollection {
    pub section: String,
    pub url: String,
    pub components: Option<Vec<String>>,
}

impl CalendarCollection for SectionCollection {
    fn url(&self) -> Option<String> {
        Some(self.url.clone()).filter(|u| !u.is_empty())
    }

    fn supported_components(&self) -> Result<Vec<String>> {
        Ok(self.components.clone().unwrap_or_default())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `plann` subprocess backend
#[derive(Debug, Clone)]
pub struct PlannCli {
    program: String,
}

impl Default for PlannCli {
    fn default() -> Self {
        Self::new("plann")
    }
}

impl PlannCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Collections named by a section, without touching the network
    pub fn collections(section: &SectionConfig) -> Vec<SectionCollection> {
        let components = section.get("components").and_then(|v| match v {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            _ => None,
        });

        let urls: Vec<String> = match section.get("calendar_url") {
            Some(Value::String(url)) if !url.trim().is_empty() => vec![url.trim().to_string()],
            Some(Value::Array(urls)) => urls
                .iter()
                .filter_map(Value::as_str)
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect(),
            _ => section.caldav_url().map(str::to_string).into_iter().collect(),
        };

        urls.into_iter()
            .map(|url| SectionCollection {
                section: section.name.clone(),
                url,
                components: components.clone(),
            })
            .collect()
    }

    /// Arguments for one `plann add` invocation
    pub fn add_args(target: &SectionCollection, op: &OperationDescriptor) -> Vec<String> {
        let component = match op.kind {
            IntentKind::Event => "event",
            IntentKind::Task => "todo",
        };
        let mut args: Vec<String> = vec![
            "--config-section".into(),
            target.section.clone(),
            "--calendar-url".into(),
            target.url.clone(),
            "add".into(),
            component.into(),
        ];

        let mut option = |flag: &str, value: Option<String>| {
            if let Some(value) = value {
                args.push(flag.to_string());
                args.push(value);
            }
        };

        match op.kind {
            IntentKind::Event => {
                option("--alarm", op.text(ATTR_ALARM).map(str::to_string));
                option("--set-location", op.text(ATTR_LOCATION).map(str::to_string));
            }
            IntentKind::Task => {
                option("--set-due", op.text(ATTR_DUE).map(str::to_string));
                option("--set-priority", op.priority().map(|p| p.to_string()));
                option("--set-alarm", op.text(ATTR_ALARM).map(str::to_string));
            }
        }

        // Positionals may start with '-'
        args.push("--".into());
        if let Some(timespec) = &op.timespec {
            args.push(timespec.clone());
        }
        args.push(op.summary.clone());
        args
    }
}

impl CalendarBackend for PlannCli {
    fn discover(
        &self,
        section: &SectionConfig,
        raise_errors: bool,
    ) -> Result<Vec<Arc<dyn CalendarCollection>>> {
        let collections = Self::collections(section);
        if collections.is_empty() {
            let message = format!("section {} has no calendar URL", section.name);
            if raise_errors {
                return Err(AssistError::Discovery(message));
            }
            tracing::warn!("{}", message);
        }

        Ok(collections
            .into_iter()
            .map(|c| Arc::new(c) as Arc<dyn CalendarCollection>)
            .collect())
    }

    /// Writes into the first target, which the registry orders by preference
    fn write(&self, targets: &[CalendarHandle], op: &OperationDescriptor) -> Result<()> {
        let target = targets
            .first()
            .ok_or(AssistError::NoCompatibleCalendar(op.kind))?;
        let collection = target
            .collection()
            .as_any()
            .downcast_ref::<SectionCollection>()
            .ok_or_else(|| {
                AssistError::WriteFailure(format!(
                    "{} was not discovered through plann",
                    target.url()
                ))
            })?;

        let args = Self::add_args(collection, op);
        tracing::info!(program = %self.program, ?args, "Running calendar write");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| AssistError::WriteFailure(format!("could not run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(AssistError::WriteFailure(if detail.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                detail.to_string()
            }));
        }

        Ok(())
    }
}
