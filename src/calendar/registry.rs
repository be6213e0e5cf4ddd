//! Calendar registry - dedup and event/task classification
//!
//! Advertised components decide most collections. A URL that names a task
//! list (`task`, `todo`) overrides that: such a collection is task-only even
//! when the server also advertises VEVENT, so one write never lands in two
//! groups.

use crate::calendar::backend::{CalendarBackend, CalendarCollection};
use crate::core::config::SectionConfig;
use crate::core::error::{AssistError, Result};
use crate::llm::intent::IntentKind;
use ahash::AHashSet;
use std::sync::Arc;

/// URL fragments that mark a task list
const TASK_URL_KEYWORDS: &[&str] = &["task", "todo"];

/// A registered collection with its resolved metadata
#[derive(Debug, Clone)]
pub struct CalendarHandle {
    collection: Arc<dyn CalendarCollection>,
    url: String,
    components: Vec<String>,
}

impl CalendarHandle {
    fn new(collection: Arc<dyn CalendarCollection>) -> Self {
        let url = collection.url().unwrap_or_default();
        let components = match collection.supported_components() {
            Ok(components) => components.iter().map(|c| c.to_lowercase()).collect(),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Could not read supported components");
                Vec::new()
            }
        };

        Self {
            collection,
            url,
            components,
        }
    }

    /// Collection URL, empty when unknown
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn collection(&self) -> &Arc<dyn CalendarCollection> {
        &self.collection
    }

    /// Identity comparison on the underlying collection
    pub fn same_collection(&self, other: &CalendarHandle) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.collection) as *const (),
            Arc::as_ptr(&other.collection) as *const (),
        )
    }
}

/// Classified calendar collections
#[derive(Debug, Clone, Default)]
pub struct CalendarRegistry {
    calendars: Vec<CalendarHandle>,
    event_calendars: Vec<CalendarHandle>,
    task_calendars: Vec<CalendarHandle>,
    seen_urls: AHashSet<String>,
}

impl CalendarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover every section (errors logged, not raised) and register the results
    pub fn load(backend: &dyn CalendarBackend, sections: &[SectionConfig]) -> Self {
        let mut registry = Self::new();

        for section in sections {
            match backend.discover(section, false) {
                Ok(collections) => registry.register(collections),
                Err(e) => {
                    tracing::warn!(section = %section.name, error = %e, "Calendar discovery failed")
                }
            }
        }

        tracing::info!(
            total = registry.calendars.len(),
            events = registry.event_calendars.len(),
            tasks = registry.task_calendars.len(),
            "Calendars registered"
        );
        registry
    }

    /// Register discovered collections, skipping URLs already seen
    pub fn register<I>(&mut self, collections: I)
    where
        I: IntoIterator<Item = Arc<dyn CalendarCollection>>,
    {
        for collection in collections {
            let handle = CalendarHandle::new(collection);

            if !handle.url.is_empty() && !self.seen_urls.insert(handle.url.clone()) {
                tracing::debug!(url = %handle.url, "Skipping duplicate calendar");
                continue;
            }

            let (supports_event, supports_task) = classify(&handle);
            tracing::debug!(
                url = %handle.url,
                supports_event,
                supports_task,
                "Classified calendar"
            );

            if supports_task && !contains(&self.task_calendars, &handle) {
                self.task_calendars.push(handle.clone());
            }
            if supports_event && !contains(&self.event_calendars, &handle) {
                self.event_calendars.push(handle.clone());
            }
            self.calendars.push(handle);
        }
    }

    /// Every registered collection, in registration order
    pub fn calendars(&self) -> &[CalendarHandle] {
        &self.calendars
    }

    pub fn event_calendars(&self) -> &[CalendarHandle] {
        &self.event_calendars
    }

    pub fn task_calendars(&self) -> &[CalendarHandle] {
        &self.task_calendars
    }

    pub fn calendars_for(&self, kind: IntentKind) -> &[CalendarHandle] {
        match kind {
            IntentKind::Event => &self.event_calendars,
            IntentKind::Task => &self.task_calendars,
        }
    }

    /// Write targets for `kind`: its own group, else every calendar
    pub fn targets_for(&self, kind: IntentKind) -> Result<&[CalendarHandle]> {
        let group = self.calendars_for(kind);
        if !group.is_empty() {
            return Ok(group);
        }
        if !self.calendars.is_empty() {
            tracing::debug!(kind = %kind, "No dedicated calendar, using full list");
            return Ok(&self.calendars);
        }
        Err(AssistError::NoCompatibleCalendar(kind))
    }

    pub fn is_empty(&self) -> bool {
        self.calendars.is_empty()
    }
}

fn contains(group: &[CalendarHandle], handle: &CalendarHandle) -> bool {
    group.iter().any(|h| h.same_collection(handle))
}

/// (supports_event, supports_task)
fn classify(handle: &CalendarHandle) -> (bool, bool) {
    let url = handle.url.to_lowercase();
    let url_says_task = TASK_URL_KEYWORDS.iter().any(|kw| url.contains(kw));
    let declares = |name: &str| handle.components.iter().any(|c| c == name);

    let supports_task = declares("vtodo") || url_says_task;
    let mut supports_event =
        declares("vevent") || (handle.components.is_empty() && !supports_task);

    if supports_task && url_says_task {
        supports_event = false;
    }

    (supports_event, supports_task)
}
