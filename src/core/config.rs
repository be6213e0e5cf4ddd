//! Configuration: tuning constants and the section-keyed settings file
//!
//! The settings file is a JSON object keyed by section name. A section is
//! either a leaf holding CalDAV credentials (plus optional language model
//! overrides) or a group listing other sections under `"contains"`. Leaves
//! may pull keys from another section through `"inherits"`.

use crate::core::error::{AssistError, Result};
use ahash::AHashSet;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default language model service location
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// Model used when neither the CLI nor a section names one
pub const DEFAULT_OLLAMA_MODEL: &str = "llama2";

/// Section used when none is requested
pub const DEFAULT_SECTION: &str = "default";

/// Timeouts and pacing for the assistant
#[derive(Debug, Clone)]
pub struct AssistConfig {
    // === INFERENCE ===
    /// Bound on the availability probe
    ///
    /// Kept short so an absent model service never stalls start-up.
    pub probe_timeout: Duration,

    /// Bound on the model listing request
    pub list_timeout: Duration,

    /// Bound on a single generation call
    ///
    /// Local inference on CPU can take tens of seconds for a short prompt.
    pub generate_timeout: Duration,

    // === CONSUMER LOOP ===
    /// How often the consumer loop drains the notification queue
    pub poll_interval: Duration,

    /// Longest error text forwarded in a failure notification
    pub max_error_chars: usize,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(2),
            list_timeout: Duration::from_secs(5),
            generate_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(100),
            max_error_chars: crate::core::error::MAX_ERROR_CHARS,
        }
    }
}

impl AssistConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.probe_timeout.is_zero() || self.generate_timeout.is_zero() {
            return Err("Timeouts must be positive".into());
        }

        if self.probe_timeout > self.generate_timeout {
            return Err(format!(
                "probe_timeout ({:?}) should not exceed generate_timeout ({:?})",
                self.probe_timeout, self.generate_timeout
            ));
        }

        if self.poll_interval.is_zero() {
            return Err("poll_interval must be positive".into());
        }

        if self.max_error_chars < 16 {
            return Err(format!(
                "max_error_chars ({}) is too small to carry a useful message",
                self.max_error_chars
            ));
        }

        Ok(())
    }
}

/// One resolved leaf section
///
/// Only `ollama_host` and `ollama_model` are interpreted here; everything
/// else is handed to the calendar collaborator as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionConfig {
    pub name: String,
    values: Map<String, Value>,
}

impl SectionConfig {
    pub fn new(name: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Non-empty string value for `key`
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn caldav_url(&self) -> Option<&str> {
        self.get_str("caldav_url")
    }

    pub fn ollama_host(&self) -> Option<&str> {
        self.get_str("ollama_host")
    }

    pub fn ollama_model(&self) -> Option<&str> {
        self.get_str("ollama_model")
    }
}

/// Language model location after applying section overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    pub host: String,
    pub model: String,
}

impl ModelSettings {
    /// The first section that sets a key wins; the fallbacks apply otherwise.
    pub fn resolve(sections: &[SectionConfig], host: &str, model: &str) -> Self {
        let host = sections
            .iter()
            .find_map(SectionConfig::ollama_host)
            .unwrap_or(host);
        let model = sections
            .iter()
            .find_map(SectionConfig::ollama_model)
            .unwrap_or(model);

        Self {
            host: host.to_string(),
            model: model.to_string(),
        }
    }
}

/// Parsed settings file
#[derive(Debug, Clone, Default)]
pub struct Settings {
    sections: Map<String, Value>,
}

impl Settings {
    /// `~/.config/calendar.conf`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calendar.conf")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AssistError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)?;
        match value {
            Value::Object(sections) => Ok(Self { sections }),
            _ => Err(AssistError::Config(
                "Settings must be a JSON object keyed by section name".into(),
            )),
        }
    }

    /// Expand a section name into the ordered leaf sections it covers
    ///
    /// `name` may be a comma separated list. When `default` is requested but
    /// missing, the first section of the file stands in for it.
    pub fn expand_section(&self, name: &str) -> Result<Vec<String>> {
        let mut leaves = Vec::new();
        let mut visited = AHashSet::new();

        for part in name.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let part = self.substitute_default(part)?;
            self.expand_into(&part, &mut visited, &mut leaves)?;
        }

        Ok(leaves)
    }

    fn substitute_default(&self, name: &str) -> Result<String> {
        if name == DEFAULT_SECTION && !self.sections.contains_key(DEFAULT_SECTION) {
            let first = self.sections.keys().next().ok_or_else(|| {
                AssistError::Config("Settings file has no sections".into())
            })?;
            tracing::debug!(section = %first, "No default section, using first section");
            return Ok(first.clone());
        }
        Ok(name.to_string())
    }

    fn expand_into(
        &self,
        name: &str,
        visited: &mut AHashSet<String>,
        leaves: &mut Vec<String>,
    ) -> Result<()> {
        if !visited.insert(name.to_string()) {
            return Ok(());
        }

        let section = self
            .sections
            .get(name)
            .and_then(Value::as_object)
            .ok_or_else(|| AssistError::Config(format!("Unknown section: {}", name)))?;

        match section.get("contains") {
            Some(Value::Array(members)) => {
                for member in members.iter().filter_map(Value::as_str) {
                    self.expand_into(member, visited, leaves)?;
                }
            }
            Some(_) => {
                return Err(AssistError::Config(format!(
                    "Section {} has a non-list \"contains\"",
                    name
                )))
            }
            None => leaves.push(name.to_string()),
        }

        Ok(())
    }

    /// Resolve one leaf section, applying `inherits` chains
    pub fn section(&self, name: &str) -> Result<SectionConfig> {
        let mut chain = Vec::new();
        let mut current = Some(name.to_string());

        while let Some(section_name) = current {
            if chain.contains(&section_name) {
                return Err(AssistError::Config(format!(
                    "Inheritance cycle through section {}",
                    section_name
                )));
            }
            let values = self
                .sections
                .get(&section_name)
                .and_then(Value::as_object)
                .ok_or_else(|| {
                    AssistError::Config(format!("Unknown section: {}", section_name))
                })?;
            current = values
                .get("inherits")
                .and_then(Value::as_str)
                .map(str::to_string);
            chain.push(section_name);
        }

        // Apply from the root ancestor down so nearer sections overwrite
        let mut merged = Map::new();
        for section_name in chain.iter().rev() {
            if let Some(values) = self.sections.get(section_name).and_then(Value::as_object) {
                for (key, value) in values {
                    if key != "inherits" {
                        merged.insert(key.clone(), value.clone());
                    }
                }
            }
        }

        Ok(SectionConfig::new(name, merged))
    }

    /// Expand then resolve every leaf of `name`
    pub fn resolve(&self, name: &str) -> Result<Vec<SectionConfig>> {
        self.expand_section(name)?
            .iter()
            .map(|leaf| self.section(leaf))
            .collect()
    }
}
