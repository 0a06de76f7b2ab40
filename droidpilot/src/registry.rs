//! Version-indexed locator table.
//!
//! Widget ids of the automated app change between releases. Workflows refer
//! to widgets by [`LogicalNodeKey`] and the registry maps each
//! `(version, key)` pair to the concrete id for that release. Lookups fail
//! closed: a missing version or key is a configuration error, never a
//! fallback to another release's id.

use crate::errors::{AutomationError, ConfigError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Version-independent name of a widget, e.g. `home.search.button`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalNodeKey(String);

impl LogicalNodeKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalNodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LogicalNodeKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for LogicalNodeKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for LogicalNodeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for LogicalNodeKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One row of a locator table as written in YAML/JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorEntry {
    pub id: String,
    /// Regular expression the node text must match in full; empty means any
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl LocatorEntry {
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: String::new(),
            description: String::new(),
        }
    }

    pub fn text(mut self, pattern: impl Into<String>) -> Self {
        self.text = pattern.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Serialized form of a whole registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorTable {
    pub versions: BTreeMap<String, BTreeMap<String, LocatorEntry>>,
}

/// A concrete locator for one key in one app version
#[derive(Debug, Clone)]
pub struct VersionedLocator {
    version: String,
    key: LogicalNodeKey,
    concrete_id: String,
    display_text_pattern: Option<String>,
    text_regex: Option<Regex>,
    description: String,
}

impl VersionedLocator {
    fn compile(version: &str, key: &str, entry: LocatorEntry) -> Result<Self, AutomationError> {
        let (display_text_pattern, text_regex) = if entry.text.is_empty() {
            (None, None)
        } else {
            let regex = Regex::new(&format!("^(?:{})$", entry.text)).map_err(|e| {
                ConfigError::InvalidPattern {
                    version: version.to_string(),
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            })?;
            (Some(entry.text), Some(regex))
        };
        Ok(Self {
            version: version.to_string(),
            key: LogicalNodeKey::new(key),
            concrete_id: entry.id,
            display_text_pattern,
            text_regex,
            description: entry.description,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn key(&self) -> &LogicalNodeKey {
        &self.key
    }

    pub fn concrete_id(&self) -> &str {
        &self.concrete_id
    }

    pub fn display_text_pattern(&self) -> Option<&str> {
        self.display_text_pattern.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn has_text_filter(&self) -> bool {
        self.text_regex.is_some()
    }

    /// Whether a node text satisfies the pattern. Nodes without text are
    /// treated as having empty text.
    pub fn matches_text(&self, text: Option<&str>) -> bool {
        match &self.text_regex {
            Some(regex) => regex.is_match(text.unwrap_or_default()),
            None => true,
        }
    }

    fn to_entry(&self) -> LocatorEntry {
        LocatorEntry {
            id: self.concrete_id.clone(),
            text: self.display_text_pattern.clone().unwrap_or_default(),
            description: self.description.clone(),
        }
    }
}

/// The locators of a single app version
#[derive(Debug, Clone, Copy)]
pub struct LocatorSet<'a> {
    version: &'a str,
    entries: &'a BTreeMap<LogicalNodeKey, VersionedLocator>,
}

impl<'a> LocatorSet<'a> {
    pub fn version(&self) -> &'a str {
        self.version
    }

    pub fn get(&self, key: impl AsRef<str>) -> Result<&'a VersionedLocator, AutomationError> {
        let key = key.as_ref();
        self.entries.get(key).ok_or_else(|| {
            ConfigError::MissingKey {
                version: self.version.to_string(),
                key: key.to_string(),
            }
            .into()
        })
    }

    pub fn contains(&self, key: impl AsRef<str>) -> bool {
        self.entries.contains_key(key.as_ref())
    }

    pub fn keys(&self) -> impl Iterator<Item = &'a LogicalNodeKey> + 'a {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read-only `(version, key) -> locator` table, built once at startup
#[derive(Debug, Clone, Default)]
pub struct VersionedNodeRegistry {
    versions: BTreeMap<String, BTreeMap<LogicalNodeKey, VersionedLocator>>,
}

impl VersionedNodeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Select the locator set of `version`
    pub fn resolve(&self, version: &str) -> Result<LocatorSet<'_>, AutomationError> {
        let (version, entries) = self
            .versions
            .get_key_value(version)
            .ok_or_else(|| ConfigError::MissingVersion(version.to_string()))?;
        debug!(version, keys = entries.len(), "Resolved locator set");
        Ok(LocatorSet { version, entries })
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.versions.keys().map(String::as_str)
    }

    /// Every key known to any version, sorted and deduplicated
    pub fn keys(&self) -> Vec<&LogicalNodeKey> {
        let mut keys: Vec<&LogicalNodeKey> = self.versions.values().flat_map(|e| e.keys()).collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Check that every version defines every key in `keys`. All gaps are
    /// reported together.
    pub fn validate_keys<I, K>(&self, keys: I) -> Result<(), AutomationError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let keys: Vec<String> = keys.into_iter().map(|k| k.as_ref().to_string()).collect();
        let missing: Vec<(String, String)> = self
            .versions
            .iter()
            .flat_map(|(version, entries)| {
                keys.iter()
                    .filter(|key| !entries.contains_key(key.as_str()))
                    .map(|key| (version.clone(), key.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Incomplete(missing).into())
        }
    }

    pub fn from_table(table: LocatorTable) -> Result<Self, AutomationError> {
        let mut builder = Self::builder();
        for (version, entries) in table.versions {
            for (key, entry) in entries {
                builder = builder.register(version.as_str(), key, entry);
            }
        }
        builder.build()
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, AutomationError> {
        let table: LocatorTable =
            serde_yaml::from_str(source).map_err(|e| AutomationError::Parse(e.to_string()))?;
        Self::from_table(table)
    }

    pub fn from_json_str(source: &str) -> Result<Self, AutomationError> {
        let table: LocatorTable =
            serde_json::from_str(source).map_err(|e| AutomationError::Parse(e.to_string()))?;
        Self::from_table(table)
    }

    /// Load a table file; `.json` files are read as JSON, anything else as YAML
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AutomationError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| AutomationError::Parse(format!("{}: {e}", path.display())))?;
        let registry = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&source)?,
            _ => Self::from_yaml_str(&source)?,
        };
        info!(
            path = %path.display(),
            versions = registry.versions.len(),
            "Loaded locator table"
        );
        Ok(registry)
    }

    /// Serializable form, e.g. for printing a table back out
    pub fn to_table(&self) -> LocatorTable {
        LocatorTable {
            versions: self
                .versions
                .iter()
                .map(|(version, entries)| {
                    let rows = entries
                        .iter()
                        .map(|(key, locator)| (key.to_string(), locator.to_entry()))
                        .collect();
                    (version.clone(), rows)
                })
                .collect(),
        }
    }
}

/// Collects `(version, key, entry)` rows and validates them into a registry
#[derive(Debug, Clone, Default)]
pub struct RegistryBuilder {
    rows: Vec<(String, String, LocatorEntry)>,
}

impl RegistryBuilder {
    pub fn register(
        mut self,
        version: impl Into<String>,
        key: impl Into<String>,
        entry: LocatorEntry,
    ) -> Self {
        self.rows.push((version.into(), key.into(), entry));
        self
    }

    /// Shorthand for an entry with only an id
    pub fn locator(self, version: impl Into<String>, key: impl Into<String>, id: impl Into<String>) -> Self {
        self.register(version, key, LocatorEntry::id(id))
    }

    pub fn build(self) -> Result<VersionedNodeRegistry, AutomationError> {
        let mut versions: BTreeMap<String, BTreeMap<LogicalNodeKey, VersionedLocator>> = BTreeMap::new();
        for (version, key, entry) in self.rows {
            let locator = VersionedLocator::compile(&version, &key, entry)?;
            let entries = versions.entry(version.clone()).or_default();
            if entries.contains_key(key.as_str()) {
                return Err(ConfigError::DuplicateKey { version, key }.into());
            }
            entries.insert(LogicalNodeKey::new(key), locator);
        }
        Ok(VersionedNodeRegistry { versions })
    }
}
