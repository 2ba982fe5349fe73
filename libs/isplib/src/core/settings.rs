// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Plugin settings: persisted ordered lines and UI-facing key/value updates.
//!
//! A settings file holds one field per line, in an order each plugin defines.
//! The first two lines are always the active input and output port indices.
//! Floats are written with three decimals, integers in decimal.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{IspError, Result};
use crate::core::lifecycle::PluginLifecycleState;
use crate::core::ports::ActivePortSelection;

/// File extension for per-plugin settings files.
pub const SETTINGS_FILE_EXTENSION: &str = "ini";

/// Ordered, line-based plugin settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginSettings {
    lines: Vec<String>,
}

impl PluginSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the settings file for a plugin instance.
    pub fn path_for(settings_dir: &Path, instance_name: &str) -> PathBuf {
        settings_dir.join(format!("{}.{}", instance_name, SETTINGS_FILE_EXTENSION))
    }

    pub fn clear_plugin_settings(&mut self) {
        self.lines.clear();
    }

    /// Append one field; order is significant.
    pub fn add_line_plugin_settings(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn add_float(&mut self, value: f64) {
        self.add_line_plugin_settings(format!("{:.3}", value));
    }

    pub fn add_int(&mut self, value: i64) {
        self.add_line_plugin_settings(value.to_string());
    }

    pub fn add_bool(&mut self, value: bool) {
        self.add_int(value as i64);
    }

    pub fn add_port_selection(&mut self, selection: ActivePortSelection) {
        self.add_int(selection.active_input_index as i64);
        self.add_int(selection.active_output_index as i64);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn reader(&self) -> SettingsReader<'_> {
        SettingsReader {
            lines: &self.lines,
            position: 0,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut content = self.lines.join("\n");
        content.push('\n');
        std::fs::write(path, content)?;
        tracing::debug!("Saved {} settings lines to {}", self.lines.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IspError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let lines = content
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect();
        Ok(Self { lines })
    }
}

/// Sequential reader over [`PluginSettings`] fields.
pub struct SettingsReader<'a> {
    lines: &'a [String],
    position: usize,
}

impl<'a> SettingsReader<'a> {
    pub fn next_str(&mut self) -> Result<&'a str> {
        let line = self.lines.get(self.position).ok_or_else(|| {
            IspError::Configuration(format!(
                "Invalid line count: expected more than {} lines",
                self.position
            ))
        })?;
        self.position += 1;
        Ok(line.trim())
    }

    pub fn next_parsed<T>(&mut self) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let line_number = self.position + 1;
        let raw = self.next_str()?;
        raw.parse::<T>().map_err(|e| {
            IspError::Configuration(format!("line {}: '{}': {}", line_number, raw, e))
        })
    }

    pub fn next_bool(&mut self) -> Result<bool> {
        Ok(self.next_parsed::<i64>()? != 0)
    }

    pub fn next_port_selection(&mut self) -> Result<ActivePortSelection> {
        let input = self.next_parsed::<usize>()?;
        let output = self.next_parsed::<usize>()?;
        Ok(ActivePortSelection::new(input, output))
    }

    pub fn remaining(&self) -> usize {
        self.lines.len().saturating_sub(self.position)
    }
}

/// Key/value settings submitted by the UI or the pipeline config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsUpdate {
    values: BTreeMap<String, String>,
}

impl SettingsUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// Parse `key` if present.
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| {
                    IspError::Configuration(format!("setting '{}' = '{}': {}", key, raw, e))
                })
            })
            .transpose()
    }

    /// Reject keys outside `known`.
    pub fn ensure_known_keys(&self, known: &[&str]) -> Result<()> {
        match self.values.keys().find(|key| !known.contains(&key.as_str())) {
            Some(unknown) => Err(IspError::Configuration(format!(
                "unknown setting '{}' (expected one of: {})",
                unknown,
                known.join(", ")
            ))),
            None => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Build from a JSON object; scalars are stringified, nulls skipped.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let object = match value {
            serde_json::Value::Null => return Ok(Self::default()),
            serde_json::Value::Object(object) => object,
            other => {
                return Err(IspError::Configuration(format!(
                    "plugin settings must be a mapping, got {}",
                    other
                )));
            }
        };

        let mut update = Self::new();
        for (key, value) in object {
            match value {
                serde_json::Value::Null => {}
                serde_json::Value::String(s) => update.insert(key.clone(), s),
                serde_json::Value::Bool(_) | serde_json::Value::Number(_) => {
                    update.insert(key.clone(), value)
                }
                other => {
                    return Err(IspError::Configuration(format!(
                        "setting '{}' must be a scalar, got {}",
                        key, other
                    )));
                }
            }
        }
        Ok(update)
    }
}

/// One parameter shown in a settings surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingField {
    pub key: String,
    pub value: String,
    /// Allowed values, empty when free-form.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl SettingField {
    pub fn new(key: impl Into<String>, value: impl ToString) -> Self {
        Self {
            key: key.into(),
            value: value.to_string(),
            choices: Vec::new(),
        }
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.choices = choices.into_iter().map(|c| c.to_string()).collect();
        self
    }
}

/// Snapshot of a plugin's settings surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsView {
    pub plugin: String,
    pub instance: String,
    pub fields: Vec<SettingField>,
    /// Lifecycle state when the surface was opened.
    pub state: PluginLifecycleState,
}
