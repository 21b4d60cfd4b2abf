//! Generation request: the immutable input of one pipeline run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{PluginDefaults, PluginKind};
use crate::package::is_valid_plugin_name;

/// Descriptions shorter than this are accepted but flagged as terse.
pub const TERSE_DESCRIPTION_CHARS: usize = 20;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("the plugin description is empty")]
    EmptyDescription,

    #[error("invalid plugin name {0:?}: use letters, digits and underscores, not starting with a digit")]
    InvalidName(String),
}

// ---------------------------------------------------------------------------
// PluginOptions
// ---------------------------------------------------------------------------

/// Manifest metadata and UI toggles rendered into the Analyst and Developer
/// instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginOptions {
    pub version: String,
    pub author: String,
    pub email: String,
    pub qgis_minimum_version: String,
    pub kind: PluginKind,
    pub add_menu: bool,
    pub add_toolbar: bool,
    pub add_dialog: bool,
}

impl From<&PluginDefaults> for PluginOptions {
    fn from(defaults: &PluginDefaults) -> Self {
        Self {
            version: defaults.version.clone(),
            author: defaults.author.clone(),
            email: defaults.email.clone(),
            qgis_minimum_version: defaults.qgis_minimum_version.clone(),
            kind: defaults.kind,
            add_menu: defaults.add_menu,
            add_toolbar: defaults.add_toolbar,
            add_dialog: defaults.add_dialog,
        }
    }
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self::from(&PluginDefaults::default())
    }
}

impl PluginOptions {
    /// Bullet list of the UI integration points the user asked for.
    pub fn ui_requirements(&self) -> Vec<&'static str> {
        let mut items = Vec::new();
        if self.add_menu {
            items.push("an entry in the QGIS Plugins menu");
        }
        if self.add_toolbar {
            items.push("a button on the QGIS plugins toolbar");
        }
        if self.add_dialog {
            items.push("a configuration dialog (QDialog) for the plugin parameters");
        }
        items
    }
}

// ---------------------------------------------------------------------------
// GenerationRequest
// ---------------------------------------------------------------------------

/// What the user asked for.  Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    description: String,
    plugin_name: String,
    options: PluginOptions,
}

impl GenerationRequest {
    /// Build a request, trimming the description.
    ///
    /// The plugin name becomes the package directory QGIS imports, so it must
    /// be a Python identifier.
    pub fn new(
        description: impl Into<String>,
        plugin_name: impl Into<String>,
        options: PluginOptions,
    ) -> Result<Self, RequestError> {
        let description = description.into().trim().to_string();
        let plugin_name = plugin_name.into().trim().to_string();

        if description.is_empty() {
            return Err(RequestError::EmptyDescription);
        }
        if !is_valid_plugin_name(&plugin_name) {
            return Err(RequestError::InvalidName(plugin_name));
        }

        Ok(Self {
            description,
            plugin_name,
            options,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn options(&self) -> &PluginOptions {
        &self.options
    }

    /// `true` when the description is short enough that the front end
    /// should warn the user.  The Analyst stage still runs.
    pub fn is_terse(&self) -> bool {
        self.description.chars().count() < TERSE_DESCRIPTION_CHARS
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
