//! Plugin file set and the validation boundary in front of the filesystem.
//!
//! [`PluginFileSet`] maps relative paths to contents.  It is produced by the
//! block parser from untrusted model output, so nothing reaches the disk
//! before [`PluginFileSet::validate`] has checked it against the QGIS plugin
//! contract:
//!
//! | Check | Rule |
//! |-------|------|
//! | Paths | relative, `/`-separated, normal components only |
//! | Manifest | `metadata.txt` with a `[general]` section and the required keys |
//! | Entry point | `__init__.py` defining `classFactory(` |
//! | Content | every file non-empty (whitespace-only text counts as empty) |
//!
//! Violations are reported, never repaired.

use std::collections::BTreeMap;

use thiserror::Error;

/// Manifest file read by the QGIS plugin manager.
pub const MANIFEST_FILE: &str = "metadata.txt";

/// Module the QGIS loader imports; it must expose `classFactory(iface)`.
pub const ENTRY_POINT_FILE: &str = "__init__.py";

/// Keys QGIS refuses to load a plugin without.
pub const REQUIRED_MANIFEST_KEYS: [&str; 5] =
    ["name", "qgisMinimumVersion", "description", "version", "author"];

const ENTRY_POINT_SYMBOL: &str = "classFactory(";

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Reason a [`PluginFileSet`] was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsafe file path {path:?}: {reason}")]
    UnsafePath { path: String, reason: &'static str },

    #[error("the plugin has no metadata.txt manifest")]
    MissingManifest,

    #[error("metadata.txt has no [general] section")]
    ManifestSectionMissing,

    #[error("metadata.txt is missing required key {0:?}")]
    ManifestKeyMissing(&'static str),

    #[error("the plugin has no __init__.py entry point")]
    MissingEntryPoint,

    #[error("__init__.py does not define classFactory(iface)")]
    EntryPointWithoutFactory,

    #[error("file {0:?} has empty content")]
    EmptyFile(String),
}

// ---------------------------------------------------------------------------
// FileContent
// ---------------------------------------------------------------------------

/// Content of one plugin file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    /// Icons and other binary resources, carried as base64 in the block grammar.
    Binary(Vec<u8>),
}

impl FileContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileContent::Text(text) => text.as_bytes(),
            FileContent::Binary(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileContent::Text(text) => Some(text),
            FileContent::Binary(_) => None,
        }
    }

    /// `true` for zero bytes or whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            FileContent::Text(text) => text.trim().is_empty(),
            FileContent::Binary(bytes) => bytes.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Path checks
// ---------------------------------------------------------------------------

/// Check that `path` stays inside the plugin directory.
///
/// Accepted paths are relative, `/`-separated and made only of normal
/// components.  `..`, `.`, empty segments, absolute paths, drive prefixes and
/// backslashes are all rejected.
pub fn check_relative_path(path: &str) -> Result<(), ValidationError> {
    let unsafe_path = |reason| ValidationError::UnsafePath {
        path: path.to_string(),
        reason,
    };

    if path.is_empty() {
        return Err(unsafe_path("empty path"));
    }
    if path.contains('\\') {
        return Err(unsafe_path("backslash separator"));
    }
    if path.contains('\0') {
        return Err(unsafe_path("NUL byte"));
    }
    if path.starts_with('/') {
        return Err(unsafe_path("absolute path"));
    }
    if path.contains(':') {
        return Err(unsafe_path("drive or stream prefix"));
    }

    for segment in path.split('/') {
        match segment {
            "" => return Err(unsafe_path("empty path segment")),
            "." => return Err(unsafe_path("current-directory segment")),
            ".." => return Err(unsafe_path("parent-directory traversal")),
            _ => {}
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Parse the `[general]` section of a `metadata.txt` into key/value pairs.
///
/// Returns `None` when the section is absent.  Continuation lines and other
/// sections are ignored.
pub fn manifest_fields(manifest: &str) -> Option<BTreeMap<String, String>> {
    let mut in_general = false;
    let mut seen_general = false;
    let mut fields = BTreeMap::new();

    for line in manifest.lines() {
        let line = line.trim();
        if line.starts_with('[') && line.ends_with(']') {
            in_general = line[1..line.len() - 1].trim().eq_ignore_ascii_case("general");
            seen_general |= in_general;
            continue;
        }
        if !in_general || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            fields.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    seen_general.then_some(fields)
}

// ---------------------------------------------------------------------------
// PluginFileSet
// ---------------------------------------------------------------------------

/// Mapping from relative path to file content for one generated plugin.
///
/// Paths are kept sorted so serialisation and archive order are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginFileSet {
    files: BTreeMap<String, FileContent>,
}

impl PluginFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, returning the previous content stored at `path`.
    pub fn insert(&mut self, path: impl Into<String>, content: FileContent) -> Option<FileContent> {
        self.files.insert(path.into(), content)
    }

    pub fn get(&self, path: &str) -> Option<&FileContent> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileContent)> {
        self.files.iter().map(|(path, content)| (path.as_str(), content))
    }

    /// Total payload size in bytes.
    pub fn total_bytes(&self) -> usize {
        self.files.values().map(FileContent::len).sum()
    }

    /// Check the set against the QGIS plugin contract.
    ///
    /// Path safety is checked first so that a traversal attempt is reported
    /// even when the manifest is also missing.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for path in self.files.keys() {
            check_relative_path(path)?;
        }

        for (path, content) in &self.files {
            if content.is_blank() {
                return Err(ValidationError::EmptyFile(path.clone()));
            }
        }

        let manifest = self
            .files
            .get(MANIFEST_FILE)
            .ok_or(ValidationError::MissingManifest)?;
        let manifest_text = manifest
            .as_text()
            .ok_or(ValidationError::ManifestSectionMissing)?;
        let fields =
            manifest_fields(manifest_text).ok_or(ValidationError::ManifestSectionMissing)?;
        for key in REQUIRED_MANIFEST_KEYS {
            if fields.get(key).map_or(true, |v| v.is_empty()) {
                return Err(ValidationError::ManifestKeyMissing(key));
            }
        }

        let entry = self
            .files
            .get(ENTRY_POINT_FILE)
            .ok_or(ValidationError::MissingEntryPoint)?;
        if !entry
            .as_text()
            .is_some_and(|text| text.contains(ENTRY_POINT_SYMBOL))
        {
            return Err(ValidationError::EntryPointWithoutFactory);
        }

        Ok(())
    }
}

impl FromIterator<(String, FileContent)> for PluginFileSet {
    fn from_iter<I: IntoIterator<Item = (String, FileContent)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const METADATA: &str = "[general]\n\
name=AreaCalc\n\
qgisMinimumVersion=3.0\n\
description=Computes polygon areas\n\
version=1.0.0\n\
author=Jane GIS\n\
email=jane@example.com\n";

    pub(crate) const INIT_PY: &str = "def classFactory(iface):\n    from .main_plugin import AreaCalc\n    return AreaCalc(iface)\n";

    pub(crate) fn minimal_set() -> PluginFileSet {
        let mut set = PluginFileSet::new();
        set.insert(MANIFEST_FILE, FileContent::Text(METADATA.into()));
        set.insert(ENTRY_POINT_FILE, FileContent::Text(INIT_PY.into()));
        set.insert(
            "main_plugin.py",
            FileContent::Text("class AreaCalc:\n    pass\n".into()),
        );
        set
    }

    #[test]
    fn minimal_set_is_valid() {
        assert_eq!(minimal_set().validate(), Ok(()));
    }

    #[test]
    fn nested_paths_are_accepted() {
        assert!(check_relative_path("i18n/plugin_es.ts").is_ok());
        assert!(check_relative_path("icons/icon.png").is_ok());
        assert!(check_relative_path("..hidden").is_ok());
    }

    #[test]
    fn traversal_and_absolute_paths_are_rejected() {
        for bad in [
            "../evil.py",
            "icons/../../evil.py",
            "/etc/passwd",
            "C:/Windows/evil.dll",
            "..\\evil.py",
            "a//b.py",
            "./a.py",
            "",
        ] {
            assert!(
                matches!(
                    check_relative_path(bad),
                    Err(ValidationError::UnsafePath { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn traversal_in_set_fails_validation() {
        let mut set = minimal_set();
        set.insert("../outside.py", FileContent::Text("print('x')\n".into()));
        assert!(matches!(
            set.validate(),
            Err(ValidationError::UnsafePath { .. })
        ));
    }

    #[test]
    fn missing_manifest_fails() {
        let mut set = PluginFileSet::new();
        set.insert(ENTRY_POINT_FILE, FileContent::Text(INIT_PY.into()));
        assert_eq!(set.validate(), Err(ValidationError::MissingManifest));
    }

    #[test]
    fn missing_entry_point_fails() {
        let mut set = PluginFileSet::new();
        set.insert(MANIFEST_FILE, FileContent::Text(METADATA.into()));
        assert_eq!(set.validate(), Err(ValidationError::MissingEntryPoint));
    }

    #[test]
    fn entry_point_without_class_factory_fails() {
        let mut set = minimal_set();
        set.insert(ENTRY_POINT_FILE, FileContent::Text("import os\n".into()));
        assert_eq!(set.validate(), Err(ValidationError::EntryPointWithoutFactory));
    }

    #[test]
    fn manifest_without_required_key_fails() {
        let mut set = minimal_set();
        let without_author: String = METADATA
            .lines()
            .filter(|l| !l.starts_with("author"))
            .map(|l| format!("{l}\n"))
            .collect();
        set.insert(MANIFEST_FILE, FileContent::Text(without_author));
        assert_eq!(
            set.validate(),
            Err(ValidationError::ManifestKeyMissing("author"))
        );
    }

    #[test]
    fn manifest_without_general_section_fails() {
        let mut set = minimal_set();
        set.insert(MANIFEST_FILE, FileContent::Text("name=AreaCalc\n".into()));
        assert_eq!(set.validate(), Err(ValidationError::ManifestSectionMissing));
    }

    #[test]
    fn blank_file_fails() {
        let mut set = minimal_set();
        set.insert("resources.qrc", FileContent::Text("  \n\t\n".into()));
        assert_eq!(
            set.validate(),
            Err(ValidationError::EmptyFile("resources.qrc".into()))
        );
    }

    #[test]
    fn manifest_fields_ignores_other_sections_and_comments() {
        let text = "; comment\n[general]\nname = Demo\n# note\nversion=0.1\n[extra]\nname=Other\n";
        let fields = manifest_fields(text).expect("general section");
        assert_eq!(fields.get("name").map(String::as_str), Some("Demo"));
        assert_eq!(fields.get("version").map(String::as_str), Some("0.1"));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn total_bytes_sums_all_files() {
        let set = minimal_set();
        let expected = METADATA.len() + INIT_PY.len() + "class AreaCalc:\n    pass\n".len();
        assert_eq!(set.total_bytes(), expected);
    }
}
