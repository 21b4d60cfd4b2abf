//! Zip packaging of a validated plugin file set.
//!
//! [`PluginPackager::package`] is the only place generated content touches
//! the filesystem.  It validates the set, writes the archive to a temporary
//! file inside the output directory and persists it under
//! `<output_dir>/<plugin_name>.zip` in one rename, so a failed run never
//! leaves a partial archive behind.
//!
//! Archive layout:
//!
//! ```text
//! AreaCalc.zip
//! └── AreaCalc/
//!     ├── __init__.py
//!     ├── main_plugin.py
//!     └── metadata.txt
//! ```

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use zip::write::SimpleFileOptions;

use crate::config::{CollisionPolicy, OutputConfig};

use super::fileset::{PluginFileSet, ValidationError};

// ---------------------------------------------------------------------------
// ArchiveError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The file set broke the plugin contract; nothing was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid plugin name {0:?}: must be a Python identifier")]
    InvalidName(String),

    #[error("archive {} already exists", path.display())]
    Exists { path: PathBuf },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("zip error at {}: {source}", path.display())]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("archive entry {0:?} would extract outside the target directory")]
    UnsafeEntry(String),
}

impl ArchiveError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn zip(path: &Path, source: zip::result::ZipError) -> Self {
        ArchiveError::Zip {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Path the failed operation was aimed at, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ArchiveError::Exists { path }
            | ArchiveError::Io { path, .. }
            | ArchiveError::Zip { path, .. } => Some(path),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Plugin names
// ---------------------------------------------------------------------------

/// `true` when `name` can be used as the plugin's package directory.
///
/// QGIS imports the directory as a Python package, so the name must be a
/// Python identifier: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_plugin_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Deterministic archive file name for a plugin.
pub fn archive_file_name(plugin_name: &str) -> String {
    format!("{plugin_name}.zip")
}

// ---------------------------------------------------------------------------
// PluginPackager
// ---------------------------------------------------------------------------

/// Writes plugin archives into one output directory.
///
/// Cheap to clone; clones share the write lock so only one archive is being
/// written to the directory at a time.
#[derive(Debug, Clone)]
pub struct PluginPackager {
    output_dir: PathBuf,
    policy: CollisionPolicy,
    write_lock: Arc<Mutex<()>>,
}

impl PluginPackager {
    pub fn new(output_dir: impl Into<PathBuf>, policy: CollisionPolicy) -> Self {
        Self {
            output_dir: output_dir.into(),
            policy,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.resolved_dir(), config.on_existing)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    /// Where `plugin_name`'s archive is (or would be) written.
    pub fn archive_path(&self, plugin_name: &str) -> PathBuf {
        self.output_dir.join(archive_file_name(plugin_name))
    }

    /// Validate `files` and write `<output_dir>/<plugin_name>.zip`.
    ///
    /// Creates the output directory if needed.  Returns the archive path.
    pub fn package(
        &self,
        files: &PluginFileSet,
        plugin_name: &str,
    ) -> Result<PathBuf, ArchiveError> {
        if !is_valid_plugin_name(plugin_name) {
            return Err(ArchiveError::InvalidName(plugin_name.to_string()));
        }
        files.validate()?;

        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| ArchiveError::io(&self.output_dir, e))?;

        // A poisoned lock only means another write panicked; the directory
        // itself is still consistent because writes go through a temp file.
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let final_path = self.archive_path(plugin_name);
        if self.policy == CollisionPolicy::Fail && final_path.exists() {
            return Err(ArchiveError::Exists { path: final_path });
        }

        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{plugin_name}-"))
            .suffix(".zip.part")
            .tempfile_in(&self.output_dir)
            .map_err(|e| ArchiveError::io(&self.output_dir, e))?;

        write_zip(tmp.as_file_mut(), files, plugin_name, &final_path)?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| ArchiveError::io(tmp.path(), e))?;

        match self.policy {
            CollisionPolicy::Overwrite => tmp.persist(&final_path).map(drop),
            CollisionPolicy::Fail => tmp.persist_noclobber(&final_path).map(drop),
        }
        .map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                ArchiveError::Exists {
                    path: final_path.clone(),
                }
            } else {
                ArchiveError::io(&final_path, e.error)
            }
        })?;

        log::info!(
            "package: wrote {} ({} files, {} bytes uncompressed)",
            final_path.display(),
            files.len(),
            files.total_bytes()
        );
        Ok(final_path)
    }

    /// Extract a plugin archive into a QGIS `python/plugins` directory.
    ///
    /// Returns the directory of the installed plugin.  Entries whose names
    /// would land outside `plugins_dir` abort the installation.
    pub fn install(archive: &Path, plugins_dir: &Path) -> Result<PathBuf, ArchiveError> {
        let file = std::fs::File::open(archive).map_err(|e| ArchiveError::io(archive, e))?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| ArchiveError::zip(archive, e))?;

        std::fs::create_dir_all(plugins_dir).map_err(|e| ArchiveError::io(plugins_dir, e))?;

        let mut top_level: Option<PathBuf> = None;
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).map_err(|e| ArchiveError::zip(archive, e))?;
            let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
                return Err(ArchiveError::UnsafeEntry(entry.name().to_string()));
            };

            if top_level.is_none() {
                top_level = relative
                    .components()
                    .next()
                    .map(|c| plugins_dir.join(c.as_os_str()));
            }

            let dest = plugins_dir.join(&relative);
            if entry.is_dir() {
                std::fs::create_dir_all(&dest).map_err(|e| ArchiveError::io(&dest, e))?;
                continue;
            }
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
            }
            let mut out = std::fs::File::create(&dest).map_err(|e| ArchiveError::io(&dest, e))?;
            std::io::copy(&mut entry, &mut out).map_err(|e| ArchiveError::io(&dest, e))?;
            log::debug!("package: extracted {}", dest.display());
        }

        let installed = top_level.unwrap_or_else(|| plugins_dir.to_path_buf());
        log::info!("package: installed plugin into {}", installed.display());
        Ok(installed)
    }
}

/// Write the zip stream for `files` under a single `<plugin_name>/` root.
fn write_zip(
    sink: &mut std::fs::File,
    files: &PluginFileSet,
    plugin_name: &str,
    final_path: &Path,
) -> Result<(), ArchiveError> {
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);
    let dir_options = SimpleFileOptions::default().unix_permissions(0o755);

    let mut zip = zip::ZipWriter::new(sink);

    let mut dirs = BTreeSet::new();
    dirs.insert(format!("{plugin_name}/"));
    for path in files.paths() {
        let mut prefix = String::new();
        let segments: Vec<&str> = path.split('/').collect();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            prefix.push_str(segment);
            prefix.push('/');
            dirs.insert(format!("{plugin_name}/{prefix}"));
        }
    }
    for dir in dirs {
        zip.add_directory(dir, dir_options)
            .map_err(|e| ArchiveError::zip(final_path, e))?;
    }

    for (path, content) in files.iter() {
        zip.start_file(format!("{plugin_name}/{path}"), options)
            .map_err(|e| ArchiveError::zip(final_path, e))?;
        zip.write_all(content.as_bytes())
            .map_err(|e| ArchiveError::io(final_path, e))?;
    }

    zip.finish().map_err(|e| ArchiveError::zip(final_path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::package::fileset::tests::minimal_set;
    use crate::package::fileset::FileContent;
    use tempfile::tempdir;

    fn entry_names(path: &Path) -> Vec<String> {
        let file = std::fs::File::open(path).expect("open archive");
        let zip = zip::ZipArchive::new(file).expect("read archive");
        zip.file_names().map(str::to_string).collect()
    }

    #[test]
    fn plugin_names_must_be_identifiers() {
        assert!(is_valid_plugin_name("AreaCalc"));
        assert!(is_valid_plugin_name("_buffer_tool2"));
        assert!(!is_valid_plugin_name(""));
        assert!(!is_valid_plugin_name("2fast"));
        assert!(!is_valid_plugin_name("area-calc"));
        assert!(!is_valid_plugin_name("../AreaCalc"));
        assert!(!is_valid_plugin_name("Area Calc"));
    }

    #[test]
    fn package_writes_single_top_level_directory() {
        let dir = tempdir().expect("temp dir");
        let out = dir.path().join("nested").join("out");
        let packager = PluginPackager::new(&out, CollisionPolicy::Overwrite);

        let mut files = minimal_set();
        files.insert("icons/icon.png", FileContent::Binary(vec![0x89, b'P', b'N', b'G']));

        let path = packager.package(&files, "AreaCalc").expect("package");
        assert_eq!(path, out.join("AreaCalc.zip"));

        let names = entry_names(&path);
        assert!(names.iter().all(|n| n.starts_with("AreaCalc/")));
        assert!(names.contains(&"AreaCalc/metadata.txt".to_string()));
        assert!(names.contains(&"AreaCalc/__init__.py".to_string()));
        assert!(names.contains(&"AreaCalc/icons/".to_string()));
        assert!(names.contains(&"AreaCalc/icons/icon.png".to_string()));

        let file = std::fs::File::open(&path).expect("open");
        let mut zip = zip::ZipArchive::new(file).expect("zip");
        let mut init = String::new();
        zip.by_name("AreaCalc/__init__.py")
            .expect("entry")
            .read_to_string(&mut init)
            .expect("read");
        assert!(init.contains("classFactory"));
    }

    #[test]
    fn traversal_is_rejected_and_nothing_is_written() {
        let dir = tempdir().expect("temp dir");
        let out = dir.path().join("out");
        let packager = PluginPackager::new(&out, CollisionPolicy::Overwrite);

        let mut files = minimal_set();
        files.insert("../../escape.py", FileContent::Text("x = 1\n".into()));

        let err = packager.package(&files, "AreaCalc").unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::Validation(ValidationError::UnsafePath { .. })
        ));
        assert!(!out.exists());
        assert!(!dir.path().join("escape.py").exists());
    }

    #[test]
    fn missing_manifest_is_rejected_before_writing() {
        let dir = tempdir().expect("temp dir");
        let packager = PluginPackager::new(dir.path(), CollisionPolicy::Overwrite);

        let mut files = PluginFileSet::new();
        files.insert(
            "__init__.py",
            FileContent::Text("def classFactory(iface):\n    pass\n".into()),
        );

        let err = packager.package(&files, "AreaCalc").unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::Validation(ValidationError::MissingManifest)
        ));
        assert!(!dir.path().join("AreaCalc.zip").exists());
    }

    #[test]
    fn invalid_name_is_rejected() {
        let dir = tempdir().expect("temp dir");
        let packager = PluginPackager::new(dir.path(), CollisionPolicy::Overwrite);
        let err = packager.package(&minimal_set(), "../x").unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidName(_)));
    }

    #[test]
    fn overwrite_policy_replaces_previous_archive() {
        let dir = tempdir().expect("temp dir");
        let packager = PluginPackager::new(dir.path(), CollisionPolicy::Overwrite);

        packager.package(&minimal_set(), "AreaCalc").expect("first");
        let mut second = minimal_set();
        second.insert("extra.py", FileContent::Text("y = 2\n".into()));
        let path = packager.package(&second, "AreaCalc").expect("second");

        assert!(entry_names(&path).contains(&"AreaCalc/extra.py".to_string()));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn fail_policy_refuses_existing_archive() {
        let dir = tempdir().expect("temp dir");
        let packager = PluginPackager::new(dir.path(), CollisionPolicy::Fail);

        packager.package(&minimal_set(), "AreaCalc").expect("first");
        let err = packager.package(&minimal_set(), "AreaCalc").unwrap_err();
        assert!(matches!(err, ArchiveError::Exists { .. }));
        assert_eq!(err.path(), Some(dir.path().join("AreaCalc.zip").as_path()));
    }

    #[test]
    fn install_extracts_into_plugins_dir() {
        let dir = tempdir().expect("temp dir");
        let packager = PluginPackager::new(dir.path().join("out"), CollisionPolicy::Overwrite);
        let archive = packager.package(&minimal_set(), "AreaCalc").expect("package");

        let plugins = dir.path().join("profile").join("python").join("plugins");
        let installed = PluginPackager::install(&archive, &plugins).expect("install");

        assert_eq!(installed, plugins.join("AreaCalc"));
        assert!(installed.join("metadata.txt").is_file());
        assert!(installed.join("__init__.py").is_file());
    }
}
