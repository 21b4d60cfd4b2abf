//! Plugin packaging: file-block grammar, validation and zip output.
//!
//! ```text
//! Reviewer output ──parse_blocks──▶ PluginFileSet ──validate──▶ PluginPackager::package ──▶ <name>.zip
//! ```

pub mod archive;
pub mod fileset;
pub mod parser;

pub use archive::{archive_file_name, is_valid_plugin_name, ArchiveError, PluginPackager};
pub use fileset::{
    check_relative_path, manifest_fields, FileContent, PluginFileSet, ValidationError,
    ENTRY_POINT_FILE, MANIFEST_FILE, REQUIRED_MANIFEST_KEYS,
};
pub use parser::{parse_blocks, serialize_blocks, ParseError};
