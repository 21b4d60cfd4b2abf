//! File-block grammar shared by the Developer and Reviewer stages.
//!
//! ```text
//! any commentary before, between or after blocks is ignored
//! === FILE: metadata.txt ===
//! [general]
//! name=AreaCalc
//! === END FILE ===
//! === FILE: icon.png [base64] ===
//! iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR4nGNgYGD4DwABBAEAwS2OUAAAAABJRU5ErkJggg==
//! === END FILE ===
//! ```
//!
//! Markers must sit on their own line (surrounding whitespace is allowed).
//! Text bodies are taken verbatim, except that CRLF and lone CR are
//! normalised to LF and a single Markdown code fence wrapping the whole body
//! is dropped.  [`serialize_blocks`] re-fences any body that would lose a
//! fence on the next parse.
//!
//! [`parse_blocks`] and [`serialize_blocks`] are inverse on parsed output:
//! `parse_blocks(&serialize_blocks(&set)) == Ok(set)` for every `set` that
//! `parse_blocks` produced.

use base64::Engine as _;
use thiserror::Error;

use super::fileset::{FileContent, PluginFileSet};

const HEADER_PREFIX: &str = "=== FILE:";
const MARKER_SUFFIX: &str = "===";
const END_MARKER: &str = "=== END FILE ===";
const BASE64_TAG: &str = "[base64]";
const BASE64_LINE_WIDTH: usize = 76;
const CODE_FENCE: &str = "```";

// ---------------------------------------------------------------------------
// ParseError
// ---------------------------------------------------------------------------

/// Why a stage output could not be split into files.  Line numbers are 1-based.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no `=== FILE: <path> ===` blocks found")]
    NoFiles,

    #[error("line {line}: new file header while {open:?} is still open")]
    NestedHeader { line: usize, open: String },

    #[error("line {line}: end marker without a matching file header")]
    UnexpectedEnd { line: usize },

    #[error("file block {path:?} opened at line {line} is never closed")]
    Unterminated { path: String, line: usize },

    #[error("line {line}: file header has an empty path")]
    EmptyPath { line: usize },

    #[error("line {line}: file {path:?} is declared twice")]
    DuplicatePath { path: String, line: usize },

    #[error("file {path:?}: invalid base64 body: {reason}")]
    InvalidBase64 { path: String, reason: String },
}

// ---------------------------------------------------------------------------
// Marker recognition
// ---------------------------------------------------------------------------

/// A recognised header line.
struct Header {
    path: String,
    binary: bool,
}

fn parse_header(line: &str) -> Option<Header> {
    let inner = line
        .strip_prefix(HEADER_PREFIX)?
        .strip_suffix(MARKER_SUFFIX)?
        .trim();

    match inner.strip_suffix(BASE64_TAG) {
        Some(path) => Some(Header {
            path: path.trim().to_string(),
            binary: true,
        }),
        None => Some(Header {
            path: inner.to_string(),
            binary: false,
        }),
    }
}

fn is_end_marker(line: &str) -> bool {
    line == END_MARKER
}

// ---------------------------------------------------------------------------
// Body handling
// ---------------------------------------------------------------------------

/// Drop a Markdown fence that wraps the entire body.
///
/// Only the outermost fence pair is removed, and only when the opening line
/// starts with three backticks and the closing line is exactly three
/// backticks.
fn strip_code_fence(body: &str) -> &str {
    let Some(first_nl) = body.find('\n') else {
        return body;
    };
    if !body[..first_nl].trim_start().starts_with("```") {
        return body;
    }

    let without_trailing_nl = body.strip_suffix('\n').unwrap_or(body);
    let Some(last_nl) = without_trailing_nl.rfind('\n') else {
        return body;
    };
    if last_nl < first_nl || without_trailing_nl[last_nl + 1..].trim() != "```" {
        return body;
    }

    // Keep the newline that terminated the last content line.
    &body[first_nl + 1..last_nl + 1]
}

fn decode_base64(path: &str, body: &str) -> Result<Vec<u8>, ParseError> {
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| ParseError::InvalidBase64 {
            path: path.to_string(),
            reason: e.to_string(),
        })
}

// ---------------------------------------------------------------------------
// parse_blocks
// ---------------------------------------------------------------------------

/// Split a stage output into a [`PluginFileSet`].
///
/// Path safety and the plugin contract are not checked here; that is
/// [`PluginFileSet::validate`]'s job.
pub fn parse_blocks(text: &str) -> Result<PluginFileSet, ParseError> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut files = PluginFileSet::new();

    // (header, header line number, body)
    let mut open: Option<(Header, usize, String)> = None;

    for (idx, raw_line) in normalized.split_inclusive('\n').enumerate() {
        let line_no = idx + 1;
        let trimmed = raw_line.trim();

        if let Some(header) = parse_header(trimmed) {
            if let Some((current, _, _)) = &open {
                return Err(ParseError::NestedHeader {
                    line: line_no,
                    open: current.path.clone(),
                });
            }
            if header.path.is_empty() {
                return Err(ParseError::EmptyPath { line: line_no });
            }
            if files.contains(&header.path) {
                return Err(ParseError::DuplicatePath {
                    path: header.path,
                    line: line_no,
                });
            }
            open = Some((header, line_no, String::new()));
            continue;
        }

        if is_end_marker(trimmed) {
            let Some((header, _, body)) = open.take() else {
                return Err(ParseError::UnexpectedEnd { line: line_no });
            };
            let content = if header.binary {
                FileContent::Binary(decode_base64(&header.path, &body)?)
            } else {
                FileContent::Text(strip_code_fence(&body).to_string())
            };
            files.insert(header.path, content);
            continue;
        }

        if let Some((_, _, body)) = open.as_mut() {
            body.push_str(raw_line);
        }
    }

    if let Some((header, line, _)) = open {
        return Err(ParseError::Unterminated {
            path: header.path,
            line,
        });
    }

    if files.is_empty() {
        return Err(ParseError::NoFiles);
    }

    Ok(files)
}

// ---------------------------------------------------------------------------
// serialize_blocks
// ---------------------------------------------------------------------------

/// Render a file set back into the block grammar, in path order.
pub fn serialize_blocks(files: &PluginFileSet) -> String {
    let mut out = String::with_capacity(files.total_bytes() + files.len() * 48);

    for (path, content) in files.iter() {
        match content {
            FileContent::Text(text) => {
                out.push_str(&format!("{HEADER_PREFIX} {path} {MARKER_SUFFIX}\n"));
                // A body that itself looks fenced would lose that fence when
                // parsed back, so give it an outer one to lose instead.
                let fenced = strip_code_fence(text).len() != text.len();
                if fenced {
                    out.push_str(CODE_FENCE);
                    out.push('\n');
                }
                out.push_str(text);
                if !text.is_empty() && !text.ends_with('\n') {
                    out.push('\n');
                }
                if fenced {
                    out.push_str(CODE_FENCE);
                    out.push('\n');
                }
            }
            FileContent::Binary(bytes) => {
                out.push_str(&format!(
                    "{HEADER_PREFIX} {path} {BASE64_TAG} {MARKER_SUFFIX}\n"
                ));
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                // base64 output is ASCII, so byte chunks are valid UTF-8.
                for chunk in encoded.as_bytes().chunks(BASE64_LINE_WIDTH) {
                    out.push_str(&String::from_utf8_lossy(chunk));
                    out.push('\n');
                }
            }
        }
        out.push_str(END_MARKER);
        out.push('\n');
    }

    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
