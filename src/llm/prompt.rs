//! Role instruction templates for the three generation stages.
//!
//! [`PromptBuilder`] turns a [`GenerationRequest`] into one
//! `(instructions, input)` pair per [`Role`]:
//!
//! ```text
//! Analyst   : ANALYST_INSTRUCTION            + request text + configuration
//! Developer : DEVELOPER_INSTRUCTION + rules  + Analyst plan
//! Reviewer  : REVIEWER_INSTRUCTION  + rules  + Developer draft
//! ```
//!
//! The Developer and Reviewer instructions embed the file-block grammar and
//! the manifest keys the packager checks, so the runtime is told exactly
//! what a valid answer looks like.

use crate::package::{ENTRY_POINT_FILE, MANIFEST_FILE, REQUIRED_MANIFEST_KEYS};
use crate::pipeline::{GenerationRequest, Role};

// ---------------------------------------------------------------------------
// Role instructions
// ---------------------------------------------------------------------------

const ANALYST_INSTRUCTION: &str = "\
You are a senior software analyst specialised in QGIS and PyQGIS.
Task: turn the user's request into a concrete technical plan for a QGIS plugin.

Your plan must cover:
1. A functional description of the plugin.
2. The PyQGIS classes and functions it needs (qgis.core, qgis.gui, qgis.PyQt).
3. The file layout of the plugin package.
4. The user-interface elements (menu entries, toolbar buttons, dialogs).
5. The processing steps, input validation and error handling.

Reply with the plan only, as plain text. Do not write the plugin code.";

const DEVELOPER_INSTRUCTION: &str = "\
You are a senior PyQGIS developer.
Task: write the complete source code of a QGIS plugin from the technical plan.

Write at least these files:
1. metadata.txt   - plugin manifest
2. __init__.py    - defines classFactory(iface) returning the plugin instance
3. main_plugin.py - the plugin class with initGui(), unload() and run()
Add further files (dialogs, .ui forms, resources, README.md) when the plan
needs them. Handle errors, log through QgsMessageLog and keep the code
compatible with QGIS 3.";

const REVIEWER_INSTRUCTION: &str = "\
You are a QGIS plugin quality reviewer.
Task: review the draft plugin files, fix syntax errors, logic errors and
missing pieces, and return the corrected, complete file set.

Check in particular:
1. Every import exists in PyQGIS / PyQt5.
2. initGui() registers every action and unload() removes it again.
3. metadata.txt and __init__.py follow the rules below.
Return every file, including the ones you did not change.";

const OUTPUT_FORMAT: &str = "\
OUTPUT FORMAT (mandatory):
Emit every file as one block, one after another, with nothing between blocks:
