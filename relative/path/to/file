<file contents>
=== END FILE ===

Rules:
- Paths are relative, use '/' separators and never contain '..'.
- Marker lines stand alone on their line.
- Binary files (icons) use `=== FILE: icon.png [base64] ===` with a base64 body.
- Do not wrap blocks in markdown code fences and do not add commentary.";

// ---------------------------------------------------------------------------
// PromptBuilder
// ---------------------------------------------------------------------------

/// Builds the instructions and input text handed to the runtime for each
/// role of one request.
///
/// # Example
/// ```rust
/// use qgis_plugin_generator::llm::PromptBuilder;
/// use qgis_plugin_generator::pipeline::{GenerationRequest, PluginOptions, Role};
///
/// let request = GenerationRequest::new(
///     "compute the area of every polygon in the active layer",
///     "AreaCalc",
///     PluginOptions::default(),
/// )
/// .unwrap();
/// let builder = PromptBuilder::new(&request);
/// let (instructions, input) = builder.build(Role::Analyst, None);
/// assert!(instructions.contains("technical plan"));
/// assert!(input.contains("AreaCalc"));
/// ```
pub struct PromptBuilder<'a> {
    request: &'a GenerationRequest,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(request: &'a GenerationRequest) -> Self {
        Self { request }
    }

    /// Build the `(instructions, input)` pair for `role`.
    ///
    /// `previous` is the output of the preceding role; it is ignored for the
    /// Analyst, which starts from the request itself.
    pub fn build(&self, role: Role, previous: Option<&str>) -> (String, String) {
        let instructions = self.instructions(role);
        let input = match role {
            Role::Analyst => self.analyst_input(),
            Role::Developer => format!(
                "Plugin name: {}\n\nTECHNICAL PLAN:\n{}\n\nWrite the plugin files now.",
                self.request.plugin_name(),
                previous.unwrap_or_default()
            ),
            Role::Reviewer => format!(
                "Plugin name: {}\n\nDRAFT FILES:\n{}\n\nReturn the reviewed file set now.",
                self.request.plugin_name(),
                previous.unwrap_or_default()
            ),
        };
        (instructions, input)
    }

    /// Role instructions only.
    pub fn instructions(&self, role: Role) -> String {
        match role {
            Role::Analyst => ANALYST_INSTRUCTION.to_string(),
            Role::Developer => {
                let mut s = String::with_capacity(2048);
                s.push_str(DEVELOPER_INSTRUCTION);
                s.push_str("\n\n");
                s.push_str(&self.file_rules());
                s.push_str("\n\n");
                s.push_str(OUTPUT_FORMAT);
                s
            }
            Role::Reviewer => {
                let mut s = String::with_capacity(2048);
                s.push_str(REVIEWER_INSTRUCTION);
                s.push_str("\n\n");
                s.push_str(&self.file_rules());
                s.push_str("\n\n");
                s.push_str(OUTPUT_FORMAT);
                s
            }
        }
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn analyst_input(&self) -> String {
        let mut input = String::with_capacity(1024);
        input.push_str(&format!("USER REQUEST:\n{}\n\n", self.request.description()));
        input.push_str("CONFIGURATION:\n");
        input.push_str(&self.configuration());
        input
    }

    fn configuration(&self) -> String {
        let options = self.request.options();
        let mut out = format!(
            "- Plugin name: {}\n- Version: {}\n- Author: {}\n- Plugin type: {}\n",
            self.request.plugin_name(),
            options.version,
            options.author,
            options.kind.label()
        );
        let ui = options.ui_requirements();
        if ui.is_empty() {
            out.push_str("- User interface: none beyond what the plugin strictly needs\n");
        } else {
            for item in ui {
                out.push_str(&format!("- Include {item}\n"));
            }
        }
        out
    }

    /// Manifest and entry-point rules, pre-filled with the request metadata.
    fn file_rules(&self) -> String {
        let options = self.request.options();
        let email = if options.email.is_empty() {
            "unknown@example.com"
        } else {
            options.email.as_str()
        };

        let mut rules = String::with_capacity(1024);
        rules.push_str(&format!(
            "{MANIFEST_FILE} must start with a [general] section containing at least the keys {}.\n",
            REQUIRED_MANIFEST_KEYS.join(", ")
        ));
        rules.push_str("Use these values:\n");
        rules.push_str(&format!("  name={}\n", self.request.plugin_name()));
        rules.push_str(&format!(
            "  qgisMinimumVersion={}\n",
            options.qgis_minimum_version
        ));
        rules.push_str(&format!("  version={}\n", options.version));
        rules.push_str(&format!("  author={}\n", options.author));
        rules.push_str(&format!("  email={email}\n"));
        rules.push_str(&format!(
            "{ENTRY_POINT_FILE} must define classFactory(iface) and return the plugin instance.\n"
        ));

        let ui = options.ui_requirements();
        if !ui.is_empty() {
            rules.push_str("The plugin must provide:\n");
            for item in ui {
                rules.push_str(&format!("  - {item}\n"));
            }
        }
        rules
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginKind;
    use crate::pipeline::PluginOptions;

    fn request() -> GenerationRequest {
        let options = PluginOptions {
            author: "Ana GIS".into(),
            email: "ana@example.org".into(),
            kind: PluginKind::Analysis,
            add_dialog: true,
            ..PluginOptions::default()
        };
        GenerationRequest::new(
            "add a toolbar button that computes polygon areas for the selected layer",
            "AreaCalc",
            options,
        )
        .unwrap()
    }

    #[test]
    fn analyst_input_carries_request_and_configuration() {
        let req = request();
        let (instructions, input) = PromptBuilder::new(&req).build(Role::Analyst, None);

        assert!(instructions.contains("technical plan"));
        assert!(!instructions.contains("=== FILE:"));
        assert!(input.contains("computes polygon areas"));
        assert!(input.contains("Plugin name: AreaCalc"));
        assert!(input.contains("Analysis"));
        assert!(input.contains("configuration dialog"));
    }

    #[test]
    fn developer_gets_plan_and_grammar() {
        let req = request();
        let (instructions, input) =
            PromptBuilder::new(&req).build(Role::Developer, Some("PLAN: use QgsDistanceArea"));

        assert!(input.contains("PLAN: use QgsDistanceArea"));
        assert!(instructions.contains("=== FILE: relative/path/to/file ==="));
        assert!(instructions.contains("=== END FILE ==="));
        assert!(instructions.contains("classFactory(iface)"));
    }

    #[test]
    fn manifest_rules_are_prefilled() {
        let req = request();
        let instructions = PromptBuilder::new(&req).instructions(Role::Reviewer);

        for key in REQUIRED_MANIFEST_KEYS {
            assert!(instructions.contains(key), "missing key {key}");
        }
        assert!(instructions.contains("name=AreaCalc"));
        assert!(instructions.contains("author=Ana GIS"));
        assert!(instructions.contains("email=ana@example.org"));
        assert!(instructions.contains("version=1.0.0"));
    }

    #[test]
    fn reviewer_sees_only_the_draft() {
        let req = request();
        let (_, input) = PromptBuilder::new(&req).build(Role::Reviewer, Some("DRAFT-XYZ"));

        assert!(input.contains("DRAFT-XYZ"));
        assert!(!input.contains("computes polygon areas"));
    }

    #[test]
    fn no_ui_toggles_produce_minimal_ui_note() {
        let options = PluginOptions {
            add_menu: false,
            add_toolbar: false,
            add_dialog: false,
            ..PluginOptions::default()
        };
        let req = GenerationRequest::new("reproject all layers to EPSG:3857", "Reproj", options)
            .unwrap();
        let (_, input) = PromptBuilder::new(&req).build(Role::Analyst, None);
        assert!(input.contains("User interface: none"));
    }
}
