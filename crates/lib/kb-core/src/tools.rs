//! The three KB tools and their mapping onto KB CLI command lines.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::config::KbConfig;
use crate::runner::CommandSpec;
use crate::schema::{InvocationError, ParamKind, ParamSchema};

pub const KB_SEARCH: &str = "kb_search";
pub const KB_ADD_NOTE: &str = "kb_add_note";
pub const KB_INGEST: &str = "kb_ingest";

pub const KB_SEARCH_DESCRIPTION: &str =
    "Search the local Knowledge Base (RAG). Returns top matching snippets and sources.";
pub const KB_ADD_NOTE_DESCRIPTION: &str =
    "Append a note to knowledge/notes/notes.md (append-only) and optionally ingest it.";
pub const KB_INGEST_DESCRIPTION: &str =
    "Ingest/rebuild the KB index from files in knowledge/raw and knowledge/notes.";

pub const DEFAULT_TOP_K: u8 = 5;
pub const MIN_TOP_K: u8 = 1;
pub const MAX_TOP_K: u8 = 20;

pub const QUERY_TIMEOUT: Duration = Duration::from_millis(120_000);
/// Ingest may reindex the whole corpus.
pub const INGEST_TIMEOUT: Duration = Duration::from_millis(900_000);

/// A tool as advertised to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: ParamSchema,
}

impl ToolSpec {
    #[must_use]
    pub fn input_schema(&self) -> Value {
        self.parameters.to_json()
    }
}

/// Definitions for `kb_search`, `kb_add_note`, and `kb_ingest`.
#[must_use]
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: KB_SEARCH,
            description: KB_SEARCH_DESCRIPTION,
            parameters: ParamSchema::new()
                .required("query", ParamKind::String { min_length: 1 })
                .optional(
                    "top_k",
                    ParamKind::Integer {
                        minimum: i64::from(MIN_TOP_K),
                        maximum: i64::from(MAX_TOP_K),
                    },
                ),
        },
        ToolSpec {
            name: KB_ADD_NOTE,
            description: KB_ADD_NOTE_DESCRIPTION,
            parameters: ParamSchema::new()
                .required("text", ParamKind::String { min_length: 1 })
                .optional("ingest", ParamKind::Boolean),
        },
        ToolSpec {
            name: KB_INGEST,
            description: KB_INGEST_DESCRIPTION,
            parameters: ParamSchema::new().optional("rebuild", ParamKind::Boolean),
        },
    ]
}

/// One call from the host: a tool name and its raw arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    tool: String,
    arguments: Map<String, Value>,
}

impl Invocation {
    #[must_use]
    pub fn new(tool: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            arguments,
        }
    }

    /// Accepts a JSON object, or `null` for a call without arguments.
    ///
    /// # Errors
    /// Returns [`InvocationError::NotAnObject`] for any other JSON value.
    pub fn from_value(tool: impl Into<String>, arguments: Value) -> Result<Self, InvocationError> {
        match arguments {
            Value::Object(arguments) => Ok(Self::new(tool, arguments)),
            Value::Null => Ok(Self::new(tool, Map::new())),
            _ => Err(InvocationError::NotAnObject),
        }
    }

    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    #[must_use]
    pub const fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }
}

/// A KB CLI operation with defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KbOperation {
    Search { query: String, top_k: u8 },
    AddNote { text: String, ingest: bool },
    Ingest { rebuild: bool },
}

impl KbOperation {
    /// Derives the operation from an invocation.
    ///
    /// `top_k` defaults to 5. Flags count only when they are exactly `true`.
    ///
    /// # Errors
    /// Returns an [`InvocationError`] for unknown tools or mistyped arguments.
    pub fn from_invocation(invocation: &Invocation) -> Result<Self, InvocationError> {
        let args = invocation.arguments();
        match invocation.tool() {
            KB_SEARCH => {
                let query = required_str(args, "query")?;
                let top_k = match args.get("top_k") {
                    None => DEFAULT_TOP_K,
                    Some(value) => value
                        .as_u64()
                        .and_then(|top_k| u8::try_from(top_k).ok())
                        .filter(|top_k| (MIN_TOP_K..=MAX_TOP_K).contains(top_k))
                        .ok_or(InvocationError::OutOfRange {
                            name: "top_k",
                            minimum: i64::from(MIN_TOP_K),
                            maximum: i64::from(MAX_TOP_K),
                        })?,
                };
                Ok(Self::Search { query, top_k })
            }
            KB_ADD_NOTE => Ok(Self::AddNote {
                text: required_str(args, "text")?,
                ingest: is_strictly_true(args, "ingest"),
            }),
            KB_INGEST => Ok(Self::Ingest {
                rebuild: is_strictly_true(args, "rebuild"),
            }),
            other => Err(InvocationError::UnknownTool(other.to_string())),
        }
    }

    #[must_use]
    pub const fn subcommand(&self) -> &'static str {
        match self {
            Self::Search { .. } => "search",
            Self::AddNote { .. } => "add-note",
            Self::Ingest { rebuild: true } => "rebuild",
            Self::Ingest { rebuild: false } => "ingest",
        }
    }

    /// KB CLI arguments, subcommand first.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![self.subcommand().to_string()];
        match self {
            Self::Search { query, top_k } => {
                args.extend([
                    "--query".to_string(),
                    query.clone(),
                    "--top-k".to_string(),
                    top_k.to_string(),
                    "--json".to_string(),
                ]);
            }
            Self::AddNote { text, ingest } => {
                args.extend(["--text".to_string(), text.clone(), "--json".to_string()]);
                if *ingest {
                    args.push("--ingest".to_string());
                }
            }
            Self::Ingest { .. } => args.push("--json".to_string()),
        }
        args
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        match self {
            Self::Search { .. } | Self::AddNote { .. } => QUERY_TIMEOUT,
            Self::Ingest { .. } => INGEST_TIMEOUT,
        }
    }

    #[must_use]
    pub fn command_spec(&self, config: &KbConfig) -> CommandSpec {
        CommandSpec {
            interpreter: config.interpreter().to_string(),
            script_path: config.script_path().to_path_buf(),
            args: self.args(),
            timeout: self.timeout(),
            working_dir: config.working_dir().map(std::path::Path::to_path_buf),
        }
    }
}

fn required_str(args: &Map<String, Value>, name: &'static str) -> Result<String, InvocationError> {
    match args.get(name) {
        None => Err(InvocationError::MissingProperty(name)),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(InvocationError::InvalidType {
            name,
            expected: "string",
        }),
    }
}

fn is_strictly_true(args: &Map<String, Value>, name: &str) -> bool {
    matches!(args.get(name), Some(Value::Bool(true)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn invocation(tool: &str, arguments: Value) -> Invocation {
        Invocation::from_value(tool, arguments).expect("object arguments")
    }

    fn operation(tool: &str, arguments: Value) -> KbOperation {
        KbOperation::from_invocation(&invocation(tool, arguments)).expect("valid operation")
    }

    #[test]
    fn search_defaults_top_k() {
        let op = operation(KB_SEARCH, json!({ "query": "foo" }));

        assert_eq!(
            op.args(),
            vec!["search", "--query", "foo", "--top-k", "5", "--json"]
        );
        assert_eq!(op, operation(KB_SEARCH, json!({ "query": "foo", "top_k": 5 })));
    }

    #[test]
    fn search_emits_every_valid_top_k_verbatim() {
        for top_k in MIN_TOP_K..=MAX_TOP_K {
            let args = operation(KB_SEARCH, json!({ "query": "q", "top_k": top_k })).args();
            let position = args
                .iter()
                .position(|arg| arg == "--top-k")
                .expect("--top-k flag");
            assert_eq!(args[position + 1], top_k.to_string());
        }
    }

    #[test]
    fn search_rejects_out_of_range_top_k() {
        for top_k in [json!(0), json!(21), json!(-1), json!("5")] {
            let arguments = json!({ "query": "q", "top_k": top_k });
            let result = KbOperation::from_invocation(&invocation(KB_SEARCH, arguments));
            assert!(result.is_err());
        }
    }

    #[test]
    fn add_note_appends_ingest_only_when_true() {
        assert_eq!(
            operation(KB_ADD_NOTE, json!({ "text": "bar", "ingest": true })).args(),
            vec!["add-note", "--text", "bar", "--json", "--ingest"]
        );
        for arguments in [
            json!({ "text": "bar" }),
            json!({ "text": "bar", "ingest": false }),
            json!({ "text": "bar", "ingest": "true" }),
            json!({ "text": "bar", "ingest": 1 }),
        ] {
            assert_eq!(
                operation(KB_ADD_NOTE, arguments).args(),
                vec!["add-note", "--text", "bar", "--json"]
            );
        }
    }

    #[test]
    fn ingest_selects_rebuild_only_when_true() {
        let rebuild = operation(KB_INGEST, json!({ "rebuild": true }));
        assert_eq!(rebuild.subcommand(), "rebuild");
        assert_eq!(rebuild.args(), vec!["rebuild", "--json"]);
        assert_eq!(rebuild.timeout(), Duration::from_millis(900_000));

        for arguments in [
            json!({}),
            json!({ "rebuild": false }),
            json!({ "rebuild": "yes" }),
            Value::Null,
        ] {
            assert_eq!(operation(KB_INGEST, arguments).args(), vec!["ingest", "--json"]);
        }
    }

    #[test]
    fn timeouts_follow_operation() {
        assert_eq!(
            operation(KB_SEARCH, json!({ "query": "q" })).timeout(),
            Duration::from_millis(120_000)
        );
        assert_eq!(
            operation(KB_ADD_NOTE, json!({ "text": "t" })).timeout(),
            Duration::from_millis(120_000)
        );
        assert_eq!(operation(KB_INGEST, json!({})).timeout(), INGEST_TIMEOUT);
    }

    #[test]
    fn command_spec_uses_config() {
        let config =
            KbConfig::for_root("/srv/kb").with_interpreter_override(Some("py".to_string()));
        let spec = operation(KB_SEARCH, json!({ "query": "foo" })).command_spec(&config);

        assert_eq!(spec.interpreter, "py");
        assert_eq!(spec.script_path, std::path::PathBuf::from("/srv/kb/scripts/kb_cli.py"));
        assert_eq!(spec.working_dir, Some(std::path::PathBuf::from("/srv/kb")));
        assert_eq!(spec.timeout, QUERY_TIMEOUT);
        assert_eq!(
            spec.command_line(),
            "py /srv/kb/scripts/kb_cli.py search --query foo --top-k 5 --json"
        );
    }

    #[test]
    fn rejects_unknown_tool_and_non_object_arguments() {
        assert_eq!(
            KbOperation::from_invocation(&invocation("kb_delete", json!({}))),
            Err(InvocationError::UnknownTool("kb_delete".to_string()))
        );
        assert_eq!(
            Invocation::from_value(KB_SEARCH, json!(["foo"])),
            Err(InvocationError::NotAnObject)
        );
    }

    #[test]
    fn specs_cover_all_tools() {
        let names: Vec<_> = tool_specs().iter().map(|spec| spec.name).collect();
        assert_eq!(names, vec![KB_SEARCH, KB_ADD_NOTE, KB_INGEST]);

        let add_note = &tool_specs()[1];
        assert_eq!(add_note.input_schema()["required"], json!(["text"]));
        assert_eq!(add_note.input_schema()["additionalProperties"], json!(false));
    }
}
