use std::path::{Path, PathBuf};

/// Environment variable that overrides the interpreter used to run the KB CLI.
pub const INTERPRETER_ENV: &str = "KB_PYTHON";
pub const DEFAULT_INTERPRETER: &str = "python3";
/// KB CLI script location, relative to the knowledge-base root.
pub const DEFAULT_SCRIPT: &str = "scripts/kb_cli.py";

/// How the bridge reaches the external KB CLI.
///
/// Resolved once when the bridge is built; calls never consult the
/// environment on their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KbConfig {
    interpreter: String,
    script_path: PathBuf,
    working_dir: Option<PathBuf>,
}

impl KbConfig {
    #[must_use]
    pub fn new(interpreter: impl Into<String>, script_path: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script_path: script_path.into(),
            working_dir: None,
        }
    }

    /// Default layout for a knowledge-base checkout rooted at `root`.
    #[must_use]
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            interpreter: DEFAULT_INTERPRETER.to_string(),
            script_path: root.join(DEFAULT_SCRIPT),
            working_dir: Some(root),
        }
    }

    /// Replaces the interpreter when `value` is present and not blank.
    #[must_use]
    pub fn with_interpreter_override(mut self, value: Option<String>) -> Self {
        if let Some(interpreter) = value.filter(|value| !value.trim().is_empty()) {
            self.interpreter = interpreter;
        }
        self
    }

    #[must_use]
    pub fn with_script_path(mut self, script_path: impl Into<PathBuf>) -> Self {
        self.script_path = script_path.into();
        self
    }

    #[must_use]
    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    #[must_use]
    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }
}
