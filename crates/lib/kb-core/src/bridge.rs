use std::error::Error;
use std::fmt;

use tracing::debug;

use crate::config::KbConfig;
use crate::registry::{RegisterOptions, ToolCatalog, ToolRegistrar};
use crate::runner::{self, CommandSpec, RunError};
use crate::schema::InvocationError;
use crate::tools::{Invocation, KbOperation, tool_specs};

#[derive(Debug)]
pub enum BridgeError {
    /// Rejected before any process was spawned.
    Invalid(InvocationError),
    Run(RunError),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(err) => write!(f, "{err}"),
            Self::Run(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BridgeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Invalid(err) => Some(err),
            Self::Run(err) => Some(err),
        }
    }
}

impl From<InvocationError> for BridgeError {
    fn from(err: InvocationError) -> Self {
        Self::Invalid(err)
    }
}

impl From<RunError> for BridgeError {
    fn from(err: RunError) -> Self {
        Self::Run(err)
    }
}

/// Translates tool invocations into KB CLI runs.
///
/// Holds no per-call state, so one bridge can serve any number of concurrent
/// invocations.
#[derive(Debug, Clone)]
pub struct KbBridge {
    config: KbConfig,
    catalog: ToolCatalog,
}

impl KbBridge {
    #[must_use]
    pub fn new(config: KbConfig) -> Self {
        let mut catalog = ToolCatalog::default();
        Self::register_tools(&mut catalog);
        Self { config, catalog }
    }

    /// Registers every KB tool with `registrar` as an optional tool.
    pub fn register_tools<R: ToolRegistrar + ?Sized>(registrar: &mut R) {
        for spec in tool_specs() {
            registrar.register(spec, RegisterOptions::optional());
        }
    }

    #[must_use]
    pub const fn config(&self) -> &KbConfig {
        &self.config
    }

    #[must_use]
    pub const fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Validates the invocation and resolves the command it maps to.
    ///
    /// # Errors
    /// Returns [`BridgeError::Invalid`] when the invocation fails validation.
    pub fn prepare(&self, invocation: &Invocation) -> Result<CommandSpec, BridgeError> {
        self.catalog.validate(invocation)?;
        let operation = KbOperation::from_invocation(invocation)?;
        Ok(operation.command_spec(&self.config))
    }

    /// Runs one invocation and returns the KB CLI's trimmed stdout.
    ///
    /// # Errors
    /// Returns [`BridgeError::Invalid`] without spawning anything for bad
    /// arguments, or [`BridgeError::Run`] carrying the operator diagnostic when
    /// the process fails, exits non-zero, or times out.
    pub async fn call(&self, invocation: Invocation) -> Result<String, BridgeError> {
        let spec = self.prepare(&invocation)?;
        debug!(tool = invocation.tool(), "dispatching kb tool");
        Ok(runner::run(&spec).await.into_result()?)
    }
}
