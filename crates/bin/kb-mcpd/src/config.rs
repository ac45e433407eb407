use clap::{Parser, builder::BoolishValueParser};
use kb_core::config::{DEFAULT_INTERPRETER, DEFAULT_SCRIPT, INTERPRETER_ENV, KbConfig};
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_TRANSPORT: &str = "stdio";
const DEFAULT_MCP_HTTP_ADDR: &str = "127.0.0.1:4030";

#[derive(Parser, Debug)]
#[command(name = "kb-mcpd", version, about = "Knowledge-base MCP daemon.")]
struct CliArgs {
    /// Interpreter used to run the KB CLI.
    #[arg(long, env = INTERPRETER_ENV, default_value = DEFAULT_INTERPRETER)]
    python: String,

    /// Knowledge-base root; the KB CLI runs with this working directory.
    #[arg(long, env = "KB_ROOT")]
    root: Option<PathBuf>,

    /// KB CLI script. Defaults to `scripts/kb_cli.py` under the root.
    #[arg(long, env = "KB_SCRIPT")]
    script: Option<PathBuf>,

    #[arg(long, env = "KB_MCP_TRANSPORT", default_value = DEFAULT_TRANSPORT)]
    transport: String,

    #[arg(long, env = "KB_MCP_HTTP_ADDR", default_value = DEFAULT_MCP_HTTP_ADDR)]
    mcp_http_addr: SocketAddr,

    #[arg(
        long,
        env = "KB_MCP_STATEFUL",
        default_value_t = true,
        value_parser = BoolishValueParser::new()
    )]
    stateful: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    Http,
}

/// Runtime configuration loaded from CLI arguments and environment variables.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub interpreter: String,
    pub root: PathBuf,
    pub script: PathBuf,
    pub transport: Transport,
    pub mcp_http_addr: SocketAddr,
    pub stateful: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidSetting { name: &'static str, value: String },
    CurrentDir(std::io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSetting { name, value } => {
                write!(f, "invalid {name} value: {value}")
            }
            Self::CurrentDir(err) => write!(f, "failed to resolve current directory: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CurrentDir(err) => Some(err),
            Self::InvalidSetting { .. } => None,
        }
    }
}

impl DaemonConfig {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::try_from(args)
    }

    pub fn kb_config(&self) -> KbConfig {
        KbConfig::for_root(self.root.clone())
            .with_interpreter_override(Some(self.interpreter.clone()))
            .with_script_path(self.script.clone())
    }
}

impl TryFrom<CliArgs> for DaemonConfig {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let interpreter = if args.python.trim().is_empty() {
            DEFAULT_INTERPRETER.to_string()
        } else {
            args.python
        };

        let root = match args.root.filter(|root| !root.as_os_str().is_empty()) {
            Some(root) => root,
            None => std::env::current_dir().map_err(ConfigError::CurrentDir)?,
        };
        let script = match args.script.filter(|script| !script.as_os_str().is_empty()) {
            Some(script) if script.is_relative() => root.join(script),
            Some(script) => script,
            None => root.join(DEFAULT_SCRIPT),
        };

        let transport = match args.transport.trim().to_ascii_lowercase().as_str() {
            "stdio" => Transport::Stdio,
            "http" => Transport::Http,
            _ => {
                return Err(ConfigError::InvalidSetting {
                    name: "KB_MCP_TRANSPORT",
                    value: args.transport,
                });
            }
        };

        Ok(Self {
            interpreter,
            root,
            script,
            transport,
            mcp_http_addr: args.mcp_http_addr,
            stateful: args.stateful,
        })
    }
}
