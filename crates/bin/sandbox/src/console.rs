use std::path::PathBuf;
use std::str::FromStr;

use structopt::StructOpt;

use raven_log::LevelFilter;

/// Native layout the headless device translates build inputs into.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Vulkan,
    D3d12,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().trim() {
            "vulkan" | "vk" => Ok(BackendKind::Vulkan),
            "d3d12" | "dx12" => Ok(BackendKind::D3d12),
            other => Err(anyhow::anyhow!("Unknown backend {}", other)),
        }
    }
}

/// Collect console configuration into a struct.
pub fn from_args() -> anyhow::Result<ConsoleVars> {
    let console_var = ConsoleVarsImpl::from_args();

    let level = match console_var.level.to_lowercase().trim() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        other => anyhow::bail!("Unknown log level {}", other),
    };

    Ok(ConsoleVars {
        level,
        log_file: console_var.log_file,
        config: console_var.config,
        backend: console_var.backend,
    })
}

/// Console variables collect from console commands.
pub struct ConsoleVars {
    pub level: LevelFilter,
    pub log_file: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub backend: BackendKind,
}

#[derive(Debug, StructOpt)]
#[structopt(name = "raven sandbox", about = "Builds acceleration containers on a headless device.")]
struct ConsoleVarsImpl {
    /// log level (please choose from trace, debug, info, warn, error)
    #[structopt(short, long, default_value = "debug")]
    level: String,
    /// mirror the log into this file
    #[structopt(long, parse(from_os_str))]
    log_file: Option<PathBuf>,
    /// ray tracing device config (toml)
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,
    /// build input layout (vulkan, d3d12)
    #[structopt(short, long, default_value = "vulkan")]
    backend: BackendKind,
}
