//! Command-line surface: subcommands and the global flags that apply to
//! all of them, in the same shape as the teacher's `arti-relay` binary,
//! minus the `fs-mistrust`-related flags this workspace has no use for.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// An orcore relay process.
#[derive(Clone, Debug, Parser)]
#[command(author, version)]
pub struct Cli {
    /// Which subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Flags shared by every subcommand.
    #[clap(flatten)]
    pub global: GlobalArgs,
}

/// Top-level subcommands.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Run the relay.
    Run,
    /// Print build information and exit.
    BuildInfo,
}

/// Flags that apply regardless of subcommand.
// NOTE: `global = true` must be set on every field here, mirrored by the
// test below.
#[derive(Clone, Debug, Args)]
pub struct GlobalArgs {
    /// Override the log level from the configuration.
    #[arg(long, short, global = true, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Config file to read. Defaults to the platform config directory's
    /// `orcore-relay.toml`.
    #[arg(long, short, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Log levels accepted on the command line, mapped onto `tracing`'s.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    /// Only fatal/internal-bug conditions.
    Error,
    /// Protocol violations, link failures, resource exhaustion.
    Warn,
    /// Circuit/stream lifecycle transitions.
    Info,
    /// Per-cell tracing detail.
    Debug,
    /// Everything, including transient I/O conditions.
    Trace,
}

impl From<LogLevel> for tracing::metadata::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::metadata::Level::ERROR,
            LogLevel::Warn => tracing::metadata::Level::WARN,
            LogLevel::Info => tracing::metadata::Level::INFO,
            LogLevel::Debug => tracing::metadata::Level::DEBUG,
            LogLevel::Trace => tracing::metadata::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Command;

    #[test]
    fn common_flags_parse() {
        Cli::parse_from(["orcore-relay", "build-info"]);
        Cli::parse_from(["orcore-relay", "run"]);

        let cli = Cli::parse_from(["orcore-relay", "--log-level", "warn", "run"]);
        assert_eq!(cli.global.log_level, Some(LogLevel::Warn));
    }

    #[test]
    fn global_args_are_global() {
        let cmd = Command::new("test");
        let cmd = GlobalArgs::augment_args(cmd);
        for arg in cmd.get_arguments() {
            assert!(arg.is_global_set(), "'global' must be set for {:?}", arg.get_long());
        }
    }
}
