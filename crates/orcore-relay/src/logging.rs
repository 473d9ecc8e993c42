//! Logger setup, in two stages like the teacher's `main.rs`: a basic
//! stderr logger active before the config file is read (so config
//! loading itself can log), then a full logger once the config's level
//! override, if any, is known.

use std::io::IsTerminal as _;

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::FmtSubscriber;

/// Level used before a config file (and any `--log-level` override) has
/// been read.
pub const DEFAULT_LOG_LEVEL: tracing::metadata::Level = tracing::metadata::Level::INFO;

/// Install a stderr logger at `level` as the *scoped* default for as
/// long as the returned guard lives. Used early in `main`, before the
/// config is loaded, so config loading itself can log; the guard is
/// dropped once [`dispatch`] installs the real, process-global logger,
/// since `tracing` only allows one global default ever.
#[must_use]
pub fn init_early(level: tracing::metadata::Level) -> tracing::subscriber::DefaultGuard {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .parse("")
        .expect("empty filter directive should be trivially parsable");
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_default(subscriber)
}

/// Build a full logger at `level`, for use as the relay's permanent
/// dispatch once startup is complete.
///
/// This maps the relay's error taxonomy onto `tracing` levels at the
/// call site, not here: protocol violations and link
/// failures are logged at `warn!` (with teardown detail at `debug!`),
/// transient I/O at `trace!`, resource exhaustion at `warn!`, and an
/// internal `Bug` at `error!`. This function only controls the filter
/// those calls are measured against.
pub fn dispatch(level: tracing::metadata::Level) -> tracing::Dispatch {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .parse("")
        .expect("empty filter directive should be trivially parsable");
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .finish();
    tracing::Dispatch::new(subscriber)
}
