//! Background maintenance: periodically sweep idle OR-links so a relay
//! that stops being useful to anyone eventually lets its links go,
//! rather than holding every link it ever dialed or accepted forever.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::relay::RelayContext;

/// Floor on how long the sweep ever sleeps between passes, regardless of
/// what `ChanMgr::expire_idle` reports as the next candidate expiry —
/// guards against a degenerate near-zero wakeup storm if many links
/// share almost the same budget.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Ceiling on how long the sweep ever sleeps, so a relay with no links
/// at all still wakes up often enough to notice new ones accumulating.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Run the maintenance sweep forever. Never returns; the caller spawns
/// this alongside the OR-port and SOCKS listeners.
pub async fn run(ctx: Arc<RelayContext>) {
    loop {
        let next = ctx.chanmgr.expire_idle(Instant::now());
        let sleep_for = next.clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL);
        debug!(links = ctx.chanmgr.len(), circuits = ctx.table.approx_len().await, next_sweep_secs = sleep_for.as_secs(), "maintenance sweep");
        tokio::time::sleep(sleep_for).await;
    }
}
