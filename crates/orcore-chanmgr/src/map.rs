//! The identity-keyed table of open and in-progress links.

use crate::err::Error;
use crate::SharedChannel;
use orcore_llcrypto::pk::rsa::RsaIdentity;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// What a build attempt eventually produces: the link, or why it failed.
pub(crate) type BuildResult = Result<SharedChannel, Error>;

/// An open link, plus how long it may sit idle before expiring.
pub(crate) struct OpenEntry {
    pub(crate) channel: SharedChannel,
    pub(crate) max_unused: Duration,
}

/// The state of one identity's entry in the table.
pub(crate) enum ChanEntry {
    /// A usable (not necessarily live — caller still checks) link.
    Open(OpenEntry),
    /// Someone is already building a link to this identity; `watch`
    /// publishes the outcome to every waiter at once.
    Building(watch::Receiver<Option<BuildResult>>),
}

/// What the caller of [`ChannelMap::start_or_join`] should do next.
pub(crate) enum JoinAction {
    /// A link is already open; here it is.
    UseExisting(SharedChannel),
    /// A build is already running; await this receiver for the result.
    Join(watch::Receiver<Option<BuildResult>>),
    /// No entry existed. The caller owns building the link now, and must
    /// publish the result through this sender when done.
    Build(watch::Sender<Option<BuildResult>>),
}

/// The identity-keyed link table.
pub(crate) struct ChannelMap {
    inner: Mutex<HashMap<RsaIdentity, ChanEntry>>,
}

impl ChannelMap {
    /// An empty table.
    pub(crate) fn new() -> Self {
        ChannelMap {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Look up `ident`: return an existing usable link, join an in-flight
    /// build, or claim the right to build one (installing a `Building`
    /// placeholder so later callers join instead of racing a duplicate
    /// connection).
    pub(crate) fn start_or_join(&self, ident: RsaIdentity) -> JoinAction {
        let mut inner = self.inner.lock().expect("channel map lock poisoned");
        if let Some(entry) = inner.get(&ident) {
            match entry {
                ChanEntry::Open(open) => return JoinAction::UseExisting(open.channel.clone()),
                ChanEntry::Building(rx) => return JoinAction::Join(rx.clone()),
            }
        }
        let (tx, rx) = watch::channel(None);
        inner.insert(ident, ChanEntry::Building(rx));
        JoinAction::Build(tx)
    }

    /// Record that a build finished successfully: replace the `Building`
    /// placeholder with an `Open` entry.
    pub(crate) fn finish_open(&self, ident: RsaIdentity, channel: SharedChannel, max_unused: Duration) {
        let mut inner = self.inner.lock().expect("channel map lock poisoned");
        inner.insert(ident, ChanEntry::Open(OpenEntry { channel, max_unused }));
    }

    /// Record that a build failed: drop the `Building` placeholder so the
    /// next caller starts a fresh attempt.
    pub(crate) fn finish_failed(&self, ident: &RsaIdentity) {
        let mut inner = self.inner.lock().expect("channel map lock poisoned");
        inner.remove(ident);
    }

    /// Drop the entry for `ident` outright (explicit close).
    pub(crate) fn remove(&self, ident: &RsaIdentity) {
        let mut inner = self.inner.lock().expect("channel map lock poisoned");
        inner.remove(ident);
    }

    /// Sweep links that are both idle past their `max_unused` budget and
    /// not currently being used by anyone (a non-blocking `try_lock`, so a
    /// busy link is simply skipped this round rather than stalling the
    /// sweep). Returns how long until the next link could plausibly expire.
    pub(crate) fn expire_idle(&self, now: Instant) -> Duration {
        let mut soonest = Duration::from_secs(180);
        let mut inner = self.inner.lock().expect("channel map lock poisoned");
        inner.retain(|_ident, entry| {
            let ChanEntry::Open(open) = entry else {
                return true;
            };
            let Ok(guard) = open.channel.try_lock() else {
                return true;
            };
            let idle = guard.idle_for(now);
            match open.max_unused.checked_sub(idle) {
                Some(remaining) => {
                    soonest = soonest.min(remaining);
                    true
                }
                None => false,
            }
        });
        soonest
    }

    /// Number of entries (open or building) currently tracked.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().expect("channel map lock poisoned").len()
    }
}
