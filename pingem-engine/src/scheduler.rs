//! The reply scheduler: loss/delay decisions and per-request reply tasks.

use std::{fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use pingem_net::{FrameSink, LocalIdentity};
use pingem_wire::{build_reply, EchoRequest};

use crate::{
    profile::{NetworkProfile, ProfileTable},
    stats::SimStats,
};

/// Outcome of the loss/delay model for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No reply, ever. Silent on the wire, visible in diagnostics.
    Drop,
    /// Reply after `delay`.
    Reply { delay: Duration },
}

/// Rolls loss and draws the randomized delay for one request.
///
/// A destination without a profile replies immediately and never drops.
/// Otherwise a uniform roll in `[0, 1)` against the loss rate decides the
/// request's fate, and survivors wait `median + uniform(-jitter, +jitter)`
/// milliseconds. The clamp at zero means the wait can never be negative;
/// it only narrows the effective downward spread.
pub fn decide<R: Rng>(profile: Option<&NetworkProfile>, rng: &mut R) -> Verdict {
    let Some(profile) = profile else {
        return Verdict::Reply { delay: Duration::ZERO };
    };

    if rng.gen::<f64>() < profile.loss_rate {
        return Verdict::Drop;
    }

    let jitter = if profile.jitter_ms > 0.0 {
        rng.gen_range(-profile.jitter_ms..=profile.jitter_ms)
    } else {
        0.0
    };
    let delay_ms = (profile.median_ms + jitter).max(0.0);

    Verdict::Reply { delay: Duration::from_secs_f64(delay_ms / 1e3) }
}

/// Fans accepted requests out into independent reply tasks.
///
/// There is deliberately no cap on in-flight tasks and no coordination
/// between them: each one is a sleep, a frame build and a send. Replies
/// therefore complete in delay order, not arrival order.
pub struct ReplyScheduler {
    profiles: Arc<ProfileTable>,
    identity: LocalIdentity,
    sink: Arc<dyn FrameSink>,
    stats: Arc<SimStats>,
    /// Seedable so `--seed` (and tests) get a reproducible loss/jitter
    /// stream.
    rng: Mutex<StdRng>,
}

impl fmt::Debug for ReplyScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyScheduler")
            .field("profiles", &self.profiles.len())
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl ReplyScheduler {
    pub fn new(
        profiles: Arc<ProfileTable>,
        identity: LocalIdentity,
        sink: Arc<dyn FrameSink>,
        stats: Arc<SimStats>,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self { profiles, identity, sink, stats, rng: Mutex::new(rng) }
    }

    /// Schedules the reply for one accepted request.
    ///
    /// Costs the caller one table lookup and at most two random draws; the
    /// sleep and the transmit happen on a freshly spawned task that nothing
    /// waits for. Returns the task handle, or `None` if the loss model
    /// dropped the request. Must be called from within a tokio runtime.
    pub fn schedule(&self, request: EchoRequest) -> Option<JoinHandle<()>> {
        let verdict = {
            let mut rng = self.rng.lock();
            decide(self.profiles.lookup(request.dst_ip), &mut *rng)
        };

        let delay = match verdict {
            Verdict::Drop => {
                self.stats.increment_dropped();
                debug!(dst = %request.dst_ip, "dropped echo request");
                return None;
            }
            Verdict::Reply { delay } => delay,
        };

        let sink = Arc::clone(&self.sink);
        let stats = Arc::clone(&self.stats);
        let local_mac = self.identity.mac;

        Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let reply = build_reply(&request, local_mac);
            match sink.transmit(reply) {
                Ok(()) => {
                    stats.increment_replied();
                    debug!(
                        src = %request.dst_ip,
                        dst = %request.src_ip,
                        delay_ms = delay.as_secs_f64() * 1e3,
                        "echo reply sent"
                    );
                }
                Err(err) => {
                    // Contained: one lost reply never affects other tasks,
                    // and a replayed ping will generate a fresh request.
                    stats.increment_failed();
                    warn!(dst = %request.src_ip, %err, "failed to transmit echo reply");
                }
            }
        }))
    }
}
