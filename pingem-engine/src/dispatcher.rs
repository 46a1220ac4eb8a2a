//! The capture dispatcher: the single receive loop feeding the scheduler.

use std::{fmt, sync::Arc};

use ipnetwork::Ipv4Network;
use tracing::{info, trace, warn};

use pingem_net::{FrameSource, LocalIdentity};
use pingem_wire::EchoRequest;

use crate::{scheduler::ReplyScheduler, stats::SimStats};

/// Receives inbound frames, keeps only echo requests aimed at the target
/// network, discards the simulator's own traffic, and hands everything
/// else to the scheduler without ever waiting on a reply task.
pub struct CaptureDispatcher {
    scheduler: Arc<ReplyScheduler>,
    identity: LocalIdentity,
    /// In-process stand-in for the capture filter
    /// `icmp and dst net <target>`.
    target: Ipv4Network,
    stats: Arc<SimStats>,
}

impl fmt::Debug for CaptureDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureDispatcher")
            .field("identity", &self.identity)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl CaptureDispatcher {
    pub fn new(
        scheduler: Arc<ReplyScheduler>,
        identity: LocalIdentity,
        target: Ipv4Network,
        stats: Arc<SimStats>,
    ) -> Self {
        Self { scheduler, identity, target, stats }
    }

    /// Runs until the source reports closed, which the live capture channel
    /// never does: in production this loop ends only with the process.
    pub fn run(&self, source: &mut dyn FrameSource) {
        info!(net = %self.target, identity = %self.identity, "capture dispatcher running");

        loop {
            match source.next_frame() {
                Ok(Some(frame)) => self.dispatch(&frame),
                Ok(None) => {
                    info!("capture channel closed");
                    return;
                }
                Err(err) => warn!(%err, "capture error"),
            }
        }
    }

    fn dispatch(&self, frame: &[u8]) {
        // Anything that is not an echo request is ordinary background
        // traffic on the interface, not an error.
        let request = match EchoRequest::parse(frame) {
            Ok(request) => request,
            Err(err) => {
                trace!(%err, "ignoring non-echo-request frame");
                return;
            }
        };

        if !self.target.contains(request.dst_ip) {
            trace!(dst = %request.dst_ip, "ignoring echo request outside target network");
            return;
        }

        // Without this the simulator would answer its own probes, and those
        // of anything else sharing the local address.
        if request.src_ip == self.identity.ip {
            trace!(src = %request.src_ip, "ignoring self-originated echo request");
            return;
        }

        self.stats.increment_received();
        self.scheduler.schedule(request);
    }
}
