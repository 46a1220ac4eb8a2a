//! The echo simulation engine.
//!
//! The engine answers ICMP Echo Requests the way a simulated network would:
//! each destination address can carry a [`NetworkProfile`] (median delay,
//! jitter, loss rate), and every accepted request is either dropped or
//! answered by an independent reply task after a randomized delay. The
//! capture loop never waits on a reply, so thousands of replies can be in
//! flight with independent timers.
//!
//! Replies carry no ordering guarantee relative to the requests that caused
//! them: out-of-order completion is how jitter becomes observable
//! downstream, and is intentional.

pub mod dispatcher;
pub mod loader;
pub mod profile;
pub mod scheduler;
pub mod stats;

pub use dispatcher::CaptureDispatcher;
pub use loader::{load_profiles, read_profiles};
pub use profile::{NetworkProfile, ProfileTable};
pub use scheduler::{decide, ReplyScheduler, Verdict};
pub use stats::SimStats;
