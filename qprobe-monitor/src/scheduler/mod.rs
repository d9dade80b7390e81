//! Scheduler layer for the monitor
//!
//! This layer drives the repeated status checks of one in-flight probe job.
//! It owns the poll loop, its cancellation and the request metrics, and
//! reports everything it observes through a [`PollSink`].

mod metrics;
pub mod poller;

pub use metrics::PollingMetrics;
pub use poller::{
    PollEvent, PollEventKind, PollSink, PollingEngine, PollingOptions, PollingStatus,
    StartOptions,
};
