//! Request metrics of a poll loop

use std::collections::VecDeque;
use std::time::Duration;

/// Number of response times kept for the rolling average
pub const RESPONSE_TIME_HISTORY: usize = 100;

/// Counters and latency history of the status checks of one poll loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollingMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Latency of the most recent successful requests, oldest first
    pub response_times: VecDeque<Duration>,
    pub average_response_time: Duration,
}

impl PollingMetrics {
    /// Records a successful request and its latency
    pub fn record_success(&mut self, latency: Duration) {
        self.total_requests += 1;
        self.successful_requests += 1;

        if self.response_times.len() == RESPONSE_TIME_HISTORY {
            self.response_times.pop_front();
        }
        self.response_times.push_back(latency);

        let total: Duration = self.response_times.iter().sum();
        self.average_response_time = total / self.response_times.len() as u32;
    }

    /// Records a failed request
    pub fn record_failure(&mut self) {
        self.total_requests += 1;
        self.failed_requests += 1;
    }

    /// Share of requests that succeeded, between 0 and 1
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }
}
