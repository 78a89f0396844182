//! Exponential backoff reconnection logic.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};

/// Configuration for exponential backoff reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Attempts allowed before giving up.
    pub max_attempts: usize,
    /// How long a started attempt may go without a login result.
    pub attempt_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            max_attempts: 10,
            attempt_timeout: Duration::from_secs(120),
        }
    }
}

impl ReconnectConfig {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_jitter()
            .with_max_times(self.max_attempts)
            .build()
    }
}

/// Outcome of asking for a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// A new attempt should start after `delay`.
    Scheduled { attempt: u32, delay: Duration },
    /// An attempt is already waiting for its delay to pass; nothing to do.
    AlreadyPending,
    /// No attempts left.
    Exhausted,
}

/// Tracks reconnection state and calculates delays.
///
/// An attempt is in flight from the moment it is scheduled until the IM
/// network reports a login result. It is scheduled until [`fired`] marks
/// its connect as sent, and running after that. Only one attempt is ever
/// in flight.
///
/// [`fired`]: ReconnectState::fired
pub struct ReconnectState {
    config: ReconnectConfig,
    backoff: ExponentialBackoff,
    attempts: u32,
    in_flight: bool,
    running: bool,
}

impl ReconnectState {
    pub fn new(config: ReconnectConfig) -> Self {
        let backoff = config.backoff();
        Self {
            config,
            backoff,
            attempts: 0,
            in_flight: false,
            running: false,
        }
    }

    /// Request a reconnect after a fatal error.
    ///
    /// A fatal error while an attempt is running means that attempt failed.
    pub fn trigger(&mut self) -> ReconnectDecision {
        if self.in_flight {
            if self.running {
                return self.attempt_failed();
            }
            return ReconnectDecision::AlreadyPending;
        }

        match self.backoff.next() {
            Some(delay) => {
                self.in_flight = true;
                self.attempts += 1;
                ReconnectDecision::Scheduled {
                    attempt: self.attempts,
                    delay,
                }
            }
            None => ReconnectDecision::Exhausted,
        }
    }

    /// The scheduled attempt's connect has been sent.
    pub fn fired(&mut self) {
        if self.in_flight {
            self.running = true;
        }
    }

    /// The running attempt failed to log in; schedule the next one.
    pub fn attempt_failed(&mut self) -> ReconnectDecision {
        self.in_flight = false;
        self.running = false;
        self.trigger()
    }

    /// Reset state after successful connection.
    pub fn reset(&mut self) {
        self.backoff = self.config.backoff();
        self.attempts = 0;
        self.in_flight = false;
        self.running = false;
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// An attempt has been started and has no login result yet.
    pub fn running(&self) -> bool {
        self.running
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.config.attempt_timeout
    }

    /// Get current attempt count.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
