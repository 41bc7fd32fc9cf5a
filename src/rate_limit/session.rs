//! Action Throttling for a User Session
//!
//! Glue between the limiter and the UI: checks a named action for the
//! current subject, tells the user when they are being throttled, and
//! forgets all throttling history when the session ends.

use tracing::warn;

use super::clock::{Clock, SystemClock};
use super::error::Result;
use super::limiter::{RateLimitDecision, RateLimiter};

/// Surface that shows throttling messages to the user
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notifier that writes to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str) {
        warn!("{}", message);
    }
}

impl<F> Notifier for F
where
    F: Fn(&str) + Send + Sync,
{
    fn notify(&self, message: &str) {
        self(message)
    }
}

/// Message shown when `action` is throttled
pub fn denial_message(action: &str, decision: &RateLimitDecision) -> String {
    match decision.retry_after_secs() {
        Some(secs) if secs > 0 => format!(
            "Too many {} attempts. Please wait about {}s before trying again.",
            action, secs
        ),
        Some(_) => format!("Too many {} attempts. Please try again.", action),
        None => format!("{} is currently unavailable.", action),
    }
}

/// Per-session action throttle
pub struct ActionThrottle<N: Notifier, C: Clock = SystemClock> {
    limiter: RateLimiter<C>,
    notifier: N,
}

impl<N: Notifier, C: Clock + 'static> ActionThrottle<N, C> {
    pub fn new(limiter: RateLimiter<C>, notifier: N) -> Self {
        Self { limiter, notifier }
    }

    /// Check `action` for `subject`, notifying the user on denial
    pub async fn attempt(&self, action: &str, subject: &str) -> Result<bool> {
        let decision = self.limiter.check_action(action, subject).await?;
        if !decision.allowed {
            self.notifier.notify(&denial_message(action, &decision));
        }
        Ok(decision.allowed)
    }

    /// Whole tokens left for `action` and `subject`
    pub async fn remaining(&self, action: &str, subject: &str) -> u32 {
        let key = super::limiter::action_key(action, subject);
        self.limiter.remaining_quota(&key).await
    }

    /// Logout hook: drop all throttling history
    pub async fn end_session(&self) {
        self.limiter.clear_all().await;
    }

    pub fn limiter(&self) -> &RateLimiter<C> {
        &self.limiter
    }
}
