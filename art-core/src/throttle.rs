//! Suppression of repeated user-facing failure warnings.
//!
//! Each failure is tied to a key (usually the locator that could not be opened).
//! After the user asks to stop warning about a key, repeats of that key stay
//! quiet until `repeat_threshold` of them have been swallowed; suppression then
//! clears so a persistent failure is never silent forever. A different key always
//! starts fresh. Every failure is counted and logged whether or not the user is
//! told about it. Only the current key is tracked, so memory stays constant no
//! matter how many distinct keys fail.

use std::fmt::Debug;

/// Default number of suppressed repeats before warnings resume.
pub const DEFAULT_REPEAT_THRESHOLD: u32 = 3;

/// Throttle configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Suppressed repeats of the same key after which suppression clears.
    pub repeat_threshold: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            repeat_threshold: DEFAULT_REPEAT_THRESHOLD,
        }
    }
}

/// Outcome of reporting a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureReport {
    /// Whether the user should see a warning for this failure.
    pub should_notify_user: bool,
    /// How many times in a row this key has failed.
    pub occurrences: u64,
}

/// Per-key warning throttle.
#[derive(Debug, Clone)]
pub struct FailureThrottle<K> {
    config: ThrottleConfig,
    current: Option<K>,
    suppressed: bool,
    suppressed_repeats: u32,
    occurrences: u64,
}

impl<K> FailureThrottle<K>
where
    K: Clone + Eq + Debug,
{
    /// Create a throttle.
    #[must_use]
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            current: None,
            suppressed: false,
            suppressed_repeats: 0,
            occurrences: 0,
        }
    }

    /// Record a failure for `key` and decide whether to warn the user.
    pub fn report_failure(&mut self, key: K) -> FailureReport {
        let should_notify_user = if self.current.as_ref() == Some(&key) {
            self.occurrences += 1;
            if self.suppressed {
                self.suppressed_repeats += 1;
                if self.suppressed_repeats >= self.config.repeat_threshold {
                    tracing::debug!(?key, "Warning suppression expired");
                    self.suppressed = false;
                    self.suppressed_repeats = 0;
                }
                false
            } else {
                true
            }
        } else {
            self.current = Some(key.clone());
            self.occurrences = 1;
            self.suppressed = false;
            self.suppressed_repeats = 0;
            true
        };
        let occurrences = self.occurrences;

        tracing::warn!(?key, occurrences, should_notify_user, "Failure reported");
        FailureReport {
            should_notify_user,
            occurrences,
        }
    }

    /// The user asked to stop warning about the current key.
    pub fn suppress(&mut self) {
        tracing::debug!(key = ?self.current, "Warnings suppressed by user");
        self.suppressed = true;
        self.suppressed_repeats = 0;
    }

    /// Whether warnings are currently suppressed.
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// The key the throttle is currently tracking.
    #[must_use]
    pub fn current_key(&self) -> Option<&K> {
        self.current.as_ref()
    }

    /// Consecutive failures recorded for `key`, including suppressed ones.
    ///
    /// Zero unless `key` is the one currently tracked.
    #[must_use]
    pub fn occurrences(&self, key: &K) -> u64 {
        if self.current.as_ref() == Some(key) {
            self.occurrences
        } else {
            0
        }
    }
}

impl<K> Default for FailureThrottle<K>
where
    K: Clone + Eq + Debug,
{
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}
