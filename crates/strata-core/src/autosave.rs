//! Autosave debounce policy
//!
//! Pure state machine; the caller owns the actual timer and performs the
//! save. A burst of edits is persisted either when the burst goes quiet for
//! one timer period or when it reaches the threshold, whichever comes first.

/// What the caller should do after counting an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutosaveDecision {
    /// First action after idle: arm the timer
    StartTimer,
    /// Push the timer deadline back by one period
    ResetTimer,
    /// Threshold reached: save now and leave the timer running
    SaveNow,
}

/// Per-room autosave counter
#[derive(Debug, Clone)]
pub struct AutosavePolicy {
    threshold: u32,
    pending: u32,
    armed: bool,
}

impl AutosavePolicy {
    /// Create a policy that forces a save every `threshold` actions
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            pending: 0,
            armed: false,
        }
    }

    /// Count one qualifying action
    pub fn record(&mut self) -> AutosaveDecision {
        self.pending += 1;

        if self.pending >= self.threshold {
            self.pending = 0;
            return AutosaveDecision::SaveNow;
        }

        if self.armed {
            AutosaveDecision::ResetTimer
        } else {
            self.armed = true;
            AutosaveDecision::StartTimer
        }
    }

    /// The timer fired. Disarms and reports whether unsaved actions remain.
    pub fn expire(&mut self) -> bool {
        self.armed = false;
        let dirty = self.pending > 0;
        self.pending = 0;
        dirty
    }

    /// Whether the caller's timer should be running
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Actions counted since the last save
    #[must_use]
    pub fn pending(&self) -> u32 {
        self.pending
    }
}

impl Default for AutosavePolicy {
    fn default() -> Self {
        Self::new(30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_action_starts_timer() {
        let mut policy = AutosavePolicy::new(30);
        assert_eq!(policy.record(), AutosaveDecision::StartTimer);
        assert!(policy.is_armed());
        assert_eq!(policy.record(), AutosaveDecision::ResetTimer);
        assert_eq!(policy.pending(), 2);
    }

    #[test]
    fn test_threshold_saves_once() {
        let mut policy = AutosavePolicy::new(30);
        let saves = (0..30)
            .map(|_| policy.record())
            .filter(|d| *d == AutosaveDecision::SaveNow)
            .count();

        assert_eq!(saves, 1);
        assert_eq!(policy.pending(), 0);
        assert!(policy.is_armed());

        // nothing new since the forced save
        assert!(!policy.expire());
    }

    #[test]
    fn test_expiry_saves_pending() {
        let mut policy = AutosavePolicy::new(30);
        policy.record();
        assert!(policy.expire());
        assert!(!policy.is_armed());
        assert_eq!(policy.record(), AutosaveDecision::StartTimer);
    }

    #[test]
    fn test_threshold_of_one() {
        let mut policy = AutosavePolicy::new(1);
        assert_eq!(policy.record(), AutosaveDecision::SaveNow);
        assert_eq!(policy.record(), AutosaveDecision::SaveNow);
        assert!(!policy.is_armed());
    }
}
