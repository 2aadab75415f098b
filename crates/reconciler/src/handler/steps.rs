//! Step bookkeeping for resumable workflows.

/// Generated project pushed to source control.
pub const SOURCE_REPO_SETUP: &str = "source-repo-setup";

/// Build pipeline, deployment and secret created on the provisioning backend.
pub const PROVISIONING_SETUP: &str = "provisioning-setup";

/// Tracks which steps of a convergence attempt are done.
///
/// Seeded from the integration's `steps_done`; preserves insertion order and
/// never records a step twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepTracker {
    done: Vec<String>,
}

impl StepTracker {
    /// Start from steps already recorded on the integration.
    pub fn from_done(steps: &[String]) -> Self {
        let mut tracker = Self::default();
        steps.iter().for_each(|step| tracker.mark_done(step));
        tracker
    }

    /// Check if `step` is done.
    pub fn is_done(&self, step: &str) -> bool {
        self.done.iter().any(|s| s == step)
    }

    /// Record `step` as done.
    pub fn mark_done(&mut self, step: &str) {
        if !self.is_done(step) {
            self.done.push(step.to_string());
        }
    }

    /// Completed steps, in completion order.
    pub fn done(&self) -> &[String] {
        &self.done
    }

    /// Consume the tracker, returning the completed steps.
    pub fn into_done(self) -> Vec<String> {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_tracker_skips_duplicates() {
        let tracker = StepTracker::from_done(&[
            SOURCE_REPO_SETUP.to_string(),
            SOURCE_REPO_SETUP.to_string(),
        ]);
        assert_eq!(tracker.done(), [SOURCE_REPO_SETUP.to_string()]);
        assert!(tracker.is_done(SOURCE_REPO_SETUP));
        assert!(!tracker.is_done(PROVISIONING_SETUP));
    }

    #[test]
    fn test_mark_done_keeps_order() {
        let mut tracker = StepTracker::default();
        tracker.mark_done(PROVISIONING_SETUP);
        tracker.mark_done(SOURCE_REPO_SETUP);
        tracker.mark_done(PROVISIONING_SETUP);

        assert_eq!(
            tracker.into_done(),
            vec![PROVISIONING_SETUP.to_string(), SOURCE_REPO_SETUP.to_string()]
        );
    }
}
