//! User-consent interface.
//!
//! The on-device UI (screens, prompts, scrolling lists) lives outside this
//! repository; flows only see this trait. Every confirmation point in a
//! flow must tolerate `Rejected` and `TimedOut`.

/// Outcome of a consent prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
    TimedOut,
}

impl Decision {
    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approved)
    }
}

/// One tag/value row of a review screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagValue {
    pub tag: String,
    pub value: String,
}

impl TagValue {
    pub fn new(tag: impl Into<String>, value: impl Into<String>) -> TagValue {
        TagValue {
            tag: tag.into(),
            value: value.into(),
        }
    }
}

pub trait UserConsent {
    /// Single yes/no prompt.
    fn confirm(&mut self, prompt: &str) -> Decision;

    /// Multi-row review ending in an accept/reject choice.
    fn review_pairs(&mut self, intro: &str, pairs: &[TagValue], final_text: &str) -> Decision;

    /// Non-blocking warning banner (migration pending, fee too high, ...).
    fn warn(&mut self, message: &str);
}

#[cfg(any(test, feature = "mock"))]
pub mod testing {
    use super::{Decision, TagValue, UserConsent};

    /// Approves everything; records prompts for assertions.
    #[derive(Default)]
    pub struct AutoApprove {
        pub prompts: Vec<String>,
        pub warnings: Vec<String>,
    }

    impl UserConsent for AutoApprove {
        fn confirm(&mut self, prompt: &str) -> Decision {
            self.prompts.push(prompt.into());
            Decision::Approved
        }

        fn review_pairs(&mut self, intro: &str, _pairs: &[TagValue], _final_text: &str) -> Decision {
            self.prompts.push(intro.into());
            Decision::Approved
        }

        fn warn(&mut self, message: &str) {
            self.warnings.push(message.into());
        }
    }

    /// Rejects the n-th prompt (0-based), approves the rest.
    pub struct RejectAt {
        pub index: usize,
        seen: usize,
    }

    impl RejectAt {
        pub fn new(index: usize) -> RejectAt {
            RejectAt { index, seen: 0 }
        }

        fn step(&mut self) -> Decision {
            let decision = if self.seen == self.index {
                Decision::Rejected
            } else {
                Decision::Approved
            };
            self.seen += 1;
            decision
        }
    }

    impl UserConsent for RejectAt {
        fn confirm(&mut self, _prompt: &str) -> Decision {
            self.step()
        }

        fn review_pairs(&mut self, _intro: &str, _pairs: &[TagValue], _final_text: &str) -> Decision {
            self.step()
        }

        fn warn(&mut self, _message: &str) {}
    }
}
