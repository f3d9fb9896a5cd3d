//! Run-wide ending signal shared by the orchestrator and the running step.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use j84_canbus::CancelToken;

/// How a run is being brought to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// The operator or a step aborted the test.
    Aborted,
    /// The operator stopped the test; results so far are incomplete.
    Stopped,
    /// A step decided nothing more needs to run.
    Completed,
}

impl fmt::Display for Ending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Ending::Aborted => "Aborted",
            Ending::Stopped => "Stopped",
            Ending::Completed => "Completed",
        };
        f.write_str(s)
    }
}

/// Cancellation flag plus the ending requested by a step.
///
/// The cancel token is the same one the bus races every wait against.
#[derive(Debug, Default)]
pub struct RunControl {
    cancel: CancelToken,
    ending: Mutex<Option<Ending>>,
}

impl RunControl {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            ending: Mutex::new(None),
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Signal cancellation to every pending suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Record the ending. An abort is never downgraded.
    pub fn set_ending(&self, ending: Ending) {
        let mut current = self.ending.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != Some(Ending::Aborted) {
            *current = Some(ending);
        }
        if ending == Ending::Aborted {
            self.cancel.cancel();
        }
    }

    pub fn ending(&self) -> Option<Ending> {
        *self.ending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The ending that must interrupt the current step, if any.
    ///
    /// Cancellation without an explicit ending counts as an abort.
    /// `Completed` never interrupts; it is honored between steps.
    pub fn interruption(&self) -> Option<Ending> {
        match self.ending() {
            Some(ending @ (Ending::Aborted | Ending::Stopped)) => Some(ending),
            _ if self.cancel.is_cancelled() => Some(Ending::Aborted),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_without_interruption() {
        let control = RunControl::default();
        assert_eq!(control.ending(), None);
        assert_eq!(control.interruption(), None);
    }

    #[test]
    fn cancellation_is_an_abort() {
        let control = RunControl::default();
        control.cancel();
        assert_eq!(control.interruption(), Some(Ending::Aborted));
    }

    #[test]
    fn completed_does_not_interrupt() {
        let control = RunControl::default();
        control.set_ending(Ending::Completed);
        assert_eq!(control.ending(), Some(Ending::Completed));
        assert_eq!(control.interruption(), None);
    }

    #[test]
    fn stop_interrupts_without_cancelling() {
        let control = RunControl::default();
        control.set_ending(Ending::Stopped);
        assert_eq!(control.interruption(), Some(Ending::Stopped));
        assert!(!control.is_cancelled());
    }

    #[test]
    fn abort_cancels_and_sticks() {
        let token = CancelToken::new();
        let control = RunControl::new(token.clone());
        control.set_ending(Ending::Aborted);
        control.set_ending(Ending::Completed);
        assert_eq!(control.ending(), Some(Ending::Aborted));
        assert!(token.is_cancelled());
    }
}
