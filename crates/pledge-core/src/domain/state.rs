//! Lifecycle state machine for a subject.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a subject.
///
/// State transitions:
/// - Pending -> AwaitingPayment (activation provisioned)
/// - AwaitingPayment -> Active (payment captured)
/// - any -> Pending via administrative reset (fresh record, not a transition)
///
/// Active is the terminal lifecycle state; the challenge milestone is a
/// flag on the record, not a further state.
///
/// Design note: Using an enum ensures exhaustive matching and prevents
/// invalid states. Persisted as numeric codes (1|2|3) to keep snapshots
/// compact and stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum LifecycleState {
    /// Created, nothing provisioned yet.
    Pending,

    /// Activation provisioned; countdown running; payment outstanding.
    AwaitingPayment,

    /// Payment captured. Terminal.
    Active,
}

impl LifecycleState {
    /// Numeric code used in persisted snapshots.
    pub fn code(self) -> u8 {
        match self {
            LifecycleState::Pending => 1,
            LifecycleState::AwaitingPayment => 2,
            LifecycleState::Active => 3,
        }
    }

    /// Is this the terminal lifecycle state?
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Active)
    }

    /// Is `next` the single allowed forward step from `self`?
    ///
    /// Transitions are strictly monotonic: no skipping, no reverse.
    pub fn can_advance_to(self, next: LifecycleState) -> bool {
        matches!(
            (self, next),
            (LifecycleState::Pending, LifecycleState::AwaitingPayment)
                | (LifecycleState::AwaitingPayment, LifecycleState::Active)
        )
    }
}

impl From<LifecycleState> for u8 {
    fn from(state: LifecycleState) -> Self {
        state.code()
    }
}

impl TryFrom<u8> for LifecycleState {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(LifecycleState::Pending),
            2 => Ok(LifecycleState::AwaitingPayment),
            3 => Ok(LifecycleState::Active),
            other => Err(format!("unknown lifecycle state code: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn states_serialize_as_numeric_codes() {
        assert_eq!(
            serde_json::to_string(&LifecycleState::Pending).unwrap(),
            "1"
        );
        assert_eq!(
            serde_json::to_string(&LifecycleState::AwaitingPayment).unwrap(),
            "2"
        );
        assert_eq!(serde_json::to_string(&LifecycleState::Active).unwrap(), "3");

        let back: LifecycleState = serde_json::from_str("2").unwrap();
        assert_eq!(back, LifecycleState::AwaitingPayment);
    }

    #[test]
    fn unknown_code_is_rejected() {
        let err = serde_json::from_str::<LifecycleState>("7").unwrap_err();
        assert!(err.to_string().contains("unknown lifecycle state code"));
    }

    #[rstest]
    #[case::forward_from_pending(LifecycleState::Pending, LifecycleState::AwaitingPayment, true)]
    #[case::forward_from_awaiting(LifecycleState::AwaitingPayment, LifecycleState::Active, true)]
    #[case::no_skipping(LifecycleState::Pending, LifecycleState::Active, false)]
    #[case::no_reverse(LifecycleState::Active, LifecycleState::AwaitingPayment, false)]
    #[case::no_self_loop(LifecycleState::Active, LifecycleState::Active, false)]
    #[case::no_reverse_to_pending(LifecycleState::AwaitingPayment, LifecycleState::Pending, false)]
    fn transitions_are_strictly_monotonic(
        #[case] from: LifecycleState,
        #[case] to: LifecycleState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_advance_to(to), allowed);
    }

    #[test]
    fn only_active_is_terminal() {
        assert!(!LifecycleState::Pending.is_terminal());
        assert!(!LifecycleState::AwaitingPayment.is_terminal());
        assert!(LifecycleState::Active.is_terminal());
    }
}
