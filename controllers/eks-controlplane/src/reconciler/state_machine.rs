//! Control plane lifecycle transitions.
//!
//! Every phase change goes through [`transition`], which only knows the pairs
//! listed in its table. Anything else is rejected so a bug in the reconcile
//! flow shows up as a warning instead of a silently corrupted phase.

use crds::ControlPlanePhase;
use std::fmt;
use tracing::warn;

/// What a reconcile pass observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// describe-cluster returned NotFound
    ClusterNotFound,
    /// A create was issued, or the remote is still CREATING
    CreateIssued,
    /// The remote reports ACTIVE and nothing is in flight
    RemoteActive,
    /// An in-place configuration aspect differs from the spec
    ConfigDrift,
    /// The spec version is ahead of the remote version
    VersionBehind,
    /// The remote reports UPDATING
    RemoteUpdating,
    /// A failure retrying cannot fix
    NonRetryableError,
    /// A deletion timestamp was observed
    DeletionRequested,
    /// The generation moved past the one recorded on failure
    SpecChanged,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A pair missing from the transition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: ControlPlanePhase,
    pub event: Event,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no transition from {} on {}", self.from, self.event)
    }
}

impl std::error::Error for InvalidTransition {}

/// Next phase for `event` observed in phase `from`.
pub fn transition(from: &ControlPlanePhase, event: Event) -> Result<ControlPlanePhase, InvalidTransition> {
    use ControlPlanePhase::*;
    use Event::*;

    let next = match (from, event) {
        // Deletion pre-empts everything and is terminal
        (_, DeletionRequested) => Deleting,
        (Deleting, _) => return Err(InvalidTransition { from: from.clone(), event }),

        // Failed is left only by a spec change, or by another failure
        (Failed, SpecChanged) => Pending,
        (Failed, NonRetryableError) => Failed,
        (Failed, _) => return Err(InvalidTransition { from: from.clone(), event }),
        (_, NonRetryableError) => Failed,

        // The remote cluster vanished; start over
        (_, ClusterNotFound) => Pending,

        (Pending | Creating, CreateIssued) => Creating,

        (Pending | Creating | Updating | Upgrading | Ready, RemoteActive) => Ready,

        (Pending | Creating | Ready | Updating, ConfigDrift) => Updating,
        (Pending | Ready | Updating, RemoteUpdating) => Updating,
        (Upgrading, RemoteUpdating) => Upgrading,

        (Pending | Creating | Ready | Updating | Upgrading, VersionBehind) => Upgrading,

        (Pending | Creating | Updating | Upgrading | Ready, SpecChanged) => from.clone(),

        _ => return Err(InvalidTransition { from: from.clone(), event }),
    };
    Ok(next)
}

/// Apply `event` to `phase`, keeping it unchanged when the pair is not in the table.
pub fn advance(phase: &mut ControlPlanePhase, event: Event) -> bool {
    match transition(phase, event) {
        Ok(next) => {
            *phase = next;
            true
        }
        Err(e) => {
            warn!("Rejected phase transition: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ControlPlanePhase::*;

    #[test]
    fn test_create_to_ready() {
        let mut phase = Pending;
        assert!(advance(&mut phase, Event::ClusterNotFound));
        assert_eq!(phase, Pending);
        assert!(advance(&mut phase, Event::CreateIssued));
        assert_eq!(phase, Creating);
        assert!(advance(&mut phase, Event::CreateIssued));
        assert_eq!(phase, Creating);
        assert!(advance(&mut phase, Event::RemoteActive));
        assert_eq!(phase, Ready);
    }

    #[test]
    fn test_update_and_upgrade() {
        assert_eq!(transition(&Ready, Event::ConfigDrift), Ok(Updating));
        assert_eq!(transition(&Ready, Event::VersionBehind), Ok(Upgrading));
        assert_eq!(transition(&Updating, Event::VersionBehind), Ok(Upgrading));
        assert_eq!(transition(&Upgrading, Event::RemoteUpdating), Ok(Upgrading));
        assert_eq!(transition(&Upgrading, Event::RemoteActive), Ok(Ready));
        assert_eq!(transition(&Updating, Event::RemoteActive), Ok(Ready));
    }

    #[test]
    fn test_first_active_pass_can_update() {
        let mut phase = Creating;
        assert!(advance(&mut phase, Event::ConfigDrift));
        assert_eq!(phase, Updating);

        let mut phase = Creating;
        assert!(advance(&mut phase, Event::VersionBehind));
        assert_eq!(phase, Upgrading);
    }

    #[test]
    fn test_failure_suspends_until_spec_changes() {
        for phase in [Pending, Creating, Updating, Upgrading, Ready] {
            assert_eq!(transition(&phase, Event::NonRetryableError), Ok(Failed), "{phase}");
        }
        assert!(transition(&Failed, Event::RemoteActive).is_err());
        assert!(transition(&Failed, Event::CreateIssued).is_err());
        assert_eq!(transition(&Failed, Event::SpecChanged), Ok(Pending));
    }

    #[test]
    fn test_deletion_preempts_and_is_terminal() {
        for phase in [Pending, Creating, Updating, Upgrading, Ready, Failed, Deleting] {
            assert_eq!(transition(&phase, Event::DeletionRequested), Ok(Deleting), "{phase}");
        }
        assert!(transition(&Deleting, Event::RemoteActive).is_err());
        assert!(transition(&Deleting, Event::NonRetryableError).is_err());
    }

    #[test]
    fn test_unlisted_pairs_are_rejected() {
        assert!(transition(&Ready, Event::CreateIssued).is_err());
        assert!(transition(&Creating, Event::RemoteUpdating).is_err());

        let mut phase = Ready;
        assert!(!advance(&mut phase, Event::CreateIssued));
        assert_eq!(phase, Ready);
        assert_eq!(
            InvalidTransition { from: Ready, event: Event::CreateIssued }.to_string(),
            "no transition from Ready on CreateIssued"
        );
    }
}
