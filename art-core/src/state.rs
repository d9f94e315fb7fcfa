//! Document lifecycle state.

use serde::{Deserialize, Serialize};

/// Lifecycle of an open document.
///
/// ```text
/// Closed --open--> Opening --decoded--> Normal <--edit/save settled--> Editing
///    ^                                                                   |
///    +---------------------------- close (from any state) --------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// No document is open.
    #[default]
    Closed,
    /// Persisted bytes are being read and decoded.
    Opening,
    /// Open with no unsaved changes.
    Normal,
    /// Open with changes not yet persisted.
    Editing,
}

impl LifecycleState {
    /// Whether a document is open and accepting edits.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Normal | Self::Editing)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Closed, Self::Opening)
                | (Self::Opening, Self::Normal)
                | (Self::Normal, Self::Editing)
                | (Self::Editing, Self::Normal)
                | (_, Self::Closed)
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Normal => "normal",
            Self::Editing => "editing",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use LifecycleState::{Closed, Editing, Normal, Opening};
        assert!(Closed.can_transition_to(Opening));
        assert!(Opening.can_transition_to(Normal));
        assert!(Normal.can_transition_to(Editing));
        assert!(Editing.can_transition_to(Normal));
        for state in [Closed, Opening, Normal, Editing] {
            assert!(state.can_transition_to(Closed));
        }
        assert!(!Closed.can_transition_to(Normal));
        assert!(!Opening.can_transition_to(Editing));
        assert!(!Normal.can_transition_to(Opening));
    }

    #[test]
    fn test_is_open() {
        assert!(LifecycleState::Normal.is_open());
        assert!(LifecycleState::Editing.is_open());
        assert!(!LifecycleState::Opening.is_open());
        assert!(!LifecycleState::Closed.is_open());
    }
}
