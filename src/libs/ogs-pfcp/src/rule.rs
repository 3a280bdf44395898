//! PFCP Rules
//!
//! Packet Detection, Forwarding Action and Buffering Action Rules as kept
//! by the control plane. A [`Pdr`] owns exactly one [`Far`]; a [`Far`] may
//! own one [`Bar`]. Every rule carries a [`RuleState`] describing how it
//! relates to the state installed on the forwarding node.

use crate::types::{ApplyAction, ForwardingParameters, OuterHeaderRemoval, Pdi};

// ============================================================================
// Rule lifecycle
// ============================================================================

/// Rule lifecycle tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RuleState {
    /// Never sent to the forwarding node
    #[default]
    Initial,
    /// Changed since the last confirmed sync
    Update,
    /// Pending deletion on the forwarding node
    Remove,
    /// Matches the forwarding node
    Synced,
}

/// What a synchronization must do with a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleAction {
    Create,
    Update,
    Remove,
}

impl RuleState {
    /// Get state name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initial => "INITIAL",
            Self::Update => "UPDATE",
            Self::Remove => "REMOVE",
            Self::Synced => "SYNCED",
        }
    }

    /// Action the next synchronization must carry, `None` if nothing to send
    pub fn pending_action(&self) -> Option<RuleAction> {
        match self {
            Self::Initial => Some(RuleAction::Create),
            Self::Update => Some(RuleAction::Update),
            Self::Remove => Some(RuleAction::Remove),
            Self::Synced => None,
        }
    }

    /// State after the rule content changed.
    ///
    /// A rule that was never sent stays `Initial`: it still has to be created.
    pub fn on_change(self) -> Self {
        match self {
            Self::Initial => Self::Initial,
            Self::Update | Self::Synced => Self::Update,
            Self::Remove => Self::Remove,
        }
    }

    /// State after the forwarding node confirmed the pending action.
    ///
    /// `None` means the rule no longer exists and must be dropped.
    pub fn on_confirmed(self) -> Option<Self> {
        match self {
            Self::Initial | Self::Update | Self::Synced => Some(Self::Synced),
            Self::Remove => None,
        }
    }
}

// ============================================================================
// BAR
// ============================================================================

/// Buffering Action Rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bar {
    pub bar_id: u8,
    /// Suggested number of buffered packets before notifying
    pub suggested_buffering_packets: u8,
    pub state: RuleState,
}

impl Bar {
    pub fn new(bar_id: u8) -> Self {
        Self {
            bar_id,
            suggested_buffering_packets: 0,
            state: RuleState::Initial,
        }
    }
}

// ============================================================================
// FAR
// ============================================================================

/// Forwarding Action Rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Far {
    pub far_id: u32,
    pub apply_action: ApplyAction,
    pub forwarding_parameters: Option<ForwardingParameters>,
    pub bar: Option<Bar>,
    pub state: RuleState,
}

impl Far {
    pub fn new(far_id: u32, apply_action: ApplyAction) -> Self {
        Self {
            far_id,
            apply_action,
            forwarding_parameters: None,
            bar: None,
            state: RuleState::Initial,
        }
    }

    /// Replace the apply action, tagging the rule as changed
    pub fn set_apply_action(&mut self, apply_action: ApplyAction) {
        self.apply_action = apply_action;
        self.state = self.state.on_change();
    }

    /// Replace the forwarding parameters, tagging the rule as changed
    pub fn set_forwarding_parameters(&mut self, parameters: ForwardingParameters) {
        self.forwarding_parameters = Some(parameters);
        self.state = self.state.on_change();
    }

    /// Tag the rule as changed without touching its content
    pub fn touch(&mut self) {
        self.state = self.state.on_change();
    }

    fn mark_remove(&mut self) {
        self.state = RuleState::Remove;
        if let Some(bar) = self.bar.as_mut() {
            bar.state = RuleState::Remove;
        }
    }
}

// ============================================================================
// PDR
// ============================================================================

/// Packet Detection Rule with its owned FAR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdr {
    pub pdr_id: u16,
    pub precedence: u32,
    pub pdi: Pdi,
    pub outer_header_removal: Option<OuterHeaderRemoval>,
    pub far: Far,
    pub state: RuleState,
}

impl Pdr {
    pub fn new(pdr_id: u16, precedence: u32, pdi: Pdi, far: Far) -> Self {
        Self {
            pdr_id,
            precedence,
            pdi,
            outer_header_removal: None,
            far,
            state: RuleState::Initial,
        }
    }

    /// Tag the rule as changed
    pub fn touch(&mut self) {
        self.state = self.state.on_change();
    }

    /// Tag the PDR together with its FAR and BAR for removal
    pub fn mark_remove(&mut self) {
        self.state = RuleState::Remove;
        self.far.mark_remove();
    }

    /// True if the PDR, its FAR or its BAR still has to be sent
    pub fn needs_sync(&self) -> bool {
        self.state.pending_action().is_some()
            || self.far.state.pending_action().is_some()
            || self
                .far
                .bar
                .as_ref()
                .is_some_and(|bar| bar.state.pending_action().is_some())
    }

    /// True if the PDR and everything it owns is tagged `Synced`
    pub fn is_synced(&self) -> bool {
        !self.needs_sync()
    }

    /// True if the PDR is pending deletion
    pub fn is_removing(&self) -> bool {
        self.state == RuleState::Remove
    }

    /// Apply a confirmation from the forwarding node.
    ///
    /// Returns `false` when the PDR itself was removed and must be dropped
    /// by its owner.
    pub fn confirm(&mut self) -> bool {
        if let Some(bar) = self.far.bar.as_mut() {
            match bar.state.on_confirmed() {
                Some(state) => bar.state = state,
                None => self.far.bar = None,
            }
        }
        let far_kept = match self.far.state.on_confirmed() {
            Some(state) => {
                self.far.state = state;
                true
            }
            None => false,
        };
        match self.state.on_confirmed() {
            Some(state) => {
                self.state = state;
                far_kept
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceInterface;

    fn test_pdr() -> Pdr {
        Pdr::new(1, 255, Pdi::new(SourceInterface::Access), Far::new(1, ApplyAction::forward()))
    }

    #[test]
    fn test_new_rule_is_initial() {
        let pdr = test_pdr();
        assert_eq!(pdr.state, RuleState::Initial);
        assert_eq!(pdr.far.state, RuleState::Initial);
        assert!(pdr.needs_sync());
    }

    #[test]
    fn test_change_before_first_sync_stays_initial() {
        let mut pdr = test_pdr();
        pdr.far.set_apply_action(ApplyAction::buffer());
        assert_eq!(pdr.far.state, RuleState::Initial);
    }

    #[test]
    fn test_confirm_then_update() {
        let mut pdr = test_pdr();
        assert!(pdr.confirm());
        assert!(pdr.is_synced());

        pdr.far.set_apply_action(ApplyAction::buffer_and_notify());
        assert_eq!(pdr.far.state, RuleState::Update);
        assert_eq!(pdr.state, RuleState::Synced);
        assert!(pdr.needs_sync());

        assert!(pdr.confirm());
        assert!(pdr.is_synced());
    }

    #[test]
    fn test_remove_drops_on_confirm() {
        let mut pdr = test_pdr();
        pdr.far.bar = Some(Bar::new(1));
        pdr.confirm();

        pdr.mark_remove();
        assert!(pdr.is_removing());
        assert_eq!(pdr.far.state, RuleState::Remove);
        assert_eq!(pdr.far.bar.as_ref().unwrap().state, RuleState::Remove);
        assert!(!pdr.confirm());
    }

    #[test]
    fn test_pending_action_is_exhaustive() {
        assert_eq!(RuleState::Initial.pending_action(), Some(RuleAction::Create));
        assert_eq!(RuleState::Update.pending_action(), Some(RuleAction::Update));
        assert_eq!(RuleState::Remove.pending_action(), Some(RuleAction::Remove));
        assert_eq!(RuleState::Synced.pending_action(), None);
    }
}
