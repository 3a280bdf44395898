//! PFCP Session Requests
//!
//! Establishment, modification and deletion requests as handed to the
//! forwarding-node transport. Rules are carried as flat IEs whose
//! [`RuleAction`] was derived from the rule's lifecycle tag.

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::{PfcpError, PfcpResult};
use crate::rule::{Pdr, RuleAction};
use crate::types::{ApplyAction, ForwardingParameters, OuterHeaderRemoval, PfcpCause, Pdi};

/// PDR as carried in a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdrIe {
    pub action: RuleAction,
    pub pdr_id: u16,
    pub precedence: u32,
    pub pdi: Pdi,
    pub outer_header_removal: Option<OuterHeaderRemoval>,
    pub far_id: u32,
}

/// FAR as carried in a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FarIe {
    pub action: RuleAction,
    pub far_id: u32,
    pub apply_action: ApplyAction,
    pub forwarding_parameters: Option<ForwardingParameters>,
    pub bar_id: Option<u8>,
}

/// BAR as carried in a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarIe {
    pub action: RuleAction,
    pub bar_id: u8,
    pub suggested_buffering_packets: u8,
}

/// Session request kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRequestKind {
    Establishment,
    Modification,
    Deletion,
}

impl SessionRequestKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Establishment => "Session Establishment",
            Self::Modification => "Session Modification",
            Self::Deletion => "Session Deletion",
        }
    }
}

impl fmt::Display for SessionRequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One request to one forwarding node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub kind: SessionRequestKind,
    /// Forwarding node address
    pub node: Ipv4Addr,
    /// Control-plane (local) SEID
    pub cp_seid: u64,
    /// User-plane (remote) SEID, known once established
    pub up_seid: Option<u64>,
    pub pdrs: Vec<PdrIe>,
    pub fars: Vec<FarIe>,
    pub bars: Vec<BarIe>,
}

impl SessionRequest {
    fn new(kind: SessionRequestKind, node: Ipv4Addr, cp_seid: u64, up_seid: Option<u64>) -> Self {
        Self {
            kind,
            node,
            cp_seid,
            up_seid,
            pdrs: Vec::new(),
            fars: Vec::new(),
            bars: Vec::new(),
        }
    }

    /// Session Establishment Request
    pub fn establishment(node: Ipv4Addr, cp_seid: u64) -> Self {
        Self::new(SessionRequestKind::Establishment, node, cp_seid, None)
    }

    /// Session Modification Request
    pub fn modification(node: Ipv4Addr, cp_seid: u64, up_seid: u64) -> Self {
        Self::new(SessionRequestKind::Modification, node, cp_seid, Some(up_seid))
    }

    /// Session Deletion Request
    pub fn deletion(node: Ipv4Addr, cp_seid: u64, up_seid: u64) -> Self {
        Self::new(SessionRequestKind::Deletion, node, cp_seid, Some(up_seid))
    }

    /// Add every pending part of `pdr` (the PDR, its FAR, its BAR).
    ///
    /// An establishment carries only creations: rules pending removal are
    /// skipped and pending updates are sent as creations. A deletion
    /// carries no rules at all.
    pub fn add_pdr(&mut self, pdr: &Pdr) -> PfcpResult<()> {
        if !pdr.needs_sync() {
            return Err(PfcpError::RuleAlreadySynced {
                kind: "PDR",
                id: u32::from(pdr.pdr_id),
            });
        }
        if self.kind == SessionRequestKind::Deletion {
            return Err(PfcpError::InvalidRequest(format!(
                "{} carries no rules (PDR {})",
                self.kind, pdr.pdr_id
            )));
        }

        if let Some(action) = self.action_for(pdr.state.pending_action()) {
            self.pdrs.push(PdrIe {
                action,
                pdr_id: pdr.pdr_id,
                precedence: pdr.precedence,
                pdi: pdr.pdi.clone(),
                outer_header_removal: pdr.outer_header_removal,
                far_id: pdr.far.far_id,
            });
        }
        if let Some(action) = self.action_for(pdr.far.state.pending_action()) {
            self.fars.push(FarIe {
                action,
                far_id: pdr.far.far_id,
                apply_action: pdr.far.apply_action,
                forwarding_parameters: pdr.far.forwarding_parameters.clone(),
                bar_id: pdr.far.bar.as_ref().map(|bar| bar.bar_id),
            });
        }
        if let Some(bar) = pdr.far.bar.as_ref() {
            if let Some(action) = self.action_for(bar.state.pending_action()) {
                self.bars.push(BarIe {
                    action,
                    bar_id: bar.bar_id,
                    suggested_buffering_packets: bar.suggested_buffering_packets,
                });
            }
        }
        Ok(())
    }

    fn action_for(&self, pending: Option<RuleAction>) -> Option<RuleAction> {
        match (self.kind, pending) {
            (_, None) => None,
            (SessionRequestKind::Deletion, Some(_)) => None,
            (SessionRequestKind::Establishment, Some(RuleAction::Remove)) => None,
            (SessionRequestKind::Establishment, Some(_)) => Some(RuleAction::Create),
            (SessionRequestKind::Modification, Some(action)) => Some(action),
        }
    }

    /// True if the request carries no rule IEs
    pub fn is_empty(&self) -> bool {
        self.pdrs.is_empty() && self.fars.is_empty() && self.bars.is_empty()
    }

    /// Identifiers of the PDRs carried, in request order
    pub fn pdr_ids(&self) -> Vec<u16> {
        self.pdrs.iter().map(|ie| ie.pdr_id).collect()
    }

    /// Identifiers of the FARs carried, in request order
    pub fn far_ids(&self) -> Vec<u32> {
        self.fars.iter().map(|ie| ie.far_id).collect()
    }

    /// Number of IEs carrying the given action
    pub fn count(&self, action: RuleAction) -> usize {
        self.pdrs.iter().filter(|ie| ie.action == action).count()
            + self.fars.iter().filter(|ie| ie.action == action).count()
            + self.bars.iter().filter(|ie| ie.action == action).count()
    }
}

/// A forwarding node's answer to one [`SessionRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionResponse {
    pub node: Ipv4Addr,
    pub cause: PfcpCause,
    /// User-plane SEID allocated by the node on establishment
    pub up_seid: Option<u64>,
}

impl SessionResponse {
    /// Accepted response
    pub fn accepted(node: Ipv4Addr, up_seid: Option<u64>) -> Self {
        Self {
            node,
            cause: PfcpCause::RequestAccepted,
            up_seid,
        }
    }

    /// Rejected response
    pub fn rejected(node: Ipv4Addr, cause: PfcpCause) -> Self {
        Self {
            node,
            cause,
            up_seid: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.cause.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Bar, Far, RuleState};
    use crate::types::SourceInterface;

    const NODE: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

    fn pdr(id: u16) -> Pdr {
        Pdr::new(
            id,
            255,
            Pdi::new(SourceInterface::Access),
            Far::new(u32::from(id), ApplyAction::forward()),
        )
    }

    #[test]
    fn test_establishment_creates_everything() {
        let mut req = SessionRequest::establishment(NODE, 1);
        let mut p = pdr(1);
        p.far.bar = Some(Bar::new(1));
        req.add_pdr(&p).unwrap();
        req.add_pdr(&pdr(2)).unwrap();

        assert_eq!(req.pdr_ids(), vec![1, 2]);
        assert_eq!(req.far_ids(), vec![1, 2]);
        assert_eq!(req.bars.len(), 1);
        assert_eq!(req.count(RuleAction::Create), 5);
        assert_eq!(req.fars[0].bar_id, Some(1));
    }

    #[test]
    fn test_modification_carries_only_changes() {
        let mut p = pdr(1);
        p.confirm();
        p.far.set_apply_action(ApplyAction::buffer_and_notify());

        let mut req = SessionRequest::modification(NODE, 1, 99);
        req.add_pdr(&p).unwrap();
        assert!(req.pdrs.is_empty());
        assert_eq!(req.fars.len(), 1);
        assert_eq!(req.fars[0].action, RuleAction::Update);
        assert!(req.fars[0].apply_action.buff);
    }

    #[test]
    fn test_synced_rule_is_refused() {
        let mut p = pdr(1);
        p.confirm();
        let mut req = SessionRequest::modification(NODE, 1, 99);
        assert_eq!(
            req.add_pdr(&p),
            Err(PfcpError::RuleAlreadySynced { kind: "PDR", id: 1 })
        );
        assert!(req.is_empty());
    }

    #[test]
    fn test_establishment_skips_removals() {
        let mut p = pdr(1);
        p.mark_remove();
        let mut req = SessionRequest::establishment(NODE, 1);
        req.add_pdr(&p).unwrap();
        assert!(req.is_empty());
        assert_eq!(p.state, RuleState::Remove);
    }

    #[test]
    fn test_deletion_refuses_rules() {
        let mut req = SessionRequest::deletion(NODE, 1, 99);
        assert!(matches!(req.add_pdr(&pdr(1)), Err(PfcpError::InvalidRequest(_))));
        assert_eq!(req.up_seid, Some(99));
    }

    #[test]
    fn test_response() {
        assert!(SessionResponse::accepted(NODE, Some(5)).is_success());
        let rejected = SessionResponse::rejected(NODE, PfcpCause::NoResourcesAvailable);
        assert!(!rejected.is_success());
        assert_eq!(rejected.up_seid, None);
    }
}
