//! SMAF N4 Request Building
//!
//! Turns the pending rules of a session's data paths into one request per
//! distinct forwarding node.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use ogs_pfcp::prelude::*;

use crate::datapath::DataPathPool;
use crate::error::SmafResult;
use crate::pfcp_path::SyncOperation;

/// Session endpoint identifiers of one forwarding node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PfcpSessionContext {
    pub local_seid: u64,
    /// Known once the node answered the establishment
    pub remote_seid: Option<u64>,
}

impl PfcpSessionContext {
    pub fn new(local_seid: u64) -> Self {
        Self {
            local_seid,
            remote_seid: None,
        }
    }

    pub fn is_established(&self) -> bool {
        self.remote_seid.is_some()
    }
}

pub type PfcpSessions = BTreeMap<Ipv4Addr, PfcpSessionContext>;

/// Build the requests `op` needs.
///
/// Update: nodes never established get an establishment with their
/// rules, established nodes get a modification with only the changed
/// rules, and nodes with nothing pending get nothing. Release: every
/// established node gets a deletion.
pub fn build_sync_requests(
    pool: &DataPathPool,
    sessions: &PfcpSessions,
    op: SyncOperation,
) -> SmafResult<Vec<SessionRequest>> {
    let mut requests = Vec::new();

    for (&node, ctx) in sessions {
        match (op, ctx.remote_seid) {
            (SyncOperation::Release, Some(up_seid)) => {
                requests.push(SessionRequest::deletion(node, ctx.local_seid, up_seid));
            }
            (SyncOperation::Release, None) => {
                log::debug!("[{}] never established, no deletion", node);
            }
            (SyncOperation::Update, remote) => {
                let mut request = match remote {
                    Some(up_seid) => SessionRequest::modification(node, ctx.local_seid, up_seid),
                    None => SessionRequest::establishment(node, ctx.local_seid),
                };
                for pdr in pool.pending_pdrs(node) {
                    request.add_pdr(pdr)?;
                }
                if request.is_empty() {
                    log::trace!("[{}] nothing to synchronize", node);
                    continue;
                }
                log::debug!(
                    "[{}] {} PDR{:?} FAR{:?}",
                    node,
                    request.kind,
                    request.pdr_ids(),
                    request.far_ids()
                );
                requests.push(request);
            }
        }
    }

    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datapath::tests::UE_IP;
    use crate::datapath::Activation;
    use crate::tunnel::RuleIds;
    use crate::user_plane::tests::two_hop_info;
    use crate::user_plane::UserPlaneTopology;

    struct Fixture {
        topology: UserPlaneTopology,
        ids: RuleIds,
        pool: DataPathPool,
        sessions: PfcpSessions,
    }

    fn activated() -> Fixture {
        let topology = UserPlaneTopology::from_config(&two_hop_info()).unwrap();
        let ids = RuleIds::new().unwrap();
        let mut pool = DataPathPool::new().unwrap();
        let chain = topology.default_path_for("internet").unwrap();
        let id = pool.build_path(&chain, &topology, None).unwrap();
        let touched = pool
            .get_mut(id)
            .unwrap()
            .activate(&Activation {
                topology: &topology,
                rule_ids: &ids,
                ue_ip: UE_IP,
                dnn: "internet",
                an_tunnel: None,
            })
            .unwrap();
        let sessions = touched
            .into_iter()
            .enumerate()
            .map(|(i, addr)| (addr, PfcpSessionContext::new(i as u64 + 1)))
            .collect();
        Fixture {
            topology,
            ids,
            pool,
            sessions,
        }
    }

    fn confirm_all(f: &mut Fixture) {
        for ctx in f.sessions.values_mut() {
            ctx.remote_seid = Some(ctx.local_seid + 100);
        }
        for addr in f.sessions.keys().copied().collect::<Vec<_>>() {
            f.pool.commit_node(addr, &f.ids, &f.topology);
        }
    }

    #[test]
    fn test_initial_update_establishes_every_node() {
        let f = activated();
        let requests = build_sync_requests(&f.pool, &f.sessions, SyncOperation::Update).unwrap();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            assert_eq!(request.kind, SessionRequestKind::Establishment);
            assert_eq!(request.pdrs.len(), 2);
            assert_eq!(request.count(RuleAction::Create), request.pdrs.len() + request.fars.len() + request.bars.len());
        }
    }

    #[test]
    fn test_synced_paths_issue_nothing() {
        let mut f = activated();
        confirm_all(&mut f);
        let requests = build_sync_requests(&f.pool, &f.sessions, SyncOperation::Update).unwrap();
        assert!(requests.is_empty());
    }

    #[test]
    fn test_modification_only_to_changed_node() {
        let mut f = activated();
        confirm_all(&mut f);
        let touched = f.pool.update_access_downlink(|far| far.set_apply_action(ApplyAction::buffer_and_notify()));
        let access = *touched.iter().next().unwrap();

        let requests = build_sync_requests(&f.pool, &f.sessions, SyncOperation::Update).unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].node, access);
        assert_eq!(requests[0].kind, SessionRequestKind::Modification);
        assert_eq!(requests[0].fars.len(), 1);
        assert_eq!(requests[0].fars[0].action, RuleAction::Update);
    }

    #[test]
    fn test_release_deletes_established_nodes() {
        let mut f = activated();
        assert!(build_sync_requests(&f.pool, &f.sessions, SyncOperation::Release)
            .unwrap()
            .is_empty());

        confirm_all(&mut f);
        let requests = build_sync_requests(&f.pool, &f.sessions, SyncOperation::Release).unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.kind == SessionRequestKind::Deletion && r.is_empty()));
        assert!(requests.iter().all(|r| r.up_seid == Some(r.cp_seid + 100)));
    }
}
