//! SM Context
//!
//! One PDU session: identity, session rules, user plane tunnel, the
//! per-node PFCP sessions and the state machine tying them together.
//!
//! ```text
//! ActivePending -> Active <-> ModificationPending -> PfcpSynchronizing
//!                    ^                                   |
//!                    +-----------------------------------+-> InActivePending -> InActive
//! ```
//!
//! `pending_nodes` is non-empty exactly while the state is
//! `PfcpSynchronizing`; both are changed together by
//! [`SmContext::synchronize`].

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

use ogs_core::{IdGenerator, UeIpPool};
use ogs_pfcp::prelude::*;
use tokio::sync::broadcast;

use crate::datapath::Activation;
use crate::error::{SmafError, SmafResult};
use crate::gsm_build::{oversized_dnn_label, MAX_DNN_LABEL_LEN};
use crate::models::{
    AccessType, DnnConfiguration, Guami, HoState, PlmnId, SmContextCreateData, Snssai, UpCnxState,
};
use crate::n4_build::{build_sync_requests, PfcpSessionContext, PfcpSessions};
use crate::pfcp_path::{SyncEngine, SyncOperation, SyncReport};
use crate::session_rule::SessionRules;
use crate::tunnel::UpTunnel;
use crate::user_plane::UserPlaneTopology;

// ============================================================================
// States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmContextState {
    ActivePending,
    Active,
    ModificationPending,
    PfcpSynchronizing,
    InActivePending,
    InActive,
}

impl SmContextState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ActivePending => "ActivePending",
            Self::Active => "Active",
            Self::ModificationPending => "ModificationPending",
            Self::PfcpSynchronizing => "PfcpSynchronizing",
            Self::InActivePending => "InActivePending",
            Self::InActive => "InActive",
        }
    }
}

impl fmt::Display for SmContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Published on every state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub sm_context_ref: String,
    pub from: SmContextState,
    pub to: SmContextState,
    /// Nodes awaited once the change took effect
    pub pending: BTreeSet<Ipv4Addr>,
}

/// Process-wide resources an SM context borrows while synchronizing
#[derive(Clone, Copy)]
pub struct UserPlaneEnv<'a> {
    pub topology: &'a UserPlaneTopology,
    pub seids: &'a IdGenerator,
    pub engine: &'a SyncEngine,
}

// ============================================================================
// SM context
// ============================================================================

#[derive(Debug)]
pub struct SmContext {
    pub sm_context_ref: String,

    // Identity
    pub supi: String,
    pub pdu_session_id: u8,
    pub dnn: String,
    pub snssai: Snssai,
    pub an_type: AccessType,
    pub rat_type: Option<String>,
    pub serving_network: Option<PlmnId>,
    pub guami: Guami,
    pub sm_context_status_uri: Option<String>,
    /// Procedure transaction identity of the establishment
    pub pti: u8,
    pub pdu_session_type: u8,

    pub ue_ip: Option<Ipv4Addr>,
    pub dnn_configuration: Option<DnnConfiguration>,

    state: SmContextState,
    pub session_rules: SessionRules,
    pub tunnel: UpTunnel,
    pub pfcp_sessions: PfcpSessions,
    pending_nodes: BTreeSet<Ipv4Addr>,

    pub up_cnx_state: UpCnxState,
    pub ho_state: HoState,
    /// Downlink tunnel of the access network
    pub an_tunnel: Option<FTeid>,
    /// Downlink tunnel of the handover target
    pub target_an_tunnel: Option<FTeid>,
    pub release_due_to_duplicate: bool,

    events: broadcast::Sender<StateChange>,
}

impl SmContext {
    pub fn new(
        sm_context_ref: &str,
        data: &SmContextCreateData,
        events: broadcast::Sender<StateChange>,
    ) -> SmafResult<Self> {
        if let Some(label) = oversized_dnn_label(&data.dnn) {
            return Err(SmafError::MalformedInput(format!(
                "DNN label of {} bytes exceeds {}",
                label.len(),
                MAX_DNN_LABEL_LEN
            )));
        }
        Ok(Self {
            sm_context_ref: sm_context_ref.to_string(),
            supi: data.supi.clone(),
            pdu_session_id: data.pdu_session_id,
            dnn: data.dnn.clone(),
            snssai: data.s_nssai.clone(),
            an_type: data.an_type,
            rat_type: data.rat_type.clone(),
            serving_network: data.serving_network.clone(),
            guami: data.guami.clone(),
            sm_context_status_uri: data.sm_context_status_uri.clone(),
            pti: 0,
            pdu_session_type: 0,
            ue_ip: None,
            dnn_configuration: None,
            state: SmContextState::ActivePending,
            session_rules: SessionRules::new(),
            tunnel: UpTunnel::new()?,
            pfcp_sessions: PfcpSessions::new(),
            pending_nodes: BTreeSet::new(),
            up_cnx_state: UpCnxState::Deactivated,
            ho_state: HoState::None,
            an_tunnel: None,
            target_an_tunnel: None,
            release_due_to_duplicate: false,
            events,
        })
    }

    /// Log tag `[supi:psi]`
    pub fn tag(&self) -> String {
        format!("[{}:{}]", self.supi, self.pdu_session_id)
    }

    pub fn state(&self) -> SmContextState {
        self.state
    }

    pub fn pending_nodes(&self) -> &BTreeSet<Ipv4Addr> {
        &self.pending_nodes
    }

    pub fn transition(&mut self, to: SmContextState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        log::debug!(
            "SM context state: {} -> {} (ref={})",
            from,
            to,
            self.sm_context_ref
        );
        // No subscriber is fine
        let _ = self.events.send(StateChange {
            sm_context_ref: self.sm_context_ref.clone(),
            from,
            to,
            pending: self.pending_nodes.clone(),
        });
    }

    /// Fail with `InvalidState` unless the current state is in `allowed`
    pub fn require_state(&self, trigger: &str, allowed: &[SmContextState]) -> SmafResult<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        log::warn!("{} {} refused in {}", self.tag(), trigger, self.state);
        Err(SmafError::InvalidState {
            trigger: trigger.to_string(),
            state: self.state.name(),
        })
    }

    // ------------------------------------------------------------------------
    // User plane
    // ------------------------------------------------------------------------

    /// Activate every path of the pool and open a PFCP session context
    /// for each node seen for the first time
    pub fn activate_paths(&mut self, topology: &UserPlaneTopology, seids: &IdGenerator) -> SmafResult<()> {
        let ue_ip = self
            .ue_ip
            .ok_or_else(|| SmafError::Configuration(format!("{} no UE address", self.tag())))?;
        let act = Activation {
            topology,
            rule_ids: &self.tunnel.rule_ids,
            ue_ip,
            dnn: &self.dnn,
            an_tunnel: self.an_tunnel,
        };

        let mut touched = Vec::new();
        for path in self.tunnel.pool.paths_mut() {
            touched.extend(path.activate(&act)?);
        }

        for addr in touched {
            if self.pfcp_sessions.contains_key(&addr) {
                continue;
            }
            let local_seid = allocate_seid(seids)?;
            log::debug!("{} [{}] local SEID 0x{:x}", self.tag(), addr, local_seid);
            self.pfcp_sessions.insert(addr, PfcpSessionContext::new(local_seid));
        }
        Ok(())
    }

    /// Push the pending rules (or the deletions) to every node concerned
    /// and resolve the state from the aggregate result.
    ///
    /// The state becomes `on_success` or `on_failure`. With nothing to
    /// send the context goes straight to `on_success` without entering
    /// `PfcpSynchronizing`.
    pub async fn synchronize(
        &mut self,
        env: UserPlaneEnv<'_>,
        op: SyncOperation,
        on_success: SmContextState,
        on_failure: SmContextState,
    ) -> SmafResult<SyncReport> {
        let requests = build_sync_requests(&self.tunnel.pool, &self.pfcp_sessions, op)?;
        if requests.is_empty() {
            self.transition(on_success);
            return Ok(env.engine.synchronize(op, requests).await);
        }

        self.pending_nodes = requests.iter().map(|r| r.node).collect();
        self.transition(SmContextState::PfcpSynchronizing);

        let report = env.engine.synchronize(op, requests).await;

        self.apply_sync_report(&report, env);
        self.pending_nodes.clear();
        if report.is_success() {
            self.transition(on_success);
        } else {
            log::warn!("{} {}: {}", self.tag(), report.status, report.describe_failures());
            self.transition(on_failure);
        }
        Ok(report)
    }

    /// Reconcile rule tags and PFCP sessions with per-node outcomes.
    /// Failed nodes keep their tags for the next attempt.
    fn apply_sync_report(&mut self, report: &SyncReport, env: UserPlaneEnv<'_>) {
        for outcome in &report.outcomes {
            let Ok(response) = outcome.result.as_ref() else {
                continue;
            };
            let node = outcome.node;
            match outcome.kind {
                SessionRequestKind::Establishment => {
                    if let Some(ctx) = self.pfcp_sessions.get_mut(&node) {
                        ctx.remote_seid = response.up_seid;
                    }
                    self.tunnel.pool.commit_node(node, &self.tunnel.rule_ids, env.topology);
                }
                SessionRequestKind::Modification => {
                    self.tunnel.pool.commit_node(node, &self.tunnel.rule_ids, env.topology);
                }
                SessionRequestKind::Deletion => {
                    if let Some(ctx) = self.pfcp_sessions.remove(&node) {
                        free_seid(env.seids, ctx.local_seid);
                    }
                    self.tunnel.pool.release_node(node, &self.tunnel.rule_ids, env.topology);
                }
            }
        }
    }

    /// Return every identifier, TEID and address the session holds
    pub fn release_resources(&mut self, topology: &UserPlaneTopology, seids: &IdGenerator, ue_pool: &UeIpPool) {
        self.tunnel.release_all(topology);
        for ctx in std::mem::take(&mut self.pfcp_sessions).into_values() {
            free_seid(seids, ctx.local_seid);
        }
        if let Some(addr) = self.ue_ip.take() {
            if let Err(e) = ue_pool.free(addr) {
                log::warn!("{} {}", self.tag(), e);
            }
        }
        self.pending_nodes.clear();
    }
}

fn allocate_seid(seids: &IdGenerator) -> SmafResult<u64> {
    let id = seids.allocate()?;
    u64::try_from(id).map_err(|_| SmafError::ResourceExhausted(format!("SEID {} out of range", id)))
}

fn free_seid(seids: &IdGenerator, seid: u64) {
    if let Ok(id) = i64::try_from(seid) {
        seids.free(id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::pfcp_path::mock::{MockTransport, NodeBehavior};
    use crate::user_plane::tests::two_hop_info;

    const GW: Ipv4Addr = Ipv4Addr::new(10, 200, 200, 102);

    struct Fixture {
        topology: UserPlaneTopology,
        seids: IdGenerator,
        engine: SyncEngine,
        transport: Arc<MockTransport>,
    }

    impl Fixture {
        fn new() -> Self {
            let transport = MockTransport::new();
            Self {
                topology: UserPlaneTopology::from_config(&two_hop_info()).unwrap(),
                seids: IdGenerator::new("SEID", 1, 1024).unwrap(),
                engine: SyncEngine::new(transport.clone(), Duration::from_millis(200)),
                transport,
            }
        }

        fn env(&self) -> UserPlaneEnv<'_> {
            UserPlaneEnv {
                topology: &self.topology,
                seids: &self.seids,
                engine: &self.engine,
            }
        }

        fn context(&self) -> (SmContext, broadcast::Receiver<StateChange>) {
            let (tx, rx) = broadcast::channel(16);
            let data = SmContextCreateData {
                supi: "imsi-208930000000003".into(),
                pdu_session_id: 10,
                dnn: "internet".into(),
                ..Default::default()
            };
            let mut ctx = SmContext::new("urn:uuid:test", &data, tx).unwrap();
            ctx.ue_ip = Some(Ipv4Addr::new(60, 60, 0, 1));
            let chain = self.topology.default_path_for("internet").unwrap();
            ctx.tunnel.pool.build_path(&chain, &self.topology, None).unwrap();
            (ctx, rx)
        }
    }

    #[test]
    fn test_require_state() {
        let f = Fixture::new();
        let (ctx, _rx) = f.context();
        assert!(ctx.require_state("create", &[SmContextState::ActivePending]).is_ok());
        let err = ctx
            .require_state("release", &[SmContextState::Active])
            .unwrap_err();
        assert!(matches!(err, SmafError::InvalidState { state: "ActivePending", .. }));
        assert_eq!(err.problem().status, 409);
    }

    #[test]
    fn test_oversized_dnn_label_rejected() {
        let (tx, _rx) = broadcast::channel(4);
        let data = SmContextCreateData {
            supi: "imsi-208930000000003".into(),
            pdu_session_id: 10,
            dnn: format!("{}.mnc093", "a".repeat(MAX_DNN_LABEL_LEN + 1)),
            ..Default::default()
        };
        let err = SmContext::new("urn:uuid:test", &data, tx).unwrap_err();
        assert!(matches!(err, SmafError::MalformedInput(_)));
        assert_eq!(err.problem().status, 403);
    }

    #[test]
    fn test_transition_publishes() {
        let f = Fixture::new();
        let (mut ctx, mut rx) = f.context();
        ctx.transition(SmContextState::Active);
        ctx.transition(SmContextState::Active);
        let change = rx.try_recv().unwrap();
        assert_eq!((change.from, change.to), (SmContextState::ActivePending, SmContextState::Active));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_initial_sync_records_remote_seids() {
        let f = Fixture::new();
        let (mut ctx, mut rx) = f.context();
        ctx.activate_paths(&f.topology, &f.seids).unwrap();
        assert_eq!(ctx.pfcp_sessions.len(), 2);
        assert_eq!(f.seids.in_use(), 2);

        let report = ctx
            .synchronize(f.env(), SyncOperation::Update, SmContextState::Active, SmContextState::InActive)
            .await
            .unwrap();
        assert!(report.is_success());
        assert_eq!(ctx.state(), SmContextState::Active);
        assert!(ctx.pending_nodes().is_empty());
        assert!(ctx.pfcp_sessions.values().all(|s| s.is_established()));
        assert!(ctx.tunnel.pool.all_pdrs().all(|p| p.is_synced()));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.to, SmContextState::PfcpSynchronizing);
    }

    #[tokio::test]
    async fn test_failed_node_keeps_tags() {
        let f = Fixture::new();
        f.transport.set(GW, NodeBehavior::Reject(PfcpCause::RequestRejected));
        let (mut ctx, _rx) = f.context();
        ctx.activate_paths(&f.topology, &f.seids).unwrap();

        let report = ctx
            .synchronize(f.env(), SyncOperation::Update, SmContextState::Active, SmContextState::InActive)
            .await
            .unwrap();
        assert!(!report.is_success());
        assert_eq!(ctx.state(), SmContextState::InActive);
        assert!(!ctx.pfcp_sessions[&GW].is_established());
        assert!(!ctx.tunnel.pool.pending_pdrs(GW).is_empty());
        assert!(ctx.pending_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_to_send_skips_synchronizing() {
        let f = Fixture::new();
        let (mut ctx, mut rx) = f.context();
        ctx.transition(SmContextState::ModificationPending);
        let _ = rx.try_recv();

        let report = ctx
            .synchronize(f.env(), SyncOperation::Update, SmContextState::Active, SmContextState::Active)
            .await
            .unwrap();
        assert!(report.is_success());
        assert_eq!(rx.try_recv().unwrap().to, SmContextState::Active);
        assert!(f.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_release_frees_everything() {
        let f = Fixture::new();
        let ue_pool = UeIpPool::from_cidr("60.60.0.0/24").unwrap();
        let (mut ctx, _rx) = f.context();
        ctx.ue_ip = Some(ue_pool.allocate().unwrap());
        ctx.activate_paths(&f.topology, &f.seids).unwrap();
        ctx.synchronize(f.env(), SyncOperation::Update, SmContextState::Active, SmContextState::Active)
            .await
            .unwrap();

        ctx.synchronize(f.env(), SyncOperation::Release, SmContextState::InActivePending, SmContextState::Active)
            .await
            .unwrap();
        assert_eq!(ctx.state(), SmContextState::InActivePending);
        assert!(ctx.pfcp_sessions.is_empty());
        assert_eq!(f.seids.in_use(), 0);
        assert_eq!(ctx.tunnel.rule_ids.pdrs_in_use(), 0);

        ctx.release_resources(&f.topology, &f.seids, &ue_pool);
        assert_eq!(ue_pool.in_use(), 0);
        assert!(ctx.ue_ip.is_none());
    }
}
