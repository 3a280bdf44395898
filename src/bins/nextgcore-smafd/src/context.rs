//! SMAF Context Management
//!
//! Process-wide state created once at startup and shared by every
//! handler: the user plane topology, identifier pools, the SM context
//! registry, the sync engine and the collaborator seams.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use ogs_core::{IdGenerator, UeIpPool};
use tokio::sync::{broadcast, Mutex};

use crate::config::{Config, Sbi, UeRoutingConfig};
use crate::error::SmafResult;
use crate::gsm_handler::{GsmCodec, NasGsmCodec};
use crate::ngap_build::{CompactN2Codec, N2Codec};
use crate::pfcp_path::{LoopbackTransport, PfcpTransport, SyncEngine};
use crate::sbi_path::{
    LocalPolicyClient, LocalSubscriberDataClient, LoggingDiscoveryClient, LoggingNotifier,
    NfDiscoveryClient, PolicyClient, StatusNotifier, SubscriberDataClient,
};
use crate::session_rule::{FirstByRuleId, SessionRuleSelector};
use crate::sm_context::{SmContext, StateChange, UserPlaneEnv};
use crate::user_plane::{UeRoutingTable, UserPlaneTopology};

/// Local SEID range
pub const SEID_MIN: i64 = 1;
pub const SEID_MAX: i64 = u32::MAX as i64;

const STATE_EVENT_CAPACITY: usize = 256;

// ============================================================================
// Registry
// ============================================================================

/// Registry entry; the mutex makes its holder the single writer
#[derive(Debug)]
pub struct SessionHandle {
    pub sm_context_ref: String,
    pub supi: String,
    pub pdu_session_id: u8,
    pub context: Mutex<SmContext>,
}

impl SessionHandle {
    pub fn new(context: SmContext) -> Self {
        Self {
            sm_context_ref: context.sm_context_ref.clone(),
            supi: context.supi.clone(),
            pdu_session_id: context.pdu_session_id,
            context: Mutex::new(context),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_ref: HashMap<String, Arc<SessionHandle>>,
    by_session: HashMap<(String, u8), String>,
}

/// SM contexts keyed by reference, with a `(supi, pdu session id)` index
#[derive(Debug, Default)]
pub struct SmContextRegistry {
    inner: RwLock<RegistryInner>,
}

impl SmContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert `handle`; a newer context for the same session takes over
    /// the index entry
    pub fn insert(&self, handle: Arc<SessionHandle>) {
        let mut inner = self.write();
        let key = (handle.supi.clone(), handle.pdu_session_id);
        if let Some(previous) = inner.by_session.insert(key, handle.sm_context_ref.clone()) {
            log::debug!("[{}:{}] replaces {}", handle.supi, handle.pdu_session_id, previous);
        }
        log::info!("[Added] SM context {} (total {})", handle.sm_context_ref, inner.by_ref.len() + 1);
        inner.by_ref.insert(handle.sm_context_ref.clone(), handle);
    }

    pub fn get(&self, sm_context_ref: &str) -> Option<Arc<SessionHandle>> {
        self.read().by_ref.get(sm_context_ref).cloned()
    }

    pub fn find_by_session(&self, supi: &str, pdu_session_id: u8) -> Option<Arc<SessionHandle>> {
        let inner = self.read();
        let sm_context_ref = inner.by_session.get(&(supi.to_string(), pdu_session_id))?;
        inner.by_ref.get(sm_context_ref).cloned()
    }

    pub fn remove(&self, sm_context_ref: &str) -> Option<Arc<SessionHandle>> {
        let mut inner = self.write();
        let handle = inner.by_ref.remove(sm_context_ref)?;
        let key = (handle.supi.clone(), handle.pdu_session_id);
        if inner.by_session.get(&key).map(String::as_str) == Some(sm_context_ref) {
            inner.by_session.remove(&key);
        }
        log::info!("[Removed] SM context {} (total {})", sm_context_ref, inner.by_ref.len());
        Some(handle)
    }

    pub fn len(&self) -> usize {
        self.read().by_ref.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn refs(&self) -> Vec<String> {
        self.read().by_ref.keys().cloned().collect()
    }
}

// ============================================================================
// Collaborators
// ============================================================================

#[derive(Debug, Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn PfcpTransport>,
    pub policy: Arc<dyn PolicyClient>,
    pub subscriber_data: Arc<dyn SubscriberDataClient>,
    pub discovery: Arc<dyn NfDiscoveryClient>,
    pub notifier: Arc<dyn StatusNotifier>,
    pub gsm_codec: Arc<dyn GsmCodec>,
    pub n2_codec: Arc<dyn N2Codec>,
    pub rule_selector: Arc<dyn SessionRuleSelector>,
}

impl Collaborators {
    /// Local implementations for running without peers
    pub fn standalone(config: &Config) -> Self {
        Self {
            transport: Arc::new(LoopbackTransport::new()),
            policy: Arc::new(LocalPolicyClient),
            subscriber_data: Arc::new(LocalSubscriberDataClient::from_config(config)),
            discovery: Arc::new(LoggingDiscoveryClient),
            notifier: Arc::new(LoggingNotifier),
            gsm_codec: Arc::new(NasGsmCodec),
            n2_codec: Arc::new(CompactN2Codec),
            rule_selector: Arc::new(FirstByRuleId),
        }
    }
}

// ============================================================================
// SMAF context
// ============================================================================

#[derive(Debug)]
pub struct SmafContext {
    pub name: String,
    pub sbi: Sbi,
    pub ulcl: bool,
    pub topology: UserPlaneTopology,
    pub ue_routing: UeRoutingTable,
    pub ue_pool: UeIpPool,
    pub seids: IdGenerator,
    pub registry: SmContextRegistry,
    pub engine: SyncEngine,
    pub policy: Arc<dyn PolicyClient>,
    pub subscriber_data: Arc<dyn SubscriberDataClient>,
    pub discovery: Arc<dyn NfDiscoveryClient>,
    pub notifier: Arc<dyn StatusNotifier>,
    pub gsm_codec: Arc<dyn GsmCodec>,
    pub n2_codec: Arc<dyn N2Codec>,
    pub rule_selector: Arc<dyn SessionRuleSelector>,
    events: broadcast::Sender<StateChange>,
}

impl SmafContext {
    pub fn new(config: &Config, routing: &UeRoutingConfig, collaborators: Collaborators) -> SmafResult<Self> {
        let cfg = &config.configuration;
        let topology = UserPlaneTopology::from_config(&cfg.userplane_information)?;
        let ue_routing = UeRoutingTable::build(routing, &topology);
        let ue_pool = UeIpPool::from_cidr(&cfg.ue_subnet)?;
        let timeout = Duration::from_millis(cfg.timers.pfcp_response_timeout_ms);
        let (events, _) = broadcast::channel(STATE_EVENT_CAPACITY);

        log::info!(
            "[{}] {} user plane node(s), {} routed subscriber(s), UE subnet {}/{}",
            cfg.smaf_name,
            topology.len(),
            ue_routing.len(),
            ue_pool.network(),
            ue_pool.prefix_len()
        );

        Ok(Self {
            name: cfg.smaf_name.clone(),
            sbi: config.sbi(),
            ulcl: cfg.ulcl,
            topology,
            ue_routing,
            ue_pool,
            seids: IdGenerator::new("SEID", SEID_MIN, SEID_MAX)?,
            registry: SmContextRegistry::new(),
            engine: SyncEngine::new(collaborators.transport, timeout),
            policy: collaborators.policy,
            subscriber_data: collaborators.subscriber_data,
            discovery: collaborators.discovery,
            notifier: collaborators.notifier,
            gsm_codec: collaborators.gsm_codec,
            n2_codec: collaborators.n2_codec,
            rule_selector: collaborators.rule_selector,
            events,
        })
    }

    pub fn user_plane(&self) -> UserPlaneEnv<'_> {
        UserPlaneEnv {
            topology: &self.topology,
            seids: &self.seids,
            engine: &self.engine,
        }
    }

    /// Sender handed to every new SM context
    pub fn events(&self) -> broadcast::Sender<StateChange> {
        self.events.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    /// Policy update callback URI for `sm_context_ref`
    pub fn policy_notification_uri(&self, sm_context_ref: &str) -> String {
        format!(
            "{}://{}:{}/nsmf-callback/sm-policies/{}",
            self.sbi.scheme, self.sbi.register_ipv4, self.sbi.port, sm_context_ref
        )
    }
}
