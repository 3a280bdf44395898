//! PFCP Path Management
//!
//! Fan-out of session requests to forwarding nodes and the join on their
//! responses. Every request of one operation is sent from its own task;
//! the operation resolves once each node has answered, failed or the
//! response timer expired, whichever comes first.
//!
//! A transport may answer in-line ([`TransportReply::Immediate`]) or later
//! through [`SyncEngine::on_forwarding_node_response`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use ogs_pfcp::prelude::*;
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Transport
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Forwarding node {0} unreachable")]
    Unreachable(Ipv4Addr),

    #[error("Send failed: {0}")]
    Send(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportReply {
    /// The node's answer
    Immediate(SessionResponse),
    /// The answer is delivered later through the engine
    Deferred,
}

/// Forwarding-node transport
#[async_trait]
pub trait PfcpTransport: Send + Sync + fmt::Debug {
    async fn send(&self, request: SessionRequest) -> TransportResult<TransportReply>;
}

/// Accepts every request; establishments get a fresh remote SEID
#[derive(Debug)]
pub struct LoopbackTransport {
    next_seid: AtomicU64,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            next_seid: AtomicU64::new(1),
        }
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PfcpTransport for LoopbackTransport {
    async fn send(&self, request: SessionRequest) -> TransportResult<TransportReply> {
        log::trace!(
            "[{}] loopback {} ({} PDR, {} FAR, {} BAR)",
            request.node,
            request.kind,
            request.pdrs.len(),
            request.fars.len(),
            request.bars.len()
        );
        let up_seid = match request.kind {
            SessionRequestKind::Establishment => Some(self.next_seid.fetch_add(1, Ordering::SeqCst)),
            _ => request.up_seid,
        };
        Ok(TransportReply::Immediate(SessionResponse::accepted(request.node, up_seid)))
    }
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncOperation {
    Update,
    Release,
}

/// Aggregate result of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PfcpResponseStatus {
    SessionUpdateSuccess,
    SessionUpdateFailed,
    SessionReleaseSuccess,
    SessionReleaseFailed,
}

impl PfcpResponseStatus {
    fn aggregate(op: SyncOperation, success: bool) -> Self {
        match (op, success) {
            (SyncOperation::Update, true) => Self::SessionUpdateSuccess,
            (SyncOperation::Update, false) => Self::SessionUpdateFailed,
            (SyncOperation::Release, true) => Self::SessionReleaseSuccess,
            (SyncOperation::Release, false) => Self::SessionReleaseFailed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::SessionUpdateSuccess | Self::SessionReleaseSuccess)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionUpdateSuccess => "SessionUpdateSuccess",
            Self::SessionUpdateFailed => "SessionUpdateFailed",
            Self::SessionReleaseSuccess => "SessionReleaseSuccess",
            Self::SessionReleaseFailed => "SessionReleaseFailed",
        }
    }
}

impl fmt::Display for PfcpResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeFailure {
    #[error("rejected: {0}")]
    Rejected(PfcpCause),

    #[error("transport: {0}")]
    Transport(String),

    #[error("no response")]
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOutcome {
    pub node: Ipv4Addr,
    pub kind: SessionRequestKind,
    pub result: Result<SessionResponse, NodeFailure>,
}

impl NodeOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub status: PfcpResponseStatus,
    /// One outcome per node, ordered by node address
    pub outcomes: Vec<NodeOutcome>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn failed_nodes(&self) -> Vec<Ipv4Addr> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.node)
            .collect()
    }

    /// Human-readable failure list for problem details
    pub fn describe_failures(&self) -> String {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| format!("{} {}", o.node, e)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn outcome_result(response: SessionResponse) -> Result<SessionResponse, NodeFailure> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(NodeFailure::Rejected(response.cause))
    }
}

// ============================================================================
// Join
// ============================================================================

#[derive(Debug)]
struct PfcpJoin {
    op: SyncOperation,
    pending: BTreeSet<Ipv4Addr>,
    outcomes: BTreeMap<Ipv4Addr, NodeOutcome>,
    done: Option<oneshot::Sender<SyncReport>>,
}

impl PfcpJoin {
    fn new(op: SyncOperation, nodes: BTreeSet<Ipv4Addr>, done: oneshot::Sender<SyncReport>) -> Self {
        Self {
            op,
            pending: nodes,
            outcomes: BTreeMap::new(),
            done: Some(done),
        }
    }

    fn report(&self) -> SyncReport {
        let outcomes: Vec<NodeOutcome> = self.outcomes.values().cloned().collect();
        let success = outcomes.iter().all(NodeOutcome::is_success);
        SyncReport {
            status: PfcpResponseStatus::aggregate(self.op, success),
            outcomes,
        }
    }

    /// Record one node's outcome; resolves the join on the last one
    fn record(&mut self, outcome: NodeOutcome) {
        if !self.pending.remove(&outcome.node) {
            log::warn!("[{}] Unexpected PFCP outcome ignored", outcome.node);
            return;
        }
        self.outcomes.insert(outcome.node, outcome);
        if self.pending.is_empty() {
            if let Some(done) = self.done.take() {
                // The waiter may have given up already
                let _ = done.send(self.report());
            }
        }
    }

    /// Fail every node still pending and build the report
    fn expire(&mut self, kinds: &HashMap<Ipv4Addr, SessionRequestKind>) -> SyncReport {
        for node in std::mem::take(&mut self.pending) {
            log::warn!("[{}] No PFCP response", node);
            let kind = kinds.get(&node).copied().unwrap_or(SessionRequestKind::Modification);
            self.outcomes.insert(
                node,
                NodeOutcome {
                    node,
                    kind,
                    result: Err(NodeFailure::Timeout),
                },
            );
        }
        self.done = None;
        self.report()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
struct Inflight {
    join: Arc<Mutex<PfcpJoin>>,
    kind: SessionRequestKind,
}

type InflightMap = Arc<Mutex<HashMap<(u64, Ipv4Addr), Inflight>>>;

fn deliver(inflight: &InflightMap, cp_seid: u64, node: Ipv4Addr, result: Result<SessionResponse, NodeFailure>) -> bool {
    let Some(entry) = lock(inflight).remove(&(cp_seid, node)) else {
        return false;
    };
    lock(&entry.join).record(NodeOutcome {
        node,
        kind: entry.kind,
        result,
    });
    true
}

// ============================================================================
// Sync engine
// ============================================================================

/// Dispatches the requests of one operation and joins on the answers
#[derive(Debug)]
pub struct SyncEngine {
    transport: Arc<dyn PfcpTransport>,
    timeout: Duration,
    inflight: InflightMap,
}

impl SyncEngine {
    pub fn new(transport: Arc<dyn PfcpTransport>, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of requests still waiting for a deferred answer
    pub fn inflight_count(&self) -> usize {
        lock(&self.inflight).len()
    }

    /// Send every request and wait for the aggregate result.
    ///
    /// `requests` holds at most one request per node. An empty list is an
    /// immediate success.
    pub async fn synchronize(&self, op: SyncOperation, requests: Vec<SessionRequest>) -> SyncReport {
        if requests.is_empty() {
            return SyncReport {
                status: PfcpResponseStatus::aggregate(op, true),
                outcomes: Vec::new(),
            };
        }

        let nodes: BTreeSet<Ipv4Addr> = requests.iter().map(|r| r.node).collect();
        let kinds: HashMap<Ipv4Addr, SessionRequestKind> = requests.iter().map(|r| (r.node, r.kind)).collect();
        let keys: Vec<(u64, Ipv4Addr)> = requests.iter().map(|r| (r.cp_seid, r.node)).collect();

        let (tx, mut rx) = oneshot::channel();
        let join = Arc::new(Mutex::new(PfcpJoin::new(op, nodes, tx)));
        {
            let mut inflight = lock(&self.inflight);
            for request in &requests {
                inflight.insert(
                    (request.cp_seid, request.node),
                    Inflight {
                        join: join.clone(),
                        kind: request.kind,
                    },
                );
            }
        }

        for request in requests {
            let transport = self.transport.clone();
            let inflight = self.inflight.clone();
            tokio::spawn(async move {
                let (cp_seid, node) = (request.cp_seid, request.node);
                log::debug!("[{}] {} Request (cp_seid=0x{:x})", node, request.kind, cp_seid);
                let result = match transport.send(request).await {
                    Ok(TransportReply::Immediate(response)) => outcome_result(response),
                    Ok(TransportReply::Deferred) => return,
                    Err(e) => {
                        log::error!("[{}] {}", node, e);
                        Err(NodeFailure::Transport(e.to_string()))
                    }
                };
                deliver(&inflight, cp_seid, node, result);
            });
        }

        let report = match tokio::time::timeout(self.timeout, &mut rx).await {
            Ok(Ok(report)) => report,
            _ => {
                let mut inflight = lock(&self.inflight);
                for key in &keys {
                    inflight.remove(key);
                }
                drop(inflight);
                // Resolution may have raced the timer
                match rx.try_recv() {
                    Ok(report) => report,
                    Err(_) => lock(&join).expire(&kinds),
                }
            }
        };

        log::debug!("PFCP {:?} join resolved: {}", op, report.status);
        report
    }

    /// Deliver an answer received out of band.
    ///
    /// Returns false if no operation is waiting on `(cp_seid, node)`.
    pub fn on_forwarding_node_response(&self, cp_seid: u64, response: SessionResponse) -> bool {
        let delivered = deliver(&self.inflight, cp_seid, response.node, outcome_result(response));
        if !delivered {
            log::warn!(
                "[{}] Late or unknown PFCP response (cp_seid=0x{:x})",
                response.node,
                cp_seid
            );
        }
        delivered
    }
}

// ============================================================================
// Scripted transport (tests)
// ============================================================================
