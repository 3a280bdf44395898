//! Nsmf_PDUSession Handlers
//!
//! Producer side of the SM context service and the SM policy update
//! callback. A handler that works on an existing SM context holds the
//! context's mutex for the whole operation, forwarding-node
//! synchronization included, so operations on one session never
//! interleave.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ogs_pfcp::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};

use crate::context::{SessionHandle, SmafContext};
use crate::datapath::access_forwarding;
use crate::error::{SmafError, SmafResult};
use crate::gsm_build::{pdu_session_type, EstablishmentAccept, GsmCause, GsmMessage};
use crate::gsm_handler::GsmRequest;
use crate::models::{
    Ambr, HoState, N2SmInfoType, ProblemDetails, RefToBinaryData, SmContextCreateRequest,
    SmContextCreatedData, SmContextError, SmContextReleaseRequest, SmContextUpdateRequest,
    SmContextUpdatedData, SmDataQuery, SmPolicyContextData, SmPolicyDecision, SmPolicyNotification,
    UpCnxState,
};
use crate::ngap_build::{N2Cause, ResourceSetupRequestTransfer};
use crate::pfcp_path::{SyncOperation, SyncReport};
use crate::session_rule::{apply_sm_policy_from_decision, selected_session_rule};
use crate::sm_context::{SmContext, SmContextState};

/// Content ids of the binary parts
pub mod content_id {
    pub const N1_SM_MSG: &str = "n1SmMsg";
    pub const RELEASE_COMMAND: &str = "PDUSessionReleaseCommand";
    pub const RELEASE_REJECT: &str = "PDUSessionReleaseReject";
    pub const RESOURCE_SETUP_REQUEST: &str = "PDUSessionResourceSetupRequestTransfer";
    pub const RESOURCE_RELEASE_COMMAND: &str = "PDUResourceReleaseCommand";
    pub const PDU_RES_SETUP_REQ: &str = "PDU_RES_SETUP_REQ";
    pub const PATH_SWITCH_REQ_ACK: &str = "PATH_SWITCH_REQ_ACK";
    pub const HANDOVER_CMD: &str = "HANDOVER_CMD";
    pub const HANDOVER: &str = "Handover";
}

pub const SUPPORTED_FEATURES: &str = "F";
pub const DEFAULT_5QI: u8 = 9;
pub const DEFAULT_ARP_PRIORITY: u8 = 8;
const SSC_MODE_1: u8 = 1;

/// States in which a modification trigger is accepted
const MODIFIABLE: &[SmContextState] = &[SmContextState::Active, SmContextState::ModificationPending];

// ============================================================================
// Response
// ============================================================================

/// Transport-independent response of a producer handler
#[derive(Debug, Clone, PartialEq)]
pub struct SmContextResponse {
    pub status: u16,
    pub location: Option<String>,
    pub json_data: Option<Value>,
    pub n1_sm_message: Option<Vec<u8>>,
    pub n2_sm_information: Option<Vec<u8>>,
}

impl SmContextResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            location: None,
            json_data: None,
            n1_sm_message: None,
            n2_sm_information: None,
        }
    }

    fn with_json(mut self, body: &impl Serialize) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => self.json_data = Some(value),
            Err(e) => log::error!("{} response body serialization failed: {}", self.status, e),
        }
        self
    }

    /// Error response carrying only the problem
    pub fn problem(problem: ProblemDetails) -> Self {
        Self::new(problem.status).with_json(&SmContextError::new(problem))
    }

    /// Error response carrying the problem and an N1 reject message
    fn reject(problem: ProblemDetails, n1: Vec<u8>, n1_content_id: &str) -> Self {
        let mut body = SmContextError::new(problem);
        body.n1_sm_msg = Some(RefToBinaryData::new(n1_content_id));
        let mut response = Self::new(body.error.status).with_json(&body);
        response.n1_sm_message = Some(n1);
        response
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Problem details of an error response
    pub fn error(&self) -> Option<ProblemDetails> {
        let error = self.json_data.as_ref()?.get("error")?;
        serde_json::from_value(error.clone()).ok()
    }

    /// Multipart-like JSON rendering with base64 binary parts
    pub fn to_json(&self) -> Value {
        let mut value = json!({ "status": self.status });
        if let Some(location) = self.location.as_ref() {
            value["location"] = json!(location);
        }
        if let Some(data) = self.json_data.as_ref() {
            value["jsonData"] = data.clone();
        }
        if let Some(n1) = self.n1_sm_message.as_ref() {
            value["binaryDataN1SmMessage"] = json!(BASE64.encode(n1));
        }
        if let Some(n2) = self.n2_sm_information.as_ref() {
            value["binaryDataN2SmInformation"] = json!(BASE64.encode(n2));
        }
        value
    }
}

fn n1_sm_error(detail: impl Into<String>) -> ProblemDetails {
    ProblemDetails::new(403, "N1_SM_ERROR", "N1 SM Error").with_detail(detail)
}

fn system_failure(detail: impl Into<String>) -> ProblemDetails {
    ProblemDetails::new(500, "SYSTEM_FAILURE", "System failure").with_detail(detail)
}

fn context_not_found(sm_context_ref: &str) -> SmContextResponse {
    let mut body = SmContextError::new(SmafError::NotFound(sm_context_ref.to_string()).problem());
    body.up_cnx_state = Some(UpCnxState::Deactivated);
    SmContextResponse::new(404).with_json(&body)
}

// ============================================================================
// Session parameters
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct AuthorizedQos {
    session_ambr: Option<Ambr>,
    five_qi: u8,
    arp_priority: u8,
}

/// QoS of the active session rule, falling back to the subscription
fn authorized_qos(sm: &SmContext) -> AuthorizedQos {
    let rule = selected_session_rule(&sm.session_rules).map(|rule| &rule.model);
    let subscribed = sm.dnn_configuration.as_ref();

    let session_ambr = rule
        .and_then(|model| model.auth_sess_ambr.clone())
        .or_else(|| subscribed.and_then(|cfg| cfg.session_ambr.clone()));
    let qos = rule
        .and_then(|model| model.auth_def_qos.as_ref())
        .or_else(|| subscribed.and_then(|cfg| cfg.var5g_qos_profile.as_ref()));

    AuthorizedQos {
        session_ambr,
        five_qi: qos.map_or(DEFAULT_5QI, |q| q.var5qi),
        arp_priority: qos
            .and_then(|q| q.arp.as_ref())
            .map_or(DEFAULT_ARP_PRIORITY, |arp| arp.priority_level),
    }
}

/// Uplink tunnel of the default path's access-side node
fn ul_tunnel(sm: &SmContext) -> SmafResult<FTeid> {
    let node = sm
        .tunnel
        .pool
        .default_path()
        .and_then(|path| path.first_node())
        .ok_or_else(|| SmafError::Configuration(format!("{} no default path", sm.tag())))?;
    let teid = node
        .uplink
        .teid
        .ok_or_else(|| SmafError::Configuration(format!("{} default path not activated", sm.tag())))?;
    Ok(FTeid::new(teid, node.addr))
}

fn resource_setup_request(sm: &SmContext) -> SmafResult<ResourceSetupRequestTransfer> {
    let qos = authorized_qos(sm);
    let (ambr_downlink, ambr_uplink) = qos.session_ambr.as_ref().map_or((0, 0), |ambr| {
        (
            crate::gsm_build::parse_bitrate(&ambr.downlink),
            crate::gsm_build::parse_bitrate(&ambr.uplink),
        )
    });
    Ok(ResourceSetupRequestTransfer {
        qfi: crate::gsm_build::DEFAULT_QFI,
        ul_tunnel: ul_tunnel(sm)?,
        five_qi: qos.five_qi,
        arp_priority: qos.arp_priority,
        ambr_downlink,
        ambr_uplink,
    })
}

/// Point the access-side downlink FARs at `an_tunnel`
fn forward_downlink_to(sm: &mut SmContext, an_tunnel: FTeid) {
    let dnn = sm.dnn.clone();
    let touched = sm.tunnel.pool.update_access_downlink(|far| {
        far.set_apply_action(ApplyAction::forward());
        far.set_forwarding_parameters(access_forwarding(&dnn, an_tunnel));
    });
    if touched.is_empty() {
        log::warn!("{} no activated path for AN tunnel 0x{:x}", sm.tag(), an_tunnel.teid);
    }
}

fn n2_information(request: &SmContextUpdateRequest) -> SmafResult<&[u8]> {
    request
        .binary_data_n2_sm_information
        .as_deref()
        .ok_or_else(|| SmafError::MalformedInput("N2 SM information missing".to_string()))
}

/// Terminal release: free everything, drop the context and notify
async fn finish_release(ctx: &SmafContext, sm: &mut SmContext) {
    sm.transition(SmContextState::InActive);
    sm.release_resources(&ctx.topology, &ctx.seids, &ctx.ue_pool);
    ctx.registry.remove(&sm.sm_context_ref);

    if let Some(uri) = sm.sm_context_status_uri.as_deref() {
        if let Err(e) = ctx.notifier.notify_released(uri, &sm.sm_context_ref).await {
            log::warn!("{} SM context status notification failed: {}", sm.tag(), e);
        }
    }
}

// ============================================================================
// Create
// ============================================================================

pub async fn handle_pdu_session_sm_context_create(
    ctx: &SmafContext,
    request: SmContextCreateRequest,
) -> SmContextResponse {
    let data = &request.json_data;
    log::info!("[{}:{}] SM context create (dnn={})", data.supi, data.pdu_session_id, data.dnn);

    let establishment = match ctx.gsm_codec.decode(&request.binary_data_n1_sm_message) {
        Ok(GsmRequest::EstablishmentRequest(req)) => req,
        Ok(other) => {
            log::warn!("[{}:{}] {} instead of establishment", data.supi, data.pdu_session_id, other.name());
            return SmContextResponse::problem(n1_sm_error(format!("unexpected {}", other.name())));
        }
        Err(e) => {
            log::warn!("[{}:{}] GSM decode failed: {}", data.supi, data.pdu_session_id, e);
            return SmContextResponse::problem(SmafError::from(e).problem());
        }
    };

    let sm_context_ref = format!("urn:uuid:{}", uuid::Uuid::new_v4());
    let mut sm = match SmContext::new(&sm_context_ref, data, ctx.events()) {
        Ok(sm) => sm,
        Err(e) => return SmContextResponse::problem(e.problem()),
    };
    sm.pti = establishment.pti;
    sm.pdu_session_type = pdu_session_type::IPV4;
    if let Some(requested) = establishment.pdu_session_type.filter(|&t| t != pdu_session_type::IPV4) {
        log::info!("{} PDU session type {} requested, IPv4 selected", sm.tag(), requested);
    }

    match establish(ctx, &mut sm).await {
        Ok(response) => {
            log::info!("{} SM context created ({})", sm.tag(), sm_context_ref);
            log::trace!("{}", response.to_json());
            ctx.registry.insert(Arc::new(SessionHandle::new(sm)));
            response
        }
        Err(e) => {
            log::warn!("{} SM context create rejected: {}", sm.tag(), e);
            discard(ctx, &mut sm).await;
            let cause = establishment_reject_cause(&e);
            let n1 = ctx.gsm_codec.encode(&GsmMessage::EstablishmentReject {
                psi: sm.pdu_session_id,
                pti: sm.pti,
                cause,
            });
            SmContextResponse::reject(e.problem(), n1, content_id::N1_SM_MSG)
        }
    }
}

fn establishment_reject_cause(err: &SmafError) -> GsmCause {
    match err {
        SmafError::ResourceExhausted(_) => GsmCause::InsufficientResourcesForSpecificSliceAndDnn,
        SmafError::SyncFailure(_) => GsmCause::InsufficientResources,
        SmafError::Configuration(_) => GsmCause::NetworkFailure,
        _ => GsmCause::RequestRejectedUnspecified,
    }
}

async fn establish(ctx: &SmafContext, sm: &mut SmContext) -> SmafResult<SmContextResponse> {
    let query = SmDataQuery {
        dnn: sm.dnn.clone(),
        plmn_id: Some(sm.guami.plmn_id.clone()),
        single_nssai: sm.snssai.clone(),
    };
    match ctx.subscriber_data.fetch_sm_data(&sm.supi, &query).await {
        Ok(cfg) => sm.dnn_configuration = Some(cfg),
        Err(e) => log::warn!("{} SM subscription data unavailable: {}", sm.tag(), e),
    }

    let ue_ip = ctx.ue_pool.allocate()?;
    sm.ue_ip = Some(ue_ip);
    log::debug!("{} UE address {}", sm.tag(), ue_ip);

    let policy = SmPolicyContextData {
        supi: sm.supi.clone(),
        pdu_session_id: sm.pdu_session_id,
        dnn: sm.dnn.clone(),
        notification_uri: ctx.policy_notification_uri(&sm.sm_context_ref),
        access_type: sm.an_type,
        rat_type: sm.rat_type.clone(),
        ipv4_address: Some(ue_ip.to_string()),
        slice_info: sm.snssai.clone(),
        serving_network: sm.serving_network.clone(),
        subs_sess_ambr: sm.dnn_configuration.as_ref().and_then(|c| c.session_ambr.clone()),
        subs_def_qos: sm.dnn_configuration.as_ref().and_then(|c| c.var5g_qos_profile.clone()),
        supp_feat: SUPPORTED_FEATURES.to_string(),
    };
    let decision = match ctx.policy.create_sm_policy(&policy).await {
        Ok(decision) => decision,
        Err(e) => {
            log::error!("{} SM policy association failed: {}", sm.tag(), e);
            SmPolicyDecision::default()
        }
    };
    apply_sm_policy_from_decision(&mut sm.session_rules, &decision, ctx.rule_selector.as_ref());

    let routes = if ctx.ulcl { ctx.ue_routing.paths_for(&sm.supi) } else { None };
    match routes {
        Some(paths) => {
            log::info!("{} has pre-configured route", sm.tag());
            for path in paths {
                sm.tunnel
                    .pool
                    .build_path(&path.nodes, &ctx.topology, path.destination.clone())?;
            }
        }
        None => {
            let chain = ctx.topology.default_path_for(&sm.dnn)?;
            log::debug!("{} default path {}", sm.tag(), ctx.topology.describe(&chain));
            sm.tunnel.pool.build_path(&chain, &ctx.topology, None)?;
        }
    }
    sm.activate_paths(&ctx.topology, &ctx.seids)?;

    let report = sm
        .synchronize(
            ctx.user_plane(),
            SyncOperation::Update,
            SmContextState::Active,
            SmContextState::ActivePending,
        )
        .await?;
    if !report.is_success() {
        return Err(SmafError::SyncFailure(report.describe_failures()));
    }

    sm.up_cnx_state = UpCnxState::Activating;
    let qos = authorized_qos(sm);
    let n1 = ctx.gsm_codec.encode(&GsmMessage::EstablishmentAccept(EstablishmentAccept {
        psi: sm.pdu_session_id,
        pti: sm.pti,
        pdu_session_type: sm.pdu_session_type,
        ssc_mode: SSC_MODE_1,
        session_ambr: qos.session_ambr,
        five_qi: qos.five_qi,
        ue_ip: sm.ue_ip,
        snssai: sm.snssai.clone(),
        dnn: sm.dnn.clone(),
    }));
    let n2 = ctx.n2_codec.encode_resource_setup_request(&resource_setup_request(sm)?);

    let created = SmContextCreatedData {
        pdu_session_id: sm.pdu_session_id,
        s_nssai: sm.snssai.clone(),
        up_cnx_state: sm.up_cnx_state,
        n1_sm_msg: Some(RefToBinaryData::new(content_id::N1_SM_MSG)),
        n2_sm_info: Some(RefToBinaryData::new(content_id::RESOURCE_SETUP_REQUEST)),
        n2_sm_info_type: Some(N2SmInfoType::PduResSetupReq),
    };
    let mut response = SmContextResponse::new(201).with_json(&created);
    response.location = Some(sm.sm_context_ref.clone());
    response.n1_sm_message = Some(n1);
    response.n2_sm_information = Some(n2);
    Ok(response)
}

/// Undo a failed create: delete what the nodes hold and free every id
async fn discard(ctx: &SmafContext, sm: &mut SmContext) {
    if sm.pfcp_sessions.values().any(|s| s.is_established()) {
        match sm
            .synchronize(
                ctx.user_plane(),
                SyncOperation::Release,
                SmContextState::InActive,
                SmContextState::InActive,
            )
            .await
        {
            Ok(report) if !report.is_success() => {
                log::warn!("{} cleanup deletion failed: {}", sm.tag(), report.describe_failures());
            }
            Ok(_) => {}
            Err(e) => log::warn!("{} cleanup deletion failed: {}", sm.tag(), e),
        }
    }
    sm.release_resources(&ctx.topology, &ctx.seids, &ctx.ue_pool);
    sm.transition(SmContextState::InActive);
}

// ============================================================================
// Update
// ============================================================================

/// Response parts and the forwarding-node operation an update collects
#[derive(Debug, Default)]
struct UpdateResponse {
    data: SmContextUpdatedData,
    n1: Option<Vec<u8>>,
    n2: Option<Vec<u8>>,
    op: Option<SyncOperation>,
}

impl UpdateResponse {
    fn n1(&mut self, content_id: &str, message: Vec<u8>) {
        self.data.n1_sm_msg = Some(RefToBinaryData::new(content_id));
        self.n1 = Some(message);
    }

    fn n2(&mut self, info_type: N2SmInfoType, content_id: &str, transfer: Vec<u8>) {
        self.data.n2_sm_info_type = Some(info_type);
        self.data.n2_sm_info = Some(RefToBinaryData::new(content_id));
        self.n2 = Some(transfer);
    }

    /// Release wins over modification
    fn schedule(&mut self, op: SyncOperation) {
        if self.op != Some(SyncOperation::Release) {
            self.op = Some(op);
        }
    }

    fn into_response(self) -> SmContextResponse {
        let mut response = SmContextResponse::new(200).with_json(&self.data);
        response.n1_sm_message = self.n1;
        response.n2_sm_information = self.n2;
        response
    }
}

pub async fn handle_pdu_session_sm_context_update(
    ctx: &SmafContext,
    sm_context_ref: &str,
    request: SmContextUpdateRequest,
) -> SmContextResponse {
    let Some(handle) = ctx.registry.get(sm_context_ref) else {
        log::warn!("SM context {} not found", sm_context_ref);
        return context_not_found(sm_context_ref);
    };
    let mut sm = handle.context.lock().await;

    match update_sm_context(ctx, &mut sm, &request).await {
        Ok(response) => {
            log::trace!("{}", response.to_json());
            response
        }
        Err(e) => {
            log::warn!("{} SM context update failed: {}", sm.tag(), e);
            if sm.state() == SmContextState::ModificationPending {
                sm.transition(SmContextState::Active);
            }
            SmContextResponse::problem(e.problem())
        }
    }
}

// ----------------------------------------------------------------------------
// Update plan
// ----------------------------------------------------------------------------

#[derive(Debug)]
enum N1Trigger {
    ReleaseRequest { pti: u8, cause: Option<GsmCause> },
    ReleaseComplete,
}

#[derive(Debug)]
enum UpCnxTrigger {
    /// Carries the encoded setup request transfer
    Activating(Vec<u8>),
    Deactivated,
}

#[derive(Debug)]
enum N2Trigger {
    SetupResponse(FTeid),
    SetupFailure,
    ReleaseResponse,
    PathSwitch { an_tunnel: FTeid, ack: Vec<u8> },
    PathSwitchSetupFailure,
    HandoverRequired,
    Ignored(N2SmInfoType),
}

#[derive(Debug)]
enum HoTrigger {
    Preparing(Vec<u8>),
    Prepared { target: FTeid, command: Vec<u8> },
    Completed,
}

/// Every trigger of one update request, state-checked and decoded
/// against the context as it was when the request arrived
#[derive(Debug, Default)]
struct UpdatePlan {
    n1: Option<N1Trigger>,
    up_cnx: Option<UpCnxTrigger>,
    n2: Option<N2Trigger>,
    ho: Option<HoTrigger>,
    duplicate_release: bool,
}

impl UpdatePlan {
    /// Whether applying the plan enters `ModificationPending`
    fn modifies(&self) -> bool {
        self.up_cnx.is_some()
            || self.ho.is_some()
            || matches!(
                self.n2,
                Some(
                    N2Trigger::SetupResponse(_)
                        | N2Trigger::SetupFailure
                        | N2Trigger::PathSwitch { .. }
                        | N2Trigger::PathSwitchSetupFailure
                        | N2Trigger::HandoverRequired
                )
            )
    }
}

/// Check and decode every trigger without touching `sm`
fn plan_update(ctx: &SmafContext, sm: &SmContext, request: &SmContextUpdateRequest) -> SmafResult<UpdatePlan> {
    let data = &request.json_data;
    let mut plan = UpdatePlan::default();

    if let Some(n1) = request.binary_data_n1_sm_message.as_deref() {
        match ctx.gsm_codec.decode(n1)? {
            GsmRequest::ReleaseRequest { pti, cause, .. } => {
                sm.require_state("PDU Session Release Request", &[SmContextState::Active])?;
                plan.n1 = Some(N1Trigger::ReleaseRequest { pti, cause });
            }
            GsmRequest::ReleaseComplete { .. } => {
                sm.require_state("PDU Session Release Complete", &[SmContextState::InActivePending])?;
                // Ends the session, the rest of the request is moot
                plan.n1 = Some(N1Trigger::ReleaseComplete);
                return Ok(plan);
            }
            other => {
                return Err(SmafError::MalformedInput(format!("unexpected {}", other.name())));
            }
        }
    }

    plan.up_cnx = match data.up_cnx_state {
        Some(UpCnxState::Activating) => {
            sm.require_state("upCnxState ACTIVATING", MODIFIABLE)?;
            let transfer = ctx.n2_codec.encode_resource_setup_request(&resource_setup_request(sm)?);
            Some(UpCnxTrigger::Activating(transfer))
        }
        Some(UpCnxState::Deactivated) => {
            sm.require_state("upCnxState DEACTIVATED", MODIFIABLE)?;
            Some(UpCnxTrigger::Deactivated)
        }
        Some(UpCnxState::Activated) | None => None,
    };

    plan.n2 = match data.n2_sm_info_type {
        Some(N2SmInfoType::PduResSetupRsp) => {
            sm.require_state("PDU_RES_SETUP_RSP", MODIFIABLE)?;
            let an_tunnel = ctx.n2_codec.decode_resource_setup_response(n2_information(request)?)?;
            Some(N2Trigger::SetupResponse(an_tunnel))
        }
        Some(N2SmInfoType::PduResSetupFail) => {
            sm.require_state("PDU_RES_SETUP_FAIL", MODIFIABLE)?;
            Some(N2Trigger::SetupFailure)
        }
        Some(N2SmInfoType::PduResRelRsp) => {
            sm.require_state("PDU_RES_REL_RSP", &[SmContextState::InActivePending])?;
            Some(N2Trigger::ReleaseResponse)
        }
        Some(N2SmInfoType::PathSwitchReq) => {
            sm.require_state("PATH_SWITCH_REQ", MODIFIABLE)?;
            let an_tunnel = ctx.n2_codec.decode_path_switch_request(n2_information(request)?)?;
            let ack = ctx.n2_codec.encode_path_switch_request_ack(ul_tunnel(sm)?);
            Some(N2Trigger::PathSwitch { an_tunnel, ack })
        }
        Some(N2SmInfoType::PathSwitchSetupFail) => {
            sm.require_state("PATH_SWITCH_SETUP_FAIL", MODIFIABLE)?;
            Some(N2Trigger::PathSwitchSetupFailure)
        }
        Some(N2SmInfoType::HandoverRequired) => {
            sm.require_state("HANDOVER_REQUIRED", MODIFIABLE)?;
            Some(N2Trigger::HandoverRequired)
        }
        Some(other) => Some(N2Trigger::Ignored(other)),
        None => None,
    };

    plan.ho = match data.ho_state {
        Some(HoState::Preparing) => {
            sm.require_state("hoState PREPARING", MODIFIABLE)?;
            let transfer = ctx.n2_codec.encode_resource_setup_request(&resource_setup_request(sm)?);
            Some(HoTrigger::Preparing(transfer))
        }
        Some(HoState::Prepared) => {
            sm.require_state("hoState PREPARED", MODIFIABLE)?;
            let target = ctx.n2_codec.decode_handover_request_ack(n2_information(request)?)?;
            let command = ctx.n2_codec.encode_handover_command(ul_tunnel(sm)?);
            Some(HoTrigger::Prepared { target, command })
        }
        Some(HoState::Completed) => {
            sm.require_state("hoState COMPLETED", MODIFIABLE)?;
            Some(HoTrigger::Completed)
        }
        Some(HoState::None) | Some(HoState::Cancelled) | None => None,
    };

    if data.cause == Some(crate::models::Cause::RelDueToDuplicateSessionId) {
        sm.require_state("REL_DUE_TO_DUPLICATE_SESSION_ID", MODIFIABLE)?;
        plan.duplicate_release = true;
    }

    Ok(plan)
}

async fn update_sm_context(
    ctx: &SmafContext,
    sm: &mut SmContext,
    request: &SmContextUpdateRequest,
) -> SmafResult<SmContextResponse> {
    // Nothing below may fail before the forwarding-node sync
    let plan = plan_update(ctx, sm, request)?;
    let mut out = UpdateResponse::default();

    match plan.n1 {
        Some(N1Trigger::ReleaseRequest { pti, cause }) => {
            log::info!("{} release requested (cause {:?})", sm.tag(), cause);
            sm.pti = pti;
            let command = ctx.gsm_codec.encode(&GsmMessage::ReleaseCommand {
                psi: sm.pdu_session_id,
                pti,
                cause: GsmCause::RegularDeactivation,
            });
            out.n1(content_id::RELEASE_COMMAND, command);
            out.n2(
                N2SmInfoType::PduResRelCmd,
                content_id::RESOURCE_RELEASE_COMMAND,
                ctx.n2_codec.encode_resource_release_command(N2Cause::normal_release()),
            );
            out.schedule(SyncOperation::Release);
        }
        Some(N1Trigger::ReleaseComplete) => {
            finish_release(ctx, sm).await;
            out.data.up_cnx_state = Some(UpCnxState::Deactivated);
            return Ok(out.into_response());
        }
        None => {}
    }

    if plan.modifies() {
        sm.transition(SmContextState::ModificationPending);
    }

    // User plane connection
    match plan.up_cnx {
        Some(UpCnxTrigger::Activating(transfer)) => {
            out.n2(N2SmInfoType::PduResSetupReq, content_id::RESOURCE_SETUP_REQUEST, transfer);
            sm.up_cnx_state = UpCnxState::Activating;
            out.data.up_cnx_state = Some(UpCnxState::Activating);
        }
        Some(UpCnxTrigger::Deactivated) => {
            let touched = sm
                .tunnel
                .pool
                .update_access_downlink(|far| far.set_apply_action(ApplyAction::buffer_and_notify()));
            log::debug!("{} buffering downlink on {:?}", sm.tag(), touched);
            sm.up_cnx_state = UpCnxState::Deactivated;
            out.data.up_cnx_state = Some(UpCnxState::Deactivated);
            out.schedule(SyncOperation::Update);
        }
        None => {}
    }

    // N2 SM information
    match plan.n2 {
        Some(N2Trigger::SetupResponse(an_tunnel)) => {
            log::debug!("{} AN tunnel 0x{:x}@{}", sm.tag(), an_tunnel.teid, an_tunnel.ipv4);
            sm.an_tunnel = Some(an_tunnel);
            forward_downlink_to(sm, an_tunnel);
            sm.up_cnx_state = UpCnxState::Activated;
            out.schedule(SyncOperation::Update);
        }
        Some(N2Trigger::SetupFailure) => {
            log::warn!("{} PDU session resource setup failed at the AN", sm.tag());
            sm.up_cnx_state = UpCnxState::Deactivated;
        }
        Some(N2Trigger::ReleaseResponse) => {
            log::info!("{} N2 PDU session release complete", sm.tag());
        }
        Some(N2Trigger::PathSwitch { an_tunnel, ack }) => {
            sm.an_tunnel = Some(an_tunnel);
            forward_downlink_to(sm, an_tunnel);
            out.n2(N2SmInfoType::PathSwitchReqAck, content_id::PATH_SWITCH_REQ_ACK, ack);
            out.schedule(SyncOperation::Update);
        }
        Some(N2Trigger::PathSwitchSetupFailure) => {
            log::warn!("{} path switch setup failed", sm.tag());
        }
        Some(N2Trigger::HandoverRequired) => {
            out.data.n2_sm_info = Some(RefToBinaryData::new(content_id::HANDOVER));
        }
        Some(N2Trigger::Ignored(info_type)) => log::debug!("{} N2 SM info {:?} ignored", sm.tag(), info_type),
        None => {}
    }

    // Handover
    match plan.ho {
        Some(HoTrigger::Preparing(transfer)) => {
            sm.ho_state = HoState::Preparing;
            out.n2(N2SmInfoType::PduResSetupReq, content_id::PDU_RES_SETUP_REQ, transfer);
            out.data.ho_state = Some(HoState::Preparing);
        }
        Some(HoTrigger::Prepared { target, command }) => {
            sm.target_an_tunnel = Some(target);
            sm.ho_state = HoState::Prepared;
            out.n2(N2SmInfoType::HandoverCmd, content_id::HANDOVER_CMD, command);
            out.data.ho_state = Some(HoState::Prepared);
        }
        Some(HoTrigger::Completed) => {
            sm.ho_state = HoState::Completed;
            if let Some(target) = sm.target_an_tunnel.take() {
                sm.an_tunnel = Some(target);
                forward_downlink_to(sm, target);
                out.schedule(SyncOperation::Update);
            }
            out.data.ho_state = Some(HoState::Completed);
        }
        None => {}
    }

    // Cause
    if plan.duplicate_release {
        log::info!("{} release due to duplicate session id", sm.tag());
        sm.release_due_to_duplicate = true;
        out.n2(
            N2SmInfoType::PduResRelCmd,
            content_id::RESOURCE_RELEASE_COMMAND,
            ctx.n2_codec.encode_resource_release_command(N2Cause::normal_release()),
        );
        out.schedule(SyncOperation::Release);
    }

    match out.op {
        None => {
            if sm.state() == SmContextState::ModificationPending {
                sm.transition(SmContextState::Active);
            }
            Ok(out.into_response())
        }
        Some(SyncOperation::Update) => {
            let report = sm
                .synchronize(
                    ctx.user_plane(),
                    SyncOperation::Update,
                    SmContextState::Active,
                    SmContextState::Active,
                )
                .await?;
            if report.is_success() {
                Ok(out.into_response())
            } else {
                Ok(SmContextResponse::problem(n1_sm_error(report.describe_failures())))
            }
        }
        Some(SyncOperation::Release) => {
            let duplicate = sm.release_due_to_duplicate;
            let on_success = if duplicate {
                SmContextState::InActive
            } else {
                SmContextState::InActivePending
            };
            let report = sm
                .synchronize(ctx.user_plane(), SyncOperation::Release, on_success, SmContextState::Active)
                .await?;
            if !report.is_success() {
                sm.release_due_to_duplicate = false;
                return Ok(release_reject(ctx, sm, &report));
            }
            if duplicate {
                finish_release(ctx, sm).await;
                out.data.up_cnx_state = Some(UpCnxState::Deactivated);
            }
            Ok(out.into_response())
        }
    }
}

fn release_reject(ctx: &SmafContext, sm: &SmContext, report: &SyncReport) -> SmContextResponse {
    let n1 = ctx.gsm_codec.encode(&GsmMessage::ReleaseReject {
        psi: sm.pdu_session_id,
        pti: sm.pti,
        cause: GsmCause::RequestRejectedUnspecified,
    });
    SmContextResponse::reject(
        system_failure(format!("{}: {}", report.status, report.describe_failures())),
        n1,
        content_id::RELEASE_REJECT,
    )
}

// ============================================================================
// Release
// ============================================================================

pub async fn handle_pdu_session_sm_context_release(
    ctx: &SmafContext,
    sm_context_ref: &str,
    request: SmContextReleaseRequest,
) -> SmContextResponse {
    let Some(handle) = ctx.registry.get(sm_context_ref) else {
        log::warn!("SM context {} not found", sm_context_ref);
        return context_not_found(sm_context_ref);
    };
    let mut sm = handle.context.lock().await;
    log::info!("{} SM context release (cause {:?})", sm.tag(), request.json_data.cause);

    if let Err(e) = sm.require_state(
        "SM context release",
        &[SmContextState::Active, SmContextState::InActivePending],
    ) {
        return SmContextResponse::problem(e.problem());
    }

    let report = match sm
        .synchronize(
            ctx.user_plane(),
            SyncOperation::Release,
            SmContextState::InActivePending,
            SmContextState::Active,
        )
        .await
    {
        Ok(report) => report,
        Err(e) => return SmContextResponse::problem(e.problem()),
    };

    if report.is_success() {
        finish_release(ctx, &mut sm).await;
        SmContextResponse::new(204)
    } else {
        release_reject(ctx, &sm, &report)
    }
}

// ============================================================================
// Callbacks
// ============================================================================

/// SM policy update notification from the PCF
pub async fn handle_sm_policy_update_notify(
    ctx: &SmafContext,
    sm_context_ref: &str,
    notification: SmPolicyNotification,
) -> SmContextResponse {
    let Some(handle) = ctx.registry.get(sm_context_ref) else {
        log::error!("SM context {} not found", sm_context_ref);
        return SmContextResponse::problem(
            ProblemDetails::new(400, "CONTEXT_NOT_FOUND", "SM context not found").with_detail(sm_context_ref),
        );
    };
    let mut sm = handle.context.lock().await;

    if let Err(e) = sm.require_state("SM policy update", &[SmContextState::Active]) {
        return SmContextResponse::problem(e.problem());
    }
    sm.transition(SmContextState::ModificationPending);
    if let Some(decision) = notification.sm_policy_decision.as_ref() {
        let active = apply_sm_policy_from_decision(&mut sm.session_rules, decision, ctx.rule_selector.as_ref());
        log::info!("{} SM policy updated, active rule {:?}", sm.tag(), active);
    }
    sm.transition(SmContextState::Active);
    SmContextResponse::new(204)
}

/// Response delivered out of band by the forwarding-node transport
pub fn handle_forwarding_node_response(ctx: &SmafContext, cp_seid: u64, response: SessionResponse) -> bool {
    ctx.engine.on_forwarding_node_response(cp_seid, response)
}
