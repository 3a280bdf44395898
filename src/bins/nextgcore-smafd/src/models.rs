//! SBI Data Models
//!
//! Nsmf_PDUSession, Npcf_SMPolicyControl, Nudm_SDM and Nnrf data types
//! exchanged with the AMF, PCF, UDM and NRF (3GPP TS 29.502 / 29.512 /
//! 29.503 / 29.510). Only the members this function reads or writes are
//! modeled.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Common types
// ============================================================================

/// PLMN identifier
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlmnId {
    pub mcc: String,
    pub mnc: String,
}

/// Single network slice selection assistance information
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Snssai {
    pub sst: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sd: Option<String>,
}

/// GUAMI (only the PLMN part is used)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guami {
    pub plmn_id: PlmnId,
    #[serde(default)]
    pub amf_id: String,
}

/// Access type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessType {
    #[default]
    #[serde(rename = "3GPP_ACCESS")]
    ThreeGppAccess,
    #[serde(rename = "NON_3GPP_ACCESS")]
    NonThreeGppAccess,
}

/// User plane connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpCnxState {
    Activated,
    #[default]
    Deactivated,
    Activating,
}

/// Handover state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoState {
    #[default]
    None,
    Preparing,
    Prepared,
    Completed,
    Cancelled,
}

/// Type of the N2 SM information carried alongside a request or response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum N2SmInfoType {
    PduResSetupReq,
    PduResSetupRsp,
    PduResSetupFail,
    PduResRelCmd,
    PduResRelRsp,
    PathSwitchReq,
    PathSwitchSetupFail,
    PathSwitchReqAck,
    HandoverRequired,
    HandoverCmd,
    HandoverReqAck,
}

/// Update/release cause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cause {
    RelDueToHo,
    RelDueToDuplicateSessionId,
    RelDueToSliceNotAvailable,
    RelDueToSubscriptionChange,
    #[serde(other)]
    Unspecified,
}

/// Reference to a binary part of a multipart message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefToBinaryData {
    pub content_id: String,
}

impl RefToBinaryData {
    pub fn new(content_id: &str) -> Self {
        Self {
            content_id: content_id.to_string(),
        }
    }
}

/// Problem details (RFC 7807)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub problem_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ProblemDetails {
    pub fn new(status: u16, cause: &str, title: &str) -> Self {
        Self {
            problem_type: None,
            title: Some(title.to_string()),
            status,
            detail: None,
            cause: Some(cause.to_string()),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Aggregate maximum bit rate, e.g. `"100 Mbps"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ambr {
    pub uplink: String,
    pub downlink: String,
}

/// Allocation and retention priority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Arp {
    pub priority_level: u8,
    #[serde(default)]
    pub preempt_cap: String,
    #[serde(default)]
    pub preempt_vuln: String,
}

/// Subscribed / authorized default QoS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultQos {
    #[serde(rename = "5qi")]
    pub var5qi: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arp: Option<Arp>,
}

// ============================================================================
// Nsmf_PDUSession
// ============================================================================

/// SmContextCreateData
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmContextCreateData {
    pub supi: String,
    pub pdu_session_id: u8,
    pub dnn: String,
    #[serde(rename = "sNssai")]
    pub s_nssai: Snssai,
    #[serde(default)]
    pub an_type: AccessType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rat_type: Option<String>,
    #[serde(default)]
    pub guami: Guami,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving_network: Option<PlmnId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sm_context_status_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving_nf_id: Option<String>,
}

/// Create request: JSON part plus the N1 SM message part
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SmContextCreateRequest {
    pub json_data: SmContextCreateData,
    pub binary_data_n1_sm_message: Vec<u8>,
}

/// SmContextUpdateData
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmContextUpdateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_cnx_state: Option<UpCnxState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ho_state: Option<HoState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n2_sm_info_type: Option<N2SmInfoType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Cause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub an_type: Option<AccessType>,
}

/// Update request: JSON part plus optional N1/N2 parts
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SmContextUpdateRequest {
    pub json_data: SmContextUpdateData,
    pub binary_data_n1_sm_message: Option<Vec<u8>>,
    pub binary_data_n2_sm_information: Option<Vec<u8>>,
}

/// SmContextReleaseData
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmContextReleaseData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Cause>,
}

/// Release request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SmContextReleaseRequest {
    pub json_data: SmContextReleaseData,
}

/// SmContextCreatedData
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmContextCreatedData {
    pub pdu_session_id: u8,
    #[serde(rename = "sNssai")]
    pub s_nssai: Snssai,
    pub up_cnx_state: UpCnxState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n1_sm_msg: Option<RefToBinaryData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n2_sm_info: Option<RefToBinaryData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n2_sm_info_type: Option<N2SmInfoType>,
}

/// SmContextUpdatedData
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmContextUpdatedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_cnx_state: Option<UpCnxState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ho_state: Option<HoState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n1_sm_msg: Option<RefToBinaryData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n2_sm_info: Option<RefToBinaryData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n2_sm_info_type: Option<N2SmInfoType>,
}

/// Error body for create/update/release failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmContextError {
    pub error: ProblemDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n1_sm_msg: Option<RefToBinaryData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_cnx_state: Option<UpCnxState>,
}

impl SmContextError {
    pub fn new(error: ProblemDetails) -> Self {
        Self {
            error,
            n1_sm_msg: None,
            up_cnx_state: None,
        }
    }
}

// ============================================================================
// Npcf_SMPolicyControl
// ============================================================================

/// SmPolicyContextData sent when creating the policy association
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmPolicyContextData {
    pub supi: String,
    pub pdu_session_id: u8,
    pub dnn: String,
    pub notification_uri: String,
    pub access_type: AccessType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rat_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    pub slice_info: Snssai,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving_network: Option<PlmnId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subs_sess_ambr: Option<Ambr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subs_def_qos: Option<DefaultQos>,
    pub supp_feat: String,
}

/// Session rule as delivered by the PCF
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRuleModel {
    #[serde(default)]
    pub sess_rule_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_sess_ambr: Option<Ambr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_def_qos: Option<DefaultQos>,
}

/// SmPolicyDecision. A `null` session rule requests its deletion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmPolicyDecision {
    #[serde(default)]
    pub sess_rules: BTreeMap<String, Option<SessionRuleModel>>,
}

/// SmPolicyNotification delivered on the policy update callback
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmPolicyNotification {
    #[serde(default)]
    pub resource_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sm_policy_decision: Option<SmPolicyDecision>,
}

// ============================================================================
// Nudm_SDM
// ============================================================================

/// Query parameters for session management subscription data
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SmDataQuery {
    pub dnn: String,
    pub plmn_id: Option<PlmnId>,
    pub single_nssai: Snssai,
}

/// Per-DNN subscription data
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnnConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_ambr: Option<Ambr>,
    #[serde(rename = "5gQosProfile", default, skip_serializing_if = "Option::is_none")]
    pub var5g_qos_profile: Option<DefaultQos>,
}

// ============================================================================
// Nnrf
// ============================================================================

/// NF type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NfType {
    Nrf,
    Amf,
    Smf,
    Pcf,
    Udm,
    Ausf,
}

/// NF service version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfServiceVersion {
    pub api_version_in_uri: String,
    pub api_full_version: String,
}

/// NF service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfService {
    pub service_instance_id: String,
    pub service_name: String,
    pub versions: Vec<NfServiceVersion>,
    pub scheme: String,
    pub nf_service_status: String,
    pub api_prefix: String,
}

/// Per-slice DNN list served by this SMF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnssaiSmfInfoItem {
    pub s_nssai: Snssai,
    pub dnn_smf_info_list: Vec<DnnSmfInfoItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnnSmfInfoItem {
    pub dnn: String,
}

/// SMF specific profile data
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmfInfo {
    pub s_nssai_smf_info_list: Vec<SnssaiSmfInfoItem>,
}

/// NF profile registered with the NRF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfProfile {
    pub nf_instance_id: String,
    pub nf_type: NfType,
    pub nf_status: String,
    pub ipv4_addresses: Vec<String>,
    pub nf_services: Vec<NfService>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smf_info: Option<SmfInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_decision_null_rule_means_delete() {
        let json = r#"{"sessRules":{"r1":{"sessRuleId":"r1"},"r2":null}}"#;
        let decision: SmPolicyDecision = serde_json::from_str(json).unwrap();
        assert_eq!(decision.sess_rules.len(), 2);
        assert!(decision.sess_rules["r1"].is_some());
        assert!(decision.sess_rules["r2"].is_none());
    }

    #[test]
    fn test_update_data_enums() {
        let json = r#"{"upCnxState":"DEACTIVATED","n2SmInfoType":"PDU_RES_SETUP_RSP","cause":"REL_DUE_TO_DUPLICATE_SESSION_ID"}"#;
        let data: SmContextUpdateData = serde_json::from_str(json).unwrap();
        assert_eq!(data.up_cnx_state, Some(UpCnxState::Deactivated));
        assert_eq!(data.n2_sm_info_type, Some(N2SmInfoType::PduResSetupRsp));
        assert_eq!(data.cause, Some(Cause::RelDueToDuplicateSessionId));
    }

    #[test]
    fn test_unknown_cause() {
        let data: SmContextUpdateData = serde_json::from_str(r#"{"cause":"SOMETHING_NEW"}"#).unwrap();
        assert_eq!(data.cause, Some(Cause::Unspecified));
    }

    #[test]
    fn test_problem_details_serialization() {
        let problem = ProblemDetails::new(403, "N1_SM_ERROR", "N1 SM Error").with_detail("bad header");
        let value = serde_json::to_value(&problem).unwrap();
        assert_eq!(value["status"], 403);
        assert_eq!(value["cause"], "N1_SM_ERROR");
        assert_eq!(value["detail"], "bad header");
        assert!(value.get("type").is_none());
    }

    #[test]
    fn test_access_type_names() {
        assert_eq!(
            serde_json::to_string(&AccessType::ThreeGppAccess).unwrap(),
            "\"3GPP_ACCESS\""
        );
    }
}
