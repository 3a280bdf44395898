//! OAM Session Query

use serde::{Deserialize, Serialize};

use crate::context::SmafContext;
use crate::models::{AccessType, SessionRuleModel, UpCnxState};
use crate::nsmf_handler::SmContextResponse;
use crate::session_rule::selected_session_rule;

/// Operator view of one PDU session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub supi: String,
    pub pdu_session_id: String,
    pub dnn: String,
    pub sst: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sd: Option<String>,
    pub an_type: AccessType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdu_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_rule: Option<SessionRuleModel>,
    pub up_cnx_state: UpCnxState,
    pub state: String,
}

pub async fn get_session_info(ctx: &SmafContext, sm_context_ref: &str) -> Option<SessionInfo> {
    let handle = ctx.registry.get(sm_context_ref)?;
    let sm = handle.context.lock().await;
    Some(SessionInfo {
        supi: sm.supi.clone(),
        pdu_session_id: sm.pdu_session_id.to_string(),
        dnn: sm.dnn.clone(),
        sst: sm.snssai.sst.to_string(),
        sd: sm.snssai.sd.clone(),
        an_type: sm.an_type,
        pdu_address: sm.ue_ip.map(|addr| addr.to_string()),
        session_rule: selected_session_rule(&sm.session_rules).map(|rule| rule.model.clone()),
        up_cnx_state: sm.up_cnx_state,
        state: sm.state().to_string(),
    })
}

/// 200 with the session info, 404 without a body
pub async fn handle_oam_get_session_info(ctx: &SmafContext, sm_context_ref: &str) -> SmContextResponse {
    match get_session_info(ctx, sm_context_ref).await {
        Some(info) => {
            let mut response = SmContextResponse::new(200);
            response.json_data = serde_json::to_value(&info).ok();
            response
        }
        None => {
            log::debug!("OAM query for unknown SM context {}", sm_context_ref);
            SmContextResponse::new(404)
        }
    }
}
