//! SMAF SBI Path Management
//!
//! Consumer seams towards the policy, subscriber data and discovery
//! functions plus the SM context status notification towards the AMF.
//! The `Local*` and `Logging*` implementations let the daemon run
//! without any peer.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;
use crate::models::{
    Ambr, Arp, DefaultQos, DnnConfiguration, NfProfile, NfType, SessionRuleModel, SmDataQuery,
    SmPolicyContextData, SmPolicyDecision,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsumerError {
    #[error("{0} unavailable")]
    Unavailable(String),

    #[error("Peer answered {status}: {detail}")]
    Rejected { status: u16, detail: String },

    #[error("No data for {0}")]
    NotFound(String),
}

pub type ConsumerResult<T> = Result<T, ConsumerError>;

/// Npcf_SMPolicyControl consumer
#[async_trait]
pub trait PolicyClient: Send + Sync + fmt::Debug {
    async fn create_sm_policy(&self, context: &SmPolicyContextData) -> ConsumerResult<SmPolicyDecision>;
}

/// Nudm_SDM consumer
#[async_trait]
pub trait SubscriberDataClient: Send + Sync + fmt::Debug {
    async fn fetch_sm_data(&self, supi: &str, query: &SmDataQuery) -> ConsumerResult<DnnConfiguration>;
}

/// Nnrf consumer
#[async_trait]
pub trait NfDiscoveryClient: Send + Sync + fmt::Debug {
    async fn register(&self, profile: &NfProfile) -> ConsumerResult<()>;
    async fn deregister(&self, nf_instance_id: &str) -> ConsumerResult<()>;
    async fn discover(&self, target: NfType) -> ConsumerResult<Vec<NfProfile>>;
}

/// SM context status notification
#[async_trait]
pub trait StatusNotifier: Send + Sync + fmt::Debug {
    async fn notify_released(&self, status_uri: &str, sm_context_ref: &str) -> ConsumerResult<()>;
}

// ============================================================================
// Local collaborators
// ============================================================================

pub const LOCAL_SESSION_RULE_ID: &str = "SessRuleId-1";
pub const LOCAL_SESSION_AMBR_UPLINK: &str = "1 Gbps";
pub const LOCAL_SESSION_AMBR_DOWNLINK: &str = "2 Gbps";
pub const LOCAL_DEFAULT_5QI: u8 = 9;
pub const LOCAL_ARP_PRIORITY: u8 = 8;

fn local_dnn_configuration() -> DnnConfiguration {
    DnnConfiguration {
        session_ambr: Some(Ambr {
            uplink: LOCAL_SESSION_AMBR_UPLINK.to_string(),
            downlink: LOCAL_SESSION_AMBR_DOWNLINK.to_string(),
        }),
        var5g_qos_profile: Some(DefaultQos {
            var5qi: LOCAL_DEFAULT_5QI,
            arp: Some(Arp {
                priority_level: LOCAL_ARP_PRIORITY,
                preempt_cap: "NOT_PREEMPT".to_string(),
                preempt_vuln: "PREEMPTABLE".to_string(),
            }),
        }),
    }
}

/// Answers every policy association with one session rule mirroring the
/// subscribed AMBR and default QoS
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalPolicyClient;

#[async_trait]
impl PolicyClient for LocalPolicyClient {
    async fn create_sm_policy(&self, context: &SmPolicyContextData) -> ConsumerResult<SmPolicyDecision> {
        log::debug!(
            "[{}:{}] local SM policy for {}",
            context.supi,
            context.pdu_session_id,
            context.dnn
        );
        let rule = SessionRuleModel {
            sess_rule_id: LOCAL_SESSION_RULE_ID.to_string(),
            auth_sess_ambr: context.subs_sess_ambr.clone(),
            auth_def_qos: context.subs_def_qos.clone(),
        };
        let mut decision = SmPolicyDecision::default();
        decision.sess_rules.insert(LOCAL_SESSION_RULE_ID.to_string(), Some(rule));
        Ok(decision)
    }
}

/// Subscription data for every configured DNN
#[derive(Debug, Clone, Default)]
pub struct LocalSubscriberDataClient {
    dnns: BTreeMap<String, DnnConfiguration>,
}

impl LocalSubscriberDataClient {
    pub fn from_config(config: &Config) -> Self {
        Self::with_dnns(config.configuration.dnn.keys().cloned())
    }

    pub fn with_dnns(dnns: impl IntoIterator<Item = String>) -> Self {
        Self {
            dnns: dnns
                .into_iter()
                .map(|dnn| (dnn, local_dnn_configuration()))
                .collect(),
        }
    }
}

#[async_trait]
impl SubscriberDataClient for LocalSubscriberDataClient {
    async fn fetch_sm_data(&self, supi: &str, query: &SmDataQuery) -> ConsumerResult<DnnConfiguration> {
        self.dnns
            .get(&query.dnn)
            .cloned()
            .ok_or_else(|| ConsumerError::NotFound(format!("{} dnn {}", supi, query.dnn)))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDiscoveryClient;

#[async_trait]
impl NfDiscoveryClient for LoggingDiscoveryClient {
    async fn register(&self, profile: &NfProfile) -> ConsumerResult<()> {
        log::info!(
            "[{}] NF registered ({} services, standalone)",
            profile.nf_instance_id,
            profile.nf_services.len()
        );
        Ok(())
    }

    async fn deregister(&self, nf_instance_id: &str) -> ConsumerResult<()> {
        log::info!("[{}] NF de-registered (standalone)", nf_instance_id);
        Ok(())
    }

    async fn discover(&self, target: NfType) -> ConsumerResult<Vec<NfProfile>> {
        log::debug!("Discovery of {:?} skipped (standalone)", target);
        Ok(Vec::new())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl StatusNotifier for LoggingNotifier {
    async fn notify_released(&self, status_uri: &str, sm_context_ref: &str) -> ConsumerResult<()> {
        log::info!("[{}] SM context status RELEASED -> {}", sm_context_ref, status_uri);
        Ok(())
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Register `profile`, retrying up to `attempts` times.
/// Returns whether registration succeeded; failures are only logged.
pub async fn register_with_retry(
    client: &dyn NfDiscoveryClient,
    profile: &NfProfile,
    attempts: u32,
    delay: Duration,
) -> bool {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match client.register(profile).await {
            Ok(()) => return true,
            Err(e) => {
                log::warn!("NF registration attempt {}/{} failed: {}", attempt, attempts, e);
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    log::error!("[{}] NF registration gave up, running standalone", profile.nf_instance_id);
    false
}


#[cfg(test)]
mod tests {
    use super::mock::FlakyDiscoveryClient;
    use super::*;
    use crate::models::NfType;

    fn profile() -> NfProfile {
        NfProfile {
            nf_instance_id: "0b0e3f7c".to_string(),
            nf_type: NfType::Smf,
            nf_status: "REGISTERED".to_string(),
            ipv4_addresses: vec!["127.0.0.2".to_string()],
            nf_services: Vec::new(),
            smf_info: None,
        }
    }

    #[tokio::test]
    async fn test_local_policy_mirrors_subscription() {
        let context = SmPolicyContextData {
            supi: "imsi-208930000000003".to_string(),
            pdu_session_id: 10,
            dnn: "internet".to_string(),
            subs_sess_ambr: local_dnn_configuration().session_ambr,
            ..Default::default()
        };
        let decision = LocalPolicyClient.create_sm_policy(&context).await.unwrap();
        let rule = decision.sess_rules[LOCAL_SESSION_RULE_ID].as_ref().unwrap();
        assert_eq!(rule.auth_sess_ambr.as_ref().unwrap().downlink, "2 Gbps");
        assert!(rule.auth_def_qos.is_none());
    }

    #[tokio::test]
    async fn test_local_subscriber_data() {
        let client = LocalSubscriberDataClient::with_dnns(["internet".to_string()]);
        let query = SmDataQuery {
            dnn: "internet".to_string(),
            ..Default::default()
        };
        let data = client.fetch_sm_data("imsi-1", &query).await.unwrap();
        assert_eq!(data.var5g_qos_profile.unwrap().var5qi, LOCAL_DEFAULT_5QI);

        let query = SmDataQuery {
            dnn: "ims".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            client.fetch_sm_data("imsi-1", &query).await,
            Err(ConsumerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_register_with_retry() {
        let client = FlakyDiscoveryClient {
            failures: 2.into(),
            ..Default::default()
        };
        assert!(register_with_retry(&client, &profile(), 3, Duration::from_millis(1)).await);
        assert_eq!(*client.calls.lock().unwrap(), 3);

        let client = FlakyDiscoveryClient {
            failures: 5.into(),
            ..Default::default()
        };
        assert!(!register_with_retry(&client, &profile(), 2, Duration::from_millis(1)).await);
        assert_eq!(*client.calls.lock().unwrap(), 2);
    }
}
