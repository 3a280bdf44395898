//! NF Profile
//!
//! Profile this function registers with the NRF.

use crate::config::Config;
use crate::models::{NfProfile, NfService, NfServiceVersion, NfType, SmfInfo};

pub const NF_STATUS_REGISTERED: &str = "REGISTERED";

/// API prefix `scheme://registerIPv4:port`
pub fn api_prefix(config: &Config) -> String {
    let sbi = config.sbi();
    format!("{}://{}:{}", sbi.scheme, sbi.register_ipv4, sbi.port)
}

/// Build the profile with a fresh instance id
pub fn build_nf_profile(config: &Config) -> NfProfile {
    build_nf_profile_with_id(config, &uuid::Uuid::new_v4().to_string())
}

pub fn build_nf_profile_with_id(config: &Config, nf_instance_id: &str) -> NfProfile {
    let sbi = config.sbi();
    let prefix = api_prefix(config);

    let nf_services = config
        .configuration
        .service_name_list
        .iter()
        .enumerate()
        .map(|(i, name)| NfService {
            service_instance_id: i.to_string(),
            service_name: name.clone(),
            versions: vec![NfServiceVersion {
                api_version_in_uri: "v1".to_string(),
                api_full_version: "1.0.0".to_string(),
            }],
            scheme: sbi.scheme.clone(),
            nf_service_status: NF_STATUS_REGISTERED.to_string(),
            api_prefix: prefix.clone(),
        })
        .collect();

    let smf_info = (!config.configuration.snssai_info.is_empty()).then(|| SmfInfo {
        s_nssai_smf_info_list: config.configuration.snssai_info.clone(),
    });

    NfProfile {
        nf_instance_id: nf_instance_id.to_string(),
        nf_type: NfType::Smf,
        nf_status: NF_STATUS_REGISTERED.to_string(),
        ipv4_addresses: vec![sbi.register_ipv4],
        nf_services,
        smf_info,
    }
}
