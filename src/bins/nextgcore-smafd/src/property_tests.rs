//! Property-based tests for session lifecycle bookkeeping

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use ogs_pfcp::prelude::PfcpCause;
use proptest::prelude::*;
use tokio::sync::broadcast;

use crate::context::tests::test_context;
use crate::context::{Collaborators, SessionHandle, SmContextRegistry, SmafContext};
use crate::gsm_handler::tests::establishment_request;
use crate::models::{SmContextCreateData, SmContextCreateRequest, SmContextReleaseRequest};
use crate::nsmf_handler::{handle_pdu_session_sm_context_create, handle_pdu_session_sm_context_release};
use crate::pfcp_path::mock::{MockTransport, NodeBehavior};
use crate::sm_context::{SmContext, SmContextState};

const AN: Ipv4Addr = Ipv4Addr::new(10, 200, 200, 101);
const GW: Ipv4Addr = Ipv4Addr::new(10, 200, 200, 102);

fn node_behavior() -> impl Strategy<Value = NodeBehavior> {
    prop_oneof![
        3 => Just(NodeBehavior::Accept),
        1 => Just(NodeBehavior::Reject(PfcpCause::NoResourcesAvailable)),
        1 => Just(NodeBehavior::Unreachable),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn context_with(transport: Arc<MockTransport>) -> SmafContext {
    test_context(move |config| Collaborators {
        transport,
        ..Collaborators::standalone(config)
    })
}

fn create_request(supi: String, psi: u8) -> SmContextCreateRequest {
    SmContextCreateRequest {
        json_data: SmContextCreateData {
            supi,
            pdu_session_id: psi,
            dnn: "internet".to_string(),
            ..Default::default()
        },
        binary_data_n1_sm_message: establishment_request(psi, 1),
    }
}

/// Every identifier pool the sessions draw from is back to empty
fn assert_nothing_held(ctx: &SmafContext) -> Result<(), TestCaseError> {
    prop_assert!(ctx.registry.is_empty());
    prop_assert_eq!(ctx.ue_pool.in_use(), 0);
    prop_assert_eq!(ctx.seids.in_use(), 0);
    prop_assert_eq!(ctx.engine.inflight_count(), 0);
    for name in ["AN", "GW"] {
        let node = ctx.topology.resolve_node(name).unwrap();
        prop_assert_eq!(ctx.topology.teids_in_use(node), 0);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum RegistryOp {
    Insert { psi: u8 },
    Remove { pick: usize },
}

fn registry_op() -> impl Strategy<Value = RegistryOp> {
    prop_oneof![
        (1u8..4).prop_map(|psi| RegistryOp::Insert { psi }),
        any::<usize>().prop_map(|pick| RegistryOp::Remove { pick }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// A create either registers a fully synchronized session or leaves
    /// no trace in any pool
    #[test]
    fn prop_create_is_all_or_nothing(an in node_behavior(), gw in node_behavior()) {
        runtime().block_on(async {
            let transport = MockTransport::new();
            transport.set(AN, an);
            transport.set(GW, gw);
            let ctx = context_with(transport.clone());
            let mut events = ctx.subscribe();

            let response = handle_pdu_session_sm_context_create(
                &ctx,
                create_request("imsi-208930000000003".to_string(), 5),
            )
            .await;

            // Nodes are awaited exactly while synchronizing
            while let Ok(change) = events.try_recv() {
                prop_assert_eq!(change.pending.is_empty(), change.to != SmContextState::PfcpSynchronizing);
            }

            let all_accept = an == NodeBehavior::Accept && gw == NodeBehavior::Accept;
            prop_assert_eq!(response.status == 201, all_accept);
            if all_accept {
                prop_assert_eq!(ctx.registry.len(), 1);
                prop_assert_eq!(ctx.ue_pool.in_use(), 1);
                prop_assert_eq!(ctx.seids.in_use(), 2);
            } else {
                prop_assert_eq!(response.status, 500);
                prop_assert!(response.n1_sm_message.is_some());
                assert_nothing_held(&ctx)?;
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Releasing every session, in any order, returns every identifier
    #[test]
    fn prop_release_in_any_order_frees_everything(
        order in (1usize..5).prop_flat_map(|count| Just((0..count).collect::<Vec<_>>()).prop_shuffle()),
    ) {
        runtime().block_on(async {
            let ctx = context_with(MockTransport::new());

            let mut refs = Vec::new();
            for i in 0..order.len() {
                let supi = format!("imsi-20893000000{:04}", i);
                let response = handle_pdu_session_sm_context_create(&ctx, create_request(supi, 1)).await;
                prop_assert_eq!(response.status, 201);
                refs.push(response.location.unwrap());
            }
            prop_assert_eq!(ctx.ue_pool.in_use(), order.len());

            for &i in &order {
                let response = handle_pdu_session_sm_context_release(
                    &ctx,
                    &refs[i],
                    SmContextReleaseRequest::default(),
                )
                .await;
                prop_assert_eq!(response.status, 204);
            }
            assert_nothing_held(&ctx)?;
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// The session index always names the newest live context inserted
    /// for a PDU session id, or nothing once that context is gone
    #[test]
    fn prop_registry_index(ops in prop::collection::vec(registry_op(), 1..30)) {
        let (events, _) = broadcast::channel(16);
        let registry = SmContextRegistry::new();
        let mut live: Vec<String> = Vec::new();
        let mut index: HashMap<u8, String> = HashMap::new();
        let mut psi_of: HashMap<String, u8> = HashMap::new();

        for (n, op) in ops.into_iter().enumerate() {
            match op {
                RegistryOp::Insert { psi } => {
                    let sm_context_ref = format!("urn:uuid:{}", n);
                    let data = SmContextCreateData {
                        supi: "imsi-1".to_string(),
                        pdu_session_id: psi,
                        ..Default::default()
                    };
                    let sm = SmContext::new(&sm_context_ref, &data, events.clone()).unwrap();
                    registry.insert(Arc::new(SessionHandle::new(sm)));
                    index.insert(psi, sm_context_ref.clone());
                    psi_of.insert(sm_context_ref.clone(), psi);
                    live.push(sm_context_ref);
                }
                RegistryOp::Remove { pick } => {
                    if live.is_empty() {
                        continue;
                    }
                    let sm_context_ref = live.remove(pick % live.len());
                    prop_assert!(registry.remove(&sm_context_ref).is_some());
                    let psi = psi_of[&sm_context_ref];
                    if index.get(&psi) == Some(&sm_context_ref) {
                        index.remove(&psi);
                    }
                }
            }

            prop_assert_eq!(registry.len(), live.len());
            for psi in 1u8..4 {
                let found = registry.find_by_session("imsi-1", psi).map(|h| h.sm_context_ref.clone());
                prop_assert_eq!(found, index.get(&psi).cloned());
            }
        }
    }
}
