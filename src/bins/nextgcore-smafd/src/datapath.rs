//! Data Paths
//!
//! A [`DataPath`] is an arena of [`DataPathNode`]s linked through explicit
//! `prev`/`next` indices, from the access-side UPF (first) to the anchor
//! UPF (last). Each node carries an uplink and a downlink
//! [`TunnelEndpoint`]; each endpoint owns at most one PDR.
//!
//! Rule geometry per node `i`:
//!
//! | | PDR | FAR |
//! |---|---|---|
//! | UL | Access, local UL TEID, remove GTP-U | Core towards node `i+1` UL TEID, or N6 at the anchor |
//! | DL | Core, local DL TEID (UE IP at the anchor) | Access towards node `i-1` DL TEID, or the AN tunnel at the first node |
//!
//! The first node's DL FAR buffers (with a BAR) until the AN tunnel is known.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use ogs_core::IdGenerator;
use ogs_pfcp::prelude::*;

use crate::error::{SmafError, SmafResult};
use crate::tunnel::{RuleIds, TunnelEndpoint};
use crate::user_plane::{Destination, NodeRef, UserPlaneTopology};

// ============================================================================
// Data path node
// ============================================================================

#[derive(Debug, Clone)]
pub struct DataPathNode {
    /// Back-reference into the topology
    pub node: NodeRef,
    pub addr: Ipv4Addr,
    pub prev: Option<usize>,
    pub next: Option<usize>,
    pub uplink: TunnelEndpoint,
    pub downlink: TunnelEndpoint,
}

impl DataPathNode {
    pub fn is_activated(&self) -> bool {
        self.uplink.pdr.is_some() && self.downlink.pdr.is_some()
    }

    pub fn pdrs(&self) -> impl Iterator<Item = &Pdr> {
        self.uplink.pdr.iter().chain(self.downlink.pdr.iter())
    }

    fn endpoints_mut(&mut self) -> [&mut TunnelEndpoint; 2] {
        [&mut self.uplink, &mut self.downlink]
    }
}

/// Inputs of [`DataPath::activate`]
pub struct Activation<'a> {
    pub topology: &'a UserPlaneTopology,
    pub rule_ids: &'a RuleIds,
    pub ue_ip: Ipv4Addr,
    pub dnn: &'a str,
    /// Downlink tunnel of the access network, once known
    pub an_tunnel: Option<FTeid>,
}

// ============================================================================
// Data path
// ============================================================================

#[derive(Debug, Clone)]
pub struct DataPath {
    pub id: i64,
    pub is_default: bool,
    pub activated: bool,
    pub destination: Option<Destination>,
    nodes: Vec<DataPathNode>,
    first: Option<usize>,
}

impl DataPath {
    fn build(id: i64, chain: &[NodeRef], topology: &UserPlaneTopology) -> Self {
        let last = chain.len().saturating_sub(1);
        let nodes = chain
            .iter()
            .enumerate()
            .map(|(i, &node)| DataPathNode {
                node,
                addr: topology.node(node).addr,
                prev: i.checked_sub(1),
                next: (i < last).then_some(i + 1),
                uplink: TunnelEndpoint::default(),
                downlink: TunnelEndpoint::default(),
            })
            .collect::<Vec<_>>();
        let first = (!nodes.is_empty()).then_some(0);

        Self {
            id,
            is_default: false,
            activated: false,
            destination: None,
            nodes,
            first,
        }
    }

    /// Node indices from the access side to the anchor
    pub fn indices(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut cursor = self.first;
        while let Some(i) = cursor {
            order.push(i);
            cursor = self.nodes[i].next;
        }
        order
    }

    pub fn node(&self, index: usize) -> Option<&DataPathNode> {
        self.nodes.get(index)
    }

    pub fn first_node(&self) -> Option<&DataPathNode> {
        self.first.map(|i| &self.nodes[i])
    }

    pub fn first_node_mut(&mut self) -> Option<&mut DataPathNode> {
        self.first.map(move |i| &mut self.nodes[i])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DataPathNode> {
        self.indices().into_iter().map(move |i| &self.nodes[i])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    fn uplink_teid(&self, index: usize) -> SmafResult<u32> {
        self.nodes[index]
            .uplink
            .teid
            .ok_or_else(|| SmafError::Configuration(format!("path {} node {} has no UL TEID", self.id, index)))
    }

    fn downlink_teid(&self, index: usize) -> SmafResult<u32> {
        self.nodes[index]
            .downlink
            .teid
            .ok_or_else(|| SmafError::Configuration(format!("path {} node {} has no DL TEID", self.id, index)))
    }

    /// Install rules on every node not yet activated.
    ///
    /// Returns the addresses of the nodes touched for the first time. On
    /// error every TEID and rule id allocated by this call is returned.
    pub fn activate(&mut self, act: &Activation<'_>) -> SmafResult<Vec<Ipv4Addr>> {
        if self.activated {
            return Ok(Vec::new());
        }
        let pending: Vec<usize> = self
            .indices()
            .into_iter()
            .filter(|&i| !self.nodes[i].is_activated())
            .collect();

        if let Err(e) = self
            .allocate_teids(&pending, act)
            .and_then(|()| self.install_rules(&pending, act))
        {
            self.rollback(&pending, act.rule_ids, act.topology);
            return Err(e);
        }

        self.activated = true;
        Ok(pending.iter().map(|&i| self.nodes[i].addr).collect())
    }

    fn allocate_teids(&mut self, pending: &[usize], act: &Activation<'_>) -> SmafResult<()> {
        for &i in pending {
            let node = self.nodes[i].node;
            if self.nodes[i].uplink.teid.is_none() {
                self.nodes[i].uplink.teid = Some(act.topology.allocate_teid(node)?);
            }
            // The anchor matches downlink traffic on the UE address
            if self.nodes[i].next.is_some() && self.nodes[i].downlink.teid.is_none() {
                self.nodes[i].downlink.teid = Some(act.topology.allocate_teid(node)?);
            }
        }
        Ok(())
    }

    fn install_rules(&mut self, pending: &[usize], act: &Activation<'_>) -> SmafResult<()> {
        for &i in pending {
            let addr = self.nodes[i].addr;

            // Uplink
            let mut pdi = Pdi::new(SourceInterface::Access);
            pdi.local_f_teid = Some(FTeid::new(self.uplink_teid(i)?, addr));
            pdi.network_instance = Some(act.dnn.to_string());
            let forwarding = match self.nodes[i].next {
                Some(next) => ForwardingParameters::new(DestinationInterface::Core).with_outer_header(
                    OuterHeaderCreation::gtpu_ipv4(self.uplink_teid(next)?, self.nodes[next].addr),
                ),
                None => ForwardingParameters::new(DestinationInterface::SgiLanN6Lan)
                    .with_network_instance(act.dnn),
            };
            let mut ul_pdr = act
                .rule_ids
                .new_pdr(pdi, ApplyAction::forward(), Some(forwarding))?;
            ul_pdr.outer_header_removal = Some(OuterHeaderRemoval::GtpUUdpIpv4);
            self.nodes[i].uplink.pdr = Some(ul_pdr);

            // Downlink
            let mut pdi = Pdi::new(SourceInterface::Core);
            pdi.network_instance = Some(act.dnn.to_string());
            let is_anchor = self.nodes[i].next.is_none();
            if is_anchor {
                pdi.ue_ip_address = Some(UeIpAddress {
                    ipv4: act.ue_ip,
                    is_destination: true,
                });
            } else {
                pdi.local_f_teid = Some(FTeid::new(self.downlink_teid(i)?, addr));
            }
            let (apply_action, forwarding) = match (self.nodes[i].prev, act.an_tunnel) {
                (Some(prev), _) => (
                    ApplyAction::forward(),
                    Some(
                        ForwardingParameters::new(DestinationInterface::Access).with_outer_header(
                            OuterHeaderCreation::gtpu_ipv4(self.downlink_teid(prev)?, self.nodes[prev].addr),
                        ),
                    ),
                ),
                (None, Some(an)) => (ApplyAction::forward(), Some(access_forwarding(act.dnn, an))),
                (None, None) => (ApplyAction::buffer_and_notify(), None),
            };
            let mut dl_pdr = act.rule_ids.new_pdr(pdi, apply_action, forwarding)?;
            if !is_anchor {
                dl_pdr.outer_header_removal = Some(OuterHeaderRemoval::GtpUUdpIpv4);
            }
            self.nodes[i].downlink.pdr = Some(dl_pdr);

            log::debug!(
                "[Added] path {} node {} UL PDR {} DL PDR {}",
                self.id,
                addr,
                self.nodes[i].uplink.pdr.as_ref().map_or(0, |p| p.pdr_id),
                self.nodes[i].downlink.pdr.as_ref().map_or(0, |p| p.pdr_id),
            );
        }
        Ok(())
    }

    fn rollback(&mut self, pending: &[usize], rule_ids: &RuleIds, topology: &UserPlaneTopology) {
        for &i in pending {
            let node = self.nodes[i].node;
            for endpoint in self.nodes[i].endpoints_mut() {
                release_endpoint(endpoint, node, rule_ids, topology);
            }
        }
    }

    /// Tag every rule on the chain for removal
    pub fn deactivate(&mut self) {
        for node in &mut self.nodes {
            for endpoint in node.endpoints_mut() {
                if let Some(pdr) = endpoint.pdr.as_mut() {
                    pdr.mark_remove();
                }
            }
        }
        self.activated = false;
    }

    /// Apply a confirmed synchronization of `addr`
    fn commit_node(&mut self, addr: Ipv4Addr, rule_ids: &RuleIds, topology: &UserPlaneTopology) {
        for node in self.nodes.iter_mut().filter(|n| n.addr == addr) {
            let node_ref = node.node;
            for endpoint in node.endpoints_mut() {
                let Some(pdr) = endpoint.pdr.as_mut() else {
                    continue;
                };
                let bar_id = pdr.far.bar.as_ref().map(|bar| bar.bar_id);
                let kept = pdr.confirm();
                // A removed BAR is dropped by confirm() itself
                if let (Some(bar_id), None) = (bar_id, pdr.far.bar.as_ref()) {
                    rule_ids.free_bar(bar_id);
                }
                if !kept {
                    release_endpoint(endpoint, node_ref, rule_ids, topology);
                }
            }
        }
    }

    /// Drop every rule and TEID the path holds on `addr`
    fn release_node(&mut self, addr: Ipv4Addr, rule_ids: &RuleIds, topology: &UserPlaneTopology) {
        for node in self.nodes.iter_mut().filter(|n| n.addr == addr) {
            let node_ref = node.node;
            for endpoint in node.endpoints_mut() {
                release_endpoint(endpoint, node_ref, rule_ids, topology);
            }
        }
    }
}

fn release_endpoint(
    endpoint: &mut TunnelEndpoint,
    node: NodeRef,
    rule_ids: &RuleIds,
    topology: &UserPlaneTopology,
) {
    if let Some(pdr) = endpoint.pdr.take() {
        rule_ids.release(&pdr);
    }
    if let Some(teid) = endpoint.teid.take() {
        topology.free_teid(node, teid);
    }
}

/// Forwarding towards the access network tunnel
pub fn access_forwarding(dnn: &str, an_tunnel: FTeid) -> ForwardingParameters {
    ForwardingParameters::new(DestinationInterface::Access)
        .with_network_instance(dnn)
        .with_outer_header(OuterHeaderCreation::gtpu_ipv4(an_tunnel.teid, an_tunnel.ipv4))
}

// ============================================================================
// Data path pool
// ============================================================================

/// The data paths of one session. The first path added is the default.
#[derive(Debug)]
pub struct DataPathPool {
    paths: BTreeMap<i64, DataPath>,
    path_ids: IdGenerator,
}

impl DataPathPool {
    pub fn new() -> SmafResult<Self> {
        Ok(Self {
            paths: BTreeMap::new(),
            path_ids: IdGenerator::new("Path", 1, i64::from(u8::MAX))?,
        })
    }

    /// Build a path over `chain` with empty tunnel endpoints
    pub fn build_path(
        &mut self,
        chain: &[NodeRef],
        topology: &UserPlaneTopology,
        destination: Option<Destination>,
    ) -> SmafResult<i64> {
        if chain.is_empty() {
            return Err(SmafError::Configuration("empty data path".to_string()));
        }
        let id = self.path_ids.allocate()?;
        let mut path = DataPath::build(id, chain, topology);
        path.destination = destination;
        path.is_default = self.paths.is_empty();
        log::debug!(
            "[Added] data path {} ({}){}",
            id,
            topology.describe(chain),
            if path.is_default { " default" } else { "" }
        );
        self.paths.insert(id, path);
        Ok(id)
    }

    pub fn set_default(&mut self, id: i64) -> bool {
        if !self.paths.contains_key(&id) {
            return false;
        }
        for (path_id, path) in self.paths.iter_mut() {
            path.is_default = *path_id == id;
        }
        true
    }

    pub fn default_path(&self) -> Option<&DataPath> {
        self.paths.values().find(|p| p.is_default)
    }

    pub fn get(&self, id: i64) -> Option<&DataPath> {
        self.paths.get(&id)
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut DataPath> {
        self.paths.get_mut(&id)
    }

    pub fn paths(&self) -> impl Iterator<Item = &DataPath> {
        self.paths.values()
    }

    pub fn paths_mut(&mut self) -> impl Iterator<Item = &mut DataPath> {
        self.paths.values_mut()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn default_count(&self) -> usize {
        self.paths.values().filter(|p| p.is_default).count()
    }

    pub fn deactivate_all(&mut self) {
        for path in self.paths.values_mut() {
            path.deactivate();
        }
    }

    /// Apply `f` to the first-node DL PDR of every activated path and tag
    /// both the PDR and its FAR as changed. Returns the nodes touched.
    pub fn update_access_downlink(&mut self, mut f: impl FnMut(&mut Far)) -> BTreeSet<Ipv4Addr> {
        let mut touched = BTreeSet::new();
        for path in self.paths.values_mut().filter(|p| p.activated) {
            let Some(first) = path.first_node_mut() else {
                continue;
            };
            let addr = first.addr;
            if let Some(pdr) = first.downlink.pdr.as_mut() {
                f(&mut pdr.far);
                pdr.far.touch();
                pdr.touch();
                touched.insert(addr);
            }
        }
        touched
    }

    /// Every node address holding at least one rule
    pub fn touched_nodes(&self) -> BTreeSet<Ipv4Addr> {
        self.paths
            .values()
            .flat_map(|p| p.nodes.iter())
            .filter(|n| n.pdrs().next().is_some())
            .map(|n| n.addr)
            .collect()
    }

    /// Rules on `addr` whose lifecycle tag calls for synchronization
    pub fn pending_pdrs(&self, addr: Ipv4Addr) -> Vec<&Pdr> {
        self.paths
            .values()
            .flat_map(|p| p.nodes.iter())
            .filter(|n| n.addr == addr)
            .flat_map(|n| n.pdrs())
            .filter(|pdr| pdr.needs_sync())
            .collect()
    }

    pub fn all_pdrs(&self) -> impl Iterator<Item = &Pdr> {
        self.paths
            .values()
            .flat_map(|p| p.nodes.iter())
            .flat_map(|n| n.pdrs())
    }

    pub fn commit_node(&mut self, addr: Ipv4Addr, rule_ids: &RuleIds, topology: &UserPlaneTopology) {
        for path in self.paths.values_mut() {
            path.commit_node(addr, rule_ids, topology);
        }
    }

    pub fn release_node(&mut self, addr: Ipv4Addr, rule_ids: &RuleIds, topology: &UserPlaneTopology) {
        for path in self.paths.values_mut() {
            path.release_node(addr, rule_ids, topology);
        }
    }

    pub fn release_all(&mut self, rule_ids: &RuleIds, topology: &UserPlaneTopology) {
        let nodes = self
            .paths
            .values()
            .flat_map(|p| p.nodes.iter().map(|n| n.addr))
            .collect::<BTreeSet<_>>();
        for addr in nodes {
            self.release_node(addr, rule_ids, topology);
        }
        for path in self.paths.values_mut() {
            path.activated = false;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::UserPlaneInformation;
    use crate::user_plane::tests::{an, link, two_hop_info, upf};

    pub(crate) const UE_IP: Ipv4Addr = Ipv4Addr::new(60, 60, 0, 1);

    /// gNB1 - A - B - C(internet)
    fn three_hop_info() -> UserPlaneInformation {
        let mut info = UserPlaneInformation::default();
        info.up_nodes.insert("gNB1".into(), an("192.168.179.100"));
        info.up_nodes.insert("A".into(), upf("10.0.0.1", &[], &[]));
        info.up_nodes.insert("B".into(), upf("10.0.0.2", &[], &[]));
        info.up_nodes.insert("C".into(), upf("10.0.0.3", &["internet"], &["internet"]));
        info.links = vec![link("gNB1", "A"), link("A", "B"), link("B", "C")];
        info
    }

    fn activation<'a>(topology: &'a UserPlaneTopology, ids: &'a RuleIds) -> Activation<'a> {
        Activation {
            topology,
            rule_ids: ids,
            ue_ip: UE_IP,
            dnn: "internet",
            an_tunnel: None,
        }
    }

    fn setup(info: &UserPlaneInformation) -> (UserPlaneTopology, RuleIds, DataPathPool, i64) {
        let topology = UserPlaneTopology::from_config(info).unwrap();
        let ids = RuleIds::new().unwrap();
        let mut pool = DataPathPool::new().unwrap();
        let chain = topology.default_path_for("internet").unwrap();
        let id = pool.build_path(&chain, &topology, None).unwrap();
        (topology, ids, pool, id)
    }

    #[test]
    fn test_build_links_nodes() {
        let (_, _, pool, id) = setup(&three_hop_info());
        let path = pool.get(id).unwrap();
        assert!(path.is_default);
        assert!(!path.activated);
        assert_eq!(path.indices(), vec![0, 1, 2]);
        assert_eq!(path.node(0).unwrap().prev, None);
        assert_eq!(path.node(1).unwrap().prev, Some(0));
        assert_eq!(path.node(1).unwrap().next, Some(2));
        assert_eq!(path.node(2).unwrap().next, None);
        assert!(path.nodes().all(|n| n.pdrs().next().is_none()));
    }

    #[test]
    fn test_activate_rule_geometry() {
        let (topology, ids, mut pool, id) = setup(&three_hop_info());
        let touched = pool.get_mut(id).unwrap().activate(&activation(&topology, &ids)).unwrap();
        assert_eq!(touched.len(), 3);

        let path = pool.get(id).unwrap();
        let a = path.node(0).unwrap();
        let b = path.node(1).unwrap();
        let c = path.node(2).unwrap();

        // Uplink chains towards the anchor
        let a_ul = a.uplink.pdr.as_ref().unwrap();
        let ohc = a_ul.far.forwarding_parameters.as_ref().unwrap().outer_header_creation.unwrap();
        assert_eq!(ohc.teid, b.uplink.teid.unwrap());
        assert_eq!(ohc.ipv4, b.addr);
        let c_ul = c.uplink.pdr.as_ref().unwrap();
        let fwd = c_ul.far.forwarding_parameters.as_ref().unwrap();
        assert_eq!(fwd.destination_interface, DestinationInterface::SgiLanN6Lan);
        assert_eq!(fwd.network_instance.as_deref(), Some("internet"));

        // Downlink chains towards the access network
        let c_dl = c.downlink.pdr.as_ref().unwrap();
        assert_eq!(c_dl.pdi.ue_ip_address.unwrap().ipv4, UE_IP);
        assert!(c.downlink.teid.is_none());
        let ohc = c_dl.far.forwarding_parameters.as_ref().unwrap().outer_header_creation.unwrap();
        assert_eq!(ohc.teid, b.downlink.teid.unwrap());
        let a_dl = a.downlink.pdr.as_ref().unwrap();
        assert!(a_dl.far.apply_action.buff);
        assert!(a_dl.far.bar.is_some());

        assert_eq!(ids.pdrs_in_use(), 6);
        assert_eq!(ids.bars_in_use(), 1);
        assert!(pool.all_pdrs().all(|p| p.state == RuleState::Initial));
    }

    #[test]
    fn test_activate_is_idempotent() {
        let (topology, ids, mut pool, id) = setup(&two_hop_info());
        let act = activation(&topology, &ids);
        pool.get_mut(id).unwrap().activate(&act).unwrap();
        for addr in pool.touched_nodes() {
            pool.commit_node(addr, &ids, &topology);
        }
        let before = ids.pdrs_in_use();

        let touched = pool.get_mut(id).unwrap().activate(&act).unwrap();
        assert!(touched.is_empty());
        assert_eq!(ids.pdrs_in_use(), before);
        assert!(pool.touched_nodes().iter().all(|addr| pool.pending_pdrs(*addr).is_empty()));
    }

    #[test]
    fn test_activate_deactivate_round_trip() {
        let (topology, ids, mut pool, id) = setup(&three_hop_info());
        pool.get_mut(id).unwrap().activate(&activation(&topology, &ids)).unwrap();
        for addr in pool.touched_nodes() {
            pool.commit_node(addr, &ids, &topology);
        }
        assert!(pool.all_pdrs().all(|p| p.state == RuleState::Synced));

        pool.deactivate_all();
        assert_eq!(pool.all_pdrs().filter(|p| p.state == RuleState::Synced).count(), 0);
        assert_eq!(pool.all_pdrs().filter(|p| p.is_removing()).count(), 6);
        assert!(!pool.get(id).unwrap().activated);
    }

    #[test]
    fn test_commit_removal_frees_ids() {
        let (topology, ids, mut pool, id) = setup(&two_hop_info());
        pool.get_mut(id).unwrap().activate(&activation(&topology, &ids)).unwrap();
        let gw = topology.resolve_node("GW").unwrap();
        assert_eq!(topology.teids_in_use(gw), 1);

        pool.deactivate_all();
        for addr in pool.touched_nodes() {
            pool.commit_node(addr, &ids, &topology);
        }
        assert_eq!(pool.all_pdrs().count(), 0);
        assert_eq!((ids.pdrs_in_use(), ids.fars_in_use(), ids.bars_in_use()), (0, 0, 0));
        assert_eq!(topology.teids_in_use(gw), 0);
    }

    #[test]
    fn test_activate_rolls_back_on_exhaustion() {
        let (topology, ids, mut pool, id) = setup(&three_hop_info());
        // Leave room for five PDRs only
        for _ in 0..(u16::MAX - 5) {
            ids.allocate_pdr().unwrap();
        }
        let in_use = ids.pdrs_in_use();

        let result = pool.get_mut(id).unwrap().activate(&activation(&topology, &ids));
        assert!(matches!(result, Err(SmafError::ResourceExhausted(_))));
        assert_eq!(ids.pdrs_in_use(), in_use);
        assert_eq!(ids.fars_in_use(), 0);
        let a = topology.resolve_node("A").unwrap();
        assert_eq!(topology.teids_in_use(a), 0);
        assert!(!pool.get(id).unwrap().activated);
    }

    #[test]
    fn test_update_access_downlink() {
        let (topology, ids, mut pool, id) = setup(&two_hop_info());
        pool.get_mut(id).unwrap().activate(&activation(&topology, &ids)).unwrap();
        for addr in pool.touched_nodes() {
            pool.commit_node(addr, &ids, &topology);
        }

        let an_tunnel = FTeid::new(0x100, Ipv4Addr::new(192, 168, 179, 100));
        let touched = pool.update_access_downlink(|far| {
            far.set_apply_action(ApplyAction::forward());
            far.set_forwarding_parameters(access_forwarding("internet", an_tunnel));
        });
        let access = topology.node(topology.resolve_node("AN").unwrap()).addr;
        assert_eq!(touched.into_iter().collect::<Vec<_>>(), vec![access]);

        let pending = pool.pending_pdrs(access);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].far.state, RuleState::Update);
        let gw = topology.node(topology.resolve_node("GW").unwrap()).addr;
        assert!(pool.pending_pdrs(gw).is_empty());
    }

    #[test]
    fn test_single_default_path() {
        let (topology, _, mut pool, first) = setup(&two_hop_info());
        let chain = topology.default_path_for("internet").unwrap();
        let second = pool.build_path(&chain, &topology, None).unwrap();
        assert_eq!(pool.default_count(), 1);
        assert_eq!(pool.default_path().unwrap().id, first);

        assert!(pool.set_default(second));
        assert_eq!(pool.default_count(), 1);
        assert_eq!(pool.default_path().unwrap().id, second);
        assert!(!pool.set_default(99));
    }
}
