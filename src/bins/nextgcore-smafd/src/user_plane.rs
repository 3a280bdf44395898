//! User Plane Topology
//!
//! Static graph of access-network and UPF nodes built once from
//! `userplane_information`. Read-only after startup apart from the per-UPF
//! TEID pools, which lock internally.
//!
//! Data paths only contain UPF nodes. A UPF linked to an AN node is an
//! access-side anchor; when no AN is declared every UPF qualifies.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;

use ogs_core::{IdGenerator, PoolError};
use thiserror::Error;

use crate::config::{UeRoutingConfig, UserPlaneInformation};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("Unknown user plane node: {0}")]
    UnknownNode(String),

    #[error("No user plane path serves DNN {0}")]
    NoPathForDnn(String),

    #[error("Node {name} has invalid type {value}")]
    InvalidNodeType { name: String, value: String },

    #[error("Node {name} has invalid address {addr}")]
    InvalidNodeAddress { name: String, addr: String },

    #[error("Node {0} has no links")]
    IsolatedNode(String),

    #[error("DNN {dnn} has two default anchors: {first} and {second}")]
    DuplicateDefaultAnchor {
        dnn: String,
        first: String,
        second: String,
    },

    #[error("Node {0} is not a forwarding node")]
    NotForwardingNode(String),

    #[error("TEID pool of {0} exhausted")]
    TeidExhausted(String),

    #[error("Empty path")]
    EmptyPath,

    #[error(transparent)]
    Pool(#[from] PoolError),
}

pub type TopologyResult<T> = Result<T, TopologyError>;

/// Index of a node inside the topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(usize);

impl NodeRef {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpNodeType {
    An,
    Upf,
}

impl UpNodeType {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "AN" => Some(Self::An),
            "UPF" => Some(Self::Upf),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::An => "AN",
            Self::Upf => "UPF",
        }
    }
}

#[derive(Debug)]
pub struct UpNode {
    pub name: String,
    pub node_type: UpNodeType,
    /// PFCP node id for a UPF, N3 address for an AN
    pub addr: Ipv4Addr,
    pub dnns: Vec<String>,
    pub default_dnns: Vec<String>,
    neighbors: Vec<NodeRef>,
    teid_pool: Option<IdGenerator>,
}

impl UpNode {
    pub fn is_upf(&self) -> bool {
        self.node_type == UpNodeType::Upf
    }

    pub fn serves(&self, dnn: &str) -> bool {
        self.is_upf() && (self.dnns.iter().any(|d| d == dnn) || self.is_default_anchor_for(dnn))
    }

    pub fn is_default_anchor_for(&self, dnn: &str) -> bool {
        self.default_dnns.iter().any(|d| d == dnn)
    }

    pub fn neighbors(&self) -> &[NodeRef] {
        &self.neighbors
    }
}

#[derive(Debug)]
pub struct UserPlaneTopology {
    nodes: Vec<UpNode>,
    by_name: HashMap<String, NodeRef>,
    default_paths: BTreeMap<String, Vec<NodeRef>>,
}

impl UserPlaneTopology {
    pub fn from_config(info: &UserPlaneInformation) -> TopologyResult<Self> {
        let mut nodes = Vec::with_capacity(info.up_nodes.len());
        let mut by_name = HashMap::new();

        for (name, cfg) in &info.up_nodes {
            let node_type =
                UpNodeType::parse(&cfg.node_type).ok_or_else(|| TopologyError::InvalidNodeType {
                    name: name.clone(),
                    value: cfg.node_type.clone(),
                })?;
            let raw = match node_type {
                UpNodeType::An => &cfg.an_ip,
                UpNodeType::Upf => &cfg.node_id,
            };
            let addr = if raw.is_empty() && node_type == UpNodeType::An {
                Ipv4Addr::UNSPECIFIED
            } else {
                raw.parse().map_err(|_| TopologyError::InvalidNodeAddress {
                    name: name.clone(),
                    addr: raw.clone(),
                })?
            };
            let teid_pool = match node_type {
                UpNodeType::Upf => Some(IdGenerator::new(
                    &format!("{} TEID", name),
                    1,
                    i64::from(u32::MAX),
                )?),
                UpNodeType::An => None,
            };

            by_name.insert(name.clone(), NodeRef(nodes.len()));
            nodes.push(UpNode {
                name: name.clone(),
                node_type,
                addr,
                dnns: cfg.dnn_list.clone(),
                default_dnns: cfg.default_dnn.clone(),
                neighbors: Vec::new(),
                teid_pool,
            });
        }

        for link in &info.links {
            let a = *by_name
                .get(&link.a)
                .ok_or_else(|| TopologyError::UnknownNode(link.a.clone()))?;
            let b = *by_name
                .get(&link.b)
                .ok_or_else(|| TopologyError::UnknownNode(link.b.clone()))?;
            if a != b && !nodes[a.0].neighbors.contains(&b) {
                nodes[a.0].neighbors.push(b);
                nodes[b.0].neighbors.push(a);
            }
        }

        if nodes.len() > 1 {
            if let Some(isolated) = nodes.iter().find(|n| n.neighbors.is_empty()) {
                return Err(TopologyError::IsolatedNode(isolated.name.clone()));
            }
        }

        let mut anchors: BTreeMap<&str, &str> = BTreeMap::new();
        for node in nodes.iter().filter(|n| n.is_upf()) {
            for dnn in &node.default_dnns {
                if let Some(first) = anchors.insert(dnn, &node.name) {
                    return Err(TopologyError::DuplicateDefaultAnchor {
                        dnn: dnn.clone(),
                        first: first.to_string(),
                        second: node.name.clone(),
                    });
                }
            }
        }

        let mut topology = Self {
            nodes,
            by_name,
            default_paths: BTreeMap::new(),
        };

        let dnns: BTreeSet<String> = topology
            .nodes
            .iter()
            .filter(|n| n.is_upf())
            .flat_map(|n| n.dnns.iter().chain(n.default_dnns.iter()).cloned())
            .collect();
        let mut default_paths = BTreeMap::new();
        for dnn in dnns {
            let paths = topology.paths_for(&dnn);
            match topology.select_default_path(&dnn, paths) {
                Some(path) => {
                    log::info!("Default path for DNN[{}]: {}", dnn, topology.describe(&path));
                    default_paths.insert(dnn, path);
                }
                None => log::warn!("No access-side path reaches DNN[{}]", dnn),
            }
        }
        topology.default_paths = default_paths;

        Ok(topology)
    }

    pub fn node(&self, node: NodeRef) -> &UpNode {
        &self.nodes[node.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn resolve_node(&self, name: &str) -> TopologyResult<NodeRef> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| TopologyError::UnknownNode(name.to_string()))
    }

    /// UPF with the given PFCP node id
    pub fn node_by_addr(&self, addr: Ipv4Addr) -> Option<NodeRef> {
        self.nodes
            .iter()
            .position(|n| n.is_upf() && n.addr == addr)
            .map(NodeRef)
    }

    fn access_nodes(&self) -> Vec<NodeRef> {
        let has_an = self.nodes.iter().any(|n| n.node_type == UpNodeType::An);
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| {
                n.is_upf()
                    && (!has_an
                        || n.neighbors
                            .iter()
                            .any(|r| self.nodes[r.0].node_type == UpNodeType::An))
            })
            .map(|(i, _)| NodeRef(i))
            .collect()
    }

    /// Every simple UPF path from an access-side anchor to a UPF serving `dnn`
    pub fn paths_for(&self, dnn: &str) -> Vec<Vec<NodeRef>> {
        let mut paths = Vec::new();
        for start in self.access_nodes() {
            let mut current = vec![start];
            self.walk(dnn, &mut current, &mut paths);
        }
        paths
    }

    fn walk(&self, dnn: &str, current: &mut Vec<NodeRef>, paths: &mut Vec<Vec<NodeRef>>) {
        let Some(&last) = current.last() else {
            return;
        };
        if self.nodes[last.0].serves(dnn) {
            paths.push(current.clone());
        }
        for &next in &self.nodes[last.0].neighbors {
            if self.nodes[next.0].is_upf() && !current.contains(&next) {
                current.push(next);
                self.walk(dnn, current, paths);
                current.pop();
            }
        }
    }

    /// Default anchor first, then shortest, then smallest name sequence
    fn select_default_path(&self, dnn: &str, paths: Vec<Vec<NodeRef>>) -> Option<Vec<NodeRef>> {
        paths
            .into_iter()
            .min_by(|a, b| self.path_key(dnn, a).cmp(&self.path_key(dnn, b)))
    }

    fn path_key(&self, dnn: &str, path: &[NodeRef]) -> (bool, usize, Vec<&str>) {
        let anchored = path
            .last()
            .is_some_and(|r| self.nodes[r.0].is_default_anchor_for(dnn));
        let names = path.iter().map(|r| self.nodes[r.0].name.as_str()).collect();
        (!anchored, path.len(), names)
    }

    pub fn default_path_for(&self, dnn: &str) -> TopologyResult<Vec<NodeRef>> {
        self.default_paths
            .get(dnn)
            .cloned()
            .ok_or_else(|| TopologyError::NoPathForDnn(dnn.to_string()))
    }

    /// Resolve a named UPF chain from the routing configuration
    pub fn resolve_chain(&self, names: &[String]) -> TopologyResult<Vec<NodeRef>> {
        if names.is_empty() {
            return Err(TopologyError::EmptyPath);
        }
        names
            .iter()
            .map(|name| {
                let node = self.resolve_node(name)?;
                if !self.nodes[node.0].is_upf() {
                    return Err(TopologyError::NotForwardingNode(name.clone()));
                }
                Ok(node)
            })
            .collect()
    }

    pub fn allocate_teid(&self, node: NodeRef) -> TopologyResult<u32> {
        let up_node = self.node(node);
        let pool = up_node
            .teid_pool
            .as_ref()
            .ok_or_else(|| TopologyError::NotForwardingNode(up_node.name.clone()))?;
        match pool.allocate() {
            Ok(teid) => {
                u32::try_from(teid).map_err(|_| TopologyError::TeidExhausted(up_node.name.clone()))
            }
            Err(PoolError::Exhausted { .. }) => Err(TopologyError::TeidExhausted(up_node.name.clone())),
            Err(e) => Err(e.into()),
        }
    }

    pub fn free_teid(&self, node: NodeRef, teid: u32) {
        if let Some(pool) = self.node(node).teid_pool.as_ref() {
            pool.free(i64::from(teid));
        }
    }

    pub fn teids_in_use(&self, node: NodeRef) -> usize {
        self.node(node).teid_pool.as_ref().map_or(0, |pool| pool.in_use())
    }

    pub fn describe(&self, path: &[NodeRef]) -> String {
        path.iter()
            .map(|r| self.nodes[r.0].name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

// ============================================================================
// Pre-configured UE routes
// ============================================================================

/// Off-path target of an alternate branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub ip: String,
    pub port: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreconfiguredPath {
    pub nodes: Vec<NodeRef>,
    pub destination: Option<Destination>,
}

/// Per-SUPI routes; the first path of a subscriber is its default path
#[derive(Debug, Default)]
pub struct UeRoutingTable {
    routes: HashMap<String, Vec<PreconfiguredPath>>,
}

impl UeRoutingTable {
    /// A path naming an unknown node is logged and skipped
    pub fn build(config: &UeRoutingConfig, topology: &UserPlaneTopology) -> Self {
        let mut routes = HashMap::new();

        for info in &config.ue_routing_info {
            let mut paths = Vec::new();
            for (index, path) in info.path_list.iter().enumerate() {
                match topology.resolve_chain(&path.upf) {
                    Ok(nodes) => {
                        let destination = (!path.destination_ip.is_empty()).then(|| Destination {
                            ip: path.destination_ip.clone(),
                            port: path.destination_port.clone(),
                        });
                        paths.push(PreconfiguredPath { nodes, destination });
                    }
                    Err(e) => {
                        log::warn!("[{}] Skipping pre-configured path #{}: {}", info.supi, index, e);
                    }
                }
            }
            if !paths.is_empty() {
                log::debug!("[{}] {} pre-configured path(s)", info.supi, paths.len());
                routes.insert(info.supi.clone(), paths);
            }
        }

        Self { routes }
    }

    pub fn paths_for(&self, supi: &str) -> Option<&[PreconfiguredPath]> {
        self.routes.get(supi).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{RoutePathConfig, UeRoutingInfo, UpLinkConfig, UpNodeConfig};

    pub(crate) fn upf(addr: &str, dnns: &[&str], default_dnns: &[&str]) -> UpNodeConfig {
        UpNodeConfig {
            node_type: "UPF".to_string(),
            node_id: addr.to_string(),
            an_ip: String::new(),
            dnn_list: dnns.iter().map(|d| d.to_string()).collect(),
            default_dnn: default_dnns.iter().map(|d| d.to_string()).collect(),
        }
    }

    pub(crate) fn an(addr: &str) -> UpNodeConfig {
        UpNodeConfig {
            node_type: "AN".to_string(),
            an_ip: addr.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn link(a: &str, b: &str) -> UpLinkConfig {
        UpLinkConfig {
            a: a.to_string(),
            b: b.to_string(),
        }
    }

    /// gNB1 - AN - GW(internet)
    pub(crate) fn two_hop_info() -> UserPlaneInformation {
        let mut info = UserPlaneInformation::default();
        info.up_nodes.insert("gNB1".into(), an("192.168.179.100"));
        info.up_nodes.insert("AN".into(), upf("10.200.200.101", &[], &[]));
        info.up_nodes.insert("GW".into(), upf("10.200.200.102", &["internet"], &["internet"]));
        info.links = vec![link("gNB1", "AN"), link("AN", "GW")];
        info
    }

    fn names(topology: &UserPlaneTopology, path: &[NodeRef]) -> Vec<String> {
        path.iter().map(|r| topology.node(*r).name.clone()).collect()
    }

    #[test]
    fn test_default_path_two_hop() {
        let topology = UserPlaneTopology::from_config(&two_hop_info()).unwrap();
        let path = topology.default_path_for("internet").unwrap();
        assert_eq!(names(&topology, &path), vec!["AN", "GW"]);
        assert_eq!(topology.describe(&path), "AN -> GW");
    }

    #[test]
    fn test_no_path_for_unknown_dnn() {
        let topology = UserPlaneTopology::from_config(&two_hop_info()).unwrap();
        assert_eq!(
            topology.default_path_for("ims"),
            Err(TopologyError::NoPathForDnn("ims".to_string()))
        );
    }

    #[test]
    fn test_default_anchor_preferred_over_shorter() {
        // gNB1 - AN(internet) - GW(internet, default)
        let mut info = two_hop_info();
        info.up_nodes.insert("AN".into(), upf("10.200.200.101", &["internet"], &[]));
        let topology = UserPlaneTopology::from_config(&info).unwrap();

        assert_eq!(topology.paths_for("internet").len(), 2);
        let path = topology.default_path_for("internet").unwrap();
        assert_eq!(names(&topology, &path), vec!["AN", "GW"]);
    }

    #[test]
    fn test_shortest_then_lexicographic() {
        // gNB1 - AN - {B1, A1} both serving internet, no default anchor
        let mut info = UserPlaneInformation::default();
        info.up_nodes.insert("gNB1".into(), an("192.168.179.100"));
        info.up_nodes.insert("AN".into(), upf("10.0.0.1", &[], &[]));
        info.up_nodes.insert("B1".into(), upf("10.0.0.3", &["internet"], &[]));
        info.up_nodes.insert("A1".into(), upf("10.0.0.2", &["internet"], &[]));
        info.links = vec![link("gNB1", "AN"), link("AN", "B1"), link("AN", "A1")];

        let topology = UserPlaneTopology::from_config(&info).unwrap();
        let path = topology.default_path_for("internet").unwrap();
        assert_eq!(names(&topology, &path), vec!["AN", "A1"]);

        // Same configuration twice yields the same default
        let again = UserPlaneTopology::from_config(&info).unwrap();
        assert_eq!(again.default_path_for("internet").unwrap(), path);
    }

    #[test]
    fn test_without_an_every_upf_is_a_start() {
        let mut info = UserPlaneInformation::default();
        info.up_nodes.insert("GW".into(), upf("10.0.0.1", &["internet"], &[]));
        let topology = UserPlaneTopology::from_config(&info).unwrap();
        let path = topology.default_path_for("internet").unwrap();
        assert_eq!(names(&topology, &path), vec!["GW"]);
    }

    #[test]
    fn test_configuration_errors() {
        let mut info = two_hop_info();
        info.links.push(link("AN", "NOPE"));
        assert_eq!(
            UserPlaneTopology::from_config(&info).unwrap_err(),
            TopologyError::UnknownNode("NOPE".to_string())
        );

        let mut info = two_hop_info();
        info.up_nodes.insert("LONELY".into(), upf("10.0.0.9", &[], &[]));
        assert_eq!(
            UserPlaneTopology::from_config(&info).unwrap_err(),
            TopologyError::IsolatedNode("LONELY".to_string())
        );

        let mut info = two_hop_info();
        info.up_nodes.insert("AN".into(), upf("10.0.0.1", &[], &["internet"]));
        assert!(matches!(
            UserPlaneTopology::from_config(&info),
            Err(TopologyError::DuplicateDefaultAnchor { .. })
        ));

        let mut info = two_hop_info();
        info.up_nodes.insert("GW".into(), upf("not-an-ip", &["internet"], &[]));
        assert!(matches!(
            UserPlaneTopology::from_config(&info),
            Err(TopologyError::InvalidNodeAddress { .. })
        ));
    }

    #[test]
    fn test_node_lookup() {
        let topology = UserPlaneTopology::from_config(&two_hop_info()).unwrap();
        let gw = topology.resolve_node("GW").unwrap();
        assert_eq!(topology.node_by_addr("10.200.200.102".parse().unwrap()), Some(gw));
        assert_eq!(topology.node_by_addr("192.168.179.100".parse().unwrap()), None);
        assert!(topology.resolve_node("nope").is_err());
    }

    #[test]
    fn test_teid_allocation() {
        let topology = UserPlaneTopology::from_config(&two_hop_info()).unwrap();
        let gw = topology.resolve_node("GW").unwrap();
        let t1 = topology.allocate_teid(gw).unwrap();
        let t2 = topology.allocate_teid(gw).unwrap();
        assert_ne!(t1, t2);
        assert_eq!(topology.teids_in_use(gw), 2);
        topology.free_teid(gw, t1);
        assert_eq!(topology.teids_in_use(gw), 1);

        let gnb = topology.resolve_node("gNB1").unwrap();
        assert!(matches!(
            topology.allocate_teid(gnb),
            Err(TopologyError::NotForwardingNode(_))
        ));
    }

    #[test]
    fn test_ue_routing_skips_bad_entry() {
        let topology = UserPlaneTopology::from_config(&two_hop_info()).unwrap();
        let config = UeRoutingConfig {
            info: Default::default(),
            ue_routing_info: vec![
                UeRoutingInfo {
                    supi: "imsi-1".into(),
                    path_list: vec![
                        RoutePathConfig {
                            destination_ip: String::new(),
                            destination_port: String::new(),
                            upf: vec!["AN".into(), "GW".into()],
                        },
                        RoutePathConfig {
                            destination_ip: "60.60.0.101".into(),
                            destination_port: "8080".into(),
                            upf: vec!["AN".into(), "MISSING".into()],
                        },
                    ],
                },
                UeRoutingInfo {
                    supi: "imsi-2".into(),
                    path_list: vec![RoutePathConfig {
                        upf: vec!["gNB1".into()],
                        ..Default::default()
                    }],
                },
            ],
        };

        let table = UeRoutingTable::build(&config, &topology);
        assert_eq!(table.len(), 1);
        let paths = table.paths_for("imsi-1").unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].destination, None);
        assert!(table.paths_for("imsi-2").is_none());
    }
}
