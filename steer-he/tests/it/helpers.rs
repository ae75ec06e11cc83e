use std::{net::IpAddr, sync::Arc};

use parking_lot::Mutex;
use steer_flow::{
    table::MemoryFlowTable, Direction, FlowBackend, FlowError, FlowMatch, FlowRule, PortNo,
    RuleId, TableId,
};
use steer_he::{HeConfig, HeaderEnrichmentController, SubscriberRule};
use steer_rpc::EnrichmentService;

pub const TABLE: TableId = 12;
pub const NEXT_TABLE: TableId = 13;
pub const PROXY_PORT: PortNo = PortNo(15);
pub const UPLINK_PORT: PortNo = PortNo(2);
pub const TUNNEL_PORT: PortNo = PortNo(32768);

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn urls(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn config() -> HeConfig {
    HeConfig::default()
        .with_proxy_port(PROXY_PORT)
        .with_uplink_port(UPLINK_PORT)
        .with_tunnel_port(TUNNEL_PORT)
        .with_tables(TABLE, NEXT_TABLE)
}

pub fn rule(ue: &str, server: &str, rule_id: u32, list: &[&str]) -> SubscriberRule {
    SubscriberRule {
        direction: Direction::Out,
        ue_addr: ip(ue),
        uplink_tunnel: "7".to_string(),
        ip_dst: Some(server.parse().unwrap()),
        rule_id: RuleId(rule_id),
        urls: urls(list),
        imsi: "IMSI01".to_string(),
        msisdn: None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub ue: IpAddr,
    pub urls: Vec<String>,
    pub imsi: String,
    pub msisdn: Option<String>,
}

#[derive(Debug, Default)]
struct ProxyState {
    reject: bool,
    activations: Vec<Activation>,
    deactivations: Vec<(IpAddr, Vec<String>)>,
}

/// Records the calls the controller makes to the enrichment proxy. Clones share their state.
#[derive(Debug, Clone, Default)]
pub struct FakeProxy {
    state: Arc<Mutex<ProxyState>>,
}

impl FakeProxy {
    pub fn rejecting() -> Self {
        let proxy = Self::default();
        proxy.state.lock().reject = true;
        proxy
    }

    pub fn activations(&self) -> Vec<Activation> {
        self.state.lock().activations.clone()
    }

    pub fn deactivations(&self) -> Vec<(IpAddr, Vec<String>)> {
        self.state.lock().deactivations.clone()
    }
}

#[async_trait::async_trait]
impl EnrichmentService for FakeProxy {
    async fn activate(
        &self,
        ue: IpAddr,
        urls: &[String],
        imsi: &str,
        msisdn: Option<&str>,
    ) -> bool {
        let mut state = self.state.lock();
        state.activations.push(Activation {
            ue,
            urls: urls.to_vec(),
            imsi: imsi.to_string(),
            msisdn: msisdn.map(str::to_string),
        });
        !state.reject
    }

    async fn deactivate(&self, ue: IpAddr, urls: &[String]) {
        self.state.lock().deactivations.push((ue, urls.to_vec()));
    }
}

/// A datapath that refuses every request but remembers what it was asked to do.
#[derive(Debug, Default)]
pub struct BrokenDatapath {
    pub deletes: usize,
}

impl FlowBackend for BrokenDatapath {
    fn install_rules(&mut self, _rules: &[FlowRule]) -> Result<(), FlowError> {
        Err(FlowError::Rejected("bad request".to_string()))
    }

    fn delete_rules_by_match(
        &mut self,
        _table: TableId,
        _matcher: &FlowMatch,
    ) -> Result<(), FlowError> {
        self.deletes += 1;
        Err(FlowError::Rejected("bad match".to_string()))
    }

    fn delete_rules_by_cookie(
        &mut self,
        _table: TableId,
        _cookie: u64,
        _mask: u64,
    ) -> Result<(), FlowError> {
        self.deletes += 1;
        Err(FlowError::Rejected("bad cookie".to_string()))
    }

    fn delete_all_rules_in_table(&mut self, _table: TableId) -> Result<(), FlowError> {
        self.deletes += 1;
        Err(FlowError::NotConnected)
    }
}

pub type Controller = HeaderEnrichmentController<FakeProxy, MemoryFlowTable>;

/// A controller connected to an in-memory datapath.
pub fn connected(proxy: &FakeProxy) -> Controller {
    let mut controller = HeaderEnrichmentController::new(config(), proxy.clone());
    controller.initialize_on_connect(MemoryFlowTable::new()).unwrap();
    controller
}

/// Adds `rule` and installs whatever the controller returned.
pub async fn add_and_install(controller: &mut Controller, rule: SubscriberRule) -> usize {
    let rules = controller.add_subscriber_rule(rule).await;
    controller.datapath_mut().unwrap().install_rules(&rules).unwrap();
    rules.len()
}
