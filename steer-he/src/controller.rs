use std::net::IpAddr;

use steer_flow::{
    ip::Subnet, Action, Direction, EtherType, FlowBackend, FlowError, FlowMatch, FlowRule, Priority,
    ProxyTag, RuleId, TableId, COOKIE_EXACT, IPPROTO_TCP, PIPELINE_START,
};
use steer_rpc::EnrichmentService;

use crate::{HeConfig, RuleScope, RuleUrlStore};

/// The server port of the traffic redirected through the proxy.
pub const HTTP_PORT: u16 = 80;

/// A request to enrich a subscriber's HTTP traffic towards a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberRule {
    /// Direction of the connections the rule applies to. Only [`Direction::Out`] is enriched.
    pub direction: Direction,
    pub ue_addr: IpAddr,
    /// The uplink tunnel id, as reported by the session layer.
    pub uplink_tunnel: String,
    /// The server address or prefix.
    pub ip_dst: Option<Subnet>,
    pub rule_id: RuleId,
    pub urls: Vec<String>,
    pub imsi: String,
    pub msisdn: Option<String>,
}

/// Steers subscribers' HTTP traffic through the enrichment proxy.
///
/// Adding a rule first reserves it in the store, then activates enrichment on the proxy and only
/// then yields the flow rules, so no packet is redirected to a proxy that does not know the
/// subscriber. Removal goes the other way round: flows first, then the proxy, then the store.
#[derive(Debug)]
pub struct HeaderEnrichmentController<E, B> {
    config: HeConfig,
    store: RuleUrlStore,
    enrichment: E,
    datapath: Option<B>,
}

impl<E, B> HeaderEnrichmentController<E, B>
where
    E: EnrichmentService,
    B: FlowBackend,
{
    pub fn new(config: HeConfig, enrichment: E) -> Self {
        tracing::info!(?config, "header enrichment controller configured");
        Self { config, store: RuleUrlStore::new(), enrichment, datapath: None }
    }

    pub fn config(&self) -> &HeConfig {
        &self.config
    }

    pub fn store(&self) -> &RuleUrlStore {
        &self.store
    }

    pub fn datapath(&self) -> Option<&B> {
        self.datapath.as_ref()
    }

    pub fn datapath_mut(&mut self) -> Option<&mut B> {
        self.datapath.as_mut()
    }

    /// Attaches the datapath and installs the table defaults: traffic from the proxy that no
    /// subscriber rule claims is dropped, everything else continues to the next table.
    pub fn initialize_on_connect(&mut self, datapath: B) -> Result<(), FlowError> {
        let datapath = self.datapath.insert(datapath);

        let from_proxy = FlowRule::new(
            self.config.table,
            FlowMatch::new().with_in_port(self.config.proxy_port),
            Priority::TABLE_MISS.raise(1),
        );
        let pass = FlowRule::new(self.config.table, FlowMatch::new(), Priority::TABLE_MISS)
            .with_resubmit(self.config.next_table);

        datapath.install_rules(&[from_proxy, pass])
    }

    /// Detaches the datapath. An attached datapath's table is wiped first if the controller is
    /// configured for a clean restart. Subscriber state is always dropped.
    pub fn cleanup_on_disconnect(&mut self) -> Option<B> {
        if self.config.clean_restart && self.datapath.is_some() {
            if let Err(e) = self.delete_all_flows() {
                tracing::error!(?e, table = self.config.table, "failed to clean up flows");
            }
        }

        self.store.clear();
        self.datapath.take()
    }

    /// Deletes every rule in the controller's table.
    pub fn delete_all_flows(&mut self) -> Result<(), FlowError> {
        let table = self.config.table;
        let datapath = self.datapath.as_mut().ok_or(FlowError::NotConnected)?;
        datapath.delete_all_rules_in_table(table)
    }

    /// Activates enrichment for `rule` and returns the flow rules that redirect the subscriber's
    /// HTTP traffic through the proxy. The rules are not installed.
    ///
    /// Returns an empty set when the request does not apply, the rule already exists or the
    /// proxy refused it.
    pub async fn add_subscriber_rule(&mut self, rule: SubscriberRule) -> Vec<FlowRule> {
        if !self.config.enabled || rule.direction != Direction::Out || rule.urls.is_empty() {
            return Vec::new();
        }

        let Some(ip_dst) = rule.ip_dst else {
            tracing::error!(
                ue = %rule.ue_addr,
                rule_id = %rule.rule_id,
                "missing destination, ignoring rule"
            );
            return Vec::new();
        };

        if ip_dst.is_ipv4() != rule.ue_addr.is_ipv4() {
            tracing::warn!(ue = %rule.ue_addr, %ip_dst, "address families differ, ignoring rule");
            return Vec::new();
        }

        let tunnel_id = parse_tunnel_id(&rule.uplink_tunnel).unwrap_or_else(|| {
            tracing::error!(tunnel = %rule.uplink_tunnel, "invalid uplink tunnel id, using 0");
            0
        });

        if !self.store.add(rule.ue_addr, rule.rule_id, rule.urls.clone()) {
            return Vec::new();
        }

        let activated = self
            .enrichment
            .activate(rule.ue_addr, &rule.urls, &rule.imsi, rule.msisdn.as_deref())
            .await;
        if !activated {
            self.store.remove(rule.ue_addr, RuleScope::Rule(rule.rule_id));
            return Vec::new();
        }

        tracing::debug!(
            ue = %rule.ue_addr,
            rule_id = %rule.rule_id,
            %ip_dst,
            "composing proxy flows"
        );
        compose(&self.config, &rule, ip_dst, tunnel_id)
    }

    /// Removes the flows and proxy state of the subscriber rules in `scope`.
    ///
    /// Nothing happens if the store holds no matching entry, so removing twice is harmless. Flow
    /// deletion failures are logged and do not stop the rest of the cleanup.
    pub async fn remove_subscriber_rule(&mut self, ue_addr: IpAddr, scope: RuleScope) {
        let urls = match scope {
            RuleScope::All => {
                if !self.store.has_any(ue_addr) {
                    return;
                }
                Vec::new()
            }
            RuleScope::Rule(rule_id) => match self.store.get(ue_addr, rule_id) {
                Some(urls) => urls.to_vec(),
                None => return,
            },
        };

        self.delete_subscriber_flows(ue_addr, scope);
        self.enrichment.deactivate(ue_addr, &urls).await;
        self.store.remove(ue_addr, scope);
    }

    fn delete_subscriber_flows(&mut self, ue_addr: IpAddr, scope: RuleScope) {
        let table = self.config.table;
        let Some(datapath) = self.datapath.as_mut() else {
            tracing::debug!(ue = %ue_addr, "no datapath attached, skipping flow removal");
            return;
        };

        let results = match scope {
            RuleScope::All => {
                let base = FlowMatch::new().with_eth_type(EtherType::of(ue_addr));
                vec![
                    datapath.delete_rules_by_match(table, &base.clone().with_ip_src(ue_addr)),
                    datapath.delete_rules_by_match(table, &base.with_ip_dst(ue_addr)),
                ]
            }
            RuleScope::Rule(rule_id) => {
                vec![datapath.delete_rules_by_cookie(table, rule_id.cookie(), COOKIE_EXACT)]
            }
        };

        for e in results.into_iter().filter_map(Result::err) {
            tracing::error!(?e, ue = %ue_addr, ?scope, "failed to delete subscriber flows");
        }
    }
}

/// Parses a tunnel id in decimal or `0x` prefixed hex.
fn parse_tunnel_id(s: &str) -> Option<u64> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// Builds the six legs of a proxied HTTP connection.
///
/// Per direction, one leg tags first-pass packets, one leg brings packets leaving the proxy back
/// to the start of the pipeline marked [`ProxyTag::Returning`], and one leg clears that mark when
/// they come around again, so each packet traverses the proxy exactly once.
fn compose(
    config: &HeConfig,
    rule: &SubscriberRule,
    server: Subnet,
    tunnel_id: u64,
) -> Vec<FlowRule> {
    let ue = rule.ue_addr;
    let cookie = rule.rule_id.cookie();
    let tcp = FlowMatch::new().with_eth_type(EtherType::of(ue)).with_ip_proto(IPPROTO_TCP);
    let downlink = tcp.clone().with_ip_src(server).with_ip_dst(ue).with_tcp_src(HTTP_PORT);
    let uplink = tcp.with_ip_src(ue).with_ip_dst(server).with_tcp_dst(HTTP_PORT);

    let leg = |matcher: FlowMatch, priority: Priority, actions: Vec<Action>, resubmit: TableId| {
        FlowRule::new(config.table, matcher, priority)
            .with_actions(actions)
            .with_resubmit(resubmit)
            .with_cookie(cookie)
    };

    vec![
        // Downlink entry.
        leg(
            downlink.clone().with_in_port(config.uplink_port).with_proxy_tag(ProxyTag::Unset),
            Priority::DEFAULT,
            vec![
                Action::SetDirection(Direction::In),
                Action::SetPassthrough,
                Action::SetProxyTag(ProxyTag::Returning),
            ],
            config.next_table,
        ),
        // Downlink leaving the proxy.
        leg(
            downlink.clone().with_in_port(config.proxy_port),
            Priority::DEFAULT,
            vec![
                Action::SetInPort(config.uplink_port),
                Action::SetProxyTag(ProxyTag::Returning),
            ],
            PIPELINE_START,
        ),
        // Downlink loop break.
        leg(
            downlink.with_in_port(config.uplink_port).with_proxy_tag(ProxyTag::Returning),
            Priority::DEFAULT,
            vec![Action::SetProxyTag(ProxyTag::Unset)],
            config.next_table,
        ),
        // Uplink leaving the proxy.
        leg(
            uplink.clone().with_in_port(config.proxy_port).with_proxy_tag(ProxyTag::Unset),
            Priority::MEDIUM,
            vec![
                Action::SetInPort(config.tunnel_port),
                Action::SetTunnelId(tunnel_id),
                Action::SetProxyTag(ProxyTag::Returning),
                Action::SetSubscriberId(rule.imsi.clone()),
            ],
            PIPELINE_START,
        ),
        // Uplink loop break.
        leg(
            uplink.clone().with_in_port(config.tunnel_port).with_proxy_tag(ProxyTag::Returning),
            Priority::MEDIUM,
            vec![Action::SetProxyTag(ProxyTag::Unset)],
            config.next_table,
        ),
        // Uplink entry.
        leg(
            uplink.with_proxy_tag(ProxyTag::Unset),
            Priority::MINIMUM,
            vec![
                Action::SetDirection(Direction::Out),
                Action::SetPassthrough,
                Action::SetProxyTag(ProxyTag::Returning),
            ],
            config.next_table,
        ),
    ]
}
