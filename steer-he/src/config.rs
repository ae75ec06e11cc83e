use steer_flow::{PortNo, TableId};

/// Configuration of the header enrichment controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeConfig {
    /// When disabled, add requests produce no rules.
    pub enabled: bool,
    /// The switch port the enrichment proxy is attached to.
    pub proxy_port: PortNo,
    /// The port facing the packet data network.
    pub uplink_port: PortNo,
    /// The port facing the subscriber tunnels.
    pub tunnel_port: PortNo,
    /// The table this controller owns.
    pub table: TableId,
    /// The table packets continue in once this controller is done with them.
    pub next_table: TableId,
    /// Wipe the controller's table when the datapath disconnects.
    pub clean_restart: bool,
}

impl HeConfig {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_proxy_port(mut self, port: PortNo) -> Self {
        self.proxy_port = port;
        self
    }

    pub fn with_uplink_port(mut self, port: PortNo) -> Self {
        self.uplink_port = port;
        self
    }

    pub fn with_tunnel_port(mut self, port: PortNo) -> Self {
        self.tunnel_port = port;
        self
    }

    /// Sets the controller's own table and the table it hands packets to.
    pub fn with_tables(mut self, table: TableId, next_table: TableId) -> Self {
        self.table = table;
        self.next_table = next_table;
        self
    }

    pub fn with_clean_restart(mut self, clean_restart: bool) -> Self {
        self.clean_restart = clean_restart;
        self
    }
}

impl Default for HeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            proxy_port: PortNo(0),
            uplink_port: PortNo(0),
            tunnel_port: PortNo(0),
            table: 1,
            next_table: 2,
            clean_restart: true,
        }
    }
}
