#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Subscriber traffic steering.
//!
//! Re-exports the header enrichment controller with its RPC client and flow model, and the TC
//! queue builder.

pub use steer_flow as flow;
pub use steer_rpc as rpc;
pub use steer_tc as tc;
pub use steer_wire as wire;

pub use steer_he::*;
pub use steer_rpc::{ClientOptions, EnrichmentClient, EnrichmentService, ServiceRegistry};
pub use steer_tc::{NetlinkTcBackend, TcBackend, TcQueueBuilder};
