//! Header enrichment for subscriber HTTP traffic.
//!
//! The [`HeaderEnrichmentController`] turns "enrich this subscriber's requests to these URLs"
//! policy into proxy redirect flows, keeping the enrichment proxy and the flow table in step
//! through the [`RuleUrlStore`].

mod config;
mod controller;
mod store;

pub use config::HeConfig;
pub use controller::{HeaderEnrichmentController, SubscriberRule, HTTP_PORT};
pub use store::{RuleScope, RuleUrlStore};
