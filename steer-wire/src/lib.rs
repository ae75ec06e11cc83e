#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Wire formats spoken between the gateway and the enrichment proxy controller.
//!
//! Every frame starts with a fixed 10 byte header:
//!
//! ```text
//! ┌──────────┬──────────┬──────────────┬────────────────┬─────────────┐
//! │ wire id  │ kind     │ request id   │ payload size   │ payload ... │
//! │ u8       │ u8       │ u32 (BE)     │ u32 (BE)       │             │
//! └──────────┴──────────┴──────────────┴────────────────┴─────────────┘
//! ```
//!
//! The payload layout depends on the [`enrichment::Kind`].

pub mod enrichment;
