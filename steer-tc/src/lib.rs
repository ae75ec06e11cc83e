#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Per-subscriber traffic shaping queues.
//!
//! A queue is an HTB class under the root qdisc `1:0` plus a `fw` filter that steers packets
//! carrying the queue's firewall mark into it. The [`TcQueueBuilder`] creates and deletes both
//! halves through a [`TcBackend`], which is rtnetlink in production.

mod backend;
mod builder;
pub mod filter;
pub mod handle;
pub mod htb;
mod nla;
pub mod psched;

pub use backend::{ClassSpec, FilterSpec, NetlinkTcBackend, TcBackend, TcError};
pub use builder::{TcQueueBuilder, CLASS_PRIO, FILTER_PRIO};
pub use filter::ETH_P_ALL;
