#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Flow rule model shared by the steering controllers.
//!
//! A [`FlowRule`] is a match predicate, a priority, a list of actions and a resubmit target,
//! tagged with a cookie so that every rule belonging to one policy rule can be deleted in a
//! single request. Rules are handed to a [`FlowBackend`], which owns the connection to the
//! actual switch.

mod backend;
pub mod ip;
mod rule;
pub mod table;

pub use backend::*;
pub use rule::*;
