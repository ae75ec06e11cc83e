use thiserror::Error;

use crate::{FlowMatch, FlowRule, TableId};

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Datapath not connected")]
    NotConnected,
    #[error("Flow table {0} is full")]
    TableFull(TableId),
    #[error("Switch rejected request: {0}")]
    Rejected(String),
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
}

/// The flow table of a switch datapath.
///
/// All calls are fire-and-return: a successful return means the request was handed to the
/// switch, not that the switch acknowledged every rule.
pub trait FlowBackend {
    /// Installs a batch of rules. The batch is submitted as a whole.
    fn install_rules(&mut self, rules: &[FlowRule]) -> Result<(), FlowError>;

    /// Deletes every rule in `table` whose predicate is covered by `matcher`.
    fn delete_rules_by_match(&mut self, table: TableId, matcher: &FlowMatch)
        -> Result<(), FlowError>;

    /// Deletes every rule in `table` whose cookie equals `cookie` under `mask`.
    fn delete_rules_by_cookie(
        &mut self,
        table: TableId,
        cookie: u64,
        mask: u64,
    ) -> Result<(), FlowError>;

    /// Deletes every rule in `table`.
    fn delete_all_rules_in_table(&mut self, table: TableId) -> Result<(), FlowError>;
}

impl<B: FlowBackend + ?Sized> FlowBackend for Box<B> {
    fn install_rules(&mut self, rules: &[FlowRule]) -> Result<(), FlowError> {
        (**self).install_rules(rules)
    }

    fn delete_rules_by_match(
        &mut self,
        table: TableId,
        matcher: &FlowMatch,
    ) -> Result<(), FlowError> {
        (**self).delete_rules_by_match(table, matcher)
    }

    fn delete_rules_by_cookie(
        &mut self,
        table: TableId,
        cookie: u64,
        mask: u64,
    ) -> Result<(), FlowError> {
        (**self).delete_rules_by_cookie(table, cookie, mask)
    }

    fn delete_all_rules_in_table(&mut self, table: TableId) -> Result<(), FlowError> {
        (**self).delete_all_rules_in_table(table)
    }
}
