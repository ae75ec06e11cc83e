use std::net::IpAddr;

use rustc_hash::FxHashMap;
use steer_flow::RuleId;

/// Which of an address's rules an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleScope {
    /// Every rule of the address.
    All,
    /// A single rule.
    Rule(RuleId),
}

impl From<RuleId> for RuleScope {
    fn from(id: RuleId) -> Self {
        Self::Rule(id)
    }
}

impl From<Option<RuleId>> for RuleScope {
    fn from(id: Option<RuleId>) -> Self {
        id.map_or(Self::All, Self::Rule)
    }
}

/// The URLs header enrichment is active for, per subscriber address and rule.
///
/// An address is present only while it has at least one rule, and every rule has at least one
/// URL.
#[derive(Debug, Default)]
pub struct RuleUrlStore {
    entries: FxHashMap<IpAddr, FxHashMap<RuleId, Vec<String>>>,
}

impl RuleUrlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `urls` for `(address, rule_id)`.
    ///
    /// Returns `false` without touching the store if the pair already exists or `urls` is
    /// empty.
    pub fn add(&mut self, address: IpAddr, rule_id: RuleId, urls: Vec<String>) -> bool {
        if urls.is_empty() {
            tracing::warn!(%address, %rule_id, "refusing to store a rule without urls");
            return false;
        }

        let rules = self.entries.entry(address).or_default();
        if rules.contains_key(&rule_id) {
            tracing::warn!(%address, %rule_id, "rule already present");
            return false;
        }

        rules.insert(rule_id, urls);
        true
    }

    pub fn has_any(&self, address: IpAddr) -> bool {
        self.entries.contains_key(&address)
    }

    pub fn get(&self, address: IpAddr, rule_id: RuleId) -> Option<&[String]> {
        self.entries.get(&address)?.get(&rule_id).map(Vec::as_slice)
    }

    /// Drops the entries of `address` in `scope`. Missing entries are ignored.
    pub fn remove(&mut self, address: IpAddr, scope: RuleScope) {
        match scope {
            RuleScope::All => {
                self.entries.remove(&address);
            }
            RuleScope::Rule(rule_id) => {
                let Some(rules) = self.entries.get_mut(&address) else { return };
                rules.remove(&rule_id);
                if rules.is_empty() {
                    self.entries.remove(&address);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Total number of `(address, rule)` entries.
    pub fn len(&self) -> usize {
        self.entries.values().map(FxHashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The rule ids stored for `address`, in ascending order.
    pub fn rules(&self, address: IpAddr) -> Vec<RuleId> {
        let mut ids: Vec<_> = self
            .entries
            .get(&address)
            .map(|rules| rules.keys().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }
}
