//! Placeholder -> concrete unit resolution for one attempt
//!
//! Groups are matched against the roster with augmenting paths (each group
//! claims at most one unit, each unit serves at most one group). Iteration
//! follows declaration order, so the same roster always yields the same map.

use std::collections::{BTreeMap, BTreeSet};

use crate::battle::script::{Action, Group};

/// Match groups to roster names. Groups that cannot be served are absent.
pub fn allocate_groups(groups: &[Group], candidates: &BTreeSet<String>) -> BTreeMap<String, String> {
    let mut owner: BTreeMap<&str, usize> = BTreeMap::new();

    for group_index in 0..groups.len() {
        let mut visited = BTreeSet::new();
        augment(group_index, groups, candidates, &mut owner, &mut visited);
    }

    owner
        .into_iter()
        .map(|(unit, group_index)| (groups[group_index].name.clone(), unit.to_string()))
        .collect()
}

fn augment<'a>(
    group_index: usize,
    groups: &'a [Group],
    candidates: &BTreeSet<String>,
    owner: &mut BTreeMap<&'a str, usize>,
    visited: &mut BTreeSet<&'a str>,
) -> bool {
    for member in &groups[group_index].members {
        let name = member.name.as_str();
        if !candidates.contains(name) || !visited.insert(name) {
            continue;
        }

        let free = match owner.get(name).copied() {
            None => true,
            Some(other) => augment(other, groups, candidates, owner, visited),
        };
        if free {
            owner.insert(name, group_index);
            return true;
        }
    }
    false
}

/// Resolved placeholder names for the running attempt
///
/// Names that no group claims map to themselves. That fallback is
/// deliberately permissive: a misspelled target resolves to a unit that is
/// never found, and the step fails at dispatch time instead of here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceholderMap {
    map: BTreeMap<String, String>,
}

impl PlaceholderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate groups, then self-map unclaimed roster names and action targets
    pub fn build(groups: &[Group], roster_names: &BTreeSet<String>, actions: &[Action]) -> Self {
        let mut this = Self {
            map: allocate_groups(groups, roster_names),
        };

        for name in roster_names {
            if !this.map.contains_key(name) && !this.is_claimed(name) {
                this.map.insert(name.clone(), name.clone());
            }
        }

        for action in actions {
            if !action.target.is_empty() {
                this.resolve(&action.target);
            }
        }

        this
    }

    /// Concrete identity for a placeholder, self-mapping it on first use
    pub fn resolve(&mut self, placeholder: &str) -> String {
        if let Some(identity) = self.map.get(placeholder) {
            return identity.clone();
        }
        if !self.is_claimed(placeholder) {
            self.map
                .insert(placeholder.to_string(), placeholder.to_string());
        }
        placeholder.to_string()
    }

    pub fn get(&self, placeholder: &str) -> Option<&str> {
        self.map.get(placeholder).map(String::as_str)
    }

    /// Some placeholder already resolves to this identity
    pub fn is_claimed(&self, identity: &str) -> bool {
        self.map.values().any(|v| v == identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
