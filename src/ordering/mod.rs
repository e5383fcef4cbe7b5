//! Dependency-Ordered Aggregator
//!
//! Orders named entities so each one follows the entities it depends on.
//! The algorithm works in passes: every entity whose dependencies were all
//! emitted in earlier passes (or are not part of the input at all) is emitted
//! in input order, then the next pass starts. A pass that emits nothing ends
//! the loop and the remaining entities are appended in input order.

pub mod registry;

pub use registry::{AggregateRegistry, AggregateState};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEntity {
    pub name: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl DependencyEntity {
    pub fn new<I, D>(name: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<String>,
    {
        Self {
            name: name.into(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordering plus a flag telling exact results from the cycle fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyOrder {
    pub entities: Vec<DependencyEntity>,
    /// True when the fallback appended unresolved entities
    pub approximate: bool,
    /// Names appended by the fallback, in input order
    pub unresolved: Vec<String>,
}

impl DependencyOrder {
    pub fn names(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn into_vec(self) -> Vec<DependencyEntity> {
        self.entities
    }
}

/// Order entities by dependency; see the module docs for the policy.
pub fn order(entities: Vec<DependencyEntity>) -> Vec<DependencyEntity> {
    order_with_report(entities).into_vec()
}

pub fn order_with_report(entities: Vec<DependencyEntity>) -> DependencyOrder {
    let known: HashSet<String> = entities.iter().map(|e| e.name.clone()).collect();
    let mut emitted: HashSet<String> = HashSet::with_capacity(entities.len());
    let mut ordered = Vec::with_capacity(entities.len());
    let mut remaining = entities;

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|entity| {
            entity
                .dependencies
                .iter()
                .all(|dep| emitted.contains(dep) || !known.contains(dep))
        });

        if ready.is_empty() {
            let unresolved: Vec<String> = blocked.iter().map(|e| e.name.clone()).collect();
            tracing::debug!(
                unresolved = ?unresolved,
                "dependency cycle or unresolvable dependency; appending in input order"
            );
            ordered.extend(blocked);
            return DependencyOrder {
                entities: ordered,
                approximate: true,
                unresolved,
            };
        }

        for entity in &ready {
            emitted.insert(entity.name.clone());
        }
        ordered.extend(ready);
        remaining = blocked;
    }

    DependencyOrder {
        entities: ordered,
        approximate: false,
        unresolved: Vec::new(),
    }
}
