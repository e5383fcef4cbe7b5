//! Persisted aggregation metadata
//!
//! Each aggregation scope (one aggregator file, e.g. the database seeder)
//! remembers every entity registered into it along with its dependencies,
//! so a pass that regenerates a single entity still renders the full,
//! correctly ordered block:
//!
//! ```json
//! { "database": { "UserSeeder": [], "PostSeeder": ["UserSeeder"] } }
//! ```

use super::DependencyEntity;
use crate::error::Result;
use crate::utils::{read_json_or_default, write_json_atomic};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Scope → (entity name → dependencies), insertion ordered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateState {
    scopes: IndexMap<String, IndexMap<String, Vec<String>>>,
}

impl AggregateState {
    /// Record `name` in `scope`. Returns true when the state changed.
    pub fn register(&mut self, scope: &str, name: &str, dependencies: &[String]) -> bool {
        let entries = self.scopes.entry(scope.to_string()).or_default();
        match entries.get(name) {
            Some(existing) if existing.as_slice() == dependencies => false,
            _ => {
                entries.insert(name.to_string(), dependencies.to_vec());
                true
            }
        }
    }

    /// Entities of a scope in registration order
    pub fn entities(&self, scope: &str) -> Vec<DependencyEntity> {
        self.scopes
            .get(scope)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(name, deps)| DependencyEntity::new(name.clone(), deps.iter().cloned()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }
}

/// JSON-file backed registry
#[derive(Debug, Clone)]
pub struct AggregateRegistry {
    path: PathBuf,
}

impl AggregateRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<AggregateState> {
        read_json_or_default(&self.path)
    }

    pub fn save(&self, state: &AggregateState) -> Result<()> {
        write_json_atomic(&self.path, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_register_reports_changes() {
        let mut state = AggregateState::default();
        assert!(state.register("database", "UserSeeder", &[]));
        assert!(!state.register("database", "UserSeeder", &[]));
        assert!(state.register("database", "UserSeeder", &["RoleSeeder".to_string()]));
    }

    #[test]
    fn test_entities_keep_registration_order_across_reload() {
        let temp = TempDir::new().unwrap();
        let registry = AggregateRegistry::new(temp.path().join(".ggen/aggregates.json"));

        let mut state = registry.load().unwrap();
        state.register("database", "PostSeeder", &["UserSeeder".to_string()]);
        state.register("database", "UserSeeder", &[]);
        state.register("tenant", "PlanSeeder", &[]);
        registry.save(&state).unwrap();

        let reloaded = registry.load().unwrap();
        let names: Vec<String> = reloaded
            .entities("database")
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["PostSeeder", "UserSeeder"]);
        assert_eq!(reloaded.scopes().collect::<Vec<_>>(), vec!["database", "tenant"]);
        assert!(reloaded.entities("missing").is_empty());
    }
}
