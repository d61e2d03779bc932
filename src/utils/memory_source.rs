//! In-memory rule source implementation for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::traits::*;
use crate::types::*;

/// In-memory rule source for testing and development
#[derive(Debug, Clone, Default)]
pub struct MemoryRuleSource {
    documents: Arc<RwLock<HashMap<String, RuleDocument>>>,
}

impl MemoryRuleSource {
    /// Create a new empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace a definition
    pub fn insert(&self, name: &str, document: RuleDocument) -> ReconciliationResult<()> {
        self.documents
            .write()
            .map_err(|_| poisoned())?
            .insert(name.to_string(), document);
        Ok(())
    }

    /// Remove a definition, returning it if present
    pub fn remove(&self, name: &str) -> ReconciliationResult<Option<RuleDocument>> {
        Ok(self.documents.write().map_err(|_| poisoned())?.remove(name))
    }

    /// Clear all definitions (useful for testing)
    pub fn clear(&self) -> ReconciliationResult<()> {
        self.documents.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}

fn poisoned() -> ReconciliationError {
    ReconciliationError::Source("rule store lock poisoned".to_string())
}

#[async_trait]
impl RuleDefinitionSource for MemoryRuleSource {
    async fn fetch(&self, name: &str) -> ReconciliationResult<RuleDocument> {
        self.documents
            .read()
            .map_err(|_| poisoned())?
            .get(name)
            .cloned()
            .ok_or_else(|| {
                ReconciliationError::Source(format!("Rule definition not found: {}", name))
            })
    }

    async fn list(&self) -> ReconciliationResult<Vec<String>> {
        let mut names: Vec<String> = self
            .documents
            .read()
            .map_err(|_| poisoned())?
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
}
