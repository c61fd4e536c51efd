use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::models::{EntityName, EntityProgress, RetryableError};

/// Live tracking state for one operation.
#[derive(Debug)]
pub(super) struct OperationState {
    pub entities: BTreeMap<EntityName, EntityProgress>,
    /// Error log in insertion order.
    pub errors: Vec<RetryableError>,
    pub cancelled: bool,
    /// When each error was last re-armed for retry.
    pub rearmed_at: HashMap<String, DateTime<Utc>>,
}

impl OperationState {
    pub fn new<I>(entities: I) -> Self
    where
        I: IntoIterator<Item = EntityName>,
    {
        Self {
            entities: entities
                .into_iter()
                .map(|name| (name.clone(), EntityProgress::new(name)))
                .collect(),
            errors: Vec::new(),
            cancelled: false,
            rearmed_at: HashMap::new(),
        }
    }

    /// True when every entity is terminal. Vacuously true with no entities.
    pub fn is_finished(&self) -> bool {
        self.entities.values().all(|p| p.status.is_terminal())
    }

    /// Append an error and stamp it on its entity, if known.
    pub fn push_error(&mut self, error: RetryableError) {
        if let Some(progress) = self.entities.get_mut(&error.entity_name) {
            progress.error_count += 1;
            progress.last_error = Some(error.summary());
        }
        self.errors.push(error);
    }

    pub fn has_open_error(&self, entity: &str, kind: &str) -> bool {
        self.errors
            .iter()
            .any(|e| !e.resolved && e.entity_name == entity && e.kind == kind)
    }

    /// Resolve open errors of `entity` that the loop already re-armed,
    /// returning their ids. Errors still waiting for their first retry stay
    /// open.
    pub fn resolve_rearmed(&mut self, entity: &str) -> Vec<String> {
        let Self {
            errors, rearmed_at, ..
        } = self;

        let mut resolved = Vec::new();
        for error in errors
            .iter_mut()
            .filter(|e| !e.resolved && e.entity_name == entity && rearmed_at.contains_key(&e.id))
        {
            error.resolved = true;
            resolved.push(error.id.clone());
        }
        for id in &resolved {
            rearmed_at.remove(id);
        }
        resolved
    }

    /// Mark every open error of `entity` resolved, returning their ids.
    pub fn resolve_errors(&mut self, entity: &str) -> Vec<String> {
        let mut resolved = Vec::new();
        for error in self
            .errors
            .iter_mut()
            .filter(|e| !e.resolved && e.entity_name == entity)
        {
            error.resolved = true;
            resolved.push(error.id.clone());
        }
        for id in &resolved {
            self.rearmed_at.remove(id);
        }
        resolved
    }
}
