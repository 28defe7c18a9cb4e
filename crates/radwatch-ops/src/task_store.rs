//! Task registry: process-local storage of task records

use crate::task::TaskRecord;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use radwatch_core::{Error, Result};
use std::collections::HashMap;

/// Storage of task records keyed by id.
///
/// Updates go through short critical sections. Once a record is terminal the
/// store refuses further updates, so a worker that keeps running after its
/// task was cancelled can never move it again.
pub trait TaskStore<T: TaskRecord>: Send + Sync {
    fn get(&self, id: &str) -> Option<T>;

    /// Insert or replace a record
    fn set(&self, id: &str, task: T);

    fn delete(&self, id: &str) -> Option<T>;

    /// Mutate a live record in place and return the updated copy.
    ///
    /// Fails with `NotFound` for unknown ids, `Cancelled` for cancelled
    /// records and `InvalidState` for other terminal records.
    fn update(&self, id: &str, apply: &mut dyn FnMut(&mut T)) -> Result<T>;

    /// Remove terminal records last updated before `cutoff`
    fn purge(&self, cutoff: DateTime<Utc>) -> Vec<(String, T)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Task store backed by a mutex-guarded map
pub struct InMemoryTaskStore<T> {
    tasks: Mutex<HashMap<String, T>>,
}

impl<T> InMemoryTaskStore<T> {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> Default for InMemoryTaskStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TaskRecord> TaskStore<T> for InMemoryTaskStore<T> {
    fn get(&self, id: &str) -> Option<T> {
        self.tasks.lock().get(id).cloned()
    }

    fn set(&self, id: &str, task: T) {
        self.tasks.lock().insert(id.to_string(), task);
    }

    fn delete(&self, id: &str) -> Option<T> {
        self.tasks.lock().remove(id)
    }

    fn update(&self, id: &str, apply: &mut dyn FnMut(&mut T)) -> Result<T> {
        let mut tasks = self.tasks.lock();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("task '{}'", id)))?;
        if task.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if task.is_terminal() {
            return Err(Error::invalid_state(format!("task '{}' has already finished", id)));
        }
        apply(task);
        task.touch();
        Ok(task.clone())
    }

    fn purge(&self, cutoff: DateTime<Utc>) -> Vec<(String, T)> {
        let mut tasks = self.tasks.lock();
        let expired: Vec<String> = tasks
            .iter()
            .filter(|(_, t)| t.is_terminal() && t.updated_at() < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|id| tasks.remove(&id).map(|t| (id, t)))
            .collect()
    }

    fn len(&self) -> usize {
        self.tasks.lock().len()
    }
}
