//! Client-held entity collections.
//!
//! A store owns one `Arc<Vec<T>>`. Every mutation builds a new vector and a
//! new `Arc`, so a consumer that kept the previous snapshot can detect a
//! change with `Arc::ptr_eq` and never observes a half-applied update.
//!
//! Loads are fenced: [`EntityStore::begin_load`] hands out monotonically
//! increasing tickets and a response is dropped when a newer one has already
//! been applied, so a slow request can never overwrite fresher data.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::models::{Entity, EntityId};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::api::ApiError;

const TOTAL_COUNT_KEYS: [&str; 4] = ["totalElements", "totalCount", "total", "count"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("network failure: {0}")]
    NetworkFailure(#[from] ApiError),
}

impl StoreError {
    /// Whether offering a retry to the user makes sense.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::MalformedResponse(_) => false,
            StoreError::NetworkFailure(e) => e.should_retry(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoadTicket(u64);

impl LoadTicket {
    pub fn sequence(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Applied { count: usize, total: u64 },
    /// A newer response was applied first; this one was dropped untouched.
    Stale { ticket: u64, latest: u64 },
    /// The previous collection is kept.
    Failed(StoreError),
}

impl LoadOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, LoadOutcome::Applied { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListPayload<T> {
    pub items: Vec<T>,
    pub total_count: u64,
}

/// Accept either a bare array or an envelope `{ "content": [...], "totalElements": n }`.
pub fn parse_list_payload<T: DeserializeOwned>(payload: Value) -> Result<ListPayload<T>, StoreError> {
    let (raw_items, total) = match payload {
        Value::Array(items) => (items, None),
        Value::Object(mut map) => {
            let total = TOTAL_COUNT_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_u64));
            match map.remove("content") {
                Some(Value::Array(items)) => (items, total),
                Some(other) => {
                    return Err(StoreError::MalformedResponse(format!(
                        "expected `content` to be an array, got {}",
                        json_kind(&other)
                    )));
                }
                None => {
                    return Err(StoreError::MalformedResponse(
                        "object payload without a `content` array".to_string(),
                    ));
                }
            }
        }
        other => {
            return Err(StoreError::MalformedResponse(format!(
                "expected an array or an envelope, got {}",
                json_kind(&other)
            )));
        }
    };

    let items = raw_items
        .into_iter()
        .enumerate()
        .map(|(index, raw)| {
            serde_json::from_value(raw).map_err(|e| {
                StoreError::MalformedResponse(format!("item {index} does not match: {e}"))
            })
        })
        .collect::<Result<Vec<T>, _>>()?;

    let total_count = total.unwrap_or(items.len() as u64);
    Ok(ListPayload { items, total_count })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug)]
pub struct EntityStore<T> {
    items: Arc<Vec<T>>,
    total_count: u64,
    next_ticket: u64,
    last_applied: u64,
    last_error: Option<StoreError>,
    loaded_at: Option<DateTime<Utc>>,
}

impl<T> Default for EntityStore<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Vec::new()),
            total_count: 0,
            next_ticket: 0,
            last_applied: 0,
            last_error: None,
            loaded_at: None,
        }
    }
}

impl<T: Entity + DeserializeOwned> EntityStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<T>) -> Self {
        Self {
            total_count: items.len() as u64,
            items: Arc::new(items),
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Count reported by the server, adjusted by local inserts and removals.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn last_error(&self) -> Option<&StoreError> {
        self.last_error.as_ref()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn get(&self, id: &EntityId) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn position(&self, id: &EntityId) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn begin_load(&mut self) -> LoadTicket {
        self.next_ticket += 1;
        LoadTicket(self.next_ticket)
    }

    /// Apply the result of the fetch started with `ticket`.
    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        response: Result<Value, ApiError>,
    ) -> LoadOutcome {
        if ticket.0 <= self.last_applied {
            return LoadOutcome::Stale {
                ticket: ticket.0,
                latest: self.last_applied,
            };
        }

        let parsed = response
            .map_err(StoreError::from)
            .and_then(parse_list_payload::<T>);

        match parsed {
            Ok(payload) => {
                let count = payload.items.len();
                self.items = Arc::new(payload.items);
                self.total_count = payload.total_count;
                self.last_applied = ticket.0;
                self.last_error = None;
                self.loaded_at = Some(Utc::now());
                LoadOutcome::Applied {
                    count,
                    total: payload.total_count,
                }
            }
            Err(error) => {
                self.last_error = Some(error.clone());
                LoadOutcome::Failed(error)
            }
        }
    }

    /// Replace the whole collection with an already fetched payload.
    pub fn load(&mut self, payload: Value) -> Result<usize, StoreError> {
        let ticket = self.begin_load();
        match self.complete_load(ticket, Ok(payload)) {
            LoadOutcome::Applied { count, .. } => Ok(count),
            LoadOutcome::Failed(e) => Err(e),
            LoadOutcome::Stale { .. } => Ok(self.len()),
        }
    }

    /// Install `f(previous)` as the new collection.
    pub fn apply_local_mutation<F>(&mut self, f: F)
    where
        F: FnOnce(&[T]) -> Vec<T>,
    {
        let previous_len = self.items.len() as u64;
        let next = f(&self.items);
        let next_len = next.len() as u64;
        self.total_count = (self.total_count + next_len).saturating_sub(previous_len);
        self.items = Arc::new(next);
    }

    /// Replace the entity with the same id, or append it. Returns the replaced value.
    pub fn upsert(&mut self, item: T) -> Option<T> {
        let previous = self.get(item.id()).cloned();
        self.apply_local_mutation(|items| {
            let mut next = items.to_vec();
            match next.iter().position(|existing| existing.id() == item.id()) {
                Some(index) => next[index] = item,
                None => next.push(item),
            }
            next
        });
        previous
    }

    /// Edit one entity in place. Returns the value before the edit.
    pub fn update<F>(&mut self, id: &EntityId, edit: F) -> Option<T>
    where
        F: FnOnce(&mut T),
    {
        let index = self.position(id)?;
        let previous = self.items[index].clone();
        self.apply_local_mutation(|items| {
            let mut next = items.to_vec();
            edit(&mut next[index]);
            next
        });
        Some(previous)
    }

    /// Remove an entity, returning it with its former position for reinsertion.
    pub fn remove(&mut self, id: &EntityId) -> Option<(usize, T)> {
        let index = self.position(id)?;
        let removed = self.items[index].clone();
        self.apply_local_mutation(|items| {
            let mut next = items.to_vec();
            next.remove(index);
            next
        });
        Some((index, removed))
    }

    pub fn insert_at(&mut self, index: usize, item: T) {
        self.apply_local_mutation(|items| {
            let mut next = items.to_vec();
            next.insert(index.min(next.len()), item);
            next
        });
    }

    /// Swap the entity stored under `id` for `item`, keeping its position.
    /// Used when the server confirms a locally created entity under a new id.
    pub fn replace(&mut self, id: &EntityId, item: T) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        self.apply_local_mutation(|items| {
            let mut next = items.to_vec();
            next[index] = item;
            next
        });
        true
    }
}
