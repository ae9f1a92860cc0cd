//! Pure filter / sort / paginate projections over entity collections.
//!
//! Nothing here mutates a store: views call [`project`] on a snapshot every
//! time the snapshot, the filters or the sort state change.

use std::{cmp::Ordering, collections::BTreeSet};

use chrono::{DateTime, Utc};
use domain::models::{
    Entity, EntityId,
    client::{Client, ClientStatus},
    incident::{Incident, IncidentPriority, IncidentStatus},
    technician::{Availability, Technician},
};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumString};
use ts_rs::TS;

pub const DEFAULT_PAGE_SIZE: usize = 20;

pub trait Filter<T> {
    fn matches(&self, item: &T) -> bool;
}

pub trait SortKey<T>: Copy + PartialEq {
    /// Ascending comparison; direction is applied by the caller.
    fn compare(self, a: &T, b: &T) -> Ordering;
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct SortState<K> {
    pub key: K,
    pub direction: SortDirection,
}

impl<K: Copy + PartialEq> SortState<K> {
    pub fn new(key: K) -> Self {
        Self {
            key,
            direction: SortDirection::Desc,
        }
    }

    /// Selecting the active key flips direction; any other key starts descending.
    pub fn select(self, key: K) -> Self {
        if key == self.key {
            Self {
                key,
                direction: self.direction.toggled(),
            }
        } else {
            Self::new(key)
        }
    }
}

impl<K: Copy + PartialEq + Default> Default for SortState<K> {
    fn default() -> Self {
        Self::new(K::default())
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    TS,
    EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum IncidentSortKey {
    #[default]
    CreatedAt,
    Priority,
    Status,
    Caller,
}

impl SortKey<Incident> for IncidentSortKey {
    fn compare(self, a: &Incident, b: &Incident) -> Ordering {
        match self {
            IncidentSortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            IncidentSortKey::Priority => a.priority.cmp(&b.priority),
            IncidentSortKey::Status => a.status.cmp(&b.status),
            IncidentSortKey::Caller => cmp_text(&a.caller, &b.caller),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    TS,
    EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TechnicianSortKey {
    #[default]
    Name,
    Availability,
    Specialization,
}

impl SortKey<Technician> for TechnicianSortKey {
    fn compare(self, a: &Technician, b: &Technician) -> Ordering {
        match self {
            TechnicianSortKey::Name => cmp_text(&a.name, &b.name),
            TechnicianSortKey::Availability => a.availability.cmp(&b.availability),
            TechnicianSortKey::Specialization => cmp_text(
                a.specialization.as_deref().unwrap_or_default(),
                b.specialization.as_deref().unwrap_or_default(),
            ),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    TS,
    EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ClientSortKey {
    #[default]
    Name,
    Status,
}

impl SortKey<Client> for ClientSortKey {
    fn compare(self, a: &Client, b: &Client) -> Ordering {
        match self {
            ClientSortKey::Name => cmp_text(&a.name, &b.name),
            ClientSortKey::Status => a.status.cmp(&b.status),
        }
    }
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

fn normalized_search(search: &Option<String>) -> Option<String> {
    search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

fn contains_term(haystack: Option<&str>, term: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(term))
}

/// Incident filters. Status and priority are inclusion sets, so an empty set
/// matches nothing; the defaults include every value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct IncidentFilters {
    pub statuses: BTreeSet<IncidentStatus>,
    pub priorities: BTreeSet<IncidentPriority>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub created_to: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl Default for IncidentFilters {
    fn default() -> Self {
        Self {
            statuses: IncidentStatus::iter().collect(),
            priorities: IncidentPriority::iter().collect(),
            created_from: None,
            created_to: None,
            search: None,
        }
    }
}

impl IncidentFilters {
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = IncidentStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_priorities(
        mut self,
        priorities: impl IntoIterator<Item = IncidentPriority>,
    ) -> Self {
        self.priorities = priorities.into_iter().collect();
        self
    }

    pub fn created_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_from = from;
        self.created_to = to;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// True when the filters would let every incident through.
    pub fn is_unrestricted(&self) -> bool {
        let defaults = Self::default();
        self.statuses == defaults.statuses
            && self.priorities == defaults.priorities
            && self.created_from.is_none()
            && self.created_to.is_none()
            && normalized_search(&self.search).is_none()
    }
}

impl Filter<Incident> for IncidentFilters {
    fn matches(&self, incident: &Incident) -> bool {
        if !self.statuses.contains(&incident.status) {
            return false;
        }
        if !self.priorities.contains(&incident.priority) {
            return false;
        }
        if self.created_from.is_some_and(|from| incident.created_at < from) {
            return false;
        }
        if self.created_to.is_some_and(|to| incident.created_at > to) {
            return false;
        }
        match normalized_search(&self.search) {
            Some(term) => {
                contains_term(Some(&incident.caller), &term)
                    || contains_term(Some(&incident.description), &term)
                    || contains_term(incident.equipment.as_deref(), &term)
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct TechnicianFilters {
    pub availability: BTreeSet<Availability>,
    pub specialization: Option<String>,
    pub search: Option<String>,
}

impl Default for TechnicianFilters {
    fn default() -> Self {
        Self {
            availability: Availability::iter().collect(),
            specialization: None,
            search: None,
        }
    }
}

impl Filter<Technician> for TechnicianFilters {
    fn matches(&self, technician: &Technician) -> bool {
        if !self.availability.contains(&technician.availability) {
            return false;
        }
        if let Some(wanted) = normalized_search(&self.specialization) {
            if !contains_term(technician.specialization.as_deref(), &wanted) {
                return false;
            }
        }
        match normalized_search(&self.search) {
            Some(term) => {
                contains_term(Some(&technician.name), &term)
                    || contains_term(technician.email.as_deref(), &term)
                    || contains_term(technician.phone.as_deref(), &term)
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ClientFilters {
    pub company_id: Option<EntityId>,
    pub status: Option<ClientStatus>,
    pub search: Option<String>,
}

impl Filter<Client> for ClientFilters {
    fn matches(&self, client: &Client) -> bool {
        if self
            .company_id
            .as_ref()
            .is_some_and(|company| *company != client.company_id)
        {
            return false;
        }
        if self.status.is_some_and(|status| status != client.status) {
            return false;
        }
        match normalized_search(&self.search) {
            Some(term) => {
                contains_term(Some(&client.name), &term)
                    || contains_term(client.address.as_deref(), &term)
                    || contains_term(client.contact_name.as_deref(), &term)
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    /// 0-based.
    pub page: usize,
    pub page_size: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self { page, page_size }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

/// Slice one page out of `items`. Page sizes below 1 are raised to 1 and an
/// out-of-range page index is clamped to the last page.
pub fn paginate<T: Clone>(items: &[T], request: PageRequest) -> Page<T> {
    let page_size = request.page_size.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size);
    let page = request.page.min(total_pages.saturating_sub(1));
    let start = (page * page_size).min(total_items);
    let end = (start + page_size).min(total_items);

    Page {
        items: items[start..end].to_vec(),
        page,
        page_size,
        total_items,
        total_pages,
    }
}

/// Filter and sort without paginating. Ties are broken by id so that the
/// order, and therefore page boundaries, are stable.
pub fn filter_and_sort<T, F, K>(items: &[T], filter: &F, sort: SortState<K>) -> Vec<T>
where
    T: Entity,
    F: Filter<T>,
    K: SortKey<T>,
{
    let mut selected: Vec<T> = items.iter().filter(|item| filter.matches(item)).cloned().collect();
    selected.sort_by(|a, b| {
        sort.direction
            .apply(sort.key.compare(a, b))
            .then_with(|| a.id().cmp(b.id()))
    });
    selected
}

pub fn project<T, F, K>(items: &[T], filter: &F, sort: SortState<K>, page: PageRequest) -> Page<T>
where
    T: Entity,
    F: Filter<T>,
    K: SortKey<T>,
{
    paginate(&filter_and_sort(items, filter, sort), page)
}
