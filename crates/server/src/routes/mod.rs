use std::{collections::BTreeSet, fmt::Display, str::FromStr};

use axum::Router;
use services::services::projection::{PageRequest, SortDirection, SortState};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{AppState, error::ApiError};

pub mod clients;
pub mod companies;
pub mod health;
pub mod incidents;
pub mod notifications;
pub mod sync;
pub mod technicians;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(health::router())
        .merge(incidents::router())
        .merge(technicians::router())
        .merge(clients::router())
        .merge(companies::router())
        .merge(notifications::router())
        .merge(sync::router());

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Parse a comma separated query value such as `OUVERT,EN_COURS`.
/// An empty value yields an empty set.
pub(crate) fn parse_set<T>(field: &str, raw: &str) -> Result<BTreeSet<T>, ApiError>
where
    T: FromStr + Ord,
    T::Err: Display,
{
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<T>()
                .map_err(|e| ApiError::BadRequest(format!("invalid {field} '{part}': {e}")))
        })
        .collect()
}

/// Explicit `sort`/`direction` parameters win over the stored view sort.
pub(crate) fn effective_sort<K>(
    stored: SortState<K>,
    key: Option<K>,
    direction: Option<SortDirection>,
) -> SortState<K>
where
    K: Copy + PartialEq,
{
    let base = match key {
        Some(key) if key != stored.key => SortState::new(key),
        _ => stored,
    };
    SortState {
        key: base.key,
        direction: direction.unwrap_or(base.direction),
    }
}

pub(crate) fn page_request(page: Option<usize>, page_size: Option<usize>, default_size: usize) -> PageRequest {
    PageRequest::new(page.unwrap_or(0), page_size.unwrap_or(default_size))
}

#[cfg(test)]
mod tests {
    use domain::models::incident::IncidentStatus;
    use services::services::projection::IncidentSortKey;

    use super::*;

    #[test]
    fn test_parse_set_accepts_french_and_english() {
        let set: BTreeSet<IncidentStatus> = parse_set("status", "ouvert, IN_PROGRESS,").unwrap();
        assert_eq!(
            set.into_iter().collect::<Vec<_>>(),
            vec![IncidentStatus::Open, IncidentStatus::InProgress]
        );
        assert!(parse_set::<IncidentStatus>("status", "").unwrap().is_empty());
        assert!(matches!(
            parse_set::<IncidentStatus>("status", "PERDU"),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_effective_sort() {
        let stored = SortState::new(IncidentSortKey::Priority).select(IncidentSortKey::Priority);
        assert_eq!(stored.direction, SortDirection::Asc);

        let kept = effective_sort(stored, Some(IncidentSortKey::Priority), None);
        assert_eq!(kept, stored);

        let other = effective_sort(stored, Some(IncidentSortKey::Caller), None);
        assert_eq!(other, SortState::new(IncidentSortKey::Caller));

        let forced = effective_sort(stored, None, Some(SortDirection::Desc));
        assert_eq!(forced.key, IncidentSortKey::Priority);
        assert_eq!(forced.direction, SortDirection::Desc);
    }
}
