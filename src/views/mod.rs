//! One controller per dashboard page.
//!
//! A view owns its [`ViewScope`] and its cached records. Nothing is shared
//! between views; each load re-reads what it needs.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::AppError;
use crate::fetcher::{Delivery, RequestTicket, ViewScope};

pub mod dashboard;
pub mod reports;
pub mod trip_detail;
pub mod trips;
pub mod users;

pub use dashboard::DashboardView;
pub use reports::ReportsView;
pub use trip_detail::{TripDetail, TripDetailView};
pub use trips::TripsView;
pub use users::UsersView;

/// Cached result of a view's latest applied load.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T> {
    Loading,
    Ready(T),
    /// User-visible failure text
    Failed(String),
}

impl<T> Default for LoadState<T> {
    fn default() -> Self {
        LoadState::Loading
    }
}

impl<T> LoadState<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            LoadState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn ready_mut(&mut self) -> Option<&mut T> {
        match self {
            LoadState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            LoadState::Failed(message) => Some(message),
            _ => None,
        }
    }
}

pub(crate) fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Applies a finished load to `state` if `ticket` is still the view's latest.
///
/// A failure of the latest request replaces the cache with `Failed`, using
/// `failure` as the text when given. Superseded results, successful or not,
/// are dropped.
pub(crate) fn apply_load<T>(
    scope: &ViewScope,
    ticket: RequestTicket,
    state: &Mutex<LoadState<T>>,
    result: Result<T, AppError>,
    failure: Option<&str>,
) -> Result<Delivery<()>, AppError> {
    match scope.deliver(ticket, result) {
        Delivery::Applied(Ok(value)) => {
            *lock(state) = LoadState::Ready(value);
            Ok(Delivery::Applied(()))
        }
        Delivery::Applied(Err(e)) => {
            let message = failure
                .map(str::to_string)
                .unwrap_or_else(|| e.user_message());
            *lock(state) = LoadState::Failed(message);
            Err(e)
        }
        Delivery::Stale => Ok(Delivery::Stale),
        Delivery::Closed => Ok(Delivery::Closed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_failure_of_latest_request_is_cached() {
        let scope = ViewScope::new();
        let state: Mutex<LoadState<u32>> = Mutex::new(LoadState::Ready(1));
        let ticket = scope.issue();

        let err = AppError::Read(StoreError::Unavailable("offline".into()));
        let result = apply_load(&scope, ticket, &state, Err(err), None);

        assert!(result.is_err());
        assert_eq!(
            lock(&state).error(),
            Some("Error al cargar los datos.")
        );
    }

    #[test]
    fn test_superseded_failure_is_ignored() {
        let scope = ViewScope::new();
        let state: Mutex<LoadState<u32>> = Mutex::new(LoadState::Ready(1));
        let old = scope.issue();
        let _new = scope.issue();

        let err = AppError::Read(StoreError::Unavailable("offline".into()));
        let result = apply_load(&scope, old, &state, Err(err), None);

        assert!(matches!(result, Ok(Delivery::Stale)));
        assert_eq!(*lock(&state), LoadState::Ready(1));
    }
}
