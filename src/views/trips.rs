use std::sync::Mutex;

use super::{LoadState, apply_load, lock};
use crate::aggregate::{TripListView, TripRow, distinct};
use crate::error::AppError;
use crate::exporter::{ExportDocument, trip_report};
use crate::fetcher::{Delivery, Fetcher, ViewScope};
use crate::filter::{TripFilter, apply};
use crate::labels::UserDirectory;
use crate::models::{Trip, User};
use crate::store::TRIPS;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripsData {
    pub users: Vec<User>,
    pub trips: Vec<Trip>,
}

/// Trip list page: read-only list, delete and export.
pub struct TripsView {
    fetcher: Fetcher,
    scope: ViewScope,
    state: Mutex<LoadState<TripsData>>,
}

impl TripsView {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            scope: ViewScope::new(),
            state: Mutex::default(),
        }
    }

    pub fn close(&self) {
        self.scope.close();
    }

    pub fn state(&self) -> LoadState<TripsData> {
        lock(&self.state).clone()
    }

    pub async fn load(&self) -> Result<Delivery<()>, AppError> {
        let ticket = self.scope.issue();
        let result = tokio::try_join!(self.fetcher.users(), self.fetcher.trips())
            .map(|(users, trips)| TripsData { users, trips });
        apply_load(&self.scope, ticket, &self.state, result, None)
    }

    pub fn filtered(&self, filter: &TripFilter) -> Vec<Trip> {
        lock(&self.state)
            .ready()
            .map(|data| apply(&data.trips, filter))
            .unwrap_or_default()
    }

    /// Rows, counters and selector options for the current filters.
    pub fn list(&self, filter: &TripFilter) -> TripListView {
        lock(&self.state)
            .ready()
            .map(|data| TripListView::build(&data.trips, filter, &UserDirectory::new(&data.users)))
            .unwrap_or_default()
    }

    pub fn rows(&self, filter: &TripFilter) -> Vec<TripRow> {
        self.list(filter).rows
    }

    pub fn origins(&self) -> Vec<String> {
        lock(&self.state)
            .ready()
            .map(|data| distinct(data.trips.iter().map(|t| t.origen.as_str())))
            .unwrap_or_default()
    }

    pub fn destinations(&self) -> Vec<String> {
        lock(&self.state)
            .ready()
            .map(|data| distinct(data.trips.iter().map(|t| t.destino.as_str())))
            .unwrap_or_default()
    }

    /// Deletes remotely, then drops the trip from the cache.
    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.fetcher.delete(TRIPS, id).await?;

        if let Some(data) = lock(&self.state).ready_mut() {
            data.trips.retain(|t| t.id != id);
        }
        Ok(())
    }

    pub fn export(&self, filter: &TripFilter) -> ExportDocument {
        trip_report(&self.rows(filter))
    }
}
