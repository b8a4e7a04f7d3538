use std::sync::Mutex;

use super::{LoadState, apply_load, lock};
use crate::aggregate::DashboardSummary;
use crate::error::AppError;
use crate::fetcher::{Delivery, Fetcher, ViewScope};

/// Landing page.
pub struct DashboardView {
    fetcher: Fetcher,
    scope: ViewScope,
    state: Mutex<LoadState<DashboardSummary>>,
}

impl DashboardView {
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

    pub fn state(&self) -> LoadState<DashboardSummary> {
        lock(&self.state).clone()
    }

    /// Reads trips, expenses and users concurrently. If any read fails the
    /// whole cycle fails and nothing partial is kept.
    pub async fn load(&self) -> Result<Delivery<()>, AppError> {
        let ticket = self.scope.issue();
        let result = tokio::try_join!(
            self.fetcher.trips(),
            self.fetcher.expenses(&[]),
            self.fetcher.users()
        )
        .map(|(trips, expenses, users)| DashboardSummary::build(&trips, &expenses, &users));

        apply_load(&self.scope, ticket, &self.state, result, None)
    }

    pub fn summary(&self) -> Option<DashboardSummary> {
        lock(&self.state).ready().cloned()
    }
}
