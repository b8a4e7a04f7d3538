use log::warn;
use serde::Serialize;
use std::sync::Mutex;

use super::{LoadState, apply_load, lock};
use crate::aggregate::sum_amounts;
use crate::error::AppError;
use crate::fetcher::{Delivery, Fetcher, ViewScope};
use crate::labels::{USER_LOAD_FAILED, UserLabelPolicy};
use crate::models::{Expense, Trip};

pub const MISSING_TRIP_ID: &str = "No se proporcionó un ID de viaje.";
pub const TRIP_NOT_FOUND: &str = "No se encontró el viaje.";
pub const TRIP_LOAD_FAILED: &str = "Error al cargar los datos del viaje.";

/// A trip with its owner and expenses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripDetail {
    pub id: String,
    pub trip: Trip,
    pub usuario: String,
    pub email: Option<String>,
    pub expenses: Vec<Expense>,
    pub total: f64,
}

pub struct TripDetailView {
    fetcher: Fetcher,
    scope: ViewScope,
    state: Mutex<LoadState<TripDetail>>,
}

impl TripDetailView {
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

    pub fn state(&self) -> LoadState<TripDetail> {
        lock(&self.state).clone()
    }

    pub fn detail(&self) -> Option<TripDetail> {
        lock(&self.state).ready().cloned()
    }

    pub async fn load(&self, trip_id: &str) -> Result<Delivery<()>, AppError> {
        let ticket = self.scope.issue();
        let result = self.fetch(trip_id).await;

        // Validation and not-found keep their own text; store failures get
        // the page's generic one.
        let failure = match &result {
            Err(AppError::Read(_)) => Some(TRIP_LOAD_FAILED),
            _ => None,
        };
        apply_load(&self.scope, ticket, &self.state, result, failure)
    }

    async fn fetch(&self, trip_id: &str) -> Result<TripDetail, AppError> {
        if trip_id.trim().is_empty() {
            return Err(AppError::Validation(MISSING_TRIP_ID.to_string()));
        }

        let trip = self
            .fetcher
            .trip(trip_id)
            .await?
            .ok_or_else(|| AppError::NotFound(TRIP_NOT_FOUND.to_string()))?;

        let (usuario, email) = self.owner(&trip).await;
        let expenses = self.fetcher.expenses_for_trip(&trip.id).await?;
        let total = sum_amounts(expenses.iter().map(|e| e.monto));

        Ok(TripDetail {
            id: trip.id.clone(),
            trip,
            usuario,
            email,
            expenses,
            total,
        })
    }

    async fn owner(&self, trip: &Trip) -> (String, Option<String>) {
        let reference = trip.user_id.as_deref().filter(|r| !r.is_empty());
        let Some(reference) = reference else {
            return (UserLabelPolicy::TripDetail.label_for(None, None), None);
        };

        match self.fetcher.user(reference).await {
            Ok(user) => {
                let label = UserLabelPolicy::TripDetail.label_for(Some(reference), user.as_ref());
                let email = user.map(|u| u.email).filter(|e| !e.is_empty());
                (label, email)
            }
            Err(e) => {
                warn!("owner {} of trip {} could not be loaded: {}", reference, trip.id, e);
                (USER_LOAD_FAILED.to_string(), None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::store::testing::FailingStore;
    use crate::store::{EXPENSES, USERS};
    use std::sync::Arc;

    const SEED: &str = r#"{
        "usuarios": [
            {"id": "d1", "uid": "a1", "nombre": "Ana", "email": "ana@example.com"},
            {"id": "d2", "uid": "a2", "apellido": "Ruiz"}
        ],
        "viajes": [
            {"id": "v1", "empresa": "A", "userId": "a1"},
            {"id": "v2", "empresa": "B"},
            {"id": "v3", "empresa": "C", "userId": "gone"},
            {"id": "v4", "empresa": "D", "userId": "d2"}
        ],
        "gastos": [
            {"id": "g1", "viajeId": "v1", "monto": 120.5},
            {"id": "g2", "viajeId": "v1", "monto": 79.5},
            {"id": "g3", "viajeId": "v2", "monto": 5}
        ]
    }"#;

    fn view_over(store: MemoryStore) -> TripDetailView {
        TripDetailView::new(Fetcher::new(Arc::new(store)))
    }

    fn seeded() -> TripDetailView {
        view_over(MemoryStore::from_json(SEED).unwrap())
    }

    #[tokio::test]
    async fn test_detail_with_owner_and_expenses() {
        let view = seeded();
        view.load("v1").await.unwrap();

        let detail = view.detail().unwrap();
        assert_eq!(detail.usuario, "Ana");
        assert_eq!(detail.email.as_deref(), Some("ana@example.com"));
        assert_eq!(detail.expenses.len(), 2);
        assert_eq!(detail.total, 200.0);
    }

    #[tokio::test]
    async fn test_owner_labels() {
        let view = seeded();

        view.load("v2").await.unwrap();
        assert_eq!(view.detail().unwrap().usuario, "Sin usuario asignado");

        view.load("v3").await.unwrap();
        assert_eq!(view.detail().unwrap().usuario, "Usuario no encontrado");

        view.load("v4").await.unwrap();
        assert_eq!(view.detail().unwrap().usuario, "Ruiz");
    }

    #[tokio::test]
    async fn test_missing_id_and_unknown_trip() {
        let view = seeded();

        let err = view.load("").await.unwrap_err();
        assert_eq!(err.user_message(), MISSING_TRIP_ID);

        let err = view.load("v99").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(view.state().error(), Some(TRIP_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_owner_failure_degrades_to_label() {
        let store = MemoryStore::from_json(SEED).unwrap();
        let view = view_over_failing(store, USERS);

        view.load("v1").await.unwrap();
        let detail = view.detail().unwrap();
        assert_eq!(detail.usuario, "Error al cargar usuario");
        assert_eq!(detail.total, 200.0);
    }

    #[tokio::test]
    async fn test_expense_failure_fails_the_page() {
        let store = MemoryStore::from_json(SEED).unwrap();
        let view = view_over_failing(store, EXPENSES);

        assert!(view.load("v1").await.is_err());
        assert_eq!(view.state().error(), Some(TRIP_LOAD_FAILED));
    }

    fn view_over_failing(store: MemoryStore, failing: &'static str) -> TripDetailView {
        TripDetailView::new(Fetcher::new(Arc::new(FailingStore {
            inner: store,
            failing,
        })))
    }
}
