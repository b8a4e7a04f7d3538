use chrono::{DateTime, Utc};
use std::sync::Mutex;

use super::{LoadState, apply_load, lock};
use crate::aggregate::ReportView;
use crate::error::AppError;
use crate::exporter::{ExportDocument, expense_report};
use crate::fetcher::{Delivery, Fetcher, ViewScope};
use crate::filter::ExpenseFilter;
use crate::labels::UserDirectory;
use crate::models::{Expense, User};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportData {
    pub users: Vec<User>,
    pub expenses: Vec<Expense>,
}

/// Expense report page.
///
/// Each filter change triggers a new load; only the newest one is applied.
pub struct ReportsView {
    fetcher: Fetcher,
    scope: ViewScope,
    state: Mutex<LoadState<ReportData>>,
}

impl ReportsView {
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

    pub fn state(&self) -> LoadState<ReportData> {
        lock(&self.state).clone()
    }

    pub async fn load(&self, filter: &ExpenseFilter) -> Result<Delivery<()>, AppError> {
        let ticket = self.scope.issue();
        let predicates = filter.predicates();

        let result = tokio::try_join!(
            self.fetcher.users(),
            self.fetcher.expenses(&predicates)
        )
        .map(|(users, expenses)| ReportData { users, expenses });

        apply_load(&self.scope, ticket, &self.state, result, None)
    }

    /// KPIs, chart series and table rows for `filter` over the loaded set.
    pub fn report(&self, filter: &ExpenseFilter, now: DateTime<Utc>) -> ReportView {
        lock(&self.state)
            .ready()
            .map(|data| {
                ReportView::build(
                    &data.expenses,
                    filter,
                    &UserDirectory::new(&data.users),
                    now,
                )
            })
            .unwrap_or_default()
    }

    pub fn export(&self, filter: &ExpenseFilter, now: DateTime<Utc>) -> ExportDocument {
        let report = self.report(filter, now);
        expense_report(&report.rows, &report.kpis, &filter.range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::DateRange;
    use crate::store::testing::{DelayedStore, FailingStore};
    use crate::store::{EXPENSES, MemoryStore, USERS};
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::time::Duration;

    // 2024-01-01T08:00Z, 2024-01-01T23:00Z, 2024-01-02T00:00:01Z, 2024-02-10T12:00Z
    const SEED: &str = r#"{
        "usuarios": [
            {"id": "d1", "uid": "a1", "nombre": "Ana", "apellido": "López"},
            {"id": "d2", "uid": "a2", "nombre": "Luis"}
        ],
        "gastos": [
            {"id": "g1", "empresa": "A", "monto": 100, "userId": "a1", "categoria": "Diesel", "descripcion": "carga", "creadoEn": 1704096000000},
            {"id": "g2", "empresa": "B", "monto": 50, "userId": "a2", "categoria": "", "descripcion": "peaje", "creadoEn": 1704150000000},
            {"id": "g3", "empresa": "A", "monto": 25, "userId": "a1", "categoria": "Diesel", "descripcion": "extra", "creadoEn": 1704153601000},
            {"id": "g4", "empresa": "", "monto": 10, "descripcion": "sin dueño", "creadoEn": 1707566400000}
        ]
    }"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn seeded() -> ReportsView {
        let store = MemoryStore::from_json(SEED).unwrap();
        ReportsView::new(Fetcher::new(Arc::new(store)))
    }

    #[tokio::test]
    async fn test_unfiltered_report() {
        let view = seeded();
        let filter = ExpenseFilter::default();
        view.load(&filter).await.unwrap();

        let report = view.report(&filter, now());
        assert_eq!(report.kpis.count, 4);
        assert_eq!(report.kpis.total, 185.0);
        assert_eq!(report.top_users[0].label, "Ana López");
        assert_eq!(report.top_users[0].total, 125.0);
        assert_eq!(report.monthly.len(), 2);
        assert_eq!(report.rows[0].descripcion, "sin dueño");
        assert_eq!(report.rows[0].usuario, "—");
    }

    #[tokio::test]
    async fn test_date_range_is_inclusive_through_end_of_day() {
        let view = seeded();
        let filter = ExpenseFilter {
            range: DateRange::parse("2024-01-01", "2024-01-01").unwrap(),
            ..Default::default()
        };
        view.load(&filter).await.unwrap();

        let report = view.report(&filter, now());
        let amounts: Vec<f64> = report.rows.iter().map(|r| r.monto).collect();
        assert_eq!(amounts, vec![50.0, 100.0]);
    }

    #[tokio::test]
    async fn test_sentinel_company_filter_selects_blank_company() {
        let view = seeded();
        let filter = ExpenseFilter {
            company: Some("Sin empresa".into()),
            ..Default::default()
        };
        view.load(&filter).await.unwrap();

        let report = view.report(&filter, now());
        assert_eq!(report.kpis.count, 1);
        assert_eq!(report.by_company[0].label, "Sin empresa");
    }

    #[tokio::test]
    async fn test_export_agrees_with_kpis() {
        let view = seeded();
        let filter = ExpenseFilter {
            range: DateRange::parse("2024-01-01", "2024-01-31").unwrap(),
            search: "a".into(),
            ..Default::default()
        };
        view.load(&filter).await.unwrap();

        let report = view.report(&filter, now());
        let doc = view.export(&filter, now());
        assert_eq!(doc.rows.len(), report.rows.len());
        assert_eq!(doc.total, report.kpis.total);
        assert_eq!(doc.title, "Reporte de Gastos (1/1/2024 - 31/1/2024)");
    }

    #[tokio::test]
    async fn test_late_response_for_old_filter_is_dropped() {
        let store = MemoryStore::from_json(SEED).unwrap();
        let delayed = DelayedStore::new(
            store,
            EXPENSES,
            vec![Duration::from_millis(80), Duration::ZERO],
        );
        let view = ReportsView::new(Fetcher::new(Arc::new(delayed)));

        let all = ExpenseFilter::default();
        let only_b = ExpenseFilter {
            company: Some("B".into()),
            ..Default::default()
        };

        let slow = view.load(&all);
        let fast = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            view.load(&only_b).await
        };
        let (slow, fast) = tokio::join!(slow, fast);

        assert_eq!(fast.unwrap(), Delivery::Applied(()));
        assert_eq!(slow.unwrap(), Delivery::Stale);

        let cached = view.state();
        let cached = cached.ready().unwrap();
        assert_eq!(cached.expenses.len(), 1);
        assert_eq!(cached.expenses[0].empresa, "B");
    }

    #[tokio::test]
    async fn test_failed_read_reports_generic_message() {
        let store = MemoryStore::from_json(SEED).unwrap();
        let view = ReportsView::new(Fetcher::new(Arc::new(FailingStore {
            inner: store,
            failing: USERS,
        })));

        let err = view.load(&ExpenseFilter::default()).await.unwrap_err();
        assert_eq!(err.user_message(), "Error al cargar los datos.");
        assert_eq!(view.report(&ExpenseFilter::default(), now()), ReportView::default());
    }
}
