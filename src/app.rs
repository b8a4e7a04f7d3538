use axum::{
    Extension, Form, Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, patch, post, put},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::aggregate::RoleCount;
use crate::auth::{
    AuthProvider, GuardOutcome, Identity, LOGIN_PATH, LocalAuthProvider, SessionGuard, SessionStore,
};
use crate::error::AppError;
use crate::exporter::{CSV_CONTENT_TYPE, ExportDocument, XLSX_CONTENT_TYPE};
use crate::fetcher::Fetcher;
use crate::filter::{DateRange, ExpenseFilter, TripFilter, UserFilter};
use crate::graph::{ChartKind, render_bar_chart};
use crate::models::{NewUser, Record, Role, User};
use crate::settings::Settings;
use crate::store::{DocumentStore, MemoryStore};
use crate::views::{DashboardView, ReportsView, TripDetailView, TripsView, UsersView};

const SESSION_COOKIE: &str = "session";
const HOME_PATH: &str = "/api/dashboard";
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(15 * 60);
const FORBIDDEN_MESSAGE: &str = "No tienes permiso para acceder a esta sección.";

pub struct AppState {
    pub fetcher: Fetcher,
    pub auth: Arc<dyn AuthProvider>,
    pub sessions: SessionStore,
    pub guard: SessionGuard,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthProvider>,
        settings: &Settings,
    ) -> Self {
        Self {
            fetcher: Fetcher::new(store),
            auth,
            sessions: SessionStore::with_hours(settings.session.hours),
            guard: SessionGuard::new(settings.access.policy),
        }
    }
}

#[derive(Serialize)]
struct SaveResponse {
    status: String,
    message: Option<String>,
}

impl SaveResponse {
    fn success(message: &str) -> Json<Self> {
        Json(Self {
            status: "success".to_string(),
            message: Some(message.to_string()),
        })
    }
}

/// Stored records keep their id outside the document body; API responses
/// put it back next to the fields.
#[derive(Serialize)]
struct WithId<'a, T: Serialize> {
    id: &'a str,
    #[serde(flatten)]
    record: &'a T,
}

impl<'a, T: Record> WithId<'a, T> {
    fn of(record: &'a T) -> Self {
        Self {
            id: record.id(),
            record,
        }
    }
}

#[derive(Serialize)]
struct UserList<'a> {
    users: Vec<WithId<'a, User>>,
    roles: Vec<RoleCount>,
}

#[derive(Deserialize)]
struct LoginForm {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct RoleChange {
    rol: Role,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserQuery {
    search: String,
    role: Option<Role>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TripQuery {
    user: Option<String>,
    origin: Option<String>,
    destination: Option<String>,
    search: String,
    format: ExportFormat,
}

impl TripQuery {
    fn filter(&self) -> TripFilter {
        TripFilter {
            user: self.user.clone(),
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            search: self.search.clone(),
        }
    }
}

/// Report filters as sent by the page: `YYYY-MM-DD` dates, blank means open.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReportQuery {
    start: String,
    end: String,
    company: Option<String>,
    user: Option<String>,
    category: Option<String>,
    size: Option<String>,
    search: String,
    format: ExportFormat,
}

impl ReportQuery {
    fn filter(&self) -> Result<ExpenseFilter, AppError> {
        Ok(ExpenseFilter {
            range: DateRange::parse(&self.start, &self.end)?,
            company: self.company.clone(),
            user: self.user.clone(),
            category: self.category.clone(),
            size: self.size.clone(),
            search: self.search.clone(),
        })
    }
}

/// Build the router
///
/// Everything under `/api` passes through [`require_auth`].
///
/// # Arguments
/// * `state` - Shared application state
///
/// # Returns
/// * `Router` - The complete application router
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/api/dashboard", get(dashboard))
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/:id", put(update_user).delete(delete_user))
        .route("/api/users/:id/role", patch(change_role))
        .route("/api/trips", get(list_trips))
        .route("/api/trips/export", get(export_trips))
        .route("/api/trips/:id", get(trip_detail).delete(delete_trip))
        .route("/api/reports", get(reports))
        .route("/api/reports/export", get(export_report))
        .route("/api/reports/charts/:kind", get(chart))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ));

    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
        .merge(protected)
        .with_state(state)
}

/// Start the web server
///
/// # Arguments
/// * `settings` - Layered configuration
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Ok when the server shuts down cleanly
pub async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let store = match &settings.seed.path {
        Some(path) => {
            info!("seeding documents from {}", path);
            MemoryStore::from_seed_file(path)?
        }
        None => MemoryStore::new(),
    };

    let auth = LocalAuthProvider::new();
    if let Some((email, password)) = settings.bootstrap_admin() {
        auth.bootstrap_admin(email, password).await?;
    }
    auth.settle();

    let app_state = Arc::new(AppState::new(Arc::new(store), Arc::new(auth), &settings));

    let sessions = app_state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                debug!("purged {} expired sessions", purged);
            }
        }
    });

    let address = settings.server.address();
    let listener = TcpListener::bind(&address).await?;
    info!("listening on http://{}", address);
    axum::serve(listener, router(app_state)).await?;

    Ok(())
}

/// Authentication middleware
///
/// Resolves the session cookie and runs the guard on it. Admitted requests
/// carry the [`Identity`] as an extension.
///
/// # Returns
/// * `Response` - The handler's response, a redirect to the login page or a 403
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let session_id = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let auth_state = state.sessions.state_for(session_id.as_deref());

    match state.guard.decide(&auth_state) {
        GuardOutcome::Render(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        GuardOutcome::RedirectToLogin => Redirect::to(LOGIN_PATH).into_response(),
        GuardOutcome::Forbidden => (
            StatusCode::FORBIDDEN,
            Json(SaveResponse {
                status: "error".to_string(),
                message: Some(FORBIDDEN_MESSAGE.to_string()),
            }),
        )
            .into_response(),
        GuardOutcome::Loading => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

async fn login_page() -> Html<&'static str> {
    Html(include_str!("./static/login.html"))
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    match state.auth.sign_in(&form.email, &form.password).await {
        Ok(identity) => {
            let session_id = state.sessions.create(identity);
            let cookie = Cookie::build((SESSION_COOKIE, session_id))
                .path("/")
                .http_only(true);
            (jar.add(cookie), Redirect::to(HOME_PATH)).into_response()
        }
        Err(e) => AppError::from(e).into_response(),
    }
}

async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.revoke(cookie.value());
    }

    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Redirect::to(LOGIN_PATH),
    )
}

async fn dashboard(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let view = DashboardView::new(state.fetcher.clone());
    view.load().await?;
    Ok(Json(view.summary().unwrap_or_default()).into_response())
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Response, AppError> {
    let view = UsersView::new(state.fetcher.clone());
    view.load().await?;

    let filter = UserFilter {
        search: query.search,
        role: query.role,
    };
    let users = view.filtered(&filter);
    let body = UserList {
        users: users.iter().map(WithId::of).collect(),
        roles: view.role_summary(),
    };

    Ok(Json(body).into_response())
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<Identity>,
    Json(form): Json<NewUser>,
) -> Result<Response, AppError> {
    let view = UsersView::new(state.fetcher.clone());
    let user = view.create(form, state.auth.as_ref()).await?;
    info!("{} registered {}", admin.email, user.email);

    Ok((StatusCode::CREATED, Json(WithId::of(&user))).into_response())
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(mut user): Json<User>,
) -> Result<Json<SaveResponse>, AppError> {
    user.id = id;
    UsersView::new(state.fetcher.clone()).save(user).await?;
    Ok(SaveResponse::success("Usuario actualizado."))
}

async fn change_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(change): Json<RoleChange>,
) -> Result<Json<SaveResponse>, AppError> {
    UsersView::new(state.fetcher.clone())
        .change_role(&id, change.rol)
        .await?;
    Ok(SaveResponse::success("Rol actualizado."))
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<SaveResponse>, AppError> {
    UsersView::new(state.fetcher.clone()).delete(&id).await?;
    info!("{} deleted user {}", admin.email, id);
    Ok(SaveResponse::success("Usuario eliminado."))
}

async fn list_trips(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TripQuery>,
) -> Result<Response, AppError> {
    let view = TripsView::new(state.fetcher.clone());
    view.load().await?;
    Ok(Json(view.list(&query.filter())).into_response())
}

async fn trip_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let view = TripDetailView::new(state.fetcher.clone());
    view.load(&id).await?;
    Ok(Json(view.detail()).into_response())
}

async fn delete_trip(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<SaveResponse>, AppError> {
    TripsView::new(state.fetcher.clone()).delete(&id).await?;
    info!("{} deleted trip {}", admin.email, id);
    Ok(SaveResponse::success("Viaje eliminado."))
}

async fn export_trips(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TripQuery>,
) -> Result<Response, AppError> {
    let view = TripsView::new(state.fetcher.clone());
    view.load().await?;
    export_response(&view.export(&query.filter()), query.format)
}

async fn reports(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, AppError> {
    let filter = query.filter()?;
    let view = ReportsView::new(state.fetcher.clone());
    view.load(&filter).await?;
    Ok(Json(view.report(&filter, Utc::now())).into_response())
}

async fn export_report(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, AppError> {
    let filter = query.filter()?;
    let view = ReportsView::new(state.fetcher.clone());
    view.load(&filter).await?;
    export_response(&view.export(&filter, Utc::now()), query.format)
}

async fn chart(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, AppError> {
    let kind: ChartKind = kind.parse()?;
    let filter = query.filter()?;
    let view = ReportsView::new(state.fetcher.clone());
    view.load(&filter).await?;

    let report = view.report(&filter, Utc::now());
    let png = render_bar_chart(kind.series(&report), &kind.options())?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

/// Serve a report as a download with its fixed file name
fn export_response(document: &ExportDocument, format: ExportFormat) -> Result<Response, AppError> {
    let (content_type, file_name, body) = match format {
        ExportFormat::Xlsx => (
            XLSX_CONTENT_TYPE,
            document.layout.file_name.to_string(),
            document.to_xlsx()?,
        ),
        ExportFormat::Csv => (
            CSV_CONTENT_TYPE,
            document.csv_file_name(),
            document.to_csv().into_bytes(),
        ),
    };

    let disposition = format!("attachment; filename=\"{}\"", file_name);
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
