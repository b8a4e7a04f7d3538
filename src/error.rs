//! Error taxonomy shared by every layer of the crate.
//!
//! Each failure is caught at the boundary of the operation that produced it
//! and turned into user-visible text through [`AppError::user_message`].

use thiserror::Error;

/// Failures reported by a [`crate::store::DocumentStore`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("document {id} not found in {collection}")]
    NotFound { collection: String, id: String },

    #[error("document store unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported query: {0}")]
    InvalidQuery(String),

    #[error("malformed document {id}: {reason}")]
    Decode { id: String, reason: String },

    #[error("could not encode record: {0}")]
    Encode(String),
}

/// Failures reported by a [`crate::auth::AuthProvider`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("email address is already registered")]
    EmailInUse,

    #[error("invalid email address")]
    InvalidEmail,

    #[error("password is too short")]
    WeakPassword,

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Failures while producing a spreadsheet export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("chart rendering failed: {0}")]
    Chart(String),
}

/// Application-level error, one variant per failure class.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad credentials or a rejected account creation. Retryable by resubmission.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A read against the document store failed.
    #[error("read failed: {0}")]
    Read(StoreError),

    /// A create, update or delete failed. Local state is left untouched.
    #[error("write failed: {0}")]
    Write(StoreError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Export(#[from] ExportError),
}

impl AppError {
    /// Text shown to the person using the dashboard.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Auth(AuthError::InvalidCredentials) => {
                "Correo o contraseña incorrectos.".to_string()
            }
            AppError::Auth(AuthError::EmailInUse) => {
                "Error al crear usuario: el correo ya está registrado.".to_string()
            }
            AppError::Auth(AuthError::InvalidEmail) => {
                "Error al crear usuario: el correo no es válido.".to_string()
            }
            AppError::Auth(AuthError::WeakPassword) => {
                "Error al crear usuario: la contraseña debe tener al menos 6 caracteres."
                    .to_string()
            }
            AppError::Auth(AuthError::Hash(_)) => "Error de autenticación.".to_string(),
            AppError::Read(_) => "Error al cargar los datos.".to_string(),
            AppError::Write(_) => "Error al guardar los cambios.".to_string(),
            AppError::NotFound(message) | AppError::Validation(message) => message.clone(),
            AppError::Export(_) => "Error al exportar el reporte.".to_string(),
        }
    }
}

#[cfg(feature = "web")]
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            AppError::Auth(AuthError::InvalidCredentials) => StatusCode::UNAUTHORIZED,
            AppError::Auth(AuthError::Hash(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Auth(_) => StatusCode::BAD_REQUEST,
            AppError::Read(_) => StatusCode::BAD_GATEWAY,
            AppError::Write(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            AppError::Write(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "status": "error",
            "message": self.user_message(),
        });

        (status, axum::Json(body)).into_response()
    }
}
