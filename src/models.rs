use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::store::{Document, EXPENSES, TRIPS, USERS};

/// Field holding the creation timestamp (epoch milliseconds) on trips and expenses.
pub const CREATED_AT: &str = "creadoEn";

/// Role tag carried by every user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Transportista,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Transportista => "transportista",
        }
    }
}

/// A record kind persisted as documents of one collection.
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// Decodes a stored document. The document id always wins over the body.
    fn from_document(doc: Document) -> Result<Self, StoreError> {
        let Document { id, fields } = doc;
        let mut record: Self =
            serde_json::from_value(Value::Object(fields)).map_err(|e| StoreError::Decode {
                id: id.clone(),
                reason: e.to_string(),
            })?;
        record.set_id(id);
        Ok(record)
    }

    /// Field map written to the store; the id is not part of it.
    fn to_fields(&self) -> Result<Map<String, Value>, StoreError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(StoreError::Encode(format!(
                "expected an object, got {}",
                other
            ))),
            Err(e) => Err(StoreError::Encode(e.to_string())),
        }
    }
}

/// Personnel record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct User {
    /// Document id inside the `usuarios` collection
    #[serde(skip)]
    pub id: String,

    /// Id assigned by the authentication service
    #[serde(default)]
    pub uid: String,

    #[serde(default)]
    pub nombre: String,

    #[serde(default)]
    pub apellido: String,

    /// Full name as stored by older records
    #[serde(default, rename = "nombreCompleto", skip_serializing_if = "String::is_empty")]
    pub nombre_completo: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub telefono: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rol: Option<Role>,
}

impl User {
    /// `"nombre apellido"`, trimmed.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.nombre, self.apellido).trim().to_string()
    }

    /// Records without a role tag count as `transportista`.
    pub fn role(&self) -> Role {
        self.rol.unwrap_or_default()
    }
}

impl Record for User {
    const COLLECTION: &'static str = USERS;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trip {
    #[serde(skip)]
    pub id: String,

    #[serde(default)]
    pub empresa: String,

    #[serde(default)]
    pub origen: String,

    #[serde(default)]
    pub destino: String,

    #[serde(default)]
    pub fecha: String,

    #[serde(default)]
    pub operador: String,

    #[serde(default)]
    pub costo: f64,

    #[serde(default, rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(
        default,
        rename = "creadoEn",
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub creado_en: Option<DateTime<Utc>>,
}

impl Record for Trip {
    const COLLECTION: &'static str = TRIPS;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Expense {
    #[serde(skip)]
    pub id: String,

    #[serde(default)]
    pub categoria: String,

    #[serde(default)]
    pub monto: f64,

    #[serde(default)]
    pub empresa: String,

    #[serde(default, rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, rename = "viajeId", skip_serializing_if = "Option::is_none")]
    pub viaje_id: Option<String>,

    #[serde(default)]
    pub descripcion: String,

    /// Vehicle size tag
    #[serde(default, rename = "tamaño")]
    pub tamano: String,

    #[serde(
        default,
        rename = "creadoEn",
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub creado_en: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ubicacion: Option<GeoPoint>,
}

impl Record for Expense {
    const COLLECTION: &'static str = EXPENSES;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Account-creation form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub apellido: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub telefono: String,
    #[serde(default)]
    pub rol: Role,
    #[serde(default)]
    pub password: String,
}

impl NewUser {
    pub fn into_user(self, uid: String) -> User {
        User {
            id: String::new(),
            uid,
            nombre: self.nombre,
            apellido: self.apellido,
            nombre_completo: String::new(),
            email: self.email,
            telefono: self.telefono,
            rol: Some(self.rol),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn doc(id: &str, value: Value) -> Document {
        match value {
            Value::Object(fields) => Document::new(id, fields),
            _ => Document::new(id, Map::new()),
        }
    }

    #[test]
    fn test_expense_decodes_stored_field_names() {
        let expense = Expense::from_document(doc(
            "g1",
            json!({
                "categoria": "Diesel",
                "monto": 1500.5,
                "empresa": "Transportes Baja",
                "userId": "u1",
                "viajeId": "v1",
                "descripcion": "Carga completa",
                "tamaño": "Tráiler",
                "creadoEn": 1_704_067_200_000_i64,
                "ubicacion": {"lat": 32.62, "lng": -115.45}
            }),
        ))
        .unwrap();

        assert_eq!(expense.id, "g1");
        assert_eq!(expense.tamano, "Tráiler");
        assert_eq!(expense.user_id.as_deref(), Some("u1"));
        assert_eq!(
            expense.creado_en,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            expense.ubicacion,
            Some(GeoPoint {
                lat: 32.62,
                lng: -115.45
            })
        );
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let expense = Expense::from_document(doc("g2", json!({}))).unwrap();
        assert_eq!(expense.monto, 0.0);
        assert!(expense.empresa.is_empty());
        assert!(expense.creado_en.is_none());
    }

    #[test]
    fn test_document_id_wins_over_body() {
        let user = User::from_document(doc("doc-7", json!({"id": "other", "uid": "auth-7"})))
            .unwrap();
        assert_eq!(user.id, "doc-7");
        assert_eq!(user.uid, "auth-7");
    }

    #[test]
    fn test_user_without_role_is_transportista() {
        let user = User::from_document(doc("u", json!({"nombre": "Ana"}))).unwrap();
        assert_eq!(user.role(), Role::Transportista);
    }

    #[test]
    fn test_fields_round_trip_without_id() {
        let trip = Trip {
            id: "v1".into(),
            empresa: "A".into(),
            costo: 10.0,
            ..Default::default()
        };

        let fields = trip.to_fields().unwrap();
        assert!(!fields.contains_key("id"));
        assert_eq!(fields.get("empresa"), Some(&json!("A")));
        assert!(!fields.contains_key("userId"));
    }

    #[test]
    fn test_display_name_is_trimmed() {
        let user = User {
            nombre: "Ana".into(),
            ..Default::default()
        };
        assert_eq!(user.display_name(), "Ana");
    }
}
