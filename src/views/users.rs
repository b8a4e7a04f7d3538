use log::info;
use serde_json::{Map, Value};
use std::sync::Mutex;

use super::{LoadState, apply_load, lock};
use crate::aggregate::{RoleCount, role_summary};
use crate::auth::AuthProvider;
use crate::error::AppError;
use crate::fetcher::{Delivery, Fetcher, ViewScope, write_error};
use crate::filter::{UserFilter, apply};
use crate::models::{NewUser, Record, Role, User};
use crate::store::USERS;

pub const REQUIRED_FIELDS: &str = "El nombre, correo y contraseña son obligatorios.";

/// Personnel page.
pub struct UsersView {
    fetcher: Fetcher,
    scope: ViewScope,
    state: Mutex<LoadState<Vec<User>>>,
}

impl UsersView {
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

    pub fn state(&self) -> LoadState<Vec<User>> {
        lock(&self.state).clone()
    }

    pub async fn load(&self) -> Result<Delivery<()>, AppError> {
        let ticket = self.scope.issue();
        let result = self.fetcher.users().await;
        apply_load(&self.scope, ticket, &self.state, result, None)
    }

    pub fn users(&self) -> Vec<User> {
        lock(&self.state).ready().cloned().unwrap_or_default()
    }

    pub fn filtered(&self, filter: &UserFilter) -> Vec<User> {
        lock(&self.state)
            .ready()
            .map(|users| apply(users, filter))
            .unwrap_or_default()
    }

    pub fn role_summary(&self) -> Vec<RoleCount> {
        lock(&self.state)
            .ready()
            .map(|users| role_summary(users))
            .unwrap_or_default()
    }

    /// Registers the account with the auth service, then stores the record.
    ///
    /// If the insert fails the auth identity is left in place.
    pub async fn create(&self, form: NewUser, auth: &dyn AuthProvider) -> Result<User, AppError> {
        if form.nombre.trim().is_empty()
            || form.email.trim().is_empty()
            || form.password.is_empty()
        {
            return Err(AppError::Validation(REQUIRED_FIELDS.to_string()));
        }

        let identity = auth
            .create_identity(&form.email, &form.password, form.rol)
            .await?;

        let mut user = form.into_user(identity.uid);
        let fields = user.to_fields().map_err(write_error)?;
        let id = self
            .fetcher
            .store()
            .insert(USERS, fields)
            .await
            .map_err(write_error)?;
        user.id = id;

        info!("user {} created", user.email);
        if let Some(users) = lock(&self.state).ready_mut() {
            users.push(user.clone());
        }
        Ok(user)
    }

    /// Writes every field of `user` over the stored record.
    pub async fn save(&self, user: User) -> Result<(), AppError> {
        if user.id.is_empty() {
            return Err(AppError::Validation("Usuario sin identificador.".to_string()));
        }

        let fields = user.to_fields().map_err(write_error)?;
        self.fetcher
            .store()
            .update(USERS, &user.id, fields)
            .await
            .map_err(write_error)?;

        if let Some(users) = lock(&self.state).ready_mut() {
            if let Some(slot) = users.iter_mut().find(|u| u.id == user.id) {
                *slot = user;
            }
        }
        Ok(())
    }

    pub async fn change_role(&self, id: &str, role: Role) -> Result<(), AppError> {
        let mut fields = Map::new();
        fields.insert("rol".to_string(), Value::from(role.as_str()));
        self.fetcher
            .store()
            .update(USERS, id, fields)
            .await
            .map_err(write_error)?;

        if let Some(users) = lock(&self.state).ready_mut() {
            if let Some(user) = users.iter_mut().find(|u| u.id == id) {
                user.rol = Some(role);
            }
        }
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.fetcher.delete(USERS, id).await?;

        if let Some(users) = lock(&self.state).ready_mut() {
            users.retain(|u| u.id != id);
        }
        Ok(())
    }
}
