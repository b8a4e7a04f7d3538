//! Display labels for missing values and unresolved references.
//!
//! Every place that shows a company, category or owner goes through this
//! module so the fallback text stays the same across views.

use crate::models::User;

pub const NO_COMPANY: &str = "Sin empresa";
pub const UNKNOWN_COMPANY: &str = "Empresa desconocida";
pub const OTHER_CATEGORY: &str = "Otros";
pub const NO_USER: &str = "—";
pub const UNKNOWN_USER: &str = "Desconocido";
pub const USER_NOT_FOUND: &str = "Usuario no encontrado";
pub const UNASSIGNED_USER: &str = "Sin usuario asignado";
pub const NAMELESS_USER: &str = "Sin nombre";
pub const USER_LOAD_FAILED: &str = "Error al cargar usuario";

fn or_fallback<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

/// Company of an expense, `Sin empresa` when blank.
pub fn company_label(empresa: &str) -> &str {
    or_fallback(empresa, NO_COMPANY)
}

/// Company of a trip in summary lists, `Empresa desconocida` when blank.
pub fn trip_company_label(empresa: &str) -> &str {
    or_fallback(empresa, UNKNOWN_COMPANY)
}

/// Expense category, `Otros` when blank.
pub fn category_label(categoria: &str) -> &str {
    or_fallback(categoria, OTHER_CATEGORY)
}

/// Resolves owner references against a fetched user list.
#[derive(Debug, Clone, Copy)]
pub struct UserDirectory<'a> {
    users: &'a [User],
}

impl<'a> UserDirectory<'a> {
    pub fn new(users: &'a [User]) -> Self {
        Self { users }
    }

    /// Matches the auth uid first, then the document id.
    pub fn find(&self, reference: &str) -> Option<&'a User> {
        if reference.is_empty() {
            return None;
        }
        self.users
            .iter()
            .find(|u| u.uid == reference)
            .or_else(|| self.users.iter().find(|u| u.id == reference))
    }

    pub fn label(&self, policy: UserLabelPolicy, reference: Option<&str>) -> String {
        let reference = reference.filter(|r| !r.is_empty());
        policy.label_for(reference, reference.and_then(|r| self.find(r)))
    }
}

/// Which fallback wording a view uses for an owner reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserLabelPolicy {
    /// Reports: anything unresolved shows as `—`.
    Report,
    /// Trip list: no owner is `—`, a dangling owner is `Desconocido`.
    TripList,
    /// Trip detail page.
    TripDetail,
}

impl UserLabelPolicy {
    /// `reference` is the optional owner id, `user` the record it resolved to.
    pub fn label_for(&self, reference: Option<&str>, user: Option<&User>) -> String {
        match (self, reference, user) {
            (UserLabelPolicy::Report, _, Some(user)) => {
                or_fallback(&user.display_name(), NO_USER).to_string()
            }
            (UserLabelPolicy::Report, _, None) => NO_USER.to_string(),

            (UserLabelPolicy::TripList, None, _) => NO_USER.to_string(),
            (UserLabelPolicy::TripList, Some(_), Some(user)) => {
                or_fallback(&user.display_name(), UNKNOWN_USER).to_string()
            }
            (UserLabelPolicy::TripList, Some(_), None) => UNKNOWN_USER.to_string(),

            (UserLabelPolicy::TripDetail, None, _) => UNASSIGNED_USER.to_string(),
            (UserLabelPolicy::TripDetail, Some(_), Some(user)) => {
                if !user.nombre.is_empty() {
                    user.nombre.clone()
                } else if !user.nombre_completo.is_empty() {
                    user.nombre_completo.clone()
                } else {
                    or_fallback(&user.display_name(), NAMELESS_USER).to_string()
                }
            }
            (UserLabelPolicy::TripDetail, Some(_), None) => USER_NOT_FOUND.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Vec<User> {
        vec![
            User {
                id: "doc-1".into(),
                uid: "auth-1".into(),
                nombre: "Ana".into(),
                apellido: "López".into(),
                ..Default::default()
            },
            User {
                id: "doc-2".into(),
                uid: "auth-2".into(),
                ..Default::default()
            },
        ]
    }

    #[test]
    fn test_blank_company_and_category_use_sentinels() {
        assert_eq!(company_label(""), "Sin empresa");
        assert_eq!(company_label("  "), "  ");
        assert_eq!(company_label("ACME"), "ACME");
        assert_eq!(category_label(""), "Otros");
        assert_eq!(trip_company_label(""), "Empresa desconocida");
    }

    #[test]
    fn test_directory_matches_uid_then_document_id() {
        let users = users();
        let dir = UserDirectory::new(&users);

        assert_eq!(dir.find("auth-1").map(|u| u.id.as_str()), Some("doc-1"));
        assert_eq!(dir.find("doc-2").map(|u| u.uid.as_str()), Some("auth-2"));
        assert!(dir.find("ghost").is_none());
        assert!(dir.find("").is_none());
    }

    #[test]
    fn test_report_policy() {
        let users = users();
        let dir = UserDirectory::new(&users);

        assert_eq!(dir.label(UserLabelPolicy::Report, Some("auth-1")), "Ana López");
        assert_eq!(dir.label(UserLabelPolicy::Report, Some("ghost")), "—");
        assert_eq!(dir.label(UserLabelPolicy::Report, None), "—");
    }

    #[test]
    fn test_trip_list_policy() {
        let users = users();
        let dir = UserDirectory::new(&users);

        assert_eq!(dir.label(UserLabelPolicy::TripList, None), "—");
        assert_eq!(dir.label(UserLabelPolicy::TripList, Some("")), "—");
        assert_eq!(dir.label(UserLabelPolicy::TripList, Some("ghost")), "Desconocido");
        assert_eq!(dir.label(UserLabelPolicy::TripList, Some("auth-2")), "Desconocido");
        assert_eq!(dir.label(UserLabelPolicy::TripList, Some("doc-1")), "Ana López");
    }

    #[test]
    fn test_trip_detail_policy() {
        let users = users();
        let dir = UserDirectory::new(&users);

        assert_eq!(dir.label(UserLabelPolicy::TripDetail, None), "Sin usuario asignado");
        assert_eq!(
            dir.label(UserLabelPolicy::TripDetail, Some("ghost")),
            "Usuario no encontrado"
        );
        assert_eq!(dir.label(UserLabelPolicy::TripDetail, Some("auth-1")), "Ana");
        assert_eq!(dir.label(UserLabelPolicy::TripDetail, Some("auth-2")), "Sin nombre");
    }

    #[test]
    fn test_trip_detail_falls_back_to_full_name() {
        let full_name_only = User {
            id: "doc-3".into(),
            nombre_completo: "Rosa Méndez".into(),
            apellido: "Méndez".into(),
            ..Default::default()
        };
        let surname_only = User {
            apellido: "Ruiz".into(),
            ..Default::default()
        };
        let policy = UserLabelPolicy::TripDetail;

        assert_eq!(policy.label_for(Some("doc-3"), Some(&full_name_only)), "Rosa Méndez");
        assert_eq!(policy.label_for(Some("x"), Some(&surname_only)), "Ruiz");
    }
}
