/// Address book endpoints
///
/// Contacts are always scoped to the caller. Another user's contact id
/// answers 404 exactly like an id that does not exist.
///
/// # Endpoints
///
/// - `GET /api/contacts` - List the caller's contacts by name
/// - `POST /api/contacts` - Add a contact
/// - `PUT /api/contacts/:id` - Replace a contact
/// - `DELETE /api/contacts/:id` - Remove a contact

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{non_blank, parse_numeric_id},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use lynix_shared::{
    auth::identity::Identity,
    models::contact::{Contact, ContactFields},
};
use serde::Deserialize;
use validator::Validate;

const INVALID_ID: &str = "Invalid contact ID.";

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ContactRequest {
    #[validate(length(max = 255, message = "Name must be at most 255 characters."))]
    pub name: Option<String>,

    #[validate(length(max = 255, message = "Email must be at most 255 characters."))]
    pub email: Option<String>,

    #[validate(length(max = 64, message = "Phone must be at most 64 characters."))]
    pub phone: Option<String>,

    pub notes: Option<String>,
}

impl ContactRequest {
    /// Checks the form; blank optional fields are stored as NULL
    fn into_fields(self) -> ApiResult<ContactFields> {
        self.validate().map_err(ApiError::from_validation)?;

        let name = non_blank(self.name)
            .ok_or_else(|| ApiError::BadRequest("Name is a required field.".to_string()))?;

        Ok(ContactFields {
            name,
            email: non_blank(self.email),
            phone: non_blank(self.phone),
            notes: self.notes.filter(|n| !n.trim().is_empty()),
        })
    }
}

pub async fn list_contacts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<Contact>>> {
    let contacts = Contact::list_for_user(state.db()?, &identity.user_id).await?;
    Ok(Json(contacts))
}

pub async fn create_contact(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<ContactRequest>,
) -> ApiResult<(StatusCode, Json<Contact>)> {
    let fields = req.into_fields()?;

    let contact = Contact::create(state.db()?, &identity.user_id, fields).await?;

    tracing::debug!(user_id = %identity.user_id, contact_id = contact.id, "Contact created");

    Ok((StatusCode::CREATED, Json(contact)))
}

pub async fn update_contact(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(raw_id): Path<String>,
    Json(req): Json<ContactRequest>,
) -> ApiResult<Json<Contact>> {
    let not_found = || {
        ApiError::NotFound(
            "Contact not found or you do not have permission to edit it.".to_string(),
        )
    };

    let id = parse_numeric_id(&raw_id, INVALID_ID)?.ok_or_else(not_found)?;
    let fields = req.into_fields()?;

    let contact = Contact::update(state.db()?, id, &identity.user_id, fields)
        .await?
        .ok_or_else(not_found)?;

    Ok(Json(contact))
}

pub async fn delete_contact(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(raw_id): Path<String>,
) -> ApiResult<StatusCode> {
    let not_found = || {
        ApiError::NotFound(
            "Contact not found or you do not have permission to delete it.".to_string(),
        )
    };

    let id = parse_numeric_id(&raw_id, INVALID_ID)?.ok_or_else(not_found)?;

    if !Contact::delete(state.db()?, id, &identity.user_id).await? {
        return Err(not_found());
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_required() {
        let req = ContactRequest {
            name: Some("   ".into()),
            ..Default::default()
        };
        match req.into_fields() {
            Err(ApiError::BadRequest(msg)) => assert_eq!(msg, "Name is a required field."),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_blank_optionals_become_null() {
        let fields = ContactRequest {
            name: Some(" Ada ".into()),
            email: Some("".into()),
            phone: Some(" 555-0100 ".into()),
            notes: Some("  ".into()),
        }
        .into_fields()
        .unwrap();

        assert_eq!(fields.name, "Ada");
        assert_eq!(fields.email, None);
        assert_eq!(fields.phone.as_deref(), Some("555-0100"));
        assert_eq!(fields.notes, None);
    }

    #[test]
    fn test_overlong_phone_rejected() {
        let req = ContactRequest {
            name: Some("Ada".into()),
            phone: Some("5".repeat(65)),
            ..Default::default()
        };
        assert!(matches!(req.into_fields(), Err(ApiError::ValidationError(_))));
    }
}
