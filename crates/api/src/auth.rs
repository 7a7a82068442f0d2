//! Principal extraction from the identity headers set upstream.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{Role, UserId};
use domain::Principal;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::Unauthorized(format!("Missing {name} header")))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized(format!("Invalid {name} header")))
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = uuid::Uuid::parse_str(header(parts, USER_ID_HEADER)?)
            .map_err(|e| ApiError::Unauthorized(format!("Invalid {USER_ID_HEADER} header: {e}")))?;
        let role: Role = header(parts, USER_ROLE_HEADER)?
            .parse()
            .map_err(|e| ApiError::Unauthorized(format!("Invalid {USER_ROLE_HEADER} header: {e}")))?;
        let username = header(parts, USER_NAME_HEADER)?;

        Ok(AuthUser(Principal::new(
            UserId::from_uuid(user_id),
            username,
            role,
        )))
    }
}
