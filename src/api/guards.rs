use std::str::FromStr;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::schemas::final_exam::Audience;

const USER_ID_HEADER: &str = "x-user-id";
const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Trainee,
    Instructor,
    Admin,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trainee" => Ok(Role::Trainee),
            "instructor" => Ok(Role::Instructor),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

/// Caller identity as forwarded by the authenticating gateway.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CurrentUser {
    pub(crate) id: i64,
    pub(crate) role: Role,
}

impl CurrentUser {
    pub(crate) fn is_staff(&self) -> bool {
        matches!(self.role, Role::Instructor | Role::Admin)
    }

    pub(crate) fn audience(&self) -> Audience {
        if self.is_staff() {
            Audience::Staff
        } else {
            Audience::Trainee
        }
    }

    /// Staff may read any exam; trainees only their own.
    pub(crate) fn ensure_can_view(&self, owner_id: i64) -> Result<(), ApiError> {
        if self.is_staff() || self.id == owner_id {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Final exam belongs to another trainee"))
        }
    }
}

pub(crate) struct CurrentInstructor(pub(crate) CurrentUser);

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|value| value.to_str().ok()).map(str::trim)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let id = header_value(parts, USER_ID_HEADER)
            .and_then(|value| value.parse::<i64>().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing or invalid user identity".to_string()))?;
        let role = header_value(parts, USER_ROLE_HEADER)
            .and_then(|value| value.parse::<Role>().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing or invalid user role".to_string()))?;

        Ok(CurrentUser { id, role })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentInstructor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;

        if user.is_staff() {
            Ok(CurrentInstructor(user))
        } else {
            Err(ApiError::Forbidden("Instructor access required"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("Instructor".parse::<Role>(), Ok(Role::Instructor));
        assert_eq!(" admin ".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("trainee".parse::<Role>(), Ok(Role::Trainee));
        assert!("guest".parse::<Role>().is_err());
    }

    #[test]
    fn trainees_only_view_their_own_exam() {
        let trainee = CurrentUser { id: 7, role: Role::Trainee };
        assert!(trainee.ensure_can_view(7).is_ok());
        assert!(trainee.ensure_can_view(8).is_err());
        assert_eq!(trainee.audience(), Audience::Trainee);

        let instructor = CurrentUser { id: 1, role: Role::Instructor };
        assert!(instructor.ensure_can_view(8).is_ok());
        assert_eq!(instructor.audience(), Audience::Staff);
    }
}
