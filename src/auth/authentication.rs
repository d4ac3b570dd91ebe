use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;

use super::{AuthUser, Caller, user_for_token};
use crate::backend::Backend;
use crate::error::AppError;
use crate::role::current_role;
use crate::validation::ValidationResponse;

pub const SESSION_COOKIE: &str = "session_token";

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = AppError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("user_auth_guard");
        let _guard = auth_span.enter();

        let Some(token) = request
            .cookies()
            .get_private(SESSION_COOKIE)
            .map(|c| c.value().to_string())
        else {
            return Outcome::Forward(Status::Unauthorized);
        };

        let Some(backend) = request.rocket().state::<Backend>() else {
            tracing::error!("Backend not found in managed state");
            return Outcome::Error((
                Status::InternalServerError,
                AppError::Internal("Backend missing".to_string()),
            ));
        };

        match user_for_token(backend, &token).await {
            Ok(user) => {
                tracing::info!(uid = %user.uid, "User authenticated via session token");
                Outcome::Success(user)
            }
            Err(err @ AppError::Authentication(_)) => {
                tracing::warn!(error = %err, "Rejected session token");
                Outcome::Forward(Status::Unauthorized)
            }
            Err(err) => {
                err.log_and_record("Session lookup");
                Outcome::Error((Status::InternalServerError, err))
            }
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Caller {
    type Error = AppError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let user = match AuthUser::from_request(request).await {
            Outcome::Success(user) => user,
            Outcome::Forward(status) => return Outcome::Forward(status),
            Outcome::Error(err) => return Outcome::Error(err),
        };

        let Some(backend) = request.rocket().state::<Backend>() else {
            return Outcome::Error((
                Status::InternalServerError,
                AppError::Internal("Backend missing".to_string()),
            ));
        };

        match current_role(backend.store().as_ref(), &user.uid).await {
            Ok(role) => Outcome::Success(Caller { user, role }),
            Err(err) => {
                err.log_and_record("Role lookup");
                Outcome::Error((Status::InternalServerError, err))
            }
        }
    }
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    tracing::warn!("Unauthorized access attempt");
    Custom(
        Status::Unauthorized,
        Json(ValidationResponse::with_error("authentication", "Giriş gerekli.")),
    )
}

#[catch(403)]
pub fn forbidden_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    tracing::warn!("Forbidden access attempt");
    Custom(
        Status::Forbidden,
        Json(ValidationResponse::with_error(
            "authorization",
            "Bu işlem için yetkiniz yok.",
        )),
    )
}
