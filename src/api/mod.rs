use crate::core::offload::OffloadError;
use crate::core::traits::TutorError;
use axum::Json;
use axum::Router;
use axum::http::header::InvalidHeaderValue;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use log::error;
use serde::Serialize;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

pub mod tutor;

pub const LIVENESS_MESSAGE: &str = "Tutor API is running!";

pub fn router() -> Router {
    Router::new()
        .route("/", get(index))
        .nest("/ai", tutor::router())
}

/// Allows the listed browser origins, with credentials, any header and any method.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer, InvalidHeaderValue> {
    let origins = origins
        .iter()
        .map(|origin| HeaderValue::from_str(origin))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_headers(AllowHeaders::mirror_request())
        .allow_methods(AllowMethods::mirror_request()))
}

#[derive(Serialize, Debug)]
pub struct Liveness {
    pub message: &'static str,
}

async fn index() -> Json<Liveness> {
    Json(Liveness {
        message: LIVENESS_MESSAGE,
    })
}

/// Turns service failures into a bare 5xx response.
#[derive(Debug)]
pub struct ApiError(pub TutorError);

impl From<TutorError> for ApiError {
    fn from(e: TutorError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("{}", self.0);

        let status = match self.0 {
            TutorError::Offload(OffloadError::TimedOut(_)) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, status.canonical_reason().unwrap_or_default()).into_response()
    }
}
