//! Tutor endpoints

use crate::api::ApiError;
use crate::api::tutor::schemas::{IntentResponse, TutorRequest, TutorResponse};
use crate::core::traits::TutorService;
use axum::routing::post;
use axum::{Json, Router};
use di_axum::Inject;

pub fn router() -> Router {
    Router::new()
        .route("/tutor", post(ask_tutor))
        .route("/intent", post(classify_intent))
}

async fn ask_tutor(
    Inject(tutor_service): Inject<dyn TutorService>,
    Json(request): Json<TutorRequest>,
) -> Result<Json<TutorResponse>, ApiError> {
    let answer = tutor_service.answer_question(request.question).await?;

    Ok(Json(TutorResponse { answer }))
}

async fn classify_intent(
    Inject(tutor_service): Inject<dyn TutorService>,
    Json(request): Json<TutorRequest>,
) -> Result<Json<IntentResponse>, ApiError> {
    let intent = tutor_service.classify_intent(request.question).await?;

    Ok(Json(IntentResponse { intent }))
}

pub mod schemas {
    use crate::core::prompts::Intent;
    use serde::{Deserialize, Serialize};

    #[derive(Deserialize, Debug)]
    pub struct TutorRequest {
        pub question: String,
    }

    #[derive(Serialize, Debug)]
    pub struct TutorResponse {
        pub answer: String,
    }

    #[derive(Serialize, Debug)]
    pub struct IntentResponse {
        pub intent: Intent,
    }
}
