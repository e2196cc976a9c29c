use axum::{response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct Status {
    #[schema(example = "Everything OK!")]
    healthcheck: String,
}

#[utoipa::path(
    get,
    path = "/healthcheck",
    tag = "health",
    responses((status = 200, description = "Service is up", body = Status))
)]
pub async fn healthcheck() -> impl IntoResponse {
    tracing::debug!("Healthcheck endpoint hit.");
    Json(Status {
        healthcheck: "Everything OK!".into(),
    })
}
