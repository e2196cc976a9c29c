mod docs;
pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod predict;

pub mod error;

use crate::{model_service::ModelService, server::SharedState};
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/", get(docs::redirect_to_docs))
        .route("/healthcheck", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler::<M>))
        .route(
            "/img_object_detection_to_json",
            post(predict::img_object_detection_to_json::<M>),
        )
        .route(
            "/img_object_detection_to_img",
            post(predict::img_object_detection_to_img::<M>),
        )
        .route(
            "/img_object_detection_to_crop",
            post(predict::img_object_detection_to_crop::<M>),
        )
        .merge(docs::swagger_ui())
}
