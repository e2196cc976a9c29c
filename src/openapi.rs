use crate::{
    detection::{DetectedObject, DetectionSummary},
    routes::{
        error::ErrorBody,
        health::{self, Status},
        metrics,
        predict::{self, ImageUpload},
    },
};
use std::path::Path;
use utoipa::OpenApi;

/// Route the generated document is served from, next to the Swagger UI.
pub const OPENAPI_JSON_PATH: &str = "/openapi.json";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "YOLO Object Detection Service",
        description = "Runs object detection on an uploaded image and returns either the detections as JSON or the annotated image."
    ),
    paths(
        health::healthcheck,
        metrics::metrics_handler,
        predict::img_object_detection_to_json,
        predict::img_object_detection_to_img,
        predict::img_object_detection_to_crop,
    ),
    components(schemas(DetectionSummary, DetectedObject, ErrorBody, Status, ImageUpload)),
    tags(
        (name = "detection", description = "Object detection on uploaded images"),
        (name = "health", description = "Liveness and metrics"),
    )
)]
pub struct ApiDoc;

pub fn openapi_document() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub fn write_openapi(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let document = openapi_document().to_pretty_json()?;
    std::fs::write(path, document)?;
    tracing::info!("OpenAPI documentation saved to {:?}", path);
    Ok(())
}
