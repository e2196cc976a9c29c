use crate::{
    detection::{best_detection_for, Detection, DetectionSummary},
    image_processor::{bytes_from_image, crop_to_detection, image_from_bytes},
    model_service::ModelService,
    routes::error::{ApiError, ErrorBody},
    server::SharedState,
    visualizer::draw_bounding_boxes,
};
use axum::{
    body::Body,
    extract::{
        rejection::{MultipartRejection, QueryRejection},
        Multipart, Query, State,
    },
    http::header,
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use image::RgbImage;
use serde::Deserialize;
use std::{sync::Arc, time::Instant};
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

const UPLOAD_FIELD: &str = "file";

/// Multipart body shared by the detection routes.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ImageUpload {
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    file: String,
}

/// Returns the bytes of the `file` field, or of the first non-empty field
/// when no field is called `file`.
async fn read_upload(mut multipart: Multipart) -> Result<Bytes, ApiError> {
    let mut fallback = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let is_upload = field.name() == Some(UPLOAD_FIELD);
        if !is_upload && fallback.is_some() {
            continue;
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        if is_upload {
            return Ok(data);
        }
        if !data.is_empty() {
            fallback = Some(data);
        }
    }

    fallback.ok_or_else(|| {
        ApiError::BadRequest(format!("missing multipart field `{}`", UPLOAD_FIELD))
    })
}

async fn detect<M: ModelService>(
    state: &SharedState<M>,
    multipart: Multipart,
    route: &str,
) -> Result<(Arc<RgbImage>, Vec<Detection>), ApiError> {
    state.metrics.record_request(route);

    let data = read_upload(multipart).await?;
    let image = Arc::new(image_from_bytes(&data)?);
    tracing::info!(
        "Received {}x{} image for object detection.",
        image.width(),
        image.height()
    );

    let started = Instant::now();
    let detections = state
        .model_service
        .predict(image.clone(), state.prediction)
        .await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    state.metrics.record_prediction_duration(elapsed_ms, route);
    state.metrics.record_detections(detections.len(), route);
    tracing::info!(
        "Model prediction completed in {} ms with {} detections.",
        elapsed_ms,
        detections.len()
    );
    for (i, detection) in detections.iter().enumerate() {
        tracing::debug!(
            "Detection {}: class={} name={} confidence={:.3} bbox=({:.1}, {:.1}, {:.1}, {:.1})",
            i,
            detection.class_id,
            detection.name,
            detection.confidence,
            detection.xmin,
            detection.ymin,
            detection.xmax,
            detection.ymax
        );
    }

    Ok((image, detections))
}

fn jpeg_response(image: &RgbImage) -> Result<Response, ApiError> {
    let data = bytes_from_image(image)?;
    Response::builder()
        .header(header::CONTENT_TYPE, "image/jpeg")
        .body(Body::from(data))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

#[utoipa::path(
    post,
    path = "/img_object_detection_to_json",
    tag = "detection",
    request_body(content = ImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Detected objects", body = DetectionSummary),
        (status = 400, description = "Missing or undecodable image", body = ErrorBody),
        (status = 500, description = "Prediction failed", body = ErrorBody),
    )
)]
#[instrument(skip(state, multipart))]
pub async fn img_object_detection_to_json<M: ModelService>(
    State(state): State<SharedState<M>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectionSummary>, ApiError> {
    let multipart = multipart?;
    let (_, detections) = detect(&state, multipart, "img_object_detection_to_json").await?;

    let summary = DetectionSummary::from(detections.as_slice());
    tracing::info!("Detection results: {}", summary.detect_objects_names);
    Ok(Json(summary))
}

#[utoipa::path(
    post,
    path = "/img_object_detection_to_img",
    tag = "detection",
    request_body(content = ImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image with bounding boxes", content_type = "image/jpeg", body = Vec<u8>),
        (status = 400, description = "Missing or undecodable image", body = ErrorBody),
        (status = 500, description = "Prediction failed", body = ErrorBody),
    )
)]
#[instrument(skip(state, multipart))]
pub async fn img_object_detection_to_img<M: ModelService>(
    State(state): State<SharedState<M>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let multipart = multipart?;
    let (image, detections) = detect(&state, multipart, "img_object_detection_to_img").await?;

    let mut annotated = Arc::unwrap_or_clone(image);
    draw_bounding_boxes(&mut annotated, &detections);
    tracing::info!("Returning image with bounding boxes.");

    jpeg_response(&annotated)
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CropQuery {
    /// Class to crop, e.g. `person`.
    pub class_name: String,
}

#[utoipa::path(
    post,
    path = "/img_object_detection_to_crop",
    tag = "detection",
    params(CropQuery),
    request_body(content = ImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Crop of the most confident detection of the class", content_type = "image/jpeg", body = Vec<u8>),
        (status = 400, description = "Bad upload or class not found in image", body = ErrorBody),
        (status = 500, description = "Prediction failed", body = ErrorBody),
    )
)]
#[instrument(skip(state, multipart))]
pub async fn img_object_detection_to_crop<M: ModelService>(
    State(state): State<SharedState<M>>,
    query: Result<Query<CropQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let multipart = multipart?;
    let (image, detections) = detect(&state, multipart, "img_object_detection_to_crop").await?;

    let best = best_detection_for(&detections, &query.class_name)
        .ok_or_else(|| ApiError::ClassNotFound(query.class_name.clone()))?;
    let cropped = crop_to_detection(&image, best);
    tracing::info!("Image cropped successfully for class '{}'.", query.class_name);

    jpeg_response(&cropped)
}
