use crate::detection::Detection;
use async_trait::async_trait;
use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;

/// Thresholds handed to the model for a single inference call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictParams {
    pub confidence: f32,
    pub image_size: u32,
    pub augment: bool,
}

impl Default for PredictParams {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            image_size: 640,
            augment: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("failed to build input tensor: {0}")]
    Input(String),
    #[error("inference failed: {0}")]
    Run(String),
    #[error("unexpected model output: {0}")]
    Output(String),
    #[error("inference task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait ModelService: Send + Sync + Clone + 'static {
    async fn predict(
        &self,
        image: Arc<RgbImage>,
        params: PredictParams,
    ) -> Result<Vec<Detection>, InferenceError>;
}
