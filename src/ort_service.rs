use crate::{
    config::{Device, ModelConfig},
    detection::{non_max_suppression, Detection},
    model_service::{InferenceError, ModelService, PredictParams},
    state::Labels,
};
use async_trait::async_trait;
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array, ArrayViewD, Axis, Ix4};
use ort::{
    execution_providers::{
        CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
        TensorRTExecutionProvider,
    },
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use parking_lot::Mutex;
use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};

fn load_error(e: impl Display) -> InferenceError {
    InferenceError::Load(e.to_string())
}

fn execution_providers(device: Device) -> Vec<ExecutionProviderDispatch> {
    match device {
        Device::Cpu => vec![CPUExecutionProvider::default().build()],
        Device::Cuda => vec![
            CUDAExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ],
        Device::Tensorrt => vec![
            TensorRTExecutionProvider::default()
                .with_engine_cache(true)
                .build(),
            CUDAExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ],
    }
}

/// Resizes to the square model input and lays the pixels out as a
/// normalized `[1, 3, size, size]` tensor.
fn transform_image(image: &RgbImage, image_size: u32) -> Array<f32, Ix4> {
    let size = image_size as usize;
    let resized = image::imageops::resize(image, image_size, image_size, FilterType::CatmullRom);

    let mut input = Array::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b] = pixel.0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    input
}

/// Where the candidates of one model pass are mapped back to.
#[derive(Debug, Clone, Copy)]
struct OutputFrame {
    image_width: u32,
    image_height: u32,
    image_size: u32,
    flipped: bool,
}

/// Turns a raw `[1, 4 + classes, candidates]` output into detections in
/// original image space. Candidates below `confidence` are dropped; no
/// suppression happens here.
fn decode_output(
    output: ArrayViewD<f32>,
    frame: OutputFrame,
    confidence: f32,
    labels: &Labels,
) -> Result<Vec<Detection>, InferenceError> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
        return Err(InferenceError::Output(format!(
            "expected shape [1, 4 + classes, candidates], got {:?}",
            shape
        )));
    }

    let output = output.index_axis(Axis(0), 0);
    let scale_x = frame.image_width as f32 / frame.image_size as f32;
    let scale_y = frame.image_height as f32 / frame.image_size as f32;

    let mut detections = Vec::new();
    for candidate in output.axis_iter(Axis(1)) {
        let best = candidate
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .reduce(|accum, item| if item.1 > accum.1 { item } else { accum });
        let Some((class_id, score)) = best else {
            continue;
        };

        if score < confidence {
            continue;
        }

        let xc = candidate[0] * scale_x;
        let yc = candidate[1] * scale_y;
        let w = candidate[2] * scale_x;
        let h = candidate[3] * scale_y;

        let (mut xmin, mut xmax) = (xc - w / 2., xc + w / 2.);
        if frame.flipped {
            let width = frame.image_width as f32;
            (xmin, xmax) = (width - xmax, width - xmin);
        }

        detections.push(Detection {
            class_id,
            name: labels.name(class_id),
            confidence: score,
            xmin,
            ymin: yc - h / 2.,
            xmax,
            ymax: yc + h / 2.,
        });
    }

    Ok(detections)
}

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    labels: Arc<Labels>,
    iou_threshold: f32,
    max_detections: usize,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig, labels: Labels) -> Result<Self, InferenceError> {
        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()
                    .map_err(load_error)?
                    .with_execution_providers(execution_providers(model_config.device))
                    .map_err(load_error)?
                    .with_optimization_level(GraphOptimizationLevel::Level3)
                    .map_err(load_error)?
                    .commit_from_file(model_config.get_path())
                    .map_err(load_error)?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, InferenceError>>()?;

        tracing::info!(
            "Created {} ONNX sessions from {:?} on {:?}",
            num_instances,
            model_config.get_path(),
            model_config.device
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            labels: Arc::new(labels),
            iou_threshold: model_config.iou_threshold,
            max_detections: model_config.max_detections,
        })
    }

    fn run_inference(
        &self,
        image: &RgbImage,
        params: &PredictParams,
        flipped: bool,
    ) -> Result<Vec<Detection>, InferenceError> {
        let input = transform_image(image, params.image_size);
        let input_value = Value::from_array(input)
            .map_err(|e| InferenceError::Input(e.to_string()))?;

        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index].lock();
        tracing::debug!("Handling request with session {}", index);

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| InferenceError::Run(e.to_string()))?;
        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| InferenceError::Output(e.to_string()))?;

        let frame = OutputFrame {
            image_width: image.width(),
            image_height: image.height(),
            image_size: params.image_size,
            flipped,
        };
        decode_output(output, frame, params.confidence, &self.labels)
    }

    fn predict_blocking(
        &self,
        image: &RgbImage,
        params: &PredictParams,
    ) -> Result<Vec<Detection>, InferenceError> {
        let started = Instant::now();
        let plain = self.run_inference(image, params, false)?;

        let flipped = if params.augment {
            let mirrored = image::imageops::flip_horizontal(image);
            self.run_inference(&mirrored, params, true)?
        } else {
            Vec::new()
        };

        let detections = merge_passes(plain, flipped, self.iou_threshold, self.max_detections);
        tracing::debug!(
            "Predicted {} detections in {} ms",
            detections.len(),
            started.elapsed().as_millis()
        );
        Ok(detections)
    }
}

/// Joins the plain pass with the already un-flipped boxes of the mirrored
/// pass and suppresses the duplicates between them.
fn merge_passes(
    mut plain: Vec<Detection>,
    flipped: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    plain.extend(flipped);
    non_max_suppression(plain, iou_threshold, max_detections)
}

#[async_trait]
impl ModelService for OrtModelService {
    async fn predict(
        &self,
        image: Arc<RgbImage>,
        params: PredictParams,
    ) -> Result<Vec<Detection>, InferenceError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.predict_blocking(&image, &params)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::detection;
    use image::Rgb;
    use ndarray::Array3;

    fn labels() -> Labels {
        Labels::new(vec!["person".to_string(), "bicycle".to_string(), "car".to_string()])
    }

    fn frame(flipped: bool) -> OutputFrame {
        OutputFrame {
            image_width: 1280,
            image_height: 640,
            image_size: 640,
            flipped,
        }
    }

    // Two candidates over three classes: a confident car and a weak person.
    fn raw_output() -> Array3<f32> {
        let mut output = Array3::<f32>::zeros((1, 7, 2));
        let car = [320., 320., 100., 200., 0.1, 0.05, 0.9];
        let person = [100., 100., 50., 50., 0.3, 0.1, 0.0];
        for (row, (c, p)) in car.iter().zip(person.iter()).enumerate() {
            output[[0, row, 0]] = *c;
            output[[0, row, 1]] = *p;
        }
        output
    }

    #[test]
    fn test_transform_image() {
        let img = RgbImage::from_pixel(100, 50, Rgb([255, 0, 0]));

        let input = transform_image(&img, 64);

        assert_eq!(input.shape(), &[1, 3, 64, 64]);
        assert!((input[[0, 0, 10, 10]] - 1.0).abs() < 1e-3);
        assert!(input[[0, 1, 10, 10]].abs() < 1e-3);
    }

    #[test]
    fn test_decode_output_filters_and_rescales() {
        let output = raw_output();

        let detections = decode_output(output.view().into_dyn(), frame(false), 0.5, &labels()).unwrap();

        assert_eq!(detections.len(), 1);
        let car = &detections[0];
        assert_eq!(car.class_id, 2);
        assert_eq!(car.name, "car");
        assert!((car.confidence - 0.9).abs() < 1e-6);
        assert!((car.xmin - 540.).abs() < 1e-3);
        assert!((car.xmax - 740.).abs() < 1e-3);
        assert!((car.ymin - 220.).abs() < 1e-3);
        assert!((car.ymax - 420.).abs() < 1e-3);
    }

    #[test]
    fn test_decode_output_is_reproducible() {
        let output = raw_output();

        let first = decode_output(output.view().into_dyn(), frame(false), 0.25, &labels()).unwrap();
        let second = decode_output(output.view().into_dyn(), frame(false), 0.25, &labels()).unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_decode_output_unflips_boxes() {
        let output = raw_output();

        let detections = decode_output(output.view().into_dyn(), frame(true), 0.25, &labels()).unwrap();

        let person = detections.iter().find(|d| d.name == "person").unwrap();
        assert!((person.xmin - 1030.).abs() < 1e-3);
        assert!((person.xmax - 1130.).abs() < 1e-3);
        assert!((person.ymin - 75.).abs() < 1e-3);
    }

    #[test]
    fn test_merge_passes_collapses_mirrored_duplicates() {
        let plain = vec![detection(0, "person", 0.9, [100., 50., 200., 150.])];
        let flipped = vec![
            detection(0, "person", 0.85, [102., 50., 201., 150.]),
            detection(2, "car", 0.6, [400., 300., 500., 380.]),
        ];

        let merged = merge_passes(plain, flipped, 0.7, 300);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "person");
        assert!((merged[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(merged[1].name, "car");
    }

    #[test]
    fn test_merge_passes_without_augmentation() {
        let plain = vec![
            detection(0, "person", 0.5, [0., 0., 10., 10.]),
            detection(0, "person", 0.8, [40., 40., 60., 60.]),
        ];

        let merged = merge_passes(plain, Vec::new(), 0.7, 300);

        assert_eq!(merged.len(), 2);
        assert!((merged[0].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_decode_output_rejects_bad_shape() {
        let output = Array3::<f32>::zeros((1, 4, 10));
        let result = decode_output(output.view().into_dyn(), frame(false), 0.5, &labels());
        assert!(matches!(result, Err(InferenceError::Output(_))));
    }
}
