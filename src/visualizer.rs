use crate::{detection::Detection, font};
use image::{Rgb, RgbImage};
use rand::{rngs::StdRng, Rng, SeedableRng};

const BOX_THICKNESS: i64 = 2;
const LABEL_SCALE: u32 = 2;
const LABEL_PADDING: u32 = 2;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

// FNV-1a, so colors do not change between builds or processes.
fn stable_hash(value: &str) -> u64 {
    value.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Pseudo-random color keyed by class name.
pub fn class_color(class_name: &str) -> Rgb<u8> {
    let mut rng = StdRng::seed_from_u64(stable_hash(class_name));
    Rgb([rng.random(), rng.random(), rng.random()])
}

fn fill_rect(image: &mut RgbImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
    let x0 = x0.max(0);
    let y0 = y0.max(0);
    let x1 = x1.min(image.width() as i64);
    let y1 = y1.min(image.height() as i64);

    for y in y0..y1 {
        for x in x0..x1 {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_rect_outline(image: &mut RgbImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
    let t = BOX_THICKNESS;
    fill_rect(image, x0, y0, x1 + 1, y0 + t, color);
    fill_rect(image, x0, y1 + 1 - t, x1 + 1, y1 + 1, color);
    fill_rect(image, x0, y0, x0 + t, y1 + 1, color);
    fill_rect(image, x1 + 1 - t, y0, x1 + 1, y1 + 1, color);
}

/// Draws one outlined box and one filled label per detection. Returns how
/// many detections were drawn; boxes entirely outside the image are skipped.
pub fn draw_bounding_boxes(image: &mut RgbImage, detections: &[Detection]) -> usize {
    if detections.is_empty() {
        tracing::warn!("No predictions to draw on the image.");
        return 0;
    }

    let (width, height) = (image.width() as i64, image.height() as i64);
    let mut drawn = 0;

    for detection in detections {
        let x0 = detection.xmin.round() as i64;
        let y0 = detection.ymin.round() as i64;
        let x1 = detection.xmax.round() as i64;
        let y1 = detection.ymax.round() as i64;

        if x1 < x0 || y1 < y0 || x1 < 0 || y1 < 0 || x0 >= width || y0 >= height {
            tracing::debug!(?detection, "skipping box outside of image");
            continue;
        }

        let x0 = x0.max(0);
        let y0 = y0.max(0);
        let x1 = x1.min(width - 1);
        let y1 = y1.min(height - 1);

        let color = class_color(&detection.name);
        draw_rect_outline(image, x0, y0, x1, y1, color);

        let label = format!("{} ({:.2})", detection.name, detection.confidence);
        let (text_width, text_height) = font::text_size(&label, LABEL_SCALE);
        let label_width = (text_width + 2 * LABEL_PADDING) as i64;
        let label_height = (text_height + 2 * LABEL_PADDING) as i64;

        let label_y = if y0 > label_height { y0 - label_height } else { y0 };
        fill_rect(image, x0, label_y, x0 + label_width, label_y + label_height, color);
        font::draw_text(
            image,
            x0 + LABEL_PADDING as i64,
            label_y + LABEL_PADDING as i64,
            &label,
            LABEL_SCALE,
            LABEL_TEXT_COLOR,
        );

        drawn += 1;
    }

    tracing::debug!("Drew {} of {} bounding boxes", drawn, detections.len());
    drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::detection;

    #[test]
    fn test_class_color_is_deterministic() {
        assert_eq!(class_color("person"), class_color("person"));
        assert_eq!(class_color("dog"), class_color(&"dog".to_string()));
        assert_ne!(class_color("person"), class_color("dog"));
    }

    #[test]
    fn test_drawing_is_idempotent() {
        let base = RgbImage::from_pixel(200, 150, Rgb([10, 20, 30]));
        let detections = vec![
            detection(0, "person", 0.91, [20., 40., 120., 140.]),
            detection(16, "dog", 0.55, [100., 5., 190., 60.]),
        ];

        let mut first = base.clone();
        let mut second = base.clone();
        assert_eq!(draw_bounding_boxes(&mut first, &detections), 2);
        assert_eq!(draw_bounding_boxes(&mut second, &detections), 2);

        assert_eq!(first, second);
        assert_ne!(first, base);
    }

    #[test]
    fn test_box_outline_uses_class_color() {
        let mut image = RgbImage::new(100, 100);
        let detections = vec![detection(2, "car", 0.8, [10., 50., 90., 90.])];

        draw_bounding_boxes(&mut image, &detections);

        let color = class_color("car");
        assert_eq!(image.get_pixel(10, 70), &color);
        assert_eq!(image.get_pixel(90, 70), &color);
        assert_eq!(image.get_pixel(50, 90), &color);
        assert_eq!(image.get_pixel(50, 75), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_empty_and_out_of_image_detections() {
        let base = RgbImage::from_pixel(50, 50, Rgb([1, 2, 3]));

        let mut image = base.clone();
        assert_eq!(draw_bounding_boxes(&mut image, &[]), 0);
        assert_eq!(image, base);

        let outside = vec![detection(0, "person", 0.9, [60., 60., 80., 80.])];
        assert_eq!(draw_bounding_boxes(&mut image, &outside), 0);
        assert_eq!(image, base);
    }
}
