//! Face crops for the embedder.
//!
//! Two strategies: a margin-expanded box crop (how the reference gallery was
//! generated) and a five-point similarity-transform alignment.

use crate::detector::Detection;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::str::FromStr;

/// Canonical landmark positions for a 112×112 crop.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// How a detection is turned into a square crop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlignMode {
    /// Bounding box expanded by the margin, then resized.
    #[default]
    Crop,
    /// Similarity transform onto canonical landmark positions.
    Landmarks,
}

impl FromStr for AlignMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crop" => Ok(Self::Crop),
            "landmarks" => Ok(Self::Landmarks),
            other => Err(format!("unknown align mode: {other}")),
        }
    }
}

/// 2×3 similarity transform `[a, -b, tx; b, a, ty]`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares fit mapping `src` points onto `dst` points.
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let n = src.len() as f32;
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (smx, smy) = mean(src);
        let (dmx, dmy) = mean(dst);

        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        let mut var = 0.0f32;
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst) {
            let (sx, sy) = (sx - smx, sy - smy);
            let (dx, dy) = (dx - dmx, dy - dmy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            var += sx * sx + sy * sy;
        }

        if var < 1e-12 {
            return Self { a: 1.0, b: 0.0, tx: dmx - smx, ty: dmy - smy };
        }

        let a = dot / var;
        let b = cross / var;
        Self {
            a,
            b,
            tx: dmx - (a * smx - b * smy),
            ty: dmy - (b * smx + a * smy),
        }
    }

    /// Map an output pixel back to source coordinates.
    fn invert_point(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let (dx, dy) = (x - self.tx, y - self.ty);
        Some((
            (self.a * dx + self.b * dy) / det,
            (-self.b * dx + self.a * dy) / det,
        ))
    }
}

/// Bilinear sample of one RGB pixel; out-of-bounds reads are black.
fn sample(image: &RgbImage, x: f32, y: f32) -> [u8; 3] {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let at = |px: f32, py: f32, c: usize| -> f32 {
        if px < 0.0 || py < 0.0 || px >= image.width() as f32 || py >= image.height() as f32 {
            0.0
        } else {
            image.get_pixel(px as u32, py as u32)[c] as f32
        }
    };

    std::array::from_fn(|c| {
        let v = at(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
            + at(x0 + 1.0, y0, c) * fx * (1.0 - fy)
            + at(x0, y0 + 1.0, c) * (1.0 - fx) * fy
            + at(x0 + 1.0, y0 + 1.0, c) * fx * fy;
        v.round().clamp(0.0, 255.0) as u8
    })
}

/// Warp the face so its landmarks land on the canonical positions, scaled
/// to `size` with `margin` pixels of border.
pub fn align_landmarks(
    image: &RgbImage,
    landmarks: &[(f32, f32); 5],
    size: u32,
    margin: u32,
) -> RgbImage {
    let inner = size.saturating_sub(2 * margin).max(1) as f32;
    let scale = inner / 112.0;
    let target: [(f32, f32); 5] = std::array::from_fn(|i| {
        let (x, y) = REFERENCE_LANDMARKS_112[i];
        (x * scale + margin as f32, y * scale + margin as f32)
    });

    let transform = Similarity::estimate(landmarks, &target);
    RgbImage::from_fn(size, size, |ox, oy| match transform.invert_point(ox as f32, oy as f32) {
        Some((sx, sy)) => image::Rgb(sample(image, sx, sy)),
        None => image::Rgb([0, 0, 0]),
    })
}

/// Crop the detection box, grown by `margin` pixels measured in output
/// space, and resize it to `size`×`size`.
pub fn crop_box(image: &RgbImage, face: &Detection, size: u32, margin: u32) -> RgbImage {
    let denom = size.saturating_sub(margin).max(1) as f32;
    let grow_x = margin as f32 * face.width / denom;
    let grow_y = margin as f32 * face.height / denom;

    let max_x = image.width() as f32;
    let max_y = image.height() as f32;
    let left = (face.x - grow_x / 2.0).clamp(0.0, max_x);
    let top = (face.y - grow_y / 2.0).clamp(0.0, max_y);
    let right = (face.x + face.width + grow_x / 2.0).clamp(0.0, max_x);
    let bottom = (face.y + face.height + grow_y / 2.0).clamp(0.0, max_y);

    let (x0, y0) = (left as u32, top as u32);
    let w = ((right - left).round() as u32).min(image.width() - x0);
    let h = ((bottom - top).round() as u32).min(image.height() - y0);
    if w == 0 || h == 0 {
        return RgbImage::new(size, size);
    }

    let region = imageops::crop_imm(image, x0, y0, w, h).to_image();
    imageops::resize(&region, size, size, FilterType::Triangle)
}

/// Produce a `size`×`size` crop for a detection using `mode`.
///
/// Falls back to a box crop when landmarks are requested but missing.
pub fn extract_face(
    image: &RgbImage,
    face: &Detection,
    mode: AlignMode,
    size: u32,
    margin: u32,
) -> RgbImage {
    match (mode, face.landmarks.as_ref()) {
        (AlignMode::Landmarks, Some(landmarks)) => align_landmarks(image, landmarks, size, margin),
        (AlignMode::Landmarks, None) => {
            tracing::debug!("detection has no landmarks, falling back to box crop");
            crop_box(image, face, size, margin)
        }
        (AlignMode::Crop, _) => crop_box(image, face, size, margin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(w: u32, h: u32, v: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, image::Rgb([v, v, v]))
    }

    fn face(x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection { x, y, width: w, height: h, confidence: 0.9, landmarks: None }
    }

    #[test]
    fn test_identity_similarity() {
        let t = Similarity::estimate(&REFERENCE_LANDMARKS_112, &REFERENCE_LANDMARKS_112);
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-3 && t.ty.abs() < 1e-3);
    }

    #[test]
    fn test_scaled_similarity() {
        let src: [(f32, f32); 5] = std::array::from_fn(|i| {
            let (x, y) = REFERENCE_LANDMARKS_112[i];
            (x * 2.0, y * 2.0)
        });
        let t = Similarity::estimate(&src, &REFERENCE_LANDMARKS_112);
        assert!((t.a - 0.5).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4);
    }

    #[test]
    fn test_rotated_similarity_roundtrip() {
        // 90° rotation: (x, y) → (-y, x)
        let dst = REFERENCE_LANDMARKS_112;
        let src: [(f32, f32); 5] = std::array::from_fn(|i| (-dst[i].1, dst[i].0));
        let t = Similarity::estimate(&src, &dst);
        let (sx, sy) = t.invert_point(dst[2].0, dst[2].1).unwrap();
        assert!((sx - src[2].0).abs() < 1e-2 && (sy - src[2].1).abs() < 1e-2);
    }

    #[test]
    fn test_align_output_size() {
        let aligned = align_landmarks(&gray(640, 480, 128), &REFERENCE_LANDMARKS_112, 160, 0);
        assert_eq!(aligned.dimensions(), (160, 160));
    }

    #[test]
    fn test_align_moves_landmark_to_reference() {
        let mut image = gray(200, 200, 0);
        let landmarks: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];
        // Bright 5×5 patch on the left eye.
        for y in 58..63 {
            for x in 78..83 {
                image.put_pixel(x, y, image::Rgb([255, 255, 255]));
            }
        }

        let aligned = align_landmarks(&image, &landmarks, 112, 0);
        let (rx, ry) = REFERENCE_LANDMARKS_112[0];
        let brightest = (ry as u32 - 1..=ry as u32 + 1)
            .flat_map(|y| (rx as u32 - 1..=rx as u32 + 1).map(move |x| (x, y)))
            .map(|(x, y)| aligned.get_pixel(x, y)[0])
            .max()
            .unwrap();
        assert!(brightest > 100, "max near reference left eye = {brightest}");
    }

    #[test]
    fn test_crop_box_size_and_content() {
        let mut image = gray(100, 100, 0);
        for y in 20..60 {
            for x in 30..70 {
                image.put_pixel(x, y, image::Rgb([200, 10, 10]));
            }
        }
        let crop = crop_box(&image, &face(30.0, 20.0, 40.0, 40.0), 160, 0);
        assert_eq!(crop.dimensions(), (160, 160));
        assert_eq!(crop.get_pixel(80, 80)[0], 200);
    }

    #[test]
    fn test_crop_box_clamped_to_image() {
        let crop = crop_box(&gray(50, 50, 90), &face(-20.0, 30.0, 100.0, 100.0), 32, 8);
        assert_eq!(crop.dimensions(), (32, 32));
        assert_eq!(crop.get_pixel(0, 0)[0], 90);
    }

    #[test]
    fn test_extract_face_falls_back_without_landmarks() {
        let image = gray(64, 64, 77);
        let crop = extract_face(&image, &face(8.0, 8.0, 48.0, 48.0), AlignMode::Landmarks, 32, 0);
        assert_eq!(crop.dimensions(), (32, 32));
        assert_eq!(crop.get_pixel(16, 16)[0], 77);
    }

    #[test]
    fn test_align_mode_from_str() {
        assert_eq!("crop".parse::<AlignMode>().unwrap(), AlignMode::Crop);
        assert_eq!("Landmarks".parse::<AlignMode>().unwrap(), AlignMode::Landmarks);
        assert!("affine".parse::<AlignMode>().is_err());
    }
}
