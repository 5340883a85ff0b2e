use crate::yunet;
use anyhow::Result;
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::{Array1, Array4};
use ort::{session::Session, value::Value};

/// Square canvas the YuNet export was traced with.
pub const DETECTOR_INPUT_SIZE: u32 = 640;

/// Detection result from YuNet, in original image pixels.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // 5 points: x1,y1,x2,y2,...,x5,y5
}

/// Raw recognizer output for one face.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Array1<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            vector: Array1::from_vec(values),
        }
    }

    pub fn len(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.vector.to_vec()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Input contract of a recognizer model: square side, channel order and
/// per-pixel affine normalization `(x - mean) * scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderInput {
    pub size: u32,
    pub order: ChannelOrder,
    pub mean: f32,
    pub scale: f32,
}

impl EncoderInput {
    /// OpenCV Zoo SFace: BGR, raw [0, 255].
    pub const SFACE: Self = Self {
        size: 112,
        order: ChannelOrder::Bgr,
        mean: 0.0,
        scale: 1.0,
    };

    /// InsightFace ArcFace exports.
    pub const ARCFACE: Self = Self {
        size: 112,
        order: ChannelOrder::Rgb,
        mean: 127.5,
        scale: 1.0 / 127.5,
    };

    pub const FACENET: Self = Self {
        size: 160,
        order: ChannelOrder::Rgb,
        mean: 127.5,
        scale: 1.0 / 128.0,
    };
}

/// Pack an RGB image into a planar `[1, 3, H, W]` tensor.
pub fn to_planar(
    img: &RgbImage,
    order: ChannelOrder,
    mean: f32,
    scale: f32,
) -> Result<Array4<f32>> {
    let (w, h) = img.dimensions();
    let pixel_count = (w * h) as usize;
    let mut data = vec![0.0f32; 3 * pixel_count];

    let (first, rest) = data.split_at_mut(pixel_count);
    let (second, third) = rest.split_at_mut(pixel_count);

    for (i, px) in img.pixels().enumerate() {
        let (c0, c2) = match order {
            ChannelOrder::Rgb => (px[0], px[2]),
            ChannelOrder::Bgr => (px[2], px[0]),
        };
        first[i] = (c0 as f32 - mean) * scale;
        second[i] = (px[1] as f32 - mean) * scale;
        third[i] = (c2 as f32 - mean) * scale;
    }

    Ok(Array4::from_shape_vec((1, 3, h as usize, w as usize), data)?)
}

/// Detect faces in an image using YuNet detector
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    // Letterbox onto the square canvas so the aspect ratio survives
    let target_size = DETECTOR_INPUT_SIZE;
    let (orig_width, orig_height) = img.dimensions();
    if orig_width == 0 || orig_height == 0 {
        anyhow::bail!("empty image");
    }

    let scale = target_size as f32 / orig_width.max(orig_height) as f32;
    let new_width = ((orig_width as f32 * scale) as u32).max(1);
    let new_height = ((orig_height as f32 * scale) as u32).max(1);
    let resized = img.resize_exact(new_width, new_height, image::imageops::FilterType::Triangle);

    let mut canvas = RgbImage::new(target_size, target_size);
    let offset_x = (target_size - new_width) / 2;
    let offset_y = (target_size - new_height) / 2;
    image::imageops::overlay(&mut canvas, &resized.to_rgb8(), offset_x as i64, offset_y as i64);

    let input_tensor = Value::from_array(to_planar(&canvas, ChannelOrder::Bgr, 0.0, 1.0)?)?;
    let outputs = session.run(ort::inputs![input_tensor])?;

    let mut raw: Vec<yunet::RawOutput> = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        raw.push((shape.iter().copied().collect(), data.to_vec()));
    }

    let unmap = |v: f32, offset: u32| (v - offset as f32) / scale;

    let mut detections: Vec<Detection> =
        yunet::decode(&raw, target_size as usize, score_threshold)?
            .into_iter()
            .map(|d| {
                let mut landmarks = [0.0f32; 10];
                for i in 0..5 {
                    landmarks[i * 2] = unmap(d.landmarks[i * 2], offset_x);
                    landmarks[i * 2 + 1] = unmap(d.landmarks[i * 2 + 1], offset_y);
                }
                Detection {
                    bbox: [
                        unmap(d.bbox[0], offset_x),
                        unmap(d.bbox[1], offset_y),
                        d.bbox[2] / scale,
                        d.bbox[3] / scale,
                    ],
                    score: d.score,
                    landmarks,
                }
            })
            .collect();

    if nms_threshold < 1.0 {
        detections = nms(&detections, nms_threshold);
    }

    log::debug!("yunet: {} face(s) above {:.2}", detections.len(), score_threshold);
    Ok(detections)
}

/// Apply non-maximum suppression to remove overlapping detections
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in sorted {
        if keep
            .iter()
            .all(|kept| compute_iou(&kept.bbox, &candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}

/// Crop a `size`x`size` face, rotating and scaling so the eyes land on the
/// ArcFace reference positions (defined for 112x112).
pub fn align_face(img: &DynamicImage, detection: &Detection, size: u32) -> Result<DynamicImage> {
    const REF_LEFT_EYE: (f32, f32) = (38.2946, 51.6963);
    const REF_RIGHT_EYE: (f32, f32) = (73.5318, 51.5014);

    let left_eye = (detection.landmarks[0], detection.landmarks[1]);
    let right_eye = (detection.landmarks[2], detection.landmarks[3]);

    let eye_dx = right_eye.0 - left_eye.0;
    let eye_dy = right_eye.1 - left_eye.1;
    let eye_dist = eye_dx.hypot(eye_dy);
    if eye_dist < f32::EPSILON {
        anyhow::bail!("degenerate eye landmarks");
    }

    let unit = size as f32 / 112.0;
    let ref_dist = (REF_RIGHT_EYE.0 - REF_LEFT_EYE.0).hypot(REF_RIGHT_EYE.1 - REF_LEFT_EYE.1);
    let scale = unit * ref_dist / eye_dist;
    let angle = eye_dy.atan2(eye_dx);

    // Forward transform: out = M * in + t, with M = scale * R(-angle)
    let a = scale * angle.cos();
    let b = scale * angle.sin();
    let eye_center = (
        (left_eye.0 + right_eye.0) / 2.0,
        (left_eye.1 + right_eye.1) / 2.0,
    );
    let ref_center = (
        (REF_LEFT_EYE.0 + REF_RIGHT_EYE.0) / 2.0 * unit,
        (REF_LEFT_EYE.1 + REF_RIGHT_EYE.1) / 2.0 * unit,
    );
    let tx = ref_center.0 - (a * eye_center.0 + b * eye_center.1);
    let ty = ref_center.1 - (-b * eye_center.0 + a * eye_center.1);

    let src = img.to_rgb8();
    let (img_w, img_h) = src.dimensions();
    let det = a * a + b * b;
    let mut output = RgbImage::new(size, size);

    for (out_x, out_y, pixel) in output.enumerate_pixels_mut() {
        let dx = out_x as f32 - tx;
        let dy = out_y as f32 - ty;
        let in_x = (a * dx - b * dy) / det;
        let in_y = (b * dx + a * dy) / det;

        if in_x < 0.0 || in_y < 0.0 || in_x >= img_w as f32 || in_y >= img_h as f32 {
            continue;
        }

        let x0 = in_x.floor() as u32;
        let y0 = in_y.floor() as u32;
        let x1 = (x0 + 1).min(img_w - 1);
        let y1 = (y0 + 1).min(img_h - 1);
        let fx = in_x - x0 as f32;
        let fy = in_y - y0 as f32;

        let p00 = src.get_pixel(x0, y0);
        let p10 = src.get_pixel(x1, y0);
        let p01 = src.get_pixel(x0, y1);
        let p11 = src.get_pixel(x1, y1);

        for c in 0..3 {
            let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
            let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
            pixel[c] = (top * (1.0 - fy) + bottom * fy).round() as u8;
        }
    }

    Ok(DynamicImage::ImageRgb8(output))
}

/// Run the recognizer on an aligned face. The output is returned as-is.
pub fn encode_face(
    session: &mut Session,
    face_img: &DynamicImage,
    input: EncoderInput,
) -> Result<Embedding> {
    let face = face_img
        .resize_exact(input.size, input.size, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let tensor = to_planar(&face, input.order, input.mean, input.scale)?;
    let outputs = session.run(ort::inputs![Value::from_array(tensor)?])?;
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

    // Expecting [1, D]
    let dim = match shape.len() {
        2 => shape[1] as usize,
        _ => data.len(),
    };
    if dim == 0 || dim > data.len() {
        anyhow::bail!("unexpected recognizer output shape {:?}", shape);
    }

    Ok(Embedding::new(data[..dim].to_vec()))
}
