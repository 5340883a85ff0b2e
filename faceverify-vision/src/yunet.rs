//! YuNet output decoding.
//!
//! The 2023mar export emits twelve tensors, grouped by kind and then by stride:
//! `cls_8, cls_16, cls_32, obj_8, obj_16, obj_32, bbox_8, .., kps_32`.
//! Every tensor has shape `[1, rows, cols]` where `rows` is the number of grid
//! cells of that stride (row-major) and `cols` is 1, 1, 4 or 10.
//!
//! A cell at `(row, col)` decodes to:
//! - score `sqrt(cls * obj)`
//! - centre `((col + dx) * stride, (row + dy) * stride)`
//! - size `(exp(dw) * stride, exp(dh) * stride)`
//! - landmark `k` at `((col + lx_k) * stride, (row + ly_k) * stride)`
//!
//! Coordinates are pixels of the square detector canvas.

use anyhow::{Context, Result};
use ndarray::ArrayView2;

use crate::face::Detection;

pub const STRIDES: [usize; 3] = [8, 16, 32];

/// One raw output tensor as extracted from the session.
pub type RawOutput = (Vec<i64>, Vec<f32>);

const CLS: usize = 0;
const OBJ: usize = 1;
const BBOX: usize = 2;
const KPS: usize = 3;
const WIDTHS: [usize; 4] = [1, 1, 4, 10];

fn view<'a>(
    outputs: &'a [RawOutput],
    kind: usize,
    scale: usize,
    rows: usize,
) -> Result<ArrayView2<'a, f32>> {
    let idx = kind * STRIDES.len() + scale;
    let cols = WIDTHS[kind];
    let (shape, data) = outputs
        .get(idx)
        .with_context(|| format!("missing yunet output {}", idx))?;

    let expected = [1, rows as i64, cols as i64];
    if shape.as_slice() != expected {
        anyhow::bail!(
            "unexpected shape for yunet output {}: {:?}, expected {:?}",
            idx,
            shape,
            expected
        );
    }

    Ok(ArrayView2::from_shape((rows, cols), data.as_slice())?)
}

/// Decode all cells scoring at least `score_threshold`.
pub fn decode(
    outputs: &[RawOutput],
    input_size: usize,
    score_threshold: f32,
) -> Result<Vec<Detection>> {
    if outputs.len() != 4 * STRIDES.len() {
        anyhow::bail!(
            "yunet produced {} outputs, expected {}",
            outputs.len(),
            4 * STRIDES.len()
        );
    }

    let mut detections = Vec::new();

    for (scale, &stride) in STRIDES.iter().enumerate() {
        let cells = input_size / stride;
        let rows = cells * cells;

        let cls = view(outputs, CLS, scale, rows)?;
        let obj = view(outputs, OBJ, scale, rows)?;
        let bbox = view(outputs, BBOX, scale, rows)?;
        let kps = view(outputs, KPS, scale, rows)?;

        let s = stride as f32;
        for idx in 0..rows {
            let score = (cls[[idx, 0]].clamp(0.0, 1.0) * obj[[idx, 0]].clamp(0.0, 1.0)).sqrt();
            if score < score_threshold {
                continue;
            }

            let row = (idx / cells) as f32;
            let col = (idx % cells) as f32;

            let cx = (col + bbox[[idx, 0]]) * s;
            let cy = (row + bbox[[idx, 1]]) * s;
            let w = bbox[[idx, 2]].exp() * s;
            let h = bbox[[idx, 3]].exp() * s;

            let mut landmarks = [0.0f32; 10];
            for k in 0..5 {
                landmarks[k * 2] = (col + kps[[idx, k * 2]]) * s;
                landmarks[k * 2 + 1] = (row + kps[[idx, k * 2 + 1]]) * s;
            }

            detections.push(Detection {
                bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                score,
                landmarks,
            });
        }
    }

    Ok(detections)
}
