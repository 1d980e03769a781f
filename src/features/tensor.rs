//! Image-layout feature tensors for a vision backbone.
//!
//! ```text
//! mel (dB) ─▶ min-max [0, 1] ─▶ [bilinear resize] ─▶ ×3 channels ─▶ (x - mean) / std
//! ```
//!
//! The per-channel statistics are the ImageNet constants, never estimated
//! from the dataset, so every dataset variant shares one normalisation.

use ndarray::{Array2, Array3, Axis};

use super::FeatureError;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

// ---------------------------------------------------------------------------
// FeatureTensor
// ---------------------------------------------------------------------------

/// `(channels, height, width)` array in standard layout.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor(Array3<f32>);

impl FeatureTensor {
    pub fn new(array: Array3<f32>) -> Self {
        Self(array.as_standard_layout().into_owned())
    }

    /// Rebuild from a shape and row-major data.
    pub fn from_shape_vec(shape: [usize; 3], data: Vec<f32>) -> Result<Self, FeatureError> {
        let expected: usize = shape.iter().product();
        let got = data.len();
        Array3::from_shape_vec((shape[0], shape[1], shape[2]), data)
            .map(Self)
            .map_err(|_| FeatureError::InvalidParameter {
                name: "shape",
                reason: format!("{shape:?} needs {expected} values, got {got}"),
            })
    }

    pub fn shape(&self) -> [usize; 3] {
        let (c, h, w) = self.0.dim();
        [c, h, w]
    }

    pub fn array(&self) -> &Array3<f32> {
        &self.0
    }

    pub fn into_array(self) -> Array3<f32> {
        self.0
    }

    /// Row-major copy of the values.
    pub fn to_vec(&self) -> Vec<f32> {
        self.0.iter().copied().collect()
    }

    /// `(mean, std)` of every channel.
    pub fn channel_stats(&self) -> Vec<(f32, f32)> {
        self.0
            .axis_iter(Axis(0))
            .map(|plane| {
                let n = plane.len().max(1) as f64;
                let mean = plane.iter().map(|&v| v as f64).sum::<f64>() / n;
                let var = plane.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
                (mean as f32, var.sqrt() as f32)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// to_image_tensor
// ---------------------------------------------------------------------------

/// Turn a single-channel spectrogram into a normalised 3-channel image.
///
/// `size` is `(height, width)`; `None` keeps the spectrogram's own shape.  A
/// constant spectrogram maps to all-zero intensities before normalisation.
pub fn to_image_tensor(
    mel: &Array2<f32>,
    size: Option<(usize, usize)>,
) -> Result<FeatureTensor, FeatureError> {
    if mel.is_empty() {
        return Err(FeatureError::EmptySignal);
    }
    if mel.iter().any(|v| !v.is_finite()) {
        return Err(FeatureError::InvalidParameter {
            name: "mel",
            reason: "non-finite value".into(),
        });
    }

    let min = mel.iter().copied().fold(f32::INFINITY, f32::min);
    let max = mel.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    let unit = if range > 0.0 {
        mel.mapv(|v| (v - min) / range)
    } else {
        Array2::zeros(mel.raw_dim())
    };

    let image = match size {
        Some((h, w)) if (h, w) != unit.dim() => {
            if h == 0 || w == 0 {
                return Err(FeatureError::InvalidParameter {
                    name: "image_size",
                    reason: format!("{h}x{w}"),
                });
            }
            resize_bilinear(&unit, h, w)
        }
        _ => unit,
    };

    let (h, w) = image.dim();
    let tensor = Array3::from_shape_fn((3, h, w), |(c, y, x)| {
        (image[[y, x]] - IMAGENET_MEAN[c]) / IMAGENET_STD[c]
    });
    Ok(FeatureTensor(tensor))
}

/// Bilinear resize with half-pixel centres (`align_corners = false`).
pub fn resize_bilinear(src: &Array2<f32>, height: usize, width: usize) -> Array2<f32> {
    let (src_h, src_w) = src.dim();
    let scale_y = src_h as f32 / height as f32;
    let scale_x = src_w as f32 / width as f32;

    let source_coord = |dst: usize, scale: f32, len: usize| -> (usize, usize, f32) {
        let pos = ((dst as f32 + 0.5) * scale - 0.5).max(0.0);
        let i0 = (pos.floor() as usize).min(len - 1);
        let i1 = (i0 + 1).min(len - 1);
        (i0, i1, pos - i0 as f32)
    };

    Array2::from_shape_fn((height, width), |(y, x)| {
        let (y0, y1, fy) = source_coord(y, scale_y, src_h);
        let (x0, x1, fx) = source_coord(x, scale_x, src_w);
        let top = src[[y0, x0]] * (1.0 - fx) + src[[y0, x1]] * fx;
        let bottom = src[[y1, x0]] * (1.0 - fx) + src[[y1, x1]] * fx;
        top * (1.0 - fy) + bottom * fy
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
