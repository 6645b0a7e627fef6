//! YOLO eye/mouth state model running on tract

use crate::class::RawDetection;
use crate::classifier::FrameClassifier;
use crate::{DetectError, DetectorConfig};
use camera_capture::VideoFrame;
use image::imageops::FilterType;
use std::path::Path;
use tract_onnx::prelude::*;
use tracing::{debug, error, info};

type YoloPlan = TypedRunnableModel<TypedModel>;

/// Candidate box in model input coordinates (center, size)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub class_id: i64,
    pub score: f32,
}

impl Candidate {
    fn iou(&self, other: &Candidate) -> f32 {
        let (ax0, ay0, ax1, ay1) = self.corners();
        let (bx0, by0, bx1, by1) = other.corners();

        let iw = (ax1.min(bx1) - ax0.max(bx0)).max(0.0);
        let ih = (ay1.min(by1) - ay0.max(by0)).max(0.0);
        let inter = iw * ih;
        let union = self.w * self.h + other.w * other.h - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    fn corners(&self) -> (f32, f32, f32, f32) {
        (
            self.cx - self.w / 2.0,
            self.cy - self.h / 2.0,
            self.cx + self.w / 2.0,
            self.cy + self.h / 2.0,
        )
    }
}

/// YOLOv8-layout ONNX detector (4 box rows followed by one score row per class)
pub struct YoloOnnxClassifier {
    name: String,
    plan: YoloPlan,
    input_size: u32,
    iou_threshold: f32,
    score_floor: f32,
}

impl YoloOnnxClassifier {
    /// Load and optimize a model file
    pub fn load(path: &Path, config: &DetectorConfig) -> Result<Self, DetectError> {
        info!("Loading fatigue detection model from {}", path.display());
        let size = config.input_size as usize;

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, f32::fact([1, 3, size, size]).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| {
                error!("Failed to load model {}: {}", path.display(), e);
                DetectError::ModelLoad(format!("{}: {}", path.display(), e))
            })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            plan,
            input_size: config.input_size,
            iou_threshold: config.iou_threshold,
            score_floor: config.score_floor,
        })
    }

    fn to_input(&self, frame: &VideoFrame) -> Result<Tensor, DetectError> {
        let img = frame
            .to_rgb_image()
            .map_err(|e| DetectError::Detection(e.to_string()))?;
        let size = self.input_size;
        let resized = image::imageops::resize(&img, size, size, FilterType::Triangle);

        let s = size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, s, s), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into())
    }
}

impl FrameClassifier for YoloOnnxClassifier {
    fn classify(&self, frame: &VideoFrame) -> Result<Vec<RawDetection>, DetectError> {
        let start = std::time::Instant::now();
        let input = self.to_input(frame)?;

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| DetectError::Detection(format!("inference failed: {}", e)))?;

        let view = outputs[0]
            .to_array_view::<f32>()
            .map_err(|e| DetectError::Detection(e.to_string()))?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .map_err(|e| DetectError::Detection(format!("unexpected output rank: {}", e)))?;

        let candidates = decode_output(view, self.score_floor);
        let kept = non_max_suppression(candidates, self.iou_threshold);

        debug!(
            "Frame {}: {} detections in {}ms",
            frame.sequence,
            kept.len(),
            start.elapsed().as_millis()
        );

        Ok(kept
            .into_iter()
            .map(|c| RawDetection::new(c.class_id, c.score))
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Decode a `[1, 4 + classes, anchors]` (or transposed `[1, anchors, 4 + classes]`) output
pub fn decode_output(output: tract_ndarray::ArrayView3<f32>, score_floor: f32) -> Vec<Candidate> {
    let (_, d1, d2) = output.dim();
    // Anchors always outnumber box+class rows
    let channels_first = d1 <= d2;
    let (rows, anchors) = if channels_first { (d1, d2) } else { (d2, d1) };
    if rows <= 4 {
        return Vec::new();
    }

    let at = |row: usize, anchor: usize| {
        if channels_first {
            output[[0, row, anchor]]
        } else {
            output[[0, anchor, row]]
        }
    };

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let (class_row, score) = (4..rows)
            .map(|row| (row, at(row, anchor)))
            .fold((4, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if score < score_floor {
            continue;
        }

        candidates.push(Candidate {
            cx: at(0, anchor),
            cy: at(1, anchor),
            w: at(2, anchor),
            h: at(3, anchor),
            class_id: (class_row - 4) as i64,
            score,
        });
    }
    candidates
}

/// Greedy per-class NMS, highest score first
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(anchors: &[[f32; 8]]) -> tract_ndarray::Array3<f32> {
        // rows: cx, cy, w, h, closed_eyes, closed_mouth, open_eyes, open_mouth
        tract_ndarray::Array3::from_shape_fn((1, 8, anchors.len()), |(_, row, a)| anchors[a][row])
    }

    #[test]
    fn test_decode_picks_best_class() {
        let out = output(&[
            [10.0, 10.0, 4.0, 4.0, 0.1, 0.2, 0.9, 0.3],
            [50.0, 50.0, 4.0, 4.0, 0.05, 0.1, 0.1, 0.2],
        ]);
        let candidates = decode_output(out.view(), 0.25);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].class_id, 2);
        assert!((candidates[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_decode_transposed_layout() {
        let out = output(&[
            [10.0, 10.0, 4.0, 4.0, 0.8, 0.0, 0.0, 0.0],
            [20.0, 20.0, 4.0, 4.0, 0.0, 0.0, 0.0, 0.7],
            [30.0, 30.0, 4.0, 4.0, 0.0, 0.0, 0.0, 0.0],
            [40.0, 40.0, 4.0, 4.0, 0.0, 0.0, 0.0, 0.0],
            [50.0, 50.0, 4.0, 4.0, 0.0, 0.0, 0.0, 0.0],
            [60.0, 60.0, 4.0, 4.0, 0.0, 0.0, 0.0, 0.0],
            [70.0, 70.0, 4.0, 4.0, 0.0, 0.0, 0.0, 0.0],
            [80.0, 80.0, 4.0, 4.0, 0.0, 0.0, 0.0, 0.0],
            [90.0, 90.0, 4.0, 4.0, 0.0, 0.0, 0.0, 0.0],
        ]);
        let transposed = out.view().permuted_axes([0, 2, 1]);
        let candidates = decode_output(transposed, 0.25);
        let classes: Vec<i64> = candidates.iter().map(|c| c.class_id).collect();
        assert_eq!(classes, vec![0, 3]);
    }

    #[test]
    fn test_nms_suppresses_same_class_overlap() {
        let a = Candidate { cx: 10.0, cy: 10.0, w: 10.0, h: 10.0, class_id: 0, score: 0.9 };
        let b = Candidate { score: 0.8, cx: 11.0, ..a };
        let c = Candidate { class_id: 3, score: 0.7, ..a };
        let far = Candidate { cx: 100.0, score: 0.6, ..a };

        let kept = non_max_suppression(vec![b, far, a, c], 0.45);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0], a);
        assert!(kept.contains(&c));
        assert!(kept.contains(&far));
    }

    #[test]
    fn test_missing_model_file() {
        let missing = Path::new("/nonexistent/model.onnx");
        let err = YoloOnnxClassifier::load(missing, &DetectorConfig::default());
        assert!(matches!(err, Err(DetectError::ModelLoad(_))));
    }
}
