use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Func, VarBuilder};
use candle_transformers::models::resnet;
use image::RgbImage;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::InferenceError;

/// Raw RGB frame, `height x width x 3` bytes in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * 3],
        }
    }

    /// Decodes an encoded image (PNG screenshots in practice).
    pub fn decode(bytes: &[u8]) -> image::ImageResult<Self> {
        let img = image::load_from_memory(bytes)?.to_rgb8();
        Ok(Self::from(img))
    }

    fn expected_len(&self) -> Option<usize> {
        self.width.checked_mul(self.height)?.checked_mul(3)
    }

    pub fn validate(&self) -> Result<(), InferenceError> {
        let expected = self.expected_len().unwrap_or(usize::MAX);
        if self.width == 0 || self.height == 0 || self.data.len() != expected {
            return Err(InferenceError::FrameShape {
                width: self.width,
                height: self.height,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    fn to_image(&self) -> Result<RgbImage, InferenceError> {
        self.validate()?;
        RgbImage::from_raw(self.width as u32, self.height as u32, self.data.clone()).ok_or(
            InferenceError::FrameShape {
                width: self.width,
                height: self.height,
                expected: self.width * self.height * 3,
                actual: self.data.len(),
            },
        )
    }
}

impl From<RgbImage> for Frame {
    fn from(img: RgbImage) -> Self {
        let (w, h) = img.dimensions();
        Self {
            width: w as usize,
            height: h as usize,
            data: img.into_raw(),
        }
    }
}

/// Top-1 classifier output for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub index: usize,
    /// Softmax probability in [0,1].
    pub confidence: f32,
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.0}%)", self.label, self.confidence * 100.0)
    }
}

/// Configuration for the ResNet-18 frame classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub weights_url: String,
    /// Local cache location of the safetensors file.
    pub weights_path: PathBuf,
    /// Optional class names, one per line, in model output order. Without
    /// it a 1000-class model uses the bundled ImageNet names.
    pub labels_path: Option<PathBuf>,
    pub num_classes: usize,
    pub input_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub download_timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            weights_url: "https://huggingface.co/lmz/candle-resnet/resolve/main/resnet18.safetensors"
                .to_string(),
            weights_path: PathBuf::from("models/resnet18.safetensors"),
            labels_path: None,
            num_classes: 1000,
            input_size: 224,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            download_timeout_secs: 120,
        }
    }
}

/// Returns the cached weights file, downloading it on first use.
pub fn ensure_weights(cfg: &ClassifierConfig) -> Result<PathBuf, InferenceError> {
    let path = &cfg.weights_path;
    if path.is_file() {
        return Ok(path.clone());
    }
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| InferenceError::Io { path, source }
    };
    let download_err = |e: reqwest::Error| InferenceError::Download {
        url: cfg.weights_url.clone(),
        message: e.to_string(),
    };

    tracing::info!("downloading classifier weights from {}", cfg.weights_url);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(cfg.download_timeout_secs))
        .build()
        .map_err(download_err)?;
    let bytes = client
        .get(&cfg.weights_url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.bytes())
        .map_err(download_err)?;

    let partial = path.with_extension("part");
    fs::write(&partial, &bytes).map_err(io_err(&partial))?;
    fs::rename(&partial, path).map_err(io_err(path))?;
    tracing::info!("stored {} bytes of weights in {}", bytes.len(), path.display());
    Ok(path.clone())
}

const IMAGENET_CLASSES: &str = include_str!("imagenet_classes.txt");
const IMAGENET_CLASS_COUNT: usize = 1000;

fn parse_labels(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect()
}

fn load_labels(path: &Path) -> Result<Vec<String>, InferenceError> {
    let raw = fs::read_to_string(path).map_err(|source| InferenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_labels(&raw))
}

/// ImageNet-1k class names in model output order (index 0 is "tench").
pub fn imagenet_labels() -> Vec<String> {
    parse_labels(IMAGENET_CLASSES)
}

/// Class names for `cfg`: the labels file when it can be read, otherwise
/// the ImageNet names for a 1000-class head, otherwise none.
pub fn resolve_labels(cfg: &ClassifierConfig) -> Vec<String> {
    if let Some(path) = &cfg.labels_path {
        match load_labels(path) {
            Ok(labels) => return labels,
            Err(e) => tracing::warn!("ignoring labels file: {e}"),
        }
    }
    if cfg.num_classes == IMAGENET_CLASS_COUNT {
        imagenet_labels()
    } else {
        Vec::new()
    }
}

/// Scales the short side to `size * 256 / 224` and cuts the centred
/// `size` x `size` square, as ImageNet evaluation does.
fn resize_and_center_crop(img: &RgbImage, size: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let short_side = (size as f32 * 256.0 / 224.0).round();
    let scale = short_side / width.min(height) as f32;
    let scaled = |side: u32| ((side as f32 * scale).round() as u32).max(size);
    let (new_w, new_h) = (scaled(width), scaled(height));
    let resized = imageops::resize(img, new_w, new_h, FilterType::Triangle);
    imageops::crop_imm(&resized, (new_w - size) / 2, (new_h - size) / 2, size, size).to_image()
}

/// Frozen ResNet-18 wrapper. Loaded once and owned by the caller.
pub struct FrameClassifier {
    model: Func<'static>,
    labels: Vec<String>,
    device: Device,
    input_size: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl FrameClassifier {
    /// Fetches the weights if needed and builds the network on the CPU.
    pub fn load(cfg: &ClassifierConfig) -> Result<Self, InferenceError> {
        let weights = ensure_weights(cfg)?;
        let bytes = fs::read(&weights).map_err(|source| InferenceError::Io {
            path: weights.clone(),
            source,
        })?;
        let device = Device::Cpu;
        let vb = VarBuilder::from_buffered_safetensors(bytes, DType::F32, &device)?;
        Self::with_var_builder(vb, resolve_labels(cfg), cfg)
    }

    pub fn with_var_builder(
        vb: VarBuilder<'static>,
        labels: Vec<String>,
        cfg: &ClassifierConfig,
    ) -> Result<Self, InferenceError> {
        let device = vb.device().clone();
        let model = resnet::resnet18(cfg.num_classes, vb)?;
        Ok(Self {
            model,
            labels,
            device,
            input_size: cfg.input_size,
            mean: cfg.mean,
            std: cfg.std,
        })
    }

    pub fn predict(&self, frame: &Frame) -> Result<Prediction, InferenceError> {
        let input = self.prepare_input(frame)?;
        let logits = self.model.forward(&input)?;
        let scores: Vec<f32> = logits.flatten_all()?.to_vec1()?;
        if scores.is_empty() {
            return Err(candle_core::Error::Msg("model returned no logits".into()).into());
        }
        let probs = softmax(&scores);
        let (index, confidence) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, p)| {
                if p > best.1 { (i, p) } else { best }
            });
        let label = self
            .labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("class_{index}"));
        Ok(Prediction {
            label,
            index,
            confidence,
        })
    }

    fn prepare_input(&self, frame: &Frame) -> Result<Tensor, InferenceError> {
        let img = frame.to_image()?;
        let size = self.input_size as usize;
        let resized = resize_and_center_crop(&img, self.input_size);
        let plane = size * size;
        let mut data = vec![0f32; 3 * plane];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let offset = y as usize * size + x as usize;
            for c in 0..3 {
                data[c * plane + offset] = normalize_channel(pixel.0[c], self.mean[c], self.std[c]);
            }
        }
        Ok(Tensor::from_vec(data, (1, 3, size, size), &self.device)?)
    }
}

fn normalize_channel(value: u8, mean: f32, std: f32) -> f32 {
    let v = value as f32 / 255.0;
    (v - mean) / std
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|x| x / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn small_config() -> ClassifierConfig {
        ClassifierConfig {
            num_classes: 10,
            input_size: 64,
            ..ClassifierConfig::default()
        }
    }

    fn zero_classifier(labels: Vec<String>) -> FrameClassifier {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        FrameClassifier::with_var_builder(vb, labels, &small_config()).unwrap()
    }

    #[test]
    fn predict_on_zero_frame_is_repeatable() -> anyhow::Result<()> {
        let classifier = zero_classifier(Vec::new());
        let frame = Frame::zeros(96, 54);
        let first = classifier.predict(&frame)?;
        let second = classifier.predict(&frame)?;
        assert_eq!(first, second);
        assert!(first.label.starts_with("class_"));
        assert_relative_eq!(first.confidence, 0.1, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn predict_uses_label_names_when_available() -> anyhow::Result<()> {
        let labels: Vec<String> = (0..10).map(|i| format!("label-{i}")).collect();
        let classifier = zero_classifier(labels);
        let prediction = classifier.predict(&Frame::zeros(32, 32))?;
        assert_eq!(prediction.label, format!("label-{}", prediction.index));
        Ok(())
    }

    #[test]
    fn default_labels_name_imagenet_classes() -> anyhow::Result<()> {
        let cfg = ClassifierConfig {
            input_size: 64,
            ..ClassifierConfig::default()
        };
        let labels = resolve_labels(&cfg);
        assert_eq!(labels.len(), 1000);
        assert_eq!(labels[0], "tench");
        assert_eq!(labels[999], "toilet tissue");

        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let classifier = FrameClassifier::with_var_builder(vb, labels, &cfg)?;
        let prediction = classifier.predict(&Frame::zeros(80, 45))?;
        assert_eq!(prediction.index, 0);
        assert_eq!(prediction.label, "tench");
        Ok(())
    }

    #[test]
    fn unreadable_labels_file_falls_back_by_class_count() {
        let missing = ClassifierConfig {
            labels_path: Some(PathBuf::from("/nonexistent/labels.txt")),
            ..ClassifierConfig::default()
        };
        assert_eq!(resolve_labels(&missing)[1], "goldfish");
        assert!(resolve_labels(&small_config()).is_empty());
    }

    #[test]
    fn crop_keeps_the_centre_of_wide_frames() {
        let mut img = RgbImage::new(200, 100);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            if x < 30 {
                *pixel = image::Rgb([255, 0, 0]);
            } else if (90..110).contains(&x) && (40..60).contains(&y) {
                *pixel = image::Rgb([255, 255, 255]);
            }
        }
        let out = resize_and_center_crop(&img, 64);
        assert_eq!(out.dimensions(), (64, 64));
        assert_eq!(out.get_pixel(32, 32).0, [255, 255, 255]);
        assert!(out.pixels().all(|p| p.0[0] == p.0[1]));
    }

    #[rstest]
    #[case(Frame { width: 4, height: 4, data: vec![0; 47] })]
    #[case(Frame { width: 0, height: 4, data: Vec::new() })]
    #[case(Frame { width: 4, height: 4, data: vec![0; 16] })]
    fn predict_rejects_malformed_frames(#[case] frame: Frame) {
        let classifier = zero_classifier(Vec::new());
        let err = classifier.predict(&frame).unwrap_err();
        assert!(matches!(err, InferenceError::FrameShape { .. }));
    }

    #[test]
    fn frame_decode_reads_png() -> anyhow::Result<()> {
        let img = RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        let mut png = Vec::new();
        image::DynamicImage::ImageRgb8(img).write_to(
            &mut std::io::Cursor::new(&mut png),
            image::ImageFormat::Png,
        )?;
        let frame = Frame::decode(&png)?;
        assert_eq!((frame.width, frame.height), (3, 2));
        assert_eq!(&frame.data[..3], &[10, 20, 30]);
        frame.validate()?;
        Ok(())
    }

    #[test]
    fn ensure_weights_reuses_cached_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("w.safetensors");
        fs::write(&path, b"cached")?;
        let cfg = ClassifierConfig {
            weights_url: "http://127.0.0.1:9/never-fetched".into(),
            weights_path: path.clone(),
            ..ClassifierConfig::default()
        };
        assert_eq!(ensure_weights(&cfg)?, path);
        Ok(())
    }

    #[test]
    fn labels_file_skips_blank_lines() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("labels.txt");
        fs::write(&path, "tench\n\n goldfish \n")?;
        assert_eq!(load_labels(&path)?, vec!["tench", "goldfish"]);
        Ok(())
    }

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        assert_relative_eq!(probs.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }
}
