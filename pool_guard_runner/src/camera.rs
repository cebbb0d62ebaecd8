// THEORY:
// The live frame source. OpenCV does everything pixel-shaped here: capture,
// resize-to-width, running the YOLOv8 ONNX model through its DNN module and
// drawing the optional preview. The guard itself only ever sees boxes.
//
// Key architectural principles:
// 1.  **Zone lives in resized pixels:** Frames are scaled to `resize_width`
//     before detection, so the configured polygon and every box share one
//     coordinate space.
// 2.  **A failed inference is an empty frame:** Detection runs through
//     `GuardPipeline::process_with`, which logs the error and lets the guard
//     see no people, so dwell resets naturally.
// 3.  **The preview is an input device:** The window's keys come back from
//     `present` as commands, the same path stdin commands take.

use crate::source::{FrameSource, SourceFrame, downscale_factor};
use crate::yolo::YoloDecoder;
use anyhow::{Context, bail};
use opencv::{
    core::{self, Mat, Rect, Scalar, Size, Vector},
    dnn, highgui, imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use pool_guard::config::{ModelConfig, VideoConfig};
use pool_guard::core_modules::detection::{Detector, RawDetection};
use pool_guard::core_modules::geometry::Polygon;
use pool_guard::{Command, FrameObservation, FrameReport, GuardPipeline};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const WINDOW: &str = "pool_guard";

/// YOLOv8 person detector backed by `cv::dnn`.
pub struct YoloDetector {
    net: dnn::Net,
    decoder: YoloDecoder,
}

impl YoloDetector {
    pub fn load(weights: &Path, decoder: YoloDecoder) -> anyhow::Result<Self> {
        let path = weights
            .to_str()
            .with_context(|| format!("model path {} is not valid UTF-8", weights.display()))?;
        let net = dnn::read_net_from_onnx(path).with_context(|| format!("failed to load model {path}"))?;
        info!(model = path, input = decoder.input_size, "detector loaded");
        Ok(Self { net, decoder })
    }
}

impl Detector for YoloDetector {
    type Frame = Mat;
    type Error = opencv::Error;

    fn detect(&mut self, frame: &Mat) -> Result<Vec<RawDetection>, opencv::Error> {
        let side = self.decoder.input_size as i32;
        let blob = dnn::blob_from_image(
            frame,
            1.0 / 255.0,
            Size::new(side, side),
            Scalar::default(),
            true,
            false,
            core::CV_32F,
        )?;
        self.net.set_input(&blob, "", 1.0, Scalar::default())?;
        let output = self.net.forward_single("")?;
        let data = output.data_typed::<f32>()?;

        self.decoder
            .decode(data, frame.cols() as u32, frame.rows() as u32)
            .ok_or_else(|| {
                opencv::Error::new(
                    core::StsUnmatchedSizes,
                    format!("unexpected detector output of {} values", data.len()),
                )
            })
    }
}

/// Camera or video-file source with an optional preview window.
pub struct CameraSource {
    capture: VideoCapture,
    detector: YoloDetector,
    label: String,

    // --- Presentation ---
    resize_width: u32,
    display: bool,
    zone: Vector<core::Point>,
    /// Last frame read, kept for the overlay.
    frame: Mat,
}

impl CameraSource {
    pub fn open(video: &VideoConfig, model: &ModelConfig, zone: &Polygon, base_dir: &Path) -> anyhow::Result<Self> {
        // --- 1. Capture ---
        let capture = match video.source.trim().parse::<i32>() {
            Ok(index) => VideoCapture::new(index, videoio::CAP_ANY),
            Err(_) => VideoCapture::from_file(&video.source, videoio::CAP_ANY),
        }
        .with_context(|| format!("failed to open video source {}", video.source))?;
        if !capture.is_opened()? {
            bail!("video source {} could not be opened", video.source);
        }

        // --- 2. Detector ---
        let decoder = YoloDecoder::new(model.conf, model.iou, model.input_size);
        let detector = YoloDetector::load(&base_dir.join(&model.weights), decoder)?;

        // --- 3. Preview ---
        if video.display {
            highgui::named_window(WINDOW, highgui::WINDOW_AUTOSIZE)?;
            info!("preview window open: a = toggle arm, c = clear latch, q = quit");
        }

        Ok(Self {
            capture,
            detector,
            label: video.source.clone(),
            resize_width: video.resize_width,
            display: video.display,
            zone: zone.vertices().iter().map(|p| core::Point::new(p.x, p.y)).collect(),
            frame: Mat::default(),
        })
    }

    fn resize(&self, raw: Mat) -> opencv::Result<Mat> {
        let Some(scale) = downscale_factor(raw.cols(), self.resize_width) else {
            return Ok(raw);
        };
        let mut resized = Mat::default();
        imgproc::resize(&raw, &mut resized, Size::new(0, 0), scale, scale, imgproc::INTER_AREA)?;
        Ok(resized)
    }

    fn draw_overlay(&self, report: &FrameReport) -> opencv::Result<Mat> {
        let mut canvas = self.frame.try_clone()?;
        let yellow = Scalar::new(0.0, 255.0, 255.0, 0.0);
        let red = Scalar::new(0.0, 0.0, 255.0, 0.0);
        let green = Scalar::new(0.0, 200.0, 0.0, 0.0);

        let mut outline = Vector::<Vector<core::Point>>::new();
        outline.push(self.zone.clone());
        imgproc::polylines(&mut canvas, &outline, true, yellow, 2, imgproc::LINE_8, 0)?;

        for detection in &report.detections {
            let b = detection.bbox;
            let rect = Rect::new(b.x1, b.y1, b.x2 - b.x1, b.y2 - b.y1);
            let color = if detection.in_zone { red } else { green };
            imgproc::rectangle(&mut canvas, rect, color, 2, imgproc::LINE_8, 0)?;
        }

        let dwell = report
            .dwell_elapsed
            .map(|d| format!("{:.1}s", d.as_secs_f64()))
            .unwrap_or_else(|| "-".into());
        let status = format!(
            "ARMED: {} | IN ZONE: {} | DWELL: {}{}",
            if report.armed { "YES" } else { "NO" },
            report.in_zone_count(),
            dwell,
            if report.fired.is_some() { " | ALERT" } else { "" },
        );
        let status_color = if report.armed { red } else { green };
        imgproc::put_text(
            &mut canvas,
            &status,
            core::Point::new(10, 28),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.7,
            status_color,
            2,
            imgproc::LINE_8,
            false,
        )?;
        Ok(canvas)
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> anyhow::Result<Option<SourceFrame>> {
        let mut raw = Mat::default();
        match self.capture.read(&mut raw) {
            Ok(true) if !raw.empty() => {}
            Ok(_) => return Ok(None),
            Err(e) => {
                warn!(error = %e, "frame grab failed, stopping");
                return Ok(None);
            }
        }
        self.frame = self.resize(raw).context("failed to resize frame")?;

        // Detections are filled in by `process`.
        Ok(Some(SourceFrame {
            observation: FrameObservation {
                width: self.frame.cols() as u32,
                height: self.frame.rows() as u32,
                detections: Vec::new(),
            },
            ..SourceFrame::default()
        }))
    }

    fn process(&mut self, pipeline: &mut GuardPipeline, observation: FrameObservation, now: Duration) -> FrameReport {
        pipeline.process_with(&mut self.detector, &self.frame, observation.width, observation.height, now)
    }

    fn present(&mut self, report: &FrameReport) -> anyhow::Result<Vec<Command>> {
        if !self.display {
            return Ok(Vec::new());
        }
        let canvas = self.draw_overlay(report).context("failed to draw overlay")?;
        highgui::imshow(WINDOW, &canvas)?;

        let key = highgui::wait_key(1)?;
        let command = u8::try_from(key & 0xff)
            .ok()
            .filter(|_| key >= 0)
            .and_then(|k| Command::from_key(k as char));
        Ok(command.into_iter().collect())
    }

    fn describe(&self) -> String {
        format!("camera {}", self.label)
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if self.display {
            let _ = highgui::destroy_all_windows();
        }
    }
}
