use pool_guard::{Command, FrameObservation, FrameReport, GuardPipeline};
use std::time::Duration;

/// One frame handed to the loop by a source.
#[derive(Debug, Clone, Default)]
pub struct SourceFrame {
    pub observation: FrameObservation,
    /// Recorded session offset. Live sources leave this empty and the loop
    /// stamps the frame with the session clock.
    pub recorded_at: Option<Duration>,
    /// Scripted level for the simulated clear input.
    pub clear_input: Option<bool>,
    /// Commands that arrive with the frame.
    pub commands: Vec<Command>,
}

/// Anything the frame loop can pull frames from.
pub trait FrameSource {
    /// Returns `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> anyhow::Result<Option<SourceFrame>>;

    /// Feeds the frame just returned by `next_frame` to the pipeline. Sources
    /// that carry pixels rather than detections override this to run their
    /// detector through `GuardPipeline::process_with`.
    fn process(&mut self, pipeline: &mut GuardPipeline, observation: FrameObservation, now: Duration) -> FrameReport {
        pipeline.process_frame(observation, now)
    }

    /// Called once the pipeline has processed the frame. Interactive sources
    /// render the report and return any operator input they collected.
    fn present(&mut self, _report: &FrameReport) -> anyhow::Result<Vec<Command>> {
        Ok(Vec::new())
    }

    fn describe(&self) -> String;
}

/// Scale that brings a frame `cols` pixels wide down to `resize_width`.
/// `None` leaves the frame as is: resizing is off, or the frame is already
/// narrow enough.
#[cfg_attr(not(feature = "camera"), allow(dead_code))]
pub fn downscale_factor(cols: i32, resize_width: u32) -> Option<f64> {
    let width = i32::try_from(resize_width).unwrap_or(i32::MAX);
    if width <= 0 || cols <= width {
        return None;
    }
    Some(f64::from(width) / f64::from(cols))
}
