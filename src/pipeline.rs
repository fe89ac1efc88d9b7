// THEORY:
// The `pipeline` module is the top-level API of the transform engine. It takes an
// owned image and an ordered list of steps, runs them strictly in sequence (each
// step consumes the previous step's output) and hands back every frame produced
// along the way, so callers can persist or inspect intermediate results.
//
// Key architectural principles:
// 1.  **Frames, not just results**: element zero is always the untouched input,
//     labelled `original`; step `i` (1-based) is labelled `step_{i}_{name}`.
// 2.  **Unknown steps are identity**: a step whose name or opcode matches nothing
//     in the registry copies its input forward and is still recorded as a frame.
// 3.  **Labels are file-name safe**: unknown step names are sanitized on entry, so
//     a label can be used as a path component without further checks.

use crate::core_modules::geometry::DEFAULT_ROTATION_DEGREES;
use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::registry::{Opcode, Operation};

pub const ORIGINAL_LABEL: &str = "original";

const MAX_LABEL_LEN: usize = 48;

/// One entry of a pipeline: a resolved operation (or an unrecognized tag) and an
/// optional rotation angle in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStep {
    pub operation: Option<Operation>,
    label: String,
    pub angle: Option<f64>,
}

impl PipelineStep {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation: Some(operation),
            label: operation.name().to_string(),
            angle: None,
        }
    }

    pub fn with_angle(mut self, degrees: f64) -> Self {
        self.angle = Some(degrees);
        self
    }

    /// Resolves a step by operation name. Unknown names become identity steps.
    pub fn named(name: &str) -> Self {
        match Operation::from_name(name) {
            Some(operation) => Self::new(operation),
            None => Self {
                operation: None,
                label: sanitize_label(name),
                angle: None,
            },
        }
    }

    /// Resolves a step by wire opcode. Unknown opcodes become identity steps.
    pub fn from_opcode(opcode: Opcode) -> Self {
        match Operation::from_opcode(opcode) {
            Some(operation) => Self::new(operation),
            None => Self {
                operation: None,
                label: format!("opcode_{opcode}"),
                angle: None,
            },
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_identity(&self) -> bool {
        self.operation.is_none()
    }

    /// The angle rotation steps will use.
    pub fn effective_angle(&self) -> f64 {
        self.angle.unwrap_or(DEFAULT_ROTATION_DEGREES)
    }

    pub fn apply(&self, buffer: &PixelBuffer) -> PixelBuffer {
        match self.operation {
            Some(operation) => operation.apply(buffer, self.effective_angle()),
            None => buffer.clone(),
        }
    }
}

fn sanitize_label(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .take(MAX_LABEL_LEN)
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "unnamed".to_string() } else { cleaned }
}

/// A labelled snapshot of the image between steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub label: String,
    pub buffer: PixelBuffer,
}

/// Every frame produced by one pipeline run, original first.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    frames: Vec<Frame>,
}

impl PipelineRun {
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    pub fn original(&self) -> &PixelBuffer {
        &self.frames[0].buffer
    }

    /// Output of the last step, or the original when there were no steps.
    pub fn final_buffer(&self) -> &PixelBuffer {
        // `run` always records the original, so `frames` is never empty.
        &self.frames[self.frames.len() - 1].buffer
    }

    pub fn into_final(mut self) -> PixelBuffer {
        let last = self.frames.len() - 1;
        self.frames.swap_remove(last).buffer
    }

    /// Frames after the original.
    pub fn intermediates(&self) -> &[Frame] {
        &self.frames[1..]
    }
}

/// A reusable, ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
}

impl Pipeline {
    pub fn new(steps: Vec<PipelineStep>) -> Self {
        Self { steps }
    }

    /// Builds a pipeline from operation names, applying `angle` to every step.
    pub fn from_names<'a, I>(names: I, angle: f64) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let steps = names
            .into_iter()
            .map(|name| PipelineStep::named(name).with_angle(angle))
            .collect();
        Self { steps }
    }

    pub fn push(&mut self, step: PipelineStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn run(&self, buffer: PixelBuffer) -> PipelineRun {
        run(buffer, &self.steps)
    }
}

/// Applies `steps` in order, recording the original and every step's output.
pub fn run(buffer: PixelBuffer, steps: &[PipelineStep]) -> PipelineRun {
    let mut frames = Vec::with_capacity(steps.len() + 1);
    frames.push(Frame {
        label: ORIGINAL_LABEL.to_string(),
        buffer,
    });
    for (index, step) in steps.iter().enumerate() {
        let next = step.apply(&frames[index].buffer);
        frames.push(Frame {
            label: format!("step_{}_{}", index + 1, step.label()),
            buffer: next,
        });
    }
    PipelineRun { frames }
}
