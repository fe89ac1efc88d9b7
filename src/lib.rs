// THEORY:
// This file is the main entry point for the `chroma_lens` library crate.
//
// The crate is split in two layers:
// 1.  **Transform engine** (`core_modules`, `registry`, `pipeline`): pure pixel
//     algorithms over an owned RGBA `PixelBuffer`. Nothing in this layer performs
//     I/O, holds shared state, or fails; every operation allocates a fresh output.
// 2.  **Service layer** (`protocol`, `client`, `output`, `server`, `config`): the
//     datagram wire format, the filesystem sink for results, and the UDP and HTTP
//     front doors that drive the engine.
//
// Both front doors resolve operations through the same immutable `Registry`, so
// the opcode table and the HTTP operation names can never drift apart.

pub mod client;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod server;

pub use crate::core_modules::pixel_buffer::{Pixel, PixelBuffer};
pub use crate::core_modules::utils::image_helper::OutputFormat;
pub use crate::pipeline::{Frame, Pipeline, PipelineRun, PipelineStep};
pub use crate::registry::{Engine, Operation, Registry};
