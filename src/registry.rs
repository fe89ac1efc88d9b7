// THEORY:
// The operation registry is the single source of truth for "which algorithm does
// this identifier mean". It is a closed, immutable table: one row per operation,
// carrying the stable wire opcode, the snake_case name used over HTTP, and the
// engine (plus its fixed parameters) that implements it.
//
// Key architectural principles:
// 1.  **Closed set**: `Operation` is an enum, so adding an operation without a
//     table row is caught by the completeness tests rather than at runtime.
// 2.  **Engines are data**: a row stores *which* engine and *which* constant
//     (kernel or matrix) to use. Four blur/edge variants and nine color variants
//     collapse into a handful of engine kinds.
// 3.  **Built once**: the opcode and name indexes are constructed lazily on first
//     use and shared by every front door for the lifetime of the process.
// 4.  **Unknown is not an error**: lookups return `Option`; callers treat `None`
//     as an identity pass-through.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::core_modules::color_matrix::{self, ColorMatrix};
use crate::core_modules::convolution::{self, Kernel};
use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::core_modules::{edge_detector, geometry};

/// Wire identifier of an operation (big-endian `u32` on the datagram protocol).
pub type Opcode = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Flip,
    Rotate,
    RotateShear,
    Grayscale,
    BoxBlur,
    GaussianBlur,
    EdgeDetection,
    Protanopia,
    Deuteranopia,
    Tritanopia,
    Protanomaly,
    Deuteranomaly,
    Tritanomaly,
    Achromatopsia,
    Monochromacy,
    Daltonize,
}

/// The pixel algorithm behind an operation, with its fixed parameters bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Engine {
    Flip,
    /// Bilinear rotation; the angle comes from the caller.
    Rotate,
    /// Three-shear rotation; the angle comes from the caller.
    RotateShear,
    Grayscale,
    Convolution(Kernel),
    EdgeDetection,
    ColorMatrix(ColorMatrix),
    /// Daltonization against the given deficiency matrix.
    Daltonize(ColorMatrix),
}

impl Engine {
    /// Runs the engine. `angle` (degrees) is only read by the rotation engines.
    pub fn apply(&self, buffer: &PixelBuffer, angle: f64) -> PixelBuffer {
        match self {
            Engine::Flip => geometry::flip(buffer),
            Engine::Rotate => geometry::rotate(buffer, angle),
            Engine::RotateShear => geometry::rotate_shear(buffer, angle),
            Engine::Grayscale => color_matrix::grayscale(buffer),
            Engine::Convolution(kernel) => convolution::apply(buffer, kernel),
            Engine::EdgeDetection => edge_detector::apply(buffer),
            Engine::ColorMatrix(matrix) => color_matrix::apply(buffer, matrix),
            Engine::Daltonize(matrix) => color_matrix::daltonize(buffer, matrix),
        }
    }

    pub fn uses_angle(&self) -> bool {
        matches!(self, Engine::Rotate | Engine::RotateShear)
    }
}

/// One row of the registry table.
#[derive(Debug, Clone, Copy)]
pub struct RegistryEntry {
    pub operation: Operation,
    pub opcode: Opcode,
    pub name: &'static str,
    pub engine: Engine,
}

const fn entry(operation: Operation, opcode: Opcode, name: &'static str, engine: Engine) -> RegistryEntry {
    RegistryEntry {
        operation,
        opcode,
        name,
        engine,
    }
}

// Rows are in `Operation` declaration order so `Operation as usize` indexes them.
static ENTRIES: [RegistryEntry; 16] = [
    entry(Operation::Flip, 1, "flip", Engine::Flip),
    entry(Operation::Rotate, 2, "rotate", Engine::Rotate),
    entry(Operation::RotateShear, 3, "rotate_shear", Engine::RotateShear),
    entry(Operation::Grayscale, 4, "grayscale", Engine::Grayscale),
    entry(Operation::BoxBlur, 5, "box_blur", Engine::Convolution(Kernel::BOX_BLUR)),
    entry(Operation::GaussianBlur, 6, "gaussian_blur", Engine::Convolution(Kernel::GAUSSIAN_BLUR)),
    entry(Operation::EdgeDetection, 7, "edge_detection", Engine::EdgeDetection),
    entry(Operation::Protanopia, 8, "protanopia", Engine::ColorMatrix(ColorMatrix::PROTANOPIA)),
    entry(Operation::Deuteranopia, 9, "deuteranopia", Engine::ColorMatrix(ColorMatrix::DEUTERANOPIA)),
    entry(Operation::Tritanopia, 10, "tritanopia", Engine::ColorMatrix(ColorMatrix::TRITANOPIA)),
    entry(Operation::Protanomaly, 11, "protanomaly", Engine::ColorMatrix(ColorMatrix::PROTANOMALY)),
    entry(Operation::Deuteranomaly, 12, "deuteranomaly", Engine::ColorMatrix(ColorMatrix::DEUTERANOMALY)),
    entry(Operation::Tritanomaly, 13, "tritanomaly", Engine::ColorMatrix(ColorMatrix::TRITANOMALY)),
    entry(Operation::Achromatopsia, 14, "achromatopsia", Engine::ColorMatrix(ColorMatrix::ACHROMATOPSIA)),
    entry(Operation::Monochromacy, 15, "monochromacy", Engine::ColorMatrix(ColorMatrix::MONOCHROMACY)),
    entry(Operation::Daltonize, 16, "daltonize", Engine::Daltonize(ColorMatrix::PROTANOPIA)),
];

/// Opcode and name indexes over the static table.
#[derive(Debug)]
pub struct Registry {
    by_opcode: HashMap<Opcode, &'static RegistryEntry>,
    by_name: HashMap<&'static str, &'static RegistryEntry>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry, built on first use.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::build)
}

impl Registry {
    fn build() -> Self {
        let by_opcode = ENTRIES.iter().map(|row| (row.opcode, row)).collect();
        let by_name = ENTRIES.iter().map(|row| (row.name, row)).collect();
        Self { by_opcode, by_name }
    }

    pub fn resolve(&self, opcode: Opcode) -> Option<&'static RegistryEntry> {
        self.by_opcode.get(&opcode).copied()
    }

    pub fn lookup(&self, name: &str) -> Option<&'static RegistryEntry> {
        self.by_name.get(name).copied()
    }

    pub fn entries(&self) -> &'static [RegistryEntry] {
        &ENTRIES
    }
}

impl Operation {
    pub const ALL: [Operation; 16] = [
        Operation::Flip,
        Operation::Rotate,
        Operation::RotateShear,
        Operation::Grayscale,
        Operation::BoxBlur,
        Operation::GaussianBlur,
        Operation::EdgeDetection,
        Operation::Protanopia,
        Operation::Deuteranopia,
        Operation::Tritanopia,
        Operation::Protanomaly,
        Operation::Deuteranomaly,
        Operation::Tritanomaly,
        Operation::Achromatopsia,
        Operation::Monochromacy,
        Operation::Daltonize,
    ];

    fn entry(self) -> &'static RegistryEntry {
        &ENTRIES[self as usize]
    }

    pub fn opcode(self) -> Opcode {
        self.entry().opcode
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    pub fn engine(self) -> Engine {
        self.entry().engine
    }

    pub fn from_opcode(opcode: Opcode) -> Option<Self> {
        registry().resolve(opcode).map(|row| row.operation)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        registry().lookup(name).map(|row| row.operation)
    }

    pub fn apply(self, buffer: &PixelBuffer, angle: f64) -> PixelBuffer {
        self.engine().apply(buffer, angle)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = String;

    /// Accepts either the snake_case name or the decimal opcode.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(opcode) = s.parse::<Opcode>() {
            return Operation::from_opcode(opcode).ok_or_else(|| format!("unknown opcode {opcode}"));
        }
        Operation::from_name(&s.to_ascii_lowercase()).ok_or_else(|| format!("unknown operation {s:?}"))
    }
}
