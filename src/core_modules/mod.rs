pub mod color_matrix;
pub mod convolution;
pub mod edge_detector;
pub mod geometry;
pub mod pixel_buffer;
pub mod utils;
