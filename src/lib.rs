// Sketch a handwritten math expression, send it to Gemini, read the answer.
//
// `session::Session` owns everything stateful: the raster surface, the pen,
// a bounded history of PNG snapshots for undo/redo, and the result area.
// The binary wraps it in a `minifb` window; tests drive it directly.

pub mod config;
pub mod debounce;
pub mod draw;
pub mod error;
pub mod export;
pub mod gamma;
pub mod history;
pub mod session;
pub mod solver;
pub mod surface;
pub mod types;
pub mod view;
