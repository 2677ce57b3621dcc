//! Terminal display for netpulse.
//!
//! A live dashboard while a run is active, one line per sample when
//! output is piped, and the final summary.

pub mod controller;
pub mod display_mode;
pub mod progress;
pub mod renderer;
pub mod state;

pub use controller::TuiController;
pub use display_mode::DisplayMode;
