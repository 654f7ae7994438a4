//! Page capture automation.
//!
//! This module provides:
//! - Session configuration (`config`)
//! - Pixel analysis shared by every stage (`detection`)
//! - Viewer preparation through its menus (`prepare`)
//! - The capture loop state machine (`state`) and page persistence (`sink`)
//! - The session runner (`runner`)

pub mod abort;
pub mod config;
pub mod detection;
#[cfg(windows)]
pub mod input;
pub mod prepare;
pub mod runner;
pub mod sink;
pub mod state;

pub use abort::CancelToken;
pub use config::{SessionConfig, load_config};
pub use runner::{SessionReport, capture_book, run_session};
pub use state::{CaptureOutcome, CaptureState};
