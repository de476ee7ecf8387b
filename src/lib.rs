//! signcam - live camera sign recognition
//!
//! Captures frames from a V4L2 camera, submits them to a recognition
//! service and keeps a continuously updated label of the detected sign.

pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod recognition;
pub mod session;
pub mod state;
pub mod utils;
pub mod video;
pub mod web;

pub use error::{AppError, Result};
