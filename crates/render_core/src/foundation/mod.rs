//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the renderer:
//! - Math types and matrix helpers
//! - Resource name hashing
//! - Logging utilities

pub mod math;
pub mod hash;
pub mod logging;
