//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the server:
//! - Math types and geometric helpers
//! - Logging utilities

pub mod logging;
pub mod math;
