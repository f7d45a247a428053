//! # Configuration Module
//!
//! This module provides the pipeline configuration and its environment loader.

pub mod config;

pub use config::SnapConfig;
