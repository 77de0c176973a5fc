#![forbid(unsafe_code)]

//! Thin JSON proxy in front of a video platform's metadata extractor.

pub mod assets;
pub mod config;
pub mod error;
pub mod extractor;
pub mod response;
pub mod router;
