//! # Core Engine Module
//!
//! Shared configuration types used by the frame pipeline and the demo binary.

pub mod config;

pub use config::{
    Config,
    ConfigError,
    DemoConfig,
    EngineConfig,
    GridLayout,
    RendererConfig,
    SceneConfig,
};
