//! GPU-less backend
//!
//! Implements the device and swapchain contracts in memory so the frame pipeline
//! can run, and be inspected, without a driver.

pub mod device;
pub mod swapchain;

pub use device::{HeadlessDevice, RecordedCommand, Submission};
pub use swapchain::HeadlessSwapchain;
