// src/overlay/mod.rs

pub mod coords;
pub mod renderer;

pub use renderer::{compose, FrameGeometry, Overlay, OverlayRenderer};
