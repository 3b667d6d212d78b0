// src/overlay/coords.rs
//
// Source-frame → displayed-image box mapping. Axes scale independently;
// no rotation, no clipping (off-canvas boxes stay off-canvas).

use crate::snapshot::{CornerBox, SizedBox};
use crate::types::Size;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub x: f64,
    pub y: f64,
}

impl ScaleFactors {
    /// `displayed / source` per axis. A zero source axis maps 1:1.
    pub fn between(displayed: Size, source: Size) -> Self {
        let axis = |d: u32, s: u32| if s == 0 { 1.0 } else { d as f64 / s as f64 };
        Self {
            x: axis(displayed.width, source.width),
            y: axis(displayed.height, source.height),
        }
    }
}

/// Box in displayed-image pixels, position + size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

pub fn map_sized(b: SizedBox, scale: ScaleFactors) -> ScreenRect {
    ScreenRect {
        x: b.x * scale.x,
        y: b.y * scale.y,
        width: b.w * scale.x,
        height: b.h * scale.y,
    }
}

pub fn map_corners(b: CornerBox, scale: ScaleFactors) -> ScreenRect {
    map_sized(b.to_sized(), scale)
}

#[cfg(test)]
impl ScaleFactors {
    pub const IDENTITY: ScaleFactors = ScaleFactors { x: 1.0, y: 1.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
impl ScreenRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_keeps_box() {
        let b = SizedBox::from([12.5, 40.0, 100.0, 30.0]);
        assert_eq!(
            map_sized(b, ScaleFactors::IDENTITY),
            ScreenRect::new(12.5, 40.0, 100.0, 30.0)
        );

        let c = CornerBox::from([10.0, 20.0, 50.0, 80.0]);
        assert_eq!(
            map_corners(c, ScaleFactors::new(1.0, 1.0)),
            ScreenRect::new(10.0, 20.0, 40.0, 60.0)
        );
    }

    #[test]
    fn test_axes_scale_independently() {
        let scale = ScaleFactors::between(Size::new(960, 270), Size::new(1920, 1080));
        assert_eq!(scale, ScaleFactors::new(0.5, 0.25));

        let mapped = map_corners(CornerBox::from([100.0, 400.0, 300.0, 800.0]), scale);
        assert_eq!(mapped, ScreenRect::new(50.0, 100.0, 100.0, 100.0));
    }

    #[test]
    fn test_out_of_bounds_not_clipped() {
        let scale = ScaleFactors::new(2.0, 2.0);
        let mapped = map_sized(SizedBox::from([-10.0, 90.0, 30.0, 40.0]), scale);
        assert_eq!(mapped, ScreenRect::new(-20.0, 180.0, 60.0, 80.0));
    }

    #[test]
    fn test_zero_source_axis_maps_one_to_one() {
        let scale = ScaleFactors::between(Size::new(200, 100), Size::new(0, 50));
        assert_eq!(scale, ScaleFactors::new(1.0, 2.0));
    }
}
