use macroquad::math::{Vec2, vec2};

use crate::settings::{VIEWPORT_HEIGHT, VIEWPORT_WIDTH};

/// Axis-aligned rectangle in window pixels. Fixed once the layout is built.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl Region {
    pub fn new(min_x: f32, max_x: f32, min_y: f32, max_y: f32) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    pub fn around(center: Vec2, width: f32, height: f32) -> Self {
        Self::new(
            center.x - width * 0.5,
            center.x + width * 0.5,
            center.y - height * 0.5,
            center.y + height * 0.5,
        )
    }

    pub fn center(&self) -> Vec2 {
        vec2(
            (self.min_x + self.max_x) * 0.5,
            (self.min_y + self.max_y) * 0.5,
        )
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn contains(&self, point: Vec2) -> bool {
        hit_test(point, self)
    }
}

/// Exclusive bounds: a point lying on an edge is outside.
pub fn hit_test(point: Vec2, region: &Region) -> bool {
    point.x > region.min_x && point.x < region.max_x && point.y > region.min_y && point.y < region.max_y
}

/// Angle of `point` around `center`, 0 at 12 o'clock and growing clockwise,
/// in `(-PI, PI]`. The wrap sits at 6 o'clock, away from the rest position.
pub fn compute_rotation(point: Vec2, center: Vec2) -> f32 {
    let dx = point.x - center.x;
    let dy = point.y - center.y;
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }
    // Window y grows downward, so "up" is -dy.
    dx.atan2(-dy)
}

pub fn pixel_to_gl(point: Vec2) -> Vec2 {
    vec2(
        point.x / (VIEWPORT_WIDTH as f32 * 0.5) - 1.0,
        1.0 - point.y / (VIEWPORT_HEIGHT as f32 * 0.5),
    )
}

pub fn gl_to_pixel(point: Vec2) -> Vec2 {
    vec2(
        (point.x + 1.0) * (VIEWPORT_WIDTH as f32 * 0.5),
        (1.0 - point.y) * (VIEWPORT_HEIGHT as f32 * 0.5),
    )
}

#[cfg(test)]
mod tests {
    use std::f32::consts::{FRAC_PI_2, PI};

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn edges_do_not_hit() {
        let region = Region::new(10.0, 20.0, 30.0, 40.0);
        assert!(region.contains(vec2(15.0, 35.0)));
        assert!(!region.contains(vec2(10.0, 35.0)));
        assert!(!region.contains(vec2(20.0, 35.0)));
        assert!(!region.contains(vec2(15.0, 30.0)));
        assert!(!region.contains(vec2(15.0, 40.0)));
    }

    #[test]
    fn rotation_follows_the_clock() {
        let center = vec2(100.0, 100.0);
        assert_eq!(compute_rotation(vec2(100.0, 50.0), center), 0.0);
        assert!((compute_rotation(vec2(150.0, 100.0), center) - FRAC_PI_2).abs() < 1e-6);
        assert!((compute_rotation(vec2(50.0, 100.0), center) + FRAC_PI_2).abs() < 1e-6);
        assert!((compute_rotation(vec2(100.0, 150.0), center) - PI).abs() < 1e-6);
        assert_eq!(compute_rotation(center, center), 0.0);
    }

    #[test]
    fn rotation_is_continuous_across_twelve_o_clock() {
        let center = vec2(0.0, 0.0);
        let left = compute_rotation(vec2(-0.01, -10.0), center);
        let right = compute_rotation(vec2(0.01, -10.0), center);
        assert!((right - left).abs() < 0.01);
    }

    #[test]
    fn gl_and_pixel_coordinates_round_trip() {
        let point = vec2(200.0, 450.0);
        let back = gl_to_pixel(pixel_to_gl(point));
        assert!((back - point).length() < 1e-3);
        assert_eq!(pixel_to_gl(vec2(0.0, 0.0)), vec2(-1.0, 1.0));
    }

    proptest! {
        #[test]
        fn rotation_ignores_distance(
            angle in -3.1f32..3.1,
            near in 1.0f32..50.0,
            far in 60.0f32..400.0,
        ) {
            let center = vec2(320.0, 240.0);
            let direction = vec2(angle.sin(), -angle.cos());
            let a = compute_rotation(center + direction * near, center);
            let b = compute_rotation(center + direction * far, center);
            prop_assert!((a - b).abs() < 1e-4);
            prop_assert_eq!(a, compute_rotation(center + direction * near, center));
        }
    }
}
