//! Fixed-point 31-bit coordinates
//!
//! OBF stores positions on a 2^31 x 2^31 grid covering the Mercator plane.
//! Only the conversions needed to interpret stored points live here.

/// Metres per x31 unit near the equator.
pub const X31_METERS: f64 = 0.011;
/// Metres per y31 unit near the equator.
pub const Y31_METERS: f64 = 0.01863;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Point31 {
    pub x: u32,
    pub y: u32,
}

impl Point31 {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Signed offset from `self` to `other`.
    pub fn delta_to(&self, other: &Point31) -> (i64, i64) {
        (
            other.x as i64 - self.x as i64,
            other.y as i64 - self.y as i64,
        )
    }

    /// Manhattan distance in metres, the measure used for bearing smoothing.
    pub fn manhattan_meters(&self, other: &Point31) -> f64 {
        let (dx, dy) = self.delta_to(other);
        x31_to_meters(dx.unsigned_abs()) + y31_to_meters(dy.unsigned_abs())
    }
}

pub fn x31_to_meters(dx: u64) -> f64 {
    dx as f64 * X31_METERS
}

pub fn y31_to_meters(dy: u64) -> f64 {
    dy as f64 * Y31_METERS
}

/// Axis-aligned box in 31-bit coordinates, edges inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Area31 {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Area31 {
    pub const WORLD: Area31 = Area31 {
        left: 0,
        top: 0,
        right: u32::MAX >> 1,
        bottom: u32::MAX >> 1,
    };

    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn contains(&self, p: &Point31) -> bool {
        p.x >= self.left && p.x <= self.right && p.y >= self.top && p.y <= self.bottom
    }

    pub fn intersects(&self, other: &Area31) -> bool {
        self.left <= other.right
            && other.left <= self.right
            && self.top <= other.bottom
            && other.top <= self.bottom
    }

    pub fn top_left(&self) -> Point31 {
        Point31::new(self.left, self.top)
    }
}

/// Normalize an angle difference into `(-PI, PI]`.
pub fn align_angle_difference(mut diff: f64) -> f64 {
    use std::f64::consts::PI;
    while diff > PI {
        diff -= 2.0 * PI;
    }
    while diff <= -PI {
        diff += 2.0 * PI;
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_manhattan_meters() {
        let a = Point31::new(1_000, 1_000);
        let b = Point31::new(1_100, 900);
        let d = a.manhattan_meters(&b);
        assert!((d - (100.0 * X31_METERS + 100.0 * Y31_METERS)).abs() < 1e-9);
        assert_eq!(a.manhattan_meters(&b), b.manhattan_meters(&a));
    }

    #[test]
    fn test_area_contains_and_intersects() {
        let area = Area31::new(10, 10, 20, 20);
        assert!(area.contains(&Point31::new(10, 20)));
        assert!(!area.contains(&Point31::new(21, 15)));
        assert!(area.intersects(&Area31::new(20, 0, 30, 10)));
        assert!(!area.intersects(&Area31::new(21, 0, 30, 9)));
        assert!(Area31::WORLD.contains(&Point31::new(1 << 30, 1 << 30)));
    }

    #[test]
    fn test_align_angle_difference() {
        assert!((align_angle_difference(3.0 * PI) - PI).abs() < 1e-9);
        assert!((align_angle_difference(-1.5 * PI) - 0.5 * PI).abs() < 1e-9);
        assert_eq!(align_angle_difference(0.25), 0.25);
    }
}
