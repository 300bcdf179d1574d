use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

///Represents a vector in 2D arena space.
/// Positive x is to the right, positive y is down.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    ///Unit vector pointing at `radians` from the +x axis.
    pub fn from_angle(radians: f32) -> Self {
        Self {
            x: radians.cos(),
            y: radians.sin(),
        }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn magnitude_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    ///Returns the normalized vector, or zero for a zero-length input.
    pub fn normalize(&self) -> Vec2 {
        let mag = self.magnitude();
        if mag <= f32::EPSILON || !mag.is_finite() {
            Vec2::ZERO
        } else {
            Vec2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vec2 {
        Vec2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    pub fn dot(&self, other: &Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn distance(&self, other: &Vec2) -> f32 {
        (*other - *self).magnitude()
    }

    ///Angle of the vector in radians, measured from the +x axis.
    pub fn angle(&self) -> f32 {
        self.y.atan2(self.x)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    ///Replaces non-finite components with zero.
    pub fn sanitized(&self) -> Vec2 {
        Vec2 {
            x: finite_or(self.x, 0.0),
            y: finite_or(self.y, 0.0),
        }
    }

    ///Shrinks the vector so its magnitude does not exceed `max`.
    pub fn clamp_magnitude(&self, max: f32) -> Vec2 {
        let mag = self.magnitude();
        if mag > max && mag > 0.0 {
            self.scale(max / mag)
        } else {
            *self
        }
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        self.scale(rhs)
    }
}

/// Returns `value` when finite, `fallback` for NaN and infinities.
pub fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Shortest distance from `p` to the segment `a`-`b`.
pub fn point_segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len_sq = ab.magnitude_squared();
    if len_sq <= f32::EPSILON {
        return p.distance(&a);
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    let closest = a + ab.scale(t);
    p.distance(&closest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(Vec2::ZERO.normalize(), Vec2::ZERO);
        let nan = Vec2::new(f32::NAN, 1.0);
        assert_eq!(nan.sanitized(), Vec2::new(0.0, 1.0));
    }

    #[test]
    fn test_normalize_and_dot() {
        let v = Vec2::new(3.0, 4.0).normalize();
        assert_approx_eq!(v.magnitude(), 1.0, 1e-6);
        assert_approx_eq!(v.dot(&Vec2::new(1.0, 0.0)), 0.6, 1e-6);
    }

    #[test]
    fn test_clamp_magnitude() {
        let v = Vec2::new(10.0, 0.0).clamp_magnitude(1.0);
        assert_approx_eq!(v.x, 1.0, 1e-6);
        let small = Vec2::new(0.2, 0.1);
        assert_eq!(small.clamp_magnitude(1.0), small);
    }

    #[test]
    fn test_point_segment_distance() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(100.0, 0.0);
        assert_approx_eq!(point_segment_distance(Vec2::new(50.0, 10.0), a, b), 10.0, 1e-4);
        assert_approx_eq!(point_segment_distance(Vec2::new(-30.0, 40.0), a, b), 50.0, 1e-4);
        assert_approx_eq!(point_segment_distance(Vec2::new(5.0, 5.0), a, a), 50f32.sqrt(), 1e-4);
    }

    #[test]
    fn test_from_angle() {
        let v = Vec2::from_angle(std::f32::consts::FRAC_PI_2);
        assert_approx_eq!(v.x, 0.0, 1e-6);
        assert_approx_eq!(v.y, 1.0, 1e-6);
    }
}
