///Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f32,
    ///Value along the y-axis.
    /// Positive direction is down, matching tile row order.
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Vec2 {
        Vec2 { x, y }
    }

    ///Unit vector pointing along the given angle in radians.
    pub fn from_angle(angle: f32) -> Vec2 {
        Vec2 {
            x: angle.cos(),
            y: angle.sin(),
        }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the normalized vector.
    pub fn normalize(&self) -> Vec2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec2 { x: 0.0, y: 0.0 }
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

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vec2) -> Vec2 {
        Vec2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    ///Returns the difference of two vectors.
    pub fn sub(&self, other: &Vec2) -> Vec2 {
        Vec2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    pub fn dot(&self, other: &Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn distance_to(&self, other: &Vec2) -> f32 {
        self.sub(other).magnitude()
    }
}

/// Shortest distance from point `p` to the segment `a`-`b`.
pub fn point_segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b.sub(&a);
    let len_sq = ab.dot(&ab);
    if len_sq == 0.0 {
        return p.distance_to(&a);
    }

    let t = (p.sub(&a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    let closest = a.add(&ab.scale(t));
    p.distance_to(&closest)
}

/// Capsule-vs-circle test: does the swept segment `a`-`b` with the
/// bullet's radius folded into `radius` pass through the circle?
/// Used for bullet/tank hits so fast bullets cannot tunnel through a
/// tank between two ticks.
pub fn segment_hits_circle(a: Vec2, b: Vec2, center: Vec2, radius: f32) -> bool {
    point_segment_distance(center, a, b) < radius
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_magnitude() {
        let v = Vec2::new(3.0, 4.0);
        assert_approx_eq!(v.magnitude(), 5.0, 0.0001);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let v = Vec2::new(0.0, 0.0).normalize();
        assert_eq!(v, Vec2::new(0.0, 0.0));
    }

    #[test]
    fn test_normalize() {
        let v = Vec2::new(10.0, 0.0).normalize();
        assert_approx_eq!(v.x, 1.0, 0.0001);
        assert_approx_eq!(v.y, 0.0, 0.0001);
    }

    #[test]
    fn test_from_angle() {
        let v = Vec2::from_angle(0.0);
        assert_approx_eq!(v.x, 1.0, 0.0001);
        assert_approx_eq!(v.y, 0.0, 0.0001);

        let v = Vec2::from_angle(std::f32::consts::FRAC_PI_2);
        assert_approx_eq!(v.x, 0.0, 0.0001);
        assert_approx_eq!(v.y, 1.0, 0.0001);
    }

    #[test]
    fn test_point_segment_distance_endpoints() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);

        // Beyond the start of the segment
        assert_approx_eq!(point_segment_distance(Vec2::new(-5.0, 0.0), a, b), 5.0, 0.0001);
        // Beyond the end
        assert_approx_eq!(point_segment_distance(Vec2::new(13.0, 4.0), a, b), 5.0, 0.0001);
        // Perpendicular to the middle
        assert_approx_eq!(point_segment_distance(Vec2::new(5.0, 2.0), a, b), 2.0, 0.0001);
    }

    #[test]
    fn test_point_segment_distance_degenerate_segment() {
        let a = Vec2::new(1.0, 1.0);
        assert_approx_eq!(
            point_segment_distance(Vec2::new(4.0, 5.0), a, a),
            5.0,
            0.0001
        );
    }

    #[test]
    fn test_segment_hits_circle() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(100.0, 0.0);

        assert!(segment_hits_circle(a, b, Vec2::new(50.0, 5.0), 10.0));
        assert!(!segment_hits_circle(a, b, Vec2::new(50.0, 15.0), 10.0));
    }

    #[test]
    fn test_fast_bullet_does_not_tunnel() {
        // Tank sits between two consecutive bullet positions; a plain
        // point-in-circle test would miss it.
        let prev = Vec2::new(0.0, 0.0);
        let next = Vec2::new(60.0, 0.0);
        let tank = Vec2::new(30.0, 0.0);

        assert!(prev.distance_to(&tank) > 17.0);
        assert!(next.distance_to(&tank) > 17.0);
        assert!(segment_hits_circle(prev, next, tank, 17.0));
    }
}
