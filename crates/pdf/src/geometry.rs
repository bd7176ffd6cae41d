//! Points, affine matrices and quads in PDF user space.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn sub(self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    fn dot(self, other: Point) -> f32 {
        self.x * other.x + self.y * other.y
    }

    fn cross(self, other: Point) -> f32 {
        self.x * other.y - self.y * other.x
    }

    fn length(self) -> f32 {
        self.dot(self).sqrt()
    }
}

/// PDF affine matrix `[a b c d e f]`, row-vector convention (`p' = p × M`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(tx: f32, ty: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// `self × other`: apply `self` first, then `other`.
    pub fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            p.x * self.a + p.y * self.c + self.e,
            p.x * self.b + p.y * self.d + self.f,
        )
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Matrix::IDENTITY
    }
}

/// Axis-aligned rectangle, `x0 <= x1`, `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

/// Quadrilateral with corners named as seen upright on the text baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub ul: Point,
    pub ur: Point,
    pub ll: Point,
    pub lr: Point,
}

impl Quad {
    pub fn from_rect(rect: Rect) -> Self {
        Quad {
            ul: Point::new(rect.x0, rect.y1),
            ur: Point::new(rect.x1, rect.y1),
            ll: Point::new(rect.x0, rect.y0),
            lr: Point::new(rect.x1, rect.y0),
        }
    }

    /// The unit square `[0,1]²` mapped through `m`; how images are placed.
    pub fn unit_square(m: &Matrix) -> Self {
        Quad {
            ul: m.apply(Point::new(0.0, 1.0)),
            ur: m.apply(Point::new(1.0, 1.0)),
            ll: m.apply(Point::new(0.0, 0.0)),
            lr: m.apply(Point::new(1.0, 0.0)),
        }
    }

    pub fn corners(&self) -> [Point; 4] {
        [self.ll, self.lr, self.ur, self.ul]
    }

    pub fn rect(&self) -> Rect {
        let corners = self.corners();
        let mut rect = Rect {
            x0: f32::INFINITY,
            y0: f32::INFINITY,
            x1: f32::NEG_INFINITY,
            y1: f32::NEG_INFINITY,
        };
        for p in corners {
            rect.x0 = rect.x0.min(p.x);
            rect.y0 = rect.y0.min(p.y);
            rect.x1 = rect.x1.max(p.x);
            rect.y1 = rect.y1.max(p.y);
        }
        rect
    }

    pub fn center(&self) -> Point {
        let corners = self.corners();
        let (sx, sy) = corners
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point::new(sx / 4.0, sy / 4.0)
    }

    pub fn is_finite(&self) -> bool {
        self.corners()
            .iter()
            .all(|p| p.x.is_finite() && p.y.is_finite())
    }

    /// Length of the baseline (`ll` to `lr`).
    pub fn width(&self) -> f32 {
        self.lr.sub(self.ll).length()
    }

    /// Length of the left edge (`ll` to `ul`).
    pub fn height(&self) -> f32 {
        self.ul.sub(self.ll).length()
    }

    /// Unit vector along the baseline; `(1, 0)` for degenerate quads.
    pub fn direction(&self) -> Point {
        let v = self.lr.sub(self.ll);
        let len = v.length();
        if len > f32::EPSILON {
            Point::new(v.x / len, v.y / len)
        } else {
            Point::new(1.0, 0.0)
        }
    }

    /// Point-in-quad test with a tolerance in points, for convex quads of
    /// either winding.
    pub fn contains(&self, p: Point, tolerance: f32) -> bool {
        let corners = self.corners();
        let mut sign = 0.0f32;
        for i in 0..4 {
            let a = corners[i];
            let b = corners[(i + 1) % 4];
            let edge = b.sub(a);
            let len = edge.length();
            if len <= f32::EPSILON {
                continue;
            }
            let side = edge.cross(p.sub(a)) / len;
            if side.abs() <= tolerance {
                continue;
            }
            if sign == 0.0 {
                sign = side.signum();
            } else if side.signum() != sign {
                return false;
            }
        }
        // Degenerate quads only contain points on (or near) their edges.
        sign != 0.0 || self.rect_contains(p, tolerance)
    }

    fn rect_contains(&self, p: Point, tolerance: f32) -> bool {
        let r = self.rect();
        p.x >= r.x0 - tolerance
            && p.x <= r.x1 + tolerance
            && p.y >= r.y0 - tolerance
            && p.y <= r.y1 + tolerance
    }

    pub fn contains_quad(&self, other: &Quad, tolerance: f32) -> bool {
        other
            .corners()
            .iter()
            .all(|p| self.contains(*p, tolerance))
    }

    /// Offset of `p` from this quad's baseline: `(along, across)` relative to
    /// `lr`, measured in the baseline's own direction.
    pub fn offset_from_end(&self, p: Point) -> (f32, f32) {
        let u = self.direction();
        let d = p.sub(self.lr);
        (d.dot(u), u.cross(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_then() {
        let scale = Matrix::new(2.0, 0.0, 0.0, 2.0, 0.0, 0.0);
        let shift = Matrix::translate(10.0, 5.0);
        let m = scale.then(&shift);
        assert_eq!(m.apply(Point::new(1.0, 1.0)), Point::new(12.0, 7.0));
        let m = shift.then(&scale);
        assert_eq!(m.apply(Point::new(1.0, 1.0)), Point::new(22.0, 12.0));
    }

    #[test]
    fn test_quad_contains() {
        let quad = Quad::from_rect(Rect {
            x0: 0.0,
            y0: 0.0,
            x1: 10.0,
            y1: 5.0,
        });
        assert!(quad.contains(Point::new(5.0, 2.5), 0.0));
        assert!(quad.contains(Point::new(10.2, 2.5), 0.5));
        assert!(!quad.contains(Point::new(11.0, 2.5), 0.5));
    }

    #[test]
    fn test_rotated_quad_contains() {
        // 90° rotation about the origin
        let m = Matrix::new(0.0, 1.0, -1.0, 0.0, 0.0, 0.0);
        let quad = Quad::unit_square(&Matrix::new(10.0, 0.0, 0.0, 4.0, 0.0, 0.0).then(&m));
        assert!(quad.contains(Point::new(-2.0, 5.0), 0.0));
        assert!(!quad.contains(Point::new(2.0, 5.0), 0.0));
        let rect = quad.rect();
        assert_eq!((rect.x0, rect.x1, rect.y0, rect.y1), (-4.0, 0.0, 0.0, 10.0));
    }
}
