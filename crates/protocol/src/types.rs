use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Clamp `value` into `[lo, hi]`.
///
/// Unlike `f64::clamp` this never panics: NaN maps to `lo`, and if the
/// bounds are inverted `lo` wins.
pub fn clamp_f64(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() || value < lo {
        lo
    } else if value > hi {
        hi.max(lo)
    } else {
        value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };
    pub const UNIT: Vec2 = Vec2 { x: 1.0, y: 1.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn with_x(self, x: f64) -> Self {
        Self { x, ..self }
    }

    pub fn with_y(self, y: f64) -> Self {
        Self { y, ..self }
    }

    pub fn times(self, scalar: f64) -> Self {
        Self::new(self.x * scalar, self.y * scalar)
    }

    pub fn times_pointwise(self, other: Vec2) -> Self {
        Self::new(self.x * other.x, self.y * other.y)
    }

    pub fn divided_by_pointwise(self, other: Vec2) -> Self {
        Self::new(self.x / other.x, self.y / other.y)
    }

    pub fn dot(self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn min(a: Vec2, b: Vec2) -> Vec2 {
        Vec2::new(a.x.min(b.x), a.y.min(b.y))
    }

    pub fn max(a: Vec2, b: Vec2) -> Vec2 {
        Vec2::new(a.x.max(b.x), a.y.max(b.y))
    }

    /// Componentwise clamp of `v` into the box spanned by `lo` and `hi`.
    pub fn clamp(v: Vec2, lo: Vec2, hi: Vec2) -> Vec2 {
        Vec2::new(clamp_f64(v.x, lo.x, hi.x), clamp_f64(v.y, lo.y, hi.y))
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
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

impl Mul<f64> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f64) -> Vec2 {
        self.times(rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;

    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

/// An axis-aligned rectangle. The coordinate space it lives in (config,
/// logical or physical) is a property of the caller, never of the value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    pub const EMPTY: Rect = Rect {
        origin: Vec2::ZERO,
        size: Vec2::ZERO,
    };

    pub const fn new(origin: Vec2, size: Vec2) -> Self {
        Self { origin, size }
    }

    pub const fn from_xywh(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            origin: Vec2::new(x, y),
            size: Vec2::new(w, h),
        }
    }

    pub fn width(&self) -> f64 {
        self.size.x
    }

    pub fn height(&self) -> f64 {
        self.size.y
    }

    pub fn left(&self) -> f64 {
        self.origin.x
    }

    pub fn right(&self) -> f64 {
        self.origin.x + self.size.x
    }

    pub fn top(&self) -> f64 {
        self.origin.y
    }

    pub fn bottom(&self) -> f64 {
        self.origin.y + self.size.y
    }

    pub fn top_left(&self) -> Vec2 {
        self.origin
    }

    pub fn bottom_right(&self) -> Vec2 {
        self.origin + self.size
    }

    pub fn center(&self) -> Vec2 {
        self.origin + self.size.times(0.5)
    }

    pub fn is_empty(&self) -> bool {
        self.size.x <= 0.0 || self.size.y <= 0.0
    }

    pub fn with_origin(self, origin: Vec2) -> Self {
        Self { origin, ..self }
    }

    pub fn with_size(self, size: Vec2) -> Self {
        Self { size, ..self }
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.left()
            && point.x < self.right()
            && point.y >= self.top()
            && point.y < self.bottom()
    }

    pub fn has_intersection_with(&self, other: &Rect) -> bool {
        self.left() < other.right()
            && other.left() < self.right()
            && self.top() < other.bottom()
            && other.top() < self.bottom()
    }

    /// Intersection of both rects; an empty rect when they do not overlap.
    pub fn intersect_with(&self, other: &Rect) -> Rect {
        let top_left = Vec2::max(self.top_left(), other.top_left());
        let bottom_right = Vec2::min(self.bottom_right(), other.bottom_right());
        let size = Vec2::max(Vec2::ZERO, bottom_right - top_left);
        Rect::new(top_left, size)
    }
}

/// A scale + translate transform (no rotation or shear).
///
/// `transform_position(p) = p * scale + translation`, componentwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub scale: Vec2,
    pub translation: Vec2,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl AffineTransform {
    pub const IDENTITY: AffineTransform = AffineTransform {
        scale: Vec2::UNIT,
        translation: Vec2::ZERO,
    };

    pub const fn new(scale: Vec2, translation: Vec2) -> Self {
        Self { scale, translation }
    }

    pub const fn from_scale(scale: Vec2) -> Self {
        Self {
            scale,
            translation: Vec2::ZERO,
        }
    }

    pub const fn from_translation(translation: Vec2) -> Self {
        Self {
            scale: Vec2::UNIT,
            translation,
        }
    }

    /// The transform mapping `from` onto `to`.
    pub fn between_rects(from: &Rect, to: &Rect) -> Self {
        let scale = to.size.divided_by_pointwise(from.size);
        let translation = to.origin - from.origin.times_pointwise(scale);
        Self { scale, translation }
    }

    /// `self.times(other)` applies `other` first, then `self`.
    pub fn times(&self, other: &AffineTransform) -> Self {
        Self {
            scale: self.scale.times_pointwise(other.scale),
            translation: other.translation.times_pointwise(self.scale) + self.translation,
        }
    }

    pub fn inverted(&self) -> Option<Self> {
        if self.scale.x == 0.0 || self.scale.y == 0.0 {
            return None;
        }
        let scale = Vec2::new(1.0 / self.scale.x, 1.0 / self.scale.y);
        Some(Self {
            scale,
            translation: (-self.translation).times_pointwise(scale),
        })
    }

    /// Mirror the y axis inside a band of height `height` starting at 0.
    pub fn flip_y_within(height: f64) -> Self {
        Self {
            scale: Vec2::new(1.0, -1.0),
            translation: Vec2::new(0.0, height),
        }
    }

    pub fn transform_vector(&self, v: Vec2) -> Vec2 {
        v.times_pointwise(self.scale)
    }

    pub fn transform_position(&self, p: Vec2) -> Vec2 {
        p.times_pointwise(self.scale) + self.translation
    }

    /// Transform a rect, normalizing the result so its size is never
    /// negative when the transform mirrors an axis.
    pub fn transform_rect(&self, r: &Rect) -> Rect {
        let mut size = self.transform_vector(r.size);
        let mut origin = self.transform_position(r.origin);
        if size.x < 0.0 {
            origin.x += size.x;
            size.x = -size.x;
        }
        if size.y < 0.0 {
            origin.y += size.y;
            size.y = -size.y;
        }
        Rect::new(origin, size)
    }

    pub fn inverse_transform_position(&self, p: Vec2) -> Option<Vec2> {
        self.inverted().map(|inv| inv.transform_position(p))
    }

    pub fn inverse_transform_rect(&self, r: &Rect) -> Option<Rect> {
        self.inverted().map(|inv| inv.transform_rect(r))
    }
}

impl Mul for AffineTransform {
    type Output = AffineTransform;

    fn mul(self, rhs: AffineTransform) -> AffineTransform {
        self.times(&rhs)
    }
}
