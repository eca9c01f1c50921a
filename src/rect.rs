use std::fmt;

use glam::{vec2, Vec2};

/// Below this, a side length counts as zero.
pub(crate) const RECT_EPSILON: f32 = f32::EPSILON;

/// An axis-aligned rectangle.
///
/// The origin is the top-left corner. Positive x points right, positive y points down.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    pub const ZERO: Rect = Rect { origin: Vec2::ZERO, size: Vec2::ZERO };

    pub const fn new(origin: Vec2, size: Vec2) -> Rect {
        return Rect { origin, size };
    }

    pub const fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Rect {
        return Rect {
            origin: Vec2::new(x, y),
            size: Vec2::new(width, height),
        };
    }

    pub fn x(&self) -> f32 {
        return self.origin.x;
    }

    pub fn y(&self) -> f32 {
        return self.origin.y;
    }

    pub fn width(&self) -> f32 {
        return self.size.x;
    }

    pub fn height(&self) -> f32 {
        return self.size.y;
    }

    pub fn left(&self) -> f32 {
        return self.origin.x;
    }

    pub fn right(&self) -> f32 {
        return self.origin.x + self.size.x;
    }

    pub fn top(&self) -> f32 {
        return self.origin.y;
    }

    pub fn bottom(&self) -> f32 {
        return self.origin.y + self.size.y;
    }

    /// Same size, different origin.
    pub fn with_origin(&self, origin: Vec2) -> Rect {
        return Rect { origin, size: self.size };
    }

    /// Same origin, different size.
    pub fn with_size(&self, size: Vec2) -> Rect {
        return Rect { origin: self.origin, size };
    }

    pub fn translated(&self, offset: Vec2) -> Rect {
        return Rect { origin: self.origin + offset, size: self.size };
    }

    pub fn scaled(&self, factor: f32) -> Rect {
        return Rect { origin: self.origin * factor, size: self.size * factor };
    }

    /// A rectangle is empty if either side has no length.
    pub fn is_empty(&self) -> bool {
        return self.size.x <= RECT_EPSILON || self.size.y <= RECT_EPSILON;
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, point: Vec2) -> bool {
        return point.x >= self.left()
            && point.y >= self.top()
            && point.x < self.right()
            && point.y < self.bottom();
    }

    /// Touching edges count as intersecting.
    pub fn intersects(&self, other: &Rect) -> bool {
        return !(self.left() > other.right()
            || self.right() < other.left()
            || self.top() > other.bottom()
            || self.bottom() < other.top());
    }

    /// The overlapping part of the two rectangles.
    ///
    /// If they don't overlap, the result has zero size on the non-overlapping axis, so it is [empty](Rect::is_empty).
    pub fn intersection(&self, other: &Rect) -> Rect {
        let min = self.origin.max(other.origin);
        let max = vec2(self.right().min(other.right()), self.bottom().min(other.bottom()));
        return Rect {
            origin: min,
            size: (max - min).max(Vec2::ZERO),
        };
    }

    /// The smallest rectangle containing both.
    ///
    /// An empty rectangle doesn't contribute to the result.
    pub fn union(&self, other: &Rect) -> Rect {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        let min = self.origin.min(other.origin);
        let max = vec2(self.right().max(other.right()), self.bottom().max(other.bottom()));
        return Rect { origin: min, size: max - min };
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(rect {} {} {} {})", self.origin.x, self.origin.y, self.size.x, self.size.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_of_disjoint_rects_is_empty() {
        let a = Rect::from_xywh(0.0, 0.0, 10.0, 10.0);
        let b = Rect::from_xywh(20.0, 20.0, 5.0, 5.0);
        assert!(a.intersection(&b).is_empty());
        assert!(!a.intersects(&b));
    }

    #[test]
    fn intersection_clips_to_overlap() {
        let a = Rect::from_xywh(0.0, 0.0, 10.0, 10.0);
        let b = Rect::from_xywh(5.0, -5.0, 10.0, 10.0);
        assert_eq!(a.intersection(&b), Rect::from_xywh(5.0, 0.0, 5.0, 5.0));
    }

    #[test]
    fn union_ignores_empty_rects() {
        let a = Rect::from_xywh(3.0, 4.0, 10.0, 10.0);
        let empty = Rect::from_xywh(-100.0, -100.0, 0.0, 0.0);
        assert_eq!(a.union(&empty), a);
        assert_eq!(empty.union(&a), a);

        let b = Rect::from_xywh(20.0, 0.0, 5.0, 5.0);
        assert_eq!(a.union(&b), Rect::from_xywh(3.0, 0.0, 22.0, 14.0));
    }

    #[test]
    fn contains_is_half_open() {
        let r = Rect::from_xywh(0.0, 0.0, 10.0, 10.0);
        assert!(r.contains(vec2(0.0, 0.0)));
        assert!(r.contains(vec2(9.9, 9.9)));
        assert!(!r.contains(vec2(10.0, 5.0)));
    }
}
