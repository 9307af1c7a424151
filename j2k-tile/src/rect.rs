//! Axis-aligned integer rectangles and points.

/// A point with non-negative integer coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    /// The x coordinate.
    pub x: u32,
    /// The y coordinate.
    pub y: u32,
}

impl Point {
    /// Create a new point.
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle, covering `x0..x1` horizontally and `y0..y1`
/// vertically.
///
/// A rectangle is empty if `x1 <= x0` or `y1 <= y0`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    /// The inclusive left edge.
    pub x0: u32,
    /// The inclusive top edge.
    pub y0: u32,
    /// The exclusive right edge.
    pub x1: u32,
    /// The exclusive bottom edge.
    pub y1: u32,
}

impl Rect {
    /// The canonical empty rectangle.
    pub const EMPTY: Self = Self::from_ltrb(0, 0, 0, 0);

    /// Create a rectangle from its edges.
    pub const fn from_ltrb(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Create a rectangle from its origin and size.
    pub const fn from_xywh(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            x0: x,
            y0: y,
            x1: x.saturating_add(w),
            y1: y.saturating_add(h),
        }
    }

    /// The width of the rectangle (B-11), zero if empty.
    pub const fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    /// The height of the rectangle (B-11), zero if empty.
    pub const fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    /// The number of points covered by the rectangle.
    pub const fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Whether the rectangle covers no points.
    pub const fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }

    /// The origin of the rectangle.
    pub const fn origin(&self) -> Point {
        Point::new(self.x0, self.y0)
    }

    /// Whether the point lies inside the rectangle.
    pub const fn contains(&self, p: Point) -> bool {
        p.x >= self.x0 && p.x < self.x1 && p.y >= self.y0 && p.y < self.y1
    }

    /// Whether `other` lies completely inside this rectangle.
    pub fn contains_rect(&self, other: Self) -> bool {
        other.is_empty()
            || (other.x0 >= self.x0
                && other.y0 >= self.y0
                && other.x1 <= self.x1
                && other.y1 <= self.y1)
    }

    /// The intersection of two rectangles, `Rect::EMPTY` if they don't overlap.
    pub fn intersect(&self, other: Self) -> Self {
        let r = Self::from_ltrb(
            u32::max(self.x0, other.x0),
            u32::max(self.y0, other.y0),
            u32::min(self.x1, other.x1),
            u32::min(self.y1, other.y1),
        );

        if r.is_empty() { Self::EMPTY } else { r }
    }

    /// Whether the two rectangles share at least one point.
    pub fn non_empty_intersection(&self, other: Self) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Divide all edges by `2^n`, rounding up (B-14).
    pub fn ceil_div_pow2(&self, n: u8) -> Self {
        let d = 1_u64 << n;
        let div = |v: u32| (v as u64).div_ceil(d) as u32;

        Self::from_ltrb(div(self.x0), div(self.y0), div(self.x1), div(self.y1))
    }

    /// Move the rectangle so that `origin` becomes `(0, 0)`. Returns `None`
    /// if the rectangle starts before `origin`.
    pub fn relative_to(&self, origin: Point) -> Option<Self> {
        if self.is_empty() {
            return Some(Self::EMPTY);
        }

        Some(Self::from_ltrb(
            self.x0.checked_sub(origin.x)?,
            self.y0.checked_sub(origin.y)?,
            self.x1.checked_sub(origin.x)?,
            self.y1.checked_sub(origin.y)?,
        ))
    }

    /// Move the rectangle by the given offset. Returns `None` if an edge
    /// overflows.
    pub fn translate(&self, dx: u32, dy: u32) -> Option<Self> {
        Some(Self::from_ltrb(
            self.x0.checked_add(dx)?,
            self.y0.checked_add(dy)?,
            self.x1.checked_add(dx)?,
            self.y1.checked_add(dy)?,
        ))
    }
}
