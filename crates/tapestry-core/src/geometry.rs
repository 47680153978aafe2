//! Millimeter-plane primitives.

use serde::{Deserialize, Serialize};

/// A point on the canvas, in millimeters. `y` grows downwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointMm {
    pub x: f64,
    pub y: f64,
}

impl PointMm {
    pub const ORIGIN: PointMm = PointMm { x: 0.0, y: 0.0 };

    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Width/height in millimeters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeMm {
    pub width: f64,
    pub height: f64,
}

impl SizeMm {
    #[inline]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Same size with the axes exchanged.
    #[inline]
    pub fn transposed(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    #[inline]
    pub fn aspect(self) -> f64 {
        self.width / self.height
    }
}

/// Native pixel resolution of a panel in its own (unrotated) orientation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    #[inline]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn transposed(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

/// Non-addressable border around the active area, in millimeters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bezel {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

/// Axis-aligned rectangle on the canvas, in millimeters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RectMm {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RectMm {
    #[inline]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn from_origin_size(origin: PointMm, size: SizeMm) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    #[inline]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    #[inline]
    pub fn origin(&self) -> PointMm {
        PointMm::new(self.x, self.y)
    }

    #[inline]
    pub fn size(&self) -> SizeMm {
        SizeMm::new(self.width, self.height)
    }

    #[inline]
    pub fn center(&self) -> PointMm {
        PointMm::new(self.x + 0.5 * self.width, self.y + 0.5 * self.height)
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Grow outwards by the given per-side amounts.
    pub fn outset(&self, bezel: &Bezel) -> Self {
        Self::new(
            self.x - bezel.left,
            self.y - bezel.top,
            self.width + bezel.left + bezel.right,
            self.height + bezel.top + bezel.bottom,
        )
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &RectMm) -> Self {
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Overlapping region, if the interiors intersect.
    pub fn intersection(&self, other: &RectMm) -> Option<Self> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        (x1 > x0 && y1 > y0).then(|| Self::new(x0, y0, x1 - x0, y1 - y0))
    }

    /// Bounding box of a set of rectangles; `None` when empty.
    pub fn bounding<'a>(rects: impl IntoIterator<Item = &'a RectMm>) -> Option<Self> {
        rects.into_iter().fold(None, |acc, r| match acc {
            None => Some(*r),
            Some(b) => Some(b.union(r)),
        })
    }
}
