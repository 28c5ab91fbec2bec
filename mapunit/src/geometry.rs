use std::hash::Hash;

/// Lower bound of the projected coordinate space on both axes.
pub const WORLD_MIN: f64 = -180.0;
/// Upper bound of the projected coordinate space on both axes.
pub const WORLD_MAX: f64 = 180.0;

/// An axis-aligned rectangle in the projected coordinate space.
///
/// `BoundingRect` is used for unit extents, feature extents and query
/// rectangles. Bounds are inclusive.
///
/// # Examples
///
/// ```rust
/// use mapunit::BoundingRect;
///
/// let unit = BoundingRect::new(0.0, 0.0, 10.0, 10.0);
/// let view = BoundingRect::new(5.0, 5.0, 15.0, 15.0);
/// assert!(unit.intersects(&view));
/// ```
#[derive(Clone, Copy, PartialEq, Default, Debug, serde::Deserialize, serde::Serialize)]
pub struct BoundingRect {
    /// Minimum X coordinate
    pub min_x: f64,
    /// Minimum Y coordinate
    pub min_y: f64,
    /// Maximum X coordinate
    pub max_x: f64,
    /// Maximum Y coordinate
    pub max_y: f64,
}

impl Hash for BoundingRect {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.min_x.to_bits().hash(state);
        self.min_y.to_bits().hash(state);
        self.max_x.to_bits().hash(state);
        self.max_y.to_bits().hash(state);
    }
}

impl std::fmt::Display for BoundingRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BoundingRect({}, {}, {}, {})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

impl BoundingRect {
    /// Creates a new rectangle with the specified coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> BoundingRect {
        BoundingRect {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The rectangle that intersects everything.
    pub fn infinite() -> BoundingRect {
        BoundingRect::new(
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
            f64::INFINITY,
            f64::INFINITY,
        )
    }

    /// The whole addressable coordinate space.
    pub fn world() -> BoundingRect {
        BoundingRect::new(WORLD_MIN, WORLD_MIN, WORLD_MAX, WORLD_MAX)
    }

    /// The empty rectangle; `union` with it is the identity.
    pub fn empty() -> BoundingRect {
        BoundingRect::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        )
    }

    /// Returns the width of the rectangle.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Returns the height of the rectangle.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Returns the center point of the rectangle.
    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    /// True when the rectangle contains no point at all (or has NaN bounds).
    pub fn is_empty(&self) -> bool {
        !(self.min_x <= self.max_x && self.min_y <= self.max_y)
    }

    /// True when the rectangle has no area: empty, a point or a segment.
    pub fn is_degenerate(&self) -> bool {
        !(self.min_x < self.max_x && self.min_y < self.max_y)
    }

    /// Checks if this rectangle contains a point.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Checks if this rectangle contains another rectangle.
    pub fn contains(&self, other: &BoundingRect) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Checks if this rectangle intersects another one, touching edges included.
    pub fn intersects(&self, other: &BoundingRect) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Checks if the two rectangles share a region of positive area.
    pub fn overlaps(&self, other: &BoundingRect) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Returns the intersection of the two rectangles, possibly empty.
    pub fn intersection(&self, other: &BoundingRect) -> BoundingRect {
        BoundingRect::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        )
    }

    /// Returns the union of this rectangle with another.
    pub fn union(&self, other: &BoundingRect) -> BoundingRect {
        BoundingRect::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }
}
