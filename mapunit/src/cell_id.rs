//! Quad-tree cells ordered along a Hilbert curve.
//!
//! The projected world is split recursively into four quadrants. Children of
//! a cell are ordered by their position on the Hilbert curve, so a cell's
//! Hilbert index at level `l + 1` is always `4 * parent + quadrant`.
//!
//! ## Pre-order codes
//! Index tables key features by the *pre-order* number of the cell that
//! covers them. In a pre-order numbering a cell and all of its descendants
//! occupy one contiguous range `[code, code + subtree_size)`, which lets a
//! single interval select a whole sub-tree.

use crate::geometry::{BoundingRect, WORLD_MAX, WORLD_MIN};

/// One quad-tree cell: `level` 0 is the whole world, level `l` is a
/// `2^l x 2^l` grid.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CellId {
    level: u32,
    x: u32,
    y: u32,
}

impl CellId {
    /// The cell covering the whole world.
    pub fn root() -> Self {
        CellId { level: 0, x: 0, y: 0 }
    }

    /// Creates the cell at grid position `(x, y)` on `level`.
    pub fn new(level: u32, x: u32, y: u32) -> Self {
        debug_assert!(level < 32, "level must be below 32");
        debug_assert!(
            (x as u64) < (1u64 << level) && (y as u64) < (1u64 << level),
            "grid position out of range"
        );
        CellId { level, x, y }
    }

    /// The cell on `level` containing the projected point `(px, py)`.
    ///
    /// Points outside the world are clamped to its border.
    pub fn from_point(px: f64, py: f64, level: u32) -> Self {
        let n = 1u64 << level;
        let to_grid = |v: f64| -> u32 {
            let norm = ((v - WORLD_MIN) / (WORLD_MAX - WORLD_MIN)).clamp(0.0, 1.0);
            ((norm * n as f64) as u64).min(n - 1) as u32
        };
        CellId::new(level, to_grid(px), to_grid(py))
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn parent(&self) -> Option<CellId> {
        if self.level == 0 {
            None
        } else {
            Some(CellId::new(self.level - 1, self.x >> 1, self.y >> 1))
        }
    }

    /// The four children in Hilbert order.
    pub fn children(&self) -> [CellId; 4] {
        let level = self.level + 1;
        let (x, y) = (self.x << 1, self.y << 1);
        let mut children = [
            CellId::new(level, x, y),
            CellId::new(level, x + 1, y),
            CellId::new(level, x, y + 1),
            CellId::new(level, x + 1, y + 1),
        ];
        children.sort_unstable_by_key(|c| c.hilbert_index() & 3);
        children
    }

    /// True if `self` is `other` or one of its ancestors.
    pub fn is_ancestor_or_self_of(&self, other: &CellId) -> bool {
        if self.level > other.level {
            return false;
        }
        let shift = other.level - self.level;
        other.x >> shift == self.x && other.y >> shift == self.y
    }

    /// Position of this cell on the Hilbert curve of its own level.
    pub fn hilbert_index(&self) -> u64 {
        xy2d(1u64 << self.level, self.x as u64, self.y as u64)
    }

    /// The projected area covered by this cell.
    pub fn rect(&self) -> BoundingRect {
        let size = (WORLD_MAX - WORLD_MIN) / (1u64 << self.level) as f64;
        let min_x = WORLD_MIN + self.x as f64 * size;
        let min_y = WORLD_MIN + self.y as f64 * size;
        BoundingRect::new(min_x, min_y, min_x + size, min_y + size)
    }

    /// Pre-order code of this cell in a tree of `depth` levels.
    pub fn code(&self, depth: u32) -> u64 {
        debug_assert!(self.level < depth, "cell is deeper than the coding depth");
        let index = self.hilbert_index();
        let mut code = 0u64;
        for k in 1..=self.level {
            let quadrant = (index >> (2 * (self.level - k))) & 3;
            code += 1 + quadrant * subtree_size(k, depth);
        }
        code
    }

    /// Number of codes used by this cell and its descendants.
    pub fn subtree_size(&self, depth: u32) -> u64 {
        subtree_size(self.level, depth)
    }
}

/// Number of cells in the sub-tree rooted at `level` of a `depth`-level tree.
pub fn subtree_size(level: u32, depth: u32) -> u64 {
    debug_assert!(level < depth);
    ((1u64 << (2 * (depth - level))) - 1) / 3
}

/// Converts grid coordinates to a distance along the Hilbert curve of an
/// `n x n` grid.
fn xy2d(n: u64, x: u64, y: u64) -> u64 {
    let mut d = 0u64;
    let mut x = x;
    let mut y = y;
    let mut s = n / 2;

    while s > 0 {
        let rx = ((x & s) > 0) as u64;
        let ry = ((y & s) > 0) as u64;
        d += s * s * ((3 * rx) ^ ry);
        rotate(s, &mut x, &mut y, rx, ry);
        s /= 2;
    }

    d
}

fn rotate(n: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = n.wrapping_sub(1).wrapping_sub(*x);
            *y = n.wrapping_sub(1).wrapping_sub(*y);
        }
        std::mem::swap(x, y);
    }
}
