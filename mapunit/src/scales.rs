//! Zoom scales and their mapping onto quad-tree depths.

/// The finest zoom scale any unit can index.
pub const UPPER_SCALE: u32 = 17;

/// Number of quad-tree levels (the root is level 0).
pub const DEPTH_LEVELS: u32 = 19;

/// Number of quad-tree levels used to code cells for `scale`.
///
/// Scales above [`UPPER_SCALE`] use every level; each scale below it drops one.
pub fn coding_depth(scale: u32) -> u32 {
    let delta = UPPER_SCALE.saturating_sub(scale);
    DEPTH_LEVELS.saturating_sub(delta).max(1)
}

/// The finest cell level used for `scale`.
pub fn coding_level(scale: u32) -> u32 {
    coding_depth(scale) - 1
}
