//! Collision layer filtering
//!
//! Based on Game Engine Architecture 3rd Edition, Section 13.3.8:
//! "Most games need to filter collisions... This is typically done via
//! collision layers or groups."
//!
//! Every collision object carries a 32-bit `layer` (what it is) and a 32-bit
//! `mask` (what it scans for).

/// Layer/mask helpers
pub struct CollisionLayers;

impl CollisionLayers {
    /// No collision layer
    pub const NONE: u32 = 0;

    /// All collision layers
    pub const ALL: u32 = 0xFFFF_FFFF;

    /// Layer new objects start on
    pub const DEFAULT: u32 = 1;

    /// Whether an object scanning with `mask` sees an object on `layer`
    pub const fn collides_with(mask: u32, layer: u32) -> bool {
        mask & layer != 0
    }

    /// Whether two objects interact: either one scans for the other
    ///
    /// # Example
    /// ```
    /// use physics_server::collision::CollisionLayers;
    ///
    /// // A sees B, B does not see A; they still collide.
    /// assert!(CollisionLayers::interacts(0b01, 0b10, 0b10, 0b00));
    /// assert!(!CollisionLayers::interacts(0b01, 0b00, 0b10, 0b00));
    /// ```
    pub const fn interacts(layer_a: u32, mask_a: u32, layer_b: u32, mask_b: u32) -> bool {
        Self::collides_with(mask_b, layer_a) || Self::collides_with(mask_a, layer_b)
    }

    /// Helper to create a mask from multiple layers
    pub fn mask(layers: &[u32]) -> u32 {
        layers.iter().fold(0, |acc, &layer| acc | layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interacts_is_either_direction() {
        assert!(CollisionLayers::interacts(1, 0, 2, 1));
        assert!(CollisionLayers::interacts(1, 2, 2, 0));
        assert!(!CollisionLayers::interacts(1, 1, 2, 2));
    }

    #[test]
    fn test_collides_with_is_one_way() {
        assert!(CollisionLayers::collides_with(0b110, 0b010));
        assert!(!CollisionLayers::collides_with(0b010, 0b100));
        assert!(!CollisionLayers::collides_with(CollisionLayers::ALL, CollisionLayers::NONE));
    }

    #[test]
    fn test_mask_creation() {
        assert_eq!(CollisionLayers::mask(&[1, 4, 8]), 13);
    }
}
