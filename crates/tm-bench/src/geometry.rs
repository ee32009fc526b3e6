use tm_device::{Dim3, LaunchConfig};

/// Number of tiles needed along one axis: `ceil(width / tile_width)`.
///
/// A zero tile width yields zero tiles, which the device then rejects as an
/// invalid launch.
pub fn tiles_per_axis(width: usize, tile_width: u32) -> u32 {
    if tile_width == 0 {
        return 0;
    }
    let tiles = width.div_ceil(tile_width as usize);
    u32::try_from(tiles).unwrap_or(u32::MAX)
}

/// Square tiling of a `width × width` output matrix.
///
/// The last row and column of tiles may hang past the matrix edge when
/// `width` is not a multiple of the tile width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    pub grid: Dim3,
    pub block: Dim3,
}

impl TileGeometry {
    pub fn new(width: usize, tile_width: u32) -> Self {
        let tiles = tiles_per_axis(width, tile_width);
        TileGeometry {
            grid: Dim3::xy(tiles, tiles),
            block: Dim3::xy(tile_width, tile_width),
        }
    }

    pub fn launch_config(&self) -> LaunchConfig {
        LaunchConfig::new(self.grid, self.block)
    }

    /// Invocations that fall outside the matrix and do no work.
    pub fn idle_invocations(&self, width: usize) -> u64 {
        let scheduled = self.grid.count() * self.block.count();
        scheduled.saturating_sub((width * width) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiles_per_axis_is_ceiling() {
        for tile in 1..=33u32 {
            for width in 1..=100usize {
                let expected = (width + tile as usize - 1) / tile as usize;
                assert_eq!(tiles_per_axis(width, tile) as usize, expected);
            }
        }
    }

    #[test]
    fn test_exact_fit() {
        let g = TileGeometry::new(64, 16);
        assert_eq!(g.grid, Dim3::xy(4, 4));
        assert_eq!(g.block, Dim3::xy(16, 16));
        assert_eq!(g.idle_invocations(64), 0);
    }

    #[test]
    fn test_partial_tile() {
        let g = TileGeometry::new(5, 4);
        assert_eq!(g.grid, Dim3::xy(2, 2));
        assert_eq!(g.idle_invocations(5), 64 - 25);
    }

    #[test]
    fn test_width_smaller_than_tile() {
        let g = TileGeometry::new(1, 16);
        assert_eq!(g.grid, Dim3::xy(1, 1));
    }

    #[test]
    fn test_zero_tile() {
        let g = TileGeometry::new(8, 0);
        assert_eq!(g.grid, Dim3::xy(0, 0));
        assert_eq!(g.block, Dim3::xy(0, 0));
        assert_eq!(g.launch_config().total_threads(), 0);
    }
}
