//! Mapping points and regions between the coordinate systems of a
//! tile-component.
//!
//! Four systems are involved:
//! - canvas: absolute coordinates on the (sub-sampled) reference grid.
//! - tile: relative to the top-left corner of the tile-component. This is
//!   also the index space of the unified sample plane.
//! - resolution: relative to the top-left corner of a resolution. Every
//!   resolution is anchored at the origin of the sample plane, so a
//!   resolution covers `[0, W_r) x [0, H_r)` of the tile space.
//! - sub-band: relative to the top-left corner of a sub-band. Within
//!   resolution `r > 0`, HL is placed right of the lower resolution, LH below
//!   it and HH diagonally.
//!
//! All point mappings are pure translations and therefore lossless. Points
//! outside of the target system map to `None`.

use crate::decomposition::{Decomposition, Orientation};
use crate::rect::{Point, Rect};

/// Project a window onto a coarser resolution by dividing all edges by
/// `2^levels` and rounding up (B-14).
pub fn project_window(window: Rect, levels: u8) -> Rect {
    window.ceil_div_pow2(levels)
}

pub use crate::decomposition::project_to_band;

/// Maps between the coordinate systems of a single tile-component.
#[derive(Clone, Copy, Debug)]
pub struct CoordinateMapper<'a> {
    decomposition: &'a Decomposition,
}

impl<'a> CoordinateMapper<'a> {
    /// Create a new mapper for the given decomposition.
    pub fn new(decomposition: &'a Decomposition) -> Self {
        Self { decomposition }
    }

    fn tile_rect(&self) -> Rect {
        self.decomposition.rect()
    }

    fn resolution_size(&self, resolution: u8) -> (u32, u32) {
        let rect = self.decomposition.resolution(resolution).rect;
        (rect.width(), rect.height())
    }

    /// The offset of a band inside the plane of its resolution.
    pub fn band_offset(&self, resolution: u8, band: u8) -> Point {
        if resolution == 0 {
            return Point::new(0, 0);
        }

        let orientation = Orientation::for_band(resolution, band);
        let (lw, lh) = self.resolution_size(resolution - 1);

        Point::new(
            if orientation.is_high_x() { lw } else { 0 },
            if orientation.is_high_y() { lh } else { 0 },
        )
    }

    /// The region a band occupies inside the plane of its resolution.
    pub fn band_region(&self, resolution: u8, band: u8) -> Rect {
        let offset = self.band_offset(resolution, band);
        let rect = self.decomposition.band(resolution, band).rect;

        Rect::from_xywh(offset.x, offset.y, rect.width(), rect.height())
    }

    /// Map a canvas point into tile coordinates.
    pub fn canvas_to_tile(&self, p: Point) -> Option<Point> {
        let tile = self.tile_rect();

        tile.contains(p)
            .then(|| Point::new(p.x - tile.x0, p.y - tile.y0))
    }

    /// Map a tile point back onto the canvas.
    pub fn tile_to_canvas(&self, p: Point) -> Option<Point> {
        let tile = self.tile_rect();

        (p.x < tile.width() && p.y < tile.height())
            .then(|| Point::new(p.x + tile.x0, p.y + tile.y0))
    }

    /// Map a tile point into the coordinates of a resolution.
    pub fn tile_to_resolution(&self, resolution: u8, p: Point) -> Option<Point> {
        let (w, h) = self.resolution_size(resolution);

        (p.x < w && p.y < h).then_some(p)
    }

    /// Map a point of a resolution into tile coordinates.
    pub fn resolution_to_tile(&self, resolution: u8, p: Point) -> Option<Point> {
        // Resolution planes share the origin of the tile plane.
        self.tile_to_resolution(resolution, p)
    }

    /// Map a point of a resolution into the sub-band that contains it.
    ///
    /// Returns the band index together with the local point. Points of
    /// resolution `r > 0` that lie in the region of the lower resolution
    /// don't belong to any band of `r` and map to `None`.
    pub fn resolution_to_subband(&self, resolution: u8, p: Point) -> Option<(u8, Point)> {
        let (w, h) = self.resolution_size(resolution);

        if p.x >= w || p.y >= h {
            return None;
        }

        if resolution == 0 {
            return Some((0, p));
        }

        let (lw, lh) = self.resolution_size(resolution - 1);
        let high_x = p.x >= lw;
        let high_y = p.y >= lh;

        let band = match (high_x, high_y) {
            (false, false) => return None,
            (true, false) => 0,
            (false, true) => 1,
            (true, true) => 2,
        };

        let offset = self.band_offset(resolution, band);

        Some((band, Point::new(p.x - offset.x, p.y - offset.y)))
    }

    /// Map a sub-band point into the coordinates of its resolution.
    pub fn subband_to_resolution(&self, resolution: u8, band: u8, p: Point) -> Option<Point> {
        let region = self.band_region(resolution, band);

        (p.x < region.width() && p.y < region.height())
            .then(|| Point::new(p.x + region.x0, p.y + region.y0))
    }

    /// Map a point in absolute band coordinates (the system code-block
    /// rectangles are expressed in) into sub-band coordinates.
    pub fn band_absolute_to_subband(&self, resolution: u8, band: u8, p: Point) -> Option<Point> {
        let rect = self.decomposition.band(resolution, band).rect;

        rect.contains(p)
            .then(|| Point::new(p.x - rect.x0, p.y - rect.y0))
    }

    /// Map a sub-band point into absolute band coordinates.
    pub fn subband_to_band_absolute(&self, resolution: u8, band: u8, p: Point) -> Option<Point> {
        let rect = self.decomposition.band(resolution, band).rect;

        (p.x < rect.width() && p.y < rect.height())
            .then(|| Point::new(p.x + rect.x0, p.y + rect.y0))
    }

    /// Map a region of a resolution into sub-band coordinates, clipping it to
    /// the band.
    pub fn resolution_rect_to_subband(&self, resolution: u8, band: u8, rect: Rect) -> Rect {
        let region = self.band_region(resolution, band);

        rect.intersect(region)
            .relative_to(region.origin())
            .unwrap_or(Rect::EMPTY)
    }

    /// Map a region in absolute band coordinates into the tile plane.
    pub fn band_absolute_rect_to_tile(&self, resolution: u8, band: u8, rect: Rect) -> Rect {
        let band_rect = self.decomposition.band(resolution, band).rect;
        let offset = self.band_offset(resolution, band);

        rect.intersect(band_rect)
            .relative_to(band_rect.origin())
            .and_then(|r| r.translate(offset.x, offset.y))
            .unwrap_or(Rect::EMPTY)
    }
}
