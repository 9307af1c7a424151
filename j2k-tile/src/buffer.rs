//! The windowed tile buffer that holds the coefficients of one
//! tile-component while its code-blocks are decoded or encoded.
//!
//! The buffer covers all resolutions up to the highest one that is kept
//! after discarding `reduce` resolutions. In the unified layout all bands
//! share one sample plane arranged in the usual Mallat fashion: each
//! resolution `r` occupies `[0, W_r) x [0, H_r)`, its HL band is placed to the
//! right of resolution `r - 1`, its LH band below it and its HH band
//! diagonally. In the split layout every band has its own plane.
//!
//! On decode, a window restricts which code-blocks need to be touched. The
//! window is padded at every synthesis level so that the wavelet filters can
//! reconstruct the requested region without loss.

use crate::Direction;
use crate::decomposition::Decomposition;
use crate::error::{AllocationError, BufferError, GeometryError, Result, bail, err};
use crate::log::ltrace;
use crate::rect::{Point, Rect};
use bytemuck::Pod;
use smallvec::SmallVec;

/// A sample type that can be stored in a tile buffer.
pub trait Sample: Pod + Default + Send + Sync {
    /// Convert from an integer coefficient.
    fn from_i32(v: i32) -> Self;
    /// Convert from a floating point coefficient, rounding to nearest.
    fn from_f32(v: f32) -> Self;
    /// Convert into an integer coefficient, rounding to nearest.
    fn to_i32(self) -> i32;
    /// Convert into a floating point coefficient.
    fn to_f32(self) -> f32;
}

impl Sample for i32 {
    #[inline]
    fn from_i32(v: i32) -> Self {
        v
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v.round_ties_even() as Self
    }

    #[inline]
    fn to_i32(self) -> i32 {
        self
    }

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
}

impl Sample for f32 {
    #[inline]
    fn from_i32(v: i32) -> Self {
        v as Self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }

    #[inline]
    fn to_i32(self) -> i32 {
        self.round_ties_even() as i32
    }

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }
}

/// How the storage of a tile buffer is organized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BufferLayout {
    /// All resolutions and bands share a single sample plane.
    #[default]
    Unified,
    /// Every band has its own sample plane.
    Split,
}

/// Where the samples of a band live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandLocation {
    /// The index of the top-left sample of the band in its storage.
    pub offset: usize,
    /// The distance between two rows, in samples.
    pub stride: usize,
    /// The width of the band.
    pub width: u32,
    /// The height of the band.
    pub height: u32,
}

/// A code-block region that should be made accessible for writing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockTarget {
    /// The resolution index.
    pub resolution: u8,
    /// The band index within the resolution.
    pub band: u8,
    /// The region of the code-block in absolute band coordinates.
    pub rect: Rect,
}

/// Mutable access to the samples of a single code-block.
///
/// Views returned from the same call never overlap, so they can be handed
/// to different threads.
#[derive(Debug)]
pub struct BlockView<'s, T> {
    rows: Vec<&'s mut [T]>,
    width: u32,
    height: u32,
}

impl<T: Copy> BlockView<'_, T> {
    /// The width of the code-block.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The height of the code-block.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The row with index `y`.
    pub fn row(&self, y: u32) -> &[T] {
        self.rows[y as usize]
    }

    /// The row with index `y`, mutably.
    pub fn row_mut(&mut self, y: u32) -> &mut [T] {
        self.rows[y as usize]
    }

    /// Set all samples of the view to `value`.
    pub fn fill(&mut self, value: T) {
        for row in &mut self.rows {
            row.fill(value);
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Placement {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

#[derive(Clone, Copy, Debug)]
struct CarveRequest {
    resolution: u8,
    band: u8,
    x0: u32,
    y0: u32,
    width: u32,
    height: u32,
}

/// Common interface of the storage variants.
trait BandStorage<T: Sample> {
    fn allocate(&mut self, clear: bool) -> Result<()>;
    fn is_allocated(&self) -> bool;
    fn location(&self, resolution: u8, band: u8) -> BandLocation;
    fn band_data(&self, resolution: u8, band: u8) -> Result<&[T]>;
    fn carve<'s>(&'s mut self, requests: &[CarveRequest]) -> Result<Vec<Vec<&'s mut [T]>>>;
    fn strided_area(&self) -> usize;
}

#[derive(Debug)]
enum Backing<'a, T> {
    Unallocated,
    Owned(Vec<T>),
    Borrowed(&'a mut [T]),
    Detached,
}

impl<T> Backing<'_, T> {
    fn get(&self) -> Result<&[T]> {
        match self {
            Self::Owned(v) => Ok(v),
            Self::Borrowed(s) => Ok(s),
            Self::Unallocated => err!(BufferError::Unallocated),
            Self::Detached => err!(BufferError::Detached),
        }
    }

    fn get_mut(&mut self) -> Result<&mut [T]> {
        match self {
            Self::Owned(v) => Ok(v),
            Self::Borrowed(s) => Ok(s),
            Self::Unallocated => err!(BufferError::Unallocated),
            Self::Detached => err!(BufferError::Detached),
        }
    }
}

fn alloc_plane<T: Sample>(len: usize) -> Result<Vec<T>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| AllocationError::Buffer)?;
    data.resize(len, T::default());

    Ok(data)
}

/// Split `data` into the given row segments. Each finished segment is pushed
/// onto the view it belongs to.
fn carve_segments<'s, T>(
    data: &'s mut [T],
    mut segments: Vec<(usize, usize, usize)>,
    views: &mut [Vec<&'s mut [T]>],
) -> Result<()> {
    segments.sort_unstable_by_key(|s| s.0);

    let mut rest = data;
    let mut pos = 0;

    for (start, len, view) in segments {
        if start < pos {
            bail!(BufferError::Overlap);
        }

        if start - pos + len > rest.len() {
            bail!(BufferError::StorageTooSmall);
        }

        let tail = core::mem::take(&mut rest);
        let (_, tail) = tail.split_at_mut(start - pos);
        let (row, tail) = tail.split_at_mut(len);
        // Rows of one block have increasing offsets, so they arrive in order.
        views[view].push(row);
        rest = tail;
        pos = start + len;
    }

    Ok(())
}

#[derive(Debug)]
struct UnifiedStorage<'a, T> {
    backing: Backing<'a, T>,
    width: u32,
    height: u32,
    stride: usize,
    placements: Vec<SmallVec<[Placement; 3]>>,
}

impl<'a, T: Sample> UnifiedStorage<'a, T> {
    fn required_len(&self, stride: usize) -> usize {
        if self.height == 0 {
            0
        } else {
            stride * (self.height as usize - 1) + self.width as usize
        }
    }

    fn check_external(&self, len: usize, stride: usize) -> Result<()> {
        if stride < self.width as usize {
            bail!(BufferError::StrideTooSmall);
        }

        if len < self.required_len(stride) {
            bail!(BufferError::StorageTooSmall);
        }

        Ok(())
    }
}

impl<T: Sample> BandStorage<T> for UnifiedStorage<'_, T> {
    fn allocate(&mut self, clear: bool) -> Result<()> {
        match &mut self.backing {
            Backing::Owned(v) => {
                if clear {
                    v.fill(T::default());
                }
            }
            Backing::Borrowed(s) => {
                if clear {
                    s.fill(T::default());
                }
            }
            Backing::Unallocated | Backing::Detached => {
                self.stride = self.width as usize;
                let len = self.stride * self.height as usize;
                self.backing = Backing::Owned(alloc_plane(len)?);
            }
        }

        Ok(())
    }

    fn is_allocated(&self) -> bool {
        matches!(self.backing, Backing::Owned(_) | Backing::Borrowed(_))
    }

    fn location(&self, resolution: u8, band: u8) -> BandLocation {
        let p = self.placements[resolution as usize][band as usize];

        BandLocation {
            offset: p.y as usize * self.stride + p.x as usize,
            stride: self.stride,
            width: p.width,
            height: p.height,
        }
    }

    fn band_data(&self, _: u8, _: u8) -> Result<&[T]> {
        self.backing.get()
    }

    fn carve<'s>(&'s mut self, requests: &[CarveRequest]) -> Result<Vec<Vec<&'s mut [T]>>> {
        let mut segments = Vec::new();

        for (idx, req) in requests.iter().enumerate() {
            let base = self.location(req.resolution, req.band).offset;

            for row in 0..req.height {
                let start = base + (req.y0 + row) as usize * self.stride + req.x0 as usize;
                segments.push((start, req.width as usize, idx));
            }
        }

        let mut views: Vec<_> = requests
            .iter()
            .map(|r| Vec::with_capacity(r.height as usize))
            .collect();
        carve_segments(self.backing.get_mut()?, segments, &mut views)?;

        Ok(views)
    }

    fn strided_area(&self) -> usize {
        let area = self.stride * self.height as usize;

        match &self.backing {
            Backing::Borrowed(data) => area.min(data.len()),
            _ => area,
        }
    }
}

#[derive(Debug)]
struct BandPlane<T> {
    data: Vec<T>,
    width: u32,
    height: u32,
    allocated: bool,
}

#[derive(Debug)]
struct SplitStorage<T> {
    planes: Vec<SmallVec<[BandPlane<T>; 3]>>,
}

impl<T: Sample> BandStorage<T> for SplitStorage<T> {
    fn allocate(&mut self, clear: bool) -> Result<()> {
        for plane in self.planes.iter_mut().flatten() {
            if plane.allocated {
                if clear {
                    plane.data.fill(T::default());
                }
            } else {
                plane.data = alloc_plane(plane.width as usize * plane.height as usize)?;
                plane.allocated = true;
            }
        }

        Ok(())
    }

    fn is_allocated(&self) -> bool {
        self.planes.iter().flatten().all(|p| p.allocated)
    }

    fn location(&self, resolution: u8, band: u8) -> BandLocation {
        let p = &self.planes[resolution as usize][band as usize];

        BandLocation {
            offset: 0,
            stride: p.width as usize,
            width: p.width,
            height: p.height,
        }
    }

    fn band_data(&self, resolution: u8, band: u8) -> Result<&[T]> {
        let p = &self.planes[resolution as usize][band as usize];

        if !p.allocated {
            bail!(BufferError::Unallocated);
        }

        Ok(&p.data)
    }

    fn carve<'s>(&'s mut self, requests: &[CarveRequest]) -> Result<Vec<Vec<&'s mut [T]>>> {
        let mut views: Vec<_> = requests
            .iter()
            .map(|r| Vec::with_capacity(r.height as usize))
            .collect();

        for (resolution, bands) in self.planes.iter_mut().enumerate() {
            for (band, plane) in bands.iter_mut().enumerate() {
                let mut segments = Vec::new();
                let stride = plane.width as usize;

                for (idx, req) in requests.iter().enumerate() {
                    if req.resolution as usize != resolution || req.band as usize != band {
                        continue;
                    }

                    for row in 0..req.height {
                        let start = (req.y0 + row) as usize * stride + req.x0 as usize;
                        segments.push((start, req.width as usize, idx));
                    }
                }

                if segments.is_empty() {
                    continue;
                }

                if !plane.allocated {
                    bail!(BufferError::Unallocated);
                }

                carve_segments(&mut plane.data, segments, &mut views)?;
            }
        }

        Ok(views)
    }

    fn strided_area(&self) -> usize {
        self.planes
            .iter()
            .flatten()
            .map(|p| p.width as usize * p.height as usize)
            .sum()
    }
}

#[derive(Debug)]
enum Storage<'a, T> {
    Unified(UnifiedStorage<'a, T>),
    Split(SplitStorage<T>),
}

impl<'a, T: Sample> Storage<'a, T> {
    fn as_dyn(&self) -> &dyn BandStorage<T> {
        match self {
            Self::Unified(s) => s,
            Self::Split(s) => s,
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn BandStorage<T> {
        match self {
            Self::Unified(s) => s,
            Self::Split(s) => s,
        }
    }

    fn unified(&self) -> Result<&UnifiedStorage<'a, T>> {
        match self {
            Self::Unified(s) => Ok(s),
            Self::Split(_) => err!(BufferError::NotUnified),
        }
    }

    fn unified_mut(&mut self) -> Result<&mut UnifiedStorage<'a, T>> {
        match self {
            Self::Unified(s) => Ok(s),
            Self::Split(_) => err!(BufferError::NotUnified),
        }
    }
}

/// The coefficient storage of a tile-component, restricted to a window.
#[derive(Debug)]
pub struct TileBuffer<'a, T> {
    direction: Direction,
    reduce: u8,
    whole_tile: bool,
    unreduced_bounds: Rect,
    bounds: Rect,
    resolutions: Vec<Rect>,
    bands: Vec<SmallVec<[Rect; 3]>>,
    resolution_windows: Vec<Rect>,
    band_windows: Vec<SmallVec<[Rect; 3]>>,
    storage: Storage<'a, T>,
}

impl<'a, T: Sample> TileBuffer<'a, T> {
    /// Create a new buffer for the given decomposition.
    ///
    /// On decode, `window` is given in canvas coordinates and is clipped to
    /// the tile-component; an empty intersection is an error. `reduce` is the
    /// number of highest resolutions that are discarded. On encode, the
    /// buffer always covers the whole tile-component at full resolution and
    /// both `window` and `reduce` are ignored.
    pub fn new(
        decomposition: &Decomposition,
        window: Rect,
        direction: Direction,
        reduce: u8,
        layout: BufferLayout,
    ) -> Result<Self> {
        let tile = decomposition.rect();
        let num_resolutions = decomposition.num_resolutions();

        let (window, reduce) = match direction {
            Direction::Encode => (tile, 0),
            Direction::Decode => (window.intersect(tile), reduce),
        };

        if window.is_empty() {
            bail!(GeometryError::EmptyWindow);
        }

        if reduce >= num_resolutions {
            bail!(GeometryError::InvalidReduction);
        }

        let kept = (num_resolutions - reduce) as usize;
        let resolutions: Vec<Rect> = decomposition.resolutions()[..kept]
            .iter()
            .map(|r| r.rect)
            .collect();
        let bands: Vec<SmallVec<[Rect; 3]>> = decomposition.resolutions()[..kept]
            .iter()
            .map(|r| r.bands.iter().map(|b| b.rect).collect())
            .collect();

        let top = resolutions[kept - 1];
        let bounds = window.ceil_div_pow2(reduce).intersect(top);

        if bounds.is_empty() {
            bail!(GeometryError::EmptyWindow);
        }

        let margin = decomposition.params().wavelet.filter_margin();
        let (resolution_windows, band_windows) =
            padded_windows(&resolutions, &bands, bounds, margin);

        ltrace!(
            "tile buffer: bounds [{},{} {}x{}], reduce {reduce}",
            bounds.x0,
            bounds.y0,
            bounds.width(),
            bounds.height()
        );

        let placements: Vec<SmallVec<[Placement; 3]>> = (0..kept)
            .map(|r| {
                bands[r]
                    .iter()
                    .enumerate()
                    .map(|(b, rect)| {
                        let (x, y) = band_offset(&resolutions, &bands, r as u8, b as u8);

                        Placement {
                            x,
                            y,
                            width: rect.width(),
                            height: rect.height(),
                        }
                    })
                    .collect()
            })
            .collect();

        let storage = match layout {
            BufferLayout::Unified => Storage::Unified(UnifiedStorage {
                backing: Backing::Unallocated,
                width: top.width(),
                height: top.height(),
                stride: top.width() as usize,
                placements,
            }),
            BufferLayout::Split => Storage::Split(SplitStorage {
                planes: placements
                    .iter()
                    .map(|bands| {
                        bands
                            .iter()
                            .map(|p| BandPlane {
                                data: vec![],
                                width: p.width,
                                height: p.height,
                                allocated: false,
                            })
                            .collect()
                    })
                    .collect(),
            }),
        };

        Ok(Self {
            direction,
            reduce,
            whole_tile: window == tile,
            unreduced_bounds: window,
            bounds,
            resolutions,
            bands,
            resolution_windows,
            band_windows,
            storage,
        })
    }

    /// The direction the buffer was created for.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The number of discarded resolutions.
    pub fn reduce(&self) -> u8 {
        self.reduce
    }

    /// The number of resolutions the buffer holds.
    pub fn num_resolutions(&self) -> u8 {
        self.resolutions.len() as u8
    }

    /// The layout of the storage.
    pub fn layout(&self) -> BufferLayout {
        match self.storage {
            Storage::Unified(_) => BufferLayout::Unified,
            Storage::Split(_) => BufferLayout::Split,
        }
    }

    /// Whether the buffer covers the whole tile-component.
    pub fn is_whole_tile(&self) -> bool {
        self.whole_tile
    }

    /// The requested window, clipped to the tile-component, at full
    /// resolution.
    pub fn unreduced_bounds(&self) -> Rect {
        self.unreduced_bounds
    }

    /// The requested window in the coordinates of the highest kept
    /// resolution.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// The rectangle of the highest kept resolution.
    pub fn tile_bounds(&self) -> Rect {
        self.resolutions[self.resolutions.len() - 1]
    }

    /// The padded window of a resolution, in absolute resolution coordinates.
    pub fn padded_resolution_window(&self, resolution: u8) -> Rect {
        self.resolution_windows[resolution as usize]
    }

    /// The padded window of a band, in absolute band coordinates.
    pub fn padded_band_window(&self, resolution: u8, band: u8) -> Rect {
        debug_assert!(band < 3, "band index {band} out of range");
        self.band_windows[resolution as usize][band as usize]
    }

    /// The rectangle of a band, in absolute band coordinates.
    pub fn band_rect(&self, resolution: u8, band: u8) -> Rect {
        self.bands[resolution as usize][band as usize]
    }

    /// The number of bands of a resolution.
    pub fn num_bands(&self, resolution: u8) -> u8 {
        self.bands[resolution as usize].len() as u8
    }

    /// The location of a band inside its storage.
    ///
    /// Only valid after the storage was allocated or attached.
    pub fn pointer_for(&self, resolution: u8, band: u8) -> Result<BandLocation> {
        debug_assert!(band < 3, "band index {band} out of range");

        if !self.storage.as_dyn().is_allocated() {
            bail!(BufferError::Unallocated);
        }

        Ok(self.storage.as_dyn().location(resolution, band))
    }

    /// The location of a whole resolution in the unified sample plane.
    pub fn pointer_for_resolution(&self, resolution: u8) -> Result<BandLocation> {
        let storage = self.storage.unified()?;
        let rect = self.resolutions[resolution as usize];

        if !BandStorage::<T>::is_allocated(storage) {
            bail!(BufferError::Unallocated);
        }

        Ok(BandLocation {
            offset: 0,
            stride: storage.stride,
            width: rect.width(),
            height: rect.height(),
        })
    }

    /// The row stride of a band.
    pub fn stride_at(&self, resolution: u8, band: u8) -> usize {
        self.storage.as_dyn().location(resolution, band).stride
    }

    /// Map a point in absolute band coordinates to the position in the
    /// storage of the band.
    ///
    /// Returns `None` if the point lies outside of the band.
    pub fn transform(&self, resolution: u8, band: u8, x: u32, y: u32) -> Option<Point> {
        let rect = self.band_rect(resolution, band);

        if !rect.contains(Point::new(x, y)) {
            return None;
        }

        let (x, y) = (x - rect.x0, y - rect.y0);

        match self.storage {
            Storage::Unified(_) => {
                let (ox, oy) = band_offset(&self.resolutions, &self.bands, resolution, band);
                Some(Point::new(x.checked_add(ox)?, y.checked_add(oy)?))
            }
            Storage::Split(_) => Some(Point::new(x, y)),
        }
    }

    /// Reserve storage for all bands. With `clear`, existing storage is reset
    /// to zero.
    pub fn allocate(&mut self, clear: bool) -> Result<()> {
        self.storage.as_dyn_mut().allocate(clear)
    }

    /// Whether the storage is ready for use.
    pub fn is_allocated(&self) -> bool {
        self.storage.as_dyn().is_allocated()
    }

    /// Use caller-provided storage without taking ownership of it.
    pub fn attach(&mut self, data: &'a mut [T], stride: usize) -> Result<()> {
        let storage = self.storage.unified_mut()?;
        storage.check_external(data.len(), stride)?;
        storage.backing = Backing::Borrowed(data);
        storage.stride = stride;

        Ok(())
    }

    /// Take ownership of caller-provided storage.
    pub fn acquire(&mut self, data: Vec<T>, stride: usize) -> Result<()> {
        let storage = self.storage.unified_mut()?;
        storage.check_external(data.len(), stride)?;
        storage.backing = Backing::Owned(data);
        storage.stride = stride;

        Ok(())
    }

    /// Hand the owned storage to the caller, together with its stride.
    ///
    /// Fails with [`BufferError::NotOwned`] if the storage is borrowed or was
    /// never allocated. On success, the buffer is unusable afterwards.
    pub fn transfer(&mut self) -> Result<(Vec<T>, usize)> {
        let storage = self.storage.unified_mut()?;

        match core::mem::replace(&mut storage.backing, Backing::Detached) {
            Backing::Owned(data) => Ok((data, storage.stride)),
            Backing::Detached => err!(BufferError::Detached),
            other => {
                storage.backing = other;
                err!(BufferError::NotOwned)
            }
        }
    }

    /// The number of samples covered by the storage, including padding at the
    /// end of rows.
    pub fn strided_area(&self) -> usize {
        self.storage.as_dyn().strided_area()
    }

    /// The unified sample plane.
    pub fn plane(&self) -> Result<&[T]> {
        self.storage.unified()?.backing.get()
    }

    /// The unified sample plane, mutably.
    pub fn plane_mut(&mut self) -> Result<&mut [T]> {
        self.storage.unified_mut()?.backing.get_mut()
    }

    /// The stride of the unified sample plane.
    pub fn stride(&self) -> Result<usize> {
        Ok(self.storage.unified()?.stride)
    }

    /// Iterate over the rows of a band.
    pub fn band_rows(
        &self,
        resolution: u8,
        band: u8,
    ) -> Result<impl Iterator<Item = &[T]> + '_> {
        let location = self.storage.as_dyn().location(resolution, band);
        let data = self.storage.as_dyn().band_data(resolution, band)?;

        Ok((0..location.height as usize).map(move |y| {
            let start = location.offset + y * location.stride;
            &data[start..start + location.width as usize]
        }))
    }

    /// Copy a region, given in absolute band coordinates, out of a band.
    pub fn read_band(&self, resolution: u8, band: u8, rect: Rect) -> Result<Vec<T>> {
        let band_rect = self.band_rect(resolution, band);

        if !band_rect.contains_rect(rect) {
            bail!(BufferError::OutOfBounds);
        }

        let local = rect
            .relative_to(band_rect.origin())
            .ok_or(BufferError::OutOfBounds)?;
        let mut out = Vec::with_capacity(rect.area() as usize);

        for row in self
            .band_rows(resolution, band)?
            .skip(local.y0 as usize)
            .take(local.height() as usize)
        {
            out.extend_from_slice(&row[local.x0 as usize..local.x1 as usize]);
        }

        Ok(out)
    }

    /// Split the storage into one mutable view per code-block.
    ///
    /// The views are returned in the order of `targets`. Targets must lie
    /// inside their band and must not overlap.
    pub fn block_views_mut(&mut self, targets: &[BlockTarget]) -> Result<Vec<BlockView<'_, T>>> {
        let mut requests = Vec::with_capacity(targets.len());

        for target in targets {
            if target.resolution as usize >= self.resolutions.len()
                || target.band >= self.num_bands(target.resolution)
            {
                bail!(BufferError::OutOfBounds);
            }

            let band_rect = self.band_rect(target.resolution, target.band);

            if !band_rect.contains_rect(target.rect) {
                bail!(BufferError::OutOfBounds);
            }

            let local = target
                .rect
                .relative_to(band_rect.origin())
                .ok_or(BufferError::OutOfBounds)?;

            requests.push(CarveRequest {
                resolution: target.resolution,
                band: target.band,
                x0: local.x0,
                y0: local.y0,
                width: local.width(),
                height: local.height(),
            });
        }

        let rows = self.storage.as_dyn_mut().carve(&requests)?;

        Ok(rows
            .into_iter()
            .zip(requests)
            .map(|(rows, req)| BlockView {
                rows,
                width: req.width,
                height: req.height,
            })
            .collect())
    }
}

fn band_offset(
    resolutions: &[Rect],
    bands: &[SmallVec<[Rect; 3]>],
    resolution: u8,
    band: u8,
) -> (u32, u32) {
    if resolution == 0 {
        return (0, 0);
    }

    debug_assert_eq!(bands[resolution as usize].len(), 3);

    let lower = resolutions[resolution as usize - 1];
    // HL, LH, HH have orientation 1, 2, 3.
    let orientation = band + 1;
    (
        if orientation & 1 != 0 { lower.width() } else { 0 },
        if orientation & 2 != 0 { lower.height() } else { 0 },
    )
}

/// Compute the padded windows of all resolutions and bands, walking from the
/// highest resolution down.
fn padded_windows(
    resolutions: &[Rect],
    bands: &[SmallVec<[Rect; 3]>],
    top_window: Rect,
    margin: u32,
) -> (Vec<Rect>, Vec<SmallVec<[Rect; 3]>>) {
    let n = resolutions.len();
    let mut resolution_windows = vec![Rect::EMPTY; n];
    let mut band_windows: Vec<SmallVec<[Rect; 3]>> = vec![SmallVec::new(); n];
    let mut current = top_window.intersect(resolutions[n - 1]);

    for r in (0..n).rev() {
        resolution_windows[r] = current;

        if r == 0 {
            band_windows[0].push(current.intersect(bands[0][0]));
            break;
        }

        // Both the low-pass and the high-pass samples that contribute to
        // [x0, x1) lie in [floor(x0 / 2), ceil(x1 / 2)) one level down.
        let lower = if current.is_empty() {
            Rect::EMPTY
        } else {
            Rect::from_ltrb(
                (current.x0 / 2).saturating_sub(margin),
                (current.y0 / 2).saturating_sub(margin),
                current.x1.div_ceil(2).saturating_add(margin),
                current.y1.div_ceil(2).saturating_add(margin),
            )
        };

        for band in &bands[r] {
            band_windows[r].push(lower.intersect(*band));
        }

        current = lower.intersect(resolutions[r - 1]);
    }

    (resolution_windows, band_windows)
}
