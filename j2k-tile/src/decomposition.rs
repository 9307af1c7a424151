//! Building and setting up resolutions, sub-bands, precincts and code-blocks
//! of a single tile-component.
//!
//! The structures in this module are derived once from the decomposition
//! parameters of a tile-component and then stay fixed for as long as the tile
//! is processed. Only the coding state of the code-blocks (coded bytes and
//! number of passes) changes over time.

use crate::coder::EncodedBlock;
use crate::error::{GeometryError, Result, bail};
use crate::log::ltrace;
use crate::rect::Rect;
use smallvec::SmallVec;

/// The maximum number of resolutions of a tile-component.
pub const MAX_RESOLUTION_COUNT: u8 = 33;
/// The maximum number of bit-planes of a band.
pub const MAX_BITPLANE_COUNT: u8 = 31;
/// The maximum sample precision in bits.
pub const MAX_PRECISION: u8 = 31;

const DEFAULT_PRECINCT_EXPONENT: u8 = 15;
const MAX_PRECINCT_EXPONENT: u8 = 15;

/// The wavelet transform used by a tile-component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaveletTransform {
    /// The reversible 5-3 integer wavelet.
    Reversible53,
    /// The irreversible 9-7 floating point wavelet.
    Irreversible97,
}

impl WaveletTransform {
    /// Whether the transform is exact.
    pub fn is_reversible(self) -> bool {
        matches!(self, Self::Reversible53)
    }

    /// The number of extra low-pass samples on each side that the synthesis
    /// filter needs to reconstruct a region without loss.
    pub fn filter_margin(self) -> u32 {
        match self {
            Self::Reversible53 => 2,
            Self::Irreversible97 => 3,
        }
    }
}

/// The orientation of a sub-band.
///
/// Bit 0 of the value marks horizontal high-pass filtering, bit 1 vertical
/// high-pass filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Orientation {
    /// Low-pass in both directions.
    LowLow = 0,
    /// High-pass horizontally, low-pass vertically.
    HighLow = 1,
    /// Low-pass horizontally, high-pass vertically.
    LowHigh = 2,
    /// High-pass in both directions.
    HighHigh = 3,
}

impl Orientation {
    /// The orientation of the band with index `band` in resolution
    /// `resolution`.
    pub fn for_band(resolution: u8, band: u8) -> Self {
        debug_assert!(band < 3, "band index {band} out of range");

        if resolution == 0 {
            debug_assert_eq!(band, 0, "resolution 0 only has a single band");
            return Self::LowLow;
        }

        match band {
            0 => Self::HighLow,
            1 => Self::LowHigh,
            _ => Self::HighHigh,
        }
    }

    /// Whether the band was high-pass filtered horizontally.
    pub fn is_high_x(self) -> bool {
        self as u8 & 1 != 0
    }

    /// Whether the band was high-pass filtered vertically.
    pub fn is_high_y(self) -> bool {
        self as u8 & 2 != 0
    }

    /// The base-2 logarithm of the nominal gain of the band (Table E.1).
    pub fn log_gain(self) -> u8 {
        match self {
            Self::LowLow => 0,
            Self::HighLow | Self::LowHigh => 1,
            Self::HighHigh => 2,
        }
    }
}

/// A quantization step size, given as exponent and mantissa (E-3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuantStep {
    /// The exponent.
    pub exponent: u16,
    /// The 11-bit mantissa.
    pub mantissa: u16,
}

/// The decomposition parameters of a tile-component.
#[derive(Clone, Debug)]
pub struct ComponentParams {
    /// The tile-component rectangle on the (sub-sampled) canvas.
    pub rect: Rect,
    /// The number of resolutions, i.e. decomposition levels plus one.
    pub num_resolutions: u8,
    /// The base-2 logarithm of the nominal code-block width and height.
    pub code_block_exponents: (u8, u8),
    /// The base-2 logarithm of the precinct width and height, per resolution.
    /// Missing entries default to 15.
    pub precinct_exponents: Vec<(u8, u8)>,
    /// The sample precision in bits.
    pub precision: u8,
    /// Whether the samples are signed.
    pub signed: bool,
    /// The DC level shift added on decode and subtracted on encode.
    pub dc_level_shift: i32,
    /// The wavelet transform.
    pub wavelet: WaveletTransform,
    /// The number of guard bits.
    pub guard_bits: u8,
    /// The quantization step sizes. Empty means "derive from the precision",
    /// a single entry is expanded to all bands (scalar derived), otherwise
    /// one entry per band is expected (LL first, then HL, LH, HH of each
    /// resolution).
    pub step_sizes: Vec<QuantStep>,
    /// The code-block style flags, passed through to the block coder.
    pub code_block_style: u8,
    /// The region-of-interest shift.
    pub roi_shift: u8,
}

impl ComponentParams {
    /// Create parameters with 64x64 code-blocks, maximal precincts, two guard
    /// bits and the default DC level shift for the given precision.
    pub fn new(
        rect: Rect,
        num_resolutions: u8,
        precision: u8,
        signed: bool,
        wavelet: WaveletTransform,
    ) -> Self {
        // Out-of-range precisions are rejected by `Decomposition::build`.
        let dc_level_shift = if signed || !(1..=MAX_PRECISION).contains(&precision) {
            0
        } else {
            1_i32 << (precision - 1)
        };

        Self {
            rect,
            num_resolutions,
            code_block_exponents: (6, 6),
            precinct_exponents: vec![],
            precision,
            signed,
            dc_level_shift,
            wavelet,
            guard_bits: 2,
            step_sizes: vec![],
            code_block_style: 0,
            roi_shift: 0,
        }
    }

    /// The number of decomposition levels.
    pub fn num_decomposition_levels(&self) -> u8 {
        self.num_resolutions - 1
    }

    fn precinct_exponents(&self, resolution: u8) -> (u8, u8) {
        self.precinct_exponents
            .get(resolution as usize)
            .copied()
            .unwrap_or((DEFAULT_PRECINCT_EXPONENT, DEFAULT_PRECINCT_EXPONENT))
    }

    fn quant_step(&self, resolution: u8, band: u8) -> Result<QuantStep> {
        let orientation = Orientation::for_band(resolution, band);

        match self.step_sizes.len() {
            0 => Ok(QuantStep {
                exponent: self.precision as u16 + orientation.log_gain() as u16,
                mantissa: 0,
            }),
            1 => {
                // Scalar derived quantization, see E-5.
                let base = self.step_sizes[0];
                let levels = self.num_decomposition_levels() as u16;
                let n_b = if resolution == 0 {
                    levels
                } else {
                    levels + 1 - resolution as u16
                };

                Ok(QuantStep {
                    exponent: (base.exponent + n_b)
                        .checked_sub(levels)
                        .ok_or(GeometryError::MissingStepSize)?,
                    mantissa: base.mantissa,
                })
            }
            _ => {
                let idx = if resolution == 0 {
                    0
                } else {
                    1 + 3 * (resolution as usize - 1) + band as usize
                };

                Ok(*self
                    .step_sizes
                    .get(idx)
                    .ok_or(GeometryError::MissingStepSize)?)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.rect.is_empty() {
            bail!(GeometryError::InvalidDimensions);
        }

        if !(1..=MAX_PRECISION).contains(&self.precision) {
            bail!(GeometryError::InvalidPrecision);
        }

        if self.num_resolutions == 0 || self.num_resolutions > MAX_RESOLUTION_COUNT {
            bail!(GeometryError::InvalidResolutionCount);
        }

        let (xcb, ycb) = self.code_block_exponents;

        if !(2..=10).contains(&xcb) || !(2..=10).contains(&ycb) || xcb + ycb > 12 {
            bail!(GeometryError::InvalidCodeBlockSize);
        }

        for resolution in 0..self.num_resolutions {
            let (ppx, ppy) = self.precinct_exponents(resolution);

            if ppx > MAX_PRECINCT_EXPONENT
                || ppy > MAX_PRECINCT_EXPONENT
                || (resolution > 0 && (ppx == 0 || ppy == 0))
            {
                bail!(GeometryError::InvalidPrecinctSize);
            }
        }

        Ok(())
    }
}

/// Identifies a code-block within a tile-component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId {
    /// The resolution index.
    pub resolution: u8,
    /// The band index within the resolution.
    pub band: u8,
    /// The precinct index within the band.
    pub precinct: u32,
    /// The code-block index within the precinct.
    pub block: u32,
}

/// The resolutions, sub-bands, precincts and code-blocks of a tile-component.
#[derive(Clone, Debug)]
pub struct Decomposition {
    params: ComponentParams,
    resolutions: Vec<Resolution>,
}

/// One level of the multi-resolution decomposition.
#[derive(Clone, Debug)]
pub struct Resolution {
    /// The resolution index, 0 is the coarsest.
    pub index: u8,
    /// The rectangle of the resolution in its own (absolute) coordinates.
    pub rect: Rect,
    /// The LL band for resolution 0, otherwise HL, LH and HH.
    pub bands: SmallVec<[SubBand; 3]>,
}

/// A sub-band of a resolution.
#[derive(Clone, Debug)]
pub struct SubBand {
    /// The orientation of the band.
    pub orientation: Orientation,
    /// The rectangle of the band in absolute band coordinates (B-15).
    pub rect: Rect,
    /// The dequantization step size, 1.0 for reversible transforms.
    pub step_size: f32,
    /// The number of magnitude bit-planes (E-2).
    pub num_bit_planes: u8,
    /// The precincts of the band, in raster order.
    pub precincts: Vec<Precinct>,
}

/// A spatial group of code-blocks within a sub-band.
#[derive(Clone, Debug)]
pub struct Precinct {
    /// The index of the precinct on the precinct grid of the band.
    pub index: u32,
    /// The rectangle of the precinct, clipped to the band.
    pub rect: Rect,
    /// The code-blocks of the precinct, in raster order.
    pub code_blocks: Vec<CodeBlock>,
}

impl Precinct {
    /// The number of code-blocks in the precinct.
    pub fn num_code_blocks(&self) -> usize {
        self.code_blocks.len()
    }

    /// The bounds of the code-block with the given index.
    pub fn code_block_rect(&self, idx: usize) -> Option<Rect> {
        self.code_blocks.get(idx).map(|b| b.rect)
    }
}

/// The atomic entropy-coding unit.
#[derive(Clone, Debug, Default)]
pub struct CodeBlock {
    /// The rectangle of the code-block in absolute band coordinates.
    pub rect: Rect,
    /// The number of most significant bit-planes that are known to be zero.
    pub missing_msbs: u8,
    /// The number of coding passes in `data`.
    pub num_passes: u8,
    /// The coded bytes of the code-block.
    pub data: Vec<u8>,
}

impl Decomposition {
    /// Build all resolutions, sub-bands, precincts and code-blocks of a
    /// tile-component.
    pub fn build(params: ComponentParams) -> Result<Self> {
        params.validate()?;

        let mut resolutions = Vec::with_capacity(params.num_resolutions as usize);

        for resolution in 0..params.num_resolutions {
            let rect = resolution_rect(&params, resolution);
            let num_bands = if resolution == 0 { 1 } else { 3 };
            let mut bands = SmallVec::new();

            for band in 0..num_bands {
                bands.push(build_sub_band(&params, resolution, band)?);
            }

            ltrace!(
                "resolution {resolution}: [{},{} {}x{}]",
                rect.x0,
                rect.y0,
                rect.width(),
                rect.height()
            );

            resolutions.push(Resolution {
                index: resolution,
                rect,
                bands,
            });
        }

        Ok(Self {
            params,
            resolutions,
        })
    }

    /// The parameters the decomposition was built from.
    pub fn params(&self) -> &ComponentParams {
        &self.params
    }

    /// The tile-component rectangle.
    pub fn rect(&self) -> Rect {
        self.params.rect
    }

    /// The number of resolutions.
    pub fn num_resolutions(&self) -> u8 {
        self.params.num_resolutions
    }

    /// All resolutions, coarsest first.
    pub fn resolutions(&self) -> &[Resolution] {
        &self.resolutions
    }

    /// The resolution with the given index.
    pub fn resolution(&self, resolution: u8) -> &Resolution {
        &self.resolutions[resolution as usize]
    }

    /// The band with the given index in the given resolution.
    pub fn band(&self, resolution: u8, band: u8) -> &SubBand {
        debug_assert!(band < 3, "band index {band} out of range");
        &self.resolutions[resolution as usize].bands[band as usize]
    }

    /// Whether the tile-component uses the reversible wavelet.
    pub fn is_reversible(&self) -> bool {
        self.params.wavelet.is_reversible()
    }

    /// Iterate over all code-blocks in resolution, band, precinct order.
    pub fn code_blocks(&self) -> impl Iterator<Item = (BlockId, &CodeBlock)> + '_ {
        self.resolutions.iter().flat_map(|res| {
            res.bands.iter().enumerate().flat_map(move |(band_idx, band)| {
                band.precincts.iter().flat_map(move |precinct| {
                    precinct
                        .code_blocks
                        .iter()
                        .enumerate()
                        .map(move |(block_idx, block)| {
                            (
                                BlockId {
                                    resolution: res.index,
                                    band: band_idx as u8,
                                    precinct: precinct.index,
                                    block: block_idx as u32,
                                },
                                block,
                            )
                        })
                })
            })
        })
    }

    /// The total number of code-blocks.
    pub fn num_code_blocks(&self) -> usize {
        self.code_blocks().count()
    }

    /// The code-block with the given identity.
    pub fn code_block_mut(&mut self, id: BlockId) -> Option<&mut CodeBlock> {
        self.resolutions
            .get_mut(id.resolution as usize)?
            .bands
            .get_mut(id.band as usize)?
            .precincts
            .iter_mut()
            .find(|p| p.index == id.precinct)?
            .code_blocks
            .get_mut(id.block as usize)
    }

    /// Store the results of an encode pass in the code-blocks, so that they
    /// can be decoded again.
    pub fn store_encoded(&mut self, blocks: impl IntoIterator<Item = (BlockId, EncodedBlock)>) {
        for (id, encoded) in blocks {
            if let Some(block) = self.code_block_mut(id) {
                block.data = encoded.data;
                block.num_passes = encoded.num_passes;
                block.missing_msbs = encoded.missing_msbs;
            }
        }
    }
}

/// The rectangle of a resolution, see B-14.
pub(crate) fn resolution_rect(params: &ComponentParams, resolution: u8) -> Rect {
    params
        .rect
        .ceil_div_pow2(params.num_resolutions - 1 - resolution)
}

/// The rectangle of a band in absolute band coordinates, see B-15.
pub(crate) fn band_rect(params: &ComponentParams, resolution: u8, band: u8) -> Rect {
    let orientation = Orientation::for_band(resolution, band);
    let levels = if resolution == 0 {
        params.num_resolutions - 1
    } else {
        params.num_resolutions - resolution
    };

    project_to_band(params.rect, levels, orientation)
}

/// Map a rectangle of the full-resolution tile-component onto a band that
/// lies `levels` decomposition levels below it (B-15).
pub fn project_to_band(rect: Rect, levels: u8, orientation: Orientation) -> Rect {
    if levels == 0 {
        return rect;
    }

    let half = 1_u64 << (levels - 1);
    let xo = if orientation.is_high_x() { half } else { 0 };
    let yo = if orientation.is_high_y() { half } else { 0 };
    let denominator = 1_u64 << levels;

    let map = |v: u32, o: u64| ((v as u64).saturating_sub(o)).div_ceil(denominator) as u32;

    Rect::from_ltrb(
        map(rect.x0, xo),
        map(rect.y0, yo),
        map(rect.x1, xo),
        map(rect.y1, yo),
    )
}

fn build_sub_band(params: &ComponentParams, resolution: u8, band: u8) -> Result<SubBand> {
    let orientation = Orientation::for_band(resolution, band);
    let rect = band_rect(params, resolution, band);
    let step = params.quant_step(resolution, band)?;

    let step_size = if params.wavelet.is_reversible() {
        1.0
    } else {
        // See E-3.
        let r_b = params.precision as i32 + orientation.log_gain() as i32;
        2.0_f32.powi(r_b - step.exponent as i32) * (1.0 + step.mantissa as f32 / 2048.0)
    };

    // Equation (E-2).
    let num_bit_planes = (params.guard_bits as u16 + step.exponent)
        .checked_sub(1)
        .filter(|n| *n <= MAX_BITPLANE_COUNT as u16)
        .ok_or(GeometryError::MissingStepSize)? as u8;

    let (ppx, ppy) = params.precinct_exponents(resolution);
    // Precincts of bands in resolutions > 0 are half as large as the
    // precincts of the resolution, see B.6.
    let (ppx, ppy) = if resolution == 0 {
        (ppx, ppy)
    } else {
        (ppx - 1, ppy - 1)
    };
    let (xcb, ycb) = params.code_block_exponents;
    let (xcb, ycb) = (xcb.min(ppx), ycb.min(ppy));

    ltrace!(
        "r {resolution} making sub-band {} [{},{} {}x{}]",
        orientation as u8,
        rect.x0,
        rect.y0,
        rect.width(),
        rect.height()
    );

    Ok(SubBand {
        orientation,
        rect,
        step_size,
        num_bit_planes,
        precincts: build_precincts(rect, ppx, ppy, xcb, ycb),
    })
}

fn build_precincts(band_rect: Rect, ppx: u8, ppy: u8, xcb: u8, ycb: u8) -> Vec<Precinct> {
    if band_rect.is_empty() {
        return vec![];
    }

    let (pw, ph) = (1_u32 << ppx, 1_u32 << ppy);
    let (px0, py0) = (band_rect.x0 / pw, band_rect.y0 / ph);
    let (px1, py1) = (band_rect.x1.div_ceil(pw), band_rect.y1.div_ceil(ph));
    let num_x = px1 - px0;

    let mut precincts = Vec::with_capacity((num_x * (py1 - py0)) as usize);

    for py in py0..py1 {
        for px in px0..px1 {
            let cell = Rect::from_ltrb(
                px * pw,
                py * ph,
                (px as u64 * pw as u64 + pw as u64).min(u32::MAX as u64) as u32,
                (py as u64 * ph as u64 + ph as u64).min(u32::MAX as u64) as u32,
            );
            let rect = cell.intersect(band_rect);

            if rect.is_empty() {
                continue;
            }

            precincts.push(Precinct {
                index: (py - py0) * num_x + (px - px0),
                rect,
                code_blocks: build_code_blocks(rect, xcb, ycb),
            });
        }
    }

    precincts
}

fn build_code_blocks(precinct_rect: Rect, xcb: u8, ycb: u8) -> Vec<CodeBlock> {
    let (cw, ch) = (1_u32 << xcb, 1_u32 << ycb);

    // See Figure B.9. The code-block grid is anchored at the origin of the
    // band coordinate system, blocks at the border are clipped.
    let (bx0, by0) = (precinct_rect.x0 / cw, precinct_rect.y0 / ch);
    let (bx1, by1) = (precinct_rect.x1.div_ceil(cw), precinct_rect.y1.div_ceil(ch));

    let mut blocks = Vec::with_capacity(((bx1 - bx0) * (by1 - by0)) as usize);

    for by in by0..by1 {
        for bx in bx0..bx1 {
            let rect = Rect::from_xywh(bx * cw, by * ch, cw, ch).intersect(precinct_rect);

            ltrace!(
                "code-block rect: [{},{} {}x{}]",
                rect.x0,
                rect.y0,
                rect.width(),
                rect.height()
            );

            blocks.push(CodeBlock {
                rect,
                ..CodeBlock::default()
            });
        }
    }

    blocks
}
