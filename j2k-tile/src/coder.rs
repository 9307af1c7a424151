//! The boundary to the entropy coder.
//!
//! The schedulers only know code-blocks through [`CodeBlockJob`] and hand the
//! actual bit-plane coding to a [`BlockCoder`]. Every worker owns its own
//! coder instance, so implementations are free to keep scratch state.

use crate::decomposition::{BlockId, Orientation};
use crate::error::CoderError;
use crate::rect::Rect;

/// Everything a block coder needs to know about a single code-block.
#[derive(Clone, Debug)]
pub struct CodeBlockJob<'a> {
    /// The identity of the code-block.
    pub id: BlockId,
    /// The orientation of the band the code-block belongs to.
    pub orientation: Orientation,
    /// The region of the code-block in absolute band coordinates.
    pub rect: Rect,
    /// The number of magnitude bit-planes of the band.
    pub num_bit_planes: u8,
    /// The number of leading bit-planes known to be zero.
    pub missing_msbs: u8,
    /// The number of coding passes in `data`.
    pub num_passes: u8,
    /// The code-block style flags.
    pub code_block_style: u8,
    /// The region-of-interest shift of the component.
    pub roi_shift: u8,
    /// Whether the component uses the reversible wavelet.
    pub reversible: bool,
    /// The quantization step size of the band.
    pub step_size: f32,
    /// The coded bytes, empty on encode.
    pub data: &'a [u8],
}

impl CodeBlockJob<'_> {
    /// The width of the code-block.
    pub fn width(&self) -> u32 {
        self.rect.width()
    }

    /// The height of the code-block.
    pub fn height(&self) -> u32 {
        self.rect.height()
    }

    /// The number of samples of the code-block.
    pub fn num_samples(&self) -> usize {
        self.rect.area() as usize
    }
}

/// The result of encoding a single code-block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EncodedBlock {
    /// The coded bytes.
    pub data: Vec<u8>,
    /// The number of coding passes in `data`.
    pub num_passes: u8,
    /// The number of leading bit-planes that are zero.
    pub missing_msbs: u8,
    /// The distortion that would be introduced by dropping the block.
    pub distortion: f64,
}

/// An entropy coder for code-blocks.
pub trait BlockCoder: Send {
    /// Decode the quantization indices of a code-block into `out`, which
    /// holds `width * height` samples in row-major order.
    fn decode(&mut self, job: &CodeBlockJob<'_>, out: &mut [i32]) -> Result<(), CoderError>;

    /// Encode the quantization indices in `samples`, given in row-major
    /// order.
    fn encode(
        &mut self,
        job: &CodeBlockJob<'_>,
        samples: &[i32],
    ) -> Result<EncodedBlock, CoderError>;
}

/// A block coder that stores quantization indices verbatim as little-endian
/// 32-bit integers.
///
/// Useful as a reference when testing the layers around the entropy coder.
#[derive(Clone, Debug, Default)]
pub struct RawBlockCoder {
    _priv: (),
}

impl RawBlockCoder {
    /// Create a new raw coder.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockCoder for RawBlockCoder {
    fn decode(&mut self, job: &CodeBlockJob<'_>, out: &mut [i32]) -> Result<(), CoderError> {
        debug_assert_eq!(out.len(), job.num_samples());

        if job.data.is_empty() || job.num_passes == 0 {
            out.fill(0);
            return Ok(());
        }

        let expected = out.len() * 4;

        if job.data.len() < expected {
            return Err(CoderError::Truncated);
        } else if job.data.len() > expected {
            return Err(CoderError::Corrupt);
        }

        let limit = 1_u32 << job.num_bit_planes.min(31);

        for (sample, bytes) in out.iter_mut().zip(job.data.chunks_exact(4)) {
            let v = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

            if job.roi_shift == 0 && v.unsigned_abs() >= limit {
                return Err(CoderError::Corrupt);
            }

            *sample = v;
        }

        Ok(())
    }

    fn encode(
        &mut self,
        job: &CodeBlockJob<'_>,
        samples: &[i32],
    ) -> Result<EncodedBlock, CoderError> {
        debug_assert_eq!(samples.len(), job.num_samples());

        let max = samples.iter().map(|v| v.unsigned_abs()).max().unwrap_or(0);

        if max == 0 {
            return Ok(EncodedBlock {
                missing_msbs: job.num_bit_planes,
                ..EncodedBlock::default()
            });
        }

        let used = 32 - max.leading_zeros();

        if used > job.num_bit_planes as u32 && job.roi_shift == 0 {
            return Err(CoderError::Unsupported);
        }

        let missing_msbs = (job.num_bit_planes as u32).saturating_sub(used) as u8;
        // One cleanup pass for the first significant bit-plane, three passes
        // for every following one.
        let num_passes = (1 + 3 * (used - 1)).min(u8::MAX as u32) as u8;

        let mut data = Vec::with_capacity(samples.len() * 4);
        let mut distortion = 0.0;

        for v in samples {
            data.extend_from_slice(&v.to_le_bytes());
            distortion += (*v as f64) * (*v as f64);
        }

        Ok(EncodedBlock {
            data,
            num_passes,
            missing_msbs,
            distortion,
        })
    }
}
