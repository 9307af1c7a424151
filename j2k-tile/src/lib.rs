/*!
The tile-processing core of a JPEG 2000 codec.

`j2k-tile` sits between the entropy coder and the wavelet transform. It
derives the resolutions, sub-bands, precincts and code-blocks of a
tile-component, holds their coefficients in a windowed tile buffer, schedules
the coding of the code-blocks on a worker pool and applies the DC level shift
and the multi-component transforms to the reconstructed sample planes.

The entropy coder itself is not part of this crate. It is plugged in through
the [`BlockCoder`] trait; [`RawBlockCoder`] is a simple reference
implementation.

# Example
```rust,no_run
use j2k_tile::{
    ComponentParams, Decomposition, RawBlockCoder, Rect, TileProcessor, TileSettings,
    WaveletTransform,
};

let params = ComponentParams::new(
    Rect::from_xywh(0, 0, 256, 256),
    6,
    8,
    false,
    WaveletTransform::Reversible53,
);
let decomposition = Decomposition::build(params).unwrap();
let processor = TileProcessor::new(TileSettings::default());

let (buffer, report) = processor
    .decode_component::<i32, _, _>(&decomposition, Rect::from_xywh(64, 64, 32, 32), || {
        Ok(RawBlockCoder::new())
    })
    .unwrap();

assert!(report.success);
println!("decoded window {:?}", buffer.bounds());
```

# Cargo features
- `simd` (default): use SIMD instructions for the component transforms.
- `logging`: emit log messages via the `log` crate.

# Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]

mod log;

pub mod buffer;
pub mod coder;
pub mod coords;
pub mod decomposition;
pub mod error;
pub mod executor;
pub(crate) mod math;
pub mod mct;
pub mod rect;
pub mod scheduler;

pub use buffer::{BandLocation, BlockTarget, BlockView, BufferLayout, Sample, TileBuffer};
pub use coder::{BlockCoder, CodeBlockJob, EncodedBlock, RawBlockCoder};
pub use coords::CoordinateMapper;
pub use decomposition::{
    BlockId, CodeBlock, ComponentParams, Decomposition, Orientation, Precinct, QuantStep,
    Resolution, SubBand, WaveletTransform,
};
pub use error::{Result, TileError};
pub use executor::Executor;
pub use mct::{ComponentTransform, DecodePlanes, Kernel, ShiftInfo};
pub use rect::{Point, Rect};
pub use scheduler::{DecodeScheduler, EncodeOutcome, EncodeScheduler, ScheduleReport};

/// Whether samples flow from coded data to pixels or the other way around.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Reconstruct samples from coded data.
    Decode,
    /// Produce coded data from samples.
    Encode,
}

/// How the component transform kernel is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KernelChoice {
    /// Use the vector kernel if the build supports it.
    #[default]
    Auto,
    /// Always use the scalar kernel.
    Scalar,
    /// Always use the vector kernel.
    Vector,
}

/// Settings for processing tiles.
#[derive(Clone, Copy, Debug)]
pub struct TileSettings {
    /// The number of workers. Zero selects the available hardware
    /// parallelism.
    pub num_workers: usize,
    /// The number of lines of a component plane that a single transform task
    /// processes.
    pub lines_per_task: u32,
    /// How the transform kernel is chosen.
    pub kernel: KernelChoice,
    /// The storage layout of tile buffers.
    pub layout: BufferLayout,
    /// The number of highest resolutions to discard when decoding.
    pub reduce: u8,
    /// Whether to accumulate weighted distortion when encoding.
    pub rate_control: bool,
}

impl Default for TileSettings {
    fn default() -> Self {
        Self {
            num_workers: 0,
            lines_per_task: 64,
            kernel: KernelChoice::Auto,
            layout: BufferLayout::Unified,
            reduce: 0,
            rate_control: false,
        }
    }
}

/// Processes tile-components with a fixed set of settings and a worker pool
/// that lives as long as the processor.
#[derive(Debug)]
pub struct TileProcessor {
    settings: TileSettings,
    executor: Executor,
}

impl TileProcessor {
    /// Create a new processor and start its worker pool.
    pub fn new(settings: TileSettings) -> Self {
        Self {
            executor: Executor::new(settings.num_workers),
            settings,
        }
    }

    /// The settings of the processor.
    pub fn settings(&self) -> &TileSettings {
        &self.settings
    }

    /// The executor of the processor.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// The transform kernel selected by the settings.
    pub fn kernel(&self) -> Kernel {
        match self.settings.kernel {
            KernelChoice::Auto => Kernel::detect(),
            KernelChoice::Scalar => Kernel::Scalar,
            KernelChoice::Vector => Kernel::Vector,
        }
    }

    /// Decode the code-blocks of a tile-component that contribute to
    /// `window`, given in canvas coordinates.
    ///
    /// Returns the filled tile buffer and the schedule report. Block
    /// failures are reported through `success` of the report.
    pub fn decode_component<T, C, F>(
        &self,
        decomposition: &Decomposition,
        window: Rect,
        factory: F,
    ) -> Result<(TileBuffer<'static, T>, ScheduleReport)>
    where
        T: Sample,
        C: BlockCoder,
        F: Fn() -> Result<C>,
    {
        let mut buffer = TileBuffer::new(
            decomposition,
            window,
            Direction::Decode,
            self.settings.reduce,
            self.settings.layout,
        )?;
        buffer.allocate(true)?;

        let report = DecodeScheduler::new(decomposition).run(&mut buffer, &self.executor, factory)?;

        Ok((buffer, report))
    }

    /// Create a zeroed buffer that covers the whole tile-component, ready to
    /// be filled with coefficients for encoding.
    pub fn encode_buffer<T: Sample>(
        &self,
        decomposition: &Decomposition,
    ) -> Result<TileBuffer<'static, T>> {
        let mut buffer = TileBuffer::new(
            decomposition,
            decomposition.rect(),
            Direction::Encode,
            0,
            self.settings.layout,
        )?;
        buffer.allocate(true)?;

        Ok(buffer)
    }

    /// Encode all code-blocks of a tile-component and store the coded data in
    /// the decomposition.
    ///
    /// `mct_norm` is the norm of the component transform basis vector of the
    /// component; it is only used with rate control.
    pub fn encode_component<T, C, F>(
        &self,
        decomposition: &mut Decomposition,
        buffer: &mut TileBuffer<'_, T>,
        mct_norm: f64,
        factory: F,
    ) -> Result<EncodeOutcome>
    where
        T: Sample,
        C: BlockCoder,
        F: Fn() -> Result<C>,
    {
        let mut scheduler = EncodeScheduler::new(decomposition);

        if self.settings.rate_control {
            scheduler = scheduler.with_rate_control(mct_norm);
        }

        scheduler.run(buffer, &self.executor, factory)
    }

    /// Apply the inverse component transform and DC level shift to the
    /// reconstructed planes of a tile.
    pub fn decompress_transform(
        &self,
        planes: DecodePlanes<'_>,
        shifts: &[ShiftInfo],
        stride: usize,
        mct: bool,
    ) -> Result<()> {
        self.transform(stride, mct)
            .decompress(&self.executor, planes, shifts)
    }

    /// Apply the DC level shift and forward component transform to the
    /// sample planes of a tile.
    pub fn compress_transform(
        &self,
        planes: Vec<&mut [i32]>,
        shifts: &[ShiftInfo],
        stride: usize,
        mct: bool,
        reversible: bool,
    ) -> Result<()> {
        self.transform(stride, mct)
            .compress(&self.executor, planes, shifts, reversible)
    }

    fn transform(&self, stride: usize, mct: bool) -> ComponentTransform {
        ComponentTransform {
            kernel: self.kernel(),
            lines_per_task: self.settings.lines_per_task,
            stride,
            mct,
        }
    }
}
