//! Scheduling the entropy coding of code-blocks on a worker pool.
//!
//! All code-blocks of a resolution form one stage. Blocks within a stage are
//! independent, since every block writes to its own disjoint region of the
//! tile buffer. Stages run in increasing resolution order.
//!
//! A block that fails clears a shared success flag. Blocks that haven't
//! started yet check the flag once on entry and are skipped if it is
//! cleared; blocks that are already running finish normally.

use crate::buffer::{BlockTarget, BlockView, Sample, TileBuffer};
use crate::coder::{BlockCoder, CodeBlockJob, EncodedBlock};
use crate::decomposition::{BlockId, CodeBlock, Decomposition};
use crate::error::{BufferError, CoderError, Result, bail};
use crate::executor::Executor;
use crate::log::{ldebug, lerror, ltrace, lwarn};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// The outcome of scheduling the code-blocks of a tile-component.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    /// The number of code-blocks that were scheduled.
    pub scheduled: usize,
    /// The number of code-blocks that were coded successfully.
    pub executed: usize,
    /// The number of code-blocks that were skipped after a failure.
    pub skipped: usize,
    /// The number of code-blocks that failed.
    pub failed: usize,
    /// Whether all code-blocks were coded successfully.
    pub success: bool,
}

impl ScheduleReport {
    fn empty() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }
}

/// The outcome of encoding the code-blocks of a tile-component.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EncodeOutcome {
    /// The schedule report.
    pub report: ScheduleReport,
    /// The total number of coded bytes.
    pub coded_bytes: usize,
    /// The sum of the block distortions, weighted by the squared step size
    /// of their band and the squared norm of the component transform. Only
    /// computed with rate control.
    pub weighted_distortion: f64,
}

struct WorkerState<C> {
    coder: C,
    scratch: Vec<i32>,
}

fn create_workers<C, F>(num_workers: usize, factory: &F) -> Result<Vec<Mutex<WorkerState<C>>>>
where
    C: BlockCoder,
    F: Fn() -> Result<C>,
{
    (0..num_workers)
        .map(|_| {
            factory().map(|coder| {
                Mutex::new(WorkerState {
                    coder,
                    scratch: vec![],
                })
            })
        })
        .collect::<Result<Vec<_>>>()
        .inspect_err(|_e| {
            lerror!("failed to create block coder: {_e}");
        })
}

/// Tracks the progress of a schedule across workers.
struct Tracker {
    component: u16,
    success: AtomicBool,
    executed: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl Tracker {
    fn new(component: u16) -> Self {
        Self {
            component,
            success: AtomicBool::new(true),
            executed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Check the success flag on entry of a task.
    fn should_run(&self) -> bool {
        if self.success.load(Ordering::Acquire) {
            true
        } else {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    fn record(&self, id: BlockId, result: core::result::Result<(), CoderError>) {
        match result {
            Ok(()) => {
                self.executed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_e) => {
                lwarn!(
                    "failed to code block (component {}, resolution {}, band {}, precinct {}, block {}): {_e}",
                    self.component,
                    id.resolution,
                    id.band,
                    id.precinct,
                    id.block
                );

                self.failed.fetch_add(1, Ordering::Relaxed);
                self.success.store(false, Ordering::Release);
            }
        }
    }

    fn report(&self, scheduled: usize) -> ScheduleReport {
        let report = ScheduleReport {
            scheduled,
            executed: self.executed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Acquire),
        };

        debug_assert_eq!(
            report.executed + report.skipped + report.failed,
            report.scheduled
        );

        report
    }
}

fn job_for<'a>(
    decomposition: &Decomposition,
    id: BlockId,
    block: &CodeBlock,
    data: &'a [u8],
) -> CodeBlockJob<'a> {
    let params = decomposition.params();
    let band = decomposition.band(id.resolution, id.band);

    CodeBlockJob {
        id,
        orientation: band.orientation,
        rect: block.rect,
        num_bit_planes: band.num_bit_planes,
        missing_msbs: block.missing_msbs,
        num_passes: block.num_passes,
        code_block_style: params.code_block_style,
        roi_shift: params.roi_shift,
        reversible: params.wavelet.is_reversible(),
        step_size: band.step_size,
        data,
    }
}

/// Pair every job with its view into the tile buffer, keeping the stages.
fn attach_views<'j, 'v, T: Sample>(
    stages: Vec<Vec<CodeBlockJob<'j>>>,
    buffer: &'v mut TileBuffer<'_, T>,
) -> Result<Vec<Vec<(CodeBlockJob<'j>, BlockView<'v, T>)>>> {
    let targets: Vec<_> = stages
        .iter()
        .flatten()
        .map(|job| BlockTarget {
            resolution: job.id.resolution,
            band: job.id.band,
            rect: job.rect,
        })
        .collect();

    let mut views = buffer.block_views_mut(&targets)?.into_iter();
    let mut staged = Vec::with_capacity(stages.len());

    for stage in stages {
        let mut items = Vec::with_capacity(stage.len());

        for job in stage {
            let Some(view) = views.next() else {
                bail!(BufferError::OutOfBounds);
            };

            items.push((job, view));
        }

        staged.push(items);
    }

    Ok(staged)
}

/// Undo the region-of-interest max-shift of a quantization index.
#[inline]
fn roi_unshift(q: i32, shift: u8) -> i32 {
    let shift = shift.min(31) as u32;
    let magnitude = q.unsigned_abs();

    if magnitude >= 1 << shift {
        let m = (magnitude >> shift) as i32;
        if q < 0 { -m } else { m }
    } else {
        q
    }
}

#[inline]
fn dequantize<T: Sample>(q: i32, job: &CodeBlockJob<'_>) -> T {
    let q = if job.roi_shift > 0 {
        roi_unshift(q, job.roi_shift)
    } else {
        q
    };

    if job.reversible {
        T::from_i32(q)
    } else {
        T::from_f32(q as f32 * job.step_size)
    }
}

#[inline]
fn quantize<T: Sample>(v: T, job: &CodeBlockJob<'_>) -> i32 {
    if job.reversible {
        v.to_i32()
    } else {
        (v.to_f32() / job.step_size).trunc() as i32
    }
}

fn decode_block<C: BlockCoder, T: Sample>(
    state: &mut WorkerState<C>,
    job: &CodeBlockJob<'_>,
    view: &mut BlockView<'_, T>,
) -> core::result::Result<(), CoderError> {
    let WorkerState { coder, scratch } = state;
    scratch.clear();
    scratch.resize(job.num_samples(), 0);

    catch_unwind(AssertUnwindSafe(|| coder.decode(job, scratch)))
        .map_err(|_| CoderError::Panicked)??;

    // Only touch the buffer once the block decoded successfully.
    for (y, src) in scratch.chunks_exact(job.width() as usize).enumerate() {
        for (dst, q) in view.row_mut(y as u32).iter_mut().zip(src) {
            *dst = dequantize(*q, job);
        }
    }

    Ok(())
}

fn encode_block<C: BlockCoder, T: Sample>(
    state: &mut WorkerState<C>,
    job: &CodeBlockJob<'_>,
    view: &BlockView<'_, T>,
) -> core::result::Result<EncodedBlock, CoderError> {
    let WorkerState { coder, scratch } = state;
    scratch.clear();

    for y in 0..view.height() {
        scratch.extend(view.row(y).iter().map(|v| quantize(*v, job)));
    }

    catch_unwind(AssertUnwindSafe(|| coder.encode(job, scratch))).map_err(|_| CoderError::Panicked)?
}

/// Schedules the decoding of the code-blocks of a tile-component.
#[derive(Clone, Copy, Debug)]
pub struct DecodeScheduler<'d> {
    decomposition: &'d Decomposition,
    component: u16,
}

impl<'d> DecodeScheduler<'d> {
    /// Create a new scheduler for the given decomposition.
    pub fn new(decomposition: &'d Decomposition) -> Self {
        Self {
            decomposition,
            component: 0,
        }
    }

    /// Set the component index used in log messages.
    pub fn with_component(mut self, component: u16) -> Self {
        self.component = component;
        self
    }

    /// Collect the code-blocks that contribute to the window of `buffer`,
    /// one stage per resolution.
    pub fn build_stages<T: Sample>(
        &self,
        buffer: &TileBuffer<'_, T>,
    ) -> Vec<Vec<CodeBlockJob<'d>>> {
        let whole_tile = buffer.is_whole_tile();
        let mut stages = Vec::with_capacity(buffer.num_resolutions() as usize);

        for resolution in &self.decomposition.resolutions()[..buffer.num_resolutions() as usize] {
            let mut stage = vec![];

            for (band_idx, band) in resolution.bands.iter().enumerate() {
                let window = buffer.padded_band_window(resolution.index, band_idx as u8);

                for precinct in &band.precincts {
                    if !whole_tile && !precinct.rect.non_empty_intersection(window) {
                        continue;
                    }

                    for (block_idx, block) in precinct.code_blocks.iter().enumerate() {
                        if !whole_tile && !block.rect.non_empty_intersection(window) {
                            continue;
                        }

                        let id = BlockId {
                            resolution: resolution.index,
                            band: band_idx as u8,
                            precinct: precinct.index,
                            block: block_idx as u32,
                        };

                        stage.push(job_for(self.decomposition, id, block, &block.data));
                    }
                }
            }

            ltrace!(
                "decode stage for resolution {}: {} blocks",
                resolution.index,
                stage.len()
            );

            stages.push(stage);
        }

        stages
    }

    /// Decode all code-blocks that contribute to the window of `buffer`.
    ///
    /// `factory` is called once per worker to create its coder. Failures of
    /// individual blocks are reported through the returned report; errors
    /// are only returned if the schedule could not be set up.
    pub fn run<T, C, F>(
        &self,
        buffer: &mut TileBuffer<'_, T>,
        executor: &Executor,
        factory: F,
    ) -> Result<ScheduleReport>
    where
        T: Sample,
        C: BlockCoder,
        F: Fn() -> Result<C>,
    {
        let stages = self.build_stages(buffer);
        let scheduled: usize = stages.iter().map(Vec::len).sum();

        if scheduled == 0 {
            ldebug!("no code-blocks intersect the window");
            return Ok(ScheduleReport::empty());
        }

        let workers = create_workers(executor.num_workers(), &factory)?;

        if !buffer.is_allocated() {
            buffer.allocate(true)?;
        }

        let staged = attach_views(stages, buffer)?;
        let tracker = Tracker::new(self.component);

        executor.run_stages(staged, |worker, (job, mut view)| {
            if !tracker.should_run() {
                return;
            }

            let mut state = workers[worker]
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            tracker.record(job.id, decode_block(&mut state, &job, &mut view));
        });

        Ok(tracker.report(scheduled))
    }

    /// Decode all code-blocks that contribute to the window of `buffer` and
    /// return whether all of them succeeded.
    pub fn schedule<T, C, F>(
        &self,
        buffer: &mut TileBuffer<'_, T>,
        executor: &Executor,
        factory: F,
    ) -> bool
    where
        T: Sample,
        C: BlockCoder,
        F: Fn() -> Result<C>,
    {
        match self.run(buffer, executor, factory) {
            Ok(report) => report.success,
            Err(_e) => {
                lerror!("failed to schedule component {}: {_e}", self.component);
                false
            }
        }
    }
}

/// Schedules the encoding of the code-blocks of a tile-component.
///
/// On success, the coded data is stored in the code-blocks of the
/// decomposition.
#[derive(Debug)]
pub struct EncodeScheduler<'d> {
    decomposition: &'d mut Decomposition,
    component: u16,
    rate_control: bool,
    mct_norm: f64,
}

impl<'d> EncodeScheduler<'d> {
    /// Create a new scheduler for the given decomposition.
    pub fn new(decomposition: &'d mut Decomposition) -> Self {
        Self {
            decomposition,
            component: 0,
            rate_control: false,
            mct_norm: 1.0,
        }
    }

    /// Set the component index used in log messages.
    pub fn with_component(mut self, component: u16) -> Self {
        self.component = component;
        self
    }

    /// Enable accumulating weighted distortion. `mct_norm` is the norm of the
    /// component transform basis vector of this component, 1.0 without
    /// component transform.
    pub fn with_rate_control(mut self, mct_norm: f64) -> Self {
        self.rate_control = true;
        self.mct_norm = mct_norm;
        self
    }

    fn build_stages(&self) -> Vec<Vec<CodeBlockJob<'static>>> {
        let d = &*self.decomposition;
        let mut stages: Vec<Vec<_>> = vec![vec![]; d.num_resolutions() as usize];

        for (id, block) in d.code_blocks() {
            stages[id.resolution as usize].push(job_for(d, id, block, &[]));
        }

        stages
    }

    /// Encode all code-blocks of the tile-component held in `buffer`.
    ///
    /// Nothing is stored in the decomposition if any block fails.
    pub fn run<T, C, F>(
        &mut self,
        buffer: &mut TileBuffer<'_, T>,
        executor: &Executor,
        factory: F,
    ) -> Result<EncodeOutcome>
    where
        T: Sample,
        C: BlockCoder,
        F: Fn() -> Result<C>,
    {
        let stages = self.build_stages();
        let scheduled: usize = stages.iter().map(Vec::len).sum();

        if scheduled == 0 {
            return Ok(EncodeOutcome {
                report: ScheduleReport::empty(),
                ..EncodeOutcome::default()
            });
        }

        let workers = create_workers(executor.num_workers(), &factory)?;
        let staged = attach_views(stages, buffer)?;
        let tracker = Tracker::new(self.component);
        let results = Mutex::new(Vec::with_capacity(scheduled));
        let distortion = Mutex::new(0.0_f64);
        let (rate_control, norm) = (self.rate_control, self.mct_norm);

        executor.run_stages(staged, |worker, (job, view)| {
            if !tracker.should_run() {
                return;
            }

            let encoded = {
                let mut state = workers[worker]
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                encode_block(&mut state, &job, &view)
            };

            match encoded {
                Ok(block) => {
                    if rate_control {
                        let step = job.step_size as f64;
                        *distortion.lock().unwrap_or_else(PoisonError::into_inner) +=
                            block.distortion * step * step * norm * norm;
                    }

                    results
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((job.id, block));
                    tracker.record(job.id, Ok(()));
                }
                Err(e) => tracker.record(job.id, Err(e)),
            }
        });

        let report = tracker.report(scheduled);
        let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
        results.sort_unstable_by_key(|(id, _)| *id);

        let coded_bytes = results.iter().map(|(_, b)| b.data.len()).sum();

        if report.success {
            self.decomposition.store_encoded(results);
        }

        Ok(EncodeOutcome {
            report,
            coded_bytes,
            weighted_distortion: distortion.into_inner().unwrap_or_else(PoisonError::into_inner),
        })
    }

    /// Encode all code-blocks of the tile-component held in `buffer` and
    /// return whether all of them succeeded.
    pub fn schedule<T, C, F>(
        &mut self,
        buffer: &mut TileBuffer<'_, T>,
        executor: &Executor,
        factory: F,
    ) -> bool
    where
        T: Sample,
        C: BlockCoder,
        F: Fn() -> Result<C>,
    {
        match self.run(buffer, executor, factory) {
            Ok(outcome) => outcome.report.success,
            Err(_e) => {
                lerror!("failed to schedule component {}: {_e}", self.component);
                false
            }
        }
    }
}
