//! The DC level shift and the multi-component transforms, as specified in
//! Annex G.
//!
//! All transforms work in place on component planes. A plane is cut into
//! chunks of whole lines which are processed independently, possibly on
//! different workers. Every transform has a scalar and a vector kernel that
//! produce bit-identical results.
//!
//! The irreversible inverse transform reads floating point coefficients and
//! leaves integer samples behind, stored as the bit patterns of the `f32`
//! plane they were read from. The irreversible forward transform does the
//! opposite. Use [`as_samples`] and [`as_coefficients`] to reinterpret such
//! planes.

use crate::Direction;
use crate::error::{Result, TransformError, bail};
use crate::executor::Executor;
use crate::log::ltrace;
use crate::math::{Level, SIMD_WIDTH, Simd, dispatch, f32x8, i32x8};

const A_R: f32 = 0.299;
const A_G: f32 = 0.587;
const A_B: f32 = 0.114;
const CB: f32 = 0.5 / (1.0 - A_B);
const CR: f32 = 0.5 / (1.0 - A_R);

/// The synthesis norms of the reversible component transform.
pub const REVERSIBLE_NORMS: [f64; 3] = [1.732, 0.8292, 0.8292];
/// The synthesis norms of the irreversible component transform.
pub const IRREVERSIBLE_NORMS: [f64; 3] = [1.732, 1.805, 1.573];

/// The number of fractional bits of the fixed point custom transform.
const FIX_BITS: u32 = 13;

/// The range and offset of the samples of a component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShiftInfo {
    /// The smallest representable sample.
    pub min: i32,
    /// The largest representable sample.
    pub max: i32,
    /// The offset that is added to each sample.
    pub shift: i32,
}

impl ShiftInfo {
    /// Derive the shift descriptor of a component.
    ///
    /// Decoding adds `dc_level_shift` to every sample and clamps the result
    /// to the range of the precision; encoding subtracts it.
    pub fn new(
        precision: u8,
        signed: bool,
        dc_level_shift: i32,
        direction: Direction,
    ) -> Result<Self> {
        if precision == 0 || precision > 31 {
            bail!(TransformError::InvalidPrecision);
        }

        let (min, max) = if signed {
            let half = 1_i64 << (precision - 1);
            (-half, half - 1)
        } else {
            (0, (1_i64 << precision) - 1)
        };

        let shift = match direction {
            Direction::Decode => dc_level_shift,
            Direction::Encode => dc_level_shift.wrapping_neg(),
        };

        Ok(Self {
            min: min as i32,
            max: max as i32,
            shift,
        })
    }
}

/// The implementation strategy of the transform kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kernel {
    /// Process one sample at a time.
    Scalar,
    /// Process eight samples at a time.
    Vector,
}

impl Kernel {
    /// The preferred kernel for the current build.
    pub fn detect() -> Self {
        if cfg!(feature = "simd") {
            Self::Vector
        } else {
            Self::Scalar
        }
    }
}

/// Component planes handed to the inverse transform.
#[derive(Debug)]
pub enum DecodePlanes<'p> {
    /// Integer coefficients of a reversible decomposition.
    Reversible(Vec<&'p mut [i32]>),
    /// Floating point coefficients of an irreversible decomposition.
    Irreversible(Vec<&'p mut [f32]>),
}

/// Applies DC level shift and component transforms to whole tiles.
#[derive(Clone, Copy, Debug)]
pub struct ComponentTransform {
    /// The kernel to use.
    pub kernel: Kernel,
    /// The number of lines processed by a single task.
    pub lines_per_task: u32,
    /// The distance between two lines of a plane, in samples.
    pub stride: usize,
    /// Whether the first three components are colour transformed.
    pub mct: bool,
}

impl ComponentTransform {
    fn chunk_len(&self, executor: &Executor) -> usize {
        if executor.num_workers() == 1 {
            usize::MAX
        } else {
            (self.lines_per_task.max(1) as usize).saturating_mul(self.stride.max(1))
        }
    }

    fn validate<T>(&self, planes: &[&mut [T]], shifts: &[ShiftInfo]) -> Result<()> {
        if planes.len() != shifts.len() {
            bail!(TransformError::ComponentMismatch);
        }

        if self.mct {
            if planes.len() < 3 {
                bail!(TransformError::TooFewComponents);
            }

            if planes[0].len() != planes[1].len() || planes[1].len() != planes[2].len() {
                bail!(TransformError::PlaneSizeMismatch);
            }
        }

        Ok(())
    }

    /// Apply the inverse component transform and the DC level shift.
    pub fn decompress(
        &self,
        executor: &Executor,
        planes: DecodePlanes<'_>,
        shifts: &[ShiftInfo],
    ) -> Result<()> {
        let len = self.chunk_len(executor);
        let mut chunks = vec![];

        match planes {
            DecodePlanes::Reversible(planes) => {
                self.validate(&planes, shifts)?;
                let mut planes = planes.into_iter().zip(shifts.iter().copied());

                if self.mct {
                    let (Some((y, s0)), Some((u, s1)), Some((v, s2))) =
                        (planes.next(), planes.next(), planes.next())
                    else {
                        bail!(TransformError::TooFewComponents);
                    };

                    let rows = y.chunks_mut(len).zip(u.chunks_mut(len));

                    for ((y, u), v) in rows.zip(v.chunks_mut(len)) {
                        chunks.push(Chunk::InverseRct([y, u, v], [s0, s1, s2]));
                    }
                }

                for (plane, shift) in planes {
                    for c in plane.chunks_mut(len) {
                        chunks.push(Chunk::InverseShiftInt(c, shift));
                    }
                }
            }
            DecodePlanes::Irreversible(planes) => {
                self.validate(&planes, shifts)?;
                let mut planes = planes.into_iter().zip(shifts.iter().copied());

                if self.mct {
                    let (Some((y, s0)), Some((u, s1)), Some((v, s2))) =
                        (planes.next(), planes.next(), planes.next())
                    else {
                        bail!(TransformError::TooFewComponents);
                    };

                    let rows = y.chunks_mut(len).zip(u.chunks_mut(len));

                    for ((y, u), v) in rows.zip(v.chunks_mut(len)) {
                        chunks.push(Chunk::InverseIct([y, u, v], [s0, s1, s2]));
                    }
                }

                for (plane, shift) in planes {
                    for c in plane.chunks_mut(len) {
                        chunks.push(Chunk::InverseShiftFloat(c, shift));
                    }
                }
            }
        }

        self.run(executor, chunks);

        Ok(())
    }

    /// Apply the DC level shift and the forward component transform.
    ///
    /// With `reversible`, the planes hold integer coefficients afterwards,
    /// otherwise floating point coefficients stored as `f32` bit patterns.
    pub fn compress(
        &self,
        executor: &Executor,
        planes: Vec<&mut [i32]>,
        shifts: &[ShiftInfo],
        reversible: bool,
    ) -> Result<()> {
        self.validate(&planes, shifts)?;

        let len = self.chunk_len(executor);
        let mut chunks = vec![];
        let mut planes = planes.into_iter().zip(shifts.iter().copied());

        if self.mct {
            let (Some((r, s0)), Some((g, s1)), Some((b, s2))) =
                (planes.next(), planes.next(), planes.next())
            else {
                bail!(TransformError::TooFewComponents);
            };

            for ((r, g), b) in r.chunks_mut(len).zip(g.chunks_mut(len)).zip(b.chunks_mut(len)) {
                let planes = [r, g, b];
                let shifts = [s0, s1, s2];

                chunks.push(if reversible {
                    Chunk::ForwardRct(planes, shifts)
                } else {
                    Chunk::ForwardIct(planes, shifts)
                });
            }
        }

        for (plane, shift) in planes {
            for c in plane.chunks_mut(len) {
                chunks.push(if reversible {
                    Chunk::ForwardShiftInt(c, shift)
                } else {
                    Chunk::ForwardShiftFloat(c, shift)
                });
            }
        }

        self.run(executor, chunks);

        Ok(())
    }

    fn run(&self, executor: &Executor, chunks: Vec<Chunk<'_>>) {
        ltrace!("running {} transform chunks", chunks.len());

        let kernel = self.kernel;
        executor.run_each(chunks, |_, chunk| chunk.run(kernel));
    }
}

enum Chunk<'p> {
    InverseShiftInt(&'p mut [i32], ShiftInfo),
    InverseShiftFloat(&'p mut [f32], ShiftInfo),
    InverseRct([&'p mut [i32]; 3], [ShiftInfo; 3]),
    InverseIct([&'p mut [f32]; 3], [ShiftInfo; 3]),
    ForwardShiftInt(&'p mut [i32], ShiftInfo),
    ForwardShiftFloat(&'p mut [i32], ShiftInfo),
    ForwardRct([&'p mut [i32]; 3], [ShiftInfo; 3]),
    ForwardIct([&'p mut [i32]; 3], [ShiftInfo; 3]),
}

impl Chunk<'_> {
    fn run(self, kernel: Kernel) {
        match (self, kernel) {
            (Self::InverseShiftInt(p, s), Kernel::Scalar) => scalar::inverse_shift_int(p, &s),
            (Self::InverseShiftInt(p, s), Kernel::Vector) => vector::inverse_shift_int(p, &s),
            (Self::InverseShiftFloat(p, s), Kernel::Scalar) => {
                scalar::inverse_shift_float(p, &s);
            }
            (Self::InverseShiftFloat(p, s), Kernel::Vector) => {
                vector::inverse_shift_float(p, &s);
            }
            (Self::InverseRct([y, u, v], s), Kernel::Scalar) => scalar::inverse_rct(y, u, v, &s),
            (Self::InverseRct([y, u, v], s), Kernel::Vector) => vector::inverse_rct(y, u, v, &s),
            (Self::InverseIct([y, u, v], s), Kernel::Scalar) => scalar::inverse_ict(y, u, v, &s),
            (Self::InverseIct([y, u, v], s), Kernel::Vector) => vector::inverse_ict(y, u, v, &s),
            (Self::ForwardShiftInt(p, s), Kernel::Scalar) => scalar::forward_shift_int(p, &s),
            (Self::ForwardShiftInt(p, s), Kernel::Vector) => vector::forward_shift_int(p, &s),
            (Self::ForwardShiftFloat(p, s), Kernel::Scalar) => {
                scalar::forward_shift_float(p, &s);
            }
            (Self::ForwardShiftFloat(p, s), Kernel::Vector) => {
                vector::forward_shift_float(p, &s);
            }
            (Self::ForwardRct([r, g, b], s), Kernel::Scalar) => scalar::forward_rct(r, g, b, &s),
            (Self::ForwardRct([r, g, b], s), Kernel::Vector) => vector::forward_rct(r, g, b, &s),
            (Self::ForwardIct([r, g, b], s), Kernel::Scalar) => scalar::forward_ict(r, g, b, &s),
            (Self::ForwardIct([r, g, b], s), Kernel::Vector) => vector::forward_ict(r, g, b, &s),
        }
    }
}

/// Round to nearest (ties to even), then shift and clamp.
#[inline(always)]
fn round_shift_clamp(v: f32, s: &ShiftInfo) -> i32 {
    shift_clamp(v.round_ties_even() as i32, s)
}

#[inline(always)]
fn shift_clamp(v: i32, s: &ShiftInfo) -> i32 {
    v.saturating_add(s.shift).clamp(s.min, s.max)
}

#[inline(always)]
fn store_int(out: &mut f32, v: i32) {
    *out = f32::from_bits(v as u32);
}

#[inline(always)]
fn store_float(out: &mut i32, v: f32) {
    *out = v.to_bits() as i32;
}

mod scalar {
    use super::*;

    pub(super) fn inverse_shift_int(plane: &mut [i32], s: &ShiftInfo) {
        for v in plane {
            *v = shift_clamp(*v, s);
        }
    }

    pub(super) fn inverse_shift_float(plane: &mut [f32], s: &ShiftInfo) {
        for v in plane {
            let i = round_shift_clamp(*v, s);
            store_int(v, i);
        }
    }

    // See G.2.
    pub(super) fn inverse_rct(y: &mut [i32], u: &mut [i32], v: &mut [i32], s: &[ShiftInfo; 3]) {
        for ((y, u), v) in y.iter_mut().zip(u.iter_mut()).zip(v.iter_mut()) {
            let g = y.wrapping_sub(u.wrapping_add(*v) >> 2);
            let r = v.wrapping_add(g);
            let b = u.wrapping_add(g);

            *y = shift_clamp(r, &s[0]);
            *u = shift_clamp(g, &s[1]);
            *v = shift_clamp(b, &s[2]);
        }
    }

    // See G.3.
    pub(super) fn inverse_ict(y: &mut [f32], u: &mut [f32], v: &mut [f32], s: &[ShiftInfo; 3]) {
        for ((y, u), v) in y.iter_mut().zip(u.iter_mut()).zip(v.iter_mut()) {
            let r = *y + *v * 1.402;
            let g = (*y - *u * 0.34413) - *v * 0.71414;
            let b = *y + *u * 1.772;

            store_int(y, round_shift_clamp(r, &s[0]));
            store_int(u, round_shift_clamp(g, &s[1]));
            store_int(v, round_shift_clamp(b, &s[2]));
        }
    }

    pub(super) fn forward_shift_int(plane: &mut [i32], s: &ShiftInfo) {
        for v in plane {
            *v = v.wrapping_add(s.shift);
        }
    }

    pub(super) fn forward_shift_float(plane: &mut [i32], s: &ShiftInfo) {
        for v in plane {
            let f = v.wrapping_add(s.shift) as f32;
            store_float(v, f);
        }
    }

    pub(super) fn forward_rct(r: &mut [i32], g: &mut [i32], b: &mut [i32], s: &[ShiftInfo; 3]) {
        for ((r, g), b) in r.iter_mut().zip(g.iter_mut()).zip(b.iter_mut()) {
            let rv = r.wrapping_add(s[0].shift);
            let gv = g.wrapping_add(s[1].shift);
            let bv = b.wrapping_add(s[2].shift);

            *r = gv.wrapping_add(gv).wrapping_add(bv).wrapping_add(rv) >> 2;
            *g = bv.wrapping_sub(gv);
            *b = rv.wrapping_sub(gv);
        }
    }

    pub(super) fn forward_ict(r: &mut [i32], g: &mut [i32], b: &mut [i32], s: &[ShiftInfo; 3]) {
        for ((r, g), b) in r.iter_mut().zip(g.iter_mut()).zip(b.iter_mut()) {
            let rv = r.wrapping_add(s[0].shift) as f32;
            let gv = g.wrapping_add(s[1].shift) as f32;
            let bv = b.wrapping_add(s[2].shift) as f32;

            let y = (rv * A_R + gv * A_G) + bv * A_B;
            let u = (bv - y) * CB;
            let v = (rv - y) * CR;

            store_float(r, y);
            store_float(g, u);
            store_float(b, v);
        }
    }
}

mod vector {
    use super::*;

    fn split_point(len: usize) -> usize {
        len - len % SIMD_WIDTH
    }

    pub(super) fn inverse_shift_int(plane: &mut [i32], s: &ShiftInfo) {
        let (head, tail) = plane.split_at_mut(split_point(plane.len()));

        for c in head.chunks_exact_mut(SIMD_WIDTH) {
            i32x8::from_slice(c)
                .shift_clamp(s.shift, s.min, s.max)
                .store(c);
        }

        scalar::inverse_shift_int(tail, s);
    }

    pub(super) fn inverse_shift_float(plane: &mut [f32], s: &ShiftInfo) {
        dispatch!(Level::new(), simd => inverse_shift_float_impl(simd, plane, s));
    }

    #[inline(always)]
    fn inverse_shift_float_impl<S: Simd>(simd: S, plane: &mut [f32], s: &ShiftInfo) {
        let (head, tail) = plane.split_at_mut(split_point(plane.len()));

        for c in head.chunks_exact_mut(SIMD_WIDTH) {
            let v = f32x8::from_slice(simd, c);
            store_rounded(v, s, c);
        }

        scalar::inverse_shift_float(tail, s);
    }

    #[inline(always)]
    fn store_rounded<S: Simd>(v: f32x8<S>, s: &ShiftInfo, out: &mut [f32]) {
        for (o, v) in out.iter_mut().zip(v.to_array()) {
            store_int(o, round_shift_clamp(v, s));
        }
    }

    pub(super) fn inverse_rct(y: &mut [i32], u: &mut [i32], v: &mut [i32], s: &[ShiftInfo; 3]) {
        let split = split_point(y.len());
        let (y, y_tail) = y.split_at_mut(split);
        let (u, u_tail) = u.split_at_mut(split);
        let (v, v_tail) = v.split_at_mut(split);

        for ((y, u), v) in y
            .chunks_exact_mut(SIMD_WIDTH)
            .zip(u.chunks_exact_mut(SIMD_WIDTH))
            .zip(v.chunks_exact_mut(SIMD_WIDTH))
        {
            let y_0 = i32x8::from_slice(y);
            let y_1 = i32x8::from_slice(u);
            let y_2 = i32x8::from_slice(v);

            let g = y_0 - ((y_1 + y_2) >> 2);
            let r = y_2 + g;
            let b = y_1 + g;

            r.shift_clamp(s[0].shift, s[0].min, s[0].max).store(y);
            g.shift_clamp(s[1].shift, s[1].min, s[1].max).store(u);
            b.shift_clamp(s[2].shift, s[2].min, s[2].max).store(v);
        }

        scalar::inverse_rct(y_tail, u_tail, v_tail, s);
    }

    pub(super) fn inverse_ict(y: &mut [f32], u: &mut [f32], v: &mut [f32], s: &[ShiftInfo; 3]) {
        dispatch!(Level::new(), simd => inverse_ict_impl(simd, y, u, v, s));
    }

    #[inline(always)]
    fn inverse_ict_impl<S: Simd>(
        simd: S,
        y: &mut [f32],
        u: &mut [f32],
        v: &mut [f32],
        s: &[ShiftInfo; 3],
    ) {
        let split = split_point(y.len());
        let (y, y_tail) = y.split_at_mut(split);
        let (u, u_tail) = u.split_at_mut(split);
        let (v, v_tail) = v.split_at_mut(split);

        for ((y, u), v) in y
            .chunks_exact_mut(SIMD_WIDTH)
            .zip(u.chunks_exact_mut(SIMD_WIDTH))
            .zip(v.chunks_exact_mut(SIMD_WIDTH))
        {
            let y_0 = f32x8::from_slice(simd, y);
            let y_1 = f32x8::from_slice(simd, u);
            let y_2 = f32x8::from_slice(simd, v);

            let r = y_0 + y_2 * 1.402;
            let g = (y_0 - y_1 * 0.34413) - y_2 * 0.71414;
            let b = y_0 + y_1 * 1.772;

            store_rounded(r, &s[0], y);
            store_rounded(g, &s[1], u);
            store_rounded(b, &s[2], v);
        }

        scalar::inverse_ict(y_tail, u_tail, v_tail, s);
    }

    pub(super) fn forward_shift_int(plane: &mut [i32], s: &ShiftInfo) {
        let (head, tail) = plane.split_at_mut(split_point(plane.len()));
        let shift = i32x8::splat(s.shift);

        for c in head.chunks_exact_mut(SIMD_WIDTH) {
            (i32x8::from_slice(c) + shift).store(c);
        }

        scalar::forward_shift_int(tail, s);
    }

    pub(super) fn forward_shift_float(plane: &mut [i32], s: &ShiftInfo) {
        let (head, tail) = plane.split_at_mut(split_point(plane.len()));
        let shift = i32x8::splat(s.shift);

        for c in head.chunks_exact_mut(SIMD_WIDTH) {
            let v = (i32x8::from_slice(c) + shift).to_array();

            for (o, v) in c.iter_mut().zip(v) {
                store_float(o, v as f32);
            }
        }

        scalar::forward_shift_float(tail, s);
    }

    pub(super) fn forward_rct(r: &mut [i32], g: &mut [i32], b: &mut [i32], s: &[ShiftInfo; 3]) {
        let split = split_point(r.len());
        let (r, r_tail) = r.split_at_mut(split);
        let (g, g_tail) = g.split_at_mut(split);
        let (b, b_tail) = b.split_at_mut(split);

        let (s0, s1, s2) = (
            i32x8::splat(s[0].shift),
            i32x8::splat(s[1].shift),
            i32x8::splat(s[2].shift),
        );

        for ((r, g), b) in r
            .chunks_exact_mut(SIMD_WIDTH)
            .zip(g.chunks_exact_mut(SIMD_WIDTH))
            .zip(b.chunks_exact_mut(SIMD_WIDTH))
        {
            let rv = i32x8::from_slice(r) + s0;
            let gv = i32x8::from_slice(g) + s1;
            let bv = i32x8::from_slice(b) + s2;

            ((gv + gv + bv + rv) >> 2).store(r);
            (bv - gv).store(g);
            (rv - gv).store(b);
        }

        scalar::forward_rct(r_tail, g_tail, b_tail, s);
    }

    pub(super) fn forward_ict(r: &mut [i32], g: &mut [i32], b: &mut [i32], s: &[ShiftInfo; 3]) {
        dispatch!(Level::new(), simd => forward_ict_impl(simd, r, g, b, s));
    }

    #[inline(always)]
    fn forward_ict_impl<S: Simd>(
        simd: S,
        r: &mut [i32],
        g: &mut [i32],
        b: &mut [i32],
        s: &[ShiftInfo; 3],
    ) {
        let split = split_point(r.len());
        let (r, r_tail) = r.split_at_mut(split);
        let (g, g_tail) = g.split_at_mut(split);
        let (b, b_tail) = b.split_at_mut(split);

        let to_float = |c: &[i32], shift: i32| {
            let lanes = (i32x8::from_slice(c) + i32x8::splat(shift)).to_array();
            f32x8::from_slice(simd, &lanes.map(|v| v as f32))
        };

        for ((r, g), b) in r
            .chunks_exact_mut(SIMD_WIDTH)
            .zip(g.chunks_exact_mut(SIMD_WIDTH))
            .zip(b.chunks_exact_mut(SIMD_WIDTH))
        {
            let rv = to_float(&*r, s[0].shift);
            let gv = to_float(&*g, s[1].shift);
            let bv = to_float(&*b, s[2].shift);

            let y = (rv * A_R + gv * A_G) + bv * A_B;
            let u = (bv - y) * CB;
            let v = (rv - y) * CR;

            for (out, lanes) in [(r, y), (g, u), (b, v)] {
                for (o, v) in out.iter_mut().zip(lanes.to_array()) {
                    store_float(o, v);
                }
            }
        }

        scalar::forward_ict(r_tail, g_tail, b_tail, s);
    }
}

/// Reinterpret a plane that holds integer samples as `f32` bit patterns.
pub fn as_samples(plane: &[f32]) -> &[i32] {
    bytemuck::cast_slice(plane)
}

/// Reinterpret a plane that holds `f32` coefficients as integer bit
/// patterns.
pub fn as_coefficients(plane: &[i32]) -> &[f32] {
    bytemuck::cast_slice(plane)
}

/// The synthesis norms of the built-in component transform.
pub fn norms(reversible: bool) -> &'static [f64; 3] {
    if reversible {
        &REVERSIBLE_NORMS
    } else {
        &IRREVERSIBLE_NORMS
    }
}

/// Compute the norms of the columns of a custom `n x n` transform matrix,
/// given in row-major order.
pub fn calculate_norms(matrix: &[f32], n: usize) -> Result<Vec<f64>> {
    if matrix.len() != n * n {
        bail!(TransformError::InvalidMatrix);
    }

    Ok((0..n)
        .map(|col| {
            (0..n)
                .map(|row| {
                    let v = matrix[row * n + col] as f64;
                    v * v
                })
                .sum::<f64>()
                .sqrt()
        })
        .collect())
}

#[inline(always)]
fn fix_mul(a: i32, b: i32) -> i32 {
    ((a as i64 * b as i64 + (1 << (FIX_BITS - 1))) >> FIX_BITS) as i32
}

/// Apply the DC level shift and a custom forward transform matrix, given in
/// row-major order, to integer planes.
///
/// The coefficients of the matrix are truncated towards zero to 13-bit fixed
/// point. The DC level shift is applied to all inputs before the matrix.
pub fn compress_custom(
    matrix: &[f32],
    planes: &mut [&mut [i32]],
    shifts: &[ShiftInfo],
) -> Result<()> {
    let n = planes.len();

    if matrix.len() != n * n {
        bail!(TransformError::InvalidMatrix);
    }

    if shifts.len() != n {
        bail!(TransformError::ComponentMismatch);
    }

    let len = planes.first().map(|p| p.len()).unwrap_or(0);

    if planes.iter().any(|p| p.len() != len) {
        bail!(TransformError::PlaneSizeMismatch);
    }

    let fixed: Vec<i32> = matrix
        .iter()
        .map(|m| (m * (1 << FIX_BITS) as f32) as i32)
        .collect();
    let mut input = vec![0_i32; n];

    for i in 0..len {
        for (k, (plane, shift)) in planes.iter().zip(shifts).enumerate() {
            input[k] = plane[i].wrapping_add(shift.shift);
        }

        for (j, plane) in planes.iter_mut().enumerate() {
            plane[i] = fixed[j * n..(j + 1) * n]
                .iter()
                .zip(&input)
                .fold(0_i32, |acc, (m, v)| acc.wrapping_add(fix_mul(*m, *v)));
        }
    }

    Ok(())
}

/// Apply a custom inverse transform matrix, given in row-major order, to
/// floating point planes. The DC level shift is not applied.
pub fn decompress_custom(matrix: &[f32], planes: &mut [&mut [f32]]) -> Result<()> {
    let n = planes.len();

    if matrix.len() != n * n {
        bail!(TransformError::InvalidMatrix);
    }

    let len = planes.first().map(|p| p.len()).unwrap_or(0);

    if planes.iter().any(|p| p.len() != len) {
        bail!(TransformError::PlaneSizeMismatch);
    }

    let mut input = vec![0.0_f32; n];

    for i in 0..len {
        for (k, plane) in planes.iter().enumerate() {
            input[k] = plane[i];
        }

        for (j, plane) in planes.iter_mut().enumerate() {
            plane[i] = matrix[j * n..(j + 1) * n]
                .iter()
                .zip(&input)
                .fold(0.0, |acc, (m, v)| acc + m * v);
        }
    }

    Ok(())
}
