//! Eight-lane vector types used by the transform kernels.
//!
//! With the `simd` feature, `f32x8` wraps the `fearless_simd` type of the
//! detected target level. Without it, the lanes are emulated with plain
//! arrays. Neither variant fuses multiplications and additions, so every lane
//! produces exactly what the scalar expression in the same order would.

use core::ops::{Add, Shr, Sub};

pub(crate) const SIMD_WIDTH: usize = 8;

#[cfg(feature = "simd")]
mod inner {
    use super::SIMD_WIDTH;
    use core::ops::{Add, Mul, Sub};
    use fearless_simd::SimdBase;

    pub(crate) use fearless_simd::{Level, Simd, dispatch};

    #[derive(Copy, Clone)]
    #[allow(non_camel_case_types)]
    #[repr(C, align(32))]
    pub(crate) struct f32x8<S: Simd> {
        inner: fearless_simd::f32x8<S>,
    }

    impl<S: Simd> f32x8<S> {
        #[inline(always)]
        pub(crate) fn from_slice(simd: S, slice: &[f32]) -> Self {
            Self {
                inner: fearless_simd::f32x8::from_slice(simd, &slice[..SIMD_WIDTH]),
            }
        }

        #[inline(always)]
        pub(crate) fn splat(simd: S, value: f32) -> Self {
            Self {
                inner: fearless_simd::f32x8::splat(simd, value),
            }
        }

        #[inline(always)]
        pub(crate) fn to_array(self) -> [f32; SIMD_WIDTH] {
            let mut out = [0.0; SIMD_WIDTH];
            self.inner.store_slice(&mut out);
            out
        }
    }

    impl<S: Simd> Add for f32x8<S> {
        type Output = Self;
        #[inline(always)]
        fn add(self, rhs: Self) -> Self {
            Self {
                inner: self.inner + rhs.inner,
            }
        }
    }

    impl<S: Simd> Sub for f32x8<S> {
        type Output = Self;
        #[inline(always)]
        fn sub(self, rhs: Self) -> Self {
            Self {
                inner: self.inner - rhs.inner,
            }
        }
    }

    impl<S: Simd> Mul for f32x8<S> {
        type Output = Self;
        #[inline(always)]
        fn mul(self, rhs: Self) -> Self {
            Self {
                inner: self.inner * rhs.inner,
            }
        }
    }

    impl<S: Simd> Mul<f32> for f32x8<S> {
        type Output = Self;
        #[inline(always)]
        fn mul(self, rhs: f32) -> Self {
            Self {
                inner: self.inner * rhs,
            }
        }
    }
}

#[cfg(not(feature = "simd"))]
mod inner {
    use super::SIMD_WIDTH;
    use core::marker::PhantomData;
    use core::ops::{Add, Mul, Sub};

    pub(crate) trait Simd: Copy + Clone {}

    #[derive(Copy, Clone)]
    pub(crate) struct ScalarSimd;
    impl Simd for ScalarSimd {}

    pub(crate) struct Level;
    impl Level {
        #[inline(always)]
        pub(crate) fn new() -> Self {
            Level
        }
    }

    #[derive(Copy, Clone)]
    #[allow(non_camel_case_types)]
    #[repr(C, align(32))]
    pub(crate) struct f32x8<S: Simd> {
        val: [f32; SIMD_WIDTH],
        _marker: PhantomData<S>,
    }

    impl<S: Simd> f32x8<S> {
        #[inline(always)]
        fn from_array(val: [f32; SIMD_WIDTH]) -> Self {
            Self {
                val,
                _marker: PhantomData,
            }
        }

        #[inline(always)]
        fn zip_with(self, rhs: Self, f: impl Fn(f32, f32) -> f32) -> Self {
            Self::from_array(core::array::from_fn(|i| f(self.val[i], rhs.val[i])))
        }

        #[inline(always)]
        pub(crate) fn from_slice(_simd: S, slice: &[f32]) -> Self {
            let mut val = [0.0_f32; SIMD_WIDTH];
            val.copy_from_slice(&slice[..SIMD_WIDTH]);
            Self::from_array(val)
        }

        #[inline(always)]
        pub(crate) fn splat(_simd: S, value: f32) -> Self {
            Self::from_array([value; SIMD_WIDTH])
        }

        #[inline(always)]
        pub(crate) fn to_array(self) -> [f32; SIMD_WIDTH] {
            self.val
        }
    }

    impl<S: Simd> Add for f32x8<S> {
        type Output = Self;
        #[inline(always)]
        fn add(self, rhs: Self) -> Self {
            self.zip_with(rhs, |a, b| a + b)
        }
    }

    impl<S: Simd> Sub for f32x8<S> {
        type Output = Self;
        #[inline(always)]
        fn sub(self, rhs: Self) -> Self {
            self.zip_with(rhs, |a, b| a - b)
        }
    }

    impl<S: Simd> Mul for f32x8<S> {
        type Output = Self;
        #[inline(always)]
        fn mul(self, rhs: Self) -> Self {
            self.zip_with(rhs, |a, b| a * b)
        }
    }

    impl<S: Simd> Mul<f32> for f32x8<S> {
        type Output = Self;
        #[inline(always)]
        fn mul(self, rhs: f32) -> Self {
            Self::from_array(self.val.map(|a| a * rhs))
        }
    }

    /// Scalar fallback for SIMD dispatch.
    #[doc(hidden)]
    #[macro_export]
    macro_rules! j2k_tile_simd_dispatch {
        ($level:expr, $simd:ident => $body:expr) => {{
            let _ = $level;
            let $simd = $crate::math::ScalarSimd;
            $body
        }};
    }

    pub(crate) use j2k_tile_simd_dispatch as dispatch;
}

pub(crate) use inner::*;

/// Eight integer lanes.
///
/// Plain arrays are enough here, the compiler turns the lane loops into
/// vector instructions on its own.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(non_camel_case_types)]
#[repr(C, align(32))]
pub(crate) struct i32x8([i32; SIMD_WIDTH]);

impl i32x8 {
    #[inline(always)]
    pub(crate) fn from_slice(slice: &[i32]) -> Self {
        let mut val = [0; SIMD_WIDTH];
        val.copy_from_slice(&slice[..SIMD_WIDTH]);
        Self(val)
    }

    #[inline(always)]
    pub(crate) fn splat(value: i32) -> Self {
        Self([value; SIMD_WIDTH])
    }

    #[inline(always)]
    pub(crate) fn store(self, slice: &mut [i32]) {
        slice[..SIMD_WIDTH].copy_from_slice(&self.0);
    }

    /// Add `shift` to every lane and clamp the result to `[min, max]`.
    #[inline(always)]
    pub(crate) fn shift_clamp(self, shift: i32, min: i32, max: i32) -> Self {
        Self(self.0.map(|v| v.saturating_add(shift).clamp(min, max)))
    }

    #[inline(always)]
    pub(crate) fn to_array(self) -> [i32; SIMD_WIDTH] {
        self.0
    }
}

impl Add for i32x8 {
    type Output = Self;
    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        Self(core::array::from_fn(|i| self.0[i].wrapping_add(rhs.0[i])))
    }
}

impl Sub for i32x8 {
    type Output = Self;
    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        Self(core::array::from_fn(|i| self.0[i].wrapping_sub(rhs.0[i])))
    }
}

impl Shr<u32> for i32x8 {
    type Output = Self;
    #[inline(always)]
    fn shr(self, rhs: u32) -> Self {
        Self(self.0.map(|v| v >> rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_lanes() {
        let a = i32x8::from_slice(&[1, -2, 3, -4, 5, -6, 7, -8]);
        let b = i32x8::splat(3);

        assert_eq!((a + b).to_array(), [4, 1, 6, -1, 8, -3, 10, -5]);
        assert_eq!((a - b).to_array(), [-2, -5, 0, -7, 2, -9, 4, -11]);
        // Arithmetic shift rounds towards negative infinity.
        assert_eq!((a >> 1).to_array(), [0, -1, 1, -2, 2, -3, 3, -4]);
        assert_eq!(
            a.shift_clamp(2, 0, 6).to_array(),
            [3, 0, 5, 0, 6, 0, 6, 0]
        );
    }

    #[test]
    fn float_lanes_match_scalar() {
        let values = [0.5_f32, -1.25, 3.0, 100.75, -7.5, 0.1, 2.2, 9.9];

        dispatch!(Level::new(), simd => {
            let v = f32x8::from_slice(simd, &values);
            let r = (v * 1.402 + f32x8::splat(simd, 0.3)) - v * v;
            let expected: [f32; 8] = core::array::from_fn(|i| {
                (values[i] * 1.402 + 0.3) - values[i] * values[i]
            });

            assert_eq!(r.to_array(), expected);
        });
    }
}
