//! Derivative-path filter adapters.
//!
//! The regulator never owns a filter. It borrows one mutably for the duration of
//! [`Pid::update_filtered`](crate::Pid::update_filtered) and consumes the value
//! returned by [`DerivativeFilter::update`]. Anything implementing the trait can
//! sit on the derivative path; two small adapters are provided:
//!
//! - [`FirFilter`]: finite impulse response, fixed window held in a ring buffer
//! - [`IirFilter`]: direct-form-I biquad, recursive
//!
//! Both keep their history in fixed-size arrays, so nothing is allocated at
//! construction or during updates and the storage is released with the value.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use num_traits::{Float, NumCast};

use crate::PidError;

/// A causal filter advanced once per regulator sample.
///
/// Implementations must run in bounded time (O(order) or O(1)) and must not
/// allocate.
pub trait DerivativeFilter<T: Float> {
    /// Push a raw sample and return the filtered value.
    fn update(&mut self, sample: T) -> T;
}

impl<T: Float, F: FnMut(T) -> T> DerivativeFilter<T> for F {
    fn update(&mut self, sample: T) -> T {
        self(sample)
    }
}

// ============================================================================
// FIR
// ============================================================================

/// Finite impulse response filter with `N` taps (order `N - 1`).
///
/// History is a ring buffer with a single write cursor. The cursor is advanced
/// and wrapped before each write, so the slot written is always the oldest
/// sample in the window.
#[derive(Debug, Clone)]
pub struct FirFilter<T: Float, const N: usize> {
    /// Coefficients, `coeffs[k]` weights the sample `k` steps in the past
    coeffs: [T; N],
    /// Raw sample history
    history: [T; N],
    /// Index of the most recent sample
    cursor: usize,
}

impl<T: Float, const N: usize> FirFilter<T, N> {
    /// Create a filter from its coefficients. History starts zeroed.
    pub fn new(coeffs: [T; N]) -> Result<Self, PidError> {
        if N == 0 {
            log::warn!("FIR filter rejected: no taps");
            return Err(PidError::EmptyFilter);
        }
        Ok(Self {
            coeffs,
            history: [T::zero(); N],
            // First write lands on slot 0
            cursor: N - 1,
        })
    }

    /// Equal-weight moving average over the last `N` samples
    pub fn moving_average() -> Result<Self, PidError> {
        // N == 0 falls through to `new`, which rejects it
        let weight = T::one() / <T as NumCast>::from(N.max(1)).unwrap_or_else(T::one);
        Self::new([weight; N])
    }

    /// Filter order (number of taps minus one)
    pub fn order(&self) -> usize {
        N - 1
    }

    pub fn coefficients(&self) -> &[T; N] {
        &self.coeffs
    }

    /// Clear the sample history
    pub fn reset(&mut self) {
        self.history = [T::zero(); N];
        self.cursor = N - 1;
    }
}

impl<T: Float, const N: usize> DerivativeFilter<T> for FirFilter<T, N> {
    fn update(&mut self, sample: T) -> T {
        self.cursor = (self.cursor + 1) % N;
        self.history[self.cursor] = sample;

        // y[n] = sum b[k] * x[n - k], walking the ring backwards from the cursor
        let mut acc = T::zero();
        let mut idx = self.cursor;
        for &b in self.coeffs.iter() {
            acc = acc + b * self.history[idx];
            idx = if idx == 0 { N - 1 } else { idx - 1 };
        }
        acc
    }
}

// ============================================================================
// IIR
// ============================================================================

/// Second order IIR section in direct form I.
///
/// `a0*y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]`
///
/// Coefficients are normalized by `a0` at construction. Construction fails
/// unless both poles lie strictly inside the unit circle.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct IirFilter<T: Float> {
    b: [T; 3],
    a: [T; 2],
    x: [T; 2],
    y: [T; 2],
}

impl<T: Float> IirFilter<T> {
    /// Build a biquad from feed-forward `b` and feedback `a` coefficients.
    pub fn new(b: [T; 3], a: [T; 3]) -> Result<Self, PidError> {
        let a0 = a[0];
        if a0 == T::zero() || !a0.is_finite() {
            log::warn!("IIR filter rejected: a0 must be finite and non-zero");
            return Err(PidError::UnstableFilter);
        }
        let (a1, a2) = (a[1] / a0, a[2] / a0);
        // Stability triangle for z^2 + a1*z + a2
        if !(a2.abs() < T::one() && a1.abs() < T::one() + a2) {
            log::warn!("IIR filter rejected: pole on or outside the unit circle");
            return Err(PidError::UnstableFilter);
        }
        Ok(Self {
            b: [b[0] / a0, b[1] / a0, b[2] / a0],
            a: [a1, a2],
            x: [T::zero(); 2],
            y: [T::zero(); 2],
        })
    }

    /// Exponential smoother `y[n] = alpha*x[n] + (1 - alpha)*y[n-1]`.
    ///
    /// `alpha` must lie in `(0, 1]`; `1` passes samples through unchanged.
    pub fn single_pole_lowpass(alpha: T) -> Result<Self, PidError> {
        if !(alpha > T::zero() && alpha <= T::one()) {
            log::warn!("IIR filter rejected: smoothing factor outside (0, 1]");
            return Err(PidError::UnstableFilter);
        }
        Self::new(
            [alpha, T::zero(), T::zero()],
            [T::one(), alpha - T::one(), T::zero()],
        )
    }

    /// Clear input and output history
    pub fn reset(&mut self) {
        self.x = [T::zero(); 2];
        self.y = [T::zero(); 2];
    }
}

impl<T: Float> DerivativeFilter<T> for IirFilter<T> {
    fn update(&mut self, sample: T) -> T {
        let y = self.b[0] * sample + self.b[1] * self.x[0] + self.b[2] * self.x[1]
            - self.a[0] * self.y[0]
            - self.a[1] * self.y[1];

        self.x = [sample, self.x[0]];
        self.y = [y, self.y[0]];
        y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fir_rejects_zero_taps() {
        let result = FirFilter::<f64, 0>::new([]);
        assert_eq!(result.err(), Some(PidError::EmptyFilter));
        assert_eq!(
            FirFilter::<f64, 0>::moving_average().err(),
            Some(PidError::EmptyFilter)
        );
    }

    #[test]
    fn test_fir_impulse_response_is_coefficients() {
        let mut fir = FirFilter::new([0.5, 0.3, 0.2]).unwrap();
        assert_eq!(fir.order(), 2);

        assert_eq!(fir.update(1.0), 0.5);
        assert_eq!(fir.update(0.0), 0.3);
        assert_eq!(fir.update(0.0), 0.2);
        // Impulse has left the window
        assert_eq!(fir.update(0.0), 0.0);
    }

    #[test]
    fn test_fir_overwrites_oldest_sample() {
        // Taps pick out x[n - 2] only
        let mut fir = FirFilter::new([0.0, 0.0, 1.0]).unwrap();
        let samples = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let mut outputs = [0.0; 7];
        for (out, &s) in outputs.iter_mut().zip(samples.iter()) {
            *out = fir.update(s);
        }
        assert_eq!(outputs, [0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_moving_average_settles() {
        let mut fir = FirFilter::<f32, 4>::moving_average().unwrap();
        let mut y = 0.0;
        for _ in 0..4 {
            y = fir.update(8.0);
        }
        assert!((y - 8.0).abs() < 1e-6);

        fir.reset();
        assert_eq!(fir.update(8.0), 2.0);
    }

    #[test]
    fn test_iir_rejects_zero_a0() {
        let result = IirFilter::new([1.0, 0.0, 0.0], [0.0, 0.5, 0.0]);
        assert!(matches!(result, Err(PidError::UnstableFilter)));
        assert!(IirFilter::single_pole_lowpass(0.0_f64).is_err());
        assert!(IirFilter::single_pole_lowpass(1.5_f64).is_err());
    }

    #[test]
    fn test_iir_rejects_unstable_poles() {
        // |a2| >= 1
        let result = IirFilter::new([1.0, 0.0, 0.0], [1.0, 0.0, 1.5]);
        assert_eq!(result.err(), Some(PidError::UnstableFilter));
        // Real pole at z = 1.2
        let result = IirFilter::new([1.0, 0.0, 0.0], [1.0, -1.2, 0.0]);
        assert_eq!(result.err(), Some(PidError::UnstableFilter));
        // Pure integrator sits on the unit circle
        let result = IirFilter::new([1.0, 0.0, 0.0], [1.0, -1.0, 0.0]);
        assert_eq!(result.err(), Some(PidError::UnstableFilter));
        // Same poles after scaling by a0
        let result = IirFilter::new([2.0, 0.0, 0.0], [2.0, -2.4, 0.0]);
        assert_eq!(result.err(), Some(PidError::UnstableFilter));

        // Lightly damped but stable resonator
        assert!(IirFilter::new([0.05, 0.0, 0.0], [1.0, -1.9, 0.95]).is_ok());
    }

    #[test]
    fn test_single_pole_lowpass_step() {
        let mut lp = IirFilter::single_pole_lowpass(0.5).unwrap();
        assert_eq!(lp.update(1.0), 0.5);
        assert_eq!(lp.update(1.0), 0.75);
        assert_eq!(lp.update(1.0), 0.875);

        lp.reset();
        assert_eq!(lp.update(1.0), 0.5);
    }

    #[test]
    fn test_iir_normalizes_by_a0() {
        let mut scaled = IirFilter::new([2.0, 0.0, 0.0], [2.0, -1.0, 0.0]).unwrap();
        let mut unit = IirFilter::new([1.0, 0.0, 0.0], [1.0, -0.5, 0.0]).unwrap();
        for s in [1.0, -2.0, 0.5, 3.0] {
            assert_eq!(scaled.update(s), unit.update(s));
        }
    }

    #[test]
    fn test_closure_as_filter() {
        let mut halve = |x: f64| x * 0.5;
        assert_eq!(DerivativeFilter::update(&mut halve, 4.0), 2.0);
    }
}
