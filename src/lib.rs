//! # Trapezoidal PID Regulator Core
//!
//! A fixed-rate PID regulator for periodic embedded control loops (motor
//! current, thermal plants, servo position). Each call to [`Pid::update`]
//! consumes one error sample and the sampling interval and returns one bounded
//! control output.
//!
//! ## Key Features
//! - **Trapezoidal integration** of the error signal
//! - **Anti-windup** by clamping the integral state to configured bounds
//! - **Filtered derivative** through any [`DerivativeFilter`] (FIR, IIR, closure)
//! - **Output saturation** to actuator-safe bounds
//! - **One generic implementation** for `f32` and `f64`
//! - **No allocation** on any path, `no_std` without the `std` feature
//!
//! ```
//! use trapezoid_pid::{FirFilter, PidBuilder};
//!
//! let mut pid = PidBuilder::new()
//!     .gains(1.2, 0.4, 0.05)
//!     .output_limits(-10.0, 10.0)
//!     .windup_limits(-2.0, 2.0)
//!     .build()
//!     .unwrap();
//! let mut smoothing = FirFilter::<f64, 4>::moving_average().unwrap();
//!
//! let out = pid.update_filtered(0.8, 0.01, &mut smoothing).unwrap();
//! assert!(out.output <= 10.0);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use core::fmt;
use num_traits::{Float, NumCast};

pub mod filter;

pub use filter::{DerivativeFilter, FirFilter, IirFilter};

/// Errors reported by configuration, construction and per-sample calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum PidError {
    /// A lower bound is above its upper bound, or a bound is NaN
    #[error("lower bound exceeds upper bound or a bound is NaN")]
    InvertedBounds,
    /// Sampling interval is zero, negative or not finite
    #[error("sampling interval must be finite and strictly positive")]
    InvalidTimeStep,
    /// Error sample is NaN or infinite
    #[error("error sample must be finite")]
    NonFiniteInput,
    /// Integral or output is not finite after the update
    #[error("integral or output is not finite")]
    NumericOverflow,
    /// FIR filter built with no taps
    #[error("filter needs at least one tap")]
    EmptyFilter,
    /// IIR feedback coefficients are unusable or place a pole on or outside
    /// the unit circle
    #[error("filter feedback coefficients are not stable")]
    UnstableFilter,
}

fn as_f64<T: Float>(value: T) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

// ============================================================================
// Clamping
// ============================================================================

/// Bound `value` to `[min, max]`.
///
/// Fails with [`PidError::InvertedBounds`] instead of silently swapping an
/// inverted pair.
pub fn clamp<T: Float>(value: T, min: T, max: T) -> Result<T, PidError> {
    Ok(Limits::new(min, max)?.clamp(value))
}

/// A validated `[min, max]` pair, `min <= max`, neither bound NaN.
///
/// Infinite bounds are allowed; [`Limits::unbounded`] is the disabled state.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(try_from = "(T, T)", into = "(T, T)"))]
pub struct Limits<T: Float> {
    min: T,
    max: T,
}

impl<T: Float> Limits<T> {
    pub fn new(min: T, max: T) -> Result<Self, PidError> {
        // Also false when either side is NaN
        if min <= max {
            Ok(Self { min, max })
        } else {
            Err(PidError::InvertedBounds)
        }
    }

    /// `[-inf, +inf]`
    pub fn unbounded() -> Self {
        Self {
            min: T::neg_infinity(),
            max: T::infinity(),
        }
    }

    pub fn min(&self) -> T {
        self.min
    }

    pub fn max(&self) -> T {
        self.max
    }

    /// True when at least one side is finite
    pub fn is_bounded(&self) -> bool {
        self.min.is_finite() || self.max.is_finite()
    }

    #[inline]
    pub fn clamp(&self, value: T) -> T {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }
}

impl<T: Float> Default for Limits<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T: Float> TryFrom<(T, T)> for Limits<T> {
    type Error = PidError;

    fn try_from((min, max): (T, T)) -> Result<Self, Self::Error> {
        Self::new(min, max)
    }
}

impl<T: Float> From<Limits<T>> for (T, T) {
    fn from(limits: Limits<T>) -> Self {
        (limits.min, limits.max)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the regulator
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct PidConfig<T: Float> {
    /// Proportional gain
    pub kp: T,
    /// Integral gain
    pub ki: T,
    /// Derivative gain
    pub kd: T,
    /// Output saturation bounds
    pub output_limits: Limits<T>,
    /// Integral state bounds (anti-windup)
    pub windup_limits: Limits<T>,
}

impl<T: Float> Default for PidConfig<T> {
    fn default() -> Self {
        Self {
            kp: T::one(),
            ki: T::zero(),
            kd: T::zero(),
            output_limits: Limits::unbounded(),
            windup_limits: Limits::unbounded(),
        }
    }
}

/// Result of one regulator update
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct ControlOutput<T: Float> {
    /// Final control output, within the output limits
    pub output: T,
    /// Proportional contribution
    pub p: T,
    /// Integral state after anti-windup
    pub i: T,
    /// Derivative contribution
    pub d: T,
    /// Output clamping changed the value
    pub saturated: bool,
}

// ============================================================================
// Regulator
// ============================================================================

/// PID regulator state for one control loop.
///
/// Every update takes `&mut self`, so one instance can never have two updates
/// in flight. Give each loop its own instance.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct Pid<T: Float> {
    config: PidConfig<T>,

    /// Accumulated integral term (already multiplied by ki)
    integral: T,
    /// Previous raw error sample
    prev_input: T,
    /// Previous output of the derivative filter
    prev_filtered: T,

    update_count: u64,
    saturation_count: u64,
}

/// Single precision regulator
pub type Pid32 = Pid<f32>;
/// Double precision regulator
pub type Pid64 = Pid<f64>;

impl<T: Float> Pid<T> {
    /// Create a regulator from a configuration. State starts zeroed.
    pub fn new(config: PidConfig<T>) -> Self {
        Self {
            config,
            integral: T::zero(),
            prev_input: T::zero(),
            prev_filtered: T::zero(),
            update_count: 0,
            saturation_count: 0,
        }
    }

    /// Create a regulator with the given gains and no output or windup bounds
    pub fn with_gains(kp: T, ki: T, kd: T) -> Self {
        Self::new(PidConfig {
            kp,
            ki,
            kd,
            ..PidConfig::default()
        })
    }

    /// Set output saturation bounds.
    ///
    /// An inverted pair is rejected and the previous bounds stay in place.
    pub fn set_saturation(&mut self, min: T, max: T) -> Result<(), PidError> {
        let limits = Limits::new(min, max).inspect_err(|_| {
            log::warn!(
                "rejected output limits [{}, {}]",
                as_f64(min),
                as_f64(max)
            );
        })?;
        log::debug!("output limits set to [{}, {}]", as_f64(min), as_f64(max));
        self.config.output_limits = limits;
        Ok(())
    }

    /// Set integral state bounds.
    ///
    /// An inverted pair is rejected and the previous bounds stay in place. On
    /// success the current integral is pulled into the new range.
    pub fn set_anti_windup(&mut self, min: T, max: T) -> Result<(), PidError> {
        let limits = Limits::new(min, max).inspect_err(|_| {
            log::warn!(
                "rejected windup limits [{}, {}]",
                as_f64(min),
                as_f64(max)
            );
        })?;
        log::debug!("windup limits set to [{}, {}]", as_f64(min), as_f64(max));
        self.config.windup_limits = limits;
        self.integral = limits.clamp(self.integral);
        Ok(())
    }

    /// Re-tune the gains. The integral state is kept as is, it already carries
    /// the old ki so there is no output jump.
    pub fn set_gains(&mut self, kp: T, ki: T, kd: T) {
        log::debug!(
            "gains set to kp={} ki={} kd={}",
            as_f64(kp),
            as_f64(ki),
            as_f64(kd)
        );
        self.config.kp = kp;
        self.config.ki = ki;
        self.config.kd = kd;
    }

    /// Replace the whole configuration (online tuning)
    pub fn update_config(&mut self, config: PidConfig<T>) {
        log::debug!("configuration replaced");
        self.config = config;
        self.integral = config.windup_limits.clamp(self.integral);
    }

    /// Get current configuration
    pub fn config(&self) -> &PidConfig<T> {
        &self.config
    }

    /// Compute the control output for one sample, derivative on the raw error.
    ///
    /// `dt` is the time since the previous call and must be strictly positive.
    /// On error nothing is updated.
    pub fn update(&mut self, input: T, dt: T) -> Result<ControlOutput<T>, PidError> {
        self.check_sample(input, dt)?;

        let d = self.derivative(input, self.prev_input, dt);

        self.finish(input, dt, d, None)
    }

    /// Compute the control output for one sample, derivative on the filtered
    /// error.
    ///
    /// The filter is not advanced when `input` or `dt` is rejected. It has
    /// already been advanced when the result is rejected as non-finite, the
    /// regulator state is left untouched in both cases. The derivative is
    /// scaled by `1 / dt` just like [`Pid::update`], so an identity filter
    /// gives the same output.
    pub fn update_filtered<F>(
        &mut self,
        input: T,
        dt: T,
        filter: &mut F,
    ) -> Result<ControlOutput<T>, PidError>
    where
        F: DerivativeFilter<T> + ?Sized,
    {
        self.check_sample(input, dt)?;

        let filtered = filter.update(input);
        let d = self.derivative(filtered, self.prev_filtered, dt);

        self.finish(input, dt, d, Some(filtered))
    }

    fn check_sample(&self, input: T, dt: T) -> Result<(), PidError> {
        if !(dt > T::zero() && dt.is_finite()) {
            log::warn!("rejected sampling interval {}", as_f64(dt));
            return Err(PidError::InvalidTimeStep);
        }
        if !input.is_finite() {
            log::warn!("rejected error sample {}", as_f64(input));
            return Err(PidError::NonFiniteInput);
        }
        Ok(())
    }

    /// Each sample is scaled before the difference so a zero kd stays zero
    /// for any pair of finite samples.
    #[inline]
    fn derivative(&self, current: T, previous: T, dt: T) -> T {
        (current * self.config.kd - previous * self.config.kd) / dt
    }

    /// Proportional and integral terms, sum, saturation, state commit.
    ///
    /// Nothing is committed when the integral or the output is not finite.
    fn finish(
        &mut self,
        input: T,
        dt: T,
        d: T,
        filtered: Option<T>,
    ) -> Result<ControlOutput<T>, PidError> {
        let half = T::one() / (T::one() + T::one());

        let p = input * self.config.kp;

        // Trapezoid between the previous and current sample, halved per sample
        // so the sum of two finite samples cannot overflow
        let area = input * half + self.prev_input * half;
        let integral = self
            .config
            .windup_limits
            .clamp(self.integral + area * self.config.ki * dt);

        let unbounded = p + integral + d;
        let output = self.config.output_limits.clamp(unbounded);

        if !integral.is_finite() || !output.is_finite() {
            log::warn!(
                "rejected sample {}: integral {} output {}",
                as_f64(input),
                as_f64(integral),
                as_f64(output)
            );
            return Err(PidError::NumericOverflow);
        }
        let saturated = output != unbounded;

        self.integral = integral;
        self.prev_input = input;
        if let Some(filtered) = filtered {
            self.prev_filtered = filtered;
        }
        self.update_count += 1;
        if saturated {
            self.saturation_count += 1;
        }

        Ok(ControlOutput {
            output,
            p,
            i: integral,
            d,
            saturated,
        })
    }

    /// Reset all internal state, configuration is kept
    pub fn reset(&mut self) {
        self.integral = T::zero();
        self.prev_input = T::zero();
        self.prev_filtered = T::zero();
    }

    /// Manual integral preload (for bumpless transfer), clamped to the windup
    /// limits
    pub fn preload_integral(&mut self, value: T) {
        self.integral = self.config.windup_limits.clamp(value);
    }

    /// Current integral state
    pub fn integral(&self) -> T {
        self.integral
    }

    /// Get diagnostic information
    pub fn diagnostics(&self) -> PidDiagnostics<T> {
        let ratio = if self.update_count > 0 {
            let saturated = <T as NumCast>::from(self.saturation_count).unwrap_or_else(T::zero);
            let total = <T as NumCast>::from(self.update_count).unwrap_or_else(T::one);
            saturated / total
        } else {
            T::zero()
        };

        PidDiagnostics {
            update_count: self.update_count,
            saturation_count: self.saturation_count,
            saturation_ratio: ratio,
            current_integral: self.integral,
        }
    }
}

/// Diagnostic counters
#[derive(Debug, Clone, Copy)]
pub struct PidDiagnostics<T: Float> {
    /// Successful updates
    pub update_count: u64,
    /// Updates whose output was clamped
    pub saturation_count: u64,
    /// Ratio of saturated outputs
    pub saturation_ratio: T,
    /// Current integral value
    pub current_integral: T,
}

impl<T: Float + fmt::Display> fmt::Display for PidDiagnostics<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PID Diagnostics:\n\
             Updates: {}\n\
             Saturations: {} ({:.2}%)\n\
             Current Integral: {}",
            self.update_count,
            self.saturation_count,
            as_f64(self.saturation_ratio) * 100.0,
            self.current_integral
        )
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Fluent construction with bounds validated once in [`PidBuilder::build`]
pub struct PidBuilder<T: Float> {
    kp: T,
    ki: T,
    kd: T,
    output: (T, T),
    windup: (T, T),
}

impl<T: Float> PidBuilder<T> {
    pub fn new() -> Self {
        let unbounded = (T::neg_infinity(), T::infinity());
        Self {
            kp: T::one(),
            ki: T::zero(),
            kd: T::zero(),
            output: unbounded,
            windup: unbounded,
        }
    }

    pub fn gains(mut self, kp: T, ki: T, kd: T) -> Self {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
        self
    }

    pub fn output_limits(mut self, min: T, max: T) -> Self {
        self.output = (min, max);
        self
    }

    pub fn windup_limits(mut self, min: T, max: T) -> Self {
        self.windup = (min, max);
        self
    }

    pub fn build(self) -> Result<Pid<T>, PidError> {
        let config = PidConfig {
            kp: self.kp,
            ki: self.ki,
            kd: self.kd,
            output_limits: Limits::try_from(self.output)?,
            windup_limits: Limits::try_from(self.windup)?,
        };
        Ok(Pid::new(config))
    }
}

impl<T: Float> Default for PidBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
