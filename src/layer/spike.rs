use candle_core::{DType, Tensor};
use candle_nn::ops::sigmoid;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SnnError};

/// Smooth stand-in whose derivative replaces the step function's during backprop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Surrogate {
    /// clipped linear ramp, gradient `1 / width` within `width / 2` of the threshold
    Rectangular { width: f32 },
    /// logistic curve, gradient `slope * s * (1 - s)`
    Sigmoid { slope: f32 },
}

impl Default for Surrogate {
    fn default() -> Self {
        Surrogate::Rectangular { width: 1.0 }
    }
}

impl Surrogate {
    pub fn validate(&self) -> Result<()> {
        let (name, v) = match *self {
            Surrogate::Rectangular { width } => ("width", width),
            Surrogate::Sigmoid { slope } => ("slope", slope),
        };
        if !(v.is_finite() && v > 0.0) {
            return Err(SnnError::Config(format!(
                "surrogate {name} must be positive, got {v}"
            )));
        }
        Ok(())
    }

    /// s(p) for a potential tensor, differentiable in candle's graph
    fn smooth(&self, potential: &Tensor, threshold: f32) -> Result<Tensor> {
        let threshold = threshold as f64;
        let s = match *self {
            Surrogate::Rectangular { width } => {
                let width = width as f64;
                potential
                    .affine(1.0 / width, 0.5 - threshold / width)?
                    .clamp(0f32, 1f32)?
            }
            Surrogate::Sigmoid { slope } => {
                let slope = slope as f64;
                sigmoid(&potential.affine(slope, -slope * threshold)?)?
            }
        };
        Ok(s)
    }
}

/// Heaviside firing decision with a surrogate gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpikeFunction {
    pub threshold: f32,
    pub surrogate: Surrogate,
}

impl SpikeFunction {
    pub fn new(threshold: f32, surrogate: Surrogate) -> Self {
        Self { threshold, surrogate }
    }

    /// 1 where `potential > threshold`, 0 elsewhere.
    ///
    /// The forward value is `H(p) + (s(p) - s(p))` with the second `s` detached,
    /// which is exactly `H(p)` for finite potentials while backprop only sees `ds/dp`.
    pub fn forward(&self, potential: &Tensor) -> Result<Tensor> {
        let hard = potential.gt(self.threshold)?.to_dtype(potential.dtype())?;
        let smooth = self.surrogate.smooth(potential, self.threshold)?;
        let straight_through = smooth.sub(&smooth.detach())?;
        Ok(hard.add(&straight_through)?)
    }

    /// Surrogate derivative evaluated at `potential`, without going through autodiff.
    pub fn surrogate_grad(&self, potential: &Tensor) -> Result<Tensor> {
        let centered = potential.affine(1.0, -(self.threshold as f64))?;
        let grad = match self.surrogate {
            Surrogate::Rectangular { width } => {
                let inside = centered.abs()?.lt(width / 2.0)?.to_dtype(DType::F32)?;
                inside.affine(1.0 / width as f64, 0.0)?
            }
            Surrogate::Sigmoid { slope } => {
                let s = sigmoid(&centered.affine(slope as f64, 0.0)?)?;
                let one_minus = s.affine(-1.0, 1.0)?;
                s.mul(&one_minus)?.affine(slope as f64, 0.0)?
            }
        };
        Ok(grad.to_dtype(potential.dtype())?)
    }
}
