use candle_core::{DType, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, SnnError};

/// Rate codes a static input into independent Bernoulli spikes per time step.
pub struct BernoulliEncoder {
    /// static input of the current pass, clamped to [0,1]
    inputs: Option<Tensor>,
    rng: StdRng,
}

impl BernoulliEncoder {
    pub fn new(seed: u64) -> Self {
        Self {
            inputs: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Holds `static_input` for every following `step` of this pass.
    pub fn reset(&mut self, static_input: &Tensor) -> Result<()> {
        let clamped = static_input.to_dtype(DType::F32)?.clamp(0f32, 1f32)?;
        self.inputs = Some(clamped.detach());
        Ok(())
    }

    /// Fires each element with probability equal to its intensity.
    pub fn step(&mut self) -> Result<Tensor> {
        let inputs = self
            .inputs
            .as_ref()
            .ok_or_else(|| SnnError::shape("encoder input set by reset()", "no input"))?;
        let n = inputs.elem_count();
        let draws: Vec<f32> = (0..n).map(|_| self.rng.r#gen::<f32>()).collect();
        let random_vals = Tensor::from_vec(draws, inputs.shape().clone(), inputs.device())?;
        // u is drawn from [0, 1): intensity 0 never fires, intensity 1 always does
        let spikes = inputs.gt(&random_vals)?.to_dtype(DType::F32)?;
        Ok(spikes)
    }
}
