use candle_core::{DType, Device, Tensor};
use candle_nn::{Init, VarBuilder};

use crate::config::LayerConfig;
use crate::error::{Result, SnnError};
use crate::layer::spike::{SpikeFunction, Surrogate};
use crate::layer::{Layer, LayerStep};

/// Leaky integrate-and-fire layer with a second, stricter threshold that hard resets
/// over-excited neurons.
#[allow(clippy::upper_case_acronyms)]
pub struct LIFLayer {
    /// (n_inputs, n_hidden)
    weight: Tensor,
    /// membrane potential, (batch, n_hidden); `None` until `reset_state`
    state: Option<Tensor>,
    decay_multiplier: f32,
    penalty_threshold: f32,
    spike: SpikeFunction,
    n_inputs: usize,
    size: usize,
    device: Device,
}

impl LIFLayer {
    pub fn new(weight: Tensor, cfg: &LayerConfig, surrogate: Surrogate) -> Result<Self> {
        cfg.validate()?;
        let (n_inputs, n_hidden) = weight.dims2()?;
        if (n_inputs, n_hidden) != (cfg.n_inputs, cfg.n_hidden) {
            return Err(SnnError::shape(
                format!("weight of shape [{}, {}]", cfg.n_inputs, cfg.n_hidden),
                weight.dims(),
            ));
        }
        // states and encoder spikes are f32
        if weight.dtype() != DType::F32 {
            return Err(SnnError::Config(format!(
                "weights must be f32, got {:?}",
                weight.dtype()
            )));
        }
        Ok(Self {
            device: weight.device().clone(),
            weight,
            state: None,
            decay_multiplier: cfg.decay_multiplier,
            penalty_threshold: cfg.penalty_threshold,
            spike: SpikeFunction::new(cfg.threshold, surrogate),
            n_inputs,
            size: n_hidden,
        })
    }
}

/// Builds a layer whose weight lives in `vb`, Xavier-uniform initialised.
pub fn lif_layer(cfg: &LayerConfig, surrogate: Surrogate, vb: VarBuilder) -> Result<LIFLayer> {
    let bound = (6.0 / (cfg.n_inputs + cfg.n_hidden) as f64).sqrt();
    let weight = vb.get_with_hints(
        (cfg.n_inputs, cfg.n_hidden),
        "weight",
        Init::Uniform {
            lo: -bound,
            up: bound,
        },
    )?;
    LIFLayer::new(weight, cfg, surrogate)
}

impl Layer for LIFLayer {
    fn step(&mut self, input: &Tensor) -> Result<LayerStep> {
        let prev = self
            .state
            .as_ref()
            .ok_or_else(|| SnnError::shape("membrane state set by reset_state()", "no state"))?;
        let (batch, n_inputs) = input.dims2()?;
        if n_inputs != self.n_inputs || batch != prev.dim(0)? {
            return Err(SnnError::shape(
                format!("input of shape [{}, {}]", prev.dim(0)?, self.n_inputs),
                input.dims(),
            ));
        }

        // integrate: P = d * P + X W
        let excitation = input.matmul(&self.weight)?;
        let potential = prev
            .affine(self.decay_multiplier as f64, 0.0)?
            .add(&excitation)?;

        let spikes = self.spike.forward(&potential)?;

        // neurons above the penalty threshold are forced back to rest
        let keep = potential
            .le(self.penalty_threshold)?
            .to_dtype(potential.dtype())?;
        let state = potential.mul(&keep)?;

        self.state = Some(state.clone());
        Ok(LayerStep {
            state,
            output: spikes,
        })
    }

    fn reset_state(&mut self, batch_size: usize) -> Result<()> {
        self.state = Some(Tensor::zeros(
            (batch_size, self.size),
            DType::F32,
            &self.device,
        )?);
        Ok(())
    }

    fn state(&self) -> Option<&Tensor> {
        self.state.as_ref()
    }

    fn input_size(&self) -> usize {
        self.n_inputs
    }

    fn size(&self) -> usize {
        self.size
    }
}
