pub mod bernoulli;
pub mod lif;
pub mod readout;
pub mod spike;

use candle_core::Tensor;

use crate::error::Result;

/// (state, output) pair a stateful layer emits for one time step.
#[derive(Debug, Clone)]
pub struct LayerStep {
    /// membrane potential after the step
    pub state: Tensor,
    /// binary spikes fired during the step
    pub output: Tensor,
}

pub trait Layer: Send + Sync {
    /// integrate one time step of input spikes, (batch, input_size)
    fn step(&mut self, input: &Tensor) -> Result<LayerStep>;

    /// zeroes internal state for a new sequence of `batch_size` samples
    fn reset_state(&mut self, batch_size: usize) -> Result<()>;

    /// internal state getter
    fn state(&self) -> Option<&Tensor>;

    /// how many inputs the layer consumes
    fn input_size(&self) -> usize;

    /// how many neurons in this layer
    fn size(&self) -> usize;
}
