use candle_core::Tensor;

use crate::error::{Result, SnnError};

/// One layer's state and output at one time step.
#[derive(Debug, Clone)]
pub struct TraceEntry {
    pub step: usize,
    pub layer: usize,
    pub state: Tensor,
    pub output: Tensor,
}

/// Every (time step, layer) pair of a forward pass, in execution order.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    n_layers: usize,
    entries: Vec<TraceEntry>,
}

impl Trace {
    pub fn new(n_layers: usize) -> Self {
        Self {
            n_layers,
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, step: usize, layer: usize, state: Tensor, output: Tensor) {
        self.entries.push(TraceEntry {
            step,
            layer,
            state,
            output,
        });
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn n_layers(&self) -> usize {
        self.n_layers
    }

    pub fn n_steps(&self) -> usize {
        if self.n_layers == 0 {
            0
        } else {
            self.entries.len() / self.n_layers
        }
    }

    pub fn layer(&self, layer: usize) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter().filter(move |e| e.layer == layer)
    }

    /// States of `layer` stacked to (time, batch, neurons).
    pub fn stacked_states(&self, layer: usize) -> Result<Tensor> {
        let states: Vec<Tensor> = self.layer(layer).map(|e| e.state.clone()).collect();
        self.stack(layer, states)
    }

    /// Output spikes of `layer` stacked to (time, batch, neurons).
    pub fn stacked_outputs(&self, layer: usize) -> Result<Tensor> {
        let outputs: Vec<Tensor> = self.layer(layer).map(|e| e.output.clone()).collect();
        self.stack(layer, outputs)
    }

    fn stack(&self, layer: usize, ts: Vec<Tensor>) -> Result<Tensor> {
        if ts.is_empty() {
            return Err(SnnError::shape(
                format!("layer index below {}", self.n_layers),
                layer,
            ));
        }
        Ok(Tensor::stack(&ts, 0)?.detach())
    }
}
