//! Multi-layer spiking neural network simulated over discrete time steps.
//!
//! Static inputs are rate coded into Bernoulli spike trains, pushed through a
//! stack of recurrent leaky integrate-and-fire layers and decoded into class
//! log-probabilities. Firing uses a surrogate gradient so the whole network
//! trains with candle's autodiff.

pub mod config;
pub mod dataset;
pub mod error;
pub mod layer;
pub mod model;
pub mod trace;
pub mod train;
pub mod visualization;

pub use config::{LayerConfig, NetworkConfig, TrainConfig};
pub use error::{Result, SnnError};
pub use model::SpikingNet;
pub use trace::{Trace, TraceEntry};
