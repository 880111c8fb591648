use candle_core::{D, DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_nn::ops::log_softmax;
use log::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::error::{Result, SnnError};
use crate::layer::bernoulli::BernoulliEncoder;
use crate::layer::lif::lif_layer;
use crate::layer::readout::OutputDecoder;
use crate::layer::Layer;
use crate::trace::Trace;

/// Bernoulli encoder, a stack of recurrent spiking layers and a readout,
/// simulated for a fixed number of time steps per forward pass.
pub struct SpikingNet {
    pub device: Device,
    n_time_steps: usize,
    begin_eval: usize,
    seed: u64,
    input_conversion: BernoulliEncoder,
    layers: Vec<Box<dyn Layer>>,
    output_conversion: OutputDecoder,
}

impl SpikingNet {
    /// Builds every layer from `config`, with weights taken from `vb` under `layer{i}`.
    pub fn new(config: &NetworkConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        if vb.dtype() != DType::F32 {
            return Err(SnnError::Config(format!(
                "only f32 networks are supported, got a {:?} VarBuilder",
                vb.dtype()
            )));
        }
        let layers = config
            .layers
            .iter()
            .enumerate()
            .map(|(i, cfg)| {
                lif_layer(cfg, config.surrogate, vb.pp(format!("layer{i}")))
                    .map(|l| Box::new(l) as Box<dyn Layer>)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_layers(config, vb.device().clone(), layers)
    }

    /// Wires already built layers; checks that their sizes chain together.
    pub fn from_layers(
        config: &NetworkConfig,
        device: Device,
        layers: Vec<Box<dyn Layer>>,
    ) -> Result<Self> {
        if config.begin_eval >= config.n_time_steps {
            return Err(SnnError::Config(format!(
                "begin_eval ({}) must be smaller than n_time_steps ({})",
                config.begin_eval, config.n_time_steps
            )));
        }
        if layers.is_empty() {
            return Err(SnnError::Config("network needs at least one layer".to_string()));
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].size() != pair[1].input_size() {
                return Err(SnnError::Config(format!(
                    "layer {} outputs {} neurons but layer {} expects {} inputs",
                    i,
                    pair[0].size(),
                    i + 1,
                    pair[1].input_size()
                )));
            }
        }
        if config.n_time_steps - config.begin_eval == 1 {
            warn!("evaluation window covers a single time step");
        }

        let sizes: Vec<usize> = std::iter::once(layers[0].input_size())
            .chain(layers.iter().map(|l| l.size()))
            .collect();
        info!(
            "spiking net {:?}, {} time steps, evaluating from step {}",
            sizes, config.n_time_steps, config.begin_eval
        );

        Ok(Self {
            device,
            n_time_steps: config.n_time_steps,
            begin_eval: config.begin_eval,
            seed: config.seed,
            input_conversion: BernoulliEncoder::new(config.seed),
            layers,
            output_conversion: OutputDecoder::new(config.aggregation),
        })
    }

    pub fn n_time_steps(&self) -> usize {
        self.n_time_steps
    }

    pub fn begin_eval(&self) -> usize {
        self.begin_eval
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Restarts the input encoder's random sequence.
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.input_conversion.reseed(seed);
    }

    /// (batch, n_classes) log-probabilities.
    pub fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        let logits = self.run(x, None)?;
        Ok(log_softmax(&logits, D::Minus1)?)
    }

    /// Log-probabilities plus the state and output of every layer at every step.
    pub fn forward_with_trace(&mut self, x: &Tensor) -> Result<(Tensor, Trace)> {
        let mut trace = Trace::new(self.layers.len());
        let logits = self.run(x, Some(&mut trace))?;
        Ok((log_softmax(&logits, D::Minus1)?, trace))
    }

    /// Decoded logits before log-softmax.
    pub fn forward_logits(&mut self, x: &Tensor) -> Result<Tensor> {
        self.run(x, None)
    }

    /// (batch, 1, H, W) or (batch, features) to (batch, features)
    fn flatten_input(&self, x: &Tensor) -> Result<Tensor> {
        let n_inputs = self.layers[0].input_size();
        let flat = match x.rank() {
            2 => x.clone(),
            3 | 4 => x.flatten_from(1)?,
            _ => {
                return Err(SnnError::shape(
                    format!("(batch, 1, H, W) or (batch, {n_inputs}) input"),
                    x.dims(),
                ));
            }
        };
        let (batch, features) = flat.dims2()?;
        if batch == 0 || features != n_inputs {
            return Err(SnnError::shape(
                format!("{n_inputs} features per sample"),
                x.dims(),
            ));
        }
        Ok(flat)
    }

    fn run(&mut self, x: &Tensor, mut trace: Option<&mut Trace>) -> Result<Tensor> {
        let x = self.flatten_input(x)?;
        let batch = x.dim(0)?;

        self.input_conversion.reset(&x)?;
        for layer in self.layers.iter_mut() {
            layer.reset_state(batch)?;
        }

        let mut out = Vec::with_capacity(self.n_time_steps - self.begin_eval);
        for t in 0..self.n_time_steps {
            let mut prev_output = self.input_conversion.step()?;
            let mut prev_state = None;
            for (i, layer) in self.layers.iter_mut().enumerate() {
                let step = layer.step(&prev_output)?;
                if let Some(trace) = trace.as_deref_mut() {
                    trace.push(t, i, step.state.clone(), step.output.clone());
                }
                prev_output = step.output;
                prev_state = Some(step.state);
            }
            if t >= self.begin_eval
                && let Some(state) = prev_state
            {
                out.push(state);
            }
        }
        debug!(
            "simulated {} steps for a batch of {}, decoding {} states",
            self.n_time_steps,
            batch,
            out.len()
        );
        self.output_conversion.decode(&out)
    }
}
