use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SnnError};
use crate::layer::readout::Aggregation;
use crate::layer::spike::Surrogate;

/// Parameters of a single recurrent spiking layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub n_inputs: usize,
    pub n_hidden: usize,
    /// fraction of the membrane potential kept from one step to the next
    #[serde(default = "default_decay")]
    pub decay_multiplier: f32,
    /// potential above which a neuron spikes
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// potential above which a neuron is hard reset to zero
    #[serde(default = "default_penalty_threshold")]
    pub penalty_threshold: f32,
}

fn default_decay() -> f32 {
    0.9
}

fn default_threshold() -> f32 {
    1.0
}

fn default_penalty_threshold() -> f32 {
    1.5
}

impl LayerConfig {
    pub fn new(n_inputs: usize, n_hidden: usize) -> Self {
        Self {
            n_inputs,
            n_hidden,
            decay_multiplier: default_decay(),
            threshold: default_threshold(),
            penalty_threshold: default_penalty_threshold(),
        }
    }

    pub fn with_dynamics(
        mut self,
        decay_multiplier: f32,
        threshold: f32,
        penalty_threshold: f32,
    ) -> Self {
        self.decay_multiplier = decay_multiplier;
        self.threshold = threshold;
        self.penalty_threshold = penalty_threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_inputs == 0 || self.n_hidden == 0 {
            return Err(SnnError::Config(format!(
                "layer dimensions must be non-zero, got {}x{}",
                self.n_inputs, self.n_hidden
            )));
        }
        if !(self.decay_multiplier > 0.0 && self.decay_multiplier < 1.0) {
            return Err(SnnError::Config(format!(
                "decay_multiplier must lie in (0, 1), got {}",
                self.decay_multiplier
            )));
        }
        if !self.threshold.is_finite() || !self.penalty_threshold.is_finite() {
            return Err(SnnError::Config("thresholds must be finite".to_string()));
        }
        if self.penalty_threshold <= self.threshold {
            return Err(SnnError::Config(format!(
                "penalty_threshold ({}) must exceed threshold ({})",
                self.penalty_threshold, self.threshold
            )));
        }
        Ok(())
    }
}

/// Topology and simulation settings of a whole network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub n_time_steps: usize,
    /// first time step whose final-layer state counts towards the output
    pub begin_eval: usize,
    pub layers: Vec<LayerConfig>,
    pub aggregation: Aggregation,
    pub surrogate: Surrogate,
    /// seed of the input encoder's RNG
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            n_time_steps: 128,
            begin_eval: 0,
            layers: vec![LayerConfig::new(28 * 28, 100), LayerConfig::new(100, 10)],
            aggregation: Aggregation::Sum,
            surrogate: Surrogate::default(),
            seed: 42,
        }
    }
}

impl NetworkConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn n_inputs(&self) -> usize {
        self.layers.first().map_or(0, |l| l.n_inputs)
    }

    pub fn n_classes(&self) -> usize {
        self.layers.last().map_or(0, |l| l.n_hidden)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_time_steps == 0 {
            return Err(SnnError::Config("n_time_steps must be positive".to_string()));
        }
        if self.begin_eval >= self.n_time_steps {
            return Err(SnnError::Config(format!(
                "begin_eval ({}) must be smaller than n_time_steps ({})",
                self.begin_eval, self.n_time_steps
            )));
        }
        if self.layers.is_empty() {
            return Err(SnnError::Config("network needs at least one layer".to_string()));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            layer.validate().map_err(|e| match e {
                SnnError::Config(msg) => SnnError::Config(format!("layer {i}: {msg}")),
                other => other,
            })?;
        }
        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[0].n_hidden != pair[1].n_inputs {
                return Err(SnnError::Config(format!(
                    "layer {} outputs {} neurons but layer {} expects {} inputs",
                    i,
                    pair[0].n_hidden,
                    i + 1,
                    pair[1].n_inputs
                )));
            }
        }
        self.surrogate.validate()?;
        Ok(())
    }
}

/// Settings for the MNIST training binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub data_dir: String,
    pub epochs: usize,
    pub train_batch_size: usize,
    pub test_batch_size: usize,
    pub learning_rate: f64,
    /// AdamW decoupled weight decay
    pub weight_decay: f64,
    /// safetensors file the trained weights are written to
    pub weights_path: String,
    pub network: NetworkConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            epochs: 10,
            train_batch_size: 1000,
            test_batch_size: 1000,
            learning_rate: 1e-3,
            weight_decay: 0.01,
            weights_path: "spiking_net.safetensors".to_string(),
            network: NetworkConfig::default(),
        }
    }
}

impl TrainConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&text)?;
        cfg.network.validate()?;
        if cfg.train_batch_size == 0 || cfg.test_batch_size == 0 {
            return Err(SnnError::Config("batch sizes must be positive".to_string()));
        }
        if !(cfg.weight_decay >= 0.0) {
            return Err(SnnError::Config(format!(
                "weight_decay must be non-negative, got {}",
                cfg.weight_decay
            )));
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = NetworkConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.n_inputs(), 784);
        assert_eq!(cfg.n_classes(), 10);
    }

    #[test]
    fn begin_eval_must_precede_last_step() {
        let cfg = NetworkConfig {
            n_time_steps: 16,
            begin_eval: 16,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(SnnError::Config(_))));

        let cfg = NetworkConfig {
            n_time_steps: 16,
            begin_eval: 15,
            ..Default::default()
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn negative_begin_eval_is_rejected_when_parsing() {
        let json = r#"{ "n_time_steps": 8, "begin_eval": -1 }"#;
        assert!(matches!(
            NetworkConfig::from_json_str(json),
            Err(SnnError::Json(_))
        ));
    }

    #[test]
    fn mismatched_layer_sizes_are_rejected() {
        let cfg = NetworkConfig {
            layers: vec![LayerConfig::new(784, 100), LayerConfig::new(50, 10)],
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(SnnError::Config(_))));
    }

    #[test]
    fn penalty_threshold_must_exceed_threshold() {
        let layer = LayerConfig::new(4, 4).with_dynamics(0.9, 1.0, 1.0);
        assert!(layer.validate().is_err());
        let layer = LayerConfig::new(4, 4).with_dynamics(1.0, 1.0, 1.5);
        assert!(layer.validate().is_err());
    }

    #[test]
    fn json_fills_in_layer_defaults() {
        let json = r#"{
            "n_time_steps": 32,
            "begin_eval": 4,
            "layers": [ { "n_inputs": 4, "n_hidden": 3 }, { "n_inputs": 3, "n_hidden": 2 } ],
            "aggregation": "mean",
            "surrogate": { "kind": "sigmoid", "slope": 5.0 }
        }"#;
        let cfg = NetworkConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.layers[1].decay_multiplier, 0.9);
        assert_eq!(cfg.layers[0].penalty_threshold, 1.5);
        assert_eq!(cfg.aggregation, Aggregation::Mean);
        assert_eq!(cfg.surrogate, Surrogate::Sigmoid { slope: 5.0 });
        assert_eq!(cfg.seed, 42);
    }

    #[test]
    fn train_config_defaults_keep_adamw_decay() {
        let cfg: TrainConfig = serde_json::from_str(r#"{ "epochs": 2 }"#).unwrap();
        assert_eq!(cfg.epochs, 2);
        assert_eq!(cfg.weight_decay, 0.01);
        assert_eq!(cfg.network, NetworkConfig::default());
    }
}
