use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SnnError};

/// How final-layer states are folded over the evaluation window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    Sum,
    Mean,
}

/// Turns a sequence of (batch, n_classes) states into one logits tensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputDecoder {
    pub aggregation: Aggregation,
}

impl OutputDecoder {
    pub fn new(aggregation: Aggregation) -> Self {
        Self { aggregation }
    }

    pub fn decode(&self, states: &[Tensor]) -> Result<Tensor> {
        if states.is_empty() {
            return Err(SnnError::shape("at least one state to decode", "empty window"));
        }
        let stacked = Tensor::stack(states, 0)?;
        let logits = match self.aggregation {
            Aggregation::Sum => stacked.sum(0)?,
            Aggregation::Mean => stacked.mean(0)?,
        };
        Ok(logits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn states() -> Vec<Tensor> {
        [[1.0f32, 0.0], [2.0, 4.0], [3.0, 8.0]]
            .iter()
            .map(|row| Tensor::new(&[*row], &Device::Cpu).unwrap())
            .collect()
    }

    #[test]
    fn sum_and_mean_over_window() {
        let states = states();
        let sum = OutputDecoder::new(Aggregation::Sum).decode(&states).unwrap();
        assert_eq!(sum.to_vec2::<f32>().unwrap(), vec![vec![6.0, 12.0]]);
        let mean = OutputDecoder::new(Aggregation::Mean).decode(&states).unwrap();
        assert_eq!(mean.to_vec2::<f32>().unwrap(), vec![vec![2.0, 4.0]]);
    }

    #[test]
    fn window_start_excludes_earlier_steps() {
        let states = states();
        let dec = OutputDecoder::default();
        let full = dec.decode(&states[0..]).unwrap().to_vec2::<f32>().unwrap();
        let tail = dec.decode(&states[2..]).unwrap().to_vec2::<f32>().unwrap();
        assert_ne!(full, tail);
        assert_eq!(tail, vec![vec![3.0, 8.0]]);
    }

    #[test]
    fn empty_window_is_an_error() {
        assert!(OutputDecoder::default().decode(&[]).is_err());
    }
}
