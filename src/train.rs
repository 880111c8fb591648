use candle_core::{D, DType, Tensor, Var};
use candle_nn::loss::nll;
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use log::{debug, info};

use crate::error::Result;
use crate::model::SpikingNet;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpochStats {
    /// mean loss per sample
    pub loss: f32,
    pub accuracy: f32,
    pub samples: usize,
}

#[derive(Default)]
struct Tally {
    loss_sum: f32,
    correct: usize,
    samples: usize,
}

impl Tally {
    fn add(&mut self, log_probs: &Tensor, labels: &Tensor) -> Result<Tensor> {
        let loss = nll(log_probs, labels)?;
        let n = labels.dims1()?;
        let predicted = log_probs.argmax(D::Minus1)?;
        let correct = predicted
            .eq(labels)?
            .to_dtype(DType::F32)?
            .sum_all()?
            .to_scalar::<f32>()?;
        self.loss_sum += loss.to_scalar::<f32>()? * n as f32;
        self.correct += correct as usize;
        self.samples += n;
        Ok(loss)
    }

    fn stats(&self) -> EpochStats {
        if self.samples == 0 {
            return EpochStats::default();
        }
        EpochStats {
            loss: self.loss_sum / self.samples as f32,
            accuracy: self.correct as f32 / self.samples as f32,
            samples: self.samples,
        }
    }
}

/// Gradient descent on a spiking net's weights through the surrogate spike function.
pub struct Trainer {
    optimizer: AdamW,
}

impl Trainer {
    /// AdamW over every variable of `varmap`, with candle's default weight decay.
    pub fn new(varmap: &VarMap, learning_rate: f64) -> Result<Self> {
        let params = ParamsAdamW {
            lr: learning_rate,
            ..Default::default()
        };
        Self::with_params(varmap.all_vars(), params)
    }

    pub fn with_params(vars: Vec<Var>, params: ParamsAdamW) -> Result<Self> {
        Ok(Self {
            optimizer: AdamW::new(vars, params)?,
        })
    }

    pub fn train_epoch<I>(&mut self, net: &mut SpikingNet, batches: I) -> Result<EpochStats>
    where
        I: IntoIterator<Item = Result<(Tensor, Tensor)>>,
    {
        let mut tally = Tally::default();
        for (i, batch) in batches.into_iter().enumerate() {
            let (images, labels) = batch?;
            let log_probs = net.forward(&images)?;
            let loss = tally.add(&log_probs, &labels)?;
            self.optimizer.backward_step(&loss)?;
            debug!("batch {i}: loss {:.4}", loss.to_scalar::<f32>()?);
        }
        Ok(tally.stats())
    }
}

/// Loss and accuracy without touching the weights.
pub fn evaluate<I>(net: &mut SpikingNet, batches: I) -> Result<EpochStats>
where
    I: IntoIterator<Item = Result<(Tensor, Tensor)>>,
{
    let mut tally = Tally::default();
    for batch in batches {
        let (images, labels) = batch?;
        let log_probs = net.forward(&images)?.detach();
        tally.add(&log_probs, &labels)?;
    }
    Ok(tally.stats())
}

/// Alternates a training epoch and an evaluation, `make_batches(train)` supplying
/// fresh batches for each phase.
pub fn train_many_epochs<F, I>(
    trainer: &mut Trainer,
    net: &mut SpikingNet,
    epochs: usize,
    mut make_batches: F,
) -> Result<Vec<(EpochStats, EpochStats)>>
where
    F: FnMut(bool) -> Result<I>,
    I: IntoIterator<Item = Result<(Tensor, Tensor)>>,
{
    let mut history = Vec::with_capacity(epochs);
    for epoch in 0..epochs {
        let train = trainer.train_epoch(net, make_batches(true)?)?;
        let test = evaluate(net, make_batches(false)?)?;
        info!(
            "epoch {epoch}: train loss {:.4} acc {:.3} | test loss {:.4} acc {:.3}",
            train.loss, train.accuracy, test.loss, test.accuracy
        );
        history.push((train, test));
    }
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LayerConfig, NetworkConfig};
    use crate::layer::Layer;
    use crate::layer::lif::LIFLayer;
    use crate::layer::spike::Surrogate;
    use candle_core::Device;
    use candle_nn::VarBuilder;

    fn no_decay(lr: f64) -> ParamsAdamW {
        ParamsAdamW {
            lr,
            weight_decay: 0.0,
            ..Default::default()
        }
    }

    fn values(var: &Var) -> Vec<f32> {
        var.as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap()
    }

    /// 4 -> 3 -> 2 on trainable weights. The second layer's columns differ so the
    /// loss gradient with respect to the hidden spikes does not cancel out.
    fn var_net(dev: &Device) -> (SpikingNet, Var, Var) {
        let cfg = NetworkConfig {
            n_time_steps: 3,
            begin_eval: 0,
            layers: vec![LayerConfig::new(4, 3), LayerConfig::new(3, 2)],
            ..Default::default()
        };
        let w1 = Var::from_tensor(&Tensor::full(0.2f32, (4, 3), dev).unwrap()).unwrap();
        let w2 = Var::from_tensor(&Tensor::new(&[[0.3f32, 0.1]; 3], dev).unwrap()).unwrap();
        let layers: Vec<Box<dyn Layer>> = [&w1, &w2]
            .into_iter()
            .zip(&cfg.layers)
            .map(|(w, l)| {
                let layer = LIFLayer::new(w.as_tensor().clone(), l, Surrogate::default()).unwrap();
                Box::new(layer) as Box<dyn Layer>
            })
            .collect();
        let net = SpikingNet::from_layers(&cfg, dev.clone(), layers).unwrap();
        (net, w1, w2)
    }

    #[test]
    fn loss_gradient_reaches_every_layer() {
        let dev = Device::Cpu;
        let (mut net, w1, w2) = var_net(&dev);
        let images = Tensor::ones((1, 4), DType::F32, &dev).unwrap();
        let labels = Tensor::new(&[0u32], &dev).unwrap();

        let loss = nll(&net.forward(&images).unwrap(), &labels).unwrap();
        let grads = loss.backward().unwrap();
        for (name, w) in [("layer 0", &w1), ("layer 1", &w2)] {
            let g = grads.get(w.as_tensor()).expect("no gradient");
            let mass = g.abs().unwrap().sum_all().unwrap().to_scalar::<f32>().unwrap();
            assert!(mass > 0.0, "{name} got a zero gradient");
        }
    }

    #[test]
    fn training_step_moves_both_layers_without_weight_decay() {
        let dev = Device::Cpu;
        let (mut net, w1, w2) = var_net(&dev);
        let before = (values(&w1), values(&w2));

        let images = Tensor::ones((1, 4), DType::F32, &dev).unwrap();
        let labels = Tensor::new(&[0u32], &dev).unwrap();
        let mut trainer =
            Trainer::with_params(vec![w1.clone(), w2.clone()], no_decay(0.05)).unwrap();
        let stats = trainer
            .train_epoch(&mut net, vec![Ok::<_, crate::error::SnnError>((images, labels))])
            .unwrap();
        assert_eq!(stats.samples, 1);
        assert!(stats.loss.is_finite());

        assert_ne!(before.0, values(&w1));
        assert_ne!(before.1, values(&w2));
    }

    #[test]
    fn silent_network_keeps_its_weights_without_weight_decay() {
        let dev = Device::Cpu;
        let (mut net, w1, w2) = var_net(&dev);
        let before = (values(&w1), values(&w2));

        // no input spikes, no hidden spikes, equal logits: nothing to learn from
        let images = Tensor::zeros((2, 4), DType::F32, &dev).unwrap();
        let labels = Tensor::new(&[0u32, 1], &dev).unwrap();
        let mut trainer =
            Trainer::with_params(vec![w1.clone(), w2.clone()], no_decay(0.05)).unwrap();
        let stats = trainer
            .train_epoch(&mut net, vec![Ok::<_, crate::error::SnnError>((images, labels))])
            .unwrap();
        assert!((stats.loss - 2f32.ln()).abs() < 1e-5);

        assert_eq!(before.0, values(&w1));
        assert_eq!(before.1, values(&w2));
    }

    #[test]
    fn many_epochs_alternate_training_and_evaluation() {
        let dev = Device::Cpu;
        let (mut net, w1, w2) = var_net(&dev);
        let mut trainer = Trainer::with_params(vec![w1, w2], no_decay(0.01)).unwrap();
        let images = Tensor::ones((2, 4), DType::F32, &dev).unwrap();
        let labels = Tensor::new(&[0u32, 0], &dev).unwrap();

        let mut phases = Vec::new();
        let history = train_many_epochs(&mut trainer, &mut net, 2, |train| {
            phases.push(train);
            let batch = (images.clone(), labels.clone());
            // the test phase sees the batch twice
            let batches = if train {
                vec![Ok(batch)]
            } else {
                vec![Ok(batch.clone()), Ok(batch)]
            };
            Ok::<_, crate::error::SnnError>(batches)
        })
        .unwrap();

        assert_eq!(phases, vec![true, false, true, false]);
        assert_eq!(history.len(), 2);
        for (train, test) in &history {
            assert_eq!(train.samples, 2);
            assert_eq!(test.samples, 4);
        }
    }

    #[test]
    fn no_batches_give_empty_stats() {
        let dev = Device::Cpu;
        let cfg = NetworkConfig {
            n_time_steps: 2,
            layers: vec![LayerConfig::new(2, 2)],
            ..Default::default()
        };
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let mut net = SpikingNet::new(&cfg, vb).unwrap();
        let stats = evaluate(&mut net, Vec::<Result<(Tensor, Tensor)>>::new()).unwrap();
        assert_eq!(stats, EpochStats::default());

        let mut trainer = Trainer::new(&varmap, 1e-3).unwrap();
        let stats = trainer
            .train_epoch(&mut net, Vec::<Result<(Tensor, Tensor)>>::new())
            .unwrap();
        assert_eq!(stats, EpochStats::default());
    }
}
