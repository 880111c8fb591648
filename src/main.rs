use std::env;
use std::error::Error;

use candle_core::{DType, Device};
use candle_nn::{ParamsAdamW, VarBuilder, VarMap};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tqdm::Iter;

use spiking_net::TrainConfig;
use spiking_net::dataset::mnist::Mnist;
use spiking_net::model::SpikingNet;
use spiking_net::train::{Trainer, train_many_epochs};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    // optional argument: path to a JSON TrainConfig
    let args: Vec<String> = env::args().collect();
    let cfg = match args.get(1) {
        Some(path) => TrainConfig::from_json_file(path)?,
        None => TrainConfig::default(),
    };

    let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);
    let mnist = Mnist::load(&cfg.data_dir, &device)?;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let mut model = SpikingNet::new(&cfg.network, vb)?;
    let params = ParamsAdamW {
        lr: cfg.learning_rate,
        weight_decay: cfg.weight_decay,
        ..Default::default()
    };
    let mut trainer = Trainer::with_params(varmap.all_vars(), params)?;
    let mut rng = StdRng::seed_from_u64(cfg.network.seed);

    let history = train_many_epochs(&mut trainer, &mut model, cfg.epochs, |train| {
        let batches = if train {
            mnist.train.batches(cfg.train_batch_size, Some(&mut rng))
        } else {
            mnist.test.batches::<StdRng>(cfg.test_batch_size, None)
        };
        Ok::<_, spiking_net::SnnError>(batches.tqdm())
    })?;
    for (epoch, (train, test)) in history.iter().enumerate() {
        println!(
            "Epoch {}: train loss {:.4}, train acc {:.2}%, test loss {:.4}, test acc {:.2}%",
            epoch,
            train.loss,
            train.accuracy * 100.0,
            test.loss,
            test.accuracy * 100.0
        );
    }

    varmap.save(&cfg.weights_path)?;
    println!("Done, weights saved to {}", cfg.weights_path);
    Ok(())
}
