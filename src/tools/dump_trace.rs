use std::env;
use std::error::Error;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};

use spiking_net::NetworkConfig;
use spiking_net::dataset::mnist::Mnist;
use spiking_net::layer::Layer;
use spiking_net::model::SpikingNet;
use spiking_net::visualization::{CsvTraceRenderer, visualize_all_neurons, visualize_neuron};

// usage: dump_trace <data dir> <out dir> [test image index] [weights.safetensors]
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let data_dir = args.get(1).map(String::as_str).unwrap_or("./data");
    let out_dir = args.get(2).map(String::as_str).unwrap_or("./trace");
    let index: usize = args.get(3).map(|s| s.parse()).transpose()?.unwrap_or(0);

    let device = Device::Cpu;
    let mnist = Mnist::load(data_dir, &device)?;
    if index >= mnist.test.len() {
        return Err(format!("image index {index} out of range ({})", mnist.test.len()).into());
    }
    let image = mnist.test.images.narrow(0, index, 1)?;

    let mut varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let mut model = SpikingNet::new(&NetworkConfig::default(), vb)?;
    if let Some(weights) = args.get(4) {
        varmap.load(weights)?;
    }

    let mut renderer = CsvTraceRenderer::new(out_dir)?;
    // every plot replays the same input spikes
    let seed = model.seed();
    let trace = visualize_all_neurons(&mut model, &image, &mut renderer)?;
    let last = trace.n_layers() - 1;
    for neuron in 0..model.layers()[last].size() {
        model.reseed(seed);
        visualize_neuron(&mut model, &image, last, neuron, &mut renderer)?;
    }

    println!(
        "Wrote {} files for test image {} to {}",
        renderer.written().len(),
        index,
        out_dir
    );
    Ok(())
}
