pub mod csv_export;

use candle_core::Tensor;

use crate::error::{Result, SnnError};
use crate::model::SpikingNet;
use crate::trace::Trace;

pub use csv_export::{CsvTraceRenderer, save_tensor_flat_csv};

/// Receives neuron-by-time plots of a trace. Implementations decide how they are drawn.
pub trait TraceRenderer {
    /// one row per neuron, one column per time step
    fn render_layer(&mut self, title: &str, rows: &[Vec<f32>]) -> Result<()>;

    /// a single neuron's value at each time step
    fn render_neuron(&mut self, title: &str, values: &[f32]) -> Result<()>;
}

fn single_example(x: &Tensor) -> Result<()> {
    if x.rank() != 4 || x.dim(0)? != 1 {
        return Err(SnnError::shape("a single example of shape (1, 1, H, W)", x.dims()));
    }
    Ok(())
}

/// (time, 1, neurons) to neuron-major rows
fn neuron_rows(stacked: Tensor) -> Result<Vec<Vec<f32>>> {
    Ok(stacked.squeeze(1)?.t()?.to_vec2::<f32>()?)
}

/// Renders the states and spikes of every layer for one example.
pub fn visualize_all_neurons(
    net: &mut SpikingNet,
    x: &Tensor,
    renderer: &mut dyn TraceRenderer,
) -> Result<Trace> {
    single_example(x)?;
    let (_, trace) = net.forward_with_trace(x)?;
    for layer in 0..trace.n_layers() {
        let states = neuron_rows(trace.stacked_states(layer)?)?;
        let outputs = neuron_rows(trace.stacked_outputs(layer)?)?;
        renderer.render_layer(
            &format!("Inner state values of neurons for layer {layer}"),
            &states,
        )?;
        renderer.render_layer(
            &format!("Output spikes (activation) values of neurons for layer {layer}"),
            &outputs,
        )?;
    }
    Ok(trace)
}

/// Renders one neuron's state and spikes over time for one example.
pub fn visualize_neuron(
    net: &mut SpikingNet,
    x: &Tensor,
    layer: usize,
    neuron: usize,
    renderer: &mut dyn TraceRenderer,
) -> Result<()> {
    single_example(x)?;
    let (_, trace) = net.forward_with_trace(x)?;
    let states = neuron_rows(trace.stacked_states(layer)?)?;
    let outputs = neuron_rows(trace.stacked_outputs(layer)?)?;
    let (Some(state), Some(output)) = (states.get(neuron), outputs.get(neuron)) else {
        return Err(SnnError::shape(
            format!("neuron index below {}", states.len()),
            neuron,
        ));
    };
    renderer.render_neuron(
        &format!("Inner state values neuron {neuron} of layer {layer}"),
        state,
    )?;
    renderer.render_neuron(
        &format!("Output spikes (activation) values of neuron {neuron} of layer {layer}"),
        output,
    )
}
