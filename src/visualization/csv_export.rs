use std::fs;
use std::path::{Path, PathBuf};

use candle_core::Tensor;
use log::debug;

use super::TraceRenderer;
use crate::error::Result;

/// Writes each rendered plot to `<dir>/<index>_<slug>.csv`.
pub struct CsvTraceRenderer {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl CsvTraceRenderer {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            written: Vec::new(),
        })
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn next_path(&self, title: &str) -> PathBuf {
        let slug: String = title
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        self.dir.join(format!("{:03}_{slug}.csv", self.written.len()))
    }
}

impl TraceRenderer for CsvTraceRenderer {
    fn render_layer(&mut self, title: &str, rows: &[Vec<f32>]) -> Result<()> {
        let path = self.next_path(title);
        let mut w = csv::Writer::from_path(&path)?;
        let n_steps = rows.first().map_or(0, Vec::len);
        let mut header = vec!["neuron".to_string()];
        header.extend((0..n_steps).map(|t| format!("t{t}")));
        w.write_record(&header)?;
        for (neuron, row) in rows.iter().enumerate() {
            let mut record = vec![neuron.to_string()];
            record.extend(row.iter().map(|v| v.to_string()));
            w.write_record(&record)?;
        }
        w.flush()?;
        debug!("wrote {} ({} neurons)", path.display(), rows.len());
        self.written.push(path);
        Ok(())
    }

    fn render_neuron(&mut self, title: &str, values: &[f32]) -> Result<()> {
        let path = self.next_path(title);
        let mut w = csv::Writer::from_path(&path)?;
        w.write_record(["t", "value"])?;
        for (t, v) in values.iter().enumerate() {
            w.write_record([t.to_string(), v.to_string()])?;
        }
        w.flush()?;
        debug!("wrote {}", path.display());
        self.written.push(path);
        Ok(())
    }
}

/// Flattens `t` and writes it as a single-column CSV of floats.
pub fn save_tensor_flat_csv(path: impl AsRef<Path>, t: &Tensor) -> Result<()> {
    let v = t.flatten_all()?.to_dtype(candle_core::DType::F32)?.to_vec1::<f32>()?;
    let mut w = csv::Writer::from_path(path)?;
    for x in v {
        w.write_record([x.to_string()])?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("spiking_net_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn writes_layer_and_neuron_files() {
        let dir = scratch_dir("render");
        let mut r = CsvTraceRenderer::new(&dir).unwrap();
        r.render_layer("Layer 0", &[vec![0.0, 1.0], vec![0.5, 0.25]]).unwrap();
        r.render_neuron("Neuron 3", &[1.0, 0.0, 1.0]).unwrap();
        assert_eq!(r.written().len(), 2);
        assert!(r.written()[0].ends_with("000_layer_0.csv"));

        let layer = fs::read_to_string(&r.written()[0]).unwrap();
        assert_eq!(layer.lines().collect::<Vec<_>>(), vec!["neuron,t0,t1", "0,0,1", "1,0.5,0.25"]);
        let neuron = fs::read_to_string(&r.written()[1]).unwrap();
        assert_eq!(neuron.lines().count(), 4);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn flat_tensor_dump() {
        let dir = scratch_dir("flat");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("t.csv");
        let t = Tensor::new(&[[1.0f32, 2.0], [3.0, 4.5]], &Device::Cpu).unwrap();
        save_tensor_flat_csv(&path, &t).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().collect::<Vec<_>>(), vec!["1", "2", "3", "4.5"]);
        fs::remove_dir_all(dir).unwrap();
    }
}
