use serde::{Serialize, Deserialize};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{NnError, Result};
use crate::layers::layer::LayerRecord;
use crate::loss::loss_type::LossType;
use crate::network::config::NetworkConfig;
use crate::optim::optimizer::OptimizerState;

/// On-disk form of a trained network.
///
/// Layers are stored as `{kind, params}` records so that loading never goes
/// through the layers' normal constructors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    pub layers: Vec<LayerRecord>,
    pub optimizer: OptimizerState,
    pub loss: LossType,
    #[serde(default)]
    pub config: NetworkConfig,
    #[serde(default)]
    pub epoch: usize,
}

impl ModelFile {
    /// Writes pretty-printed JSON to a sibling temp file, then renames it over
    /// `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let tmp = temp_path(path);
        {
            let file = fs::File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Reads a model file; anything that is not a well-formed model is
    /// reported as `MalformedModel`.
    pub fn read(path: &Path) -> Result<ModelFile> {
        let file = fs::File::open(path)?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| NnError::MalformedModel(format!("{}: {e}", path.display())))
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
