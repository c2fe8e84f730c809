//! Parameter serialization/deserialization (feature: `serde`).
//!
//! This module defines a versioned on-disk format for [`ParameterStore`].
//!
//! Design notes:
//! - Internal parameter structs are not serialized directly; every layer is
//!   written as its kind, width and a list of named row-major tensors.
//! - Deserialization validates the version, tensor names and shapes, layer
//!   chaining, and that all values are finite.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dense::DenseParams;
use crate::layer::validate_architecture;
use crate::lstm::LstmParams;
use crate::{Error, LayerKind, LayerParams, LayerSpec, Matrix, ParameterStore, Result};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedStore {
    pub format_version: u32,
    pub layers: Vec<SerializedLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedLayer {
    pub kind: LayerKind,
    pub out_dim: usize,
    pub tensors: Vec<SerializedTensor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedTensor {
    pub name: String,
    pub rows: usize,
    pub cols: usize,
    /// Row-major `(rows, cols)`.
    pub data: Vec<f64>,
}

impl SerializedTensor {
    fn into_matrix(self, layer: usize) -> Result<Matrix> {
        if self.data.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(format!(
                "layer {layer} tensor {} must contain only finite values",
                self.name
            )));
        }
        Matrix::from_vec(self.rows, self.cols, self.data)
            .map_err(|e| Error::InvalidData(format!("layer {layer} tensor {}: {e}", self.name)))
    }
}

impl SerializedStore {
    pub fn validate(&self) -> Result<()> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported model format_version {}; expected {}",
                self.format_version, MODEL_FORMAT_VERSION
            )));
        }
        if self.layers.is_empty() {
            return Err(Error::InvalidData(
                "serialized model must have at least one layer".to_owned(),
            ));
        }
        Ok(())
    }
}

impl SerializedLayer {
    fn into_params(self, idx: usize) -> Result<LayerParams> {
        let expected: &[&str] = match self.kind {
            LayerKind::Lstm => &crate::lstm::LSTM_PARAM_NAMES,
            LayerKind::Relu | LayerKind::Linear => &["w", "b"],
        };
        let names: Vec<&str> = self.tensors.iter().map(|t| t.name.as_str()).collect();
        if names != expected {
            return Err(Error::InvalidData(format!(
                "layer {idx} ({}) expects tensors {expected:?}, got {names:?}",
                self.kind
            )));
        }

        let mut tensors = self
            .tensors
            .into_iter()
            .map(|t| t.into_matrix(idx))
            .collect::<Result<Vec<_>>>()?;

        let params = if self.kind.is_recurrent() {
            LstmParams::from_tensors(tensors).map(LayerParams::Lstm)
        } else {
            let b = tensors.pop().expect("two dense tensors");
            let w = tensors.pop().expect("two dense tensors");
            DenseParams::from_parts(w, b).map(LayerParams::Dense)
        };
        params.map_err(|e| Error::InvalidData(format!("layer {idx} invalid: {e}")))
    }
}

impl From<&ParameterStore> for SerializedStore {
    fn from(store: &ParameterStore) -> Self {
        let layers = store
            .specs()
            .iter()
            .zip(store.layers())
            .map(|(spec, params)| SerializedLayer {
                kind: spec.kind,
                out_dim: spec.out_dim,
                tensors: params
                    .names()
                    .iter()
                    .zip(params.tensors())
                    .map(|(name, m)| SerializedTensor {
                        name: (*name).to_owned(),
                        rows: m.rows(),
                        cols: m.cols(),
                        data: m.as_slice().to_vec(),
                    })
                    .collect(),
            })
            .collect();
        Self {
            format_version: MODEL_FORMAT_VERSION,
            layers,
        }
    }
}

impl TryFrom<SerializedStore> for ParameterStore {
    type Error = Error;

    fn try_from(value: SerializedStore) -> std::result::Result<Self, Self::Error> {
        value.validate()?;

        let specs: Vec<LayerSpec> = value
            .layers
            .iter()
            .map(|l| LayerSpec::new(l.kind, l.out_dim))
            .collect();
        validate_architecture(&specs, specs[0].kind.is_recurrent())
            .map_err(|e| Error::InvalidData(format!("serialized model: {e}")))?;

        let layers = value
            .layers
            .into_iter()
            .enumerate()
            .map(|(idx, layer)| layer.into_params(idx))
            .collect::<Result<Vec<_>>>()?;

        ParameterStore::from_layers(specs, layers)
    }
}

impl ParameterStore {
    /// Serialize the parameters to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        let ser = SerializedStore::from(self);
        serde_json::to_string_pretty(&ser)
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Serialize the parameters to a compact JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        let ser = SerializedStore::from(self);
        serde_json::to_string(&ser)
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Parse parameters from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedStore = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("failed to parse model json: {e}")))?;
        ser.try_into()
    }

    /// Save the parameters to a JSON file (pretty-printed).
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        let p = path.as_ref();
        std::fs::write(p, s)
            .map_err(|e| Error::InvalidData(format!("failed to write {}: {e}", p.display())))?;
        log::debug!("saved parameters to {}", p.display());
        Ok(())
    }

    /// Load parameters from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::InvalidData(format!("failed to read {}: {e}", p.display())))?;
        Self::from_json_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use LayerKind::{Linear, Lstm, Relu};

    fn store() -> ParameterStore {
        let specs = LayerSpec::zip(&[Lstm, Relu, Linear], &[3, 2, 1]).unwrap();
        ParameterStore::initialize(&specs, 2, 4, &mut StdRng::seed_from_u64(0))
    }

    #[test]
    fn json_roundtrip_preserves_parameters() {
        let original = store();
        let json = original.to_json_string().unwrap();
        let loaded = ParameterStore::from_json_str(&json).unwrap();
        assert_eq!(loaded, original);

        let pretty = original.to_json_string_pretty().unwrap();
        assert!(pretty.contains("\"w_forget\""));
        assert!(pretty.contains("\"kind\": \"lstm\""));
    }

    #[test]
    fn rejects_unknown_version() {
        let bad = r#"{"format_version":999,"layers":[]}"#;
        let err = ParameterStore::from_json_str(bad).unwrap_err();
        assert!(format!("{err}").contains("format_version"));
    }

    #[test]
    fn rejects_bad_tensor_shapes_and_names() {
        let mut ser = SerializedStore::from(&store());
        ser.layers[2].tensors[0].data.pop();
        assert!(ParameterStore::try_from(ser).is_err());

        let mut ser = SerializedStore::from(&store());
        ser.layers[1].tensors.swap(0, 1);
        assert!(ParameterStore::try_from(ser).is_err());

        let mut ser = SerializedStore::from(&store());
        ser.layers[0].tensors[0].data[0] = f64::NAN;
        assert!(ParameterStore::try_from(ser).is_err());
    }

    #[test]
    fn rejects_invalid_layer_graph() {
        let mut ser = SerializedStore::from(&store());
        ser.layers.swap(0, 1);
        let err = ParameterStore::try_from(ser).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn file_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "rust_lstm_mlp_params_{}.json",
            std::process::id()
        ));
        let original = store();
        original.save_json(&path).unwrap();
        let loaded = ParameterStore::load_json(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, original);
    }
}
