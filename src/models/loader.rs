//! Model artifact loader

use crate::error::{PredictorError, Result};
use crate::models::runtime::{ExecutionContext, WideModel, WideModelSpec};
use crate::models::signature::{InputMap, Signature, SignatureFile};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

pub const SIGNATURE_FILE: &str = "signature.json";
pub const WIDE_MODEL_FILE: &str = "model.json";
pub const ONNX_MODEL_FILE: &str = "model.onnx";
pub const INPUT_MAP_FILE: &str = "input_map.json";

/// Device the execution context is placed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Device {
    #[default]
    Cpu,
    Gpu(u32),
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "cpu" => Ok(Device::Cpu),
            "gpu" | "cuda" => Ok(Device::Gpu(0)),
            other => other
                .strip_prefix("gpu:")
                .or_else(|| other.strip_prefix("cuda:"))
                .and_then(|id| id.parse().ok())
                .map(Device::Gpu)
                .ok_or_else(|| format!("unknown device `{}` (expected cpu, gpu or gpu:<id>)", other)),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Gpu(id) => write!(f, "gpu:{}", id),
        }
    }
}

/// Deployment settings handed to the loader
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub device: Device,
    /// Threads for intra-op parallelism (ONNX backend)
    pub intra_threads: usize,
    /// Caller field to tensor renames, merged over the artifact's `input_map.json`
    pub input_map: InputMap,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            intra_threads: 1,
            input_map: InputMap::new(),
        }
    }
}

/// A resolved artifact: its signature plus the execution context created once at load.
pub struct LoadedArtifact {
    pub path: PathBuf,
    pub signature: Arc<Signature>,
    pub context: Box<dyn ExecutionContext>,
}

impl fmt::Debug for LoadedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedArtifact")
            .field("path", &self.path)
            .field("signature", &self.signature)
            .field("backend", &self.context.backend())
            .finish()
    }
}

/// Loader for model artifacts
#[derive(Debug, Clone, Default)]
pub struct ArtifactLoader {
    options: LoadOptions,
}

impl ArtifactLoader {
    /// Create a loader with default settings (CPU, 1 thread, no renames)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: LoadOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Resolve the artifact at `path` and create its execution context.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<LoadedArtifact> {
        let path = path.as_ref();

        info!(
            path = %path.display(),
            device = %self.options.device,
            threads = self.options.intra_threads,
            "Loading model artifact"
        );

        let (signature, context) = if path.is_dir() && path.join(WIDE_MODEL_FILE).is_file() {
            self.load_wide(path)?
        } else if let Some(model_file) = onnx_model_file(path) {
            self.load_onnx(path, &model_file)?
        } else {
            return Err(PredictorError::ArtifactNotFound {
                path: path.to_path_buf(),
            });
        };

        let mut input_map = match artifact_dir(path) {
            Some(dir) => read_input_map(dir)?,
            None => InputMap::new(),
        };
        input_map.merge(&self.options.input_map);
        let signature = signature.with_input_map(&input_map)?;

        info!(
            path = %path.display(),
            backend = context.backend(),
            inputs = signature.input_count(),
            outputs = ?signature.output_names().collect::<Vec<_>>(),
            renamed = !input_map.is_empty(),
            "Model artifact loaded"
        );

        Ok(LoadedArtifact {
            path: path.to_path_buf(),
            signature: Arc::new(signature),
            context,
        })
    }

    fn load_wide(&self, dir: &Path) -> Result<(Signature, Box<dyn ExecutionContext>)> {
        if let Device::Gpu(id) = self.options.device {
            warn!(gpu = id, "Wide model runs on CPU only, ignoring device selection");
        }

        let signature_path = dir.join(SIGNATURE_FILE);
        if !signature_path.is_file() {
            return Err(PredictorError::ArtifactNotFound { path: signature_path });
        }
        let file: SignatureFile = read_json(&signature_path)?;
        let signature = Signature::new(file.inputs, file.outputs)?;

        let spec: WideModelSpec = read_json(&dir.join(WIDE_MODEL_FILE))?;
        let model = WideModel::from_spec(spec, &signature)?;

        Ok((signature, Box::new(model)))
    }

    #[cfg(feature = "onnx")]
    fn load_onnx(
        &self,
        path: &Path,
        model_file: &Path,
    ) -> Result<(Signature, Box<dyn ExecutionContext>)> {
        let declared = match artifact_dir(path).map(|dir| dir.join(SIGNATURE_FILE)) {
            Some(sig) if sig.is_file() => {
                let file: SignatureFile = read_json(&sig)?;
                Some(Signature::new(file.inputs, file.outputs)?)
            }
            _ => None,
        };
        let (signature, session) =
            crate::models::onnx::OnnxContext::load(model_file, declared, &self.options)?;
        Ok((signature, Box::new(session)))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_onnx(
        &self,
        path: &Path,
        model_file: &Path,
    ) -> Result<(Signature, Box<dyn ExecutionContext>)> {
        warn!(
            model = %model_file.display(),
            "ONNX artifact found but the `onnx` feature is disabled"
        );
        Err(PredictorError::ArtifactNotFound {
            path: path.to_path_buf(),
        })
    }
}

fn artifact_dir(path: &Path) -> Option<&Path> {
    if path.is_dir() {
        Some(path)
    } else {
        path.parent()
    }
}

fn onnx_model_file(path: &Path) -> Option<PathBuf> {
    if path.is_file() && path.extension().is_some_and(|ext| ext == "onnx") {
        return Some(path.to_path_buf());
    }
    let candidate = path.join(ONNX_MODEL_FILE);
    candidate.is_file().then_some(candidate)
}

fn read_input_map(dir: &Path) -> Result<InputMap> {
    let path = dir.join(INPUT_MAP_FILE);
    if path.is_file() {
        read_json(&path)
    } else {
        Ok(InputMap::new())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| {
        PredictorError::SignatureMismatch(format!("cannot parse {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_artifact(dir: &Path) {
        fs::write(
            dir.join(SIGNATURE_FILE),
            r#"{"inputs": [{"name": "input_1"}, {"name": "input_2", "dtype": "float"}],
                "outputs": [{"name": "probs"}]}"#,
        )
        .unwrap();
        fs::write(
            dir.join(WIDE_MODEL_FILE),
            r#"{"bias": 0.1, "features": {"input_2": {"kind": "numeric", "weight": 0.5}}}"#,
        )
        .unwrap();
    }

    #[test]
    fn test_device_parsing() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("GPU".parse::<Device>().unwrap(), Device::Gpu(0));
        assert_eq!("gpu:3".parse::<Device>().unwrap(), Device::Gpu(3));
        assert!("tpu".parse::<Device>().is_err());
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempdir().unwrap();
        let err = ArtifactLoader::new().load(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, PredictorError::ArtifactNotFound { .. }));

        let err = ArtifactLoader::new().load(dir.path()).unwrap_err();
        assert!(matches!(err, PredictorError::ArtifactNotFound { .. }));
    }

    #[test]
    fn test_load_wide_artifact() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path());

        let artifact = ArtifactLoader::new().load(dir.path()).unwrap();
        assert_eq!(artifact.signature.input_count(), 2);
        assert_eq!(artifact.signature.caller_name(1), "input_2");
        assert_eq!(artifact.context.backend(), "wide");
    }

    #[test]
    fn test_sidecar_and_option_renames_merge() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path());
        fs::write(
            dir.path().join(INPUT_MAP_FILE),
            r#"{"user_id": "input_1", "cost": "input_2"}"#,
        )
        .unwrap();

        let mut options = LoadOptions::default();
        // option entries win over the sidecar, so `cost` now targets a missing tensor
        options.input_map.insert("cost", "input_9");
        let err = ArtifactLoader::with_options(options).load(dir.path()).unwrap_err();
        assert!(matches!(err, PredictorError::SignatureMismatch(_)));

        let artifact = ArtifactLoader::new().load(dir.path()).unwrap();
        assert_eq!(artifact.signature.caller_names(), &["user_id", "cost"]);
    }

    #[test]
    fn test_corrupt_signature_is_mismatch() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path());
        fs::write(dir.path().join(SIGNATURE_FILE), "{not json").unwrap();

        let err = ArtifactLoader::new().load(dir.path()).unwrap_err();
        assert!(matches!(err, PredictorError::SignatureMismatch(_)));
    }
}
