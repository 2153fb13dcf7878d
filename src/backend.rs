//! Backend selection.
//!
//! The device under test is chosen from configuration, optionally overridden
//! by the `KVERIFY_DEVICE` environment variable (`cpu`, `cuda`, `cuda:1`,
//! `rocm:0`, ...). Only the in-process CPU backend is compiled in; selecting
//! any other backend reports it as unavailable.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cpu_backend::CpuBackend;
use crate::error::{HarnessError, HarnessResult};
use crate::operation::Backend;

/// Environment variable overriding the configured device.
pub const DEVICE_ENV: &str = "KVERIFY_DEVICE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Cuda,
    Rocm,
    Metal,
    Wgpu,
    Cpu,
}

impl BackendType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cuda => "CUDA",
            Self::Rocm => "ROCm",
            Self::Metal => "Metal",
            Self::Wgpu => "WGPU",
            Self::Cpu => "CPU",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        let v = value.to_ascii_lowercase();
        Some(match v.as_str() {
            "cuda" => Self::Cuda,
            "rocm" | "hip" => Self::Rocm,
            "metal" => Self::Metal,
            "wgpu" => Self::Wgpu,
            "cpu" => Self::Cpu,
            _ => return None,
        })
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A backend type plus device ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSelection {
    pub backend: BackendType,
    #[serde(default)]
    pub ordinal: u32,
}

impl Default for BackendSelection {
    fn default() -> Self {
        Self { backend: BackendType::Cpu, ordinal: 0 }
    }
}

impl fmt::Display for BackendSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.backend.name(), self.ordinal)
    }
}

/// Parse a device string such as `cpu` or `cuda:1`.
pub fn parse_device(value: &str) -> HarnessResult<BackendSelection> {
    let value = value.trim();
    let invalid = || HarnessError::InvalidBackendOverride(value.to_string());
    let (kind, ordinal) = match value.split_once(':') {
        Some((kind, idx)) => (kind, idx.parse::<u32>().map_err(|_| invalid())?),
        None => (value, 0),
    };
    let backend = BackendType::parse(kind).ok_or_else(invalid)?;
    Ok(BackendSelection { backend, ordinal })
}

/// Instantiate the backend for `selection`.
pub fn select_backend(selection: BackendSelection) -> HarnessResult<Box<dyn Backend>> {
    match selection.backend {
        BackendType::Cpu => {
            log::info!("Using backend {selection}");
            Ok(Box::new(CpuBackend::new(selection.ordinal)))
        }
        other => Err(HarnessError::BackendUnavailable(format!(
            "{} support is not compiled into this build",
            other.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device() {
        assert_eq!(parse_device("cpu").unwrap(), BackendSelection::default());
        assert_eq!(
            parse_device(" CUDA:1 ").unwrap(),
            BackendSelection { backend: BackendType::Cuda, ordinal: 1 }
        );
        assert_eq!(parse_device("hip").unwrap().backend, BackendType::Rocm);
    }

    #[test]
    fn test_parse_device_rejects_malformed() {
        for bad in ["", "tpu", "cuda:x", "cuda:-1", "cpu:"] {
            assert!(
                matches!(parse_device(bad), Err(HarnessError::InvalidBackendOverride(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_select_unavailable() {
        let sel = BackendSelection { backend: BackendType::Metal, ordinal: 0 };
        assert!(matches!(select_backend(sel), Err(HarnessError::BackendUnavailable(_))));
        let cpu = select_backend(BackendSelection::default()).unwrap();
        assert_eq!(cpu.backend_type(), BackendType::Cpu);
    }

    #[test]
    fn test_selection_serde() {
        let sel: BackendSelection = serde_json::from_str(r#"{"backend":"cuda"}"#).unwrap();
        assert_eq!(sel, BackendSelection { backend: BackendType::Cuda, ordinal: 0 });
    }
}
