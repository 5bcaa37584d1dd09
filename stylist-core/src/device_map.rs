use candle_core::utils::{cuda_is_available, metal_is_available};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceMap {
    ForceCpu,
    Ordinal(usize),
}

impl Default for DeviceMap {
    fn default() -> Self {
        Self::Ordinal(0)
    }
}

impl DeviceMap {
    pub fn from_cpu_flag(cpu: bool) -> Self {
        if cpu {
            Self::ForceCpu
        } else {
            Self::default()
        }
    }

    /// The kind of device `select_best_device` will pick for this map.
    pub fn kind(self) -> DeviceKind {
        match self {
            DeviceMap::ForceCpu => DeviceKind::Cpu,
            DeviceMap::Ordinal(_) if cuda_is_available() => DeviceKind::Cuda,
            DeviceMap::Ordinal(_) if metal_is_available() => DeviceKind::Metal,
            DeviceMap::Ordinal(_) => DeviceKind::Cpu,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Cuda,
    Metal,
}

serde_plain::derive_display_from_serialize!(DeviceKind);
