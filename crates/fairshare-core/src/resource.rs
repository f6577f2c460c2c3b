//! Task resource requests and MIG profile parsing

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{FairshareError, FairshareResult};

/// Prefix shared by every MIG-sliced extended resource
pub const MIG_RESOURCE_PREFIX: &str = "nvidia.com/mig-";

/// MiB per GB in MIG profile names
const MIB_PER_GB: i64 = 1024;

/// Split a MIG profile name into its device portion and memory size in GB.
///
/// `nvidia.com/mig-2g.10gb` yields `(2, 10)`. Trailing profile attributes after the
/// memory figure (`+me`, `-me`) are ignored.
pub fn extract_gpu_and_memory_from_mig_resource_name(name: &str) -> FairshareResult<(u32, u32)> {
    let invalid = || FairshareError::InvalidMigResource(name.to_string());

    let profile = name.strip_prefix(MIG_RESOURCE_PREFIX).ok_or_else(invalid)?;
    let (portion, memory) = profile.split_once('.').ok_or_else(invalid)?;

    let portion = portion
        .strip_suffix('g')
        .and_then(|p| p.parse::<u32>().ok())
        .ok_or_else(invalid)?;

    let digits = memory.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || !memory[digits..].starts_with("gb") {
        return Err(invalid());
    }
    let memory = memory[..digits].parse::<u32>().map_err(|_| invalid())?;

    Ok((portion, memory))
}

/// GPU devices and GPU memory a request resolves to
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GpuDemand {
    /// Whole or fractional devices, including MIG device portions
    pub gpus: f64,
    /// Requested GPU memory in MiB
    pub gpu_memory_mib: i64,
}

impl GpuDemand {
    pub fn add(&mut self, other: GpuDemand) {
        self.gpus += other.gpus;
        self.gpu_memory_mib += other.gpu_memory_mib;
    }
}

/// Resource request of a single task, or an aggregate of several
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// CPU in millicores
    #[serde(default)]
    pub cpu_millis: f64,
    /// Memory in bytes
    #[serde(default)]
    pub memory_bytes: f64,
    /// Whole or fractional GPU devices
    #[serde(default)]
    pub gpus: f64,
    /// GPU memory requested instead of a device fraction, in MiB
    #[serde(default)]
    pub gpu_memory_mib: i64,
    /// MIG profile name to requested quantity
    #[serde(default)]
    pub mig_resources: BTreeMap<String, i64>,
}

impl ResourceRequirements {
    pub fn new(gpus: f64, cpu_millis: f64, memory_bytes: f64) -> Self {
        Self {
            cpu_millis,
            memory_bytes,
            gpus,
            ..Default::default()
        }
    }

    pub fn with_gpu_memory(mut self, gpu_memory_mib: i64) -> Self {
        self.gpu_memory_mib = gpu_memory_mib;
        self
    }

    pub fn with_mig(mut self, profile: impl Into<String>, count: i64) -> Self {
        *self.mig_resources.entry(profile.into()).or_insert(0) += count;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cpu_millis == 0.0
            && self.memory_bytes == 0.0
            && self.gpus == 0.0
            && self.gpu_memory_mib == 0
            && self.mig_resources.values().all(|q| *q == 0)
    }

    /// Accumulate another request into this one
    pub fn add(&mut self, other: &ResourceRequirements) {
        self.cpu_millis += other.cpu_millis;
        self.memory_bytes += other.memory_bytes;
        self.gpus += other.gpus;
        self.gpu_memory_mib += other.gpu_memory_mib;
        for (profile, count) in &other.mig_resources {
            *self.mig_resources.entry(profile.clone()).or_insert(0) += count;
        }
    }

    /// Devices and GPU memory requested, with each MIG profile resolved to its
    /// device portion and memory times the requested quantity.
    ///
    /// Unparsable MIG names are logged and left out.
    pub fn gpu_demand(&self) -> GpuDemand {
        let mut demand = GpuDemand {
            gpus: self.gpus,
            gpu_memory_mib: self.gpu_memory_mib,
        };
        for (profile, count) in &self.mig_resources {
            match extract_gpu_and_memory_from_mig_resource_name(profile) {
                Ok((portion, memory_gb)) => {
                    demand.gpus += portion as f64 * *count as f64;
                    demand.gpu_memory_mib += memory_gb as i64 * MIB_PER_GB * count;
                }
                Err(e) => warn!(resource = %profile, error = %e, "Failed to evaluate device portion"),
            }
        }
        demand
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_mig_profiles() {
        assert_eq!(
            extract_gpu_and_memory_from_mig_resource_name("nvidia.com/mig-1g.5gb").unwrap(),
            (1, 5)
        );
        assert_eq!(
            extract_gpu_and_memory_from_mig_resource_name("nvidia.com/mig-3g.40gb").unwrap(),
            (3, 40)
        );
        assert_eq!(
            extract_gpu_and_memory_from_mig_resource_name("nvidia.com/mig-1g.10gb+me").unwrap(),
            (1, 10)
        );
    }

    #[test]
    fn test_extract_mig_invalid() {
        for name in [
            "nvidia.com/gpu",
            "nvidia.com/mig-",
            "nvidia.com/mig-xg.5gb",
            "nvidia.com/mig-1g",
            "nvidia.com/mig-1g.5mb",
            "nvidia.com/mig-1.5gb",
        ] {
            let err = extract_gpu_and_memory_from_mig_resource_name(name).unwrap_err();
            assert!(matches!(err, FairshareError::InvalidMigResource(_)), "{name}");
        }
    }

    #[test]
    fn test_add_requirements() {
        let mut total = ResourceRequirements::default();
        assert!(total.is_empty());

        total.add(&ResourceRequirements::new(1.0, 500.0, 1e9).with_mig("nvidia.com/mig-1g.5gb", 1));
        total.add(&ResourceRequirements::new(0.5, 500.0, 1e9).with_mig("nvidia.com/mig-1g.5gb", 2));

        assert_eq!(total.gpus, 1.5);
        assert_eq!(total.cpu_millis, 1000.0);
        assert_eq!(total.mig_resources["nvidia.com/mig-1g.5gb"], 3);
        assert!(!total.is_empty());
    }

    #[test]
    fn test_gpu_demand_includes_mig() {
        let req = ResourceRequirements::new(1.0, 0.0, 0.0)
            .with_gpu_memory(512)
            .with_mig("nvidia.com/mig-2g.10gb", 2)
            .with_mig("not-a-mig", 5);
        assert_eq!(
            req.gpu_demand(),
            GpuDemand {
                gpus: 5.0,
                gpu_memory_mib: 512 + 2 * 10 * 1024,
            }
        );
    }

    #[test]
    fn test_gpu_demand_without_mig() {
        let req = ResourceRequirements::new(0.5, 100.0, 0.0).with_gpu_memory(2048);
        assert_eq!(req.gpu_demand().gpus, 0.5);
        assert_eq!(req.gpu_demand().gpu_memory_mib, 2048);

        let mut total = GpuDemand::default();
        total.add(req.gpu_demand());
        total.add(req.gpu_demand());
        assert_eq!(total.gpus, 1.0);
        assert_eq!(total.gpu_memory_mib, 4096);
    }
}
