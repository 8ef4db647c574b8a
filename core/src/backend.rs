//! Compute backend selection.
//!
//! Probes the host for a usable accelerator and produces the ordered list of
//! (device, precision) candidates the load ladder walks through. Probe
//! failures of any kind demote to CPU; they never fail the process.

use std::fmt;
use std::process::Command;

use serde::Serialize;
use tracing::{debug, info};

use crate::models::ModelSize;

/// Compute device for inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Gpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu => write!(f, "gpu"),
        }
    }
}

/// Numeric precision for model weights and activations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Fp16,
    Fp32,
    Int8,
    Int8Fp16,
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Fp16 => write!(f, "fp16"),
            Precision::Fp32 => write!(f, "fp32"),
            Precision::Int8 => write!(f, "int8"),
            Precision::Int8Fp16 => write!(f, "int8_fp16"),
        }
    }
}

/// One candidate configuration for instantiating the inference backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackendConfig {
    pub device: Device,
    pub precision: Precision,
    /// CPU worker threads; meaningless on GPU.
    pub threads: Option<usize>,
}

impl BackendConfig {
    pub fn new(device: Device, precision: Precision) -> Self {
        Self {
            device,
            precision,
            threads: None,
        }
    }
}

impl fmt::Display for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.precision)
    }
}

/// CPU precision policy by model size: Medium and larger trade throughput
/// for the smaller int8 footprint, the rest afford mixed int8/fp16 kernels.
pub const CPU_PRECISION_POLICY: &[(ModelSize, Precision)] = &[
    (ModelSize::Tiny, Precision::Int8Fp16),
    (ModelSize::Base, Precision::Int8Fp16),
    (ModelSize::Small, Precision::Int8Fp16),
    (ModelSize::Medium, Precision::Int8),
    (ModelSize::LargeV1, Precision::Int8),
    (ModelSize::LargeV2, Precision::Int8),
    (ModelSize::LargeV3, Precision::Int8),
];

/// Look up the CPU precision for a model size.
pub fn cpu_precision(size: ModelSize) -> Precision {
    CPU_PRECISION_POLICY
        .iter()
        .find(|(s, _)| *s == size)
        .map(|(_, p)| *p)
        .unwrap_or(Precision::Int8)
}

/// Accelerator metadata as reported by the management tool.
#[derive(Debug, Clone, Serialize)]
pub struct GpuInfo {
    pub name: String,
    pub memory_total_mb: u64,
    pub memory_used_mb: u64,
}

/// Probe for a usable accelerator.
///
/// Implementations must never fail the process: any detection problem is
/// reported as `None` and the selector stays on CPU.
pub trait AcceleratorProbe: Send + Sync {
    fn probe(&self) -> Option<GpuInfo>;
}

/// Probe backed by the `nvidia-smi` management tool.
///
/// A responding device with parseable memory counters counts as alive. A
/// probe that lies (device present but broken) is still caught by the load
/// ladder, which demotes through the same CPU fallback.
pub struct NvidiaSmiProbe;

impl AcceleratorProbe for NvidiaSmiProbe {
    fn probe(&self) -> Option<GpuInfo> {
        let output = Command::new("nvidia-smi")
            .args([
                "--query-gpu=name,memory.total,memory.used",
                "--format=csv,noheader,nounits",
            ])
            .output()
            .ok()?;

        if !output.status.success() {
            debug!(code = ?output.status.code(), "nvidia-smi reported failure");
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout.lines().next()?;
        let mut fields = line.split(',').map(str::trim);

        let name = fields.next()?.to_string();
        let memory_total_mb = fields.next()?.parse().ok()?;
        let memory_used_mb = fields.next()?.parse().ok()?;

        Some(GpuInfo {
            name,
            memory_total_mb,
            memory_used_mb,
        })
    }
}

/// Ordered instantiation candidates for the load ladder.
///
/// The accelerator comes first when requested and alive; the CPU fallback
/// (precision from the policy table) is always appended.
pub fn candidates(
    size: ModelSize,
    prefer_gpu: bool,
    probe: &dyn AcceleratorProbe,
) -> Vec<BackendConfig> {
    let mut out = Vec::new();

    if prefer_gpu {
        match probe.probe() {
            Some(gpu) => {
                info!(
                    name = %gpu.name,
                    memory_total_mb = gpu.memory_total_mb,
                    "accelerator detected"
                );
                out.push(BackendConfig::new(Device::Gpu, Precision::Fp16));
            }
            None => info!("no usable accelerator, staying on CPU"),
        }
    }

    out.push(BackendConfig::new(Device::Cpu, cpu_precision(size)));
    out
}

/// The fixed secondary ladder beneath a failed preferred candidate.
pub fn fallback_ladder(preferred: &BackendConfig) -> Vec<BackendConfig> {
    match preferred.device {
        Device::Gpu => vec![
            BackendConfig::new(Device::Gpu, Precision::Int8Fp16),
            BackendConfig::new(Device::Gpu, Precision::Int8),
            BackendConfig::new(Device::Cpu, Precision::Int8),
        ],
        Device::Cpu => vec![
            BackendConfig::new(Device::Cpu, Precision::Int8Fp16),
            BackendConfig::new(Device::Cpu, Precision::Int8),
        ],
    }
}

/// Host logical core count, the default CPU thread budget.
pub fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

#[cfg(test)]
#[path = "backend_test.rs"]
mod tests;
