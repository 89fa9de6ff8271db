//! # Device Detection and Management
//!
//! Picks the compute device (CPU/GPU) the local Whisper model is loaded on.
//! GPU preferences fall back to the CPU when the backend is unavailable.

use candle_core::Device;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Cached best available device to avoid repeated detection
static BEST_DEVICE: OnceLock<Device> = OnceLock::new();

/// Device preferences for model inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Automatically select the best available device
    #[default]
    Auto,
    /// Force CPU usage
    Cpu,
    /// CUDA GPU (falls back to CPU if not available)
    Cuda,
    /// Metal GPU (falls back to CPU if not available)
    Metal,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "automatic" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "metal" => Ok(DevicePreference::Metal),
            _ => Err(format!("Unknown device preference: {}", s)),
        }
    }
}

/// Device detection and selection utilities
pub struct DeviceManager;

impl DeviceManager {
    /// Get the best available device based on preference
    pub fn get_device(preference: DevicePreference) -> Device {
        match preference {
            DevicePreference::Auto => Self::get_best_device(),
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Cuda => Self::get_cuda_device().unwrap_or(Device::Cpu),
            DevicePreference::Metal => Self::get_metal_device().unwrap_or(Device::Cpu),
        }
    }

    /// Get the best available device (cached)
    pub fn get_best_device() -> Device {
        BEST_DEVICE.get_or_init(Self::detect_best_device).clone()
    }

    fn detect_best_device() -> Device {
        info!("Detecting best available compute device...");

        if let Some(cuda_device) = Self::get_cuda_device() {
            info!("Selected CUDA GPU for ML inference");
            return cuda_device;
        }

        if let Some(metal_device) = Self::get_metal_device() {
            info!("Selected Metal GPU for ML inference");
            return metal_device;
        }

        info!("Using CPU for ML inference (no GPU acceleration available)");
        Device::Cpu
    }

    fn get_cuda_device() -> Option<Device> {
        match Device::new_cuda(0) {
            Ok(device) => {
                debug!("CUDA device 0 available");
                Some(device)
            }
            Err(e) => {
                debug!("CUDA not available: {}", e);
                None
            }
        }
    }

    fn get_metal_device() -> Option<Device> {
        match Device::new_metal(0) {
            Ok(device) => {
                debug!("Metal device 0 available");
                Some(device)
            }
            Err(e) => {
                debug!("Metal not available: {}", e);
                None
            }
        }
    }

    /// Get device information for logging/debugging
    pub fn get_device_info(device: &Device) -> &'static str {
        match device {
            Device::Cpu => "cpu",
            Device::Cuda(_) => "cuda",
            Device::Metal(_) => "metal",
        }
    }
}
