//! Compute-device selection.
//!
//! Moving a batch between devices is a separate step
//! ([`ModelInput::to_device`](crate::processing::ModelInput::to_device));
//! nothing in padding or alignment ever touches a device other than the CPU.

use crate::Result;
use candle_core::Device;

/// Pick the best available device: Metal, then CUDA, then CPU.
pub fn best_device() -> Result<Device> {
    #[cfg(all(target_os = "macos", feature = "metal"))]
    {
        if let Ok(device) = Device::new_metal(0) {
            log::info!("[GLiNER] Using Metal GPU");
            return Ok(device);
        }
    }

    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            log::info!("[GLiNER] Using CUDA GPU");
            return Ok(device);
        }
    }

    log::info!("[GLiNER] Using CPU");
    Ok(Device::Cpu)
}

/// Short device name for logs.
#[must_use]
pub fn device_name(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}
