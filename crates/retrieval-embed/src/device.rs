use candle_core::Device;
use tracing::info;

/// Metal when built with the `metal` feature and available, CPU otherwise.
/// `APP_EMBED_DEVICE=cpu` forces the CPU.
pub fn select_device() -> Device {
    let forced_cpu = std::env::var("APP_EMBED_DEVICE").is_ok_and(|v| v.eq_ignore_ascii_case("cpu"));
    if forced_cpu {
        info!(device = "cpu", "embedding device forced by APP_EMBED_DEVICE");
        return Device::Cpu;
    }
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(dev) => {
                info!(device = "metal", "embedding device selected");
                return dev;
            }
            Err(e) => tracing::warn!(error = %e, "Metal unavailable, falling back to CPU"),
        }
    }
    info!(device = "cpu", "embedding device selected");
    Device::Cpu
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_can_be_forced() {
        std::env::set_var("APP_EMBED_DEVICE", "CPU");
        assert!(matches!(select_device(), Device::Cpu));
        std::env::remove_var("APP_EMBED_DEVICE");
    }
}
