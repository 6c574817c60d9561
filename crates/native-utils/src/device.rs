use anyhow::Context;
use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

fn get_host() -> cpal::Host {
    cpal::default_host()
}

// Picks the named input device, or the host default when no name is given.
pub fn get_or_default_input(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());

    let Some(target) = device_name else {
        return host
            .default_input_device()
            .context("No default input device available");
    };

    host.input_devices()
        .context("Failed to enumerate input devices")?
        .find(|device| device.name().is_ok_and(|name| name == target))
        .ok_or_else(|| anyhow::anyhow!("No input device named {:?}", target))
}

// Same as above for playback devices.
pub fn get_or_default_output(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();

    let Some(target) = device_name else {
        return host
            .default_output_device()
            .context("No default output device available");
    };

    host.output_devices()
        .context("Failed to enumerate output devices")?
        .find(|device| device.name().is_ok_and(|name| name == target))
        .ok_or_else(|| anyhow::anyhow!("No output device named {:?}", target))
}

fn describe(name: &str, channels: u16, sample_rate: u32, default_name: Option<&str>) -> String {
    let mut d = format!(" * {}({}ch, {}hz)", name, channels, sample_rate);
    if default_name == Some(name) {
        d.push_str(" [default]");
    }
    d
}

pub fn get_available_inputs() -> anyhow::Result<String> {
    for host in cpal::available_hosts() {
        tracing::debug!("Available host: {:?}", host);
    }

    let host = get_host();
    let default_device = host.default_input_device().and_then(|d| d.name().ok());

    let mut device_names: Vec<String> = Vec::new();
    for in_device in host.input_devices().context("No input devices found")? {
        let Ok(d_name) = in_device.name() else {
            continue;
        };
        let Ok(d_cfg) = in_device.default_input_config() else {
            tracing::debug!("Skipping input device without default config: {}", d_name);
            continue;
        };
        device_names.push(describe(
            &d_name,
            d_cfg.channels(),
            d_cfg.sample_rate().0,
            default_device.as_deref(),
        ));
    }
    Ok(device_names.join("\n"))
}

pub fn get_available_outputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_device = host.default_output_device().and_then(|d| d.name().ok());

    let mut device_names: Vec<String> = Vec::new();
    for out_device in host.output_devices().context("No output devices found")? {
        let Ok(d_name) = out_device.name() else {
            continue;
        };
        let Ok(d_cfg) = out_device.default_output_config() else {
            tracing::debug!("Skipping output device without default config: {}", d_name);
            continue;
        };
        device_names.push(describe(
            &d_name,
            d_cfg.channels(),
            d_cfg.sample_rate().0,
            default_device.as_deref(),
        ));
    }
    Ok(device_names.join("\n"))
}
