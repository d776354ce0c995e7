//! Audio device listing.

use anyhow::Context;
use cadenza_io::{AudioBackend, AudioDevice, CpalBackend};
use clap::{Args, Subcommand};

#[derive(Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    command: Option<DevicesCommand>,
}

#[derive(Subcommand)]
enum DevicesCommand {
    /// List all available audio devices
    List,

    /// Show the default input and output devices
    Default,
}

pub fn run(args: DevicesArgs) -> anyhow::Result<()> {
    let backend = CpalBackend::new();
    match args.command.unwrap_or(DevicesCommand::List) {
        DevicesCommand::List => {
            let devices = backend
                .list_devices()
                .context("failed to enumerate audio devices")?;
            if devices.is_empty() {
                println!("No audio devices found.");
                return Ok(());
            }

            println!("Audio Devices ({})", backend.name());
            println!("==================\n");

            let inputs: Vec<_> = devices.iter().filter(|d| d.is_input).collect();
            let outputs: Vec<_> = devices.iter().filter(|d| d.is_output).collect();
            print_section("Input Devices:", &inputs);
            print_section("Output Devices:", &outputs);

            println!(
                "Total: {} input(s), {} output(s)",
                inputs.len(),
                outputs.len()
            );
            println!();
            println!("Tip: pass part of a name to pick a device:");
            println!("  cadenza play song.toml --output-device \"USB\"");
            println!("  cadenza record -o take.wav --input-device \"USB\"");
        }

        DevicesCommand::Default => {
            let input = backend.default_input_device()?;
            let output = backend.default_output_device()?;

            println!("Default Audio Devices");
            println!("=====================\n");
            print_default("Input", input.as_ref());
            println!();
            print_default("Output", output.as_ref());
        }
    }

    Ok(())
}

fn print_section(title: &str, devices: &[&AudioDevice]) {
    if devices.is_empty() {
        return;
    }
    println!("{title}");
    for (idx, device) in devices.iter().enumerate() {
        let duplex = if device.is_input && device.is_output {
            " (duplex)"
        } else {
            ""
        };
        println!(
            "  [{}] {} ({} Hz){}",
            idx, device.name, device.default_sample_rate, duplex
        );
    }
    println!();
}

fn print_default(kind: &str, device: Option<&AudioDevice>) {
    match device {
        Some(device) => {
            println!("Default {kind}:");
            println!("  Name: {}", device.name);
            println!("  Sample Rate: {} Hz", device.default_sample_rate);
        }
        None => println!("Default {kind}: None"),
    }
}
