use rsa_capture::enumerate_with_args;
use rsa_capture::Args;
use rsa_capture::Device;

/// List connected analyzers. Optional `key=value` filters, e.g., `driver=dummy`.
pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let filter = Args::from_tokens(std::env::args().skip(1))?;
    let devs = enumerate_with_args(filter)?;
    println!("Devices");
    println!("=========================================");
    if devs.is_empty() {
        println!("none found");
    }

    for d in devs {
        println!("{d}");
        let dev = Device::from_args(d)?;
        println!("  info:            {}", dev.info()?);
        println!("  frequency range: {}", dev.frequency_range()?);
        println!("  IQ bandwidths:   {}", dev.iq_bandwidth_range()?);
    }

    Ok(())
}
