use tm_bench::{status, BenchConfig, Driver};
use tm_device::{Device, DeviceConfig};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> tm_bench::Result<()> {
    let device = status::check("device init", Device::new(DeviceConfig::default()))?;
    let stdout = std::io::stdout();
    Driver::new(&device, BenchConfig::default()).run(&mut stdout.lock())?;
    Ok(())
}

fn main() {
    init_tracing();

    if let Err(err) = run() {
        eprintln!("{}", status::failure_message(&err));
        match err.exit_code() {
            Some(code) => std::process::exit(code),
            // A wrong product means the parallel path is broken.
            None => std::process::abort(),
        }
    }
}
