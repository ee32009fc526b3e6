use std::io::Write;

use tm_device::Device;

use crate::config::{BenchConfig, RAMP_PERIOD};
use crate::error::Result;
use crate::status::check;
use crate::trial::{run_trial, DeviceOperands, HostOperands};
use crate::verify::verify;

/// Outcome of a completed, verified run.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchReport {
    pub width: usize,
    pub tile_width: u32,
    pub trial_ms: Vec<f32>,
    pub average_ms: f32,
}

impl BenchReport {
    /// Throughput of the average trial, counting one multiply and one add
    /// per inner-loop step.
    pub fn gflops(&self) -> f64 {
        if self.average_ms <= 0.0 {
            return 0.0;
        }
        let flops = 2.0 * (self.width as f64).powi(3);
        flops / (self.average_ms as f64 * 1e-3) / 1e9
    }
}

/// Runs the whole benchmark on one device.
#[derive(Debug)]
pub struct Driver<'d> {
    device: &'d Device,
    config: BenchConfig,
}

impl<'d> Driver<'d> {
    pub fn new(device: &'d Device, config: BenchConfig) -> Self {
        Driver { device, config }
    }

    /// Allocates the operands, runs every trial, prints per-trial and
    /// average timings to `out`, verifies the last result and releases the
    /// device buffers.
    ///
    /// Any failure ends the run; nothing is retried. Device buffers are
    /// released on every exit path.
    pub fn run<W: Write>(&self, out: &mut W) -> Result<BenchReport> {
        let cfg = self.config;
        cfg.validate()?;

        let mut host = HostOperands::ramp(cfg.width, RAMP_PERIOD);
        let dev = DeviceOperands::alloc(self.device, cfg.width)?;
        tracing::info!(
            width = cfg.width,
            tile_width = cfg.tile_width,
            trials = cfg.trials,
            bytes_per_matrix = dev.out.size_in_bytes(),
            worker_threads = self.device.worker_threads(),
            "starting benchmark"
        );

        let outcome = self.run_trials(&mut host, &dev, out);
        let released = dev.free(self.device);
        let trial_ms = outcome?;
        released?;
        drop(host);

        let average_ms = trial_ms.iter().sum::<f32>() / cfg.trials as f32;
        let report = BenchReport {
            width: cfg.width,
            tile_width: cfg.tile_width,
            trial_ms,
            average_ms,
        };
        tracing::info!(
            average_ms = report.average_ms,
            gflops = report.gflops(),
            "benchmark verified"
        );
        Ok(report)
    }

    fn run_trials<W: Write>(
        &self,
        host: &mut HostOperands,
        dev: &DeviceOperands,
        out: &mut W,
    ) -> Result<Vec<f32>> {
        let cfg = self.config;
        let mut trial_ms = Vec::with_capacity(cfg.trials);
        for trial in 1..=cfg.trials {
            let ms = run_trial(self.device, host, dev, cfg.tile_width)?;
            writeln!(out, "Trial {trial}: {ms:.3} ms")?;
            trial_ms.push(ms);
        }

        let average_ms = trial_ms.iter().sum::<f32>() / cfg.trials as f32;
        writeln!(
            out,
            "Average over {} trials: {:.3} ms (matrix width {})",
            cfg.trials, average_ms, cfg.width
        )?;

        check("device synchronize", self.device.synchronize())?;
        verify(&host.left, &host.right, &host.out)?;
        Ok(trial_ms)
    }
}
