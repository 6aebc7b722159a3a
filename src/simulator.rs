//! Bridge to the event-driven simulator that turns a spike train into output spike counters.
//!
//! The simulator is an injected collaborator behind the [`SimulationBridge`] trait, so the encoder
//! and the classifier can be exercised without the external binary. Any closure with the signature
//! `FnMut(&SpikeTrain) -> Result<Vec<u32>, SNNError>` is a bridge.
//!
//! [`ProcessSimulator`] talks to the external program through hand-off files: it writes the spike
//! train, runs the program synchronously, then reads the counters back. Unlike a bare blocking
//! call, every invocation is bounded by a timeout, failed invocations can be retried a bounded
//! number of times, and a shared shutdown flag abandons the call in flight.
use std::fs;
use std::io::ErrorKind;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::config::{Config, SimulatorConfig};
use crate::counters::load_counters;
use crate::error::SNNError;
use crate::spike_train::SpikeTrain;

/// Interval between two polls of the simulator process.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Capability to simulate the network on one spike train.
pub trait SimulationBridge {
    /// Run the network on the spike train and return the spike count of every output neuron.
    fn run(&mut self, spike_train: &SpikeTrain) -> Result<Vec<u32>, SNNError>;
}

impl<F> SimulationBridge for F
where
    F: FnMut(&SpikeTrain) -> Result<Vec<u32>, SNNError>,
{
    fn run(&mut self, spike_train: &SpikeTrain) -> Result<Vec<u32>, SNNError> {
        self(spike_train)
    }
}

/// Simulator running as an external process, fed through hand-off files.
#[derive(Debug, Clone)]
pub struct ProcessSimulator {
    config: SimulatorConfig,
    timeout: Duration,
    num_neurons: usize,
    shutdown: Arc<AtomicBool>,
}

impl ProcessSimulator {
    /// Create a bridge to the external simulator expecting `num_neurons` counters.
    /// The function returns an error if the timeout of the configuration is invalid.
    pub fn new(config: SimulatorConfig, num_neurons: usize) -> Result<Self, SNNError> {
        let timeout = config.timeout()?;
        Ok(ProcessSimulator {
            config,
            timeout,
            num_neurons,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Create a bridge from a run configuration.
    pub fn from_config(config: &Config) -> Result<Self, SNNError> {
        ProcessSimulator::new(config.simulator.clone(), config.num_neurons)
    }

    /// Returns the flag that, once raised, abandons the simulator call in flight and every later one.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    // Run the program once and wait for it, killing it on timeout or shutdown.
    fn invoke(&self) -> Result<(), SNNError> {
        if self.is_shutdown() {
            return Err(SNNError::Cancelled);
        }

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .current_dir(&self.config.working_dir)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| {
                SNNError::SimulatorFailure(format!(
                    "cannot start {}: {}",
                    self.config.program.display(),
                    e
                ))
            })?;

        // A timeout beyond the range of the clock never expires.
        let deadline = Instant::now().checked_add(self.timeout);
        loop {
            if self.is_shutdown() {
                terminate(&mut child);
                return Err(SNNError::Cancelled);
            }

            let status = child
                .try_wait()
                .map_err(|e| SNNError::SimulatorFailure(e.to_string()))?;
            match status {
                Some(status) if status.success() => return Ok(()),
                Some(status) => {
                    return Err(SNNError::SimulatorFailure(format!(
                        "{} exited with {}",
                        self.config.program.display(),
                        status
                    )))
                }
                None => {}
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                terminate(&mut child);
                return Err(SNNError::SimulatorFailure(format!(
                    "{} did not return within {:?}",
                    self.config.program.display(),
                    self.timeout
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl SimulationBridge for ProcessSimulator {
    fn run(&mut self, spike_train: &SpikeTrain) -> Result<Vec<u32>, SNNError> {
        let input_path = self.config.input_path();
        let output_path = self.config.output_path();

        spike_train.save_to(&input_path)?;
        debug!(
            "Spike train with {} spikes written to {}",
            spike_train.num_spikes(),
            input_path.display()
        );

        let mut attempt = 0;
        loop {
            // Counters left over by a previous cycle must never be read back.
            match fs::remove_file(&output_path) {
                Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }

            match self.invoke() {
                Ok(()) => break,
                Err(SNNError::SimulatorFailure(e)) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "Simulator attempt {} of {} failed: {}",
                        attempt,
                        self.config.max_retries + 1,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }

        if self.is_shutdown() {
            return Err(SNNError::Cancelled);
        }
        load_counters(&output_path, self.num_neurons).map_err(|e| match e {
            SNNError::IOError(e) => SNNError::SimulatorFailure(format!(
                "no counters at {}: {}",
                output_path.display(),
                e
            )),
            e => e,
        })
    }
}

fn terminate(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("Failed to kill the simulator process: {}", e);
    }
    if let Err(e) = child.wait() {
        warn!("Failed to reap the simulator process: {}", e);
    }
}
