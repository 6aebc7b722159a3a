//! Run configuration shared by the encoder, the classifier and the simulator bridge.
//!
//! A [`Config`] is built once (from defaults, a JSON file or the command line) and then passed by
//! reference to every component; nothing reads process-wide state.
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SNNError;
use crate::{
    DEFAULT_DT, DEFAULT_INPUT_INTENSITY, DEFAULT_TRAIN_DURATION, DEFAULT_UPDATE_INTERVAL,
    NUM_INPUTS, NUM_NEURONS,
};

/// Settings of the external simulator process.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// The simulator executable.
    pub program: PathBuf,
    /// Arguments passed to the simulator, none by default.
    pub args: Vec<String>,
    /// The directory the simulator runs in; hand-off paths are relative to it.
    pub working_dir: PathBuf,
    /// The spike train hand-off file written before each invocation.
    pub input_spikes: PathBuf,
    /// The counters hand-off file read after each invocation.
    pub output_counters: PathBuf,
    /// Maximum wall-clock time for one invocation, in seconds.
    pub timeout_secs: f64,
    /// Number of extra attempts after a failed invocation.
    pub max_retries: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            program: PathBuf::from("./target/release/snn_simulator"),
            args: vec![],
            working_dir: PathBuf::from("."),
            input_spikes: PathBuf::from("inputSpikes.txt"),
            output_counters: PathBuf::from("outputCounters.txt"),
            timeout_secs: 600.0,
            max_retries: 0,
        }
    }
}

impl SimulatorConfig {
    /// Returns the timeout of one invocation.
    /// The function returns an error if the timeout is not positive or is out of range for a [`Duration`].
    pub fn timeout(&self) -> Result<Duration, SNNError> {
        match Duration::try_from_secs_f64(self.timeout_secs) {
            Ok(timeout) if !timeout.is_zero() => Ok(timeout),
            _ => Err(SNNError::InvalidParameter(format!(
                "The simulator timeout must be a positive number of seconds, got {}",
                self.timeout_secs
            ))),
        }
    }

    /// Check that the simulator settings can be used for an invocation.
    pub fn validate(&self) -> Result<(), SNNError> {
        self.timeout()?;
        Ok(())
    }

    /// Returns the location of the spike train hand-off file.
    pub fn input_path(&self) -> PathBuf {
        self.working_dir.join(&self.input_spikes)
    }

    /// Returns the location of the counters hand-off file.
    pub fn output_path(&self) -> PathBuf {
        self.working_dir.join(&self.output_counters)
    }
}

/// Immutable configuration of a run.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Duration of one time bin, in milliseconds.
    pub dt: f64,
    /// Duration of a spike train, in milliseconds.
    pub train_duration: f64,
    /// Scaling applied to pixel values to obtain firing rates (in Hz).
    pub input_intensity: f64,
    /// Number of cycles between accuracy evaluations.
    pub update_interval: usize,
    /// Number of input channels, i.e., pixels per image.
    pub num_inputs: usize,
    /// Number of output neurons.
    pub num_neurons: usize,
    /// External simulator settings.
    pub simulator: SimulatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dt: DEFAULT_DT,
            train_duration: DEFAULT_TRAIN_DURATION,
            input_intensity: DEFAULT_INPUT_INTENSITY,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            num_inputs: NUM_INPUTS,
            num_neurons: NUM_NEURONS,
            simulator: SimulatorConfig::default(),
        }
    }
}

impl Config {
    /// Create a configuration with default simulator settings.
    /// The function returns an error for invalid timing or shape parameters.
    pub fn build(
        dt: f64,
        train_duration: f64,
        input_intensity: f64,
        update_interval: usize,
        num_inputs: usize,
        num_neurons: usize,
    ) -> Result<Self, SNNError> {
        let config = Config {
            dt,
            train_duration,
            input_intensity,
            update_interval,
            num_inputs,
            num_neurons,
            simulator: SimulatorConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration describes a runnable pipeline.
    pub fn validate(&self) -> Result<(), SNNError> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SNNError::InvalidParameter(format!(
                "The time step must be positive, got {}",
                self.dt
            )));
        }
        if !(self.train_duration.is_finite() && self.train_duration >= self.dt) {
            return Err(SNNError::InvalidParameter(format!(
                "The train duration must be at least one time step, got {}",
                self.train_duration
            )));
        }
        if !(self.input_intensity.is_finite() && self.input_intensity >= 0.0) {
            return Err(SNNError::InvalidParameter(format!(
                "The input intensity must be non-negative, got {}",
                self.input_intensity
            )));
        }
        if self.update_interval == 0 {
            return Err(SNNError::InvalidParameter(
                "The update interval must be positive".to_string(),
            ));
        }
        if self.num_inputs == 0 || self.num_neurons == 0 {
            return Err(SNNError::InvalidParameter(
                "The number of inputs and neurons must be positive".to_string(),
            ));
        }
        self.simulator.validate()
    }

    /// Returns the number of time bins of a spike train.
    pub fn num_steps(&self) -> usize {
        // Rounded to absorb the representation error of e.g. 350 / 0.1.
        (self.train_duration / self.dt).round() as usize
    }

    /// Save the configuration to a JSON file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), SNNError> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self).map_err(|e| SNNError::IOError(e.to_string()))
    }

    /// Load a configuration from a JSON file; missing fields take their default value.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, SNNError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: Config =
            serde_json::from_reader(reader).map_err(|e| SNNError::IOError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
