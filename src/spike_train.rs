//! Module implementing the rate-coded spike train of an image.
//!
//! A spike train is a binary matrix with one row per time bin and one column per input channel.
//! Each pixel is turned into an independent Bernoulli process: in every bin of duration `dt`
//! (in milliseconds), the input fires with probability `pixel * intensity * dt * 1e-3`, clipped to
//! `[0, 1]`, i.e., `pixel * intensity` is read as a firing rate in Hz.
//!
//! # Example
//!
//! ```rust
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use snn_mnist::spike_train::encode;
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let image = vec![0.0, 128.0, 255.0];
//! let spike_train = encode(&image, 0.1, 3500, 2.0, 3, &mut rng).unwrap();
//!
//! assert_eq!(spike_train.num_steps(), 3500);
//! assert_eq!(spike_train.num_inputs(), 3);
//! assert_eq!(spike_train.input_spike_counts()[0], 0);
//! ```
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::config::Config;
use crate::error::SNNError;

/// Represents the spike train fed to the input layer during one cycle.
#[derive(Debug, PartialEq, Clone)]
pub struct SpikeTrain {
    num_inputs: usize,
    // Row-major, one row of `num_inputs` cells per time bin.
    spikes: Vec<u8>,
}

impl SpikeTrain {
    /// Create a spike train from a row-major binary matrix.
    /// The function returns an error if the matrix is not rectangular or contains values other than 0 and 1.
    pub fn build(num_inputs: usize, spikes: Vec<u8>) -> Result<Self, SNNError> {
        if num_inputs == 0 || spikes.is_empty() {
            return Err(SNNError::InvalidParameter(
                "A spike train must have at least one time bin and one input".to_string(),
            ));
        }
        if spikes.len() % num_inputs != 0 {
            return Err(SNNError::DimensionMismatch {
                what: "spike train cells".to_string(),
                expected: (spikes.len() / num_inputs + 1) * num_inputs,
                found: spikes.len(),
            });
        }
        if spikes.iter().any(|&s| s > 1) {
            return Err(SNNError::InvalidParameter(
                "Spike train cells must be 0 or 1".to_string(),
            ));
        }
        Ok(SpikeTrain { num_inputs, spikes })
    }

    /// Returns the number of time bins.
    pub fn num_steps(&self) -> usize {
        self.spikes.len() / self.num_inputs
    }

    /// Returns the number of input channels.
    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    /// Returns whether the given input fires in the given time bin.
    pub fn get(&self, step: usize, input: usize) -> Option<bool> {
        if input >= self.num_inputs {
            return None;
        }
        self.spikes
            .get(step * self.num_inputs + input)
            .map(|&s| s == 1)
    }

    /// Returns the cells of one time bin.
    pub fn row(&self, step: usize) -> Option<&[u8]> {
        self.spikes
            .chunks_exact(self.num_inputs)
            .nth(step)
    }

    /// Returns an iterator over the time bins.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.spikes.chunks_exact(self.num_inputs)
    }

    /// Returns the total number of spikes.
    pub fn num_spikes(&self) -> usize {
        self.spikes.iter().filter(|&&s| s == 1).count()
    }

    /// Returns the number of spikes of every input channel over the whole train.
    pub fn input_spike_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_inputs];
        for row in self.rows() {
            for (count, &s) in counts.iter_mut().zip(row) {
                *count += s as usize;
            }
        }
        counts
    }

    /// Write the spike train in the hand-off format: one line of '0'/'1' characters per time bin.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), SNNError> {
        let mut line = Vec::with_capacity(self.num_inputs + 1);
        for row in self.rows() {
            line.clear();
            line.extend(row.iter().map(|&s| b'0' + s));
            line.push(b'\n');
            writer.write_all(&line)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Save the spike train to a hand-off file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), SNNError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)
    }

    /// Read a spike train in the hand-off format.
    /// Every line must hold exactly `num_inputs` characters, each '0' or '1'.
    pub fn read_from<R: Read>(reader: R, num_inputs: usize) -> Result<Self, SNNError> {
        let mut spikes = vec![];
        for (n, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line.len() != num_inputs {
                return Err(SNNError::MalformedHandoffFile {
                    line: n + 1,
                    reason: format!("expected {} cells, found {}", num_inputs, line.len()),
                });
            }
            for c in line.bytes() {
                match c {
                    b'0' => spikes.push(0),
                    b'1' => spikes.push(1),
                    _ => {
                        return Err(SNNError::MalformedHandoffFile {
                            line: n + 1,
                            reason: format!("unexpected character {:?}", c as char),
                        })
                    }
                }
            }
        }
        if spikes.is_empty() {
            return Err(SNNError::MalformedHandoffFile {
                line: 0,
                reason: "empty spike train".to_string(),
            });
        }
        SpikeTrain::build(num_inputs, spikes)
    }

    /// Load a spike train from a hand-off file.
    pub fn load_from<P: AsRef<Path>>(path: P, num_inputs: usize) -> Result<Self, SNNError> {
        let file = File::open(path)?;
        SpikeTrain::read_from(file, num_inputs)
    }
}

/// Rate-coding encoder bound to the timing and shape of a run.
#[derive(Debug, PartialEq, Clone)]
pub struct SpikeEncoder {
    dt: f64,
    num_steps: usize,
    intensity: f64,
    num_inputs: usize,
}

impl SpikeEncoder {
    /// Create an encoder with the specified parameters.
    pub fn build(dt: f64, num_steps: usize, intensity: f64, num_inputs: usize) -> Result<Self, SNNError> {
        check_parameters(dt, num_steps, intensity)?;
        Ok(SpikeEncoder {
            dt,
            num_steps,
            intensity,
            num_inputs,
        })
    }

    /// Create an encoder from a run configuration.
    pub fn from_config(config: &Config) -> Result<Self, SNNError> {
        SpikeEncoder::build(
            config.dt,
            config.num_steps(),
            config.input_intensity,
            config.num_inputs,
        )
    }

    /// Returns the number of time bins of the produced spike trains.
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// Encode an image into a spike train.
    pub fn encode<R: Rng>(&self, image: &[f64], rng: &mut R) -> Result<SpikeTrain, SNNError> {
        encode(image, self.dt, self.num_steps, self.intensity, self.num_inputs, rng)
    }
}

/// Returns the probability for an input of the given value to fire within one time bin.
pub fn firing_probability(value: f64, intensity: f64, dt: f64) -> f64 {
    (value * intensity * dt * 1e-3).clamp(0.0, 1.0)
}

/// Encode an image into a spike train with `num_steps` time bins of duration `dt` (in milliseconds).
///
/// Every time bin draws a seed from `rng` and fills its cells from a dedicated ChaCha stream, so
/// bins are filled in parallel and the result only depends on the state of `rng`. One uniform
/// value is drawn per cell whatever its probability, hence, for the same `rng` state, a larger
/// `intensity` can only add spikes.
pub fn encode<R: Rng>(
    image: &[f64],
    dt: f64,
    num_steps: usize,
    intensity: f64,
    num_inputs: usize,
    rng: &mut R,
) -> Result<SpikeTrain, SNNError> {
    if image.len() != num_inputs {
        return Err(SNNError::DimensionMismatch {
            what: "image".to_string(),
            expected: num_inputs,
            found: image.len(),
        });
    }
    check_parameters(dt, num_steps, intensity)?;
    if num_inputs == 0 {
        return Err(SNNError::InvalidParameter(
            "The number of inputs must be positive".to_string(),
        ));
    }
    if let Some(value) = image.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
        return Err(SNNError::InvalidParameter(format!(
            "Pixel intensities must be finite and non-negative, got {}",
            value
        )));
    }

    let probs: Vec<f64> = image
        .iter()
        .map(|&value| firing_probability(value, intensity, dt))
        .collect();
    let seeds: Vec<u64> = (0..num_steps).map(|_| rng.gen()).collect();

    let mut spikes = vec![0u8; num_steps * num_inputs];
    spikes
        .par_chunks_mut(num_inputs)
        .zip(seeds.par_iter())
        .for_each(|(row, &seed)| {
            let mut row_rng = ChaCha8Rng::seed_from_u64(seed);
            for (cell, &p) in row.iter_mut().zip(probs.iter()) {
                let u: f64 = row_rng.gen();
                *cell = (u < p) as u8;
            }
        });

    Ok(SpikeTrain { num_inputs, spikes })
}

fn check_parameters(dt: f64, num_steps: usize, intensity: f64) -> Result<(), SNNError> {
    if num_steps == 0 {
        return Err(SNNError::InvalidParameter(
            "The number of time steps must be positive".to_string(),
        ));
    }
    if !(dt.is_finite() && dt > 0.0) {
        return Err(SNNError::InvalidParameter(format!(
            "The time step must be positive, got {}",
            dt
        )));
    }
    if !(intensity.is_finite() && intensity >= 0.0) {
        return Err(SNNError::InvalidParameter(format!(
            "The input intensity must be non-negative, got {}",
            intensity
        )));
    }
    Ok(())
}
