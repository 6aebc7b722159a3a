//! Hand-off format of the per-neuron spike counters produced by the simulator.
//!
//! The file holds exactly one non-negative integer per line, one line per output neuron, in neuron
//! order. Anything else is rejected: missing entries are never filled with zeros.
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::SNNError;

/// Read the counters of `num_neurons` output neurons.
pub fn read_counters<R: Read>(reader: R, num_neurons: usize) -> Result<Vec<u32>, SNNError> {
    let mut counters = Vec::with_capacity(num_neurons);
    for (n, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        if counters.len() == num_neurons {
            return Err(SNNError::MalformedHandoffFile {
                line: n + 1,
                reason: format!("expected {} counters, found more", num_neurons),
            });
        }
        let value = line
            .trim()
            .parse::<u32>()
            .map_err(|e| SNNError::MalformedHandoffFile {
                line: n + 1,
                reason: format!("invalid counter {:?}: {}", line, e),
            })?;
        counters.push(value);
    }
    if counters.len() != num_neurons {
        return Err(SNNError::MalformedHandoffFile {
            line: counters.len() + 1,
            reason: format!(
                "expected {} counters, found {}",
                num_neurons,
                counters.len()
            ),
        });
    }
    Ok(counters)
}

/// Write counters, one per line.
pub fn write_counters<W: Write>(writer: &mut W, counters: &[u32]) -> Result<(), SNNError> {
    for count in counters {
        writeln!(writer, "{}", count)?;
    }
    writer.flush()?;
    Ok(())
}

/// Load the counters of `num_neurons` output neurons from a hand-off file.
pub fn load_counters<P: AsRef<Path>>(path: P, num_neurons: usize) -> Result<Vec<u32>, SNNError> {
    read_counters(File::open(path)?, num_neurons)
}

/// Save counters to a hand-off file.
pub fn save_counters<P: AsRef<Path>>(path: P, counters: &[u32]) -> Result<(), SNNError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_counters(&mut writer, counters)
}
