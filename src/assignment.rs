//! Module implementing the static map from output neurons to class labels.
//!
//! The assignment is produced offline by a calibration stage and loaded once before the first
//! cycle. It is persisted as a flat numeric `.npy` array (negative values for unassigned neurons)
//! and mirrored as a text file with one `"<label>;"` line per neuron.
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use ndarray::Array1;
use ndarray_npy::{ReadNpyExt, WriteNpyExt};

use crate::error::SNNError;
use crate::{Label, NUM_LABELS};

/// Value used on disk for a neuron without label.
pub const UNASSIGNED: i64 = -1;

/// Represents the label of every output neuron.
#[derive(Debug, PartialEq, Clone)]
pub struct LabelAssignment {
    labels: Vec<Option<Label>>,
}

impl LabelAssignment {
    /// Create an assignment from the label of every neuron.
    /// The function returns an error for labels out of `0..NUM_LABELS`.
    pub fn new(labels: Vec<Option<Label>>) -> Result<Self, SNNError> {
        if let Some(label) = labels.iter().flatten().find(|&&l| l as usize >= NUM_LABELS) {
            return Err(SNNError::InvalidParameter(format!(
                "Label {} is out of range 0..{}",
                label, NUM_LABELS
            )));
        }
        Ok(LabelAssignment { labels })
    }

    /// Create an assignment from its raw integer representation; negative values mean unassigned.
    pub fn from_raw(raw: &[i64]) -> Result<Self, SNNError> {
        let labels = raw
            .iter()
            .enumerate()
            .map(|(neuron, &value)| match value {
                v if v < 0 => Ok(None),
                v if (v as usize) < NUM_LABELS => Ok(Some(v as Label)),
                v => Err(SNNError::InvalidParameter(format!(
                    "Neuron {} is assigned to label {}, out of range 0..{}",
                    neuron, v, NUM_LABELS
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LabelAssignment { labels })
    }

    /// Returns the raw integer representation of the assignment.
    pub fn to_raw(&self) -> Vec<i64> {
        self.labels
            .iter()
            .map(|label| label.map_or(UNASSIGNED, |l| l as i64))
            .collect()
    }

    /// Returns the number of neurons covered by the assignment.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns whether the assignment covers no neuron.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns the label of the given neuron, if any.
    pub fn get(&self, neuron: usize) -> Option<Label> {
        self.labels.get(neuron).copied().flatten()
    }

    /// Returns an iterator over the labels of all neurons.
    pub fn iter(&self) -> impl Iterator<Item = Option<Label>> + '_ {
        self.labels.iter().copied()
    }

    /// Returns the number of neurons with a label.
    pub fn num_assigned(&self) -> usize {
        self.labels.iter().flatten().count()
    }

    /// Returns the neurons assigned to the given label.
    pub fn neurons_for(&self, label: Label) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == Some(label))
            .map(|(neuron, _)| neuron)
            .collect()
    }

    /// Load the assignment from a one-dimensional `.npy` file.
    /// Integer arrays are read as is; floating-point arrays must hold integral values only.
    pub fn load_npy<P: AsRef<Path>>(path: P) -> Result<Self, SNNError> {
        let path = path.as_ref();
        if let Ok(raw) = Array1::<i64>::read_npy(File::open(path)?) {
            return LabelAssignment::from_raw(&raw.to_vec());
        }
        // Arrays saved on platforms with 32-bit default integers.
        if let Ok(raw) = Array1::<i32>::read_npy(File::open(path)?) {
            return LabelAssignment::from_raw(&raw.mapv(|v| v as i64).to_vec());
        }
        let values = match Array1::<f64>::read_npy(File::open(path)?) {
            Ok(values) => values,
            Err(_) => Array1::<f32>::read_npy(File::open(path)?)
                .map_err(|e| {
                    SNNError::IOError(format!("NPY read error at {}: {}", path.display(), e))
                })?
                .mapv(|v| v as f64),
        };
        let raw = values
            .iter()
            .enumerate()
            .map(|(neuron, &value)| integral_label(neuron, value))
            .collect::<Result<Vec<_>, _>>()?;
        LabelAssignment::from_raw(&raw)
    }

    /// Save the assignment to a one-dimensional `i64` `.npy` file.
    pub fn save_npy<P: AsRef<Path>>(&self, path: P) -> Result<(), SNNError> {
        let writer = BufWriter::new(File::create(path)?);
        Array1::from(self.to_raw())
            .write_npy(writer)
            .map_err(|e| SNNError::IOError(e.to_string()))
    }

    /// Write the assignment as text, one `"<label>;"` line per neuron.
    pub fn write_txt<W: Write>(&self, writer: &mut W) -> Result<(), SNNError> {
        for value in self.to_raw() {
            writeln!(writer, "{};", value)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Save the text mirror of the assignment.
    pub fn save_txt<P: AsRef<Path>>(&self, path: P) -> Result<(), SNNError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_txt(&mut writer)
    }

    /// Read the text mirror of an assignment.
    pub fn read_txt<R: Read>(reader: R) -> Result<Self, SNNError> {
        let mut raw = vec![];
        for (n, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let value = line
                .trim()
                .strip_suffix(';')
                .ok_or_else(|| SNNError::MalformedHandoffFile {
                    line: n + 1,
                    reason: format!("missing ';' terminator in {:?}", line),
                })?;
            let value = value
                .trim()
                .parse::<i64>()
                .map_err(|e| SNNError::MalformedHandoffFile {
                    line: n + 1,
                    reason: e.to_string(),
                })?;
            raw.push(value);
        }
        LabelAssignment::from_raw(&raw)
    }

    /// Load the text mirror of an assignment.
    pub fn load_txt<P: AsRef<Path>>(path: P) -> Result<Self, SNNError> {
        LabelAssignment::read_txt(File::open(path)?)
    }
}

fn integral_label(neuron: usize, value: f64) -> Result<i64, SNNError> {
    if !value.is_finite() || value.fract() != 0.0 || value.abs() > i32::MAX as f64 {
        return Err(SNNError::InvalidParameter(format!(
            "Neuron {} is assigned to non-integral label {}",
            neuron, value
        )));
    }
    Ok(value as i64)
}
