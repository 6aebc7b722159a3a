//! Text mirrors of the network parameter dumps.
//!
//! The calibration stage stores the neuron thresholds and the synaptic weights as `.npy` arrays.
//! The simulator reads plain-text copies of them:
//! - thresholds: every element on its own line, in row-major order;
//! - weights: one matrix row per line, elements separated by a single space.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use log::info;
use ndarray::{Array2, ArrayD, Axis, Ix2};
use ndarray_npy::ReadNpyExt;

use crate::error::SNNError;

/// File names of the parameter dumps inside a parameters directory.
pub const THRESHOLDS_NPY: &str = "thresholds.npy";
pub const WEIGHTS_NPY: &str = "weights.npy";
pub const THRESHOLDS_TXT: &str = "thresholdsOut.txt";
pub const WEIGHTS_TXT: &str = "weightsOut.txt";

/// Load a one- or two-dimensional floating-point `.npy` array as a matrix.
/// One-dimensional arrays become a single row.
pub fn load_matrix<P: AsRef<Path>>(path: P) -> Result<Array2<f64>, SNNError> {
    let path = path.as_ref();
    let array = match ArrayD::<f64>::read_npy(File::open(path)?) {
        Ok(array) => array,
        Err(_) => ArrayD::<f32>::read_npy(File::open(path)?)
            .map_err(|e| SNNError::IOError(format!("NPY read error at {}: {}", path.display(), e)))?
            .mapv(|v| v as f64),
    };

    let array = match array.ndim() {
        1 => array.insert_axis(Axis(0)),
        2 => array,
        n => {
            return Err(SNNError::InvalidParameter(format!(
                "Expected a 1-D or 2-D array in {}, got {} dimensions",
                path.display(),
                n
            )))
        }
    };
    array
        .into_dimensionality::<Ix2>()
        .map_err(|e| SNNError::InvalidParameter(e.to_string()))
}

/// Write every element of the thresholds, one per line.
pub fn write_thresholds_txt<W: Write>(writer: &mut W, thresholds: &Array2<f64>) -> Result<(), SNNError> {
    for value in thresholds.iter() {
        writeln!(writer, "{}", value)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the weights, one row per line.
pub fn write_weights_txt<W: Write>(writer: &mut W, weights: &Array2<f64>) -> Result<(), SNNError> {
    for row in weights.rows() {
        writeln!(writer, "{}", row.iter().join(" "))?;
    }
    writer.flush()?;
    Ok(())
}

/// Convert `thresholds.npy` and `weights.npy` of a parameters directory into their text mirrors.
pub fn export_parameters<P: AsRef<Path>>(dir: P) -> Result<(), SNNError> {
    let dir = dir.as_ref();

    let thresholds = load_matrix(dir.join(THRESHOLDS_NPY))?;
    let mut writer = BufWriter::new(File::create(dir.join(THRESHOLDS_TXT))?);
    write_thresholds_txt(&mut writer, &thresholds)?;
    info!(
        "Exported {} thresholds to {}",
        thresholds.len(),
        dir.join(THRESHOLDS_TXT).display()
    );

    let weights = load_matrix(dir.join(WEIGHTS_NPY))?;
    let mut writer = BufWriter::new(File::create(dir.join(WEIGHTS_TXT))?);
    write_weights_txt(&mut writer, &weights)?;
    info!(
        "Exported {}x{} weights to {}",
        weights.nrows(),
        weights.ncols(),
        dir.join(WEIGHTS_TXT).display()
    );

    Ok(())
}
