//! Sources of labelled images.
//!
//! [`MnistDataset`] reads the IDX files distributed with MNIST (e.g., `t10k-images-idx3-ubyte` and
//! `t10k-labels-idx1-ubyte`); pixels are kept as raw intensities in `0..=255`.
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::info;

use crate::error::SNNError;
use crate::{Label, NUM_LABELS};

/// Magic number of an IDX file holding `u8` images.
pub const IMAGES_MAGIC: u32 = 0x0000_0803;
/// Magic number of an IDX file holding `u8` labels.
pub const LABELS_MAGIC: u32 = 0x0000_0801;

/// Ordered collection of (image, true label) pairs.
pub trait DatasetSource {
    /// Returns the number of samples.
    fn len(&self) -> usize;

    /// Returns the image and true label of the given sample.
    fn get(&self, index: usize) -> Result<(&[f64], Label), SNNError>;

    /// Returns whether the dataset has no sample.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dataset held in memory, with images of identical length.
#[derive(Debug, PartialEq, Clone)]
pub struct InMemoryDataset {
    image_len: usize,
    // Images stored back to back.
    pixels: Vec<f64>,
    labels: Vec<Label>,
}

impl InMemoryDataset {
    /// Create a dataset from images and their labels.
    /// The function returns an error if the images have different lengths, or if the number of images and labels differ.
    pub fn build(images: Vec<Vec<f64>>, labels: Vec<Label>) -> Result<Self, SNNError> {
        if images.len() != labels.len() {
            return Err(SNNError::DimensionMismatch {
                what: "labels".to_string(),
                expected: images.len(),
                found: labels.len(),
            });
        }
        if let Some(label) = labels.iter().find(|&&l| l as usize >= NUM_LABELS) {
            return Err(SNNError::InvalidParameter(format!(
                "Label {} is out of range 0..{}",
                label, NUM_LABELS
            )));
        }

        let image_len = images.first().map_or(0, |image| image.len());
        let mut pixels = Vec::with_capacity(image_len * images.len());
        for image in images {
            if image.len() != image_len {
                return Err(SNNError::DimensionMismatch {
                    what: "image".to_string(),
                    expected: image_len,
                    found: image.len(),
                });
            }
            pixels.extend(image);
        }

        Ok(InMemoryDataset {
            image_len,
            pixels,
            labels,
        })
    }

    /// Returns the number of pixels per image.
    pub fn image_len(&self) -> usize {
        self.image_len
    }
}

impl DatasetSource for InMemoryDataset {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, index: usize) -> Result<(&[f64], Label), SNNError> {
        let label = *self.labels.get(index).ok_or_else(|| {
            SNNError::OutOfBounds(format!(
                "Image {} requested from a dataset of {} images",
                index,
                self.labels.len()
            ))
        })?;
        let start = index * self.image_len;
        Ok((&self.pixels[start..start + self.image_len], label))
    }
}

/// MNIST dataset loaded from IDX files.
#[derive(Debug, PartialEq, Clone)]
pub struct MnistDataset {
    rows: usize,
    cols: usize,
    inner: InMemoryDataset,
}

impl MnistDataset {
    /// Load the images and labels files.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(images: P, labels: Q) -> Result<Self, SNNError> {
        let dataset = MnistDataset::read_from(
            BufReader::new(File::open(images.as_ref())?),
            BufReader::new(File::open(labels.as_ref())?),
        )?;
        info!(
            "Loaded {} images of {}x{} pixels from {}",
            dataset.len(),
            dataset.rows,
            dataset.cols,
            images.as_ref().display()
        );
        Ok(dataset)
    }

    /// Read a dataset from IDX streams.
    pub fn read_from<R: Read, S: Read>(mut images: R, mut labels: S) -> Result<Self, SNNError> {
        if read_u32(&mut images)? != IMAGES_MAGIC {
            return Err(SNNError::InvalidParameter(
                "Not an IDX image file".to_string(),
            ));
        }
        let num_images = read_u32(&mut images)? as usize;
        let rows = read_u32(&mut images)? as usize;
        let cols = read_u32(&mut images)? as usize;
        let image_size = match rows.checked_mul(cols) {
            Some(size) if size > 0 => size,
            _ => {
                return Err(SNNError::InvalidParameter(format!(
                    "Invalid image shape {}x{}",
                    rows, cols
                )))
            }
        };
        let num_pixels = num_images.checked_mul(image_size).ok_or_else(|| {
            SNNError::InvalidParameter(format!(
                "Invalid dataset shape {}x{}x{}",
                num_images, rows, cols
            ))
        })?;

        if read_u32(&mut labels)? != LABELS_MAGIC {
            return Err(SNNError::InvalidParameter(
                "Not an IDX label file".to_string(),
            ));
        }
        let num_labels = read_u32(&mut labels)? as usize;
        if num_labels != num_images {
            return Err(SNNError::DimensionMismatch {
                what: "labels".to_string(),
                expected: num_images,
                found: num_labels,
            });
        }

        let raw_pixels = read_bytes(&mut images, num_pixels, "images")?;
        let raw_labels = read_bytes(&mut labels, num_labels, "labels")?;

        let images = raw_pixels
            .chunks(image_size)
            .map(|image| image.iter().map(|&p| p as f64).collect())
            .collect();
        let inner = InMemoryDataset::build(images, raw_labels)?;

        Ok(MnistDataset { rows, cols, inner })
    }

    /// Returns the number of pixel rows of each image.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns the number of pixel columns of each image.
    pub fn cols(&self) -> usize {
        self.cols
    }
}

impl DatasetSource for MnistDataset {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn get(&self, index: usize) -> Result<(&[f64], Label), SNNError> {
        self.inner.get(index)
    }
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, SNNError> {
    let mut buffer = [0u8; 4];
    reader.read_exact(&mut buffer)?;
    Ok(u32::from_be_bytes(buffer))
}

// Reads exactly `len` bytes; the buffer grows with the data so a forged header cannot force a
// huge allocation.
fn read_bytes<R: Read>(reader: &mut R, len: usize, what: &str) -> Result<Vec<u8>, SNNError> {
    let mut buffer = vec![];
    reader.take(len as u64).read_to_end(&mut buffer)?;
    if buffer.len() != len {
        return Err(SNNError::DimensionMismatch {
            what: format!("{} bytes", what),
            expected: len,
            found: buffer.len(),
        });
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx_images(images: &[[u8; 4]]) -> Vec<u8> {
        let mut bytes = vec![];
        for value in [IMAGES_MAGIC, images.len() as u32, 2, 2] {
            bytes.extend(value.to_be_bytes());
        }
        for image in images {
            bytes.extend(image);
        }
        bytes
    }

    fn idx_labels(labels: &[u8]) -> Vec<u8> {
        let mut bytes = vec![];
        for value in [LABELS_MAGIC, labels.len() as u32] {
            bytes.extend(value.to_be_bytes());
        }
        bytes.extend(labels);
        bytes
    }

    #[test]
    fn test_mnist_read() {
        let images = idx_images(&[[0, 255, 3, 4], [9, 8, 7, 6]]);
        let labels = idx_labels(&[7, 2]);

        let dataset = MnistDataset::read_from(&images[..], &labels[..]).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!((dataset.rows(), dataset.cols()), (2, 2));
        assert_eq!(dataset.get(0).unwrap(), (&[0.0, 255.0, 3.0, 4.0][..], 7));
        assert_eq!(dataset.get(1).unwrap(), (&[9.0, 8.0, 7.0, 6.0][..], 2));
        assert!(matches!(dataset.get(2), Err(SNNError::OutOfBounds(_))));
    }

    #[test]
    fn test_mnist_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("images"), idx_images(&[[1, 2, 3, 4]])).unwrap();
        std::fs::write(dir.path().join("labels"), idx_labels(&[5])).unwrap();

        let dataset = MnistDataset::load(dir.path().join("images"), dir.path().join("labels")).unwrap();
        assert_eq!(dataset.get(0).unwrap().1, 5);
    }

    #[test]
    fn test_mnist_invalid() {
        let images = idx_images(&[[0, 1, 2, 3], [4, 5, 6, 7]]);

        // Wrong magic numbers.
        assert!(matches!(
            MnistDataset::read_from(&idx_labels(&[1, 2])[..], &idx_labels(&[1, 2])[..]),
            Err(SNNError::InvalidParameter(_))
        ));
        assert!(matches!(
            MnistDataset::read_from(&images[..], &images[..]),
            Err(SNNError::InvalidParameter(_))
        ));
        // Label count mismatch.
        assert!(matches!(
            MnistDataset::read_from(&images[..], &idx_labels(&[1])[..]),
            Err(SNNError::DimensionMismatch { .. })
        ));
        // Truncated pixels.
        assert_eq!(
            MnistDataset::read_from(&images[..images.len() - 1], &idx_labels(&[1, 2])[..]).err(),
            Some(SNNError::DimensionMismatch {
                what: "images bytes".to_string(),
                expected: 8,
                found: 7,
            })
        );
        // Label out of range.
        assert!(matches!(
            MnistDataset::read_from(&images[..], &idx_labels(&[1, 10])[..]),
            Err(SNNError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_in_memory_dataset() {
        let dataset = InMemoryDataset::build(vec![vec![1.0, 2.0], vec![3.0, 4.0]], vec![0, 9]).unwrap();
        assert_eq!(dataset.image_len(), 2);
        assert_eq!(dataset.get(1).unwrap(), (&[3.0, 4.0][..], 9));
        assert!(!dataset.is_empty());

        assert!(matches!(
            InMemoryDataset::build(vec![vec![1.0, 2.0], vec![3.0]], vec![0, 9]),
            Err(SNNError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            InMemoryDataset::build(vec![vec![1.0]], vec![0, 9]),
            Err(SNNError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            InMemoryDataset::build(vec![vec![1.0]], vec![12]),
            Err(SNNError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_mnist_forged_header() {
        let header = |num_images: u32, rows: u32, cols: u32| {
            let mut bytes = vec![];
            for value in [IMAGES_MAGIC, num_images, rows, cols] {
                bytes.extend(value.to_be_bytes());
            }
            bytes
        };
        let labels = idx_labels(&[1]);

        // The total number of pixels does not fit in memory addresses.
        let images = header(u32::MAX, u32::MAX, u32::MAX);
        assert!(matches!(
            MnistDataset::read_from(&images[..], &labels[..]),
            Err(SNNError::InvalidParameter(_))
        ));

        // A huge announced shape with no pixels behind it.
        let images = header(1, 65535, 65535);
        assert!(matches!(
            MnistDataset::read_from(&images[..], &labels[..]),
            Err(SNNError::DimensionMismatch { found: 0, .. })
        ));
    }
}
