//! This crate provides the numeric front-end of a spiking neural network (SNN) classifier for MNIST.
//!
//! The network itself runs in an external event-driven simulator. This crate turns images into
//! rate-coded spike trains, hands them to the simulator, and decodes the output spike counters into
//! label predictions by population vote over a sliding window of cycles.
//!
//! # Encoding Images
//!
//! ```rust
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use snn_mnist::config::Config;
//! use snn_mnist::spike_train::SpikeEncoder;
//!
//! let config = Config::default();
//! let encoder = SpikeEncoder::from_config(&config).unwrap();
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let image = vec![128.0; config.num_inputs];
//! let spike_train = encoder.encode(&image, &mut rng).unwrap();
//!
//! assert_eq!(spike_train.num_steps(), 3500);
//! assert_eq!(spike_train.num_inputs(), 784);
//! ```
//!
//! # Running the Pipeline
//!
//! ```rust
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use snn_mnist::assignment::LabelAssignment;
//! use snn_mnist::config::Config;
//! use snn_mnist::dataset::InMemoryDataset;
//! use snn_mnist::error::SNNError;
//! use snn_mnist::pipeline::Pipeline;
//! use snn_mnist::spike_train::SpikeTrain;
//!
//! // Four pixels, four output neurons, one evaluation every two images.
//! let config = Config::build(1.0, 20.0, 50.0, 2, 4, 4).unwrap();
//! let dataset = InMemoryDataset::build(
//!     vec![vec![255.0, 0.0, 0.0, 0.0], vec![0.0, 0.0, 255.0, 0.0]],
//!     vec![0, 2],
//! )
//! .unwrap();
//! let assignment = LabelAssignment::from_raw(&[0, 1, 2, 3]).unwrap();
//!
//! // A stand-in for the simulator: every output neuron relays one input.
//! let simulator = |spike_train: &SpikeTrain| -> Result<Vec<u32>, SNNError> {
//!     Ok(spike_train.input_spike_counts().iter().map(|&c| c as u32).collect())
//! };
//!
//! let mut pipeline = Pipeline::build(&config, dataset, simulator, assignment).unwrap();
//! let mut rng = StdRng::seed_from_u64(42);
//! let accuracies = pipeline.run(2, &mut rng).unwrap();
//!
//! assert_eq!(accuracies[0].to_string(), "100.00%");
//! ```

pub mod assignment;
pub mod classifier;
pub mod config;
pub mod counters;
pub mod dataset;
pub mod error;
pub mod params;
pub mod pipeline;
pub mod simulator;
pub mod spike_train;

/// A class label, from 0 to `NUM_LABELS - 1`.
pub type Label = u8;

/// The number of classes.
pub const NUM_LABELS: usize = 10;
/// The number of pixels of an MNIST image.
pub const NUM_INPUTS: usize = 784;
/// The number of neurons of the output layer.
pub const NUM_NEURONS: usize = 400;
/// The duration of a time bin, in milliseconds.
pub const DEFAULT_DT: f64 = 0.1;
/// The duration of a spike train, in milliseconds.
pub const DEFAULT_TRAIN_DURATION: f64 = 350.0;
/// The scaling from pixel values to input firing rates.
pub const DEFAULT_INPUT_INTENSITY: f64 = 2.0;
/// The number of images after which the accuracy is evaluated.
pub const DEFAULT_UPDATE_INTERVAL: usize = 100;
