//! The processing loop: one image per cycle, encoded, simulated and decoded.
//!
//! Cycles run strictly one after the other: a cycle encodes its image, waits for the simulator,
//! and hands the counters to the classifier before the next one starts.
use log::{debug, info};
use rand::Rng;

use crate::assignment::LabelAssignment;
use crate::classifier::{Accuracy, WindowReport, WindowedClassifier};
use crate::config::Config;
use crate::dataset::DatasetSource;
use crate::error::SNNError;
use crate::simulator::SimulationBridge;
use crate::spike_train::SpikeEncoder;

/// Drives the encoder, the simulator and the classifier over a dataset.
pub struct Pipeline<D: DatasetSource, S: SimulationBridge> {
    num_neurons: usize,
    encoder: SpikeEncoder,
    dataset: D,
    simulator: S,
    classifier: WindowedClassifier,
}

impl<D: DatasetSource, S: SimulationBridge> Pipeline<D, S> {
    /// Create a pipeline with the specified components.
    /// The function returns an error if the configuration is invalid or the assignment does not cover every output neuron.
    pub fn build(
        config: &Config,
        dataset: D,
        simulator: S,
        assignment: LabelAssignment,
    ) -> Result<Self, SNNError> {
        config.validate()?;
        if assignment.len() != config.num_neurons {
            return Err(SNNError::DimensionMismatch {
                what: "label assignment".to_string(),
                expected: config.num_neurons,
                found: assignment.len(),
            });
        }

        Ok(Pipeline {
            num_neurons: config.num_neurons,
            encoder: SpikeEncoder::from_config(config)?,
            dataset,
            simulator,
            classifier: WindowedClassifier::build(config.update_interval, assignment)?,
        })
    }

    /// Returns the classifier.
    pub fn classifier(&self) -> &WindowedClassifier {
        &self.classifier
    }

    /// Returns the accuracy of every evaluated window.
    pub fn accuracies(&self) -> &[Accuracy] {
        self.classifier.history()
    }

    /// Run the next cycle on the image of the same index.
    /// Returns the report of the window closed by this cycle, if any.
    pub fn step<R: Rng>(&mut self, rng: &mut R) -> Result<Option<WindowReport>, SNNError> {
        let cycle = self.classifier.next_cycle();
        let image = cycle;
        self.run_cycle(cycle, image, rng)
            .map_err(|e| e.in_cycle(cycle, image))
    }

    fn run_cycle<R: Rng>(
        &mut self,
        cycle: usize,
        image: usize,
        rng: &mut R,
    ) -> Result<Option<WindowReport>, SNNError> {
        let (pixels, label) = self.dataset.get(image)?;
        let spike_train = self.encoder.encode(pixels, rng)?;
        debug!(
            "Cycle {}: image {} (label {}) encoded into {} spikes",
            cycle,
            image,
            label,
            spike_train.num_spikes()
        );

        let counters = self.simulator.run(&spike_train)?;
        if counters.len() != self.num_neurons {
            return Err(SNNError::DimensionMismatch {
                what: "counters".to_string(),
                expected: self.num_neurons,
                found: counters.len(),
            });
        }

        self.classifier.observe(cycle, counters, label)
    }

    /// Run `num_cycles` cycles, stopping at the last image of the dataset, then evaluate the last
    /// window if it is complete. Returns the accuracy history.
    ///
    /// A later call resumes from the next unseen image.
    pub fn run<R: Rng>(&mut self, num_cycles: usize, rng: &mut R) -> Result<&[Accuracy], SNNError> {
        let remaining = self
            .dataset
            .len()
            .saturating_sub(self.classifier.next_cycle());
        let num_cycles = num_cycles.min(remaining);
        info!(
            "Running {} cycles with an evaluation every {} cycles",
            num_cycles,
            self.classifier.window()
        );

        for _ in 0..num_cycles {
            info!("Iteration: {}", self.classifier.next_cycle() + 1);
            self.step(rng)?;
        }
        self.classifier.finish()?;

        Ok(self.classifier.history())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::dataset::InMemoryDataset;
    use crate::spike_train::SpikeTrain;

    const SEED: u64 = 42;

    // Every image lights up one pixel, the pixel index being its label.
    fn one_pixel_dataset(num_images: usize) -> InMemoryDataset {
        let images = (0..num_images)
            .map(|i| {
                let mut image = vec![0.0; 10];
                image[i % 10] = 255.0;
                image
            })
            .collect();
        let labels = (0..num_images).map(|i| (i % 10) as u8).collect();
        InMemoryDataset::build(images, labels).unwrap()
    }

    fn small_config(update_interval: usize) -> Config {
        Config::build(1.0, 50.0, 20.0, update_interval, 10, 20).unwrap()
    }

    fn modulo_assignment(num_neurons: usize) -> LabelAssignment {
        LabelAssignment::from_raw(&(0..num_neurons as i64).map(|i| i % 10).collect::<Vec<_>>())
            .unwrap()
    }

    // Neurons `i` and `i + 10` count the spikes of input `i`.
    fn relay(spike_train: &SpikeTrain) -> Result<Vec<u32>, SNNError> {
        let counts = spike_train.input_spike_counts();
        Ok(counts.iter().chain(counts.iter()).map(|&c| c as u32).collect())
    }

    #[test]
    fn test_pipeline_run() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let mut pipeline =
            Pipeline::build(&small_config(5), one_pixel_dataset(20), relay, modulo_assignment(20))
                .unwrap();

        let accuracies = pipeline.run(20, &mut rng).unwrap();
        assert_eq!(accuracies.len(), 4);
        assert!(accuracies.iter().all(|a| a.to_string() == "100.00%"));
    }

    #[test]
    fn test_pipeline_run_capped_by_dataset() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let mut pipeline =
            Pipeline::build(&small_config(4), one_pixel_dataset(9), relay, modulo_assignment(20))
                .unwrap();

        // 9 cycles: windows closed at cycles 4 and 8, the last window is incomplete.
        let accuracies = pipeline.run(1000, &mut rng).unwrap();
        assert_eq!(accuracies.len(), 2);
        assert_eq!(pipeline.classifier().next_cycle(), 9);
    }

    #[test]
    fn test_pipeline_run_resumes() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let mut pipeline =
            Pipeline::build(&small_config(4), one_pixel_dataset(10), relay, modulo_assignment(20))
                .unwrap();

        assert_eq!(pipeline.run(6, &mut rng).unwrap().len(), 1);
        assert_eq!(pipeline.classifier().next_cycle(), 6);

        // Only 4 images are left.
        assert_eq!(pipeline.run(6, &mut rng).unwrap().len(), 2);
        assert_eq!(pipeline.classifier().next_cycle(), 10);

        // Nothing left to run.
        assert_eq!(pipeline.run(6, &mut rng).unwrap().len(), 2);
        assert_eq!(pipeline.classifier().next_cycle(), 10);
    }

    #[test]
    fn test_pipeline_silent_simulator() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let silent = |_: &SpikeTrain| -> Result<Vec<u32>, SNNError> { Ok(vec![0; 20]) };
        let mut pipeline =
            Pipeline::build(&small_config(5), one_pixel_dataset(10), silent, modulo_assignment(20))
                .unwrap();

        let accuracies = pipeline.run(10, &mut rng).unwrap();
        assert_eq!(accuracies.len(), 2);
        assert!(accuracies.iter().all(|a| a.to_string() == "0.00%"));
    }

    #[test]
    fn test_pipeline_reports_failing_cycle() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let mut calls = 0;
        let flaky = move |spike_train: &SpikeTrain| {
            calls += 1;
            if calls == 4 {
                Err(SNNError::SimulatorFailure("crashed".to_string()))
            } else {
                relay(spike_train)
            }
        };
        let mut pipeline =
            Pipeline::build(&small_config(5), one_pixel_dataset(10), flaky, modulo_assignment(20))
                .unwrap();

        assert_eq!(
            pipeline.run(10, &mut rng),
            Err(SNNError::CycleFailure {
                cycle: 3,
                image: 3,
                source: Box::new(SNNError::SimulatorFailure("crashed".to_string())),
            })
        );
        // The failed cycle wrote nothing.
        assert_eq!(pipeline.classifier().next_cycle(), 3);
    }

    #[test]
    fn test_pipeline_counter_length_mismatch() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let short = |_: &SpikeTrain| -> Result<Vec<u32>, SNNError> { Ok(vec![1; 19]) };
        let mut pipeline =
            Pipeline::build(&small_config(5), one_pixel_dataset(10), short, modulo_assignment(20))
                .unwrap();

        match pipeline.step(&mut rng) {
            Err(SNNError::CycleFailure { cycle, source, .. }) => {
                assert_eq!(cycle, 0);
                assert!(matches!(*source, SNNError::DimensionMismatch { .. }));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_pipeline_build_invalid() {
        assert!(matches!(
            Pipeline::build(&small_config(5), one_pixel_dataset(10), relay, modulo_assignment(19)),
            Err(SNNError::DimensionMismatch { .. })
        ));

        // Images of the wrong size are reported with their cycle.
        let mut rng = StdRng::seed_from_u64(SEED);
        let dataset = InMemoryDataset::build(vec![vec![1.0; 9]], vec![0]).unwrap();
        let mut pipeline =
            Pipeline::build(&small_config(5), dataset, relay, modulo_assignment(20)).unwrap();
        assert!(matches!(
            pipeline.step(&mut rng),
            Err(SNNError::CycleFailure { cycle: 0, image: 0, .. })
        ));
    }
}
