//! Module implementing the sliding-window population-vote classifier.
//!
//! Every cycle, the simulator returns one spike counter per output neuron. The classifier buffers
//! these counters in a circular window of `W` slots, together with the true label of the image.
//! Every `W` cycles, each buffered row is classified by population vote: the spikes of all neurons
//! sharing a label are summed, and the label with the strictly greatest tally wins (ties go to the
//! lowest label). Rows without any spike on an assigned neuron stay unclassified and count as
//! wrong. The accuracy of the window is appended to the accuracy history.
//!
//! # Example
//!
//! ```rust
//! use snn_mnist::assignment::LabelAssignment;
//! use snn_mnist::classifier::WindowedClassifier;
//!
//! let assignment = LabelAssignment::from_raw(&[0, 1, 2, 3]).unwrap();
//! let mut classifier = WindowedClassifier::build(2, assignment).unwrap();
//!
//! assert!(classifier.observe(0, vec![0, 4, 1, 0], 1).unwrap().is_none());
//! assert!(classifier.observe(1, vec![2, 0, 0, 0], 3).unwrap().is_none());
//!
//! // Cycle 2 closes the window made of cycles 0 and 1.
//! let report = classifier.observe(2, vec![0, 0, 0, 0], 0).unwrap().unwrap();
//! assert_eq!(report.predictions(), &[Some(1), Some(0)]);
//! assert_eq!(report.accuracy().to_string(), "50.00%");
//! ```
use std::fmt;

use itertools::Itertools;
use log::{debug, info};

use crate::assignment::LabelAssignment;
use crate::error::SNNError;
use crate::{Label, NUM_LABELS};

/// Fraction of correctly classified rows in a window.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Accuracy {
    correct: usize,
    total: usize,
}

impl Accuracy {
    /// Create an accuracy record. The function returns an error if `correct > total` or `total == 0`.
    pub fn build(correct: usize, total: usize) -> Result<Self, SNNError> {
        if total == 0 || correct > total {
            return Err(SNNError::InvalidParameter(format!(
                "Invalid accuracy {}/{}",
                correct, total
            )));
        }
        Ok(Accuracy { correct, total })
    }

    /// Returns the number of correctly classified rows.
    pub fn correct(&self) -> usize {
        self.correct
    }

    /// Returns the number of rows.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Returns the accuracy as a percentage.
    pub fn percent(&self) -> f64 {
        self.correct as f64 / self.total as f64 * 100.0
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.2}%", self.percent())
    }
}

/// Outcome of the evaluation of one window.
#[derive(Debug, PartialEq, Clone)]
pub struct WindowReport {
    cycle: usize,
    predictions: Vec<Option<Label>>,
    labels: Vec<Label>,
    accuracy: Accuracy,
}

impl WindowReport {
    /// Returns the cycle at which the window was evaluated.
    pub fn cycle(&self) -> usize {
        self.cycle
    }

    /// Returns the prediction of every row, in slot order.
    pub fn predictions(&self) -> &[Option<Label>] {
        &self.predictions
    }

    /// Returns the true label of every row, in slot order.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Returns the accuracy of the window.
    pub fn accuracy(&self) -> Accuracy {
        self.accuracy
    }
}

// One buffered cycle.
#[derive(Debug, Clone)]
struct Slot {
    counters: Vec<u32>,
    label: Label,
}

/// Circular window of counter vectors with population-vote evaluation.
#[derive(Debug, Clone)]
pub struct WindowedClassifier {
    assignment: LabelAssignment,
    slots: Vec<Option<Slot>>,
    next_cycle: usize,
    last_evaluated: usize,
    history: Vec<Accuracy>,
}

impl WindowedClassifier {
    /// Create a classifier evaluating every `window` cycles.
    /// The function returns an error for an empty window or an empty assignment.
    pub fn build(window: usize, assignment: LabelAssignment) -> Result<Self, SNNError> {
        if window == 0 {
            return Err(SNNError::InvalidParameter(
                "The window must hold at least one cycle".to_string(),
            ));
        }
        if assignment.is_empty() {
            return Err(SNNError::InvalidParameter(
                "The label assignment is empty".to_string(),
            ));
        }
        Ok(WindowedClassifier {
            assignment,
            slots: vec![None; window],
            next_cycle: 0,
            last_evaluated: 0,
            history: vec![],
        })
    }

    /// Returns the number of cycles per window.
    pub fn window(&self) -> usize {
        self.slots.len()
    }

    /// Returns the label assignment.
    pub fn assignment(&self) -> &LabelAssignment {
        &self.assignment
    }

    /// Returns the cycle expected by the next call to `observe`.
    pub fn next_cycle(&self) -> usize {
        self.next_cycle
    }

    /// Returns the accuracy of every evaluated window, oldest first.
    pub fn history(&self) -> &[Accuracy] {
        &self.history
    }

    /// Returns the accuracy history formatted as a list, e.g., `['73.00%', '80.00%']`.
    pub fn history_string(&self) -> String {
        format!(
            "[{}]",
            self.history.iter().map(|accuracy| format!("'{}'", accuracy)).join(", ")
        )
    }

    /// Record the counters and true label of a cycle.
    ///
    /// Cycles must be observed in order, starting at 0. When `cycle` is a positive multiple of the
    /// window, the window made of the previous `W` cycles is evaluated before slot `cycle % W` is
    /// overwritten, and its report is returned.
    ///
    /// This evaluate-then-store order differs from a store-then-evaluate loop, where slot 0 already
    /// holds cycle `cycle` (paired with the label of cycle `cycle - W`) when the window is scored.
    /// Here every scored slot holds a cycle of the window together with its own label.
    pub fn observe(
        &mut self,
        cycle: usize,
        counters: Vec<u32>,
        label: Label,
    ) -> Result<Option<WindowReport>, SNNError> {
        if cycle != self.next_cycle {
            return Err(SNNError::InvalidOperation(format!(
                "Cycle {} observed while cycle {} was expected",
                cycle, self.next_cycle
            )));
        }
        if counters.len() != self.assignment.len() {
            return Err(SNNError::DimensionMismatch {
                what: "counters".to_string(),
                expected: self.assignment.len(),
                found: counters.len(),
            });
        }
        if label as usize >= NUM_LABELS {
            return Err(SNNError::InvalidParameter(format!(
                "True label {} is out of range 0..{}",
                label, NUM_LABELS
            )));
        }

        let window = self.window();
        let report = if cycle > 0 && cycle % window == 0 && self.last_evaluated < cycle {
            Some(self.evaluate_window(cycle)?)
        } else {
            None
        };

        self.slots[cycle % window] = Some(Slot { counters, label });
        self.next_cycle += 1;
        debug!("Cycle {} stored in slot {}", cycle, cycle % window);

        Ok(report)
    }

    /// Classify the window made of cycles `cycle - W .. cycle` and append its accuracy to the history.
    ///
    /// The function fails if `cycle` is not a positive multiple of the window, if the buffer does not
    /// hold exactly these cycles, or if the window was already evaluated.
    pub fn evaluate_window(&mut self, cycle: usize) -> Result<WindowReport, SNNError> {
        let window = self.window();
        if cycle == 0 || cycle % window != 0 {
            return Err(SNNError::InvalidOperation(format!(
                "Windows are evaluated at positive multiples of {}, not at cycle {}",
                window, cycle
            )));
        }
        if self.next_cycle != cycle {
            return Err(SNNError::InvalidOperation(format!(
                "The buffer holds cycles up to {}, cannot evaluate the window ending at cycle {}",
                self.next_cycle as isize - 1,
                cycle
            )));
        }
        if self.last_evaluated >= cycle {
            return Err(SNNError::InvalidOperation(format!(
                "The window ending at cycle {} was already evaluated",
                cycle
            )));
        }

        let mut predictions = Vec::with_capacity(window);
        let mut labels = Vec::with_capacity(window);
        for (n, slot) in self.slots.iter().enumerate() {
            let slot = slot.as_ref().ok_or_else(|| {
                SNNError::InvalidOperation(format!("Slot {} of the window is empty", n))
            })?;
            predictions.push(classify(&slot.counters, &self.assignment)?);
            labels.push(slot.label);
        }

        let correct = predictions
            .iter()
            .zip(labels.iter())
            .filter(|&(prediction, label)| *prediction == Some(*label))
            .count();
        let accuracy = Accuracy::build(correct, window)?;

        self.history.push(accuracy);
        self.last_evaluated = cycle;

        info!(
            "Predictions: [{}]",
            predictions
                .iter()
                .map(|p| p.map_or(-1, |l| l as i32))
                .join(" ")
        );
        info!("Accuracy: {}", self.history_string());

        Ok(WindowReport {
            cycle,
            predictions,
            labels,
            accuracy,
        })
    }

    /// Evaluate the last window if all its cycles were observed but it was not evaluated yet.
    /// To be called once the run is over.
    pub fn finish(&mut self) -> Result<Option<WindowReport>, SNNError> {
        let cycle = self.next_cycle;
        if cycle > 0 && cycle % self.window() == 0 && self.last_evaluated < cycle {
            return self.evaluate_window(cycle).map(Some);
        }
        Ok(None)
    }
}

/// Returns the total number of spikes of the neurons assigned to every label.
pub fn label_tallies(
    counters: &[u32],
    assignment: &LabelAssignment,
) -> Result<[u64; NUM_LABELS], SNNError> {
    if counters.len() != assignment.len() {
        return Err(SNNError::DimensionMismatch {
            what: "counters".to_string(),
            expected: assignment.len(),
            found: counters.len(),
        });
    }

    let mut tallies = [0u64; NUM_LABELS];
    for (&count, label) in counters.iter().zip(assignment.iter()) {
        if let Some(label) = label {
            tallies[label as usize] += count as u64;
        }
    }
    Ok(tallies)
}

/// Classify one counter vector by population vote.
///
/// Labels are scanned in increasing order and the running maximum is only replaced by a strictly
/// greater tally, so ties resolve to the lowest label. Returns `None` if no label has a positive tally.
pub fn classify(counters: &[u32], assignment: &LabelAssignment) -> Result<Option<Label>, SNNError> {
    let tallies = label_tallies(counters, assignment)?;

    let mut prediction = None;
    let mut max_tally = 0;
    for (label, &tally) in tallies.iter().enumerate() {
        if tally > max_tally {
            max_tally = tally;
            prediction = Some(label as Label);
        }
    }
    Ok(prediction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modulo_assignment(num_neurons: usize) -> LabelAssignment {
        LabelAssignment::from_raw(&(0..num_neurons as i64).map(|i| i % 10).collect::<Vec<_>>())
            .unwrap()
    }

    fn one_hot(num_neurons: usize, neuron: usize) -> Vec<u32> {
        let mut counters = vec![0; num_neurons];
        counters[neuron] = 1;
        counters
    }

    #[test]
    fn test_accuracy_format() {
        assert_eq!(Accuracy::build(73, 100).unwrap().to_string(), "73.00%");
        assert_eq!(Accuracy::build(0, 100).unwrap().to_string(), "0.00%");
        assert_eq!(Accuracy::build(100, 100).unwrap().to_string(), "100.00%");
        assert_eq!(Accuracy::build(1, 3).unwrap().to_string(), "33.33%");
        assert_eq!(Accuracy::build(2, 3).unwrap().to_string(), "66.67%");
        assert!(Accuracy::build(4, 3).is_err());
        assert!(Accuracy::build(0, 0).is_err());
    }

    #[test]
    fn test_classify_tie_break() {
        let assignment = modulo_assignment(20);
        let mut counters = vec![1; 20];
        // Labels 3 and 5 both reach 8, all others reach 2.
        counters[3] = 4;
        counters[13] = 4;
        counters[5] = 7;
        counters[15] = 1;

        assert_eq!(label_tallies(&counters, &assignment).unwrap()[3], 8);
        assert_eq!(label_tallies(&counters, &assignment).unwrap()[5], 8);
        assert_eq!(classify(&counters, &assignment).unwrap(), Some(3));
    }

    #[test]
    fn test_classify_all_zero() {
        let assignment = modulo_assignment(20);
        assert_eq!(classify(&[0; 20], &assignment).unwrap(), None);
    }

    #[test]
    fn test_classify_ignores_unassigned_neurons() {
        let assignment = LabelAssignment::from_raw(&[-1, 2, -1, 4]).unwrap();
        assert_eq!(classify(&[100, 0, 50, 0], &assignment).unwrap(), None);
        assert_eq!(classify(&[100, 1, 50, 2], &assignment).unwrap(), Some(4));
    }

    #[test]
    fn test_classify_length_mismatch() {
        let assignment = modulo_assignment(20);
        assert_eq!(
            classify(&[1, 2, 3], &assignment),
            Err(SNNError::DimensionMismatch {
                what: "counters".to_string(),
                expected: 20,
                found: 3
            })
        );
    }

    #[test]
    fn test_perfect_window() {
        let mut classifier = WindowedClassifier::build(100, modulo_assignment(100)).unwrap();

        for k in 0..100 {
            let report = classifier
                .observe(k, one_hot(100, k), (k % 10) as Label)
                .unwrap();
            assert!(report.is_none());
        }

        let report = classifier.observe(100, vec![0; 100], 0).unwrap().unwrap();
        assert_eq!(report.cycle(), 100);
        assert_eq!(report.accuracy().to_string(), "100.00%");
        assert_eq!(report.predictions()[42], Some(2));
        assert_eq!(report.labels()[42], 2);
        assert_eq!(classifier.history_string(), "['100.00%']");
    }

    #[test]
    fn test_silent_window() {
        let mut classifier = WindowedClassifier::build(100, modulo_assignment(100)).unwrap();

        for k in 0..100 {
            classifier.observe(k, vec![0; 100], (k % 10) as Label).unwrap();
        }

        let report = classifier.finish().unwrap().unwrap();
        assert!(report.predictions().iter().all(|p| p.is_none()));
        assert_eq!(report.accuracy().to_string(), "0.00%");
    }

    #[test]
    fn test_history_is_append_only() {
        let mut classifier = WindowedClassifier::build(4, modulo_assignment(10)).unwrap();

        // First window: 3 of 4 correct.
        let truth = [1, 2, 3, 4, 5, 6, 7, 8, 9, 0, 1, 2];
        let spikes = [1, 2, 3, 9, 5, 6, 0, 0, 9, 0, 1, 2];
        let mut reports = vec![];
        for cycle in 0..12 {
            let counters = if (6..8).contains(&cycle) {
                vec![0; 10]
            } else {
                one_hot(10, spikes[cycle])
            };
            if let Some(report) = classifier.observe(cycle, counters, truth[cycle]).unwrap() {
                reports.push(report);
            }
            assert_eq!(classifier.history().len(), reports.len());
        }
        reports.extend(classifier.finish().unwrap());

        assert_eq!(
            reports.iter().map(|r| r.cycle()).collect::<Vec<_>>(),
            vec![4, 8, 12]
        );
        assert_eq!(
            classifier.history_string(),
            "['75.00%', '50.00%', '100.00%']"
        );
        assert_eq!(reports[1].predictions(), &[Some(5), Some(6), None, None]);

        // A finished run has nothing left to evaluate.
        assert!(classifier.finish().unwrap().is_none());
        assert_eq!(classifier.history().len(), 3);
    }

    #[test]
    fn test_observe_out_of_order() {
        let mut classifier = WindowedClassifier::build(4, modulo_assignment(10)).unwrap();
        assert!(matches!(
            classifier.observe(1, vec![0; 10], 0),
            Err(SNNError::InvalidOperation(_))
        ));
        classifier.observe(0, vec![0; 10], 0).unwrap();
        assert!(matches!(
            classifier.observe(0, vec![0; 10], 0),
            Err(SNNError::InvalidOperation(_))
        ));
        assert_eq!(classifier.next_cycle(), 1);
    }

    #[test]
    fn test_observe_invalid_input() {
        let mut classifier = WindowedClassifier::build(4, modulo_assignment(10)).unwrap();
        assert!(matches!(
            classifier.observe(0, vec![0; 9], 0),
            Err(SNNError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            classifier.observe(0, vec![0; 10], 10),
            Err(SNNError::InvalidParameter(_))
        ));
        // Rejected observations leave the classifier untouched.
        assert_eq!(classifier.next_cycle(), 0);
    }

    #[test]
    fn test_evaluate_window_contract() {
        let mut classifier = WindowedClassifier::build(4, modulo_assignment(10)).unwrap();

        // Window not full yet.
        for cycle in 0..3 {
            classifier.observe(cycle, one_hot(10, 1), 1).unwrap();
        }
        assert!(matches!(
            classifier.evaluate_window(4),
            Err(SNNError::InvalidOperation(_))
        ));
        assert!(matches!(
            classifier.evaluate_window(0),
            Err(SNNError::InvalidOperation(_))
        ));
        assert!(matches!(
            classifier.evaluate_window(3),
            Err(SNNError::InvalidOperation(_))
        ));

        classifier.observe(3, one_hot(10, 1), 1).unwrap();
        let report = classifier.evaluate_window(4).unwrap();
        assert_eq!(report.accuracy().to_string(), "100.00%");

        // The same window is evaluated once only, also through observe and finish.
        assert!(matches!(
            classifier.evaluate_window(4),
            Err(SNNError::InvalidOperation(_))
        ));
        assert!(classifier.finish().unwrap().is_none());
        assert!(classifier.observe(4, one_hot(10, 1), 1).unwrap().is_none());
        assert_eq!(classifier.history().len(), 1);
    }

    #[test]
    fn test_build_invalid() {
        assert!(matches!(
            WindowedClassifier::build(0, modulo_assignment(10)),
            Err(SNNError::InvalidParameter(_))
        ));
        assert!(matches!(
            WindowedClassifier::build(10, LabelAssignment::from_raw(&[]).unwrap()),
            Err(SNNError::InvalidParameter(_))
        ));
    }
}
