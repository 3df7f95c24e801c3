//! Agreement statistics for context reliability weighting.
//!
//! Each context's classifier is scored by leave-one-object-out
//! cross-validation: hold out every distinct labeled object once, refit on the
//! rest, predict the held-out object's observations, and accumulate a 2×2
//! gold × predicted confusion matrix. Cohen's kappa over that matrix, clamped
//! to be non-negative, becomes the context's fusion weight (after
//! normalization across contexts).

use super::classifier::{FitConfig, MarginClassifier};
use super::features::FeatureBank;

/// A 2×2 confusion matrix: `cells[gold][predicted]`, 0 = negative, 1 = positive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    cells: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    /// Record one (gold, predicted) observation, labels in ±1.
    pub fn record(&mut self, gold: i8, predicted: i8) {
        let g = usize::from(gold == 1);
        let p = usize::from(predicted == 1);
        self.cells[g][p] += 1;
    }

    /// Total observations tabulated.
    pub fn total(&self) -> usize {
        self.cells.iter().flatten().sum()
    }

    /// Observed agreement `p_o`.
    pub fn observed_agreement(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.cells[0][0] + self.cells[1][1]) as f64 / total as f64
    }

    /// Chance agreement `p_e` from the gold and predicted marginals.
    pub fn chance_agreement(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let s = total as f64;
        let gold_pos = (self.cells[1][0] + self.cells[1][1]) as f64 / s;
        let pred_pos = (self.cells[0][1] + self.cells[1][1]) as f64 / s;
        gold_pos * pred_pos + (1.0 - gold_pos) * (1.0 - pred_pos)
    }
}

/// Signed Cohen's kappa `(p_o − p_e) / (1 − p_e)`.
///
/// An empty or perfectly-chance matrix yields 0.
pub fn signed_kappa(cm: &ConfusionMatrix) -> f64 {
    let po = cm.observed_agreement();
    let pe = cm.chance_agreement();
    if (1.0 - pe).abs() < f64::EPSILON {
        return 0.0;
    }
    (po - pe) / (1.0 - pe)
}

/// Non-negative kappa: signed kappa clamped to `[0, 1]`.
pub fn kappa(cm: &ConfusionMatrix) -> f64 {
    signed_kappa(cm).clamp(0.0, 1.0)
}

/// Leave-one-object-out confusion matrix for one context.
///
/// For every distinct labeled object, refit on the remaining objects' pairs
/// and predict the held-out object's observations. When the remaining pairs
/// collapse to one class no classifier can be fit; the fold then votes that
/// sole remaining label for every held-out observation. With fewer than two
/// distinct objects no held-out fit is possible and every observation is
/// scored as a majority-class (−1) guess.
pub fn leave_one_object_out(
    bank: &FeatureBank,
    ctx: usize,
    pairs: &[(u32, i8)],
    config: &FitConfig,
) -> ConfusionMatrix {
    let mut cm = ConfusionMatrix::default();

    let mut object_ids: Vec<u32> = pairs.iter().map(|&(o, _)| o).collect();
    object_ids.sort_unstable();
    object_ids.dedup();

    if object_ids.len() < 2 {
        let (_, ys) = bank.rows_for_context(ctx, pairs);
        for y in ys {
            cm.record(y, -1);
        }
        return cm;
    }

    for &held in &object_ids {
        let train_pairs: Vec<(u32, i8)> =
            pairs.iter().copied().filter(|&(o, _)| o != held).collect();
        let (train_xs, train_ys) = bank.rows_for_context(ctx, &train_pairs);
        let fold = MarginClassifier::fit(&train_xs, &train_ys, config);

        let held_pairs: Vec<(u32, i8)> =
            pairs.iter().copied().filter(|&(o, _)| o == held).collect();
        let (held_xs, held_ys) = bank.rows_for_context(ctx, &held_pairs);

        for (x, &gold) in held_xs.iter().zip(&held_ys) {
            let predicted = match &fold {
                Some(c) => c.predict(x),
                // One remaining class: vote it for the held-out fold.
                None => train_ys.first().copied().unwrap_or(-1),
            };
            cm.record(gold, predicted);
        }
    }

    cm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_agreement_is_one() {
        let mut cm = ConfusionMatrix::default();
        for _ in 0..5 {
            cm.record(1, 1);
            cm.record(-1, -1);
        }
        assert!((signed_kappa(&cm) - 1.0).abs() < 1e-9);
        assert!((kappa(&cm) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn chance_agreement_clamps_to_zero() {
        // Uniform cells: observed agreement equals chance agreement.
        let mut cm = ConfusionMatrix::default();
        for _ in 0..3 {
            cm.record(1, 1);
            cm.record(1, -1);
            cm.record(-1, 1);
            cm.record(-1, -1);
        }
        assert!(signed_kappa(&cm) <= 0.0);
        assert_eq!(kappa(&cm), 0.0);
    }

    #[test]
    fn systematic_disagreement_is_negative_before_clamp() {
        let mut cm = ConfusionMatrix::default();
        for _ in 0..5 {
            cm.record(1, -1);
            cm.record(-1, 1);
        }
        assert!(signed_kappa(&cm) < 0.0);
        assert_eq!(kappa(&cm), 0.0);
    }

    #[test]
    fn empty_matrix_is_zero() {
        let cm = ConfusionMatrix::default();
        assert_eq!(signed_kappa(&cm), 0.0);
        assert_eq!(kappa(&cm), 0.0);
    }

    fn four_object_bank() -> FeatureBank {
        // Two cleanly separated clusters in one grasp/haptics context.
        let text = r#"{
            "behaviors": ["grasp"],
            "modalities": ["haptics"],
            "objects": {
                "1": { "grasp": { "haptics": [[1.0, 0.0], [0.9, 0.1]] } },
                "2": { "grasp": { "haptics": [[1.1, 0.1]] } },
                "3": { "grasp": { "haptics": [[0.0, 1.0], [0.1, 0.9]] } },
                "4": { "grasp": { "haptics": [[0.1, 1.1]] } }
            }
        }"#;
        FeatureBank::from_json_str(text).unwrap()
    }

    #[test]
    fn loo_on_separable_objects_is_perfect() {
        let bank = four_object_bank();
        let pairs = vec![(1, 1), (2, 1), (3, -1), (4, -1)];
        let cm = leave_one_object_out(&bank, 0, &pairs, &FitConfig::default());
        assert_eq!(cm.total(), 6);
        assert!((kappa(&cm) - 1.0).abs() < 1e-9, "kappa = {}", kappa(&cm));
    }

    #[test]
    fn loo_single_object_guesses_majority_no() {
        let bank = four_object_bank();
        let pairs = vec![(1, 1)];
        let cm = leave_one_object_out(&bank, 0, &pairs, &FitConfig::default());
        // Two observations, both gold-positive, both guessed negative.
        assert_eq!(cm.total(), 2);
        assert_eq!(cm.observed_agreement(), 0.0);
        assert_eq!(kappa(&cm), 0.0);
    }

    #[test]
    fn loo_two_objects_one_class_each_fold() {
        let bank = four_object_bank();
        // Holding either object out leaves a single class; the fold votes it.
        let pairs = vec![(1, 1), (3, -1)];
        let cm = leave_one_object_out(&bank, 0, &pairs, &FitConfig::default());
        assert_eq!(cm.total(), 4);
        // Held-out 1 (gold +) gets voted −1; held-out 3 (gold −) gets voted +1.
        assert_eq!(cm.observed_agreement(), 0.0);
        assert_eq!(kappa(&cm), 0.0);
    }
}
