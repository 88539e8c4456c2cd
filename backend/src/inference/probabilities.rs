use shared::{CLASS_COUNT, TumorClass};

use super::model::InferenceError;

/// Four non-negative class probabilities summing to one, in `TumorClass` order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassProbabilities([f64; CLASS_COUNT]);

impl ClassProbabilities {
    /// Normalizes non-negative weights. Degenerate input (zero or non-finite
    /// mass) becomes the uniform distribution.
    pub fn from_weights(weights: [f64; CLASS_COUNT]) -> Self {
        let clamped = weights.map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 });
        let total: f64 = clamped.iter().sum();
        if total <= 0.0 {
            return Self([1.0 / CLASS_COUNT as f64; CLASS_COUNT]);
        }
        Self(clamped.map(|w| w / total))
    }

    /// Takes a head that already emits probabilities; only renormalizes.
    pub fn from_model_output(raw: &[f32]) -> Result<Self, InferenceError> {
        let values = checked_output(raw)?;
        Ok(Self::from_weights(values.map(f64::from)))
    }

    /// Takes raw logits and applies a max-shifted softmax.
    pub fn from_logits(raw: &[f32]) -> Result<Self, InferenceError> {
        let values = checked_output(raw)?.map(f64::from);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Ok(Self::from_weights(values.map(|v| (v - max).exp())))
    }

    pub fn values(&self) -> &[f64; CLASS_COUNT] {
        &self.0
    }

    pub fn get(&self, class: TumorClass) -> f64 {
        self.0[class.index()]
    }

    /// Index and value of the most probable class; the lowest index wins ties.
    pub fn argmax(&self) -> (usize, f64) {
        self.0
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, p)| {
                if p > best.1 { (i, p) } else { best }
            })
    }

    pub fn top_class(&self) -> TumorClass {
        TumorClass::ALL[self.argmax().0]
    }
}

fn checked_output(raw: &[f32]) -> Result<[f32; CLASS_COUNT], InferenceError> {
    let values: [f32; CLASS_COUNT] = raw.try_into().map_err(|_| InferenceError::OutputShape {
        expected: CLASS_COUNT,
        actual: raw.len(),
    })?;
    if values.iter().any(|v| !v.is_finite()) {
        return Err(InferenceError::NonFinite);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_are_normalized() {
        let p = ClassProbabilities::from_weights([2.0, 1.0, 1.0, 0.0]);
        assert_eq!(p.values(), &[0.5, 0.25, 0.25, 0.0]);
        assert_eq!(p.top_class(), TumorClass::NoTumor);
    }

    #[test]
    fn negative_and_nan_weights_are_dropped() {
        let p = ClassProbabilities::from_weights([-1.0, f64::NAN, 3.0, 1.0]);
        assert_eq!(p.values(), &[0.0, 0.0, 0.75, 0.25]);
    }

    #[test]
    fn zero_mass_becomes_uniform() {
        let p = ClassProbabilities::from_weights([0.0; CLASS_COUNT]);
        assert_eq!(p.values(), &[0.25; CLASS_COUNT]);
    }

    #[test]
    fn ties_resolve_to_first_class() {
        let p = ClassProbabilities::from_weights([0.1, 0.4, 0.4, 0.1]);
        assert_eq!(p.argmax().0, 1);
    }

    #[test]
    fn model_output_must_have_four_finite_values() {
        assert!(matches!(
            ClassProbabilities::from_model_output(&[0.5, 0.5]),
            Err(InferenceError::OutputShape { expected: 4, actual: 2 })
        ));
        assert!(matches!(
            ClassProbabilities::from_model_output(&[0.5, f32::INFINITY, 0.0, 0.0]),
            Err(InferenceError::NonFinite)
        ));
        let p = ClassProbabilities::from_model_output(&[0.1, 0.1, 0.1, 0.7]).unwrap();
        assert_eq!(p.top_class(), TumorClass::Pituitary);
    }

    #[test]
    fn normalized_output_keeps_its_confidence() {
        let p = ClassProbabilities::from_model_output(&[0.95, 0.02, 0.02, 0.01]).unwrap();
        assert!((p.get(TumorClass::NoTumor) - 0.95).abs() < 1e-6);
    }

    #[test]
    fn logits_go_through_softmax() {
        let p = ClassProbabilities::from_logits(&[0.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(p.values(), &[0.25; CLASS_COUNT]);

        let p = ClassProbabilities::from_logits(&[1000.0, 0.0, -5.0, 2.0]).unwrap();
        assert_eq!(p.top_class(), TumorClass::NoTumor);
        assert!(p.values().iter().all(|v| v.is_finite()));
        assert!((p.values().iter().sum::<f64>() - 1.0).abs() < 1e-9);

        assert!(matches!(
            ClassProbabilities::from_logits(&[1.0, 2.0, 3.0]),
            Err(InferenceError::OutputShape { expected: 4, actual: 3 })
        ));
    }
}
