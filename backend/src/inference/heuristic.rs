use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

use super::features::FeatureVector;
use super::probabilities::ClassProbabilities;

/// Upper bound of the per-class noise added on top of a branch's base mass.
pub const JITTER: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicators {
    pub abnormal_darkness: bool,
    pub high_contrast: bool,
    pub asymmetric: bool,
    pub unusually_bright: bool,
}

impl From<&FeatureVector> for Indicators {
    fn from(features: &FeatureVector) -> Self {
        Self {
            abnormal_darkness: features.dark_ratio > 0.15,
            high_contrast: features.edge_ratio > 0.08,
            asymmetric: features.asymmetry > 40.0,
            unusually_bright: features.bright_ratio > 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicBranch {
    Healthy,
    Glioma,
    Meningioma,
    Pituitary,
    Borderline,
}

impl HeuristicBranch {
    /// First matching rule wins; the conditions overlap.
    pub fn select(features: &FeatureVector) -> Self {
        let flags = Indicators::from(features);
        let dark = features.dark_ratio;

        if !flags.abnormal_darkness && !flags.asymmetric && dark < 0.12 {
            HeuristicBranch::Healthy
        } else if flags.abnormal_darkness && flags.high_contrast && flags.asymmetric {
            HeuristicBranch::Glioma
        } else if flags.abnormal_darkness && !flags.high_contrast {
            HeuristicBranch::Meningioma
        } else if flags.unusually_bright || (dark > 0.12 && dark < 0.18) {
            HeuristicBranch::Pituitary
        } else {
            HeuristicBranch::Borderline
        }
    }

    fn base_mass(self) -> [f64; 4] {
        match self {
            HeuristicBranch::Healthy => [0.85, 0.0, 0.0, 0.0],
            HeuristicBranch::Glioma => [0.0, 0.80, 0.0, 0.0],
            HeuristicBranch::Meningioma => [0.0, 0.0, 0.78, 0.0],
            HeuristicBranch::Pituitary => [0.0, 0.0, 0.0, 0.75],
            HeuristicBranch::Borderline => [0.55, 0.30, 0.0, 0.0],
        }
    }
}

/// Rule-based stand-in for a trained network.
pub struct SyntheticClassifier {
    rng: Mutex<StdRng>,
}

impl SyntheticClassifier {
    pub fn new(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_os_rng())
    }

    pub fn classify(&self, features: &FeatureVector) -> (HeuristicBranch, ClassProbabilities) {
        let branch = HeuristicBranch::select(features);
        let mut weights = branch.base_mass();
        {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            for weight in weights.iter_mut() {
                *weight += rng.random_range(0.0..JITTER);
            }
        }
        (branch, ClassProbabilities::from_weights(weights))
    }
}
