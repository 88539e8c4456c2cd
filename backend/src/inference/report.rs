use shared::{AnalysisResult, ClassPrediction, TumorClass, TumorLevel};
use std::time::Duration;

use super::probabilities::ClassProbabilities;

pub const MAX_RECOMMENDATIONS: usize = 4;

const DETECTED_ADVICE: [&str; 4] = [
    "Immediate consultation with a neurosurgeon is recommended",
    "Additional contrast MRI scan may be beneficial for detailed assessment",
    "Consider molecular testing for precise treatment planning",
    "Regular monitoring with follow-up scans every 3 months",
];

const CLEAR_ADVICE: [&str; 5] = [
    "No tumor detected in the scan",
    "Continue with routine health monitoring",
    "Maintain healthy lifestyle practices",
    "Follow up with your physician as scheduled",
    "Report any new symptoms immediately",
];

pub fn tumor_level(detected: bool, confidence: f64) -> TumorLevel {
    if !detected {
        TumorLevel::None
    } else if confidence > 0.9 {
        TumorLevel::Large
    } else if confidence > 0.7 {
        TumorLevel::Medium
    } else {
        TumorLevel::Small
    }
}

pub fn recommendations(class: TumorClass, confidence: f64) -> Vec<String> {
    let advice: Vec<String> = if class == TumorClass::NoTumor {
        CLEAR_ADVICE.iter().map(|s| s.to_string()).collect()
    } else {
        std::iter::once(format!(
            "{} detected with {:.1}% confidence",
            class,
            confidence * 100.0
        ))
        .chain(DETECTED_ADVICE.iter().map(|s| s.to_string()))
        .collect()
    };
    advice.into_iter().take(MAX_RECOMMENDATIONS).collect()
}

fn percent(probability: f64) -> u8 {
    (probability * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Turns a probability vector into the user-facing report.
pub fn synthesize(probabilities: &ClassProbabilities, elapsed: Duration) -> AnalysisResult {
    let class = probabilities.top_class();
    let max_confidence = probabilities.get(class);
    let detected = class != TumorClass::NoTumor;

    AnalysisResult {
        tumor_detected: detected,
        confidence: percent(max_confidence),
        tumor_level: tumor_level(detected, max_confidence),
        tumor_type: class.to_string(),
        recommendations: recommendations(class, max_confidence),
        processing_time: elapsed.as_secs_f64(),
        all_predictions: TumorClass::ALL
            .iter()
            .zip(probabilities.values())
            .map(|(class, p)| ClassPrediction {
                class_name: class.to_string(),
                confidence: percent(*p),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(weights: [f64; 4]) -> AnalysisResult {
        synthesize(
            &ClassProbabilities::from_weights(weights),
            Duration::from_millis(1500),
        )
    }

    #[test]
    fn severity_follows_confidence_tiers() {
        assert_eq!(report([0.02, 0.95, 0.02, 0.01]).tumor_level, TumorLevel::Large);
        assert_eq!(report([0.1, 0.1, 0.75, 0.05]).tumor_level, TumorLevel::Medium);
        assert_eq!(report([0.15, 0.15, 0.15, 0.55]).tumor_level, TumorLevel::Small);
        assert_eq!(report([0.95, 0.02, 0.02, 0.01]).tumor_level, TumorLevel::None);
    }

    #[test]
    fn tier_boundaries_are_exclusive() {
        assert_eq!(tumor_level(true, 0.9), TumorLevel::Medium);
        assert_eq!(tumor_level(true, 0.7), TumorLevel::Small);
        assert_eq!(tumor_level(false, 0.99), TumorLevel::None);
    }

    #[test]
    fn detection_report_leads_with_class_and_confidence() {
        let result = report([0.05, 0.05, 0.05, 0.85]);
        assert!(result.tumor_detected);
        assert_eq!(result.confidence, 85);
        assert_eq!(result.tumor_type, "Pituitary Tumor");
        assert_eq!(result.recommendations.len(), MAX_RECOMMENDATIONS);
        assert_eq!(
            result.recommendations[0],
            "Pituitary Tumor detected with 85.0% confidence"
        );
        assert_eq!(
            result.recommendations[1],
            "Immediate consultation with a neurosurgeon is recommended"
        );
        assert_eq!(result.processing_time, 1.5);
    }

    #[test]
    fn clear_report_uses_routine_advice() {
        let result = report([0.7, 0.1, 0.1, 0.1]);
        assert!(!result.tumor_detected);
        assert_eq!(result.tumor_type, "No Tumor");
        assert_eq!(
            result.recommendations,
            [
                "No tumor detected in the scan",
                "Continue with routine health monitoring",
                "Maintain healthy lifestyle practices",
                "Follow up with your physician as scheduled",
            ]
        );
    }

    #[test]
    fn all_predictions_keep_class_order_and_near_hundred() {
        let samples = [
            [0.25, 0.25, 0.25, 0.25],
            [0.333, 0.333, 0.334, 0.0],
            [0.125, 0.125, 0.125, 0.625],
            [0.005, 0.005, 0.005, 0.985],
        ];
        for weights in samples {
            let result = report(weights);
            let names: Vec<&str> = result
                .all_predictions
                .iter()
                .map(|p| p.class_name.as_str())
                .collect();
            assert_eq!(names, ["No Tumor", "Glioma", "Meningioma", "Pituitary Tumor"]);

            let total: i32 = result.all_predictions.iter().map(|p| p.confidence as i32).sum();
            assert!((total - 100).abs() <= 4, "total {total} for {weights:?}");
            assert_eq!(result.tumor_detected, result.tumor_type != "No Tumor");
        }
    }
}
