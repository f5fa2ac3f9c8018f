//! Two-stage detection: a cheap annotator decides whether a frame is worth
//! a run of the (slower) specialist detector.

use std::sync::Arc;

use async_trait::async_trait;
use sentinel_core::detection::DetectionResult;
use sentinel_core::frame::Frame;

use crate::{Detector, InferenceError};

/// Default confidence an annotation needs to count toward a specialist run.
pub const DEFAULT_SPECIALIST_THRESHOLD: f64 = 0.7;

/// Classes that trigger the specialist at elevated priority.
pub const DEFAULT_PRIORITY_CLASSES: &[&str] = &["person", "vehicle"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// A priority class was annotated.
    High,
    /// Enough confident annotations, none of a priority class.
    Normal,
}

/// Why the specialist runs on a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecialistDecision {
    pub priority: Priority,
    pub annotations: Vec<DetectionResult>,
}

/// Rules gating the specialist.
#[derive(Debug, Clone)]
pub struct DecisionRules {
    pub specialist_threshold: f64,
    /// Matched as substrings of the annotated class name.
    pub priority_classes: Vec<String>,
    pub min_annotations: usize,
}

impl Default for DecisionRules {
    fn default() -> Self {
        Self {
            specialist_threshold: DEFAULT_SPECIALIST_THRESHOLD,
            priority_classes: DEFAULT_PRIORITY_CLASSES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            min_annotations: 1,
        }
    }
}

impl DecisionRules {
    /// Decide whether the specialist should run, given the annotator output.
    ///
    /// Confident annotations of a priority class win; otherwise at least
    /// `min_annotations` confident annotations of any class are required.
    pub fn decide(&self, annotations: &[DetectionResult]) -> Option<SpecialistDecision> {
        let confident: Vec<DetectionResult> = annotations
            .iter()
            .filter(|a| a.confidence >= self.specialist_threshold)
            .cloned()
            .collect();

        let priority: Vec<DetectionResult> = confident
            .iter()
            .filter(|a| {
                self.priority_classes
                    .iter()
                    .any(|class| a.class_name.contains(class.as_str()))
            })
            .cloned()
            .collect();

        if !priority.is_empty() {
            return Some(SpecialistDecision {
                priority: Priority::High,
                annotations: priority,
            });
        }
        if !confident.is_empty() && confident.len() >= self.min_annotations {
            return Some(SpecialistDecision {
                priority: Priority::Normal,
                annotations: confident,
            });
        }
        None
    }
}

/// Annotator, then specialist when [`DecisionRules`] says so. Frames the
/// rules pass over yield no detections.
pub struct CascadeDetector {
    annotator: Arc<dyn Detector>,
    specialist: Arc<dyn Detector>,
    rules: DecisionRules,
    name: String,
}

impl CascadeDetector {
    pub fn new(
        annotator: Arc<dyn Detector>,
        specialist: Arc<dyn Detector>,
        rules: DecisionRules,
    ) -> Self {
        let name = format!("cascade({} -> {})", annotator.name(), specialist.name());
        Self {
            annotator,
            specialist,
            rules,
            name,
        }
    }
}

#[async_trait]
impl Detector for CascadeDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError> {
        let annotations = self.annotator.detect(frame).await?;

        let Some(decision) = self.rules.decide(&annotations) else {
            tracing::trace!(frame_index = frame.index, "No specialist run");
            return Ok(Vec::new());
        };

        tracing::debug!(
            frame_index = frame.index,
            priority = ?decision.priority,
            annotations = decision.annotations.len(),
            "Running specialist detector",
        );
        self.specialist.detect(frame).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use image::ImageFormat;
    use sentinel_core::detection::BoundingBox;

    use super::*;

    fn det(class_name: &str, confidence: f64) -> DetectionResult {
        DetectionResult::new(
            class_name,
            confidence,
            BoundingBox { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0 },
        )
    }

    struct Scripted {
        output: Vec<DetectionResult>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(output: Vec<DetectionResult>) -> Arc<Self> {
            Arc::new(Self {
                output,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Detector for Scripted {
        async fn detect(&self, _frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn frame() -> Frame {
        Frame {
            index: 10,
            payload: vec![],
            format: ImageFormat::Png,
            width: 320,
            height: 240,
        }
    }

    // -----------------------------------------------------------------------
    // DecisionRules
    // -----------------------------------------------------------------------

    #[test]
    fn priority_class_wins() {
        let rules = DecisionRules::default();
        let decision = rules
            .decide(&[det("dog", 0.9), det("person", 0.75)])
            .unwrap();
        assert_eq!(decision.priority, Priority::High);
        assert_eq!(decision.annotations, vec![det("person", 0.75)]);
    }

    #[test]
    fn confident_non_priority_is_normal() {
        let decision = DecisionRules::default().decide(&[det("dog", 0.7)]).unwrap();
        assert_eq!(decision.priority, Priority::Normal);
    }

    #[test]
    fn below_threshold_is_ignored() {
        let rules = DecisionRules::default();
        assert!(rules.decide(&[det("person", 0.69)]).is_none());
        assert!(rules.decide(&[]).is_none());
    }

    #[test]
    fn substring_matches_priority_class() {
        let decision = DecisionRules::default()
            .decide(&[det("vehicle_truck", 0.8)])
            .unwrap();
        assert_eq!(decision.priority, Priority::High);
    }

    #[test]
    fn min_annotations_applies_to_normal_priority() {
        let rules = DecisionRules {
            min_annotations: 2,
            ..DecisionRules::default()
        };
        assert!(rules.decide(&[det("dog", 0.9)]).is_none());
        assert!(rules.decide(&[det("dog", 0.9), det("cat", 0.8)]).is_some());
    }

    // -----------------------------------------------------------------------
    // CascadeDetector
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn specialist_runs_only_when_rules_allow() {
        let annotator = Scripted::new(vec![det("person", 0.4)]);
        let specialist = Scripted::new(vec![det("person", 0.95)]);
        let cascade = CascadeDetector::new(
            annotator.clone(),
            specialist.clone(),
            DecisionRules::default(),
        );

        assert!(cascade.detect(&frame()).await.unwrap().is_empty());
        assert_eq!(specialist.calls.load(Ordering::SeqCst), 0);

        let annotator = Scripted::new(vec![det("person", 0.8)]);
        let cascade = CascadeDetector::new(annotator, specialist.clone(), DecisionRules::default());
        assert_eq!(cascade.detect(&frame()).await.unwrap(), vec![det("person", 0.95)]);
        assert_eq!(specialist.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cascade.name(), "cascade(scripted -> scripted)");
    }
}
