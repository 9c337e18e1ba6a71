//! Engine operations, one module per request family. Each adds methods to
//! [`crate::engine::PersonalizationEngine`].

pub mod activity;
pub mod assessment;
pub mod feedback;
pub mod mastery;
pub mod paths;

pub use activity::ActivitySummary;
pub use assessment::{AssessmentResult, AssessmentTurn, ItemView};
pub use feedback::{FeedbackOutcome, PolicyFeedback};
pub use mastery::MasteryPrediction;
pub use paths::{GeneratedPath, StepQuizOutcome};
