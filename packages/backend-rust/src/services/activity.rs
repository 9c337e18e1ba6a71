use serde::Serialize;

use pathway_algo::{ActivityEvent, BehavioralProfile};

use crate::collaborators::call;
use crate::engine::PersonalizationEngine;
use crate::error::EngineError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub student_id: String,
    pub recorded: usize,
    /// Derived from every event on record, not only this batch
    pub behavioral: BehavioralProfile,
    pub regression_score: f64,
}

impl PersonalizationEngine {
    /// Stores raw activity and recomputes the student's behavioral profile.
    pub async fn record_activity(
        &self,
        student_id: &str,
        events: Vec<ActivityEvent>,
    ) -> Result<ActivitySummary, EngineError> {
        let profiles = &self.collaborators.profiles;
        call(
            "profile provider",
            self.timeout(),
            profiles.append_activity(student_id, &events),
        )
        .await?;
        let on_record = call("profile provider", self.timeout(), profiles.get_activity(student_id)).await?;
        let behavioral = BehavioralProfile::from_activity(&on_record);

        tracing::debug!(
            student_id = %student_id,
            recorded = events.len(),
            total = on_record.len(),
            engagement = behavioral.engagement_score,
            "activity recorded"
        );

        Ok(ActivitySummary {
            student_id: student_id.to_string(),
            recorded: events.len(),
            behavioral,
            regression_score: behavioral.regression_score(),
        })
    }
}
