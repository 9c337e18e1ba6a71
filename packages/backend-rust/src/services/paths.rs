use std::sync::Arc;

use serde::Serialize;

use pathway_algo::policy::lowest_cost_choice;
use pathway_algo::{
    BehavioralProfile, CandidateChoice, Concept, LearningStep, MasteryMap, ModelStatus, PathCandidate, PathQuery, QuizGrade,
    SelectionSource, StudentProfile,
};

use crate::collaborators::call;
use crate::engine::{ComponentId, PersonalizationEngine};
use crate::error::EngineError;
use crate::track_component;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPath {
    pub path_id: String,
    pub student_id: String,
    pub start_concept_id: String,
    pub goal_concept_id: String,
    pub steps: Vec<LearningStep>,
    /// Minutes, completed steps included
    pub total_time: f64,
    /// Minutes of pending steps
    pub remaining_time: f64,
    pub selection: CandidateChoice,
    pub candidate_count: usize,
    pub policy_status: ModelStatus,
    /// Behavior at planning time, to hand back as `previousBehavior` feedback
    pub behavioral: BehavioralProfile,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepQuizOutcome {
    pub path_id: String,
    pub step_number: u32,
    pub concept_id: String,
    #[serde(flatten)]
    pub grade: QuizGrade,
    /// Remediation spliced in after the graded step, empty on a pass
    pub inserted_steps: Vec<LearningStep>,
}

impl PersonalizationEngine {
    /// Plans a route from `start` (or the goal's root) to `goal`, lets the
    /// policy choose among candidate routes and persists the assembled steps.
    /// With `single_concept_fallback` an unreachable goal yields a goal-only
    /// route instead of `NoPathFound`.
    pub async fn generate_path(
        &self,
        student_id: &str,
        start: Option<&str>,
        goal: &str,
        single_concept_fallback: bool,
    ) -> Result<GeneratedPath, EngineError> {
        let goal = self.require_concept(goal).await?;
        let start = self.resolve_start(start, &goal).await?;
        let graph = self.neighbourhood(&start, &goal).await?;

        let profile = self.profile_or_default(student_id).await;
        let mastery = call(
            "knowledge store",
            self.timeout(),
            self.collaborators
                .knowledge
                .get_mastery_batch(student_id, &graph.concept_ids()),
        )
        .await?;

        let query = PathQuery::new(&goal.id)
            .start(Some(&start.id))
            .mastery(&mastery)
            .preferences(&profile.preferences)
            .with_fallback(single_concept_fallback);
        let candidates = track_component!(
            self.metrics,
            ComponentId::Pathfinder,
            self.pathfinder
                .find_candidates(&graph, &query, self.config.pathfinder.max_candidates)
        )?;

        let selection = self.choose_route(student_id, &candidates, &mastery, &profile).await;
        let route = candidates
            .get(selection.candidate)
            .ok_or_else(|| EngineError::Internal("selected candidate out of range".into()))?;

        let assembled = track_component!(
            self.metrics,
            ComponentId::PathAssembler,
            Ok::<_, EngineError>(self.assembler.generate_steps(route, &mastery, &profile))
        )?;

        let path_id = call(
            "path store",
            self.timeout(),
            self.collaborators.paths.save_path(
                student_id,
                std::slice::from_ref(&goal.id),
                &assembled.steps,
                assembled.total_time,
            ),
        )
        .await?;

        tracing::info!(
            student_id = %student_id,
            path_id = %path_id,
            goal = %goal.id,
            steps = assembled.steps.len(),
            candidates = candidates.len(),
            source = ?selection.source,
            "learning path generated"
        );

        Ok(GeneratedPath {
            path_id,
            student_id: student_id.to_string(),
            start_concept_id: start.id,
            goal_concept_id: goal.id,
            steps: assembled.steps,
            total_time: assembled.total_time,
            remaining_time: assembled.remaining_time,
            selection,
            candidate_count: candidates.len(),
            policy_status: self.policy.read().status(),
            behavioral: profile.behavioral,
        })
    }

    /// Grades a step quiz. Below the pass mark one prerequisite of the step's
    /// concept is spliced in right after the step.
    pub async fn submit_step_quiz(
        &self,
        student_id: &str,
        path_id: &str,
        step_number: u32,
        concept_id: Option<&str>,
        score: f64,
    ) -> Result<StepQuizOutcome, EngineError> {
        if !score.is_finite() {
            return Err(EngineError::ContractMismatch("quiz score is not a number".into()));
        }
        let path = call("path store", self.timeout(), self.collaborators.paths.get_path(path_id))
            .await?
            .filter(|p| p.student_id == student_id)
            .ok_or_else(|| EngineError::NotFound(format!("learning path '{}'", path_id)))?;
        let step = path
            .steps
            .iter()
            .find(|s| s.step_number == step_number)
            .ok_or_else(|| EngineError::NotFound(format!("step {} of path '{}'", step_number, path_id)))?;
        if let Some(given) = concept_id {
            if given != step.concept_id {
                return Err(EngineError::ContractMismatch(format!(
                    "step {} covers '{}', not '{}'",
                    step_number, step.concept_id, given
                )));
            }
        }

        let grade = self.assembler.grade_score(score);
        let mut outcome = StepQuizOutcome {
            path_id: path_id.to_string(),
            step_number,
            concept_id: step.concept_id.clone(),
            grade,
            inserted_steps: Vec::new(),
        };
        if grade.passed {
            return Ok(outcome);
        }

        let failed = self.require_concept(&step.concept_id).await?;
        let prerequisites = call(
            "graph store",
            self.timeout(),
            self.collaborators.graph.get_prerequisites(&failed.id),
        )
        .await?;
        if prerequisites.is_empty() {
            tracing::debug!(concept_id = %failed.id, "quiz failed on a root concept, nothing to remediate");
            return Ok(outcome);
        }

        let profile = self.profile_or_default(student_id).await;
        let prerequisite = self.choose_prerequisite(student_id, &prerequisites, &profile).await;
        let remedial = self
            .assembler
            .remediation_step(prerequisite, &failed, step_number + 1, &profile);

        call(
            "path store",
            self.timeout(),
            self.collaborators
                .paths
                .insert_steps(path_id, step_number + 1, vec![remedial.clone()]),
        )
        .await?;

        tracing::info!(
            student_id = %student_id,
            path_id = %path_id,
            failed = %failed.id,
            remediation = %prerequisite.id,
            score = grade.score,
            "remediation step inserted"
        );
        outcome.inserted_steps.push(remedial);
        Ok(outcome)
    }

    /// Score of a step quiz from raw counts.
    pub fn quiz_score(&self, correct: usize, total: usize) -> f64 {
        self.assembler.grade_step_quiz(correct, total).score
    }

    /// Policy choice among candidate routes. Any failure falls back to the
    /// lowest-cost candidate.
    async fn choose_route(
        &self,
        student_id: &str,
        candidates: &[PathCandidate],
        route_mastery: &MasteryMap,
        profile: &StudentProfile,
    ) -> CandidateChoice {
        if candidates.len() == 1 {
            return CandidateChoice {
                candidate: 0,
                decision_concept: None,
                source: SelectionSource::SingleCandidate,
            };
        }

        let mastery = match self.stored_mastery(student_id).await {
            Ok(stored) => stored.merged(route_mastery),
            Err(err) => {
                tracing::warn!(student_id = %student_id, error = %err, "stored mastery unavailable for policy state");
                route_mastery.clone()
            }
        };
        let state = self.state_vector(&mastery, profile);

        let policy = Arc::clone(&self.policy);
        let rng = Arc::clone(&self.rng);
        let index = Arc::clone(&self.index);
        let owned = candidates.to_vec();
        let choice = track_component!(
            self.metrics,
            ComponentId::Policy,
            self.pool
                .run(move || {
                    let agent = policy.read();
                    let mut rng = rng.lock();
                    agent.select_candidate(&state, &owned, &index, &mut *rng)
                })
                .await
                .and_then(|result| result.map_err(EngineError::from))
        );

        match choice {
            Ok(choice) => choice,
            Err(err) => {
                tracing::warn!(student_id = %student_id, error = %err, "route policy failed, using lowest-cost route");
                lowest_cost_choice(candidates)
            }
        }
    }

    /// Prerequisite to review after a failed quiz: the policy's pick when
    /// several exist, else the first.
    async fn choose_prerequisite<'a>(
        &self,
        student_id: &str,
        prerequisites: &'a [Concept],
        profile: &StudentProfile,
    ) -> &'a Concept {
        let first = &prerequisites[0];
        if prerequisites.len() == 1 {
            return first;
        }

        let valid: Vec<usize> = prerequisites
            .iter()
            .filter_map(|c| self.index.index_of(&c.id))
            .collect();
        if valid.is_empty() {
            return first;
        }

        let mastery = match self.stored_mastery(student_id).await {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(student_id = %student_id, error = %err, "stored mastery unavailable, reviewing first prerequisite");
                return first;
            }
        };
        let state = self.state_vector(&mastery, profile);
        let policy = Arc::clone(&self.policy);
        let rng = Arc::clone(&self.rng);
        let action = track_component!(
            self.metrics,
            ComponentId::Policy,
            self.pool
                .run(move || {
                    let agent = policy.read();
                    let mut rng = rng.lock();
                    agent.select_action(&state, &valid, &mut *rng)
                })
                .await
                .and_then(|result| result.map_err(EngineError::from))
        );

        match action {
            Ok(action) => self
                .index
                .id_at(action)
                .and_then(|id| prerequisites.iter().find(|c| c.id == id))
                .unwrap_or(first),
            Err(err) => {
                tracing::warn!(error = %err, "policy unavailable, reviewing first prerequisite");
                first
            }
        }
    }
}
