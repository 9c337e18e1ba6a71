use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};

mod common;

use common::{get, post_json, send};
use pathway_backend_rust::config::RouteConfig;

fn correct_answer(item_id: &str) -> &'static str {
    match item_id.rsplit('-').next() {
        Some("1") => "b",
        Some("2") => "c",
        _ => "d",
    }
}

#[tokio::test]
async fn test_health_root() {
    let app = common::create_test_app().await;
    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["tracer"], "untrained");
}

#[tokio::test]
async fn test_health_live_and_info() {
    let app = common::create_test_app().await;

    let (status, _) = send(&app, get("/health/live")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get("/health/info")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "pathway-backend");
}

#[tokio::test]
async fn test_health_metrics_lists_components() {
    let app = common::create_test_app().await;
    let (status, body) = send(&app, get("/health/metrics")).await;

    assert_eq!(status, StatusCode::OK);
    let components = body["engine"]["components"].as_array().unwrap();
    assert_eq!(components.len(), 5);
    assert_eq!(body["engine"]["indexedConcepts"], 10);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let app = common::create_test_app().await;
    let (status, body) = send(&app, get("/api/v1/nope")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_mastery_for_unknown_concept_is_not_found() {
    let app = common::create_test_app().await;
    let (status, body) = send(&app, get("/api/v1/students/s1/mastery?conceptId=quantum")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_interactions_update_mastery() {
    let app = common::create_test_app().await;
    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/students/s1/interactions",
            json!({ "conceptId": "variables", "correct": true }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let value = body["data"]["mastery"]["variables"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&value));

    let (status, body) = send(&app, get("/api/v1/students/s1/mastery?conceptId=variables")).await;
    assert_eq!(status, StatusCode::OK);
    let mastery = body["data"]["mastery"].as_object().unwrap();
    assert_eq!(mastery.len(), 1);
    assert!(mastery.contains_key("variables"));
}

#[tokio::test]
async fn test_interaction_requires_concept() {
    let app = common::create_test_app().await;
    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/students/s1/interactions",
            json!({ "conceptId": " ", "correct": true }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_generate_path_from_root() {
    let app = common::create_test_app().await;
    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/students/s2/learning-paths",
            json!({ "goalConceptId": "oop" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let data = &body["data"];
    assert_eq!(data["startConceptId"], "python_basics");
    let steps = data["steps"].as_array().unwrap();
    assert_eq!(steps.first().unwrap()["conceptId"], "python_basics");
    assert_eq!(steps.last().unwrap()["conceptId"], "oop");
    let numbers: Vec<u64> = steps.iter().map(|s| s["stepNumber"].as_u64().unwrap()).collect();
    let expected: Vec<u64> = (1..=steps.len() as u64).collect();
    assert_eq!(numbers, expected);
    assert!(data["totalTime"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_unreachable_goal_reports_no_path() {
    let app = common::create_test_app().await;
    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/students/s3/learning-paths",
            json!({ "goalConceptId": "web_scraping", "startConceptId": "python_basics" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NO_PATH_FOUND");

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/students/s3/learning-paths",
            json!({
                "goalConceptId": "web_scraping",
                "startConceptId": "python_basics",
                "singleConceptFallback": true
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let steps = body["data"]["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0]["conceptId"], "web_scraping");
}

#[tokio::test]
async fn test_failed_quiz_splices_remediation_after_step() {
    let app = common::create_test_app().await;
    let (_, body) = send(
        &app,
        post_json(
            "/api/v1/students/s4/learning-paths",
            json!({ "goalConceptId": "functions", "startConceptId": "variables" }),
        ),
    )
    .await;
    let path_id = body["data"]["pathId"].as_str().unwrap().to_string();
    let steps = body["data"]["steps"].as_array().unwrap().clone();
    let last = steps.last().unwrap();
    assert_eq!(last["conceptId"], "functions");
    let step_number = last["stepNumber"].as_u64().unwrap();

    let uri = format!(
        "/api/v1/students/s4/learning-paths/{}/steps/{}/quiz-result",
        path_id, step_number
    );
    let (status, body) = send(&app, post_json(&uri, json!({ "correct": 1, "total": 4 }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["passed"], false);
    assert_eq!(body["data"]["score"], 0.25);
    let inserted = body["data"]["insertedSteps"].as_array().unwrap();
    assert_eq!(inserted.len(), 1);
    assert_eq!(inserted[0]["isRemedial"], true);
    assert_eq!(inserted[0]["stepNumber"].as_u64().unwrap(), step_number + 1);
    let concept = inserted[0]["conceptId"].as_str().unwrap();
    assert!(concept == "control_flow" || concept == "data_structures");
}

#[tokio::test]
async fn test_passed_quiz_inserts_nothing() {
    let app = common::create_test_app().await;
    let (_, body) = send(
        &app,
        post_json("/api/v1/students/s5/learning-paths", json!({ "goalConceptId": "variables" })),
    )
    .await;
    let path_id = body["data"]["pathId"].as_str().unwrap().to_string();

    let uri = format!("/api/v1/students/s5/learning-paths/{}/steps/1/quiz-result", path_id);
    let (status, body) = send(&app, post_json(&uri, json!({ "score": 0.6 }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["passed"], true);
    assert!(body["data"]["insertedSteps"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_quiz_result_validation() {
    let app = common::create_test_app().await;
    let uri = "/api/v1/students/s6/learning-paths/missing/steps/1/quiz-result";

    let (status, _) = send(&app, post_json(uri, json!({ "score": 1.5 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, post_json(uri, json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, post_json(uri, json!({ "score": 0.2 }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_assessment_runs_to_completion() {
    let app = common::create_test_app().await;
    let (status, body) = send(
        &app,
        post_json("/api/v1/students/s7/assessments", json!({ "goalConceptId": "functions" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let session_id = body["data"]["sessionId"].as_str().unwrap().to_string();
    let mut item: Value = body["data"]["nextItem"].clone();
    assert!(item.get("correctOption").is_none());

    let uri = format!("/api/v1/assessments/{}/answers", session_id);
    let mut result = Value::Null;
    for _ in 0..20 {
        let item_id = item["id"].as_str().unwrap().to_string();
        let (status, body) = send(
            &app,
            post_json(&uri, json!({ "itemId": item_id, "answer": correct_answer(&item_id) })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["lastCorrect"], true);
        if !body["data"]["result"].is_null() {
            result = body["data"]["result"].clone();
            break;
        }
        item = body["data"]["nextItem"].clone();
    }

    let final_mastery = result["finalMastery"].as_f64().unwrap();
    assert!(final_mastery > 0.5 && final_mastery <= 1.0);
    assert_eq!(result["seededMastery"]["functions"].as_f64().unwrap(), final_mastery);

    let (status, body) = send(&app, get("/api/v1/students/s7/mastery?conceptId=functions")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["mastery"]["functions"].as_f64().unwrap(), final_mastery);

    let (status, _) = send(&app, post_json(&uri, json!({ "itemId": "q-fn-1", "answer": "b" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_answer_for_wrong_item_is_rejected_and_session_kept() {
    let app = common::create_test_app().await;
    let (_, body) = send(
        &app,
        post_json("/api/v1/students/s8/assessments", json!({ "goalConceptId": "variables" })),
    )
    .await;
    let session_id = body["data"]["sessionId"].as_str().unwrap().to_string();
    let item_id = body["data"]["nextItem"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/assessments/{}/answers", session_id);

    let (status, body) = send(&app, post_json(&uri, json!({ "itemId": "q-oop-3", "answer": "d" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "CONTRACT_MISMATCH");

    let (status, body) = send(&app, post_json(&uri, json!({ "itemId": item_id, "answer": "a" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["answered"], 1);
    assert_eq!(body["data"]["lastCorrect"], false);
}

#[tokio::test]
async fn test_assessment_without_items_is_not_found() {
    let app = common::create_test_app().await;
    let (status, _) = send(
        &app,
        post_json("/api/v1/students/s9/assessments", json!({ "goalConceptId": "web_scraping" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_feedback_stores_transition() {
    let app = common::create_test_app().await;
    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/students/s10/feedback",
            json!({ "actionConceptId": "oop", "masteryDelta": 0.2, "behaviorDelta": -0.1 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert!(data["reward"].as_f64().unwrap().is_finite());
    assert_eq!(data["replaySize"], 1);
    assert!(data["loss"].is_null());

    let (status, _) = send(
        &app,
        post_json(
            "/api/v1/students/s10/feedback",
            json!({ "actionConceptId": "quantum", "masteryDelta": 0.2 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_feedback_with_wrong_state_size_is_contract_mismatch() {
    let app = common::create_test_app().await;
    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/students/s11/feedback",
            json!({ "actionConceptId": "oop", "masteryDelta": 0.1, "previousState": [0.1, 0.2] }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "CONTRACT_MISMATCH");
}

#[tokio::test]
async fn test_malformed_body_is_validation_error() {
    let app = common::create_test_app().await;

    let raw = Request::builder()
        .method("POST")
        .uri("/api/v1/students/s1/interactions")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, raw).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = send(
        &app,
        post_json("/api/v1/students/s1/interactions", json!({ "conceptId": "variables" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let untyped = Request::builder()
        .method("POST")
        .uri("/api/v1/students/s1/interactions")
        .body(Body::from(r#"{"conceptId":"variables","correct":true}"#))
        .unwrap();
    let (status, body) = send(&app, untyped).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_activity_derives_behavioral_profile() {
    let app = common::create_test_app().await;
    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/students/s12/activity",
            json!({ "events": [
                { "kind": "TASK_ASSIGNED", "timestampMs": 0 },
                { "kind": "QUIZ_ATTEMPT", "timestampMs": 3_600_000 },
                { "kind": "HINT_REQUEST", "timestampMs": 3_660_000 },
                { "kind": "QUIZ_SUBMIT", "timestampMs": 3_700_000, "durationSeconds": 4.0, "correct": false }
            ] }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["recorded"], 4);
    assert_eq!(data["behavioral"]["gamingScore"], 1.0);
    assert_eq!(data["behavioral"]["errorRate"], 1.0);
    assert_eq!(data["behavioral"]["hintRate"], 1.0);
    let procrastination = data["behavioral"]["procrastinationIndex"].as_f64().unwrap();
    assert!((procrastination - 2f64.ln()).abs() < 1e-9);
    assert!(data["regressionScore"].as_f64().unwrap() > 2.0);

    let (status, body) = send(&app, post_json("/api/v1/students/s12/activity", json!({ "events": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_route_config_controls_mounted_routes() {
    let app = common::create_test_app_with(RouteConfig {
        enable_assessments: false,
        healthcheck_endpoint: "/status".to_string(),
        ..RouteConfig::default()
    })
    .await;

    let (status, body) = send(
        &app,
        post_json("/api/v1/students/s1/assessments", json!({ "goalConceptId": "variables" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = send(&app, get("/status/live")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, get("/health/live")).await;
    assert_eq!(status, StatusCode::OK);
}
