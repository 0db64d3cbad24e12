//! End-to-end gateway scenarios over the mock data tools and a scripted LLM.

use std::sync::Arc;

use lectern::gateway::{Action, ConversationRequest};
use lectern::llm::MockLlm;
use lectern::resolver::MatchType;
use lectern::{Service, Settings};
use serde_json::json;

fn test_settings() -> Arc<Settings> {
    let settings = Arc::new(Settings::from_env());
    settings.set_use_mock_data(true);
    settings
}

fn service_with(llm: MockLlm) -> Service {
    Service::build(test_settings(), Arc::new(llm)).expect("service builds")
}

fn router_json(intent: &str, confidence: f64) -> String {
    json!({"intent": intent, "confidence": confidence}).to_string()
}

fn planner_blueprint_json() -> String {
    json!({
        "name": "Unit 5 Test analysis",
        "description": "Score overview for one assignment",
        "dataContract": {
            "inputs": [
                {"id": "assignment", "type": "assignment", "label": "Assignment", "required": true}
            ],
            "bindings": [{
                "id": "submissions",
                "sourceType": "tool",
                "toolName": "get_assignment_submissions",
                "paramMapping": {
                    "teacherId": "$context.teacherId",
                    "assignmentId": "$context.assignmentId"
                },
                "required": true,
                "dependsOn": []
            }]
        },
        "computeGraph": {
            "nodes": [{
                "id": "stats",
                "type": "tool",
                "toolName": "summary_stats",
                "toolArgs": {"records": "$data.submissions", "field": "score"},
                "dependsOn": [],
                "outputKey": "stats"
            }]
        },
        "uiComposition": {
            "layout": "tabs",
            "tabs": [{
                "id": "overview",
                "label": "Overview",
                "slots": [
                    {"id": "kpis", "componentType": "kpi_grid",
                     "dataBinding": "$compute.stats", "props": {}, "aiContentSlot": false},
                    {"id": "summary", "componentType": "markdown",
                     "dataBinding": null, "props": {"title": "Summary"}, "aiContentSlot": true}
                ]
            }]
        }
    })
    .to_string()
}

fn request(message: &str) -> ConversationRequest {
    serde_json::from_value(json!({
        "message": message,
        "teacherId": "t-1"
    }))
    .unwrap()
}

#[tokio::test]
async fn simple_build_resolves_class_and_plans() {
    let service = service_with(MockLlm::scripted(
        [router_json("build_workflow", 0.95), planner_blueprint_json()],
        "{}",
    ));
    let response = service
        .gateway
        .handle(request("Analyze Form 1A English Unit 5 test"))
        .await
        .unwrap();

    assert_eq!(response.action, Action::Build);
    assert!(response.clarify_options.is_none());

    let entities = response.resolved_entities.as_ref().unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].entity_id, "class-hk-f1a");
    assert_eq!(entities[0].match_type, MatchType::Exact);
    assert_eq!(entities[0].confidence, 1.0);

    let blueprint = response.blueprint.as_ref().unwrap();
    assert!(blueprint
        .source_prompt
        .starts_with("Analyze Form 1A English Unit 5 test"));
    assert!(!blueprint.data_contract.bindings.is_empty());
    assert_eq!(response.legacy_action(), "build_workflow");
}

#[tokio::test]
async fn vague_build_without_class_clarifies_with_choices() {
    let service = service_with(MockLlm::scripted(
        [router_json("build_workflow", 0.9)],
        "{}",
    ));
    let response = service
        .gateway
        .handle(request("analyze english performance"))
        .await
        .unwrap();

    assert_eq!(response.action, Action::Clarify);
    assert!(response.blueprint.is_none());
    let options = response.clarify_options.as_ref().unwrap();
    assert!(options.allow_custom_input);
    let labels: Vec<&str> = options.choices.iter().map(|c| c.label.as_str()).collect();
    assert!(labels.contains(&"Form 1A"));
    assert!(labels.contains(&"Form 1B"));
    assert_eq!(response.legacy_action(), "clarify");
}

#[tokio::test]
async fn student_without_class_parent_clarifies_for_the_class() {
    let service = service_with(MockLlm::scripted(
        [router_json("build_workflow", 0.9)],
        "{}",
    ));
    let response = service
        .gateway
        .handle(request("analyze performance of student Wong Ka Ho"))
        .await
        .unwrap();

    assert_eq!(response.action, Action::Clarify);
    assert!(response.resolved_entities.is_none());
    let options = response.clarify_options.as_ref().unwrap();
    assert_eq!(options.kind, "class");
    assert!(options
        .choices
        .iter()
        .any(|c| c.value == "class-hk-f1a"));
}

#[tokio::test]
async fn confidence_ladder_rewrites_mid_confidence_build_to_clarify() {
    let service = service_with(MockLlm::scripted(
        [router_json("build_workflow", 0.55)],
        "{}",
    ));
    let response = service.gateway.handle(request("do some analysis")).await.unwrap();

    assert_eq!(response.action, Action::Clarify);
    let options = response.clarify_options.as_ref().unwrap();
    assert!(options.question.is_some());
}

#[tokio::test]
async fn clarify_reply_lifts_back_into_the_original_build() {
    let service = service_with(MockLlm::scripted(
        [
            router_json("build_workflow", 0.9),  // turn 1: student w/o class
            router_json("build_workflow", 0.9),  // turn 2: short reply
            planner_blueprint_json(),            // turn 2: planner
        ],
        "{}",
    ));

    let first = service
        .gateway
        .handle(request("analyze performance of student Wong Ka Ho"))
        .await
        .unwrap();
    assert_eq!(first.action, Action::Clarify);

    let mut second = request("Form 1A");
    second.conversation_id = Some(first.conversation_id.clone());
    let response = service.gateway.handle(second).await.unwrap();

    assert_eq!(response.action, Action::Build);
    let entities = response.resolved_entities.as_ref().unwrap();
    assert!(entities.iter().any(|e| e.entity_id == "class-hk-f1a"));
    assert!(entities.iter().any(|e| e.entity_id == "stu-hk-001"));
}

#[tokio::test]
async fn smalltalk_stays_conversational() {
    let service = service_with(MockLlm::scripted(
        [
            router_json("chat_smalltalk", 0.98),
            "Hello! Ask me to analyze a class any time.".to_string(),
        ],
        "{}",
    ));
    let response = service.gateway.handle(request("good morning!")).await.unwrap();

    assert_eq!(response.action, Action::Chat);
    assert!(response
        .chat_response
        .as_ref()
        .unwrap()
        .contains("Hello"));
    assert_eq!(response.legacy_action(), "chat_smalltalk");
}

#[tokio::test]
async fn sessions_accumulate_context_between_turns() {
    let service = service_with(MockLlm::scripted(
        [
            router_json("build_workflow", 0.95),
            planner_blueprint_json(),
            router_json("chat_qa", 0.95),
            "It went well overall.".to_string(),
        ],
        "{}",
    ));

    let first = service
        .gateway
        .handle(request("Analyze Form 1A English Unit 5 test"))
        .await
        .unwrap();
    assert_eq!(first.action, Action::Build);

    // The second turn reuses the conversation; the session still knows the
    // class that was resolved in turn one.
    let mut second = request("how did they do?");
    second.conversation_id = Some(first.conversation_id.clone());
    let response = service.gateway.handle(second).await.unwrap();
    assert_eq!(response.action, Action::Chat);
    assert_eq!(response.conversation_id, first.conversation_id);
}

#[tokio::test]
async fn router_garbage_degrades_to_the_fixed_clarify() {
    let service = service_with(MockLlm::new("utter nonsense, no json"));
    let response = service.gateway.handle(request("???")).await.unwrap();
    assert_eq!(response.action, Action::Clarify);
    let question = response
        .clarify_options
        .as_ref()
        .unwrap()
        .question
        .clone()
        .unwrap();
    assert!(question.contains("rephrase"));
}
