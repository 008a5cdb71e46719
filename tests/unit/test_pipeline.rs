//! Document to quiz to analysis, with a scripted model.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use quizforge::api::RetryPolicy;
use quizforge::quiz::Difficulty;
use quizforge::testing::ScriptedGenerator;
use quizforge::topics::apply_analysis;
use quizforge::{
    analyze, CompositionRequest, QuizComposer, RetryingInvoker, TopicBuckets, TopicExtractor,
    TopicRecord, TopicStatus,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn quick_invoker() -> RetryingInvoker {
    RetryingInvoker::new(RetryPolicy {
        max_retries: 3,
        backoff_factor: 2.0,
        min_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    })
}

fn question(id: &str, topic: &str, answer: &str, difficulty: &str) -> serde_json::Value {
    json!({
        "id": id,
        "questionText": format!("Question about {}", topic),
        "options": ["alpha", "beta", "gamma", "delta"],
        "correctAnswer": answer,
        "explanation": "",
        "subTopicName": topic,
        "difficulty": difficulty
    })
}

#[tokio::test]
async fn test_full_learning_loop() {
    // Topics from a document; the model repeats one with different spelling.
    let extractor_model = Arc::new(ScriptedGenerator::replying(
        "Here are the topics:\n```json\n{\"subTopics\": [\"Newton's Laws\", \"newtons laws\", \"Kinematics\", \"Energy\"]}\n```",
    ));
    let topics = TopicExtractor::new(extractor_model, quick_invoker())
        .extract("Classical mechanics notes", &CancellationToken::new())
        .await
        .unwrap();
    let names: Vec<&str> = topics.iter().map(|t| t.normalized_name.as_str()).collect();
    assert_eq!(names, vec!["newtons_laws", "kinematics", "energy"]);

    let mut records: Vec<TopicRecord> = topics.into_iter().map(TopicRecord::from).collect();
    assert!(records.iter().all(|r| r.status == TopicStatus::Pending));

    // Quiz response wrapped in prose, with a LaTeX backslash that is not a JSON escape.
    let quiz_json = json!({"questions": [
        question("q1", "Newton's Laws", "alpha", "easy"),
        question("q2", "Newton's Laws", "B", "medium"),
        question("q3", "Kinematics", "gamma", "hard"),
        question("q4", "Energy", "delta", "medium"),
    ]})
    .to_string()
    .replace("Question about Energy", r"Energy in \alpha decay");
    let composer_model = Arc::new(ScriptedGenerator::replying(format!(
        "Sure! Here is your quiz: {} Good luck!",
        quiz_json
    )));
    let composer = QuizComposer::new(composer_model.clone(), quick_invoker());
    let quiz = composer
        .compose(&CompositionRequest {
            buckets: TopicBuckets::from_records(records.clone()),
            total_questions: 4,
            prioritize_weak_and_medium_topics: true,
            source_text: Some("F = ma".into()),
        })
        .await
        .unwrap();

    assert_eq!(quiz.plan.total(), 4);
    assert_eq!(quiz.questions.len(), 4);
    assert_eq!(quiz.questions[1].correct_answer, "beta");
    assert_eq!(quiz.questions[3].question_text, r"Energy in \alpha decay");
    assert!(composer_model.prompts()[0].contains("F = ma"));

    // Both Newton questions right, kinematics wrong, energy right.
    let answers: HashMap<String, String> = [
        ("q1", "alpha"),
        ("q2", "beta"),
        ("q3", "alpha"),
        ("q4", "delta"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let analysis = analyze(&quiz.questions, &answers);

    assert_eq!(analysis.correct_answers, 3);
    assert_eq!(analysis.overall_score, 75.0);
    assert_eq!(
        analysis.performance_by_sub_topic["kinematics"].status,
        TopicStatus::Failed
    );
    assert_eq!(analysis.performance_by_difficulty[&Difficulty::Hard].correct, 0);

    let changed = apply_analysis(&mut records, &analysis);
    assert_eq!(changed, 3);
    let status_of = |key: &str| {
        records
            .iter()
            .find(|r| r.normalized_sub_topic_name == key)
            .map(|r| r.status)
    };
    assert_eq!(status_of("newtons_laws"), Some(TopicStatus::Mastered));
    assert_eq!(status_of("kinematics"), Some(TopicStatus::Failed));
    assert_eq!(status_of("energy"), Some(TopicStatus::Mastered));

    let buckets = TopicBuckets::from_records(records);
    assert_eq!(buckets.failed.len(), 1);
    assert_eq!(buckets.mastered.len(), 2);
}

#[tokio::test]
async fn test_cancelled_composition_makes_no_call() {
    let model = Arc::new(ScriptedGenerator::replying("[]"));
    let composer = QuizComposer::new(model.clone(), quick_invoker());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let buckets = TopicBuckets {
        pending: vec![TopicRecord::new("Optics", &Default::default())],
        ..TopicBuckets::default()
    };
    let err = composer
        .compose_with_cancel(
            &CompositionRequest {
                buckets,
                total_questions: 3,
                prioritize_weak_and_medium_topics: true,
                source_text: None,
            },
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("cancelled"));
    assert!(model.prompts().is_empty());
}

#[tokio::test]
async fn test_validation_failure_names_question() {
    let mut broken = question("q2", "Optics", "alpha", "easy");
    broken.as_object_mut().unwrap().remove("options");
    let model = Arc::new(ScriptedGenerator::replying(
        json!([question("q1", "Optics", "alpha", "easy"), broken]).to_string(),
    ));
    let composer = QuizComposer::new(model, quick_invoker());
    let buckets = TopicBuckets {
        failed: vec![
            TopicRecord::new("Optics", &Default::default()).with_status(TopicStatus::Failed),
        ],
        ..TopicBuckets::default()
    };

    let err = composer
        .compose(&CompositionRequest {
            buckets,
            total_questions: 2,
            prioritize_weak_and_medium_topics: true,
            source_text: None,
        })
        .await
        .unwrap_err();
    match err {
        quizforge::QuizforgeError::Validation(v) => {
            assert_eq!(v.question_id, "q2");
            assert_eq!(v.index, 1);
            assert_eq!(v.field, "options");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
