//! Pipeline Integration Tests
//!
//! Drives the orchestrator end-to-end against a scripted text generator.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast::error::TryRecvError;

use docforge::ai::AIError;
use docforge::core::{DocTypeRegistry, GenerationConfig};
use docforge::ingest::{ingest_files, FileInput, SourceContent, ADDITIONAL_CONTEXT_HEADER};
use docforge::pipeline::{
    DocStatus, Orchestrator, PhaseEvent, PipelineError, PipelineEvent, PipelinePhase,
};

use common::{client, orchestrator, types, ScriptedGenerator};

fn drain(rx: &mut tokio::sync::broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    events
}

// ============================================================================
// Generation Batches
// ============================================================================

#[tokio::test]
async fn test_text_file_to_release_notes_and_faq() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .with_delay("generate:release-notes", 5)
            .with_delay("generate:faq", 5),
    );
    let mut orchestrator = orchestrator(&generator);

    let files = vec![FileInput::new("notes.txt", None, b"Feature X launched".to_vec())];
    let source = ingest_files(&files).unwrap();
    let before = Utc::now();

    let phase = orchestrator.start(source, &types(&["release-notes", "faq"])).await.unwrap();
    assert_eq!(phase, PipelinePhase::Reviewing);

    let run = orchestrator.run().unwrap();
    assert!(run.started_at >= before);
    assert_eq!(run.results.len(), 2);
    assert_eq!(run.results[0].doc_type.as_str(), "release-notes");
    assert_eq!(run.results[1].doc_type.as_str(), "faq");
    for doc in &run.results {
        assert!(!doc.content.is_empty());
        assert!(doc.error.is_none());
        assert!(doc.generated_at > run.started_at);
    }

    for call in generator.calls_of("generate:faq") {
        assert!(call.user.contains("=== notes.txt ===\nFeature X launched"));
    }
}

#[tokio::test]
async fn test_every_selection_size_yields_one_result_per_type() {
    let all = DocTypeRegistry::builtin().unwrap().ids();

    for n in 1..=all.len() {
        let generator = Arc::new(ScriptedGenerator::new());
        let mut orchestrator = orchestrator(&generator);
        let selected = all[..n].to_vec();

        orchestrator.start(SourceContent::new("Feature X"), &selected).await.unwrap();

        let run = orchestrator.run().unwrap();
        assert_eq!(run.generated_types(), selected);
        assert!(run.is_settled());
        for doc_type in &selected {
            assert_eq!(run.status(doc_type), Some(DocStatus::Complete));
        }
        assert_eq!(generator.generate_count(), n);
    }
}

#[tokio::test]
async fn test_duplicate_types_are_generated_once() {
    let generator = Arc::new(ScriptedGenerator::new());
    let mut orchestrator = orchestrator(&generator);

    orchestrator
        .start(SourceContent::new("Feature X"), &types(&["faq", "email", "faq"]))
        .await
        .unwrap();

    let run = orchestrator.run().unwrap();
    assert_eq!(run.generated_types(), types(&["faq", "email"]));
    assert_eq!(generator.generate_count(), 2);
}

#[tokio::test]
async fn test_failed_call_is_isolated() {
    let generator = Arc::new(ScriptedGenerator::new().with_failure(
        "generate:email",
        AIError::Transport("connection reset by peer".to_string()),
    ));
    let mut orchestrator = orchestrator(&generator);
    let selected = types(&["release-notes", "email", "faq"]);

    let phase = orchestrator.start(SourceContent::new("Feature X"), &selected).await.unwrap();
    assert_eq!(phase, PipelinePhase::Reviewing);

    let run = orchestrator.run().unwrap();
    for doc_type in &selected {
        assert_eq!(run.status(doc_type), Some(DocStatus::Complete));
    }

    let error = run.results[1].error.as_deref().unwrap();
    assert!(error.contains("connection reset"));
    for index in [0, 2] {
        assert!(run.results[index].error.is_none());
        assert!(run.results[index].content.starts_with("<h1>"));
    }
    assert_eq!(run.failed_count(), 1);
}

#[tokio::test]
async fn test_results_keep_selection_order_whatever_settles_first() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .with_delay("generate:manual", 60)
            .with_delay("generate:faq", 30)
            .with_delay("generate:email", 1),
    );
    let mut orchestrator = orchestrator(&generator);
    let mut events = orchestrator.subscribe();
    let selected = types(&["manual", "faq", "email"]);

    orchestrator.start(SourceContent::new("Feature X"), &selected).await.unwrap();

    let settled: Vec<String> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            PipelineEvent::Settled { doc_type, .. } => Some(doc_type.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(settled, vec!["email", "faq", "manual"]);

    assert_eq!(orchestrator.run().unwrap().generated_types(), selected);
}

#[tokio::test]
async fn test_calls_in_a_batch_run_concurrently() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .with_delay("generate:faq", 100)
            .with_delay("generate:email", 100)
            .with_delay("generate:manual", 100),
    );
    let mut orchestrator = orchestrator(&generator);

    let start = std::time::Instant::now();
    orchestrator
        .start(SourceContent::new("Feature X"), &types(&["faq", "email", "manual"]))
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_millis(250));
}

#[tokio::test]
async fn test_timed_out_call_is_isolated() {
    let generator = Arc::new(ScriptedGenerator::new().with_delay("generate:manual", 500));
    let client = client(&generator).with_timeout(Some(Duration::from_millis(50)));
    let mut orchestrator = Orchestrator::new(client, GenerationConfig::default());

    orchestrator.start(SourceContent::new("Feature X"), &types(&["faq", "manual"])).await.unwrap();

    let run = orchestrator.run().unwrap();
    assert!(run.results[0].error.is_none());
    assert!(run.results[1].error.as_deref().unwrap().contains("timed out"));
}

// ============================================================================
// Analysis
// ============================================================================

#[tokio::test]
async fn test_questions_then_answers_extend_the_source() {
    let generator =
        Arc::new(ScriptedGenerator::new().with_questions(&["Who is the audience?", "Which version?"]));
    let mut orchestrator = orchestrator(&generator);

    let phase =
        orchestrator.start(SourceContent::new("Feature X launched"), &types(&["faq"])).await.unwrap();
    assert_eq!(phase, PipelinePhase::AwaitingAnswers);
    assert_eq!(orchestrator.questions().len(), 2);
    assert_eq!(generator.generate_count(), 0);

    orchestrator.answer(0, "Administrators").unwrap();
    assert!(matches!(
        orchestrator.answer(5, "nope"),
        Err(PipelineError::IndexOutOfRange { index: 5, len: 2 })
    ));

    let phase = orchestrator.continue_with_answers().await.unwrap();
    assert_eq!(phase, PipelinePhase::Reviewing);

    let run = orchestrator.run().unwrap();
    assert!(run.source.as_str().starts_with("Feature X launched"));
    assert!(run.source.as_str().contains(ADDITIONAL_CONTEXT_HEADER));
    assert!(run.source.as_str().contains("Q: Who is the audience?\nA: Administrators"));
    assert!(!run.source.as_str().contains("Which version?"));
    assert_eq!(run.original_source.as_str(), "Feature X launched");

    let call = &generator.calls_of("generate:faq")[0];
    assert!(call.user.contains("A: Administrators"));
}

#[tokio::test]
async fn test_skipping_questions_keeps_the_source() {
    let generator = Arc::new(ScriptedGenerator::new().with_questions(&["Who is the audience?"]));
    let mut orchestrator = orchestrator(&generator);

    orchestrator.start(SourceContent::new("Feature X launched"), &types(&["faq"])).await.unwrap();
    orchestrator.answer(0, "ignored").unwrap();
    let phase = orchestrator.skip_questions().await.unwrap();

    assert_eq!(phase, PipelinePhase::Reviewing);
    let run = orchestrator.run().unwrap();
    assert_eq!(run.source.as_str(), "Feature X launched");
}

#[tokio::test]
async fn test_question_failure_means_no_questions() {
    let generator = Arc::new(ScriptedGenerator::new().with_failure(
        "clarifying-questions",
        AIError::InvalidResponse("not json".to_string()),
    ));
    let mut orchestrator = orchestrator(&generator);

    let phase = orchestrator.start(SourceContent::new("Feature X"), &types(&["faq"])).await.unwrap();
    assert_eq!(phase, PipelinePhase::Reviewing);
}

#[tokio::test]
async fn test_categorization_reorganizes_multi_feature_source() {
    let generator = Arc::new(ScriptedGenerator::new().with_categorization(
        r###"{"hasMultipleFeatures": true, "organizedContent": "## Feature A\nA\n\n## Feature B\nB"}"###,
    ));
    let mut orchestrator = orchestrator(&generator);

    orchestrator.start(SourceContent::new("A and B"), &types(&["faq"])).await.unwrap();

    let run = orchestrator.run().unwrap();
    assert_eq!(run.original_source.as_str(), "A and B");
    assert!(run.source.as_str().starts_with("## Feature A"));
    assert!(generator.calls_of("generate:faq")[0].user.contains("## Feature B"));
}

#[tokio::test]
async fn test_categorization_failure_falls_back_to_original() {
    let generator = Arc::new(
        ScriptedGenerator::new().with_failure("categorize", AIError::EmptyResponse),
    );
    let mut orchestrator = orchestrator(&generator);

    let phase = orchestrator.start(SourceContent::new("Feature X"), &types(&["faq"])).await.unwrap();
    assert_eq!(phase, PipelinePhase::Reviewing);
    assert_eq!(orchestrator.run().unwrap().source.as_str(), "Feature X");
}

#[tokio::test]
async fn test_fatal_analysis_error_returns_to_idle() {
    let generator = Arc::new(ScriptedGenerator::new().with_failure(
        "categorize",
        AIError::Configuration("OPENAI_API_KEY not set".to_string()),
    ));
    let mut orchestrator = orchestrator(&generator);
    let mut events = orchestrator.subscribe();

    let err = orchestrator.start(SourceContent::new("Feature X"), &types(&["faq"])).await.unwrap_err();

    assert!(matches!(err, PipelineError::Ai(AIError::Configuration(_))));
    assert_eq!(orchestrator.phase(), PipelinePhase::Idle);
    assert!(orchestrator.run().is_none());
    assert_eq!(generator.generate_count(), 0);
    assert!(drain(&mut events).contains(&PipelineEvent::PhaseChanged {
        from: PipelinePhase::Analyzing,
        to: PipelinePhase::Idle,
    }));
}

#[tokio::test]
async fn test_rejected_credentials_stop_analysis() {
    let rejected = AIError::Api { status: 401, message: "Incorrect API key provided".to_string() };
    let generator = Arc::new(
        ScriptedGenerator::new()
            .with_failure("categorize", rejected.clone())
            .with_failure("clarifying-questions", rejected.clone())
            .with_failure("generate:faq", rejected.clone())
            .with_failure("generate:email", rejected),
    );
    let mut orchestrator = orchestrator(&generator);

    let err = orchestrator
        .start(SourceContent::new("Feature X"), &types(&["faq", "email"]))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Ai(AIError::Api { status: 401, .. })));
    assert_eq!(orchestrator.phase(), PipelinePhase::Idle);
    assert!(orchestrator.run().is_none());
    assert_eq!(generator.generate_count(), 0);
    assert!(generator.calls_of("clarifying-questions").is_empty());
}

#[tokio::test]
async fn test_forbidden_on_questions_stops_analysis() {
    let generator = Arc::new(ScriptedGenerator::new().with_failure(
        "clarifying-questions",
        AIError::Api { status: 403, message: "forbidden".to_string() },
    ));
    let mut orchestrator = orchestrator(&generator);

    let result = orchestrator.start(SourceContent::new("Feature X"), &types(&["faq"])).await;

    assert!(matches!(result, Err(PipelineError::Ai(AIError::Api { status: 403, .. }))));
    assert_eq!(orchestrator.phase(), PipelinePhase::Idle);
    assert_eq!(generator.generate_count(), 0);
}

#[tokio::test]
async fn test_analysis_passes_can_be_disabled() {
    let generator = Arc::new(ScriptedGenerator::new().with_questions(&["Unused?"]));
    let settings =
        GenerationConfig { categorize: false, clarifying_questions: false, ..Default::default() };
    let mut orchestrator = Orchestrator::new(client(&generator), settings);

    let phase = orchestrator.start(SourceContent::new("Feature X"), &types(&["faq"])).await.unwrap();

    assert_eq!(phase, PipelinePhase::Reviewing);
    assert!(generator.calls_of("categorize").is_empty());
    assert!(generator.calls_of("clarifying-questions").is_empty());
}

// ============================================================================
// Review
// ============================================================================

#[tokio::test]
async fn test_regenerate_replaces_only_the_target() {
    let generator = Arc::new(ScriptedGenerator::new());
    let mut orchestrator = orchestrator(&generator);
    orchestrator
        .start(SourceContent::new("Feature X"), &types(&["release-notes", "faq", "email"]))
        .await
        .unwrap();
    let before = orchestrator.run().unwrap().results.clone();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let index = orchestrator.regenerate(&"faq".into()).await.unwrap();
    assert_eq!(index, 1);
    assert_eq!(orchestrator.phase(), PipelinePhase::Reviewing);

    let after = &orchestrator.run().unwrap().results;
    assert_eq!(after.len(), 3);
    assert_eq!(after[0], before[0]);
    assert_eq!(after[2], before[2]);
    assert_eq!(after[1].doc_type, before[1].doc_type);
    assert!(after[1].content.contains("Draft 2"));
    assert!(after[1].generated_at > before[1].generated_at);

    let calls = generator.calls_of("generate:faq");
    assert_eq!(calls[0].user, calls[1].user);
}

#[tokio::test]
async fn test_regenerate_requires_an_existing_document() {
    let generator = Arc::new(ScriptedGenerator::new());
    let mut orchestrator = orchestrator(&generator);

    assert!(matches!(
        orchestrator.regenerate(&"faq".into()).await,
        Err(PipelineError::InvalidTransition { from: PipelinePhase::Idle, event: PhaseEvent::Regenerate })
    ));

    orchestrator.start(SourceContent::new("Feature X"), &types(&["faq"])).await.unwrap();
    assert!(matches!(
        orchestrator.regenerate(&"email".into()).await,
        Err(PipelineError::NotGenerated(_))
    ));
}

#[tokio::test]
async fn test_generate_more_appends_without_touching_existing() {
    let generator = Arc::new(ScriptedGenerator::new().with_questions(&["Who?"]));
    let mut orchestrator = orchestrator(&generator);

    orchestrator.start(SourceContent::new("Feature X"), &types(&["faq"])).await.unwrap();
    orchestrator.answer(0, "Admins").unwrap();
    orchestrator.continue_with_answers().await.unwrap();
    let before = orchestrator.run().unwrap().results.clone();

    assert!(!orchestrator.available_types().contains(&"faq".into()));
    assert!(orchestrator.available_types().contains(&"email".into()));

    orchestrator.generate_more(&types(&["email", "manual"])).await.unwrap();
    assert_eq!(orchestrator.phase(), PipelinePhase::Reviewing);

    let run = orchestrator.run().unwrap();
    assert_eq!(run.generated_types(), types(&["faq", "email", "manual"]));
    assert_eq!(run.results[0], before[0]);
    assert!(run.is_settled());

    // Later types read the same source, answers included
    let faq = &generator.calls_of("generate:faq")[0];
    let email = &generator.calls_of("generate:email")[0];
    assert!(email.user.contains("A: Admins"));
    assert_eq!(
        faq.user.split("SOURCE MATERIAL:").nth(1),
        email.user.split("SOURCE MATERIAL:").nth(1)
    );
}

#[tokio::test]
async fn test_generate_more_rejects_already_generated_types() {
    let generator = Arc::new(ScriptedGenerator::new());
    let mut orchestrator = orchestrator(&generator);
    orchestrator.start(SourceContent::new("Feature X"), &types(&["faq"])).await.unwrap();

    let err = orchestrator.generate_more(&types(&["email", "faq"])).await.unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyGenerated(ref id) if id.as_str() == "faq"));
    assert_eq!(orchestrator.phase(), PipelinePhase::Reviewing);
    assert_eq!(orchestrator.run().unwrap().results.len(), 1);
    assert_eq!(generator.generate_count(), 1);

    assert!(matches!(
        orchestrator.generate_more(&[]).await,
        Err(PipelineError::NoTypesSelected)
    ));
}

#[tokio::test]
async fn test_edit_and_polish() {
    let generator = Arc::new(ScriptedGenerator::new());
    let mut orchestrator = orchestrator(&generator);
    orchestrator.start(SourceContent::new("Feature X"), &types(&["faq", "email"])).await.unwrap();

    orchestrator.edit_document(1, "<p>Hand edited</p>").unwrap();
    assert_eq!(orchestrator.run().unwrap().results[1].content, "<p>Hand edited</p>");

    orchestrator.polish_document(0).await.unwrap();
    assert_eq!(orchestrator.run().unwrap().results[0].content, "<p>Polished</p>");
    assert!(generator.calls_of("cleanup")[0].user.contains("<h1>faq</h1>"));

    assert!(matches!(
        orchestrator.edit_document(9, "x"),
        Err(PipelineError::IndexOutOfRange { index: 9, len: 2 })
    ));
}

#[tokio::test]
async fn test_failed_polish_leaves_document_unchanged() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .with_failure("cleanup", AIError::Api { status: 500, message: "overloaded".into() }),
    );
    let mut orchestrator = orchestrator(&generator);
    orchestrator.start(SourceContent::new("Feature X"), &types(&["faq"])).await.unwrap();
    let before = orchestrator.run().unwrap().results[0].clone();

    assert!(orchestrator.polish_document(0).await.is_err());
    assert_eq!(orchestrator.run().unwrap().results[0], before);
}

#[tokio::test]
async fn test_polish_rejects_failed_document() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .with_failure("generate:faq", AIError::Api { status: 500, message: "boom".into() }),
    );
    let mut orchestrator = orchestrator(&generator);
    orchestrator.start(SourceContent::new("Feature X"), &types(&["faq", "email"])).await.unwrap();
    let before = orchestrator.run().unwrap().results[0].clone();
    assert!(before.is_error());

    assert!(matches!(
        orchestrator.polish_document(0).await,
        Err(PipelineError::FailedDocument { index: 0 })
    ));
    assert_eq!(orchestrator.run().unwrap().results[0], before);
    assert!(generator.calls_of("cleanup").is_empty());

    orchestrator.edit_document(0, "<p>Written by hand</p>").unwrap();
    orchestrator.polish_document(0).await.unwrap();
    assert_eq!(orchestrator.run().unwrap().results[0].content, "<p>Polished</p>");
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_reset_discards_the_run() {
    let generator = Arc::new(ScriptedGenerator::new());
    let mut orchestrator = orchestrator(&generator);
    orchestrator.start(SourceContent::new("Feature X"), &types(&["faq"])).await.unwrap();

    orchestrator.reset();

    assert_eq!(orchestrator.phase(), PipelinePhase::Idle);
    assert!(orchestrator.run().is_none());
    assert_eq!(orchestrator.available_types().len(), 7);

    // A fresh run can start
    orchestrator.start(SourceContent::new("Feature Y"), &types(&["email"])).await.unwrap();
    assert_eq!(orchestrator.run().unwrap().generated_types(), types(&["email"]));
}

#[tokio::test]
async fn test_start_validates_input() {
    let generator = Arc::new(ScriptedGenerator::new());
    let mut orchestrator = orchestrator(&generator);

    assert!(matches!(
        orchestrator.start(SourceContent::new("  "), &types(&["faq"])).await,
        Err(PipelineError::EmptySource)
    ));
    assert!(matches!(
        orchestrator.start(SourceContent::new("x"), &[]).await,
        Err(PipelineError::NoTypesSelected)
    ));
    assert!(matches!(
        orchestrator.start(SourceContent::new("x"), &types(&["sonnet"])).await,
        Err(PipelineError::UnknownDocumentType(_))
    ));
    assert_eq!(orchestrator.phase(), PipelinePhase::Idle);
    assert!(generator.calls().is_empty());
}

#[tokio::test]
async fn test_phase_events() {
    let generator = Arc::new(ScriptedGenerator::new().with_questions(&["Who?"]));
    let mut orchestrator = orchestrator(&generator);
    let mut events = orchestrator.subscribe();

    orchestrator.start(SourceContent::new("Feature X"), &types(&["faq"])).await.unwrap();
    orchestrator.skip_questions().await.unwrap();

    let phases: Vec<(PipelinePhase, PipelinePhase)> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            PipelineEvent::PhaseChanged { from, to } => Some((from, to)),
            _ => None,
        })
        .collect();

    assert_eq!(
        phases,
        vec![
            (PipelinePhase::Idle, PipelinePhase::Analyzing),
            (PipelinePhase::Analyzing, PipelinePhase::AwaitingAnswers),
            (PipelinePhase::AwaitingAnswers, PipelinePhase::Generating),
            (PipelinePhase::Generating, PipelinePhase::Reviewing),
        ]
    );
}

#[test]
fn test_ingestion_is_idempotent() {
    let files = || {
        vec![
            FileInput::new("notes.txt", None, b"Feature X launched\n".to_vec()),
            FileInput::new("deck.pptx", None, vec![0x50, 0x4b]),
        ]
    };

    let first = ingest_files(&files()).unwrap();
    let second = ingest_files(&files()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.fingerprint(), second.fingerprint());
}
