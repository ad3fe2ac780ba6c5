//! Submission -> polling -> history -> re-probe, against an in-memory provider.

mod common;

use common::{in_review_body, reconciler, reconciler_with_policy, succeeded_body, FakeProvider};
use idp_reconciler::provider::{Credential, ProviderError};
use idp_reconciler::reconcile::{Outcome, OutcomeKind, PollPolicy, ReprobeOutcome, ServiceError};
use idp_reconciler::submission::{Document, SubmissionError};
use serde_json::json;
use std::time::Duration;

fn pdf(name: &str) -> Document {
    Document::new(name, "application/pdf", vec![0x25, 0x50, 0x44, 0x46])
}

fn token() -> Credential {
    Credential::new("abc123")
}

#[tokio::test]
async fn test_manual_review_is_recorded_and_stops_polling() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(vec![
        Ok(json!({"status": "RUNNING"})),
        Ok(in_review_body()),
    ]);
    let rec = reconciler(provider.clone(), &dir);

    let outcome = rec.submit_and_reconcile(&pdf("passport.pdf"), token()).await.unwrap();

    assert_eq!(
        outcome,
        Outcome::ManualReviewRequired {
            execution_id: "EX1".into()
        }
    );
    assert_eq!(provider.queries(), 2);

    let list = rec.history().list().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].execution_id, "EX1");
    assert_eq!(list[0].outcome_kind, OutcomeKind::ManualReviewRequired);
    assert_eq!(list[0].provider_file_ref.as_deref(), Some("f1"));
    assert_eq!(list[0].document_name, "passport.pdf");
}

#[tokio::test]
async fn test_reprobe_success_updates_entry_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(vec![]);
    let rec = reconciler(provider.clone(), &dir);

    provider.push(Ok(succeeded_body("a.pdf", "OK")));
    rec.submit_and_reconcile(&pdf("a.pdf"), token()).await.unwrap();
    provider.push(Ok(in_review_body()));
    rec.submit_and_reconcile(&pdf("b.pdf"), token()).await.unwrap();
    assert_eq!(rec.history().list().unwrap().len(), 2);

    provider.push(Ok(json!({
        "status": "SUCCEEDED",
        "Result": "Passeport valide",
        "datas": {"documentName": "b.pdf", "check_infos": {"nom": "DIOP"}}
    })));
    let result = rec.reprobe("EX2", token()).await.unwrap();

    match result {
        ReprobeOutcome::Succeeded(Outcome::Succeeded {
            document_name,
            result_summary,
            extracted_fields,
        }) => {
            assert_eq!(document_name, "b.pdf");
            assert_eq!(result_summary, "Passeport valide");
            assert_eq!(extracted_fields.unwrap()["nom"], "DIOP");
        }
        other => panic!("unexpected re-probe result: {:?}", other),
    }

    let list = rec.history().list().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].execution_id, "EX2");
    assert_eq!(list[0].outcome_kind, OutcomeKind::Succeeded);
    assert_eq!(list[0].result_summary.as_deref(), Some("Passeport valide"));
    assert!(list[0].updated_at.is_some());
    assert_eq!(list.iter().filter(|e| e.execution_id == "EX2").count(), 1);
}

#[tokio::test]
async fn test_reprobe_still_in_review_confirms_entry() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(vec![Ok(in_review_body()), Ok(in_review_body())]);
    let rec = reconciler(provider.clone(), &dir);
    rec.submit_and_reconcile(&pdf("c.pdf"), token()).await.unwrap();

    let result = rec.reprobe("EX1", token()).await.unwrap();
    assert_eq!(result, ReprobeOutcome::StillInReview);

    let list = rec.history().list().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].outcome_kind, OutcomeKind::ManualReviewRequired);
}

#[tokio::test]
async fn test_reprobe_pending_leaves_history_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(vec![Ok(in_review_body())]);
    let rec = reconciler(provider.clone(), &dir);
    rec.submit_and_reconcile(&pdf("c.pdf"), token()).await.unwrap();
    let before = rec.history().list().unwrap();

    provider.push(Ok(json!({"status": "RUNNING"})));
    let result = rec.reprobe("EX1", token()).await.unwrap();
    assert_eq!(
        result,
        ReprobeOutcome::Pending {
            status: "RUNNING".into()
        }
    );
    assert_eq!(rec.history().list().unwrap(), before);
}

#[tokio::test]
async fn test_reprobe_transport_error_leaves_history_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(vec![Ok(in_review_body())]);
    let rec = reconciler(provider.clone(), &dir);
    rec.submit_and_reconcile(&pdf("c.pdf"), token()).await.unwrap();
    let before = rec.history().list().unwrap();

    provider.push(Err(ProviderError::Transport("connection refused".into())));
    let err = rec.reprobe("EX1", token()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Probe(_)));
    assert_eq!(rec.history().list().unwrap(), before);
}

#[tokio::test]
async fn test_reprobe_requires_known_execution_and_token() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(vec![]);
    let rec = reconciler(provider.clone(), &dir);

    let err = rec.reprobe("EX404", token()).await.unwrap_err();
    assert!(matches!(err, ServiceError::UnknownExecution(ref id) if id == "EX404"));

    let err = rec.reprobe("EX404", Credential::new("")).await.unwrap_err();
    assert!(matches!(err, ServiceError::MissingCredential));
    assert_eq!(provider.queries(), 0);
}

#[tokio::test]
async fn test_reprobe_refused_while_cycle_in_flight() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(vec![Ok(in_review_body())]);
    let rec = reconciler(provider.clone(), &dir);
    rec.submit_and_reconcile(&pdf("c.pdf"), token()).await.unwrap();

    let _guard = rec.claim("EX1").unwrap();
    let err = rec.reprobe("EX1", token()).await.unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyInFlight(_)));
    assert_eq!(provider.queries(), 1);
}

#[tokio::test]
async fn test_invalid_document_never_reaches_provider() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(vec![]);
    let rec = reconciler(provider.clone(), &dir);

    let gif = Document::new("anim.gif", "image/gif", vec![0u8; 16]);
    let err = rec.submit_and_reconcile(&gif, token()).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Submission(SubmissionError::InvalidDocument { .. })
    ));

    let huge = Document::new("huge.pdf", "application/pdf", vec![0u8; 10 * 1024 * 1024 + 1]);
    let err = rec.submit_and_reconcile(&huge, token()).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Submission(SubmissionError::InvalidDocument { .. })
    ));

    assert_eq!(provider.uploads(), 0);
    assert_eq!(provider.queries(), 0);
    assert!(rec.history().list().unwrap().is_empty());
}

#[tokio::test]
async fn test_timeout_is_recorded_and_can_be_refreshed() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(vec![]);
    let policy = PollPolicy {
        interval: Duration::from_secs(10),
        max_attempts: 4,
    };
    let rec = reconciler_with_policy(provider.clone(), &dir, policy);

    let outcome = rec.submit_and_reconcile(&pdf("slow.pdf"), token()).await.unwrap();
    assert_eq!(outcome, Outcome::TimedOut);
    assert_eq!(provider.queries(), 4);
    assert_eq!(rec.history().find("EX1").unwrap().unwrap().outcome_kind, OutcomeKind::TimedOut);

    provider.push(Ok(succeeded_body("slow.pdf", "OK")));
    let result = rec.reprobe("EX1", token()).await.unwrap();
    assert!(matches!(result, ReprobeOutcome::Succeeded(_)));
    assert_eq!(rec.history().find("EX1").unwrap().unwrap().outcome_kind, OutcomeKind::Succeeded);
}

#[tokio::test]
async fn test_probe_failure_is_recorded_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(vec![Err(ProviderError::Http {
        status: 500,
        message: "Erreur lors de la vérification du statut".into(),
    })]);
    let rec = reconciler(provider.clone(), &dir);

    let outcome = rec.submit_and_reconcile(&pdf("x.pdf"), token()).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Failed {
            reason: "Erreur lors de la vérification du statut".into()
        }
    );
    assert_eq!(provider.queries(), 1);
    let entry = rec.history().find("EX1").unwrap().unwrap();
    assert_eq!(entry.outcome_kind, OutcomeKind::Failed);
}

#[tokio::test]
async fn test_history_keeps_ten_most_recent() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::always_succeeding();
    let rec = reconciler(provider.clone(), &dir);

    for i in 1..=11 {
        rec.submit_and_reconcile(&pdf(&format!("doc{i}.pdf")), token())
            .await
            .unwrap();
    }

    let list = rec.history().list().unwrap();
    assert_eq!(list.len(), 10);
    assert_eq!(list[0].execution_id, "EX11");
    assert_eq!(list[9].execution_id, "EX2");
    assert!(rec.history().find("EX1").unwrap().is_none());
}

#[tokio::test]
async fn test_cancelled_cycle_records_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(vec![]);
    let rec = reconciler(provider.clone(), &dir);

    let handle = rec.submit(&pdf("x.pdf"), token()).await.unwrap();
    let guard = rec.claim(&handle.execution_id).unwrap();
    assert!(rec.inflight().cancel("EX1"));

    let mut session = idp_reconciler::reconcile::ReconciliationSession::new(handle, "x.pdf");
    let err = rec.reconcile(&mut session, &guard).await.unwrap_err();
    assert!(matches!(err, ServiceError::Reconcile(_)));
    assert_eq!(provider.queries(), 0);
    assert!(rec.history().list().unwrap().is_empty());
}
