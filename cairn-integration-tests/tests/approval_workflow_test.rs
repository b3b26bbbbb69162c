//! End-to-end approval workflow over the fully wired core.

use cairn::errors::{CommandError, ValidationError};
use cairn::event::{EventKind, EventStatus, ProjectEventPayload};
use cairn::store::EventStore;
use cairn::registry::{EventTypeMeta, EventTypeRegistry};
use cairn_integration_tests::{as_user, project, started_in, Harness};

fn approval_for_detail_updates() -> EventTypeRegistry {
    let mut registry = EventTypeRegistry::with_defaults();
    registry.register(
        EventKind::try_new("project_details_updated").expect("valid kind"),
        EventTypeMeta::auto_approved("Project details updated").with_needs_approval(|_, _| true),
    );
    registry
}

fn rename(title: &str) -> ProjectEventPayload {
    ProjectEventPayload::ProjectDetailsUpdated {
        title: Some(title.to_string()),
        description: None,
        start_date: None,
        end_date: None,
    }
}

#[tokio::test]
async fn pending_rename_becomes_visible_only_after_approval() {
    let harness = Harness::builder()
        .registry(approval_for_detail_updates())
        .build();
    let ctx = as_user("maria");
    let id = project("coral-genomics");

    harness
        .executor
        .execute_new(&ctx, &id, |_, _| Ok(vec![started_in("Coral genomics", None)]))
        .await
        .expect("bootstrap succeeds");

    let state = harness
        .executor
        .execute(&ctx, &id, |_, _| Ok(vec![rename("Coral genomics II")]))
        .await
        .expect("rename commits");

    // The rename occupies version 2 but the projection still shows the old
    // title while the event waits for review.
    assert_eq!(u64::from(state.version), 2);
    assert_eq!(state.title, "Coral genomics");
    let cached = harness.loader.load(&id).await.expect("load succeeds");
    assert_eq!(cached.title, "Coral genomics");

    let (events, _) = harness.store.load(&id).await.expect("stream exists");
    let pending_id = events[1].id;
    assert_eq!(events[1].status, EventStatus::Pending);

    harness.service.approve(&pending_id).await.expect("approve succeeds");

    // Approval is retroactive: the same stream now folds to the new title,
    // and the dispatcher refreshed the cache on the status change.
    let refreshed = harness.loader.load(&id).await.expect("load succeeds");
    assert_eq!(refreshed.title, "Coral genomics II");
    assert_eq!(u64::from(refreshed.version), 2);
}

#[tokio::test]
async fn rejected_rename_never_becomes_visible() {
    let harness = Harness::builder()
        .registry(approval_for_detail_updates())
        .build();
    let ctx = as_user("maria");
    let id = project("p1");

    harness
        .executor
        .execute_new(&ctx, &id, |_, _| Ok(vec![started_in("Original", None)]))
        .await
        .expect("bootstrap succeeds");
    harness
        .executor
        .execute(&ctx, &id, |_, _| Ok(vec![rename("Renamed")]))
        .await
        .expect("rename commits");

    let (events, _) = harness.store.load(&id).await.expect("stream exists");
    harness.service.reject(&events[1].id).await.expect("reject succeeds");

    let state = harness.loader.load(&id).await.expect("load succeeds");
    assert_eq!(state.title, "Original");
    // The rejected event still holds its stream slot.
    assert_eq!(u64::from(state.version), 2);
}

#[tokio::test]
async fn a_verdict_is_terminal_for_later_reviewers() {
    let harness = Harness::builder()
        .registry(approval_for_detail_updates())
        .build();
    let ctx = as_user("maria");
    let id = project("p1");

    harness
        .executor
        .execute_new(&ctx, &id, |_, _| Ok(vec![started_in("Original", None)]))
        .await
        .expect("bootstrap succeeds");
    harness
        .executor
        .execute(&ctx, &id, |_, _| Ok(vec![rename("Renamed")]))
        .await
        .expect("rename commits");
    let (events, _) = harness.store.load(&id).await.expect("stream exists");
    let pending_id = events[1].id;

    // Two reviewers race; the second verdict bounces off the first.
    harness.service.approve(&pending_id).await.expect("first verdict lands");
    let second = harness.service.reject(&pending_id).await;
    assert!(matches!(
        second,
        Err(CommandError::Validation(
            ValidationError::InvalidStatusTransition { .. }
        ))
    ));

    let state = harness.loader.load(&id).await.expect("load succeeds");
    assert_eq!(state.title, "Renamed");
}

#[tokio::test]
async fn simultaneous_verdicts_admit_exactly_one_winner() {
    let harness = std::sync::Arc::new(
        Harness::builder()
            .registry(approval_for_detail_updates())
            .build(),
    );
    let ctx = as_user("maria");
    let id = project("p1");

    harness
        .executor
        .execute_new(&ctx, &id, |_, _| Ok(vec![started_in("Original", None)]))
        .await
        .expect("bootstrap succeeds");
    harness
        .executor
        .execute(&ctx, &id, |_, _| Ok(vec![rename("Renamed")]))
        .await
        .expect("rename commits");
    let (events, _) = harness.store.load(&id).await.expect("stream exists");
    let pending_id = events[1].id;

    let approve = {
        let harness = std::sync::Arc::clone(&harness);
        tokio::spawn(async move { harness.service.approve(&pending_id).await })
    };
    let reject = {
        let harness = std::sync::Arc::clone(&harness);
        tokio::spawn(async move { harness.service.reject(&pending_id).await })
    };

    let outcomes = [
        approve.await.expect("task runs"),
        reject.await.expect("task runs"),
    ];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|r| matches!(
        r,
        Err(CommandError::Validation(
            ValidationError::InvalidStatusTransition { .. }
        ))
    )));

    // The projection reflects the winner, whichever it was.
    let stored = harness.store.get_event(&pending_id).await.expect("event exists");
    let winner = outcomes
        .iter()
        .find_map(|r| r.as_ref().ok())
        .expect("one verdict landed");
    assert_eq!(stored.status, winner.status);
    assert!(stored.status.is_terminal());
}

#[tokio::test]
async fn auto_approved_events_bypass_the_workflow() {
    let harness = Harness::new();
    let ctx = as_user("maria");
    let id = project("p1");

    let state = harness
        .executor
        .execute_new(&ctx, &id, |_, _| Ok(vec![started_in("Direct", None)]))
        .await
        .expect("bootstrap succeeds");

    assert_eq!(state.title, "Direct");
    let (events, _) = harness.store.load(&id).await.expect("stream exists");
    assert_eq!(events[0].status, EventStatus::Approved);
}
