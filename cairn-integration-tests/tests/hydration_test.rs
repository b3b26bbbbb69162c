//! Hydrating a stream for presentation using the in-memory directories.

use std::collections::BTreeMap;
use std::sync::Arc;

use cairn::event::ProjectEventPayload;
use cairn::hydrate::Hydrator;
use cairn::registry::EventTypeRegistry;
use cairn::store::EventStore;
use cairn::types::{PersonId, ProductId, ProjectRoleId};
use cairn_integration_tests::{as_user, project, started_in, Harness};
use cairn_memory::StaticEntityDirectory;

#[tokio::test]
async fn a_project_timeline_hydrates_names_for_display() {
    let harness = Harness::new();
    let ctx = as_user("maria");
    let id = project("p1");
    harness
        .executor
        .execute_new(&ctx, &id, |_, _| Ok(vec![started_in("Timeline", None)]))
        .await
        .expect("bootstrap succeeds");
    harness
        .executor
        .execute(&ctx, &id, |_, _| {
            Ok(vec![
                ProjectEventPayload::MemberAdded {
                    person_id: PersonId::try_new("alice").expect("valid id"),
                    role_id: ProjectRoleId::try_new("pi").expect("valid id"),
                },
                ProjectEventPayload::ProductAdded {
                    product_id: ProductId::try_new("dataset-7").expect("valid id"),
                },
            ])
        })
        .await
        .expect("events commit");

    let mut persons = BTreeMap::new();
    persons.insert(
        PersonId::try_new("alice").expect("valid id"),
        "Alice Jones".to_string(),
    );
    let mut roles = BTreeMap::new();
    roles.insert(
        ProjectRoleId::try_new("pi").expect("valid id"),
        "Principal Investigator".to_string(),
    );
    let mut products = BTreeMap::new();
    products.insert(
        ProductId::try_new("dataset-7").expect("valid id"),
        "Reef survey dataset".to_string(),
    );
    let hydrator = Hydrator::new(
        Arc::new(StaticEntityDirectory::new(persons, roles, products)),
        Arc::new(EventTypeRegistry::with_defaults()),
    );

    let (events, _) = harness.store.load(&id).await.expect("stream exists");
    let timeline = hydrator.hydrate(events).await.expect("hydration succeeds");

    assert_eq!(timeline.len(), 3);
    assert_eq!(timeline[0].kind_name, "Project started");
    assert_eq!(timeline[1].person_name.as_deref(), Some("Alice Jones"));
    assert_eq!(
        timeline[1].role_name.as_deref(),
        Some("Principal Investigator")
    );
    assert_eq!(
        timeline[2].product_name.as_deref(),
        Some("Reef survey dataset")
    );
}
