//! Orchestrator runs against the in-memory graph

use dtwin_core::{DeletionError, DeletionOrchestrator, DtwinConfig};
use dtwin_model::{DtdlParser, LoadMode};
use dtwin_service::{
    FailPoint, InMemoryTwinGraph, ServiceCall, ServiceError, TwinFilter, TwinGraphService,
};
use dtwin_test_utils::{
    abc_models, extending, interface, interface_text, model_id, relationship_scenario,
    seeded_graph, write_models, ROOM,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn orchestrator(graph: &Arc<InMemoryTwinGraph>) -> DeletionOrchestrator {
    DeletionOrchestrator::new(graph.clone(), Arc::new(DtdlParser::new()))
}

#[tokio::test]
async fn delete_all_models_uses_service_definitions() {
    let graph = seeded_graph(abc_models());
    let report = orchestrator(&graph).delete_all_models().await.unwrap();

    assert_eq!(report.passes.len(), 2);
    assert_eq!(report.passes[1].deleted, vec![model_id("dtmi:test:A;1")]);
    assert!(report.is_success());
    assert!(graph.model_ids().is_empty());
}

#[tokio::test]
async fn delete_all_models_on_empty_service_is_idempotent() {
    let graph = seeded_graph(Vec::new());
    let orchestrator = orchestrator(&graph);

    let first = orchestrator.delete_all_models().await.unwrap();
    let second = orchestrator.delete_all_models().await.unwrap();
    assert_eq!(first.deleted_count(), 0);
    assert!(second.into_result().is_ok());
    assert!(graph.calls().is_empty());
}

#[tokio::test]
async fn unparseable_universe_fails_validation_without_deleting() {
    // Parent missing from the service: the listing does not validate
    let graph = seeded_graph(vec![extending("dtmi:test:Child;1", "dtmi:test:Gone;1")]);
    let err = orchestrator(&graph).delete_all_models().await.unwrap_err();

    match err {
        DeletionError::ValidationFailed { issues } => {
            assert!(issues.iter().any(|i| i.cause.contains("undefined model")));
        }
        other => panic!("expected ValidationFailed, got {other:?}"),
    }
    assert!(graph.calls().is_empty());
}

#[tokio::test]
async fn listing_failure_is_a_service_error() {
    let graph = seeded_graph(abc_models());
    graph.fail_on(FailPoint::ListModels, ServiceError::new(401, "Unauthorized", "no token"));
    let err = orchestrator(&graph).delete_all_models().await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.error_code(), Some("Unauthorized"));
}

#[tokio::test]
async fn delete_models_limits_the_working_set() {
    let graph = seeded_graph(abc_models());
    let orchestrator = orchestrator(&graph);

    let report = orchestrator
        .delete_models(&[model_id("dtmi:test:B;1")])
        .await
        .unwrap();
    assert_eq!(report.deleted_count(), 1);
    assert_eq!(graph.model_ids().len(), 2);

    let err = orchestrator
        .delete_models(&[model_id("dtmi:test:Nope;1")])
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn single_model_delete_surfaces_conflicts() {
    let graph = seeded_graph(abc_models());
    let err = orchestrator(&graph)
        .delete_model(&model_id("dtmi:test:A;1"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(409));
    assert_eq!(err.error_code(), Some("ModelReferencesNotDeleted"));
}

#[tokio::test]
async fn twin_is_deleted_only_after_both_relationship_streams() {
    let graph = relationship_scenario();
    let cascade = orchestrator(&graph).delete_twin("t1").await.unwrap();

    assert_eq!(cascade.outgoing, 1);
    assert_eq!(cascade.incoming, 1);
    let calls = graph.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2], ServiceCall::DeleteTwin("t1".into()));
    assert_eq!(graph.twin_ids(), vec!["t2".to_string(), "t3".to_string()]);
}

#[tokio::test]
async fn twin_delete_is_attempted_after_cascade_failures() {
    let graph = relationship_scenario();
    graph.fail_on(
        FailPoint::DeleteRelationship {
            twin_id: "t3".into(),
            relationship_id: "r-owns".into(),
        },
        ServiceError::new(500, "InternalServerError", "boom"),
    );

    let err = orchestrator(&graph).delete_twin("t1").await.unwrap_err();
    assert_eq!(err.error_code(), Some("RelationshipsNotDeleted"));
    assert_eq!(
        graph.calls().last(),
        Some(&ServiceCall::DeleteTwin("t1".into()))
    );
}

#[tokio::test]
async fn delete_all_twins_cascades_then_deletes() {
    let graph = relationship_scenario();
    let report = orchestrator(&graph)
        .delete_all_twins(&TwinFilter::All)
        .await
        .unwrap();

    assert_eq!(report.deleted, vec!["t1".to_string(), "t2".to_string(), "t3".to_string()]);
    assert_eq!(report.relationships_deleted(), 2);
    assert_eq!(report.cascades.len(), 3);
    assert!(report.into_result().is_ok());
    assert!(graph.twin_ids().is_empty());

    let calls = graph.calls();
    let first_twin_delete = calls
        .iter()
        .position(|c| matches!(c, ServiceCall::DeleteTwin(_)))
        .unwrap();
    assert!(calls[first_twin_delete..]
        .iter()
        .all(|c| matches!(c, ServiceCall::DeleteTwin(_))));
}

#[tokio::test]
async fn delete_all_twins_reports_partial_failure() {
    let graph = relationship_scenario();
    graph.fail_on(
        FailPoint::DeleteTwin("t2".into()),
        ServiceError::new(503, "ServiceUnavailable", "busy"),
    );

    let report = orchestrator(&graph)
        .delete_all_twins(&TwinFilter::OfModel(model_id(ROOM)))
        .await
        .unwrap();
    assert!(!report.is_success());

    match report.into_result() {
        Err(DeletionError::PartialFailure { succeeded, failed_ids }) => {
            assert_eq!(succeeded, 2);
            assert_eq!(failed_ids, vec!["t2".to_string()]);
        }
        other => panic!("expected PartialFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn twin_query_by_other_model_selects_nothing() {
    let graph = relationship_scenario();
    graph.insert_models([interface("dtmi:test:Other;1")]);
    let report = orchestrator(&graph)
        .delete_all_twins(&TwinFilter::OfModel(model_id("dtmi:test:Other;1")))
        .await
        .unwrap();
    assert!(report.deleted.is_empty());
    assert_eq!(graph.twin_ids().len(), 3);
}

#[tokio::test]
async fn cancelled_orchestrator_stops_before_any_call() {
    let graph = relationship_scenario();
    let orchestrator = orchestrator(&graph);
    orchestrator.cancellation_token().cancel();

    assert!(orchestrator.delete_all_models().await.unwrap_err().is_cancelled());
    assert!(orchestrator
        .delete_all_twins(&TwinFilter::All)
        .await
        .unwrap_err()
        .is_cancelled());
    assert!(graph.calls().is_empty());
}

#[tokio::test]
async fn upload_models_validates_then_creates() {
    let dir = tempfile::tempdir().unwrap();
    let base = interface_text("dtmi:test:Base;1", &[], &[]);
    let room = interface_text("dtmi:test:Room;1", &["dtmi:test:Base;1"], &[]);
    write_models(
        dir.path(),
        &[
            ("base.json", base.as_str()),
            ("nested/room.json", room.as_str()),
            ("notes.txt", "not a model"),
        ],
    );

    let graph = seeded_graph(Vec::new());
    let created = orchestrator(&graph).upload_models(dir.path()).await.unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(
        graph.model_ids(),
        vec![model_id("dtmi:test:Base;1"), model_id("dtmi:test:Room;1")]
    );

    // Now deletable in dependency order
    let report = orchestrator(&graph).delete_all_models().await.unwrap();
    assert_eq!(report.passes[0].deleted, vec![model_id("dtmi:test:Room;1")]);
}

#[tokio::test]
async fn upload_rejects_invalid_definitions_without_calling_the_service() {
    let dir = tempfile::tempdir().unwrap();
    let room = interface_text("dtmi:test:Room;1", &["dtmi:test:Missing;1"], &[]);
    write_models(dir.path(), &[("room.json", room.as_str())]);

    let graph = seeded_graph(Vec::new());
    let err = orchestrator(&graph).upload_models(dir.path()).await.unwrap_err();
    assert!(matches!(err, DeletionError::ValidationFailed { .. }));
    assert!(graph.calls().is_empty());

    let err = orchestrator(&graph)
        .upload_models(dir.path().join("absent"))
        .await
        .unwrap_err();
    assert!(matches!(err, DeletionError::Repository(_)));
}

#[tokio::test]
async fn config_tunes_the_orchestrator() {
    let mut config = DtwinConfig::new().with_max_concurrency(1);
    config.models.accumulate = true;
    config.models.extensions = vec!["dtdl".into()];

    let graph = seeded_graph(Vec::new());
    let orchestrator = DeletionOrchestrator::from_config(graph.clone(), &config);
    assert_eq!(orchestrator.repository().load_mode(), LoadMode::Accumulate);

    let dir = tempfile::tempdir().unwrap();
    let room = interface_text("dtmi:test:Room;1", &[], &[]);
    let ignored = interface_text("dtmi:test:Ignored;1", &[], &[]);
    write_models(
        dir.path(),
        &[("room.dtdl", room.as_str()), ("ignored.json", ignored.as_str())],
    );
    orchestrator.upload_models(dir.path()).await.unwrap();
    assert_eq!(graph.model_ids(), vec![model_id("dtmi:test:Room;1")]);

    let listed = graph.get_model(&model_id("dtmi:test:Room;1")).await.unwrap();
    assert!(listed.definition.is_some());
}

#[tokio::test]
async fn inline_interfaces_are_not_deleted_on_their_own() {
    let graph = seeded_graph(Vec::new());
    graph
        .create_models(vec![
            json!({ "@id": "dtmi:test:Space;1", "@type": "Interface" }),
            json!({ "@id": "dtmi:test:Device;1", "@type": "Interface" }),
            json!({
                "@id": ROOM,
                "@type": "Interface",
                "extends": [{ "@type": "Interface", "extends": "dtmi:test:Space;1" }],
                "contents": [{
                    "@type": "Component",
                    "name": "lamp",
                    "schema": { "@type": "Interface", "extends": "dtmi:test:Device;1" }
                }]
            }),
        ])
        .await
        .unwrap();
    assert_eq!(graph.model_ids().len(), 3);

    let report = orchestrator(&graph).delete_all_models().await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.passes.len(), 2);
    assert_eq!(report.passes[0].deleted, vec![model_id(ROOM)]);
    assert_eq!(
        report.passes[1].deleted,
        vec![model_id("dtmi:test:Device;1"), model_id("dtmi:test:Space;1")]
    );
    assert!(graph.model_ids().is_empty());
}
