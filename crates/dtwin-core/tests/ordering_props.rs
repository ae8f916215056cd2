//! Property tests for dependency-ordered model deletion

use dtwin_core::ModelDeletionResolver;
use dtwin_model::{ContentEntity, ModelEntity};
use dtwin_service::ServiceCall;
use dtwin_test_utils::{interface, model_id, seeded_graph};
use proptest::prelude::*;
use std::collections::HashMap;

fn id(i: usize) -> String {
    format!("dtmi:prop:M{i};1")
}

/// Models `0..count`; model `i` depends on every `j < i` named in `edges`,
/// through `extends` when `from + to` is even and a component schema otherwise
fn dag(count: usize, edges: &[(usize, usize)]) -> Vec<ModelEntity> {
    (0..count)
        .map(|i| {
            let mut parents: Vec<(usize, bool)> = edges
                .iter()
                .filter(|(from, to)| *from % count == i && *to % count < i)
                .map(|(from, to)| (to % count, (from + to) % 2 == 0))
                .collect();
            parents.sort_unstable();
            parents.dedup_by_key(|(parent, _)| *parent);
            parents
                .into_iter()
                .fold(interface(&id(i)), |entity, (parent, extends)| {
                    if extends {
                        entity.with_extends(model_id(&id(parent)))
                    } else {
                        entity.with_content(ContentEntity::Component {
                            name: format!("c{parent}"),
                            schema: model_id(&id(parent)),
                        })
                    }
                })
        })
        .collect()
}

/// `(referrer, dependency)` pairs across both edge kinds
fn edges_of(models: &[ModelEntity]) -> Vec<(String, String)> {
    models
        .iter()
        .flat_map(|entity| {
            entity
                .dependencies()
                .into_iter()
                .map(|(parent, _)| (entity.id.to_string(), parent.to_string()))
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_referrers_are_deleted_before_dependencies(
        count in 1..16usize,
        edges in proptest::collection::vec((0..16usize, 0..16usize), 0..40),
    ) {
        let models = dag(count, &edges);
        let graph = seeded_graph(models.clone());
        let runtime = tokio::runtime::Runtime::new().unwrap();

        let report = runtime
            .block_on(ModelDeletionResolver::new(graph.clone()).with_max_concurrency(4).run(&models))
            .unwrap();
        prop_assert!(report.is_success());
        prop_assert_eq!(report.deleted_count(), count);
        prop_assert!(graph.model_ids().is_empty());

        let position: HashMap<String, usize> = graph
            .calls()
            .into_iter()
            .enumerate()
            .filter_map(|(at, call)| match call {
                ServiceCall::DeleteModel(id) => Some((id.to_string(), at)),
                _ => None,
            })
            .collect();
        for (referrer, parent) in edges_of(&models) {
            prop_assert!(position[&referrer] < position[&parent]);
        }
    }

    #[test]
    fn prop_each_pass_deletes_only_unreferenced_models(
        count in 1..12usize,
        edges in proptest::collection::vec((0..12usize, 0..12usize), 0..30),
    ) {
        let models = dag(count, &edges);
        let graph = seeded_graph(models.clone());
        let runtime = tokio::runtime::Runtime::new().unwrap();

        let report = runtime
            .block_on(ModelDeletionResolver::new(graph).run(&models))
            .unwrap();

        let pass_of: HashMap<String, usize> = report
            .passes
            .iter()
            .flat_map(|pass| pass.deleted.iter().map(move |id| (id.to_string(), pass.pass)))
            .collect();
        for (referrer, parent) in edges_of(&models) {
            prop_assert!(pass_of[&referrer] < pass_of[&parent]);
        }
    }
}
