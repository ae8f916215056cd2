//! REST client against a mock twin-graph endpoint

use dtwin_model::ModelId;
use dtwin_service::{
    RestConfig, RestTwinGraph, TwinFilter, TwinGraphService, DEFAULT_API_VERSION,
};
use futures::{StreamExt, TryStreamExt};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> RestTwinGraph {
    let config = RestConfig::new(&server.uri())
        .unwrap()
        .with_access_token("secret");
    RestTwinGraph::new(config).unwrap()
}

fn relationship(id: &str, target: &str) -> serde_json::Value {
    json!({
        "$relationshipId": id,
        "$sourceId": "hub",
        "$relationshipName": "feeds",
        "$targetId": target,
    })
}

#[tokio::test]
async fn relationship_listing_follows_next_link() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/digitaltwins/hub/relationships"))
        .and(query_param("api-version", DEFAULT_API_VERSION))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [relationship("r1", "a"), relationship("r2", "b")],
            "nextLink": format!("{}/pages/relationships?page=2", server.uri()),
        })))
        .expect(1)
        .mount(&server)
        .await;

    // The continuation link carries no api-version; the client adds it
    Mock::given(method("GET"))
        .and(path("/pages/relationships"))
        .and(query_param("page", "2"))
        .and(query_param("api-version", DEFAULT_API_VERSION))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [relationship("r3", "c")],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let relationships: Vec<_> = client(&server)
        .get_relationships("hub")
        .try_collect()
        .await
        .unwrap();

    let ids: Vec<&str> = relationships.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r2", "r3"]);
    assert_eq!(relationships[2].target_id, "c");
    assert_eq!(relationships[0].name, "feeds");
}

#[tokio::test]
async fn failing_second_page_ends_listing_with_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/digitaltwins/hub/incomingrelationships"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{
                "$relationshipId": "in1",
                "$sourceId": "a",
                "$relationshipName": "feeds",
            }],
            "nextLink": format!("{}/pages/incoming", server.uri()),
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/pages/incoming"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let results: Vec<_> = client(&server)
        .get_incoming_relationships("hub")
        .collect()
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().relationship_id, "in1");
    let err = results[1].as_ref().unwrap_err();
    assert_eq!(err.status, 503);
    assert_eq!(err.message, "busy");
}

#[tokio::test]
async fn query_follows_continuation_token() {
    let server = MockServer::start().await;
    let query = TwinFilter::All.to_query();

    Mock::given(method("POST"))
        .and(path("/query"))
        .and(query_param("api-version", DEFAULT_API_VERSION))
        .and(body_json(json!({ "query": query })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "$dtId": "t1" }, { "$dtId": "t2" }],
            "continuationToken": "tok-2",
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_json(json!({ "query": query, "continuationToken": "tok-2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "T": { "$dtId": "t3" } }],
            "continuationToken": null,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ids: Vec<String> = client(&server)
        .query_twin_ids(&TwinFilter::All)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(ids, vec!["t1", "t2", "t3"]);
}

#[tokio::test]
async fn conflict_body_surfaces_status_and_code() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path_regex(r"^/models/dtmi:t:Room;1$"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": {
                "code": "ModelReferencesNotDeleted",
                "message": "dtmi:t:Room;1 is referenced by dtmi:t:Office;1",
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id: ModelId = "dtmi:t:Room;1".parse().unwrap();
    let err = client(&server).delete_model(&id).await.unwrap_err();

    assert_eq!(err.status, 409);
    assert_eq!(err.error_code, "ModelReferencesNotDeleted");
    assert!(err.message.contains("dtmi:t:Office;1"));
}

#[tokio::test]
async fn plain_error_body_falls_back_to_status_name() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/digitaltwins/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such twin"))
        .mount(&server)
        .await;

    let err = client(&server).get_twin("ghost").await.unwrap_err();

    assert_eq!(err.status, 404);
    assert_eq!(err.message, "no such twin");
    assert_eq!(err.error_code, "NotFound");
}
