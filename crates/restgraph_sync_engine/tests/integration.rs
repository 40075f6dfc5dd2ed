//! Integration tests for the incremental store against a scripted transport.

use proptest::prelude::*;
use restgraph_core::{
    AttributeValue, CachedNode, CoreError, CoreResult, LocalId, Query, RelationshipDescription,
    RelationshipValue,
};
use restgraph_sync_engine::{
    IncrementalStore, Method, MockTransport, Notification, PendingChange, RemoteRequest,
    RemoteResponse, RequestFactory, RestRequestFactory, SyncConfig, SyncContext, SyncError,
    TransportError,
};
use restgraph_testkit::prelude::*;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

fn setup(config: SyncConfig) -> (IncrementalStore, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let store = IncrementalStore::new(music_catalog(), &config, transport.clone());
    (store, transport)
}

fn store() -> (IncrementalStore, Arc<MockTransport>) {
    setup(SyncConfig::default())
}

/// Wraps the REST factory to suppress inserts or force refreshes.
struct CustomFactory {
    inner: RestRequestFactory,
    suppress_inserts: bool,
    refresh_objects: bool,
}

impl RequestFactory for CustomFactory {
    fn request_for_collection(&self, query: &Query) -> CoreResult<RemoteRequest> {
        self.inner.request_for_collection(query)
    }

    fn request_for_object(&self, node: &CachedNode, resource_id: &str) -> RemoteRequest {
        self.inner.request_for_object(node, resource_id)
    }

    fn request_for_relationship(
        &self,
        node: &CachedNode,
        resource_id: &str,
        relationship: &RelationshipDescription,
    ) -> RemoteRequest {
        self.inner
            .request_for_relationship(node, resource_id, relationship)
    }

    fn request_for_insert(&self, node: &CachedNode) -> CoreResult<Option<RemoteRequest>> {
        if self.suppress_inserts {
            return Ok(None);
        }
        self.inner.request_for_insert(node)
    }

    fn request_for_update(
        &self,
        node: &CachedNode,
        resource_id: &str,
        changed: &BTreeSet<String>,
    ) -> CoreResult<Option<RemoteRequest>> {
        self.inner.request_for_update(node, resource_id, changed)
    }

    fn request_for_delete(&self, node: &CachedNode, resource_id: &str) -> Option<RemoteRequest> {
        self.inner.request_for_delete(node, resource_id)
    }

    fn should_refresh_object(&self, _node: &CachedNode) -> bool {
        self.refresh_objects
    }
}

fn custom_store(
    suppress_inserts: bool,
    refresh_objects: bool,
) -> (IncrementalStore, Arc<MockTransport>) {
    let context = Arc::new(SyncContext::in_memory(music_catalog()));
    let inner = RestRequestFactory::new(context.translator().clone(), &SyncConfig::default());
    let transport = Arc::new(MockTransport::new());
    let store = IncrementalStore::from_parts(
        context,
        Arc::new(CustomFactory {
            inner,
            suppress_inserts,
            refresh_objects,
        }),
        transport.clone(),
    );
    (store, transport)
}

async fn fetch_artist(store: &IncrementalStore, transport: &MockTransport, id: &str) -> LocalId {
    transport.respond(
        Method::Get,
        "artists",
        RemoteResponse::ok(json!([artist_record(id, "Artist")])),
    );
    let fetched = store.execute_query(&Query::all("Artist")).await.unwrap();
    fetched[0]
}

#[tokio::test]
async fn fetched_record_materializes_with_version_one() {
    let (store, transport) = store();
    transport.respond(
        Method::Get,
        "artists",
        RemoteResponse::ok(json!([{"id": "42", "name": "X"}])),
    );

    let fetched = store.execute_query(&Query::all("Artist")).await.unwrap();
    assert_eq!(fetched.len(), 1);

    let node = store.node(fetched[0]).unwrap();
    assert_eq!(node.resource_id(), Some("42"));
    assert_eq!(node.version(), 1);
    assert_eq!(node.attribute("name"), Some(&AttributeValue::from("X")));
}

#[tokio::test]
async fn same_resource_is_the_same_object() {
    let (store, transport) = store();
    transport.respond(
        Method::Get,
        "artists",
        RemoteResponse::ok(json!([artist_record("1", "A"), artist_record("2", "B")])),
    );

    let first = store.execute_query(&Query::all("Artist")).await.unwrap();
    let second = store.execute_query(&Query::all("Artist")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.context().graph().len(), 2);
    assert_eq!(store.node(first[0]).unwrap().version(), 2);
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn wrapped_collections_are_unwrapped() {
    let (store, transport) = store();
    transport.respond(
        Method::Get,
        "artists",
        RemoteResponse::ok(json!({"artists": [artist_record("1", "A")], "total": 1})),
    );

    let fetched = store.execute_query(&Query::all("Artist")).await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(
        store.node(fetched[0]).unwrap().attribute("name"),
        Some(&AttributeValue::from("A"))
    );
}

#[tokio::test]
async fn empty_fetch_still_notifies() {
    let (store, transport) = store();
    let notifications = store.subscribe();
    transport.respond(Method::Get, "artists", RemoteResponse::ok(json!([])));

    let fetched = store.execute_query(&Query::all("Artist")).await.unwrap();
    assert!(fetched.is_empty());

    let will = notifications.try_recv().unwrap();
    assert!(matches!(will, Notification::WillFetchCollection { .. }));
    assert_eq!(will.operations().len(), 1);
    match notifications.try_recv().unwrap() {
        Notification::DidFetchCollection { fetched, error, .. } => {
            assert!(fetched.is_empty());
            assert!(error.is_none());
        }
        other => panic!("unexpected notification: {other:?}"),
    }
}

#[tokio::test]
async fn failed_fetch_leaves_graph_untouched() {
    let (store, transport) = store();
    let artist = fetch_artist(&store, &transport, "1").await;
    let before = store.node(artist).unwrap();

    transport.set_connected(false);
    let err = store.execute_query(&Query::all("Artist")).await.unwrap_err();
    assert!(matches!(err, SyncError::RemoteFetchFailed { .. }));
    assert!(err.is_remote());
    assert_eq!(store.node(artist).unwrap(), before);
    assert_eq!(store.stats().fetches_failed, 1);

    let history = store.notification_history();
    assert!(matches!(
        history.last(),
        Some(Notification::DidFetchCollection { error: Some(_), .. })
    ));
}

#[tokio::test]
async fn pagination_parameters_follow_the_window() {
    let (store, transport) = setup(SyncConfig::default().with_limit_offset());
    transport.respond(Method::Get, "artists", RemoteResponse::ok(json!([])));

    store
        .execute_query(&Query::all("Artist").with_limit(10).with_offset(20))
        .await
        .unwrap();

    let request = &transport.requests()[0];
    assert_eq!(request.query.get("limit").map(String::as_str), Some("10"));
    assert_eq!(request.query.get("offset").map(String::as_str), Some("20"));
}

#[tokio::test]
async fn bad_date_only_drops_that_field() {
    let (store, transport) = store();
    transport.respond(
        Method::Get,
        "songs",
        RemoteResponse::ok(json!([
            {"id": "1", "title": "A", "released": "not a date"},
            {"id": "2", "title": "B", "released": "2020-05-01T10:00:00Z"},
        ])),
    );

    let outcome = store.fetch_collection(&Query::all("Song")).await.unwrap();
    assert_eq!(outcome.fetched.len(), 2);
    assert_eq!(outcome.errors.len(), 1);

    let broken = store.node(outcome.fetched[0]).unwrap();
    assert_eq!(broken.attribute("title"), Some(&AttributeValue::from("A")));
    assert!(broken.attribute("released").is_none());

    let fine = store.node(outcome.fetched[1]).unwrap();
    assert!(fine
        .attribute("released")
        .and_then(AttributeValue::as_date)
        .is_some());
}

#[tokio::test]
async fn to_many_faults_always_hit_the_network() {
    let (store, transport) = store();
    let artist = fetch_artist(&store, &transport, "42").await;
    transport.respond(
        Method::Get,
        "artists/42/songs",
        RemoteResponse::ok(json!([song_record("s1", "One"), song_record("s2", "Two")])),
    );

    let first = store.fault_relationship(artist, "songs").await.unwrap();
    let second = store.fault_relationship(artist, "songs").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.ids().len(), 2);
    assert_eq!(transport.requests_with(Method::Get).len(), 3);
}

#[tokio::test]
async fn to_one_fault_resolves_through_the_inverse() {
    let (store, transport) = store();
    transport.respond(
        Method::Get,
        "artists",
        RemoteResponse::ok(json!([{"id": "42", "songs": [song_record("s1", "One")]}])),
    );
    let artist = store.execute_query(&Query::all("Artist")).await.unwrap()[0];
    let song = store
        .context()
        .registry()
        .lookup("s1", "Song")
        .unwrap();
    let requests = transport.request_count();

    let value = store.fault_relationship(song, "artist").await.unwrap();

    assert_eq!(value, RelationshipValue::ToOne(Some(artist)));
    assert_eq!(transport.request_count(), requests);
    assert_eq!(
        store.node(song).unwrap().relationship("artist"),
        Some(&RelationshipValue::ToOne(Some(artist)))
    );
}

#[tokio::test]
async fn faulting_a_stub_fetches_it_once() {
    let (store, transport) = store();
    transport.respond(
        Method::Get,
        "songs",
        RemoteResponse::ok(json!([{"id": "1", "title": "A", "artist": "42"}])),
    );
    let song = store.execute_query(&Query::all("Song")).await.unwrap()[0];
    let Some(RelationshipValue::ToOne(Some(artist))) =
        store.node(song).unwrap().relationship("artist").cloned()
    else {
        panic!("song has no artist");
    };
    assert_eq!(store.node(artist).unwrap().version(), 0);

    transport.respond(
        Method::Get,
        "artists/42",
        RemoteResponse::ok(json!({"artist": artist_record("42", "Nina")})),
    );
    let node = store.fault_object(artist).await.unwrap();
    assert_eq!(node.version(), 1);
    assert_eq!(node.attribute("name"), Some(&AttributeValue::from("Nina")));

    store.fault_object(artist).await.unwrap();
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn not_modified_keeps_the_node() {
    let (store, transport) = custom_store(false, true);
    transport.respond(
        Method::Get,
        "artists",
        RemoteResponse::ok(json!([artist_record("42", "Nina")]))
            .with_header("Last-Modified", "Tue, 01 Sep 2020 10:00:00 GMT"),
    );
    let artist = store.execute_query(&Query::all("Artist")).await.unwrap()[0];
    transport.respond(Method::Get, "artists/42", RemoteResponse::not_modified());

    let node = store.fault_object(artist).await.unwrap();

    assert_eq!(node.version(), 1);
    let request = transport.requests().pop().unwrap();
    assert_eq!(request.path, "artists/42");
    assert_eq!(
        request.headers.get("If-Modified-Since").map(String::as_str),
        Some("Tue, 01 Sep 2020 10:00:00 GMT")
    );
}

#[tokio::test]
async fn unsynced_objects_cannot_be_faulted() {
    let (store, transport) = store();
    let artist = store
        .insert("Artist", string_attributes(&[("name", "Local")]))
        .unwrap();

    let err = store.fault_object(artist).await.unwrap_err();
    assert!(matches!(err, SyncError::Precision { local, .. } if local == artist));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn insert_binds_the_returned_identifier() {
    let (store, transport) = store();
    let artist = store
        .insert("Artist", string_attributes(&[("name", "Nina")]))
        .unwrap();
    transport.respond(
        Method::Post,
        "artists",
        RemoteResponse::with_status(201, json!({"id": "7", "name": "Nina", "genre": "jazz"})),
    );

    let report = store.save().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.committed, vec![artist]);
    assert!(!store.has_changes());
    let node = store.node(artist).unwrap();
    assert_eq!(node.resource_id(), Some("7"));
    assert_eq!(node.attribute("genre"), Some(&AttributeValue::from("jazz")));
    assert_eq!(store.context().registry().lookup("7", "Artist"), Some(artist));

    let body = transport.requests()[0].body.clone().unwrap();
    assert_eq!(body["name"], "Nina");
    assert!(body["born"].is_null());
}

#[tokio::test]
async fn insert_without_identifier_stays_pending() {
    let (store, transport) = store();
    let artist = store.insert("Artist", BTreeMap::new()).unwrap();
    transport.respond(Method::Post, "artists", RemoteResponse::ok(json!({})));

    let report = store.save().await.unwrap();

    assert!(!report.is_success());
    assert!(report.errors.contains_key(&artist));
    assert_eq!(
        store.context().pending_change(artist),
        Some(PendingChange::Insert)
    );
}

#[tokio::test]
async fn suppressed_insert_persists_locally() {
    let (store, transport) = custom_store(true, false);
    let artist = store
        .insert("Artist", string_attributes(&[("name", "Offline")]))
        .unwrap();

    let report = store.save().await.unwrap();

    assert_eq!(report.suppressed, vec![artist]);
    assert!(report.is_success());
    assert!(!store.has_changes());
    assert_eq!(transport.request_count(), 0);
    assert_eq!(store.query(&Query::all("Artist")), vec![artist]);
    assert!(store.node(artist).unwrap().resource_id().is_none());
}

#[tokio::test]
async fn relationship_only_updates_send_nothing() {
    let (store, transport) = store();
    let artist = fetch_artist(&store, &transport, "42").await;
    transport.respond(
        Method::Get,
        "songs",
        RemoteResponse::ok(json!([song_record("s1", "One")])),
    );
    let song = store.execute_query(&Query::all("Song")).await.unwrap()[0];
    let requests = transport.request_count();

    store.set_to_one(song, "artist", Some(artist)).unwrap();
    let report = store.save().await.unwrap();

    assert_eq!(report.committed, vec![song]);
    assert_eq!(transport.request_count(), requests);
    assert_eq!(
        store.node(song).unwrap().relationship("artist"),
        Some(&RelationshipValue::ToOne(Some(artist)))
    );
}

#[tokio::test]
async fn update_sends_only_changed_attributes() {
    let (store, transport) = store();
    let artist = fetch_artist(&store, &transport, "42").await;
    transport.respond(
        Method::Put,
        "artists/42",
        RemoteResponse::ok(json!({"id": "42", "name": "Artist", "genre": "soul"})),
    );

    store.set_attribute(artist, "genre", "soul").unwrap();
    let report = store.save().await.unwrap();

    assert!(report.is_success());
    let put = transport.requests_with(Method::Put).pop().unwrap();
    assert_eq!(put.body, Some(json!({"genre": "soul"})));
    assert_eq!(store.node(artist).unwrap().version(), 2);
}

#[tokio::test]
async fn failures_are_isolated_per_object() {
    let (store, transport) = store();
    transport.respond(
        Method::Get,
        "artists",
        RemoteResponse::ok(json!([artist_record("1", "A"), artist_record("2", "B")])),
    );
    let fetched = store.execute_query(&Query::all("Artist")).await.unwrap();
    let (first, second) = (fetched[0], fetched[1]);
    transport.fail(
        Method::Put,
        "artists/1",
        TransportError::Status {
            status: 500,
            body: "boom".into(),
        },
    );
    transport.respond(
        Method::Put,
        "artists/2",
        RemoteResponse::ok(json!({"id": "2", "name": "B2"})),
    );

    store.set_attribute(first, "name", "A2").unwrap();
    store.set_attribute(second, "name", "B2").unwrap();
    let report = store.save().await.unwrap();

    assert_eq!(report.committed, vec![second]);
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(
        report.errors.get(&first),
        Some(SyncError::Transport(TransportError::Status { status: 500, .. }))
    ));
    assert_eq!(
        store.context().pending_change(first),
        Some(PendingChange::update(["name"]))
    );
    assert!(!store.context().has_pending(second));

    match store.notification_history().last() {
        Some(Notification::DidSave { errors, .. }) => assert_eq!(errors.len(), 1),
        other => panic!("unexpected notification: {other:?}"),
    }
}

#[tokio::test]
async fn delete_removes_the_object_after_confirmation() {
    let (store, transport) = store();
    let artist = fetch_artist(&store, &transport, "42").await;
    transport.respond(
        Method::Delete,
        "artists/42",
        RemoteResponse::with_status(204, json!(null)),
    );

    store.delete(artist).unwrap();
    assert!(store.query(&Query::all("Artist")).is_empty());
    let report = store.save().await.unwrap();

    assert!(report.is_success());
    assert!(store.node(artist).is_none());
    assert!(store.context().registry().lookup("42", "Artist").is_none());
}

#[tokio::test]
async fn updates_wait_for_the_in_flight_insert() {
    let (store, transport) = store();
    let artist = store
        .insert("Artist", string_attributes(&[("name", "A")]))
        .unwrap();
    transport.respond_after(
        Method::Post,
        "artists",
        Duration::from_millis(50),
        RemoteResponse::ok(json!({"id": "7"})),
    );
    transport.respond(
        Method::Put,
        "artists/7",
        RemoteResponse::ok(json!({"id": "7"})),
    );

    let (inserted, updated) = tokio::join!(store.save(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.set_attribute(artist, "name", "B").unwrap();
        store.save().await
    });

    assert!(inserted.unwrap().is_success());
    assert!(updated.unwrap().is_success());
    let methods: Vec<_> = transport.requests().iter().map(|r| r.method).collect();
    assert_eq!(methods, vec![Method::Post, Method::Put]);
    assert_eq!(transport.requests()[1].path, "artists/7");
}

#[tokio::test]
async fn teardown_discards_late_results() {
    let (store, transport) = store();
    transport.respond_after(
        Method::Get,
        "artists",
        Duration::from_millis(50),
        RemoteResponse::ok(json!([artist_record("1", "A")])),
    );

    let query = Query::all("Artist");
    let (result, ()) = tokio::join!(store.execute_query(&query), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.tear_down();
    });

    assert!(matches!(result, Err(SyncError::ContextTornDown)));
    assert!(store.context().graph().is_empty());
    assert!(store.context().registry().is_empty());
}

#[test]
fn conflicting_identity_is_rejected() {
    let (store, _) = store();
    let registry = store.context().registry();
    let first = registry.local_identity_for("1", "Artist");
    let other = LocalId::new();

    registry.bind(first, "1", "Artist").unwrap();
    assert!(matches!(
        registry.bind(other, "1", "Artist"),
        Err(CoreError::IdentityConflict { .. })
    ));
    assert!(matches!(
        registry.bind(first, "2", "Artist"),
        Err(CoreError::IdentityConflict { .. })
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn inserted_attributes_reach_the_wire_intact(
        attributes in attributes_strategy(music_catalog().entity("Song").unwrap())
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (store, transport) = store();
        transport.respond(Method::Post, "songs", RemoteResponse::ok(json!({"id": "1"})));

        let song = store.insert("Song", attributes.clone()).unwrap();
        let report = runtime.block_on(store.save()).unwrap();
        prop_assert!(report.is_success());

        let body = transport.requests()[0].body.clone().unwrap();
        let record = body.as_object().unwrap();
        let decoded = store
            .context()
            .translator()
            .attributes_of(record, "Song")
            .unwrap();
        prop_assert!(decoded.errors.is_empty());
        prop_assert_eq!(decoded.attributes, attributes);
        prop_assert!(store.node(song).is_some());
    }
}

#[tokio::test]
async fn edits_made_during_an_insert_reach_the_server() {
    let (store, transport) = store();
    let artist = store
        .insert("Artist", string_attributes(&[("name", "A")]))
        .unwrap();
    transport.respond_after(
        Method::Post,
        "artists",
        Duration::from_millis(50),
        RemoteResponse::ok(json!({"id": "7", "name": "A"})),
    );
    transport.respond(
        Method::Put,
        "artists/7",
        RemoteResponse::ok(json!({"id": "7", "name": "B"})),
    );

    let (inserted, updated) = tokio::join!(store.save(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.set_attribute(artist, "name", "B").unwrap();
        store.save().await
    });

    assert!(inserted.unwrap().is_success());
    assert!(updated.unwrap().is_success());
    let puts = transport.requests_with(Method::Put);
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].body, Some(json!({"name": "B"})));
    assert_eq!(
        store.node(artist).unwrap().attribute("name"),
        Some(&AttributeValue::from("B"))
    );
    assert_eq!(store.context().insert_gate_count(), 0);
}

#[tokio::test]
async fn refetch_keeps_unsaved_edits() {
    let (store, transport) = store();
    transport.respond(
        Method::Get,
        "artists",
        RemoteResponse::ok(json!([{"id": "42", "name": "Remote", "genre": "jazz"}])),
    );
    transport.respond(
        Method::Get,
        "artists",
        RemoteResponse::ok(json!([{"id": "42", "name": "Remote", "genre": "soul"}])),
    );
    let artist = store.execute_query(&Query::all("Artist")).await.unwrap()[0];
    store.set_attribute(artist, "name", "Local").unwrap();

    store.execute_query(&Query::all("Artist")).await.unwrap();

    let node = store.node(artist).unwrap();
    assert_eq!(node.attribute("name"), Some(&AttributeValue::from("Local")));
    assert_eq!(node.attribute("genre"), Some(&AttributeValue::from("soul")));
    assert_eq!(
        store.context().pending_change(artist),
        Some(PendingChange::update(["name"]))
    );
}

#[tokio::test]
async fn nested_back_reference_counts_as_one_overwrite() {
    let (store, transport) = store();
    transport.respond(
        Method::Get,
        "artists",
        RemoteResponse::ok(json!([
            {"id": "42", "songs": [{"id": "s1", "artist": {"id": "42", "name": "A"}}]}
        ])),
    );

    let fetched = store.execute_query(&Query::all("Artist")).await.unwrap();

    assert_eq!(fetched.len(), 1);
    let node = store.node(fetched[0]).unwrap();
    assert_eq!(node.version(), 1);
    assert_eq!(node.attribute("name"), Some(&AttributeValue::from("A")));
}

#[tokio::test]
async fn settled_inserts_leave_no_gates_behind() {
    let (store, transport) = store();
    transport.respond(Method::Post, "artists", RemoteResponse::ok(json!({"id": "1"})));
    for _ in 0..3 {
        store.insert("Artist", BTreeMap::new()).unwrap();
    }

    let report = store.save().await;

    assert_eq!(report.unwrap().errors.len(), 2);
    assert_eq!(store.context().insert_gate_count(), 0);
}

#[tokio::test]
async fn deleted_objects_disappear_from_relationships() {
    let (store, transport) = store();
    transport.respond(
        Method::Get,
        "artists",
        RemoteResponse::ok(json!([{"id": "42", "songs": [song_record("s1", "One"), "s2"]}])),
    );
    let artist = store.execute_query(&Query::all("Artist")).await.unwrap()[0];
    transport.respond(
        Method::Get,
        "albums",
        RemoteResponse::ok(json!([{"id": "a1", "songs": ["s1"]}])),
    );
    let album = store.execute_query(&Query::all("Album")).await.unwrap()[0];
    let song = store.context().registry().lookup("s1", "Song").unwrap();
    transport.respond(
        Method::Delete,
        "songs/s1",
        RemoteResponse::with_status(204, json!(null)),
    );

    store.delete(song).unwrap();
    assert!(store.save().await.unwrap().is_success());

    let songs = store.node(artist).unwrap().relationship("songs").unwrap().ids();
    assert_eq!(songs.len(), 1);
    assert!(!songs.contains(&song));
    assert_eq!(
        store.node(album).unwrap().relationship("songs"),
        Some(&RelationshipValue::ToMany(Vec::new()))
    );
}

#[tokio::test]
async fn object_fault_notifies_around_the_request() {
    let (store, transport) = store();
    transport.respond(
        Method::Get,
        "songs",
        RemoteResponse::ok(json!([{"id": "1", "artist": "42"}])),
    );
    let song = store.execute_query(&Query::all("Song")).await.unwrap()[0];
    let artist = store.context().registry().lookup("42", "Artist").unwrap();
    transport.respond(
        Method::Get,
        "artists/42",
        RemoteResponse::ok(json!(artist_record("42", "Nina"))),
    );
    let notifications = store.subscribe();

    store.fault_object(artist).await.unwrap();

    let seen: Vec<_> = notifications.try_iter().collect();
    assert_eq!(seen.len(), 2);
    match (&seen[0], &seen[1]) {
        (
            Notification::WillFetchObject {
                operations: will,
                object: first,
            },
            Notification::DidFetchObject {
                operations: did,
                object: second,
                error: None,
            },
        ) => {
            assert_eq!((*first, *second), (artist, artist));
            assert_eq!(will, did);
            assert_eq!(will.iter().next().unwrap().path, "artists/42");
        }
        other => panic!("unexpected notifications: {other:?}"),
    }
    assert_ne!(song, artist);
}

#[tokio::test]
async fn relationship_fault_notifies_with_name_and_members() {
    let (store, transport) = store();
    let artist = fetch_artist(&store, &transport, "42").await;
    transport.respond(
        Method::Get,
        "artists/42/songs",
        RemoteResponse::ok(json!([song_record("s1", "One")])),
    );
    let notifications = store.subscribe();

    let value = store.fault_relationship(artist, "songs").await.unwrap();

    let seen: Vec<_> = notifications.try_iter().collect();
    assert_eq!(seen.len(), 2);
    match (&seen[0], &seen[1]) {
        (
            Notification::WillFetchRelationship {
                object: first,
                relationship: will_name,
                ..
            },
            Notification::DidFetchRelationship {
                object: second,
                relationship: did_name,
                fetched,
                error: None,
                ..
            },
        ) => {
            assert_eq!((*first, *second), (artist, artist));
            assert_eq!((will_name.as_str(), did_name.as_str()), ("songs", "songs"));
            assert_eq!(fetched, &value.ids());
        }
        other => panic!("unexpected notifications: {other:?}"),
    }
}

#[tokio::test]
async fn successful_save_notifies_before_and_after() {
    let (store, transport) = store();
    let artist = fetch_artist(&store, &transport, "42").await;
    transport.respond(
        Method::Put,
        "artists/42",
        RemoteResponse::ok(json!({"id": "42", "genre": "soul"})),
    );
    let notifications = store.subscribe();

    store.set_attribute(artist, "genre", "soul").unwrap();
    store.save().await.unwrap();

    let seen: Vec<_> = notifications.try_iter().collect();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].is_will());
    match (&seen[0], &seen[1]) {
        (
            Notification::WillSave {
                operations: will,
                batch: will_batch,
            },
            Notification::DidSave {
                operations: did,
                batch: did_batch,
                errors,
            },
        ) => {
            assert_eq!(will.len(), 1);
            assert_eq!(will, did);
            assert_eq!(will_batch, did_batch);
            assert_eq!(will_batch.updated(), vec![artist]);
            assert!(errors.is_empty());
        }
        other => panic!("unexpected notifications: {other:?}"),
    }
}

#[tokio::test]
async fn undecodable_elements_in_an_object_response_are_counted() {
    let (store, transport) = custom_store(false, true);
    let artist = fetch_artist(&store, &transport, "42").await;
    transport.respond(
        Method::Get,
        "artists/42",
        RemoteResponse::ok(json!([{"id": "42", "name": "Nina"}, 5])),
    );

    let node = store.fault_object(artist).await.unwrap();

    assert_eq!(node.attribute("name"), Some(&AttributeValue::from("Nina")));
    assert_eq!(store.stats().records_skipped, 1);
}

#[tokio::test]
async fn conflicting_insert_identifier_is_not_retried() {
    let (store, transport) = store();
    let existing = fetch_artist(&store, &transport, "7").await;
    let artist = store
        .insert("Artist", string_attributes(&[("name", "Copy")]))
        .unwrap();
    transport.respond(Method::Post, "artists", RemoteResponse::ok(json!({"id": "7"})));

    let report = store.save().await.unwrap();

    assert!(matches!(
        report.errors.get(&artist),
        Some(SyncError::Core(CoreError::IdentityConflict { .. }))
    ));
    assert!(store.context().pending_change(artist).is_none());
    assert!(!store.has_changes());
    assert_eq!(store.context().registry().lookup("7", "Artist"), Some(existing));
}
