//! End-to-end engine tests: client documents, cursors and the server
//! pipeline working together through the public API.

use concord::client::Document;
use concord::core::config::DocumentConfig;
use concord::core::operation::Transaction;
use concord::protocol::ServerMessage;
use concord::schema::{
    self, array_of, boolean, number, string, struct_of, Primitive, TreeChild, TreeNodeDef, Value,
};
use concord::server::DocumentManager;
use serde_json::json;

fn title_count_schema() -> Primitive {
    struct_of(vec![
        ("title", string().default_value("")),
        ("count", number().default_value(0i64)),
    ])
}

fn workspace_schema() -> Primitive {
    let todo = struct_of(vec![
        ("label", string().default_value("")),
        ("done", boolean().default_value(false)),
    ]);
    let outline = schema::tree(
        "folder",
        vec![
            (
                "folder",
                TreeNodeDef::new(struct_of(vec![("name", string().default_value(""))]))
                    .children([TreeChild::SelfSame, TreeChild::from("file")]),
            ),
            (
                "file",
                TreeNodeDef::new(struct_of(vec![("name", string().default_value(""))])),
            ),
        ],
    )
    .unwrap();
    struct_of(vec![
        ("title", string().default_value("")),
        ("todos", array_of(todo)),
        ("outline", outline),
    ])
}

fn manager(schema: Primitive) -> DocumentManager {
    DocumentManager::new(schema, None, None, DocumentConfig::default())
}

/// Flush a client document into a transaction, panicking when empty
fn flush(doc: &mut Document) -> Transaction {
    doc.flush().unwrap().expect("expected buffered operations")
}

#[tokio::test]
async fn scenario_simple_set_and_snapshot() {
    let manager = manager(title_count_schema());
    let server = manager.document("doc-1").await;

    let mut client = Document::new(title_count_schema());
    client.root().at("title").set(json!("Hello")).unwrap();
    let version = server.submit(flush(&mut client)).await.unwrap();
    assert_eq!(version, 1);

    match server.snapshot().await {
        ServerMessage::Snapshot { state, version } => {
            assert_eq!(version, 1);
            assert_eq!(state, json!({"title": "Hello", "count": 0.0}));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn scenario_empty_transaction_rejected() {
    let manager = manager(title_count_schema());
    let server = manager.document("doc-1").await;
    let err = server.submit(Transaction::new(vec![])).await.unwrap_err();
    assert_eq!(err.reason(), "Transaction is empty");
}

#[tokio::test]
async fn scenario_duplicate_submission_is_idempotent() {
    let manager = manager(title_count_schema());
    let server = manager.document("doc-1").await;

    let mut client = Document::new(title_count_schema());
    client.root().at("count").set(json!(5)).unwrap();
    let tx = flush(&mut client);

    assert_eq!(server.submit(tx.clone()).await.unwrap(), 1);
    let err = server.submit(tx).await.unwrap_err();
    assert_eq!(err.reason(), "Transaction has already been processed");
    assert_eq!(server.version().await, 1);
}

#[tokio::test]
async fn scenario_documents_version_independently() {
    let manager = manager(title_count_schema());
    let doc_a = manager.document("doc-A").await;
    let doc_b = manager.document("doc-B").await;

    for value in ["one", "two"] {
        let mut client = Document::new(title_count_schema());
        client.root().at("title").set(json!(value)).unwrap();
        doc_a.submit(flush(&mut client)).await.unwrap();
    }
    let mut client = Document::new(title_count_schema());
    client.root().at("title").set(json!("solo")).unwrap();
    doc_b.submit(flush(&mut client)).await.unwrap();

    assert_eq!(doc_a.version().await, 2);
    assert_eq!(doc_b.version().await, 1);
}

#[tokio::test]
async fn scenario_array_insert_and_move_positions() {
    let manager = manager(workspace_schema());
    let server = manager.document("board").await;

    let mut client = Document::new(workspace_schema());
    let _a = client.root().at("todos").push(json!({"label": "a"})).unwrap();
    let _b = client.root().at("todos").push(json!({"label": "b"})).unwrap();
    let _c = client.root().at("todos").push(json!({"label": "c"})).unwrap();
    server.submit(flush(&mut client)).await.unwrap();

    let x = client
        .root()
        .at("todos")
        .insert_at(1, json!({"label": "x"}))
        .unwrap();
    server.submit(flush(&mut client)).await.unwrap();

    let labels = |doc: &Document| -> Vec<String> {
        match doc.get(&["todos".to_string()]) {
            Some(Value::Entries(entries)) => entries
                .iter()
                .map(|e| {
                    e.value
                        .as_ref()
                        .and_then(|v| v.walk(&["label".to_string()]))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                })
                .collect(),
            _ => Vec::new(),
        }
    };
    assert_eq!(labels(&client), vec!["a", "x", "b", "c"]);

    client.root().at("todos").move_to(&x, 3).unwrap();
    server.submit(flush(&mut client)).await.unwrap();
    assert_eq!(labels(&client), vec!["a", "b", "c", "x"]);

    // positions on the server agree with the client's view
    match server.snapshot().await {
        ServerMessage::Snapshot { state, version } => {
            assert_eq!(version, 3);
            let todos = state["todos"].as_array().unwrap();
            let mut positions: Vec<String> = todos
                .iter()
                .map(|e| e["pos"].as_str().unwrap().to_string())
                .collect();
            let sorted = {
                let mut s = positions.clone();
                s.sort();
                s
            };
            assert_eq!(positions, sorted);
            positions.dedup();
            assert_eq!(positions.len(), 4);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn scenario_tree_cascade_and_cycle_rejection() {
    let manager = manager(workspace_schema());
    let server = manager.document("files").await;

    let mut client = Document::new(workspace_schema());
    let folder = client
        .root()
        .at("outline")
        .insert_node(Some("root"), "folder", json!({"name": "docs"}))
        .unwrap();
    let _file = client
        .root()
        .at("outline")
        .insert_node(Some(folder.as_str()), "file", json!({"name": "a.txt"}))
        .unwrap();
    server.submit(flush(&mut client)).await.unwrap();

    // removing the folder removes the file with it
    client.root().at("outline").remove_node(&folder).unwrap();
    server.submit(flush(&mut client)).await.unwrap();
    match client.get(&["outline".to_string()]) {
        Some(Value::Nodes(nodes)) => {
            assert_eq!(nodes.len(), 1);
            assert_eq!(nodes[0].id, "root");
        }
        other => panic!("unexpected {:?}", other),
    }

    // the root cannot be moved under its own descendant
    let folder2 = client
        .root()
        .at("outline")
        .insert_node(Some("root"), "folder", json!({"name": "x"}))
        .unwrap();
    server.submit(flush(&mut client)).await.unwrap();
    assert!(client
        .root()
        .at("outline")
        .move_node("root", &folder2, 0)
        .is_err());
    assert_eq!(client.pending_len(), 0);
}

#[tokio::test]
async fn converging_subscribers_see_identical_state() {
    let manager = manager(workspace_schema());
    let server = manager.document("shared").await;
    let mut rx = server.subscribe();

    let mut alice = Document::new(workspace_schema());
    let mut bob = Document::new(workspace_schema());

    alice.root().at("title").set(json!("from alice")).unwrap();
    alice.root().at("todos").push(json!({"label": "ship it"})).unwrap();
    server.submit(flush(&mut alice)).await.unwrap();

    match rx.recv().await.unwrap() {
        ServerMessage::Transaction { transaction, version } => {
            assert_eq!(version, 1);
            bob.integrate(&transaction).unwrap();
        }
        other => panic!("unexpected {:?}", other),
    }

    assert_eq!(
        alice.state().map(Value::to_json),
        bob.state().map(Value::to_json)
    );
}

#[tokio::test]
async fn transform_drops_edits_under_a_server_side_remove() {
    let manager = manager(workspace_schema());
    let server = manager.document("shared").await;

    // seed one todo both clients know about
    let mut alice = Document::new(workspace_schema());
    let todo = alice.root().at("todos").push(json!({"label": "seed"})).unwrap();
    let seed = flush(&mut alice);
    server.submit(seed.clone()).await.unwrap();
    let mut bob = Document::new(workspace_schema());
    bob.integrate(&seed).unwrap();

    // bob buffers an edit to the todo while alice removes it on the server
    bob.root()
        .at("todos")
        .at(todo.as_str())
        .at("label")
        .set(json!("bob's edit"))
        .unwrap();
    assert_eq!(bob.pending_len(), 1);

    alice.root().at("todos").remove(&todo).unwrap();
    let removal = flush(&mut alice);
    server.submit(removal.clone()).await.unwrap();

    // integration transforms bob's buffered edit into a noop
    bob.integrate(&removal).unwrap();
    assert_eq!(bob.pending_len(), 0);
    assert!(bob.flush().unwrap().is_none());
    assert_eq!(
        bob.state().map(Value::to_json),
        alice.state().map(Value::to_json)
    );
}

#[tokio::test]
async fn rejected_transaction_leaves_server_state_untouched() {
    let manager = manager(workspace_schema());
    let server = manager.document("doc").await;

    let mut client = Document::new(workspace_schema());
    client.root().at("title").set(json!("good")).unwrap();
    server.submit(flush(&mut client)).await.unwrap();

    // hand-build a transaction that fails halfway through
    let mut bad_client = Document::new(workspace_schema());
    bad_client.root().at("title").set(json!("changed")).unwrap();
    let mut tx = flush(&mut bad_client);
    tx.ops.push(concord::core::Operation::new(
        concord::core::OpKind::NumberSet,
        concord::core::OperationPath::from_tokens(["title"]),
        json!(3),
    ));
    assert!(server.submit(tx).await.is_err());

    match server.snapshot().await {
        ServerMessage::Snapshot { state, version } => {
            assert_eq!(version, 1);
            assert_eq!(state["title"], json!("good"));
        }
        other => panic!("unexpected {:?}", other),
    }
}
