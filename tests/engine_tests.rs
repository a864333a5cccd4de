//! End-to-end engine tests against a fixture SQLite database.
//!
//! Covers the documented request scenarios: single objects, scalar
//! associations, field arrays feeding IN-lists, array size propagation,
//! nested containers, join directives, and the null-row policy for
//! unresolvable associations.

use rusqlite::Connection;
use serde_json::{json, Value as Json};
use tempfile::TempDir;
use treeql::{CancelToken, Engine, EngineError, SqliteBackend};

fn fixture_db() -> (TempDir, SqliteBackend) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("fixture.db");

    let conn = Connection::open(&path).expect("open db");
    conn.execute_batch(
        "CREATE TABLE User (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
         CREATE TABLE Moment (id INTEGER PRIMARY KEY, userId INTEGER NOT NULL, content TEXT NOT NULL);
         CREATE TABLE Comment (id INTEGER PRIMARY KEY, userId INTEGER NOT NULL, momentId INTEGER NOT NULL, content TEXT NOT NULL);

         INSERT INTO User (id, name) VALUES (1, 'alice');
         INSERT INTO User (id, name) VALUES (2, 'bob');
         INSERT INTO User (id, name) VALUES (3, 'alice');

         INSERT INTO Moment (id, userId, content) VALUES (11, 2, 'm-one');
         INSERT INTO Moment (id, userId, content) VALUES (12, 3, 'm-two');
         INSERT INTO Moment (id, userId, content) VALUES (13, 1, 'm-three');

         INSERT INTO Comment (id, userId, momentId, content) VALUES (101, 1, 11, 'c-1');
         INSERT INTO Comment (id, userId, momentId, content) VALUES (102, 2, 11, 'c-2');
         INSERT INTO Comment (id, userId, momentId, content) VALUES (103, 1, 12, 'c-3');
         INSERT INTO Comment (id, userId, momentId, content) VALUES (104, 3, 12, 'c-4');
         INSERT INTO Comment (id, userId, momentId, content) VALUES (105, 2, 13, 'c-5');
         INSERT INTO Comment (id, userId, momentId, content) VALUES (106, 3, 13, 'c-6');",
    )
    .expect("seed fixture");
    drop(conn);

    let backend = SqliteBackend::open(&path).expect("open backend");
    (dir, backend)
}

fn run(backend: &SqliteBackend, request: Json) -> Json {
    let engine = Engine::new(backend);
    let body = serde_json::to_string(&request).expect("serialize request");
    let response = engine.execute_str(&body).expect("execute request");
    serde_json::from_str(&response).expect("parse response")
}

fn keys(value: &Json) -> Vec<&str> {
    value
        .as_object()
        .expect("object")
        .keys()
        .map(String::as_str)
        .collect()
}

#[test]
fn single_object_query() {
    let (_dir, backend) = fixture_db();
    let response = run(&backend, json!({"User": {"id>": 0}}));

    assert_eq!(keys(&response), vec!["User"]);
    assert_eq!(response["User"]["id"], json!(1));
    assert_eq!(response["User"]["name"], json!("alice"));
}

#[test]
fn scalar_association_binds_previous_row() {
    let (_dir, backend) = fixture_db();
    let response = run(
        &backend,
        json!({"Moment": {"id>": 0}, "User": {"id@": "Moment/userId"}}),
    );

    assert_eq!(keys(&response), vec!["Moment", "User"]);
    assert_eq!(response["Moment"]["id"], json!(11));
    // Moment 11 belongs to user 2; the User query consumed that value.
    assert_eq!(response["User"]["id"], json!(2));
    assert_eq!(response["User"]["name"], json!("bob"));
}

#[test]
fn field_array_feeds_in_list() {
    let (_dir, backend) = fixture_db();
    let response = run(
        &backend,
        json!({
            "User-id[]": {"User": {"id<=": 2, "@order": "id-"}},
            "[]": {"Comment": {"id<": 1000, "userId{}@": "User-id[]"}}
        }),
    );

    assert_eq!(keys(&response), vec!["User-id[]", "[]"]);
    assert_eq!(response["User-id[]"], json!([2, 1]));

    let comments = response["[]"].as_array().expect("comment rows");
    assert_eq!(comments.len(), 4);
    for entry in comments {
        let user_id = entry["Comment"]["userId"].as_i64().expect("userId");
        assert!(user_id == 1 || user_id == 2);
    }
}

#[test]
fn field_array_deduplicates_in_first_seen_order() {
    let (_dir, backend) = fixture_db();
    let response = run(&backend, json!({"User-name[]": {"User": {"id>": 0}}}));

    // Users 1 and 3 are both 'alice'; the projection keeps the first.
    assert_eq!(response["User-name[]"], json!(["alice", "bob"]));
}

#[test]
fn array_size_propagates_to_later_siblings() {
    let (_dir, backend) = fixture_db();
    let response = run(
        &backend,
        json!({"[]": {"Moment": {"id>": 0}, "User": {"id@": "[]/Moment/userId"}}}),
    );

    let rows = response["[]"].as_array().expect("rows");
    assert_eq!(rows.len(), 3);
    for row in rows {
        assert_eq!(keys(row), vec!["Moment", "User"]);
        // Each slot's User was fetched with that slot's Moment row.
        assert_eq!(row["User"]["id"], row["Moment"]["userId"]);
    }
}

#[test]
fn nested_containers_align_row_slots() {
    let (_dir, backend) = fixture_db();
    let response = run(
        &backend,
        json!({
            "[]": {
                "Moment": {"id>": 0},
                "[]": {"Comment": {"momentId@": "/[]/Moment/id"}}
            }
        }),
    );

    let moments = response["[]"].as_array().expect("moment rows");
    assert_eq!(moments.len(), 3);
    for entry in moments {
        let moment_id = entry["Moment"]["id"].as_i64().expect("moment id");
        let comments = entry["[]"].as_array().expect("nested rows");
        assert_eq!(comments.len(), 2);
        for comment in comments {
            assert_eq!(comment["Comment"]["momentId"], json!(moment_id));
        }
    }
}

#[test]
fn count_directive_caps_container_rows() {
    let (_dir, backend) = fixture_db();
    let response = run(
        &backend,
        json!({"[]": {"count": 2, "Comment": {"id>": 0}}}),
    );

    assert_eq!(response["[]"].as_array().expect("rows").len(), 2);
}

#[test]
fn container_order_follows_first_child_order() {
    let (_dir, backend) = fixture_db();
    let response = run(
        &backend,
        json!({"[]": {"Moment": {"id>": 0, "@order": "id-"}}}),
    );

    let ids: Vec<i64> = response["[]"]
        .as_array()
        .expect("rows")
        .iter()
        .map(|row| row["Moment"]["id"].as_i64().expect("id"))
        .collect();
    assert_eq!(ids, vec![13, 12, 11]);
}

#[test]
fn join_directive_runs_and_preserves_shape() {
    let (_dir, backend) = fixture_db();
    let response = run(
        &backend,
        json!({"[]": {"join": "</User/id", "Moment": {}, "User": {"id": 1}}}),
    );

    let rows = response["[]"].as_array().expect("rows");
    assert_eq!(rows.len(), 3);
    for row in rows {
        assert_eq!(keys(row), vec!["Moment", "User"]);
        assert_eq!(row["User"]["id"], json!(1));
    }
}

#[test]
fn invalid_join_operator_aborts() {
    let (_dir, backend) = fixture_db();
    let engine = Engine::new(&backend);
    let err = engine
        .execute_str(r#"{"[]": {"join": "?/User/id", "Moment": {}, "User": {"id": 1}}}"#)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidJoin { .. }));
}

#[test]
fn join_subject_missing_from_container_aborts() {
    let (_dir, backend) = fixture_db();
    let engine = Engine::new(&backend);
    let err = engine
        .execute_str(r#"{"[]": {"join": "</Tag/id", "Moment": {}}}"#)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidJoin { .. }));
}

#[test]
fn unresolvable_association_yields_null_and_spares_neighbors() {
    let (_dir, backend) = fixture_db();
    let response = run(
        &backend,
        json!({
            "Moment": {"id": 11},
            "User": {"id@": "Moment/noSuchColumn"},
            "Comment": {"id": 101}
        }),
    );

    assert_eq!(keys(&response), vec!["Moment", "User", "Comment"]);
    assert_eq!(response["Moment"]["id"], json!(11));
    assert_eq!(response["User"], Json::Null);
    assert_eq!(response["Comment"]["id"], json!(101));
}

#[test]
fn association_to_unknown_node_yields_null() {
    let (_dir, backend) = fixture_db();
    let response = run(
        &backend,
        json!({"Moment": {"id": 11}, "User": {"id@": "Nowhere/id"}}),
    );
    assert_eq!(response["User"], Json::Null);
}

#[test]
fn association_with_non_string_value_aborts() {
    let (_dir, backend) = fixture_db();
    let engine = Engine::new(&backend);
    let err = engine
        .execute_str(r#"{"User": {"id@": 5}}"#)
        .unwrap_err();
    assert!(matches!(err, EngineError::AssociationNotString { .. }));
}

#[test]
fn non_object_request_is_rejected() {
    let (_dir, backend) = fixture_db();
    let engine = Engine::new(&backend);
    let err = engine.execute_str("[1, 2, 3]").unwrap_err();
    assert!(matches!(err, EngineError::NotAnObject));
}

#[test]
fn column_directive_limits_selected_columns() {
    let (_dir, backend) = fixture_db();
    let response = run(&backend, json!({"User": {"@column": "id", "id": 2}}));
    assert_eq!(keys(&response["User"]), vec!["id"]);
    assert_eq!(response["User"]["id"], json!(2));
}

#[test]
fn top_level_key_order_is_preserved() {
    let (_dir, backend) = fixture_db();
    let response = run(
        &backend,
        json!({
            "Comment": {"id": 101},
            "User": {"id": 1},
            "Moment": {"id": 11}
        }),
    );
    assert_eq!(keys(&response), vec!["Comment", "User", "Moment"]);
}

#[test]
fn missing_row_encodes_as_null() {
    let (_dir, backend) = fixture_db();
    let response = run(&backend, json!({"User": {"id": 999}}));
    assert_eq!(response["User"], Json::Null);
}

#[test]
fn canceled_request_aborts_before_querying() {
    let (_dir, backend) = fixture_db();
    let token = CancelToken::new();
    token.cancel();
    let engine = Engine::new(&backend).with_cancel(token);
    let err = engine.execute_str(r#"{"User": {"id>": 0}}"#).unwrap_err();
    assert!(matches!(err, EngineError::Canceled));
}

#[test]
fn or_group_filters_through_sqlite() {
    let (_dir, backend) = fixture_db();
    let response = run(
        &backend,
        json!({"[]": {"Comment": {"id{}": ">104,<=102"}}}),
    );

    let ids: Vec<i64> = response["[]"]
        .as_array()
        .expect("rows")
        .iter()
        .map(|row| row["Comment"]["id"].as_i64().expect("id"))
        .collect();
    assert_eq!(ids, vec![101, 102, 105, 106]);
}
