use chrono::Utc;
use proptest::prelude::*;
use serde_json::{json, Value};
use tether_core::mutation::{Mutation, NewMutation, ResourceType};
use tether_sync::OptimisticPatcher;

fn mutation(new: NewMutation) -> Mutation {
    Mutation::from_new(new, Utc::now())
}

fn seeded() -> OptimisticPatcher {
    let mut patcher = OptimisticPatcher::new("id");
    patcher.seed(
        ResourceType::Document,
        "doc-1",
        json!({"id": "doc-1", "title": "Original", "content": "body"}),
    );
    patcher.seed(ResourceType::Issue, "iss-1", json!({"id": "iss-1", "state": "open"}));
    patcher
}

#[test]
fn create_inserts_provisional_entity_with_id() {
    let mut patcher = OptimisticPatcher::new("id");
    let create = mutation(NewMutation::create(ResourceType::Document, json!({"title": "New"})));
    patcher.apply(&create);

    let entity = patcher
        .cache()
        .get(ResourceType::Document, create.resource_id.as_str())
        .unwrap();
    assert_eq!(entity["title"], "New");
    assert_eq!(entity["id"], create.resource_id.as_str());
}

#[test]
fn update_merges_shallowly() {
    let mut patcher = seeded();
    let update = mutation(NewMutation::update(ResourceType::Document, "doc-1", json!({"title": "Edited"})));
    patcher.apply(&update);

    let entity = patcher.cache().get(ResourceType::Document, "doc-1").unwrap();
    assert_eq!(entity["title"], "Edited");
    assert_eq!(entity["content"], "body");
}

#[test]
fn delete_removes_and_rollback_restores() {
    let mut patcher = seeded();
    let before = patcher.cache().snapshot_bytes();
    let delete = mutation(NewMutation::delete(ResourceType::Document, "doc-1"));
    patcher.apply(&delete);
    assert!(!patcher.cache().contains(ResourceType::Document, "doc-1"));

    assert!(patcher.rollback(&delete.id));
    assert_eq!(patcher.cache().snapshot_bytes(), before);
}

#[test]
fn rollback_of_middle_layer_replays_later_layers() {
    let mut patcher = seeded();
    let first = mutation(NewMutation::update(ResourceType::Document, "doc-1", json!({"title": "A"})));
    let second = mutation(NewMutation::update(ResourceType::Document, "doc-1", json!({"content": "B"})));
    patcher.apply(&first);
    patcher.apply(&second);

    patcher.rollback(&first.id);
    let entity = patcher.cache().get(ResourceType::Document, "doc-1").unwrap();
    assert_eq!(entity["title"], "Original");
    assert_eq!(entity["content"], "B");

    patcher.rollback(&second.id);
    assert_eq!(
        patcher.cache().get(ResourceType::Document, "doc-1").unwrap(),
        &json!({"id": "doc-1", "title": "Original", "content": "body"})
    );
}

#[test]
fn rollback_twice_is_a_no_op() {
    let mut patcher = seeded();
    let update = mutation(NewMutation::update(ResourceType::Issue, "iss-1", json!({"state": "closed"})));
    patcher.apply(&update);
    assert!(patcher.rollback(&update.id));
    let after_first = patcher.cache().snapshot_bytes();
    assert!(!patcher.rollback(&update.id));
    assert_eq!(patcher.cache().snapshot_bytes(), after_first);
    assert!(!patcher.rollback("never-applied"));
}

#[test]
fn confirm_merges_server_entity_and_keeps_later_layers() {
    let mut patcher = seeded();
    let first = mutation(NewMutation::update(ResourceType::Document, "doc-1", json!({"title": "A"})));
    let second = mutation(NewMutation::update(ResourceType::Document, "doc-1", json!({"content": "B"})));
    patcher.apply(&first);
    patcher.apply(&second);

    let server = json!({"id": "doc-1", "title": "A", "content": "body", "version": 7});
    assert!(patcher.confirm(&first.id, Some(&server)));

    let entity = patcher.cache().get(ResourceType::Document, "doc-1").unwrap();
    assert_eq!(entity["version"], 7);
    assert_eq!(entity["content"], "B");

    // Rolling back the later layer now lands on the confirmed base.
    patcher.rollback(&second.id);
    assert_eq!(
        patcher.cache().get(ResourceType::Document, "doc-1").unwrap(),
        &server
    );
    assert_eq!(patcher.layer_count(), 0);
}

#[test]
fn rekey_moves_entity_and_rewrites_references() {
    let mut patcher = OptimisticPatcher::new("id");
    let create = mutation(NewMutation::create(ResourceType::Document, json!({"title": "Roadmap"})));
    let temp = create.resource_id.as_str().to_string();
    let issue = mutation(NewMutation::create(
        ResourceType::Issue,
        json!({"title": "Write it", "document_id": temp}),
    ));
    patcher.apply(&create);
    patcher.apply(&issue);

    patcher.rekey(ResourceType::Document, &temp, "doc-9");

    assert!(!patcher.cache().contains(ResourceType::Document, &temp));
    assert_eq!(
        patcher.cache().get(ResourceType::Document, "doc-9").unwrap()["id"],
        "doc-9"
    );
    let issue_entity = patcher
        .cache()
        .get(ResourceType::Issue, issue.resource_id.as_str())
        .unwrap();
    assert_eq!(issue_entity["document_id"], "doc-9");

    // The layer followed the entity: confirming it still works.
    assert!(patcher.confirm(&create.id, None));
    assert!(patcher.cache().contains(ResourceType::Document, "doc-9"));
}

#[test]
fn amend_folds_diff_into_create_layer() {
    let mut patcher = OptimisticPatcher::new("id");
    let create = mutation(NewMutation::create(ResourceType::Plan, json!({"title": "Q3"})));
    patcher.apply(&create);
    assert!(patcher.amend(&create.id, &json!({"title": "Q4", "owner": "ana"})));

    let entity = patcher
        .cache()
        .get(ResourceType::Plan, create.resource_id.as_str())
        .unwrap();
    assert_eq!(entity["title"], "Q4");
    assert_eq!(entity["owner"], "ana");

    patcher.rollback(&create.id);
    assert!(patcher.cache().is_empty());
}

#[test]
fn seed_goes_underneath_pending_layers() {
    let mut patcher = OptimisticPatcher::new("id");
    let update = mutation(NewMutation::update(ResourceType::Sprint, "spr-1", json!({"name": "Local"})));
    patcher.apply(&update);
    patcher.seed(ResourceType::Sprint, "spr-1", json!({"id": "spr-1", "name": "Server", "goal": "ship"}));

    let entity = patcher.cache().get(ResourceType::Sprint, "spr-1").unwrap();
    assert_eq!(entity["name"], "Local");
    assert_eq!(entity["goal"], "ship");

    patcher.rollback(&update.id);
    assert_eq!(
        patcher.cache().get(ResourceType::Sprint, "spr-1").unwrap()["name"],
        "Server"
    );
}

#[derive(Debug, Clone)]
enum Op {
    Create(String),
    Update(usize, String),
    Delete(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        "[a-z]{1,6}".prop_map(Op::Create),
        (0usize..4, "[a-z]{1,6}").prop_map(|(i, v)| Op::Update(i, v)),
        (0usize..4).prop_map(Op::Delete),
    ]
}

proptest! {
    /// Applying any sequence of mutations and rolling all of them back, in
    /// any order, restores the cache byte for byte.
    #[test]
    fn apply_then_rollback_restores_cache(
        ops in prop::collection::vec(op_strategy(), 1..12),
        reverse in any::<bool>(),
    ) {
        let mut patcher = OptimisticPatcher::new("id");
        let ids = ["d-0", "d-1", "d-2", "d-3"];
        for id in ids {
            patcher.seed(ResourceType::Document, id, json!({"id": id, "title": id}));
        }
        let before = patcher.cache().snapshot_bytes();

        let mut applied = Vec::new();
        for op in ops {
            let new = match op {
                Op::Create(title) => NewMutation::create(ResourceType::Document, json!({"title": title})),
                Op::Update(i, title) => NewMutation::update(ResourceType::Document, ids[i], json!({"title": title})),
                Op::Delete(i) => NewMutation::delete(ResourceType::Document, ids[i]),
            };
            let m = mutation(new);
            patcher.apply(&m);
            applied.push(m.id);
        }

        if reverse {
            applied.reverse();
        }
        for id in &applied {
            prop_assert!(patcher.rollback(id));
        }
        prop_assert_eq!(patcher.cache().snapshot_bytes(), before);
        prop_assert_eq!(patcher.layer_count(), 0);
    }

    #[test]
    fn single_apply_rollback_is_exact(title in "[a-zA-Z ]{0,12}", extra in any::<bool>()) {
        let mut patcher = seeded();
        let before = patcher.cache().snapshot_bytes();
        let mut diff = json!({"title": title});
        if extra {
            diff["flag"] = Value::Bool(true);
        }
        let m = mutation(NewMutation::update(ResourceType::Document, "doc-1", diff));
        patcher.apply(&m);
        patcher.rollback(&m.id);
        prop_assert_eq!(patcher.cache().snapshot_bytes(), before);
    }
}
