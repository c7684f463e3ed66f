//! Integration tests for resource and relationship mutations.

mod common;

use common::fixture;
use ormapi_core::catalog::{EntityMetadata, PivotDef, PropertyDef, RelationDef, SemanticType};
use ormapi_core::sql::CompiledSql;
use ormapi_core::store::{ResourceStore, SqliteStore};
use ormapi_core::{Error, ResourceService, SchemaRegistry};
use ormapi_proto::{MutationPayload, Operand, Query, Related, RelationshipData, Value};
use std::sync::Arc;

fn users_count(fx: &common::Fixture) -> u64 {
    fx.service.get_all("users", &Query::new()).unwrap().total_items
}

#[test]
fn test_cardinality_mismatch_is_shape_error() {
    let fx = fixture();
    let admin = fx.role("admin");
    let ann = fx.user("ann", &[]);

    let err = fx
        .service
        .patch_relationship("users", &ann, "roles", &RelationshipData::one("roles", &admin))
        .unwrap_err();
    let Error::Shape(issues) = err else {
        panic!("expected shape error, got {err:?}");
    };
    assert_eq!(issues[0].message, "Body data should be array");

    let err = fx
        .service
        .post_relationship("users", &ann, "manager", &RelationshipData::many("users", [ann.as_str()]))
        .unwrap_err();
    assert_eq!(err.kind(), "shape");
    assert_eq!(err.issues()[0].message, "Body data should be object");

    // Wrong type tags are reported per item.
    let mixed = RelationshipData::Many(vec![
        ormapi_proto::RefId::new("roles", admin.as_str()),
        ormapi_proto::RefId::new("users", ann.as_str()),
        ormapi_proto::RefId::new("comments", "1"),
    ]);
    let err = fx
        .service
        .post_relationship("users", &ann, "roles", &mixed)
        .unwrap_err();
    let pointers: Vec<String> = err.issues().iter().map(|i| i.pointer()).collect();
    assert_eq!(pointers, ["data.1.type", "data.2.type"]);
}

#[test]
fn test_replace_to_many() {
    let fx = fixture();
    let [a, b, c, d] = ["a", "b", "c", "d"].map(|name| fx.role(name));
    let ann = fx.user("ann", &[&a, &b, &c]);

    let replaced = fx
        .service
        .patch_relationship(
            "users",
            &ann,
            "roles",
            &RelationshipData::many("roles", [b.as_str(), d.as_str()]),
        )
        .unwrap();
    assert_eq!(replaced, RelationshipData::many("roles", [b.as_str(), d.as_str()]));

    // Add is a set union, remove a set difference that ignores strangers.
    let added = fx
        .service
        .post_relationship("users", &ann, "roles", &RelationshipData::many("roles", [a.as_str(), b.as_str()]))
        .unwrap();
    assert_eq!(added, RelationshipData::many("roles", [a.as_str(), b.as_str(), d.as_str()]));

    let removed = fx
        .service
        .delete_relationship("users", &ann, "roles", &RelationshipData::many("roles", [a.as_str(), c.as_str()]))
        .unwrap();
    assert_eq!(removed, RelationshipData::many("roles", [b.as_str(), d.as_str()]));

    let cleared = fx
        .service
        .patch_relationship("users", &ann, "roles", &RelationshipData::Many(Vec::new()))
        .unwrap();
    assert_eq!(cleared, RelationshipData::Many(Vec::new()));
}

#[test]
fn test_to_one_delete_clears_only_matching_target() {
    let fx = fixture();
    let boss = fx.user("boss", &[]);
    let other = fx.user("other", &[]);
    let worker = fx.user("worker", &[]);

    let set = fx
        .service
        .post_relationship("users", &worker, "manager", &RelationshipData::one("users", &boss))
        .unwrap();
    assert_eq!(set, RelationshipData::one("users", &boss));

    // Posting to an already set to-one leaves it alone.
    let unchanged = fx
        .service
        .post_relationship("users", &worker, "manager", &RelationshipData::one("users", &other))
        .unwrap();
    assert_eq!(unchanged, RelationshipData::one("users", &boss));

    let unchanged = fx
        .service
        .delete_relationship("users", &worker, "manager", &RelationshipData::one("users", &other))
        .unwrap();
    assert_eq!(unchanged, RelationshipData::one("users", &boss));

    let unchanged = fx
        .service
        .delete_relationship("users", &worker, "manager", &RelationshipData::null())
        .unwrap();
    assert_eq!(unchanged, RelationshipData::one("users", &boss));

    let cleared = fx
        .service
        .delete_relationship("users", &worker, "manager", &RelationshipData::one("users", &boss))
        .unwrap();
    assert_eq!(cleared, RelationshipData::null());

    // Patch sets unconditionally and null clears.
    fx.service
        .patch_relationship("users", &worker, "manager", &RelationshipData::one("users", &other))
        .unwrap();
    let cleared = fx
        .service
        .patch_relationship("users", &worker, "manager", &RelationshipData::null())
        .unwrap();
    assert_eq!(cleared, RelationshipData::null());
}

#[test]
fn test_post_then_get_round_trip() {
    let fx = fixture();
    let admin = fx.role("admin");
    let boss = fx.user("boss", &[]);
    let address = fx.address("Oslo");
    let comment = fx
        .service
        .post_one("comments", &MutationPayload::new().attribute("text", "first"))
        .unwrap()
        .id
        .to_id_string();

    let payload = MutationPayload::new()
        .attribute("login", "ann")
        .attribute("firstName", "Ann")
        .attribute("isActive", true)
        .attribute("createdAt", "2024-05-01T10:00:00Z")
        .attribute("tags", vec!["rust", "sql"])
        .relationship("roles", RelationshipData::many("roles", [admin.as_str()]))
        .relationship("manager", RelationshipData::one("users", &boss))
        .relationship("addresses", RelationshipData::one("addresses", &address))
        .relationship("comments", RelationshipData::many("comments", [comment.as_str()]));
    let created = fx.service.post_one("users", &payload).unwrap();

    assert_eq!(created.attribute("isActive"), Some(&Value::Bool(true)));
    assert_eq!(created.attribute("tags"), Some(&Value::from(vec!["rust", "sql"])));
    assert_eq!(created.attribute("lastName"), Some(&Value::Null));
    assert_eq!(
        created.relationship_data("manager"),
        Some(RelationshipData::one("users", &boss))
    );
    assert_eq!(
        created.relationship_data("comments"),
        Some(RelationshipData::many("comments", [comment.as_str()]))
    );

    let query = Query::new()
        .include("roles")
        .include("manager")
        .include("addresses")
        .include("comments");
    let fetched = fx
        .service
        .get_one("users", &created.id.to_id_string(), &query)
        .unwrap();
    assert_eq!(fetched, created);

    let Some(Related::One(Some(city))) = fetched.relationships.get("addresses") else {
        panic!("address not hydrated");
    };
    assert_eq!(city.attribute("city"), Some(&Value::from("Oslo")));
}

#[test]
fn test_existence_reports_each_missing_id() {
    let fx = fixture();
    let a = fx.role("a");
    let b = fx.role("b");
    let ann = fx.user("ann", &[]);

    let data = RelationshipData::many("roles", [a.as_str(), "999", b.as_str()]);
    let err = fx
        .service
        .post_relationship("users", &ann, "roles", &data)
        .unwrap_err();
    let Error::NotFound(issues) = &err else {
        panic!("expected not found, got {err:?}");
    };
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].pointer(), "data.1.id");

    // Nothing was linked.
    assert_eq!(
        fx.service.get_relationship("users", &ann, "roles").unwrap(),
        RelationshipData::Many(Vec::new())
    );

    // Through a create the path is rooted at the relationship.
    let payload = MutationPayload::new()
        .attribute("login", "bob")
        .relationship("roles", data);
    let err = fx.service.post_one("users", &payload).unwrap_err();
    assert_eq!(err.issues().len(), 1);
    assert_eq!(err.issues()[0].pointer(), "relationships.roles.data.1.id");
    assert_eq!(users_count(&fx), 1);
}

#[test]
fn test_post_validates_everything_before_writing() {
    let fx = fixture();
    let payload = MutationPayload::new()
        .attribute("nickname", "x")
        .attribute("isActive", "maybe")
        .relationship("friends", RelationshipData::Many(Vec::new()))
        .relationship("roles", RelationshipData::many("roles", ["1"]));
    let err = fx.service.post_one("users", &payload).unwrap_err();
    let Error::Unprocessable(issues) = &err else {
        panic!("expected unprocessable, got {err:?}");
    };
    let pointers: Vec<String> = issues.iter().map(|i| i.pointer()).collect();
    assert_eq!(
        pointers,
        [
            "attributes.isActive",
            "attributes.nickname",
            "attributes.login",
            "relationships.friends"
        ]
    );
    assert_eq!(users_count(&fx), 0);
}

#[test]
fn test_patch_one() {
    let fx = fixture();
    let admin = fx.role("admin");
    let ann = fx.user("ann", &[&admin]);

    let err = fx
        .service
        .patch_one("users", &ann, &MutationPayload::new().with_id("2"))
        .unwrap_err();
    assert!(matches!(err, Error::Unprocessable(_)));
    let err = fx
        .service
        .patch_one("users", &ann, &MutationPayload::new())
        .unwrap_err();
    assert!(matches!(err, Error::Unprocessable(_)));

    let err = fx
        .service
        .patch_one("users", "42", &MutationPayload::new().with_id("42"))
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let patched = fx
        .service
        .patch_one(
            "users",
            &ann,
            &MutationPayload::new()
                .with_id(ann.as_str())
                .attribute("lastName", "Smith")
                .relationship("roles", RelationshipData::Many(Vec::new())),
        )
        .unwrap();
    assert_eq!(patched.attribute("login"), Some(&Value::from("ann")));
    assert_eq!(patched.attribute("lastName"), Some(&Value::from("Smith")));
    assert_eq!(
        patched.relationship_data("roles"),
        Some(RelationshipData::Many(Vec::new()))
    );
}

#[test]
fn test_delete_one_removes_links() {
    let fx = fixture();
    let admin = fx.role("admin");
    let ann = fx.user("ann", &[&admin]);
    let bob = fx.user("bob", &[&admin]);

    fx.service.delete_one("users", &ann).unwrap();
    assert_eq!(
        fx.service.get_relationship("roles", &admin, "users").unwrap(),
        RelationshipData::many("users", [bob.as_str()])
    );
    assert!(matches!(
        fx.service.get_one("users", &ann, &Query::new()),
        Err(Error::NotFound(_))
    ));

    // Deleting again, or deleting garbage, is a no-op.
    fx.service.delete_one("users", &ann).unwrap();
    fx.service.delete_one("users", "garbage").unwrap();
    assert_eq!(users_count(&fx), 1);
}

#[test]
fn test_delete_one_clears_references() {
    let fx = fixture();
    let rome = fx.address("Rome");
    let ann = fx.user("ann", &[]);
    let bob = fx.user("bob", &[]);
    let note = fx.comment("note", &ann);
    fx.service
        .patch_relationship("users", &bob, "manager", &RelationshipData::one("users", &ann))
        .unwrap();
    fx.service
        .patch_relationship("users", &bob, "addresses", &RelationshipData::one("addresses", &rome))
        .unwrap();

    fx.service.delete_one("users", &ann).unwrap();
    assert_eq!(
        fx.service.get_relationship("comments", &note, "user").unwrap(),
        RelationshipData::null()
    );
    assert_eq!(
        fx.service.get_relationship("users", &bob, "manager").unwrap(),
        RelationshipData::null()
    );
    let authored = Query::new().filter("user", Operand::Ne, Value::Null);
    assert_eq!(fx.service.get_all("comments", &authored).unwrap().total_items, 0);

    fx.service.delete_one("addresses", &rome).unwrap();
    assert_eq!(
        fx.service.get_relationship("users", &bob, "addresses").unwrap(),
        RelationshipData::null()
    );
    let housed = Query::new().filter("addresses", Operand::Ne, Value::Null);
    assert_eq!(fx.service.get_all("users", &housed).unwrap().total_items, 0);
}

#[test]
fn test_delete_target_without_inverse_relation() {
    let registry = SchemaRegistry::new([
        EntityMetadata::new("members")
            .with_property(PropertyDef::new("name", SemanticType::String))
            .with_relation(RelationDef::many_to_many(
                "badges",
                "badges",
                PivotDef::new("members_badges", "member_id", "badge_id"),
            )),
        EntityMetadata::new("badges").with_property(PropertyDef::new("title", SemanticType::String)),
    ])
    .unwrap();
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.create_schema(&registry).unwrap();
    let service = ResourceService::new(Arc::new(registry), store.clone());

    let gold = service
        .post_one("badges", &MutationPayload::new().attribute("title", "gold"))
        .unwrap()
        .id
        .to_id_string();
    let member = service
        .post_one(
            "members",
            &MutationPayload::new()
                .attribute("name", "ann")
                .relationship("badges", RelationshipData::many("badges", [gold.as_str()])),
        )
        .unwrap()
        .id
        .to_id_string();

    service.delete_one("badges", &gold).unwrap();
    assert_eq!(
        service.get_relationship("members", &member, "badges").unwrap(),
        RelationshipData::Many(Vec::new())
    );
    let decorated = Query::new().filter("badges", Operand::Ne, Value::Null);
    assert_eq!(service.get_all("members", &decorated).unwrap().total_items, 0);
    assert_eq!(
        service
            .get_all("members", &decorated.include("badges"))
            .unwrap()
            .total_items,
        0
    );
    let rows = store
        .query(&CompiledSql::raw("SELECT COUNT(*) AS n FROM members_badges"))
        .unwrap();
    assert_eq!(rows[0].get("n"), &Value::Int(0));
}

#[test]
fn test_one_to_one_owner_moves_target() {
    let fx = fixture();
    let oslo = fx.address("Oslo");
    let ann = fx.user("ann", &[]);
    let bob = fx.user("bob", &[]);

    fx.service
        .patch_relationship("users", &ann, "addresses", &RelationshipData::one("addresses", &oslo))
        .unwrap();
    fx.service
        .patch_relationship("users", &bob, "addresses", &RelationshipData::one("addresses", &oslo))
        .unwrap();

    assert_eq!(
        fx.service.get_relationship("users", &ann, "addresses").unwrap(),
        RelationshipData::null()
    );
    assert_eq!(
        fx.service.get_relationship("users", &bob, "addresses").unwrap(),
        RelationshipData::one("addresses", &oslo)
    );
}

#[test]
fn test_relationship_errors() {
    let fx = fixture();
    let ann = fx.user("ann", &[]);

    let err = fx.service.get_relationship("users", &ann, "friends").unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)));

    let err = fx.service.get_relationship("users", "77", "roles").unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
