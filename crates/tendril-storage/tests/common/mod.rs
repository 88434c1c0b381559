//! Engine scenarios shared by the backend test suites

#![allow(dead_code)]

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tendril_core::{
    Cardinality, Criteria, Database, EntityKind, Error, Filter, GraphStore, HookEvent, NodeId,
    NodeInstance, NodeQuery, NodeValues, Predicate, PropertyDescriptor, Registry,
    RelationshipDescriptor, Value,
};

/// People, the countries they are from, the passport each holds, the company
/// each works at, and the vehicles they own
pub fn registry() -> Registry {
    let person = EntityKind::builder("Person")
        .property(PropertyDescriptor::string("name").unique_index().required())
        .property(PropertyDescriptor::alias("full_name", "name"))
        .property(PropertyDescriptor::integer("age").index().default(0))
        .property(PropertyDescriptor::string("email"))
        .property(PropertyDescriptor::date("born"))
        .property(PropertyDescriptor::datetime("joined"))
        .relationship(
            RelationshipDescriptor::outgoing("country", "Country", "IS_FROM")
                .cardinality(Cardinality::ZeroOrOne),
        )
        .relationship(
            RelationshipDescriptor::outgoing("passport", "Passport", "HOLDS")
                .cardinality(Cardinality::One),
        )
        .relationship(
            RelationshipDescriptor::outgoing("employer", "Company", "WORKS_AT")
                .cardinality(Cardinality::One),
        )
        .relationship(RelationshipDescriptor::either("friends", "Person", "FRIEND"))
        .relationship(
            RelationshipDescriptor::outgoing("knows", "Person", "KNOWS")
                .edge_property(PropertyDescriptor::integer("since").required()),
        )
        .relationship(RelationshipDescriptor::outgoing("owns", "Car", "OWNS").or_target("Boat"))
        .build()
        .unwrap();

    let country = EntityKind::builder("Country")
        .property(PropertyDescriptor::string("code").unique_index().required())
        .property(PropertyDescriptor::string("name"))
        .relationship(RelationshipDescriptor::incoming("inhabitant", "Person", "IS_FROM"))
        .build()
        .unwrap();

    let passport = EntityKind::builder("Passport")
        .property(PropertyDescriptor::string("number").unique_index().required())
        .relationship(
            RelationshipDescriptor::incoming("holder", "Person", "HOLDS")
                .cardinality(Cardinality::One),
        )
        .build()
        .unwrap();

    let company = EntityKind::builder("Company")
        .property(PropertyDescriptor::string("name").unique_index().required())
        .relationship(RelationshipDescriptor::incoming("staff", "Person", "WORKS_AT"))
        .build()
        .unwrap();

    let car = EntityKind::builder("Car")
        .property(PropertyDescriptor::string("plate").unique_index())
        .property(PropertyDescriptor::string("colour"))
        .build()
        .unwrap();

    let boat = EntityKind::builder("Boat")
        .property(PropertyDescriptor::string("name").index())
        .build()
        .unwrap();

    Registry::from_kinds([person, country, passport, company, car, boat]).unwrap()
}

pub async fn open(store: Arc<dyn GraphStore>) -> Database {
    Database::open(store, registry()).await.unwrap()
}

pub fn values(pairs: &[(&str, Value)]) -> NodeValues {
    pairs
        .iter()
        .map(|(field, value)| (field.to_string(), value.clone()))
        .collect()
}

pub async fn save(db: &Database, label: &str, pairs: &[(&str, Value)]) -> NodeInstance {
    let mut instance = db.instance(label).unwrap();
    for (field, value) in pairs {
        instance.set(field, value.clone()).unwrap();
    }
    db.save(&mut instance).await.unwrap();
    instance
}

pub async fn person(db: &Database, name: &str, age: i64) -> NodeInstance {
    save(db, "Person", &[("name", name.into()), ("age", age.into())]).await
}

fn ids(instances: &[NodeInstance]) -> BTreeSet<NodeId> {
    instances.iter().filter_map(|i| i.id().cloned()).collect()
}

fn names(instances: &[NodeInstance]) -> BTreeSet<String> {
    instances
        .iter()
        .filter_map(|i| i.get("name").ok().and_then(|v| v.as_str().map(str::to_string)))
        .collect()
}

async fn category_count(db: &Database, label: &str) -> usize {
    db.category(label).await.unwrap().count().await.unwrap()
}

// ─────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────

pub async fn person_country_round_trip(db: &Database) {
    let mut jim = db
        .instance("Person")
        .unwrap()
        .with("name", "Jim")
        .unwrap()
        .with("age", 3)
        .unwrap();
    assert!(!jim.is_saved());
    db.save(&mut jim).await.unwrap();
    let id = jim.id().cloned().unwrap();

    jim.set("age", 4).unwrap();
    db.save(&mut jim).await.unwrap();
    assert_eq!(jim.id(), Some(&id));

    jim.set("age", 99).unwrap();
    db.refresh(&mut jim).await.unwrap();
    assert_eq!(jim.get("age").unwrap(), &Value::Integer(4));
    assert!(jim.dirty_fields().is_empty());

    let germany = save(db, "Country", &[("code", "DE".into())]).await;
    db.relationship(&jim, "country")
        .unwrap()
        .connect(&germany, NodeValues::new())
        .await
        .unwrap();

    let inhabitants = db
        .relationship(&germany, "inhabitant")
        .unwrap()
        .all()
        .await
        .unwrap();
    assert_eq!(inhabitants.len(), 1);
    assert_eq!(inhabitants[0].id(), Some(&id));
    assert_eq!(inhabitants[0].get("name").unwrap(), &Value::from("Jim"));
    assert_eq!(inhabitants[0].get("age").unwrap(), &Value::Integer(4));
}

pub async fn save_twice_keeps_identity(db: &Database) {
    let mut bob = person(db, "Bob", 30).await;
    let id = bob.id().cloned().unwrap();
    db.save(&mut bob).await.unwrap();
    bob.set("email", "bob@example.com").unwrap();
    db.save(&mut bob).await.unwrap();

    assert_eq!(bob.id(), Some(&id));
    assert_eq!(category_count(db, "Person").await, 1);

    let loaded = db.get_by_id("Person", &id).await.unwrap();
    assert_eq!(loaded.get("email").unwrap(), &Value::from("bob@example.com"));
    assert_eq!(loaded.get("age").unwrap(), &Value::Integer(30));
}

pub async fn defaults_and_temporal_values_survive_the_store(db: &Database) {
    let joined = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap() + Duration::microseconds(678);
    let born = NaiveDate::from_ymd_opt(1990, 5, 17).unwrap();
    let ann = save(
        db,
        "Person",
        &[("name", "Ann".into()), ("born", born.into()), ("joined", joined.into())],
    )
    .await;
    assert_eq!(ann.get("age").unwrap(), &Value::Integer(0));

    let loaded = db.get_by_id("Person", ann.id().unwrap()).await.unwrap();
    assert_eq!(loaded.get("joined").unwrap(), &Value::DateTime(joined));
    assert_eq!(loaded.get("born").unwrap(), &Value::Date(born));
    assert_eq!(loaded.get("age").unwrap(), &Value::Integer(0));
    assert!(loaded.get("email").unwrap().is_null());
}

pub async fn invalid_values_are_rejected_before_writing(db: &Database) {
    let mut nameless = db.instance("Person").unwrap().with("age", 5).unwrap();
    let err = db.save(&mut nameless).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{}", err);
    assert!(!nameless.is_saved());

    let mut aged = db
        .instance("Person")
        .unwrap()
        .with("name", "Old")
        .unwrap()
        .with("age", "old")
        .unwrap();
    let err = db.save(&mut aged).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{}", err);
    assert!(!aged.is_saved());

    let err = db.instance("Person").unwrap().with("height", 180).unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{}", err);

    assert_eq!(category_count(db, "Person").await, 0);
}

pub async fn unique_collision_leaves_no_node(db: &Database) {
    person(db, "Jim", 3).await;

    let mut duplicate = db.instance("Person").unwrap().with("name", "Jim").unwrap();
    let err = db.save(&mut duplicate).await.unwrap_err();
    assert!(matches!(err, Error::UniqueConstraintViolation { .. }), "{}", err);
    assert!(!duplicate.is_saved());

    let mut bob = person(db, "Bob", 40).await;
    bob.set("name", "Jim").unwrap();
    let err = db.save(&mut bob).await.unwrap_err();
    assert!(matches!(err, Error::UniqueConstraintViolation { .. }), "{}", err);
    db.refresh(&mut bob).await.unwrap();
    assert_eq!(bob.get("name").unwrap(), &Value::from("Bob"));

    let jims = db
        .index("Person")
        .unwrap()
        .search(&Criteria::new().eq("name", "Jim"))
        .await
        .unwrap();
    assert_eq!(jims.len(), 1);
    assert_eq!(category_count(db, "Person").await, 2);
}

pub async fn delete_removes_node_edges_and_category_membership(db: &Database) {
    let mut jim = person(db, "Jim", 3).await;
    let bob = person(db, "Bob", 40).await;
    db.relationship(&jim, "friends")
        .unwrap()
        .connect(&bob, NodeValues::new())
        .await
        .unwrap();
    let id = jim.id().cloned().unwrap();
    assert_eq!(category_count(db, "Person").await, 2);

    db.delete(&mut jim).await.unwrap();
    assert!(jim.is_deleted());
    assert!(!jim.is_saved());
    assert_eq!(category_count(db, "Person").await, 1);
    assert_eq!(
        db.relationship(&bob, "friends").unwrap().count().await.unwrap(),
        0
    );

    let err = db.save(&mut jim).await.unwrap_err();
    assert!(matches!(err, Error::InstanceDeleted(_)), "{}", err);
    let err = db.get_by_id("Person", &id).await.unwrap_err();
    assert!(matches!(err, Error::InstanceNotFound(_)), "{}", err);

    let mut unsaved = db.instance("Person").unwrap().with("name", "Ghost").unwrap();
    let err = db.delete(&mut unsaved).await.unwrap_err();
    assert!(matches!(err, Error::InstanceNotSaved(_)), "{}", err);
}

pub async fn get_by_id_checks_the_label(db: &Database) {
    let jim = person(db, "Jim", 3).await;
    let id = jim.id().unwrap();
    assert_eq!(db.get_by_id("Person", id).await.unwrap().id(), Some(id));

    let err = db.get_by_id("Country", id).await.unwrap_err();
    assert!(matches!(err, Error::InstanceNotFound(_)), "{}", err);
    let err = db.get_by_id("Person", &NodeId::new()).await.unwrap_err();
    assert!(matches!(err, Error::InstanceNotFound(_)), "{}", err);
}

// ─────────────────────────────────────────────────────────────
// Batches
// ─────────────────────────────────────────────────────────────

pub async fn batch_create_is_all_or_nothing(db: &Database) {
    let rows = vec![
        values(&[("name", "A".into()), ("age", 1.into())]),
        values(&[("name", "B".into()), ("age", "old".into())]),
        values(&[("name", "C".into())]),
    ];
    let err = db.batch_create("Person", rows).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{}", err);
    assert!(err.to_string().contains("row 1"), "{}", err);
    assert_eq!(category_count(db, "Person").await, 0);

    let rows = vec![
        values(&[("name", "X".into())]),
        values(&[("name", "Y".into())]),
        values(&[("name", "X".into())]),
    ];
    let err = db.batch_create("Person", rows).await.unwrap_err();
    assert!(matches!(err, Error::UniqueConstraintViolation { .. }), "{}", err);
    assert!(db
        .index("Person")
        .unwrap()
        .get_or_none(&Criteria::new().eq("name", "Y"))
        .await
        .unwrap()
        .is_none());

    let rows = vec![
        values(&[("name", "A".into()), ("age", 1.into())]),
        values(&[("name", "B".into())]),
        values(&[("name", "C".into()), ("email", "c@example.com".into())]),
    ];
    let created = db.batch_create("Person", rows).await.unwrap();
    assert_eq!(created.len(), 3);
    assert!(created.iter().all(|p| p.is_saved()));
    assert_eq!(created[1].get("age").unwrap(), &Value::Integer(0));
    assert_eq!(category_count(db, "Person").await, 3);

    let listed = db.category("Person").await.unwrap().instances().await.unwrap();
    assert_eq!(ids(&listed), ids(&created));
}

pub async fn oversized_batch_is_rejected(db: &Database) {
    let rows: Vec<NodeValues> = (0..1001)
        .map(|i| values(&[("name", format!("p{}", i).into())]))
        .collect();
    let err = db.batch_create("Person", rows).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{}", err);
    assert_eq!(category_count(db, "Person").await, 0);

    assert!(db
        .batch_create("Person", Vec::new())
        .await
        .unwrap()
        .is_empty());
}

// ─────────────────────────────────────────────────────────────
// Relationships
// ─────────────────────────────────────────────────────────────

pub async fn connect_then_disconnect_restores_the_count(db: &Database) {
    let jim = person(db, "Jim", 3).await;
    let bob = person(db, "Bob", 40).await;
    let friends = db.relationship(&jim, "friends").unwrap();
    let before = friends.count().await.unwrap();

    friends.connect(&bob, NodeValues::new()).await.unwrap();
    assert!(friends.is_connected(&bob).await.unwrap());
    assert!(db
        .relationship(&bob, "friends")
        .unwrap()
        .is_connected(&jim)
        .await
        .unwrap());
    assert_eq!(friends.count().await.unwrap(), before + 1);

    friends.disconnect(&bob).await.unwrap();
    assert!(!friends.is_connected(&bob).await.unwrap());
    assert_eq!(friends.count().await.unwrap(), before);

    friends.disconnect(&bob).await.unwrap();
    assert_eq!(friends.count().await.unwrap(), before);
}

pub async fn one_to_one_rejects_a_second_edge(db: &Database) {
    let jim = person(db, "Jim", 3).await;
    let bob = person(db, "Bob", 40).await;
    let p1 = save(db, "Passport", &[("number", "P1".into())]).await;
    let p2 = save(db, "Passport", &[("number", "P2".into())]).await;

    let jims = db.relationship(&jim, "passport").unwrap();
    jims.connect(&p1, NodeValues::new()).await.unwrap();

    let err = jims.connect(&p2, NodeValues::new()).await.unwrap_err();
    assert!(matches!(err, Error::AttemptedCardinalityViolation { .. }), "{}", err);

    let err = db
        .relationship(&bob, "passport")
        .unwrap()
        .connect(&p1, NodeValues::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AttemptedCardinalityViolation { .. }), "{}", err);

    assert_eq!(jims.count().await.unwrap(), 1);
    assert_eq!(db.relationship(&p1, "holder").unwrap().count().await.unwrap(), 1);
    assert_eq!(db.relationship(&p2, "holder").unwrap().count().await.unwrap(), 0);
    let held = jims.single().await.unwrap().unwrap();
    assert_eq!(held.id(), p1.id());

    let err = jims.disconnect(&p1).await.unwrap_err();
    assert!(matches!(err, Error::AttemptedCardinalityViolation { .. }), "{}", err);
    assert!(jims.is_connected(&p1).await.unwrap());
}

pub async fn reconnect_moves_a_required_edge(db: &Database) {
    let jim = person(db, "Jim", 3).await;
    let acme = save(db, "Company", &[("name", "Acme".into())]).await;
    let globex = save(db, "Company", &[("name", "Globex".into())]).await;

    let employer = db.relationship(&jim, "employer").unwrap();
    employer.connect(&acme, NodeValues::new()).await.unwrap();

    let err = employer.disconnect(&acme).await.unwrap_err();
    assert!(matches!(err, Error::AttemptedCardinalityViolation { .. }), "{}", err);
    let err = employer.disconnect_all().await.unwrap_err();
    assert!(matches!(err, Error::AttemptedCardinalityViolation { .. }), "{}", err);

    let edge = employer.reconnect(&acme, &globex).await.unwrap();
    assert_eq!(Some(&edge.to_id), globex.id());
    assert_eq!(employer.count().await.unwrap(), 1);
    assert_eq!(employer.single().await.unwrap().unwrap().id(), globex.id());
    assert_eq!(db.relationship(&acme, "staff").unwrap().count().await.unwrap(), 0);
    assert_eq!(db.relationship(&globex, "staff").unwrap().count().await.unwrap(), 1);

    let err = employer.reconnect(&acme, &globex).await.unwrap_err();
    assert!(matches!(err, Error::InstanceNotFound(_)), "{}", err);
}

pub async fn reconnect_respects_the_old_targets_floor(db: &Database) {
    let jim = person(db, "Jim", 3).await;
    let p1 = save(db, "Passport", &[("number", "P1".into())]).await;
    let p2 = save(db, "Passport", &[("number", "P2".into())]).await;

    let passport = db.relationship(&jim, "passport").unwrap();
    passport.connect(&p1, NodeValues::new()).await.unwrap();

    // p1 would be left without its one holder
    let err = passport.reconnect(&p1, &p2).await.unwrap_err();
    assert!(matches!(err, Error::AttemptedCardinalityViolation { .. }), "{}", err);
    assert!(passport.is_connected(&p1).await.unwrap());
    assert!(!passport.is_connected(&p2).await.unwrap());
}

pub async fn disconnect_all_clears_optional_relationships(db: &Database) {
    let jim = person(db, "Jim", 3).await;
    let friends = db.relationship(&jim, "friends").unwrap();
    for name in ["Ann", "Bob", "Cat"] {
        let other = person(db, name, 20).await;
        friends.connect(&other, NodeValues::new()).await.unwrap();
    }
    assert_eq!(friends.count().await.unwrap(), 3);
    assert_eq!(friends.disconnect_all().await.unwrap(), 3);
    assert_eq!(friends.count().await.unwrap(), 0);
    assert!(friends.all().await.unwrap().is_empty());
}

pub async fn zero_or_one_caps_and_reconnects(db: &Database) {
    let jim = person(db, "Jim", 3).await;
    let de = save(db, "Country", &[("code", "DE".into())]).await;
    let fr = save(db, "Country", &[("code", "FR".into())]).await;

    let country = db.relationship(&jim, "country").unwrap();
    assert!(country.single().await.unwrap().is_none());
    country.connect(&de, NodeValues::new()).await.unwrap();
    let err = country.connect(&fr, NodeValues::new()).await.unwrap_err();
    assert!(matches!(err, Error::AttemptedCardinalityViolation { .. }), "{}", err);

    country.reconnect(&de, &fr).await.unwrap();
    assert_eq!(country.single().await.unwrap().unwrap().id(), fr.id());

    country.disconnect(&fr).await.unwrap();
    assert!(country.single().await.unwrap().is_none());
}

pub async fn existing_corruption_is_reported_not_hidden(db: &Database) {
    let jim = person(db, "Jim", 3).await;
    let employer = db.relationship(&jim, "employer").unwrap();

    // A saved Person with no employer breaks `One` but still reads
    assert!(employer.all().await.unwrap().is_empty());
    let err = employer.validate_existing().await.unwrap_err();
    assert!(matches!(err, Error::CardinalityViolation { .. }), "{}", err);
    let err = employer.single().await.unwrap_err();
    assert!(matches!(err, Error::CardinalityViolation { .. }), "{}", err);

    db.relationship(&jim, "friends")
        .unwrap()
        .validate_existing()
        .await
        .unwrap();
}

pub async fn polymorphic_targets_inflate_to_their_own_kind(db: &Database) {
    let jim = person(db, "Jim", 3).await;
    let car = save(db, "Car", &[("plate", "AB-123".into()), ("colour", "red".into())]).await;
    let boat = save(db, "Boat", &[("name", "Nautilus".into())]).await;
    let de = save(db, "Country", &[("code", "DE".into())]).await;

    let owns = db.relationship(&jim, "owns").unwrap();
    owns.connect(&car, NodeValues::new()).await.unwrap();
    owns.connect(&boat, NodeValues::new()).await.unwrap();

    let owned = owns.all().await.unwrap();
    let labels: BTreeSet<&str> = owned.iter().map(|i| i.label()).collect();
    assert_eq!(labels, BTreeSet::from(["Boat", "Car"]));
    let nautilus = owned.iter().find(|i| i.label() == "Boat").unwrap();
    assert_eq!(nautilus.get("name").unwrap(), &Value::from("Nautilus"));

    let red = owns
        .search(&Criteria::new().eq("colour", "red"))
        .await
        .unwrap();
    assert_eq!(ids(&red), ids(&[car.clone()]));
    let err = owns
        .search(&Criteria::new().eq("wingspan", 30))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{}", err);

    let err = owns.connect(&de, NodeValues::new()).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{}", err);
    assert_eq!(owns.count().await.unwrap(), 2);
}

pub async fn edge_properties_are_validated_and_returned(db: &Database) {
    let jim = person(db, "Jim", 3).await;
    let bob = person(db, "Bob", 40).await;
    let ann = person(db, "Ann", 25).await;

    let knows = db.relationship(&jim, "knows").unwrap();
    let edge = knows
        .connect(&bob, values(&[("since", 2019.into())]))
        .await
        .unwrap();
    assert_eq!(edge.properties.get("since"), Some(&Value::Integer(2019)));

    let stored = knows.relationship(&bob).await.unwrap().unwrap();
    assert_eq!(stored.id, edge.id);
    assert_eq!(stored.properties.get("since"), Some(&Value::Integer(2019)));
    assert!(knows.relationship(&ann).await.unwrap().is_none());

    let err = knows.connect(&ann, NodeValues::new()).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{}", err);
    let err = knows
        .connect(&ann, values(&[("since", 2020.into()), ("colour", "red".into())]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{}", err);
    assert_eq!(knows.count().await.unwrap(), 1);

    // Outgoing only: Bob does not know Jim back
    assert!(!db
        .relationship(&bob, "knows")
        .unwrap()
        .is_connected(&jim)
        .await
        .unwrap());
}

pub async fn unsaved_endpoints_are_rejected(db: &Database) {
    let jim = person(db, "Jim", 3).await;
    let ghost = db.instance("Person").unwrap().with("name", "Ghost").unwrap();

    let err = db
        .relationship(&jim, "friends")
        .unwrap()
        .connect(&ghost, NodeValues::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InstanceNotSaved(_)), "{}", err);

    let err = db
        .relationship(&ghost, "friends")
        .unwrap()
        .all()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InstanceNotSaved(_)), "{}", err);

    let err = db.relationship(&jim, "enemies").err().unwrap();
    assert!(matches!(err, Error::Validation { .. }), "{}", err);
}

// ─────────────────────────────────────────────────────────────
// Indexes and categories
// ─────────────────────────────────────────────────────────────

async fn three_people(db: &Database) -> (NodeInstance, NodeInstance, NodeInstance) {
    let jim = save(
        db,
        "Person",
        &[("name", "Jim".into()), ("age", 3.into()), ("email", "jim@example.com".into())],
    )
    .await;
    let bob = save(
        db,
        "Person",
        &[("name", "Bob".into()), ("age", 40.into()), ("email", "bob@work.org".into())],
    )
    .await;
    let ann = person(db, "Ann", 25).await;
    (jim, bob, ann)
}

pub async fn alias_search_matches_target_search(db: &Database) {
    let (jim, _, _) = three_people(db).await;
    let index = db.index("Person").unwrap();

    let by_alias = index
        .search(&Criteria::new().eq("full_name", "Jim"))
        .await
        .unwrap();
    let by_target = index.search(&Criteria::new().eq("name", "Jim")).await.unwrap();
    assert_eq!(ids(&by_alias), ids(&by_target));
    assert_eq!(ids(&by_alias), ids(&[jim.clone()]));

    let loaded = index.get(&Criteria::new().eq("full_name", "Jim")).await.unwrap();
    assert_eq!(loaded.get("full_name").unwrap(), &Value::from("Jim"));
}

pub async fn lookups_filter_indexed_and_plain_fields(db: &Database) {
    let (jim, bob, ann) = three_people(db).await;
    let index = db.index("Person").unwrap();

    let adults = index.search(&Criteria::new().gt("age", 18)).await.unwrap();
    assert_eq!(ids(&adults), ids(&[bob.clone(), ann.clone()]));

    let example = index
        .search(&Criteria::new().lookup("email__endswith", "example.com"))
        .await
        .unwrap();
    assert_eq!(ids(&example), ids(&[jim.clone()]));

    let no_email = index
        .search(&Criteria::new().lookup("email__isnull", true))
        .await
        .unwrap();
    assert_eq!(ids(&no_email), ids(&[ann.clone()]));

    let listed = index
        .search(&Criteria::new().lookup("name__in", "Jim,Ann"))
        .await
        .unwrap();
    assert_eq!(names(&listed), BTreeSet::from(["Ann".to_string(), "Jim".to_string()]));

    let worker = index
        .search(&Criteria::new().gte("age", 25).contains("email", "work"))
        .await
        .unwrap();
    assert_eq!(ids(&worker), ids(&[bob.clone()]));

    let starts_a = index
        .search(&Criteria::new().expression(Filter::new(
            "full_name",
            Predicate::StartsWith("A".to_string()),
        )))
        .await
        .unwrap();
    assert_eq!(ids(&starts_a), ids(&[ann.clone()]));

    let not_jim = index.search(&Criteria::new().ne("name", "Jim")).await.unwrap();
    assert_eq!(not_jim.len(), 2);

    let everyone = index.search(&Criteria::new()).await.unwrap();
    assert_eq!(everyone.len(), 3);

    let err = index
        .search(&Criteria::new().eq("height", 180))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{}", err);
}

pub async fn get_requires_exactly_one_match(db: &Database) {
    three_people(db).await;
    let index = db.index("Person").unwrap();

    let jim = index.get(&Criteria::new().eq("name", "Jim")).await.unwrap();
    assert_eq!(jim.get("age").unwrap(), &Value::Integer(3));

    let err = index
        .get(&Criteria::new().eq("name", "Nobody"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InstanceNotFound(_)), "{}", err);

    let err = index.get(&Criteria::new().gt("age", 1)).await.unwrap_err();
    assert!(matches!(err, Error::MultipleResultsFound(_)), "{}", err);

    assert!(index
        .get_or_none(&Criteria::new().eq("name", "Nobody"))
        .await
        .unwrap()
        .is_none());
    let err = index
        .get_or_none(&Criteria::new().gt("age", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MultipleResultsFound(_)), "{}", err);
}

pub async fn category_lists_every_saved_instance(db: &Database) {
    let (jim, bob, ann) = three_people(db).await;
    save(db, "Country", &[("code", "DE".into())]).await;

    let people = db.category("Person").await.unwrap();
    let listed = people.instances().await.unwrap();
    assert_eq!(ids(&listed), ids(&[jim, bob, ann]));
    assert_eq!(people.count().await.unwrap(), 3);
    assert_eq!(category_count(db, "Country").await, 1);
    assert_eq!(category_count(db, "Boat").await, 0);

    // The category node is created once per kind
    let again = db.category("Person").await.unwrap();
    assert_eq!(again.id(), people.id());
}

// ─────────────────────────────────────────────────────────────
// Hooks
// ─────────────────────────────────────────────────────────────

pub async fn hooks_run_around_lifecycle_events(db: &Database) {
    let created = Arc::new(AtomicUsize::new(0));
    let deleted = Arc::new(AtomicUsize::new(0));

    db.on(HookEvent::PreSave, Some("Person"), |person| {
        if person.get("email")?.is_null() {
            person.set("email", "unknown@example.com")?;
        }
        Ok(())
    });
    let counter = created.clone();
    db.on(HookEvent::PostCreate, None, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let counter = deleted.clone();
    db.on(HookEvent::PostDelete, Some("Person"), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    db.on(HookEvent::PreDelete, Some("Country"), |_| {
        Err(Error::validation("Country", "countries are permanent"))
    });

    let mut jim = person(db, "Jim", 3).await;
    assert_eq!(jim.get("email").unwrap(), &Value::from("unknown@example.com"));
    let stored = db.get_by_id("Person", jim.id().unwrap()).await.unwrap();
    assert_eq!(stored.get("email").unwrap(), &Value::from("unknown@example.com"));

    db.save(&mut jim).await.unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 1);

    let mut de = save(db, "Country", &[("code", "DE".into())]).await;
    assert_eq!(created.load(Ordering::SeqCst), 2);
    let err = db.delete(&mut de).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{}", err);
    assert!(db.get_by_id("Country", de.id().unwrap()).await.is_ok());

    db.delete(&mut jim).await.unwrap();
    assert_eq!(deleted.load(Ordering::SeqCst), 1);
}

pub async fn pre_save_hook_failure_aborts_the_write(db: &Database) {
    db.on(HookEvent::PreSave, Some("Car"), |car| {
        if car.get("colour")? == &Value::from("pink") {
            return Err(Error::validation("Car.colour", "no pink cars"));
        }
        Ok(())
    });

    let mut pink = db.instance("Car").unwrap().with("colour", "pink").unwrap();
    let err = db.save(&mut pink).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{}", err);
    assert!(!pink.is_saved());
    assert_eq!(category_count(db, "Car").await, 0);
}

async fn stored_count(db: &Database, label: &str) -> usize {
    db.store()
        .count(&NodeQuery::new().with_label(label))
        .await
        .unwrap()
}

/// A failing post hook cannot undo a committed create, and the node is in
/// its category from the moment it exists
pub async fn post_create_hook_failure_keeps_category_membership(db: &Database) {
    let failing = Arc::new(AtomicBool::new(true));
    let flag = failing.clone();
    db.on(HookEvent::PostCreate, Some("Car"), move |_| {
        if flag.load(Ordering::SeqCst) {
            return Err(Error::Internal("hook".to_string()));
        }
        Ok(())
    });

    let mut car = db.instance("Car").unwrap().with("plate", "AB-123").unwrap();
    db.save(&mut car).await.unwrap();
    assert!(car.is_saved());
    assert_eq!(stored_count(db, "Car").await, 1);
    assert_eq!(category_count(db, "Car").await, 1);

    failing.store(false, Ordering::SeqCst);
    car.set("colour", "red").unwrap();
    db.save(&mut car).await.unwrap();
    assert_eq!(stored_count(db, "Car").await, 1);
    assert_eq!(category_count(db, "Car").await, 1);
    let listed = db.category("Car").await.unwrap().instances().await.unwrap();
    assert_eq!(listed[0].get("colour").unwrap(), &Value::from("red"));
}

pub async fn post_save_hook_failure_keeps_the_update(db: &Database) {
    db.on(HookEvent::PostSave, Some("Car"), |car| {
        if car.get("colour")? == &Value::from("blue") {
            return Err(Error::Internal("hook".to_string()));
        }
        Ok(())
    });

    let mut car = save(db, "Car", &[("plate", "CD-456".into())]).await;
    car.set("colour", "blue").unwrap();
    db.save(&mut car).await.unwrap();
    let loaded = db.get_by_id("Car", car.id().unwrap()).await.unwrap();
    assert_eq!(loaded.get("colour").unwrap(), &Value::from("blue"));
}

/// Once the batch commits every row is returned and every row's hooks run
pub async fn batch_post_hook_failure_returns_every_row(db: &Database) {
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    db.on(HookEvent::PostSave, Some("Boat"), move |boat| {
        counter.fetch_add(1, Ordering::SeqCst);
        if boat.get("name")? == &Value::from("B") {
            return Err(Error::Internal("hook".to_string()));
        }
        Ok(())
    });

    let rows = ["A", "B", "C"]
        .iter()
        .map(|name| values(&[("name", (*name).into())]))
        .collect::<Vec<_>>();
    let created = db.batch_create("Boat", rows).await.unwrap();
    assert_eq!(created.len(), 3);
    assert!(created.iter().all(NodeInstance::is_saved));
    assert_eq!(ran.load(Ordering::SeqCst), 3);
    assert_eq!(stored_count(db, "Boat").await, 3);
    assert_eq!(category_count(db, "Boat").await, 3);
}

pub async fn post_delete_hook_failure_still_deletes(db: &Database) {
    db.on(HookEvent::PostDelete, Some("Car"), |_| {
        Err(Error::Internal("hook".to_string()))
    });

    let mut car = save(db, "Car", &[("plate", "EF-789".into())]).await;
    let id = car.id().cloned().unwrap();
    db.delete(&mut car).await.unwrap();
    assert!(car.is_deleted());
    assert!(matches!(
        db.get_by_id("Car", &id).await,
        Err(Error::InstanceNotFound(_))
    ));
    assert_eq!(category_count(db, "Car").await, 0);
}

// ─────────────────────────────────────────────────────────────
// Concurrency
// ─────────────────────────────────────────────────────────────

/// Racing writers on a `One` target: exactly one edge lands
pub async fn concurrent_connects_respect_the_cap(db: Arc<Database>) {
    let passport = save(&db, "Passport", &[("number", "P1".into())]).await;
    let mut people = Vec::new();
    for i in 0..8 {
        people.push(person(&db, &format!("p{}", i), i).await);
    }

    let mut tasks = Vec::new();
    for p in people {
        let db = db.clone();
        let passport = passport.clone();
        tasks.push(tokio::spawn(async move {
            db.relationship(&p, "passport")
                .unwrap()
                .connect(&passport, NodeValues::new())
                .await
                .is_ok()
        }));
    }

    let mut succeeded = 0;
    for task in tasks {
        if task.await.unwrap() {
            succeeded += 1;
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(
        db.relationship(&passport, "holder")
            .unwrap()
            .count()
            .await
            .unwrap(),
        1
    );
}
