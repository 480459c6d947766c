//! Object-graph coverage: identity, sharing, cycles, inheritance, and
//! schema evolution across classes.

use std::collections::{HashMap, HashSet};

use coal::{deserialize, serialize, CoalObject, CoalStructure, Ref};

#[derive(Debug, Default, CoalObject)]
#[coal(name = "TestSharedObject")]
struct TestSharedObject {
    #[coal(name = "booleanField")]
    boolean_field: bool,
    #[coal(name = "integerField")]
    integer_field: i32,
    #[coal(name = "floatField")]
    float_field: f32,
}

#[derive(Debug, Default, CoalObject)]
#[coal(name = "TestSharedObjectOuter")]
struct TestSharedObjectOuter {
    #[coal(name = "innerObject")]
    inner_object: Ref<TestSharedObject>,
}

#[derive(Debug, Default, CoalObject)]
#[coal(name = "TestSharedCyclicObject")]
struct TestSharedCyclicObject {
    #[coal(name = "potentiallyCyclicReference")]
    reference: Ref<TestSharedCyclicObject>,
    #[coal(name = "potentiallyCyclicReference2")]
    reference2: Ref<TestSharedCyclicObject>,
}

fn make_object(value: i32) -> Ref<TestSharedObject> {
    Ref::new(TestSharedObject {
        boolean_field: false,
        integer_field: value,
        float_field: value as f32,
    })
}

#[test]
fn empty_object_round_trips() {
    let object = Ref::new(TestSharedObject::default());
    let bytes = serialize(&object).expect("serialize");
    let decoded: Ref<TestSharedObject> = deserialize(&bytes).expect("deserialize");
    let state = decoded.borrow().expect("non-null");
    assert!(!state.boolean_field);
    assert_eq!(state.integer_field, 0);
}

#[test]
fn populated_object_round_trips() {
    let object = Ref::new(TestSharedObject {
        boolean_field: true,
        integer_field: -42,
        float_field: 42.5,
    });
    let bytes = serialize(&object).expect("serialize");
    let decoded: Ref<TestSharedObject> = deserialize(&bytes).expect("deserialize");
    let state = decoded.borrow().expect("non-null");
    assert!(state.boolean_field);
    assert_eq!(state.integer_field, -42);
    assert_eq!(state.float_field, 42.5);
}

#[test]
fn null_root_round_trips_as_null() {
    let bytes = serialize(&Ref::<TestSharedObject>::null()).expect("serialize");
    let decoded: Ref<TestSharedObject> = deserialize(&bytes).expect("deserialize");
    assert!(decoded.is_null());
}

#[test]
fn nested_object_round_trips() {
    let outer = Ref::new(TestSharedObjectOuter {
        inner_object: make_object(7),
    });
    let bytes = serialize(&outer).expect("serialize");
    let decoded: Ref<TestSharedObjectOuter> = deserialize(&bytes).expect("deserialize");
    let inner = decoded.borrow().expect("outer").inner_object.clone();
    assert_eq!(inner.borrow().expect("inner").integer_field, 7);
}

#[test]
fn null_fields_stay_null() {
    let outer = Ref::new(TestSharedObjectOuter::default());
    let bytes = serialize(&outer).expect("serialize");
    let decoded: Ref<TestSharedObjectOuter> = deserialize(&bytes).expect("deserialize");
    assert!(decoded.borrow().expect("outer").inner_object.is_null());
}

#[test]
fn self_cycle_is_preserved() {
    let object = Ref::new(TestSharedCyclicObject::default());
    object.borrow_mut().expect("fresh").reference = object.clone();

    let bytes = serialize(&object).expect("serialize");
    let decoded: Ref<TestSharedCyclicObject> = deserialize(&bytes).expect("deserialize");
    let state = decoded.borrow().expect("non-null");
    assert!(state.reference.same(&decoded));
    assert!(state.reference2.is_null());
}

#[test]
fn indirect_cycle_is_preserved() {
    let first = Ref::new(TestSharedCyclicObject::default());
    let second = Ref::new(TestSharedCyclicObject::default());
    first.borrow_mut().expect("first").reference = second.clone();
    {
        let mut state = second.borrow_mut().expect("second");
        state.reference = first.clone();
        state.reference2 = second.clone();
    }

    let bytes = serialize(&first).expect("serialize");
    let decoded_first: Ref<TestSharedCyclicObject> = deserialize(&bytes).expect("deserialize");
    let decoded_second = decoded_first.borrow().expect("first").reference.clone();
    assert!(!decoded_second.is_null());
    let second_state = decoded_second.borrow().expect("second");
    assert!(second_state.reference.same(&decoded_first));
    assert!(second_state.reference2.same(&decoded_second));
}

// --- COLLECTIONS OF SHARED OBJECTS ---

#[derive(Debug, Default, CoalObject)]
#[coal(name = "TestSharedObjectWithCollections")]
struct TestSharedObjectWithCollections {
    list: Vec<Ref<TestSharedObject>>,
    set: HashSet<Ref<TestSharedObject>>,
    map: HashMap<String, Ref<TestSharedObject>>,
}

#[test]
fn empty_collections_round_trip() {
    let root = Ref::new(TestSharedObjectWithCollections::default());
    let bytes = serialize(&root).expect("serialize");
    let decoded: Ref<TestSharedObjectWithCollections> = deserialize(&bytes).expect("deserialize");
    let state = decoded.borrow().expect("root");
    assert!(state.list.is_empty());
    assert!(state.set.is_empty());
    assert!(state.map.is_empty());
}

#[test]
fn shared_targets_keep_identity_across_containers() {
    let first = make_object(1);
    let second = make_object(2);
    let third = make_object(3);

    let root = Ref::new(TestSharedObjectWithCollections {
        list: vec![first.clone(), second.clone(), second.clone(), third.clone()],
        set: HashSet::from([first.clone(), second.clone(), third.clone()]),
        map: HashMap::from([
            (String::from("First"), first),
            (String::from("Second"), second),
            (String::from("Third"), third),
        ]),
    });

    let bytes = serialize(&root).expect("serialize");
    let decoded: Ref<TestSharedObjectWithCollections> = deserialize(&bytes).expect("deserialize");
    let state = decoded.borrow().expect("root");

    assert_eq!(state.list.len(), 4);
    assert!(state.list[1].same(&state.list[2]));
    assert_eq!(state.set.len(), 3);
    assert_eq!(state.map.len(), 3);

    let first = &state.list[0];
    let second = &state.list[1];
    let third = &state.list[3];
    assert_eq!(first.borrow().expect("first").integer_field, 1);
    assert_eq!(second.borrow().expect("second").integer_field, 2);
    assert_eq!(third.borrow().expect("third").integer_field, 3);

    assert!(state.map[&String::from("First")].same(first));
    assert!(state.map[&String::from("Second")].same(second));
    assert!(state.map[&String::from("Third")].same(third));
    assert!(state.set.contains(first));
    assert!(state.set.contains(second));
    assert!(state.set.contains(third));
}

#[test]
fn two_fields_one_target_decode_to_one_object() {
    #[derive(Debug, Default, CoalObject)]
    #[coal(name = "Pair")]
    struct Pair {
        left: Ref<TestSharedObject>,
        right: Ref<TestSharedObject>,
    }

    let shared = make_object(9);
    let pair = Ref::new(Pair {
        left: shared.clone(),
        right: shared,
    });
    let bytes = serialize(&pair).expect("serialize");
    let decoded: Ref<Pair> = deserialize(&bytes).expect("deserialize");
    let state = decoded.borrow().expect("pair");
    assert!(state.left.same(&state.right));
}

// --- INHERITANCE ---

#[derive(Debug, Default, CoalObject)]
#[coal(name = "Shape")]
struct Shape {
    x: i32,
    y: i32,
}

#[derive(Debug, Default, CoalObject)]
#[coal(name = "Circle")]
struct Circle {
    #[coal(extends)]
    base: Shape,
    radius: f64,
}

#[test]
fn subclass_state_round_trips_parent_first() {
    let circle = Ref::new(Circle {
        base: Shape { x: 3, y: -4 },
        radius: 2.5,
    });
    let bytes = serialize(&circle).expect("serialize");

    let report = coal::inspect(&bytes).expect("inspect");
    let shape_index = report
        .clusters
        .iter()
        .position(|c| c.name == "Shape")
        .expect("parent cluster");
    let circle_index = report
        .clusters
        .iter()
        .position(|c| c.name == "Circle")
        .expect("child cluster");
    assert!(shape_index < circle_index, "parent must precede child");
    assert_eq!(
        report.clusters[circle_index].supertype_index,
        Some(shape_index as u32 + 1)
    );

    let decoded: Ref<Circle> = deserialize(&bytes).expect("deserialize");
    let state = decoded.borrow().expect("circle");
    assert_eq!(state.base.x, 3);
    assert_eq!(state.base.y, -4);
    assert_eq!(state.radius, 2.5);
}

#[test]
fn references_to_parent_and_child_coexist() {
    #[derive(Debug, Default, CoalObject)]
    #[coal(name = "Canvas")]
    struct Canvas {
        circle: Ref<Circle>,
        origin: Ref<Shape>,
    }

    let canvas = Ref::new(Canvas {
        circle: Ref::new(Circle {
            base: Shape { x: 1, y: 2 },
            radius: 1.0,
        }),
        origin: Ref::new(Shape { x: 0, y: 0 }),
    });
    let bytes = serialize(&canvas).expect("serialize");
    let decoded: Ref<Canvas> = deserialize(&bytes).expect("deserialize");
    let state = decoded.borrow().expect("canvas");
    assert_eq!(state.circle.borrow().expect("circle").base.y, 2);
    assert_eq!(state.origin.borrow().expect("origin").x, 0);
}

// --- CLASS-LEVEL SCHEMA EVOLUTION ---

#[derive(Debug, Clone, Default, PartialEq, CoalStructure)]
#[coal(name = "Point")]
struct Point {
    x: i32,
    y: i32,
}

#[derive(Debug, Default, CoalObject)]
#[coal(name = "Sprite")]
struct SpriteV2 {
    name: String,
    position: Point,
    layer: u8,
}

#[derive(Debug, Default, CoalObject)]
#[coal(name = "Sprite")]
struct SpriteV1 {
    name: String,
    position: Point,
}

#[test]
fn object_fields_evolve_like_structure_fields() {
    let sprite = Ref::new(SpriteV2 {
        name: String::from("player"),
        position: Point { x: 10, y: 20 },
        layer: 3,
    });
    let bytes = serialize(&sprite).expect("serialize");

    let old_reader: Ref<SpriteV1> = deserialize(&bytes).expect("old reader");
    let state = old_reader.borrow().expect("sprite");
    assert_eq!(state.name, "player");
    assert_eq!(state.position, Point { x: 10, y: 20 });

    let bytes = serialize(&old_reader).expect("serialize v1");
    let new_reader: Ref<SpriteV2> = deserialize(&bytes).expect("new reader");
    let state = new_reader.borrow().expect("sprite");
    assert_eq!(state.name, "player");
    assert_eq!(state.layer, 0, "missing wire field keeps the default");
}
