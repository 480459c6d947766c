//! Round-trip coverage for primitives, strings, collections, and value
//! structures, including width coercion and field-reorder tolerance.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use coal::{deserialize, serialize, Coal, CoalStructure};

fn round_trip<T: coal::CoalType + PartialEq + std::fmt::Debug>(value: T) {
    let bytes = serialize(&value).expect("serialize");
    let decoded: T = deserialize(&bytes).expect("deserialize");
    assert_eq!(decoded, value);
}

#[test]
fn booleans() {
    round_trip(false);
    round_trip(true);
}

#[test]
fn frame_starts_with_magic_and_version() {
    let bytes = serialize(&true).expect("serialize");
    assert_eq!(&bytes[..8], &[0x43, 0x4F, 0x41, 0x4C, 0x01, 0x00, 0x00, 0x00]);
}

#[test]
fn unsigned_integers() {
    round_trip(42u8);
    round_trip(42u16);
    round_trip(42u32);
    round_trip(42u64);
    round_trip(42u128);
    round_trip(u64::MAX);
}

#[test]
fn signed_integers() {
    round_trip(-42i8);
    round_trip(-42i16);
    round_trip(-42i32);
    round_trip(-42i64);
    round_trip(-42i128);
    round_trip(i64::MIN);
}

#[test]
fn floats_and_chars() {
    round_trip(42.5f32);
    round_trip(42.5f64);
    round_trip('x');
    round_trip('\u{1F600}');
}

#[test]
fn width_coercion_narrows_and_widens() {
    let bytes = serialize(&42u16).expect("serialize u16");
    let narrow: u8 = deserialize(&bytes).expect("read as u8");
    assert_eq!(narrow, 42);
    let wide: u64 = deserialize(&bytes).expect("read as u64");
    assert_eq!(wide, 42);
    let signed: i32 = deserialize(&bytes).expect("read as i32");
    assert_eq!(signed, 42);

    let bytes = serialize(&0x1FFu16).expect("serialize");
    let truncated: u8 = deserialize(&bytes).expect("truncating read");
    assert_eq!(truncated, 0xFF);
}

#[test]
fn strings_round_trip_and_share_blob_payload() {
    let text = String::from("Hello World\r\n");
    let bytes = serialize(&text).expect("serialize");
    let payload_hits = bytes
        .windows(text.len())
        .filter(|window| *window == text.as_bytes())
        .count();
    assert_eq!(payload_hits, 1, "payload must be interned exactly once");
    round_trip(text);
    round_trip(String::new());
}

#[test]
fn identical_strings_are_stored_once() {
    let values = vec![String::from("repeated"), String::from("repeated")];
    let bytes = serialize(&values).expect("serialize");
    let hits = bytes
        .windows(8)
        .filter(|window| *window == b"repeated")
        .count();
    assert_eq!(hits, 1);
    let decoded: Vec<String> = deserialize(&bytes).expect("deserialize");
    assert_eq!(decoded, values);
}

#[test]
fn vectors() {
    round_trip(vec![1i32, 2, 3, 3, 42]);
    round_trip(vec![
        String::from("Hello"),
        String::from("World"),
        String::from("\r\n"),
    ]);
    round_trip(Vec::<u64>::new());
    round_trip(vec![vec![1u8, 2], vec![], vec![3]]);
}

#[test]
fn fixed_arrays() {
    round_trip([1u16, 2, 3, 4]);
    round_trip([String::from("a"), String::from("b")]);
}

#[test]
fn sets_ordered_and_unordered() {
    round_trip(BTreeSet::from([1i32, 2, 3, 42]));
    round_trip(HashSet::from([1i32, 2, 3, 42]));
    round_trip(BTreeSet::from([
        String::from("Hello"),
        String::from("World"),
    ]));
    round_trip(HashSet::<String>::new());
}

#[test]
fn set_container_interop() {
    let unordered = HashSet::from([1i32, 2, 3, 42]);
    let bytes = serialize(&unordered).expect("serialize");
    let ordered: BTreeSet<i32> = deserialize(&bytes).expect("deserialize");
    assert_eq!(ordered, BTreeSet::from([1, 2, 3, 42]));

    let bytes = serialize(&ordered).expect("serialize");
    let back: HashSet<i32> = deserialize(&bytes).expect("deserialize");
    assert_eq!(back, unordered);
}

#[test]
fn maps_ordered_and_unordered() {
    let entries = [
        (String::from("First"), 1i32),
        (String::from("Second"), 2),
        (String::from("Third"), 3),
    ];
    round_trip(BTreeMap::from(entries.clone()));
    round_trip(HashMap::from(entries.clone()));

    let bytes = serialize(&HashMap::from(entries.clone())).expect("serialize");
    let ordered: BTreeMap<String, i32> = deserialize(&bytes).expect("deserialize");
    assert_eq!(ordered, BTreeMap::from(entries));
}

#[test]
fn file_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("values.coal");
    let values = vec![7u32, 8, 9];
    Coal::save(&path, &values).expect("save");
    let loaded: Vec<u32> = Coal::load(&path).expect("load");
    assert_eq!(loaded, values);
}

// --- VALUE STRUCTURES ---

#[derive(Debug, Clone, Default, PartialEq, CoalStructure)]
#[coal(name = "TestStructure")]
struct TestStructure {
    #[coal(name = "booleanField")]
    boolean_field: bool,
    #[coal(name = "integerField")]
    integer_field: i32,
    #[coal(name = "floatField")]
    float_field: f32,
}

/// Same wire type as [`TestStructure`], declared in a different order and
/// with wider numeric hosts.
#[derive(Debug, Clone, Default, PartialEq, CoalStructure)]
#[coal(name = "TestStructure")]
struct TestStructureWithDifferentOrder {
    #[coal(name = "integerField")]
    integer_field: i64,
    #[coal(name = "floatField")]
    float_field: f64,
    #[coal(name = "booleanField")]
    boolean_field: bool,
}

#[derive(Debug, Clone, Default, PartialEq, CoalStructure)]
#[coal(name = "TestNestedStructure")]
struct TestNestedStructure {
    #[coal(name = "innerStruct")]
    inner_struct: TestStructure,
    #[coal(name = "integerField")]
    integer_field: i32,
}

#[derive(Debug, Clone, Default, PartialEq, CoalStructure)]
#[coal(name = "TestNestedStructure")]
struct TestNestedStructureWithDifferentOrder {
    #[coal(name = "integerField")]
    integer_field: i32,
    #[coal(name = "innerStruct")]
    inner_struct: TestStructureWithDifferentOrder,
}

#[test]
fn structures_round_trip() {
    round_trip(TestStructure::default());
    round_trip(TestStructure {
        boolean_field: true,
        integer_field: -42,
        float_field: 42.5,
    });
    round_trip(TestNestedStructure {
        inner_struct: TestStructure {
            boolean_field: true,
            integer_field: -42,
            float_field: 42.5,
        },
        integer_field: 13,
    });
}

#[test]
fn structures_tolerate_field_reorder_and_width_changes() {
    let original = TestStructure {
        boolean_field: true,
        integer_field: -42,
        float_field: 42.5,
    };
    let bytes = serialize(&original).expect("serialize");
    let reordered: TestStructureWithDifferentOrder = deserialize(&bytes).expect("deserialize");
    assert_eq!(
        reordered,
        TestStructureWithDifferentOrder {
            integer_field: -42,
            float_field: 42.5,
            boolean_field: true,
        }
    );

    // And back the other way: wider hosts re-encode, narrower hosts read.
    let bytes = serialize(&reordered).expect("serialize");
    let back: TestStructure = deserialize(&bytes).expect("deserialize");
    assert_eq!(back, original);
}

#[test]
fn nested_structures_tolerate_reorder() {
    let original = TestNestedStructure {
        inner_struct: TestStructure {
            boolean_field: true,
            integer_field: -42,
            float_field: 42.5,
        },
        integer_field: 13,
    };
    let bytes = serialize(&original).expect("serialize");
    let reordered: TestNestedStructureWithDifferentOrder =
        deserialize(&bytes).expect("deserialize");
    assert_eq!(reordered.integer_field, 13);
    assert_eq!(reordered.inner_struct.integer_field, -42);
    assert_eq!(reordered.inner_struct.float_field, 42.5);
    assert!(reordered.inner_struct.boolean_field);
}

#[test]
fn structures_inside_collections() {
    round_trip(vec![
        TestStructure {
            boolean_field: true,
            integer_field: 1,
            float_field: 1.0,
        },
        TestStructure::default(),
    ]);
    round_trip(BTreeMap::from([(
        String::from("key"),
        TestStructure {
            boolean_field: false,
            integer_field: 7,
            float_field: -0.5,
        },
    )]));
}

/// A structure whose fields the receiver does not declare keeps decoding:
/// the unknown wire field is skipped, the missing live field defaults.
#[derive(Debug, Clone, Default, PartialEq, CoalStructure)]
#[coal(name = "Versioned")]
struct VersionedV2 {
    kept: i32,
    added: String,
}

#[derive(Debug, Clone, Default, PartialEq, CoalStructure)]
#[coal(name = "Versioned")]
struct VersionedV1 {
    kept: i32,
}

#[test]
fn dropped_and_added_fields_degrade_locally() {
    let v2 = VersionedV2 {
        kept: 5,
        added: String::from("new"),
    };
    let bytes = serialize(&v2).expect("serialize");
    let v1: VersionedV1 = deserialize(&bytes).expect("old reader");
    assert_eq!(v1, VersionedV1 { kept: 5 });

    let bytes = serialize(&v1).expect("serialize");
    let upgraded: VersionedV2 = deserialize(&bytes).expect("new reader");
    assert_eq!(upgraded.kept, 5);
    assert_eq!(upgraded.added, "");
}
