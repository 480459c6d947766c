//! Wire-format validation: header checks, corruption handling, and the
//! structural inspector.

use coal::{deserialize, inspect, serialize, CoalError, CoalObject, Ref};

#[derive(Debug, Default, CoalObject)]
#[coal(name = "Holder")]
struct Holder {
    label: String,
    other: Ref<Holder>,
}

fn sample_frame() -> Vec<u8> {
    let first = Ref::new(Holder {
        label: String::from("first"),
        other: Ref::null(),
    });
    let second = Ref::new(Holder {
        label: String::from("second"),
        other: first.clone(),
    });
    first.borrow_mut().expect("fresh").other = second;
    serialize(&first).expect("serialize")
}

#[test]
fn bad_magic_is_rejected() {
    let mut bytes = sample_frame();
    bytes[0] = b'X';
    match deserialize::<Ref<Holder>>(&bytes) {
        Err(CoalError::BadMagic(_)) => {}
        other => panic!("expected BadMagic, got {other:?}"),
    }
}

#[test]
fn bad_version_is_rejected() {
    let mut bytes = sample_frame();
    bytes[4] = 9;
    match deserialize::<Ref<Holder>>(&bytes) {
        Err(CoalError::BadVersion { major: 9, .. }) => {}
        other => panic!("expected BadVersion, got {other:?}"),
    }
}

#[test]
fn truncated_frames_are_rejected() {
    let bytes = sample_frame();
    for cut in [0, 4, 12, bytes.len() / 2, bytes.len() - 1] {
        match deserialize::<Ref<Holder>>(&bytes[..cut]) {
            Err(_) => {}
            Ok(_) => panic!("truncation at {cut} must not decode"),
        }
    }
}

#[test]
fn instance_count_mismatch_is_rejected() {
    let mut bytes = sample_frame();
    // objectCount lives in the last header word.
    let object_count = u32::from_le_bytes(bytes[20..24].try_into().expect("header"));
    bytes[20..24].copy_from_slice(&(object_count + 1).to_le_bytes());
    match deserialize::<Ref<Holder>>(&bytes) {
        Err(CoalError::InstanceCountMismatch { .. }) => {}
        other => panic!("expected InstanceCountMismatch, got {other:?}"),
    }
}

#[test]
fn empty_input_is_truncated() {
    match deserialize::<u32>(&[]) {
        Err(CoalError::Truncated) => {}
        other => panic!("expected Truncated, got {other:?}"),
    }
}

#[test]
fn inspector_reports_the_frame_structure() {
    let bytes = sample_frame();
    let report = inspect(&bytes).expect("inspect");

    assert_eq!(report.header.cluster_count, 1);
    assert_eq!(report.header.object_count, 2);
    assert_eq!(report.frame_size, bytes.len());

    let cluster = &report.clusters[0];
    assert_eq!(cluster.name, "Holder");
    assert_eq!(cluster.instance_count, 2);
    assert_eq!(cluster.supertype_index, None);
    assert_eq!(cluster.fields.len(), 2);
    assert_eq!(cluster.fields[0].name, "label");
    assert_eq!(cluster.fields[1].name, "other");

    assert_eq!(report.root_index, Some(1));
}

#[test]
fn inspector_sees_value_types() {
    use coal::CoalStructure;

    #[derive(Debug, Clone, Default, CoalStructure)]
    #[coal(name = "Extent")]
    struct Extent {
        width: u32,
        height: u32,
    }

    #[derive(Debug, Default, CoalObject)]
    #[coal(name = "Window")]
    struct Window {
        extent: Extent,
    }

    let bytes = serialize(&Ref::new(Window {
        extent: Extent {
            width: 800,
            height: 600,
        },
    }))
    .expect("serialize");

    let report = inspect(&bytes).expect("inspect");
    assert_eq!(report.header.value_type_count, 1);
    assert_eq!(report.value_types[0].name, "Extent");
    assert_eq!(report.value_types[0].fields.len(), 2);
    assert_eq!(report.clusters[0].fields[0].encoding, "Struct(0)");
}

#[test]
fn value_frames_inspect_too() {
    let bytes = serialize(&vec![String::from("a"), String::from("b")]).expect("serialize");
    let report = inspect(&bytes).expect("inspect");
    assert_eq!(report.header.cluster_count, 1);
    assert_eq!(report.clusters[0].name, "RootValueBox");
    assert_eq!(report.clusters[0].fields[0].name, "value");
    assert_eq!(report.header.object_count, 1);
    assert_eq!(report.root_index, Some(1));
}

#[test]
fn unknown_cluster_types_null_out_instead_of_failing() {
    #[derive(Debug, Default, CoalObject)]
    #[coal(name = "OnlyInWriter")]
    struct OnlyInWriter {
        value: i32,
    }

    #[derive(Debug, Default, CoalObject)]
    #[coal(name = "Carrier")]
    struct CarrierV2 {
        tag: u8,
        payload: Ref<OnlyInWriter>,
    }

    // The reading side's Carrier has no payload field, so the registry
    // rooted at it never hears about OnlyInWriter.
    #[derive(Debug, Default, CoalObject)]
    #[coal(name = "Carrier")]
    struct CarrierV1 {
        tag: u8,
    }

    let carrier = Ref::new(CarrierV2 {
        tag: 7,
        payload: Ref::new(OnlyInWriter { value: 1 }),
    });
    let bytes = serialize(&carrier).expect("serialize");
    let decoded: Ref<CarrierV1> = deserialize(&bytes).expect("deserialize");
    assert_eq!(decoded.borrow().expect("carrier").tag, 7);
}
