//! End-to-end round trips through both codecs.

use std::collections::BTreeMap;
use std::sync::Arc;

use tabula::archive::{flat, proto};
use tabula::reflect::describe;
use tabula::reflect::own::Leaked;

// -----------------------------------------------------------------------------
// Scalars

#[derive(Default, PartialEq, Debug)]
struct Telemetry {
    enabled: bool,
    delta: i8,
    level: u8,
    offset: i16,
    port: u16,
    count: i32,
    span: u32,
    total: i64,
    stamp: u64,
    ratio: f32,
    precise: f64,
}

describe! {
    Telemetry {
        enabled => 1,
        delta => 2,
        level => 3,
        offset => 4,
        port => 5,
        count => 6,
        span => 7,
        total => 8,
        stamp => 9,
        ratio => 10,
        precise => 11,
    }
}

fn sample_telemetry() -> Telemetry {
    Telemetry {
        enabled: true,
        delta: -100,
        level: 255,
        offset: i16::MIN,
        port: u16::MAX,
        count: i32::MIN,
        span: u32::MAX,
        total: i64::MIN,
        stamp: u64::MAX,
        ratio: -1.5,
        precise: core::f64::consts::PI,
    }
}

#[test]
fn scalars_flat() {
    let value = sample_telemetry();
    let bytes = flat::to_vec(&value).unwrap();
    assert_eq!(flat::from_slice::<Telemetry>(&bytes).unwrap(), value);
}

#[test]
fn scalars_proto() {
    let value = sample_telemetry();
    let bytes = proto::to_vec(&value).unwrap();
    assert_eq!(proto::from_slice::<Telemetry>(&bytes).unwrap(), value);
}

// -----------------------------------------------------------------------------
// Containers

#[derive(Default, PartialEq, Debug)]
struct Profile {
    name: String,
    aliases: Vec<String>,
    scores: Vec<u32>,
    digest: [u8; 4],
    limits: BTreeMap<String, u64>,
}

describe! {
    Profile {
        name => 1,
        aliases => 2,
        scores => 3,
        digest => 4,
        limits => 5,
    }
}

fn sample_profile() -> Profile {
    Profile {
        name: "delegate".into(),
        aliases: vec!["one".into(), String::new(), "three".into()],
        scores: vec![0, 7, u32::MAX],
        digest: [0xDE, 0xAD, 0xBE, 0xEF],
        limits: BTreeMap::from([("disk".into(), 1 << 40), ("ram".into(), 1 << 33)]),
    }
}

#[test]
fn containers_flat() {
    let value = sample_profile();
    let bytes = flat::to_vec(&value).unwrap();
    assert_eq!(flat::from_slice::<Profile>(&bytes).unwrap(), value);
}

#[test]
fn containers_proto() {
    let value = sample_profile();
    let bytes = proto::to_vec(&value).unwrap();
    assert_eq!(proto::from_slice::<Profile>(&bytes).unwrap(), value);
}

#[test]
fn empty_containers_round_trip() {
    let value = Profile::default();
    let bytes = flat::to_vec(&value).unwrap();
    assert_eq!(flat::from_slice::<Profile>(&bytes).unwrap(), value);
    let bytes = proto::to_vec(&value).unwrap();
    assert_eq!(proto::from_slice::<Profile>(&bytes).unwrap(), value);
}

// -----------------------------------------------------------------------------
// Embedded objects

#[derive(Default, PartialEq, Debug)]
struct Endpoint {
    host: String,
    port: u16,
}

describe! {
    Endpoint {
        host => 1,
        port => 2,
    }
}

#[derive(Default, PartialEq, Debug)]
struct Route {
    from: Endpoint,
    to: Endpoint,
    weight: i32,
}

describe! {
    Route {
        from => 1,
        to => 2,
        weight => 3,
    }
}

#[test]
fn embedded_objects_round_trip() {
    let value = Route {
        from: Endpoint {
            host: "origin".into(),
            port: 80,
        },
        to: Endpoint {
            host: "target".into(),
            port: 443,
        },
        weight: -2,
    };
    let bytes = flat::to_vec(&value).unwrap();
    assert_eq!(flat::from_slice::<Route>(&bytes).unwrap(), value);
    let bytes = proto::to_vec(&value).unwrap();
    assert_eq!(proto::from_slice::<Route>(&bytes).unwrap(), value);
}

// -----------------------------------------------------------------------------
// References

#[derive(Default, PartialEq, Debug)]
struct Node {
    weight: u32,
    next: Option<Box<Node>>,
}

describe! {
    Node {
        weight => 1,
        next => 2,
    }
}

#[test]
fn owned_chain_flat() {
    let chain = Node {
        weight: 1,
        next: Some(Box::new(Node {
            weight: 2,
            next: Some(Box::new(Node {
                weight: 3,
                next: None,
            })),
        })),
    };
    let bytes = flat::to_vec(&chain).unwrap();
    assert_eq!(flat::from_slice::<Node>(&bytes).unwrap(), chain);
}

#[test]
fn owned_chain_proto() {
    let chain = Node {
        weight: 4,
        next: Some(Box::new(Node {
            weight: 5,
            next: None,
        })),
    };
    let bytes = proto::to_vec(&chain).unwrap();
    assert_eq!(proto::from_slice::<Node>(&bytes).unwrap(), chain);
}

#[derive(Default, PartialEq, Debug)]
struct Doc {
    title: String,
}

describe! {
    Doc {
        title => 1,
    }
}

#[derive(Default, PartialEq, Debug)]
struct Pair {
    left: Option<Arc<Doc>>,
    right: Option<Arc<Doc>>,
}

describe! {
    Pair {
        left => 1,
        right => 2,
    }
}

#[test]
fn shared_references_proto_are_copies() {
    let doc = Arc::new(Doc {
        title: "shared".into(),
    });
    let pair = Pair {
        left: Some(doc.clone()),
        right: Some(doc),
    };
    let bytes = proto::to_vec(&pair).unwrap();
    let back: Pair = proto::from_slice(&bytes).unwrap();
    assert_eq!(back, pair);
    // The tag/length/value format embeds a copy per occurrence.
    let (left, right) = (back.left.unwrap(), back.right.unwrap());
    assert!(!Arc::ptr_eq(&left, &right));
}

#[derive(Default, PartialEq, Debug)]
struct Slot {
    value: u32,
}

describe! {
    Slot {
        value => 1,
    }
}

#[derive(Default, PartialEq, Debug)]
struct RawHolder {
    slot: Leaked<Slot>,
}

describe! {
    RawHolder {
        slot => 1,
    }
}

#[test]
fn caller_managed_references_round_trip() {
    let mut holder = RawHolder {
        slot: Leaked::new(Box::new(Slot { value: 77 })),
    };

    let bytes = flat::to_vec(&holder).unwrap();
    let mut back: RawHolder = flat::from_slice(&bytes).unwrap();
    assert_eq!(back.slot.get().map(|s| s.value), Some(77));
    // The archive never frees caller-managed storage; reclaim it.
    let reclaimed = back.slot.reclaim().unwrap();
    assert_eq!(reclaimed.value, 77);

    let bytes = proto::to_vec(&holder).unwrap();
    let mut back: RawHolder = proto::from_slice(&bytes).unwrap();
    assert_eq!(back.slot.get().map(|s| s.value), Some(77));
    drop(back.slot.reclaim());

    drop(holder.slot.reclaim());
}
