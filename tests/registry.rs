//! Link-time descriptor collection and runtime lookup.

use core::any::TypeId;

use tabula::reflect::describe;
use tabula::reflect::registry::{TypeRegistry, global};

#[derive(Default)]
struct Beacon {
    interval: u32,
    channel: u8,
}

describe! {
    Beacon {
        interval => 1,
        channel => 2,
    }
}

#[test]
fn described_types_are_collected() {
    let registry = TypeRegistry::new();
    let desc = registry
        .get(TypeId::of::<Beacon>())
        .expect("describe! should have submitted Beacon");
    assert_eq!(desc.type_name(), "Beacon");
    assert_eq!(desc.fields().len(), 2);
}

#[test]
fn lookup_by_name() {
    let registry = TypeRegistry::new();
    let desc = registry.get_with_type_name("Beacon").unwrap();
    assert_eq!(desc.ty_id(), TypeId::of::<Beacon>());
    assert!(registry.get_with_type_name("NoSuchThing").is_none());
}

#[test]
fn global_registry_serves_concurrent_readers() {
    let lock = global();
    let registry = lock.read().unwrap();
    assert!(registry.get(TypeId::of::<Beacon>()).is_some());
    let _ = Beacon::default().interval;
    let _ = Beacon::default().channel;
}
