//! Tests for task identity and key derivation.

use chrono::Utc;
use firmsched::task::{JobKind, LifecycleTarget, Machine, MachineType, ObjectRef, Task};

#[test]
fn test_key_is_deterministic() {
    let a = ObjectRef::new("fleet", "rack-12-node-3");
    let b = ObjectRef::new("fleet", "rack-12-node-3");
    assert_eq!(a.key(), b.key());
}

#[test]
fn test_key_differs_across_names_and_namespaces() {
    let base = ObjectRef::new("fleet", "node-a");
    assert_ne!(base.key(), ObjectRef::new("fleet", "node-b").key());
    assert_ne!(base.key(), ObjectRef::new("lab", "node-a").key());
}

#[test]
fn test_key_separator_prevents_collisions() {
    // "ab"/"c" and "a"/"bc" must not derive the same key.
    let a = ObjectRef::new("ab", "c");
    let b = ObjectRef::new("a", "bc");
    assert_ne!(a.key(), b.key());
}

#[test]
fn test_task_key_comes_from_target() {
    let machine = Machine::new("fleet", "node-a");
    let expected = machine.object_ref().key();

    let scan = Task::new(JobKind::Scan, machine.clone());
    let install = Task::new(JobKind::Install, machine);

    assert_eq!(scan.key(), expected);
    // One scheduler instance runs per job kind, so scan and install for the
    // same object sharing a key is by construction.
    assert_eq!(install.key(), expected);
    assert_eq!(scan.kind(), JobKind::Scan);
    assert_eq!(install.kind(), JobKind::Install);
}

#[test]
fn test_machine_and_machine_type_expose_capability() {
    let mut machine = Machine::new("fleet", "node-a");
    assert!(machine.last_scan_time().is_none());
    machine.last_scan_time = Some(Utc::now());
    assert!(machine.last_scan_time().is_some());

    let machine_type = MachineType::new("fleet", "dell-r750");
    assert_eq!(machine_type.object_ref().to_string(), "fleet/dell-r750");
}

#[test]
fn test_job_kind_serialization() {
    assert_eq!(JobKind::Scan.as_str(), "scan");
    assert_eq!(JobKind::Install.as_str(), "install");
    assert_eq!(serde_json::to_string(&JobKind::Scan).unwrap(), "\"scan\"");
    assert_eq!(
        serde_json::from_str::<JobKind>("\"install\"").unwrap(),
        JobKind::Install
    );
}
