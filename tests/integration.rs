//! Integration tests over the in-memory backend.

use reg_env::{
    IntegrityLevel, MemoryRegistry, RegistryError, RegistryRoot, RootKey, ValueData, ValueType,
};

fn app(registry: &MemoryRegistry) -> RegistryRoot<&MemoryRegistry> {
    RegistryRoot::new(registry, "HKCU")
        .unwrap()
        .with_prefix("Software/ExampleApp")
}

#[test]
fn test_config_lifecycle() {
    let registry = MemoryRegistry::new();
    let root = app(&registry);

    root.put_registry_value("Config", "Name", "Widget", None).unwrap();
    let name = root.get_registry_value("Config", "Name").unwrap();
    assert_eq!(name.data(), &ValueData::String("Widget".into()));
    assert_eq!(name.value_type(), ValueType::String);
    assert_eq!(name.type_name(), "REG_SZ");

    root.put_registry_value("Config", "Count", 42u32, None).unwrap();
    let count = root.get_registry_value("Config", "Count").unwrap();
    assert_eq!(count.data(), &ValueData::Dword(42));

    root.delete_registry_value("Config", "Count").unwrap();
    let values = root.list_registry_values("Config").unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].name(), "Name");

    root.delete_registry_value("Config", "Name").unwrap();
    root.delete_registry_key("Config").unwrap();
    assert!(matches!(
        root.head_registry_key("Config"),
        Err(RegistryError::KeyNotFound { .. })
    ));
    assert_eq!(registry.open_handles(), 0, "every handle must be closed");
}

#[test]
fn test_expandable_string() {
    let registry = MemoryRegistry::new();
    registry.set_env("TEMP", r"C:\Users\x\AppData\Local\Temp");
    let root = app(&registry);

    root.put_registry_value("Config", "Path", r"%TEMP%\x.log", Some(ValueType::ExpandString))
        .unwrap();
    let value = root.get_registry_value("Config", "Path").unwrap();
    assert_eq!(value.data(), &ValueData::ExpandString(r"%TEMP%\x.log".into()));

    let expanded = value.expanded_data().expect("expandable values carry expanded data");
    assert!(!expanded.contains("%TEMP%"));
    assert_eq!(expanded, r"C:\Users\x\AppData\Local\Temp\x.log");
}

#[test]
fn test_expansion_failure_keeps_data() {
    let registry = MemoryRegistry::new();
    let root = app(&registry);
    root.put_registry_value_as("Config", "Path", r"%TEMP%\x.log", "REG_EXPAND_SZ")
        .unwrap();

    registry.fail_expansion(Some(8));
    let value = root.get_registry_value("Config", "Path").unwrap();
    assert_eq!(value.expanded_data(), Some(r"%TEMP%\x.log"));
    assert_eq!(value.as_str(), value.expanded_data());
}

#[test]
fn test_expanded_data_absent_for_other_types() {
    let registry = MemoryRegistry::new();
    let root = app(&registry);
    root.put_registry_value("", "Plain", "%TEMP%", None).unwrap();
    assert_eq!(root.get_registry_value("", "Plain").unwrap().expanded_data(), None);
}

#[test]
fn test_missing_key_and_value() {
    let registry = MemoryRegistry::new();
    let root = app(&registry);

    let err = root.get_registry_value("Nowhere", "x").unwrap_err();
    assert!(matches!(err, RegistryError::KeyNotFound { code: Some(2), .. }), "{:?}", err);

    root.put_registry_subkey("", "Config").unwrap();
    let err = root.get_registry_value("Config", "x").unwrap_err();
    match err {
        RegistryError::ValueNotFound { name, path, .. } => {
            assert_eq!(name, "x");
            assert_eq!(path, r"Software\ExampleApp\Config");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert!(matches!(root.list_registry_values("Nowhere"), Err(RegistryError::KeyNotFound { .. })));
    assert!(matches!(
        root.list_registry_subkeys("Nowhere"),
        Err(RegistryError::KeyNotFound { .. })
    ));
    assert_eq!(registry.open_handles(), 0);
}

#[test]
fn test_idempotent_deletes() {
    let registry = MemoryRegistry::new();
    let root = app(&registry);
    root.put_registry_value("Config", "Keep", 1u32, None).unwrap();
    let before = root.list_registry_values("Config").unwrap();

    for _ in 0..2 {
        root.delete_registry_value("Config", "Missing").unwrap();
        root.delete_registry_key("Config/Missing").unwrap();
        root.delete_registry_key("No/Such/Ancestor").unwrap();
    }

    assert_eq!(root.list_registry_values("Config").unwrap(), before);
    assert!(root.list_registry_subkeys("Config").unwrap().is_empty());
}

#[test]
fn test_delete_value_from_missing_key() {
    let registry = MemoryRegistry::new();
    let root = app(&registry);

    assert!(matches!(
        root.delete_registry_value("NoSuchKey", "Missing"),
        Err(RegistryError::KeyNotFound { .. })
    ));
    assert_eq!(registry.open_handles(), 0);
}

#[test]
fn test_non_empty_delete_guard() {
    let registry = MemoryRegistry::new();
    let root = app(&registry);
    root.put_registry_subkey("Parent", "Child").unwrap();

    let err = root.delete_registry_key("Parent").unwrap_err();
    assert!(matches!(err, RegistryError::KeyNotEmpty { subkeys: 1, values: 0, .. }), "{:?}", err);

    root.delete_registry_key("Parent/Child").unwrap();
    root.delete_registry_key("Parent").unwrap();
    assert!(root.list_registry_subkeys("").unwrap().is_empty());
}

#[test]
fn test_values_block_key_delete() {
    let registry = MemoryRegistry::new();
    let root = app(&registry);
    root.put_registry_value("Config", "", "default", None).unwrap();

    assert!(matches!(
        root.delete_registry_key("Config"),
        Err(RegistryError::KeyNotEmpty { subkeys: 0, values: 1, .. })
    ));
}

#[test]
fn test_create_on_write() {
    let registry = MemoryRegistry::new();
    let root = app(&registry);
    root.put_registry_value("A/B/C", "Leaf", vec![1u8, 2, 3], None).unwrap();

    for intermediate in ["", "A", "A/B"] {
        let info = root.head_registry_key(intermediate).unwrap();
        assert_eq!(info.value_count, 0, "{} should hold no values", intermediate);
        assert_eq!(info.subkey_count, 1);
    }
    let leaf = root.head_registry_key(r"A\B\C").unwrap();
    assert_eq!((leaf.subkey_count, leaf.value_count), (0, 1));
}

#[test]
fn test_write_keeps_existing_content() {
    let registry = MemoryRegistry::new();
    let root = app(&registry);
    root.put_registry_value("Config", "First", "1", None).unwrap();
    root.put_registry_subkey("Config", "Sub").unwrap();
    root.put_registry_value("Config", "Second", "2", None).unwrap();
    root.put_registry_subkey("", "Config").unwrap();

    let names: Vec<String> = root
        .list_registry_values("Config")
        .unwrap()
        .iter()
        .map(|v| v.name().to_string())
        .collect();
    assert_eq!(names, ["First", "Second"]);
    assert_eq!(root.list_registry_subkeys("Config").unwrap(), ["Sub"]);
}

#[test]
fn test_type_inference() {
    let registry = MemoryRegistry::new();
    let root = app(&registry);
    root.put_registry_value("", "Text", "hello", None).unwrap();
    root.put_registry_value("", "Number", 7u8, None).unwrap();
    root.put_registry_value("", "Blob", Vec::<u8>::new(), None).unwrap();
    root.put_registry_value("", "List", vec!["a", "b"], None).unwrap();

    let types: Vec<ValueType> = root
        .list_registry_values("")
        .unwrap()
        .iter()
        .map(|v| v.value_type())
        .collect();
    assert_eq!(
        types,
        [ValueType::String, ValueType::Dword, ValueType::Binary, ValueType::MultiString]
    );
}

#[test]
fn test_explicit_type_is_validated() {
    let registry = MemoryRegistry::new();
    let root = app(&registry);

    let err = root
        .put_registry_value("", "List", "not a list", Some(ValueType::MultiString))
        .unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));
    assert!(root.put_registry_value("", "Big", 1u64 << 32, None).is_err());
    assert_eq!(registry.call_count(), 0, "validation happens before any registry call");
}

#[test]
fn test_elevation_gate() {
    let registry = MemoryRegistry::new();
    registry.set_integrity_level(Some(IntegrityLevel::MEDIUM.rid()));

    for hive in ["HKLM", "HKU", "HKCR", "HKCC"] {
        let root = RegistryRoot::new(&registry, hive).unwrap().with_prefix("Software/ExampleApp");
        let results = [
            root.put_registry_value("Config", "Name", "Widget", None),
            root.put_registry_subkey("Config", "Sub"),
            root.delete_registry_value("Config", "Name"),
            root.delete_registry_key("Config"),
        ];
        for result in results {
            assert!(
                matches!(result, Err(RegistryError::PermissionDenied { code: None, .. })),
                "{}: {:?}",
                hive,
                result
            );
        }
    }
    assert_eq!(registry.call_count(), 0, "guard must refuse before any registry call");
}

#[test]
fn test_elevation_gate_passes_when_elevated_or_bypassed() {
    let registry = MemoryRegistry::new();
    registry.set_integrity_level(Some(IntegrityLevel::MEDIUM.rid()));
    let bypassed = RegistryRoot::new(&registry, RootKey::LocalMachine)
        .unwrap()
        .ignore_elevation_check(true);
    bypassed.put_registry_value("Software/App", "x", 1u32, None).unwrap();

    registry.set_integrity_level(Some(IntegrityLevel::HIGH.rid()));
    let elevated = RegistryRoot::new(&registry, "HKEY_LOCAL_MACHINE").unwrap();
    elevated.delete_registry_value("Software/App", "x").unwrap();
}

#[test]
fn test_reads_need_no_elevation() {
    let registry = MemoryRegistry::new();
    registry.fail_integrity_query(Some(5));
    let root = RegistryRoot::new(&registry, "HKLM").unwrap();
    assert!(root.list_registry_subkeys("").unwrap().is_empty());
}

#[test]
fn test_read_only_root() {
    let registry = MemoryRegistry::new();
    app(&registry).put_registry_value("Config", "Name", "Widget", None).unwrap();

    let root = app(&registry).read_only(true);
    assert!(matches!(
        root.put_registry_value("Config", "Name", "Other", None),
        Err(RegistryError::PermissionDenied { .. })
    ));
    assert!(root.delete_registry_key("Config").is_err());
    assert_eq!(root.get_registry_value("Config", "Name").unwrap().as_str(), Some("Widget"));
}

#[test]
fn test_os_denial_surfaces_as_permission_denied() {
    let registry = MemoryRegistry::new();
    registry.deny_access(RootKey::CurrentUser, r"Software\ExampleApp\Locked");
    let root = app(&registry);

    let err = root.put_registry_value("Locked", "x", 1u32, None).unwrap_err();
    assert!(matches!(err, RegistryError::PermissionDenied { code: Some(5), .. }), "{:?}", err);
    assert_eq!(registry.open_handles(), 0);
}

#[test]
fn test_views_are_isolated() {
    let registry = MemoryRegistry::new();
    let native = app(&registry);
    let wow64 = app(&registry).with_32bit_view(true);

    wow64.put_registry_value("Config", "Bits", 32u32, None).unwrap();
    assert!(native.get_registry_value("Config", "Bits").is_err());
    assert_eq!(wow64.get_registry_value("Config", "Bits").unwrap().as_u32(), Some(32));
}

#[test]
fn test_case_insensitive_paths_and_names() {
    let registry = MemoryRegistry::new();
    let root = app(&registry);
    root.put_registry_value("Config", "Name", "Widget", None).unwrap();
    let value = root.get_registry_value("CONFIG", "name").unwrap();
    assert_eq!(value.name(), "name");
    assert_eq!(value.as_str(), Some("Widget"));

    let listed = root.list_registry_values("config").unwrap();
    assert_eq!(listed[0].name(), "Name");
}

#[test]
fn test_head_reports_last_write() {
    let registry = MemoryRegistry::new();
    let root = app(&registry);
    let before = chrono::Utc::now() - chrono::Duration::seconds(5);
    root.put_registry_value("Config", "x", 1u32, None).unwrap();

    let info = root.head_registry_key("Config").unwrap();
    assert!(info.last_write_time >= before);
    assert!(info.has_values());
    assert!(!info.is_empty());
}
