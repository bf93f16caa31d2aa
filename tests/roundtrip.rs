//! Property tests for value encoding and identifier normalization.

use proptest::prelude::*;
use reg_env::value::{decode, encode};
use reg_env::{
    normalize_registry_type, normalize_root_key, MemoryRegistry, RegData, RegistryRoot, RootKey,
    ValueData, ValueType,
};

fn text() -> impl Strategy<Value = String> {
    // Any text without embedded NULs, including the empty string.
    "[^\u{0}]{0,40}"
}

fn item() -> impl Strategy<Value = String> {
    "[^\u{0}]{1,20}"
}

proptest! {
    #[test]
    fn string_round_trip(s in text()) {
        let (value_type, bytes) = encode(None, &RegData::Text(s.clone())).unwrap();
        prop_assert_eq!(value_type, ValueType::String);
        prop_assert_eq!(decode(value_type.code(), &bytes), ValueData::String(s));
    }

    #[test]
    fn expand_string_round_trip(s in text()) {
        let data = RegData::Text(s.clone());
        let (value_type, bytes) = encode(Some(ValueType::ExpandString), &data).unwrap();
        let decoded = decode(value_type.code(), &bytes);
        prop_assert_eq!(decoded.to_bytes().unwrap(), bytes);
        prop_assert_eq!(decoded, ValueData::ExpandString(s));
    }

    #[test]
    fn dword_round_trip(v in any::<u32>()) {
        let (value_type, bytes) = encode(None, &RegData::from(v)).unwrap();
        prop_assert_eq!(value_type, ValueType::Dword);
        prop_assert_eq!(decode(value_type.code(), &bytes), ValueData::Dword(v));
    }

    #[test]
    fn qword_round_trip(v in any::<u64>()) {
        let (_, bytes) = encode(Some(ValueType::Qword), &RegData::from(v)).unwrap();
        prop_assert_eq!(decode(ValueType::Qword.code(), &bytes), ValueData::Qword(v));
    }

    #[test]
    fn out_of_range_integers_rejected(
        v in prop_oneof![i64::MIN..0i64, (u32::MAX as i64 + 1)..i64::MAX]
    ) {
        prop_assert!(encode(None, &RegData::from(v)).is_err());
        prop_assert!(encode(Some(ValueType::Dword), &RegData::from(v)).is_err());
    }

    #[test]
    fn binary_round_trip(b in proptest::collection::vec(any::<u8>(), 0..256)) {
        let (value_type, bytes) = encode(None, &RegData::Bytes(b.clone())).unwrap();
        prop_assert_eq!(&bytes, &b);
        prop_assert_eq!(decode(value_type.code(), &bytes), ValueData::Binary(b));
    }

    #[test]
    fn multi_string_round_trip(items in proptest::collection::vec(item(), 0..8)) {
        let (value_type, bytes) = encode(None, &RegData::TextList(items.clone())).unwrap();
        prop_assert_eq!(value_type, ValueType::MultiString);
        let decoded = decode(value_type.code(), &bytes);
        prop_assert_eq!(decoded.to_bytes().unwrap(), bytes);
        prop_assert_eq!(decoded, ValueData::MultiString(items));
    }

    #[test]
    fn decode_never_panics(code in 0u32..16, raw in proptest::collection::vec(any::<u8>(), 0..64)) {
        let _ = decode(code, &raw);
    }

    #[test]
    fn root_names_are_case_insensitive(index in 0usize..5, upper in any::<bool>()) {
        let names = ["hkcr", "hkcu", "hklm", "hku", "hkcc"];
        let name = if upper { names[index].to_uppercase() } else { names[index].to_string() };
        let root = normalize_root_key(name.as_str()).unwrap();
        prop_assert_eq!(normalize_root_key(root.handle()).unwrap(), root);
    }

    #[test]
    fn type_codes_round_trip(code in 0u32..=11) {
        let value_type = normalize_registry_type(code).unwrap();
        prop_assert_eq!(value_type.code(), code);
        prop_assert_eq!(normalize_registry_type(value_type.name()).unwrap(), value_type);
    }

    #[test]
    fn stored_values_read_back(name in "[A-Za-z0-9_]{1,12}", v in any::<u32>(), s in text()) {
        let registry = MemoryRegistry::new();
        let root = RegistryRoot::new(&registry, RootKey::CurrentUser)
            .unwrap()
            .with_prefix("Software/Prop");
        root.put_registry_value("K", &name, v, None).unwrap();
        root.put_registry_value("K", "text-value", s.clone(), None).unwrap();
        prop_assert_eq!(root.get_registry_value("K", &name).unwrap().as_u32(), Some(v));
        let stored = root.get_registry_value("K", "text-value").unwrap();
        prop_assert_eq!(stored.as_str(), Some(s.as_str()));
        prop_assert_eq!(registry.open_handles(), 0);
    }
}

#[test]
fn boundary_values() {
    for v in [0u32, u32::MAX] {
        let (_, bytes) = encode(None, &v.into()).unwrap();
        assert_eq!(decode(ValueType::Dword.code(), &bytes), ValueData::Dword(v));
    }

    let (_, bytes) = encode(None, &"".into()).unwrap();
    assert_eq!(bytes, vec![0, 0]);
    assert_eq!(decode(ValueType::String.code(), &bytes), ValueData::String(String::new()));

    let (_, bytes) = encode(None, &RegData::Bytes(vec![])).unwrap();
    assert!(bytes.is_empty());

    let (_, bytes) = encode(None, &RegData::TextList(vec![])).unwrap();
    assert_eq!(decode(ValueType::MultiString.code(), &bytes), ValueData::MultiString(vec![]));
}
