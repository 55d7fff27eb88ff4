//! Identifier types for every registry in the coordinator.

use crate::define_id;

// =============================================================================
// Placement
// =============================================================================

define_id!(DeviceId, "dev");
define_id!(TaskId, "task");

// =============================================================================
// Capacity allocation
// =============================================================================

define_id!(ResourceId, "res");
define_id!(AllocationId, "alloc");

// =============================================================================
// Load balancing
// =============================================================================

define_id!(WorkerId, "wrk");

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_device_id_roundtrip() {
        let id = DeviceId::new();
        let parsed: DeviceId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(id.to_string().starts_with("dev_"));
    }

    #[test]
    fn test_wrong_prefix_rejected() {
        let task = TaskId::new().to_string();
        let err = task.parse::<DeviceId>().unwrap_err();
        assert!(err.is_prefix_error());
    }

    #[test]
    fn test_missing_separator() {
        let err = "res01HV4Z2WQXKJNM8GPQY6VBKC3D".parse::<ResourceId>().unwrap_err();
        assert_eq!(err, crate::IdError::MissingSeparator);
    }

    #[test]
    fn test_empty_and_bad_ulid() {
        assert_eq!("".parse::<WorkerId>().unwrap_err(), crate::IdError::Empty);
        assert!(matches!(
            "wrk_nope".parse::<WorkerId>().unwrap_err(),
            crate::IdError::InvalidUlid(_)
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let id = AllocationId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let parsed: AllocationId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_prefixes_unique() {
        let prefixes = [
            DeviceId::PREFIX,
            TaskId::PREFIX,
            ResourceId::PREFIX,
            AllocationId::PREFIX,
            WorkerId::PREFIX,
        ];
        let unique: std::collections::HashSet<_> = prefixes.iter().collect();
        assert_eq!(prefixes.len(), unique.len());
    }

    proptest! {
        #[test]
        fn parse_display_agree(raw in any::<u128>()) {
            let id = TaskId::from_ulid(crate::Ulid(raw));
            prop_assert_eq!(TaskId::parse(&id.to_string()), Ok(id));
        }
    }
}
