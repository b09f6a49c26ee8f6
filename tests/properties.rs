//! Property tests for version ordering and step selection.

use entertainme::{SchemaVersion, StepRegistry, LATEST_VERSION};
use proptest::prelude::*;

fn version() -> impl Strategy<Value = SchemaVersion> {
    (0u32..=9_999).prop_map(SchemaVersion::from_hundredths)
}

proptest! {
    #[test]
    fn display_then_parse_is_identity(v in version()) {
        prop_assert_eq!(v.to_string().parse::<SchemaVersion>().unwrap(), v);
    }

    #[test]
    fn ordering_is_numeric(a in version(), b in version()) {
        let parsed_a: SchemaVersion = a.to_string().parse().unwrap();
        let parsed_b: SchemaVersion = b.to_string().parse().unwrap();
        prop_assert_eq!(parsed_a.cmp(&parsed_b), a.hundredths().cmp(&b.hundredths()));
    }

    #[test]
    fn short_fraction_is_padded(whole in 0u32..100, tenth in 0u32..10) {
        let v: SchemaVersion = format!("{}.{}", whole, tenth).parse().unwrap();
        prop_assert_eq!(v.hundredths(), whole * 100 + tenth * 10);
    }

    #[test]
    fn garbage_never_parses(s in "[a-z+-]{1,8}") {
        prop_assert!(s.parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn migrate_selects_exactly_the_open_closed_range(
        current in 0u32..=LATEST_VERSION.hundredths(),
        target in 0u32..=LATEST_VERSION.hundredths(),
    ) {
        let registry = StepRegistry::standard();
        let current = SchemaVersion::from_hundredths(current);
        let target = SchemaVersion::from_hundredths(target);

        let selected: Vec<_> = registry.between(current, target).map(|s| s.version).collect();
        let expected: Vec<_> = registry
            .steps()
            .iter()
            .map(|s| s.version)
            .filter(|v| current < *v && *v <= target)
            .collect();

        prop_assert_eq!(&selected, &expected);
        prop_assert!(selected.windows(2).all(|w| w[0] < w[1]));
        if target <= current {
            prop_assert!(selected.is_empty());
        }
    }

    #[test]
    fn init_selects_every_step_up_to_target(target in 0u32..=LATEST_VERSION.hundredths()) {
        let registry = StepRegistry::standard();
        let target = SchemaVersion::from_hundredths(target);

        let selected = registry.up_to(target).count();
        prop_assert_eq!(selected as u32, target.hundredths());
    }
}
