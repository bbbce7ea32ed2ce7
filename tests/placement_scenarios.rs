//! End-to-end placement scenarios: definition text in, match decisions out

mod common;

use common::{builtins, every_country_node, node, signer, tagged_node};
use placement_core::error::ParseError;
use placement_core::{ExpressionError, PlacementId};
use placement_filter::country::{CountryCode, EEA_COUNTRIES_WITHOUT_EU, EU_COUNTRIES};
use placement_filter::registry::PlacementRegistry;
use placement_filter::rules::{Annotation, NodeAttributes, NodeFilter};

fn load(definitions: &str) -> PlacementRegistry {
    let mut registry = builtins();
    registry
        .load_definitions(definitions)
        .expect("definitions should load");
    registry
}

#[test]
fn test_lookup_is_idempotent() {
    let registry = load(r#"10:country("us");11:exclude(placement(10))"#);
    for id in registry.ids() {
        let first = registry.lookup(id).clone();
        for node in every_country_node() {
            assert_eq!(first.matches(&node), registry.lookup(id).matches(&node));
        }
    }
}

#[test]
fn test_unregistered_placement_matches_nothing() {
    let registry = load(r#"10:all()"#);
    for id in [999u16, 11, 6, u16::MAX] {
        let filter = registry.lookup(PlacementId::new(id));
        for node in every_country_node() {
            assert!(!filter.matches(&node), "placement {id} matched {:?}", node.country);
        }
        assert!(!filter.matches(&tagged_node(CountryCode::US, "tier", b"gold")));
    }
}

#[test]
fn test_single_country() {
    let registry = load(r#"10:country("us")"#);
    let filter = registry.lookup(PlacementId::new(10));
    for node in every_country_node() {
        assert_eq!(filter.matches(&node), node.country == CountryCode::US);
    }
}

#[test]
fn test_negated_country() {
    let registry = load(r#"11:country("!us")"#);
    let filter = registry.lookup(PlacementId::new(11));
    for node in every_country_node() {
        let expected = node.country != CountryCode::US && node.country != CountryCode::None;
        assert_eq!(filter.matches(&node), expected, "{:?}", node.country);
    }
}

#[test]
fn test_region_aliases() {
    let registry = load(r#"10:country("eu");11:country("eea")"#);
    let eu = registry.lookup(PlacementId::new(10));
    let eea = registry.lookup(PlacementId::new(11));

    for node in every_country_node() {
        let in_eu = EU_COUNTRIES.contains(&node.country);
        let in_eea = in_eu || EEA_COUNTRIES_WITHOUT_EU.contains(&node.country);
        assert_eq!(eu.matches(&node), in_eu, "{:?}", node.country);
        assert_eq!(eea.matches(&node), in_eea, "{:?}", node.country);
    }
}

#[test]
fn test_eu_without_germany() {
    let registry = load(r#"12:country("eu") && exclude(country("de"))"#);
    let id = PlacementId::new(12);
    assert!(registry.matches(id, &node(CountryCode::FR)));
    assert!(!registry.matches(id, &node(CountryCode::DE)));
    assert!(!registry.matches(id, &node(CountryCode::US)));
}

#[test]
fn test_conjunction_grouping_does_not_matter() {
    let registry = load(
        r#"
        20:all(country("eea"), exclude(country("de")), country("!fr"));
        21:(country("eea") && exclude(country("de"))) && country("!fr");
        22:country("eea") && (exclude(country("de")) && country("!fr"));
        23:country("!fr") && country("eea") && exclude(country("de"))
        "#,
    );
    let a = NodeFilter::country(placement_filter::CountrySet::from_tokens(&["eea"]).unwrap());
    let b = NodeFilter::country(placement_filter::CountrySet::new(&[CountryCode::DE])).exclude();
    let c = NodeFilter::country(placement_filter::CountrySet::from_tokens(&["!fr"]).unwrap());

    for node in every_country_node() {
        let expected = a.matches(&node) && b.matches(&node) && c.matches(&node);
        for id in 20..=23 {
            assert_eq!(
                registry.matches(PlacementId::new(id), &node),
                expected,
                "placement {id}, {:?}",
                node.country
            );
        }
    }
}

#[test]
fn test_exclude_is_complement_not_deny_all() {
    let registry = load(r#"10:country("us");11:exclude(placement(10));12:exclude(all())"#);
    let plain = registry.lookup(PlacementId::new(10));
    let excluded = registry.lookup(PlacementId::new(11));
    let deny = registry.lookup(PlacementId::new(12));

    for node in every_country_node() {
        assert_eq!(excluded.matches(&node), !plain.matches(&node));
        assert!(!deny.matches(&node));
    }
    assert!(excluded.matches(&node(CountryCode::DE)));
}

#[test]
fn test_tag_rules() {
    let signer = signer();
    let registry = load(&format!(
        r#"30:tag("{signer}", "tier", "gold");31:tag("{signer}", "tier", notEmpty());32:tag("{signer}", "tier", empty());33:tag("{signer}", "raw", b"\x00\xff")"#
    ));

    let gold = tagged_node(CountryCode::US, "tier", b"gold");
    let blank = tagged_node(CountryCode::US, "tier", b"");
    let raw = tagged_node(CountryCode::US, "raw", &[0x00, 0xff]);
    let untagged = node(CountryCode::US);

    let check = |id: u16, n: &NodeAttributes| registry.matches(PlacementId::new(id), n);
    assert!(check(30, &gold));
    assert!(!check(30, &blank));
    assert!(check(31, &gold));
    assert!(!check(31, &blank));
    assert!(check(32, &blank));
    assert!(!check(32, &gold));
    assert!(check(33, &raw));

    // a missing tag never matches, whatever the mode
    for id in 30..=33 {
        assert!(!check(id, &untagged));
    }
}

#[test]
fn test_describe_lists_only_user_defined() {
    let mut registry = builtins();
    assert!(registry.describe().is_empty());

    registry.load_definitions(r#"10:country("us")"#).unwrap();
    let described = registry.describe();
    assert!(described.starts_with("10:"));
    let ids: Vec<u16> = described
        .split(';')
        .map(|entry| entry.split(':').next().unwrap().parse().unwrap())
        .collect();
    assert_eq!(ids, vec![10]);
}

#[test]
fn test_non_integer_id_keeps_previous_entries() {
    let mut registry = load(r#"10:country("us")"#);
    let before = registry.clone();

    let err = registry
        .load_definitions(r#"abc:country("us")"#)
        .unwrap_err();
    assert!(matches!(err, ParseError::InvalidPlacementId { .. }));
    assert_eq!(registry, before);
    assert!(registry.matches(PlacementId::new(10), &node(CountryCode::US)));
}

#[test]
fn test_errors_name_the_entry() {
    let cases = [
        (r#"10:country("xx")"#, "xx"),
        (r#"10:country("us") && "de""#, "&&"),
        (r#"10:teleport("mars")"#, "teleport"),
        (r#"10:tag("zz", "k", "v")"#, "zz"),
        (r#"10:annotation("a", "b")"#, "annotation"),
    ];
    for (definition, needle) in cases {
        let err = builtins().load_definitions(definition).unwrap_err();
        assert_eq!(err.entry(), definition);
        assert!(
            err.to_string().contains(needle),
            "{err} should mention {needle:?}"
        );
    }
}

#[test]
fn test_forward_reference_is_fail_closed() {
    let registry = load(r#"10:placement(11) && country("us");11:all()"#);
    for node in every_country_node() {
        assert!(!registry.matches(PlacementId::new(10), &node));
    }
}

#[test]
fn test_placement_reference_out_of_range() {
    let err = builtins()
        .load_definitions("10:placement(70000)")
        .unwrap_err();
    match err {
        ParseError::Definition { source, .. } => assert_eq!(
            source,
            ExpressionError::InvalidPlacementReference { value: 70000 }
        ),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_describe_round_trip() {
    let signer = signer();
    let registry = load(&format!(
        r#"
        10:annotated(country("us"), annotation("name", "us \"only\""));
        11:country("!ru", "!by");
        12:country("eu", "none") && exclude(country("de"));
        13:tag("{signer}", "raw", b"\x01\x02") && tag("{signer}", "owner", notEmpty());
        14:exclude(all());
        15:all()
        "#
    ));

    let reloaded: PlacementRegistry = registry.describe().parse().unwrap();

    let mut nodes = every_country_node();
    nodes.push(tagged_node(CountryCode::US, "raw", &[1, 2]).with_tag(signer, "owner", "me"));
    nodes.push(tagged_node(CountryCode::US, "raw", &[1, 2]));

    for (id, filter) in registry.user_defined() {
        let again = reloaded.lookup(id);
        for node in &nodes {
            assert_eq!(filter.matches(node), again.matches(node), "placement {id}");
        }
    }
    assert_eq!(
        reloaded
            .lookup(PlacementId::new(10))
            .annotation(Annotation::NAME),
        Some("us \"only\"")
    );

    // placements built on placements, up to the deepest one that registers
    let mut chained = builtins();
    chained.load_definitions(r#"20:country("us")"#).unwrap();
    let mut last = 20;
    for id in 21..=120u16 {
        let entry = format!("{id}:exclude(placement({}))", id - 1);
        match chained.load_definitions(&entry) {
            Ok(_) => last = id,
            Err(ParseError::Definition {
                source: ExpressionError::TooDeep { .. },
                ..
            }) => break,
            Err(other) => panic!("unexpected {other:?}"),
        }
    }
    assert!(last > 80 && last < 120, "chain stopped at {last}");

    let reloaded: PlacementRegistry = chained.describe().parse().unwrap();
    for (id, filter) in chained.user_defined() {
        for node in every_country_node() {
            assert_eq!(filter.matches(&node), reloaded.matches(id, &node), "placement {id}");
        }
    }
}

#[test]
fn test_long_conjunction_loads() {
    let definition = format!("10:{}", vec!["all()"; 20_000].join(" && "));
    let registry = load(&definition);
    for node in every_country_node() {
        assert!(registry.matches(PlacementId::new(10), &node));
    }

    let mut failing = builtins();
    let err = failing
        .load_definitions(&format!("{definition} && \"us\""))
        .unwrap_err();
    assert!(matches!(
        err,
        ParseError::Definition {
            source: ExpressionError::AndOperand { .. },
            ..
        }
    ));
}

#[test]
fn test_from_str_includes_builtins() {
    let registry: PlacementRegistry = r#"10:placement(3) && placement(5)"#.parse().unwrap();
    assert!(registry.matches(PlacementId::new(10), &node(CountryCode::US)));
    assert!(!registry.matches(PlacementId::new(10), &node(CountryCode::RU)));
    assert!(registry.matches(PlacementId::EVERY_COUNTRY, &node(CountryCode::None)));
}
