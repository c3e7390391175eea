use mphf_core::{BuildConfig, Builder, FilterBuilder, FilterOptions, FilterWidth, Lookup, LookupBuilder, Mphf, ValidationMode};

fn fruit_keys() -> Vec<&'static str> {
    vec!["apple", "banana", "cherry", "date", "elderberry"]
}

#[test]
fn s1_fruit_set() {
    let keys = fruit_keys();
    let dict = Builder::new().build(&keys).unwrap();
    let mut slots: Vec<i64> = keys.iter().map(|k| dict.hash(k)).collect();
    slots.sort_unstable();
    assert_eq!(slots, vec![0, 1, 2, 3, 4]);
    assert!((0..5).contains(&dict.hash("fig")));
}

#[test]
fn s2_validation() {
    let keys = fruit_keys();
    let cfg = BuildConfig {
        validation_mode: ValidationMode::Bits16,
        ..Default::default()
    };
    let dict = Builder::new().with_config(cfg).build(&keys).unwrap();
    for k in &keys {
        assert!((0..5).contains(&dict.hash(k)));
    }

    let mut hits = 0;
    let trials = 4000;
    for i in 0..trials {
        let probe = format!("not-a-fruit-{i}");
        if dict.hash(&probe) != -1 {
            hits += 1;
        }
    }
    assert!((hits as f64 / trials as f64) < (1.0 / 65536.0) * 10.0);
}

#[test]
fn s3_empty() {
    let dict = Builder::new().build(&[]).unwrap();
    assert_eq!(dict.hash("anything"), -1);
    let bytes = dict.to_bytes();
    let back = Mphf::from_bytes(&bytes).unwrap();
    assert_eq!(back.hash("anything"), -1);
}

#[test]
fn s4_lookup_basic() {
    let multimap = vec![
        ("China", vec!["Beijing", "Shanghai", "Guangzhou"]),
        ("USA", vec!["New York", "Los Angeles", "Chicago"]),
        ("Japan", vec!["Tokyo", "Osaka", "Kyoto"]),
    ];
    let lookup: Lookup = LookupBuilder::new().build(&multimap).unwrap();
    assert_eq!(lookup.query("Beijing"), Some("China"));
    assert_eq!(lookup.query("Osaka"), Some("Japan"));
    assert_eq!(lookup.query("London"), None);
    assert_eq!(lookup.query_all("Beijing"), Some(vec!["China"]));
    assert_eq!(lookup.query_all("China"), None);
}

#[test]
fn s5_lookup_many_to_one() {
    let multimap = vec![
        ("A", vec!["Common"]),
        ("B", vec!["Common", "UniqueB"]),
        ("C", vec!["UniqueC", "Common"]),
    ];
    let lookup = LookupBuilder::new().build(&multimap).unwrap();
    let mut owners = lookup.query_all("Common").unwrap();
    owners.sort_unstable();
    assert_eq!(owners, vec!["A", "B", "C"]);
    assert_eq!(lookup.query_all("UniqueB"), Some(vec!["B"]));
}

#[test]
fn s6_filter_fpr() {
    let keys: Vec<String> = (0..2000).map(|i| format!("seed-key-{i}")).collect();
    let refs: Vec<&str> = keys.iter().map(|s| s.as_str()).collect();
    let options = FilterOptions {
        width: FilterWidth::Bits8,
        ..Default::default()
    };
    let filter = FilterBuilder::new().with_options(options).build(&refs).unwrap();

    for k in &refs {
        assert!(filter.has(k));
    }

    let mut false_positives = 0;
    let trials = 5000;
    for i in 0..trials {
        let probe = format!("disjoint-probe-{i}");
        if filter.has(&probe) {
            false_positives += 1;
        }
    }
    let fpr = false_positives as f64 / trials as f64;
    assert!(fpr < 0.01, "measured FPR {fpr} exceeded 1%");
}
