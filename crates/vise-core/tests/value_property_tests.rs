use proptest::prelude::*;
use vise_core::{blend, Interval, Value};

fn finite() -> impl Strategy<Value = f64> {
    -1e6f64..1e6f64
}

fn interval() -> impl Strategy<Value = Interval> {
    (finite(), finite()).prop_map(|(a, b)| Interval::new(a, b))
}

fn known_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        finite().prop_map(Value::Scalar),
        interval().prop_map(Value::Interval),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn constructed_intervals_are_well_formed(a in finite(), b in finite()) {
        let iv = Interval::new(a, b);
        prop_assert!(iv.lo <= iv.hi);
    }

    #[test]
    fn interval_products_contain_endpoint_products(a in interval(), b in interval()) {
        let p = a.mul(&b);
        for x in [a.lo, a.hi] {
            for y in [b.lo, b.hi] {
                prop_assert!(p.lo <= x * y && x * y <= p.hi);
            }
        }
    }

    #[test]
    fn interval_sums_contain_endpoint_sums(a in interval(), b in interval()) {
        let s = a.add(&b);
        prop_assert!(s.lo <= a.lo + b.lo + 1e-9);
        prop_assert!(a.hi + b.hi <= s.hi + 1e-9);
    }

    #[test]
    fn blend_at_zero_is_identity(old in known_value(), target in known_value()) {
        // Promotion means a scalar old against an interval target widens to a
        // degenerate interval, but the numeric content must match `old`.
        match (blend(&old, &target, 0.0), &old) {
            (Value::Scalar(got), Value::Scalar(want)) => prop_assert_eq!(got, *want),
            (Value::Interval(got), old_value) => {
                let want = old_value.as_interval().expect("known values promote");
                prop_assert!((got.lo - want.lo).abs() < 1e-9);
                prop_assert!((got.hi - want.hi).abs() < 1e-9);
            }
            (got, _) => prop_assert!(false, "unexpected blend result {:?}", got),
        }
    }

    #[test]
    fn blend_at_one_is_target(old in known_value(), target in known_value()) {
        match (blend(&old, &target, 1.0), &target) {
            (Value::Scalar(got), Value::Scalar(want)) => prop_assert_eq!(got, *want),
            (Value::Interval(got), target_value) => {
                let want = target_value.as_interval().expect("known values promote");
                prop_assert!((got.lo - want.lo).abs() < 1e-9);
                prop_assert!((got.hi - want.hi).abs() < 1e-9);
            }
            (got, _) => prop_assert!(false, "unexpected blend result {:?}", got),
        }
    }

    #[test]
    fn unknown_adopts_target_at_any_strength(target in known_value(), s in 0.0f64..=1.0) {
        prop_assert_eq!(blend(&Value::unknown(), &target, s), target);
    }

    #[test]
    fn blend_stays_between_old_and_target(a in finite(), b in finite(), s in 0.0f64..=1.0) {
        let got = blend(&Value::Scalar(a), &Value::Scalar(b), s);
        let Value::Scalar(x) = got else {
            return Err(TestCaseError::fail("scalar blend must stay scalar"));
        };
        prop_assert!(x >= a.min(b) - 1e-9 && x <= a.max(b) + 1e-9);
    }

    #[test]
    fn value_json_roundtrips(v in known_value()) {
        let text = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(back, v);
    }
}
