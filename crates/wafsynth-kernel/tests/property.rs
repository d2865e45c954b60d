use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use wafsynth_kernel::expr::{and, eq, flag, not, or};
use wafsynth_kernel::{
    Choice, ConditionEngine, Expr, InputValues, RenderContext, Resolution, ValueDomain,
};

const MODES: [&str; 4] = ["rate", "lambda", "athena", "no"];

fn leaf() -> impl Strategy<Value = Expr> {
    prop_oneof![
        Just(Expr::True),
        prop::sample::select(MODES.to_vec()).prop_map(|m| eq("Mode", m)),
        prop::sample::select(vec!["A", "B", "C"]).prop_map(flag),
    ]
}

fn expr() -> impl Strategy<Value = Expr> {
    leaf().prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(not),
            prop::collection::vec(inner.clone(), 0..4).prop_map(and),
            prop::collection::vec(inner, 0..4).prop_map(or),
        ]
    })
}

fn resolution(mode: &str, a: bool, b: bool, c: bool) -> Resolution {
    Resolution {
        fragment: "prop".to_string(),
        inputs: BTreeMap::from([("Mode".to_string(), mode.to_string())]),
        flags: BTreeMap::from([
            ("A".to_string(), a),
            ("B".to_string(), b),
            ("C".to_string(), c),
        ]),
    }
}

fn engine() -> ConditionEngine {
    let mut e = ConditionEngine::new("prop");
    e.declare_input("Mode", ValueDomain::enumeration(MODES), Some("rate"))
        .unwrap();
    e.declare_input("Threshold", ValueDomain::number_min(0), Some("100"))
        .unwrap();
    e.declare_flag("Lambda", eq("Mode", "lambda")).unwrap();
    e.declare_flag("Athena", eq("Mode", "athena")).unwrap();
    e.declare_flag("LogParser", or([flag("Lambda"), flag("Athena")]))
        .unwrap();
    e.declare_flag(
        "RateBased",
        and([eq("Mode", "rate"), not(flag("LogParser"))]),
    )
    .unwrap();
    e
}

proptest! {
    #[test]
    fn evaluation_is_deterministic(
        mode in prop::sample::select(MODES.to_vec()),
        threshold in 0i64..10_000,
    ) {
        let values = InputValues::from([
            ("Mode".to_string(), mode.to_string()),
            ("Threshold".to_string(), threshold.to_string()),
        ]);
        let e = engine();
        let first = e.evaluate(&values).unwrap();
        let second = e.evaluate(&values).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(
            first.flag("LogParser"),
            Some(first.flag("Lambda") == Some(true) || first.flag("Athena") == Some(true))
        );
    }

    #[test]
    fn double_negation_is_identity(
        e in expr(),
        mode in prop::sample::select(MODES.to_vec()),
        a in any::<bool>(),
        b in any::<bool>(),
        c in any::<bool>(),
    ) {
        let res = resolution(mode, a, b, c);
        let direct = e.eval(&res).unwrap();
        prop_assert_eq!(not(not(e)).eval(&res).unwrap(), direct);
    }

    #[test]
    fn select_renders_only_the_chosen_branch(
        e in expr(),
        mode in prop::sample::select(MODES.to_vec()),
        a in any::<bool>(),
        b in any::<bool>(),
        c in any::<bool>(),
    ) {
        let res = resolution(mode, a, b, c);
        let chosen = e.eval(&res).unwrap();
        let ctx = RenderContext { res: &res, owner: "prop", units: None };
        let rendered = Choice::select(e.clone(), Choice::text("then"), Choice::Absent)
            .render(&ctx)
            .unwrap();
        if chosen {
            prop_assert_eq!(rendered, Some(json!("then")));
        } else {
            prop_assert_eq!(rendered, None);
        }
    }
}
