//! Whole-engine scenario tests: the generated constraints are checked by
//! evaluating them on concrete states under hand-derived models.

use indexmap::{indexmap, IndexMap};
use num::rational::Rational64;

use gambit_engine::synthesis::{SynthesisOptions, Synthesizer};
use gambit_ir::expr::Expr;
use gambit_ir::system::{
    Location, LocationKind, Transition, TransitionSystem, Update, Variable,
};
use gambit_smt::compile::EncodingMode;
use gambit_smt::constraint::ConstraintSystem;
use gambit_smt::smtlib::EncodeError;

/// The 2-location decrementing loop: `work --[x>0, x:=x-1]--> back --> work`,
/// invariant `x >= 0` at both locations.
fn decrementing_loop() -> TransitionSystem {
    let work = Location::new(
        "work",
        Expr::var("x").ge(Expr::int(0)),
        LocationKind::Deterministic,
        vec![Transition::new(
            1,
            Expr::var("x").gt(Expr::int(0)),
            Update::new(indexmap! {
                "x".to_string() => Expr::var("x").sub(Expr::int(1)),
            }),
        )],
    );
    let back = Location::new(
        "back",
        Expr::var("x").ge(Expr::int(0)),
        LocationKind::Deterministic,
        vec![Transition::new(0, Expr::truth(), Update::identity())],
    );
    TransitionSystem::new(
        "decrementing_loop",
        indexmap! { "x".to_string() => Expr::var("x").ge(Expr::int(0)) },
        vec![work, back],
        0,
        vec![Variable::program("x")],
        vec![],
    )
    .unwrap()
}

fn scenario_a_constraints() -> ConstraintSystem {
    let ts = decrementing_loop();
    let options = SynthesisOptions {
        use_invariants: true,
        trivial_g: Some(Rational64::from_integer(1)),
        ..SynthesisOptions::default()
    };
    Synthesizer::new(&ts, options).constraint_system().unwrap()
}

/// `F(work) = 2x + 1`, `F(back) = 2x + 2`, `G = 1`, `M = 0`: a valid
/// certificate with the ranking proportional to `x`.
fn scenario_a_model() -> IndexMap<String, Expr> {
    indexmap! {
        "f_0_0".to_string() => Expr::int(1),
        "f_0_1".to_string() => Expr::int(2),
        "f_1_0".to_string() => Expr::int(2),
        "f_1_1".to_string() => Expr::int(2),
        "M".to_string() => Expr::int(0),
    }
}

fn sample_states() -> Vec<Rational64> {
    vec![
        Rational64::from_integer(0),
        Rational64::new(1, 4),
        Rational64::from_integer(1),
        Rational64::from_integer(3),
    ]
}

#[test]
fn scenario_a_hand_model_satisfies_every_pair() {
    let cs = scenario_a_constraints();
    let model = scenario_a_model();

    for constraint in &cs.free_constraints {
        let closed = constraint.formula.subst(&model);
        let env = IndexMap::new();
        assert_eq!(closed.eval_bool(&env), Ok(true), "free: {closed}");
    }
    for pair in &cs.pairs {
        let closed = cs
            .effective_condition(pair)
            .subst(&model)
            .implies(pair.implication.subst(&model));
        for x in sample_states() {
            let env = indexmap! { "x".to_string() => x };
            assert_eq!(
                closed.eval_bool(&env),
                Ok(true),
                "pair `{pair}` fails at x = {x}"
            );
        }
    }
}

#[test]
fn scenario_a_antecedents_are_not_vacuous() {
    // Wherever the invariant is satisfiable, the antecedent must be
    // satisfiable under it: at x = 1 every antecedent evaluates true.
    let cs = scenario_a_constraints();
    let env = indexmap! { "x".to_string() => Rational64::from_integer(1) };
    for pair in &cs.pairs {
        let antecedent = cs.effective_condition(pair);
        assert_eq!(
            antecedent.eval_bool(&env),
            Ok(true),
            "antecedent `{antecedent}` vacuous"
        );
    }
}

#[test]
fn scenario_a_query_encodes_in_both_modes() {
    let cs = scenario_a_constraints();
    let quantified = EncodingMode::Quantified.compile(&cs).unwrap();
    assert!(quantified.contains("(forall ((x Real))"));
    assert!(quantified.contains("(check-sat)"));

    // With constant step weights the whole system is linear in x, so the
    // Farkas lowering applies and leaves no quantifiers behind.
    let farkas = EncodingMode::Farkas.compile(&cs).unwrap();
    assert!(!farkas.contains("forall"));
    assert!(farkas.contains("(check-sat)"));
}

#[test]
fn farkas_rejects_nonconstant_step_weights() {
    // Template step weights make the decrease inequality quadratic in the
    // state, which is outside the Farkas fragment.
    let ts = decrementing_loop();
    let options = SynthesisOptions {
        use_invariants: true,
        ..SynthesisOptions::default()
    };
    let cs = Synthesizer::new(&ts, options).constraint_system().unwrap();
    let err = EncodingMode::Farkas.compile(&cs).unwrap_err();
    assert!(matches!(err, EncodeError::NonLinear { .. }));
}

#[test]
fn scenario_a_wrong_model_is_rejected_by_evaluation() {
    // A constant ranking cannot decrease: the edge pair must fail.
    let cs = scenario_a_constraints();
    let model = indexmap! {
        "f_0_0".to_string() => Expr::int(1),
        "f_0_1".to_string() => Expr::int(0),
        "f_1_0".to_string() => Expr::int(1),
        "f_1_1".to_string() => Expr::int(0),
        "M".to_string() => Expr::int(0),
    };
    let env = indexmap! { "x".to_string() => Rational64::from_integer(2) };
    let failing = cs.pairs.iter().any(|pair| {
        let closed = cs
            .effective_condition(pair)
            .subst(&model)
            .implies(pair.implication.subst(&model));
        closed.eval_bool(&env) == Ok(false)
    });
    assert!(failing, "constant ranking should not satisfy the constraints");
}
