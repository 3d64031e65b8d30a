//! Round-trip tests: encoding a constraint system and re-parsing the
//! emitted text must preserve the quantifier lists and the
//! boolean/relational structure (modulo the documented rewrites: equality
//! splits into a `<=`/`>=` pair and negation is pushed down before
//! printing).

use gambit_ir::expr::Expr;
use gambit_smt::compile::{ConstraintCompiler, QuantifiedCompiler};
use gambit_smt::constraint::{ConstraintPair, ConstraintSystem};
use gambit_smt::smtlib::{self, ParsedAssert};

fn sample_system() -> ConstraintSystem {
    let mut cs = ConstraintSystem::new(vec!["x".to_string(), "y".to_string()], true);
    cs.add_free_constraint(Expr::var("M").ge(Expr::int(0)));
    cs.add_pair(
        ConstraintPair::new(
            vec!["x".to_string(), "y".to_string()],
            Expr::and(vec![
                Expr::var("x").gt(Expr::int(0)),
                Expr::var("y").le(Expr::var("x")),
            ]),
            Expr::and(vec![
                Expr::var("f_0_0")
                    .add(Expr::var("f_0_1").mul(Expr::var("x")))
                    .ge(Expr::int(0)),
                Expr::var("g_0_0").gt(Expr::int(0)),
            ]),
        )
        .with_invariants(vec![Expr::var("x").ge(Expr::int(0))]),
    );
    cs
}

#[test]
fn quantifier_list_and_operators_survive_reparsing() {
    let cs = sample_system();
    let text = QuantifiedCompiler.compile(&cs).unwrap();
    let script = smtlib::parse_script(&text).unwrap();

    assert_eq!(script.commands, ["check-sat", "get-model"]);
    assert_eq!(script.asserts.len(), 2);

    match &script.asserts[0] {
        ParsedAssert::Free(free) => {
            assert_eq!(free, &Expr::var("M").ge(Expr::int(0)));
        }
        other => panic!("expected free assert, got {other:?}"),
    }

    match &script.asserts[1] {
        ParsedAssert::Quantified {
            vars,
            condition,
            implication,
        } => {
            assert_eq!(vars, &["x".to_string(), "y".to_string()]);
            // use_invariants conjoins the recorded invariant in front.
            assert_eq!(
                condition,
                &Expr::and(vec![
                    Expr::var("x").ge(Expr::int(0)),
                    Expr::and(vec![
                        Expr::var("x").gt(Expr::int(0)),
                        Expr::var("y").le(Expr::var("x")),
                    ]),
                ])
            );
            assert_eq!(implication, &cs.pairs[0].implication);
        }
        other => panic!("expected quantified assert, got {other:?}"),
    }
}

#[test]
fn declarations_cover_exactly_the_free_symbols() {
    let cs = sample_system();
    let text = QuantifiedCompiler.compile(&cs).unwrap();
    let script = smtlib::parse_script(&text).unwrap();
    assert_eq!(script.declarations, ["M", "f_0_0", "f_0_1", "g_0_0"]);
}

#[test]
fn printing_is_a_fixpoint_of_reparsing() {
    // print -> parse -> print must reproduce the text exactly: the reader
    // and printer agree on the emitted fragment.
    let cs = sample_system();
    let text = QuantifiedCompiler.compile(&cs).unwrap();
    let script = smtlib::parse_script(&text).unwrap();

    let mut asserts = Vec::new();
    for a in &script.asserts {
        match a {
            ParsedAssert::Free(free) => {
                asserts.push(smtlib::print_expr(free).unwrap());
            }
            ParsedAssert::Quantified {
                vars,
                condition,
                implication,
            } => {
                let body = format!(
                    "(=> {} {})",
                    smtlib::print_expr(condition).unwrap(),
                    smtlib::print_expr(implication).unwrap()
                );
                asserts.push(smtlib::print_forall(vars, &body));
            }
        }
    }
    let decls = script.declarations.iter().cloned().collect();
    let reprinted = smtlib::script(&decls, &asserts);
    assert_eq!(reprinted, text);
}
