//! SMT-LIB2 emission and a small script reader.
//!
//! The printer lowers the expression grammar to prefix form exactly:
//! n-ary `+`/`*`, the five relational operators (equality as a `<=`/`>=`
//! pair), `and`/`or`/`=>`, and negation eliminated up front by De Morgan
//! push-down (compound connectives) or operator flipping (comparisons).
//! Boolean literals print as tautological/contradictory numeric
//! comparisons. The reader is the inverse used by the round-trip tests and
//! understands exactly the emitted fragment.

use indexmap::IndexSet;
use num::rational::Rational64;
use num::traits::Signed;
use thiserror::Error;

use gambit_ir::expr::{CmpOp, Expr};

/// Fatal lowering errors. A query is never partially emitted.
#[derive(Debug, Error, PartialEq)]
pub enum EncodeError {
    #[error("cannot negate non-boolean expression `{0}`")]
    UnsupportedNegation(String),
    #[error("expression `{expr}` is not linear in `{var}`")]
    NonLinear { expr: String, var: String },
    #[error("expected a conjunction of linear comparisons, got `{0}`")]
    NonConjunctive(String),
    #[error("boolean operand `{0}` where an arithmetic term was expected")]
    BooleanOperand(String),
}

/// Rewrite `not expr` into the negation-free fragment: comparisons flip
/// their operator (`=` splits into `<` or `>`), `and`/`or` De Morgan,
/// `a => b` becomes `a and not b`.
pub fn negate(expr: &Expr) -> Result<Expr, EncodeError> {
    match expr {
        Expr::Cmp(CmpOp::Eq, lhs, rhs) => Ok(Expr::or(vec![
            Expr::Cmp(CmpOp::Lt, lhs.clone(), rhs.clone()),
            Expr::Cmp(CmpOp::Gt, lhs.clone(), rhs.clone()),
        ])),
        Expr::Cmp(op, lhs, rhs) => {
            let flipped = op.flipped().ok_or_else(|| {
                EncodeError::UnsupportedNegation(expr.to_string())
            })?;
            Ok(Expr::Cmp(flipped, lhs.clone(), rhs.clone()))
        }
        Expr::And(terms) => {
            let negated: Result<Vec<_>, _> = terms.iter().map(negate).collect();
            Ok(Expr::or(negated?))
        }
        Expr::Or(terms) => {
            let negated: Result<Vec<_>, _> = terms.iter().map(negate).collect();
            Ok(Expr::and(negated?))
        }
        Expr::Not(inner) => Ok((**inner).clone()),
        Expr::Implies(lhs, rhs) => Ok(Expr::and(vec![(**lhs).clone(), negate(rhs)?])),
        Expr::Const(_) | Expr::Var(_) | Expr::Add(_) | Expr::Mul(_) => {
            Err(EncodeError::UnsupportedNegation(expr.to_string()))
        }
    }
}

fn print_rational(r: &Rational64) -> String {
    if r.is_integer() {
        let n = *r.numer();
        if n < 0 {
            format!("(- {})", -n)
        } else {
            n.to_string()
        }
    } else if r.is_negative() {
        format!("(- (/ {} {}))", r.numer().abs(), r.denom())
    } else {
        format!("(/ {} {})", r.numer(), r.denom())
    }
}

/// Print an expression in SMT-LIB2 prefix form.
pub fn print_expr(expr: &Expr) -> Result<String, EncodeError> {
    match expr {
        Expr::Const(c) => Ok(print_rational(c)),
        Expr::Var(name) => Ok(name.clone()),
        Expr::Add(terms) => {
            if terms.is_empty() {
                return Ok("0".to_string());
            }
            if terms.len() == 1 {
                return print_expr(&terms[0]);
            }
            let inner: Result<Vec<_>, _> = terms.iter().map(print_expr).collect();
            Ok(format!("(+ {})", inner?.join(" ")))
        }
        Expr::Mul(factors) => {
            if factors.is_empty() {
                return Ok("1".to_string());
            }
            if factors.len() == 1 {
                return print_expr(&factors[0]);
            }
            let inner: Result<Vec<_>, _> = factors.iter().map(print_expr).collect();
            Ok(format!("(* {})", inner?.join(" ")))
        }
        Expr::Cmp(CmpOp::Eq, lhs, rhs) => {
            let l = print_expr(lhs)?;
            let r = print_expr(rhs)?;
            Ok(format!("(and (<= {l} {r}) (>= {l} {r}))"))
        }
        Expr::Cmp(op, lhs, rhs) => {
            Ok(format!("({op} {} {})", print_expr(lhs)?, print_expr(rhs)?))
        }
        Expr::And(terms) => {
            if terms.is_empty() {
                return Ok("(>= 1 0)".to_string());
            }
            if terms.len() == 1 {
                return print_expr(&terms[0]);
            }
            let inner: Result<Vec<_>, _> = terms.iter().map(print_expr).collect();
            Ok(format!("(and {})", inner?.join(" ")))
        }
        Expr::Or(terms) => {
            if terms.is_empty() {
                return Ok("(>= 0 1)".to_string());
            }
            if terms.len() == 1 {
                return print_expr(&terms[0]);
            }
            let inner: Result<Vec<_>, _> = terms.iter().map(print_expr).collect();
            Ok(format!("(or {})", inner?.join(" ")))
        }
        Expr::Not(inner) => print_expr(&negate(inner)?),
        Expr::Implies(lhs, rhs) => {
            Ok(format!("(=> {} {})", print_expr(lhs)?, print_expr(rhs)?))
        }
    }
}

/// Print `(forall ((v Real)...) body)`; with no binders the body stands
/// alone (an empty binder list is not legal SMT-LIB2).
pub fn print_forall(vars: &[String], body: &str) -> String {
    if vars.is_empty() {
        return body.to_string();
    }
    let binders: Vec<String> = vars.iter().map(|v| format!("({v} Real)")).collect();
    format!("(forall ({}) {})", binders.join(" "), body)
}

/// Assemble the full query: all declarations, then all assertions, then
/// `(check-sat)` `(get-model)`.
pub fn script(declarations: &IndexSet<String>, asserts: &[String]) -> String {
    let mut lines = Vec::with_capacity(declarations.len() + asserts.len() + 2);
    for name in declarations {
        lines.push(format!("(declare-const {name} Real)"));
    }
    for body in asserts {
        lines.push(format!("(assert {body})"));
    }
    lines.push("(check-sat)".to_string());
    lines.push("(get-model)".to_string());
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Script reader (round-trip support)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum ScriptParseError {
    #[error("unbalanced parentheses in script")]
    Unbalanced,
    #[error("unexpected token `{0}`")]
    UnexpectedToken(String),
    #[error("malformed `{form}` form: {reason}")]
    Malformed { form: String, reason: String },
}

/// A parsed s-expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

/// Tokenize and nest a whole input into s-expressions.
pub fn parse_sexps(input: &str) -> Result<Vec<Sexp>, ScriptParseError> {
    let mut stack: Vec<Vec<Sexp>> = vec![Vec::new()];
    let mut token = String::new();
    let flush = |token: &mut String, stack: &mut Vec<Vec<Sexp>>| {
        if !token.is_empty() {
            if let Some(top) = stack.last_mut() {
                top.push(Sexp::Atom(std::mem::take(token)));
            }
        }
    };
    for ch in input.chars() {
        match ch {
            '(' => {
                flush(&mut token, &mut stack);
                stack.push(Vec::new());
            }
            ')' => {
                flush(&mut token, &mut stack);
                let done = stack.pop().ok_or(ScriptParseError::Unbalanced)?;
                match stack.last_mut() {
                    Some(top) => top.push(Sexp::List(done)),
                    None => return Err(ScriptParseError::Unbalanced),
                }
            }
            c if c.is_whitespace() => flush(&mut token, &mut stack),
            c => token.push(c),
        }
    }
    flush(&mut token, &mut stack);
    if stack.len() != 1 {
        return Err(ScriptParseError::Unbalanced);
    }
    Ok(stack.remove(0))
}

/// One `(assert …)` of a parsed script.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedAssert {
    Quantified {
        vars: Vec<String>,
        condition: Expr,
        implication: Expr,
    },
    Free(Expr),
}

/// Structured view of an emitted query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedScript {
    pub declarations: Vec<String>,
    pub asserts: Vec<ParsedAssert>,
    pub commands: Vec<String>,
}

/// Re-parse an emitted script. Understands exactly the fragment the
/// printer produces.
pub fn parse_script(input: &str) -> Result<ParsedScript, ScriptParseError> {
    let mut out = ParsedScript::default();
    for form in parse_sexps(input)? {
        let Sexp::List(items) = &form else {
            return Err(ScriptParseError::UnexpectedToken(atom_text(&form)));
        };
        match items.first() {
            Some(Sexp::Atom(head)) if head == "declare-const" => {
                let name = match items.get(1) {
                    Some(Sexp::Atom(name)) => name.clone(),
                    _ => {
                        return Err(ScriptParseError::Malformed {
                            form: "declare-const".into(),
                            reason: "missing symbol".into(),
                        })
                    }
                };
                out.declarations.push(name);
            }
            Some(Sexp::Atom(head)) if head == "assert" => {
                let body = items.get(1).ok_or_else(|| ScriptParseError::Malformed {
                    form: "assert".into(),
                    reason: "missing body".into(),
                })?;
                out.asserts.push(parse_assert_body(body)?);
            }
            Some(Sexp::Atom(head)) if head == "check-sat" || head == "get-model" => {
                out.commands.push(head.clone());
            }
            _ => return Err(ScriptParseError::UnexpectedToken(atom_text(&form))),
        }
    }
    Ok(out)
}

fn atom_text(s: &Sexp) -> String {
    match s {
        Sexp::Atom(a) => a.clone(),
        Sexp::List(items) => items.first().map(atom_text).unwrap_or_default(),
    }
}

fn parse_assert_body(body: &Sexp) -> Result<ParsedAssert, ScriptParseError> {
    if let Sexp::List(items) = body {
        if let Some(Sexp::Atom(head)) = items.first() {
            if head == "forall" {
                let (vars, inner) = parse_forall(items)?;
                let Sexp::List(imp) = inner else {
                    return Err(ScriptParseError::Malformed {
                        form: "forall".into(),
                        reason: "body is not an implication".into(),
                    });
                };
                if imp.len() == 3 && imp[0] == Sexp::Atom("=>".into()) {
                    return Ok(ParsedAssert::Quantified {
                        vars,
                        condition: expr_of_sexp(&imp[1])?,
                        implication: expr_of_sexp(&imp[2])?,
                    });
                }
                return Err(ScriptParseError::Malformed {
                    form: "forall".into(),
                    reason: "body is not an implication".into(),
                });
            }
        }
    }
    Ok(ParsedAssert::Free(expr_of_sexp(body)?))
}

fn parse_forall(items: &[Sexp]) -> Result<(Vec<String>, &Sexp), ScriptParseError> {
    let malformed = |reason: &str| ScriptParseError::Malformed {
        form: "forall".into(),
        reason: reason.into(),
    };
    if items.len() != 3 {
        return Err(malformed("expected binder list and body"));
    }
    let Sexp::List(binders) = &items[1] else {
        return Err(malformed("binder list is not a list"));
    };
    let mut vars = Vec::with_capacity(binders.len());
    for b in binders {
        match b {
            Sexp::List(pair) if pair.len() == 2 => match &pair[0] {
                Sexp::Atom(name) => vars.push(name.clone()),
                Sexp::List(_) => return Err(malformed("binder name is not a symbol")),
            },
            _ => return Err(malformed("binder is not a (name sort) pair")),
        }
    }
    Ok((vars, &items[2]))
}

/// Decode one term of the emitted fragment back into an [`Expr`].
pub fn expr_of_sexp(sexp: &Sexp) -> Result<Expr, ScriptParseError> {
    match sexp {
        Sexp::Atom(atom) => {
            if let Ok(n) = atom.parse::<i64>() {
                return Ok(Expr::int(n));
            }
            if atom.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                return Err(ScriptParseError::UnexpectedToken(atom.clone()));
            }
            Ok(Expr::var(atom.clone()))
        }
        Sexp::List(items) => {
            let Some(Sexp::Atom(head)) = items.first() else {
                return Err(ScriptParseError::UnexpectedToken(atom_text(sexp)));
            };
            let args: Result<Vec<Expr>, _> = items[1..].iter().map(expr_of_sexp).collect();
            let args = args?;
            let argc = args.len();
            let arity = |want: usize| -> Result<(), ScriptParseError> {
                if argc == want {
                    Ok(())
                } else {
                    Err(ScriptParseError::Malformed {
                        form: head.clone(),
                        reason: format!("expected {want} operands, got {argc}"),
                    })
                }
            };
            match head.as_str() {
                "+" => Ok(Expr::sum(args)),
                "*" => Ok(Expr::product(args)),
                "-" => match argc {
                    1 => {
                        let arg = args.into_iter().next().unwrap_or_else(|| Expr::int(0));
                        match arg {
                            Expr::Const(c) => Ok(Expr::Const(-c)),
                            other => Ok(other.neg()),
                        }
                    }
                    2 => {
                        let mut it = args.into_iter();
                        let lhs = it.next().unwrap_or_else(|| Expr::int(0));
                        let rhs = it.next().unwrap_or_else(|| Expr::int(0));
                        Ok(lhs.sub(rhs))
                    }
                    n => Err(ScriptParseError::Malformed {
                        form: "-".into(),
                        reason: format!("expected 1 or 2 operands, got {n}"),
                    }),
                },
                "/" => {
                    arity(2)?;
                    match (&args[0], &args[1]) {
                        (Expr::Const(p), Expr::Const(q)) if *q.numer() != 0 => {
                            Ok(Expr::Const(p / q))
                        }
                        _ => Err(ScriptParseError::Malformed {
                            form: "/".into(),
                            reason: "non-constant division".into(),
                        }),
                    }
                }
                "<=" => {
                    arity(2)?;
                    Ok(args[0].clone().le(args[1].clone()))
                }
                "<" => {
                    arity(2)?;
                    Ok(args[0].clone().lt(args[1].clone()))
                }
                ">=" => {
                    arity(2)?;
                    Ok(args[0].clone().ge(args[1].clone()))
                }
                ">" => {
                    arity(2)?;
                    Ok(args[0].clone().gt(args[1].clone()))
                }
                "=" => {
                    arity(2)?;
                    Ok(args[0].clone().eq(args[1].clone()))
                }
                "and" => Ok(Expr::and(args)),
                "or" => Ok(Expr::or(args)),
                "not" => {
                    arity(1)?;
                    Ok(args[0].clone().not())
                }
                "=>" => {
                    arity(2)?;
                    Ok(args[0].clone().implies(args[1].clone()))
                }
                other => Err(ScriptParseError::UnexpectedToken(other.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_simple_term() {
        let term = Expr::var("x").add(Expr::int(1)).ge(Expr::int(0));
        assert_eq!(print_expr(&term).unwrap(), "(>= (+ x 1) 0)");
    }

    #[test]
    fn print_rational_constants() {
        assert_eq!(print_expr(&Expr::rat(1, 2)).unwrap(), "(/ 1 2)");
        assert_eq!(print_expr(&Expr::rat(-1, 2)).unwrap(), "(- (/ 1 2))");
        assert_eq!(print_expr(&Expr::int(-3)).unwrap(), "(- 3)");
    }

    #[test]
    fn equality_prints_as_le_ge_pair() {
        let term = Expr::var("x").eq(Expr::int(0));
        assert_eq!(print_expr(&term).unwrap(), "(and (<= x 0) (>= x 0))");
    }

    #[test]
    fn boolean_literals_print_as_numeric_comparisons() {
        assert_eq!(print_expr(&Expr::and(vec![])).unwrap(), "(>= 1 0)");
        assert_eq!(print_expr(&Expr::or(vec![])).unwrap(), "(>= 0 1)");
    }

    #[test]
    fn negation_flips_comparisons() {
        let term = Expr::var("x").ge(Expr::int(0)).not();
        assert_eq!(print_expr(&term).unwrap(), "(< x 0)");
    }

    #[test]
    fn negation_pushes_through_connectives() {
        let term = Expr::and(vec![
            Expr::var("x").gt(Expr::int(0)),
            Expr::var("y").lt(Expr::int(1)),
        ])
        .not();
        assert_eq!(print_expr(&term).unwrap(), "(or (<= x 0) (>= y 1))");

        let imp = Expr::var("x")
            .gt(Expr::int(0))
            .implies(Expr::var("y").gt(Expr::int(0)))
            .not();
        assert_eq!(print_expr(&imp).unwrap(), "(and (> x 0) (<= y 0))");
    }

    #[test]
    fn negating_arithmetic_is_an_error() {
        let term = Expr::var("x").add(Expr::int(1)).not();
        assert!(matches!(
            print_expr(&term),
            Err(EncodeError::UnsupportedNegation(_))
        ));
    }

    #[test]
    fn script_orders_declarations_then_asserts_then_commands() {
        let mut decls = IndexSet::new();
        decls.insert("c".to_string());
        let text = script(&decls, &["(>= c 0)".to_string()]);
        assert_eq!(
            text,
            "(declare-const c Real)\n(assert (>= c 0))\n(check-sat)\n(get-model)"
        );
    }

    #[test]
    fn reader_roundtrips_quantified_assert() {
        let body = print_forall(
            &["x".to_string()],
            &format!(
                "(=> {} {})",
                print_expr(&Expr::var("x").gt(Expr::int(0))).unwrap(),
                print_expr(&Expr::var("c").mul(Expr::var("x")).ge(Expr::int(1))).unwrap(),
            ),
        );
        let mut decls = IndexSet::new();
        decls.insert("c".to_string());
        let text = script(&decls, &[body]);
        let parsed = parse_script(&text).unwrap();
        assert_eq!(parsed.declarations, ["c"]);
        assert_eq!(parsed.commands, ["check-sat", "get-model"]);
        match &parsed.asserts[0] {
            ParsedAssert::Quantified {
                vars,
                condition,
                implication,
            } => {
                assert_eq!(vars, &["x".to_string()]);
                assert_eq!(condition, &Expr::var("x").gt(Expr::int(0)));
                assert_eq!(
                    implication,
                    &Expr::var("c").mul(Expr::var("x")).ge(Expr::int(1))
                );
            }
            other => panic!("expected quantified assert, got {other:?}"),
        }
    }
}
