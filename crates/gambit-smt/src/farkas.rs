//! Farkas'-Lemma quantifier elimination.
//!
//! A constraint pair whose condition is a conjunction of inequalities
//! linear in the quantified variables, and whose implication is a
//! conjunction of such inequalities, is rewritten into quantifier-free
//! certificate constraints over fresh nonnegative multipliers: per
//! conclusion atom, either (1) the hypothesis is identically `-1` (self
//! contradiction), (2) the hypothesis combination is identically `0` with
//! a strict atom carrying positive weight, or (3) a nonnegative
//! combination reproduces the conclusion coefficient-by-coefficient,
//! constant term included. Coefficients may themselves be expressions over
//! the template unknowns; only the quantified variables must occur
//! linearly. Anything outside this fragment is a fatal encoding error —
//! notably, non-trivial step-weight templates make the decrease inequality
//! quadratic in the state, so this mode pairs with constant step weights.

use indexmap::{IndexMap, IndexSet};
use gambit_ir::expr::{CmpOp, Expr};

use crate::smtlib::{negate, EncodeError};

/// A term linear in the quantified variables, with expression-valued
/// coefficients over everything else.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearForm {
    pub constant: Expr,
    pub coeffs: IndexMap<String, Expr>,
}

// Neutral-element elision only; anything beyond this is the solver's job.
fn add2(a: Expr, b: Expr) -> Expr {
    if a == Expr::int(0) {
        return b;
    }
    if b == Expr::int(0) {
        return a;
    }
    a.add(b)
}

fn mul2(a: Expr, b: Expr) -> Expr {
    if a == Expr::int(0) || b == Expr::int(0) {
        return Expr::int(0);
    }
    if a == Expr::int(1) {
        return b;
    }
    if b == Expr::int(1) {
        return a;
    }
    a.mul(b)
}

impl LinearForm {
    fn constant_term(expr: Expr) -> Self {
        LinearForm {
            constant: expr,
            coeffs: IndexMap::new(),
        }
    }

    fn variable(name: &str) -> Self {
        let mut coeffs = IndexMap::new();
        coeffs.insert(name.to_string(), Expr::int(1));
        LinearForm {
            constant: Expr::int(0),
            coeffs,
        }
    }

    fn add(mut self, other: LinearForm) -> Self {
        self.constant = add2(self.constant, other.constant);
        for (var, coeff) in other.coeffs {
            match self.coeffs.get_mut(&var) {
                Some(existing) => {
                    *existing = add2(existing.clone(), coeff);
                }
                None => {
                    self.coeffs.insert(var, coeff);
                }
            }
        }
        self
    }

    fn scale(mut self, factor: &Expr) -> Self {
        self.constant = mul2(factor.clone(), self.constant);
        for coeff in self.coeffs.values_mut() {
            *coeff = mul2(factor.clone(), coeff.clone());
        }
        self
    }

    fn negated(self) -> Self {
        self.scale(&Expr::int(-1))
    }

    /// Coefficient of `var`, defaulting to 0.
    pub fn coeff(&self, var: &str) -> Expr {
        self.coeffs.get(var).cloned().unwrap_or_else(|| Expr::int(0))
    }

    /// Decompose an arithmetic expression. Fails when two factors of a
    /// product both mention quantified variables.
    pub fn of_expr(expr: &Expr, quantified: &IndexSet<String>) -> Result<Self, EncodeError> {
        match expr {
            Expr::Const(_) => Ok(LinearForm::constant_term(expr.clone())),
            Expr::Var(name) => {
                if quantified.contains(name) {
                    Ok(LinearForm::variable(name))
                } else {
                    Ok(LinearForm::constant_term(expr.clone()))
                }
            }
            Expr::Add(terms) => {
                let mut acc = LinearForm::constant_term(Expr::int(0));
                for t in terms {
                    acc = acc.add(LinearForm::of_expr(t, quantified)?);
                }
                Ok(acc)
            }
            Expr::Mul(factors) => {
                let mut linear_part: Option<LinearForm> = None;
                let mut scalar_factors = Vec::new();
                for factor in factors {
                    if factor.free_vars().iter().any(|v| quantified.contains(v)) {
                        let form = LinearForm::of_expr(factor, quantified)?;
                        if linear_part.is_some() {
                            return Err(EncodeError::NonLinear {
                                expr: expr.to_string(),
                                var: form
                                    .coeffs
                                    .keys()
                                    .next()
                                    .cloned()
                                    .unwrap_or_default(),
                            });
                        }
                        linear_part = Some(form);
                    } else {
                        scalar_factors.push(factor.clone());
                    }
                }
                let scalar = match scalar_factors.len() {
                    0 => Expr::int(1),
                    1 => scalar_factors.remove(0),
                    _ => Expr::product(scalar_factors),
                };
                match linear_part {
                    Some(form) => Ok(form.scale(&scalar)),
                    None => Ok(LinearForm::constant_term(scalar)),
                }
            }
            Expr::Cmp(_, _, _)
            | Expr::And(_)
            | Expr::Or(_)
            | Expr::Not(_)
            | Expr::Implies(_, _) => Err(EncodeError::BooleanOperand(expr.to_string())),
        }
    }
}

/// One hypothesis/conclusion atom in the normal form `form >= 0`
/// (or `form > 0` when strict).
#[derive(Debug, Clone, PartialEq)]
pub struct FarkasAtom {
    pub form: LinearForm,
    pub strict: bool,
}

fn normalize_comparison(
    op: CmpOp,
    lhs: &Expr,
    rhs: &Expr,
    quantified: &IndexSet<String>,
) -> Result<Vec<FarkasAtom>, EncodeError> {
    let l = LinearForm::of_expr(lhs, quantified)?;
    let r = LinearForm::of_expr(rhs, quantified)?;
    let ge = |a: LinearForm, b: LinearForm, strict| FarkasAtom {
        form: a.add(b.negated()),
        strict,
    };
    match op {
        CmpOp::Ge => Ok(vec![ge(l, r, false)]),
        CmpOp::Gt => Ok(vec![ge(l, r, true)]),
        CmpOp::Le => Ok(vec![ge(r, l, false)]),
        CmpOp::Lt => Ok(vec![ge(r, l, true)]),
        CmpOp::Eq => Ok(vec![
            ge(l.clone(), r.clone(), false),
            ge(r, l, false),
        ]),
    }
}

/// Flatten a formula into Farkas atoms. Only conjunctions of comparisons
/// (and negations thereof) are inside the fragment.
pub fn flatten_atoms(
    expr: &Expr,
    quantified: &IndexSet<String>,
) -> Result<Vec<FarkasAtom>, EncodeError> {
    match expr {
        Expr::And(terms) => {
            let mut out = Vec::new();
            for t in terms {
                out.extend(flatten_atoms(t, quantified)?);
            }
            Ok(out)
        }
        Expr::Cmp(op, lhs, rhs) => normalize_comparison(*op, lhs, rhs, quantified),
        Expr::Not(inner) => flatten_atoms(&negate(inner)?, quantified),
        Expr::Or(_) | Expr::Implies(_, _) => {
            Err(EncodeError::NonConjunctive(expr.to_string()))
        }
        Expr::Const(_) | Expr::Var(_) | Expr::Add(_) | Expr::Mul(_) => {
            Err(EncodeError::NonConjunctive(expr.to_string()))
        }
    }
}

/// A nonnegative combination `m_0 + sum_j m_{j+1} * hyp_j` with named
/// multipliers.
struct Combination {
    multipliers: Vec<String>,
    form: LinearForm,
}

fn combination(prefix: &str, hypothesis: &[FarkasAtom]) -> Combination {
    let multipliers: Vec<String> = (0..=hypothesis.len())
        .map(|j| format!("{prefix}_{j}"))
        .collect();
    let mut form = LinearForm::constant_term(Expr::var(multipliers[0].clone()));
    for (j, atom) in hypothesis.iter().enumerate() {
        let scaled = atom.form.clone().scale(&Expr::var(multipliers[j + 1].clone()));
        form = form.add(scaled);
    }
    Combination { multipliers, form }
}

fn nonneg_conjuncts(multipliers: &[String]) -> Vec<Expr> {
    multipliers
        .iter()
        .map(|m| Expr::var(m.clone()).ge(Expr::int(0)))
        .collect()
}

fn coefficient_equations(
    combo: &LinearForm,
    target: &LinearForm,
    quantified: &IndexSet<String>,
) -> Vec<Expr> {
    let mut out = Vec::new();
    for var in quantified {
        out.push(combo.coeff(var).eq(target.coeff(var)));
    }
    out.push(combo.constant.clone().eq(target.constant.clone()));
    out
}

fn strict_weight(multipliers: &[String], hypothesis: &[FarkasAtom]) -> Expr {
    let terms: Vec<Expr> = hypothesis
        .iter()
        .enumerate()
        .filter(|(_, atom)| atom.strict)
        .map(|(j, _)| Expr::var(multipliers[j + 1].clone()))
        .collect();
    Expr::sum(terms)
}

/// Eliminate the universal quantifier of one constraint pair.
///
/// Returns one quantifier-free disjunction per conclusion atom. Multiplier
/// names are derived from `pair_index` so distinct pairs never collide.
pub fn eliminate_pair(
    pair_index: usize,
    quantified: &[String],
    condition: &Expr,
    implication: &Expr,
) -> Result<Vec<Expr>, EncodeError> {
    let qvars: IndexSet<String> = quantified.iter().cloned().collect();
    let hypothesis = flatten_atoms(condition, &qvars)?;
    let conclusions = flatten_atoms(implication, &qvars)?;
    let any_strict_hypothesis = hypothesis.iter().any(|a| a.strict);

    let mut out = Vec::with_capacity(conclusions.len());
    for (c_idx, conclusion) in conclusions.iter().enumerate() {
        // Case 1: the hypothesis is self-contradictory.
        let y = combination(&format!("y_{pair_index}_{c_idx}"), &hypothesis);
        let mut case1 = nonneg_conjuncts(&y.multipliers);
        let minus_one = LinearForm::constant_term(Expr::int(-1));
        case1.extend(coefficient_equations(&y.form, &minus_one, &qvars));

        // Case 2: the hypothesis is already false in a strict sub-case.
        let case2 = if any_strict_hypothesis {
            let z = combination(&format!("z_{pair_index}_{c_idx}"), &hypothesis);
            let mut conj = nonneg_conjuncts(&z.multipliers);
            let zero = LinearForm::constant_term(Expr::int(0));
            conj.extend(coefficient_equations(&z.form, &zero, &qvars));
            conj.push(strict_weight(&z.multipliers, &hypothesis).gt(Expr::int(0)));
            Some(Expr::and(conj))
        } else {
            None
        };

        // Case 3: a direct nonnegative combination reproduces the
        // conclusion, monomial by monomial.
        let w = combination(&format!("w_{pair_index}_{c_idx}"), &hypothesis);
        let mut case3 = nonneg_conjuncts(&w.multipliers);
        case3.extend(coefficient_equations(&w.form, &conclusion.form, &qvars));
        if conclusion.strict {
            // A strict conclusion needs positive slack: either the constant
            // multiplier or a strict-hypothesis multiplier is positive.
            let slack = Expr::var(w.multipliers[0].clone())
                .add(strict_weight(&w.multipliers, &hypothesis));
            case3.push(slack.gt(Expr::int(0)));
        }

        let mut cases = vec![Expr::and(case1)];
        if let Some(c2) = case2 {
            cases.push(c2);
        }
        cases.push(Expr::and(case3));
        out.push(Expr::or(cases));
    }
    Ok(out)
}
