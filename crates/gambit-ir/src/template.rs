//! Parametric certificate templates.
//!
//! Every template is an expression whose coefficients are fresh variables
//! to be solved for. Coefficient names are derived deterministically from
//! the caller-supplied prefix, so identical `(prefix, vars, degree)` calls
//! yield syntactically identical templates; distinctness across templates
//! is the caller's obligation (prefixes of the form `kind_locationIndex`).

use crate::expr::Expr;
use crate::system::Variable;

/// Name of the `index`-th coefficient of the template named `prefix`.
pub fn coefficient_name(prefix: &str, index: usize) -> String {
    format!("{prefix}_{index}")
}

/// Affine template `c0 + c1*v1 + ... + cn*vn` with fresh coefficients.
pub fn linear(prefix: &str, vars: &[Variable]) -> Expr {
    let mut terms = vec![Expr::var(coefficient_name(prefix, 0))];
    for (i, v) in vars.iter().enumerate() {
        terms.push(Expr::var(coefficient_name(prefix, i + 1)).mul(v.to_expr()));
    }
    Expr::sum(terms)
}

/// Polynomial template with one fresh coefficient per monomial of total
/// degree at most `degree` (constant monomial included). `degree == 1`
/// yields an affine form.
pub fn polynomial(prefix: &str, vars: &[Variable], degree: u32) -> Expr {
    let terms = monomials(vars, degree)
        .into_iter()
        .enumerate()
        .map(|(i, m)| Expr::var(coefficient_name(prefix, i)).mul(m))
        .collect();
    Expr::sum(terms)
}

/// All monomials of total degree at most `degree` over `vars`, in a fixed
/// order, as explicit products (powers are expanded to repeated factors so
/// the result stays inside the sum/product grammar).
///
/// Returns exactly `C(n + degree, degree)` monomials, duplicates excluded.
pub fn monomials(vars: &[Variable], degree: u32) -> Vec<Expr> {
    let mut out = Vec::new();
    let mut exponents = vec![0u32; vars.len()];
    loop {
        if exponents.iter().sum::<u32>() <= degree {
            out.push(monomial(vars, &exponents));
        }
        // Odometer over exponent tuples, last index fastest.
        let mut i = vars.len();
        loop {
            if i == 0 {
                return out;
            }
            i -= 1;
            if exponents[i] < degree {
                exponents[i] += 1;
                for e in exponents.iter_mut().skip(i + 1) {
                    *e = 0;
                }
                break;
            }
        }
    }
}

fn monomial(vars: &[Variable], exponents: &[u32]) -> Expr {
    let mut factors = Vec::new();
    for (v, &e) in vars.iter().zip(exponents) {
        for _ in 0..e {
            factors.push(v.to_expr());
        }
    }
    if factors.is_empty() {
        return Expr::int(1);
    }
    if factors.len() == 1 {
        return factors.remove(0);
    }
    Expr::product(factors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vars(n: usize) -> Vec<Variable> {
        (0..n).map(|i| Variable::program(format!("x{i}"))).collect()
    }

    fn binomial(n: u64, k: u64) -> u64 {
        let mut result = 1u64;
        for i in 0..k {
            result = result * (n - i) / (i + 1);
        }
        result
    }

    #[test]
    fn linear_template_shape() {
        let vs = vars(2);
        let t = linear("f_0", &vs);
        assert_eq!(
            t,
            Expr::sum(vec![
                Expr::var("f_0_0"),
                Expr::var("f_0_1").mul(Expr::var("x0")),
                Expr::var("f_0_2").mul(Expr::var("x1")),
            ])
        );
    }

    #[test]
    fn identical_inputs_yield_identical_templates() {
        let vs = vars(3);
        assert_eq!(linear("g_1_0", &vs), linear("g_1_0", &vs));
        assert_eq!(polynomial("h_2", &vs, 2), polynomial("h_2", &vs, 2));
    }

    #[test]
    fn monomials_include_constant_term() {
        let ms = monomials(&vars(2), 1);
        assert!(ms.contains(&Expr::int(1)));
        assert_eq!(ms.len(), 3);
    }

    #[test]
    fn degree_two_over_two_vars_has_six_monomials() {
        // C(2+2, 2) = 6: 1, x0, x1, x0*x0, x0*x1, x1*x1.
        let ms = monomials(&vars(2), 2);
        assert_eq!(ms.len(), 6);
    }

    proptest! {
        #[test]
        fn monomial_count_is_n_plus_d_choose_d(n in 0usize..5, d in 0u32..5) {
            let ms = monomials(&vars(n), d);
            let expected = binomial((n as u64) + (d as u64), d as u64);
            prop_assert_eq!(ms.len() as u64, expected);
        }

        #[test]
        fn monomials_have_no_duplicates(n in 0usize..4, d in 0u32..4) {
            let ms = monomials(&vars(n), d);
            for (i, a) in ms.iter().enumerate() {
                for b in ms.iter().skip(i + 1) {
                    prop_assert_ne!(a, b);
                }
            }
        }
    }
}
