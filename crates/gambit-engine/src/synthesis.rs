//! Constraint generation.
//!
//! Per non-terminal location `l` with ranking `F_l`, every outgoing edge
//! to `l'` with guard `g`, update `u`, and step weight `G` contributes the
//! core implication
//!
//! ```text
//! invariant(l) ∧ g  ⇒  (F_l − u(F_l')) · G ≥ 1  ∧  u(F_l') ≥ 0
//! ```
//!
//! with the quantifier structure decided by who resolves the choice at
//! `l`. The product-with-weight form lets `G` scale each edge instead of
//! forcing one global decrease margin; in exchange, `G` must stay strictly
//! positive and its drift along any two consecutive edges is bounded by
//! the shared constant `M`. This two-layer scheme is what makes the
//! certificate sound for games whose progress accrues only in aggregate.

use indexmap::IndexMap;
use num::rational::Rational64;
use tracing::{debug, info};

use gambit_ir::expr::Expr;
use gambit_ir::system::{LocationId, LocationKind, Transition, TransitionSystem};
use gambit_ir::template;
use gambit_smt::constraint::{ConstraintError, ConstraintPair, ConstraintSystem};

/// Knobs of a synthesis run.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    /// Conjoin recorded location invariants into every antecedent.
    pub use_invariants: bool,
    /// Replace every step-weight template by this constant and skip the
    /// drift and positivity layers.
    pub trivial_g: Option<Rational64>,
    /// Add the heuristic refinement `H` narrowing every antecedent.
    pub use_heuristic: bool,
    /// Template degree; 1 is affine.
    pub degree: u32,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        SynthesisOptions {
            use_invariants: false,
            trivial_g: None,
            use_heuristic: false,
            degree: 1,
        }
    }
}

/// The parametric certificate functions of one run, keyed by indices into
/// the location arena.
#[derive(Debug, Clone)]
pub struct Templates {
    /// `F`: per-location ranking value.
    pub ranking: Vec<Expr>,
    /// `G`: per-edge step weight, indexed `[location][transition]`.
    pub step_weight: Vec<Vec<Expr>>,
    /// `T`: per-(angelic-infinite location, input) witness function.
    pub witness: IndexMap<(LocationId, String), Expr>,
    /// `H`: per-location heuristic guard refinement (empty unless enabled).
    pub heuristic: Vec<Expr>,
}

/// Walks the transition system and emits the constraint system whose
/// satisfiability makes the templates a valid certificate.
pub struct Synthesizer<'a> {
    ts: &'a TransitionSystem,
    options: SynthesisOptions,
    templates: Templates,
}

impl<'a> Synthesizer<'a> {
    pub fn new(ts: &'a TransitionSystem, options: SynthesisOptions) -> Self {
        let templates = create_templates(ts, &options);
        for (i, f) in templates.ranking.iter().enumerate() {
            debug!(location = %ts.locations[i].name, "f = {f}");
        }
        for ((loc, input), t) in &templates.witness {
            debug!(location = %ts.locations[*loc].name, input = %input, "t = {t}");
        }
        Synthesizer {
            ts,
            options,
            templates,
        }
    }

    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    pub fn into_templates(self) -> Templates {
        self.templates
    }

    /// Emit the full constraint list and close it under the witness
    /// substitution for angelic-infinite inputs.
    pub fn constraint_system(&self) -> Result<ConstraintSystem, ConstraintError> {
        let pvars = self.ts.program_variable_names();
        let mut cs = ConstraintSystem::new(pvars.clone(), self.options.use_invariants);

        // The drift bound is a shared nonnegative constant.
        cs.add_free_constraint(Expr::var("M").ge(Expr::int(0)));

        self.initial_pair(&mut cs, &pvars);
        for (i, location) in self.ts.locations.iter().enumerate() {
            if location.is_terminal() {
                continue;
            }
            match location.kind {
                LocationKind::Deterministic => self.deterministic_pairs(&mut cs, &pvars, i),
                LocationKind::Demonic => self.demonic_pairs(&mut cs, &pvars, i),
                LocationKind::AngelicFinite => self.angelic_finite_pair(&mut cs, &pvars, i),
                LocationKind::AngelicInfinite => self.angelic_infinite_pairs(&mut cs, &pvars, i),
            }
        }
        if self.options.trivial_g.is_none() {
            self.drift_pairs(&mut cs, &pvars);
            self.positivity_pairs(&mut cs, &pvars);
        }

        // Replace every angelic-infinite input by its witness function so
        // the emitted query quantifies over program variables only.
        let witness_map: IndexMap<String, Expr> = self
            .templates
            .witness
            .iter()
            .map(|((_, input), t)| (input.clone(), t.clone()))
            .collect();
        if !witness_map.is_empty() {
            cs.subst(&witness_map)?;
        }

        info!(
            pairs = cs.pairs.len(),
            free = cs.free_constraints.len(),
            "constraint system generated"
        );
        Ok(cs)
    }

    fn initial_pair(&self, cs: &mut ConstraintSystem, pvars: &[String]) {
        let mut terms = vec![self.templates.ranking[self.ts.initial].clone().ge(Expr::int(0))];
        if self.options.use_heuristic {
            terms.push(self.templates.heuristic[self.ts.initial].clone().ge(Expr::int(0)));
        }
        cs.add_pair(ConstraintPair::new(
            pvars.to_vec(),
            self.ts.full_assertion(),
            Expr::and(terms),
        ));
    }

    /// Core condition/implication of one edge. Returns the guard-side
    /// conjuncts and the implication conjuncts; callers extend both with
    /// kind-specific parts.
    fn edge_obligation(
        &self,
        source: LocationId,
        edge: usize,
        transition: &Transition,
    ) -> (Vec<Expr>, Vec<Expr>) {
        let this_f = &self.templates.ranking[source];
        let target_f = transition
            .update
            .apply(&self.templates.ranking[transition.target]);
        let g = &self.templates.step_weight[source][edge];
        let decrease = this_f
            .clone()
            .sub(target_f.clone())
            .mul(g.clone())
            .ge(Expr::int(1));

        let mut condition = vec![transition.guard.clone()];
        let mut implication = vec![decrease, target_f.ge(Expr::int(0))];
        if self.options.use_heuristic {
            condition.push(self.templates.heuristic[source].clone().ge(Expr::int(0)));
            implication.push(
                transition
                    .update
                    .apply(&self.templates.heuristic[transition.target])
                    .ge(Expr::int(0)),
            );
        }
        (condition, implication)
    }

    fn deterministic_pairs(&self, cs: &mut ConstraintSystem, pvars: &[String], i: LocationId) {
        let location = &self.ts.locations[i];
        for (j, transition) in location.transitions.iter().enumerate() {
            let (condition, implication) = self.edge_obligation(i, j, transition);
            cs.add_pair(
                ConstraintPair::new(
                    pvars.to_vec(),
                    Expr::and(condition),
                    Expr::and(implication),
                )
                .with_invariants(vec![location.invariant.clone()]),
            );
        }
    }

    /// The certificate must survive whichever edge the adversary selects,
    /// and whichever values its continuous inputs take: each transition is
    /// an independent pair, with the inputs universally quantified under
    /// their interval bounds.
    fn demonic_pairs(&self, cs: &mut ConstraintSystem, pvars: &[String], i: LocationId) {
        let location = &self.ts.locations[i];
        for (j, transition) in location.transitions.iter().enumerate() {
            let (mut condition, implication) = self.edge_obligation(i, j, transition);
            let mut forall = pvars.to_vec();
            if !transition.update.nondet_vars().is_empty() {
                condition.insert(1, transition.update.nondet_constraint());
                forall.extend(
                    transition
                        .update
                        .nondet_vars()
                        .iter()
                        .map(|nd| nd.name.clone()),
                );
            }
            cs.add_pair(
                ConstraintPair::new(forall, Expr::and(condition), Expr::and(implication))
                    .with_invariants(vec![location.invariant.clone()]),
            );
        }
    }

    /// Existential-as-last-disjunct: enumerate the choices in a fixed
    /// order, assume every earlier one fails to certify, and require the
    /// last to succeed. Sound because the guards are jointly exhaustive
    /// under the invariant (a well-formedness precondition of
    /// [`LocationKind::AngelicFinite`], stated there, not re-verified).
    fn angelic_finite_pair(&self, cs: &mut ConstraintSystem, pvars: &[String], i: LocationId) {
        let location = &self.ts.locations[i];
        let this_f = &self.templates.ranking[i];
        let last = location.transitions.len() - 1;

        let mut condition = Vec::with_capacity(location.transitions.len() + 1);
        for (j, transition) in location.transitions[..last].iter().enumerate() {
            let target_f = transition
                .update
                .apply(&self.templates.ranking[transition.target]);
            let g = &self.templates.step_weight[i][j];
            condition.push(Expr::or(vec![
                this_f
                    .clone()
                    .sub(target_f.clone())
                    .mul(g.clone())
                    .lt(Expr::int(1)),
                target_f.lt(Expr::int(0)),
            ]));
        }

        let (core_condition, implication) =
            self.edge_obligation(i, last, &location.transitions[last]);
        condition.extend(core_condition);
        cs.add_pair(
            ConstraintPair::new(
                pvars.to_vec(),
                Expr::and(condition),
                Expr::and(implication),
            )
            .with_invariants(vec![location.invariant.clone()]),
        );
    }

    /// A specific, template-defined choice must make progress: the
    /// location's single transition keeps its inputs free here, and the
    /// final witness substitution replaces them by `T`. The side pair
    /// keeps the substituted choice inside its interval bounds wherever
    /// the ranking is still nonnegative.
    fn angelic_infinite_pairs(&self, cs: &mut ConstraintSystem, pvars: &[String], i: LocationId) {
        let location = &self.ts.locations[i];
        let transition = &location.transitions[0];
        let mut choice = transition.update.nondet_constraint();
        if let Some(extra) = &transition.choice_constraint {
            choice = choice.and_also(extra.clone());
        }

        let (mut condition, implication) = self.edge_obligation(i, 0, transition);
        condition.insert(0, choice.clone());
        cs.add_pair(
            ConstraintPair::new(
                pvars.to_vec(),
                Expr::and(condition),
                Expr::and(implication),
            )
            .with_invariants(vec![location.invariant.clone()]),
        );

        cs.add_pair(ConstraintPair::new(
            pvars.to_vec(),
            self.templates.ranking[i].clone().ge(Expr::int(0)),
            choice,
        ));
    }

    /// Two-hop drift bound: `G(l,l1) − G(l1,l2) ≤ M` along every pair of
    /// consecutive edges, with the second hop expressed over the first
    /// hop's source state.
    fn drift_pairs(&self, cs: &mut ConstraintSystem, pvars: &[String]) {
        for (i, location) in self.ts.locations.iter().enumerate() {
            for (j1, t1) in location.transitions.iter().enumerate() {
                for (j2, t2) in self.ts.locations[t1.target].transitions.iter().enumerate() {
                    let g1 = self.templates.step_weight[i][j1].clone();
                    let g2 = t1.update.apply(&self.templates.step_weight[t1.target][j2]);
                    let guard2 = t1.update.apply(&t2.guard);
                    let drift = g1.sub(g2).le(Expr::var("M"));
                    let tinv1 = self.ts.target_invariant(t1, None);
                    let tinv2 = self.ts.target_invariant(t2, Some(t1.update.assignments()));

                    match location.kind {
                        LocationKind::AngelicInfinite => {
                            cs.add_pair(
                                ConstraintPair::new(
                                    pvars.to_vec(),
                                    Expr::and(vec![t1.guard.clone(), guard2]),
                                    Expr::and(vec![drift, t1.update.nondet_constraint()]),
                                )
                                .with_invariants(vec![location.invariant.clone()]),
                            );
                        }
                        LocationKind::Demonic => {
                            let mut forall = pvars.to_vec();
                            let mut condition = vec![t1.guard.clone(), guard2];
                            if !t1.update.nondet_vars().is_empty() {
                                condition.push(t1.update.nondet_constraint());
                                forall.extend(
                                    t1.update.nondet_vars().iter().map(|nd| nd.name.clone()),
                                );
                            }
                            cs.add_pair(
                                ConstraintPair::new(forall, Expr::and(condition), drift)
                                    .with_invariants(vec![
                                        location.invariant.clone(),
                                        tinv1,
                                        tinv2,
                                    ]),
                            );
                        }
                        LocationKind::Deterministic | LocationKind::AngelicFinite => {
                            cs.add_pair(
                                ConstraintPair::new(
                                    pvars.to_vec(),
                                    Expr::and(vec![t1.guard.clone(), guard2]),
                                    drift,
                                )
                                .with_invariants(vec![
                                    location.invariant.clone(),
                                    tinv1,
                                    tinv2,
                                ]),
                            );
                        }
                    }
                }
            }
        }
    }

    /// `G > 0` on every edge.
    fn positivity_pairs(&self, cs: &mut ConstraintSystem, pvars: &[String]) {
        for (i, location) in self.ts.locations.iter().enumerate() {
            for (j, transition) in location.transitions.iter().enumerate() {
                cs.add_pair(
                    ConstraintPair::new(
                        pvars.to_vec(),
                        transition.guard.clone(),
                        self.templates.step_weight[i][j].clone().gt(Expr::int(0)),
                    )
                    .with_invariants(vec![location.invariant.clone()]),
                );
            }
        }
    }
}

fn shape(prefix: &str, ts: &TransitionSystem, degree: u32) -> Expr {
    if degree <= 1 {
        template::linear(prefix, &ts.program_variables)
    } else {
        template::polynomial(prefix, &ts.program_variables, degree)
    }
}

fn create_templates(ts: &TransitionSystem, options: &SynthesisOptions) -> Templates {
    let degree = options.degree;
    let ranking: Vec<Expr> = (0..ts.locations.len())
        .map(|i| shape(&format!("f_{i}"), ts, degree))
        .collect();

    let step_weight: Vec<Vec<Expr>> = ts
        .locations
        .iter()
        .enumerate()
        .map(|(i, location)| {
            location
                .transitions
                .iter()
                .enumerate()
                .map(|(j, _)| match options.trivial_g {
                    Some(value) => Expr::num(value),
                    None => shape(&format!("g_{i}_{j}"), ts, degree),
                })
                .collect()
        })
        .collect();

    let mut witness = IndexMap::new();
    for (i, location) in ts.locations.iter().enumerate() {
        if location.kind != LocationKind::AngelicInfinite {
            continue;
        }
        for (j, nd) in location.transitions[0].update.nondet_vars().iter().enumerate() {
            witness.insert(
                (i, nd.name.clone()),
                shape(&format!("t_{i}_{j}"), ts, degree),
            );
        }
    }

    let heuristic: Vec<Expr> = if options.use_heuristic {
        (0..ts.locations.len())
            .map(|i| shape(&format!("h_{i}"), ts, degree))
            .collect()
    } else {
        Vec::new()
    };

    Templates {
        ranking,
        step_weight,
        witness,
        heuristic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_ir::system::{Location, NondetVar, Transition, Update, Variable};
    use indexmap::indexmap;

    fn trivial_g_options() -> SynthesisOptions {
        SynthesisOptions {
            trivial_g: Some(Rational64::from_integer(1)),
            ..SynthesisOptions::default()
        }
    }

    /// Demonic location with two transitions into a terminal location.
    fn demonic_system(edges: usize) -> TransitionSystem {
        let transitions = (0..edges)
            .map(|k| {
                Transition::new(
                    1,
                    Expr::var("x").gt(Expr::int(k as i64)),
                    Update::new(indexmap! {
                        "x".to_string() => Expr::var("x").sub(Expr::int(1)),
                    }),
                )
            })
            .collect();
        let l0 = Location::new(
            "arena",
            Expr::var("x").ge(Expr::int(0)),
            LocationKind::Demonic,
            transitions,
        );
        let l1 = Location::new("goal", Expr::truth(), LocationKind::Deterministic, vec![]);
        TransitionSystem::new(
            "demonic",
            indexmap! { "x".to_string() => Expr::var("x").ge(Expr::int(0)) },
            vec![l0, l1],
            0,
            vec![Variable::program("x")],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn demonic_location_emits_one_pair_per_transition() {
        let ts = demonic_system(2);
        let cs = Synthesizer::new(&ts, trivial_g_options())
            .constraint_system()
            .unwrap();
        // initial + one pair per adversarial edge
        assert_eq!(cs.pairs.len(), 3);

        let smaller = demonic_system(1);
        let cs_smaller = Synthesizer::new(&smaller, trivial_g_options())
            .constraint_system()
            .unwrap();
        assert_eq!(cs_smaller.pairs.len(), 2);
        // The surviving edge pair is unchanged by removing the other edge.
        assert_eq!(cs.pairs[1], cs_smaller.pairs[1]);
    }

    /// Angelic-finite location with three mutually exclusive guards.
    fn angelic_finite_system() -> TransitionSystem {
        let guards = [
            Expr::var("x").lt(Expr::int(0)),
            Expr::var("x").eq(Expr::int(0)),
            Expr::var("x").gt(Expr::int(0)),
        ];
        let transitions = guards
            .into_iter()
            .map(|g| {
                Transition::new(
                    1,
                    g,
                    Update::new(indexmap! {
                        "x".to_string() => Expr::var("x").sub(Expr::int(1)),
                    }),
                )
            })
            .collect();
        let l0 = Location::new("pick", Expr::truth(), LocationKind::AngelicFinite, transitions);
        let l1 = Location::new("goal", Expr::truth(), LocationKind::Deterministic, vec![]);
        TransitionSystem::new(
            "angelic",
            indexmap! { "x".to_string() => Expr::var("x").ge(Expr::int(0)) },
            vec![l0, l1],
            0,
            vec![Variable::program("x")],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn angelic_finite_emits_all_but_last_fail_antecedents() {
        let ts = angelic_finite_system();
        let cs = Synthesizer::new(&ts, trivial_g_options())
            .constraint_system()
            .unwrap();
        // initial + one pair for the whole location
        assert_eq!(cs.pairs.len(), 2);

        let pair = &cs.pairs[1];
        let Expr::And(antecedent) = &pair.condition else {
            panic!("expected conjunction antecedent");
        };
        // n-1 = 2 failure disjunctions, then the last transition's guard.
        assert_eq!(antecedent.len(), 3);
        assert!(matches!(antecedent[0], Expr::Or(_)));
        assert!(matches!(antecedent[1], Expr::Or(_)));
        assert_eq!(antecedent[2], Expr::var("x").gt(Expr::int(0)));

        let Expr::And(consequent) = &pair.implication else {
            panic!("expected conjunction consequent");
        };
        assert_eq!(consequent.len(), 2);
    }

    /// Angelic-infinite location: x decreases by a chosen fraction.
    fn angelic_infinite_system() -> TransitionSystem {
        let w = NondetVar::new("w", Rational64::new(1, 10), Rational64::from_integer(1));
        let l0 = Location::new(
            "choose",
            Expr::var("x").ge(Expr::int(0)),
            LocationKind::AngelicInfinite,
            vec![Transition::new(
                1,
                Expr::var("x").gt(Expr::int(0)),
                Update::with_nondet(
                    indexmap! { "x".to_string() => Expr::var("x").sub(Expr::var("w")) },
                    vec![w],
                ),
            )],
        );
        let l1 = Location::new("goal", Expr::truth(), LocationKind::Deterministic, vec![]);
        TransitionSystem::new(
            "angelic_inf",
            indexmap! { "x".to_string() => Expr::var("x").ge(Expr::int(1)) },
            vec![l0, l1],
            0,
            vec![Variable::program("x")],
            vec![Variable::auxiliary("w")],
        )
        .unwrap()
    }

    #[test]
    fn angelic_infinite_substitutes_witness_everywhere() {
        let ts = angelic_infinite_system();
        let synthesizer = Synthesizer::new(&ts, trivial_g_options());
        let cs = synthesizer.constraint_system().unwrap();
        // initial + edge pair + bounds side pair
        assert_eq!(cs.pairs.len(), 3);
        for pair in &cs.pairs {
            let mut vars = pair.condition.free_vars();
            pair.implication.collect_vars(&mut vars);
            assert!(!vars.contains("w"), "input leaked into {pair}");
        }
        // The witness template's coefficients do appear.
        let syms = cs.free_symbols();
        assert!(syms.contains("t_0_0_0"));
        assert!(syms.contains("t_0_0_1"));
    }

    #[test]
    fn witness_templates_are_per_input() {
        let ts = angelic_infinite_system();
        let synthesizer = Synthesizer::new(&ts, SynthesisOptions::default());
        assert_eq!(synthesizer.templates().witness.len(), 1);
        assert!(synthesizer
            .templates()
            .witness
            .contains_key(&(0usize, "w".to_string())));
    }

    /// Deterministic 2-location loop for the step-weight layers.
    fn two_location_loop() -> TransitionSystem {
        let l0 = Location::new(
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
        let l1 = Location::new(
            "back",
            Expr::var("x").ge(Expr::int(0)),
            LocationKind::Deterministic,
            vec![Transition::new(0, Expr::truth(), Update::identity())],
        );
        TransitionSystem::new(
            "loop",
            indexmap! { "x".to_string() => Expr::var("x").ge(Expr::int(0)) },
            vec![l0, l1],
            0,
            vec![Variable::program("x")],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn nontrivial_g_adds_drift_and_positivity_layers() {
        let ts = two_location_loop();
        let cs = Synthesizer::new(&ts, SynthesisOptions::default())
            .constraint_system()
            .unwrap();
        // initial + 2 edges + 2 two-hop drift pairs + 2 positivity pairs
        assert_eq!(cs.pairs.len(), 7);
        // The drift pairs mention M.
        assert!(cs
            .pairs
            .iter()
            .any(|p| p.implication.free_vars().contains("M")));

        let trivial = Synthesizer::new(&ts, trivial_g_options())
            .constraint_system()
            .unwrap();
        assert_eq!(trivial.pairs.len(), 3);
    }

    #[test]
    fn heuristic_narrows_antecedents_and_extends_consequents() {
        let ts = two_location_loop();
        let options = SynthesisOptions {
            use_heuristic: true,
            trivial_g: Some(Rational64::from_integer(1)),
            ..SynthesisOptions::default()
        };
        let cs = Synthesizer::new(&ts, options).constraint_system().unwrap();
        // Initial pair also requires H(init) >= 0.
        let Expr::And(init) = &cs.pairs[0].implication else {
            panic!("expected conjunction");
        };
        assert_eq!(init.len(), 2);
        // Edge pairs carry H >= 0 on both sides.
        let Expr::And(cond) = &cs.pairs[1].condition else {
            panic!("expected conjunction");
        };
        assert!(cond
            .iter()
            .any(|c| c.free_vars().iter().any(|v| v.starts_with("h_0"))));
        let Expr::And(imp) = &cs.pairs[1].implication else {
            panic!("expected conjunction");
        };
        assert_eq!(imp.len(), 3);
    }

    #[test]
    fn every_pair_records_its_source_invariant() {
        let ts = two_location_loop();
        let cs = Synthesizer::new(&ts, SynthesisOptions::default())
            .constraint_system()
            .unwrap();
        // All but the initial pair carry at least one invariant.
        for pair in &cs.pairs[1..] {
            assert!(!pair.invariants.is_empty());
        }
    }
}
