//! Example transition-system generators.
//!
//! The bucket game: an adversary pours one unit of liquid per round into a
//! ring of buckets of volume `2 - eps`, an opponent then empties two
//! adjacent buckets; the certificate proves the adversary forces an
//! overflow. `bucket-game` is the precalculated-strategy variant (the
//! pour is split deterministically by guard), `bucket-game-split` leaves
//! the split as a continuous angelic choice with a "fractions sum to 1"
//! coupling. `nondet-loop` is a small loop whose counter is bumped by a
//! bounded adversarial amount each round.

use indexmap::IndexMap;
use num::rational::Rational64;
use thiserror::Error;

use gambit_ir::expr::Expr;
use gambit_ir::system::{
    Location, LocationKind, NondetVar, SystemError, Transition, TransitionSystem, Update,
    Variable,
};

pub(crate) const EXAMPLES: &[&str] = &["bucket-game", "bucket-game-split", "nondet-loop"];

#[derive(Debug, Error)]
pub(crate) enum ExampleError {
    #[error("unknown system `{0}` (available: bucket-game, bucket-game-split, nondet-loop)")]
    UnknownSystem(String),
    #[error("bucket games need at least 4 buckets, got {0}")]
    TooFewBuckets(usize),
    #[error(transparent)]
    System(#[from] SystemError),
}

pub(crate) fn by_name(
    name: &str,
    eps: Rational64,
    buckets: usize,
) -> Result<TransitionSystem, ExampleError> {
    match name {
        "bucket-game" => bucket_game(eps, buckets),
        "bucket-game-split" => bucket_game_split(eps, buckets),
        "nondet-loop" => nondet_loop(),
        other => Err(ExampleError::UnknownSystem(other.to_string())),
    }
}

fn bucket_vars(n: usize) -> Result<Vec<Variable>, ExampleError> {
    if n < 4 {
        return Err(ExampleError::TooFewBuckets(n));
    }
    Ok((0..n).map(|i| Variable::program(format!("b{i}"))).collect())
}

fn bucket(i: usize) -> Expr {
    Expr::var(format!("b{i}"))
}

fn all_nonnegative(n: usize) -> Expr {
    Expr::and((0..n).map(|i| bucket(i).ge(Expr::int(0))).collect())
}

fn all_capped(n: usize, cap: Rational64) -> Expr {
    Expr::and((0..n).map(|i| bucket(i).le(Expr::num(cap))).collect())
}

fn overflow(n: usize, cap: Rational64) -> Expr {
    Expr::or((0..n).map(|i| bucket(i).gt(Expr::num(cap))).collect())
}

fn zero_assertion(n: usize) -> IndexMap<String, Expr> {
    (0..n)
        .map(|i| (format!("b{i}"), bucket(i).eq(Expr::int(0))))
        .collect()
}

/// The opponent's location and the overflow sink, shared by both bucket
/// variants: the opponent may empty any two adjacent buckets while no
/// bucket overflows; once one does, play moves to the terminal sink.
fn opponent_and_sink(
    n: usize,
    cap: Rational64,
    eps: Rational64,
    filler: usize,
    sink: usize,
) -> (Location, Location) {
    let brim = Rational64::from_integer(1) - eps;
    let opponent_invariant = Expr::and(vec![
        all_nonnegative(n),
        Expr::or(vec![
            bucket(1).gt(Expr::num(cap)),
            bucket(3).gt(Expr::num(cap)),
            bucket(1).eq(bucket(3)),
        ]),
        Expr::or(vec![
            bucket(1).gt(Expr::num(cap)),
            bucket(3).gt(Expr::num(cap)),
            Expr::and(vec![
                bucket(1).gt(Expr::num(brim)),
                bucket(3).gt(Expr::num(brim)),
            ]),
        ])
        .not(),
    ]);

    let mut transitions = Vec::with_capacity(n + 1);
    for i in 0..n {
        let mut empty_two = IndexMap::new();
        empty_two.insert(format!("b{i}"), Expr::int(0));
        empty_two.insert(format!("b{}", (i + 1) % n), Expr::int(0));
        transitions.push(Transition::new(
            filler,
            all_capped(n, cap),
            Update::new(empty_two),
        ));
    }
    transitions.push(Transition::new(
        sink,
        overflow(n, cap),
        Update::identity(),
    ));

    let opponent = Location::new(
        "emptier",
        opponent_invariant,
        LocationKind::Demonic,
        transitions,
    );
    let goal = Location::new(
        "overflow",
        all_nonnegative(n),
        LocationKind::Deterministic,
        vec![],
    );
    (opponent, goal)
}

/// Precalculated-strategy bucket game: the pour targets buckets 1 and 3,
/// with the three-way guard split standing in for the continuous choice.
fn bucket_game(eps: Rational64, n: usize) -> Result<TransitionSystem, ExampleError> {
    let vars = bucket_vars(n)?;
    let cap = Rational64::from_integer(2) - eps;
    let brim = Rational64::from_integer(1) - eps;

    let filler_invariant = Expr::and(vec![
        all_nonnegative(n),
        all_capped(n, cap),
        bucket(1).le(Expr::num(brim)),
        bucket(3).le(Expr::num(brim)),
    ]);
    let half = Expr::rat(1, 2);
    let balanced = half.mul(Expr::sum(vec![bucket(1), bucket(3), Expr::int(1)]));
    let transitions = vec![
        Transition::new(
            1,
            bucket(1).gt(Expr::num(brim)),
            Update::new(IndexMap::from_iter([(
                "b1".to_string(),
                bucket(1).add(Expr::int(1)),
            )])),
        ),
        Transition::new(
            1,
            bucket(3).gt(Expr::num(brim)),
            Update::new(IndexMap::from_iter([(
                "b3".to_string(),
                bucket(3).add(Expr::int(1)),
            )])),
        ),
        Transition::new(
            1,
            Expr::and(vec![
                bucket(1).le(Expr::num(brim)),
                bucket(3).le(Expr::num(brim)),
            ]),
            Update::new(IndexMap::from_iter([
                ("b1".to_string(), balanced.clone()),
                ("b3".to_string(), balanced),
            ])),
        ),
    ];
    let filler = Location::new(
        "filler",
        filler_invariant,
        LocationKind::Deterministic,
        transitions,
    );
    let (opponent, goal) = opponent_and_sink(n, cap, eps, 0, 2);

    Ok(TransitionSystem::new(
        "bucket_game",
        zero_assertion(n),
        vec![filler, opponent, goal],
        0,
        vars,
        vec![],
    )?)
}

/// Continuous-split bucket game: the pour is an angelic choice of `n`
/// fractions in `[0, 1]` summing to 1.
fn bucket_game_split(eps: Rational64, n: usize) -> Result<TransitionSystem, ExampleError> {
    let vars = bucket_vars(n)?;
    let cap = Rational64::from_integer(2) - eps;

    let splits: Vec<NondetVar> = (0..n)
        .map(|i| {
            NondetVar::new(
                format!("w{i}"),
                Rational64::from_integer(0),
                Rational64::from_integer(1),
            )
        })
        .collect();
    let assignments: IndexMap<String, Expr> = (0..n)
        .map(|i| {
            (
                format!("b{i}"),
                bucket(i).add(Expr::var(format!("w{i}"))),
            )
        })
        .collect();
    let unit_split = Expr::sum((0..n).map(|i| Expr::var(format!("w{i}"))).collect())
        .eq(Expr::int(1));
    let pour = Transition::new(1, Expr::truth(), Update::with_nondet(assignments, splits))
        .with_choice_constraint(unit_split);

    let filler = Location::new(
        "filler",
        Expr::and(vec![all_nonnegative(n), all_capped(n, cap)]),
        LocationKind::AngelicInfinite,
        vec![pour],
    );
    let (opponent, goal) = opponent_and_sink(n, cap, eps, 0, 2);
    let aux = (0..n).map(|i| Variable::auxiliary(format!("w{i}"))).collect();

    Ok(TransitionSystem::new(
        "bucket_game_split",
        zero_assertion(n),
        vec![filler, opponent, goal],
        0,
        vars,
        aux,
    )?)
}

/// Loop whose counter is bumped by an adversarially chosen amount in
/// [1/10, 1/5] each round until it passes `x`.
fn nondet_loop() -> Result<TransitionSystem, ExampleError> {
    let branch = Location::new(
        "branch",
        Expr::truth(),
        LocationKind::Deterministic,
        vec![
            Transition::new(
                1,
                Expr::var("i").le(Expr::var("x")),
                Update::identity(),
            ),
            Transition::new(
                2,
                Expr::var("i").gt(Expr::var("x")),
                Update::identity(),
            ),
        ],
    );
    let bump = Location::new(
        "bump",
        Expr::truth(),
        LocationKind::Demonic,
        vec![Transition::new(
            0,
            Expr::truth(),
            Update::with_nondet(
                IndexMap::from_iter([(
                    "i".to_string(),
                    Expr::var("i").add(Expr::var("w")),
                )]),
                vec![NondetVar::new(
                    "w",
                    Rational64::new(1, 10),
                    Rational64::new(1, 5),
                )],
            ),
        )],
    );
    let done = Location::new("done", Expr::truth(), LocationKind::Deterministic, vec![]);

    let assertion = IndexMap::from_iter([
        ("x".to_string(), Expr::var("x").gt(Expr::int(0))),
        ("i".to_string(), Expr::var("i").eq(Expr::int(1))),
    ]);
    Ok(TransitionSystem::new(
        "nondet_loop",
        assertion,
        vec![branch, bump, done],
        0,
        vec![Variable::program("x"), Variable::program("i")],
        vec![Variable::auxiliary("w")],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eps() -> Rational64 {
        Rational64::new(1, 5)
    }

    #[test]
    fn all_examples_build() {
        for name in EXAMPLES {
            by_name(name, eps(), 5).unwrap();
        }
    }

    #[test]
    fn unknown_example_is_reported() {
        assert!(matches!(
            by_name("tower-of-hanoi", eps(), 5),
            Err(ExampleError::UnknownSystem(_))
        ));
    }

    #[test]
    fn bucket_game_needs_enough_buckets() {
        assert!(matches!(
            by_name("bucket-game", eps(), 3),
            Err(ExampleError::TooFewBuckets(3))
        ));
    }

    #[test]
    fn bucket_game_shape() {
        let ts = by_name("bucket-game", eps(), 5).unwrap();
        assert_eq!(ts.locations.len(), 3);
        assert_eq!(ts.locations[0].kind, LocationKind::Deterministic);
        assert_eq!(ts.locations[0].transitions.len(), 3);
        assert_eq!(ts.locations[1].kind, LocationKind::Demonic);
        // One emptying move per adjacent pair plus the overflow edge.
        assert_eq!(ts.locations[1].transitions.len(), 6);
        assert!(ts.locations[2].is_terminal());
    }

    #[test]
    fn split_variant_is_angelic_infinite_with_coupling() {
        let ts = by_name("bucket-game-split", eps(), 5).unwrap();
        assert_eq!(ts.locations[0].kind, LocationKind::AngelicInfinite);
        let pour = &ts.locations[0].transitions[0];
        assert_eq!(pour.update.nondet_vars().len(), 5);
        assert!(pour.choice_constraint.is_some());
    }

    #[test]
    fn nondet_loop_bump_is_demonic_with_bounded_input() {
        let ts = by_name("nondet-loop", eps(), 5).unwrap();
        assert_eq!(ts.locations[1].kind, LocationKind::Demonic);
        let nd = &ts.locations[1].transitions[0].update.nondet_vars()[0];
        assert_eq!(nd.lo, Rational64::new(1, 10));
        assert_eq!(nd.hi, Rational64::new(1, 5));
    }
}
