//! Per-role belief counts and the candidate-selection strategies over them.
//!
//! For every semantic role the dialog tracks a non-negative count per
//! candidate value (plus the sentinel "unfilled"). Counts only ever move by
//! dialog evidence; they are never reset mid-dialog. Sampling first
//! min-subtracts and mass-normalizes the counts so sparsely-observed values
//! do not look artificially confident, then delegates the pick to a
//! pluggable [`SelectionStrategy`].

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ontology::{Ontology, PredId};

use super::actions::{ActionCatalog, Role};

/// A candidate role value; `None` is the "unfilled" sentinel.
pub type Candidate = Option<PredId>;

/// Probability-weighted hypothesis over each role's value.
#[derive(Debug, Clone)]
pub struct BeliefState {
    counts: BTreeMap<Role, BTreeMap<Candidate, f64>>,
}

impl BeliefState {
    /// Fresh state with a uniform prior: for each role, every ontology entry
    /// whose type matches that role for any known action, plus the unfilled
    /// sentinel.
    pub fn new(ontology: &Ontology, catalog: &ActionCatalog) -> Self {
        let mut counts = BTreeMap::new();

        let mut action_candidates: BTreeMap<Candidate, f64> = BTreeMap::new();
        action_candidates.insert(None, 1.0);
        for schema in catalog.schemas() {
            if let Some(id) = ontology.lookup(schema.name) {
                action_candidates.insert(Some(id), 1.0);
            }
        }
        counts.insert(Role::Action, action_candidates);

        for role in [Role::Patient, Role::Recipient, Role::Source, Role::Goal] {
            let mut candidates: BTreeMap<Candidate, f64> = BTreeMap::new();
            candidates.insert(None, 1.0);
            for atom in catalog.atoms_for_role(role) {
                for id in ontology.entries_of_atom(atom) {
                    candidates.insert(Some(id), 1.0);
                }
            }
            counts.insert(role, candidates);
        }

        Self { counts }
    }

    /// Add credit to one candidate. Unknown candidates join the distribution
    /// at the credited value.
    pub fn add(&mut self, role: Role, candidate: Candidate, credit: f64) {
        let entry = self
            .counts
            .entry(role)
            .or_default()
            .entry(candidate)
            .or_insert(0.0);
        *entry += credit;
    }

    /// Subtract credit from one candidate, clamping at zero: counts are
    /// non-negative by construction.
    pub fn subtract(&mut self, role: Role, candidate: Candidate, credit: f64) {
        if let Some(entry) = self
            .counts
            .get_mut(&role)
            .and_then(|c| c.get_mut(&candidate))
        {
            *entry = (*entry - credit).max(0.0);
        }
    }

    /// The raw count for one candidate.
    pub fn count(&self, role: Role, candidate: Candidate) -> f64 {
        self.counts
            .get(&role)
            .and_then(|c| c.get(&candidate))
            .copied()
            .unwrap_or(0.0)
    }

    /// The min-subtracted, mass-normalized distribution for a role, in
    /// deterministic candidate order.
    ///
    /// When every count is equal (the fresh-prior case) the distribution has
    /// no mass at all: nothing has been observed, so nothing is confident.
    pub fn distribution(&self, role: Role) -> Vec<(Candidate, f64)> {
        let Some(counts) = self.counts.get(&role) else {
            return Vec::new();
        };
        let min = counts.values().copied().fold(f64::INFINITY, f64::min);
        let adjusted: Vec<(Candidate, f64)> =
            counts.iter().map(|(&c, &v)| (c, v - min)).collect();
        let mass: f64 = adjusted.iter().map(|(_, v)| v).sum();
        if mass <= 0.0 {
            return adjusted.into_iter().map(|(c, _)| (c, 0.0)).collect();
        }
        adjusted.into_iter().map(|(c, v)| (c, v / mass)).collect()
    }

    /// Sample a role's current best candidate through a strategy.
    pub fn sample(&self, role: Role, strategy: &mut dyn SelectionStrategy) -> (Candidate, f64) {
        strategy.select(&self.distribution(role))
    }
}

// ---------------------------------------------------------------------------
// Selection strategies
// ---------------------------------------------------------------------------

/// How to pick a candidate from a normalized belief distribution.
pub trait SelectionStrategy: Send {
    fn select(&mut self, dist: &[(Candidate, f64)]) -> (Candidate, f64);
}

/// Deterministic arg-max selection; ties break to the first candidate in
/// distribution order.
#[derive(Debug, Default)]
pub struct ArgMax;

impl SelectionStrategy for ArgMax {
    fn select(&mut self, dist: &[(Candidate, f64)]) -> (Candidate, f64) {
        let mut best: (Candidate, f64) = (None, 0.0);
        for &(candidate, p) in dist {
            if p > best.1 {
                best = (candidate, p);
            }
        }
        best
    }
}

/// Categorical sampling proportional to the distribution's mass, with a
/// seeded generator for reproducibility.
#[derive(Debug)]
pub struct WeightedRandom {
    rng: StdRng,
}

impl WeightedRandom {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SelectionStrategy for WeightedRandom {
    fn select(&mut self, dist: &[(Candidate, f64)]) -> (Candidate, f64) {
        let mass: f64 = dist.iter().map(|(_, p)| p).sum();
        if mass <= 0.0 {
            return (None, 0.0);
        }
        let mut draw = self.rng.gen_range(0.0..mass);
        for &(candidate, p) in dist {
            if draw < p {
                return (candidate, p);
            }
            draw -= p;
        }
        // Floating-point remainder: fall back to the last candidate.
        dist.last().map(|&(c, p)| (c, p)).unwrap_or((None, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::{OntEntry, PredCategory, SemType};

    fn test_ontology() -> Ontology {
        let entry = |name: &str, ty: &str, category| OntEntry {
            name: name.into(),
            ty: SemType::parse(ty).unwrap(),
            category,
        };
        Ontology::new(vec![
            entry("walk", "<l,a>", PredCategory::Action),
            entry("bring", "<i,<p,a>>", PredCategory::Action),
            entry("move", "<i,<l,<l,a>>>", PredCategory::Action),
            entry("oidx_1", "i", PredCategory::Entity),
            entry("oidx_2", "i", PredCategory::Entity),
            entry("dave", "p", PredCategory::Entity),
            entry("kitchen", "l", PredCategory::Entity),
        ])
        .unwrap()
    }

    fn fresh() -> (Ontology, BeliefState) {
        let ont = test_ontology();
        let belief = BeliefState::new(&ont, &ActionCatalog::standard());
        (ont, belief)
    }

    #[test]
    fn fresh_state_has_no_mass() {
        let (_, belief) = fresh();
        for role in Role::PRIORITY {
            let dist = belief.distribution(role);
            assert!(!dist.is_empty(), "{role} should have candidates");
            assert!(dist.iter().all(|(_, p)| *p == 0.0));
        }
    }

    #[test]
    fn prior_candidates_match_role_types() {
        let (ont, belief) = fresh();
        let patient = belief.distribution(Role::Patient);
        // oidx_1, oidx_2, and the sentinel.
        assert_eq!(patient.len(), 3);
        assert!(patient.iter().any(|(c, _)| *c == ont.lookup("oidx_1")));
        assert!(patient.iter().any(|(c, _)| c.is_none()));
        assert!(!patient.iter().any(|(c, _)| *c == ont.lookup("dave")));
    }

    #[test]
    fn evidence_shifts_the_distribution() {
        let (ont, mut belief) = fresh();
        let oidx_1 = ont.lookup("oidx_1");
        belief.add(Role::Patient, oidx_1, 1.0);

        let dist = belief.distribution(Role::Patient);
        let (best, p) = ArgMax.select(&dist);
        assert_eq!(best, oidx_1);
        assert!((p - 1.0).abs() < 1e-9, "all mass on the only evidence");
    }

    #[test]
    fn counts_never_go_negative() {
        let (ont, mut belief) = fresh();
        let oidx_1 = ont.lookup("oidx_1");
        belief.add(Role::Patient, oidx_1, 0.3);
        belief.subtract(Role::Patient, oidx_1, 2.0);
        belief.subtract(Role::Patient, oidx_1, 2.0);
        assert_eq!(belief.count(Role::Patient, oidx_1), 0.0);
    }

    #[test]
    fn min_subtraction_discounts_the_shared_floor() {
        let (ont, mut belief) = fresh();
        let oidx_1 = ont.lookup("oidx_1");
        let oidx_2 = ont.lookup("oidx_2");
        belief.add(Role::Patient, oidx_1, 2.0);
        belief.add(Role::Patient, oidx_2, 1.0);

        let dist = belief.distribution(Role::Patient);
        let p1 = dist.iter().find(|(c, _)| *c == oidx_1).unwrap().1;
        let p2 = dist.iter().find(|(c, _)| *c == oidx_2).unwrap().1;
        // Floor (the untouched sentinel) subtracted: 2/3 vs 1/3.
        assert!((p1 - 2.0 / 3.0).abs() < 1e-9);
        assert!((p2 - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn argmax_breaks_ties_deterministically() {
        let dist = vec![(None, 0.4), (Some(PredId::new(1)), 0.4)];
        let mut strategy = ArgMax;
        assert_eq!(strategy.select(&dist), (None, 0.4));
    }

    #[test]
    fn weighted_random_is_reproducible_and_respects_mass() {
        let a = Some(PredId::new(1));
        let b = Some(PredId::new(2));
        let dist = vec![(a, 0.9), (b, 0.1)];

        let picks_1: Vec<Candidate> = {
            let mut s = WeightedRandom::seeded(11);
            (0..20).map(|_| s.select(&dist).0).collect()
        };
        let picks_2: Vec<Candidate> = {
            let mut s = WeightedRandom::seeded(11);
            (0..20).map(|_| s.select(&dist).0).collect()
        };
        assert_eq!(picks_1, picks_2);

        let a_count = picks_1.iter().filter(|c| **c == a).count();
        assert!(a_count > 10, "mass-0.9 candidate picked {a_count}/20 times");
    }

    #[test]
    fn weighted_random_with_no_mass_is_unfilled() {
        let mut s = WeightedRandom::seeded(3);
        assert_eq!(s.select(&[(Some(PredId::new(1)), 0.0)]), (None, 0.0));
        assert_eq!(s.select(&[]), (None, 0.0));
    }
}
