//! Validator selection strategies.
//!
//! All strategies work on the same input: eligible candidates sorted by
//! id, each with its selection weight. Sorting first makes every strategy
//! independent of registry iteration order.

use meridian_types::ValidatorId;

/// An eligible validator as seen by the selection strategies.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub id: ValidatorId,
    /// Raw stake, or the effective weight when dynamic stake is on.
    pub weight: u128,
    pub participation: f64,
}

/// Deterministic stake-weighted pick.
///
/// `seed % total_weight` is walked through the cumulative weights. Zero
/// weight candidates occupy no range and are never picked. Returns `None`
/// if the total weight is zero.
pub fn stake_weighted(candidates: &[Candidate], seed: u64) -> Option<&Candidate> {
    let total: u128 = candidates.iter().map(|c| c.weight).fold(0u128, u128::saturating_add);
    if total == 0 {
        return None;
    }
    let point = seed as u128 % total;
    let mut cumulative: u128 = 0;
    for c in candidates {
        cumulative = cumulative.saturating_add(c.weight);
        if point < cumulative {
            return Some(c);
        }
    }
    candidates.iter().rev().find(|c| c.weight > 0)
}

/// Cycling cursor shared by every round-robin caller.
#[derive(Debug, Default)]
pub struct RoundRobinCursor {
    next: u64,
}

impl RoundRobinCursor {
    /// Index of the next pick among `len` candidates; `None` if empty.
    pub fn advance(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let idx = (self.next % len as u64) as usize;
        self.next = self.next.wrapping_add(1);
        Some(idx)
    }
}

/// Scoring rule for hybrid selection. Highest score wins.
pub trait HybridPolicy: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, candidate: &Candidate) -> f64;
}

/// Default hybrid rule: `weight × participation`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParticipationWeightedStake;

impl HybridPolicy for ParticipationWeightedStake {
    fn name(&self) -> &str {
        "participation_weighted_stake"
    }

    fn score(&self, candidate: &Candidate) -> f64 {
        candidate.weight as f64 * candidate.participation
    }
}

/// Candidates sharing the best score, in input order.
pub fn best_scoring<'a>(candidates: &'a [Candidate], policy: &dyn HybridPolicy) -> Vec<&'a Candidate> {
    let scored: Vec<(f64, &Candidate)> = candidates
        .iter()
        .map(|c| (policy.score(c), c))
        .filter(|(s, _)| s.is_finite())
        .collect();
    let Some(best) = scored.iter().map(|(s, _)| *s).reduce(f64::max) else {
        return Vec::new();
    };
    scored
        .into_iter()
        .filter(|(s, _)| *s == best)
        .map(|(_, c)| c)
        .collect()
}
