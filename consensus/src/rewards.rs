//! Reward distribution.
//!
//! The whole per-sub-block reward is always paid out: integer-division
//! remainders go to the proposer. Shares are sorted by validator id and
//! zero shares are dropped, so identical inputs give identical output.

use meridian_store::RewardShare;
use meridian_types::{RewardDistributionMode, ValidatorId};

use crate::selection::Candidate;

const PPM: f64 = 1_000_000.0;

/// Split `reward` among `validators` according to `mode`.
///
/// `proposer` always receives at least the remainder. If the proportional
/// modes find zero total weight, the proposer gets everything.
pub fn distribute(
    mode: RewardDistributionMode,
    proposer: &ValidatorId,
    validators: &[Candidate],
    reward: u128,
) -> Vec<RewardShare> {
    if reward == 0 {
        return Vec::new();
    }
    let weights: Vec<(ValidatorId, u128)> = match mode {
        RewardDistributionMode::ProposerOnly => vec![(proposer.clone(), 1)],
        RewardDistributionMode::EqualSplit => validators.iter().map(|c| (c.id.clone(), 1)).collect(),
        RewardDistributionMode::StakeWeighted => {
            validators.iter().map(|c| (c.id.clone(), c.weight)).collect()
        }
        RewardDistributionMode::ParticipationWeighted => validators
            .iter()
            .map(|c| (c.id.clone(), (c.participation.clamp(0.0, 1.0) * PPM).round() as u128))
            .collect(),
    };
    split(proposer, &weights, reward)
}

fn split(proposer: &ValidatorId, weights: &[(ValidatorId, u128)], reward: u128) -> Vec<RewardShare> {
    let total = weights.iter().map(|(_, w)| *w).fold(0u128, u128::saturating_add);
    if total == 0 {
        return vec![RewardShare {
            validator: proposer.clone(),
            amount: reward,
        }];
    }

    let mut shares: Vec<RewardShare> = weights
        .iter()
        .map(|(id, w)| RewardShare {
            validator: id.clone(),
            amount: mul_div(reward, *w, total),
        })
        .collect();
    let paid = shares.iter().map(|s| s.amount).fold(0u128, u128::saturating_add);
    let remainder = reward.saturating_sub(paid);
    if remainder > 0 {
        match shares.iter_mut().find(|s| &s.validator == proposer) {
            Some(s) => s.amount += remainder,
            None => shares.push(RewardShare {
                validator: proposer.clone(),
                amount: remainder,
            }),
        }
    }
    shares.retain(|s| s.amount > 0);
    shares.sort_by(|a, b| a.validator.cmp(&b.validator));
    shares
}

/// `a * b / c` without overflowing for realistic stakes; never exceeds `a`
/// when `b <= c`.
fn mul_div(a: u128, b: u128, c: u128) -> u128 {
    match a.checked_mul(b) {
        Some(v) => v / c,
        None => (a / c).saturating_mul(b),
    }
}
