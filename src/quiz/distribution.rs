//! Weighted question distribution across mastery buckets
//!
//! Weak topics get most of the quiz: 60% of the questions go to
//! `failed`/`medium` (split 60/40) and the remaining 40% to
//! `pending`/`mastered` (split 60/40), i.e. 36/24/24/16 percent.
//!
//! After rounding, quotas are corrected in three steps:
//! - rounding overshoot is taken back from the lowest-priority buckets
//! - shortfall is added one unit at a time to the first non-empty bucket
//!   in priority order (`failed`, `medium`, `pending`, `mastered`)
//! - quota above a bucket's topic count cascades to the next bucket down;
//!   `mastered` has nothing below it, so its excess is capped
//!
//! Topics are then drawn without replacement (shuffled) and each gets one
//! question; whatever is still unassigned goes round-robin over the drawn
//! topics in priority order, so the plan always sums to the requested total.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::DistributionError;
use crate::topics::{TopicBuckets, TopicRecord, TopicStatus};

/// Share of the total per bucket, in [`TopicStatus::PRIORITY`] order.
const BUCKET_WEIGHTS: [f64; 4] = [0.36, 0.24, 0.24, 0.16];

/// One topic and how many questions it receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    #[serde(flatten)]
    pub topic: TopicRecord,
    pub question_count: usize,
}

/// Per-bucket allocations. `total()` always equals the requested total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionPlan {
    pub total_questions: usize,
    pub failed: Vec<Allocation>,
    pub medium: Vec<Allocation>,
    pub pending: Vec<Allocation>,
    pub mastered: Vec<Allocation>,
}

impl DistributionPlan {
    fn empty(total_questions: usize) -> Self {
        Self {
            total_questions,
            ..Self::default()
        }
    }

    pub fn bucket(&self, status: TopicStatus) -> &[Allocation] {
        match status {
            TopicStatus::Failed => &self.failed,
            TopicStatus::Medium => &self.medium,
            TopicStatus::Pending => &self.pending,
            TopicStatus::Mastered => &self.mastered,
        }
    }

    fn bucket_mut(&mut self, status: TopicStatus) -> &mut Vec<Allocation> {
        match status {
            TopicStatus::Failed => &mut self.failed,
            TopicStatus::Medium => &mut self.medium,
            TopicStatus::Pending => &mut self.pending,
            TopicStatus::Mastered => &mut self.mastered,
        }
    }

    /// Allocations in priority order, tagged with their bucket.
    pub fn iter(&self) -> impl Iterator<Item = (TopicStatus, &Allocation)> {
        TopicStatus::PRIORITY
            .into_iter()
            .flat_map(move |s| self.bucket(s).iter().map(move |a| (s, a)))
    }

    /// Sum of all question counts.
    pub fn total(&self) -> usize {
        self.iter().map(|(_, a)| a.question_count).sum()
    }

    /// Question count per bucket, in priority order.
    pub fn bucket_totals(&self) -> [usize; 4] {
        TopicStatus::PRIORITY.map(|s| self.bucket(s).iter().map(|a| a.question_count).sum())
    }

    pub fn topic_count(&self) -> usize {
        self.iter().count()
    }
}

/// Rounded 36/24/24/16 split of `total`.
pub fn base_quotas(total: usize) -> [usize; 4] {
    BUCKET_WEIGHTS.map(|w| (total as f64 * w).round() as usize)
}

/// Bring the quota sum to exactly `total`.
///
/// Overshoot from rounding is removed starting at `mastered`; shortfall is
/// added to the first bucket that has topics. Stops early if every bucket
/// is empty.
pub fn correct_shortfall(
    mut quotas: [usize; 4],
    capacities: [usize; 4],
    total: usize,
) -> [usize; 4] {
    while quotas.iter().sum::<usize>() > total {
        match quotas.iter().rposition(|q| *q > 0) {
            Some(idx) => quotas[idx] -= 1,
            None => break,
        }
    }

    while quotas.iter().sum::<usize>() < total {
        match capacities.iter().position(|c| *c > 0) {
            Some(idx) => quotas[idx] += 1,
            None => break,
        }
    }

    quotas
}

/// Push quota above each bucket's topic count down the priority order.
pub fn cascade_capacity(mut quotas: [usize; 4], capacities: [usize; 4]) -> [usize; 4] {
    for idx in 0..quotas.len() {
        if quotas[idx] <= capacities[idx] {
            continue;
        }
        let excess = quotas[idx] - capacities[idx];
        quotas[idx] = capacities[idx];
        if let Some(next) = quotas.get_mut(idx + 1) {
            *next += excess;
        } else {
            debug!("Dropping {} excess quota from the last bucket", excess);
        }
    }
    quotas
}

/// Compute a plan using the thread-local RNG.
pub fn plan_distribution(
    buckets: &TopicBuckets,
    total_questions: usize,
    prioritize_weak_and_medium_topics: bool,
) -> Result<DistributionPlan, DistributionError> {
    plan_distribution_with_rng(
        buckets,
        total_questions,
        prioritize_weak_and_medium_topics,
        &mut rand::rng(),
    )
}

pub fn plan_distribution_with_rng<R: Rng + ?Sized>(
    buckets: &TopicBuckets,
    total_questions: usize,
    prioritize_weak_and_medium_topics: bool,
    rng: &mut R,
) -> Result<DistributionPlan, DistributionError> {
    if total_questions == 0 {
        return Err(DistributionError::InvalidTotal(total_questions));
    }
    if buckets.is_empty() {
        return Err(DistributionError::NoTopics);
    }

    let plan = if prioritize_weak_and_medium_topics {
        weighted_plan(buckets, total_questions, rng)
    } else {
        even_plan(buckets, total_questions, rng)
    };

    debug!(
        "Planned {} questions over {} topics (per bucket: {:?})",
        plan.total(),
        plan.topic_count(),
        plan.bucket_totals()
    );
    Ok(plan)
}

fn weighted_plan<R: Rng + ?Sized>(
    buckets: &TopicBuckets,
    total: usize,
    rng: &mut R,
) -> DistributionPlan {
    let capacities = TopicStatus::PRIORITY.map(|s| buckets.bucket(s).len());
    let base = base_quotas(total);
    let corrected = correct_shortfall(base, capacities, total);
    let quotas = cascade_capacity(corrected, capacities);
    debug!(
        "Bucket quotas: base {:?}, corrected {:?}, after capacity {:?} (capacities {:?})",
        base, corrected, quotas, capacities
    );

    let mut plan = DistributionPlan::empty(total);
    for (idx, status) in TopicStatus::PRIORITY.into_iter().enumerate() {
        let mut pool: Vec<&TopicRecord> = buckets.bucket(status).iter().collect();
        pool.shuffle(rng);
        plan.bucket_mut(status).extend(pool.into_iter().take(quotas[idx]).map(|topic| {
            Allocation {
                topic: topic.clone(),
                question_count: 1,
            }
        }));
    }

    spread_remainder(&mut plan, total);
    plan
}

fn even_plan<R: Rng + ?Sized>(
    buckets: &TopicBuckets,
    total: usize,
    rng: &mut R,
) -> DistributionPlan {
    let mut pool: Vec<(TopicStatus, &TopicRecord)> = TopicStatus::PRIORITY
        .into_iter()
        .flat_map(|s| buckets.bucket(s).iter().map(move |t| (s, t)))
        .collect();
    pool.shuffle(rng);
    pool.truncate(total);

    let mut plan = DistributionPlan::empty(total);
    for (status, topic) in pool {
        plan.bucket_mut(status).push(Allocation {
            topic: topic.clone(),
            question_count: 1,
        });
    }

    spread_remainder(&mut plan, total);
    plan
}

/// Hand out `total - plan.total()` one at a time, cycling over the
/// allocations in priority order.
fn spread_remainder(plan: &mut DistributionPlan, total: usize) {
    let mut remaining = total.saturating_sub(plan.total());
    if remaining == 0 || plan.topic_count() == 0 {
        return;
    }

    while remaining > 0 {
        for status in TopicStatus::PRIORITY {
            for allocation in plan.bucket_mut(status).iter_mut() {
                if remaining == 0 {
                    return;
                }
                allocation.question_count += 1;
                remaining -= 1;
            }
        }
    }
}
