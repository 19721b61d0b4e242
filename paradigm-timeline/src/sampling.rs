//! Randomization and sampling — the functions that decide trial order.
//!
//! Every function takes the caller's random source as `&mut R`, so a seeded
//! generator can be substituted wholesale for reproducible experiments; the
//! runner owns one `StdRng` that all engine randomness funnels through.
//!
//! Argument errors (oversized samples, malformed weights) are reported
//! immediately as [`SamplingError`]s. The one deliberate exception is
//! [`repeat`], whose permissive handling of mismatched lengths is part of
//! its contract — degradations warn instead of failing.

use paradigm0::error::SamplingError;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::hash::Hash;
use tracing::warn;

/// Uniform random permutation (Fisher–Yates) of a cloned sequence.
pub fn shuffle<T: Clone, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Vec<T> {
    let mut out = items.to_vec();
    out.shuffle(rng);
    out
}

/// A random sample of `size` distinct items: shuffle, take the first `size`.
pub fn sample_without_replacement<T: Clone, R: Rng + ?Sized>(
    items: &[T],
    size: usize,
    rng: &mut R,
) -> Result<Vec<T>, SamplingError> {
    if size > items.len() {
        return Err(SamplingError::SampleTooLarge {
            requested: size,
            available: items.len(),
        });
    }
    let mut out = shuffle(items, rng);
    out.truncate(size);
    Ok(out)
}

/// `size` independent draws, optionally weighted.
///
/// Weights are normalized to sum 1 and consumed via cumulative-distribution
/// inversion, so any positive weights work regardless of scale.
pub fn sample_with_replacement<T: Clone, R: Rng + ?Sized>(
    items: &[T],
    size: usize,
    weights: Option<&[f64]>,
    rng: &mut R,
) -> Result<Vec<T>, SamplingError> {
    if items.is_empty() {
        return Err(SamplingError::InvalidWeights(
            "cannot sample from an empty sequence".into(),
        ));
    }
    let normalized: Vec<f64> = match weights {
        Some(w) => {
            if w.len() != items.len() {
                return Err(SamplingError::WeightLengthMismatch {
                    weights: w.len(),
                    items: items.len(),
                });
            }
            if w.iter().any(|&x| x < 0.0) {
                return Err(SamplingError::InvalidWeights(
                    "weights must be non-negative".into(),
                ));
            }
            let sum: f64 = w.iter().sum();
            if sum <= 0.0 {
                return Err(SamplingError::InvalidWeights(
                    "weights must sum to a positive value".into(),
                ));
            }
            w.iter().map(|&x| x / sum).collect()
        }
        None => vec![1.0 / items.len() as f64; items.len()],
    };

    let mut cumulative = Vec::with_capacity(normalized.len());
    let mut acc = 0.0;
    for w in &normalized {
        acc += w;
        cumulative.push(acc);
    }

    let mut out = Vec::with_capacity(size);
    for _ in 0..size {
        let draw: f64 = rng.r#gen();
        let mut index = 0;
        while index < cumulative.len() - 1 && draw > cumulative[index] {
            index += 1;
        }
        out.push(items[index].clone());
    }
    Ok(out)
}

/// Repetition counts for [`repeat`]: one count broadcast to every item, or
/// one count per item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repeats {
    /// Every item this many times.
    Each(usize),
    /// Item `i` exactly `counts[i]` times.
    PerItem(Vec<usize>),
}

impl From<usize> for Repeats {
    fn from(n: usize) -> Self {
        Self::Each(n)
    }
}

impl From<Vec<usize>> for Repeats {
    fn from(counts: Vec<usize>) -> Self {
        Self::PerItem(counts)
    }
}

/// Expand each item `counts[i]` times (cloning per repetition), then shuffle.
///
/// Length mismatches between items and per-item counts degrade instead of
/// failing — this leniency is part of the contract:
/// - more counts than items: the excess counts are dropped;
/// - fewer counts than items: the first count is broadcast to every item.
///
/// Each degradation emits a warning so caller bugs stay visible.
pub fn repeat<T: Clone, R: Rng + ?Sized>(
    items: &[T],
    counts: impl Into<Repeats>,
    rng: &mut R,
) -> Vec<T> {
    let counts = reconcile_counts(items.len(), counts.into());
    let mut expanded = Vec::new();
    for (item, &n) in items.iter().zip(counts.iter()) {
        for _ in 0..n {
            expanded.push(item.clone());
        }
    }
    shuffle(&expanded, rng)
}

/// [`repeat`] for object rows, unpacked into an object of parallel arrays:
/// `[{a: 1, b: "x"}, {a: 2, b: "y"}]` becomes `{a: [1, 2], b: ["x", "y"]}`.
pub fn repeat_unpacked<R: Rng + ?Sized>(
    items: &[Map<String, Value>],
    counts: impl Into<Repeats>,
    rng: &mut R,
) -> Map<String, Value> {
    let rows = repeat(items, counts, rng);
    let mut out: Map<String, Value> = Map::new();
    for row in &rows {
        for (key, value) in row {
            match out.entry(key.clone()).or_insert_with(|| Value::Array(vec![])) {
                Value::Array(column) => column.push(value.clone()),
                _ => unreachable!(),
            }
        }
    }
    out
}

fn reconcile_counts(items: usize, counts: Repeats) -> Vec<usize> {
    match counts {
        Repeats::Each(n) => vec![n; items],
        Repeats::PerItem(mut counts) => {
            if counts.len() == items {
                counts
            } else if counts.len() > items {
                warn!(
                    counts = counts.len(),
                    items,
                    "more repetition counts than items; dropping the excess"
                );
                counts.truncate(items);
                counts
            } else {
                let first = counts.first().copied().unwrap_or(0);
                warn!(
                    counts = counts.len(),
                    items,
                    broadcast = first,
                    "fewer repetition counts than items; broadcasting the first count"
                );
                vec![first; items]
            }
        }
    }
}

/// Interleave independently shuffled groups round-robin, truncated to the
/// shortest group. A single group degenerates to a plain shuffle.
pub fn shuffle_alternate_groups<T: Clone, R: Rng + ?Sized>(
    groups: &[Vec<T>],
    randomize_group_order: bool,
    rng: &mut R,
) -> Vec<T> {
    if groups.is_empty() {
        return Vec::new();
    }
    if groups.len() == 1 {
        warn!("shuffle_alternate_groups called with one group; defaulting to a plain shuffle");
        return shuffle(&groups[0], rng);
    }

    let mut group_order: Vec<usize> = (0..groups.len()).collect();
    if randomize_group_order {
        group_order = shuffle(&group_order, rng);
    }

    let shuffled: Vec<Vec<T>> = groups.iter().map(|g| shuffle(g, rng)).collect();
    let min_len = shuffled.iter().map(Vec::len).min().unwrap_or(0);

    let mut out = Vec::with_capacity(min_len * groups.len());
    for i in 0..min_len {
        for &g in &group_order {
            out.push(shuffled[g][i].clone());
        }
    }
    out
}

/// Permutation with no two adjacent items equal under `key`.
///
/// Greedy best-effort: always emit from the currently most frequent
/// remaining value class unless that would repeat the previous output, in
/// which case substitute a random alternate class. There is no proven
/// guarantee for arbitrary class-size distributions — when one class holds
/// more than half the items, an adjacent repeat near the end is possible.
pub fn shuffle_no_repeats<T, K, R>(items: &[T], key: impl Fn(&T) -> K, rng: &mut R) -> Vec<T>
where
    T: Clone,
    K: Eq + Hash + Clone,
    R: Rng + ?Sized,
{
    // Value classes, in first-appearance order: (key, remaining item indices).
    let mut classes: Vec<(K, Vec<usize>)> = Vec::new();
    let mut positions: HashMap<K, usize> = HashMap::new();
    for (i, item) in items.iter().enumerate() {
        let k = key(item);
        match positions.get(&k) {
            Some(&pos) => classes[pos].1.push(i),
            None => {
                positions.insert(k.clone(), classes.len());
                classes.push((k, vec![i]));
            }
        }
    }

    let mut order = Vec::with_capacity(items.len());
    let mut previous: Option<K> = None;
    while !classes.is_empty() {
        let largest = classes
            .iter()
            .enumerate()
            .max_by_key(|(_, (_, idxs))| idxs.len())
            .map(|(i, _)| i)
            .unwrap();
        let rest: usize = classes
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != largest)
            .map(|(_, (_, idxs))| idxs.len())
            .sum();

        // The largest class must be drained first once it outnumbers the
        // rest, or the tail is guaranteed to repeat.
        let mut pick = if classes[largest].1.len() > rest {
            largest
        } else {
            rng.gen_range(0..classes.len())
        };
        if previous.as_ref() == Some(&classes[pick].0) && classes.len() > 1 {
            let alternate = rng.gen_range(0..classes.len() - 1);
            pick = if alternate >= pick { alternate + 1 } else { alternate };
        }

        let slot = rng.gen_range(0..classes[pick].1.len());
        let item_index = classes[pick].1.swap_remove(slot);
        previous = Some(classes[pick].0.clone());
        order.push(item_index);
        if classes[pick].1.is_empty() {
            classes.swap_remove(pick);
        }
    }

    order.into_iter().map(|i| items[i].clone()).collect()
}

/// Full factorial design: the cartesian product of named factor levels,
/// expanded `repetitions` times and shuffled.
pub fn factorial<R: Rng + ?Sized>(
    factors: &[(String, Vec<Value>)],
    repetitions: usize,
    rng: &mut R,
) -> Vec<Map<String, Value>> {
    let mut design: Vec<Map<String, Value>> = vec![Map::new()];
    for (name, levels) in factors {
        let mut next = Vec::with_capacity(design.len() * levels.len());
        for level in levels {
            for cell in &design {
                let mut cell = cell.clone();
                cell.insert(name.clone(), level.clone());
                next.push(cell);
            }
        }
        design = next;
    }
    repeat(&design, repetitions, rng)
}

/// [`factorial`], unpacked into an object of parallel arrays.
pub fn factorial_unpacked<R: Rng + ?Sized>(
    factors: &[(String, Vec<Value>)],
    repetitions: usize,
    rng: &mut R,
) -> Map<String, Value> {
    let design = factorial(factors, 1, rng);
    repeat_unpacked(&design, repetitions, rng)
}

const ID_CHARS: &[u8] = b"0123456789abcdefghjklmnopqrstuvwxyz";

/// A random lowercase alphanumeric identifier of the given length.
pub fn random_id<R: Rng + ?Sized>(length: usize, rng: &mut R) -> String {
    (0..length)
        .map(|_| ID_CHARS[rng.gen_range(0..ID_CHARS.len())] as char)
        .collect()
}

/// A random integer from `lower` to `upper`, inclusive of both end points.
pub fn random_int<R: Rng + ?Sized>(
    lower: i64,
    upper: i64,
    rng: &mut R,
) -> Result<i64, SamplingError> {
    if upper < lower {
        return Err(SamplingError::InvalidRange { lower, upper });
    }
    Ok(rng.gen_range(lower..=upper))
}

/// One Bernoulli draw: `true` with probability `p`.
pub fn sample_bernoulli<R: Rng + ?Sized>(p: f64, rng: &mut R) -> bool {
    rng.r#gen::<f64>() <= p
}

/// One draw from a normal distribution, via the Box–Muller transform.
pub fn sample_normal<R: Rng + ?Sized>(mean: f64, standard_deviation: f64, rng: &mut R) -> f64 {
    let mut u = 0.0;
    let mut v = 0.0;
    while u == 0.0 {
        u = rng.r#gen::<f64>();
    }
    while v == 0.0 {
        v = rng.r#gen::<f64>();
    }
    let standard = (-2.0 * u.ln()).sqrt() * (2.0 * std::f64::consts::PI * v).cos();
    standard * standard_deviation + mean
}

/// One draw from an exponential distribution with the given rate.
pub fn sample_exponential<R: Rng + ?Sized>(rate: f64, rng: &mut R) -> f64 {
    let mut u = 0.0;
    while u == 0.0 {
        u = rng.r#gen::<f64>();
    }
    -u.ln() / rate
}

/// One draw from an ex-Gaussian distribution (normal + exponential), the
/// standard shape for reaction-time simulation. With `positive_only`,
/// redraws until the sample is positive.
pub fn sample_ex_gaussian<R: Rng + ?Sized>(
    mean: f64,
    standard_deviation: f64,
    rate: f64,
    positive_only: bool,
    rng: &mut R,
) -> f64 {
    let mut s = sample_normal(mean, standard_deviation, rng) + sample_exponential(rate, rng);
    if positive_only {
        while s <= 0.0 {
            s = sample_normal(mean, standard_deviation, rng) + sample_exponential(rate, rng);
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0xB0A7)
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut rng = rng();
        let items: Vec<u32> = (0..50).collect();
        let shuffled = shuffle(&items, &mut rng);
        assert_eq!(shuffled.len(), items.len());
        let mut sorted = shuffled.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, items);
    }

    #[test]
    fn shuffle_occupancy_is_roughly_uniform() {
        let mut rng = rng();
        let items: Vec<usize> = (0..4).collect();
        let trials = 8000;
        // counts[value][position]
        let mut counts = [[0usize; 4]; 4];
        for _ in 0..trials {
            for (pos, &v) in shuffle(&items, &mut rng).iter().enumerate() {
                counts[v][pos] += 1;
            }
        }
        let expected = trials / 4;
        for row in &counts {
            for &c in row {
                assert!(
                    (c as i64 - expected as i64).unsigned_abs() < (expected / 4) as u64,
                    "occupancy {c} too far from expected {expected}"
                );
            }
        }
    }

    #[test]
    fn without_replacement_returns_distinct_items() {
        let mut rng = rng();
        let items: Vec<u32> = (0..10).collect();
        let sample = sample_without_replacement(&items, 6, &mut rng).unwrap();
        assert_eq!(sample.len(), 6);
        let mut sorted = sample.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 6);
    }

    #[test]
    fn without_replacement_rejects_oversized_samples() {
        let mut rng = rng();
        let err = sample_without_replacement(&[1, 2, 3], 4, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            SamplingError::SampleTooLarge {
                requested: 4,
                available: 3
            }
        ));
    }

    #[test]
    fn with_replacement_stays_in_bounds() {
        let mut rng = rng();
        let items = ["a", "b", "c"];
        let sample = sample_with_replacement(&items, 200, None, &mut rng).unwrap();
        assert_eq!(sample.len(), 200);
        assert!(sample.iter().all(|s| items.contains(s)));
    }

    #[test]
    fn with_replacement_rejects_mismatched_weights() {
        let mut rng = rng();
        let err = sample_with_replacement(&[1, 2, 3], 5, Some(&[0.5, 0.5]), &mut rng).unwrap_err();
        assert!(matches!(err, SamplingError::WeightLengthMismatch { .. }));
    }

    #[test]
    fn with_replacement_honors_heavy_weights() {
        let mut rng = rng();
        let items = ["rare", "common"];
        let sample =
            sample_with_replacement(&items, 1000, Some(&[1.0, 9.0]), &mut rng).unwrap();
        let common = sample.iter().filter(|&&s| s == "common").count();
        assert!(common > 800, "common drawn {common}/1000 with weight 0.9");
    }

    #[test]
    fn with_replacement_rejects_zero_sum_weights() {
        let mut rng = rng();
        let err = sample_with_replacement(&[1, 2], 1, Some(&[0.0, 0.0]), &mut rng).unwrap_err();
        assert!(matches!(err, SamplingError::InvalidWeights(_)));
    }

    #[test]
    fn repeat_yields_the_expected_multiset() {
        let mut rng = rng();
        let out = repeat(&["a", "b"], vec![2, 3], &mut rng);
        assert_eq!(out.len(), 5);
        assert_eq!(out.iter().filter(|&&x| x == "a").count(), 2);
        assert_eq!(out.iter().filter(|&&x| x == "b").count(), 3);
    }

    #[test]
    fn repeat_broadcasts_a_scalar_count() {
        let mut rng = rng();
        let out = repeat(&[1, 2, 3], 2usize, &mut rng);
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn repeat_degrades_on_short_counts() {
        let mut rng = rng();
        // Three items, one count: broadcast the first entry.
        let out = repeat(&["x", "y", "z"], vec![2], &mut rng);
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn repeat_degrades_on_long_counts() {
        let mut rng = rng();
        // Two items, three counts: the excess count is dropped.
        let out = repeat(&["x", "y"], vec![1, 1, 5], &mut rng);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn repeat_unpacked_builds_parallel_arrays() {
        let mut rng = rng();
        let row = |a: i64, b: &str| {
            let mut m = Map::new();
            m.insert("a".into(), json!(a));
            m.insert("b".into(), json!(b));
            m
        };
        let out = repeat_unpacked(&[row(1, "x"), row(2, "y")], 2usize, &mut rng);
        assert_eq!(out["a"].as_array().unwrap().len(), 4);
        assert_eq!(out["b"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn alternate_groups_interleaves_round_robin() {
        let mut rng = rng();
        let groups = vec![vec![1, 2, 3], vec![10, 20, 30, 40]];
        let out = shuffle_alternate_groups(&groups, false, &mut rng);
        // Truncated to the shortest group, alternating strictly.
        assert_eq!(out.len(), 6);
        for pair in out.chunks(2) {
            assert!(pair[0] < 10 && pair[1] >= 10);
        }
    }

    #[test]
    fn alternate_groups_single_group_degenerates_to_shuffle() {
        let mut rng = rng();
        let out = shuffle_alternate_groups(&[vec![1, 2, 3]], false, &mut rng);
        let mut sorted = out.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3]);
    }

    #[test]
    fn no_repeats_holds_for_balanced_classes() {
        let mut rng = rng();
        let items = vec!["a", "a", "a", "b", "b", "b", "c", "c", "c"];
        for _ in 0..50 {
            let out = shuffle_no_repeats(&items, |x| *x, &mut rng);
            assert_eq!(out.len(), items.len());
            for pair in out.windows(2) {
                assert_ne!(pair[0], pair[1], "adjacent repeat in {out:?}");
            }
        }
    }

    #[test]
    fn no_repeats_preserves_the_multiset() {
        let mut rng = rng();
        let items = vec![1, 1, 2, 2, 3];
        let out = shuffle_no_repeats(&items, |x| *x, &mut rng);
        let mut sorted = out.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 1, 2, 2, 3]);
    }

    #[test]
    fn factorial_crosses_all_levels() {
        let mut rng = rng();
        let factors = vec![
            ("color".to_string(), vec![json!("red"), json!("blue")]),
            ("size".to_string(), vec![json!(1), json!(2), json!(3)]),
        ];
        let design = factorial(&factors, 1, &mut rng);
        assert_eq!(design.len(), 6);
        let reds = design.iter().filter(|c| c["color"] == json!("red")).count();
        assert_eq!(reds, 3);
        let design = factorial(&factors, 2, &mut rng);
        assert_eq!(design.len(), 12);
    }

    #[test]
    fn random_id_has_length_and_alphabet() {
        let mut rng = rng();
        let id = random_id(32, &mut rng);
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| ID_CHARS.contains(&(c as u8))));
    }

    #[test]
    fn random_int_is_inclusive_and_validated() {
        let mut rng = rng();
        for _ in 0..100 {
            let n = random_int(2, 4, &mut rng).unwrap();
            assert!((2..=4).contains(&n));
        }
        assert_eq!(random_int(5, 5, &mut rng).unwrap(), 5);
        assert!(matches!(
            random_int(3, 1, &mut rng),
            Err(SamplingError::InvalidRange { .. })
        ));
    }

    #[test]
    fn distribution_helpers_stay_plausible() {
        let mut rng = rng();
        let n = 5000;
        let mean: f64 =
            (0..n).map(|_| sample_normal(100.0, 15.0, &mut rng)).sum::<f64>() / n as f64;
        assert!((mean - 100.0).abs() < 2.0);
        let exp_mean: f64 =
            (0..n).map(|_| sample_exponential(0.1, &mut rng)).sum::<f64>() / n as f64;
        assert!((exp_mean - 10.0).abs() < 1.0);
        for _ in 0..100 {
            assert!(sample_ex_gaussian(-50.0, 10.0, 1.0, true, &mut rng) > 0.0);
        }
        let heads = (0..n).filter(|_| sample_bernoulli(0.7, &mut rng)).count();
        assert!((heads as f64 / n as f64 - 0.7).abs() < 0.05);
    }
}
