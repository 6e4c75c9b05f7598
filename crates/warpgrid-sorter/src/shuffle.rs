//! Weighted random permutation.
//!
//! Each item draws a key `ln(u) / w` with `u` uniform in `(0, 1]` and the
//! items are ordered by descending key (Efraimidis–Spirakis). This is the
//! same distribution as repeatedly picking the next item with probability
//! proportional to its weight among those not yet picked: with weights
//! 3 and 1 the first item leads 75% of the time.
//!
//! Items with a non-positive or non-finite weight always sort last.

use rand::Rng;

pub fn weighted_shuffle<T: Clone, R: Rng>(items: &mut [T], weights: &[f64], rng: &mut R) {
    assert_eq!(items.len(), weights.len(), "one weight per item");
    if items.len() < 2 {
        return;
    }

    let mut keyed: Vec<(f64, usize)> = weights
        .iter()
        .enumerate()
        .map(|(index, &weight)| {
            let u = 1.0 - rng.random::<f64>();
            let key = if weight > 0.0 && weight.is_finite() {
                u.ln() / weight
            } else {
                f64::NEG_INFINITY
            };
            (key, index)
        })
        .collect();

    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));

    let original = items.to_vec();
    for (slot, (_, index)) in items.iter_mut().zip(keyed) {
        *slot = original[index].clone();
    }
}
