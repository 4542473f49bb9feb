//! Largest-remainder apportionment of an integer total across weights.

use crate::weights::Weight;

/// Split `total` across `weights` so the parts sum to `total` exactly.
///
/// Each campaign first gets `floor(total * clicks / group_clicks)`. The
/// leftover units (always fewer than the number of campaigns) go one each to
/// the campaigns with the largest remainder `total * clicks mod group_clicks`,
/// ties broken by ascending campaign id. Everything runs in 128-bit integers,
/// so the ranking is identical on every platform.
///
/// The returned vector is aligned with `weights`.
pub fn allocate(total: u64, weights: &[Weight]) -> Vec<u64> {
    let group_clicks: u128 = weights.iter().map(|w| w.clicks as u128).sum();
    if weights.is_empty() || group_clicks == 0 || total == 0 {
        return vec![0; weights.len()];
    }
    if weights.len() == 1 {
        return vec![total];
    }

    let total = total as u128;
    let mut parts = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    for w in weights {
        let exact = total * w.clicks as u128;
        parts.push(exact / group_clicks);
        remainders.push(exact % group_clicks);
    }

    let shortfall = total - parts.iter().sum::<u128>();

    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| {
        remainders[b]
            .cmp(&remainders[a])
            .then_with(|| weights[a].campaign_id.cmp(&weights[b].campaign_id))
    });
    for &idx in order.iter().take(shortfall as usize) {
        parts[idx] += 1;
    }

    // Each part is at most `total`, which came from a u64.
    parts.into_iter().map(|p| p as u64).collect()
}
