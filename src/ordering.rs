//! Display-order resolution with per-session stability.
//!
//! Every non-sequential order is decided once per (entity, mode) within a
//! session and then replayed from the cache in the render state, so
//! re-renders and resumes see byte-identical order. Items that appear
//! after the order was first decided (a newly visible option, say) are
//! appended after the cached order instead of reshuffling the set; items
//! that disappear are skipped but keep their cached slot in case they
//! come back.
//!
//! Shuffles draw from a ChaCha8 RNG seeded from the session seed plus the
//! cache key, so even a lost cache replays identically within a session.

use std::collections::HashSet;

use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

use crate::session::RenderState;
use crate::types::OrderMode;

/// Weight floor for weighted ordering; keeps zero/negative-weight items
/// orderable instead of poisoning the distribution.
const MIN_WEIGHT: f64 = 1e-6;

/// One orderable item. Questions have neither group key nor weight.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub id: String,
    pub group_key: Option<String>,
    pub weight: Option<f64>,
}

impl OrderItem {
    pub fn plain(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            group_key: None,
            weight: None,
        }
    }
}

/// Deterministic per-session RNG for a given decision point.
pub fn session_rng(seed: u64, discriminator: &str) -> ChaCha8Rng {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(discriminator.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    ChaCha8Rng::seed_from_u64(u64::from_le_bytes(bytes))
}

/// Resolve the display order of `items` for one entity, consulting and
/// maintaining the session's ordering cache.
pub fn resolve_order(
    entity_id: &str,
    mode: OrderMode,
    items: &[OrderItem],
    render: &mut RenderState,
) -> Vec<String> {
    // Sequential is the authored order; nothing to remember.
    if mode == OrderMode::Sequential {
        return items.iter().map(|item| item.id.clone()).collect();
    }

    let key = format!("{entity_id}:{}", mode.slug());

    if let Some(cached) = render.order_cache.get_mut(&key) {
        let known: HashSet<&str> = cached.iter().map(String::as_str).collect();
        let fresh: Vec<String> = items
            .iter()
            .filter(|item| !known.contains(item.id.as_str()))
            .map(|item| item.id.clone())
            .collect();
        cached.extend(fresh);

        let current: HashSet<&str> = items.iter().map(|item| item.id.as_str()).collect();
        return cached
            .iter()
            .filter(|id| current.contains(id.as_str()))
            .cloned()
            .collect();
    }

    let mut rng = session_rng(render.seed, &key);
    let ordered = match mode {
        OrderMode::Sequential => unreachable!("handled above"),
        OrderMode::Random => shuffled(items, &mut rng),
        OrderMode::GroupRandom => group_shuffled(items, &mut rng),
        OrderMode::Weighted => weighted(items, &mut rng),
    };

    render.order_cache.insert(key, ordered.clone());
    ordered
}

fn shuffled(items: &[OrderItem], rng: &mut ChaCha8Rng) -> Vec<String> {
    let mut ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
    ids.shuffle(rng);
    ids
}

/// Shuffle within each group-key partition, partitions in first-appearance
/// order, then shuffle the ungrouped items and append them.
fn group_shuffled(items: &[OrderItem], rng: &mut ChaCha8Rng) -> Vec<String> {
    let mut groups: Vec<(&str, Vec<String>)> = Vec::new();
    let mut ungrouped: Vec<String> = Vec::new();

    for item in items {
        match item.group_key.as_deref() {
            Some(key) => match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(item.id.clone()),
                None => groups.push((key, vec![item.id.clone()])),
            },
            None => ungrouped.push(item.id.clone()),
        }
    }

    let mut ordered = Vec::with_capacity(items.len());
    for (_, mut members) in groups {
        members.shuffle(rng);
        ordered.extend(members);
    }
    ungrouped.shuffle(rng);
    ordered.extend(ungrouped);
    ordered
}

/// Weight-proportional sampling without replacement. Missing weights
/// count as 1.0.
fn weighted(items: &[OrderItem], rng: &mut ChaCha8Rng) -> Vec<String> {
    let mut pool: Vec<(&str, f64)> = items
        .iter()
        .map(|item| (item.id.as_str(), item.weight.unwrap_or(1.0).max(MIN_WEIGHT)))
        .collect();

    let mut ordered = Vec::with_capacity(pool.len());
    while !pool.is_empty() {
        let dist = match WeightedIndex::new(pool.iter().map(|(_, w)| *w)) {
            Ok(dist) => dist,
            Err(_) => {
                // Degenerate weights: fall back to the remaining authored order.
                ordered.extend(pool.drain(..).map(|(id, _)| id.to_string()));
                break;
            }
        };
        let picked = dist.sample(rng);
        ordered.push(pool.remove(picked).0.to_string());
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_items(ids: &[&str]) -> Vec<OrderItem> {
        ids.iter().map(|id| OrderItem::plain(*id)).collect()
    }

    fn render_with_seed(seed: u64) -> RenderState {
        RenderState {
            seed,
            ..RenderState::default()
        }
    }

    #[test]
    fn sequential_is_identity_and_uncached() {
        let mut render = render_with_seed(7);
        let items = plain_items(&["a", "b", "c"]);
        let order = resolve_order("page1", OrderMode::Sequential, &items, &mut render);
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(render.order_cache.is_empty());
    }

    #[test]
    fn random_is_stable_within_a_session() {
        let mut render = render_with_seed(7);
        let items = plain_items(&["a", "b", "c", "d", "e", "f"]);

        let first = resolve_order("q1", OrderMode::Random, &items, &mut render);
        let second = resolve_order("q1", OrderMode::Random, &items, &mut render);
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b", "c", "d", "e", "f"]);
    }

    #[test]
    fn random_is_deterministic_per_seed() {
        let items = plain_items(&["a", "b", "c", "d", "e", "f"]);
        let mut one = render_with_seed(42);
        let mut two = render_with_seed(42);
        assert_eq!(
            resolve_order("q1", OrderMode::Random, &items, &mut one),
            resolve_order("q1", OrderMode::Random, &items, &mut two),
        );
    }

    #[test]
    fn new_ids_append_after_cached_order() {
        let mut render = render_with_seed(7);
        let items = plain_items(&["a", "b", "c"]);
        let first = resolve_order("q1", OrderMode::Random, &items, &mut render);

        let grown = plain_items(&["a", "b", "c", "d"]);
        let second = resolve_order("q1", OrderMode::Random, &grown, &mut render);

        assert_eq!(second[..3], first[..]);
        assert_eq!(second[3], "d");
    }

    #[test]
    fn removed_ids_are_skipped_then_restored_in_place() {
        let mut render = render_with_seed(7);
        let items = plain_items(&["a", "b", "c", "d"]);
        let full = resolve_order("q1", OrderMode::Random, &items, &mut render);

        let shrunk = plain_items(&["a", "b", "d"]);
        let partial = resolve_order("q1", OrderMode::Random, &shrunk, &mut render);
        let expected: Vec<String> = full.iter().filter(|id| *id != "c").cloned().collect();
        assert_eq!(partial, expected);

        // The id that vanished gets its old slot back, not an append.
        let restored = resolve_order("q1", OrderMode::Random, &items, &mut render);
        assert_eq!(restored, full);
    }

    #[test]
    fn group_random_keeps_partitions_contiguous() {
        let mut render = render_with_seed(9);
        let items = vec![
            OrderItem {
                id: "a1".into(),
                group_key: Some("a".into()),
                weight: None,
            },
            OrderItem {
                id: "a2".into(),
                group_key: Some("a".into()),
                weight: None,
            },
            OrderItem {
                id: "b1".into(),
                group_key: Some("b".into()),
                weight: None,
            },
            OrderItem {
                id: "b2".into(),
                group_key: Some("b".into()),
                weight: None,
            },
            OrderItem::plain("solo"),
        ];

        let order = resolve_order("q1", OrderMode::GroupRandom, &items, &mut render);
        assert_eq!(order.len(), 5);

        // Group a occupies the first slots, group b the next, ungrouped last.
        assert!(order[..2].iter().all(|id| id.starts_with("a")));
        assert!(order[2..4].iter().all(|id| id.starts_with("b")));
        assert_eq!(order[4], "solo");
    }

    #[test]
    fn weighted_orders_every_item_exactly_once() {
        let mut render = render_with_seed(11);
        let items = vec![
            OrderItem {
                id: "heavy".into(),
                group_key: None,
                weight: Some(100.0),
            },
            OrderItem {
                id: "light".into(),
                group_key: None,
                weight: Some(0.001),
            },
            OrderItem::plain("default"),
        ];

        let order = resolve_order("q1", OrderMode::Weighted, &items, &mut render);
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["default", "heavy", "light"]);
    }

    #[test]
    fn modes_cache_independently() {
        let mut render = render_with_seed(7);
        let items = plain_items(&["a", "b", "c"]);
        resolve_order("q1", OrderMode::Random, &items, &mut render);
        resolve_order("q1", OrderMode::GroupRandom, &items, &mut render);
        assert_eq!(render.order_cache.len(), 2);
    }
}
