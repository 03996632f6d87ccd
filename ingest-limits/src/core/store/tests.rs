use super::*;
use crate::core::policy::{MaxActiveStreams, Reason, RejectedStream};
use std::sync::Arc;
use std::thread;

const CUTOFF: i64 = 100;
const BOUNDS: BucketBounds = BucketBounds {
    start: 150,
    cutoff: 90,
};

fn batch(partition: i32, updates: &[(u64, u64)]) -> BTreeMap<i32, Vec<StreamUpdate>> {
    let mut streams = BTreeMap::new();
    streams.insert(
        partition,
        updates
            .iter()
            .map(|&(hash, size)| StreamUpdate::new(hash, size, 150))
            .collect(),
    );
    streams
}

fn collect_usage(store: &StreamMetadata, tenant: &str) -> Vec<(i32, Stream)> {
    let mut streams = Vec::new();
    store.usage(tenant, |partition, stream| {
        streams.push((partition, stream.clone()))
    });
    streams.sort_by_key(|(p, s)| (*p, s.hash));
    streams
}

#[test]
fn test_end_to_end_limit_scenario() {
    let store = StreamMetadata::with_shard_count(1);
    let policy = MaxActiveStreams::new(2);
    let mut rejections = Rejections::new();

    let accepted = store.store_cond(
        "t",
        &batch(0, &[(1, 10), (2, 20), (3, 30)]),
        CUTOFF,
        BOUNDS,
        &policy,
        &mut rejections,
    );

    assert_eq!(accepted, 30);
    assert_eq!(
        rejections.into_vec(),
        vec![RejectedStream {
            hash: 3,
            reason: Reason::ExceedsMaxStreams
        }]
    );

    let usage = collect_usage(&store, "t");
    assert_eq!(usage.len(), 2);
    assert!(usage.iter().all(|(p, _)| *p == 0));
    assert_eq!(usage[0].1.hash, 1);
    assert_eq!(usage[1].1.hash, 2);
}

#[test]
fn test_admits_min_of_batch_and_limit_in_order() {
    for limit in [0u64, 1, 3, 5, 8] {
        let store = StreamMetadata::with_shard_count(4);
        let policy = MaxActiveStreams::new(limit);
        let mut rejections = Rejections::new();

        let updates: Vec<(u64, u64)> = (1..=5).map(|h| (h, 1)).collect();
        let accepted = store.store_cond(
            "tenant",
            &batch(3, &updates),
            CUTOFF,
            BOUNDS,
            &policy,
            &mut rejections,
        );

        let admitted = limit.min(5);
        assert_eq!(accepted, admitted);
        assert_eq!(store.stream_len() as u64, admitted);

        let expected: Vec<u64> = (admitted + 1..=5).collect();
        assert_eq!(rejections.hashes(Reason::ExceedsMaxStreams), expected);
    }
}

#[test]
fn test_active_stream_bypasses_policy() {
    let store = StreamMetadata::with_shard_count(1);
    let policy = MaxActiveStreams::new(2);
    let mut rejections = Rejections::new();

    store.store_cond(
        "t",
        &batch(0, &[(1, 10), (2, 20)]),
        CUTOFF,
        BOUNDS,
        &policy,
        &mut rejections,
    );
    assert!(rejections.is_empty());

    // Partition is full, but stream 1 already holds a slot
    let accepted = store.store_cond(
        "t",
        &batch(0, &[(1, 5)]),
        CUTOFF,
        BOUNDS,
        &policy,
        &mut rejections,
    );
    assert_eq!(accepted, 5);
    assert!(rejections.is_empty());

    let usage = collect_usage(&store, "t");
    assert_eq!(usage[0].1.total_size, 15);
    assert_eq!(usage[0].1.rate_buckets.len(), 1);
    assert_eq!(usage[0].1.rate_buckets[0].size, 15);
}

#[test]
fn test_refused_candidate_keeps_its_slot() {
    let store = StreamMetadata::with_shard_count(1);
    let mut rejections = Rejections::new();

    // Refuse only stream 2; stream 3 must still see count 3
    let seen = std::cell::RefCell::new(Vec::new());
    let policy = |count: u64, stream: &StreamUpdate, rejections: &mut Rejections| {
        seen.borrow_mut().push((stream.hash, count));
        if stream.hash == 2 {
            rejections.push(stream.hash, Reason::ExceedsMaxStreams);
            return false;
        }
        true
    };

    let accepted = store.store_cond(
        "t",
        &batch(0, &[(1, 1), (2, 1), (3, 1)]),
        CUTOFF,
        BOUNDS,
        &policy,
        &mut rejections,
    );

    assert_eq!(accepted, 2);
    assert_eq!(seen.into_inner(), vec![(1, 1), (2, 2), (3, 3)]);
    assert_eq!(rejections.len(), 1);
}

#[test]
fn test_duplicate_new_stream_in_batch_is_merged() {
    let store = StreamMetadata::with_shard_count(1);
    let policy = MaxActiveStreams::new(1);
    let mut rejections = Rejections::new();

    let accepted = store.store_cond(
        "t",
        &batch(0, &[(7, 10), (7, 15)]),
        CUTOFF,
        BOUNDS,
        &policy,
        &mut rejections,
    );

    // The second entry finds the first already active
    assert_eq!(accepted, 25);
    assert!(rejections.is_empty());
    assert_eq!(collect_usage(&store, "t")[0].1.total_size, 25);
}

#[test]
fn test_expired_stream_is_reset_on_reuse() {
    let store = StreamMetadata::with_shard_count(1);
    let old = BucketBounds {
        start: 40,
        cutoff: -20,
    };
    store.store("t", 0, &StreamUpdate::new(1, 500, 45), old);

    let policy = MaxActiveStreams::new(1);
    let mut rejections = Rejections::new();
    let accepted = store.store_cond(
        "t",
        &batch(0, &[(1, 10)]),
        CUTOFF,
        BOUNDS,
        &policy,
        &mut rejections,
    );

    assert_eq!(accepted, 10);
    let usage = collect_usage(&store, "t");
    let stream = &usage[0].1;
    assert_eq!(stream.total_size, 10);
    assert_eq!(stream.last_seen_at, 150);
    assert_eq!(stream.rate_buckets.len(), 1);
    assert_eq!(stream.rate_buckets[0].timestamp, 150);
}

#[test]
fn test_expired_streams_do_not_count_as_active() {
    let store = StreamMetadata::with_shard_count(1);
    let stale = BucketBounds {
        start: 40,
        cutoff: -20,
    };
    store.store("t", 0, &StreamUpdate::new(1, 1, 45), stale);
    store.store("t", 0, &StreamUpdate::new(2, 1, 45), stale);

    let policy = MaxActiveStreams::new(2);
    let mut rejections = Rejections::new();
    let accepted = store.store_cond(
        "t",
        &batch(0, &[(3, 1), (4, 1)]),
        CUTOFF,
        BOUNDS,
        &policy,
        &mut rejections,
    );

    assert_eq!(accepted, 2);
    assert!(rejections.is_empty());
}

#[test]
fn test_limits_apply_per_partition() {
    let store = StreamMetadata::with_shard_count(2);
    let policy = MaxActiveStreams::new(1);
    let mut rejections = Rejections::new();

    let mut streams = batch(0, &[(1, 1), (2, 1)]);
    streams.insert(1, vec![StreamUpdate::new(3, 4, 150)]);

    let accepted = store.store_cond("t", &streams, CUTOFF, BOUNDS, &policy, &mut rejections);

    assert_eq!(accepted, 5);
    assert_eq!(rejections.hashes(Reason::ExceedsMaxStreams), vec![2]);
}

#[test]
fn test_fully_rejected_batch_leaves_no_tenant() {
    let store = StreamMetadata::with_shard_count(1);
    let mut rejections = Rejections::new();

    store.store_cond(
        "t",
        &batch(0, &[(1, 1)]),
        CUTOFF,
        BOUNDS,
        &MaxActiveStreams::new(0),
        &mut rejections,
    );

    assert_eq!(rejections.len(), 1);
    assert!(store.is_empty());
}

#[test]
fn test_store_creates_and_merges() {
    let store = StreamMetadata::with_shard_count(4);

    store.store("a", 1, &StreamUpdate::new(9, 10, 100), BucketBounds { start: 100, cutoff: 40 });
    store.store("a", 1, &StreamUpdate::new(9, 20, 112), BucketBounds { start: 110, cutoff: 50 });
    store.store("a", 1, &StreamUpdate::new(9, 30, 175), BucketBounds { start: 170, cutoff: 110 });

    let usage = collect_usage(&store, "a");
    assert_eq!(usage.len(), 1);
    let stream = &usage[0].1;
    assert_eq!(stream.total_size, 60);
    assert_eq!(stream.last_seen_at, 175);

    // The bucket at 100 fell out of the window on the last write
    let starts: Vec<i64> = stream.rate_buckets.iter().map(|b| b.timestamp).collect();
    assert_eq!(starts, vec![110, 170]);
    assert!(starts.iter().all(|s| *s >= 170 - 60));
}

#[test]
fn test_usage_unknown_tenant() {
    let store = StreamMetadata::with_shard_count(4);
    let mut visited = 0;
    store.usage("nobody", |_, _| visited += 1);
    assert_eq!(visited, 0);
}

#[test]
fn test_all_visits_every_stream() {
    let store = StreamMetadata::with_shard_count(8);
    for tenant in ["a", "b", "c"] {
        for partition in 0..3 {
            for hash in 0..4u64 {
                store.store(tenant, partition, &StreamUpdate::new(hash, 1, 150), BOUNDS);
            }
        }
    }

    let mut seen = Vec::new();
    store.all(|tenant, partition, stream| seen.push((tenant.to_string(), partition, stream.hash)));
    seen.sort();
    seen.dedup();

    assert_eq!(seen.len(), 3 * 3 * 4);
    assert_eq!(store.stream_len(), 36);
    assert_eq!(store.tenant_len(), 3);
}

#[test]
fn test_evict_by_cutoff() {
    let store = StreamMetadata::with_shard_count(4);
    let bounds = |t: i64| BucketBounds {
        start: t,
        cutoff: t - 60,
    };

    store.store("a", 0, &StreamUpdate::new(1, 1, 50), bounds(50));
    store.store("a", 0, &StreamUpdate::new(2, 1, 99), bounds(99));
    store.store("a", 1, &StreamUpdate::new(3, 1, 100), bounds(100));
    store.store("b", 0, &StreamUpdate::new(4, 1, 10), bounds(10));
    store.store("c", 2, &StreamUpdate::new(5, 1, 200), bounds(200));

    let evicted = store.evict(100);

    assert_eq!(evicted.len(), 2);
    assert_eq!(evicted.get("a"), Some(&2));
    assert_eq!(evicted.get("b"), Some(&1));
    assert_eq!(evicted.get("c"), None);

    let mut remaining = Vec::new();
    store.all(|tenant, _, stream| remaining.push((tenant.to_string(), stream.hash)));
    remaining.sort();
    assert_eq!(remaining, vec![("a".to_string(), 3), ("c".to_string(), 5)]);

    // Tenant b lost its only stream
    assert_eq!(store.tenant_len(), 2);
}

#[test]
fn test_evict_nothing() {
    let store = StreamMetadata::with_shard_count(2);
    store.store("a", 0, &StreamUpdate::new(1, 1, 150), BOUNDS);
    assert!(store.evict(100).is_empty());
    assert_eq!(store.stream_len(), 1);
}

#[test]
fn test_evict_partitions() {
    let store = StreamMetadata::with_shard_count(4);
    store.store("a", 0, &StreamUpdate::new(1, 1, 150), BOUNDS);
    store.store("a", 1, &StreamUpdate::new(2, 1, 150), BOUNDS);
    store.store("b", 1, &StreamUpdate::new(3, 1, 150), BOUNDS);
    store.store("c", 2, &StreamUpdate::new(4, 1, 150), BOUNDS);

    store.evict_partitions(&[1, 7]);

    let mut remaining = Vec::new();
    store.all(|tenant, partition, _| remaining.push((tenant.to_string(), partition)));
    remaining.sort();
    assert_eq!(remaining, vec![("a".to_string(), 0), ("c".to_string(), 2)]);

    let mut b_streams = 0;
    store.usage("b", |_, _| b_streams += 1);
    assert_eq!(b_streams, 0);
    assert_eq!(store.tenant_len(), 2);

    // An empty set is a no-op
    store.evict_partitions(&[]);
    assert_eq!(store.stream_len(), 2);
}

#[test]
fn test_shard_distribution() {
    let store = StreamMetadata::with_shard_count(4);

    let tenants: Vec<String> = (0..64).map(|i| format!("tenant-{i}")).collect();
    let mut shard_counts = [0usize; 4];
    for tenant in &tenants {
        let index = store.shard_index(tenant);
        assert_eq!(index, store.shard_index(tenant));
        shard_counts[index] += 1;
    }

    assert!(shard_counts.iter().all(|&count| count > 0));
}

#[test]
fn test_builder() {
    let store = StreamMetadata::builder().shards(3).capacity(10).build();
    assert_eq!(store.shard_count(), 3);
    assert!(store.is_empty());

    assert!(StreamMetadata::new().shard_count() >= SHARDS_PER_CPU);
}

#[test]
#[should_panic(expected = "Shard count must be greater than 0")]
fn test_zero_shards_panics() {
    StreamMetadata::with_shard_count(0);
}

#[test]
fn test_concurrent_writers_distinct_tenants() {
    let store = Arc::new(StreamMetadata::with_shard_count(16));
    let writes_per_thread = 1_000u64;

    thread::scope(|s| {
        for t in 0..8 {
            let store = Arc::clone(&store);
            s.spawn(move || {
                let tenant = format!("tenant-{t}");
                for i in 0..writes_per_thread {
                    let update = StreamUpdate::new(i % 10, 1, 150);
                    store.store(&tenant, (i % 4) as i32, &update, BOUNDS);
                }
            });
        }
    });

    let mut total = 0;
    store.all(|_, _, stream| total += stream.total_size);
    assert_eq!(total, 8 * writes_per_thread);
    assert_eq!(store.tenant_len(), 8);
}

#[test]
fn test_concurrent_admission_same_tenant_respects_limit() {
    let store = Arc::new(StreamMetadata::with_shard_count(1));
    let policy = MaxActiveStreams::new(50);

    let rejected: usize = thread::scope(|s| {
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let store = Arc::clone(&store);
                s.spawn(move || {
                    let mut rejections = Rejections::new();
                    for i in 0..25u64 {
                        let hash = t * 1_000 + i;
                        store.store_cond(
                            "shared",
                            &batch(0, &[(hash, 1)]),
                            CUTOFF,
                            BOUNDS,
                            &policy,
                            &mut rejections,
                        );
                    }
                    rejections.len()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    // 100 distinct new streams against a limit of 50
    assert_eq!(store.stream_len(), 50);
    assert_eq!(rejected, 50);
}
