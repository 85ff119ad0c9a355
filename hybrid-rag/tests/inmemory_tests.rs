//! Property tests for in-memory hybrid query ordering.

use std::collections::HashSet;

use hybrid_rag::{
    HybridQuery, InMemoryIndex, IndexedPoint, Payload, PointId, Prefetch, QueryVector,
    SparseVector, VectorIndex, VectorSpaces,
};
use proptest::prelude::*;

const DIM: usize = 8;

/// Generate a non-zero L2-normalized vector of the given dimension.
fn arb_normalized(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero vector", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-6 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

fn arb_sparse() -> impl Strategy<Value = SparseVector> {
    proptest::collection::btree_map(0u32..32, 0.1f32..3.0f32, 0..6)
        .prop_map(SparseVector::from_weights)
}

fn arb_point() -> impl Strategy<Value = IndexedPoint> {
    (
        0u64..50,
        arb_normalized(DIM),
        arb_sparse(),
        proptest::collection::vec(arb_normalized(DIM), 1..5),
    )
        .prop_map(|(id, dense, sparse, late_interaction)| IndexedPoint {
            id: PointId::Num(id),
            dense,
            sparse,
            late_interaction,
            payload: Payload::new(),
        })
}

fn hybrid_query(
    dense: Vec<f32>,
    sparse: SparseVector,
    late: Vec<Vec<f32>>,
    prefetch_limit: u64,
    limit: u64,
) -> HybridQuery {
    let spaces = VectorSpaces::default();
    HybridQuery {
        collection: "test".into(),
        prefetch: vec![
            Prefetch { query: QueryVector::Dense(dense), using: spaces.dense, limit: prefetch_limit },
            Prefetch {
                query: QueryVector::Sparse(sparse),
                using: spaces.sparse,
                limit: prefetch_limit,
            },
        ],
        query: QueryVector::Multi(late),
        using: spaces.late_interaction,
        limit,
        with_payload: false,
    }
}

/// *For any* set of points and any query, a hybrid query returns distinct
/// ids ordered by descending rerank score, bounded by the limit and by the
/// size of the two prefetch pools combined.
mod prop_hybrid_query_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_distinct_and_bounded(
            points in proptest::collection::vec(arb_point(), 1..30),
            dense in arb_normalized(DIM),
            sparse in arb_sparse(),
            late in proptest::collection::vec(arb_normalized(DIM), 1..4),
            prefetch_limit in 1u64..10,
            limit in 1u64..15,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (hits, stored) = rt.block_on(async {
                let index = InMemoryIndex::default().with_score_floor(-1.0);
                index.create_collection("test").await;
                index.upsert("test", points).await.unwrap();
                let stored = index.len("test").await.unwrap();
                let hits = index
                    .query(&hybrid_query(dense, sparse, late, prefetch_limit, limit))
                    .await
                    .unwrap();
                (hits, stored)
            });

            prop_assert!(hits.len() as u64 <= limit);
            prop_assert!(hits.len() as u64 <= 2 * prefetch_limit);
            prop_assert!(hits.len() <= stored);

            let ids: HashSet<_> = hits.iter().map(|h| h.id.clone()).collect();
            prop_assert_eq!(ids.len(), hits.len());

            for window in hits.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
        }
    }
}
