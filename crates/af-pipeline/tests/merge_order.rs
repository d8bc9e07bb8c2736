use af_hist::{Axis, Hist};
use af_pipeline::MergeTree;
use proptest::prelude::*;

fn chunk(x: f64, w: f64) -> Vec<Hist> {
    let mut h = Hist::new("Pt", "p_T", Axis::regular(4, 0.0, 4.0).unwrap()).unwrap();
    h.fill("TTbar", &[x], &[w]).unwrap();
    vec![h]
}

fn reduce(chunks: &[(f64, f64, bool)], order: &[usize]) -> String {
    let mut tree = MergeTree::new(chunks.len());
    for &o in order {
        let (x, w, failed) = chunks[o];
        tree.submit(o, if failed { None } else { Some(chunk(x, w)) }).unwrap();
    }
    let (value, tally) = tree.into_result().unwrap();
    format!("{}|{}", serde_json::to_string(&value).unwrap(), tally.completeness())
}

proptest! {
    #[test]
    fn submission_order_never_changes_bits(
        chunks in prop::collection::vec((0.0f64..4.0, 1e-3f64..1e3, prop::bool::weighted(0.2)), 1..24),
        seed in any::<u64>(),
    ) {
        let forward: Vec<usize> = (0..chunks.len()).collect();
        // deterministic shuffle from the seed
        let mut shuffled = forward.clone();
        let mut s = seed | 1;
        for i in (1..shuffled.len()).rev() {
            s ^= s << 13;
            s ^= s >> 7;
            s ^= s << 17;
            shuffled.swap(i, (s % (i as u64 + 1)) as usize);
        }
        prop_assert_eq!(reduce(&chunks, &forward), reduce(&chunks, &shuffled));
    }
}
