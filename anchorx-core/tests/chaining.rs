use anchorx_core::{Anchor, Arena, Chain, ChainParams, Chainer, ReferenceBackend};
use proptest::prelude::*;

fn scenario_anchors() -> Vec<Anchor> {
    let raw: [(i64, u64); 8] = [
        (-9223372036854763668, 64424509459),
        (-9223372036854763661, 64424509466),
        (-9223372036854763651, 64424509476),
        (-9223372036854763648, 64424509479),
        (-9223372036854763643, 64424509484),
        (-9223372036854763633, 64424509494),
        (-9223372036854763623, 64424509504),
        (-9223372036854763622, 64424509505),
    ];
    raw.iter().map(|&(x, y)| Anchor::from_raw(x, y)).collect()
}

#[test]
fn reverse_strand_scenario_forms_one_chain() {
    let anchors = scenario_anchors();
    let chainer = Chainer::new(ChainParams::default()).unwrap();
    let output = chainer.chain(&anchors, None, &mut ReferenceBackend::new());

    assert_eq!(output.chains, vec![Chain { score: 61, count: 8 }]);
    assert_eq!(output.anchors, anchors);
}

#[test]
fn scenario_leaves_caller_arena_empty() {
    let anchors = scenario_anchors();
    let chainer = Chainer::new(ChainParams::default()).unwrap();
    let mut km = Arena::new();
    for _ in 0..3 {
        let output = chainer.chain(&anchors, Some(&mut km), &mut ReferenceBackend::new());
        assert_eq!(output.len(), 1);
    }
    let stats = km.stat();
    assert_eq!(stats.n_cores, 1);
    assert_eq!(stats.available, stats.capacity);
}

#[test]
fn overlapping_runs_share_no_anchor() {
    // two diagonals interleaved in reference order
    let mut anchors = Vec::new();
    for k in 0..10i64 {
        anchors.push(Anchor::new(1000 + k * 20, (100 + k * 20) as u32, 15, 0));
        anchors.push(Anchor::new(1005 + k * 20, (3000 + k * 20) as u32, 15, 0));
    }
    let chainer = Chainer::new(ChainParams::default()).unwrap();
    let output = chainer.chain(&anchors, None, &mut ReferenceBackend::new());

    assert_eq!(output.len(), 2);
    let mut seen = std::collections::HashSet::new();
    for (chain, members) in output.iter() {
        assert_eq!(chain.count, 10);
        assert_eq!(chain.score, 15 * 10);
        for anchor in members {
            assert!(seen.insert(*anchor));
        }
    }
    assert_eq!(output.anchors[0].ref_pos, 1000);
}

#[test]
fn cross_segment_links_use_segment_rules() {
    // second segment restarts the query at a low coordinate
    let mut anchors = Vec::new();
    for k in 0..4i64 {
        anchors.push(Anchor::new(500 + k * 15, (50 + k * 15) as u32, 15, 0));
    }
    for k in 0..4i64 {
        anchors.push(Anchor::new(700 + k * 15, (400 + k * 15) as u32, 15, 1));
    }
    let params = ChainParams {
        segment_count: 2,
        ..Default::default()
    };
    let chainer = Chainer::new(params).unwrap();
    let output = chainer.chain(&anchors, None, &mut ReferenceBackend::new());

    assert!(!output.is_empty());
    let total: i32 = output.chains.iter().map(|c| c.count).sum();
    assert_eq!(total as usize, output.anchors.len());
}

proptest! {
    #[test]
    fn evenly_spaced_run_scores_sum_of_spans(
        n in 3usize..60,
        span in 8u8..40,
        extra in 0i64..20,
        start in 0i64..1_000_000,
    ) {
        let step = span as i64 + extra;
        let anchors: Vec<Anchor> = (0..n as i64)
            .map(|k| Anchor::new(start + k * step, (k * step + 7) as u32, span, 0))
            .collect();
        let params = ChainParams { min_score: 1, ..Default::default() };
        let chainer = Chainer::new(params).unwrap();
        let output = chainer.chain(&anchors, None, &mut ReferenceBackend::new());

        prop_assert_eq!(output.chains.len(), 1);
        prop_assert_eq!(output.chains[0].count as usize, n);
        prop_assert_eq!(output.chains[0].score, span as i32 * n as i32);
        prop_assert_eq!(&output.anchors, &anchors);
    }

    #[test]
    fn chains_ordered_and_large_enough(
        seeds in prop::collection::vec((0i64..50_000, 0u32..50_000, 10u8..30), 0..300),
        min_count in 1i32..5,
    ) {
        let mut anchors: Vec<Anchor> = seeds
            .iter()
            .map(|&(r, q, s)| Anchor::new(r, q, s, 0))
            .collect();
        anchors.sort_by_key(|a| a.ref_key());
        let params = ChainParams { min_count, min_score: 20, ..Default::default() };
        let chainer = Chainer::new(params).unwrap();
        let mut km = Arena::with_min_core(4096);
        let output = chainer.chain(&anchors, Some(&mut km), &mut ReferenceBackend::new());

        let firsts: Vec<u64> = output.iter().map(|(_, m)| m[0].ref_key()).collect();
        prop_assert!(firsts.windows(2).all(|w| w[0] <= w[1]));
        for (chain, members) in output.iter() {
            prop_assert!(chain.count >= min_count);
            prop_assert!(chain.score >= 20);
            prop_assert!(members.windows(2).all(|w| w[0].ref_key() <= w[1].ref_key()));
        }
        let total: usize = output.chains.iter().map(|c| c.count as usize).sum();
        prop_assert_eq!(total, output.anchors.len());
        let stats = km.stat();
        prop_assert_eq!(stats.available, stats.capacity);
    }
}
