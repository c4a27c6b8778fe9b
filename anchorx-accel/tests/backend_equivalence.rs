use anchorx_accel::{AcceleratedBackend, EmulatedAccelerator};
use anchorx_core::{Anchor, Arena, Chain, ChainParams, Chainer, ReferenceBackend};
use proptest::prelude::*;

fn scenario_anchors() -> Vec<Anchor> {
    let offsets = [0i64, 7, 17, 20, 25, 35, 45, 46];
    offsets
        .iter()
        .map(|&d| Anchor::from_raw(-9223372036854763668 + d, 64424509459 + d as u64))
        .collect()
}

#[test]
fn emulated_device_reproduces_scenario() {
    let anchors = scenario_anchors();
    let chainer = Chainer::new(ChainParams::default()).unwrap();
    let mut backend = AcceleratedBackend::new(EmulatedAccelerator::new());
    let output = chainer.chain(&anchors, None, &mut backend);

    assert_eq!(output.chains, vec![Chain { score: 61, count: 8 }]);
    let stats = backend.stats();
    assert_eq!(stats.sum_span, 1);
    assert_eq!(stats.load_params, anchors.len() as u64);
    // every earlier anchor is an admissible predecessor
    assert_eq!(stats.joint_score, (anchors.len() * (anchors.len() - 1) / 2) as u64);
}

proptest! {
    #[test]
    fn backends_agree(
        seeds in prop::collection::vec((0i64..20_000, 0u32..20_000, 5u8..40, 0u8..2), 0..200),
        is_spliced in any::<bool>(),
        gap_scale in 0.0f32..3.0,
    ) {
        let mut anchors: Vec<Anchor> = seeds
            .iter()
            .map(|&(r, q, span, seg)| Anchor::new(r, q, span, seg))
            .collect();
        anchors.sort_by_key(|a| a.ref_key());
        let params = ChainParams {
            is_spliced,
            gap_scale,
            segment_count: 2,
            min_score: 15,
            min_count: 2,
            ..Default::default()
        };
        let chainer = Chainer::new(params).unwrap();

        let mut km = Arena::with_min_core(1024);
        let reference = chainer.chain(&anchors, Some(&mut km), &mut ReferenceBackend::new());
        let mut accel = AcceleratedBackend::new(EmulatedAccelerator::new());
        let emulated = chainer.chain(&anchors, Some(&mut km), &mut accel);

        prop_assert_eq!(reference, emulated);
    }
}
