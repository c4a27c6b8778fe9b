//! Demo command - chain the built-in eight anchor scenario

use anchorx_accel::BackendKind;
use anchorx_core::{Anchor, Arena, ChainOutput, Chainer};
use anyhow::Result;

use crate::config::Config;

/// Eight reverse-strand anchors on one diagonal, span 15.
pub fn demo_anchors() -> Vec<Anchor> {
    const RAW: [(i64, u64); 8] = [
        (-9223372036854763668, 64424509459),
        (-9223372036854763661, 64424509466),
        (-9223372036854763651, 64424509476),
        (-9223372036854763648, 64424509479),
        (-9223372036854763643, 64424509484),
        (-9223372036854763633, 64424509494),
        (-9223372036854763623, 64424509504),
        (-9223372036854763622, 64424509505),
    ];
    RAW.iter().map(|&(x, y)| Anchor::from_raw(x, y)).collect()
}

pub fn run(config: &Config, backend: Option<BackendKind>) -> Result<ChainOutput> {
    let kind = backend.unwrap_or(config.accel.backend);
    let mut scorer = super::open_backend(kind)?;
    let chainer = Chainer::new(config.chain.clone())?;
    let mut km = Arena::from_config(&config.arena);

    let anchors = demo_anchors();
    log::info!("Chaining {} demo anchors with the {} backend", anchors.len(), scorer.name());
    let output = chainer.chain(&anchors, Some(&mut km), scorer.as_mut());
    log::debug!("Arena after demo: {:?}", km.stat());
    Ok(output)
}

pub fn execute(config: &Config, backend: Option<BackendKind>) -> Result<()> {
    let output = run(config, backend)?;
    println!("Number of chains: {}", output.len());
    for (i, (chain, members)) in output.iter().enumerate() {
        println!("chain {}: score={} count={}", i, chain.score, chain.count);
        for anchor in members {
            println!(
                "  ref={} query={} span={} strand={}",
                anchor.ref_key() & !(1u64 << 63),
                anchor.query_pos(),
                anchor.span(),
                char::from(anchor.strand())
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorx_core::Chain;

    #[test]
    fn test_demo_with_both_backends() {
        let config = Config::default();
        for kind in [BackendKind::Reference, BackendKind::Emulated] {
            let output = run(&config, Some(kind)).unwrap();
            assert_eq!(output.chains, vec![Chain { score: 61, count: 8 }]);
        }
    }

    #[test]
    fn test_demo_respects_thresholds() {
        let mut config = Config::default();
        config.chain.min_count = 9;
        assert!(run(&config, None).unwrap().is_empty());
    }
}
