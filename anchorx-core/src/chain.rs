//! Chaining module
//!
//! Dynamic programming over anchors sorted by [`Anchor::ref_key`], followed
//! by chain extraction, backtracking and a final reorder by reference
//! position. Every intermediate buffer lives in an [`Arena`].
//!
//! The key is the reference coordinate read as unsigned, so the strand bit
//! puts every forward anchor before every reverse one. Sorting by the signed
//! coordinate is not enough: reverse anchors would come first and the window
//! would link them to forward anchors.

use serde::{Deserialize, Serialize};

use crate::arena::{view_mut, Arena, Block};
use crate::error::{fatal, ChainError, ChainResult};
use crate::radix::{self, Pair128};
use crate::scoring::{Gaps, JointContext, ScoringBackend};
use crate::types::{Anchor, Chain, ChainOutput};

/// Parameters for the chaining algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Maximum reference distance between linked anchors
    #[serde(default = "default_max_dist")]
    pub max_dist_x: i32,
    /// Maximum query distance between linked anchors of one segment
    #[serde(default = "default_max_dist")]
    pub max_dist_y: i32,
    /// Maximum diagonal drift between linked anchors
    #[serde(default = "default_bandwidth")]
    pub bandwidth: i32,
    /// Non-improving predecessors tolerated before the scan stops
    #[serde(default = "default_max_skip")]
    pub max_skip: i32,
    /// Maximum number of predecessors scanned per anchor
    #[serde(default = "default_max_iter")]
    pub max_iter: i32,
    /// Minimum number of anchors in a reported chain
    #[serde(default = "default_min_count")]
    pub min_count: i32,
    /// Minimum score of a reported chain
    #[serde(default = "default_min_score")]
    pub min_score: i32,
    #[serde(default = "default_gap_scale")]
    pub gap_scale: f32,
    /// Spliced (cDNA) gap model
    #[serde(default)]
    pub is_spliced: bool,
    #[serde(default = "default_segment_count")]
    pub segment_count: i32,
}

fn default_max_dist() -> i32 {
    5000
}

fn default_bandwidth() -> i32 {
    500
}

fn default_max_skip() -> i32 {
    25
}

fn default_max_iter() -> i32 {
    5000
}

fn default_min_count() -> i32 {
    3
}

fn default_min_score() -> i32 {
    40
}

fn default_gap_scale() -> f32 {
    1.0
}

fn default_segment_count() -> i32 {
    1
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            max_dist_x: default_max_dist(),
            max_dist_y: default_max_dist(),
            bandwidth: default_bandwidth(),
            max_skip: default_max_skip(),
            max_iter: default_max_iter(),
            min_count: default_min_count(),
            min_score: default_min_score(),
            gap_scale: default_gap_scale(),
            is_spliced: false,
            segment_count: default_segment_count(),
        }
    }
}

impl ChainParams {
    pub fn validate(&self) -> ChainResult<()> {
        let limits = [
            ("max_dist_x", self.max_dist_x),
            ("max_dist_y", self.max_dist_y),
            ("bandwidth", self.bandwidth),
            ("max_skip", self.max_skip),
            ("max_iter", self.max_iter),
        ];
        for (name, value) in limits {
            if value < 0 {
                return Err(ChainError::InvalidParams(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        if self.segment_count < 1 {
            return Err(ChainError::InvalidParams(format!(
                "segment_count must be at least 1, got {}",
                self.segment_count
            )));
        }
        if !self.gap_scale.is_finite() || self.gap_scale < 0.0 {
            return Err(ChainError::InvalidParams(format!(
                "gap_scale must be a finite non-negative number, got {}",
                self.gap_scale
            )));
        }
        Ok(())
    }

    /// Policy filters on a predecessor. Rejected pairs are skipped, not errors.
    fn admissible(&self, ctx: &JointContext, pred: &Anchor, gaps: Gaps) -> bool {
        let same_segment = ctx.segment == pred.segment();
        let Gaps { dr, dq, dd } = gaps;
        if (same_segment && dr == 0) || dq <= 0 {
            return false;
        }
        if (same_segment && dq > self.max_dist_y) || dq > self.max_dist_x {
            return false;
        }
        if same_segment && dd > self.bandwidth {
            return false;
        }
        if self.segment_count > 1 && !self.is_spliced && same_segment && dr > self.max_dist_y as i64 {
            return false;
        }
        true
    }
}

/// Chaining algorithm implementation
#[derive(Debug, Clone)]
pub struct Chainer {
    params: ChainParams,
}

impl Chainer {
    pub fn new(params: ChainParams) -> ChainResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Chain `anchors`, which must be non-decreasing by [`Anchor::ref_key`]
    /// (unsigned; the sign bit is the strand). [`crate::radix::sort`] gives
    /// that order.
    ///
    /// With no arena the call runs on a private one that is torn down before
    /// returning.
    pub fn chain(
        &self,
        anchors: &[Anchor],
        arena: Option<&mut Arena>,
        backend: &mut dyn ScoringBackend,
    ) -> ChainOutput {
        chain_dp(&self.params, anchors, arena, backend)
    }
}

fn scratch(km: &mut Arena, count: usize, elem_size: usize) -> Block {
    let bytes = count
        .checked_mul(elem_size)
        .unwrap_or_else(|| fatal("[chain] scratch size overflow"));
    km.allocate(bytes)
        .unwrap_or_else(|| fatal("[chain] empty scratch request"))
}

/// Run the chaining DP with explicit parameters.
///
/// Parameters are used as given; [`Chainer::new`] is the validating entry.
/// `anchors` must be non-decreasing by [`Anchor::ref_key`].
pub fn chain_dp(
    params: &ChainParams,
    anchors: &[Anchor],
    arena: Option<&mut Arena>,
    backend: &mut dyn ScoringBackend,
) -> ChainOutput {
    let n = anchors.len();
    if n == 0 {
        return ChainOutput::default();
    }
    debug_assert!(
        anchors.windows(2).all(|w| w[0].ref_key() <= w[1].ref_key()),
        "anchors must be sorted by ref_key"
    );
    let mut private = None;
    let km = match arena {
        Some(km) => km,
        None => private.insert(Arena::with_min_core(n.saturating_mul(5).saturating_add(64))),
    };

    let f_blk = scratch(km, n, 4);
    let p_blk = scratch(km, n, 4);
    let t_blk = km
        .zeroed_allocate(n, 4)
        .unwrap_or_else(|| fatal("[chain] empty scratch request"));
    let v_blk = scratch(km, n, 4);

    let sum_span = backend.span_sum(anchors);
    let avg_span = sum_span as f32 / n as f32;

    // fill the score and backtrack arrays
    {
        let [fw, pw, tw, vw] = km.slices_mut([&f_blk, &p_blk, &t_blk, &v_blk]);
        let f = view_mut::<i32>(fw, n);
        let p = view_mut::<i32>(pw, n);
        let t = view_mut::<i32>(tw, n);
        let v = view_mut::<i32>(vw, n);

        let max_dist_x = params.max_dist_x as i64 as u64;
        let max_iter = params.max_iter.max(0) as usize;
        let mut st = 0usize;
        for i in 0..n {
            let ri = anchors[i].ref_key();
            let ctx = JointContext::new(params.is_spliced, &anchors[i], avg_span, params.gap_scale);
            backend.load_context(&ctx);

            let mut max_j = -1i32;
            let mut max_f = ctx.span;
            let mut n_skip = 0;

            while st < i && ri > anchors[st].ref_key().wrapping_add(max_dist_x) {
                st += 1;
            }
            if i - st > max_iter {
                st = i - max_iter;
            }

            for j in (st..i).rev() {
                let gaps = Gaps::between(&ctx, &anchors[j]);
                if !params.admissible(&ctx, &anchors[j], gaps) {
                    continue;
                }
                let sc = backend.joint_score(anchors, j).round_to_i32() + f[j];
                if sc > max_f {
                    max_f = sc;
                    max_j = j as i32;
                    if n_skip > 0 {
                        n_skip -= 1;
                    }
                } else if t[j] == i as i32 {
                    n_skip += 1;
                    if n_skip > params.max_skip {
                        break;
                    }
                }
                if p[j] >= 0 {
                    t[p[j] as usize] = i as i32;
                }
            }

            f[i] = max_f;
            p[i] = max_j;
            // v[] keeps the peak score on the path up to i; f[] is the score ending at i
            v[i] = if max_j >= 0 && v[max_j as usize] > max_f {
                v[max_j as usize]
            } else {
                max_f
            };
        }
    }

    // chain ends: anchors nobody links back to
    let n_u = {
        let [pw, tw, vw] = km.slices_mut([&p_blk, &t_blk, &v_blk]);
        let p = view_mut::<i32>(pw, n);
        let t = view_mut::<i32>(tw, n);
        let v = view_mut::<i32>(vw, n);
        t.fill(0);
        for i in 0..n {
            if p[i] >= 0 {
                t[p[i] as usize] = 1;
            }
        }
        (0..n).filter(|&i| t[i] == 0 && v[i] >= params.min_score).count()
    };
    if n_u == 0 {
        for blk in [f_blk, p_blk, t_blk, v_blk] {
            km.free(blk);
        }
        log::debug!("no chain among {} anchors reaches score {}", n, params.min_score);
        return ChainOutput::default();
    }

    let u_blk = scratch(km, n_u, 8);
    let (n_chains, n_v) = {
        let [fw, pw, tw, vw, uw] = km.slices_mut([&f_blk, &p_blk, &t_blk, &v_blk, &u_blk]);
        let f = view_mut::<i32>(fw, n);
        let p = view_mut::<i32>(pw, n);
        let t = view_mut::<i32>(tw, n);
        let v = view_mut::<i32>(vw, n);
        let u = view_mut::<u64>(uw, n_u);

        let mut n_u = 0;
        for i in 0..n {
            if t[i] == 0 && v[i] >= params.min_score {
                // move the end back to where the path peaks
                let mut j = i as i64;
                while j >= 0 && f[j as usize] < v[j as usize] {
                    j = p[j as usize] as i64;
                }
                if j < 0 {
                    j = i as i64;
                }
                u[n_u] = (f[j as usize] as u32 as u64) << 32 | j as u64;
                n_u += 1;
            }
        }
        radix::sort_u64(u);
        u.reverse();

        // backtrack from the highest score down
        t.fill(0);
        let min_count = params.min_count.max(0) as usize;
        let (mut n_v, mut k) = (0usize, 0usize);
        for i in 0..n_u {
            let (n_v0, k0) = (n_v, k);
            let head_score = (u[i] >> 32) as i32;
            let mut j = u[i] as i32 as i64;
            loop {
                v[n_v] = j as i32;
                n_v += 1;
                t[j as usize] = 1;
                j = p[j as usize] as i64;
                if j < 0 || t[j as usize] != 0 {
                    break;
                }
            }
            let members = n_v - n_v0;
            if j < 0 {
                if members >= min_count {
                    u[k] = (head_score as u32 as u64) << 32 | members as u64;
                    k += 1;
                }
            } else {
                // clipped by an earlier chain; only the part above it counts
                let score = head_score.wrapping_sub(f[j as usize]);
                if score >= params.min_score && members >= min_count {
                    u[k] = (score as u32 as u64) << 32 | members as u64;
                    k += 1;
                }
            }
            if k0 == k {
                n_v = n_v0;
            }
        }
        (k, n_v)
    };
    for blk in [f_blk, p_blk, t_blk] {
        km.free(blk);
    }
    if n_chains == 0 {
        km.free(v_blk);
        km.free(u_blk);
        log::debug!("no chain among {} anchors reaches {} members", n, params.min_count);
        return ChainOutput::default();
    }

    // members of each chain in ascending reference order
    let b_blk = scratch(km, n_v, std::mem::size_of::<Anchor>());
    {
        let [vw, uw, bw] = km.slices_mut([&v_blk, &u_blk, &b_blk]);
        let v = view_mut::<i32>(vw, n_v);
        let u = view_mut::<u64>(uw, n_chains);
        let b = view_mut::<Anchor>(bw, n_v);
        let mut k = 0;
        for &word in u.iter() {
            let (k0, ni) = (k, word as i32 as usize);
            for j in 0..ni {
                b[k] = anchors[v[k0 + (ni - j - 1)] as usize];
                k += 1;
            }
        }
    }
    km.free(v_blk);

    // order chains by the reference position of their first member
    let w_blk = scratch(km, n_chains, std::mem::size_of::<Pair128>());
    let u2_blk = scratch(km, n_chains, 8);
    let out_blk = scratch(km, n_v, std::mem::size_of::<Anchor>());
    {
        let [uw, bw, ww, u2w, ow] = km.slices_mut([&u_blk, &b_blk, &w_blk, &u2_blk, &out_blk]);
        let u = view_mut::<u64>(uw, n_chains);
        let b = view_mut::<Anchor>(bw, n_v);
        let w = view_mut::<Pair128>(ww, n_chains);
        let u2 = view_mut::<u64>(u2w, n_chains);
        let out = view_mut::<Anchor>(ow, n_v);

        let mut k = 0usize;
        for (i, slot) in w.iter_mut().enumerate() {
            *slot = Pair128 {
                x: b[k].ref_key(),
                y: (k as u64) << 32 | i as u64,
            };
            k += u[i] as i32 as usize;
        }
        radix::sort_primary128(w);

        let mut k = 0usize;
        for (i, pair) in w.iter().enumerate() {
            let chain = pair.y as u32 as usize;
            let start = (pair.y >> 32) as usize;
            let count = u[chain] as i32 as usize;
            u2[i] = u[chain];
            out[k..k + count].copy_from_slice(&b[start..start + count]);
            k += count;
        }
    }

    let output = ChainOutput {
        anchors: km.slice::<Anchor>(&out_blk, n_v).to_vec(),
        chains: km
            .slice::<u64>(&u2_blk, n_chains)
            .iter()
            .map(|&word| Chain::from_packed(word))
            .collect(),
    };
    for blk in [u_blk, b_blk, w_blk, u2_blk, out_blk] {
        km.free(blk);
    }

    log::debug!(
        "{} anchors -> {} chains with {} members (backend: {})",
        n,
        output.chains.len(),
        output.anchors.len(),
        backend.name()
    );
    if log::log_enabled!(log::Level::Trace) {
        log::trace!("arena after chaining: {:?}", km.stat());
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::ReferenceBackend;
    use crate::types::Strand;

    /// Anchors on one diagonal at the given offsets, span 15.
    fn diagonal(offsets: &[i64]) -> Vec<Anchor> {
        offsets
            .iter()
            .map(|&d| Anchor::new(10_000 + d, 19 + d as u32, 15, 0))
            .collect()
    }

    #[test]
    fn test_default_params() {
        let params = ChainParams::default();
        assert_eq!(params.max_dist_x, 5000);
        assert_eq!(params.bandwidth, 500);
        assert_eq!(params.min_score, 40);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_invalid_params() {
        let params = ChainParams {
            bandwidth: -1,
            ..Default::default()
        };
        assert!(matches!(Chainer::new(params), Err(ChainError::InvalidParams(_))));

        let params = ChainParams {
            segment_count: 0,
            ..Default::default()
        };
        assert!(Chainer::new(params).is_err());

        let params = ChainParams {
            gap_scale: f32::NAN,
            ..Default::default()
        };
        assert!(Chainer::new(params).is_err());
    }

    #[test]
    fn test_empty_input() {
        let chainer = Chainer::new(ChainParams::default()).unwrap();
        let output = chainer.chain(&[], None, &mut ReferenceBackend::new());
        assert!(output.is_empty());
        assert!(output.anchors.is_empty());
    }

    #[test]
    fn test_single_diagonal() {
        let anchors = diagonal(&[0, 7, 17, 20, 25, 35, 45, 46]);
        let chainer = Chainer::new(ChainParams::default()).unwrap();
        let mut km = Arena::with_min_core(256);
        let output = chainer.chain(&anchors, Some(&mut km), &mut ReferenceBackend::new());

        assert_eq!(output.chains, vec![Chain { score: 61, count: 8 }]);
        assert_eq!(output.anchors, anchors);

        let stats = km.stat();
        assert_eq!(stats.available, stats.capacity);
    }

    #[test]
    fn test_below_min_score() {
        // 15 + 10 + 10 = 35 < 40
        let anchors = diagonal(&[0, 10, 20]);
        let chainer = Chainer::new(ChainParams::default()).unwrap();
        let output = chainer.chain(&anchors, None, &mut ReferenceBackend::new());
        assert!(output.is_empty());
    }

    #[test]
    fn test_below_min_count() {
        let anchors = diagonal(&[0, 30]);
        let params = ChainParams {
            min_score: 10,
            ..Default::default()
        };
        let chainer = Chainer::new(params).unwrap();
        let output = chainer.chain(&anchors, None, &mut ReferenceBackend::new());
        assert!(output.is_empty());
    }

    #[test]
    fn test_distance_splits_chains() {
        let mut anchors = diagonal(&[0, 15, 30, 45]);
        anchors.extend(diagonal(&[20_000, 20_015, 20_030, 20_045]));
        let chainer = Chainer::new(ChainParams::default()).unwrap();
        let output = chainer.chain(&anchors, None, &mut ReferenceBackend::new());

        assert_eq!(output.len(), 2);
        for (chain, members) in output.iter() {
            assert_eq!(chain.score, 60);
            assert_eq!(chain.count, 4);
            assert!(members.windows(2).all(|w| w[0].ref_pos < w[1].ref_pos));
        }
        assert_eq!(output.anchors[0].ref_pos, 10_000);
        assert_eq!(output.anchors[4].ref_pos, 30_000);
    }

    fn loose() -> ChainParams {
        ChainParams {
            min_score: 1,
            min_count: 1,
            ..Default::default()
        }
    }

    fn run(params: ChainParams, anchors: &[Anchor]) -> ChainOutput {
        let chainer = Chainer::new(params).unwrap();
        chainer.chain(anchors, None, &mut ReferenceBackend::new())
    }

    #[test]
    fn test_strands_chain_separately() {
        let mut anchors = diagonal(&[0, 15, 30]);
        for k in 0..3i64 {
            let key = 1u64 << 63 | (2000 + k * 15) as u64;
            anchors.push(Anchor::new(key as i64, (300 + k * 15) as u32, 15, 0));
        }
        let output = run(ChainParams::default(), &anchors);

        assert_eq!(output.chains, vec![Chain { score: 45, count: 3 }; 2]);
        for (_, members) in output.iter() {
            assert!(members.iter().all(|a| a.strand() == members[0].strand()));
        }
        assert_eq!(output.anchors[0].strand(), Strand::Forward);
        assert_eq!(output.anchors[3].strand(), Strand::Reverse);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "sorted by ref_key")]
    fn test_signed_order_rejected() {
        let mut anchors = vec![Anchor::new(-5, 0, 15, 0)];
        anchors.extend(diagonal(&[0, 15]));
        run(ChainParams::default(), &anchors);
    }

    #[test]
    fn test_max_iter_limits_window() {
        // the anchor at 1010 blocks the direct predecessor of 1030
        let anchors = [
            Anchor::new(1000, 100, 15, 0),
            Anchor::new(1010, 500, 15, 0),
            Anchor::new(1030, 130, 15, 0),
            Anchor::new(1045, 145, 15, 0),
            Anchor::new(1060, 160, 15, 0),
        ];
        let output = run(ChainParams::default(), &anchors);
        assert_eq!(output.chains, vec![Chain { score: 60, count: 4 }]);

        let params = ChainParams {
            max_iter: 1,
            ..Default::default()
        };
        let output = run(params, &anchors);
        assert_eq!(output.chains, vec![Chain { score: 45, count: 3 }]);
        assert_eq!(output.anchors, anchors[2..].to_vec());
    }

    #[test]
    fn test_bandwidth_rejects_drift() {
        // dd = 11 between the first two anchors
        let anchors = [
            Anchor::new(1000, 100, 15, 0),
            Anchor::new(1030, 119, 15, 0),
            Anchor::new(1045, 134, 15, 0),
        ];
        let within = ChainParams {
            bandwidth: 11,
            ..loose()
        };
        // 15 + (15 - 2) + 15
        assert_eq!(run(within, &anchors).chains, vec![Chain { score: 43, count: 3 }]);

        let beyond = ChainParams {
            bandwidth: 10,
            ..loose()
        };
        assert_eq!(
            run(beyond, &anchors).chains,
            vec![Chain { score: 15, count: 1 }, Chain { score: 30, count: 2 }]
        );
    }

    #[test]
    fn test_query_distance_limit() {
        let anchors = diagonal(&[0, 30, 60]);
        let params = ChainParams {
            max_dist_y: 30,
            ..loose()
        };
        assert_eq!(run(params, &anchors).chains, vec![Chain { score: 45, count: 3 }]);

        let params = ChainParams {
            max_dist_y: 29,
            ..loose()
        };
        assert_eq!(run(params, &anchors).chains, vec![Chain { score: 15, count: 1 }; 3]);
    }

    #[test]
    fn test_reference_gap_limit_with_segments() {
        // dr = 150 and dq = 100 between the first two anchors
        let anchors = [
            Anchor::new(1000, 100, 15, 0),
            Anchor::new(1150, 200, 15, 0),
            Anchor::new(1165, 215, 15, 0),
        ];
        let single = ChainParams {
            max_dist_y: 100,
            ..loose()
        };
        // 15 + (15 - 9) + 15
        assert_eq!(run(single, &anchors).chains, vec![Chain { score: 36, count: 3 }]);

        let paired = ChainParams {
            max_dist_y: 100,
            segment_count: 2,
            ..loose()
        };
        assert_eq!(
            run(paired, &anchors).chains,
            vec![Chain { score: 15, count: 1 }, Chain { score: 30, count: 2 }]
        );
    }

    #[test]
    fn test_max_skip_stops_scan() {
        // the 1060/1075 pair sits on another diagonal and hides the run before it
        let anchors = [
            Anchor::new(1000, 100, 15, 0),
            Anchor::new(1015, 115, 15, 0),
            Anchor::new(1030, 130, 15, 0),
            Anchor::new(1045, 145, 15, 0),
            Anchor::new(1060, 50, 15, 0),
            Anchor::new(1075, 65, 15, 0),
            Anchor::new(1090, 190, 15, 0),
        ];
        let output = run(ChainParams::default(), &anchors);
        assert_eq!(output.chains, vec![Chain { score: 75, count: 5 }]);

        let params = ChainParams {
            max_skip: 0,
            ..Default::default()
        };
        let output = run(params, &anchors);
        assert_eq!(output.chains, vec![Chain { score: 60, count: 4 }]);
        assert_eq!(output.anchors, anchors[..4].to_vec());
    }
}
