//! Baseline vs refined comparisons: means, percentage improvement, a
//! nonparametric significance test and the Vargha-Delaney A12 effect size.

use serde::{Deserialize, Serialize};

/// Reporting threshold for `significant`.
pub const ALPHA: f64 = 0.05;

/// Largest sample for which the Wilcoxon p-value is computed exactly.
const EXACT_WILCOXON_MAX_N: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceTest {
    /// Paired samples
    WilcoxonSignedRank,
    /// Unpaired samples of different sizes
    MannWhitneyU,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectMagnitude {
    Negligible,
    Small,
    Medium,
    Large,
}

impl EffectMagnitude {
    /// Vargha and Delaney's thresholds on |A12 - 0.5|.
    pub fn of(a12: f64) -> Self {
        let distance = (a12 - 0.5).abs();
        if distance < 0.06 {
            Self::Negligible
        } else if distance < 0.14 {
            Self::Small
        } else if distance < 0.21 {
            Self::Medium
        } else {
            Self::Large
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub n_baseline: usize,
    pub n_refined: usize,
    pub mean_baseline: f64,
    pub mean_refined: f64,
    pub improvement_pct: f64,
    pub test: SignificanceTest,
    pub statistic: f64,
    pub p_value: f64,
    pub significant: bool,
    pub a12: f64,
    pub magnitude: EffectMagnitude,
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Relative change of the means in percent; 0 when the baseline mean is 0.
pub fn improvement_pct(baseline: &[f64], refined: &[f64]) -> f64 {
    let base = mean(baseline);
    if base == 0.0 {
        0.0
    } else {
        (mean(refined) - base) / base * 100.0
    }
}

/// Compare two metric vectors. Equal lengths are treated as paired.
pub fn compare(baseline: &[f64], refined: &[f64]) -> Comparison {
    let (test, statistic, p_value) = if baseline.len() == refined.len() {
        let (w, p) = wilcoxon_signed_rank(baseline, refined);
        (SignificanceTest::WilcoxonSignedRank, w, p)
    } else {
        let (u, p) = mann_whitney_u(baseline, refined);
        (SignificanceTest::MannWhitneyU, u, p)
    };
    let a12 = vargha_delaney_a12(baseline, refined);

    Comparison {
        n_baseline: baseline.len(),
        n_refined: refined.len(),
        mean_baseline: mean(baseline),
        mean_refined: mean(refined),
        improvement_pct: improvement_pct(baseline, refined),
        test,
        statistic,
        p_value,
        significant: p_value < ALPHA,
        a12,
        magnitude: EffectMagnitude::of(a12),
    }
}

/// Average ranks (1-based) and the tie-group sizes.
fn rank(values: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut ties = Vec::new();
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let average = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = average;
        }
        if j > i {
            ties.push(j - i + 1);
        }
        i = j + 1;
    }
    (ranks, ties)
}

fn tie_term(ties: &[usize]) -> f64 {
    ties.iter()
        .map(|&t| {
            let t = t as f64;
            t * t * t - t
        })
        .sum()
}

/// Two-sided Wilcoxon signed-rank test on `refined - baseline`.
/// Returns `(T, p)` where `T` is the smaller of the signed rank sums.
pub fn wilcoxon_signed_rank(baseline: &[f64], refined: &[f64]) -> (f64, f64) {
    let diffs: Vec<f64> = baseline
        .iter()
        .zip(refined)
        .map(|(b, r)| r - b)
        .filter(|d| *d != 0.0)
        .collect();
    let n = diffs.len();
    if n == 0 {
        return (0.0, 1.0);
    }

    let magnitudes: Vec<f64> = diffs.iter().map(|d| d.abs()).collect();
    let (ranks, ties) = rank(&magnitudes);
    let w_plus: f64 = diffs
        .iter()
        .zip(&ranks)
        .filter(|(d, _)| **d > 0.0)
        .map(|(_, r)| r)
        .sum();
    let total = (n * (n + 1)) as f64 / 2.0;
    let t = w_plus.min(total - w_plus);

    if n <= EXACT_WILCOXON_MAX_N && ties.is_empty() {
        return (t, exact_wilcoxon_p(n, t as usize));
    }

    let nf = n as f64;
    let mu = nf * (nf + 1.0) / 4.0;
    let variance = nf * (nf + 1.0) * (2.0 * nf + 1.0) / 24.0 - tie_term(&ties) / 48.0;
    if variance <= 0.0 {
        return (t, 1.0);
    }
    let z = (t - mu) / variance.sqrt();
    (t, two_sided_normal_p(z))
}

/// `2 * P(W <= t)` under the null distribution of the signed-rank sum.
fn exact_wilcoxon_p(n: usize, t: usize) -> f64 {
    let max_sum = n * (n + 1) / 2;
    // counts[s] = number of rank subsets summing to s
    let mut counts = vec![0u64; max_sum + 1];
    counts[0] = 1;
    for r in 1..=n {
        for s in (r..=max_sum).rev() {
            counts[s] += counts[s - r];
        }
    }
    let at_most: u64 = counts[..=t.min(max_sum)].iter().sum();
    let p = 2.0 * at_most as f64 / 2f64.powi(n as i32);
    p.min(1.0)
}

/// Two-sided Mann-Whitney U with tie and continuity correction.
/// Returns `(U_refined, p)`.
pub fn mann_whitney_u(baseline: &[f64], refined: &[f64]) -> (f64, f64) {
    let n1 = refined.len() as f64;
    let n2 = baseline.len() as f64;
    if refined.is_empty() || baseline.is_empty() {
        return (0.0, 1.0);
    }

    let combined: Vec<f64> = refined.iter().chain(baseline).copied().collect();
    let (ranks, ties) = rank(&combined);
    let r1: f64 = ranks[..refined.len()].iter().sum();
    let u = r1 - n1 * (n1 + 1.0) / 2.0;

    let n = n1 + n2;
    let mu = n1 * n2 / 2.0;
    let variance = n1 * n2 / 12.0 * ((n + 1.0) - tie_term(&ties) / (n * (n - 1.0)));
    if variance <= 0.0 {
        return (u, 1.0);
    }
    let z = ((u - mu).abs() - 0.5).max(0.0) / variance.sqrt();
    (u, two_sided_normal_p(z))
}

/// Probability that a refined value exceeds a baseline value, ties
/// counting half.
pub fn vargha_delaney_a12(baseline: &[f64], refined: &[f64]) -> f64 {
    if baseline.is_empty() || refined.is_empty() {
        return 0.5;
    }
    let m = refined.len() as f64;
    let n = baseline.len() as f64;
    let combined: Vec<f64> = refined.iter().chain(baseline).copied().collect();
    let (ranks, _) = rank(&combined);
    let r1: f64 = ranks[..refined.len()].iter().sum();
    (r1 / m - (m + 1.0) / 2.0) / n
}

/// Spearman rank correlation; 0 when either side is constant.
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let (rx, _) = rank(&x[..n]);
    let (ry, _) = rank(&y[..n]);
    let (mx, my) = (mean(&rx), mean(&ry));

    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in rx.iter().zip(&ry) {
        cov += (a - mx) * (b - my);
        vx += (a - mx) * (a - mx);
        vy += (b - my) * (b - my);
    }
    if vx == 0.0 || vy == 0.0 {
        0.0
    } else {
        cov / (vx * vy).sqrt()
    }
}

fn two_sided_normal_p(z: f64) -> f64 {
    erfc(z.abs() / std::f64::consts::SQRT_2).min(1.0)
}

/// Complementary error function, Chebyshev fit with relative error < 1.2e-7.
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87
                                    + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let r = t * poly.exp();
    if x >= 0.0 {
        r
    } else {
        2.0 - r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    // =========================================================================
    // Descriptive statistics
    // =========================================================================

    #[test]
    fn test_mean_and_improvement() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[10.0, 20.0, 30.0]), 20.0);
        assert!(close(
            improvement_pct(&[10.0, 20.0, 30.0], &[15.0, 25.0, 35.0]),
            25.0,
            1e-9
        ));
        assert_eq!(improvement_pct(&[0.0, 0.0], &[5.0, 5.0]), 0.0);
    }

    #[test]
    fn test_rank_average_ties() {
        let (ranks, ties) = rank(&[3.0, 1.0, 3.0, 2.0]);
        assert_eq!(ranks, vec![3.5, 1.0, 3.5, 2.0]);
        assert_eq!(ties, vec![2]);
    }

    // =========================================================================
    // Wilcoxon
    // =========================================================================

    #[test]
    fn test_wilcoxon_tied_differences_use_normal_approximation() {
        let (t, p) = wilcoxon_signed_rank(&[10.0, 20.0, 30.0], &[15.0, 25.0, 35.0]);
        assert_eq!(t, 0.0);
        assert!(close(p, 0.0833, 1e-3));
    }

    #[test]
    fn test_wilcoxon_exact() {
        let baseline = [0.0; 5];
        let refined = [1.0, 2.0, 3.0, 4.0, 5.0];
        let (t, p) = wilcoxon_signed_rank(&baseline, &refined);
        assert_eq!(t, 0.0);
        assert!(close(p, 0.0625, 1e-12));
    }

    #[test]
    fn test_wilcoxon_no_differences() {
        let (_, p) = wilcoxon_signed_rank(&[1.0, 2.0], &[1.0, 2.0]);
        assert_eq!(p, 1.0);
    }

    #[test]
    fn test_exact_distribution_is_symmetric() {
        // n = 4: 16 subsets, P(W <= 0) = 1/16
        assert!(close(exact_wilcoxon_p(4, 0), 2.0 / 16.0, 1e-12));
        // the median sum gives p capped at 1
        assert_eq!(exact_wilcoxon_p(4, 5), 1.0);
    }

    // =========================================================================
    // Mann-Whitney and A12
    // =========================================================================

    #[test]
    fn test_mann_whitney_separated_samples() {
        let baseline = [1.0, 2.0, 3.0, 4.0, 5.0];
        let refined = [6.0, 7.0, 8.0, 9.0, 10.0, 11.0];
        let (u, p) = mann_whitney_u(&baseline, &refined);
        assert_eq!(u, 30.0);
        assert!(p < 0.05);
    }

    #[test]
    fn test_mann_whitney_constant_samples() {
        let (_, p) = mann_whitney_u(&[1.0, 1.0], &[1.0, 1.0, 1.0]);
        assert_eq!(p, 1.0);
    }

    #[test]
    fn test_a12() {
        assert!(close(
            vargha_delaney_a12(&[10.0, 20.0, 30.0], &[15.0, 25.0, 35.0]),
            2.0 / 3.0,
            1e-12
        ));
        assert_eq!(vargha_delaney_a12(&[1.0, 1.0], &[1.0, 1.0]), 0.5);
        assert_eq!(vargha_delaney_a12(&[1.0], &[2.0]), 1.0);
        assert_eq!(vargha_delaney_a12(&[], &[2.0]), 0.5);
    }

    #[test]
    fn test_effect_magnitude() {
        assert_eq!(EffectMagnitude::of(0.5), EffectMagnitude::Negligible);
        assert_eq!(EffectMagnitude::of(0.6), EffectMagnitude::Small);
        assert_eq!(EffectMagnitude::of(0.3), EffectMagnitude::Medium);
        assert_eq!(EffectMagnitude::of(1.0), EffectMagnitude::Large);
    }

    // =========================================================================
    // compare
    // =========================================================================

    #[test]
    fn test_compare_paired_improvement() {
        let c = compare(&[10.0, 20.0, 30.0], &[15.0, 25.0, 35.0]);
        assert_eq!(c.test, SignificanceTest::WilcoxonSignedRank);
        assert!(close(c.mean_baseline, 20.0, 1e-12));
        assert!(close(c.mean_refined, 25.0, 1e-12));
        assert!(close(c.improvement_pct, 25.0, 1e-9));
        assert!(c.a12 > 0.5);
        assert!(!c.significant);
    }

    #[test]
    fn test_compare_unpaired() {
        let c = compare(&[1.0, 2.0], &[3.0, 4.0, 5.0]);
        assert_eq!(c.test, SignificanceTest::MannWhitneyU);
        assert_eq!(c.a12, 1.0);
    }

    #[test]
    fn test_spearman() {
        assert!(close(spearman(&[1.0, 2.0, 3.0], &[10.0, 20.0, 30.0]), 1.0, 1e-12));
        assert!(close(spearman(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]), -1.0, 1e-12));
        assert_eq!(spearman(&[1.0, 1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_erfc() {
        assert!(close(erfc(0.0), 1.0, 1e-7));
        assert!(close(erfc(1.0), 0.157_299_2, 1e-6));
        assert!(close(erfc(-1.0), 1.842_700_8, 1e-6));
    }
}
