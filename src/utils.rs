// src/utils.rs

/// Scores at exactly 0 or 1 would saturate the odds permanently, and an
/// extreme score against an opposite-saturated prior divides zero by zero.
const PROB_EPSILON: f64 = 1e-9;

/// Folds one piece of per-property evidence into the running match
/// probability using the odds form of Bayes:
///
/// `p' = p * s / (p * s + (1 - p) * (1 - s))`
///
/// The operation is associative-commutative on odds, so the order in which
/// property scores arrive does not affect the final value. A score of 0.5
/// carries no evidence and leaves the probability unchanged.
pub fn compute_bayes(prior: f64, score: f64) -> f64 {
    let s = score.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
    (prior * s) / (prior * s + (1.0 - prior) * (1.0 - s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_strong_scores_compound() {
        let p = compute_bayes(compute_bayes(0.5, 0.9), 0.9);
        assert!((p - 0.987_804_878_048_78).abs() < 1e-9);
    }

    #[test]
    fn neutral_score_leaves_prior_unchanged() {
        assert!((compute_bayes(0.5, 0.5) - 0.5).abs() < 1e-12);
        assert!((compute_bayes(0.73, 0.5) - 0.73).abs() < 1e-12);
    }

    #[test]
    fn extreme_scores_saturate_without_dividing_by_zero() {
        let up = compute_bayes(0.5, 1.0);
        assert!(up > 0.999_999);
        // an opposite extreme afterwards must not produce NaN
        let down = compute_bayes(up, 0.0);
        assert!(down.is_finite());
        assert!(down < 0.5);
    }

    #[test]
    fn low_scores_pull_the_probability_down() {
        let p = compute_bayes(0.5, 0.2);
        assert!((p - 0.2).abs() < 1e-9);
        let p = compute_bayes(p, 0.2);
        assert!(p < 0.1);
    }
}
