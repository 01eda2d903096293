use archipelago::stats::{Extinction, OnlineStats};
use rstest::rstest;

fn pushed(values: &[f64]) -> OnlineStats {
    let mut s = OnlineStats::new();
    values.iter().for_each(|&v| s.push(v));
    s
}

#[test]
fn test_all_takeovers() {
    let s = pushed(&[1.0, 1.0, 1.0, 1.0]);
    assert_eq!(s.mean(), 1.0);
    assert_eq!(s.extinction_rate(Extinction::Incumbent), 1.0);
    assert_eq!(s.extinction_rate(Extinction::Mutant), 0.0);
    assert_eq!(s.variance(), 0.0);
}

#[test]
fn test_half_and_half() {
    let s = pushed(&[0.0, 0.0, 1.0, 1.0]);
    assert!((s.mean() - 0.5).abs() < 1e-12);
    assert_eq!(s.extinction_rate(Extinction::Incumbent), 0.5);
    assert_eq!(s.extinction_rate(Extinction::Mutant), 0.5);
    // Sample variance of {0, 0, 1, 1}.
    assert!((s.variance() - 1.0 / 3.0).abs() < 1e-12);
}

#[rstest]
#[case(&[])]
#[case(&[0.42])]
fn test_variance_zero_below_two_samples(#[case] values: &[f64]) {
    let s = pushed(values);
    assert_eq!(s.variance(), 0.0);
    assert_eq!(s.stddev(), 0.0);
}

#[rstest]
#[case(0.25, 10)]
#[case(0.0, 3)]
#[case(1.0, 7)]
fn test_constant_sequence_has_zero_variance(#[case] value: f64, #[case] n: usize) {
    let s = pushed(&vec![value; n]);
    assert!(s.variance().abs() < 1e-15);
    assert!((s.mean() - value).abs() < 1e-15);
}

#[test]
fn test_intermediate_outcomes_are_not_extinctions() {
    let s = pushed(&[0.5, 0.25, 0.999]);
    assert_eq!(s.extinction_rate(Extinction::Mutant), 0.0);
    assert_eq!(s.extinction_rate(Extinction::Incumbent), 0.0);
}

#[test]
fn test_matches_two_pass_variance() {
    let xs = [0.1, 0.9, 0.3, 0.3, 0.75, 0.0, 1.0, 0.6];
    let s = pushed(&xs);
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    assert!((s.mean() - mean).abs() < 1e-12);
    assert!((s.variance() - var).abs() < 1e-12);
}
