use sliprate::algebra;
use sliprate::parametric::gaussian;
use sliprate::{
    AnalyticalConfig, AnalyticalEngine, ConfidenceMetric, DatedMarker, DiscretePdf, MarkerSequence,
    MonteCarloConfig, MonteCarloEngine, RunStatus, Unit, VariableType,
};

fn age(mean: f64, sd: f64) -> DiscretePdf {
    gaussian(mean, sd, 0.01)
        .unwrap()
        .tagged(VariableType::Age, Some(Unit::KILOYEARS))
        .unwrap()
}

fn displacement(mean: f64, sd: f64) -> DiscretePdf {
    gaussian(mean, sd, 0.05)
        .unwrap()
        .tagged(VariableType::Displacement, Some(Unit::METERS))
        .unwrap()
}

fn standard_normal_cdf(z: f64) -> f64 {
    // Abramowitz and Stegun 7.1.26
    let t = 1.0 / (1.0 + 0.327_591_1 * z.abs() / std::f64::consts::SQRT_2);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    let erf = 1.0 - poly * (-(z * z) / 2.0).exp();
    if z >= 0.0 {
        0.5 * (1.0 + erf)
    } else {
        0.5 * (1.0 - erf)
    }
}

#[test]
fn test_age_difference_truncation() {
    let older = age(10.0, 1.0);
    let younger = age(7.0, 1.0);
    let diff = algebra::subtract(&older, &younger).unwrap();

    let expected_retained = standard_normal_cdf(3.0 / 2f64.sqrt());
    let retained = 1.0 - diff.cdf_at(0.0);
    assert!((retained - expected_retained).abs() < 1e-3);

    let dt = diff.truncate(0.0, f64::INFINITY).unwrap();
    assert_eq!(dt.min(), 0.0);
    assert_eq!(dt.interpolate(-1e-6), 0.0);
    assert!((dt.area() - 1.0).abs() < 1e-9);
    // Renormalised density is the raw density scaled by the retained mass
    assert!((dt.interpolate(3.0) - diff.interpolate(3.0) / retained).abs() < 1e-6);
}

#[test]
fn test_single_marker_rate_mode() {
    let marker = DatedMarker::new("T1", age(10.0, 1.0), displacement(30.0, 1.0)).unwrap();
    let rate = AnalyticalEngine::default().compute_slip_rate(&marker).unwrap();
    assert!((rate.mode() - 3.0).abs() < 0.15);
    assert_eq!(rate.variable_type(), VariableType::SlipRate);
    let ci = ConfidenceMetric::Hpd.interval(&rate, 0.6827).unwrap();
    assert!(ci.contains(3.0));
    assert!(ci.total_width() > 0.4 && ci.total_width() < 1.0);
}

fn five_markers() -> MarkerSequence {
    let layout = [
        ("A", 2.0, 5.0),
        ("B", 5.0, 15.0),
        ("C", 10.0, 30.0),
        ("D", 15.0, 50.0),
        ("E", 20.0, 80.0),
    ];
    let markers = layout
        .iter()
        .map(|&(name, a, d)| {
            let a = gaussian(a, 0.5, 0.02)
                .unwrap()
                .tagged(VariableType::Age, Some(Unit::KILOYEARS))
                .unwrap();
            DatedMarker::new(name, a, displacement(d, 1.0)).unwrap()
        })
        .collect();
    MarkerSequence::new(markers).unwrap()
}

#[test]
fn test_monte_carlo_five_markers() {
    let config = MonteCarloConfig {
        n_samples: 100_000,
        max_rate: Some(60.0),
        seed: 2024,
        ..MonteCarloConfig::default()
    };
    let out = MonteCarloEngine::new(config).run(&five_markers()).unwrap();
    assert_eq!(out.status, RunStatus::Completed);
    assert!(out.accepted >= 100_000);
    assert_eq!(out.rates.len(), 4);

    let names: Vec<&str> = out.rates.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["B-A", "C-B", "D-C", "E-D"]);
    for r in &out.rates {
        assert!((r.pdf.area() - 1.0).abs() < 1e-6);
        assert!(r.pdf.max() <= 60.0);
        assert_eq!(r.pdf.interpolate(60.0 + 1e-9), 0.0);
        assert_eq!(r.pdf.interpolate(75.0), 0.0);
    }
    assert!((out.rates[3].pdf.median() - 6.0).abs() < 0.2);
}

#[test]
fn test_monte_carlo_mean_matches_analytical() {
    let markers = MarkerSequence::new(vec![
        DatedMarker::new("A", age(2.0, 0.3), displacement(5.0, 0.5)).unwrap(),
        DatedMarker::new("B", age(6.0, 0.3), displacement(25.0, 0.5)).unwrap(),
    ])
    .unwrap();

    let analytical = AnalyticalEngine::new(AnalyticalConfig {
        max_rate: Some(20.0),
        ..AnalyticalConfig::default()
    })
    .compute_slip_rates(&markers)
    .unwrap();

    let config = MonteCarloConfig {
        n_samples: 50_000,
        max_rate: Some(20.0),
        seed: 11,
        ..MonteCarloConfig::default()
    };
    let mc = MonteCarloEngine::new(config).run(&markers).unwrap();

    let a = analytical[0].pdf.mean();
    let m = mc.rates[0].pdf.mean();
    assert!((a - m).abs() < 0.03, "analytical {a} vs Monte Carlo {m}");
}

#[test]
fn test_unit_conversion_before_estimation() {
    let markers = MarkerSequence::new(vec![
        DatedMarker::new("A", age(2.0, 0.3), displacement(5.0, 0.5)).unwrap(),
        DatedMarker::new("B", age(6.0, 0.3), displacement(25.0, 0.5)).unwrap(),
    ])
    .unwrap()
    .convert_units(Some(Unit::YEARS), Some(Unit::MILLIMETERS))
    .unwrap();

    let rates = AnalyticalEngine::default().compute_slip_rates(&markers).unwrap();
    let unit = rates[0].pdf.unit().unwrap();
    assert_eq!(unit.to_string(), "mm/y");
    // 20 m / 4 ky = 5 mm/y
    assert!((rates[0].pdf.median() - 5.0).abs() < 0.05);
}

#[test]
fn test_monte_carlo_independent_of_thread_count() {
    let config = MonteCarloConfig {
        n_samples: 20_000,
        batch_size: 5_000,
        max_rate: Some(60.0),
        seed: 99,
        ..MonteCarloConfig::default()
    };
    let markers = five_markers();
    let run = |threads: usize| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap()
            .install(|| MonteCarloEngine::new(config.clone()).run(&markers).unwrap())
    };
    let single = run(1);
    let many = run(4);
    assert_eq!(single.accepted, many.accepted);
    assert_eq!(single.drawn, many.drawn);
    assert_eq!(single, many);
}

#[test]
fn test_fast_interval_beyond_default_quotient_limit() {
    let markers = MarkerSequence::new(vec![
        DatedMarker::new("A", age(1.0, 0.05), displacement(10.0, 5.0)).unwrap(),
        DatedMarker::new("B", age(2.0, 0.05), displacement(160.0, 5.0)).unwrap(),
    ])
    .unwrap();

    let analytical = AnalyticalEngine::new(AnalyticalConfig {
        max_rate: Some(500.0),
        ..AnalyticalConfig::default()
    })
    .compute_slip_rates(&markers)
    .unwrap();
    let a = &analytical[0].pdf;
    assert!(a.max() > 100.0);
    assert!((a.median() - 150.0).abs() < 2.0);

    let mc = MonteCarloEngine::new(MonteCarloConfig {
        n_samples: 20_000,
        max_rate: Some(500.0),
        seed: 3,
        ..MonteCarloConfig::default()
    })
    .run(&markers)
    .unwrap();
    let m = &mc.rates[0].pdf;
    assert!((a.mean() - m.mean()).abs() < 1.0, "analytical {} vs Monte Carlo {}", a.mean(), m.mean());
}
