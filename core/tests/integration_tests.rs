//! End-to-end tests of the range-aided particle filter on the simulated square path
//!
//! A simulated robot drives four sides of eight unit steps inside (and partly outside) a 10 x 10
//! arena with a landmark in each corner. The filter receives the commanded controls and noisy
//! ranges to every landmark on each tick.
//!
//! The accuracy bounds below are empirical regression checks rather than design goals. They are
//! loose enough to hold across seeds and resampling strategies and tight enough to catch a filter
//! that has diverged.
use std::f64::consts::{FRAC_PI_2, TAU};

use assert_approx_eq::assert_approx_eq;
use rangenav::measurements::expected_ranges;
use rangenav::sim::{Map, SimulationConfig, run_simulation};
use rangenav::{
    Control, FilterConfig, FilterError, Particle, ParticleAveragingStrategy, ParticleFilter,
    ParticleResamplingStrategy, Pose2D, angle_difference,
};

const POSITION_RMSE_BOUND: f64 = 1.0;
const HEADING_RMSE_BOUND: f64 = 0.6;

#[test]
fn square_path_tracks_truth() {
    let result = run_simulation(&SimulationConfig::default()).unwrap();
    assert_eq!(result.len(), 36);
    let rmse = result.position_rmse().unwrap();
    assert!(rmse < POSITION_RMSE_BOUND, "position RMSE {rmse}");
    let heading = result.heading_rmse().unwrap();
    assert!(heading < HEADING_RMSE_BOUND, "heading RMSE {heading}");
    for record in &result.records {
        assert!((0.0..TAU).contains(&record.est_theta));
        assert!(record.effective_sample_size > 0.0);
        assert!(record.effective_sample_size <= 500.0 + 1e-9);
    }
}

#[test]
fn square_path_with_every_strategy() {
    for resampling in [
        ParticleResamplingStrategy::Multinomial,
        ParticleResamplingStrategy::Systematic,
        ParticleResamplingStrategy::Stratified,
        ParticleResamplingStrategy::Residual,
    ] {
        for averaging in [
            ParticleAveragingStrategy::UnweightedAverage,
            ParticleAveragingStrategy::WeightedAverage,
        ] {
            let config = SimulationConfig {
                num_particles: 300,
                seed: 3,
                resampling_strategy: resampling,
                averaging_strategy: averaging,
                ..Default::default()
            };
            let result = run_simulation(&config).unwrap();
            let rmse = result.position_rmse().unwrap();
            assert!(
                rmse < POSITION_RMSE_BOUND,
                "{resampling:?}/{averaging:?}: position RMSE {rmse}"
            );
        }
    }
}

#[test]
fn trials_differ_but_each_is_reproducible() {
    let config = SimulationConfig {
        num_particles: 200,
        ..Default::default()
    };
    let first = run_simulation(&config.for_trial(0)).unwrap();
    let again = run_simulation(&config.for_trial(0)).unwrap();
    let second = run_simulation(&config.for_trial(1)).unwrap();
    assert_eq!(first.records, again.records);
    assert_ne!(first.records, second.records);
}

#[test]
fn filter_recovers_from_offset_initial_guess() {
    let map = Map::default();
    let truth = Pose2D::new(5.0, 5.0, 0.0);
    let config = FilterConfig::new(0.5, 0.05, 0.3, 1000).with_seed(77);
    let mut pf = ParticleFilter::new(config, Pose2D::new(5.6, 4.5, 0.0)).unwrap();
    let mut position = truth;
    for _ in 0..3 {
        position.x += 1.0;
        let ranges = expected_ranges(position.x, position.y, map.landmarks());
        pf.step(Control::forward(1.0), &ranges, map.landmarks())
            .unwrap();
    }
    let estimate = pf.estimate().unwrap();
    assert!(
        estimate.distance_to(&position) < 0.3,
        "estimate {estimate} truth {position}"
    );
}

#[test]
fn noiseless_predict_scenarios() {
    let config = FilterConfig::new(0.0, 0.0, 0.3, 1).with_seed(0);
    let mut pf =
        ParticleFilter::from_particles(config.clone(), vec![Particle::new(0.0, 0.0, 0.0, 1.0)])
            .unwrap();
    pf.predict(Control::new(1.0, 0.0));
    assert_eq!(pf.particles()[0].pose(), Pose2D::new(1.0, 0.0, 0.0));

    let mut pf =
        ParticleFilter::from_particles(config, vec![Particle::new(0.0, 0.0, 0.0, 1.0)]).unwrap();
    pf.predict(Control::new(0.0, FRAC_PI_2));
    assert_eq!(pf.particles()[0].pose(), Pose2D::new(0.0, 0.0, FRAC_PI_2));
}

#[test]
fn full_cycle_keeps_population_size_and_normalization() {
    let map = Map::default();
    let config = FilterConfig::new(0.1, 0.05, 0.3, 250)
        .with_seed(5)
        .with_resampling_strategy(ParticleResamplingStrategy::Systematic);
    let mut pf = ParticleFilter::new(config, Pose2D::new(1.0, 1.0, 0.0)).unwrap();
    let mut x = 1.0;
    for _ in 0..8 {
        x += 1.0;
        let ranges = expected_ranges(x, 1.0, map.landmarks());
        pf.predict(Control::forward(1.0));
        let outcome = pf.weight(&ranges, map.landmarks()).unwrap();
        assert!(!outcome.is_degenerate());
        let sum: f64 = pf.weights().iter().sum();
        assert_approx_eq!(sum, 1.0, 1e-6);
        pf.resample_if_needed();
        assert_eq!(pf.num_particles(), 250);
        assert!(pf.particles().iter().all(|p| (0.0..TAU).contains(&p.theta)));
    }
    let estimate = pf.estimate().unwrap();
    assert_approx_eq!(estimate.x, 9.0, 0.3);
    assert_approx_eq!(estimate.y, 1.0, 0.3);
    assert!(angle_difference(estimate.theta, 0.0).abs() < 0.2);
}

#[test]
fn mismatched_measurements_are_rejected() {
    let map = Map::default();
    let config = FilterConfig::new(0.1, 0.05, 0.3, 50).with_seed(1);
    let mut pf = ParticleFilter::new(config, Pose2D::new(1.0, 1.0, 0.0)).unwrap();
    let weights = pf.weights();
    let err = pf
        .weight(&[1.0, 2.0], map.landmarks())
        .expect_err("two ranges for four landmarks");
    assert_eq!(
        err,
        FilterError::InputContractViolation {
            measurements: 2,
            landmarks: 4
        }
    );
    assert_eq!(pf.weights(), weights);
}
