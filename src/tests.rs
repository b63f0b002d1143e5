use approx::assert_relative_eq;
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::correlation::{PadeFunctor, TwoBodyJastrow};
use crate::error::WfnError;
use crate::io::{parse_config, WaveFunctionConfig};
use crate::particle::ParticleSet;
use crate::wavefunction::{
    AffineOrbital, DiracDeterminant, GaussianOrbital, UpdatePolicy, WaveFunction,
    WaveFunctionComponent,
};

/// LiH-like system: two ions, two up and two down electrons.
fn lih(seed: u64, config: &WaveFunctionConfig) -> (ParticleSet, WaveFunction) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ions = ParticleSet::new("ion0", &[("Li", 1), ("H", 1)]).unwrap();
    ions.set_positions(vec![Vector3::zeros(), Vector3::new(0.0, 0.0, 1.5)])
        .unwrap();
    let mut els = ParticleSet::new("e", &[("u", 2), ("d", 2)]).unwrap();
    els.randomize(&mut rng, 1.0).unwrap();
    els.add_source(&ions);
    let wfn = WaveFunction::slater_jastrow(&ions, &els, config, &mut rng).unwrap();
    (els, wfn)
}

fn small_step<R: Rng>(rng: &mut R) -> Vector3<f64> {
    Vector3::new(rng.gen_range(-0.3..0.3), rng.gen_range(-0.3..0.3), rng.gen_range(-0.3..0.3))
}

/// Two particles of one species with an identity Slater matrix and
/// u(r) = −r between them.
fn two_particle_scenario() -> (ParticleSet, WaveFunction) {
    let mut p = ParticleSet::new("e", &[("u", 2)]).unwrap();
    p.set_positions(vec![Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0)])
        .unwrap();
    let orbitals = vec![
        AffineOrbital { constant: 1.0, slope: Vector3::new(-1.0, 0.0, 0.0) },
        AffineOrbital { constant: 0.0, slope: Vector3::new(1.0, 0.0, 0.0) },
    ];
    let det = DiracDeterminant::new("Det_up", &p, 0, orbitals, UpdatePolicy::default()).unwrap();
    let j2 = TwoBodyJastrow::uniform(&p, PadeFunctor { a: -1.0, b: 0.0 });
    let wfn = WaveFunction::from_components(vec![Box::new(det), Box::new(j2)], &p);
    (p, wfn)
}

#[test]
fn test_builder_topology() {
    let (els, wfn) = lih(1, &WaveFunctionConfig::default());
    let names: Vec<&str> = wfn.components().iter().map(|c| c.name()).collect();
    assert_eq!(names, ["Det_up", "Det_dn", "J1", "J2", "J3"]);
    assert_eq!(wfn.nelup(), 2);
    assert!(wfn.component("J3").is_some());
    assert!(wfn.owns(els.len() - 1));
    assert!(!wfn.owns(els.len()));
}

#[test]
fn test_log_value_is_sum_of_components() {
    let (els, mut wfn) = lih(2, &WaveFunctionConfig::default());
    let total = wfn.evaluate_log(&els).unwrap();
    let sum: f64 = wfn.components().iter().map(|c| c.log_value()).sum();
    assert_relative_eq!(total, sum, epsilon = 1e-12);
    assert_relative_eq!(
        wfn.phase_value(),
        wfn.components().iter().map(|c| c.phase_value()).sum::<f64>()
    );
    for i in 0..els.len() {
        let g: Vector3<f64> = wfn.components().iter().map(|c| c.gradients()[i]).sum();
        let l: f64 = wfn.components().iter().map(|c| c.laplacians()[i]).sum();
        assert_relative_eq!((wfn.gradients()[i] - g).norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(wfn.laplacians()[i], l, epsilon = 1e-12);
        assert_relative_eq!((wfn.eval_grad(&els, i).unwrap() - g).norm(), 0.0, epsilon = 1e-10);
    }
}

#[test]
fn test_ratio_matches_log_difference() {
    let config = WaveFunctionConfig::default();
    let (mut els, mut wfn) = lih(3, &config);
    let before = wfn.evaluate_log(&els).unwrap();
    let mut rng = StdRng::seed_from_u64(30);
    for iat in 0..els.len() {
        els.make_move(iat, &small_step(&mut rng)).unwrap();
        let ratio = wfn.ratio(&els, iat).unwrap();

        let mut moved = els.clone();
        moved.accept_move(iat).unwrap();
        let (_, mut fresh) = lih(3, &config);
        let after = fresh.evaluate_log(&moved).unwrap();
        assert_relative_eq!(ratio.abs(), (after - before).exp(), max_relative = 1e-10);

        let product: f64 = wfn
            .components_mut()
            .iter_mut()
            .filter(|c| c.owns(iat))
            .map(|c| c.ratio(&els, iat).unwrap())
            .product();
        assert_relative_eq!(ratio, product, max_relative = 1e-14);

        wfn.restore(iat);
        els.reject_move(iat);
    }
}

#[test]
fn test_ratio_is_idempotent() {
    let (mut els, mut wfn) = lih(4, &WaveFunctionConfig::default());
    wfn.evaluate_log(&els).unwrap();
    els.make_move(2, &Vector3::new(0.2, 0.1, -0.3)).unwrap();
    let mut grad = Vector3::new(5.0, -5.0, 5.0);
    let r1 = wfn.ratio_grad(&els, 2, &mut grad).unwrap();
    let g1 = grad;
    let r2 = wfn.ratio_grad(&els, 2, &mut grad).unwrap();
    assert_eq!(r1, r2);
    assert_eq!(g1, grad);
    assert_relative_eq!(wfn.ratio(&els, 2).unwrap(), r1, max_relative = 1e-14);
}

#[test]
fn test_restore_leaves_state_bit_identical() {
    let (mut els, mut wfn) = lih(5, &WaveFunctionConfig::default());
    let before = wfn.evaluate_log(&els).unwrap();
    let grad_before = wfn.gradients().to_vec();
    let mut rng = StdRng::seed_from_u64(50);
    for iat in 0..els.len() {
        els.make_move(iat, &small_step(&mut rng)).unwrap();
        let mut g = Vector3::zeros();
        wfn.ratio_grad(&els, iat, &mut g).unwrap();
        wfn.restore(iat);
        els.reject_move(iat);
        assert_eq!(wfn.log_value(), before);
    }
    assert_eq!(wfn.evaluate_log(&els).unwrap(), before);
    assert_eq!(wfn.gradients(), &grad_before[..]);
}

#[test]
fn test_accepted_moves_match_full_evaluation() {
    let config = WaveFunctionConfig::default();
    let (mut els, mut wfn) = lih(6, &config);
    wfn.evaluate_log(&els).unwrap();
    let mut rng = StdRng::seed_from_u64(60);
    let mut log_track = wfn.log_value();
    for step in 0..60 {
        let iat = rng.gen_range(0..els.len());
        els.make_move(iat, &small_step(&mut rng)).unwrap();
        let mut g = Vector3::zeros();
        let ratio = wfn.ratio_grad(&els, iat, &mut g).unwrap();
        if step % 3 == 2 {
            wfn.restore(iat);
            els.reject_move(iat);
        } else {
            wfn.accept_move(&els, iat).unwrap();
            els.accept_move(iat).unwrap();
            log_track += ratio.abs().ln();
            assert_relative_eq!((g - wfn.eval_grad(&els, iat).unwrap()).norm(), 0.0, epsilon = 1e-8);
        }
    }
    assert_relative_eq!(wfn.log_value(), log_track, epsilon = 1e-8);

    wfn.evaluate_gl(&els, false).unwrap();
    let incremental = (wfn.log_value(), wfn.gradients().to_vec(), wfn.laplacians().to_vec());
    let (_, mut fresh) = lih(6, &config);
    fresh.evaluate_log(&els).unwrap();
    assert_relative_eq!(incremental.0, fresh.log_value(), epsilon = 1e-8);
    for i in 0..els.len() {
        assert_relative_eq!((incremental.1[i] - fresh.gradients()[i]).norm(), 0.0, epsilon = 1e-7);
        assert_relative_eq!(incremental.2[i], fresh.laplacians()[i], epsilon = 1e-6);
    }

    wfn.evaluate_gl(&els, true).unwrap();
    assert_relative_eq!(wfn.log_value(), fresh.log_value(), epsilon = 1e-12);
}

#[test]
fn test_reference_tracks_incremental_wavefunction() {
    let config = WaveFunctionConfig::default();
    let mut rng = StdRng::seed_from_u64(12);
    let mut ions = ParticleSet::new("ion0", &[("Li", 1), ("H", 1)]).unwrap();
    ions.set_positions(vec![Vector3::zeros(), Vector3::new(0.0, 0.0, 1.5)])
        .unwrap();
    let mut els = ParticleSet::new("e", &[("u", 2), ("d", 2)]).unwrap();
    els.randomize(&mut rng, 1.0).unwrap();
    els.add_source(&ions);
    let mut build_rng = rng.clone();
    let mut wfn = WaveFunction::slater_jastrow(&ions, &els, &config, &mut rng).unwrap();
    let mut reference =
        WaveFunction::slater_jastrow_reference(&ions, &els, &config, &mut build_rng).unwrap();
    let names = |w: &WaveFunction| w.components().iter().map(|c| c.name().to_string()).collect::<Vec<_>>();
    assert_eq!(names(&wfn), names(&reference));

    assert_relative_eq!(
        wfn.evaluate_log(&els).unwrap(),
        reference.evaluate_log(&els).unwrap(),
        max_relative = 1e-12
    );
    let mut moves = StdRng::seed_from_u64(120);
    for step in 0..40 {
        let iat = moves.gen_range(0..els.len());
        els.make_move(iat, &small_step(&mut moves)).unwrap();
        let (mut g, mut g_ref) = (Vector3::zeros(), Vector3::zeros());
        let ratio = wfn.ratio_grad(&els, iat, &mut g).unwrap();
        let ratio_ref = reference.ratio_grad(&els, iat, &mut g_ref).unwrap();
        assert_relative_eq!(ratio, ratio_ref, epsilon = 1e-12, max_relative = 1e-9);
        for k in 0..3 {
            assert_relative_eq!(g[k], g_ref[k], epsilon = 1e-9, max_relative = 1e-8);
        }
        assert_relative_eq!(
            wfn.ratio(&els, iat).unwrap(),
            reference.ratio(&els, iat).unwrap(),
            epsilon = 1e-12,
            max_relative = 1e-9
        );

        if step % 4 == 3 {
            wfn.restore(iat);
            reference.restore(iat);
            els.reject_move(iat);
        } else {
            wfn.accept_move(&els, iat).unwrap();
            reference.accept_move(&els, iat).unwrap();
            els.accept_move(iat).unwrap();
        }
        assert_relative_eq!(wfn.log_value(), reference.log_value(), epsilon = 1e-9);
        assert_relative_eq!(wfn.phase_value().cos(), reference.phase_value().cos(), epsilon = 1e-12);
        for i in 0..els.len() {
            let (a, b) = (wfn.eval_grad(&els, i).unwrap(), reference.eval_grad(&els, i).unwrap());
            assert_relative_eq!((a - b).norm(), 0.0, epsilon = 1e-8 * (1.0 + b.norm()));
        }
    }

    wfn.evaluate_gl(&els, false).unwrap();
    reference.evaluate_gl(&els, false).unwrap();
    assert_relative_eq!(wfn.log_value(), reference.log_value(), epsilon = 1e-9);
    for i in 0..els.len() {
        assert_relative_eq!((wfn.gradients()[i] - reference.gradients()[i]).norm(), 0.0, epsilon = 1e-7);
        assert_relative_eq!(wfn.laplacians()[i], reference.laplacians()[i], epsilon = 1e-6);
    }
}

#[test]
fn test_inverse_drift_is_bounded_and_refresh_resets_it() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut p = ParticleSet::new("e", &[("u", 4)]).unwrap();
    p.randomize(&mut rng, 0.8).unwrap();
    let orbitals = (0..4)
        .map(|k| GaussianOrbital {
            alpha: 0.3 + 0.1 * k as f64,
            center: Vector3::new(k as f64 - 1.5, 0.0, 0.0),
        })
        .collect();
    let mut det =
        DiracDeterminant::new("Det_up", &p, 0, orbitals, UpdatePolicy { refresh_interval: 0 }).unwrap();
    det.evaluate_log(&p).unwrap();
    for step in 0..100 {
        let iat = step % 4;
        p.make_move(iat, &(small_step(&mut rng) * 0.5)).unwrap();
        det.ratio(&p, iat).unwrap();
        det.accept_move(&p, iat).unwrap();
        p.accept_move(iat).unwrap();
    }
    assert_eq!(det.updates_since_refresh(), 100);
    assert!(det.inverse_deviation() < 1e-7);
    det.refresh_inverse().unwrap();
    assert_eq!(det.updates_since_refresh(), 0);
    assert!(det.inverse_deviation() < 1e-10);
}

#[test]
fn test_two_particle_scenario() {
    let (mut p, mut wfn) = two_particle_scenario();
    wfn.evaluate_log(&p).unwrap();
    assert_relative_eq!(wfn.component("J2").unwrap().log_value(), -1.0);
    assert_relative_eq!(wfn.component("Det_up").unwrap().log_value(), 0.0, epsilon = 1e-15);

    // Particle 0 moves onto the y axis so that r_01 grows from 1.0 to 1.5
    // while its Slater row stays (1, 0).
    p.make_move(0, &Vector3::new(0.0, 1.25_f64.sqrt(), 0.0)).unwrap();
    let ratio = wfn.ratio(&p, 0).unwrap();
    assert_relative_eq!(ratio, (-0.5_f64).exp(), max_relative = 1e-12);
    let parts: Vec<f64> = wfn
        .components_mut()
        .iter_mut()
        .map(|c| c.ratio(&p, 0).unwrap())
        .collect();
    assert_relative_eq!(parts[0], 1.0, epsilon = 1e-15);
    assert_relative_eq!(parts[1], (-0.5_f64).exp(), max_relative = 1e-12);

    wfn.accept_move(&p, 0).unwrap();
    p.accept_move(0).unwrap();
    assert_relative_eq!(wfn.log_value(), -1.5, epsilon = 1e-12);
}

#[test]
fn test_numerical_gradients_of_full_wavefunction() {
    let (els, mut wfn) = lih(8, &WaveFunctionConfig::default());
    wfn.evaluate_log(&els).unwrap();
    let grad = wfn.gradients().to_vec();
    let lap = wfn.laplacians().to_vec();
    let (ngrad, nlap) = wfn.numerical_gl(&els, 1e-4).unwrap();
    for i in 0..els.len() {
        assert_relative_eq!((grad[i] - ngrad[i]).norm(), 0.0, epsilon = 1e-6);
        assert_relative_eq!(lap[i], nlap[i], epsilon = 1e-3, max_relative = 1e-4);
    }
}

#[test]
fn test_out_of_range_index() {
    let (els, mut wfn) = lih(9, &WaveFunctionConfig::default());
    wfn.evaluate_log(&els).unwrap();
    assert!(matches!(
        wfn.eval_grad(&els, 4),
        Err(WfnError::OutOfRangeParticleIndex { index: 4, len: 4 })
    ));
    assert!(matches!(
        wfn.ratio(&els, 10),
        Err(WfnError::OutOfRangeParticleIndex { index: 10, len: 4 })
    ));
}

#[test]
fn test_ratio_for_second_particle_is_violation() {
    let (mut els, mut wfn) = lih(10, &WaveFunctionConfig::default());
    wfn.evaluate_log(&els).unwrap();
    els.make_move(0, &Vector3::new(0.1, 0.0, 0.0)).unwrap();
    wfn.ratio(&els, 0).unwrap();
    assert!(matches!(wfn.ratio(&els, 1), Err(WfnError::ContractViolation(_))));

    // A component that was never told to restore keeps its proposal.
    let mut p = ParticleSet::new("e", &[("u", 3)]).unwrap();
    p.randomize(&mut StdRng::seed_from_u64(11), 1.0).unwrap();
    let mut j2 = TwoBodyJastrow::uniform(&p, PadeFunctor { a: 0.25, b: 1.0 });
    j2.evaluate_log(&p).unwrap();
    p.make_move(0, &Vector3::new(0.1, 0.0, 0.0)).unwrap();
    j2.ratio(&p, 0).unwrap();
    p.reject_move(0);
    p.make_move(1, &Vector3::new(0.1, 0.0, 0.0)).unwrap();
    assert!(matches!(j2.ratio(&p, 1), Err(WfnError::ContractViolation(_))));
}

#[test]
fn test_singular_determinant_propagates() {
    let mut p = ParticleSet::new("e", &[("u", 2)]).unwrap();
    p.set_positions(vec![Vector3::new(0.3, 0.0, 0.0); 2]).unwrap();
    let orbitals = vec![
        GaussianOrbital { alpha: 0.5, center: Vector3::zeros() },
        GaussianOrbital { alpha: 0.7, center: Vector3::new(1.0, 0.0, 0.0) },
    ];
    let det = DiracDeterminant::new("Det_up", &p, 0, orbitals, UpdatePolicy::default()).unwrap();
    let j2 = TwoBodyJastrow::uniform(&p, PadeFunctor { a: 0.5, b: 1.0 });
    let mut wfn = WaveFunction::from_components(vec![Box::new(det), Box::new(j2)], &p);
    let err = wfn.evaluate_log(&p).unwrap_err();
    assert!(matches!(err, WfnError::SingularWavefunction { .. }));
    assert!(err.is_configuration_reject());
    // The failing component stops the sweep.
    assert_eq!(wfn.component("J2").unwrap().log_value(), 0.0);
}

#[test]
fn test_node_ratio_is_returned_but_cannot_be_accepted() {
    let (mut p, mut wfn) = two_particle_scenario();
    wfn.evaluate_log(&p).unwrap();
    // x = 1 turns row 0 into (0, 1), a copy of row 1.
    p.make_move(0, &Vector3::new(1.0, 0.3, 0.0)).unwrap();
    assert_eq!(wfn.ratio(&p, 0).unwrap(), 0.0);
    assert!(matches!(
        wfn.accept_move(&p, 0),
        Err(WfnError::SingularWavefunction { .. })
    ));
}

#[test]
fn test_builder_rejects_unusable_particle_sets() {
    let config = WaveFunctionConfig::default();
    let mut rng = StdRng::seed_from_u64(12);
    let ions = ParticleSet::new("ion0", &[("He", 1)]).unwrap();

    let mut one_spin = ParticleSet::new("e", &[("u", 2)]).unwrap();
    one_spin.add_source(&ions);
    assert!(matches!(
        WaveFunction::slater_jastrow(&ions, &one_spin, &config, &mut rng),
        Err(WfnError::InvalidConfig(_))
    ));

    let no_ions = ParticleSet::new("e", &[("u", 1), ("d", 1)]).unwrap();
    assert!(matches!(
        WaveFunction::slater_jastrow(&ions, &no_ions, &config, &mut rng),
        Err(WfnError::InvalidConfig(_))
    ));
}

#[test]
fn test_wavefunction_from_yaml() {
    let config = parse_config(
        "
determinant:
  refresh_interval: 8
orbitals:
  center_jitter: 0.0
three_body:
  cutoff: 2.5
  terms:
    - { l: 1, m: 1, n: 1, coef: 0.02 }
    - { l: 0, m: 0, n: 2, coef: -0.01 }
",
    )
    .unwrap();
    let (mut els, mut wfn) = lih(13, &config);
    let log_value = wfn.evaluate_log(&els).unwrap();
    assert!(log_value.is_finite());

    let mut rng = StdRng::seed_from_u64(130);
    for step in 0..20 {
        let iat = step % els.len();
        els.make_move(iat, &small_step(&mut rng)).unwrap();
        wfn.ratio(&els, iat).unwrap();
        wfn.accept_move(&els, iat).unwrap();
        els.accept_move(iat).unwrap();
    }
    let incremental = wfn.log_value();
    assert_relative_eq!(incremental, wfn.evaluate_log(&els).unwrap(), epsilon = 1e-8);
}
