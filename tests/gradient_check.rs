//! Numerical gradient checking for the backpropagation workers.
//!
//! For each weight `w` the analytic gradient from [`GradientCalculator`] is
//! compared against the central difference
//! `(E(w + ε) - E(w - ε)) / (2ε)` with `E = ½ Σ s e²`.

use flatlm::train::{ChainRuleHessian, ComputeHessian, GradientCalculator, HessianState, WorkerPool};
use flatlm::{Activation, BasicTrainingSet, ErrorCalculation, ErrorFunction, FlatNetwork, TrainingPair};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Step for the central difference.
const EPSILON: f64 = 1e-5;

/// Largest allowed absolute difference.
const TOLERANCE: f64 = 1e-4;

fn sse(network: &FlatNetwork, weights: &[f64], training: &BasicTrainingSet) -> f64 {
    let mut state = network.create_state();
    let mut output = vec![0.0; network.output_count()];
    let mut error = ErrorCalculation::new();
    for pair in training.pairs() {
        network.compute_with(weights, &pair.input, &mut output, &mut state);
        error.update(&output, &pair.ideal, pair.significance);
    }
    error.sse()
}

fn random_set(rng: &mut StdRng, records: usize, inputs: usize, outputs: usize) -> BasicTrainingSet {
    let mut set = BasicTrainingSet::new(inputs, outputs);
    for _ in 0..records {
        let input = (0..inputs).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let ideal = (0..outputs).map(|_| rng.gen_range(-0.8..0.8)).collect();
        let significance = rng.gen_range(0.5..1.5);
        set.push(TrainingPair::from_vecs(input, ideal).with_significance(significance))
            .unwrap();
    }
    set
}

fn check_network(mut network: FlatNetwork, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    network.randomize(&mut rng, -1.0, 1.0);
    let training = random_set(&mut rng, 6, network.input_count(), network.output_count());

    let pool = WorkerPool::new(1).unwrap();
    let mut calculator =
        GradientCalculator::new(&network, &training, &pool, ErrorFunction::Linear, false);
    calculator
        .calculate(&pool, &network, network.weights(), &training)
        .unwrap();

    let mut weights = network.weights().to_vec();
    for i in 0..weights.len() {
        let original = weights[i];
        weights[i] = original + EPSILON;
        let plus = sse(&network, &weights, &training);
        weights[i] = original - EPSILON;
        let minus = sse(&network, &weights, &training);
        weights[i] = original;

        let numeric = (plus - minus) / (2.0 * EPSILON);
        let analytic = calculator.gradients()[i];
        assert!(
            (numeric - analytic).abs() < TOLERANCE,
            "weight {}: analytic {} vs numeric {}",
            i,
            analytic,
            numeric
        );
    }

    // The reported error is E itself.
    assert!((calculator.sse() - sse(&network, network.weights(), &training)).abs() < 1e-12);
}

#[test]
fn test_gradient_check_no_hidden() {
    let network =
        FlatNetwork::feedforward(3, &[], 2, Activation::Linear, Activation::Sigmoid).unwrap();
    check_network(network, 1);
}

#[test]
fn test_gradient_check_sigmoid_hidden() {
    let network =
        FlatNetwork::feedforward(2, &[3], 1, Activation::Sigmoid, Activation::Linear).unwrap();
    check_network(network, 2);
}

#[test]
fn test_gradient_check_tanh_deep() {
    let network =
        FlatNetwork::feedforward(3, &[4, 3], 2, Activation::Tanh, Activation::Tanh).unwrap();
    check_network(network, 3);
}

#[test]
fn test_gradient_check_elliott() {
    let network = FlatNetwork::feedforward(
        2,
        &[3],
        2,
        Activation::ElliottSymmetric { slope: 1.0 },
        Activation::Elliott { slope: 1.0 },
    )
    .unwrap();
    check_network(network, 4);
}

#[test]
fn test_gradient_check_sin_hidden() {
    let network = FlatNetwork::feedforward(2, &[4], 1, Activation::Sin, Activation::Linear).unwrap();
    check_network(network, 5);
}

/// The flat spot changes sigmoid gradients on purpose; it must stay out of
/// the numerical check but still be applied when enabled.
#[test]
fn test_flat_spot_changes_sigmoid_gradient() {
    let mut network =
        FlatNetwork::feedforward(2, &[2], 1, Activation::Sigmoid, Activation::Sigmoid).unwrap();
    let mut rng = StdRng::seed_from_u64(9);
    network.randomize(&mut rng, -1.0, 1.0);
    let training = random_set(&mut rng, 4, 2, 1);
    let pool = WorkerPool::new(1).unwrap();

    let mut plain = GradientCalculator::new(&network, &training, &pool, ErrorFunction::Linear, false);
    let mut spot = GradientCalculator::new(&network, &training, &pool, ErrorFunction::Linear, true);
    plain.calculate(&pool, &network, network.weights(), &training).unwrap();
    spot.calculate(&pool, &network, network.weights(), &training).unwrap();

    assert!(plain
        .gradients()
        .iter()
        .zip(spot.gradients())
        .any(|(a, b)| (a - b).abs() > 1e-6));
}

/// Summed over every output neuron, the chain-rule gradient `-Σ s e d` is
/// the same `∂E/∂w` the backpropagation worker produces.
#[test]
fn test_chain_rule_gradient_matches_backprop() {
    let mut network =
        FlatNetwork::feedforward(2, &[3], 2, Activation::Tanh, Activation::Sigmoid).unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    network.randomize(&mut rng, -1.0, 1.0);
    let training = random_set(&mut rng, 5, 2, 2);
    let pool = WorkerPool::new(2).unwrap();

    let mut calculator =
        GradientCalculator::new(&network, &training, &pool, ErrorFunction::Linear, false);
    calculator
        .calculate(&pool, &network, network.weights(), &training)
        .unwrap();

    let mut hessian = ChainRuleHessian::new(&network, &training, &pool).unwrap();
    let mut state = HessianState::new(network.weight_count());
    hessian.compute(&network, &training, &pool, &mut state).unwrap();

    for (a, b) in calculator.gradients().iter().zip(state.gradients()) {
        assert!((a - b).abs() < 1e-10, "{} vs {}", a, b);
    }
    assert!((calculator.sse() - state.sse()).abs() < 1e-12);
}
