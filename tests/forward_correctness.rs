//! Forward pass correctness.
//!
//! These tests verify:
//! - Hand-computed outputs for small networks
//! - Repeated evaluation is bit-identical (no hidden state in feed-forward nets)
//! - `compute` and `compute_with` agree
//! - Elman context feedback and context clearing
//! - The SIMD weighted sum on layers wider than one lane group

use flatlm::{Activation, BasicTrainingSet, FlatLayer, FlatNetwork};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[test]
fn test_hand_computed_two_layer() {
    // 2 inputs (+bias) -> 2 sigmoid hidden (+bias) -> 1 linear output
    let mut network =
        FlatNetwork::feedforward(2, &[2], 1, Activation::Sigmoid, Activation::Linear).unwrap();

    // input -> hidden neuron 0, 1 (from input 0, input 1, bias)
    let hidden = [[0.5, -0.25, 0.1], [-0.3, 0.8, -0.2]];
    // hidden -> output (from hidden 0, hidden 1, bias)
    let output = [1.5, -2.0, 0.25];

    for (to, row) in hidden.iter().enumerate() {
        for (from, &w) in row.iter().enumerate() {
            network.set_weight(0, from, to, w).unwrap();
        }
    }
    for (from, &w) in output.iter().enumerate() {
        network.set_weight(1, from, 0, w).unwrap();
    }

    let input = [0.7, -1.2];
    let h0 = sigmoid(0.5 * 0.7 - 0.25 * -1.2 + 0.1);
    let h1 = sigmoid(-0.3 * 0.7 + 0.8 * -1.2 - 0.2);
    let expected = 1.5 * h0 - 2.0 * h1 + 0.25;

    let mut out = [0.0];
    network.compute(&input, &mut out);
    assert!((out[0] - expected).abs() < 1e-12);

    // Layer outputs: [output, hidden0, hidden1, bias, input0, input1, bias]
    let layer_output = network.layer_output();
    assert_eq!(layer_output.len(), 7);
    assert!((layer_output[1] - h0).abs() < 1e-12);
    assert_eq!(layer_output[3], 1.0);
    assert_eq!(&layer_output[4..], &[0.7, -1.2, 1.0]);
}

#[test]
fn test_repeated_compute_is_bit_identical() {
    let mut network =
        FlatNetwork::feedforward(4, &[6, 5], 3, Activation::Tanh, Activation::Sigmoid).unwrap();
    network.nguyen_widrow(&mut StdRng::seed_from_u64(42));

    let input = [0.1, -0.4, 0.9, 0.3];
    let mut first = [0.0; 3];
    let mut second = [0.0; 3];
    network.compute(&input, &mut first);
    for _ in 0..10 {
        network.compute(&input, &mut second);
        assert_eq!(
            first.map(f64::to_bits),
            second.map(f64::to_bits),
            "forward pass must be pure"
        );
    }
}

#[test]
fn test_compute_with_matches_compute() {
    let mut network =
        FlatNetwork::feedforward(3, &[4], 2, Activation::Relu, Activation::Linear).unwrap();
    network.randomize(&mut StdRng::seed_from_u64(3), -1.0, 1.0);

    let mut state = network.create_state();
    let input = [0.5, -0.5, 2.0];
    let mut a = [0.0; 2];
    let mut b = [0.0; 2];
    network.compute_with(network.weights(), &input, &mut a, &mut state);
    network.compute(&input, &mut b);
    assert_eq!(a, b);
    assert_eq!(state.layer_output(), network.layer_output());
    assert_eq!(state.layer_sums(), network.layer_sums());
}

#[test]
fn test_wide_layer_simd_path() {
    // 37 inputs + bias = 38 slots: nine lane groups plus a tail of two
    let mut network =
        FlatNetwork::feedforward(37, &[], 1, Activation::Linear, Activation::Linear).unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    network.randomize(&mut rng, -1.0, 1.0);

    let input: Vec<f64> = (0..37).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let w = network.weights();
    let expected: f64 = input.iter().zip(w).map(|(x, w)| x * w).sum::<f64>() + w[37];

    let mut out = [0.0];
    network.compute(&input, &mut out);
    assert!((out[0] - expected).abs() < 1e-12);
}

#[test]
fn test_elman_context_feedback() {
    let mut network = FlatNetwork::elman(1, 2, 1, Activation::Tanh).unwrap();
    assert!(network.has_context());
    // input layer: 1 feed + bias + 2 context
    assert_eq!(network.layer_counts(), &[1, 3, 4]);
    network.randomize(&mut StdRng::seed_from_u64(8), -1.0, 1.0);

    let mut first = [0.0];
    let mut second = [0.0];
    network.compute(&[0.5], &mut first);
    let hidden = network.layer_output()[1..3].to_vec();

    network.compute(&[0.5], &mut second);
    assert_ne!(first, second, "context must feed back into the next pass");

    // The second pass consumed the hidden outputs of the first.
    let input_start = network.layer_index()[2];
    assert_eq!(&network.layer_output()[input_start + 2..input_start + 4], &hidden[..]);

    network.clear_context();
    let mut third = [0.0];
    network.compute(&[0.5], &mut third);
    assert_eq!(first, third);
}

#[test]
fn test_context_on_hidden_layer() {
    // Jordan-style: hidden layer takes context from the output layer
    let layers = [
        FlatLayer::new(2, Activation::Linear),
        FlatLayer::new(3, Activation::Tanh).with_context(2),
        FlatLayer::without_bias(1, Activation::Linear),
    ];
    let network = FlatNetwork::new(&layers).unwrap();
    // hidden: 3 feed + bias + 1 context
    assert_eq!(network.layer_counts(), &[1, 5, 3]);
    assert_eq!(network.layer_context_counts(), &[0, 1, 0]);
    assert_eq!(network.weight_count(), 5 + 3 * 3);
}

#[test]
fn test_calculate_error() {
    let mut network =
        FlatNetwork::feedforward(1, &[], 1, Activation::Linear, Activation::Linear).unwrap();
    network.set_weights(&[1.0, 0.0]).unwrap();
    let training =
        BasicTrainingSet::from_rows(&[vec![1.0], vec![2.0]], &[vec![2.0], vec![2.0]]).unwrap();
    // errors 1 and 0
    assert_eq!(network.calculate_error(&training).unwrap(), 0.5);
}

#[test]
fn test_clone_evaluates_independently() {
    let mut network = FlatNetwork::elman(2, 3, 1, Activation::Sigmoid).unwrap();
    network.randomize(&mut StdRng::seed_from_u64(13), -0.5, 0.5);
    let mut copy = network.clone();

    let mut a = [0.0];
    let mut b = [0.0];
    network.compute(&[1.0, 0.0], &mut a);
    network.compute(&[1.0, 0.0], &mut a);
    copy.compute(&[1.0, 0.0], &mut b);

    // copy has seen one pass, the original two
    assert_ne!(a, b);
    assert_eq!(network.weights(), copy.weights());
}
