//! Hand-rolled dense-layer MLP with manual forward/backward (§4.8 Expansion:
//! "no autodiff dependency"), grounded on the const-generic `DenseLayer` in
//! the neural crate this agent is modeled on — generalized here to runtime
//! dimensions since the actor and critic trunks are built from a shared
//! `dims` list rather than fixed at compile time.

use ndarray::{Array1, Array2};
use rand::rngs::SmallRng;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Activation {
    Relu,
    Sigmoid,
    Identity,
}

impl Activation {
    fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Identity => x,
        }
    }

    /// Derivative expressed in terms of the *pre*-activation value `x`.
    fn derivative(self, x: f32) -> f32 {
        match self {
            Activation::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Sigmoid => {
                let s = self.apply(x);
                s * (1.0 - s)
            }
            Activation::Identity => 1.0,
        }
    }
}

#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct DenseLayer {
    #[serde(with = "array2_serde")]
    pub weights: Array2<f32>,
    #[serde(with = "array1_serde")]
    pub biases: Array1<f32>,
}

impl DenseLayer {
    /// Xavier-initialized `[out, in]` weight matrix and zero biases,
    /// matching the teacher's `initialize_xavier` scaling.
    fn new_xavier(in_dim: usize, out_dim: usize, rng: &mut SmallRng) -> Self {
        let scale = 1.0 / (in_dim as f32).sqrt();
        let weights =
            Array2::from_shape_fn((out_dim, in_dim), |_| (rng.gen::<f32>() - 0.5) * 2.0 * scale);
        Self {
            weights,
            biases: Array1::zeros(out_dim),
        }
    }

    fn forward(&self, input: &Array1<f32>) -> Array1<f32> {
        self.weights.dot(input) + &self.biases
    }
}

/// Cached intermediate values from a forward pass, needed by `backward`.
pub struct ForwardCache {
    /// Pre-activation (`Wx+b`) output of each layer.
    pre_activations: Vec<Array1<f32>>,
    /// Post-activation output of each layer, with `post_activations[0]`
    /// being the network's raw input.
    post_activations: Vec<Array1<f32>>,
}

/// Sequential dense network: `dims.len() - 1` layers, one activation per
/// layer. Used for both the actor and critic trunks (§4.8).
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct Mlp {
    layers: Vec<DenseLayer>,
    activations: Vec<Activation>,
}

impl Mlp {
    pub fn new(dims: &[usize], activations: Vec<Activation>, rng: &mut SmallRng) -> Self {
        assert_eq!(dims.len() - 1, activations.len());
        let layers = dims
            .windows(2)
            .map(|w| DenseLayer::new_xavier(w[0], w[1], rng))
            .collect();
        Self { layers, activations }
    }

    pub fn forward(&self, input: &Array1<f32>) -> ForwardCache {
        let mut activation = input.clone();
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        let mut post_activations = Vec::with_capacity(self.layers.len() + 1);
        post_activations.push(activation.clone());

        for (layer, &act) in self.layers.iter().zip(&self.activations) {
            let pre = layer.forward(&activation);
            let post = pre.mapv(|x| act.apply(x));
            pre_activations.push(pre);
            post_activations.push(post.clone());
            activation = post;
        }

        ForwardCache {
            pre_activations,
            post_activations,
        }
    }

    pub fn predict(&self, input: &Array1<f32>) -> Array1<f32> {
        self.forward(input).post_activations.last().unwrap().clone()
    }

    /// Backpropagate `d_output` (gradient of the loss w.r.t. the network's
    /// final output) through every layer, applying a plain gradient-descent
    /// update at learning rate `lr`.
    pub fn backward(&mut self, cache: &ForwardCache, d_output: Array1<f32>, lr: f32) {
        let mut delta = d_output;
        for i in (0..self.layers.len()).rev() {
            let act = self.activations[i];
            let d_act = cache.pre_activations[i].mapv(|x| act.derivative(x));
            let delta_z = &delta * &d_act;

            let input_to_layer = &cache.post_activations[i];
            let grad_w = outer(&delta_z, input_to_layer);
            let grad_b = delta_z.clone();

            let prev_delta = self.layers[i].weights.t().dot(&delta_z);

            self.layers[i].weights = &self.layers[i].weights - &(grad_w * lr);
            self.layers[i].biases = &self.layers[i].biases - &(grad_b * lr);

            delta = prev_delta;
        }
    }

    /// Copy this network's weights into `target`, used for target-network
    /// updates in actor-critic and DQN (§4.8 `update_target`).
    pub fn copy_into(&self, target: &mut Mlp) {
        target.layers = self.layers.clone();
    }
}

fn outer(a: &Array1<f32>, b: &Array1<f32>) -> Array2<f32> {
    let a2 = a.view().into_shape((a.len(), 1)).unwrap();
    let b2 = b.view().into_shape((1, b.len())).unwrap();
    a2.dot(&b2)
}

mod array2_serde {
    use ndarray::Array2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(arr: &Array2<f32>, ser: S) -> Result<S::Ok, S::Error> {
        let shape = arr.shape().to_vec();
        let data: Vec<f32> = arr.iter().copied().collect();
        (shape, data).serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Array2<f32>, D::Error> {
        let (shape, data): (Vec<usize>, Vec<f32>) = Deserialize::deserialize(de)?;
        Array2::from_shape_vec((shape[0], shape[1]), data).map_err(serde::de::Error::custom)
    }
}

mod array1_serde {
    use ndarray::Array1;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(arr: &Array1<f32>, ser: S) -> Result<S::Ok, S::Error> {
        let data: Vec<f32> = arr.iter().copied().collect();
        data.serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Array1<f32>, D::Error> {
        let data: Vec<f32> = Deserialize::deserialize(de)?;
        Ok(Array1::from_vec(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn forward_output_has_expected_shape() {
        let mut rng = SmallRng::seed_from_u64(1);
        let net = Mlp::new(
            &[20, 128, 64, 5],
            vec![Activation::Relu, Activation::Relu, Activation::Sigmoid],
            &mut rng,
        );
        let input = Array1::from_elem(20, 0.5);
        let output = net.predict(&input);
        assert_eq!(output.len(), 5);
        assert!(output.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn training_step_reduces_squared_error_on_fixed_target() {
        let mut rng = SmallRng::seed_from_u64(2);
        let mut net = Mlp::new(&[4, 8, 1], vec![Activation::Relu, Activation::Identity], &mut rng);
        let input = Array1::from_vec(vec![0.1, 0.2, 0.3, 0.4]);
        let target = 1.0f32;

        let loss_before = {
            let out = net.predict(&input);
            (out[0] - target).powi(2)
        };
        for _ in 0..50 {
            let cache = net.forward(&input);
            let out = cache.post_activations.last().unwrap().clone();
            let d_output = Array1::from_vec(vec![2.0 * (out[0] - target)]);
            net.backward(&cache, d_output, 0.01);
        }
        let loss_after = {
            let out = net.predict(&input);
            (out[0] - target).powi(2)
        };
        assert!(loss_after < loss_before);
    }

    #[test]
    fn copy_into_produces_identical_predictions() {
        let mut rng = SmallRng::seed_from_u64(3);
        let net = Mlp::new(&[4, 6, 1], vec![Activation::Relu, Activation::Identity], &mut rng);
        let mut target = Mlp::new(&[4, 6, 1], vec![Activation::Relu, Activation::Identity], &mut rng);
        net.copy_into(&mut target);
        let input = Array1::from_vec(vec![0.2, 0.4, 0.6, 0.8]);
        assert_eq!(net.predict(&input), target.predict(&input));
    }
}
