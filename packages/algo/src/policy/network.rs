//! Q-network: input -> hidden -> hidden -> actions (two ReLU hidden layers of
//! the same width), trained with Adam on the squared TD error of the taken action.

use ndarray::{Array, Array1, Array2, ArrayView1, Axis, Dimension, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Network parameters. The same layout doubles as a gradient / moment buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QNetwork {
    /// (hidden, input)
    pub w1: Array2<f64>,
    pub b1: Array1<f64>,
    /// (hidden, hidden)
    pub w2: Array2<f64>,
    pub b2: Array1<f64>,
    /// (actions, hidden)
    pub w3: Array2<f64>,
    pub b3: Array1<f64>,
}

/// Intermediate activations kept for backprop
struct ForwardCache {
    z1: Array1<f64>,
    a1: Array1<f64>,
    z2: Array1<f64>,
    a2: Array1<f64>,
    q: Array1<f64>,
}

impl QNetwork {
    /// Uniform(-1/sqrt(fan_in), 1/sqrt(fan_in)) for weights and biases.
    pub fn random<R: Rng + ?Sized>(input_dim: usize, hidden_dim: usize, action_dim: usize, rng: &mut R) -> Self {
        let mut layer = |fan_out: usize, fan_in: usize| {
            let bound = 1.0 / (fan_in.max(1) as f64).sqrt();
            let w = Array2::from_shape_fn((fan_out, fan_in), |_| rng.gen_range(-bound..bound));
            let b = Array1::from_shape_fn(fan_out, |_| rng.gen_range(-bound..bound));
            (w, b)
        };
        let (w1, b1) = layer(hidden_dim, input_dim);
        let (w2, b2) = layer(hidden_dim, hidden_dim);
        let (w3, b3) = layer(action_dim, hidden_dim);
        Self { w1, b1, w2, b2, w3, b3 }
    }

    pub fn zeros_like(other: &Self) -> Self {
        Self {
            w1: Array2::zeros(other.w1.raw_dim()),
            b1: Array1::zeros(other.b1.raw_dim()),
            w2: Array2::zeros(other.w2.raw_dim()),
            b2: Array1::zeros(other.b2.raw_dim()),
            w3: Array2::zeros(other.w3.raw_dim()),
            b3: Array1::zeros(other.b3.raw_dim()),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.w1.ncols()
    }

    pub fn hidden_dim(&self) -> usize {
        self.w1.nrows()
    }

    pub fn action_dim(&self) -> usize {
        self.w3.nrows()
    }

    /// Checks that all tensors chain together and match the given layout.
    pub fn has_layout(&self, input_dim: usize, hidden_dim: usize, action_dim: usize) -> bool {
        self.w1.dim() == (hidden_dim, input_dim)
            && self.b1.len() == hidden_dim
            && self.w2.dim() == (hidden_dim, hidden_dim)
            && self.b2.len() == hidden_dim
            && self.w3.dim() == (action_dim, hidden_dim)
            && self.b3.len() == action_dim
    }

    pub fn tensors(&self) -> Vec<&[f64]> {
        [
            self.w1.as_slice(),
            self.b1.as_slice(),
            self.w2.as_slice(),
            self.b2.as_slice(),
            self.w3.as_slice(),
            self.b3.as_slice(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Q-values for one state.
    pub fn forward(&self, x: ArrayView1<f64>) -> Array1<f64> {
        self.forward_cached(x).q
    }

    fn forward_cached(&self, x: ArrayView1<f64>) -> ForwardCache {
        let z1 = self.w1.dot(&x) + &self.b1;
        let a1 = z1.mapv(relu);
        let z2 = self.w2.dot(&a1) + &self.b2;
        let a2 = z2.mapv(relu);
        let q = self.w3.dot(&a2) + &self.b3;
        ForwardCache { z1, a1, z2, a2, q }
    }

    /// Accumulates into `grads` the gradient of `scale * (Q(x)[action] - target)^2`
    /// and returns the TD error.
    pub fn accumulate_gradients(
        &self,
        x: ArrayView1<f64>,
        action: usize,
        target: f64,
        scale: f64,
        grads: &mut QNetwork,
    ) -> f64 {
        let cache = self.forward_cached(x);
        let td = cache.q[action] - target;

        let mut dq = Array1::<f64>::zeros(cache.q.len());
        dq[action] = 2.0 * td * scale;

        grads.w3 += &outer(&dq, &cache.a2);
        grads.b3 += &dq;

        let dz2 = self.w3.t().dot(&dq) * cache.z2.mapv(relu_grad);
        grads.w2 += &outer(&dz2, &cache.a1);
        grads.b2 += &dz2;

        let dz1 = self.w2.t().dot(&dz2) * cache.z1.mapv(relu_grad);
        grads.w1 += &outer(&dz1, &x.to_owned());
        grads.b1 += &dz1;

        td
    }
}

fn relu(x: f64) -> f64 {
    x.max(0.0)
}

fn relu_grad(z: f64) -> f64 {
    if z > 0.0 {
        1.0
    } else {
        0.0
    }
}

fn outer(col: &Array1<f64>, row: &Array1<f64>) -> Array2<f64> {
    col.view()
        .insert_axis(Axis(1))
        .dot(&row.view().insert_axis(Axis(0)))
}

/// Adam optimizer state (β1 = 0.9, β2 = 0.999, ε = 1e-8)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub step: u64,
    m: QNetwork,
    v: QNetwork,
}

impl Adam {
    pub fn new(params: &QNetwork, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            m: QNetwork::zeros_like(params),
            v: QNetwork::zeros_like(params),
        }
    }

    pub fn apply(&mut self, params: &mut QNetwork, grads: &QNetwork) {
        self.step += 1;
        let t = self.step as i32;
        let hyper = AdamStep {
            lr: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            bias1: 1.0 - self.beta1.powi(t),
            bias2: 1.0 - self.beta2.powi(t),
        };
        hyper.update(&mut params.w1, &mut self.m.w1, &mut self.v.w1, &grads.w1);
        hyper.update(&mut params.b1, &mut self.m.b1, &mut self.v.b1, &grads.b1);
        hyper.update(&mut params.w2, &mut self.m.w2, &mut self.v.w2, &grads.w2);
        hyper.update(&mut params.b2, &mut self.m.b2, &mut self.v.b2, &grads.b2);
        hyper.update(&mut params.w3, &mut self.m.w3, &mut self.v.w3, &grads.w3);
        hyper.update(&mut params.b3, &mut self.m.b3, &mut self.v.b3, &grads.b3);
    }
}

struct AdamStep {
    lr: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    bias1: f64,
    bias2: f64,
}

impl AdamStep {
    fn update<D: Dimension>(
        &self,
        param: &mut Array<f64, D>,
        m: &mut Array<f64, D>,
        v: &mut Array<f64, D>,
        grad: &Array<f64, D>,
    ) {
        Zip::from(param)
            .and(m)
            .and(v)
            .and(grad)
            .for_each(|p, m, v, &g| {
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                let m_hat = *m / self.bias1;
                let v_hat = *v / self.bias2;
                *p -= self.lr * m_hat / (v_hat.sqrt() + self.epsilon);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn net() -> QNetwork {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        QNetwork::random(4, 8, 3, &mut rng)
    }

    #[test]
    fn forward_produces_one_value_per_action() {
        let q = net().forward(Array1::from(vec![0.1, 0.2, 0.3, 0.4]).view());
        assert_eq!(q.len(), 3);
        assert!(q.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn layout_matches_dimensions() {
        let network = net();
        assert!(network.has_layout(4, 8, 3));
        assert!(!network.has_layout(5, 8, 3));
        assert_eq!(network.tensors().len(), 6);
        assert_eq!(network.w1.dim(), (8, 4));
        assert_eq!(network.w2.dim(), (8, 8));
        assert_eq!(network.w3.dim(), (3, 8));
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let network = net();
        let x = Array1::from(vec![0.5, -0.3, 0.8, 0.1]);
        let target = 1.0;
        let loss = |n: &QNetwork| (n.forward(x.view())[1] - target).powi(2);

        let mut grads = QNetwork::zeros_like(&network);
        network.accumulate_gradients(x.view(), 1, target, 1.0, &mut grads);

        let h = 1e-6;
        let mut plus = network.clone();
        plus.b3[1] += h;
        let numeric = (loss(&plus) - loss(&network)) / h;
        assert!((numeric - grads.b3[1]).abs() < 1e-4);

        let mut plus = network.clone();
        plus.w1[[0, 2]] += h;
        let numeric = (loss(&plus) - loss(&network)) / h;
        assert!((numeric - grads.w1[[0, 2]]).abs() < 1e-4);
    }

    #[test]
    fn adam_reduces_td_error() {
        let mut network = net();
        let mut adam = Adam::new(&network, 1e-2);
        let x = Array1::from(vec![0.2, 0.4, 0.6, 0.8]);
        let before = (network.forward(x.view())[0] - 2.0).abs();
        for _ in 0..50 {
            let mut grads = QNetwork::zeros_like(&network);
            network.accumulate_gradients(x.view(), 0, 2.0, 1.0, &mut grads);
            adam.apply(&mut network, &grads);
        }
        let after = (network.forward(x.view())[0] - 2.0).abs();
        assert!(after < before);
    }
}
