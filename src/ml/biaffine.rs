// ============================================================
// Layer 5 — Biaffine Scorers
// ============================================================
// A pairwise biaffine scorer assigns a score vector to every
// ordered pair (i, j) of two word-vector sequences:
//
//   score(i, j) = [x_i ; 1]ᵀ · W · [y_j ; 1]      W: [d1+1, out, d2+1]
//
// The appended 1 gives the form its linear and bias terms.
//
// Two variants share this module:
//   direct — the bilinear form applied to the inputs as-is
//   deep   — both inputs first go through Linear → ReLU →
//            Dropout (separate projections per side)
//
// Output is the full pairwise grid [batch, L1, L2, out].
// The bilinear weight starts at zero, so an untrained scorer
// gives every pair the same score.
//
// Reference: Dozat & Manning (2017) Deep Biaffine Attention

use burn::{
    module::Param,
    nn::{Dropout, DropoutConfig, Initializer, Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

#[derive(Config, Debug)]
pub struct BiaffineScorerConfig {
    pub input1_dim: usize,
    pub input2_dim: usize,
    pub output_dim: usize,
    /// `None` builds the direct scorer, `Some(h)` the deep one.
    #[config(default = "None")]
    pub hidden_dim: Option<usize>,
    #[config(default = 0.0)]
    pub dropout: f64,
}

impl BiaffineScorerConfig {
    pub fn direct(input1_dim: usize, input2_dim: usize, output_dim: usize) -> Self {
        Self::new(input1_dim, input2_dim, output_dim)
    }

    pub fn deep(input1_dim: usize, input2_dim: usize, hidden_dim: usize, output_dim: usize, dropout: f64) -> Self {
        Self::new(input1_dim, input2_dim, output_dim)
            .with_hidden_dim(Some(hidden_dim))
            .with_dropout(dropout)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> BiaffineScorer<B> {
        let (proj1, proj2, d1, d2) = match self.hidden_dim {
            Some(h) => (
                Some(LinearConfig::new(self.input1_dim, h).init(device)),
                Some(LinearConfig::new(self.input2_dim, h).init(device)),
                h,
                h,
            ),
            None => (None, None, self.input1_dim, self.input2_dim),
        };
        let weight = Initializer::Zeros.init([d1 + 1, self.output_dim, d2 + 1], device);
        BiaffineScorer {
            proj1,
            proj2,
            dropout: DropoutConfig::new(self.dropout).init(),
            weight,
            output_dim: self.output_dim,
        }
    }
}

#[derive(Module, Debug)]
pub struct BiaffineScorer<B: Backend> {
    proj1:      Option<Linear<B>>,
    proj2:      Option<Linear<B>>,
    dropout:    Dropout,
    weight:     Param<Tensor<B, 3>>,
    output_dim: usize,
}

impl<B: Backend> BiaffineScorer<B> {
    pub fn is_deep(&self) -> bool {
        self.proj1.is_some()
    }

    /// x1: [batch, L1, d1], x2: [batch, L2, d2] → [batch, L1, L2, out]
    pub fn forward(&self, x1: Tensor<B, 3>, x2: Tensor<B, 3>) -> Tensor<B, 4> {
        let (x1, x2) = match (&self.proj1, &self.proj2) {
            (Some(p1), Some(p2)) => (
                self.dropout.forward(relu(p1.forward(x1))),
                self.dropout.forward(relu(p2.forward(x2))),
            ),
            _ => (x1, x2),
        };

        let [batch, l1, d1] = x1.dims();
        let [_, l2, d2] = x2.dims();
        let device = x1.device();
        let out = self.output_dim;

        let x1 = Tensor::cat(vec![x1, Tensor::ones([batch, l1, 1], &device)], 2);
        let x2 = Tensor::cat(vec![x2, Tensor::ones([batch, l2, 1], &device)], 2);

        // [batch·L1, d1+1] × [d1+1, out·(d2+1)]
        let left = x1
            .reshape([batch * l1, d1 + 1])
            .matmul(self.weight.val().reshape([d1 + 1, out * (d2 + 1)]))
            .reshape([batch, l1 * out, d2 + 1]);

        // [batch, L1·out, d2+1] × [batch, d2+1, L2]
        left.matmul(x2.swap_dims(1, 2))
            .reshape([batch, l1, out, l2])
            .swap_dims(2, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn input(batch: usize, len: usize, dim: usize) -> Tensor<TestBackend, 3> {
        let data: Vec<f32> = (0..batch * len * dim).map(|v| (v % 7) as f32 * 0.1 - 0.3).collect();
        Tensor::<TestBackend, 1>::from_floats(data.as_slice(), &Default::default()).reshape([batch, len, dim])
    }

    #[test]
    fn test_direct_pairwise_shape() {
        let device = Default::default();
        let scorer = BiaffineScorerConfig::direct(6, 6, 5).init::<TestBackend>(&device);
        assert!(!scorer.is_deep());
        let x = input(2, 4, 6);
        assert_eq!(scorer.forward(x.clone(), x).dims(), [2, 4, 4, 5]);
    }

    #[test]
    fn test_deep_pairwise_shape() {
        let device = Default::default();
        let scorer = BiaffineScorerConfig::deep(6, 6, 3, 1, 0.3).init::<TestBackend>(&device);
        assert!(scorer.is_deep());
        let x = input(2, 4, 6);
        assert_eq!(scorer.forward(x.clone(), x).dims(), [2, 4, 4, 1]);
    }

    #[test]
    fn test_zero_init_scores_are_zero() {
        let device = Default::default();
        let scorer = BiaffineScorerConfig::direct(3, 3, 2).init::<TestBackend>(&device);
        let x = input(1, 3, 3);
        let total: f32 = scorer.forward(x.clone(), x).abs().sum().into_scalar();
        assert_eq!(total, 0.0);
    }

    #[test]
    fn test_identity_weight_gives_dot_products() {
        let device = Default::default();
        let d = 3;
        let mut w = vec![0.0f32; (d + 1) * (d + 1)];
        for a in 0..d {
            w[a * (d + 1) + a] = 1.0;
        }
        let mut scorer = BiaffineScorerConfig::direct(d, d, 1).init::<TestBackend>(&device);
        scorer.weight = Param::from_tensor(
            Tensor::<TestBackend, 1>::from_floats(w.as_slice(), &device).reshape([d + 1, 1, d + 1]),
        );

        let x = input(1, 2, d);
        let y = input(1, 3, d);
        let scores: Vec<f32> = scorer.forward(x.clone(), y.clone()).into_data().to_vec().unwrap();
        let xs: Vec<f32> = x.into_data().to_vec().unwrap();
        let ys: Vec<f32> = y.into_data().to_vec().unwrap();
        for i in 0..2 {
            for j in 0..3 {
                let dot: f32 = (0..d).map(|k| xs[i * d + k] * ys[j * d + k]).sum();
                assert!((scores[i * 3 + j] - dot).abs() < 1e-5);
            }
        }
    }
}
