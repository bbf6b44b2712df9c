// ============================================================
// Layer 5 — Optimizer, Scheduler and the Update Step
// ============================================================
// AdamW with decoupled weight decay and a linear warmup /
// linear decay learning rate:
//
//   lr(t) = base · t / warmup                 t < warmup
//   lr(t) = base · (total − t) / (total − warmup)   otherwise
//
// warmup = warmup_prop · total, total = epochs · batches.
//
// ModelUpdater owns the model being trained and performs the
// one in-place optimization step the loss engine asks for:
//   backward → global-norm clipping → AdamW step
//   → scheduler step
// Clipping looks at all gradients together: when the L2 norm
// of the concatenated gradients exceeds max_grad_norm, every
// gradient is scaled by max_grad_norm / (norm + eps).
// Burn returns fresh gradients from every backward pass, so
// no gradient outlives its step.
//
// Reference: Loshchilov & Hutter (2019) Decoupled Weight Decay

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::domain::error::{ParserError, Result};

#[derive(Debug, Clone)]
pub struct OptimizerSettings {
    pub learning_rate: f64,
    pub weight_decay:  f32,
    pub adam_epsilon:  f32,
    /// 0 disables clipping.
    pub max_grad_norm: f32,
    pub warmup_prop:   f64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self { learning_rate: 5e-5, weight_decay: 0.01, adam_epsilon: 1e-8, max_grad_norm: 1.0, warmup_prop: 0.1 }
    }
}

impl OptimizerSettings {
    pub fn adamw(&self) -> AdamWConfig {
        AdamWConfig::new()
            .with_weight_decay(self.weight_decay)
            .with_epsilon(self.adam_epsilon)
    }

    pub fn scheduler(&self, total_steps: usize) -> WarmupLinearScheduler {
        WarmupLinearScheduler::new(self.learning_rate, self.warmup_prop, total_steps)
    }
}

#[derive(Debug, Clone)]
pub struct WarmupLinearScheduler {
    base_lr:      f64,
    warmup_steps: usize,
    total_steps:  usize,
    current_step: usize,
}

impl WarmupLinearScheduler {
    pub fn new(base_lr: f64, warmup_prop: f64, total_steps: usize) -> Self {
        let warmup_steps = (warmup_prop.clamp(0.0, 1.0) * total_steps as f64) as usize;
        Self { base_lr, warmup_steps, total_steps, current_step: 0 }
    }

    pub fn lr(&self) -> f64 {
        let t = self.current_step;
        if t < self.warmup_steps {
            return self.base_lr * t as f64 / self.warmup_steps.max(1) as f64;
        }
        let remaining = self.total_steps.saturating_sub(t) as f64;
        let decay = self.total_steps.saturating_sub(self.warmup_steps).max(1) as f64;
        self.base_lr * (remaining / decay).max(0.0)
    }

    pub fn step(&mut self) {
        self.current_step += 1;
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }
}

const CLIP_EPS: f32 = 1e-6;

struct GradNorm<'a> {
    grads:  &'a GradientsParams,
    sum_sq: f32,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradNorm<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        let Some(g) = self.grads.get::<B::InnerBackend, D>(id) else { return };
        let sq = (g.clone() * g).sum().into_data().convert::<f32>().to_vec::<f32>().unwrap_or_default();
        self.sum_sq += sq.iter().sum::<f32>();
    }
}

struct GradScale<'a> {
    grads: &'a mut GradientsParams,
    scale: f32,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradScale<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(g) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register(id, g.mul_scalar(self.scale));
        }
    }
}

/// L2 norm of all gradients of `model`, taken together.
pub fn global_grad_norm<B: AutodiffBackend, M: AutodiffModule<B>>(model: &M, grads: &GradientsParams) -> f32 {
    let mut visitor = GradNorm { grads, sum_sq: 0.0 };
    model.visit(&mut visitor);
    visitor.sum_sq.sqrt()
}

/// Scale all gradients so their global norm is at most `max_norm`.
/// Returns the norm before clipping. `max_norm <= 0` leaves them alone.
pub fn clip_grad_norm<B: AutodiffBackend, M: AutodiffModule<B>>(
    model:    &M,
    grads:    &mut GradientsParams,
    max_norm: f32,
) -> f32 {
    let norm = global_grad_norm::<B, M>(model, grads);
    if max_norm > 0.0 && norm > max_norm {
        let mut visitor = GradScale { grads, scale: max_norm / (norm + CLIP_EPS) };
        model.visit(&mut visitor);
    }
    norm
}

/// The single in-place optimization step the loss engine may trigger.
pub trait ParameterUpdate<B: Backend> {
    fn apply(&mut self, loss: Tensor<B, 1>) -> Result<()>;

    /// Learning rate the next step will use.
    fn learning_rate(&self) -> f64;
}

pub struct ModelUpdater<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    model:     Option<M>,
    optim:     O,
    base_lr:   f64,
    max_grad_norm: f32,
    scheduler: Option<WarmupLinearScheduler>,
    _backend:  std::marker::PhantomData<B>,
}

impl<B, M, O> ModelUpdater<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    pub fn new(
        model:         M,
        optim:         O,
        base_lr:       f64,
        max_grad_norm: f32,
        scheduler:     Option<WarmupLinearScheduler>,
    ) -> Self {
        Self { model: Some(model), optim, base_lr, max_grad_norm, scheduler, _backend: std::marker::PhantomData }
    }

    pub fn model(&self) -> Result<&M> {
        self.model
            .as_ref()
            .ok_or_else(|| ParserError::checkpoint("model was lost during a failed optimization step"))
    }

    /// Replace the model by `f(model)`, e.g. to freeze or unfreeze layers.
    pub fn map_model<F: FnOnce(M) -> M>(&mut self, f: F) -> Result<()> {
        let model = self
            .model
            .take()
            .ok_or_else(|| ParserError::checkpoint("model was lost during a failed optimization step"))?;
        self.model = Some(f(model));
        Ok(())
    }

    pub fn into_model(self) -> Result<M> {
        self.model
            .ok_or_else(|| ParserError::checkpoint("model was lost during a failed optimization step"))
    }
}

impl<B, M, O> ParameterUpdate<B> for ModelUpdater<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    fn apply(&mut self, loss: Tensor<B, 1>) -> Result<()> {
        let model = self
            .model
            .take()
            .ok_or_else(|| ParserError::checkpoint("model was lost during a failed optimization step"))?;
        let lr = self.learning_rate();

        let grads = loss.backward();
        let mut grads = GradientsParams::from_grads(grads, &model);
        let norm = clip_grad_norm::<B, M>(&model, &mut grads, self.max_grad_norm);
        tracing::trace!("gradient norm {norm:.4}");
        self.model = Some(self.optim.step(lr, model, grads));

        if let Some(s) = self.scheduler.as_mut() {
            s.step();
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.scheduler.as_ref().map_or(self.base_lr, WarmupLinearScheduler::lr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        module::{Module, Param},
    };

    type TestBackend = Autodiff<NdArray<f32>>;

    #[derive(Module, Debug)]
    struct Pair<B: Backend> {
        a: Param<Tensor<B, 1>>,
        b: Param<Tensor<B, 1>>,
    }

    /// Gradients are 0.6 for `a` and 0.8 for `b`: global norm 1.0.
    fn pair_with_grads() -> (Pair<TestBackend>, GradientsParams) {
        let device = Default::default();
        let pair = Pair::<TestBackend> {
            a: Param::from_tensor(Tensor::from_floats([1.0], &device)),
            b: Param::from_tensor(Tensor::from_floats([1.0], &device)),
        };
        let loss = (pair.a.val().mul_scalar(0.6) + pair.b.val().mul_scalar(0.8)).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &pair);
        (pair, grads)
    }

    fn grad_of(grads: &GradientsParams, p: &Param<Tensor<TestBackend, 1>>) -> f32 {
        grads.get::<NdArray<f32>, 1>(p.id).unwrap().into_data().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn test_clipping_scales_all_gradients_together() {
        let (pair, mut grads) = pair_with_grads();
        let before = clip_grad_norm::<TestBackend, _>(&pair, &mut grads, 0.5);
        assert!((before - 1.0).abs() < 1e-5);

        assert!((grad_of(&grads, &pair.a) - 0.3).abs() < 1e-5);
        assert!((grad_of(&grads, &pair.b) - 0.4).abs() < 1e-5);
        assert!(global_grad_norm::<TestBackend, _>(&pair, &grads) <= 0.5 + 1e-6);
    }

    #[test]
    fn test_clipping_leaves_small_gradients_alone() {
        let (pair, mut grads) = pair_with_grads();
        clip_grad_norm::<TestBackend, _>(&pair, &mut grads, 5.0);
        assert!((grad_of(&grads, &pair.a) - 0.6).abs() < 1e-6);
        assert!((grad_of(&grads, &pair.b) - 0.8).abs() < 1e-6);

        clip_grad_norm::<TestBackend, _>(&pair, &mut grads, 0.0);
        assert!((grad_of(&grads, &pair.b) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_warmup_then_linear_decay() {
        let mut s = WarmupLinearScheduler::new(1.0, 0.1, 100);
        assert_eq!(s.lr(), 0.0);
        for _ in 0..5 {
            s.step();
        }
        assert!((s.lr() - 0.5).abs() < 1e-9);
        for _ in 5..10 {
            s.step();
        }
        assert!((s.lr() - 1.0).abs() < 1e-9);
        for _ in 10..55 {
            s.step();
        }
        assert!((s.lr() - 0.5).abs() < 1e-9);
        for _ in 55..120 {
            s.step();
        }
        assert_eq!(s.lr(), 0.0);
    }

    #[test]
    fn test_no_warmup_starts_at_base() {
        let s = WarmupLinearScheduler::new(2e-5, 0.0, 10);
        assert!((s.lr() - 2e-5).abs() < 1e-12);
    }
}
