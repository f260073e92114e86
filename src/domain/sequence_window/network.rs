//! Stacked recurrent regressor trained by backpropagation through time.
//!
//! ```text
//! window (L x 1)
//!   -> LSTM(units_1, full sequence) -> Dropout
//!   -> LSTM(units_2, last step)     -> Dropout
//!   -> Dense(dense_units, relu)     -> Dense(1)
//! ```
//!
//! Gates per LSTM step, with `z = W [x; h_prev] + b` split into four blocks:
//!
//! ```text
//! i = sigmoid(z_i)   f = sigmoid(z_f)   g = tanh(z_g)   o = sigmoid(z_o)
//! c = f * c_prev + i * g
//! h = o * tanh(c)
//! ```
//!
//! Loss is mean-squared error, optimised with Adam. Early stopping watches
//! validation loss and the best weights seen are kept.

use ndarray::linalg::general_mat_mul;
use ndarray::{Array1, Array2, ArrayD, ArrayViewD, ArrayViewMutD, Axis, Zip, s};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::WindowExample;
use crate::domain::error::ForecastError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkShape {
    pub units_1: usize,
    pub units_2: usize,
    pub dense_units: usize,
    pub dropout: f64,
}

impl Default for NetworkShape {
    fn default() -> Self {
        Self {
            units_1: 64,
            units_2: 32,
            dense_units: 16,
            dropout: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub patience: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOutcome {
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub best_validation_loss: f64,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn sigmoid_grad(y: f64) -> f64 {
    y * (1.0 - y)
}

fn tanh_grad(y: f64) -> f64 {
    1.0 - y * y
}

fn glorot(rng: &mut StdRng, rows: usize, cols: usize) -> Array2<f64> {
    let limit = (6.0 / (rows + cols) as f64).sqrt();
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-limit..limit))
}

/// `grad += d_out ⊗ input`
fn accumulate_outer(grad: &mut Array2<f64>, d_out: &Array1<f64>, input: &Array1<f64>) {
    let column = d_out.view().insert_axis(Axis(1));
    let row = input.view().insert_axis(Axis(0));
    general_mat_mul(1.0, &column, &row, 1.0, grad);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Lstm {
    input: usize,
    hidden: usize,
    /// `4*hidden x (input + hidden)`, gate order i, f, g, o.
    weights: Array2<f64>,
    bias: Array1<f64>,
}

struct LstmStep {
    concat: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    c_prev: Array1<f64>,
    tanh_c: Array1<f64>,
}

impl Lstm {
    fn new(input: usize, hidden: usize, rng: &mut StdRng) -> Self {
        let weights = glorot(rng, 4 * hidden, input + hidden);
        let mut bias: Array1<f64> = Array1::zeros(4 * hidden);
        // forget gate starts open
        bias.slice_mut(s![hidden..2 * hidden]).fill(1.0);
        Self {
            input,
            hidden,
            weights,
            bias,
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            input: self.input,
            hidden: self.hidden,
            weights: Array2::zeros(self.weights.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        }
    }

    fn forward(&self, inputs: &[Array1<f64>]) -> (Vec<Array1<f64>>, Vec<LstmStep>) {
        let hs = self.hidden;
        let mut h: Array1<f64> = Array1::zeros(hs);
        let mut c: Array1<f64> = Array1::zeros(hs);
        let mut outputs = Vec::with_capacity(inputs.len());
        let mut steps = Vec::with_capacity(inputs.len());

        for x in inputs {
            let mut concat: Array1<f64> = Array1::zeros(self.input + hs);
            concat.slice_mut(s![..self.input]).assign(x);
            concat.slice_mut(s![self.input..]).assign(&h);

            let z = self.weights.dot(&concat) + &self.bias;
            let i = z.slice(s![..hs]).mapv(sigmoid);
            let f = z.slice(s![hs..2 * hs]).mapv(sigmoid);
            let g = z.slice(s![2 * hs..3 * hs]).mapv(f64::tanh);
            let o = z.slice(s![3 * hs..]).mapv(sigmoid);

            let c_prev = c;
            c = &f * &c_prev + &i * &g;
            let tanh_c = c.mapv(f64::tanh);
            h = &o * &tanh_c;

            outputs.push(h.clone());
            steps.push(LstmStep {
                concat,
                i,
                f,
                g,
                o,
                c_prev,
                tanh_c,
            });
        }
        (outputs, steps)
    }

    /// Accumulates parameter gradients into `grad` and returns the gradient
    /// with respect to each step's input.
    fn backward(
        &self,
        steps: &[LstmStep],
        d_outputs: &[Array1<f64>],
        grad: &mut Lstm,
    ) -> Vec<Array1<f64>> {
        let hs = self.hidden;
        let mut dh_next: Array1<f64> = Array1::zeros(hs);
        let mut dc_next: Array1<f64> = Array1::zeros(hs);
        let mut d_inputs: Vec<Array1<f64>> = vec![Array1::zeros(0); steps.len()];

        for t in (0..steps.len()).rev() {
            let st = &steps[t];
            let dh = &d_outputs[t] + &dh_next;
            let d_o = &dh * &st.tanh_c;
            let dc = &dc_next + &(&dh * &st.o * &st.tanh_c.mapv(tanh_grad));
            let d_i = &dc * &st.g;
            let d_g = &dc * &st.i;
            let d_f = &dc * &st.c_prev;
            dc_next = &dc * &st.f;

            let mut dz: Array1<f64> = Array1::zeros(4 * hs);
            dz.slice_mut(s![..hs]).assign(&(d_i * &st.i.mapv(sigmoid_grad)));
            dz.slice_mut(s![hs..2 * hs]).assign(&(d_f * &st.f.mapv(sigmoid_grad)));
            dz.slice_mut(s![2 * hs..3 * hs]).assign(&(d_g * &st.g.mapv(tanh_grad)));
            dz.slice_mut(s![3 * hs..]).assign(&(d_o * &st.o.mapv(sigmoid_grad)));

            grad.bias += &dz;
            accumulate_outer(&mut grad.weights, &dz, &st.concat);

            let d_concat = self.weights.t().dot(&dz);
            dh_next = d_concat.slice(s![self.input..]).to_owned();
            d_inputs[t] = d_concat.slice(s![..self.input]).to_owned();
        }
        d_inputs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Dense {
    /// `output x input`
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl Dense {
    fn new(input: usize, output: usize, rng: &mut StdRng) -> Self {
        Self {
            weights: glorot(rng, output, input),
            bias: Array1::zeros(output),
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            weights: Array2::zeros(self.weights.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        }
    }

    fn forward(&self, x: &Array1<f64>) -> Array1<f64> {
        self.weights.dot(x) + &self.bias
    }

    fn backward(&self, x: &Array1<f64>, d_out: &Array1<f64>, grad: &mut Dense) -> Array1<f64> {
        grad.bias += d_out;
        accumulate_outer(&mut grad.weights, d_out, x);
        self.weights.t().dot(d_out)
    }
}

/// Activations kept from a training-mode forward pass.
struct Trace {
    steps_1: Vec<LstmStep>,
    masks_1: Vec<Array1<f64>>,
    steps_2: Vec<LstmStep>,
    mask_2: Array1<f64>,
    dense_in: Array1<f64>,
    hidden_pre: Array1<f64>,
    hidden: Array1<f64>,
    output: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrentNetwork {
    lstm_1: Lstm,
    lstm_2: Lstm,
    dense_1: Dense,
    dense_2: Dense,
    dropout: f64,
}

fn window_inputs(window: &[f64]) -> Vec<Array1<f64>> {
    window.iter().map(|&v| Array1::from_elem(1, v)).collect()
}

impl RecurrentNetwork {
    pub fn new(shape: NetworkShape, rng: &mut StdRng) -> Self {
        Self {
            lstm_1: Lstm::new(1, shape.units_1, rng),
            lstm_2: Lstm::new(shape.units_1, shape.units_2, rng),
            dense_1: Dense::new(shape.units_2, shape.dense_units, rng),
            dense_2: Dense::new(shape.dense_units, 1, rng),
            dropout: shape.dropout,
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            lstm_1: self.lstm_1.zeros_like(),
            lstm_2: self.lstm_2.zeros_like(),
            dense_1: self.dense_1.zeros_like(),
            dense_2: self.dense_2.zeros_like(),
            dropout: self.dropout,
        }
    }

    fn tensors(&self) -> [ArrayViewD<'_, f64>; 8] {
        [
            self.lstm_1.weights.view().into_dyn(),
            self.lstm_1.bias.view().into_dyn(),
            self.lstm_2.weights.view().into_dyn(),
            self.lstm_2.bias.view().into_dyn(),
            self.dense_1.weights.view().into_dyn(),
            self.dense_1.bias.view().into_dyn(),
            self.dense_2.weights.view().into_dyn(),
            self.dense_2.bias.view().into_dyn(),
        ]
    }

    fn tensors_mut(&mut self) -> [ArrayViewMutD<'_, f64>; 8] {
        [
            self.lstm_1.weights.view_mut().into_dyn(),
            self.lstm_1.bias.view_mut().into_dyn(),
            self.lstm_2.weights.view_mut().into_dyn(),
            self.lstm_2.bias.view_mut().into_dyn(),
            self.dense_1.weights.view_mut().into_dyn(),
            self.dense_1.bias.view_mut().into_dyn(),
            self.dense_2.weights.view_mut().into_dyn(),
            self.dense_2.bias.view_mut().into_dyn(),
        ]
    }

    fn last_or_zeros(&self, sequence: &[Array1<f64>]) -> Array1<f64> {
        sequence
            .last()
            .cloned()
            .unwrap_or_else(|| Array1::zeros(self.lstm_2.hidden))
    }

    /// Inference-mode prediction of the value following `window`.
    pub fn predict(&self, window: &[f64]) -> f64 {
        let (seq_1, _) = self.lstm_1.forward(&window_inputs(window));
        let (seq_2, _) = self.lstm_2.forward(&seq_1);
        let hidden = self.dense_1.forward(&self.last_or_zeros(&seq_2)).mapv(|v| v.max(0.0));
        self.dense_2.forward(&hidden)[0]
    }

    fn dropout_mask(&self, len: usize, rng: &mut StdRng) -> Array1<f64> {
        if self.dropout <= 0.0 {
            return Array1::ones(len);
        }
        let keep = 1.0 - self.dropout;
        Array1::from_shape_fn(len, |_| if rng.r#gen::<f64>() < keep { 1.0 / keep } else { 0.0 })
    }

    fn forward_train(&self, window: &[f64], rng: &mut StdRng) -> Trace {
        let (raw_1, steps_1) = self.lstm_1.forward(&window_inputs(window));
        let masks_1: Vec<Array1<f64>> = raw_1
            .iter()
            .map(|h| self.dropout_mask(h.len(), rng))
            .collect();
        let seq_1: Vec<Array1<f64>> = raw_1.iter().zip(&masks_1).map(|(h, m)| h * m).collect();

        let (raw_2, steps_2) = self.lstm_2.forward(&seq_1);
        let last = self.last_or_zeros(&raw_2);
        let mask_2 = self.dropout_mask(last.len(), rng);
        let dense_in = &last * &mask_2;

        let hidden_pre = self.dense_1.forward(&dense_in);
        let hidden = hidden_pre.mapv(|v| v.max(0.0));
        let output = self.dense_2.forward(&hidden)[0];

        Trace {
            steps_1,
            masks_1,
            steps_2,
            mask_2,
            dense_in,
            hidden_pre,
            hidden,
            output,
        }
    }

    fn backward(&self, trace: &Trace, d_output: f64, grad: &mut RecurrentNetwork) {
        let d_hidden =
            self.dense_2
                .backward(&trace.hidden, &Array1::from_elem(1, d_output), &mut grad.dense_2);
        let relu_mask = trace.hidden_pre.mapv(|pre| if pre > 0.0 { 1.0 } else { 0.0 });
        let d_hidden_pre = d_hidden * &relu_mask;
        let d_dense_in = self
            .dense_1
            .backward(&trace.dense_in, &d_hidden_pre, &mut grad.dense_1);

        let steps = trace.steps_2.len();
        let mut d_seq_2: Vec<Array1<f64>> = vec![Array1::zeros(self.lstm_2.hidden); steps];
        if let Some(last) = d_seq_2.last_mut() {
            *last = &d_dense_in * &trace.mask_2;
        }
        let d_seq_1 = self.lstm_2.backward(&trace.steps_2, &d_seq_2, &mut grad.lstm_2);

        let d_raw_1: Vec<Array1<f64>> = d_seq_1
            .iter()
            .zip(&trace.masks_1)
            .map(|(d, m)| d * m)
            .collect();
        self.lstm_1.backward(&trace.steps_1, &d_raw_1, &mut grad.lstm_1);
    }

    /// Mean-squared error over `examples` in inference mode.
    pub fn loss(&self, examples: &[WindowExample]) -> f64 {
        if examples.is_empty() {
            return 0.0;
        }
        examples
            .iter()
            .map(|e| (self.predict(&e.input) - e.target).powi(2))
            .sum::<f64>()
            / examples.len() as f64
    }

    /// Trains on `train` in chronological mini-batches, monitoring
    /// `validation` for early stopping. On return the network holds the
    /// weights from the epoch with the lowest validation loss.
    pub fn fit(
        &mut self,
        train: &[WindowExample],
        validation: &[WindowExample],
        config: FitConfig,
        rng: &mut StdRng,
    ) -> Result<FitOutcome, ForecastError> {
        let mut adam = Adam::new(self, config.learning_rate);
        let mut best = self.clone();
        let mut best_loss = f64::INFINITY;
        let mut best_epoch = 0;
        let mut wait = 0;
        let mut epochs_run = 0;
        let batch_size = config.batch_size.max(1);

        for epoch in 1..=config.epochs {
            epochs_run = epoch;
            for batch in train.chunks(batch_size) {
                let mut grad = self.zeros_like();
                let scale = 2.0 / batch.len() as f64;
                for example in batch {
                    let trace = self.forward_train(&example.input, rng);
                    let d_output = scale * (trace.output - example.target);
                    self.backward(&trace, d_output, &mut grad);
                }
                adam.step(self, &grad);
            }

            let val_loss = self.loss(validation);
            if !val_loss.is_finite() {
                return Err(ForecastError::numerical(format!(
                    "validation loss diverged at epoch {epoch}"
                )));
            }
            tracing::debug!(epoch, val_loss, "sequence-window epoch complete");

            if val_loss < best_loss {
                best_loss = val_loss;
                best_epoch = epoch;
                best = self.clone();
                wait = 0;
            } else {
                wait += 1;
                if wait >= config.patience {
                    tracing::debug!(epoch, best_epoch, "early stopping");
                    break;
                }
            }
        }

        if best_epoch > 0 {
            *self = best;
        }
        Ok(FitOutcome {
            epochs_run,
            best_epoch,
            best_validation_loss: best_loss,
        })
    }
}

struct Adam {
    learning_rate: f64,
    beta_1: f64,
    beta_2: f64,
    epsilon: f64,
    step: i32,
    m: Vec<ArrayD<f64>>,
    v: Vec<ArrayD<f64>>,
}

impl Adam {
    fn new(network: &RecurrentNetwork, learning_rate: f64) -> Self {
        let zeros: Vec<ArrayD<f64>> = network
            .tensors()
            .iter()
            .map(|t| ArrayD::zeros(t.raw_dim()))
            .collect();
        Self {
            learning_rate,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-7,
            step: 0,
            m: zeros.clone(),
            v: zeros,
        }
    }

    fn step(&mut self, network: &mut RecurrentNetwork, grad: &RecurrentNetwork) {
        self.step += 1;
        let (beta_1, beta_2, epsilon) = (self.beta_1, self.beta_2, self.epsilon);
        let correction = (1.0 - beta_2.powi(self.step)).sqrt() / (1.0 - beta_1.powi(self.step));
        let lr = self.learning_rate * correction;

        let moments = self.m.iter_mut().zip(self.v.iter_mut());
        for ((param, g), (m, v)) in network
            .tensors_mut()
            .into_iter()
            .zip(grad.tensors())
            .zip(moments)
        {
            Zip::from(param)
                .and(&g)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = beta_1 * *m + (1.0 - beta_1) * g;
                    *v = beta_2 * *v + (1.0 - beta_2) * g * g;
                    *p -= lr * *m / (v.sqrt() + epsilon);
                });
        }
    }
}
