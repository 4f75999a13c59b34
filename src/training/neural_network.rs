//! Neural Network (Multi-Layer Perceptron) implementation
//!
//! A feedforward network trained by mini-batch backpropagation with the Adam
//! optimizer. The classifier ends in a softmax over the classes; the regressor
//! has one linear output and learns a standardized target.

use crate::error::{Result, StudioError};
use super::models::{
    check_fit_input, check_predict_input, unique_classes, Classifier, ProbabilisticClassifier,
    Regressor,
};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hidden-layer activation function
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Rectified Linear Unit
    #[default]
    Relu,
    Tanh,
    /// Sigmoid
    Logistic,
    Identity,
}

impl Activation {
    fn apply(&self, z: &mut Array2<f64>) {
        match self {
            Activation::Relu => z.mapv_inplace(|v| v.max(0.0)),
            Activation::Tanh => z.mapv_inplace(f64::tanh),
            Activation::Logistic => z.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Identity => {}
        }
    }

    /// Derivative expressed through the activation output
    fn derivative(&self, a: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => a.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Tanh => a.mapv(|v| 1.0 - v * v),
            Activation::Logistic => a.mapv(|v| v * (1.0 - v)),
            Activation::Identity => Array2::ones(a.raw_dim()),
        }
    }
}

/// Neural Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPConfig {
    /// Hidden layer sizes
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    /// Adam step size
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub batch_size: usize,
    /// L2 regularization
    pub alpha: f64,
    pub random_state: u64,
    /// Minimum training-loss improvement that resets the patience counter
    pub tol: f64,
    /// Epochs without improvement before stopping
    pub early_stopping_patience: usize,
}

impl Default for MLPConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![100, 50],
            activation: Activation::Relu,
            learning_rate: 0.001,
            max_epochs: 200,
            batch_size: 32,
            alpha: 0.0001,
            random_state: 42,
            tol: 1e-4,
            early_stopping_patience: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Loss {
    /// ½·mean squared error on a linear output
    Squared,
    /// Cross-entropy on a softmax output
    CrossEntropy,
}

/// Dense layers with a shared hidden activation and a raw output layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Network {
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    activation: Activation,
}

impl Network {
    /// Glorot-uniform weights, zero biases
    fn init(sizes: &[usize], activation: Activation, rng: &mut ChaCha8Rng) -> Self {
        let mut weights = Vec::with_capacity(sizes.len().saturating_sub(1));
        let mut biases = Vec::with_capacity(sizes.len().saturating_sub(1));
        for pair in sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            let bound = (6.0 / (n_in + n_out) as f64).sqrt();
            weights.push(Array2::from_shape_fn((n_in, n_out), |_| rng.gen_range(-bound..bound)));
            biases.push(Array1::zeros(n_out));
        }
        Self { weights, biases, activation }
    }

    fn n_inputs(&self) -> usize {
        self.weights.first().map_or(0, |w| w.nrows())
    }

    fn n_parameters(&self) -> usize {
        self.weights.iter().map(|w| w.len()).sum::<usize>() + self.biases.iter().map(|b| b.len()).sum::<usize>()
    }

    /// Activations of every layer, input included; the last is the raw output
    fn forward(&self, x: &Array2<f64>, loss: Loss) -> Vec<Array2<f64>> {
        let mut activations = Vec::with_capacity(self.weights.len() + 1);
        activations.push(x.clone());
        let last = self.weights.len().saturating_sub(1);
        for (i, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let mut z = activations[i].dot(w) + b;
            if i < last {
                self.activation.apply(&mut z);
            } else if let Loss::CrossEntropy = loss {
                softmax_rows(&mut z);
            }
            activations.push(z);
        }
        activations
    }

    fn output(&self, x: &Array2<f64>, loss: Loss) -> Array2<f64> {
        self.forward(x, loss).pop().unwrap_or_else(|| x.clone())
    }

    /// Backpropagate `(output − target) / n` through the layers
    fn gradients(&self, activations: &[Array2<f64>], target: &Array2<f64>, alpha: f64) -> Vec<(Array2<f64>, Array1<f64>)> {
        let n = target.nrows().max(1) as f64;
        let mut grads = Vec::with_capacity(self.weights.len());
        let Some(output) = activations.last() else {
            return grads;
        };
        let mut delta = (output - target) / n;

        for i in (0..self.weights.len()).rev() {
            let grad_w = activations[i].t().dot(&delta) + &(&self.weights[i] * (alpha / n));
            let grad_b = delta.sum_axis(Axis(0));
            if i > 0 {
                delta = delta.dot(&self.weights[i].t()) * self.activation.derivative(&activations[i]);
            }
            grads.push((grad_w, grad_b));
        }
        grads.reverse();
        grads
    }
}

fn softmax_rows(z: &mut Array2<f64>) {
    for mut row in z.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
}

fn loss_value(output: &Array2<f64>, target: &Array2<f64>, loss: Loss) -> f64 {
    let n = target.nrows().max(1) as f64;
    match loss {
        Loss::Squared => 0.5 * (output - target).mapv(|v| v * v).sum() / n,
        Loss::CrossEntropy => {
            -output
                .iter()
                .zip(target.iter())
                .map(|(p, t)| t * p.max(1e-15).ln())
                .sum::<f64>()
                / n
        }
    }
}

/// Adam moment estimates for every layer
struct Adam {
    m: Vec<(Array2<f64>, Array1<f64>)>,
    v: Vec<(Array2<f64>, Array1<f64>)>,
    t: i32,
    learning_rate: f64,
}

impl Adam {
    const BETA1: f64 = 0.9;
    const BETA2: f64 = 0.999;
    const EPS: f64 = 1e-8;

    fn new(net: &Network, learning_rate: f64) -> Self {
        let zeros: Vec<(Array2<f64>, Array1<f64>)> = net
            .weights
            .iter()
            .zip(&net.biases)
            .map(|(w, b)| (Array2::zeros(w.raw_dim()), Array1::zeros(b.len())))
            .collect();
        Self {
            m: zeros.clone(),
            v: zeros,
            t: 0,
            learning_rate,
        }
    }

    fn step(&mut self, net: &mut Network, grads: Vec<(Array2<f64>, Array1<f64>)>) {
        self.t += 1;
        let lr = self.learning_rate * (1.0 - Self::BETA2.powi(self.t)).sqrt() / (1.0 - Self::BETA1.powi(self.t));

        for (i, (gw, gb)) in grads.into_iter().enumerate() {
            let (mw, mb) = &mut self.m[i];
            let (vw, vb) = &mut self.v[i];
            *mw = &*mw * Self::BETA1 + &(&gw * (1.0 - Self::BETA1));
            *mb = &*mb * Self::BETA1 + &(&gb * (1.0 - Self::BETA1));
            *vw = &*vw * Self::BETA2 + &(gw.mapv(|g| g * g) * (1.0 - Self::BETA2));
            *vb = &*vb * Self::BETA2 + &(gb.mapv(|g| g * g) * (1.0 - Self::BETA2));

            net.weights[i] -= &(&*mw / &vw.mapv(|v| v.sqrt() + Self::EPS) * lr);
            net.biases[i] -= &(&*mb / &vb.mapv(|v| v.sqrt() + Self::EPS) * lr);
        }
    }
}

/// Train a freshly initialized network; returns it with the epochs run
fn train(x: &Array2<f64>, target: &Array2<f64>, config: &MLPConfig, loss: Loss) -> Result<(Network, usize)> {
    if config.hidden_layers.iter().any(|&h| h == 0) {
        return Err(StudioError::InvalidParameter {
            name: "hidden_layers".to_string(),
            value: format!("{:?}", config.hidden_layers),
            reason: "every layer needs at least one unit".to_string(),
        });
    }
    let n = x.nrows();
    let mut sizes = Vec::with_capacity(config.hidden_layers.len() + 2);
    sizes.push(x.ncols());
    sizes.extend(&config.hidden_layers);
    sizes.push(target.ncols());

    let mut rng = ChaCha8Rng::seed_from_u64(config.random_state);
    let mut net = Network::init(&sizes, config.activation, &mut rng);
    let mut adam = Adam::new(&net, config.learning_rate);
    let batch_size = config.batch_size.clamp(1, n);

    let mut best_loss = f64::INFINITY;
    let mut stale = 0;
    let mut epochs = 0;
    let mut indices: Vec<usize> = (0..n).collect();

    for _ in 0..config.max_epochs {
        indices.shuffle(&mut rng);
        let mut epoch_loss = 0.0;
        for batch in indices.chunks(batch_size) {
            let xb = x.select(Axis(0), batch);
            let tb = target.select(Axis(0), batch);
            let activations = net.forward(&xb, loss);
            if let Some(output) = activations.last() {
                epoch_loss += loss_value(output, &tb, loss) * batch.len() as f64;
            }
            let grads = net.gradients(&activations, &tb, config.alpha);
            adam.step(&mut net, grads);
        }
        epochs += 1;
        epoch_loss /= n as f64;

        if !epoch_loss.is_finite() {
            return Err(StudioError::TrainingError("Network training diverged".to_string()));
        }
        if epoch_loss < best_loss - config.tol {
            best_loss = epoch_loss;
            stale = 0;
        } else {
            stale += 1;
            if stale >= config.early_stopping_patience.max(1) {
                debug!(epochs, loss = epoch_loss, "Training loss stopped improving");
                break;
            }
        }
    }
    Ok((net, epochs))
}

/// Multi-Layer Perceptron Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPRegressor {
    pub config: MLPConfig,
    network: Option<Network>,
    y_mean: f64,
    y_std: f64,
    n_iter: usize,
}

impl MLPRegressor {
    pub fn new(config: MLPConfig) -> Self {
        Self {
            config,
            network: None,
            y_mean: 0.0,
            y_std: 1.0,
            n_iter: 0,
        }
    }

    /// Epochs run by the last fit
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn n_parameters(&self) -> usize {
        self.network.as_ref().map_or(0, Network::n_parameters)
    }
}

impl Regressor for MLPRegressor {
    fn name(&self) -> &'static str {
        "mlp"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.y_mean = y.mean().unwrap_or(0.0);
        let std = y.std(0.0);
        self.y_std = if std > 1e-12 { std } else { 1.0 };

        let target = y.mapv(|v| (v - self.y_mean) / self.y_std).insert_axis(Axis(1));
        let (network, epochs) = train(x, &target, &self.config, Loss::Squared)?;
        self.network = Some(network);
        self.n_iter = epochs;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let network = self.network.as_ref().ok_or(StudioError::ModelNotFitted)?;
        check_predict_input(x, network.n_inputs())?;
        let out = network.output(x, Loss::Squared);
        Ok(out.column(0).mapv(|v| v * self.y_std + self.y_mean))
    }
}

/// Multi-Layer Perceptron Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPClassifier {
    pub config: MLPConfig,
    network: Option<Network>,
    classes: Vec<f64>,
    n_iter: usize,
}

impl MLPClassifier {
    pub fn new(config: MLPConfig) -> Self {
        Self {
            config,
            network: None,
            classes: Vec::new(),
            n_iter: 0,
        }
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn n_parameters(&self) -> usize {
        self.network.as_ref().map_or(0, Network::n_parameters)
    }
}

impl Classifier for MLPClassifier {
    fn name(&self) -> &'static str {
        "mlp"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.classes = unique_classes(y);
        if self.classes.len() < 2 {
            return Err(StudioError::TrainingError(
                "A neural network classifier needs at least two classes".to_string(),
            ));
        }

        let onehot = Array2::from_shape_fn((y.len(), self.classes.len()), |(i, c)| {
            if y[i] == self.classes[c] { 1.0 } else { 0.0 }
        });
        let (network, epochs) = train(x, &onehot, &self.config, Loss::CrossEntropy)?;
        self.network = Some(network);
        self.n_iter = epochs;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc })
                    .0;
                self.classes[best]
            })
            .collect())
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }

    fn as_probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        Some(self)
    }
}

impl ProbabilisticClassifier for MLPClassifier {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let network = self.network.as_ref().ok_or(StudioError::ModelNotFitted)?;
        check_predict_input(x, network.n_inputs())?;
        Ok(network.output(x, Loss::CrossEntropy))
    }
}
