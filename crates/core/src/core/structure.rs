//! Network structure: weight matrices and bias vectors for each layer.
//!
//! Layer `k` maps the previous layer's neurons (rows) onto its own neurons
//! (columns). The first layer's previous layer is the game frame, one input
//! per pixel.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VizError};
use crate::prng::Prng;

/// Dense row-major weight matrix, `rows` inputs by `cols` outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl WeightMatrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        let expected = rows
            .checked_mul(cols)
            .ok_or_else(|| VizError::mismatch("weight matrix size", usize::MAX, data.len()))?;
        if data.len() != expected {
            return Err(VizError::mismatch("weight matrix entries", expected, data.len()));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from nested rows; every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let n_rows = rows.len();
        let mut data = Vec::with_capacity(n_rows * cols);
        for row in rows {
            if row.len() != cols {
                return Err(VizError::mismatch("weight matrix row", cols, row.len()));
            }
            data.extend_from_slice(&row);
        }
        Self::new(n_rows, cols, data)
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// `(row, col)` of a flat row-major index.
    #[inline]
    pub fn coords(&self, flat: usize) -> (usize, usize) {
        (flat / self.cols, flat % self.cols)
    }

    /// Incoming weights of output neuron `col`, one per input.
    pub fn column(&self, col: usize) -> impl Iterator<Item = f32> + '_ {
        (0..self.rows).map(move |r| self.data[r * self.cols + col])
    }

    /// Largest absolute weight (0 for an empty matrix).
    pub fn max_abs(&self) -> f32 {
        self.data
            .iter()
            .filter(|w| w.is_finite())
            .fold(0.0f32, |m, w| m.max(w.abs()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub weights: WeightMatrix,
    pub biases: Vec<f32>,
}

impl Layer {
    pub fn new(weights: WeightMatrix, biases: Vec<f32>) -> Result<Self> {
        if biases.len() != weights.cols() {
            return Err(VizError::mismatch(
                "bias vector",
                weights.cols(),
                biases.len(),
            ));
        }
        Ok(Self { weights, biases })
    }

    /// Neuron count of this layer.
    #[inline]
    pub fn neurons(&self) -> usize {
        self.biases.len()
    }

    #[inline]
    pub fn inputs(&self) -> usize {
        self.weights.rows()
    }
}

/// Ordered layers of one model, validated so adjacent shapes agree.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkStructure {
    layers: Vec<Layer>,
}

impl NetworkStructure {
    pub fn new(layers: Vec<Layer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(VizError::mismatch("layer count", 1, 0));
        }
        for pair in layers.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.inputs() != prev.neurons() {
                return Err(VizError::mismatch(
                    "weight matrix rows",
                    prev.neurons(),
                    next.inputs(),
                ));
            }
        }
        Ok(Self { layers })
    }

    /// Keras-style weight list: `[W0, b0, W1, b1, ...]`.
    pub fn from_weight_list(tensors: Vec<Tensor>) -> Result<Self> {
        if tensors.len() % 2 != 0 {
            return Err(VizError::mismatch(
                "weight list length (even)",
                tensors.len() + 1,
                tensors.len(),
            ));
        }
        let mut layers = Vec::with_capacity(tensors.len() / 2);
        let mut it = tensors.into_iter();
        while let (Some(w), Some(b)) = (it.next(), it.next()) {
            let weights = match w {
                Tensor::Matrix(rows) => WeightMatrix::from_rows(rows)?,
                Tensor::Vector(_) => return Err(VizError::mismatch("weight matrix rank", 2, 1)),
            };
            let biases = match b {
                Tensor::Vector(v) => v,
                Tensor::Matrix(_) => return Err(VizError::mismatch("bias vector rank", 1, 2)),
            };
            layers.push(Layer::new(weights, biases)?);
        }
        Self::new(layers)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let tensors: Vec<Tensor> = serde_json::from_str(json)?;
        Self::from_weight_list(tensors)
    }

    pub fn to_weight_list(&self) -> Vec<Tensor> {
        let mut out = Vec::with_capacity(self.layers.len() * 2);
        for layer in &self.layers {
            let w = &layer.weights;
            let rows = (0..w.rows())
                .map(|r| w.as_slice()[r * w.cols()..(r + 1) * w.cols()].to_vec())
                .collect();
            out.push(Tensor::Matrix(rows));
            out.push(Tensor::Vector(layer.biases.clone()));
        }
        out
    }

    /// Deterministic synthetic structure, used when no model file is available.
    ///
    /// `sizes[0]` is the input width; each following entry is a layer's neuron count.
    pub fn synthetic(sizes: &[usize], seed: u64) -> Result<Self> {
        if sizes.len() < 2 {
            return Err(VizError::mismatch("synthetic layer sizes", 2, sizes.len()));
        }
        let mut rng = Prng::new(seed);
        let mut layers = Vec::with_capacity(sizes.len() - 1);
        for pair in sizes.windows(2) {
            let (rows, cols) = (pair[0], pair[1]);
            let scale = 1.0 / (rows.max(1) as f32).sqrt();
            let data = (0..rows * cols)
                .map(|_| rng.gen_range_f32(-scale, scale))
                .collect();
            let biases = (0..cols).map(|_| rng.gen_range_f32(-0.1, 0.1)).collect();
            layers.push(Layer::new(WeightMatrix::new(rows, cols, data)?, biases)?);
        }
        Self::new(layers)
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Width of the input (the previous layer of the first weight matrix).
    #[inline]
    pub fn input_count(&self) -> usize {
        self.layers[0].inputs()
    }

    /// Neuron counts, input first.
    pub fn neuron_counts(&self) -> Vec<usize> {
        std::iter::once(self.input_count())
            .chain(self.layers.iter().map(Layer::neurons))
            .collect()
    }

    pub fn output_count(&self) -> usize {
        self.layers.last().map_or(0, Layer::neurons)
    }

    pub fn weight_count(&self) -> usize {
        self.layers.iter().map(|l| l.weights.len()).sum()
    }
}

/// One entry of a Keras-style weight list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tensor {
    Matrix(Vec<Vec<f32>>),
    Vector(Vec<f32>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keras_weight_list() {
        let json = "[[[0.1, -0.2], [0.3, 0.4], [0.5, 0.6]], [0.0, 0.1], [[1.0], [-1.0]], [0.5]]";
        let s = NetworkStructure::from_json_str(json).unwrap();
        assert_eq!(s.neuron_counts(), vec![3, 2, 1]);
        assert_eq!(s.layers()[0].weights.get(1, 0), 0.3);
        assert_eq!(s.output_count(), 1);
        assert_eq!(s.weight_count(), 8);
    }

    #[test]
    fn rejects_rows_that_disagree_with_previous_layer() {
        let l0 = Layer::new(WeightMatrix::new(4, 3, vec![0.0; 12]).unwrap(), vec![0.0; 3]).unwrap();
        let l1 = Layer::new(WeightMatrix::new(2, 2, vec![0.0; 4]).unwrap(), vec![0.0; 2]).unwrap();
        let err = NetworkStructure::new(vec![l0, l1]).unwrap_err();
        assert!(matches!(
            err,
            VizError::DimensionMismatch { expected: 3, actual: 2, .. }
        ));
    }

    #[test]
    fn rejects_bias_length_mismatch_and_ragged_rows() {
        let w = WeightMatrix::new(2, 3, vec![0.0; 6]).unwrap();
        assert!(Layer::new(w, vec![0.0; 2]).is_err());
        assert!(WeightMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).is_err());
    }

    #[test]
    fn column_reads_incoming_weights() {
        let w = WeightMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, -6.0]]).unwrap();
        assert_eq!(w.column(1).collect::<Vec<_>>(), vec![2.0, 4.0, -6.0]);
        assert_eq!(w.max_abs(), 6.0);
        assert_eq!(w.coords(3), (1, 1));
    }

    #[test]
    fn synthetic_structure_is_deterministic() {
        let a = NetworkStructure::synthetic(&[16, 4, 3], 7).unwrap();
        let b = NetworkStructure::synthetic(&[16, 4, 3], 7).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.neuron_counts(), vec![16, 4, 3]);
    }
}
