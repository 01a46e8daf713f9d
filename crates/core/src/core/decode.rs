//! Activation decoding: which neurons fire and which significant edges carry signal.

use hashbrown::HashSet;

use crate::error::{Result, VizError};
use crate::significance::SignificanceMask;
use crate::wire::{topics, ActivationSnapshot};

/// Neurons of one layer whose activation exceeds the threshold.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FiringSet {
    flags: Vec<bool>,
    count: usize,
}

impl FiringSet {
    pub fn from_activations(activations: &[f32], threshold: f32) -> Self {
        let flags: Vec<bool> = activations.iter().map(|&a| a > threshold).collect();
        let count = flags.iter().filter(|&&f| f).count();
        Self { flags, count }
    }

    /// Number of neurons in the layer (firing or not).
    #[inline]
    pub fn width(&self) -> usize {
        self.flags.len()
    }

    /// Number of firing neurons.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn contains(&self, i: usize) -> bool {
        self.flags.get(i).copied().unwrap_or(false)
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.flags
            .iter()
            .enumerate()
            .filter_map(|(i, &f)| f.then_some(i))
    }
}

/// Significant edges whose endpoints both fire.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActiveEdges {
    edges: HashSet<(u32, u32)>,
}

impl ActiveEdges {
    #[inline]
    pub fn contains(&self, from: usize, to: usize) -> bool {
        self.edges.contains(&(from as u32, to as u32))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.edges.iter().map(|&(a, b)| (a as usize, b as usize))
    }
}

/// Decode one layer transition. Only mask members are ever examined.
pub fn active_edges(mask: &SignificanceMask, from: &FiringSet, to: &FiringSet) -> ActiveEdges {
    if from.is_empty() || to.is_empty() {
        return ActiveEdges::default();
    }
    let edges = mask
        .iter()
        .filter(|&(i, j)| from.contains(i) && to.contains(j))
        .map(|(i, j)| (i as u32, j as u32))
        .collect();
    ActiveEdges { edges }
}

/// Per-tick derived state for one snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedFrame {
    /// One entry per layer, input pixels first.
    pub firing: Vec<FiringSet>,
    /// One entry per weight layer: edges into layer `k + 1`.
    pub active: Vec<ActiveEdges>,
}

/// Decode a snapshot against the masks of the loaded structure.
///
/// The frame pixels act as the input layer's activations. Each transition is
/// decoded independently with its own mask and its own pair of firing sets.
pub fn decode(
    snapshot: &ActivationSnapshot,
    masks: &[SignificanceMask],
    threshold: f32,
) -> Result<DecodedFrame> {
    let layers: [&[f32]; 3] = [&snapshot.frame.pixels, &snapshot.hidden, &snapshot.output];
    if masks.len() + 1 != layers.len() {
        return Err(VizError::mismatch("decoded layer count", layers.len(), masks.len() + 1));
    }

    for (k, mask) in masks.iter().enumerate() {
        let (from, to) = (layers[k].len(), layers[k + 1].len());
        if from != mask.rows() || to != mask.cols() {
            return Err(VizError::malformed(
                topics::ACTIVATION,
                format!(
                    "layer {} transition is {}x{} but the model expects {}x{}",
                    k,
                    from,
                    to,
                    mask.rows(),
                    mask.cols()
                ),
            ));
        }
    }

    let firing: Vec<FiringSet> = layers
        .iter()
        .map(|a| FiringSet::from_activations(a, threshold))
        .collect();
    let active = masks
        .iter()
        .enumerate()
        .map(|(k, mask)| active_edges(mask, &firing[k], &firing[k + 1]))
        .collect();

    Ok(DecodedFrame { firing, active })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::significance::compute_mask;
    use crate::structure::WeightMatrix;
    use crate::wire::GameFrame;

    fn full_mask(rows: usize, cols: usize) -> SignificanceMask {
        compute_mask(&WeightMatrix::new(rows, cols, vec![1.0; rows * cols]).unwrap(), 1.0)
    }

    fn single_edge_mask(rows: usize, cols: usize, edge: (usize, usize)) -> SignificanceMask {
        let mut data = vec![0.0; rows * cols];
        data[edge.0 * cols + edge.1] = 1.0;
        let m = compute_mask(&WeightMatrix::new(rows, cols, data).unwrap(), 1.0 / (rows * cols) as f32);
        assert_eq!(m.iter().collect::<Vec<_>>(), vec![edge]);
        m
    }

    #[test]
    fn threshold_is_exclusive() {
        let f = FiringSet::from_activations(&[0.9, 0.1, 0.5], 0.5);
        assert_eq!(f.indices().collect::<Vec<_>>(), vec![0]);
        assert_eq!(f.width(), 3);
        assert!(!f.contains(7));
    }

    #[test]
    fn edge_needs_both_endpoints_firing() {
        let snapshot = ActivationSnapshot {
            frame: GameFrame::new(1, 1, vec![1.0]).unwrap(),
            hidden: vec![0.9, 0.1],
            output: vec![0.3, 0.2, 0.5],
        };
        let masks = [full_mask(1, 2), single_edge_mask(2, 3, (0, 0))];

        let decoded = decode(&snapshot, &masks, 0.5).unwrap();
        assert_eq!(decoded.firing[1].indices().collect::<Vec<_>>(), vec![0]);
        assert!(decoded.firing[2].is_empty());
        assert!(decoded.active[1].is_empty());

        let mut firing_output = snapshot.clone();
        firing_output.output = vec![0.8, 0.2, 0.5];
        let decoded = decode(&firing_output, &masks, 0.5).unwrap();
        assert_eq!(decoded.active[1].iter().collect::<Vec<_>>(), vec![(0, 0)]);
    }

    #[test]
    fn non_significant_edges_never_activate() {
        let mask = single_edge_mask(2, 2, (1, 1));
        let all = FiringSet::from_activations(&[1.0, 1.0], 0.0);
        let active = active_edges(&mask, &all, &all);
        assert_eq!(active.len(), 1);
        assert!(active.contains(1, 1));
        assert!(!active.contains(0, 0));
    }

    #[test]
    fn transitions_use_their_own_firing_sets() {
        let snapshot = ActivationSnapshot {
            frame: GameFrame::new(2, 1, vec![0.0, 1.0]).unwrap(),
            hidden: vec![1.0, 0.0],
            output: vec![1.0],
        };
        let decoded = decode(&snapshot, &[full_mask(2, 2), full_mask(2, 1)], 0.0).unwrap();
        assert_eq!(decoded.active[0].iter().collect::<Vec<_>>(), vec![(1, 0)]);
        assert_eq!(decoded.active[1].iter().collect::<Vec<_>>(), vec![(0, 0)]);
    }

    #[test]
    fn shape_disagreement_is_malformed() {
        let snapshot = ActivationSnapshot {
            frame: GameFrame::new(1, 1, vec![1.0]).unwrap(),
            hidden: vec![1.0, 1.0, 1.0],
            output: vec![1.0],
        };
        let err = decode(&snapshot, &[full_mask(1, 2), full_mask(2, 1)], 0.0).unwrap_err();
        assert!(matches!(err, VizError::MalformedPayload { .. }));
        assert!(decode(&snapshot, &[full_mask(1, 3)], 0.0).is_err());
    }
}
