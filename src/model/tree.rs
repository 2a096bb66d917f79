//! Regression trees and their best-first histogram grower

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::binning::BinMapper;

/// A node in a fitted tree. Children are indices into `Tree::nodes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeNode {
    Split {
        feature: usize,
        /// Bin-space threshold: bins `<= bin` go left
        bin: u8,
        /// Raw-value threshold: values `<= threshold` (and NaN) go left
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Score one row of raw feature values
    pub fn predict_row(&self, value_of: impl Fn(usize) -> f64) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    let v = value_of(*feature);
                    idx = if v.is_nan() || v <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Score one row of binned values
    pub fn predict_binned(&self, binned: &[Vec<u8>], row: usize) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    bin,
                    left,
                    right,
                    ..
                } => {
                    idx = if binned[*feature][row] <= *bin {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match &nodes[idx] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Growth constraints for a single tree
#[derive(Debug, Clone)]
pub struct GrowerParams {
    pub max_leaf_nodes: usize,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub l2_regularization: f64,
    pub learning_rate: f64,
}

/// Best split found for a node
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    bin: u8,
    gain: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct BinStats {
    grad: f64,
    hess: f64,
    count: usize,
}

/// Node under construction
struct GrowNode {
    rows: Vec<u32>,
    depth: usize,
    grad_sum: f64,
    hess_sum: f64,
    split: Option<SplitCandidate>,
    children: Option<(usize, usize)>,
}

/// Gradient-statistic score of a node: G^2 / (H + lambda)
#[inline]
fn node_score(grad: f64, hess: f64, lambda: f64) -> f64 {
    grad * grad / (hess + lambda)
}

/// Scan one feature's histogram left to right for the best bin threshold.
///
/// Strictly greater gains win, so ties resolve to the lowest bin.
fn best_split_for_feature(
    hist: &[BinStats],
    feature: usize,
    parent: BinStats,
    params: &GrowerParams,
) -> Option<SplitCandidate> {
    let lambda = params.l2_regularization;
    let parent_score = node_score(parent.grad, parent.hess, lambda);

    let mut best: Option<SplitCandidate> = None;
    let mut left = BinStats::default();

    for (bin, stats) in hist.iter().enumerate().take(hist.len().saturating_sub(1)) {
        left.grad += stats.grad;
        left.hess += stats.hess;
        left.count += stats.count;

        let right_count = parent.count - left.count;
        if left.count < params.min_samples_leaf || right_count < params.min_samples_leaf {
            continue;
        }

        let right_grad = parent.grad - left.grad;
        let right_hess = parent.hess - left.hess;
        let gain = node_score(left.grad, left.hess, lambda)
            + node_score(right_grad, right_hess, lambda)
            - parent_score;

        if gain > 0.0 && best.map_or(true, |b| gain > b.gain) {
            best = Some(SplitCandidate {
                feature,
                bin: bin as u8,
                gain,
            });
        }
    }

    best
}

/// Grows one least-squares tree on binned data
pub struct TreeGrower<'a> {
    binned: &'a [Vec<u8>],
    mapper: &'a BinMapper,
    gradients: &'a [f64],
    params: &'a GrowerParams,
    nodes: Vec<GrowNode>,
}

impl<'a> TreeGrower<'a> {
    pub fn new(
        binned: &'a [Vec<u8>],
        mapper: &'a BinMapper,
        gradients: &'a [f64],
        params: &'a GrowerParams,
    ) -> Self {
        Self {
            binned,
            mapper,
            gradients,
            params,
            nodes: Vec::new(),
        }
    }

    /// Make a node and find its best split. Hessians are all 1 for squared error.
    fn make_node(&self, rows: Vec<u32>, depth: usize) -> GrowNode {
        let grad_sum: f64 = rows.iter().map(|&r| self.gradients[r as usize]).sum();
        let hess_sum = rows.len() as f64;

        let depth_ok = self.params.max_depth.map_or(true, |max| depth < max);
        let size_ok = rows.len() >= 2 * self.params.min_samples_leaf;

        let split = if depth_ok && size_ok {
            self.find_split(&rows, grad_sum, hess_sum)
        } else {
            None
        };

        GrowNode {
            rows,
            depth,
            grad_sum,
            hess_sum,
            split,
            children: None,
        }
    }

    /// Build histograms per feature in parallel, then pick the best split
    /// sequentially so the choice never depends on thread scheduling.
    fn find_split(&self, rows: &[u32], grad_sum: f64, hess_sum: f64) -> Option<SplitCandidate> {
        let parent = BinStats {
            grad: grad_sum,
            hess: hess_sum,
            count: rows.len(),
        };

        let per_feature: Vec<Option<SplitCandidate>> = (0..self.binned.len())
            .into_par_iter()
            .map(|feature| {
                let n_bins = self.mapper.n_bins(feature);
                if n_bins < 2 {
                    return None;
                }
                let column = &self.binned[feature];
                let mut hist = vec![BinStats::default(); n_bins];
                for &r in rows {
                    let stats = &mut hist[column[r as usize] as usize];
                    stats.grad += self.gradients[r as usize];
                    stats.hess += 1.0;
                    stats.count += 1;
                }
                best_split_for_feature(&hist, feature, parent, self.params)
            })
            .collect();

        per_feature
            .into_iter()
            .flatten()
            .fold(None, |best: Option<SplitCandidate>, cand| match best {
                Some(b) if b.gain >= cand.gain => Some(b),
                _ => Some(cand),
            })
    }

    fn leaf_value(&self, node: &GrowNode) -> f64 {
        -self.params.learning_rate * node.grad_sum
            / (node.hess_sum + self.params.l2_regularization)
    }

    /// Grow best-first until the leaf budget is spent or no leaf can split.
    ///
    /// Returns the tree and, for every training row, the value of the leaf it
    /// landed in.
    pub fn grow(mut self, rows: Vec<u32>, n_total_rows: usize) -> (Tree, Vec<(u32, f64)>) {
        let root = self.make_node(rows, 0);
        self.nodes.push(root);
        let mut n_leaves = 1;

        while n_leaves < self.params.max_leaf_nodes {
            // Open leaf with the highest gain, lowest index on ties
            let next = self
                .nodes
                .iter()
                .enumerate()
                .filter(|(_, n)| n.children.is_none())
                .filter_map(|(i, n)| n.split.map(|s| (i, s)))
                .fold(None, |best: Option<(usize, SplitCandidate)>, (i, s)| match best {
                    Some((_, b)) if b.gain >= s.gain => best,
                    _ => Some((i, s)),
                });

            let Some((idx, split)) = next else { break };

            let column = &self.binned[split.feature];
            let (left_rows, right_rows): (Vec<u32>, Vec<u32>) = self.nodes[idx]
                .rows
                .iter()
                .partition(|&&r| column[r as usize] <= split.bin);

            let depth = self.nodes[idx].depth + 1;
            let left = self.make_node(left_rows, depth);
            let right = self.make_node(right_rows, depth);

            let left_idx = self.nodes.len();
            self.nodes.push(left);
            self.nodes.push(right);
            self.nodes[idx].children = Some((left_idx, left_idx + 1));
            n_leaves += 1;
        }

        let mut assignments = Vec::with_capacity(n_total_rows);
        let nodes = self
            .nodes
            .iter()
            .map(|node| match (node.children, node.split) {
                (Some((left, right)), Some(split)) => TreeNode::Split {
                    feature: split.feature,
                    bin: split.bin,
                    threshold: self.mapper.threshold(split.feature, split.bin),
                    left,
                    right,
                },
                _ => {
                    let value = self.leaf_value(node);
                    assignments.extend(node.rows.iter().map(|&r| (r, value)));
                    TreeNode::Leaf { value }
                }
            })
            .collect();

        (Tree { nodes }, assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::matrix::FeatureMatrix;

    fn params() -> GrowerParams {
        GrowerParams {
            max_leaf_nodes: 31,
            max_depth: None,
            min_samples_leaf: 1,
            l2_regularization: 0.0,
            learning_rate: 1.0,
        }
    }

    #[test]
    fn test_step_function_single_split() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&v| if v < 5.0 { 0.0 } else { 10.0 }).collect();
        let matrix = FeatureMatrix::from_columns(vec!["x".into()], vec![x]).unwrap();
        let rows: Vec<u32> = (0..10).collect();
        let mapper = BinMapper::fit(&matrix, &rows, 255);
        let binned = mapper.transform(&matrix);

        // Gradients of squared error at prediction 0
        let gradients: Vec<f64> = y.iter().map(|v| -v).collect();
        let p = GrowerParams {
            max_leaf_nodes: 2,
            ..params()
        };
        let (tree, assignments) = TreeGrower::new(&binned, &mapper, &gradients, &p).grow(rows, 10);

        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.predict_row(|_| 2.0), 0.0);
        assert_eq!(tree.predict_row(|_| 7.0), 10.0);
        assert_eq!(tree.predict_row(|_| f64::NAN), 0.0);
        assert_eq!(assignments.len(), 10);
        match &tree.nodes[0] {
            TreeNode::Split { threshold, .. } => assert_eq!(*threshold, 4.5),
            other => panic!("expected split at root, got {:?}", other),
        }
    }

    #[test]
    fn test_respects_depth_and_leaf_limits() {
        let x: Vec<f64> = (0..64).map(|i| i as f64).collect();
        let gradients: Vec<f64> = x.iter().map(|v| -(v * v)).collect();
        let matrix = FeatureMatrix::from_columns(vec!["x".into()], vec![x]).unwrap();
        let rows: Vec<u32> = (0..64).collect();
        let mapper = BinMapper::fit(&matrix, &rows, 255);
        let binned = mapper.transform(&matrix);

        let p = GrowerParams {
            max_depth: Some(2),
            ..params()
        };
        let (tree, _) = TreeGrower::new(&binned, &mapper, &gradients, &p).grow(rows.clone(), 64);
        assert!(tree.depth() <= 2);
        assert!(tree.n_leaves() <= 4);

        let p = GrowerParams {
            max_leaf_nodes: 5,
            ..params()
        };
        let (tree, _) = TreeGrower::new(&binned, &mapper, &gradients, &p).grow(rows, 64);
        assert_eq!(tree.n_leaves(), 5);
    }

    #[test]
    fn test_min_samples_leaf_blocks_small_children() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let mut gradients = vec![0.0; 10];
        gradients[0] = -100.0;
        let matrix = FeatureMatrix::from_columns(vec!["x".into()], vec![x]).unwrap();
        let rows: Vec<u32> = (0..10).collect();
        let mapper = BinMapper::fit(&matrix, &rows, 255);
        let binned = mapper.transform(&matrix);

        let p = GrowerParams {
            min_samples_leaf: 5,
            ..params()
        };
        let (tree, _) = TreeGrower::new(&binned, &mapper, &gradients, &p).grow(rows, 10);
        match &tree.nodes[0] {
            TreeNode::Split { threshold, .. } => assert_eq!(*threshold, 4.5),
            TreeNode::Leaf { .. } => panic!("expected a split"),
        }
    }

    #[test]
    fn test_binned_and_raw_prediction_agree() {
        let x: Vec<f64> = (0..200).map(|i| ((i * 13) % 97) as f64).collect();
        let gradients: Vec<f64> = x.iter().map(|v| (v / 10.0).sin()).collect();
        let matrix = FeatureMatrix::from_columns(vec!["x".into()], vec![x.clone()]).unwrap();
        let rows: Vec<u32> = (0..200).collect();
        let mapper = BinMapper::fit(&matrix, &rows, 16);
        let binned = mapper.transform(&matrix);

        let (tree, assignments) =
            TreeGrower::new(&binned, &mapper, &gradients, &params()).grow(rows, 200);

        for (row, value) in assignments {
            let r = row as usize;
            assert_eq!(tree.predict_binned(&binned, r), value);
            assert_eq!(tree.predict_row(|_| x[r]), value);
        }
    }
}
