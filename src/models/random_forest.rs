use crate::config::{FOREST_MIN_SAMPLES_SPLIT, FOREST_SEED, FOREST_TREES};
use crate::error::{DashError, Result};
use rand::prelude::*;
use rayon::prelude::*;

// ── Forest parameters ──────────────────────────────────────────────────────────
/// Bagged regression trees; every split considers every feature.
#[derive(Clone, Debug)]
pub struct ForestParams {
    pub n_trees: usize,
    /// `None` grows each tree until its leaves are pure.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: FOREST_TREES,
            max_depth: None,
            min_samples_split: FOREST_MIN_SAMPLES_SPLIT,
            seed: FOREST_SEED,
        }
    }
}

// ── Single CART tree ───────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Clone, Debug)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

impl RegressionTree {
    /// Grows a variance-reduction tree over the rows listed in `sample`.
    ///
    /// `sample` may repeat rows (bootstrap draws).
    pub fn fit(
        features: &[Vec<f64>],
        targets: &[f64],
        sample: Vec<usize>,
        params: &ForestParams,
    ) -> Self {
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut stack: Vec<(usize, Vec<usize>, usize)> = vec![(0, sample, 0)];

        while let Some((node_id, rows, depth)) = stack.pop() {
            let value = mean_of(targets, &rows);
            let depth_reached = params.max_depth.is_some_and(|d| depth >= d);

            if rows.len() < params.min_samples_split.max(2) || depth_reached || is_pure(targets, &rows) {
                nodes[node_id] = Node::Leaf { value };
                continue;
            }

            match best_split(features, targets, &rows) {
                Some(split) => {
                    let left_id = nodes.len();
                    nodes.push(Node::Leaf { value: 0.0 });
                    let right_id = nodes.len();
                    nodes.push(Node::Leaf { value: 0.0 });
                    nodes[node_id] = Node::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left: left_id,
                        right: right_id,
                    };
                    stack.push((left_id, split.left, depth + 1));
                    stack.push((right_id, split.right, depth + 1));
                }
                None => nodes[node_id] = Node::Leaf { value },
            }
        }

        Self { nodes }
    }

    pub fn predict_one(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let x = row.get(*feature).copied().unwrap_or(f64::NAN);
                    idx = if x <= *threshold { *left } else { *right };
                }
            }
        }
    }

    #[cfg(test)]
    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

fn mean_of(targets: &[f64], rows: &[usize]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().map(|&i| targets[i]).sum::<f64>() / rows.len() as f64
}

fn is_pure(targets: &[f64], rows: &[usize]) -> bool {
    let first = targets[rows[0]];
    rows.iter().all(|&i| (targets[i] - first).abs() <= f64::EPSILON * first.abs().max(1.0))
}

fn best_split(features: &[Vec<f64>], targets: &[f64], rows: &[usize]) -> Option<SplitCandidate> {
    let n_features = features.first().map(|r| r.len()).unwrap_or(0);
    let total: f64 = rows.iter().map(|&i| targets[i]).sum();
    let n = rows.len();
    // (feature, threshold, score) where score = sum_l^2/n_l + sum_r^2/n_r;
    // a larger score means a lower squared error.
    let mut best: Option<(usize, f64, f64)> = None;

    for feature in 0..n_features {
        let mut order = rows.to_vec();
        order.sort_by(|&a, &b| features[a][feature].total_cmp(&features[b][feature]));

        let mut left_sum = 0.0;
        for k in 1..n {
            left_sum += targets[order[k - 1]];
            let lo = features[order[k - 1]][feature];
            let hi = features[order[k]][feature];
            if hi <= lo {
                continue;
            }
            let right_sum = total - left_sum;
            let n_left = k as f64;
            let n_right = (n - k) as f64;
            let score = left_sum * left_sum / n_left + right_sum * right_sum / n_right;
            if best.is_none_or(|(_, _, s)| score > s) {
                let mut threshold = lo + (hi - lo) / 2.0;
                if threshold >= hi || !threshold.is_finite() {
                    threshold = lo;
                }
                best = Some((feature, threshold, score));
            }
        }
    }

    let (feature, threshold, _) = best?;
    let (left, right): (Vec<usize>, Vec<usize>) = rows
        .iter()
        .partition(|&&i| features[i][feature] <= threshold);
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some(SplitCandidate {
        feature,
        threshold,
        left,
        right,
    })
}

// ── Forest ─────────────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct RandomForestRegressor {
    trees: Vec<RegressionTree>,
}

impl RandomForestRegressor {
    /// Fits `params.n_trees` trees on bootstrap samples, in parallel.
    ///
    /// Tree `i` draws from its own RNG seeded with `seed + i`, so the fitted
    /// forest does not depend on thread scheduling.
    pub fn fit(features: &[Vec<f64>], targets: &[f64], params: &ForestParams) -> Result<Self> {
        if features.is_empty() {
            return Err(DashError::Model("cannot fit a forest on zero rows".to_string()));
        }
        if features.len() != targets.len() {
            return Err(DashError::Model(format!(
                "feature rows ({}) and targets ({}) differ in length",
                features.len(),
                targets.len()
            )));
        }
        let width = features[0].len();
        if width == 0 || features.iter().any(|r| r.len() != width) {
            return Err(DashError::Model("feature rows must share a non-zero width".to_string()));
        }
        if features.iter().flatten().chain(targets).any(|v| !v.is_finite()) {
            return Err(DashError::Model("training data contains non-finite values".to_string()));
        }

        let n = features.len();
        let trees = (0..params.n_trees.max(1))
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(i as u64));
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(features, targets, sample, params)
            })
            .collect();

        Ok(Self { trees })
    }

    pub fn predict_one(&self, row: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict_one(row)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_one(r)).collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
