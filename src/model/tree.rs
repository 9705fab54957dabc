// 该文件是 Shibie （识别） 项目的一部分。
// src/model/tree.rs - CART 决策树
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::Classifier;

// 像素取值 0..=255
const LEVELS: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FitError {
  #[error("没有训练样本")]
  Empty,
  #[error("样本数 {samples} 与标签数 {labels} 不一致")]
  LabelCountMismatch { samples: usize, labels: usize },
  #[error("第 {index} 个样本的特征长度为 {found}, 期望 {expected}")]
  FeatureLengthMismatch {
    index: usize,
    expected: usize,
    found: usize,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionTreeParams {
  /// `None` 表示不限制深度
  pub max_depth: Option<usize>,
  pub min_samples_split: usize,
  pub min_samples_leaf: usize,
}

impl Default for DecisionTreeParams {
  fn default() -> Self {
    Self {
      max_depth: None,
      min_samples_split: 2,
      min_samples_leaf: 1,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
  Leaf {
    class: usize,
  },
  /// `input[feature] <= threshold` 走左子树
  Split {
    feature: usize,
    threshold: u8,
    left: usize,
    right: usize,
  },
}

/// 基尼不纯度的 CART 分类树，节点存放在一个数组里，根节点下标为 0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionTree {
  nodes: Vec<Node>,
  n_features: usize,
  n_classes: usize,
}

struct Pending {
  slot: usize,
  depth: usize,
  indices: Vec<usize>,
}

struct Split {
  feature: usize,
  threshold: u8,
  score: f64,
}

impl DecisionTree {
  pub fn fit<X: AsRef<[u8]>>(
    params: &DecisionTreeParams,
    features: &[X],
    labels: &[usize],
  ) -> Result<Self, FitError> {
    if features.is_empty() {
      return Err(FitError::Empty);
    }
    if features.len() != labels.len() {
      return Err(FitError::LabelCountMismatch {
        samples: features.len(),
        labels: labels.len(),
      });
    }
    let n_features = features[0].as_ref().len();
    if let Some((index, x)) = features
      .iter()
      .enumerate()
      .find(|(_, x)| x.as_ref().len() != n_features)
    {
      return Err(FitError::FeatureLengthMismatch {
        index,
        expected: n_features,
        found: x.as_ref().len(),
      });
    }
    let n_classes = labels.iter().copied().max().unwrap_or(0) + 1;

    let builder = Builder {
      params,
      features,
      labels,
      n_features,
      n_classes,
    };
    let nodes = builder.build();
    debug!(
      "决策树训练完成: {} 个节点, {} 个特征, {} 个类别",
      nodes.len(),
      n_features,
      n_classes
    );

    Ok(Self {
      nodes,
      n_features,
      n_classes,
    })
  }

  pub fn n_features(&self) -> usize {
    self.n_features
  }

  pub fn n_classes(&self) -> usize {
    self.n_classes
  }

  pub fn nodes(&self) -> &[Node] {
    &self.nodes
  }

  pub fn leaf_count(&self) -> usize {
    self
      .nodes
      .iter()
      .filter(|n| matches!(n, Node::Leaf { .. }))
      .count()
  }

  pub fn depth(&self) -> usize {
    let mut max_depth = 0;
    let mut stack = vec![(0usize, 0usize)];
    while let Some((slot, depth)) = stack.pop() {
      max_depth = max_depth.max(depth);
      if let Some(Node::Split { left, right, .. }) = self.nodes.get(slot) {
        stack.push((*left, depth + 1));
        stack.push((*right, depth + 1));
      }
    }
    max_depth
  }
}

impl Classifier for DecisionTree {
  fn predict(&self, input: &[u8]) -> usize {
    let mut slot = 0;
    loop {
      match self.nodes.get(slot) {
        Some(Node::Leaf { class }) => return *class,
        Some(Node::Split {
          feature,
          threshold,
          left,
          right,
        }) => {
          // 缺失的特征按 0 处理
          let value = input.get(*feature).copied().unwrap_or(0);
          slot = if value <= *threshold { *left } else { *right };
        }
        None => return 0,
      }
    }
  }
}

struct Builder<'a, X> {
  params: &'a DecisionTreeParams,
  features: &'a [X],
  labels: &'a [usize],
  n_features: usize,
  n_classes: usize,
}

impl<X: AsRef<[u8]>> Builder<'_, X> {
  // 显式栈，不限深度时也不会爆调用栈
  fn build(&self) -> Vec<Node> {
    let mut nodes = vec![Node::Leaf { class: 0 }];
    let mut stack = vec![Pending {
      slot: 0,
      depth: 0,
      indices: (0..self.labels.len()).collect(),
    }];
    let mut hist = vec![0u32; LEVELS * self.n_classes];

    while let Some(Pending {
      slot,
      depth,
      indices,
    }) = stack.pop()
    {
      let counts = self.class_counts(&indices);
      let majority = majority(&counts);
      let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
      let depth_reached = self.params.max_depth.is_some_and(|d| depth >= d);

      if pure || depth_reached || indices.len() < self.params.min_samples_split.max(2) {
        nodes[slot] = Node::Leaf { class: majority };
        continue;
      }

      let Some(split) = self.best_split(&indices, &counts, &mut hist) else {
        nodes[slot] = Node::Leaf { class: majority };
        continue;
      };

      let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .partition(|&&i| self.features[i].as_ref()[split.feature] <= split.threshold);

      let left = nodes.len();
      let right = left + 1;
      nodes.push(Node::Leaf { class: majority });
      nodes.push(Node::Leaf { class: majority });
      nodes[slot] = Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left,
        right,
      };

      stack.push(Pending {
        slot: right,
        depth: depth + 1,
        indices: right_indices,
      });
      stack.push(Pending {
        slot: left,
        depth: depth + 1,
        indices: left_indices,
      });
    }

    nodes
  }

  fn class_counts(&self, indices: &[usize]) -> Vec<u32> {
    let mut counts = vec![0u32; self.n_classes];
    for &i in indices {
      counts[self.labels[i]] += 1;
    }
    counts
  }

  /// 按特征、阈值从小到大遍历，取加权基尼最小者；相同时保留先找到的
  fn best_split(&self, indices: &[usize], totals: &[u32], hist: &mut [u32]) -> Option<Split> {
    let k = self.n_classes;
    let n = indices.len() as u32;
    let min_leaf = self.params.min_samples_leaf.max(1) as u32;
    let mut left = vec![0u32; k];
    let mut right = vec![0u32; k];
    let mut best: Option<Split> = None;

    for feature in 0..self.n_features {
      hist.fill(0);
      let (mut lo, mut hi) = (u8::MAX, u8::MIN);
      for &i in indices {
        let value = self.features[i].as_ref()[feature];
        hist[value as usize * k + self.labels[i]] += 1;
        lo = lo.min(value);
        hi = hi.max(value);
      }
      if lo == hi {
        continue;
      }

      left.fill(0);
      let mut left_n = 0u32;
      for value in lo..hi {
        let row = &hist[value as usize * k..(value as usize + 1) * k];
        let row_n: u32 = row.iter().sum();
        if row_n == 0 {
          continue;
        }
        for (l, r) in left.iter_mut().zip(row) {
          *l += r;
        }
        left_n += row_n;

        let right_n = n - left_n;
        if left_n < min_leaf || right_n < min_leaf {
          continue;
        }

        for ((r, t), l) in right.iter_mut().zip(totals).zip(&left) {
          *r = t - l;
        }
        let score = weighted_gini(&left, left_n) + weighted_gini(&right, right_n);
        if best.as_ref().is_none_or(|b| score < b.score - 1e-9) {
          best = Some(Split {
            feature,
            threshold: value,
            score,
          });
        }
      }
    }

    best
  }
}

fn majority(counts: &[u32]) -> usize {
  let mut best = 0;
  for (class, &count) in counts.iter().enumerate() {
    if count > counts[best] {
      best = class;
    }
  }
  best
}

// n * gini = n - Σc²/n
fn weighted_gini(counts: &[u32], n: u32) -> f64 {
  if n == 0 {
    return 0.0;
  }
  let n = n as f64;
  let sum_sq: f64 = counts.iter().map(|&c| (c as f64) * (c as f64)).sum();
  n - sum_sq / n
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn separates_on_single_informative_feature() {
    let features = vec![
      vec![0u8, 10],
      vec![0, 20],
      vec![0, 30],
      vec![0, 200],
      vec![0, 210],
      vec![0, 220],
    ];
    let labels = vec![0, 0, 0, 1, 1, 1];
    let tree = DecisionTree::fit(&DecisionTreeParams::default(), &features, &labels).unwrap();

    assert_eq!(tree.depth(), 1);
    assert_eq!(
      tree.nodes()[0],
      Node::Split {
        feature: 1,
        threshold: 30,
        left: 1,
        right: 2
      }
    );
    assert_eq!(tree.predict(&[0, 25]), 0);
    assert_eq!(tree.predict(&[0, 205]), 1);
  }

  #[test]
  fn fits_training_data_without_depth_limit() {
    // 异或需要两层
    let features = vec![vec![0u8, 0], vec![0, 255], vec![255, 0], vec![255, 255]];
    let labels = vec![0, 1, 1, 0];
    let tree = DecisionTree::fit(&DecisionTreeParams::default(), &features, &labels).unwrap();
    for (x, &y) in features.iter().zip(&labels) {
      assert_eq!(tree.predict(x), y);
    }
  }

  #[test]
  fn depth_limit_is_honored() {
    let features = vec![vec![0u8, 0], vec![0, 255], vec![255, 0], vec![255, 255]];
    let labels = vec![0, 1, 1, 0];
    let params = DecisionTreeParams {
      max_depth: Some(1),
      ..Default::default()
    };
    let tree = DecisionTree::fit(&params, &features, &labels).unwrap();
    assert!(tree.depth() <= 1);
  }

  #[test]
  fn pure_input_is_a_single_leaf() {
    let features = vec![vec![1u8, 2], vec![3, 4]];
    let tree = DecisionTree::fit(&DecisionTreeParams::default(), &features, &[2, 2]).unwrap();
    assert_eq!(tree.nodes(), &[Node::Leaf { class: 2 }]);
    assert_eq!(tree.n_classes(), 3);
  }

  #[test]
  fn identical_features_with_mixed_labels_become_majority_leaf() {
    let features = vec![vec![7u8; 3]; 3];
    let tree = DecisionTree::fit(&DecisionTreeParams::default(), &features, &[1, 0, 1]).unwrap();
    assert_eq!(tree.nodes(), &[Node::Leaf { class: 1 }]);
  }

  #[test]
  fn rejects_inconsistent_input() {
    let params = DecisionTreeParams::default();
    let empty: Vec<Vec<u8>> = Vec::new();
    assert_eq!(DecisionTree::fit(&params, &empty, &[]), Err(FitError::Empty));
    assert_eq!(
      DecisionTree::fit(&params, &[vec![1u8]], &[0, 1]),
      Err(FitError::LabelCountMismatch {
        samples: 1,
        labels: 2
      })
    );
    assert_eq!(
      DecisionTree::fit(&params, &[vec![1u8, 2], vec![3]], &[0, 1]),
      Err(FitError::FeatureLengthMismatch {
        index: 1,
        expected: 2,
        found: 1
      })
    );
  }

  #[test]
  fn serde_round_trip_keeps_predictions() {
    let features = vec![vec![10u8], vec![240]];
    let tree = DecisionTree::fit(&DecisionTreeParams::default(), &features, &[0, 1]).unwrap();
    let bytes = bincode::serialize(&tree).unwrap();
    let restored: DecisionTree = bincode::deserialize(&bytes).unwrap();
    assert_eq!(restored, tree);
  }
}
