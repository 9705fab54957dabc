// 该文件是 Shibie （识别） 项目的一部分。
// src/train.rs - 模型训练
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

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::features::{FeatureEncoder, FeatureVector};
use crate::model::{
  BundleError, Classifier, DecisionTree, DecisionTreeParams, DuplicateClass, FitError, LabelMap,
  ModelBundle, ModelRepository,
};
use crate::store::{SampleStore, StoreError};

#[derive(Error, Debug)]
pub enum TrainingError {
  #[error("没有训练数据，请先为所选类别采集样本")]
  NoData,
  #[error("有数据的类别少于两个（当前 {0} 个），无法训练")]
  InsufficientClasses(usize),
  #[error("样本少于两个（当前 {0} 个），无法划分训练集和验证集")]
  InsufficientSamples(usize),
  #[error(transparent)]
  DuplicateClass(#[from] DuplicateClass),
  #[error("样本读取错误: {0}")]
  StoreError(#[from] StoreError),
  #[error("决策树训练错误: {0}")]
  FitError(#[from] FitError),
  #[error("模型保存错误: {0}")]
  BundleError(#[from] BundleError),
}

/// 收集到的训练数据
#[derive(Debug, Default)]
pub struct Dataset {
  pub features: Vec<FeatureVector>,
  pub labels: Vec<usize>,
}

impl Dataset {
  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn distinct_labels(&self) -> usize {
    self.labels.iter().collect::<BTreeSet<_>>().len()
  }
}

/// 训练集与验证集的下标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
  pub train: Vec<usize>,
  pub held_out: Vec<usize>,
}

/// 固定种子打乱后切分，验证集大小为 `ceil(n * fraction)`
///
/// 验证集与训练集都至少有一个样本。
pub fn split_indices(n: usize, held_out_fraction: f64, seed: u64) -> Split {
  let mut indices: Vec<usize> = (0..n).collect();
  let mut rng = StdRng::seed_from_u64(seed);
  indices.shuffle(&mut rng);

  let held_out_n = match n {
    0 | 1 => n,
    _ => (((n as f64) * held_out_fraction).ceil() as usize).clamp(1, n - 1),
  };
  let train = indices.split_off(held_out_n);
  Split {
    train,
    held_out: indices,
  }
}

/// 正确预测的比例，空集合时为 0
pub fn accuracy<C: Classifier>(classifier: &C, dataset: &Dataset, indices: &[usize]) -> f64 {
  if indices.is_empty() {
    return 0.0;
  }
  let correct = indices
    .iter()
    .filter(|&&i| classifier.predict(dataset.features[i].as_ref()) == dataset.labels[i])
    .count();
  correct as f64 / indices.len() as f64
}

pub struct Trainer<'a> {
  store: &'a SampleStore,
  repository: &'a ModelRepository,
  encoder: FeatureEncoder,
  params: DecisionTreeParams,
  held_out_fraction: f64,
  seed: u64,
  label_map_path: PathBuf,
}

impl<'a> Trainer<'a> {
  pub fn new(
    config: &PipelineConfig,
    store: &'a SampleStore,
    repository: &'a ModelRepository,
  ) -> Self {
    Self {
      store,
      repository,
      encoder: FeatureEncoder::new(config.model_size),
      params: DecisionTreeParams::default(),
      held_out_fraction: config.held_out_fraction,
      seed: config.split_seed,
      label_map_path: config.label_map_path(),
    }
  }

  pub fn with_params(mut self, params: DecisionTreeParams) -> Self {
    self.params = params;
    self
  }

  /// 读取所有类别的样本；目录不存在的类别跳过
  pub fn collect(&self, label_map: &LabelMap) -> Result<Dataset, TrainingError> {
    let mut dataset = Dataset::default();
    for (class, index) in label_map.iter() {
      let samples = match self.store.list_samples(class) {
        Ok(samples) => samples,
        Err(StoreError::MissingClass(_)) => {
          warn!("类别 '{}' 的目录不存在，跳过", class);
          continue;
        }
        Err(e) => return Err(e.into()),
      };

      let before = dataset.len();
      for sample in samples {
        dataset.features.push(self.encoder.encode_gray(&sample.image));
        dataset.labels.push(index);
      }
      info!("类别 '{}': {} 个样本", class, dataset.len() - before);
    }
    Ok(dataset)
  }

  pub fn train<S: AsRef<str>>(&self, classes: &[S]) -> Result<ModelBundle, TrainingError> {
    info!("开始训练模型...");
    let label_map = LabelMap::from_classes(classes)?;
    let dataset = self.collect(&label_map)?;

    if dataset.is_empty() {
      return Err(TrainingError::NoData);
    }
    let distinct = dataset.distinct_labels();
    if distinct < 2 {
      return Err(TrainingError::InsufficientClasses(distinct));
    }
    if dataset.len() < 2 {
      return Err(TrainingError::InsufficientSamples(dataset.len()));
    }

    let split = split_indices(dataset.len(), self.held_out_fraction, self.seed);
    let train_x: Vec<&FeatureVector> = split.train.iter().map(|&i| &dataset.features[i]).collect();
    let train_y: Vec<usize> = split.train.iter().map(|&i| dataset.labels[i]).collect();

    let classifier = DecisionTree::fit(&self.params, &train_x, &train_y)?;
    let accuracy = accuracy(&classifier, &dataset, &split.held_out);
    info!(
      "训练完成: 训练集 {}, 验证集 {}, 树深 {}, 叶子 {}, 准确率 {:.2}",
      split.train.len(),
      split.held_out.len(),
      classifier.depth(),
      classifier.leaf_count(),
      accuracy
    );

    let bundle = ModelBundle {
      classifier,
      accuracy,
      label_map,
      classes: classes.iter().map(|c| c.as_ref().to_string()).collect(),
      created_at: Utc::now().timestamp(),
    };

    self
      .repository
      .save_label_map(&self.label_map_path, &bundle.label_map)?;
    self.repository.save(&bundle)?;

    Ok(bundle)
  }
}
