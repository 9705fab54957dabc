// 该文件是 Shibie （识别） 项目的一部分。
// src/model.rs - 模型
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

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod bundle;
mod tree;

pub use self::bundle::{
  BUNDLE_EXTENSION, BUNDLE_PREFIX, BundleError, BundleInfo, BundleSummary, ModelRepository,
  parse_bundle_name, select_latest,
};
pub use self::tree::{DecisionTree, DecisionTreeParams, FitError, Node};

/// 分类器：输入展平后的像素，输出标签索引
pub trait Classifier {
  fn predict(&self, input: &[u8]) -> usize;
}

impl<C: Classifier + ?Sized> Classifier for &C {
  fn predict(&self, input: &[u8]) -> usize {
    (**self).predict(input)
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("重复的类别: {0}")]
pub struct DuplicateClass(pub String);

/// 类别名称与稠密索引之间的双向映射
///
/// 索引按照传入顺序从 0 开始分配，只在同一个模型包内有效。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMap {
  names: Vec<String>,
}

impl LabelMap {
  pub fn from_classes<S: AsRef<str>>(classes: &[S]) -> Result<Self, DuplicateClass> {
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(classes.len());
    for class in classes {
      let class = class.as_ref();
      if !seen.insert(class) {
        return Err(DuplicateClass(class.to_string()));
      }
      names.push(class.to_string());
    }
    Ok(Self { names })
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn index_of(&self, name: &str) -> Option<usize> {
    self.names.iter().position(|n| n == name)
  }

  pub fn name_of(&self, index: usize) -> Option<&str> {
    self.names.get(index).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
    self.names.iter().enumerate().map(|(i, n)| (n.as_str(), i))
  }

  pub fn to_map(&self) -> BTreeMap<String, usize> {
    self.iter().map(|(n, i)| (n.to_string(), i)).collect()
  }

  /// 供人查看的 JSON 文本，形如 `{"book": 0, "cube": 1}`
  pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&self.to_map())
  }
}

/// 一次训练的产物
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
  pub classifier: DecisionTree,
  /// 验证集准确率，0..=1
  pub accuracy: f64,
  pub label_map: LabelMap,
  /// 训练时传入的类别列表（原样保存）
  pub classes: Vec<String>,
  /// 创建时间（Unix 秒）
  pub created_at: i64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn label_map_follows_input_order() {
    let map = LabelMap::from_classes(&["cube", "book", "phone"]).unwrap();
    assert_eq!(map.index_of("cube"), Some(0));
    assert_eq!(map.index_of("book"), Some(1));
    assert_eq!(map.name_of(2), Some("phone"));
    assert_eq!(map.name_of(3), None);
  }

  #[test]
  fn label_map_rejects_duplicates() {
    assert_eq!(
      LabelMap::from_classes(&["a", "b", "a"]),
      Err(DuplicateClass("a".to_string()))
    );
  }

  #[test]
  fn label_map_json_is_name_to_index() {
    let map = LabelMap::from_classes(&["b", "a"]).unwrap();
    let value: serde_json::Value = serde_json::from_str(&map.to_json_pretty().unwrap()).unwrap();
    assert_eq!(value, serde_json::json!({ "b": 0, "a": 1 }));
  }
}
