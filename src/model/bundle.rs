// 该文件是 Shibie （识别） 项目的一部分。
// src/model/bundle.rs - 模型包的保存与选择
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

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::{LabelMap, ModelBundle};

pub const BUNDLE_PREFIX: &str = "model_";
pub const BUNDLE_EXTENSION: &str = "bin";

#[derive(Error, Debug)]
pub enum BundleError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("模型包编解码错误: {0}")]
  CodecError(#[from] bincode::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 模型包文件的元数据，不需要反序列化文件本身
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfo {
  pub path: PathBuf,
  /// 文件名中的 Unix 秒
  pub created_at: i64,
}

/// 从 `model_<secs>.bin` 中取出时间戳
pub fn parse_bundle_name(name: &str) -> Option<i64> {
  name
    .strip_prefix(BUNDLE_PREFIX)?
    .strip_suffix(BUNDLE_EXTENSION)?
    .strip_suffix('.')?
    .parse()
    .ok()
}

/// 按创建时间降序排列后取第一个
pub fn select_latest(bundles: &[BundleInfo]) -> Option<&BundleInfo> {
  let mut sorted: Vec<&BundleInfo> = bundles.iter().collect();
  sorted.sort_by(|a, b| {
    b.created_at
      .cmp(&a.created_at)
      .then_with(|| b.path.cmp(&a.path))
  });
  sorted.first().copied()
}

/// 模型列表中的一项
#[derive(Debug, Clone)]
pub struct BundleSummary {
  pub info: BundleInfo,
  /// 无法读取的模型包为 `None`
  pub accuracy: Option<f64>,
  pub classes: Vec<String>,
  /// 是否是识别时会被选中的那一个
  pub active: bool,
}

/// 模型目录：`model_<secs>.bin` 与 `labels.json`
#[derive(Debug, Clone)]
pub struct ModelRepository {
  dir: PathBuf,
}

impl ModelRepository {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn path_for(&self, created_at: i64) -> PathBuf {
    self
      .dir
      .join(format!("{}{}.{}", BUNDLE_PREFIX, created_at, BUNDLE_EXTENSION))
  }

  /// 目录不存在时返回空列表
  pub fn list(&self) -> Result<Vec<BundleInfo>, BundleError> {
    if !self.dir.is_dir() {
      return Ok(Vec::new());
    }

    let mut bundles = Vec::new();
    for entry in std::fs::read_dir(&self.dir)? {
      let entry = entry?;
      if !entry.file_type()?.is_file() {
        continue;
      }
      let name = entry.file_name();
      if let Some(created_at) = name.to_str().and_then(parse_bundle_name) {
        bundles.push(BundleInfo {
          path: entry.path(),
          created_at,
        });
      }
    }
    bundles.sort_by_key(|b| b.created_at);
    Ok(bundles)
  }

  pub fn latest(&self) -> Result<Option<BundleInfo>, BundleError> {
    Ok(select_latest(&self.list()?).cloned())
  }

  /// 先写临时文件再改名，读者不会看到写了一半的模型包
  pub fn save(&self, bundle: &ModelBundle) -> Result<PathBuf, BundleError> {
    std::fs::create_dir_all(&self.dir)?;
    let path = self.path_for(bundle.created_at);
    let tmp = path.with_extension("tmp");
    {
      let mut writer = BufWriter::new(File::create(&tmp)?);
      bincode::serialize_into(&mut writer, bundle)?;
      writer.flush()?;
    }
    std::fs::rename(&tmp, &path)?;
    info!("模型包已保存: {}", path.display());
    Ok(path)
  }

  pub fn load(&self, path: &Path) -> Result<ModelBundle, BundleError> {
    let reader = BufReader::new(File::open(path)?);
    let bundle = bincode::deserialize_from(reader)?;
    debug!("模型包已加载: {}", path.display());
    Ok(bundle)
  }

  /// 逐个加载模型包，读取失败的只记录警告
  pub fn describe(&self) -> Result<Vec<BundleSummary>, BundleError> {
    let bundles = self.list()?;
    let active = select_latest(&bundles).map(|b| b.path.clone());

    Ok(
      bundles
        .into_iter()
        .map(|info| {
          let (accuracy, classes) = match self.load(&info.path) {
            Ok(bundle) => (Some(bundle.accuracy), bundle.classes),
            Err(e) => {
              warn!("无法读取模型包 {}: {}", info.path.display(), e);
              (None, Vec::new())
            }
          };
          BundleSummary {
            active: active.as_ref() == Some(&info.path),
            info,
            accuracy,
            classes,
          }
        })
        .collect(),
    )
  }

  pub fn save_label_map(&self, path: &Path, label_map: &LabelMap) -> Result<(), BundleError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, label_map.to_json_pretty()?)?;
    info!("标签表已保存: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DecisionTree, DecisionTreeParams};

  fn info(secs: i64) -> BundleInfo {
    BundleInfo {
      path: PathBuf::from(format!("model_{secs}.bin")),
      created_at: secs,
    }
  }

  #[test]
  fn parses_bundle_names() {
    assert_eq!(parse_bundle_name("model_1700000000.bin"), Some(1_700_000_000));
    assert_eq!(parse_bundle_name("model_12.pkl"), None);
    assert_eq!(parse_bundle_name("labels.json"), None);
    assert_eq!(parse_bundle_name("model_abc.bin"), None);
    assert_eq!(parse_bundle_name("model_12bin"), None);
  }

  #[test]
  fn latest_is_highest_timestamp_regardless_of_order() {
    let bundles = vec![info(100), info(200), info(50)];
    assert_eq!(select_latest(&bundles), Some(&info(200)));
    assert_eq!(select_latest(&[]), None);
  }

  #[test]
  fn repository_lists_only_bundle_files() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["model_100.bin", "model_200.bin", "model_50.bin", "labels.json", "model_x.bin"] {
      std::fs::write(dir.path().join(name), b"").unwrap();
    }
    let repo = ModelRepository::new(dir.path());

    let listed: Vec<i64> = repo.list().unwrap().iter().map(|b| b.created_at).collect();
    assert_eq!(listed, vec![50, 100, 200]);
    assert_eq!(
      repo.latest().unwrap().unwrap().path,
      dir.path().join("model_200.bin")
    );
  }

  #[test]
  fn saved_bundle_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let repo = ModelRepository::new(dir.path().join("models"));
    let classifier =
      DecisionTree::fit(&DecisionTreeParams::default(), &[vec![0u8], vec![255]], &[0, 1]).unwrap();
    let bundle = ModelBundle {
      classifier,
      accuracy: 0.5,
      label_map: LabelMap::from_classes(&["a", "b"]).unwrap(),
      classes: vec!["a".into(), "b".into()],
      created_at: 42,
    };

    let path = repo.save(&bundle).unwrap();
    assert_eq!(path, repo.path_for(42));
    let loaded = repo.load(&path).unwrap();
    assert_eq!(loaded.classifier, bundle.classifier);
    assert_eq!(loaded.label_map, bundle.label_map);
    assert_eq!(loaded.classes, bundle.classes);
    assert_eq!(loaded.accuracy, 0.5);
  }

  #[test]
  fn corrupt_bundle_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let repo = ModelRepository::new(dir.path());
    let path = repo.path_for(1);
    std::fs::write(&path, b"\x01\x02").unwrap();
    assert!(repo.load(&path).is_err());
  }

  #[test]
  fn describe_marks_the_newest_bundle_active() {
    let dir = tempfile::tempdir().unwrap();
    let repo = ModelRepository::new(dir.path());
    let classifier =
      DecisionTree::fit(&DecisionTreeParams::default(), &[vec![0u8], vec![255]], &[0, 1]).unwrap();
    for created_at in [100, 200] {
      repo
        .save(&ModelBundle {
          classifier: classifier.clone(),
          accuracy: 1.0,
          label_map: LabelMap::from_classes(&["a", "b"]).unwrap(),
          classes: vec!["a".into(), "b".into()],
          created_at,
        })
        .unwrap();
    }
    std::fs::write(repo.path_for(50), b"broken").unwrap();

    let summaries = repo.describe().unwrap();
    assert_eq!(summaries.len(), 3);
    assert_eq!(summaries[0].accuracy, None);
    assert!(!summaries[1].active);
    assert!(summaries[2].active);
    assert_eq!(summaries[2].classes, vec!["a", "b"]);
  }
}
