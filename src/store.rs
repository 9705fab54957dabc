// 该文件是 Shibie （识别） 项目的一部分。
// src/store.rs - 样本存储
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

//! 磁盘布局：`<data-root>/<class-name>/<timestamp-ms>.jpg`

use std::fs::ReadDir;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use image::GrayImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::features::FeatureEncoder;

const SAMPLE_EXTENSION: &str = "jpg";

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("非法的类别名称: {0:?}")]
  InvalidClassName(String),
  #[error("类别目录不存在: {0}")]
  MissingClass(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 一张已保存的样本
#[derive(Debug, Clone)]
pub struct Sample {
  pub label: String,
  pub path: PathBuf,
  pub image: GrayImage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassStats {
  pub label: String,
  pub samples: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
  pub imported: usize,
  pub skipped: usize,
}

pub struct SampleStore {
  root: PathBuf,
  last_stamp: AtomicI64,
}

impl SampleStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      last_stamp: AtomicI64::new(0),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// 类别对应的目录；名称为空、以 `.` 开头或带路径分隔符时拒绝
  pub fn class_dir(&self, label: &str) -> Result<PathBuf, StoreError> {
    let invalid = label.trim().is_empty()
      || label.starts_with('.')
      || label.contains(['/', '\\'])
      || label.contains('\0');
    if invalid {
      return Err(StoreError::InvalidClassName(label.to_string()));
    }
    Ok(self.root.join(label))
  }

  pub fn ensure_class_directory(&self, label: &str) -> Result<PathBuf, StoreError> {
    let dir = self.class_dir(label)?;
    std::fs::create_dir_all(&dir)?;
    debug!("类别目录已就绪: {}", dir.display());
    Ok(dir)
  }

  /// 保存一张样本，文件名为毫秒时间戳
  pub fn write_sample(&self, label: &str, image: &GrayImage) -> Result<PathBuf, StoreError> {
    let dir = self.ensure_class_directory(label)?;
    let path = dir.join(format!("{}.{}", self.next_stamp(), SAMPLE_EXTENSION));
    image.save(&path)?;
    debug!("保存样本: {}", path.display());
    Ok(path)
  }

  // 同一进程内保证严格递增
  fn next_stamp(&self) -> i64 {
    let now = Utc::now().timestamp_millis();
    let previous = self
      .last_stamp
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        Some(now.max(last + 1))
      })
      .unwrap_or_else(|last| last);
    now.max(previous + 1)
  }

  /// 惰性遍历某个类别下所有可解码的样本，顺序不定
  pub fn list_samples(&self, label: &str) -> Result<Samples, StoreError> {
    let dir = self.class_dir(label)?;
    if !dir.is_dir() {
      return Err(StoreError::MissingClass(label.to_string()));
    }
    Ok(Samples {
      label: label.to_string(),
      entries: std::fs::read_dir(dir)?,
    })
  }

  /// 数据根目录下所有非隐藏子目录的名字，已排序
  pub fn list_known_classes(&self) -> Result<Vec<String>, StoreError> {
    if !self.root.is_dir() {
      return Ok(Vec::new());
    }

    let mut classes = Vec::new();
    for entry in std::fs::read_dir(&self.root)? {
      let entry = entry?;
      if !entry.file_type()?.is_dir() {
        continue;
      }
      let Some(name) = entry.file_name().to_str().map(str::to_string) else {
        warn!("跳过非 UTF-8 目录名: {:?}", entry.file_name());
        continue;
      };
      if !name.starts_with('.') {
        classes.push(name);
      }
    }
    classes.sort();
    classes.dedup();
    Ok(classes)
  }

  /// 类别目录下的文件数（不解码）
  pub fn count_samples(&self, label: &str) -> Result<usize, StoreError> {
    let dir = self.class_dir(label)?;
    if !dir.is_dir() {
      return Ok(0);
    }
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
      if entry?.file_type()?.is_file() {
        count += 1;
      }
    }
    Ok(count)
  }

  pub fn class_stats(&self) -> Result<Vec<ClassStats>, StoreError> {
    self
      .list_known_classes()?
      .into_iter()
      .map(|label| {
        let samples = self.count_samples(&label)?;
        Ok(ClassStats { label, samples })
      })
      .collect()
  }

  /// 把一个目录里的图片导入为某个类别的样本
  pub fn import_dir(
    &self,
    label: &str,
    source: &Path,
    encoder: &FeatureEncoder,
  ) -> Result<ImportReport, StoreError> {
    self.ensure_class_directory(label)?;

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(source)? {
      let entry = entry?;
      if entry.file_type()?.is_file() {
        paths.push(entry.path());
      }
    }
    paths.sort();

    let mut report = ImportReport::default();
    for path in paths {
      match image::open(&path) {
        Ok(image) => {
          let gray = encoder.normalize_gray(image.to_luma8());
          self.write_sample(label, &gray)?;
          report.imported += 1;
        }
        Err(e) => {
          warn!("无法解码图片 {}: {}", path.display(), e);
          report.skipped += 1;
        }
      }
    }

    info!(
      "导入完成: 类别 {}, 成功 {}, 跳过 {}",
      label, report.imported, report.skipped
    );
    Ok(report)
  }
}

/// [`SampleStore::list_samples`] 返回的迭代器
pub struct Samples {
  label: String,
  entries: ReadDir,
}

impl Iterator for Samples {
  type Item = Sample;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let entry = match self.entries.next()? {
        Ok(entry) => entry,
        Err(e) => {
          warn!("读取目录项失败: {}", e);
          continue;
        }
      };

      let path = entry.path();
      if !path.is_file() {
        continue;
      }

      match image::open(&path) {
        Ok(image) => {
          return Some(Sample {
            label: self.label.clone(),
            path,
            image: image.to_luma8(),
          });
        }
        Err(e) => {
          warn!("跳过无法解码的样本 {}: {}", path.display(), e);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Luma;

  fn gray(value: u8) -> GrayImage {
    GrayImage::from_pixel(8, 8, Luma([value]))
  }

  #[test]
  fn ensure_class_directory_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = SampleStore::new(dir.path());
    let first = store.ensure_class_directory("book").unwrap();
    let second = store.ensure_class_directory("book").unwrap();
    assert_eq!(first, second);
    assert!(first.is_dir());
  }

  #[test]
  fn rejects_unsafe_class_names() {
    let store = SampleStore::new("unused");
    for name in ["", "  ", ".hidden", "a/b", "..", "a\\b"] {
      assert!(matches!(
        store.class_dir(name),
        Err(StoreError::InvalidClassName(_))
      ));
    }
  }

  #[test]
  fn written_samples_get_distinct_increasing_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = SampleStore::new(dir.path());

    let stamps: Vec<i64> = (0..5)
      .map(|_| {
        let path = store.write_sample("cube", &gray(10)).unwrap();
        path.file_stem().unwrap().to_str().unwrap().parse().unwrap()
      })
      .collect();

    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(store.count_samples("cube").unwrap(), 5);
  }

  #[test]
  fn listing_skips_undecodable_entries() {
    let dir = tempfile::tempdir().unwrap();
    let store = SampleStore::new(dir.path());
    store.write_sample("cube", &gray(10)).unwrap();
    store.write_sample("cube", &gray(20)).unwrap();
    std::fs::write(dir.path().join("cube").join("broken.jpg"), b"not an image").unwrap();

    let samples: Vec<Sample> = store.list_samples("cube").unwrap().collect();
    assert_eq!(samples.len(), 2);
    assert!(samples.iter().all(|s| s.label == "cube"));
    assert!(samples.iter().all(|s| s.image.dimensions() == (8, 8)));
  }

  #[test]
  fn listing_missing_class_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = SampleStore::new(dir.path());
    assert!(matches!(
      store.list_samples("nothing"),
      Err(StoreError::MissingClass(_))
    ));
  }

  #[test]
  fn known_classes_are_sorted_and_skip_hidden_dirs_and_files() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["phone", "book", ".git", "cube"] {
      std::fs::create_dir_all(dir.path().join(name)).unwrap();
    }
    std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

    let store = SampleStore::new(dir.path());
    assert_eq!(
      store.list_known_classes().unwrap(),
      vec!["book".to_string(), "cube".to_string(), "phone".to_string()]
    );
  }

  #[test]
  fn known_classes_of_missing_root_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = SampleStore::new(dir.path().join("absent"));
    assert!(store.list_known_classes().unwrap().is_empty());
  }

  #[test]
  fn import_normalizes_and_counts_skips() {
    let source = tempfile::tempdir().unwrap();
    image::RgbImage::from_pixel(300, 200, image::Rgb([1, 2, 3]))
      .save(source.path().join("a.png"))
      .unwrap();
    std::fs::write(source.path().join("b.png"), b"garbage").unwrap();

    let data = tempfile::tempdir().unwrap();
    let store = SampleStore::new(data.path());
    let encoder = FeatureEncoder::new(32);
    let report = store.import_dir("phone", source.path(), &encoder).unwrap();

    assert_eq!(report, ImportReport { imported: 1, skipped: 1 });
    let samples: Vec<Sample> = store.list_samples("phone").unwrap().collect();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].image.dimensions(), (32, 32));
  }
}
