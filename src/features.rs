// 该文件是 Shibie （识别） 项目的一部分。
// src/features.rs - 特征编码
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

//! 灰度化、缩放、展平。
//!
//! 采集、训练与推理都必须经过同一个 [`FeatureEncoder`]，否则准确率会悄无声息地下降。

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::config::MODEL_SIZE;

const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// 展平后的灰度像素
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureVector {
  data: Box<[u8]>,
}

impl FeatureVector {
  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

impl AsRef<[u8]> for FeatureVector {
  fn as_ref(&self) -> &[u8] {
    &self.data
  }
}

impl From<Vec<u8>> for FeatureVector {
  fn from(data: Vec<u8>) -> Self {
    Self {
      data: data.into_boxed_slice(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureEncoder {
  size: u32,
}

impl Default for FeatureEncoder {
  fn default() -> Self {
    Self::new(MODEL_SIZE)
  }
}

impl FeatureEncoder {
  pub fn new(size: u32) -> Self {
    Self { size }
  }

  pub fn size(&self) -> u32 {
    self.size
  }

  /// 特征向量长度
  pub fn feature_len(&self) -> usize {
    (self.size as usize) * (self.size as usize)
  }

  /// 彩色帧 -> 模型分辨率的灰度图
  pub fn to_model_view(&self, image: &RgbImage) -> GrayImage {
    self.normalize_gray(imageops::grayscale(image))
  }

  /// 把任意尺寸的灰度图缩放到模型分辨率，尺寸已经正确时原样返回
  pub fn normalize_gray(&self, gray: GrayImage) -> GrayImage {
    if gray.dimensions() == (self.size, self.size) {
      gray
    } else {
      imageops::resize(&gray, self.size, self.size, RESIZE_FILTER)
    }
  }

  pub fn encode(&self, image: &RgbImage) -> FeatureVector {
    FeatureVector::from(self.to_model_view(image).into_raw())
  }

  pub fn encode_gray(&self, gray: &GrayImage) -> FeatureVector {
    FeatureVector::from(self.normalize_gray(gray.clone()).into_raw())
  }
}
