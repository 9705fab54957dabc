// 该文件是 Shibie （识别） 项目的一部分。
// src/detect.rs - 边缘与轮廓辅助框
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

//! 辅助框只用于显示，不参与分类。

use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use imageproc::edges::canny;
use imageproc::point::Point;

use crate::config::PipelineConfig;

/// 轴对齐矩形，像素坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

impl BoundingBox {
  pub fn area(&self) -> u32 {
    self.width * self.height
  }

  /// 包住所有点的最小矩形，宽高包含两端像素
  pub fn enclosing(points: &[Point<u32>]) -> Option<Self> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
      min_x = min_x.min(p.x);
      min_y = min_y.min(p.y);
      max_x = max_x.max(p.x);
      max_y = max_y.max(p.y);
    }
    Some(Self {
      x: min_x,
      y: min_y,
      width: max_x - min_x + 1,
      height: max_y - min_y + 1,
    })
  }
}

/// 只保留面积严格大于 `min_area` 的框
pub fn filter_boxes(
  boxes: impl IntoIterator<Item = BoundingBox>,
  min_area: u32,
) -> Vec<BoundingBox> {
  boxes.into_iter().filter(|b| b.area() > min_area).collect()
}

#[derive(Debug, Clone, Copy)]
pub struct BoxDetector {
  canny_low: f32,
  canny_high: f32,
  min_area: u32,
}

impl BoxDetector {
  pub fn new(canny_low: f32, canny_high: f32, min_area: u32) -> Self {
    Self {
      canny_low,
      canny_high,
      min_area,
    }
  }

  pub fn from_config(config: &PipelineConfig) -> Self {
    Self::new(config.canny_low, config.canny_high, config.min_box_area)
  }

  pub fn edges(&self, gray: &GrayImage) -> GrayImage {
    canny(gray, self.canny_low, self.canny_high)
  }

  /// Canny 边缘 -> 最外层轮廓 -> 外接矩形 -> 面积过滤
  pub fn detect(&self, gray: &GrayImage) -> Vec<BoundingBox> {
    let edges = self.edges(gray);
    let outer = find_contours::<u32>(&edges)
      .into_iter()
      .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
      .filter_map(|c| BoundingBox::enclosing(&c.points));
    filter_boxes(outer, self.min_area)
  }
}

impl Default for BoxDetector {
  fn default() -> Self {
    Self::from_config(&PipelineConfig::default())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Luma;
  use imageproc::drawing::draw_filled_rect_mut;
  use imageproc::rect::Rect;

  fn sized(width: u32, height: u32) -> BoundingBox {
    BoundingBox {
      x: 0,
      y: 0,
      width,
      height,
    }
  }

  #[test]
  fn area_threshold_is_exclusive() {
    let kept = filter_boxes([sized(20, 25), sized(21, 25), sized(1, 1), sized(100, 6)], 500);
    assert_eq!(kept, vec![sized(21, 25), sized(100, 6)]);
  }

  #[test]
  fn enclosing_box_includes_both_ends() {
    let points = [Point::new(3, 4), Point::new(10, 4), Point::new(5, 9)];
    assert_eq!(
      BoundingBox::enclosing(&points),
      Some(BoundingBox {
        x: 3,
        y: 4,
        width: 8,
        height: 6
      })
    );
    assert_eq!(BoundingBox::enclosing(&[]), None);
  }

  #[test]
  fn large_shape_is_boxed_and_small_one_dropped() {
    let mut gray = GrayImage::from_pixel(200, 200, Luma([0]));
    draw_filled_rect_mut(&mut gray, Rect::at(40, 40).of_size(60, 60), Luma([255]));
    draw_filled_rect_mut(&mut gray, Rect::at(150, 150).of_size(8, 8), Luma([255]));

    let boxes = BoxDetector::default().detect(&gray);
    assert!(!boxes.is_empty());
    assert!(boxes.iter().all(|b| b.area() > 500));
    assert!(boxes.iter().any(|b| b.x <= 45 && b.y <= 45 && b.width >= 50));
    assert!(boxes.iter().all(|b| b.x < 140));
  }

  #[test]
  fn blank_frame_has_no_boxes() {
    let gray = GrayImage::from_pixel(64, 64, Luma([128]));
    assert!(BoxDetector::default().detect(&gray).is_empty());
  }
}
