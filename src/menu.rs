// 该文件是 Shibie （识别） 项目的一部分。
// src/menu.rs - 交互式菜单
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
use std::io::{self, BufRead, Write};

use tracing::info;

use crate::{pipeline::Pipeline, store::StoreError};

pub const DEFAULT_CLASSES: [&str; 2] = ["book", "cube"];

const RULE: &str = "========================================";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
  Record(String),
  Train,
  Recognize,
  Stats,
  Models,
  Exit,
}

/// 逗号分隔，去掉空白与重复，保持输入顺序
pub fn parse_class_list(line: &str) -> Vec<String> {
  let mut classes: Vec<String> = Vec::new();
  for class in line.split(',').map(str::trim).filter(|c| !c.is_empty()) {
    if !classes.iter().any(|c| c == class) {
      classes.push(class.to_string());
    }
  }
  classes
}

/// 控制台菜单，读写端可替换以便测试
pub struct Console<R, W> {
  reader: R,
  writer: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
  pub fn new(reader: R, writer: W) -> Self {
    Self { reader, writer }
  }

  pub fn into_inner(self) -> (R, W) {
    (self.reader, self.writer)
  }

  /// 读一行，输入结束时返回 `None`
  fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
    write!(self.writer, "{}", prompt)?;
    self.writer.flush()?;
    let mut line = String::new();
    if self.reader.read_line(&mut line)? == 0 {
      return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
  }

  pub fn show_status(&mut self, status: &str) -> io::Result<()> {
    writeln!(self.writer, "{}", status)
  }

  /// 选择本次使用的类别，可能返回空列表
  pub fn prompt_for_classes(&mut self, existing: &[String]) -> io::Result<Vec<String>> {
    writeln!(self.writer, "\n{}\n{:^36}\n{}", RULE, "类别设置", RULE)?;

    if existing.is_empty() {
      writeln!(self.writer, "没有发现已有的类别。")?;
      writeln!(
        self.writer,
        "请输入要识别的物体类别，用逗号分隔（例如：book,cube,phone）。"
      )?;
      writeln!(self.writer, "直接回车使用默认的 {}。", DEFAULT_CLASSES.join(","))?;
      let line = self.read_line("类别: ")?.unwrap_or_default();
      let classes = parse_class_list(&line);
      return Ok(if line.is_empty() {
        DEFAULT_CLASSES.iter().map(|c| c.to_string()).collect()
      } else {
        classes
      });
    }

    writeln!(self.writer, "发现已有类别: {}", existing.join(", "))?;
    writeln!(self.writer, "1. 只使用已有类别")?;
    writeln!(self.writer, "2. 使用已有类别并添加新类别")?;
    writeln!(self.writer, "3. 重新输入全部类别（忽略已有类别）")?;

    let classes = match self.read_line("请选择 (1/2/3): ")?.as_deref() {
      Some("1") => existing.to_vec(),
      Some("2") => {
        let line = self.read_line("新类别（逗号分隔）: ")?.unwrap_or_default();
        let added = parse_class_list(&line);
        let merged: BTreeSet<String> = existing.iter().cloned().chain(added).collect();
        merged.into_iter().collect()
      }
      Some("3") => {
        let line = self.read_line("全部类别（逗号分隔）: ")?.unwrap_or_default();
        parse_class_list(&line)
      }
      _ => {
        writeln!(self.writer, "无效选择，使用已有类别。")?;
        existing.to_vec()
      }
    };
    Ok(classes)
  }

  /// 显示菜单直到得到有效选择，输入结束视为退出
  pub fn prompt_for_menu_choice(&mut self, classes: &[String]) -> io::Result<MenuAction> {
    let mut actions: Vec<(String, MenuAction)> = classes
      .iter()
      .map(|c| (format!("采集 '{}' 的样本", c), MenuAction::Record(c.clone())))
      .collect();
    actions.push(("训练模型".to_string(), MenuAction::Train));
    actions.push(("实时识别".to_string(), MenuAction::Recognize));
    actions.push(("样本统计".to_string(), MenuAction::Stats));
    actions.push(("模型列表".to_string(), MenuAction::Models));
    actions.push(("退出".to_string(), MenuAction::Exit));

    loop {
      writeln!(self.writer, "\n{}\n{:^36}\n{}", RULE, "物体识别菜单", RULE)?;
      for (i, (text, _)) in actions.iter().enumerate() {
        writeln!(self.writer, "{}. {}", i + 1, text)?;
      }
      writeln!(self.writer, "{}", RULE)?;

      let Some(line) = self.read_line("请选择: ")? else {
        return Ok(MenuAction::Exit);
      };
      let chosen = line
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| actions.get(i));
      match chosen {
        Some((_, action)) => return Ok(action.clone()),
        None => writeln!(self.writer, "无效输入: {:?}", line)?,
      }
    }
  }

  /// 完整的交互流程：设置类别，然后循环执行菜单操作
  pub fn run(&mut self, pipeline: &Pipeline) -> io::Result<()> {
    let classes = loop {
      let existing = match pipeline.known_classes() {
        Ok(classes) => classes,
        Err(e) => {
          self.show_status(&format!("读取已有类别失败：{}", e))?;
          Vec::new()
        }
      };

      let classes = self.prompt_for_classes(&existing)?;
      if classes.is_empty() {
        self.show_status("没有指定任何类别，退出。")?;
        return Ok(());
      }
      match pipeline.prepare_classes(&classes) {
        Ok(()) => break classes,
        Err(e @ StoreError::InvalidClassName(_)) => {
          self.show_status(&format!("{}，请重新设置类别。", e))?;
        }
        Err(e) => {
          self.show_status(&format!("创建类别目录失败：{}", e))?;
          return Ok(());
        }
      }
    };
    self.show_status(&format!("使用类别: {}", classes.join(", ")))?;
    info!("类别目录已就绪: {}", pipeline.store().root().display());

    loop {
      let status = match self.prompt_for_menu_choice(&classes)? {
        MenuAction::Record(class) => pipeline.record(&class),
        MenuAction::Train => pipeline.train(&classes),
        MenuAction::Recognize => pipeline.recognize(),
        MenuAction::Stats => pipeline.stats(),
        MenuAction::Models => pipeline.models(),
        MenuAction::Exit => {
          self.show_status("再见！")?;
          return Ok(());
        }
      };
      self.show_status(&status)?;
    }
  }
}
