// 该文件是 Shibie （识别） 项目的一部分。
// src/main.rs - 命令行入口
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

mod args;

use std::io;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use shibie::{menu::Console, pipeline::Pipeline, task::Interrupt};

use args::{Args, Command};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();
  let args = Args::parse();

  println!("Shibie 物体识别");
  println!("==================");
  println!("样本目录: {}", args.data_root.display());
  println!("模型目录: {}", args.model_dir.display());
  println!("视频输入: {}", args.input);
  println!("画面输出: {}", args.output);
  println!();

  let interrupt = Interrupt::install()?;
  let pipeline = Pipeline::new(args.pipeline_config(), args.input.clone(), args.output.clone())
    .with_interrupt(interrupt);

  let status = match args.command {
    None => {
      let stdin = io::stdin();
      Console::new(stdin.lock(), io::stdout()).run(&pipeline)?;
      return Ok(());
    }
    Some(Command::Record { class }) => pipeline.record(&class),
    Some(Command::Train { classes }) if classes.is_empty() => {
      let known = pipeline.known_classes()?;
      info!("使用全部已有类别: {}", known.join(", "));
      pipeline.train(&known)
    }
    Some(Command::Train { classes }) => pipeline.train(&classes),
    Some(Command::Recognize) => pipeline.recognize(),
    Some(Command::Import { class, dir }) => pipeline.import(&class, &dir),
    Some(Command::Stats) => pipeline.stats(),
    Some(Command::Models) => pipeline.models(),
  };
  println!("{}", status);

  Ok(())
}
