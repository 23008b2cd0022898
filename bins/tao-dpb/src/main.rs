//! tao-dpb - HEVC 解码图像缓冲轨迹回放工具
//!
//! 读取 JSON 解码轨迹, 按解码顺序驱动 DPB, 打印显示顺序与解码失败的图像.

mod logging;

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use tao_dpb::trace::{ReplayOptions, ReplayReport, load_trace, replay};

#[derive(Parser, Debug)]
#[command(name = "tao-dpb", version, about = "HEVC DPB 轨迹回放工具")]
struct Cli {
    /// 输入轨迹文件 (JSON)
    #[arg(short, long)]
    input: PathBuf,

    /// 每解码 N 幅图像强制刷新一次输出 (0 表示只在码流结束时刷新)
    #[arg(long, default_value_t = 0)]
    flush_every: usize,

    /// 以 JSON 输出显示顺序
    #[arg(long)]
    json: bool,

    /// 日志目录
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// 日志级别 (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init("tao-dpb", &cli.log_dir, cli.verbose) {
        eprintln!("警告: 日志初始化失败: {e:#}");
    }

    if let Err(e) = run(&cli) {
        error!("回放失败: {e:#}");
        eprintln!("错误: {e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    info!(
        "tao-dpb 版本 {}, 输入: {}",
        tao_dpb::version(),
        cli.input.display()
    );
    let trace = load_trace(&cli.input)?;
    let report = replay(
        &trace,
        &ReplayOptions {
            flush_every: cli.flush_every,
        },
    )?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report.displayed)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &ReplayReport) {
    println!("{:>6}  {:>8}  {:>4}", "POC", "PTS", "SLOT");
    for pic in &report.displayed {
        println!("{:>6}  {:>8}  {:>4}", pic.poc, pic.pts, pic.slot);
    }
    eprintln!(
        "输出 {} 幅, 跳过 RASL {} 幅, 失败 {} 幅",
        report.displayed.len(),
        report.skipped_rasl,
        report.failures.len()
    );
    for failure in &report.failures {
        eprintln!("  图像 #{}: {}", failure.index, failure.error);
    }
}
