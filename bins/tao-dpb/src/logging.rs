//! 日志初始化模块.
//!
//! 双输出:
//! - console: 紧凑格式, 写 stderr (stdout 留给显示顺序), 默认 warn, -v/-vv/-vvv 逐级提升
//! - file: 无色, 默认 info, 可通过 -v/-vv 或 TAO_LOG 环境变量调整
//!
//! 日志文件输出到 {log_dir}/{prefix}.{date}.log, 按天滚动.
//! DPB 核心通过 `log` 门面输出, 经 tracing-log 桥接进入同一个 registry.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use chrono::Local;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// 初始化日志系统
///
/// - `file_prefix`: 日志文件前缀 (如 "tao-dpb")
/// - `log_dir`: 日志目录
/// - `verbosity`: 由 -v/-vv/-vvv 控制
pub fn init(file_prefix: &str, log_dir: &Path, verbosity: u8) -> Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("创建日志目录失败, path={}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(file_prefix)
        .filename_suffix("log")
        .build(log_dir)
        .context("创建日志文件失败")?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    LOG_GUARD.set(guard).ok();

    // 控制台只显示级别与消息, 不带时间与 target
    let console_layer = fmt::Layer::default()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .compact()
        .with_filter(EnvFilter::new(console_level(verbosity)));

    let file_filter = EnvFilter::try_from_env("TAO_LOG")
        .unwrap_or_else(|_| EnvFilter::new(file_level(verbosity)));

    let file_layer = fmt::Layer::default()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(FileFormatter)
        .with_filter(file_filter);

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("初始化日志订阅者失败")?;
    Ok(())
}

/// 控制台级别: 默认 warn, 每个 -v 提升一级
fn console_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// 文件级别: 默认 info, 比控制台多记录一级
fn file_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// File 格式: 无色, 日期时间 + 级别 + target + 消息
struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        write!(
            writer,
            "[{}] {:5} {} > ",
            Local::now().format("%m-%d %H:%M:%S%.3f"),
            meta.level(),
            meta.target(),
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
