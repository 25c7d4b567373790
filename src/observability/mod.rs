//! 可观测性：tracing 初始化
//!
//! 默认 info 级别，RUST_LOG 可覆盖（如 `RUST_LOG=mindmap_agent=debug`）。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 初始化全局 subscriber；重复初始化时 panic，二进制入口调用一次
pub fn init() {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer())
        .init();
}

/// 可重复调用的初始化（测试用）；已初始化时返回 false
pub fn try_init() -> bool {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_test_writer())
        .try_init()
        .is_ok()
}
