//! 进度事件节流器
//!
//! 用于控制进度事件的推送频率，避免事件风暴。
//! 仅对进度类事件节流，终结事件必须全部送达

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 默认节流间隔（毫秒）
pub const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 200;

/// 进度事件节流器
///
/// 线程安全的时间节流器，使用原子操作避免锁竞争。
/// 典型用法：每次推送进度前调用 `should_emit()`，返回 true 时才推送
#[derive(Debug)]
pub struct ProgressThrottler {
    /// 上次发布事件的时间戳（纳秒，使用原子操作）
    last_emit_nanos: AtomicU64,
    /// 节流间隔（纳秒）
    interval_nanos: u64,
}

impl ProgressThrottler {
    /// 创建新的节流器
    pub fn new(interval: Duration) -> Self {
        Self {
            last_emit_nanos: AtomicU64::new(0),
            interval_nanos: interval.as_nanos() as u64,
        }
    }

    /// 使用指定毫秒间隔创建节流器
    pub fn with_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// 检查是否应该发布事件
    ///
    /// 首次调用总是放行；此后距离上次发布超过节流间隔才再次放行。
    /// 使用 CAS 保证并发调用下同一窗口只放行一次
    pub fn should_emit(&self) -> bool {
        // 存储值保证非 0，0 专用于表示"从未发布"
        let now_nanos = Self::current_nanos().max(1);
        let last = self.last_emit_nanos.load(Ordering::Relaxed);

        if last == 0 || now_nanos.saturating_sub(last) >= self.interval_nanos {
            self.last_emit_nanos
                .compare_exchange(last, now_nanos, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        } else {
            false
        }
    }

    /// 重置节流器状态
    pub fn reset(&self) {
        self.last_emit_nanos.store(0, Ordering::Relaxed);
    }

    /// 获取当前时间的纳秒表示
    ///
    /// 使用 Instant 避免系统时钟跳变影响
    fn current_nanos() -> u64 {
        thread_local! {
            static START: Instant = Instant::now();
        }
        START.with(|start| start.elapsed().as_nanos() as u64)
    }
}

impl Default for ProgressThrottler {
    fn default() -> Self {
        Self::with_millis(DEFAULT_THROTTLE_INTERVAL_MS)
    }
}
