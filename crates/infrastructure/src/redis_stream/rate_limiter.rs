use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 基于单调时钟的日志限流器
///
/// 连接反复失败时用来压制重复的warn日志。由持有者显式拥有并注入，
/// 不使用模块级可变状态。
#[derive(Debug)]
pub struct LogRateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl LogRateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// 距上次放行超过interval时返回true并刷新计时
    pub fn allow(&self) -> bool {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            // 锁中毒时宁可多打日志
            Err(poisoned) => poisoned.into_inner(),
        };
        match *last {
            Some(at) if at.elapsed() < self.interval => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }
}
