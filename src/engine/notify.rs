// ==========================================
// 生产派工核心 - 用户消息通知
// ==========================================
// 职责: 定义面向用户的消息通知 trait (非阻塞)
// 说明: Engine 层定义 trait, 外围系统实现适配器
// ==========================================

use crate::domain::types::Severity;
use std::sync::Mutex;

/// 用户消息通知者
///
/// 业务规则被授权放行时, 违规消息以警告级别经此发出
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

/// 转发到 tracing 的通知者 (默认实现)
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => tracing::info!(target: "dispatch::notify", "{}", message),
            Severity::Warning => tracing::warn!(target: "dispatch::notify", "{}", message),
            Severity::Error => tracing::error!(target: "dispatch::notify", "{}", message),
        }
    }
}

/// 空操作通知者
#[derive(Debug, Clone, Default)]
pub struct NoOpNotifier;

impl Notifier for NoOpNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        tracing::debug!("NoOpNotifier: 跳过消息 - severity={}, message={}", severity, message);
    }
}

/// 收集型通知者 (批处理调用方与测试使用)
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    messages: Mutex<Vec<(Severity, String)>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取出已收集的消息
    pub fn drain(&self) -> Vec<(Severity, String)> {
        match self.messages.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        match self.messages.lock() {
            Ok(guard) => guard
                .iter()
                .filter(|(s, _)| *s == Severity::Warning)
                .map(|(_, m)| m.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        if let Ok(mut guard) = self.messages.lock() {
            guard.push((severity, message.to_string()));
        }
    }
}
