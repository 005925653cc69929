// ==========================================
// 生产派工核心 - 业务规则违规与放行
// ==========================================
// 红线: 违规要么立即报错, 要么以警告发出, 不允许静默吞掉
// ==========================================

use crate::domain::actor::{Actor, Permission};
use crate::domain::types::Severity;
use crate::engine::error::{DispatchError, DispatchResult};
use crate::engine::notify::Notifier;
use crate::i18n::t_with_args;

/// 业务规则违规
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// i18n 键
    pub key: &'static str,
    /// 已翻译的消息
    pub message: String,
}

impl Violation {
    pub fn new(key: &'static str, args: &[(&str, &str)]) -> Self {
        Self {
            key,
            message: t_with_args(key, args),
        }
    }
}

/// 放行请求
#[derive(Debug, Clone, Copy)]
pub struct Bypass<'a> {
    pub requested: bool,
    pub permission: Permission,
    pub actor: &'a Actor,
}

impl<'a> Bypass<'a> {
    pub fn none(actor: &'a Actor, permission: Permission) -> Self {
        Self {
            requested: false,
            permission,
            actor,
        }
    }

    /// 校验放行资格: 请求放行但无权限 -> PermissionDenied
    pub fn authorize(&self) -> DispatchResult<bool> {
        if !self.requested {
            return Ok(false);
        }
        if !self.actor.can(self.permission) {
            return Err(DispatchError::PermissionDenied(t_with_args(
                "violation.bypass_not_permitted",
                &[("user", &self.actor.user_id)],
            )));
        }
        Ok(true)
    }
}

/// 执行违规处理: 未放行 -> BusinessRuleViolation; 已授权放行 -> 警告
pub fn enforce(violation: Violation, bypass: &Bypass<'_>, notifier: &dyn Notifier) -> DispatchResult<()> {
    let error = DispatchError::BusinessRuleViolation(violation.message.clone());
    enforce_as(violation, error, bypass, notifier)
}

/// 同 enforce, 未放行时返回调用方给定的错误
pub fn enforce_as(
    violation: Violation,
    error: DispatchError,
    bypass: &Bypass<'_>,
    notifier: &dyn Notifier,
) -> DispatchResult<()> {
    if bypass.authorize()? {
        tracing::warn!(key = violation.key, user = %bypass.actor.user_id, "违规已放行: {}", violation.message);
        notifier.notify(&violation.message, Severity::Warning);
        return Ok(());
    }
    Err(error)
}

/// 批量执行 (第一个未放行的违规即中止)
pub fn enforce_all(
    violations: Vec<Violation>,
    bypass: &Bypass<'_>,
    notifier: &dyn Notifier,
) -> DispatchResult<()> {
    for v in violations {
        enforce(v, bypass, notifier)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::ErrorKind;
    use crate::engine::notify::CollectingNotifier;

    fn violation() -> Violation {
        Violation {
            key: "tolerance.out_of_range",
            message: "out of range".to_string(),
        }
    }

    #[test]
    fn test_enforce_without_bypass_fails() {
        let actor = Actor::new("u1");
        let notifier = CollectingNotifier::new();
        let err = enforce(
            violation(),
            &Bypass::none(&actor, Permission::BypassQuantityCheck),
            &notifier,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BusinessRule);
        assert!(notifier.drain().is_empty());
    }

    #[test]
    fn test_enforce_authorized_bypass_downgrades_to_warning() {
        let actor = Actor::new("u1").with_permission(Permission::BypassQuantityCheck);
        let notifier = CollectingNotifier::new();
        let bypass = Bypass {
            requested: true,
            permission: Permission::BypassQuantityCheck,
            actor: &actor,
        };
        enforce(violation(), &bypass, &notifier).unwrap();
        assert_eq!(notifier.warnings(), vec!["out of range".to_string()]);
    }

    #[test]
    fn test_enforce_as_keeps_caller_error() {
        let operator = Actor::new("u1");
        let notifier = CollectingNotifier::new();
        let conflict = || DispatchError::ConcurrentModification("JC-1".into());

        let err = enforce_as(
            violation(),
            conflict(),
            &Bypass::none(&operator, Permission::BypassTimeLogs),
            &notifier,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let manager = Actor::new("u2").with_permission(Permission::BypassTimeLogs);
        let bypass = Bypass {
            requested: true,
            permission: Permission::BypassTimeLogs,
            actor: &manager,
        };
        enforce_as(violation(), conflict(), &bypass, &notifier).unwrap();
        assert_eq!(notifier.warnings().len(), 1);
    }

    #[test]
    fn test_enforce_unauthorized_bypass_is_permission_denied() {
        let actor = Actor::new("u1");
        let notifier = CollectingNotifier::new();
        let bypass = Bypass {
            requested: true,
            permission: Permission::BypassQuantityCheck,
            actor: &actor,
        };
        let err = enforce(violation(), &bypass, &notifier).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
    }
}
