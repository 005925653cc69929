// ==========================================
// 生产派工核心 - 操作人与权限
// ==========================================
// 红线: 核心不读取会话/全局角色状态, 权限由调用方显式传入
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 权限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    /// 数量公差检查可降级为警告
    BypassQuantityCheck,
    /// 时段冲突检查可跳过
    BypassTimeLogs,
    /// 报废品可发往非废品库
    RouteSalvageAnywhere,
}

/// 操作人 (已解析的权限集合)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub permissions: HashSet<Permission>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            permissions: HashSet::new(),
        }
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.insert(permission);
        self
    }

    /// 按角色解析权限: 拥有授权角色即获得全部放行权限
    pub fn from_roles(user_id: impl Into<String>, roles: &[String], bypass_role: &str) -> Self {
        let mut actor = Self::new(user_id);
        if roles.iter().any(|r| r == bypass_role) {
            actor.permissions.insert(Permission::BypassQuantityCheck);
            actor.permissions.insert(Permission::BypassTimeLogs);
            actor.permissions.insert(Permission::RouteSalvageAnywhere);
        }
        actor
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_roles() {
        let roles = vec!["Manufacturing User".to_string(), "System Manager".to_string()];
        let actor = Actor::from_roles("u1", &roles, "System Manager");
        assert!(actor.can(Permission::RouteSalvageAnywhere));

        let actor = Actor::from_roles("u2", &roles[..1], "System Manager");
        assert!(!actor.can(Permission::BypassQuantityCheck));
    }
}
