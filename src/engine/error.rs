// ==========================================
// 生产派工核心 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 数据完整性 / 业务规则 / 权限 / 并发冲突 / 基础设施
// ==========================================

use crate::repository::error::RepositoryError;
use chrono::NaiveDateTime;
use thiserror::Error;

/// 错误大类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 上游数据不一致, 始终致命, 不自动重试
    DataIntegrity,
    /// 业务规则违反, 授权放行时可降级为警告
    BusinessRule,
    /// 权限不足, 同一调用方不可放行
    Permission,
    /// 并发修改冲突, 调用方可重新读取后重试
    Conflict,
    /// 存储/外部协作方故障
    Infrastructure,
}

/// 派工错误
#[derive(Error, Debug)]
pub enum DispatchError {
    // ===== 数据完整性 =====
    #[error("数据完整性错误: {0}")]
    DataIntegrityFault(String),

    #[error("工序不在工艺单中: operation={operation}, routing_id={routing_id}")]
    NotInRouting {
        operation: String,
        routing_id: String,
    },

    #[error("公式错误: {0}")]
    FormulaError(String),

    // ===== 业务规则 =====
    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("时段冲突: 第{row}行与工序卡 {conflicting_job_card} 重叠 (至 {conflicting_to})")]
    IntervalConflict {
        row: u32,
        conflicting_job_card: String,
        conflicting_to: NaiveDateTime,
    },

    // ===== 权限 =====
    #[error("权限不足: {0}")]
    PermissionDenied(String),

    // ===== 并发 =====
    #[error("并发修改冲突: {0}")]
    ConcurrentModification(String),

    // ===== 基础设施 =====
    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("外部协作方调用失败: {0}")]
    Collaborator(#[from] anyhow::Error),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl DispatchError {
    /// 错误归类
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::DataIntegrityFault(_)
            | DispatchError::NotInRouting { .. }
            | DispatchError::FormulaError(_) => ErrorKind::DataIntegrity,
            DispatchError::BusinessRuleViolation(_) | DispatchError::IntervalConflict { .. } => {
                ErrorKind::BusinessRule
            }
            DispatchError::PermissionDenied(_) => ErrorKind::Permission,
            DispatchError::ConcurrentModification(_) => ErrorKind::Conflict,
            DispatchError::NotFound(_)
            | DispatchError::Collaborator(_)
            | DispatchError::Repository(_) => ErrorKind::Infrastructure,
        }
    }
}

/// Result 类型别名
pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        let err = DispatchError::NotInRouting {
            operation: "CUT".to_string(),
            routing_id: "PS-1".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);
        assert!(err.to_string().contains("CUT"));

        let err = DispatchError::Collaborator(anyhow::anyhow!("stock ledger offline"));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);

        assert_eq!(
            DispatchError::PermissionDenied("salvage".into()).kind(),
            ErrorKind::Permission
        );
    }
}
