// ==========================================
// 生产派工系统 - API层错误类型
// ==========================================
// 职责: 统一 API 结果类型, 转换 Repository 错误为派工错误
// ==========================================

use crate::engine::error::DispatchError;
use crate::repository::error::RepositoryError;

/// API 结果类型
pub type ApiResult<T> = Result<T, DispatchError>;

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for DispatchError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure {
                job_card_id,
                expected,
                actual,
            } => DispatchError::ConcurrentModification(format!(
                "工序卡 {} 已被其他操作修改 (expected_revision={}, actual_revision={})",
                job_card_id, expected, actual
            )),
            RepositoryError::NotFound { entity, id } => DispatchError::NotFound(format!("{}[{}]", entity, id)),
            other => DispatchError::Repository(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::ErrorKind;

    #[test]
    fn test_repository_error_mapping() {
        let err: DispatchError = RepositoryError::OptimisticLockFailure {
            job_card_id: "JC-1".into(),
            expected: 1,
            actual: 2,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err: DispatchError = RepositoryError::NotFound {
            entity: "JobCard".into(),
            id: "JC-9".into(),
        }
        .into();
        assert!(matches!(err, DispatchError::NotFound(ref m) if m.contains("JC-9")));

        let err: DispatchError = RepositoryError::LockError("poisoned".into()).into();
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
    }
}
