// ==========================================
// 生产派工系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口, 供宿主系统 (单据保存/提交钩子、后台任务) 调用
// ==========================================

pub mod dispatch_api;
pub mod error;

// 重导出核心类型
pub use dispatch_api::{Collaborators, DispatchApi, JobCardOutcome, JobCardRequest, TimeEntryRequest};
pub use error::ApiResult;
