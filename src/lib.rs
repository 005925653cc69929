// ==========================================
// 生产派工系统 - 核心库
// ==========================================
// 职责: 离散制造工序卡的派工决策
// - 优先级排序 (销售缺口 / 备库)
// - 重复工序卡识别与合并
// - 数量平衡与上游可用量
// - 资源时段准入
// - 数量公差校验
// 技术栈: Rust + SQLite
// 系统定位: 决策核心 (单据界面/工艺单/库存台账由宿主系统负责)
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{DocEvent, DocState, JobCardStatus, LocationType, Severity, StepStatus};

// 领域实体
pub use domain::{
    Actor, CommittedInterval, Item, JobCard, JobCardSummary, OperationStep, Permission,
    RoutingInstance, RoutingTemplate, TimeInterval,
};

// 引擎
pub use engine::{
    DispatchError, DispatchResult, DuplicateDetector, IntervalScheduler, JobCardStateMachine,
    PriorityEngine, QuantityReconciler, ToleranceValidator,
};

// API
pub use api::{Collaborators, DispatchApi, JobCardOutcome, JobCardRequest, TimeEntryRequest};

// 配置
pub use config::{ConfigManager, DispatchSettings};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "生产派工系统";
