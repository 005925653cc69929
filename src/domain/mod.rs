// ==========================================
// 生产派工核心 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型与派生字段
// 红线: 不含数据访问逻辑, 不含引擎逻辑
// ==========================================

pub mod actor;
pub mod item;
pub mod job_card;
pub mod routing;
pub mod types;

// 重导出核心类型
pub use actor::{Actor, Permission};
pub use item::{Item, Location, OperationInfo, StockPosition, UnitOfMeasure, Workstation};
pub use job_card::{
    CommittedInterval, FinalizedCardSummary, JobCard, JobCardSummary, ProducedItemLine,
    RawMaterialLine, TimeInterval,
};
pub use routing::{FormulaMode, OperationStep, RoutingInstance, RoutingTemplate, SiblingStep};
pub use types::{DocEvent, DocState, JobCardStatus, LocationType, Severity, StepStatus};
