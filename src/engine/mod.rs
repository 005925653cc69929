// ==========================================
// 生产派工系统 - 引擎层
// ==========================================
// 职责: 实现派工业务规则, 不拼 SQL
// 红线: Engine 不拼 SQL, 外部数据只经协作方接口读取
// ==========================================

pub mod collaborators;
pub mod duplicate;
pub mod error;
pub mod formula;
pub mod interval;
pub mod locks;
pub mod notify;
pub mod priority;
pub mod reconcile;
pub mod routing_rules;
pub mod shortage;
pub mod status;
pub mod time_log;
pub mod tolerance;
pub mod violation;

// 重导出核心引擎
pub use collaborators::{ItemCatalog, PriorityOracle, RoutingRepository, StockLedger};
pub use duplicate::{DuplicateDetector, RepeatReport};
pub use error::{DispatchError, DispatchResult, ErrorKind};
pub use formula::{Bindings, CompiledTemplate, Expr, Value};
pub use interval::{IntervalScheduler, OverlapMode, ProposedInterval, ResourceLedger};
pub use locks::KeyedLocks;
pub use notify::{CollectingNotifier, NoOpNotifier, Notifier, TracingNotifier};
pub use priority::{ItemRanking, PriorityBasis, PriorityEngine};
pub use reconcile::{BalancedQty, QuantityReconciler, UpstreamSnapshot};
pub use routing_rules::RoutingRules;
pub use shortage::{DemandClass, DemandShortageResolver, ShortageAssessment};
pub use status::{JobCardStateMachine, RmReadiness, StepPosition, RM_STATUS_NOT_APPLICABLE};
pub use time_log::{ProducedQtyBand, TimeLogContext, TimeLogValidator};
pub use tolerance::{LengthInputs, ToleranceValidator, WastageReport};
pub use violation::{enforce, enforce_all, Bypass, Violation};
