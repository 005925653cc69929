// ==========================================
// 生产派工核心 - 领域类型定义
// ==========================================
// 职责: 工序卡状态、单据状态、消息级别等枚举
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 单据状态 (Doc State)
// ==========================================
// Draft=0 / Submitted=1 / Cancelled=2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocState {
    Draft,     // 草稿（待执行）
    Submitted, // 已提交（已定稿）
    Cancelled, // 已取消
}

impl fmt::Display for DocState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl DocState {
    /// 从字符串解析单据状态
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Some(DocState::Draft),
            "SUBMITTED" => Some(DocState::Submitted),
            "CANCELLED" => Some(DocState::Cancelled),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            DocState::Draft => "DRAFT",
            DocState::Submitted => "SUBMITTED",
            DocState::Cancelled => "CANCELLED",
        }
    }

    /// 是否已定稿（提交或取消后不再视为待执行）
    pub fn is_finalized(&self) -> bool {
        !matches!(self, DocState::Draft)
    }
}

// ==========================================
// 单据事件 (Doc Event)
// ==========================================
// 状态机输入: 保存/提交/取消
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocEvent {
    Save,
    Submit,
    Cancel,
}

impl fmt::Display for DocEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocEvent::Save => write!(f, "SAVE"),
            DocEvent::Submit => write!(f, "SUBMIT"),
            DocEvent::Cancel => write!(f, "CANCEL"),
        }
    }
}

// ==========================================
// 工序卡状态 (Job Card Status)
// ==========================================
// 红线: 状态只由 (单据状态, 可用数量) 推导, 不允许调用方直接写
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobCardStatus {
    Open,           // 待料
    WorkInProgress, // 在制
    Completed,      // 完工
    Cancelled,      // 取消
}

impl fmt::Display for JobCardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl JobCardStatus {
    /// 从字符串解析工序卡状态
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OPEN" => Some(JobCardStatus::Open),
            "WORK_IN_PROGRESS" => Some(JobCardStatus::WorkInProgress),
            "COMPLETED" => Some(JobCardStatus::Completed),
            "CANCELLED" => Some(JobCardStatus::Cancelled),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            JobCardStatus::Open => "OPEN",
            JobCardStatus::WorkInProgress => "WORK_IN_PROGRESS",
            JobCardStatus::Completed => "COMPLETED",
            JobCardStatus::Cancelled => "CANCELLED",
        }
    }
}

// ==========================================
// 工序步骤状态 (Operation Step Status)
// ==========================================
// 同工序兄弟实例扫描时, 已完工/短关/停止/作废的步骤不参与数量平衡
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    ShortClosed,
    Stopped,
    Obsolete,
}

impl StepStatus {
    /// 是否仍可接收数量
    pub fn is_open(&self) -> bool {
        matches!(self, StepStatus::Pending | StepStatus::InProgress)
    }
}

// ==========================================
// 消息级别 (Severity)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

// ==========================================
// 库位类型 (Location Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationType {
    Rejected,      // 废品库
    FinishedStock, // 成品库
    DeadStock,     // 呆滞库
    WorkInProgress,
    RawMaterial,
    Other,
}
