// ==========================================
// 生产派工核心 - 工序卡领域模型
// ==========================================
// 职责: 工序卡 (Job Card) 及其原材料行/产出行/工时行
// 红线: 工序卡只属于一个 工艺单+工序步骤; 数量/状态字段只由工序卡自身写入
// ==========================================

use crate::domain::routing::{OperationStep, RoutingInstance};
use crate::domain::types::{DocState, JobCardStatus};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// RawMaterialLine - 原材料消耗行
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMaterialLine {
    pub item_code: String,
    pub qty: f64,
    pub calculated_qty: f64,   // 按公式计算的应耗数量
    pub qty_available: f64,    // 源库位可用
    pub projected_qty: f64,    // 预计可用 (负数表示缺口)
    pub uom: Option<String>,
    pub source_location: Option<String>,
    pub target_location: Option<String>,
}

impl RawMaterialLine {
    pub fn new(item_code: impl Into<String>, qty: f64) -> Self {
        Self {
            item_code: item_code.into(),
            qty,
            ..Default::default()
        }
    }
}

// ==========================================
// ProducedItemLine - 产出行 (中间品/副产品)
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProducedItemLine {
    pub item_code: String,
    pub qty: f64,
    pub source_location: Option<String>,
    pub target_location: Option<String>,
}

// ==========================================
// TimeInterval - 工时行
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeInterval {
    pub interval_id: String,
    pub sequence_no: u32,
    pub from_time: Option<NaiveDateTime>,
    pub to_time: Option<NaiveDateTime>,
    pub workstation: Option<String>,
    pub completed_qty: f64,
    pub rejected_qty: f64,
    pub salvage_qty: f64,
    pub salvage_location: Option<String>,
    pub time_in_mins: i64,
}

impl TimeInterval {
    pub fn new(sequence_no: u32, from_time: NaiveDateTime, to_time: NaiveDateTime) -> Self {
        Self {
            interval_id: uuid::Uuid::new_v4().to_string(),
            sequence_no,
            from_time: Some(from_time),
            to_time: Some(to_time),
            ..Default::default()
        }
    }

    pub fn with_completed(mut self, qty: f64) -> Self {
        self.completed_qty = qty;
        self
    }
}

// ==========================================
// JobCard - 工序卡
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCard {
    // ===== 归属 =====
    pub job_card_id: String,
    pub routing_id: String,
    pub step_id: Option<String>,
    pub production_item: String,
    pub operation: String,
    pub sales_order_line: Option<String>,

    // ===== 资源/库位 =====
    pub workstation: Option<String>,
    pub employee: Option<String>,
    pub source_location: Option<String>,
    pub target_location: Option<String>,

    // ===== 工序标志 =====
    pub transfer_entry: bool,
    pub consumes_rm: bool,
    pub final_step: bool,
    pub operation_seq_no: u32,

    // ===== 数量 =====
    pub for_quantity: f64,
    pub total_qty: f64,            // 平衡后的目标总量
    pub total_completed_qty: f64,
    pub total_rejected_qty: f64,
    pub available_qty: f64,
    pub short_close: bool,

    // ===== 派工 =====
    pub priority: i32,
    pub status: JobCardStatus,
    pub doc_state: DocState,

    // ===== 原材料齐套 =====
    pub rm_status_pct: i32,
    pub rm_shortage: f64,

    // ===== 过账时间 =====
    pub manual_posting: bool,
    pub posting_time: Option<NaiveDateTime>,
    pub total_time_mins: i64,

    // ===== 明细 =====
    pub raw_materials: Vec<RawMaterialLine>,
    pub produced_items: Vec<ProducedItemLine>,
    pub time_logs: Vec<TimeInterval>,

    // ===== 元数据 =====
    pub created_at: NaiveDateTime,
    pub revision: i32,             // 乐观锁修订号
}

impl JobCard {
    /// 由工艺单步骤生成工序卡
    ///
    /// # 参数
    /// - quantity: 指定数量; <= 0 时取步骤的 计划 - 已完成
    pub fn from_routing_step(routing: &RoutingInstance, step: &OperationStep, quantity: f64) -> Self {
        let for_quantity = if quantity > 0.0 {
            quantity
        } else {
            step.pending_qty()
        };

        Self {
            job_card_id: format!("JC-{}", uuid::Uuid::new_v4().simple()),
            routing_id: routing.routing_id.clone(),
            step_id: Some(step.step_id.clone()),
            production_item: routing.production_item.clone(),
            operation: step.operation.clone(),
            sales_order_line: routing.sales_order_line.clone(),
            workstation: step.workstation.clone(),
            employee: None,
            source_location: step.source_location.clone(),
            target_location: step.target_location.clone(),
            transfer_entry: step.transfer_entry,
            consumes_rm: step.consumes_rm,
            final_step: step.final_step,
            operation_seq_no: step.sequence_no,
            for_quantity,
            total_qty: for_quantity,
            total_completed_qty: 0.0,
            total_rejected_qty: 0.0,
            available_qty: 0.0,
            short_close: false,
            priority: 0,
            status: JobCardStatus::Open,
            doc_state: DocState::Draft,
            rm_status_pct: -100,
            rm_shortage: 0.0,
            manual_posting: false,
            posting_time: None,
            total_time_mins: 0,
            raw_materials: if step.consumes_rm {
                routing.raw_materials.clone()
            } else {
                Vec::new()
            },
            produced_items: Vec::new(),
            time_logs: Vec::new(),
            created_at: Utc::now().naive_utc(),
            revision: 0,
        }
    }

    /// 原材料构成 (物料编码集合)
    pub fn rm_composition(&self) -> BTreeSet<&str> {
        self.raw_materials.iter().map(|l| l.item_code.as_str()).collect()
    }

    /// 待执行 (草稿)
    pub fn is_pending(&self) -> bool {
        self.doc_state == DocState::Draft
    }

    /// 已处理数量 (完成 + 报废)
    pub fn processed_qty(&self) -> f64 {
        self.total_completed_qty + self.total_rejected_qty
    }

    /// 派工扫描所用的摘要
    pub fn summary(&self) -> JobCardSummary {
        JobCardSummary {
            job_card_id: self.job_card_id.clone(),
            operation_seq_no: self.operation_seq_no,
            transfer_entry: self.transfer_entry,
            for_quantity: self.for_quantity,
            available_qty: self.available_qty,
            source_location: self.source_location.clone(),
        }
    }
}

// ==========================================
// JobCardSummary - 待执行工序卡摘要
// ==========================================
// 顺序约定: 按工序序号降序 (越靠后的工序越靠前)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCardSummary {
    pub job_card_id: String,
    pub operation_seq_no: u32,
    pub transfer_entry: bool,
    pub for_quantity: f64,
    pub available_qty: f64,
    pub source_location: Option<String>,
}

impl JobCardSummary {
    /// 对缺口的贡献量: 转移卡计可用量, 其余计工序卡数量
    pub fn contribution(&self) -> f64 {
        if self.transfer_entry {
            self.available_qty
        } else {
            self.for_quantity
        }
    }
}

// ==========================================
// FinalizedCardSummary - 已完工工序卡 (上游供给计算)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizedCardSummary {
    pub job_card_id: String,
    pub sales_order_line: Option<String>,
    pub source_location: Option<String>,
    pub target_location: Option<String>,
    pub total_completed_qty: f64,
}

// ==========================================
// CommittedInterval - 已占用的资源时段
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedInterval {
    pub interval_id: String,
    pub job_card_id: String,
    pub workstation: Option<String>,
    pub from_time: NaiveDateTime,
    pub to_time: NaiveDateTime,
    pub doc_state: DocState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::routing::OperationStep;

    #[test]
    fn test_from_routing_step_uses_pending_qty_when_no_quantity() {
        let mut step = OperationStep::new("S1", 1, "CUT");
        step.planned_qty = 100.0;
        step.completed_qty = 40.0;
        let routing = RoutingInstance {
            routing_id: "PS-1".to_string(),
            production_item: "FG-1".to_string(),
            sales_order_line: Some("SOL-1".to_string()),
            template_id: None,
            operations: vec![step.clone()],
            raw_materials: vec![RawMaterialLine::new("RM-A", 1.0)],
        };

        let jc = JobCard::from_routing_step(&routing, &step, 0.0);
        assert_eq!(jc.for_quantity, 60.0);
        assert_eq!(jc.sales_order_line.as_deref(), Some("SOL-1"));
        assert!(jc.raw_materials.is_empty()); // 不消耗原材料的步骤不带原材料行

        let jc = JobCard::from_routing_step(&routing, &step, 25.0);
        assert_eq!(jc.for_quantity, 25.0);
    }

    #[test]
    fn test_summary_contribution() {
        let s = JobCardSummary {
            job_card_id: "JC-1".to_string(),
            operation_seq_no: 2,
            transfer_entry: true,
            for_quantity: 50.0,
            available_qty: 20.0,
            source_location: None,
        };
        assert_eq!(s.contribution(), 20.0);
        let s = JobCardSummary { transfer_entry: false, ..s };
        assert_eq!(s.contribution(), 50.0);
    }
}
