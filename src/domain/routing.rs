// ==========================================
// 生产派工核心 - 工艺路线领域模型
// ==========================================
// 职责: 工艺单 (Process Sheet / RoutingInstance)、工序步骤、工艺模板
// 红线: 工序顺序由序号全序决定, 有且仅有最后一道为末道工序
// ==========================================

use crate::domain::job_card::RawMaterialLine;
use crate::domain::types::StepStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// OperationStep - 工序步骤
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationStep {
    pub step_id: String,         // 步骤行ID
    pub sequence_no: u32,        // 序号 (从 1 开始)
    pub operation: String,       // 工序
    pub workstation: Option<String>,
    pub source_location: Option<String>,
    pub target_location: Option<String>,
    pub consumes_rm: bool,       // 消耗原材料
    pub transfer_entry: bool,    // 仅转移
    pub planned_qty: f64,
    pub completed_qty: f64,
    pub final_step: bool,
    pub status: StepStatus,
}

impl OperationStep {
    pub fn new(step_id: impl Into<String>, sequence_no: u32, operation: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            sequence_no,
            operation: operation.into(),
            workstation: None,
            source_location: None,
            target_location: None,
            consumes_rm: false,
            transfer_entry: false,
            planned_qty: 0.0,
            completed_qty: 0.0,
            final_step: false,
            status: StepStatus::Pending,
        }
    }

    /// 待完成数量 (计划 - 已完成)
    pub fn pending_qty(&self) -> f64 {
        self.planned_qty - self.completed_qty
    }
}

// ==========================================
// RoutingInstance - 工艺单
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingInstance {
    pub routing_id: String,
    pub production_item: String,
    pub sales_order_line: Option<String>,
    pub template_id: Option<String>,
    pub operations: Vec<OperationStep>,
    /// 工艺单自身的原材料构成 (合并判定用)
    #[serde(default)]
    pub raw_materials: Vec<RawMaterialLine>,
}

impl RoutingInstance {
    /// 原材料构成 (物料编码集合)
    pub fn rm_composition(&self) -> BTreeSet<&str> {
        self.raw_materials.iter().map(|l| l.item_code.as_str()).collect()
    }

    /// 按步骤行ID定位, 找不到再按工序匹配
    pub fn locate_step(&self, step_id: Option<&str>, operation: &str) -> Option<&OperationStep> {
        step_id
            .and_then(|id| self.operations.iter().find(|s| s.step_id == id))
            .or_else(|| self.operations.iter().find(|s| s.operation == operation))
    }

    /// 紧随其后的步骤
    pub fn next_step(&self, step: &OperationStep) -> Option<&OperationStep> {
        self.operations
            .iter()
            .find(|s| s.sequence_no == step.sequence_no + 1)
    }
}

// ==========================================
// 公式模式 (Formula Mode)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormulaMode {
    /// 长度/重量守恒: 投入度量 = 产出度量 + 损耗
    Length {
        fg_measure_field: Option<String>,
        rm_measure_field: Option<String>,
        wip_measure_field: Option<String>,
    },
    /// 固定比例: 上报数量须落在计算数量的允许偏差内
    Ratio,
}

// ==========================================
// RoutingTemplate - 工艺模板
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingTemplate {
    pub template_id: String,
    pub formula_mode: FormulaMode,
    /// 原材料计算数量公式, 例: "fg_qty * oal_mm / rm_oal_mm"
    pub rm_qty_formula: Option<String>,
    /// 原材料限制规则, 例: "rm_d1_mm >= d1_mm && rm_d1_mm < d1_mm + 2"
    #[serde(default)]
    pub rm_rules: Vec<String>,
}

impl RoutingTemplate {
    pub fn ratio(template_id: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            formula_mode: FormulaMode::Ratio,
            rm_qty_formula: None,
            rm_rules: Vec::new(),
        }
    }

    pub fn length(template_id: impl Into<String>, measure_field: &str) -> Self {
        Self {
            template_id: template_id.into(),
            formula_mode: FormulaMode::Length {
                fg_measure_field: Some(measure_field.to_string()),
                rm_measure_field: Some(measure_field.to_string()),
                wip_measure_field: Some(measure_field.to_string()),
            },
            rm_qty_formula: None,
            rm_rules: Vec::new(),
        }
    }
}

// ==========================================
// SiblingStep - 同物料同工序的兄弟工艺单步骤
// ==========================================
// 数量平衡扫描的输入快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiblingStep {
    pub routing_id: String,
    pub step_id: String,
    pub sales_order_line: Option<String>,
    pub planned_qty: f64,
    pub completed_qty: f64,
    pub consumes_rm: bool,
    pub transfer_entry: bool,
    pub status: StepStatus,
    pub rm_items: Vec<String>,
}

impl SiblingStep {
    pub fn pending_qty(&self) -> f64 {
        self.planned_qty - self.completed_qty
    }

    /// 仍在进行中 (未完工、未短关/停止/作废)
    pub fn is_open(&self) -> bool {
        self.status.is_open() && self.completed_qty < self.planned_qty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routing() -> RoutingInstance {
        let mut s1 = OperationStep::new("PS-1-1", 1, "CUT");
        s1.transfer_entry = true;
        let mut s2 = OperationStep::new("PS-1-2", 2, "GRIND");
        s2.consumes_rm = true;
        s2.final_step = true;
        RoutingInstance {
            routing_id: "PS-1".to_string(),
            production_item: "FG-1".to_string(),
            sales_order_line: None,
            template_id: None,
            operations: vec![s1, s2],
            raw_materials: vec![],
        }
    }

    #[test]
    fn test_locate_step_by_id_then_operation() {
        let r = routing();
        assert_eq!(r.locate_step(Some("PS-1-2"), "CUT").unwrap().sequence_no, 2);
        assert_eq!(r.locate_step(Some("missing"), "CUT").unwrap().sequence_no, 1);
        assert!(r.locate_step(None, "HEAT").is_none());
    }

    #[test]
    fn test_next_step() {
        let r = routing();
        let first = &r.operations[0];
        assert_eq!(r.next_step(first).unwrap().operation, "GRIND");
        assert!(r.next_step(&r.operations[1]).is_none());
    }
}
