// ==========================================
// 生产派工核心 - 工序卡数量平衡
// ==========================================
// 职责:
// a) 目标数量平衡: 汇总同物料同工序的兄弟工艺单步骤待完成量
// b) 上游供给数量: 沿工艺路线定位本工序, 计算源库位 流入 - 流出
// c) 可用数量: 按是否有源库位/销售订单行选取供给口径
// 红线: 纯函数, 只读调用方传入的快照; 工序不在工艺单中属数据完整性错误
// ==========================================

use crate::domain::item::Item;
use crate::domain::job_card::{FinalizedCardSummary, JobCard};
use crate::domain::routing::{RoutingInstance, SiblingStep};
use crate::engine::duplicate::same_rm_composition;
use crate::engine::error::{DispatchError, DispatchResult};
use serde::{Deserialize, Serialize};

/// 目标数量平衡结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancedQty {
    /// 平衡后的目标总量
    pub total_qty: f64,
    /// 本卡数量 (本步骤的 计划 - 已完成)
    pub for_quantity: f64,
    /// 是否存在仅转移的兄弟匹配
    pub transfer_total: bool,
}

/// 上游供给计算所需的事实快照
#[derive(Debug, Clone, Default)]
pub struct UpstreamSnapshot {
    /// 同销售订单行的已提交工序卡
    pub finalized: Vec<FinalizedCardSummary>,
    /// 销售订单行数量 (客供来料加工首工序使用)
    pub sales_line_qty: f64,
    /// 委外工序收入源库位的数量
    pub subcontract_received_qty: f64,
}

// ==========================================
// QuantityReconciler - 数量平衡器
// ==========================================
#[derive(Debug, Default)]
pub struct QuantityReconciler {
    // 无状态引擎
}

impl QuantityReconciler {
    pub fn new() -> Self {
        Self {}
    }

    /// 目标数量平衡
    ///
    /// 对每个仍在进行的兄弟步骤:
    /// - 双方都消耗原材料且构成一致: 计入其待完成量
    /// - 双方都仅转移: 计入其待完成量, 并标记为转移汇总
    /// - 其余: 视为独立, 计入本卡数量
    ///
    /// 存在转移匹配时, 目标总量不低于当前可用数量
    pub fn balance_target_qty(
        &self,
        card: &JobCard,
        siblings: &[SiblingStep],
        available_qty: f64,
    ) -> BalancedQty {
        let in_scope: Vec<&SiblingStep> = siblings
            .iter()
            .filter(|s| s.is_open())
            .filter(|s| match card.sales_order_line.as_deref() {
                Some(line) => s.sales_order_line.as_deref() == Some(line),
                None => true,
            })
            .collect();

        // 先确定本卡数量, 保证重复计算结果一致
        let for_quantity = in_scope
            .iter()
            .find(|s| card.step_id.as_deref() == Some(s.step_id.as_str()))
            .map(|s| s.pending_qty())
            .unwrap_or(card.for_quantity);

        let card_rm = card.rm_composition();
        let mut total_qty = 0.0;
        let mut transfer_total = false;

        for sibling in in_scope {
            if sibling.consumes_rm && card.consumes_rm {
                if same_rm_composition(&sibling.rm_items, &card_rm) {
                    total_qty += sibling.pending_qty();
                }
            } else if sibling.transfer_entry && card.transfer_entry {
                transfer_total = true;
                total_qty += sibling.pending_qty();
            } else {
                total_qty += for_quantity;
            }
        }

        if transfer_total && total_qty < available_qty {
            total_qty = available_qty;
        }

        BalancedQty {
            total_qty,
            for_quantity,
            transfer_total,
        }
    }

    /// 上游供给数量
    ///
    /// - 首工序: 客供来料加工取销售订单行数量, 否则为 0
    /// - 其余工序: 有源库位时 = 流入(目标库位为源库位) - 流出(源库位相同) + 委外收货; 无源库位为 0
    pub fn made_to_stock_qty(
        &self,
        routing: &RoutingInstance,
        card: &JobCard,
        item: &Item,
        upstream: &UpstreamSnapshot,
    ) -> DispatchResult<f64> {
        let step = routing
            .locate_step(card.step_id.as_deref(), &card.operation)
            .ok_or_else(|| DispatchError::NotInRouting {
                operation: card.operation.clone(),
                routing_id: routing.routing_id.clone(),
            })?;

        if step.sequence_no == 1 {
            return Ok(if item.sales_job_work {
                upstream.sales_line_qty
            } else {
                0.0
            });
        }

        let Some(source) = card.source_location.as_deref() else {
            return Ok(0.0);
        };

        let same_line = |c: &&FinalizedCardSummary| c.sales_order_line == card.sales_order_line;

        let in_qty: f64 = upstream
            .finalized
            .iter()
            .filter(same_line)
            .filter(|c| c.target_location.as_deref() == Some(source))
            .map(|c| c.total_completed_qty)
            .sum();
        let out_qty: f64 = upstream
            .finalized
            .iter()
            .filter(same_line)
            .filter(|c| c.source_location.as_deref() == Some(source))
            .map(|c| c.total_completed_qty)
            .sum();

        let qty = in_qty - out_qty + upstream.subcontract_received_qty;
        tracing::debug!(
            job_card = %card.job_card_id,
            in_qty,
            out_qty,
            subcontract = upstream.subcontract_received_qty,
            qty,
            "上游供给数量"
        );
        Ok(qty)
    }

    /// 可用数量
    ///
    /// - 无源库位: 0
    /// - 有销售订单行: 上游供给数量, 负数取 0
    /// - 其余: 源库位实际结存, 负数取 0
    pub fn available_quantity(&self, card: &JobCard, upstream_qty: Option<f64>, bin_qty: f64) -> f64 {
        if card.source_location.is_none() {
            return 0.0;
        }
        if card.sales_order_line.is_some() {
            return upstream_qty.unwrap_or(0.0).max(0.0);
        }
        bin_qty.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job_card::RawMaterialLine;
    use crate::domain::routing::OperationStep;
    use crate::domain::types::StepStatus;

    fn routing() -> RoutingInstance {
        let mut s1 = OperationStep::new("S1", 1, "CUT");
        s1.transfer_entry = true;
        s1.source_location = Some("RM-STORE".into());
        s1.target_location = Some("WIP-1".into());
        let mut s2 = OperationStep::new("S2", 2, "GRIND");
        s2.consumes_rm = true;
        s2.source_location = Some("WIP-1".into());
        s2.target_location = Some("FG-STORE".into());
        s2.final_step = true;
        RoutingInstance {
            routing_id: "PS-1".into(),
            production_item: "FG".into(),
            sales_order_line: Some("SOL-1".into()),
            template_id: None,
            operations: vec![s1, s2],
            raw_materials: vec![RawMaterialLine::new("A", 1.0), RawMaterialLine::new("B", 1.0)],
        }
    }

    fn sibling(step_id: &str, planned: f64, done: f64, rm: bool, transfer: bool, items: &[&str]) -> SiblingStep {
        SiblingStep {
            routing_id: format!("PS-{}", step_id),
            step_id: step_id.into(),
            sales_order_line: Some("SOL-1".into()),
            planned_qty: planned,
            completed_qty: done,
            consumes_rm: rm,
            transfer_entry: transfer,
            status: StepStatus::Pending,
            rm_items: items.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_balance_rm_siblings_with_same_composition() {
        let r = QuantityReconciler::new();
        let ps = routing();
        let card = JobCard::from_routing_step(&ps, &ps.operations[1], 10.0);
        let siblings = vec![
            sibling("S2", 50.0, 10.0, true, false, &["B", "A"]),
            sibling("X2", 30.0, 0.0, true, false, &["A", "B"]),
            sibling("Y2", 30.0, 0.0, true, false, &["A", "C"]),
        ];
        let b = r.balance_target_qty(&card, &siblings, 0.0);
        assert_eq!(b.for_quantity, 40.0);
        assert_eq!(b.total_qty, 70.0);
        assert!(!b.transfer_total);
    }

    #[test]
    fn test_balance_transfer_clamps_to_available() {
        let r = QuantityReconciler::new();
        let ps = routing();
        let card = JobCard::from_routing_step(&ps, &ps.operations[0], 10.0);
        let siblings = vec![sibling("S1", 20.0, 5.0, false, true, &[])];
        let b = r.balance_target_qty(&card, &siblings, 100.0);
        assert_eq!(b.total_qty, 100.0);
        assert!(b.transfer_total);
    }

    #[test]
    fn test_balance_is_idempotent() {
        let r = QuantityReconciler::new();
        let ps = routing();
        let mut card = JobCard::from_routing_step(&ps, &ps.operations[1], 10.0);
        let siblings = vec![
            sibling("S2", 50.0, 10.0, true, false, &["A", "B"]),
            sibling("Z2", 20.0, 0.0, false, true, &[]),
        ];
        let first = r.balance_target_qty(&card, &siblings, 0.0);
        card.for_quantity = first.for_quantity;
        card.total_qty = first.total_qty;
        let second = r.balance_target_qty(&card, &siblings, 0.0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_closed_siblings_ignored() {
        let r = QuantityReconciler::new();
        let ps = routing();
        let card = JobCard::from_routing_step(&ps, &ps.operations[1], 10.0);
        let mut closed = sibling("X2", 30.0, 0.0, true, false, &["A", "B"]);
        closed.status = StepStatus::ShortClosed;
        let b = r.balance_target_qty(&card, &[closed], 0.0);
        assert_eq!(b.total_qty, 0.0);
    }

    #[test]
    fn test_first_step_supply_is_zero_unless_job_work() {
        let r = QuantityReconciler::new();
        let ps = routing();
        let card = JobCard::from_routing_step(&ps, &ps.operations[0], 10.0);
        let upstream = UpstreamSnapshot {
            sales_line_qty: 25.0,
            subcontract_received_qty: 99.0,
            ..Default::default()
        };
        assert_eq!(r.made_to_stock_qty(&ps, &card, &Item::new("FG"), &upstream).unwrap(), 0.0);
        assert_eq!(
            r.made_to_stock_qty(&ps, &card, &Item::new("FG").sales_job_work(), &upstream).unwrap(),
            25.0
        );
    }

    #[test]
    fn test_later_step_supply_in_minus_out() {
        let r = QuantityReconciler::new();
        let ps = routing();
        let card = JobCard::from_routing_step(&ps, &ps.operations[1], 10.0);
        let fin = |id: &str, src: &str, tgt: &str, qty: f64, line: &str| FinalizedCardSummary {
            job_card_id: id.into(),
            sales_order_line: Some(line.into()),
            source_location: Some(src.into()),
            target_location: Some(tgt.into()),
            total_completed_qty: qty,
        };
        let upstream = UpstreamSnapshot {
            finalized: vec![
                fin("JC-1", "RM-STORE", "WIP-1", 40.0, "SOL-1"),
                fin("JC-2", "WIP-1", "FG-STORE", 15.0, "SOL-1"),
                fin("JC-3", "RM-STORE", "WIP-1", 99.0, "SOL-2"),
            ],
            sales_line_qty: 0.0,
            subcontract_received_qty: 5.0,
        };
        let qty = r.made_to_stock_qty(&ps, &card, &Item::new("FG"), &upstream).unwrap();
        assert_eq!(qty, 30.0);
    }

    #[test]
    fn test_not_in_routing_is_data_integrity_fault() {
        let r = QuantityReconciler::new();
        let ps = routing();
        let mut card = JobCard::from_routing_step(&ps, &ps.operations[1], 10.0);
        card.step_id = None;
        card.operation = "HEAT".into();
        let err = r
            .made_to_stock_qty(&ps, &card, &Item::new("FG"), &UpstreamSnapshot::default())
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotInRouting { .. }));
    }

    #[test]
    fn test_available_quantity() {
        let r = QuantityReconciler::new();
        let ps = routing();
        let mut card = JobCard::from_routing_step(&ps, &ps.operations[1], 10.0);
        assert_eq!(r.available_quantity(&card, Some(-4.0), 50.0), 0.0);
        assert_eq!(r.available_quantity(&card, Some(12.0), 50.0), 12.0);
        card.sales_order_line = None;
        assert_eq!(r.available_quantity(&card, None, 50.0), 50.0);
        assert_eq!(r.available_quantity(&card, None, -3.0), 0.0);
        card.source_location = None;
        assert_eq!(r.available_quantity(&card, None, 50.0), 0.0);
    }
}
