// ==========================================
// 生产派工核心 - 派工优先级引擎
// ==========================================
// 职责: 为单张待执行工序卡计算派工优先级
// 输入: 物料 + 库存头寸 + 同物料待执行工序卡摘要 (按工序序号降序)
// 输出: 优先级依据 (销售缺口 / 备库排队量) -> 外部优先级函数 -> 优先级
// 红线: 本引擎只负责输入量的正确性, 排序与并列交给外部优先级函数
// ==========================================

use crate::domain::item::{Item, StockPosition};
use crate::domain::job_card::{JobCard, JobCardSummary};
use crate::engine::collaborators::PriorityOracle;
use crate::engine::shortage::{DemandClass, DemandShortageResolver};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// 优先级依据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "basis", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityBasis {
    /// 按销售订单紧急度排序
    SalesOrder { produced_qty: f64, short_qty: f64 },
    /// 按备库生产排序
    StockProduction { queued_qty: f64 },
}

// ==========================================
// PriorityEngine - 派工优先级引擎
// ==========================================
#[derive(Debug, Default)]
pub struct PriorityEngine {
    resolver: DemandShortageResolver,
}

impl PriorityEngine {
    pub fn new() -> Self {
        Self {
            resolver: DemandShortageResolver::new(),
        }
    }

    /// 本卡之后 (工序序号更大) 的待执行工序卡贡献量之和
    ///
    /// 扫描顺序为工序序号降序, 遇到本卡即停止; 本卡上游的工序卡不计入
    pub fn queued_after(&self, card_id: &str, open_cards: &[JobCardSummary]) -> f64 {
        let mut queued = 0.0;
        for other in open_cards {
            if other.job_card_id == card_id {
                break;
            }
            queued += other.contribution();
        }
        queued
    }

    /// 计算优先级依据 (纯函数)
    pub fn resolve_basis(
        &self,
        item: &Item,
        position: &StockPosition,
        card: &JobCard,
        open_cards: &[JobCardSummary],
    ) -> PriorityBasis {
        let assessment = self.resolver.assess(item, position);

        match assessment.class {
            DemandClass::MadeToOrder => PriorityBasis::SalesOrder {
                produced_qty: card.for_quantity,
                short_qty: card.for_quantity,
            },
            DemandClass::SalesShort => {
                let queued = self.queued_after(&card.job_card_id, open_cards);
                let residual = assessment.shortage - position.on_purchase_order_qty - queued;
                if residual > 0.0 {
                    PriorityBasis::SalesOrder {
                        produced_qty: card.for_quantity.max(card.available_qty),
                        short_qty: residual,
                    }
                } else {
                    PriorityBasis::StockProduction { queued_qty: queued }
                }
            }
            DemandClass::StockBuilding => PriorityBasis::StockProduction {
                queued_qty: self.queued_after(&card.job_card_id, open_cards),
            },
        }
    }

    /// 计算优先级
    #[tracing::instrument(skip(self, oracle, item, position, card, open_cards), fields(job_card = %card.job_card_id))]
    pub fn priority(
        &self,
        oracle: &dyn PriorityOracle,
        item: &Item,
        position: &StockPosition,
        card: &JobCard,
        open_cards: &[JobCardSummary],
    ) -> anyhow::Result<i32> {
        let basis = self.resolve_basis(item, position, card, open_cards);
        tracing::debug!(?basis, "优先级依据");

        match basis {
            PriorityBasis::SalesOrder {
                produced_qty,
                short_qty,
            } => oracle.sales_order_priority(
                item,
                produced_qty,
                short_qty,
                card.sales_order_line.as_deref(),
            ),
            PriorityBasis::StockProduction { queued_qty } => {
                oracle.stock_production_priority(item, position, queued_qty)
            }
        }
    }

    /// 回写优先级, 仅在变化时修改; 返回是否发生变化
    pub fn apply(&self, card: &mut JobCard, priority: i32) -> bool {
        if card.priority == priority {
            return false;
        }
        card.priority = priority;
        true
    }

    /// 物料内排序: 优先级升序, 并列时工序序号降序
    pub fn sort_rankings(&self, rankings: &mut [ItemRanking]) {
        rankings.sort_by(|a, b| match a.priority.cmp(&b.priority) {
            Ordering::Equal => b.operation_seq_no.cmp(&a.operation_seq_no),
            other => other,
        });
    }
}

/// 物料内排序结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRanking {
    pub job_card_id: String,
    pub operation_seq_no: u32,
    pub priority: i32,
    pub changed: bool,
}
