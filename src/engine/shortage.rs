// ==========================================
// 生产派工核心 - 需求缺口计算
// ==========================================
// 职责: 计算单个物料的 销售/库存需求 与 可用+在途供给 之间的缺口
// 输入: 物料 + 当前库存头寸
// 输出: 缺口数量 (>= 0) + 需求分类
// 红线: 缺口一经钳位为 0, 不再向下游传播负数
// ==========================================

use crate::domain::item::{Item, StockPosition};
use serde::{Deserialize, Serialize};

/// 需求分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DemandClass {
    /// 按单生产: 缺口由销售订单行直接驱动
    MadeToOrder,
    /// 缺口超过 在制 + 采购在途, 仍真实短缺
    SalesShort,
    /// 缺口已被在途供给覆盖或无缺口, 归为备库生产
    StockBuilding,
}

/// 缺口评估结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortageAssessment {
    /// max(0, 销售未交 - 成品 - 呆滞)
    pub shortage: f64,
    /// 在制 + 采购在途
    pub covering_supply: f64,
    pub class: DemandClass,
}

impl ShortageAssessment {
    pub fn is_short(&self) -> bool {
        self.class == DemandClass::SalesShort
    }
}

// ==========================================
// DemandShortageResolver - 需求缺口计算器
// ==========================================
#[derive(Debug, Default)]
pub struct DemandShortageResolver {
    // 无状态引擎
}

impl DemandShortageResolver {
    pub fn new() -> Self {
        Self {}
    }

    /// 评估物料缺口
    pub fn assess(&self, item: &Item, position: &StockPosition) -> ShortageAssessment {
        let covering_supply = position.wip_qty + position.on_purchase_order_qty;

        if item.made_to_order {
            return ShortageAssessment {
                shortage: 0.0,
                covering_supply,
                class: DemandClass::MadeToOrder,
            };
        }

        let shortage = (position.on_sales_order_qty
            - position.finished_qty
            - position.dead_stock_qty)
            .max(0.0);

        let class = if shortage > covering_supply {
            DemandClass::SalesShort
        } else {
            DemandClass::StockBuilding
        };

        tracing::debug!(
            item = %item.item_code,
            shortage,
            covering_supply,
            ?class,
            "缺口评估完成"
        );

        ShortageAssessment {
            shortage,
            covering_supply,
            class,
        }
    }
}
