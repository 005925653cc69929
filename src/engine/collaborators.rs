// ==========================================
// 生产派工核心 - 外部协作方接口
// ==========================================
// 职责: 物料目录 / 库存台账 / 工艺单仓储 / 优先级函数
// 说明: 核心只消费事实, 不重新实现; 所有调用返回 anyhow::Result
// 红线: 每次决策重新读取, 不跨调用缓存库存头寸
// ==========================================

use crate::domain::item::{Item, Location, OperationInfo, StockPosition, UnitOfMeasure, Workstation};
use crate::domain::routing::{RoutingInstance, RoutingTemplate, SiblingStep};

/// 物料目录
pub trait ItemCatalog: Send + Sync {
    fn get_item(&self, item_code: &str) -> anyhow::Result<Item>;

    fn get_operation(&self, operation: &str) -> anyhow::Result<OperationInfo>;

    fn get_workstation(&self, workstation: &str) -> anyhow::Result<Workstation>;

    fn get_location(&self, location: &str) -> anyhow::Result<Location>;

    /// 物料的库存计量单位
    fn get_uom(&self, item_code: &str) -> anyhow::Result<UnitOfMeasure>;
}

/// 库存台账
pub trait StockLedger: Send + Sync {
    fn get_stock_position(&self, item_code: &str) -> anyhow::Result<StockPosition>;

    /// 库位实际结存 (Bin)
    fn bin_actual_qty(&self, item_code: &str, location: &str) -> anyhow::Result<f64>;

    /// 销售订单行数量
    fn sales_line_qty(&self, sales_order_line: &str) -> anyhow::Result<f64>;

    /// 委外工序已收货数量 (收入指定库位)
    fn subcontract_received_qty(
        &self,
        item_code: &str,
        sales_order_line: Option<&str>,
        location: &str,
    ) -> anyhow::Result<f64>;
}

/// 工艺单仓储
pub trait RoutingRepository: Send + Sync {
    fn get_routing_instance(&self, routing_id: &str) -> anyhow::Result<RoutingInstance>;

    fn get_template(&self, template_id: &str) -> anyhow::Result<Option<RoutingTemplate>>;

    /// 同物料同工序、已提交且未完工的工艺单步骤 (按创建时间升序)
    fn pending_sibling_steps(
        &self,
        item_code: &str,
        operation: &str,
        sales_order_line: Option<&str>,
    ) -> anyhow::Result<Vec<SiblingStep>>;
}

/// 优先级函数 (排序与并列规则由外部负责)
pub trait PriorityOracle: Send + Sync {
    fn sales_order_priority(
        &self,
        item: &Item,
        produced_qty: f64,
        short_qty: f64,
        sales_order_line: Option<&str>,
    ) -> anyhow::Result<i32>;

    fn stock_production_priority(
        &self,
        item: &Item,
        position: &StockPosition,
        queued_qty: f64,
    ) -> anyhow::Result<i32>;
}
