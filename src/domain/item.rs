// ==========================================
// 生产派工核心 - 物料/库存领域模型
// ==========================================
// 职责: 物料主数据快照、库存头寸、工位/库位/计量单位
// 红线: 一次派工决策期间视为不可变, 库存头寸每次重新读取, 不跨调用缓存
// ==========================================

use crate::domain::types::LocationType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// Item - 物料
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub item_code: String,
    pub made_to_order: bool,   // 按单生产
    pub sales_job_work: bool,  // 客供来料加工（首工序可用量 = 订单行数量）
    /// 数值属性 (公式变量绑定, 例如 oal_mm / d1_mm)
    #[serde(default)]
    pub attributes: HashMap<String, f64>,
}

impl Item {
    pub fn new(item_code: impl Into<String>) -> Self {
        Self {
            item_code: item_code.into(),
            made_to_order: false,
            sales_job_work: false,
            attributes: HashMap::new(),
        }
    }

    pub fn made_to_order(mut self) -> Self {
        self.made_to_order = true;
        self
    }

    pub fn sales_job_work(mut self) -> Self {
        self.sales_job_work = true;
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: f64) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// 读取长度/重量类度量字段, 缺失按 0 处理
    pub fn measure(&self, field: &str) -> f64 {
        self.attributes.get(field).copied().unwrap_or(0.0)
    }
}

// ==========================================
// OperationInfo - 工序主数据
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationInfo {
    pub operation: String,
    pub is_subcontracting: bool,              // 委外工序
    pub subcontracting_location: Option<String>,
    pub check_overlap_for_machines: bool,     // 工序级时段冲突检查开关
}

// ==========================================
// Workstation - 工位（资源）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workstation {
    pub workstation: String,
    /// 同时可容纳的重叠时段数 (默认 1)
    pub production_capacity: u32,
}

impl Workstation {
    pub fn new(workstation: impl Into<String>) -> Self {
        Self {
            workstation: workstation.into(),
            production_capacity: 1,
        }
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.production_capacity = capacity;
        self
    }

    /// 有效容量, 0 视为 1
    pub fn effective_capacity(&self) -> usize {
        self.production_capacity.max(1) as usize
    }
}

// ==========================================
// Location - 库位
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub location: String,
    pub location_type: LocationType,
}

// ==========================================
// UnitOfMeasure - 计量单位
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitOfMeasure {
    pub uom: String,
    /// 允许偏差 (百分比, 10 表示 10%)
    pub variance_allowed_pct: f64,
    /// 是否必须为整数
    pub must_be_whole_number: bool,
}

impl UnitOfMeasure {
    pub fn new(uom: impl Into<String>, variance_allowed_pct: f64) -> Self {
        Self {
            uom: uom.into(),
            variance_allowed_pct,
            must_be_whole_number: false,
        }
    }

    pub fn whole_number(mut self) -> Self {
        self.must_be_whole_number = true;
        self
    }

    /// 按计量单位精度换算数量
    pub fn convert(&self, qty: f64) -> f64 {
        if self.must_be_whole_number {
            qty.round()
        } else {
            (qty * 1_000.0).round() / 1_000.0
        }
    }
}

// ==========================================
// StockPosition - 库存头寸
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockPosition {
    pub on_sales_order_qty: f64,      // 销售订单未交
    pub on_purchase_order_qty: f64,   // 采购/委外在途
    pub planned_production_qty: f64,  // 计划生产
    pub finished_qty: f64,            // 成品库存
    pub wip_qty: f64,                 // 在制
    pub dead_stock_qty: f64,          // 呆滞库存
    pub reserved_for_production_qty: f64,
}
