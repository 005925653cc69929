// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库初始化、内存协作方、工艺单构造
// ==========================================
#![allow(dead_code)]

use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{NaiveDate, NaiveDateTime};
use production_dispatch::api::{Collaborators, DispatchApi};
use production_dispatch::config::DispatchSettings;
use production_dispatch::domain::item::{
    Item, Location, OperationInfo, StockPosition, UnitOfMeasure, Workstation,
};
use production_dispatch::domain::job_card::RawMaterialLine;
use production_dispatch::domain::routing::{OperationStep, RoutingInstance, RoutingTemplate, SiblingStep};
use production_dispatch::domain::types::LocationType;
use production_dispatch::engine::collaborators::{ItemCatalog, PriorityOracle, RoutingRepository, StockLedger};
use production_dispatch::engine::notify::CollectingNotifier;
use production_dispatch::repository::JobCardRepository;
use rusqlite::Connection;
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = Connection::open(&db_path)?;
    production_dispatch::db::init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 2024-03-01 的指定时刻
pub fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

// ==========================================
// 内存物料目录
// ==========================================
#[derive(Default)]
pub struct FakeCatalog {
    pub items: HashMap<String, Item>,
    pub operations: HashMap<String, OperationInfo>,
    pub workstations: HashMap<String, Workstation>,
    pub locations: HashMap<String, Location>,
    pub uoms: HashMap<String, UnitOfMeasure>,
}

impl FakeCatalog {
    pub fn with_item(mut self, item: Item) -> Self {
        self.items.insert(item.item_code.clone(), item);
        self
    }

    pub fn with_operation(mut self, operation: &str, check_overlap: bool) -> Self {
        self.operations.insert(
            operation.to_string(),
            OperationInfo {
                operation: operation.to_string(),
                check_overlap_for_machines: check_overlap,
                ..Default::default()
            },
        );
        self
    }

    pub fn with_workstation(mut self, workstation: &str, capacity: u32) -> Self {
        self.workstations.insert(
            workstation.to_string(),
            Workstation::new(workstation).with_capacity(capacity),
        );
        self
    }

    pub fn with_location(mut self, location: &str, location_type: LocationType) -> Self {
        self.locations.insert(
            location.to_string(),
            Location {
                location: location.to_string(),
                location_type,
            },
        );
        self
    }

    pub fn with_uom(mut self, item_code: &str, uom: UnitOfMeasure) -> Self {
        self.uoms.insert(item_code.to_string(), uom);
        self
    }
}

impl ItemCatalog for FakeCatalog {
    fn get_item(&self, item_code: &str) -> anyhow::Result<Item> {
        self.items
            .get(item_code)
            .cloned()
            .ok_or_else(|| anyhow!("物料不存在: {}", item_code))
    }

    fn get_operation(&self, operation: &str) -> anyhow::Result<OperationInfo> {
        Ok(self.operations.get(operation).cloned().unwrap_or(OperationInfo {
            operation: operation.to_string(),
            ..Default::default()
        }))
    }

    fn get_workstation(&self, workstation: &str) -> anyhow::Result<Workstation> {
        self.workstations
            .get(workstation)
            .cloned()
            .ok_or_else(|| anyhow!("工位不存在: {}", workstation))
    }

    fn get_location(&self, location: &str) -> anyhow::Result<Location> {
        self.locations
            .get(location)
            .cloned()
            .ok_or_else(|| anyhow!("库位不存在: {}", location))
    }

    fn get_uom(&self, item_code: &str) -> anyhow::Result<UnitOfMeasure> {
        Ok(self
            .uoms
            .get(item_code)
            .cloned()
            .unwrap_or_else(|| UnitOfMeasure::new("Nos", 0.0)))
    }
}

// ==========================================
// 内存库存台账
// ==========================================
#[derive(Default)]
pub struct FakeStock {
    pub positions: HashMap<String, StockPosition>,
    pub bins: HashMap<(String, String), f64>,
    pub sales_lines: HashMap<String, f64>,
    pub subcontract_received: f64,
}

impl FakeStock {
    pub fn with_bin(mut self, item_code: &str, location: &str, qty: f64) -> Self {
        self.bins.insert((item_code.to_string(), location.to_string()), qty);
        self
    }

    pub fn with_position(mut self, item_code: &str, position: StockPosition) -> Self {
        self.positions.insert(item_code.to_string(), position);
        self
    }

    pub fn with_sales_line(mut self, line: &str, qty: f64) -> Self {
        self.sales_lines.insert(line.to_string(), qty);
        self
    }
}

impl StockLedger for FakeStock {
    fn get_stock_position(&self, item_code: &str) -> anyhow::Result<StockPosition> {
        Ok(self.positions.get(item_code).cloned().unwrap_or_default())
    }

    fn bin_actual_qty(&self, item_code: &str, location: &str) -> anyhow::Result<f64> {
        Ok(self
            .bins
            .get(&(item_code.to_string(), location.to_string()))
            .copied()
            .unwrap_or(0.0))
    }

    fn sales_line_qty(&self, sales_order_line: &str) -> anyhow::Result<f64> {
        Ok(self.sales_lines.get(sales_order_line).copied().unwrap_or(0.0))
    }

    fn subcontract_received_qty(
        &self,
        _item_code: &str,
        _sales_order_line: Option<&str>,
        _location: &str,
    ) -> anyhow::Result<f64> {
        Ok(self.subcontract_received)
    }
}

// ==========================================
// 内存工艺单仓储
// ==========================================
#[derive(Default)]
pub struct FakeRoutings {
    pub routings: HashMap<String, RoutingInstance>,
    pub templates: HashMap<String, RoutingTemplate>,
    pub siblings: HashMap<(String, String), Vec<SiblingStep>>,
}

impl FakeRoutings {
    pub fn with_routing(mut self, routing: RoutingInstance) -> Self {
        self.routings.insert(routing.routing_id.clone(), routing);
        self
    }

    pub fn with_template(mut self, template: RoutingTemplate) -> Self {
        self.templates.insert(template.template_id.clone(), template);
        self
    }

    pub fn with_siblings(mut self, item_code: &str, operation: &str, siblings: Vec<SiblingStep>) -> Self {
        self.siblings
            .insert((item_code.to_string(), operation.to_string()), siblings);
        self
    }
}

impl RoutingRepository for FakeRoutings {
    fn get_routing_instance(&self, routing_id: &str) -> anyhow::Result<RoutingInstance> {
        self.routings
            .get(routing_id)
            .cloned()
            .ok_or_else(|| anyhow!("工艺单不存在: {}", routing_id))
    }

    fn get_template(&self, template_id: &str) -> anyhow::Result<Option<RoutingTemplate>> {
        Ok(self.templates.get(template_id).cloned())
    }

    fn pending_sibling_steps(
        &self,
        item_code: &str,
        operation: &str,
        _sales_order_line: Option<&str>,
    ) -> anyhow::Result<Vec<SiblingStep>> {
        Ok(self
            .siblings
            .get(&(item_code.to_string(), operation.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

// ==========================================
// 优先级函数
// ==========================================
// 销售缺口: 缺口越大优先级越高 (数值越小); 备库: 排队越多优先级越低
pub struct FakeOracle;

impl PriorityOracle for FakeOracle {
    fn sales_order_priority(
        &self,
        _item: &Item,
        _produced_qty: f64,
        short_qty: f64,
        _sales_order_line: Option<&str>,
    ) -> anyhow::Result<i32> {
        Ok((1000.0 - short_qty).max(1.0) as i32)
    }

    fn stock_production_priority(
        &self,
        _item: &Item,
        _position: &StockPosition,
        queued_qty: f64,
    ) -> anyhow::Result<i32> {
        Ok(2000 + queued_qty as i32)
    }
}

// ==========================================
// 工艺单构造
// ==========================================

/// 两道工序: CUT (WIP-A -> WIP-B 仅转移) -> GRIND (消耗原材料)
pub fn two_step_routing(routing_id: &str, item_code: &str, rm_items: &[&str]) -> RoutingInstance {
    let mut cut = OperationStep::new(format!("{}-1", routing_id), 1, "CUT");
    cut.source_location = Some("WIP-A".to_string());
    cut.target_location = Some("WIP-B".to_string());
    cut.planned_qty = 100.0;

    let mut grind = OperationStep::new(format!("{}-2", routing_id), 2, "GRIND");
    grind.consumes_rm = true;
    grind.source_location = Some("WIP-B".to_string());
    grind.planned_qty = 100.0;

    RoutingInstance {
        routing_id: routing_id.to_string(),
        production_item: item_code.to_string(),
        sales_order_line: None,
        template_id: None,
        operations: vec![cut, grind],
        raw_materials: rm_items.iter().map(|code| RawMaterialLine::new(*code, 10.0)).collect(),
    }
}

/// 测试环境
pub struct TestEnv {
    pub _temp_file: NamedTempFile,
    pub api: Arc<DispatchApi>,
    pub repo: Arc<JobCardRepository>,
    pub notifier: Arc<CollectingNotifier>,
}

/// 创建测试环境
pub fn setup_env(
    catalog: FakeCatalog,
    stock: FakeStock,
    routings: FakeRoutings,
    settings: DispatchSettings,
) -> TestEnv {
    let (temp_file, db_path) = create_test_db().unwrap();
    let repo = Arc::new(JobCardRepository::new(&db_path).unwrap());
    let notifier = Arc::new(CollectingNotifier::new());

    let collaborators = Collaborators {
        catalog: Arc::new(catalog),
        stock: Arc::new(stock),
        routings: Arc::new(routings),
        oracle: Arc::new(FakeOracle),
    };
    let api = Arc::new(DispatchApi::new(
        collaborators,
        repo.clone(),
        settings,
        notifier.clone(),
    ));

    TestEnv {
        _temp_file: temp_file,
        api,
        repo,
        notifier,
    }
}
