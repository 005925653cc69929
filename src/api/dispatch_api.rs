// ==========================================
// 生产派工系统 - 派工 API
// ==========================================
// 职责: 编排 去重 -> 数量平衡 -> 时段准入 -> 公差校验, 以及按需优先级排序
// 并发:
// - (物料, 工序[, 销售行]) 键串行化 查找-创建
// - 工位键串行化 时段 检查-登记
// - 工序卡回写使用 revision 乐观锁
// ==========================================

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiResult;
use crate::config::{ConfigManager, DispatchSettings};
use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::actor::{Actor, Permission};
use crate::domain::item::{Item, OperationInfo};
use crate::domain::job_card::{JobCard, TimeInterval};
use crate::domain::routing::{FormulaMode, RoutingInstance, RoutingTemplate};
use crate::domain::types::{DocEvent, DocState, Severity};
use crate::engine::collaborators::{ItemCatalog, PriorityOracle, RoutingRepository, StockLedger};
use crate::engine::duplicate::{DuplicateDetector, RepeatReport};
use crate::engine::error::{DispatchError, DispatchResult};
use crate::engine::formula::{Bindings, CompiledTemplate};
use crate::engine::interval::{IntervalScheduler, OverlapMode, ProposedInterval};
use crate::engine::locks::KeyedLocks;
use crate::engine::notify::Notifier;
use crate::engine::priority::{ItemRanking, PriorityEngine};
use crate::engine::reconcile::{QuantityReconciler, UpstreamSnapshot};
use crate::engine::routing_rules::RoutingRules;
use crate::engine::status::JobCardStateMachine;
use crate::engine::time_log::{ProducedQtyBand, TimeLogContext, TimeLogValidator};
use crate::engine::tolerance::{LengthInputs, ToleranceValidator, WastageReport};
use crate::engine::violation::{enforce, enforce_all, enforce_as, Bypass, Violation};
use crate::i18n::{message_time, t_with_args};
use crate::repository::error::RepositoryError;
use crate::repository::job_card_repo::JobCardRepository;

// ==========================================
// 外部协作方集合
// ==========================================
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn ItemCatalog>,
    pub stock: Arc<dyn StockLedger>,
    pub routings: Arc<dyn RoutingRepository>,
    pub oracle: Arc<dyn PriorityOracle>,
}

/// 工序卡申请
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCardRequest {
    pub routing_id: String,
    pub operation: String,
    pub step_id: Option<String>,
    /// <= 0 时取步骤的 计划 - 已完成
    pub quantity: f64,
}

/// 工序卡申请结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobCardOutcome {
    /// 并入已有待执行工序卡
    Merged {
        job_card_id: String,
        candidates: Vec<String>,
    },
    /// 新建工序卡
    Created(JobCard),
}

impl JobCardOutcome {
    pub fn job_card_id(&self) -> &str {
        match self {
            JobCardOutcome::Merged { job_card_id, .. } => job_card_id,
            JobCardOutcome::Created(card) => &card.job_card_id,
        }
    }
}

/// 工时录入请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeEntryRequest {
    pub job_card_id: String,
    /// 调用方读取时的修订号
    pub revision: i32,
    pub employee: Option<String>,
    pub workstation: Option<String>,
    pub time_logs: Vec<TimeInterval>,
    /// 手工过账时间; None 时取最晚结束时间
    pub posting_time: Option<NaiveDateTime>,
    pub short_close: bool,
    /// 请求跳过时段准入
    pub bypass_time_logs: bool,
}

/// 已编译模板缓存项
struct CachedTemplate {
    template: RoutingTemplate,
    compiled: CompiledTemplate,
}

// ==========================================
// DispatchApi - 派工 API
// ==========================================
pub struct DispatchApi {
    collaborators: Collaborators,
    job_card_repo: Arc<JobCardRepository>,
    settings: DispatchSettings,
    notifier: Arc<dyn Notifier>,
    locks: KeyedLocks,
    templates: DashMap<String, Arc<CachedTemplate>>,

    // 无状态引擎
    detector: DuplicateDetector,
    reconciler: QuantityReconciler,
    priority_engine: PriorityEngine,
    scheduler: IntervalScheduler,
    tolerance: ToleranceValidator,
    state_machine: JobCardStateMachine,
    time_log: TimeLogValidator,
    routing_rules: RoutingRules,
}

impl DispatchApi {
    /// 创建新的DispatchApi实例
    pub fn new(
        collaborators: Collaborators,
        job_card_repo: Arc<JobCardRepository>,
        settings: DispatchSettings,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            collaborators,
            job_card_repo,
            settings,
            notifier,
            locks: KeyedLocks::new(),
            templates: DashMap::new(),
            detector: DuplicateDetector::new(),
            reconciler: QuantityReconciler::new(),
            priority_engine: PriorityEngine::new(),
            scheduler: IntervalScheduler::new(),
            tolerance: ToleranceValidator::new(),
            state_machine: JobCardStateMachine::new(),
            time_log: TimeLogValidator::new(),
            routing_rules: RoutingRules::new(),
        }
    }

    /// 打开数据库并按 config_kv 中的配置创建实例
    ///
    /// 工序卡仓储与配置管理共用同一连接
    pub fn open(db_path: &str, collaborators: Collaborators, notifier: Arc<dyn Notifier>) -> ApiResult<Self> {
        let conn = open_sqlite_connection(db_path).map_err(RepositoryError::from)?;
        init_schema(&conn).map_err(RepositoryError::from)?;
        let conn = Arc::new(Mutex::new(conn));

        let config = ConfigManager::from_connection(conn.clone())?;
        let settings = config.load_settings()?;
        tracing::info!(db_path, config = %config.snapshot_json()?, "派工配置快照");

        let job_card_repo = Arc::new(JobCardRepository::from_connection(conn));
        Ok(Self::new(collaborators, job_card_repo, settings, notifier))
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// 按角色解析操作人
    pub fn resolve_actor(&self, user_id: &str, roles: &[String]) -> Actor {
        Actor::from_roles(user_id, roles, &self.settings.bypass_role)
    }

    // ==========================================
    // 工艺单
    // ==========================================

    /// 读取工艺单并规范化、校验结构
    pub fn load_routing(&self, routing_id: &str) -> ApiResult<RoutingInstance> {
        let mut routing = self.collaborators.routings.get_routing_instance(routing_id)?;
        let catalog = &self.collaborators.catalog;
        let operation_info = |op: &str| -> DispatchResult<OperationInfo> { Ok(catalog.get_operation(op)?) };

        self.routing_rules.normalize(&mut routing, operation_info)?;
        let cached = match routing.template_id.as_deref() {
            Some(id) => self.cached_template(id)?,
            None => None,
        };
        self.routing_rules
            .validate(&routing, cached.as_ref().map(|c| &c.template), operation_info)?;
        Ok(routing)
    }

    /// 模板编译缓存 (每个模板只编译一次)
    fn cached_template(&self, template_id: &str) -> ApiResult<Option<Arc<CachedTemplate>>> {
        if let Some(hit) = self.templates.get(template_id) {
            return Ok(Some(Arc::clone(hit.value())));
        }
        let Some(template) = self.collaborators.routings.get_template(template_id)? else {
            return Ok(None);
        };
        let compiled = CompiledTemplate::compile(&template)?;
        let entry = Arc::new(CachedTemplate { template, compiled });
        self.templates.insert(template_id.to_string(), Arc::clone(&entry));
        Ok(Some(entry))
    }

    // ==========================================
    // 工序卡申请 (去重 + 新建)
    // ==========================================

    /// 申请工序卡: 有可合并的待执行工序卡时并入, 否则新建
    #[tracing::instrument(skip(self, request), fields(routing = %request.routing_id, operation = %request.operation))]
    pub fn request_job_card(&self, request: &JobCardRequest) -> ApiResult<JobCardOutcome> {
        let routing = self.load_routing(&request.routing_id)?;
        let step = routing
            .locate_step(request.step_id.as_deref(), &request.operation)
            .ok_or_else(|| DispatchError::NotInRouting {
                operation: request.operation.clone(),
                routing_id: routing.routing_id.clone(),
            })?;
        let item = self.collaborators.catalog.get_item(&routing.production_item)?;
        let sales_order_line = routing.sales_order_line.as_deref();

        let mut key_parts = vec![item.item_code.as_str(), step.operation.as_str()];
        if item.made_to_order {
            key_parts.push(sales_order_line.unwrap_or_default());
        }
        let key = KeyedLocks::key(&key_parts);

        self.locks.with_lock(&key, || {
            let candidates = self
                .job_card_repo
                .find_pending(&item.item_code, &step.operation)?;
            let existing =
                self.detector
                    .find_existing(&item, &step.operation, &routing, sales_order_line, &candidates);

            if let Some(first) = existing.first() {
                let message = t_with_args(
                    "dispatch.job_card_merged",
                    &[
                        ("job_card", first),
                        ("item", &item.item_code),
                        ("operation", &step.operation),
                    ],
                );
                self.notifier.notify(&message, Severity::Info);
                tracing::info!(job_card = %first, candidates = existing.len(), "并入已有工序卡");
                return Ok(JobCardOutcome::Merged {
                    job_card_id: first.clone(),
                    candidates: existing.clone(),
                });
            }

            let mut card = JobCard::from_routing_step(&routing, step, request.quantity);
            self.state_machine.apply(&mut card);
            self.job_card_repo.insert(&card)?;

            let message = t_with_args("dispatch.job_card_created", &[("job_card", &card.job_card_id)]);
            self.notifier.notify(&message, Severity::Info);
            tracing::info!(job_card = %card.job_card_id, for_quantity = card.for_quantity, "新建工序卡");
            Ok(JobCardOutcome::Created(card))
        })
    }

    // ==========================================
    // 派生字段刷新 (数量平衡 + 状态 + 齐套)
    // ==========================================

    /// 刷新工序卡的系统派生字段并回写
    #[tracing::instrument(skip(self))]
    pub fn refresh_job_card(&self, job_card_id: &str) -> ApiResult<JobCard> {
        let mut card = self.job_card_repo.get(job_card_id)?;
        let routing = self.load_routing(&card.routing_id)?;
        let item = self.collaborators.catalog.get_item(&card.production_item)?;

        let position = self.state_machine.locate(&routing, &card);
        card.operation_seq_no = position.sequence_no;
        card.final_step = position.final_step;

        let available = self.available_quantity(&routing, &card, &item)?;
        let siblings = self.collaborators.routings.pending_sibling_steps(
            &card.production_item,
            &card.operation,
            card.sales_order_line.as_deref(),
        )?;
        let balanced = self.reconciler.balance_target_qty(&card, &siblings, available);
        card.available_qty = available;
        card.for_quantity = balanced.for_quantity;
        card.total_qty = balanced.total_qty;

        self.refresh_rm_lines(&routing, &item, &mut card)?;
        let readiness = self.state_machine.rm_readiness(&card);
        card.rm_status_pct = readiness.percent;
        card.rm_shortage = readiness.shortage;
        self.state_machine.apply(&mut card);

        card.revision = self.job_card_repo.update(&card)?;
        tracing::debug!(
            available,
            total_qty = card.total_qty,
            status = %card.status,
            "工序卡派生字段已刷新"
        );
        Ok(card)
    }

    /// 工序卡源库位的可用数量
    fn available_quantity(&self, routing: &RoutingInstance, card: &JobCard, item: &Item) -> ApiResult<f64> {
        let Some(source) = card.source_location.as_deref() else {
            return Ok(0.0);
        };
        let stock = &self.collaborators.stock;

        if let Some(line) = card.sales_order_line.as_deref() {
            let upstream = UpstreamSnapshot {
                finalized: self.job_card_repo.finalized_for_sales_line(line)?,
                sales_line_qty: stock.sales_line_qty(line)?,
                subcontract_received_qty: stock.subcontract_received_qty(&card.production_item, Some(line), source)?,
            };
            let qty = self.reconciler.made_to_stock_qty(routing, card, item, &upstream)?;
            return Ok(self.reconciler.available_quantity(card, Some(qty), 0.0));
        }

        let bin_qty = stock.bin_actual_qty(&card.production_item, source)?;
        Ok(self.reconciler.available_quantity(card, None, bin_qty))
    }

    /// 原材料行: 可用/计算数量/预计可用
    fn refresh_rm_lines(&self, routing: &RoutingInstance, fg: &Item, card: &mut JobCard) -> ApiResult<()> {
        if !card.consumes_rm || card.raw_materials.is_empty() {
            return Ok(());
        }
        let cached = match routing.template_id.as_deref() {
            Some(id) => self.cached_template(id)?,
            None => None,
        };
        let fg_qty = card.for_quantity;
        let default_source = card.source_location.clone();

        for line in card.raw_materials.iter_mut() {
            line.qty_available = match line.source_location.as_deref().or(default_source.as_deref()) {
                Some(loc) => self.collaborators.stock.bin_actual_qty(&line.item_code, loc)?,
                None => 0.0,
            };
            let calculated = match cached.as_ref() {
                Some(c) => {
                    let rm = self.collaborators.catalog.get_item(&line.item_code)?;
                    let bindings = rm_bindings(fg, fg_qty, &rm, line.qty);
                    c.compiled.calculated_qty(&bindings)?
                }
                None => None,
            };
            line.calculated_qty = calculated.unwrap_or(line.qty);
            line.projected_qty = line.qty_available - line.calculated_qty;
        }
        Ok(())
    }

    // ==========================================
    // 工时录入 (时段准入)
    // ==========================================

    /// 录入工时行: 校验、派生合计、按工位串行准入后回写
    #[tracing::instrument(skip(self, request, actor), fields(job_card = %request.job_card_id, user = %actor.user_id))]
    pub fn record_time_entries(
        &self,
        request: &TimeEntryRequest,
        actor: &Actor,
        now: NaiveDateTime,
    ) -> ApiResult<JobCard> {
        let mut card = self.job_card_repo.get(&request.job_card_id)?;
        if card.doc_state != DocState::Draft {
            return Err(DispatchError::BusinessRuleViolation(t_with_args(
                "dispatch.card_finalized",
                &[("job_card", &card.job_card_id), ("state", card.doc_state.to_db_str())],
            )));
        }
        card.revision = request.revision;
        if request.employee.is_some() {
            card.employee = request.employee.clone();
        }
        if request.workstation.is_some() {
            card.workstation = request.workstation.clone();
        }
        card.time_logs = request.time_logs.clone();
        card.short_close = request.short_close;
        card.manual_posting = request.posting_time.is_some();
        if request.posting_time.is_some() {
            card.posting_time = request.posting_time;
        }

        let catalog = &self.collaborators.catalog;
        let operation = catalog.get_operation(&card.operation)?;
        let bypass = Bypass {
            requested: request.bypass_time_logs,
            permission: Permission::BypassTimeLogs,
            actor,
        };
        let bypassed = bypass.authorize()?;
        if bypassed {
            tracing::warn!("工时校验已放行, 时段冲突降级为警告");
        }

        let ctx = TimeLogContext {
            now,
            future_time_mins: self.settings.future_time_mins,
            admission_required: self.time_log.admission_required(
                self.settings.check_overlap_for_machines,
                operation.check_overlap_for_machines,
                bypassed,
            ),
            check_overlap: self
                .time_log
                .overlap_enabled(self.settings.check_overlap_for_machines, operation.check_overlap_for_machines),
            is_subcontracting: operation.is_subcontracting,
        };
        let proposals = self.time_log.validate(&mut card, &ctx)?;
        self.time_log
            .recompute_totals(&mut card, actor, |loc| Ok(catalog.get_location(loc)?.location_type))?;
        self.time_log.check_produced_qty(
            &card,
            &ProducedQtyBand {
                short_close_lower_pct: self.settings.short_close_lower_pct,
                over_production_upper_pct: self.settings.over_production_upper_pct,
            },
        )?;
        self.state_machine.apply(&mut card);

        if proposals.is_empty() {
            card.revision = self.job_card_repo.update(&card)?;
            return Ok(card);
        }

        // 按行工位分组, 每个工位各自的产能与已占用时段
        let mut by_workstation: BTreeMap<String, Vec<(u32, ProposedInterval)>> = BTreeMap::new();
        for (row, proposed) in proposals {
            if let Some(ws) = proposed.workstation.clone() {
                by_workstation.entry(ws).or_default().push((row, proposed));
            }
        }
        let mut groups = Vec::with_capacity(by_workstation.len());
        for (ws, rows) in by_workstation {
            let capacity = self.resource_capacity(&ws)?;
            groups.push((ws, capacity, rows));
        }
        let keys: Vec<String> = groups
            .iter()
            .map(|(ws, _, _)| KeyedLocks::key(&["workstation", ws]))
            .collect();

        self.locks.with_locks(&keys, || {
            for (workstation, capacity, rows) in &groups {
                let committed = self.job_card_repo.committed_intervals(workstation)?;
                for (row, proposed) in rows {
                    let Some(conflict) =
                        self.scheduler
                            .check_overlap(proposed, &committed, *capacity, OverlapMode::Strict)
                    else {
                        continue;
                    };
                    let violation = Violation::new(
                        "time_log.interval_conflict",
                        &[
                            ("row", &row.to_string()),
                            ("workstation", workstation),
                            ("job_card", &conflict.job_card_id),
                            ("to", &message_time(&conflict.to_time)),
                        ],
                    );
                    let error = DispatchError::IntervalConflict {
                        row: *row,
                        conflicting_job_card: conflict.job_card_id,
                        conflicting_to: conflict.to_time,
                    };
                    enforce_as(violation, error, &bypass, self.notifier.as_ref())?;
                }
                tracing::info!(workstation = %workstation, rows = rows.len(), capacity, "时段准入通过");
            }
            card.revision = self.job_card_repo.update(&card)?;
            Ok(card)
        })
    }

    /// 工位容量; 未配置 (0) 时取默认容量
    fn resource_capacity(&self, workstation: &str) -> ApiResult<usize> {
        let ws = self.collaborators.catalog.get_workstation(workstation)?;
        if ws.production_capacity == 0 {
            return Ok(self.settings.default_resource_capacity.max(1) as usize);
        }
        Ok(ws.effective_capacity())
    }

    // ==========================================
    // 数量公差校验
    // ==========================================

    /// 按工艺模板校验上报数量; 授权放行时违规降级为警告
    ///
    /// # 返回
    /// - Ok(Some(report)): 长度守恒模式下的损耗计算结果
    /// - Ok(None): 固定比例模式或无模板
    #[tracing::instrument(skip(self, actor), fields(user = %actor.user_id))]
    pub fn validate_quantities(
        &self,
        job_card_id: &str,
        bypass_requested: bool,
        actor: &Actor,
    ) -> ApiResult<Option<WastageReport>> {
        let card = self.job_card_repo.get(job_card_id)?;
        let routing = self.load_routing(&card.routing_id)?;
        let Some(template_id) = routing.template_id.as_deref() else {
            return Ok(None);
        };
        let Some(cached) = self.cached_template(template_id)? else {
            return Err(DispatchError::DataIntegrityFault(format!(
                "工艺单 {} 引用的模板 {} 不存在",
                routing.routing_id, template_id
            )));
        };

        let catalog = &self.collaborators.catalog;
        let bypass = Bypass {
            requested: bypass_requested,
            permission: Permission::BypassQuantityCheck,
            actor,
        };
        let fg = catalog.get_item(&card.production_item)?;
        let fg_qty = card.processed_qty();

        let mut rm_items = Vec::with_capacity(card.raw_materials.len());
        for line in &card.raw_materials {
            rm_items.push(catalog.get_item(&line.item_code)?);
        }

        // 原材料限制规则与固定比例数量
        for (idx, (line, rm)) in card.raw_materials.iter().zip(rm_items.iter()).enumerate() {
            let row = (idx + 1) as u32;
            let bindings = rm_bindings(&fg, fg_qty, rm, line.qty);
            let violations = self
                .tolerance
                .check_rm_rules(&cached.compiled, row, &line.item_code, &bindings)?;
            enforce_all(violations, &bypass, self.notifier.as_ref())?;

            if cached.template.formula_mode == FormulaMode::Ratio {
                if let Some(calculated) = cached.compiled.calculated_qty(&bindings)? {
                    let uom = catalog.get_uom(&line.item_code)?;
                    if let Some(v) = self
                        .tolerance
                        .check_ratio(row, &line.item_code, line.qty, calculated, &uom)
                    {
                        enforce(v, &bypass, self.notifier.as_ref())?;
                    }
                }
            }
        }

        if cached.template.formula_mode == FormulaMode::Ratio {
            return Ok(None);
        }

        let mut produced_items = Vec::with_capacity(card.produced_items.len());
        for line in &card.produced_items {
            produced_items.push((catalog.get_item(&line.item_code)?, line.qty));
        }
        let inputs = LengthInputs {
            finished: (&fg, fg_qty),
            raw_materials: card
                .raw_materials
                .iter()
                .zip(rm_items.iter())
                .map(|(line, item)| (item, line.qty))
                .collect(),
            produced: produced_items.iter().map(|(item, qty)| (item, *qty)).collect(),
        };
        let uom = catalog.get_uom(&card.production_item)?;
        let report = self.tolerance.measure_wastage(&cached.template.formula_mode, &inputs)?;
        if let Some(v) = self
            .tolerance
            .check_length(&cached.template.formula_mode, &inputs, &uom)?
        {
            enforce(v, &bypass, self.notifier.as_ref())?;
        }
        Ok(Some(report))
    }

    // ==========================================
    // 优先级
    // ==========================================

    /// 计算单张工序卡的优先级, 变化时回写
    #[tracing::instrument(skip(self))]
    pub fn rank_priority(&self, job_card_id: &str) -> ApiResult<i32> {
        let mut card = self.job_card_repo.get(job_card_id)?;
        let item = self.collaborators.catalog.get_item(&card.production_item)?;
        let position = self.collaborators.stock.get_stock_position(&card.production_item)?;
        let open_cards = self.job_card_repo.open_for_item(&card.production_item)?;

        let priority = self.priority_engine.priority(
            self.collaborators.oracle.as_ref(),
            &item,
            &position,
            &card,
            &open_cards,
        )?;
        if self.priority_engine.apply(&mut card, priority) {
            self.job_card_repo.update(&card)?;
            tracing::info!(priority, "工序卡优先级已更新");
        }
        Ok(priority)
    }

    /// 重算物料下全部待执行工序卡的优先级, 按 优先级升序 / 工序序号降序 返回
    #[tracing::instrument(skip(self))]
    pub fn rank_item(&self, item_code: &str) -> ApiResult<Vec<ItemRanking>> {
        let item = self.collaborators.catalog.get_item(item_code)?;
        let position = self.collaborators.stock.get_stock_position(item_code)?;
        let cards = self.job_card_repo.open_cards_for_item(item_code)?;
        let summaries: Vec<_> = cards.iter().map(JobCard::summary).collect();

        let mut rankings = Vec::with_capacity(cards.len());
        for mut card in cards {
            let priority = self.priority_engine.priority(
                self.collaborators.oracle.as_ref(),
                &item,
                &position,
                &card,
                &summaries,
            )?;
            let changed = self.priority_engine.apply(&mut card, priority);
            if changed {
                self.job_card_repo.update(&card)?;
            }
            rankings.push(ItemRanking {
                job_card_id: card.job_card_id,
                operation_seq_no: card.operation_seq_no,
                priority,
                changed,
            });
        }

        self.priority_engine.sort_rankings(&mut rankings);
        tracing::info!(cards = rankings.len(), "物料优先级排序完成");
        Ok(rankings)
    }

    // ==========================================
    // 单据状态
    // ==========================================

    /// 单据状态迁移 (保存/提交/取消), 同步重算工序卡状态
    #[tracing::instrument(skip(self))]
    pub fn transition_job_card(&self, job_card_id: &str, event: DocEvent, revision: i32) -> ApiResult<JobCard> {
        let mut card = self.job_card_repo.get(job_card_id)?;
        card.revision = revision;
        card.doc_state = self.state_machine.transition(card.doc_state, event)?;
        self.state_machine.apply(&mut card);
        card.revision = self.job_card_repo.update(&card)?;
        tracing::info!(doc_state = %card.doc_state, status = %card.status, "单据状态已迁移");
        Ok(card)
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 扫描全部待执行工序卡中的重复项
    pub fn find_repeating_job_cards(&self) -> ApiResult<RepeatReport> {
        let pending = self.job_card_repo.list_pending_all()?;

        let item_codes: BTreeSet<&str> = pending.iter().map(|c| c.production_item.as_str()).collect();
        let mut items = HashMap::with_capacity(item_codes.len());
        for code in item_codes {
            items.insert(code.to_string(), self.collaborators.catalog.get_item(code)?);
        }

        let routing_ids: BTreeSet<&str> = pending.iter().map(|c| c.routing_id.as_str()).collect();
        let mut routings = HashMap::with_capacity(routing_ids.len());
        for id in routing_ids {
            routings.insert(id.to_string(), self.collaborators.routings.get_routing_instance(id)?);
        }

        let report = self.detector.find_repeating(&pending, &items, &routings);
        if report.total() > 0 {
            tracing::warn!(
                transfer = report.transfer_duplicates.len(),
                rm = report.rm_duplicates.len(),
                "发现重复工序卡"
            );
        }
        Ok(report)
    }

    /// 下一道工序的待执行工序卡 (末道工序返回空)
    pub fn next_job_cards(&self, job_card_id: &str) -> ApiResult<Vec<String>> {
        let card = self.job_card_repo.get(job_card_id)?;
        let routing = self.collaborators.routings.get_routing_instance(&card.routing_id)?;
        let step = routing
            .locate_step(card.step_id.as_deref(), &card.operation)
            .ok_or_else(|| DispatchError::NotInRouting {
                operation: card.operation.clone(),
                routing_id: routing.routing_id.clone(),
            })?;
        let Some(next) = routing.next_step(step) else {
            return Ok(Vec::new());
        };

        let ids = self
            .job_card_repo
            .find_pending(&routing.production_item, &next.operation)?
            .into_iter()
            .filter(|c| match routing.sales_order_line.as_deref() {
                Some(line) => c.sales_order_line.as_deref() == Some(line),
                None => true,
            })
            .map(|c| c.job_card_id)
            .collect();
        Ok(ids)
    }
}

/// 公式变量: 成品属性 (无前缀) / 原材料属性 (rm_ 前缀) / fg_qty / rm_qty
fn rm_bindings(fg: &Item, fg_qty: f64, rm: &Item, rm_qty: f64) -> Bindings {
    let mut bindings = Bindings::new();
    bindings
        .extend_prefixed("", &fg.attributes)
        .extend_prefixed("rm_", &rm.attributes)
        .set("fg_qty", fg_qty)
        .set("rm_qty", rm_qty);
    bindings
}
