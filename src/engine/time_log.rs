// ==========================================
// 生产派工核心 - 工时行校验与数量汇总
// ==========================================
// 职责:
// - 工时行: 起止必填 / 起 <= 止 / 不早于上一行结束 / 不超过 当前+允许提前分钟 / 完成数量非零
// - 系统派生字段: 每行分钟数、总分钟数、过账时间、完成/报废合计
// - 报废品去向权限
// - 生产数量区间
// 红线: 只自动修正系统派生字段, 用户录入的数量与时间只校验不修改
// ==========================================

use crate::domain::actor::{Actor, Permission};
use crate::domain::job_card::JobCard;
use crate::domain::types::LocationType;
use crate::engine::error::{DispatchError, DispatchResult};
use crate::engine::interval::ProposedInterval;
use crate::i18n::{message_time, t_with_args};
use chrono::{Duration, NaiveDateTime};

/// 工时校验上下文
#[derive(Debug, Clone, Copy)]
pub struct TimeLogContext {
    pub now: NaiveDateTime,
    pub future_time_mins: i64,
    /// 强制工时必填项 (全局或工序开关打开, 且未放行)
    pub admission_required: bool,
    /// 计算时段冲突 (全局或工序开关打开; 放行时冲突降级为警告)
    pub check_overlap: bool,
    /// 委外工序跳过工时校验
    pub is_subcontracting: bool,
}

impl TimeLogContext {
    /// 允许的最晚时间
    pub fn max_time(&self) -> NaiveDateTime {
        self.now + Duration::minutes(self.future_time_mins)
    }
}

/// 生产数量区间参数
#[derive(Debug, Clone, Copy, Default)]
pub struct ProducedQtyBand {
    pub short_close_lower_pct: f64,
    pub over_production_upper_pct: f64,
}

fn rule(key: &str, args: &[(&str, &str)]) -> DispatchError {
    DispatchError::BusinessRuleViolation(t_with_args(key, args))
}

// ==========================================
// TimeLogValidator - 工时行校验器
// ==========================================
#[derive(Debug, Default)]
pub struct TimeLogValidator {
    // 无状态引擎
}

impl TimeLogValidator {
    pub fn new() -> Self {
        Self {}
    }

    /// 是否检查工位时段冲突
    pub fn overlap_enabled(&self, global_switch: bool, operation_switch: bool) -> bool {
        global_switch || operation_switch
    }

    /// 是否强制工时必填项
    pub fn admission_required(&self, global_switch: bool, operation_switch: bool, bypass_time_logs: bool) -> bool {
        self.overlap_enabled(global_switch, operation_switch) && !bypass_time_logs
    }

    /// 重算每行分钟数与总分钟数
    pub fn recompute_minutes(&self, card: &mut JobCard) -> DispatchResult<()> {
        let mut total = 0;
        for (idx, row) in card.time_logs.iter_mut().enumerate() {
            let row_no = (idx + 1).to_string();
            match (row.from_time, row.to_time) {
                (None, None) => continue,
                (Some(from), Some(to)) => {
                    if to < from {
                        return Err(rule("time_log.to_before_from", &[("row", &row_no)]));
                    }
                    row.time_in_mins = (to - from).num_minutes();
                    total += row.time_in_mins;
                }
                _ => return Err(rule("time_log.from_to_required", &[("row", &row_no)])),
            }
        }
        card.total_time_mins = total;
        Ok(())
    }

    /// 校验工时行并返回需要准入的时段 (行号, 时段)
    #[tracing::instrument(skip(self, card, ctx), fields(job_card = %card.job_card_id))]
    pub fn validate(&self, card: &mut JobCard, ctx: &TimeLogContext) -> DispatchResult<Vec<(u32, ProposedInterval)>> {
        self.recompute_minutes(card)?;
        self.update_posting_time(card, ctx)?;

        if ctx.is_subcontracting {
            tracing::debug!("委外工序, 跳过工时校验");
            return Ok(Vec::new());
        }

        if ctx.admission_required {
            if card.employee.is_none() {
                return Err(rule("time_log.employee_required", &[("job_card", &card.job_card_id)]));
            }
            if card.workstation.is_none() {
                return Err(rule("time_log.workstation_required", &[("job_card", &card.job_card_id)]));
            }
            if card.time_logs.is_empty() {
                return Err(rule("time_log.mandatory", &[("job_card", &card.job_card_id)]));
            }
        }

        let max_time = ctx.max_time();
        let max_time_text = message_time(&max_time);
        let mut proposals = Vec::with_capacity(card.time_logs.len());
        let mut prev_to: Option<NaiveDateTime> = None;

        for (idx, row) in card.time_logs.iter().enumerate() {
            let row_no = (idx + 1).to_string();
            let (Some(from), Some(to)) = (row.from_time, row.to_time) else {
                return Err(rule("time_log.from_to_required", &[("row", &row_no)]));
            };
            if let Some(prev) = prev_to {
                if from < prev {
                    return Err(rule(
                        "time_log.starts_before_previous",
                        &[("row", &row_no), ("prev", &idx.to_string())],
                    ));
                }
            }
            if to > max_time {
                return Err(rule(
                    "time_log.beyond_future_limit",
                    &[("row", &row_no), ("max", &max_time_text)],
                ));
            }
            if row.completed_qty == 0.0 {
                return Err(rule("time_log.zero_qty", &[("row", &row_no)]));
            }
            if from > to {
                return Err(rule("time_log.to_before_from", &[("row", &row_no)]));
            }
            prev_to = Some(to);

            // 行工位优先于工序卡工位
            let workstation = row.workstation.clone().or_else(|| card.workstation.clone());
            if ctx.check_overlap && workstation.is_some() {
                proposals.push((
                    (idx + 1) as u32,
                    ProposedInterval {
                        interval_id: row.interval_id.clone(),
                        job_card_id: card.job_card_id.clone(),
                        workstation,
                        from_time: from,
                        to_time: to,
                    },
                ));
            }
        }

        Ok(proposals)
    }

    /// 过账时间: 非手工时取最晚结束时间 (无工时行时取当前时间); 手工时不得超过允许的最晚时间
    pub fn update_posting_time(&self, card: &mut JobCard, ctx: &TimeLogContext) -> DispatchResult<()> {
        if card.manual_posting {
            if let Some(posting) = card.posting_time {
                let max_time = ctx.max_time();
                if posting > max_time {
                    return Err(rule(
                        "time_log.posting_beyond_limit",
                        &[("max", &message_time(&max_time))],
                    ));
                }
            }
            return Ok(());
        }
        let latest = card.time_logs.iter().filter_map(|r| r.to_time).max();
        card.posting_time = Some(latest.unwrap_or(ctx.now));
        Ok(())
    }

    /// 完成/报废合计与报废品去向
    ///
    /// # 参数
    /// - location_type: 报废库位类型查询
    pub fn recompute_totals<F>(&self, card: &mut JobCard, actor: &Actor, location_type: F) -> DispatchResult<()>
    where
        F: Fn(&str) -> DispatchResult<LocationType>,
    {
        let mut completed = 0.0;
        let mut rejected = 0.0;

        for (idx, row) in card.time_logs.iter().enumerate() {
            let row_no = (idx + 1).to_string();
            if row.completed_qty > 0.0 {
                completed += row.completed_qty;
            }
            if row.rejected_qty > 0.0 {
                rejected += row.rejected_qty;
            }
            if row.salvage_qty > 0.0 {
                rejected += row.salvage_qty;
                let Some(location) = row.salvage_location.as_deref() else {
                    return Err(rule("time_log.salvage_location_required", &[("row", &row_no)]));
                };
                if location_type(location)? != LocationType::Rejected
                    && !actor.can(Permission::RouteSalvageAnywhere)
                {
                    return Err(DispatchError::PermissionDenied(t_with_args(
                        "time_log.salvage_not_permitted",
                        &[("row", &row_no), ("location", location)],
                    )));
                }
            }
        }

        card.total_completed_qty = completed;
        card.total_rejected_qty = rejected;
        Ok(())
    }

    /// 生产数量校验
    ///
    /// - 有源库位: 可用数量须覆盖 完成 + 报废
    /// - 无源库位: 完成数量须在 [计划*(1-下限%), 计划*(1+上限%)] 内, 下限仅在短关时生效
    pub fn check_produced_qty(&self, card: &JobCard, band: &ProducedQtyBand) -> DispatchResult<()> {
        let processed = card.processed_qty();
        if let Some(source) = card.source_location.as_deref() {
            if card.available_qty < processed {
                return Err(rule(
                    "time_log.exceeds_available",
                    &[
                        ("job_card", &card.job_card_id),
                        ("item", &card.production_item),
                        ("location", source),
                        ("available", &card.available_qty.to_string()),
                        ("processed", &processed.to_string()),
                    ],
                ));
            }
            return Ok(());
        }

        let min_qty = card.for_quantity * (1.0 - band.short_close_lower_pct / 100.0);
        let max_qty = card.for_quantity * (1.0 + band.over_production_upper_pct / 100.0);
        if (card.short_close && card.total_completed_qty < min_qty) || card.total_completed_qty > max_qty {
            return Err(rule(
                "time_log.produced_out_of_band",
                &[
                    ("job_card", &card.job_card_id),
                    ("min", &min_qty.to_string()),
                    ("max", &max_qty.to_string()),
                ],
            ));
        }
        Ok(())
    }
}
