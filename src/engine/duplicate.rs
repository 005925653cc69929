// ==========================================
// 生产派工核心 - 重复工序卡识别
// ==========================================
// 职责: 判断新的工作请求能否并入已有待执行工序卡
// 规则:
// - 同物料 + 同工序 + (按单生产时) 同销售订单行, 且未定稿
// - 工序消耗原材料: 候选卡也须消耗原材料, 且原材料构成与工艺单完全一致
// - 工序仅转移: 候选卡也须仅转移
// 红线: 仅转移 与 消耗原材料 的工序卡永不合并
// ==========================================

use crate::domain::item::Item;
use crate::domain::job_card::JobCard;
use crate::domain::routing::RoutingInstance;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// 重复工序卡清单
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepeatReport {
    /// 仅转移类重复 (可直接删除)
    pub transfer_duplicates: Vec<String>,
    /// 原材料类重复 (需人工确认)
    pub rm_duplicates: Vec<String>,
}

impl RepeatReport {
    pub fn total(&self) -> usize {
        self.transfer_duplicates.len() + self.rm_duplicates.len()
    }
}

// ==========================================
// DuplicateDetector - 重复工序卡识别器
// ==========================================
#[derive(Debug, Default)]
pub struct DuplicateDetector {
    // 无状态引擎
}

impl DuplicateDetector {
    pub fn new() -> Self {
        Self {}
    }

    /// 查找可并入的已有工序卡
    ///
    /// # 参数
    /// - candidates: 候选工序卡快照 (通常为同物料同工序的待执行卡)
    ///
    /// # 返回
    /// 可并入的工序卡ID (保持候选顺序); 工序不在工艺单中时为空
    pub fn find_existing(
        &self,
        item: &Item,
        operation: &str,
        routing: &RoutingInstance,
        sales_order_line: Option<&str>,
        candidates: &[JobCard],
    ) -> Vec<String> {
        let Some(step) = routing.locate_step(None, operation) else {
            tracing::debug!(operation, routing_id = %routing.routing_id, "工序不在工艺单中, 无可合并工序卡");
            return Vec::new();
        };

        let routing_rm = routing.rm_composition();
        let routing_rm_lines = routing.raw_materials.len();

        candidates
            .iter()
            .filter(|c| c.is_pending())
            .filter(|c| c.production_item == item.item_code && c.operation == operation)
            .filter(|c| !item.made_to_order || c.sales_order_line.as_deref() == sales_order_line)
            .filter(|c| {
                if step.consumes_rm {
                    c.consumes_rm
                        && c.raw_materials.len() == routing_rm_lines
                        && c.rm_composition() == routing_rm
                } else {
                    c.transfer_entry && !c.consumes_rm
                }
            })
            .map(|c| c.job_card_id.clone())
            .collect()
    }

    /// 全量扫描重复的待执行工序卡
    ///
    /// 按 (物料, 工序, 创建时间) 排序逐张检查; 某卡的可合并集合超过 1 张时,
    /// 除该卡以外的其余卡记为重复, 按该卡是否仅转移分入两类清单
    pub fn find_repeating(
        &self,
        pending: &[JobCard],
        items: &HashMap<String, Item>,
        routings: &HashMap<String, RoutingInstance>,
    ) -> RepeatReport {
        let mut ordered: Vec<&JobCard> = pending.iter().filter(|c| c.is_pending()).collect();
        ordered.sort_by(|a, b| {
            (a.production_item.as_str(), a.operation.as_str(), a.created_at)
                .cmp(&(b.production_item.as_str(), b.operation.as_str(), b.created_at))
        });

        let owned: Vec<JobCard> = ordered.iter().map(|c| (*c).clone()).collect();
        let by_id: HashMap<&str, &JobCard> = ordered.iter().map(|c| (c.job_card_id.as_str(), *c)).collect();

        let mut reported: HashSet<String> = HashSet::new();
        let mut transfer: Vec<&JobCard> = Vec::new();
        let mut rm: Vec<&JobCard> = Vec::new();

        for card in &ordered {
            if reported.contains(&card.job_card_id) {
                continue;
            }
            let (Some(item), Some(routing)) = (
                items.get(&card.production_item),
                routings.get(&card.routing_id),
            ) else {
                tracing::warn!(job_card = %card.job_card_id, "缺少物料或工艺单快照, 跳过重复检查");
                continue;
            };

            let existing = self.find_existing(
                item,
                &card.operation,
                routing,
                card.sales_order_line.as_deref(),
                &owned,
            );
            if existing.len() <= 1 {
                continue;
            }

            for id in existing.iter().filter(|id| **id != card.job_card_id) {
                if !reported.insert(id.clone()) {
                    continue;
                }
                if let Some(dup) = by_id.get(id.as_str()) {
                    if card.transfer_entry {
                        transfer.push(*dup);
                    } else {
                        rm.push(*dup);
                    }
                }
            }
        }

        transfer.sort_by_key(|c| c.created_at);
        rm.sort_by_key(|c| c.created_at);

        let report = RepeatReport {
            transfer_duplicates: transfer.iter().map(|c| c.job_card_id.clone()).collect(),
            rm_duplicates: rm.iter().map(|c| c.job_card_id.clone()).collect(),
        };
        tracing::info!(
            checked = ordered.len(),
            transfer = report.transfer_duplicates.len(),
            rm = report.rm_duplicates.len(),
            "重复工序卡扫描完成"
        );
        report
    }
}

/// 原材料构成是否一致 (集合相等且行数相等)
pub fn same_rm_composition(a: &[String], b: &BTreeSet<&str>) -> bool {
    a.len() == b.len() && a.iter().all(|x| b.contains(x.as_str()))
}
