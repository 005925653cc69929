// ==========================================
// 生产派工核心 - 资源时段准入
// ==========================================
// 职责: 判断工位在给定时段是否空闲 (按工位产能允许并行)
// 冲突定义: proposed.from < existing.to && proposed.to > existing.from, 或 proposed 包含 existing
// 排除: 正在编辑的时段本身 / 所属工序卡 / 已取消工序卡
// 红线: 同一工位的 检查-准入 必须串行 (调用方持有工位锁)
// ==========================================

use crate::domain::job_card::CommittedInterval;
use crate::domain::types::DocState;
use chrono::NaiveDateTime;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// 待准入时段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedInterval {
    pub interval_id: String,
    pub job_card_id: String,
    pub workstation: Option<String>,
    pub from_time: NaiveDateTime,
    pub to_time: NaiveDateTime,
}

/// 冲突判定模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapMode {
    /// 仅判定真实重叠
    #[default]
    Strict,
    /// 查找下一个空闲时段: 起止均不晚于已有时段的也计入
    NextAvailableSlot,
}

// ==========================================
// IntervalScheduler - 时段准入器
// ==========================================
#[derive(Debug, Default)]
pub struct IntervalScheduler {
    // 无状态引擎
}

impl IntervalScheduler {
    pub fn new() -> Self {
        Self {}
    }

    /// 与待准入时段冲突的已占用时段
    pub fn conflicts<'a>(
        &self,
        proposed: &ProposedInterval,
        committed: &'a [CommittedInterval],
        mode: OverlapMode,
    ) -> Vec<&'a CommittedInterval> {
        committed
            .iter()
            .filter(|e| e.interval_id != proposed.interval_id)
            .filter(|e| e.job_card_id != proposed.job_card_id)
            .filter(|e| e.doc_state != DocState::Cancelled)
            .filter(|e| match proposed.workstation.as_deref() {
                Some(ws) => e.workstation.as_deref() == Some(ws),
                None => true,
            })
            .filter(|e| {
                let overlaps = proposed.from_time < e.to_time && proposed.to_time > e.from_time;
                // 包含或起止相同 (含零时长时段)
                let contains = proposed.from_time <= e.from_time && proposed.to_time >= e.to_time;
                let before_slot = mode == OverlapMode::NextAvailableSlot
                    && proposed.from_time <= e.from_time
                    && proposed.to_time <= e.to_time;
                overlaps || contains || before_slot
            })
            .collect()
    }

    /// 时段准入检查
    ///
    /// # 返回
    /// - None: 冲突数 < 产能, 准入
    /// - Some(interval): 拒绝, 返回结束时间最晚的冲突时段
    pub fn check_overlap(
        &self,
        proposed: &ProposedInterval,
        committed: &[CommittedInterval],
        capacity: usize,
        mode: OverlapMode,
    ) -> Option<CommittedInterval> {
        let found = self.conflicts(proposed, committed, mode);
        if found.len() < capacity.max(1) {
            return None;
        }
        let latest = found.into_iter().max_by_key(|e| e.to_time).cloned();
        if let Some(ref c) = latest {
            tracing::debug!(
                job_card = %proposed.job_card_id,
                conflicting = %c.job_card_id,
                capacity,
                "时段准入被拒绝"
            );
        }
        latest
    }
}

// ==========================================
// ResourceLedger - 内存资源占用台账
// ==========================================
// 不落库的调用方 (批量排程/测试) 使用; 同一工位的检查与登记在同一分片锁内完成
#[derive(Debug, Default)]
pub struct ResourceLedger {
    intervals: DashMap<String, Vec<CommittedInterval>>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 检查并登记; 冲突时返回结束最晚的冲突时段
    pub fn admit(
        &self,
        resource: &str,
        proposed: &ProposedInterval,
        capacity: usize,
    ) -> Result<(), CommittedInterval> {
        let scheduler = IntervalScheduler::new();
        let mut entry = self.intervals.entry(resource.to_string()).or_default();
        if let Some(conflict) = scheduler.check_overlap(proposed, &entry, capacity, OverlapMode::Strict) {
            return Err(conflict);
        }
        entry.push(CommittedInterval {
            interval_id: proposed.interval_id.clone(),
            job_card_id: proposed.job_card_id.clone(),
            workstation: Some(resource.to_string()),
            from_time: proposed.from_time,
            to_time: proposed.to_time,
            doc_state: DocState::Draft,
        });
        Ok(())
    }

    /// 工位已登记的时段数
    pub fn count(&self, resource: &str) -> usize {
        self.intervals.get(resource).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn committed(id: &str, jc: &str, from: NaiveDateTime, to: NaiveDateTime) -> CommittedInterval {
        CommittedInterval {
            interval_id: id.into(),
            job_card_id: jc.into(),
            workstation: Some("WS-1".into()),
            from_time: from,
            to_time: to,
            doc_state: DocState::Draft,
        }
    }

    fn proposed(jc: &str, from: NaiveDateTime, to: NaiveDateTime) -> ProposedInterval {
        ProposedInterval {
            interval_id: format!("{}-row", jc),
            job_card_id: jc.into(),
            workstation: Some("WS-1".into()),
            from_time: from,
            to_time: to,
        }
    }

    #[test]
    fn test_capacity_one_overlap_and_touching() {
        let s = IntervalScheduler::new();
        let existing = vec![committed("A", "JC-A", at(10, 0), at(11, 0))];

        let b = proposed("JC-B", at(10, 30), at(10, 45));
        assert_eq!(
            s.check_overlap(&b, &existing, 1, OverlapMode::Strict).unwrap().job_card_id,
            "JC-A"
        );

        let c = proposed("JC-C", at(11, 0), at(12, 0));
        assert!(s.check_overlap(&c, &existing, 1, OverlapMode::Strict).is_none());
    }

    #[test]
    fn test_capacity_two_admits_second_rejects_third() {
        let s = IntervalScheduler::new();
        let mut existing = vec![committed("A", "JC-A", at(9, 0), at(11, 0))];
        let b = proposed("JC-B", at(10, 0), at(12, 0));
        assert!(s.check_overlap(&b, &existing, 2, OverlapMode::Strict).is_none());
        existing.push(committed("B", "JC-B", at(10, 0), at(12, 0)));

        let c = proposed("JC-C", at(10, 30), at(10, 40));
        let conflict = s.check_overlap(&c, &existing, 2, OverlapMode::Strict).unwrap();
        assert_eq!(conflict.job_card_id, "JC-B"); // 结束最晚
    }

    #[test]
    fn test_exclusions() {
        let s = IntervalScheduler::new();
        let mut cancelled = committed("X", "JC-X", at(10, 0), at(11, 0));
        cancelled.doc_state = DocState::Cancelled;
        let mut other_ws = committed("Y", "JC-Y", at(10, 0), at(11, 0));
        other_ws.workstation = Some("WS-2".into());
        let same_card = committed("Z", "JC-P", at(10, 0), at(11, 0));
        let existing = vec![cancelled, other_ws, same_card];

        let p = proposed("JC-P", at(10, 15), at(10, 30));
        assert!(s.check_overlap(&p, &existing, 1, OverlapMode::Strict).is_none());
    }

    #[test]
    fn test_containment_and_exact_match_conflict() {
        let s = IntervalScheduler::new();
        let existing = vec![committed("A", "JC-A", at(10, 0), at(11, 0))];
        let outer = proposed("JC-B", at(9, 0), at(12, 0));
        assert!(s.check_overlap(&outer, &existing, 1, OverlapMode::Strict).is_some());
        let exact = proposed("JC-B", at(10, 0), at(11, 0));
        assert!(s.check_overlap(&exact, &existing, 1, OverlapMode::Strict).is_some());
    }

    #[test]
    fn test_zero_length_committed_interval() {
        let s = IntervalScheduler::new();
        let existing = vec![committed("A", "JC-A", at(10, 0), at(10, 0))];

        let outer = proposed("JC-B", at(9, 0), at(11, 0));
        assert!(s.check_overlap(&outer, &existing, 1, OverlapMode::Strict).is_some());
        let exact = proposed("JC-B", at(10, 0), at(10, 0));
        assert!(s.check_overlap(&exact, &existing, 1, OverlapMode::Strict).is_some());
        let from_same_start = proposed("JC-B", at(10, 0), at(11, 0));
        assert!(s
            .check_overlap(&from_same_start, &existing, 1, OverlapMode::Strict)
            .is_some());

        let after = proposed("JC-B", at(10, 30), at(11, 0));
        assert!(s.check_overlap(&after, &existing, 1, OverlapMode::Strict).is_none());
    }

    #[test]
    fn test_next_available_slot_mode() {
        let s = IntervalScheduler::new();
        let existing = vec![committed("A", "JC-A", at(10, 0), at(11, 0))];
        let early = proposed("JC-B", at(8, 0), at(9, 0));
        assert!(s.check_overlap(&early, &existing, 1, OverlapMode::Strict).is_none());
        assert!(s
            .check_overlap(&early, &existing, 1, OverlapMode::NextAvailableSlot)
            .is_some());
    }

    #[test]
    fn test_resource_ledger_admit() {
        let ledger = ResourceLedger::new();
        assert!(ledger.admit("WS-1", &proposed("JC-A", at(10, 0), at(11, 0)), 1).is_ok());
        assert!(ledger.admit("WS-1", &proposed("JC-B", at(10, 30), at(10, 45)), 1).is_err());
        assert!(ledger.admit("WS-1", &proposed("JC-C", at(11, 0), at(12, 0)), 1).is_ok());
        assert_eq!(ledger.count("WS-1"), 2);
    }
}
