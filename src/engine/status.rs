// ==========================================
// 生产派工核心 - 工序卡状态机与派生字段
// ==========================================
// 职责:
// - 单据状态迁移 (保存/提交/取消)
// - 工序卡状态派生: (单据状态, 可用数量快照) -> 状态
// - 工序位置 (序号/末道) 与原材料齐套状态
// 红线: 状态只在每次变更时由本模块计算一次, 调用方不得直接写状态
// ==========================================

use crate::domain::job_card::JobCard;
use crate::domain::routing::RoutingInstance;
use crate::domain::types::{DocEvent, DocState, JobCardStatus};
use crate::engine::error::{DispatchError, DispatchResult};
use crate::i18n::t_with_args;
use serde::{Deserialize, Serialize};

/// 原材料齐套状态 (-100 表示不适用)
pub const RM_STATUS_NOT_APPLICABLE: i32 = -100;

/// 工序位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPosition {
    pub sequence_no: u32,
    pub final_step: bool,
}

/// 原材料齐套
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RmReadiness {
    pub percent: i32,
    pub shortage: f64,
}

// ==========================================
// JobCardStateMachine - 工序卡状态机
// ==========================================
#[derive(Debug, Default)]
pub struct JobCardStateMachine {
    // 无状态引擎
}

impl JobCardStateMachine {
    pub fn new() -> Self {
        Self {}
    }

    /// 单据状态迁移
    ///
    /// 合法迁移: Draft -Save-> Draft, Draft -Submit-> Submitted, Submitted -Cancel-> Cancelled
    pub fn transition(&self, from: DocState, event: DocEvent) -> DispatchResult<DocState> {
        match (from, event) {
            (DocState::Draft, DocEvent::Save) => Ok(DocState::Draft),
            (DocState::Draft, DocEvent::Submit) => Ok(DocState::Submitted),
            (DocState::Submitted, DocEvent::Cancel) => Ok(DocState::Cancelled),
            _ => Err(DispatchError::BusinessRuleViolation(t_with_args(
                "status.invalid_transition",
                &[("from", from.to_db_str()), ("event", &event.to_string())],
            ))),
        }
    }

    /// 状态派生
    ///
    /// - 已取消 -> Cancelled
    /// - 已提交 -> Completed
    /// - 草稿: 有源库位时 可用 > 0 为 WorkInProgress 否则 Open; 无源库位为 WorkInProgress
    pub fn derive_status(&self, doc_state: DocState, has_source: bool, available_qty: f64) -> JobCardStatus {
        match doc_state {
            DocState::Cancelled => JobCardStatus::Cancelled,
            DocState::Submitted => JobCardStatus::Completed,
            DocState::Draft => {
                if !has_source || available_qty > 0.0 {
                    JobCardStatus::WorkInProgress
                } else {
                    JobCardStatus::Open
                }
            }
        }
    }

    /// 按当前快照重算并写入工序卡状态; 返回是否变化
    pub fn apply(&self, card: &mut JobCard) -> bool {
        let status = self.derive_status(card.doc_state, card.source_location.is_some(), card.available_qty);
        if card.status == status {
            return false;
        }
        tracing::debug!(job_card = %card.job_card_id, from = %card.status, to = %status, "工序卡状态变化");
        card.status = status;
        true
    }

    /// 工序位置; 工序不在工艺单中时为 (0, 非末道)
    pub fn locate(&self, routing: &RoutingInstance, card: &JobCard) -> StepPosition {
        routing
            .locate_step(card.step_id.as_deref(), &card.operation)
            .map(|s| StepPosition {
                sequence_no: s.sequence_no,
                final_step: s.final_step,
            })
            .unwrap_or(StepPosition {
                sequence_no: 0,
                final_step: false,
            })
    }

    /// 原材料齐套状态
    ///
    /// 每行: 可用 >= 计算量+1 为 100%, 否则 floor(可用 / (计算量+1) * 100);
    /// 缺口 = 预计可用为负时取其相反数. 取齐套率最低的一行
    pub fn rm_readiness(&self, card: &JobCard) -> RmReadiness {
        if !card.consumes_rm {
            return RmReadiness {
                percent: RM_STATUS_NOT_APPLICABLE,
                shortage: 0.0,
            };
        }

        let mut worst: Option<RmReadiness> = None;
        for line in &card.raw_materials {
            let required = line.calculated_qty + 1.0;
            let percent = if line.qty_available >= required {
                100
            } else {
                ((line.qty_available / required) * 100.0).floor() as i32
            };
            let shortage = if line.projected_qty < 0.0 {
                -line.projected_qty
            } else {
                0.0
            };
            match worst {
                Some(w) if w.percent < percent => {}
                _ => worst = Some(RmReadiness { percent, shortage }),
            }
        }

        worst.unwrap_or(RmReadiness {
            percent: RM_STATUS_NOT_APPLICABLE,
            shortage: 0.0,
        })
    }
}
