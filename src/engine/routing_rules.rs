// ==========================================
// 生产派工核心 - 工艺单结构规则
// ==========================================
// 职责:
// - 规范化: 转移标志 / 委外目标库位 / 末道标志
// - 结构校验: 工序非空 / 委外工序位置 / 序号连续 / 长度模板字段齐全
// 红线: 结构违规为数据完整性错误, 不可放行
// ==========================================

use crate::domain::item::OperationInfo;
use crate::domain::routing::{FormulaMode, RoutingInstance, RoutingTemplate};
use crate::engine::error::{DispatchError, DispatchResult};

fn integrity(msg: String) -> DispatchError {
    DispatchError::DataIntegrityFault(msg)
}

// ==========================================
// RoutingRules - 工艺单规则
// ==========================================
#[derive(Debug, Default)]
pub struct RoutingRules {
    // 无状态引擎
}

impl RoutingRules {
    pub fn new() -> Self {
        Self {}
    }

    /// 规范化工艺单
    ///
    /// - 转移标志 = 同时有源库位与目标库位
    /// - 委外工序的目标库位取工序主数据上的委外库位
    /// - 仅最后一道工序为末道
    pub fn normalize<F>(&self, routing: &mut RoutingInstance, operation_info: F) -> DispatchResult<()>
    where
        F: Fn(&str) -> DispatchResult<OperationInfo>,
    {
        routing.operations.sort_by_key(|s| s.sequence_no);
        let last = routing.operations.len().saturating_sub(1);
        for (idx, step) in routing.operations.iter_mut().enumerate() {
            let info = operation_info(&step.operation)?;
            if info.is_subcontracting {
                if let Some(loc) = info.subcontracting_location {
                    step.target_location = Some(loc);
                }
            }
            step.transfer_entry = step.source_location.is_some() && step.target_location.is_some();
            step.final_step = idx == last;
        }
        Ok(())
    }

    /// 结构校验
    pub fn validate<F>(
        &self,
        routing: &RoutingInstance,
        template: Option<&RoutingTemplate>,
        operation_info: F,
    ) -> DispatchResult<()>
    where
        F: Fn(&str) -> DispatchResult<OperationInfo>,
    {
        if routing.operations.is_empty() {
            return Err(integrity(format!("工艺单 {} 没有工序", routing.routing_id)));
        }

        let count = routing.operations.len();
        for (idx, step) in routing.operations.iter().enumerate() {
            let expected = (idx + 1) as u32;
            if step.sequence_no != expected {
                return Err(integrity(format!(
                    "工艺单 {} 第 {} 行工序序号为 {}, 应为 {}",
                    routing.routing_id,
                    idx + 1,
                    step.sequence_no,
                    expected
                )));
            }

            let info = operation_info(&step.operation)?;
            if !info.is_subcontracting {
                continue;
            }
            if idx == 0 {
                return Err(integrity(format!("委外工序 {} 不能是第一道工序", step.operation)));
            }
            if idx + 1 == count {
                return Err(integrity(format!("委外工序 {} 不能是最后一道工序", step.operation)));
            }
            if step.consumes_rm {
                return Err(integrity(format!("委外工序 {} 不能消耗原材料", step.operation)));
            }
        }

        if let Some(template) = template {
            if let FormulaMode::Length {
                fg_measure_field,
                rm_measure_field,
                wip_measure_field,
            } = &template.formula_mode
            {
                if fg_measure_field.is_none() || rm_measure_field.is_none() || wip_measure_field.is_none() {
                    return Err(integrity(format!(
                        "长度公式模板 {} 必须配置成品/原材料/在制品度量字段",
                        template.template_id
                    )));
                }
            }
        }

        Ok(())
    }
}
