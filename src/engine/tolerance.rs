// ==========================================
// 生产派工核心 - 数量公差校验
// ==========================================
// 模式:
// - 长度守恒: 损耗% = |投入度量 - 产出度量| / 投入度量 * 100 (投入为 0 时除数取 1)
// - 固定比例: 上报数量须落在 [floor((1-v)*计算量), ceil((1+v)*计算量)] 内;
//   允许偏差为 0 时须与换算后的计算量相等
// 输出: Violation (由调用方按放行策略处理)
// ==========================================

use crate::domain::item::{Item, UnitOfMeasure};
use crate::domain::routing::FormulaMode;
use crate::engine::error::{DispatchError, DispatchResult};
use crate::engine::formula::{Bindings, CompiledTemplate};
use crate::engine::violation::Violation;

/// 浮点取整容差
const ROUNDING_EPSILON: f64 = 1e-9;

/// 长度守恒输入: (物料, 数量)
#[derive(Debug, Clone)]
pub struct LengthInputs<'a> {
    pub finished: (&'a Item, f64),
    pub raw_materials: Vec<(&'a Item, f64)>,
    pub produced: Vec<(&'a Item, f64)>,
}

/// 长度守恒计算结果
#[derive(Debug, Clone, PartialEq)]
pub struct WastageReport {
    pub rm_measure: f64,
    pub fg_measure: f64,
    pub wastage_pct: f64,
}

// ==========================================
// ToleranceValidator - 数量公差校验器
// ==========================================
#[derive(Debug, Default)]
pub struct ToleranceValidator {
    // 无状态引擎
}

impl ToleranceValidator {
    pub fn new() -> Self {
        Self {}
    }

    /// 损耗百分比
    pub fn wastage_pct(&self, rm_measure: f64, fg_measure: f64) -> f64 {
        let divisor = if rm_measure > 0.0 { rm_measure } else { 1.0 };
        ((rm_measure - fg_measure) / divisor * 100.0).abs()
    }

    /// 长度守恒计算
    pub fn measure_wastage(&self, mode: &FormulaMode, inputs: &LengthInputs<'_>) -> DispatchResult<WastageReport> {
        let FormulaMode::Length {
            fg_measure_field,
            rm_measure_field,
            wip_measure_field,
        } = mode
        else {
            return Err(DispatchError::DataIntegrityFault(
                "固定比例模板不能按长度守恒校验".to_string(),
            ));
        };

        let field = |f: &Option<String>, which: &str| {
            f.clone().ok_or_else(|| {
                DispatchError::DataIntegrityFault(format!("长度公式模板缺少{}度量字段", which))
            })
        };
        let fg_field = field(fg_measure_field, "成品")?;
        let rm_field = field(rm_measure_field, "原材料")?;

        let (fg_item, fg_qty) = inputs.finished;
        let mut fg_measure = fg_item.measure(&fg_field) * fg_qty;

        let rm_measure: f64 = inputs
            .raw_materials
            .iter()
            .filter(|(_, qty)| *qty > 0.0)
            .map(|(item, qty)| item.measure(&rm_field) * qty)
            .sum();

        if !inputs.produced.is_empty() {
            let wip_field = field(wip_measure_field, "在制品")?;
            fg_measure += inputs
                .produced
                .iter()
                .map(|(item, qty)| item.measure(&wip_field) * qty)
                .sum::<f64>();
        }

        Ok(WastageReport {
            rm_measure,
            fg_measure,
            wastage_pct: self.wastage_pct(rm_measure, fg_measure),
        })
    }

    /// 长度守恒校验
    pub fn check_length(
        &self,
        mode: &FormulaMode,
        inputs: &LengthInputs<'_>,
        uom: &UnitOfMeasure,
    ) -> DispatchResult<Option<Violation>> {
        let report = self.measure_wastage(mode, inputs)?;
        tracing::debug!(
            rm = report.rm_measure,
            fg = report.fg_measure,
            wastage = report.wastage_pct,
            allowed = uom.variance_allowed_pct,
            "长度守恒校验"
        );
        if report.wastage_pct > uom.variance_allowed_pct {
            return Ok(Some(Violation::new(
                "tolerance.wastage_exceeded",
                &[
                    ("rm", &format_qty(report.rm_measure)),
                    ("fg", &format_qty(report.fg_measure)),
                    ("wastage", &format_qty(report.wastage_pct)),
                    ("allowed", &format_qty(uom.variance_allowed_pct)),
                ],
            )));
        }
        Ok(None)
    }

    /// 固定比例允许区间 (下限向下取整, 上限向上取整)
    pub fn ratio_bounds(&self, calculated_qty: f64, variance_pct: f64) -> (f64, f64) {
        let variance = variance_pct / 100.0;
        let lower = ((1.0 - variance) * calculated_qty + ROUNDING_EPSILON).floor();
        let upper = ((1.0 + variance) * calculated_qty - ROUNDING_EPSILON).ceil();
        (lower, upper)
    }

    /// 固定比例校验
    pub fn check_ratio(
        &self,
        row: u32,
        item_code: &str,
        reported_qty: f64,
        calculated_qty: f64,
        uom: &UnitOfMeasure,
    ) -> Option<Violation> {
        if uom.variance_allowed_pct > 0.0 {
            let (lower, upper) = self.ratio_bounds(calculated_qty, uom.variance_allowed_pct);
            if reported_qty < lower || reported_qty > upper {
                return Some(Violation::new(
                    "tolerance.out_of_range",
                    &[
                        ("qty", &format_qty(reported_qty)),
                        ("row", &row.to_string()),
                        ("item", item_code),
                        ("lower", &format_qty(lower)),
                        ("upper", &format_qty(upper)),
                    ],
                ));
            }
            return None;
        }

        let expected = uom.convert(calculated_qty);
        if (reported_qty - expected).abs() > ROUNDING_EPSILON {
            return Some(Violation::new(
                "tolerance.not_equal",
                &[
                    ("qty", &format_qty(reported_qty)),
                    ("calculated", &format_qty(expected)),
                    ("item", item_code),
                    ("row", &row.to_string()),
                ],
            ));
        }
        None
    }

    /// 原材料限制规则校验
    pub fn check_rm_rules(
        &self,
        compiled: &CompiledTemplate,
        row: u32,
        item_code: &str,
        bindings: &Bindings,
    ) -> DispatchResult<Vec<Violation>> {
        Ok(compiled
            .failing_rules(bindings)?
            .into_iter()
            .map(|rule| {
                Violation::new(
                    "tolerance.rule_failed",
                    &[("rule", &rule), ("item", item_code), ("row", &row.to_string())],
                )
            })
            .collect())
    }
}

fn format_qty(v: f64) -> String {
    let rounded = (v * 1_000.0).round() / 1_000.0;
    format!("{}", rounded)
}
