// ==========================================
// 国际化 (i18n) 模块
// ==========================================
// 派工规则消息 (违规/冲突/通知) 均经此翻译, 占位符格式 %{name}
// 语言: zh-CN (回退) / en
// 注意: rust_i18n::i18n! 宏已在 lib.rs 中初始化
// ==========================================

use chrono::NaiveDateTime;

/// 消息中的时间格式
const MESSAGE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 切换消息语言; 不支持的语言保持原设置并返回 false
pub fn set_locale(locale: &str) -> bool {
    let supported = rust_i18n::available_locales!().iter().any(|l| *l == locale);
    if supported {
        rust_i18n::set_locale(locale);
    } else {
        tracing::warn!(locale, "不支持的语言, 保持当前设置");
    }
    supported
}

/// 翻译规则消息并填充占位符
///
/// # 示例
/// ```no_run
/// use production_dispatch::i18n::t_with_args;
/// let msg = t_with_args("dispatch.job_card_created", &[("job_card", "JC-0001")]);
/// ```
pub fn t_with_args(key: &str, args: &[(&str, &str)]) -> String {
    let mut result = rust_i18n::t!(key).to_string();
    for (k, v) in args {
        let placeholder = format!("%{{{}}}", k);
        result = result.replace(&placeholder, v);
    }
    result
}

/// 消息参数中的时间文本
pub fn message_time(dt: &NaiveDateTime) -> String {
    dt.format(MESSAGE_TIME_FORMAT).to_string()
}
