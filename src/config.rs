//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SIDEKICK__*` 覆盖（双下划线表示嵌套，如 `SIDEKICK__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub superstep: SuperstepSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 退出时每个清理任务的超时（秒）
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_shutdown_timeout() -> u64 {
    5
}

/// [llm] 段：后端选择、执行者与评审者模型、超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock；缺少对应 API Key 时回退到 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// 评审使用的模型，未设置时与 model 相同
    pub evaluator_model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            evaluator_model: None,
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// 新一轮开始时如何处理上一轮留下的评审反馈
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackPolicy {
    ClearEachTurn,
    /// 成功标准变化时清除（视为新任务），否则保留
    #[default]
    ClearOnCriterionChange,
    Carry,
}

/// [superstep] 段：单轮循环的步数上限、默认成功标准、反馈策略
#[derive(Debug, Clone, Deserialize)]
pub struct SuperstepSection {
    /// 单轮内 Acting 次数上限，耗尽时强制 input_needed
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// 调用方未给出成功标准时使用
    #[serde(default = "default_criterion")]
    pub default_criterion: String,
    #[serde(default)]
    pub feedback_policy: FeedbackPolicy,
}

impl Default for SuperstepSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            default_criterion: default_criterion(),
            feedback_policy: FeedbackPolicy::default(),
        }
    }
}

fn default_max_steps() -> usize {
    20
}

fn default_criterion() -> String {
    "The answer should be clear and accurate".to_string()
}

impl SuperstepSection {
    /// 空白标准替换为默认标准
    pub fn criterion_or_default<'a>(&'a self, criterion: &'a str) -> &'a str {
        if criterion.trim().is_empty() {
            &self.default_criterion
        } else {
            criterion
        }
    }
}

/// 从 config 目录加载配置，环境变量 SIDEKICK__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SIDEKICK__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SIDEKICK")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.superstep.max_steps, 20);
        assert_eq!(cfg.superstep.feedback_policy, FeedbackPolicy::ClearOnCriterionChange);
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert_eq!(cfg.app.shutdown_timeout_secs, 5);
    }

    #[test]
    fn test_criterion_or_default() {
        let s = SuperstepSection::default();
        assert_eq!(s.criterion_or_default("  "), "The answer should be clear and accurate");
        assert_eq!(s.criterion_or_default("say done"), "say done");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[app]\nshutdown_timeout_secs = 2\n\n[llm]\nprovider = \"mock\"\nevaluator_model = \"gpt-4o\"\n\n[superstep]\nmax_steps = 5\nfeedback_policy = \"carry\""
        )
        .unwrap();
        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.llm.evaluator_model.as_deref(), Some("gpt-4o"));
        assert_eq!(cfg.superstep.max_steps, 5);
        assert_eq!(cfg.superstep.feedback_policy, FeedbackPolicy::Carry);
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
        assert_eq!(cfg.app.shutdown_timeout_secs, 2);
    }
}
