//! 自动化目标角色与选择谓词
//!
//! 每个角色对应一个有序的谓词列表，顺序即优先级，与文档顺序无关。

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// 目标元素的语义角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AutomationTarget {
    /// 学号输入框
    Username,
    /// 密码输入框
    Password,
    /// 登录提交按钮
    Submit,
    /// 查询（刷新结果）按钮
    Search,
    /// 行内的申请按钮
    Register,
    /// 打开登录表单的入口按钮
    OpenLogin,
}

impl Display for AutomationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AutomationTarget::Username => "Username",
            AutomationTarget::Password => "Password",
            AutomationTarget::Submit => "Submit",
            AutomationTarget::Search => "Search",
            AutomationTarget::Register => "Register",
            AutomationTarget::OpenLogin => "OpenLogin",
        };
        f.write_str(name)
    }
}

/// 类型化的元素谓词
///
/// 由 serde 序列化后交给页面端适配器求值，`kind` 字段区分变体。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// 属性值完全相等
    AttrEquals { attr: String, value: String },
    /// 属性值包含子串
    AttrContains { attr: String, needle: String },
    /// 标签名 + 可选的 input type
    TagType {
        tag: String,
        input_type: Option<String>,
    },
    /// 交互元素的文本（去空白、忽略大小写）完全相等
    Text { text: String },
}

impl Predicate {
    pub fn attr_equals(attr: &str, value: &str) -> Self {
        Predicate::AttrEquals {
            attr: attr.to_string(),
            value: value.to_string(),
        }
    }

    pub fn attr_contains(attr: &str, needle: &str) -> Self {
        Predicate::AttrContains {
            attr: attr.to_string(),
            needle: needle.to_string(),
        }
    }

    pub fn tag(tag: &str) -> Self {
        Predicate::TagType {
            tag: tag.to_string(),
            input_type: None,
        }
    }

    pub fn tag_type(tag: &str, input_type: &str) -> Self {
        Predicate::TagType {
            tag: tag.to_string(),
            input_type: Some(input_type.to_string()),
        }
    }

    pub fn text(text: &str) -> Self {
        Predicate::Text {
            text: text.to_string(),
        }
    }
}

impl AutomationTarget {
    /// 角色的候选谓词列表，越靠前优先级越高
    pub fn candidates(self) -> Vec<Predicate> {
        match self {
            AutomationTarget::Username => vec![
                Predicate::attr_equals("id", "id"),
                Predicate::attr_equals("name", "id"),
                Predicate::attr_equals("id", "userId"),
                Predicate::attr_contains("placeholder", "학번"),
                Predicate::attr_contains("name", "user"),
            ],
            AutomationTarget::Password => vec![
                Predicate::attr_equals("id", "pwd"),
                Predicate::attr_equals("name", "pwd"),
                Predicate::attr_equals("id", "password"),
                Predicate::attr_contains("placeholder", "비밀번호"),
            ],
            AutomationTarget::Submit => vec![
                Predicate::attr_equals("id", "btn-login"),
                Predicate::attr_equals("id", "btnLogin"),
                Predicate::text("로그인"),
                Predicate::text("Login"),
            ],
            AutomationTarget::Search => vec![
                Predicate::attr_equals("id", "btnSearch"),
                Predicate::attr_equals("id", "btn-search"),
                Predicate::text("조회"),
                Predicate::text("검색"),
                Predicate::text("Search"),
            ],
            AutomationTarget::Register => vec![
                Predicate::attr_contains("class", "btn-apply"),
                Predicate::attr_contains("onclick", "apply"),
                Predicate::text("신청"),
                Predicate::text("Apply"),
            ],
            AutomationTarget::OpenLogin => vec![
                Predicate::attr_equals("id", "btn-open-login"),
                Predicate::attr_contains("href", "login"),
                Predicate::text("로그인"),
                Predicate::text("Login"),
            ],
        }
    }

    /// 候选列表全部落空时的最后兜底
    pub fn fallback(self) -> Vec<Predicate> {
        match self {
            AutomationTarget::Username => vec![Predicate::tag_type("input", "text")],
            AutomationTarget::Password => vec![Predicate::tag_type("input", "password")],
            AutomationTarget::Submit => vec![
                Predicate::tag_type("button", "submit"),
                Predicate::tag_type("input", "submit"),
            ],
            _ => Vec::new(),
        }
    }
}
