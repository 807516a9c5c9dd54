use serde::{Deserialize, Serialize};
use std::fmt;

/// 登录凭据（学号 + 密码）
///
/// 只通过显式的设置/重置写入；日志中只允许出现掩码形式。
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub identifier: String,
    pub secret: String,
}

impl Credential {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }

    /// 学号掩码，只保留首尾各两位
    pub fn masked_identifier(&self) -> String {
        let chars: Vec<char> = self.identifier.chars().collect();
        if chars.len() <= 4 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..2].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{}{}{}", head, "*".repeat(chars.len() - 4), tail)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identifier", &self.masked_identifier())
            .field("secret", &"******")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_never_prints_cleartext() {
        let credential = Credential::new("2020123456", "pw-secret");
        let printed = format!("{:?}", credential);
        assert!(!printed.contains("2020123456"));
        assert!(!printed.contains("pw-secret"));
        assert!(printed.contains("20******56"));
    }

    #[test]
    fn test_short_identifier_fully_masked() {
        assert_eq!(Credential::new("abc", "x").masked_identifier(), "***");
    }
}
