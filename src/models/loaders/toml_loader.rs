use crate::models::macro_config::CourseQuery;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

/// TOML 科目文件的结构
///
/// ```toml
/// [[subjects]]
/// code = "COSE101"
/// name = "컴퓨터프로그래밍"
/// ```
#[derive(Debug, Deserialize)]
struct SubjectsFile {
    #[serde(default)]
    subjects: Vec<CourseQuery>,
}

/// 从 TOML 文件加载科目列表
pub async fn load_subjects_file(toml_file_path: &Path) -> Result<Vec<CourseQuery>> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let file: SubjectsFile = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    Ok(file.subjects)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_subjects_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spring.toml");
        std::fs::write(
            &path,
            "[[subjects]]\ncode = \"COSE101\"\nname = \"컴퓨터프로그래밍\"\n\n[[subjects]]\ncode = \"MATH152\"\n",
        )
        .unwrap();

        let subjects = load_subjects_file(&path).await.unwrap();
        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0], CourseQuery::new("COSE101", "컴퓨터프로그래밍"));
        assert_eq!(subjects[1].name, "");
    }
}
