pub mod arith;
pub mod ast;

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid project file: {0}")]
    Json(#[from] serde_json::Error),
}

// プロジェクトファイルを読み込んで返す。
pub fn parse_project_file<P: AsRef<Path>>(path: P) -> Result<ast::Project, LoadError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    parse_embedded_project(&source)
}

// 埋め込まれたプロジェクトJSONをパースする関数
pub fn parse_embedded_project(source: &str) -> Result<ast::Project, LoadError> {
    let project: ast::Project = serde_json::from_str(source)?;
    log::debug!(
        "project {:?}: {} state variable(s), {} event(s), {} widget(s)",
        project.name,
        project.state_variables.len(),
        project.events.len(),
        project.widgets.len()
    );
    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_project_uses_defaults() {
        let project = parse_embedded_project("{}").unwrap();
        assert!(project.events.is_empty());
        assert_eq!(project.runtime.max_event_depth, 10);
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let err = parse_embedded_project("{ \"events\": 3 }").unwrap_err();
        assert!(matches!(err, LoadError::Json(_)));
    }

    #[test]
    fn test_string_step_does_not_break_loading() {
        let source = r#"{
            "events": [{
                "id": "bump",
                "trigger": { "on": "click", "elementId": "plus" },
                "actions": [{
                    "id": "a", "type": "state_update",
                    "params": { "target": "app.n", "operation": "increment", "by": "10" }
                }]
            }]
        }"#;
        let project = parse_embedded_project(source).unwrap();
        match &project.events[0].actions[0].kind {
            ast::ActionKind::StateUpdate(p) => assert_eq!(p.by, Some(10.0)),
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = parse_project_file("/nonexistent/project.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/project.json"));
    }
}
