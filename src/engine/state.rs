// ========================================
// ランタイム状態
// ========================================

use crate::engine::error::RuntimeError;
use crate::engine::path::get_path;
use crate::parser::ast::{StateScope, StateVariable};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// プレビュー中の状態（画面ロードで生成、アンロードで破棄）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeState {
    pub app: Value,
    pub screen: Value,
    /// ウィジェットインスタンスID → ローカル状態
    pub widgets: BTreeMap<String, Value>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            app: Value::Object(Map::new()),
            screen: Value::Object(Map::new()),
            widgets: BTreeMap::new(),
        }
    }
}

impl RuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 宣言済みの状態変数からapp / screenの初期値を作る
    ///
    /// localスコープの宣言はインスタンスごとに `init_widget_instance` で適用する。
    pub fn from_variables(variables: &[StateVariable]) -> Self {
        let mut state = Self::new();
        for var in variables {
            let root = match var.scope {
                StateScope::App => &mut state.app,
                StateScope::Screen => &mut state.screen,
                StateScope::Local => continue,
            };
            if let Value::Object(map) = root {
                map.insert(var.key.clone(), var.value.clone());
            }
        }
        state
    }

    /// ウィジェットインスタンスのローカル状態を宣言済みのデフォルトで初期化する
    pub fn init_widget_instance(&mut self, instance_id: &str, variables: &[StateVariable]) {
        let mut local = Map::new();
        for var in variables.iter().filter(|v| v.scope == StateScope::Local) {
            local.insert(var.key.clone(), var.value.clone());
        }
        log::debug!("init widget instance '{}' ({} keys)", instance_id, local.len());
        self.widgets.insert(instance_id.to_string(), Value::Object(local));
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn scope_root(&self, scope: StateScope, instance_id: Option<&str>) -> Option<&Value> {
        match scope {
            StateScope::App => Some(&self.app),
            StateScope::Screen => Some(&self.screen),
            StateScope::Local => instance_id.and_then(|id| self.widgets.get(id)),
        }
    }

    /// 書き込み先スコープのroot。localはインスタンスIDが必須で、未作成なら作る
    pub fn scope_root_mut(
        &mut self,
        scope: StateScope,
        instance_id: Option<&str>,
    ) -> Result<&mut Value, RuntimeError> {
        match scope {
            StateScope::App => Ok(&mut self.app),
            StateScope::Screen => Ok(&mut self.screen),
            StateScope::Local => {
                let id = instance_id.ok_or_else(|| {
                    RuntimeError::InvalidScope("local (no widget instance in context)".to_string())
                })?;
                Ok(self
                    .widgets
                    .entry(id.to_string())
                    .or_insert_with(|| Value::Object(Map::new())))
            }
        }
    }
}

// ========================================
// 式評価用の読み取りビュー
// ========================================

#[derive(Debug, Clone, Copy)]
pub struct ExpressionContext<'a> {
    pub app: &'a Value,
    pub screen: &'a Value,
    pub params: Option<&'a Value>,
    pub local: Option<&'a Value>,
}

impl<'a> ExpressionContext<'a> {
    pub fn new(app: &'a Value, screen: &'a Value) -> Self {
        Self {
            app,
            screen,
            params: None,
            local: None,
        }
    }

    pub fn with_params(mut self, params: &'a Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_local(mut self, local: &'a Value) -> Self {
        self.local = Some(local);
        self
    }

    /// `scope.path` を解決する（先頭セグメントがスコープ名）
    pub fn resolve(&self, path: &str) -> Option<Value> {
        let (scope, rest) = match path.split_once('.') {
            Some((scope, rest)) => (scope, Some(rest)),
            None => (path, None),
        };
        let root = match scope {
            "app" => self.app,
            "screen" => self.screen,
            "params" => self.params?,
            "local" => self.local?,
            _ => return None,
        };
        match rest {
            Some(rest) => get_path(root, rest),
            None => Some(root.clone()),
        }
    }
}

// ========================================
// アクション実行コンテキスト
// ========================================

/// イベント・アクションの呼び出し元が渡す追加情報
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionContext {
    /// ナビゲーション引数・emit_eventのpayload・APIレスポンスなど
    pub params: Option<Value>,
    /// インスタンスを持たない呼び出し元用のローカル値
    pub local: Option<Value>,
    /// 実行元のウィジェットインスタンス
    pub instance_id: Option<String>,
}

impl ActionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_instance(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: Some(instance_id.into()),
            ..Self::default()
        }
    }

    pub fn with_params(&self, params: Option<Value>) -> Self {
        Self {
            params,
            ..self.clone()
        }
    }

    /// paramsに1キー追加したコンテキスト（onSuccess / onError 用）
    pub fn with_param(&self, key: &str, value: Value) -> Self {
        let mut params = match &self.params {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        params.insert(key.to_string(), value);
        self.with_params(Some(Value::Object(params)))
    }

    /// 現在の状態に対する式評価ビュー
    pub fn view<'a>(&'a self, state: &'a RuntimeState) -> ExpressionContext<'a> {
        let local = self
            .instance_id
            .as_deref()
            .and_then(|id| state.widgets.get(id))
            .or(self.local.as_ref());
        ExpressionContext {
            app: &state.app,
            screen: &state.screen,
            params: self.params.as_ref(),
            local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::VariableType;
    use serde_json::json;

    fn var(key: &str, scope: StateScope, value: Value) -> StateVariable {
        StateVariable {
            id: format!("var_{}", key),
            key: key.to_string(),
            var_type: VariableType::Number,
            value,
            scope,
            description: None,
        }
    }

    #[test]
    fn test_from_variables_seeds_scopes() {
        let vars = vec![
            var("count", StateScope::App, json!(1)),
            var("total", StateScope::Screen, json!(40)),
            var("open", StateScope::Local, json!(false)),
        ];
        let mut state = RuntimeState::from_variables(&vars);
        assert_eq!(state.app, json!({ "count": 1 }));
        assert_eq!(state.screen, json!({ "total": 40 }));
        assert!(state.widgets.is_empty());

        state.init_widget_instance("card_1", &vars);
        assert_eq!(state.widgets["card_1"], json!({ "open": false }));

        state.reset();
        assert_eq!(state, RuntimeState::default());
    }

    #[test]
    fn test_local_scope_requires_instance() {
        let mut state = RuntimeState::new();
        assert!(matches!(
            state.scope_root_mut(StateScope::Local, None),
            Err(RuntimeError::InvalidScope(_))
        ));
        assert!(state.scope_root_mut(StateScope::Local, Some("w1")).is_ok());
        assert!(state.widgets.contains_key("w1"));
    }

    #[test]
    fn test_context_resolves_each_scope() {
        let mut state = RuntimeState::new();
        state.app = json!({ "user": { "name": "Aki" } });
        state.widgets.insert("w1".into(), json!({ "open": true }));

        let ctx = ActionContext::for_instance("w1").with_param("id", json!(7));
        let view = ctx.view(&state);
        assert_eq!(view.resolve("app.user.name"), Some(json!("Aki")));
        assert_eq!(view.resolve("local.open"), Some(json!(true)));
        assert_eq!(view.resolve("params.id"), Some(json!(7)));
        assert_eq!(view.resolve("screen.missing"), None);
        assert_eq!(view.resolve("other.value"), None);
    }
}
