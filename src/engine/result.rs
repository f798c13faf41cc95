use crate::engine::error::RuntimeError;
use crate::parser::ast::NavigationType;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// UIシェルへ渡す副作用シグナル（ランタイム自身は状態を持たない）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UiEffect {
    Navigate {
        navigation_type: NavigationType,
        target: Option<String>,
        params: Option<Value>,
    },
    Toast {
        message: String,
        variant: Option<String>,
        duration: Option<u64>,
    },
    OpenWidget {
        widget_id: String,
    },
    CloseWidget {
        widget_id: String,
    },
    StopPropagation,
    EmitEvent {
        event_name: String,
        payload: Option<Value>,
    },
}

/// アクション／イベント実行の結果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeResult {
    pub success: bool,
    /// 書き込んだパス → 新しい値
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub changes: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<UiEffect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RuntimeResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            changes: BTreeMap::new(),
            error: None,
            effects: Vec::new(),
            data: None,
        }
    }

    pub fn failure(error: RuntimeError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::ok()
        }
    }

    pub fn with_change(mut self, path: impl Into<String>, value: Value) -> Self {
        self.changes.insert(path.into(), value);
        self
    }

    pub fn with_effect(mut self, effect: UiEffect) -> Self {
        self.effects.push(effect);
        self
    }

    /// 子の結果を取り込む。成功はAND、エラーは最初のものを残す。
    pub fn absorb(&mut self, other: RuntimeResult) {
        self.success &= other.success;
        if self.error.is_none() {
            self.error = other.error;
        }
        self.changes.extend(other.changes);
        self.effects.extend(other.effects);
        if other.data.is_some() {
            self.data = other.data;
        }
    }

    pub fn stops_propagation(&self) -> bool {
        self.effects.iter().any(|e| matches!(e, UiEffect::StopPropagation))
    }
}
