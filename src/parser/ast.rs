// ========================================
// nilo_studio データモデル定義
// ========================================

use crate::engine::config::RuntimeConfig;
use crate::engine::value::to_number;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ========================================
// プロジェクト全体
// ========================================

/// ビルダーが書き出すプロジェクトファイル（ランタイムが必要とする部分のみ）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub state_variables: Vec<StateVariable>,
    #[serde(default)]
    pub events: Vec<EventDefinition>,
    #[serde(default)]
    pub widgets: Vec<Widget>,
}

// ========================================
// 状態変数の宣言
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

/// 状態のスコープ（app / screen / ウィジェットインスタンス）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateScope {
    App,
    Screen,
    #[serde(alias = "widget")]
    Local,
}

impl StateScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateScope::App => "app",
            StateScope::Screen => "screen",
            StateScope::Local => "local",
        }
    }
}

impl FromStr for StateScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "app" => Ok(StateScope::App),
            "screen" => Ok(StateScope::Screen),
            "local" => Ok(StateScope::Local),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for StateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 状態スロットの宣言とデフォルト値（実行時の値とは別物）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVariable {
    pub id: String,
    pub key: String,
    #[serde(rename = "type")]
    pub var_type: VariableType,
    #[serde(default)]
    pub value: Value,
    pub scope: StateScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl StateVariable {
    /// デフォルト値が宣言された型と一致するか
    pub fn matches_type(&self) -> bool {
        matches!(
            (self.var_type, &self.value),
            (VariableType::String, Value::String(_))
                | (VariableType::Number, Value::Number(_))
                | (VariableType::Boolean, Value::Bool(_))
                | (VariableType::Array, Value::Array(_))
                | (VariableType::Object, Value::Object(_))
        )
    }
}

// ========================================
// アクション（typeで識別されるタグ付きユニオン）
// ========================================

/// ユーザーが組み立てる一つのアクション
///
/// JSON上は `{id, type, params}` の形で保存される。未知の `type` は読み込み時には
/// エラーにせず `ActionKind::Unsupported` として保持し、実行時に失敗させる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub struct Action {
    pub id: String,
    pub kind: ActionKind,
}

impl Action {
    pub fn new(id: impl Into<String>, kind: ActionKind) -> Self {
        Self { id: id.into(), kind }
    }

    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Navigation(NavigationParams),
    StateUpdate(StateUpdateParams),
    Recalculate(RecalculateParams),
    ApiCall(ApiCallParams),
    EmitEvent(EmitEventParams),
    Condition(ConditionParams),
    Toast(ToastParams),
    OpenWidget(WidgetTargetParams),
    CloseWidget(WidgetTargetParams),
    StopPropagation,
    Batch(BatchParams),
    Unsupported { type_name: String, params: Value },
}

impl ActionKind {
    pub fn type_name(&self) -> &str {
        match self {
            ActionKind::Navigation(_) => "navigation",
            ActionKind::StateUpdate(_) => "state_update",
            ActionKind::Recalculate(_) => "recalculate",
            ActionKind::ApiCall(_) => "api_call",
            ActionKind::EmitEvent(_) => "emit_event",
            ActionKind::Condition(_) => "condition",
            ActionKind::Toast(_) => "toast",
            ActionKind::OpenWidget(_) => "open_widget",
            ActionKind::CloseWidget(_) => "close_widget",
            ActionKind::StopPropagation => "stop_propagation",
            ActionKind::Batch(_) => "batch",
            ActionKind::Unsupported { type_name, .. } => type_name,
        }
    }

    /// 入れ子になった子アクション（condition / batch / api_call のコールバック）
    pub fn nested_actions(&self) -> Vec<&Action> {
        match self {
            ActionKind::Condition(p) => p.if_true.iter().chain(p.if_false.iter()).collect(),
            ActionKind::Batch(p) => p.actions.iter().collect(),
            ActionKind::ApiCall(p) => p.on_success.iter().chain(p.on_error.iter()).collect(),
            _ => Vec::new(),
        }
    }
}

/// シリアライズ時の中間表現
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawAction {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    params: Value,
}

fn decode_params<T: DeserializeOwned>(params: Value) -> Result<T, serde_json::Error> {
    // paramsが省略された場合は空オブジェクトとして扱う
    let params = if params.is_null() { Value::Object(Map::new()) } else { params };
    serde_json::from_value(params)
}

impl TryFrom<RawAction> for Action {
    type Error = String;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let RawAction { id, kind, params } = raw;
        let decoded = match kind.as_str() {
            "navigation" => decode_params(params).map(ActionKind::Navigation),
            "state_update" => decode_params(params).map(ActionKind::StateUpdate),
            "recalculate" => decode_params(params).map(ActionKind::Recalculate),
            "api_call" => decode_params(params).map(ActionKind::ApiCall),
            "emit_event" => decode_params(params).map(ActionKind::EmitEvent),
            "condition" => decode_params(params).map(ActionKind::Condition),
            "toast" => decode_params(params).map(ActionKind::Toast),
            "open_widget" => decode_params(params).map(ActionKind::OpenWidget),
            "close_widget" => decode_params(params).map(ActionKind::CloseWidget),
            "stop_propagation" => Ok(ActionKind::StopPropagation),
            "batch" => decode_params(params).map(ActionKind::Batch),
            _ => Ok(ActionKind::Unsupported {
                type_name: kind.clone(),
                params,
            }),
        };

        decoded
            .map(|kind| Action { id: id.clone(), kind })
            .map_err(|e| format!("invalid params for {} action '{}': {}", kind, id, e))
    }
}

impl From<Action> for RawAction {
    fn from(action: Action) -> Self {
        let kind = action.kind.type_name().to_string();
        let params = match action.kind {
            ActionKind::Navigation(p) => serde_json::to_value(p),
            ActionKind::StateUpdate(p) => serde_json::to_value(p),
            ActionKind::Recalculate(p) => serde_json::to_value(p),
            ActionKind::ApiCall(p) => serde_json::to_value(p),
            ActionKind::EmitEvent(p) => serde_json::to_value(p),
            ActionKind::Condition(p) => serde_json::to_value(p),
            ActionKind::Toast(p) => serde_json::to_value(p),
            ActionKind::OpenWidget(p) | ActionKind::CloseWidget(p) => serde_json::to_value(p),
            ActionKind::StopPropagation => Ok(Value::Null),
            ActionKind::Batch(p) => serde_json::to_value(p),
            ActionKind::Unsupported { params, .. } => Ok(params),
        };

        RawAction {
            id: action.id,
            kind,
            params: params.unwrap_or(Value::Null),
        }
    }
}

// ----------------------------------------
// 各アクションのパラメータ
// ----------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationType {
    #[default]
    NavigateTo,
    NavigateBack,
    OpenModal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationParams {
    #[serde(default)]
    pub navigation_type: NavigationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

// 入力欄由来の `"10"` のような文字列数値も受け付ける
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(Value::Null) => None,
        Some(value) => {
            let n = to_number(Some(&value));
            if n.is_finite() {
                Some(n)
            } else {
                log::warn!("ignoring non-numeric value {}", value);
                None
            }
        }
    })
}

fn lenient_duration<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(lenient_number(deserializer)?
        .filter(|ms| *ms >= 0.0)
        .map(|ms| ms.round() as u64))
}

fn default_operation() -> String {
    "set".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdateParams {
    /// `scope.path` 形式（例: `screen.cart.total`）
    pub target: String,
    #[serde(default = "default_operation")]
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub by: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculateParams {
    pub target: String,
    pub formula: String,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallParams {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_success: Vec<Action>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_error: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitEventParams {
    pub event_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionParams {
    pub condition: String,
    #[serde(default)]
    pub if_true: Vec<Action>,
    #[serde(default)]
    pub if_false: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToastParams {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, deserialize_with = "lenient_duration", skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetTargetParams {
    pub widget_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchParams {
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub atomic: bool,
}

// ========================================
// イベント定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Click,
    Change,
    Load,
    Submit,
    Hover,
    Custom,
}

impl FromStr for TriggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|_| format!("unknown trigger '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTrigger {
    pub on: TriggerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDefinition {
    pub id: String,
    pub trigger: EventTrigger,
    /// ガード条件（全て真のときだけアクションを実行する）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<String>>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl EventDefinition {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// emit_eventで指定された名前に反応するか
    pub fn listens_to(&self, event_name: &str) -> bool {
        match self.trigger.on {
            TriggerKind::Custom => {
                self.trigger.name.as_deref() == Some(event_name) || self.id == event_name
            }
            _ => false,
        }
    }
}

// ========================================
// ウィジェット
// ========================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub id: String,
    #[serde(rename = "type")]
    pub widget_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub size: Size,
    #[serde(default)]
    pub props: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

impl Widget {
    pub fn new(id: impl Into<String>, widget_type: impl Into<String>, size: Size) -> Self {
        Self {
            id: id.into(),
            widget_type: widget_type.into(),
            parent_id: None,
            position: Position::default(),
            size,
            props: Map::new(),
            actions: Vec::new(),
        }
    }

    pub fn is_container(&self) -> bool {
        self.widget_type == "container" || self.props.contains_key("children")
    }

    /// props.children に並んだ子ID（コンテナ上の表示順）
    pub fn child_ids(&self) -> Vec<String> {
        match self.props.get("children") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn set_child_ids(&mut self, ids: &[String]) {
        let items = ids.iter().cloned().map(Value::String).collect();
        self.props.insert("children".to_string(), Value::Array(items));
    }
}
