// ========================================
// アクション実行エンジン
// ========================================
//
// `Action` の種類ごとに状態更新・副作用シグナル・HTTP呼び出しを行う。
// 失敗は呼び出し元へ投げず、`RuntimeResult` として返す。

use crate::engine::BoxFuture;
use crate::engine::api_call::{ApiRequest, HttpTransport, ReqwestTransport, check_domain};
use crate::engine::config::RuntimeConfig;
use crate::engine::error::RuntimeError;
use crate::engine::expr::ExpressionEvaluator;
use crate::engine::path::{get_path, set_path};
use crate::engine::result::{RuntimeResult, UiEffect};
use crate::engine::state::{ActionContext, RuntimeState};
use crate::engine::value::{coerce_index, display, number_value, to_number_or_zero};
use crate::parser::ast::{
    Action, ActionKind, ApiCallParams, BatchParams, ConditionParams, StateScope, StateUpdateParams,
    ToastParams,
};
use serde_json::{Value, json};
use std::sync::Arc;

/// emit_event を実際のイベントへ中継する相手（EventDispatcherが実装する）
pub trait EventEmitter: Sync {
    fn emit<'a>(
        &'a self,
        event_name: &'a str,
        payload: Option<Value>,
        ctx: &'a ActionContext,
        state: &'a mut RuntimeState,
    ) -> BoxFuture<'a, RuntimeResult>;
}

pub struct ActionEngine {
    evaluator: ExpressionEvaluator,
    transport: Arc<dyn HttpTransport>,
    config: RuntimeConfig,
}

impl ActionEngine {
    pub fn new(config: RuntimeConfig) -> Self {
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout_ms));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: RuntimeConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            evaluator: ExpressionEvaluator::new(),
            transport,
            config,
        }
    }

    pub fn evaluator(&self) -> &ExpressionEvaluator {
        &self.evaluator
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// 単体でアクションを実行する（emit_event はシグナルのみ）
    pub async fn execute_action(
        &self,
        action: &Action,
        ctx: &ActionContext,
        state: &mut RuntimeState,
    ) -> RuntimeResult {
        self.run(action, ctx, state, None).await
    }

    /// emit_event の中継先を指定して実行する
    pub fn run<'a>(
        &'a self,
        action: &'a Action,
        ctx: &'a ActionContext,
        state: &'a mut RuntimeState,
        emitter: Option<&'a dyn EventEmitter>,
    ) -> BoxFuture<'a, RuntimeResult> {
        Box::pin(async move {
            log::debug!("▶ action {} ({})", action.id, action.type_name());

            let result = match &action.kind {
                ActionKind::StateUpdate(params) => {
                    into_result(self.state_update(params, ctx, state))
                }
                ActionKind::Recalculate(params) => {
                    let value = {
                        let view = ctx.view(state);
                        self.evaluator.evaluate(&params.formula, &view)
                    };
                    into_result(self.write_target(
                        &params.target,
                        value.unwrap_or(Value::Null),
                        ctx,
                        state,
                    ))
                }
                ActionKind::Navigation(params) => RuntimeResult::ok().with_effect(UiEffect::Navigate {
                    navigation_type: params.navigation_type,
                    target: params.target.clone(),
                    params: params.params.clone(),
                }),
                ActionKind::Toast(params) => self.toast(params, ctx, state),
                ActionKind::EmitEvent(params) => {
                    log::info!("📣 emit_event '{}'", params.event_name);
                    let mut result = RuntimeResult::ok().with_effect(UiEffect::EmitEvent {
                        event_name: params.event_name.clone(),
                        payload: params.payload.clone(),
                    });
                    if let Some(emitter) = emitter {
                        let fired = emitter
                            .emit(&params.event_name, params.payload.clone(), ctx, state)
                            .await;
                        result.absorb(fired);
                    }
                    result
                }
                ActionKind::Condition(params) => self.condition(params, ctx, state, emitter).await,
                ActionKind::Batch(params) => self.batch(params, ctx, state, emitter).await,
                ActionKind::ApiCall(params) => self.api_call(params, ctx, state, emitter).await,
                ActionKind::OpenWidget(params) => RuntimeResult::ok().with_effect(UiEffect::OpenWidget {
                    widget_id: params.widget_id.clone(),
                }),
                ActionKind::CloseWidget(params) => {
                    RuntimeResult::ok().with_effect(UiEffect::CloseWidget {
                        widget_id: params.widget_id.clone(),
                    })
                }
                ActionKind::StopPropagation => RuntimeResult::ok().with_effect(UiEffect::StopPropagation),
                ActionKind::Unsupported { type_name, .. } => {
                    RuntimeResult::failure(RuntimeError::UnsupportedActionType(type_name.clone()))
                }
            };

            if let Some(error) = &result.error {
                log::warn!("action {} ({}) failed: {}", action.id, action.type_name(), error);
            }
            result
        })
    }

    // ========================================
    // 状態更新
    // ========================================

    fn state_update(
        &self,
        params: &StateUpdateParams,
        ctx: &ActionContext,
        state: &mut RuntimeState,
    ) -> Result<RuntimeResult, RuntimeError> {
        let (scope, path) = split_target(&params.target)?;
        let current = state
            .scope_root(scope, ctx.instance_id.as_deref())
            .and_then(|root| get_path(root, path));

        let new_value = match params.operation.as_str() {
            "set" => self.operand(params, ctx, state),
            "increment" | "decrement" => {
                let by = params.by.unwrap_or(1.0);
                let base = to_number_or_zero(current.as_ref());
                let next = if params.operation == "increment" { base + by } else { base - by };
                number_value(next).unwrap_or(Value::Null)
            }
            "push" => {
                let mut items = match current {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                items.push(self.operand(params, ctx, state));
                Value::Array(items)
            }
            "remove_by_index" => {
                let items = match current {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                let index = coerce_index(Some(&self.operand(params, ctx, state)));
                let kept = items
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| Some(*i as i64) != index)
                    .map(|(_, v)| v)
                    .collect();
                Value::Array(kept)
            }
            other => return Err(RuntimeError::UnsupportedOperation(other.to_string())),
        };

        self.write_target(&params.target, new_value, ctx, state)
    }

    /// set / push / remove_by_index に渡す値（expression が優先）
    fn operand(&self, params: &StateUpdateParams, ctx: &ActionContext, state: &RuntimeState) -> Value {
        match &params.expression {
            Some(expression) => {
                let view = ctx.view(state);
                self.evaluator.evaluate(expression, &view).unwrap_or(Value::Null)
            }
            None => params.value.clone().unwrap_or(Value::Null),
        }
    }

    fn write_target(
        &self,
        target: &str,
        value: Value,
        ctx: &ActionContext,
        state: &mut RuntimeState,
    ) -> Result<RuntimeResult, RuntimeError> {
        let (scope, path) = split_target(target)?;
        let root = state.scope_root_mut(scope, ctx.instance_id.as_deref())?;
        set_path(root, path, value.clone());
        log::info!("📝 {} = {}", target, value);
        Ok(RuntimeResult::ok().with_change(target, value))
    }

    // ========================================
    // 副作用シグナル
    // ========================================

    fn toast(&self, params: &ToastParams, ctx: &ActionContext, state: &RuntimeState) -> RuntimeResult {
        let view = ctx.view(state);
        let message = if params.message.contains('{') {
            self.evaluator.interpolate(&params.message, &view)
        } else {
            display(self.evaluator.evaluate(&params.message, &view).as_ref())
        };
        log::info!("💬 toast: {}", message);
        RuntimeResult::ok().with_effect(UiEffect::Toast {
            message,
            variant: params.variant.clone(),
            duration: params.duration,
        })
    }

    // ========================================
    // 制御フロー
    // ========================================

    /// 選ばれた分岐を全て実行する（途中の失敗では止めない）
    async fn condition(
        &self,
        params: &ConditionParams,
        ctx: &ActionContext,
        state: &mut RuntimeState,
        emitter: Option<&dyn EventEmitter>,
    ) -> RuntimeResult {
        let passed = {
            let view = ctx.view(state);
            self.evaluator.evaluate_condition(&params.condition, &view)
        };
        let branch = if passed { &params.if_true } else { &params.if_false };
        log::debug!("condition '{}' -> {}", params.condition, passed);

        let mut result = RuntimeResult::ok();
        for action in branch {
            let inner = self.run(action, ctx, state, emitter).await;
            result.absorb(inner);
        }
        result
    }

    /// 配列順に実行する。atomic の場合は最初の失敗で止めるが、巻き戻しはしない
    async fn batch(
        &self,
        params: &BatchParams,
        ctx: &ActionContext,
        state: &mut RuntimeState,
        emitter: Option<&dyn EventEmitter>,
    ) -> RuntimeResult {
        let mut result = RuntimeResult::ok();
        for action in &params.actions {
            let inner = self.run(action, ctx, state, emitter).await;
            let failed = !inner.success;
            result.absorb(inner);
            if failed && params.atomic {
                log::warn!("atomic batch stopped at {}, earlier changes are kept", action.id);
                break;
            }
        }
        result
    }

    // ========================================
    // HTTP
    // ========================================

    async fn api_call(
        &self,
        params: &ApiCallParams,
        ctx: &ActionContext,
        state: &mut RuntimeState,
        emitter: Option<&dyn EventEmitter>,
    ) -> RuntimeResult {
        let url = if params.url.contains('{') {
            let view = ctx.view(state);
            self.evaluator.interpolate(&params.url, &view)
        } else {
            params.url.clone()
        };

        let allowed = params
            .allowed_domains
            .as_deref()
            .unwrap_or(&self.config.allowed_domains);
        if let Err(e) = check_domain(&url, allowed) {
            return RuntimeResult::failure(e);
        }

        let request = ApiRequest {
            method: params.method.clone(),
            url,
            headers: params.headers.clone(),
            body: params.body.clone(),
        };

        let (mut result, callbacks, error_ctx) = match self.transport.send(request).await {
            Ok(response) if response.is_success() => {
                let success_ctx = ctx.with_param("response", response.body.clone());
                let data = match &params.map_response {
                    Some(expression) => {
                        let view = success_ctx.view(state);
                        self.evaluator.evaluate(expression, &view)
                    }
                    None => Some(response.body),
                };

                let mut result = RuntimeResult::ok();
                for action in &params.on_success {
                    let inner = self.run(action, &success_ctx, state, emitter).await;
                    result.absorb(inner);
                }
                result.data = data;
                return result;
            }
            Ok(response) => {
                let error = json!({
                    "status": response.status,
                    "statusText": response.status_text,
                    "body": response.body,
                });
                let failure = RuntimeResult::failure(RuntimeError::HttpError {
                    status: response.status,
                    status_text: response.status_text,
                });
                (failure, &params.on_error, ctx.with_param("error", error))
            }
            Err(e) => {
                let error = json!({ "message": e.to_string() });
                (RuntimeResult::failure(e), &params.on_error, ctx.with_param("error", error))
            }
        };

        for action in callbacks {
            let inner = self.run(action, &error_ctx, state, emitter).await;
            result.absorb(inner);
        }
        result
    }
}

fn into_result(outcome: Result<RuntimeResult, RuntimeError>) -> RuntimeResult {
    outcome.unwrap_or_else(RuntimeResult::failure)
}

/// `scope.path` を分解する
fn split_target(target: &str) -> Result<(StateScope, &str), RuntimeError> {
    let (scope, path) = target
        .split_once('.')
        .ok_or_else(|| RuntimeError::InvalidScope(target.to_string()))?;
    if path.is_empty() {
        return Err(RuntimeError::InvalidScope(target.to_string()));
    }
    let scope = scope.parse::<StateScope>().map_err(RuntimeError::InvalidScope)?;
    Ok((scope, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::api_call::ApiResponse;
    use crate::parser::ast::{
        EmitEventParams, NavigationParams, NavigationType, RecalculateParams, WidgetTargetParams,
    };
    use std::sync::Mutex;

    /// 固定レスポンスを返し、受け取ったリクエストを記録する
    struct FakeTransport {
        response: Result<ApiResponse, RuntimeError>,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl FakeTransport {
        fn new(response: Result<ApiResponse, RuntimeError>) -> Arc<Self> {
            Arc::new(Self {
                response,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    impl HttpTransport for FakeTransport {
        fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, RuntimeError>> {
            self.requests.lock().unwrap().push(request);
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    fn engine() -> ActionEngine {
        ActionEngine::new(RuntimeConfig::default())
    }

    fn update(target: &str, operation: &str, value: Option<Value>, by: Option<f64>) -> Action {
        Action::new(
            format!("{}_{}", operation, target),
            ActionKind::StateUpdate(StateUpdateParams {
                target: target.to_string(),
                operation: operation.to_string(),
                value,
                expression: None,
                by,
            }),
        )
    }

    fn state_with_screen(screen: Value) -> RuntimeState {
        RuntimeState {
            screen,
            ..RuntimeState::default()
        }
    }

    #[tokio::test]
    async fn test_increment_reports_change() {
        let mut state = state_with_screen(json!({ "cart": { "total": 40 } }));
        let action = update("screen.cart.total", "increment", None, Some(10.0));

        let result = engine().execute_action(&action, &ActionContext::new(), &mut state).await;

        assert!(result.success);
        assert_eq!(state.screen["cart"]["total"], json!(50));
        assert_eq!(result.changes.get("screen.cart.total"), Some(&json!(50)));
    }

    #[tokio::test]
    async fn test_increment_step_ignores_value() {
        let mut state = RuntimeState::new();
        state.app = json!({ "n": 40 });
        let action = update("app.n", "increment", Some(json!(7)), None);

        let result = engine().execute_action(&action, &ActionContext::new(), &mut state).await;

        assert_eq!(result.changes.get("app.n"), Some(&json!(41)));
    }

    #[tokio::test]
    async fn test_decrement_missing_defaults_to_zero() {
        let mut state = RuntimeState::new();
        let action = update("app.counter", "decrement", None, None);
        let result = engine().execute_action(&action, &ActionContext::new(), &mut state).await;
        assert!(result.success);
        assert_eq!(state.app["counter"], json!(-1));
    }

    #[tokio::test]
    async fn test_push_and_remove_by_index() {
        let mut state = RuntimeState::new();
        let engine = engine();
        let ctx = ActionContext::new();

        for item in ["a", "b", "c"] {
            let action = update("app.items", "push", Some(json!(item)), None);
            assert!(engine.execute_action(&action, &ctx, &mut state).await.success);
        }
        let remove = update("app.items", "remove_by_index", Some(json!("1")), None);
        let result = engine.execute_action(&remove, &ctx, &mut state).await;

        assert!(result.success);
        assert_eq!(state.app["items"], json!(["a", "c"]));
    }

    #[tokio::test]
    async fn test_set_prefers_expression() {
        let mut state = state_with_screen(json!({ "price": 3, "qty": 4 }));
        let action = Action::new(
            "set_total",
            ActionKind::StateUpdate(StateUpdateParams {
                target: "screen.total".into(),
                operation: "set".into(),
                value: Some(json!("ignored")),
                expression: Some("{screen.price} * {screen.qty}".into()),
                by: None,
            }),
        );
        engine().execute_action(&action, &ActionContext::new(), &mut state).await;
        assert_eq!(state.screen["total"], json!(12));
    }

    #[tokio::test]
    async fn test_invalid_scope_and_operation() {
        let mut state = RuntimeState::new();
        let engine = engine();
        let ctx = ActionContext::new();

        let bad_scope = update("session.user", "set", Some(json!(1)), None);
        let result = engine.execute_action(&bad_scope, &ctx, &mut state).await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("InvalidScope"));

        let no_instance = update("local.open", "set", Some(json!(true)), None);
        let result = engine.execute_action(&no_instance, &ctx, &mut state).await;
        assert!(result.error.unwrap().starts_with("InvalidScope"));

        let bad_op = update("app.count", "multiply", Some(json!(2)), None);
        let result = engine.execute_action(&bad_op, &ctx, &mut state).await;
        assert_eq!(result.error.as_deref(), Some("UnsupportedOperation: multiply"));
        assert_eq!(state, RuntimeState::new());
    }

    #[tokio::test]
    async fn test_local_scope_writes_widget_instance() {
        let mut state = RuntimeState::new();
        let ctx = ActionContext::for_instance("card_1");
        let action = update("local.open", "set", Some(json!(true)), None);
        let result = engine().execute_action(&action, &ctx, &mut state).await;
        assert!(result.success);
        assert_eq!(state.widgets["card_1"], json!({ "open": true }));
    }

    #[tokio::test]
    async fn test_recalculate_reduce_sum() {
        let mut state = state_with_screen(json!({
            "cart": { "items": [ { "price": 10, "count": 2 }, { "price": 20, "count": 1 } ] }
        }));
        let action = Action::new(
            "recalc",
            ActionKind::Recalculate(RecalculateParams {
                target: "screen.cart.total".into(),
                formula: "{screen.cart.items}.reduce((sum, item) => sum + item.price * item.count, 0)"
                    .into(),
            }),
        );
        let result = engine().execute_action(&action, &ActionContext::new(), &mut state).await;
        assert!(result.success);
        assert_eq!(state.screen["cart"]["total"], json!(40));
    }

    #[tokio::test]
    async fn test_condition_runs_only_selected_branch() {
        let condition = |flag: bool| {
            Action::new(
                "cond",
                ActionKind::Condition(ConditionParams {
                    condition: format!("{}", flag),
                    if_true: vec![update("app.branch", "set", Some(json!("true")), None)],
                    if_false: vec![update("app.branch", "set", Some(json!("false")), None)],
                }),
            )
        };
        let engine = engine();

        for flag in [true, false] {
            let mut state = RuntimeState::new();
            let result = engine
                .execute_action(&condition(flag), &ActionContext::new(), &mut state)
                .await;
            assert!(result.success);
            assert_eq!(state.app["branch"], json!(flag.to_string()));
            assert_eq!(result.changes.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_condition_is_best_effort() {
        let action = Action::new(
            "cond",
            ActionKind::Condition(ConditionParams {
                condition: "true".into(),
                if_true: vec![
                    update("bogus.value", "set", Some(json!(1)), None),
                    update("app.after", "set", Some(json!(2)), None),
                ],
                if_false: vec![],
            }),
        );
        let mut state = RuntimeState::new();
        let result = engine().execute_action(&action, &ActionContext::new(), &mut state).await;
        assert!(!result.success);
        assert_eq!(state.app["after"], json!(2));
    }

    #[tokio::test]
    async fn test_atomic_batch_stops_without_rollback() {
        let actions = vec![
            update("app.first", "set", Some(json!(1)), None),
            update("bogus.value", "set", Some(json!(1)), None),
            update("app.third", "set", Some(json!(3)), None),
        ];
        let engine = engine();

        let mut state = RuntimeState::new();
        let atomic = Action::new(
            "batch",
            ActionKind::Batch(BatchParams { actions: actions.clone(), atomic: true }),
        );
        let result = engine.execute_action(&atomic, &ActionContext::new(), &mut state).await;
        assert!(!result.success);
        assert_eq!(state.app, json!({ "first": 1 }));

        let mut state = RuntimeState::new();
        let loose = Action::new("batch", ActionKind::Batch(BatchParams { actions, atomic: false }));
        let result = engine.execute_action(&loose, &ActionContext::new(), &mut state).await;
        assert!(!result.success);
        assert_eq!(state.app, json!({ "first": 1, "third": 3 }));
    }

    #[tokio::test]
    async fn test_signal_actions_do_not_touch_state() {
        let actions = vec![
            Action::new(
                "nav",
                ActionKind::Navigation(NavigationParams {
                    navigation_type: NavigationType::OpenModal,
                    target: Some("checkout".into()),
                    params: None,
                }),
            ),
            Action::new(
                "open",
                ActionKind::OpenWidget(WidgetTargetParams { widget_id: "sheet".into() }),
            ),
            Action::new("stop", ActionKind::StopPropagation),
            Action::new(
                "emit",
                ActionKind::EmitEvent(EmitEventParams { event_name: "refresh".into(), payload: None }),
            ),
        ];
        let engine = engine();
        let mut state = RuntimeState::new();
        for action in &actions {
            let result = engine.execute_action(action, &ActionContext::new(), &mut state).await;
            assert!(result.success);
            assert_eq!(result.effects.len(), 1);
        }
        assert_eq!(state, RuntimeState::new());
    }

    #[tokio::test]
    async fn test_toast_message_bindings() {
        let mut state = RuntimeState::new();
        state.app = json!({ "user": { "name": "Aki" } });
        let action = Action::new(
            "toast",
            ActionKind::Toast(ToastParams {
                message: "Welcome, {app.user.name}!".into(),
                variant: Some("success".into()),
                duration: None,
            }),
        );
        let result = engine().execute_action(&action, &ActionContext::new(), &mut state).await;
        assert_eq!(
            result.effects,
            vec![UiEffect::Toast {
                message: "Welcome, Aki!".into(),
                variant: Some("success".into()),
                duration: None,
            }]
        );
    }

    #[tokio::test]
    async fn test_unknown_action_type() {
        let action: Action = serde_json::from_value(json!({
            "id": "x", "type": "vibrate", "params": { "ms": 20 }
        }))
        .unwrap();
        let mut state = RuntimeState::new();
        let result = engine().execute_action(&action, &ActionContext::new(), &mut state).await;
        assert_eq!(result.error.as_deref(), Some("UnsupportedActionType: vibrate"));
    }

    fn api_call(url: &str) -> ApiCallParams {
        ApiCallParams {
            method: "POST".into(),
            url: url.into(),
            headers: Default::default(),
            body: Some(json!({ "q": 1 })),
            allowed_domains: None,
            on_success: vec![Action::new(
                "store",
                ActionKind::StateUpdate(StateUpdateParams {
                    target: "screen.items".into(),
                    operation: "set".into(),
                    value: None,
                    expression: Some("{params.response.items}".into()),
                    by: None,
                }),
            )],
            on_error: vec![Action::new(
                "remember_error",
                ActionKind::StateUpdate(StateUpdateParams {
                    target: "screen.lastError".into(),
                    operation: "set".into(),
                    value: None,
                    expression: Some("{params.error.status}".into()),
                    by: None,
                }),
            )],
            map_response: Some("{params.response.items}.length".into()),
        }
    }

    #[tokio::test]
    async fn test_api_call_rejects_unlisted_host() {
        let transport = FakeTransport::new(Err(RuntimeError::transport("unreachable")));
        let engine = ActionEngine::with_transport(RuntimeConfig::default(), transport.clone());
        let action = Action::new("fetch", ActionKind::ApiCall(api_call("https://api.example.com/items")));
        let mut state = RuntimeState::new();

        let result = engine.execute_action(&action, &ActionContext::new(), &mut state).await;

        assert_eq!(result.error.as_deref(), Some("DomainNotAllowed: api.example.com"));
        assert!(transport.requests.lock().unwrap().is_empty());
        assert_eq!(state, RuntimeState::new());
    }

    #[tokio::test]
    async fn test_api_call_success_runs_on_success() {
        let transport = FakeTransport::new(Ok(ApiResponse {
            status: 200,
            status_text: "OK".into(),
            body: json!({ "items": [1, 2, 3] }),
        }));
        let engine = ActionEngine::with_transport(RuntimeConfig::default(), transport.clone());
        let action = Action::new("fetch", ActionKind::ApiCall(api_call("http://localhost:8080/items")));
        let mut state = RuntimeState::new();

        let result = engine.execute_action(&action, &ActionContext::new(), &mut state).await;

        assert!(result.success);
        assert_eq!(state.screen["items"], json!([1, 2, 3]));
        assert_eq!(result.data, Some(json!(3)));
        assert!(state.screen.get("lastError").is_none());
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].body, Some(json!({ "q": 1 })));
    }

    #[tokio::test]
    async fn test_api_call_http_error_runs_on_error() {
        let transport = FakeTransport::new(Ok(ApiResponse {
            status: 503,
            status_text: "Service Unavailable".into(),
            body: Value::Null,
        }));
        let engine = ActionEngine::with_transport(RuntimeConfig::default(), transport);
        let action = Action::new("fetch", ActionKind::ApiCall(api_call("http://127.0.0.1/items")));
        let mut state = RuntimeState::new();

        let result = engine.execute_action(&action, &ActionContext::new(), &mut state).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("HttpError(503): Service Unavailable"));
        assert_eq!(state.screen["lastError"], json!(503));
        assert!(state.screen.get("items").is_none());
    }

    #[tokio::test]
    async fn test_api_call_action_level_allow_list() {
        let transport = FakeTransport::new(Ok(ApiResponse {
            status: 204,
            status_text: "No Content".into(),
            body: Value::Null,
        }));
        let engine = ActionEngine::with_transport(RuntimeConfig::default(), transport);
        let mut params = api_call("https://api.example.com/ping");
        params.allowed_domains = Some(vec!["api.example.com".into()]);
        params.on_success.clear();
        params.map_response = None;
        let action = Action::new("ping", ActionKind::ApiCall(params));
        let mut state = RuntimeState::new();

        let result = engine.execute_action(&action, &ActionContext::new(), &mut state).await;
        assert!(result.success);
        assert_eq!(result.data, Some(Value::Null));
    }
}
