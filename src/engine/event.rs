// ========================================
// イベントディスパッチャー
// ========================================
//
// EventDefinition のガード条件を評価し、アクションを順番に実行する。
// emit_event による入れ子の発火は深さを引数で引き回し、上限で打ち切る。

use crate::engine::BoxFuture;
use crate::engine::action::{ActionEngine, EventEmitter};
use crate::engine::error::RuntimeError;
use crate::engine::result::RuntimeResult;
use crate::engine::state::{ActionContext, RuntimeState};
use crate::parser::ast::{EventDefinition, TriggerKind};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

const MAX_EVENT_LOG_ENTRIES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Executed,
    /// ガード条件が偽（エラーではない）
    Skipped,
    Disabled,
    Failed,
}

/// UIに表示するイベント履歴の一行
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogEntry {
    pub event_id: String,
    pub trigger: TriggerKind,
    pub result: EventOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub depth: usize,
}

pub struct EventDispatcher {
    engine: ActionEngine,
    registry: Vec<EventDefinition>,
    max_event_depth: usize,
    log: Mutex<VecDeque<EventLogEntry>>,
}

impl EventDispatcher {
    pub fn new(engine: ActionEngine, registry: Vec<EventDefinition>) -> Self {
        let max_event_depth = engine.config().max_event_depth;
        Self {
            engine,
            registry,
            max_event_depth,
            log: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_max_event_depth(mut self, depth: usize) -> Self {
        self.max_event_depth = depth;
        self
    }

    pub fn engine(&self) -> &ActionEngine {
        &self.engine
    }

    pub fn events(&self) -> &[EventDefinition] {
        &self.registry
    }

    pub fn max_event_depth(&self) -> usize {
        self.max_event_depth
    }

    /// 同じIDのイベントは置き換える
    pub fn register(&mut self, event: EventDefinition) {
        match self.registry.iter_mut().find(|e| e.id == event.id) {
            Some(existing) => *existing = event,
            None => self.registry.push(event),
        }
    }

    /// emit_event の名前に反応するイベント（登録順）
    pub fn listeners(&self, event_name: &str) -> Vec<&EventDefinition> {
        self.registry.iter().filter(|e| e.listens_to(event_name)).collect()
    }

    pub fn event_log(&self) -> Vec<EventLogEntry> {
        self.log
            .lock()
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear_event_log(&self) {
        if let Ok(mut log) = self.log.lock() {
            log.clear();
        }
    }

    /// トップレベルのイベント実行（深さ0から開始）
    pub async fn execute_event(
        &self,
        event: &EventDefinition,
        ctx: &ActionContext,
        state: &mut RuntimeState,
    ) -> RuntimeResult {
        self.dispatch(event, ctx, state, 0).await
    }

    fn dispatch<'a>(
        &'a self,
        event: &'a EventDefinition,
        ctx: &'a ActionContext,
        state: &'a mut RuntimeState,
        depth: usize,
    ) -> BoxFuture<'a, RuntimeResult> {
        Box::pin(async move {
            if depth >= self.max_event_depth {
                let error = RuntimeError::MaxEventDepthExceeded {
                    depth,
                    max: self.max_event_depth,
                };
                log::error!("❌ event '{}': {}", event.id, error);
                self.record(event, EventOutcome::Failed, Some(error.to_string()), depth);
                return RuntimeResult::failure(error);
            }

            if !event.is_enabled() {
                log::debug!("event '{}' is disabled", event.id);
                self.record(event, EventOutcome::Disabled, None, depth);
                return RuntimeResult::ok();
            }

            let guarded_out = match &event.conditions {
                Some(conditions) => {
                    let view = ctx.view(state);
                    let evaluator = self.engine.evaluator();
                    !conditions.iter().all(|c| evaluator.evaluate_condition(c, &view))
                }
                None => false,
            };
            if guarded_out {
                log::info!("event '{}' skipped by its conditions", event.id);
                self.record(event, EventOutcome::Skipped, None, depth);
                return RuntimeResult::ok();
            }

            log::info!("⚡ event '{}' (depth {})", event.id, depth);
            let scope = DispatchScope {
                dispatcher: self,
                depth: depth + 1,
            };
            let emitter: &dyn EventEmitter = &scope;

            let mut result = RuntimeResult::ok();
            for action in &event.actions {
                let inner = self.engine.run(action, ctx, state, Some(emitter)).await;
                let failed = !inner.success;
                result.absorb(inner);
                if failed {
                    break;
                }
            }

            let outcome = if result.success {
                EventOutcome::Executed
            } else {
                EventOutcome::Failed
            };
            self.record(event, outcome, result.error.clone(), depth);
            result
        })
    }

    fn record(&self, event: &EventDefinition, result: EventOutcome, error: Option<String>, depth: usize) {
        if let Ok(mut log) = self.log.lock() {
            if log.len() >= MAX_EVENT_LOG_ENTRIES {
                log.pop_front();
            }
            log.push_back(EventLogEntry {
                event_id: event.id.clone(),
                trigger: event.trigger.on,
                result,
                error,
                depth,
            });
        }
    }
}

/// 一つのディスパッチ連鎖の中で emit_event を受け取る
struct DispatchScope<'d> {
    dispatcher: &'d EventDispatcher,
    depth: usize,
}

impl EventEmitter for DispatchScope<'_> {
    fn emit<'a>(
        &'a self,
        event_name: &'a str,
        payload: Option<Value>,
        ctx: &'a ActionContext,
        state: &'a mut RuntimeState,
    ) -> BoxFuture<'a, RuntimeResult> {
        Box::pin(async move {
            let listeners = self.dispatcher.listeners(event_name);
            if listeners.is_empty() {
                log::warn!("emit_event '{}' has no listeners", event_name);
                return RuntimeResult::ok();
            }

            let child_ctx = ctx.with_params(payload);
            let mut result = RuntimeResult::ok();
            for event in listeners {
                let inner = self.dispatcher.dispatch(event, &child_ctx, state, self.depth).await;
                let failed = !inner.success;
                result.absorb(inner);
                if failed {
                    break;
                }
            }
            result
        })
    }
}
