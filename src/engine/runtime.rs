// ========================================
// プレビューセッション
// ========================================
//
// 一つの画面のプレビュー実行を管理する。UIからのトリガー（クリック・変更など）を
// 該当する EventDefinition に振り分け、状態とイベント履歴を保持する。

use crate::engine::action::ActionEngine;
use crate::engine::api_call::HttpTransport;
use crate::engine::event::{EventDispatcher, EventLogEntry};
use crate::engine::result::RuntimeResult;
use crate::engine::state::{ActionContext, RuntimeState};
use crate::parser::ast::{EventDefinition, Project, StateScope, StateVariable, TriggerKind};
use serde_json::Value;
use std::sync::Arc;

pub struct PreviewSession {
    dispatcher: EventDispatcher,
    variables: Vec<StateVariable>,
    widget_ids: Vec<String>,
    state: RuntimeState,
    loaded: bool,
}

impl PreviewSession {
    pub fn new(project: &Project) -> Self {
        Self::from_engine(project, ActionEngine::new(project.runtime.clone()))
    }

    pub fn with_transport(project: &Project, transport: Arc<dyn HttpTransport>) -> Self {
        Self::from_engine(
            project,
            ActionEngine::with_transport(project.runtime.clone(), transport),
        )
    }

    fn from_engine(project: &Project, engine: ActionEngine) -> Self {
        Self {
            dispatcher: EventDispatcher::new(engine, project.events.clone()),
            variables: project.state_variables.clone(),
            widget_ids: project.widgets.iter().map(|w| w.id.clone()).collect(),
            state: RuntimeState::new(),
            loaded: false,
        }
    }

    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RuntimeState {
        &mut self.state
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// 画面ロード: 状態を宣言済みの初期値で作り直し、loadイベントを発火する
    pub async fn load_screen(&mut self, ctx: &ActionContext) -> RuntimeResult {
        self.state = RuntimeState::from_variables(&self.variables);
        if self.variables.iter().any(|v| v.scope == StateScope::Local) {
            for id in &self.widget_ids {
                self.state.init_widget_instance(id, &self.variables);
            }
        }
        self.dispatcher.clear_event_log();
        self.loaded = true;
        log::info!("🚀 screen loaded ({} state variables)", self.variables.len());

        self.trigger(TriggerKind::Load, None, ctx).await
    }

    pub fn unload_screen(&mut self) {
        self.state.reset();
        self.loaded = false;
        log::info!("screen unloaded");
    }

    /// トリガー種別と要素IDに一致する有効なイベント。elementIdのないイベントはどの要素にも一致する
    pub fn matching_events(&self, on: TriggerKind, element_id: Option<&str>) -> Vec<&EventDefinition> {
        matching(self.dispatcher.events(), on, element_id)
    }

    /// UIトリガーを処理する。stop_propagation が出たら残りのイベントは実行しない
    pub async fn trigger(
        &mut self,
        on: TriggerKind,
        element_id: Option<&str>,
        ctx: &ActionContext,
    ) -> RuntimeResult {
        let Self { dispatcher, state, .. } = self;
        let events = matching(dispatcher.events(), on, element_id);
        log::debug!("trigger {:?} on {:?}: {} event(s)", on, element_id, events.len());

        let mut result = RuntimeResult::ok();
        for event in events {
            let inner = dispatcher.execute_event(event, ctx, state).await;
            let stop = inner.stops_propagation();
            result.absorb(inner);
            if stop {
                log::debug!("propagation stopped by '{}'", event.id);
                break;
            }
        }
        result
    }

    /// カスタムイベントを名前で発火する（payloadはparamsとして渡る）
    pub async fn fire_custom(&mut self, event_name: &str, payload: Option<Value>) -> RuntimeResult {
        let Self { dispatcher, state, .. } = self;
        let listeners = dispatcher.listeners(event_name);
        if listeners.is_empty() {
            log::warn!("no custom event named '{}'", event_name);
        }

        let ctx = ActionContext::new().with_params(payload);
        let mut result = RuntimeResult::ok();
        for event in listeners {
            let inner = dispatcher.execute_event(event, &ctx, state).await;
            let failed = !inner.success;
            result.absorb(inner);
            if failed {
                break;
            }
        }
        result
    }

    /// IDを指定してイベントを実行する。見つからなければ None
    pub async fn fire_event_by_id(&mut self, event_id: &str, ctx: &ActionContext) -> Option<RuntimeResult> {
        let Self { dispatcher, state, .. } = self;
        let event = dispatcher.events().iter().find(|e| e.id == event_id)?;
        Some(dispatcher.execute_event(event, ctx, state).await)
    }

    pub fn event_log(&self) -> Vec<EventLogEntry> {
        self.dispatcher.event_log()
    }
}

fn matching<'a>(
    events: &'a [EventDefinition],
    on: TriggerKind,
    element_id: Option<&str>,
) -> Vec<&'a EventDefinition> {
    events
        .iter()
        .filter(|e| e.is_enabled() && e.trigger.on == on)
        .filter(|e| match (e.trigger.element_id.as_deref(), element_id) {
            (None, _) => true,
            (Some(expected), Some(actual)) => expected == actual,
            (Some(_), None) => false,
        })
        .collect()
}
