pub mod action;
pub mod api_call;
pub mod config;
pub mod error;
pub mod event;
pub mod expr;
pub mod path;
pub mod result;
pub mod runtime;
pub mod state;
pub mod value;

use std::future::Future;
use std::pin::Pin;

/// エンジン内で共有する非同期戻り値型（再帰呼び出しのためBox化する）
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use action::{ActionEngine, EventEmitter};
pub use config::RuntimeConfig;
pub use error::RuntimeError;
pub use event::{EventDispatcher, EventLogEntry, EventOutcome};
pub use expr::ExpressionEvaluator;
pub use result::{RuntimeResult, UiEffect};
pub use runtime::PreviewSession;
pub use state::{ActionContext, ExpressionContext, RuntimeState};
