// ========================================
// 式評価エンジン
// ========================================
//
// ビルダーで入力された式文字列を評価する。分岐は以下の順で最初に一致したものを採用する。
//
// 1. `{scope.path}`           … パス参照
// 2. `+ - * /` を含む          … 算術式（パスを数値に置換してから評価）
// 3. `=== !== >= <= > <` を含む … 比較式（左右を再帰評価）
// 4. `.length` `.reduce` `.filter` … コレクション操作（限定的）
// 5. それ以外                  … リテラル
//
// 構文的に曖昧な式でもこの順序で解釈されるため、順序を変えると既存の式の意味が変わる。

use crate::engine::error::RuntimeError;
use crate::engine::state::ExpressionContext;
use crate::engine::value::{
    display, is_truthy, number_value, parse_js_number, relational, strict_equals, to_number,
};
use crate::parser::arith::evaluate_arithmetic;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

const MAX_EVALUATION_LOGS: usize = 200;

const COMPARISON_OPERATORS: [&str; 6] = ["===", "!==", ">=", "<=", ">", "<"];

lazy_static! {
    /// 算術式内の `scope.path`（波括弧は任意）
    static ref PATH_TOKEN: Regex =
        Regex::new(r"\{?\b(?:app|screen|params|local)(?:\.[A-Za-z0-9_$]+)+\}?")
            .expect("path token regex is valid");
    /// パス置換後に許可される文字
    static ref ARITHMETIC_SAFE: Regex =
        Regex::new(r"^[\d\s+\-*/().]+$").expect("arithmetic regex is valid");
    /// 文字列中の `{path}` 埋め込み
    static ref BINDING: Regex = Regex::new(r"\{([^{}]+)\}").expect("binding regex is valid");
}

/// 評価中に発生したエラーの記録
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationLog {
    pub expression: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ExpressionEvaluator {
    logs: Mutex<VecDeque<EvaluationLog>>,
}

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 式を評価する。評価できない場合は None（undefined）を返し、エラーはログに残す
    pub fn evaluate(&self, expression: &str, ctx: &ExpressionContext) -> Option<Value> {
        let expr = expression.trim();

        if let Some(path) = brace_path(expr) {
            return ctx.resolve(path);
        }

        // `.reduce(...)` などの引数内の演算子は分岐判定に使わない
        let masked = mask_call_arguments(expr);

        if masked.contains(['+', '-', '*', '/']) {
            return self.evaluate_arithmetic(expr, ctx);
        }

        for op in COMPARISON_OPERATORS {
            if let Some(index) = masked.find(op) {
                let left = self.evaluate(&expr[..index], ctx);
                let right = self.evaluate(&expr[index + op.len()..], ctx);
                return Some(Value::Bool(compare(op, left.as_ref(), right.as_ref())));
            }
        }

        if expr.contains(".length") || expr.contains(".reduce") || expr.contains(".filter") {
            return self.evaluate_collection(expr, ctx);
        }

        literal(expr)
    }

    /// 真偽値として評価する（イベントのガード条件・conditionアクション用）
    pub fn evaluate_condition(&self, expression: &str, ctx: &ExpressionContext) -> bool {
        is_truthy(self.evaluate(expression, ctx).as_ref())
    }

    /// テンプレート中の `{path}` を値の表示文字列に置き換える
    pub fn interpolate(&self, template: &str, ctx: &ExpressionContext) -> String {
        BINDING
            .replace_all(template, |caps: &Captures| {
                display(ctx.resolve(caps[1].trim()).as_ref())
            })
            .into_owned()
    }

    pub fn logs(&self) -> Vec<EvaluationLog> {
        match self.logs.lock() {
            Ok(logs) => logs.iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn take_logs(&self) -> Vec<EvaluationLog> {
        match self.logs.lock() {
            Ok(mut logs) => logs.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn clear_logs(&self) {
        if let Ok(mut logs) = self.logs.lock() {
            logs.clear();
        }
    }

    fn record(&self, expression: &str, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}", RuntimeError::evaluation(format!("'{}': {}", expression, message)));
        if let Ok(mut logs) = self.logs.lock() {
            if logs.len() >= MAX_EVALUATION_LOGS {
                logs.pop_front();
            }
            logs.push_back(EvaluationLog {
                expression: expression.to_string(),
                message,
            });
        }
    }

    // ========================================
    // 算術式
    // ========================================

    fn evaluate_arithmetic(&self, expr: &str, ctx: &ExpressionContext) -> Option<Value> {
        let substituted = PATH_TOKEN.replace_all(expr, |caps: &Captures| {
            let path = caps[0].trim_start_matches('{').trim_end_matches('}');
            format_operand(numeric_operand(ctx.resolve(path).as_ref()))
        });

        if !ARITHMETIC_SAFE.is_match(&substituted) {
            log::debug!("non-arithmetic characters in '{}', result is 0", substituted);
            return Some(Value::from(0));
        }

        match evaluate_arithmetic(&substituted) {
            Ok(n) => {
                let value = number_value(n);
                if value.is_none() {
                    self.record(expr, format!("non-finite result {}", n));
                }
                value
            }
            Err(e) => {
                self.record(expr, e);
                None
            }
        }
    }

    // ========================================
    // コレクション操作
    // ========================================

    fn evaluate_collection(&self, expr: &str, ctx: &ExpressionContext) -> Option<Value> {
        if let Some(index) = expr.find(".reduce") {
            let total = match resolve_operand(&expr[..index], ctx) {
                Some(Value::Array(items)) => items.iter().map(line_total).sum(),
                _ => 0.0,
            };
            return Some(number_value(total).unwrap_or(Value::from(0)));
        }

        if expr.contains(".filter") {
            self.record(expr, ".filter is not supported");
            return None;
        }

        let index = expr.find(".length")?;
        let length = match resolve_operand(&expr[..index], ctx) {
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        };
        Some(Value::from(length))
    }
}

/// 式全体が `{path}` 一つだけの場合にpathを返す
fn brace_path(expr: &str) -> Option<&str> {
    let inner = expr.strip_prefix('{')?.strip_suffix('}')?.trim();
    if inner.is_empty() || inner.contains(['{', '}']) {
        return None;
    }
    Some(inner)
}

/// `.reduce(` / `.filter(` の括弧内を `_` で埋める（バイト位置は維持する）
fn mask_call_arguments(expr: &str) -> String {
    let mut masked = String::with_capacity(expr.len());
    let mut depth = 0usize;
    let mut rest = expr;

    while let Some(ch) = rest.chars().next() {
        if depth == 0 && (rest.starts_with(".reduce(") || rest.starts_with(".filter(")) {
            let head = &rest[..rest.find('(').map(|i| i + 1).unwrap_or(1)];
            masked.push_str(head);
            rest = &rest[head.len()..];
            depth = 1;
            continue;
        }

        if depth > 0 {
            match ch {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
        }

        if depth > 0 {
            masked.extend(std::iter::repeat_n('_', ch.len_utf8()));
        } else {
            masked.push(ch);
        }
        rest = &rest[ch.len_utf8()..];
    }
    masked
}

fn resolve_operand(source: &str, ctx: &ExpressionContext) -> Option<Value> {
    let source = source.trim();
    let path = brace_path(source).unwrap_or(source);
    ctx.resolve(path)
}

/// 算術式に埋め込む値（数値化できないものは0）
fn numeric_operand(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => parse_js_number(s).unwrap_or(0.0),
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    };
    if n.is_finite() { n } else { 0.0 }
}

fn format_operand(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// 明細1行の金額: `price * (quantity || count || 1)`
fn line_total(item: &Value) -> f64 {
    let Value::Object(fields) = item else {
        return 0.0;
    };
    let price = to_number(fields.get("price"));
    let quantity = ["quantity", "count"]
        .iter()
        .filter_map(|key| fields.get(*key))
        .find(|v| is_truthy(Some(*v)))
        .map(|v| to_number(Some(v)))
        .unwrap_or(1.0);
    let total = price * quantity;
    if total.is_nan() { 0.0 } else { total }
}

fn compare(op: &str, left: Option<&Value>, right: Option<&Value>) -> bool {
    match op {
        "===" => strict_equals(left, right),
        "!==" => !strict_equals(left, right),
        _ => relational(op, left, right),
    }
}

fn literal(expr: &str) -> Option<Value> {
    match expr {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        "null" => return Some(Value::Null),
        "undefined" => return None,
        _ => {}
    }
    if let Some(n) = parse_js_number(expr) {
        if let Some(value) = number_value(n) {
            return Some(value);
        }
    }
    Some(Value::String(expr.to_string()))
}
