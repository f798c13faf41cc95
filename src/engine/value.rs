// ========================================
// 値の変換ヘルパー
// ========================================
//
// ビルダーで書かれた式はブラウザ上で評価される前提で作られているため、
// 真偽判定・数値変換・比較はJavaScriptの規則に寄せている。

use serde_json::{Number, Value};

/// JavaScriptの真偽判定（undefined は None）
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// `Number(x)` 相当の変換。変換できない場合は NaN
pub fn to_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => parse_js_number(s).unwrap_or(f64::NAN),
        Some(Value::Array(items)) => match items.as_slice() {
            [] => 0.0,
            [single] => to_number(Some(single)),
            _ => f64::NAN,
        },
        Some(Value::Object(_)) => f64::NAN,
    }
}

/// 数値として使えない値は0として扱う（加算・インクリメント用）
pub fn to_number_or_zero(value: Option<&Value>) -> f64 {
    let n = to_number(value);
    if n.is_nan() { 0.0 } else { n }
}

/// 文字列を数値リテラルとして解釈する（空文字は0）
pub fn parse_js_number(source: &str) -> Option<f64> {
    let s = source.trim();
    if s.is_empty() {
        return Some(0.0);
    }

    match s {
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }

    let radix = [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)];
    for (prefix, base) in radix {
        if let Some(digits) = s.strip_prefix(prefix) {
            return u64::from_str_radix(digits, base).ok().map(|n| n as f64);
        }
    }

    // Rustの f64::from_str は "inf" や "nan" も受け付けるので先に弾く
    if !s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }

    s.parse::<f64>().ok()
}

/// f64をJSON値に変換する。整数値は整数として保存し、非有限値は表現できないので None
pub fn number_value(n: f64) -> Option<Value> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Some(Value::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number)
}

/// 整数インデックスへの変換（`parseInt` 相当）
pub fn coerce_index(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64),
        Value::String(s) => {
            let s = s.trim();
            let end = s
                .char_indices()
                .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
                .map(|(i, _)| i)
                .unwrap_or(s.len());
            s[..end].parse::<i64>().ok()
        }
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// `===` 相当（数値は表現の違いを無視して比較する）
pub fn strict_equals(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// `<` `>` `<=` `>=` 相当。両辺が文字列なら辞書順、それ以外は数値で比較する
pub fn relational(op: &str, left: Option<&Value>, right: Option<&Value>) -> bool {
    if let (Some(Value::String(a)), Some(Value::String(b))) = (left, right) {
        return match op {
            ">" => a > b,
            "<" => a < b,
            ">=" => a >= b,
            "<=" => a <= b,
            _ => false,
        };
    }

    let a = to_number(left);
    let b = to_number(right);
    if a.is_nan() || b.is_nan() {
        return false;
    }
    match op {
        ">" => a > b,
        "<" => a < b,
        ">=" => a >= b,
        "<=" => a <= b,
        _ => false,
    }
}

/// 表示用の文字列化（トースト等）
pub fn display(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Some(other) => other.to_string(),
    }
}
