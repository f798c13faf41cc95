// ========================================
// ドット区切りパスの読み書き
// ========================================
//
// どちらの関数もスコープ単位で使う。呼び出し側は `state.app` などの
// 一つのスコープをrootとして渡すので、スコープをまたぐパスは書けない。

use serde_json::{Map, Value};

/// `a.b.0.c` 形式のパスで値を取得する。途中で辿れなければ None（例外は出さない）
///
/// 配列に対しては数値セグメントでインデックス参照でき、`length` で要素数を返す。
pub fn get_path(root: &Value, path: &str) -> Option<Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let last = segments.len().saturating_sub(1);
    let mut current = root;

    for (i, segment) in segments.iter().enumerate() {
        match current {
            Value::Object(map) => current = map.get(*segment)?,
            Value::Array(items) => {
                if *segment == "length" {
                    return (i == last).then(|| Value::from(items.len()));
                }
                let index: usize = segment.parse().ok()?;
                current = items.get(index)?;
            }
            _ => return None,
        }
    }

    Some(current.clone())
}

/// パスに値を書き込む。途中のセグメントは必要に応じて作成し、
/// オブジェクトでない中間値は `{}` で上書きする。
pub fn set_path(root: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    assign(root, &segments, value);
}

fn assign(current: &mut Value, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *current = value;
        return;
    };

    // 配列は範囲内のインデックス（または末尾追加）のときだけ配列のまま辿る
    if let Value::Array(items) = current {
        if let Ok(index) = head.parse::<usize>() {
            if index <= items.len() {
                if index == items.len() {
                    items.push(Value::Null);
                }
                let slot = &mut items[index];
                if rest.is_empty() {
                    *slot = value;
                } else {
                    assign(slot, rest, value);
                }
                return;
            }
        }
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    let Value::Object(map) = current else {
        return;
    };

    if rest.is_empty() {
        map.insert((*head).to_string(), value);
    } else {
        let child = map.entry((*head).to_string()).or_insert(Value::Null);
        assign(child, rest, value);
    }
}
