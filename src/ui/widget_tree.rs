// ウィジェットツリー
// 親子関係（parentId と props.children）を双方向に保ち、変更のたびに影響するコンテナを再レイアウトする

use crate::parser::ast::{Size, Widget};
use crate::ui::layout::reflow;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("unknown widget '{0}'")]
    UnknownWidget(String),

    #[error("widget '{0}' is not a container")]
    NotAContainer(String),

    #[error("duplicate widget id '{0}'")]
    DuplicateId(String),

    #[error("moving '{widget}' under '{parent}' would create a cycle")]
    Cycle { widget: String, parent: String },
}

#[derive(Debug, Clone, Default)]
pub struct WidgetTree {
    widgets: HashMap<String, Widget>,
    roots: Vec<String>,
}

impl WidgetTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// 読み込み済みのウィジェット一覧から作る（後勝ちで重複IDを上書きする）
    pub fn from_widgets(widgets: Vec<Widget>) -> Self {
        let mut tree = Self::new();
        for widget in widgets {
            if widget.parent_id.is_none() && !tree.roots.contains(&widget.id) {
                tree.roots.push(widget.id.clone());
            }
            tree.widgets.insert(widget.id.clone(), widget);
        }
        tree
    }

    pub fn get(&self, id: &str) -> Option<&Widget> {
        self.widgets.get(id)
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// 子ウィジェット。children配列の順、配列にないものはIDの順で末尾
    pub fn children_of(&self, id: &str) -> Vec<&Widget> {
        let Some(parent) = self.widgets.get(id) else {
            return Vec::new();
        };

        let mut result: Vec<&Widget> = parent
            .child_ids()
            .iter()
            .filter_map(|cid| self.widgets.get(cid))
            .filter(|w| w.parent_id.as_deref() == Some(id))
            .collect();

        let mut rest: Vec<&Widget> = self
            .widgets
            .values()
            .filter(|w| w.parent_id.as_deref() == Some(id))
            .filter(|w| !result.iter().any(|r| r.id == w.id))
            .collect();
        rest.sort_by(|a, b| a.id.cmp(&b.id));
        result.extend(rest);
        result
    }

    /// ウィジェットを追加する。戻り値は位置・サイズが変わったウィジェットのID
    pub fn insert(&mut self, mut widget: Widget, parent: Option<&str>) -> Result<Vec<String>, TreeError> {
        if self.widgets.contains_key(&widget.id) {
            return Err(TreeError::DuplicateId(widget.id));
        }
        let id = widget.id.clone();

        match parent {
            Some(parent_id) => {
                self.container_mut(parent_id)?;
                widget.parent_id = Some(parent_id.to_string());
                self.widgets.insert(id.clone(), widget);
                self.attach(&id, parent_id, None);
                Ok(self.relayout(parent_id))
            }
            None => {
                widget.parent_id = None;
                self.widgets.insert(id.clone(), widget);
                self.roots.push(id);
                Ok(Vec::new())
            }
        }
    }

    /// ウィジェットと子孫を削除して返す
    pub fn remove(&mut self, id: &str) -> Result<Vec<Widget>, TreeError> {
        if !self.widgets.contains_key(id) {
            return Err(TreeError::UnknownWidget(id.to_string()));
        }

        let parent = self.detach(id);
        let mut removed = Vec::new();
        let mut queue = VecDeque::from([id.to_string()]);
        while let Some(current) = queue.pop_front() {
            queue.extend(self.children_of(&current).iter().map(|w| w.id.clone()));
            if let Some(widget) = self.widgets.remove(&current) {
                removed.push(widget);
            }
        }

        log::debug!("removed {} widget(s) under '{}'", removed.len(), id);
        if let Some(parent_id) = parent {
            self.relayout(&parent_id);
        }
        Ok(removed)
    }

    /// 親を付け替える。`index` はchildren配列内の挿入位置（省略時は末尾）
    pub fn move_widget(
        &mut self,
        id: &str,
        new_parent: Option<&str>,
        index: Option<usize>,
    ) -> Result<Vec<String>, TreeError> {
        if !self.widgets.contains_key(id) {
            return Err(TreeError::UnknownWidget(id.to_string()));
        }
        if let Some(parent_id) = new_parent {
            self.container_mut(parent_id)?;
            if parent_id == id || self.is_descendant(parent_id, id) {
                return Err(TreeError::Cycle {
                    widget: id.to_string(),
                    parent: parent_id.to_string(),
                });
            }
        }

        let old_parent = self.detach(id);
        if let Some(widget) = self.widgets.get_mut(id) {
            widget.parent_id = new_parent.map(str::to_string);
        }

        let mut changed = Vec::new();
        match new_parent {
            Some(parent_id) => {
                self.attach(id, parent_id, index);
                changed.extend(self.relayout(parent_id));
            }
            None => {
                let at = index.unwrap_or(self.roots.len()).min(self.roots.len());
                self.roots.insert(at, id.to_string());
            }
        }
        if let Some(old) = old_parent.filter(|old| Some(old.as_str()) != new_parent) {
            changed.extend(self.relayout(&old));
        }
        Ok(changed)
    }

    /// propsをマージする。コンテナなら子を再レイアウトする
    pub fn update_props(&mut self, id: &str, props: Map<String, Value>) -> Result<Vec<String>, TreeError> {
        let widget = self
            .widgets
            .get_mut(id)
            .ok_or_else(|| TreeError::UnknownWidget(id.to_string()))?;
        widget.props.extend(props);
        Ok(self.relayout(id))
    }

    /// サイズを変更し、親と自身（コンテナの場合）を再レイアウトする
    pub fn resize(&mut self, id: &str, size: Size) -> Result<Vec<String>, TreeError> {
        let widget = self
            .widgets
            .get_mut(id)
            .ok_or_else(|| TreeError::UnknownWidget(id.to_string()))?;
        widget.size = size;
        let parent = widget.parent_id.clone();

        let mut changed = vec![id.to_string()];
        if let Some(parent_id) = parent {
            changed.extend(self.relayout(&parent_id));
        }
        changed.extend(self.relayout(id));
        Ok(unique_ids(changed))
    }

    /// ルートから全コンテナを上から順にリフローする（読み込み直後のツリー用）
    pub fn relayout_all(&mut self) -> Vec<String> {
        let mut changed = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<String> = self.roots.iter().cloned().collect();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            changed.extend(self.relayout(&current));
            queue.extend(self.children_of(&current).iter().map(|w| w.id.clone()));
        }
        unique_ids(changed)
    }

    /// コンテナから下へ向かってリフローを適用する。サイズが変わった子コンテナも再計算する
    pub fn relayout(&mut self, id: &str) -> Vec<String> {
        let mut changed = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([id.to_string()]);

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(container) = self.widgets.get(&current).cloned() else {
                continue;
            };
            if !container.is_container() {
                continue;
            }

            let mut children: Vec<Widget> =
                self.children_of(&current).into_iter().cloned().collect();
            let before: Vec<(f64, f64, Size)> = children
                .iter()
                .map(|c| (c.position.x, c.position.y, c.size))
                .collect();
            reflow(&container, &mut children);

            for (child, (x, y, size)) in children.into_iter().zip(before) {
                let moved = child.position.x != x || child.position.y != y;
                let resized = child.size != size;
                if resized && child.is_container() {
                    queue.push_back(child.id.clone());
                }
                if moved || resized {
                    changed.push(child.id.clone());
                    self.widgets.insert(child.id.clone(), child);
                }
            }
        }

        if !changed.is_empty() {
            log::debug!("relayout '{}': {} widget(s) changed", id, changed.len());
        }
        changed
    }

    fn container_mut(&mut self, id: &str) -> Result<&mut Widget, TreeError> {
        let widget = self
            .widgets
            .get_mut(id)
            .ok_or_else(|| TreeError::UnknownWidget(id.to_string()))?;
        if !widget.is_container() {
            return Err(TreeError::NotAContainer(id.to_string()));
        }
        Ok(widget)
    }

    /// 親のchildren配列に追加する
    fn attach(&mut self, id: &str, parent_id: &str, index: Option<usize>) {
        if let Some(parent) = self.widgets.get_mut(parent_id) {
            let mut ids = parent.child_ids();
            ids.retain(|c| c != id);
            let at = index.unwrap_or(ids.len()).min(ids.len());
            ids.insert(at, id.to_string());
            parent.set_child_ids(&ids);
        }
    }

    /// 親のchildren配列（またはroots）から外し、元の親IDを返す
    fn detach(&mut self, id: &str) -> Option<String> {
        let parent_id = self.widgets.get(id).and_then(|w| w.parent_id.clone());
        match &parent_id {
            Some(pid) => {
                if let Some(parent) = self.widgets.get_mut(pid) {
                    let mut ids = parent.child_ids();
                    ids.retain(|c| c != id);
                    parent.set_child_ids(&ids);
                }
            }
            None => self.roots.retain(|r| r != id),
        }
        parent_id
    }

    /// `id` が `ancestor` の子孫か
    fn is_descendant(&self, id: &str, ancestor: &str) -> bool {
        let mut current = self.widgets.get(id).and_then(|w| w.parent_id.as_deref());
        let mut steps = 0;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.widgets.len() {
                break;
            }
            current = self.widgets.get(parent).and_then(|w| w.parent_id.as_deref());
        }
        false
    }
}

/// 最初に出た順を保って重複を除く
fn unique_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sized(id: &str, widget_type: &str, width: f64, height: f64) -> Widget {
        Widget::new(id, widget_type, Size { width, height })
    }

    fn container(id: &str, width: f64, height: f64, props: Value) -> Widget {
        let mut w = sized(id, "container", width, height);
        if let Value::Object(map) = props {
            w.props = map;
        }
        w
    }

    fn row_tree() -> WidgetTree {
        let mut tree = WidgetTree::new();
        tree.insert(
            container("row", 300.0, 100.0, json!({ "justifyContent": "space-between", "gap": 10 })),
            None,
        )
        .unwrap();
        for id in ["a", "b", "c"] {
            tree.insert(sized(id, "text", 50.0, 20.0), Some("row")).unwrap();
        }
        tree
    }

    #[test]
    fn test_insert_keeps_both_directions_in_sync() {
        let tree = row_tree();
        assert_eq!(tree.get("row").unwrap().child_ids(), vec!["a", "b", "c"]);
        assert_eq!(tree.get("b").unwrap().parent_id.as_deref(), Some("row"));
        let xs: Vec<f64> = tree.children_of("row").iter().map(|w| w.position.x).collect();
        assert_eq!(xs, vec![0.0, 125.0, 250.0]);
    }

    #[test]
    fn test_insert_errors() {
        let mut tree = row_tree();
        assert_eq!(
            tree.insert(sized("a", "text", 1.0, 1.0), None),
            Err(TreeError::DuplicateId("a".into()))
        );
        assert_eq!(
            tree.insert(sized("x", "text", 1.0, 1.0), Some("a")),
            Err(TreeError::NotAContainer("a".into()))
        );
        assert_eq!(
            tree.insert(sized("x", "text", 1.0, 1.0), Some("nope")),
            Err(TreeError::UnknownWidget("nope".into()))
        );
    }

    #[test]
    fn test_remove_reflows_remaining_children() {
        let mut tree = row_tree();
        let removed = tree.remove("b").unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(tree.get("row").unwrap().child_ids(), vec!["a", "c"]);
        assert_eq!(tree.get("c").unwrap().position.x, 250.0);
        assert_eq!(tree.get("a").unwrap().position.x, 0.0);
    }

    #[test]
    fn test_remove_container_removes_descendants() {
        let mut tree = row_tree();
        let removed = tree.remove("row").unwrap();
        assert_eq!(removed.len(), 4);
        assert!(tree.is_empty());
        assert!(tree.roots().is_empty());
    }

    #[test]
    fn test_move_reorders_and_rejects_cycles() {
        let mut tree = row_tree();
        tree.move_widget("c", Some("row"), Some(0)).unwrap();
        assert_eq!(tree.get("row").unwrap().child_ids(), vec!["c", "a", "b"]);
        assert_eq!(tree.get("c").unwrap().position.x, 0.0);

        tree.insert(container("inner", 100.0, 50.0, json!({})), Some("row")).unwrap();
        assert_eq!(
            tree.move_widget("row", Some("inner"), None),
            Err(TreeError::Cycle { widget: "row".into(), parent: "inner".into() })
        );

        tree.move_widget("a", None, None).unwrap();
        assert!(tree.get("a").unwrap().parent_id.is_none());
        assert_eq!(tree.roots(), &["row".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_stretch_cascades_into_nested_container() {
        let mut tree = WidgetTree::new();
        tree.insert(
            container("outer", 400.0, 300.0, json!({ "direction": "column", "alignItems": "stretch" })),
            None,
        )
        .unwrap();
        tree.insert(
            container("inner", 100.0, 100.0, json!({ "justifyContent": "flex-end" })),
            Some("outer"),
        )
        .unwrap();
        tree.insert(sized("leaf", "text", 50.0, 20.0), Some("inner")).unwrap();

        // innerは幅400に引き伸ばされ、leafは右端に寄る
        assert_eq!(tree.get("inner").unwrap().size.width, 400.0);
        assert_eq!(tree.get("leaf").unwrap().position.x, 350.0);

        let changed = tree.resize("outer", Size { width: 200.0, height: 300.0 }).unwrap();
        assert!(changed.contains(&"leaf".to_string()));
        assert_eq!(tree.get("inner").unwrap().size.width, 200.0);
        assert_eq!(tree.get("leaf").unwrap().position.x, 150.0);
    }

    #[test]
    fn test_relayout_all_reaches_nested_containers() {
        let mut inner = container("inner", 200.0, 100.0, json!({ "justifyContent": "flex-end" }));
        inner.parent_id = Some("outer".into());
        let mut leaf = sized("leaf", "text", 50.0, 20.0);
        leaf.parent_id = Some("inner".into());
        let mut tree = WidgetTree::from_widgets(vec![
            container("outer", 400.0, 300.0, json!({})),
            inner,
            leaf,
        ]);

        // innerのサイズは変わらないので、outerだけでは下まで届かない
        tree.relayout("outer");
        assert_eq!(tree.get("leaf").unwrap().position.x, 0.0);

        let changed = tree.relayout_all();
        assert_eq!(tree.get("leaf").unwrap().position.x, 150.0);
        assert_eq!(changed, vec!["leaf".to_string()]);
    }

    #[test]
    fn test_resize_reports_each_id_once() {
        let mut tree = WidgetTree::new();
        tree.insert(
            container("outer", 400.0, 300.0, json!({ "direction": "column", "alignItems": "stretch" })),
            None,
        )
        .unwrap();
        tree.insert(
            container("inner", 100.0, 100.0, json!({ "justifyContent": "flex-end" })),
            Some("outer"),
        )
        .unwrap();
        tree.insert(sized("leaf", "text", 50.0, 20.0), Some("inner")).unwrap();

        let changed = tree.resize("inner", Size { width: 100.0, height: 120.0 }).unwrap();
        let unique: HashSet<&String> = changed.iter().collect();
        assert_eq!(unique.len(), changed.len());
        assert_eq!(changed[0], "inner");
    }

    #[test]
    fn test_update_props_relayouts_container() {
        let mut tree = row_tree();
        let mut props = Map::new();
        props.insert("justifyContent".into(), json!("flex-end"));
        let changed = tree.update_props("row", props).unwrap();
        // cは元々右端にあるので変化しない
        assert_eq!(changed, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(tree.get("a").unwrap().position.x, 130.0);
    }
}
