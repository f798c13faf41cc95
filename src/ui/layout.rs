// ========================================
// コンテナのレイアウト（リフロー）
// ========================================
//
// flexレイアウトのコンテナについて、子ウィジェットの位置（とstretch時の交差軸サイズ）を
// コンテナのpropsから計算し直す。座標はコンテナ左上を原点とする。

use crate::engine::value::to_number;
use crate::parser::ast::Widget;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    #[default]
    Flex,
    Absolute,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JustifyContent {
    #[default]
    FlexStart,
    Center,
    FlexEnd,
    SpaceBetween,
    SpaceAround,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlignItems {
    #[default]
    FlexStart,
    Center,
    FlexEnd,
    Stretch,
}

/// コンテナのpropsから読み取ったレイアウト設定
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContainerLayout {
    pub mode: LayoutMode,
    pub direction: Direction,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub gap: f64,
    pub padding: f64,
}

impl ContainerLayout {
    /// 未指定・不正な値はデフォルトに倒す
    pub fn from_widget(container: &Widget) -> Self {
        let props = &container.props;
        Self {
            mode: prop_enum(props.get("layout")),
            direction: prop_enum(props.get("direction")),
            justify_content: prop_enum(props.get("justifyContent")),
            align_items: prop_enum(props.get("alignItems")),
            gap: prop_number(props.get("gap")),
            padding: prop_number(props.get("padding")),
        }
    }
}

fn prop_enum<T: DeserializeOwned + Default>(value: Option<&Value>) -> T {
    value
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

fn prop_number(value: Option<&Value>) -> f64 {
    let n = to_number(value);
    if n.is_finite() { n } else { 0.0 }
}

/// 子ウィジェットの位置とサイズを書き換える（flex以外のコンテナは何もしない）
pub fn reflow(container: &Widget, children: &mut [Widget]) {
    let layout = ContainerLayout::from_widget(container);
    if layout.mode != LayoutMode::Flex || children.is_empty() {
        return;
    }

    let (container_main, container_cross) = match layout.direction {
        Direction::Row => (container.size.width, container.size.height),
        Direction::Column => (container.size.height, container.size.width),
    };
    let padding = layout.padding;
    let gap = layout.gap;

    let available_main = container_main - 2.0 * padding;
    let available_cross = container_cross - 2.0 * padding;

    let order = child_order(container, children);
    let n = order.len() as f64;

    let used_main: f64 = order
        .iter()
        .map(|&i| main_size(&children[i], layout.direction))
        .sum::<f64>()
        + (n - 1.0) * gap;
    let free_space = (available_main - used_main).max(0.0);

    let (offset, spacing) = match layout.justify_content {
        JustifyContent::FlexStart => (padding, gap),
        JustifyContent::Center => (padding + free_space / 2.0, gap),
        JustifyContent::FlexEnd => (padding + free_space, gap),
        JustifyContent::SpaceBetween => {
            if order.len() > 1 {
                (padding, gap + free_space / (n - 1.0))
            } else {
                // 子が一つだけなら中央に置く
                (padding + free_space / 2.0, gap)
            }
        }
        JustifyContent::SpaceAround => {
            let around = free_space / n;
            (padding + around / 2.0, gap + around)
        }
    };

    let mut cursor = offset;
    for &i in &order {
        let child = &mut children[i];
        let child_main = main_size(child, layout.direction);

        let mut child_cross = cross_size(child, layout.direction);
        let cross_pos = match layout.align_items {
            AlignItems::FlexStart => padding,
            AlignItems::Center => padding + (available_cross - child_cross) / 2.0,
            AlignItems::FlexEnd => padding + available_cross - child_cross,
            AlignItems::Stretch => {
                child_cross = available_cross.max(0.0).round();
                padding
            }
        };

        let main_pos = clamp_round(cursor, padding, container_main - padding - child_main);
        let cross_pos = clamp_round(cross_pos, padding, container_cross - padding - child_cross);

        match layout.direction {
            Direction::Row => {
                child.position.x = main_pos;
                child.position.y = cross_pos;
                child.size.height = child_cross;
            }
            Direction::Column => {
                child.position.y = main_pos;
                child.position.x = cross_pos;
                child.size.width = child_cross;
            }
        }

        cursor += child_main + spacing;
    }
}

/// children配列の順序。配列にない子は元の順序のまま末尾
fn child_order(container: &Widget, children: &[Widget]) -> Vec<usize> {
    let declared = container.child_ids();
    let rank = |w: &Widget| {
        declared
            .iter()
            .position(|id| *id == w.id)
            .unwrap_or(declared.len())
    };
    let mut order: Vec<usize> = (0..children.len()).collect();
    order.sort_by_key(|&i| rank(&children[i]));
    order
}

fn main_size(widget: &Widget, direction: Direction) -> f64 {
    match direction {
        Direction::Row => widget.size.width,
        Direction::Column => widget.size.height,
    }
}

fn cross_size(widget: &Widget, direction: Direction) -> f64 {
    match direction {
        Direction::Row => widget.size.height,
        Direction::Column => widget.size.width,
    }
}

fn clamp_round(value: f64, min: f64, max: f64) -> f64 {
    value.min(max).max(min).round()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::Size;
    use serde_json::json;

    fn container(width: f64, height: f64, props: Value) -> Widget {
        let mut w = Widget::new("box", "container", Size { width, height });
        if let Value::Object(map) = props {
            w.props = map;
        }
        w
    }

    fn children(sizes: &[(f64, f64)]) -> Vec<Widget> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &(width, height))| {
                let mut w = Widget::new(format!("c{}", i), "text", Size { width, height });
                w.parent_id = Some("box".to_string());
                w
            })
            .collect()
    }

    fn xs(children: &[Widget]) -> Vec<f64> {
        children.iter().map(|c| c.position.x).collect()
    }

    #[test]
    fn test_row_space_between() {
        let parent = container(300.0, 100.0, json!({ "justifyContent": "space-between", "gap": 10 }));
        let mut kids = children(&[(50.0, 20.0), (50.0, 20.0), (50.0, 20.0)]);
        reflow(&parent, &mut kids);
        assert_eq!(xs(&kids), vec![0.0, 125.0, 250.0]);
    }

    #[test]
    fn test_row_justify_variants() {
        let cases = [
            ("flex-start", vec![0.0, 60.0, 120.0]),
            ("center", vec![65.0, 125.0, 185.0]),
            ("flex-end", vec![130.0, 190.0, 250.0]),
            ("space-around", vec![22.0, 125.0, 228.0]),
        ];
        for (justify, expected) in cases {
            let parent = container(300.0, 100.0, json!({ "justifyContent": justify, "gap": 10 }));
            let mut kids = children(&[(50.0, 20.0), (50.0, 20.0), (50.0, 20.0)]);
            reflow(&parent, &mut kids);
            assert_eq!(xs(&kids), expected, "justifyContent {}", justify);
        }
    }

    #[test]
    fn test_space_between_centers_single_child() {
        let parent = container(300.0, 100.0, json!({ "justifyContent": "space-between" }));
        let mut kids = children(&[(50.0, 20.0)]);
        reflow(&parent, &mut kids);
        assert_eq!(kids[0].position.x, 125.0);
    }

    #[test]
    fn test_column_stretch_overwrites_width() {
        let parent = container(
            200.0,
            400.0,
            json!({ "direction": "column", "alignItems": "stretch", "padding": 10, "gap": 5 }),
        );
        let mut kids = children(&[(50.0, 40.0), (80.0, 60.0)]);
        reflow(&parent, &mut kids);

        for kid in &kids {
            assert_eq!(kid.size.width, 180.0);
            assert_eq!(kid.position.x, 10.0);
        }
        assert_eq!(kids[0].position.y, 10.0);
        assert_eq!(kids[1].position.y, 55.0);
        assert_eq!(kids[1].size.height, 60.0);
    }

    #[test]
    fn test_cross_axis_alignment() {
        let parent = container(300.0, 100.0, json!({ "alignItems": "center", "padding": 10 }));
        let mut kids = children(&[(50.0, 20.0), (50.0, 40.0)]);
        reflow(&parent, &mut kids);
        assert_eq!(kids[0].position.y, 40.0);
        assert_eq!(kids[1].position.y, 30.0);

        let parent = container(300.0, 100.0, json!({ "alignItems": "flex-end", "padding": 10 }));
        reflow(&parent, &mut kids);
        assert_eq!(kids[0].position.y, 70.0);
        assert_eq!(kids[1].position.y, 50.0);
    }

    #[test]
    fn test_children_array_defines_order() {
        let parent = container(300.0, 100.0, json!({ "children": ["c2", "c0"], "gap": 10 }));
        let mut kids = children(&[(50.0, 20.0), (60.0, 20.0), (70.0, 20.0)]);
        reflow(&parent, &mut kids);
        // c2, c0, そして配列にないc1
        assert_eq!(kids[2].position.x, 0.0);
        assert_eq!(kids[0].position.x, 80.0);
        assert_eq!(kids[1].position.x, 140.0);
        assert_eq!(kids[0].id, "c0");
    }

    #[test]
    fn test_overflow_is_clamped() {
        let parent = container(100.0, 50.0, json!({}));
        let mut kids = children(&[(80.0, 20.0), (80.0, 20.0)]);
        reflow(&parent, &mut kids);
        assert_eq!(xs(&kids), vec![0.0, 20.0]);
    }

    #[test]
    fn test_absolute_layout_is_untouched() {
        let parent = container(300.0, 100.0, json!({ "layout": "absolute", "alignItems": "stretch" }));
        let mut kids = children(&[(50.0, 20.0)]);
        kids[0].position.x = 33.0;
        let before = kids.clone();
        reflow(&parent, &mut kids);
        assert_eq!(kids, before);
    }

    #[test]
    fn test_unknown_prop_values_fall_back() {
        let parent = container(300.0, 100.0, json!({ "direction": "diagonal", "gap": "12" }));
        let layout = ContainerLayout::from_widget(&parent);
        assert_eq!(layout.direction, Direction::Row);
        assert_eq!(layout.gap, 12.0);
    }
}
