pub mod layout;
pub mod widget_tree;

pub use layout::{AlignItems, ContainerLayout, Direction, JustifyContent, LayoutMode, reflow};
pub use widget_tree::{TreeError, WidgetTree};
