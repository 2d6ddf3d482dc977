pub mod ai;
pub mod canvas_ops;
pub mod color_removal;
pub mod compose;
pub mod magic_wand;
