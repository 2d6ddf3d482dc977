pub mod history;
pub mod tools;
pub mod view;
