pub mod draw;
pub mod grid;
pub mod theme;
pub mod view;
