pub mod app_state;
pub mod grid_state;
