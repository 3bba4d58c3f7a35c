pub mod display;
pub mod text;
pub mod time;
