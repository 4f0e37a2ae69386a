pub mod action;
pub mod config;
pub mod game;
pub mod message;
pub mod mode;
pub mod role;
pub mod rule;
pub mod seat;
