//! Core game logic: energy, leveling, settlement and the wager lifecycle.

pub mod energy;
pub mod game;
pub mod leveling;
pub mod locks;
pub mod resolver;
pub mod settlement;

pub use game::{GameEngine, GameSettings, OpenedWager, Resolution};
