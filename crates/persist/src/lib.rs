//! Persistence: sectioned savegames and a directory of save slots.
//!
//! # Invariants
//! - Every section carries a SHA-256 digest; a mismatch fails the whole load.
//! - A save from one game variant never loads into another.
//! - Object ids survive a round trip, so saved references stay valid.

mod error;
mod savegame;
mod store;

pub use error::SaveError;
pub use savegame::{
    GameHeader, LoadedGame, SAVE_MAGIC, SAVE_VERSION, SaveInfo, SaveReader, SaveWriter,
    load_world, read_info, save_world, section,
};
pub use store::{SaveStore, SlotEntry};
