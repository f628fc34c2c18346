use pentacle_world::{GameVariant, WorldError};

/// Why a savegame could not be written or read.
///
/// None of these are fatal to a running session: loading builds a fresh
/// world and only hands it out on success.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a savegame (bad signature)")]
    BadSignature,
    #[error("savegame version v{found} is not supported (expected v{expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("savegame is missing section {0}")]
    MissingSection(String),
    #[error("section {section} failed its integrity check")]
    DigestMismatch { section: String },
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("section {section} could not be decoded: {reason}")]
    CborDecode { section: String, reason: String },
    #[error("savegame is for {saved:?} but the world is configured for {configured:?}")]
    WrongGame {
        saved: GameVariant,
        configured: GameVariant,
    },
    #[error("slot {0} is empty")]
    EmptySlot(u32),
    #[error("slot file {filename} does not match the slot index")]
    SlotMismatch { filename: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    World(#[from] WorldError),
}
