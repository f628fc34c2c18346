//! World simulation: items, the chunked current map, eggs, collision and the
//! fast area.
//!
//! # Invariants
//! - Every item is owned by exactly one of: a current-map chunk list, a
//!   container, the NPC list or the ethereal void.
//! - An item on the current map is filed in the chunk containing its x/y.
//! - Only items in fast chunks (or open containers) carry `FASTAREA`.
//! - Map 0 means no map is loaded.

mod collision;
mod config;
mod current_map;
mod egg;
mod error;
mod intrinsics;
mod item;
mod loopscript;
mod objects;
mod search;
mod shape;
mod usecode;
mod world;

pub use collision::{PositionInfo, SWEEP_END, SweepItem};
pub use config::{GameVariant, MAX_MAP_CHUNKS, WorldConfig};
pub use current_map::{ChunkCoord, CurrentMap, CurrentMapState, FastAreaDelta};
pub use egg::{
    EGG_HATCHER_PROCESS_TYPE, EggHatcherProcess, TELEPORT_PROCESS_TYPE, TeleportToEggProcess,
};
pub use error::WorldError;
pub use intrinsics::{Intrinsic, IntrinsicTable};
pub use item::{ActivityNo, ActorData, EggData, ExtFlags, Item, ItemFlags, ItemKind};
pub use loopscript::{LoopScript, LoopScriptError, token};
pub use objects::{
    FIRST_OBJECT_ID, LAST_ACTOR_ID, LAST_OBJECT_ID, MAIN_ACTOR_ID, ObjHandle, ObjectManager,
    ObjectsState, RESERVED_OBJ_ID,
};
pub use search::{SearchOrigin, container_search};
pub use shape::{ShapeFlags, ShapeInfo, ShapeTable, family};
pub use usecode::{
    EventLog, Globals, ListsState, StringsState, UcList, UsecodeEvent, UsecodeHeap,
};
pub use world::{
    CollideOutcome, Map, MapItem, World, WorldSnapshot, WorldState, WorldSummary,
};
