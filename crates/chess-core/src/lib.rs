pub mod game_data;
pub mod identity;
pub mod notation;
pub mod pgn;

pub use game_data::{Game, GameMetadata, Ply};
pub use identity::{
    identity_for_ply, identity_for_variation, variation_steps, IdentityError, PositionIdentity,
    VariationStep,
};
