mod game_state;
mod projection;

pub use game_state::*;
pub use projection::*;
