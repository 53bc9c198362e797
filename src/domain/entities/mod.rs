mod card;
mod player;
mod room;

pub use card::*;
pub use player::*;
pub use room::*;
