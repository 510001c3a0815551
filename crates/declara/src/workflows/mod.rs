pub mod clock;
pub mod declaration;
pub mod delivery;
