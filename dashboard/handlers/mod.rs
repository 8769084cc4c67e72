pub mod events;
pub mod runs;
