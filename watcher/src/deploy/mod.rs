pub mod applier;
pub mod controller;
pub mod recovery;
