pub mod checklist;
pub mod driver;
pub mod handoff;
pub mod location;
pub mod order;
pub mod segment;
