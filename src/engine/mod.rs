pub mod checklist;
pub mod finance;
pub mod handoff;
pub mod ledger;
pub mod orders;
pub mod reconcile;
pub mod status;
