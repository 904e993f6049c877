//! Persistence layer, one module per aggregate.
//!
//! Every mutable row carries a `version` counter.  Updates are conditional
//! (`WHERE id = ? AND version = ?`) and bump the counter; zero affected rows
//! surfaces as an edit conflict.  No store function retries a conflict;
//! callers re-read and resubmit if they want another attempt.
//!
//! Each public function bounds its database work with the shared per-call
//! timeout, transactions included.

pub mod backings;
pub mod disputes;
pub mod experts;
pub mod projects;
pub mod rewards;
pub mod users;
