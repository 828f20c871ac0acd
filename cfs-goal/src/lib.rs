//! Goal & label algebra (C9) and the linear-assignment auction optimizer
//! (C10) it is built on.

mod auction;
mod goal;
mod label;
mod slice;

pub use auction::{auction_optimize, MAX_PARTS_COUNT};
pub use goal::{Goal, GoalError};
pub use label::{count_labels, labels_distance, labels_union, Label, Labels, WILDCARD};
pub use slice::{Slice, SliceError, SliceType, MAX_EXPECTED_COPIES};
