//! Core chunk-handling subsystem: CRC, wire protocol, on-disk chunk
//! format, replication goal algebra, the copies calculator, the read
//! planner, metrics, and the shared concurrency primitives that tie a
//! chunk server or client together.
//!
//! This crate is a thin facade over its workspace members, the way
//! `proxmox-backup`'s root crate groups its `pbs-*`/`pbs2-*` members under
//! one library with a `pub mod` per concern — each module here just
//! re-exports one member crate's public API under a name matching its
//! responsibility, rather than redeclaring any types.

pub mod chunk_format {
    pub use cfs_chunk_format::*;
}

pub mod copies {
    pub use cfs_copies::*;
}

pub mod crc {
    pub use cfs_crc::*;
}

pub mod goal {
    pub use cfs_goal::*;
}

pub mod metrics {
    pub use cfs_metrics::*;
}

pub mod planner {
    pub use cfs_planner::*;
}

pub mod protocol {
    pub use cfs_protocol::*;
}

pub mod sync {
    pub use cfs_sync::*;
}
