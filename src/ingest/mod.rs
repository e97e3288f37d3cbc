//! Media ingestion from the messaging platform.
//!
//! ```text
//! request ─▶ pick attachment ─▶ size/duration ─▶ get_file ─▶ extension ─▶ download
//!                                     │               │            │            │
//!                                     └──────── notice to user and stop ────────┘
//! ```

pub mod media;

pub use media::{FetchError, FetchedMedia, MediaFetcher, MediaLimits};
