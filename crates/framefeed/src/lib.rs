//! `framefeed` - Live camera frame acquisition over a snapshot endpoint
//!
//! This library emulates a live camera feed by polling an authenticated HTTP
//! snapshot endpoint. At most one fetch is in flight at a time, exactly one
//! materialized frame is current, and a session leaves nothing behind once it
//! has been unmounted.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod fetcher;
pub mod frame;
pub mod logging;
pub mod output;
pub mod poller;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use display::{
    DisplayHandle, DisplayResourceManager, FeedView, Frame, FrameRegistry, HandleId,
};
pub use error::{Error, Result};
pub use fetcher::{FrameSource, HttpFrameFetcher};
pub use frame::{FetchFailure, FrameFormat, FrameResult};
pub use logging::init_logging;
pub use output::write_frame;
pub use poller::{FramePoller, PollerHandle};
pub use session::{FeedOptions, FeedSession, FeedStats, SessionState};
