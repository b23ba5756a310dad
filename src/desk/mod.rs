//! Desk client adapter.
//!
//! The thin layer a volunteer's scanning station runs: camera frames in,
//! [`DeskDisplay`]s out. It knows nothing about scan rules; every decision is
//! the scan processor's, reached through a [`ScanTransport`]: in process with
//! [`LocalTransport`], or over HTTP with [`HttpTransport`].

pub mod client;
pub mod display;
pub mod frame;
pub mod http;

pub use client::{DEFAULT_COOLDOWN, DeskClient, LocalTransport, ScanTransport};
pub use display::{DeskDisplay, Tone};
pub use frame::{Frame, FrameDecoder, PayloadDecoder};
pub use http::{HttpTransport, HttpTransportError};
