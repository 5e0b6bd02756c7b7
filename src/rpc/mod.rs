//! Host command link.
//!
//! Newline-delimited JSON over a byte transport.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Command stack                           │
//! │                                                              │
//! │  ┌───────────┐   ┌────────────┐   ┌──────────┐   ┌─────────┐ │
//! │  │ Transport │──▶│ LineFramer │──▶│ envelope │──▶│Dispatch │ │
//! │  │ (read)    │   │ (\n split) │   │ (decode) │   │ (table) │ │
//! │  └───────────┘   └────────────┘   └──────────┘   └─────────┘ │
//! │       ▲                                               │      │
//! │       │         ┌─────────────────────────────────────┘      │
//! │       │         ▼                                            │
//! │  ┌───────────┐   ┌──────────────────┐                        │
//! │  │ LineSink  │◀──│ StreamScheduler  │   (periodic data)      │
//! │  │ (write)   │   │ (due → producer) │                        │
//! │  └───────────┘   └──────────────────┘                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod dispatcher;
pub mod envelope;
pub mod framer;
pub mod stream;
pub mod transport;
