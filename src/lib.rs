//! whisper-relay - Telegram front end for hosted speech recognition
//!
//! Users send voice, audio or video messages (or reply to them with a
//! command) and the bot relays the media to a remote inference backend,
//! then posts the recognized text back into the chat.
//!
//! # Architecture
//!
//! ```text
//! Telegram ─▶ bot ─▶ JobIntake ─▶ CapabilityQueue ─▶ Dispatcher ─▶ backend
//!                      │ rate limit       (one worker      │
//!                      │ admission         per capability) └─▶ reply to chat
//!                      │ media fetch
//! ```
//!
//! - A per-user sliding window caps how often one user may submit
//! - A global ceiling caps how many jobs may be in flight at once
//! - Each capability (transcribe, diarize) has its own FIFO, served by a
//!   single worker, so the backend sees at most one call per capability
//!
//! # Modules
//!
//! - `adapters`: Messaging and inference integrations (Telegram, Gradio)
//! - `bot`: Update polling, routing, admin commands
//! - `core`: Limits, queues, dispatch
//! - `domain`: Messages, jobs, capabilities
//! - `ingest`: Media fetch and validation
//! - `config`: Layered YAML and environment configuration
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the bot
//! TELEGRAM_BOT_TOKEN=... API_URL_TRANSCRIBE=... whisper-relay serve
//!
//! # Check what got picked up
//! whisper-relay config
//!
//! # Try a backend from the shell
//! whisper-relay predict memo.ogg
//! ```

pub mod adapters;
pub mod bot;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;
pub mod notices;

// Re-export main types at crate root for convenience
pub use core::{CapabilityQueue, Dispatcher, JobIntake, SubmitOutcome};
pub use domain::{Capability, IncomingMessage, Job, MessageHandle};

// Telegram integration
pub use adapters::{TelegramClient, TelegramConfig};
