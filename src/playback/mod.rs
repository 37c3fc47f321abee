//! Synchronized playback and idle handoff.
//!
//! ```text
//!   Idle ──play()──▶ Suspending ──idle joined──▶ Armed ──gate opened──▶ Streaming
//!    ▲                                                                     │
//!    └──────────── Resuming ◀──────────── audio and frame units joined ────┘
//! ```
//!
//! Only one producer writes to the transport at a time: the idle loop, or the
//! frame unit of the current session.

pub mod engine;
pub mod gate;
pub mod idle;
pub mod session;

pub use engine::{PlaybackEngine, PlaybackHandle, PlaybackState};
pub use gate::{GateOutcome, StartGate};
pub use idle::{IdleAnimation, IdleLoop};
pub use session::{emit_frames, PlaybackSession, SessionReport};
