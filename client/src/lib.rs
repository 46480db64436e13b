//! # Multiplayer Client Core
//!
//! Client-side synchronization layer for the space-arena game: everything
//! between the WebSocket and the scene. Rendering, input handling and asset
//! loading belong to the engine layer and plug in through the seams this
//! crate defines.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! The authoritative client-side state machine for one connection:
//! - decoding and routing of inbound event frames
//! - room-leader election state and the credential gating privileged sends
//! - buffering of roster events that arrive before the scene exists
//! - the periodic ping and state-broadcast tick bodies
//!
//! ### Events Module (`events`)
//! A small named-channel publish/subscribe bus decoupling the session from
//! the menu and HUD. Constructed explicitly and passed by reference; there
//! is no global dispatcher.
//!
//! ### Reconcile Module (`reconcile`)
//! Incremental add/remove diff reconciliation for named transient entities,
//! plus delta capture for the authoritative side. Entities not named in a
//! diff keep simulating under local physics untouched.
//!
//! ### Game Module (`game`)
//! The `WorldConsumer` seam the session feeds, and `LocalWorld`, a headless
//! implementation that tracks the roster, asteroid and laser-shot
//! collections and assembles the outbound broadcast.
//!
//! ### Network Module (`network`)
//! The WebSocket driver: a single cooperative `select!` loop multiplexing
//! inbound frames, the outbound queue and both timers. All handlers run to
//! completion before the next event is processed, so the core needs no
//! locks.

pub mod events;
pub mod game;
pub mod network;
pub mod reconcile;
pub mod session;
