//! Terminal emulator registry and launch resolver for BoxForge.
//!
//! This crate answers one question: given a command that should run in an
//! interactive terminal window, which emulator do we start and with what
//! argument vector? It ships a catalog of known emulators, detects which
//! one is present on the host, lets users register their own, and persists
//! the selection across runs.

pub mod profile;
pub mod registry;

pub use profile::{build_launch_args, built_in_profiles, TerminalProfile};
pub use registry::{TerminalProbe, TerminalRegistry, WhichProbe};
