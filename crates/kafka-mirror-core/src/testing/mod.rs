//! Test utilities for the mirror: scripted mock collaborators and a
//! harness that runs a real controller against them.
//!
//! Only available when compiling tests or when the `testing` feature is
//! enabled.

mod harness;
mod mock;

pub use harness::MirrorTestHarness;
pub use mock::{MirrorEvent, MockDiscovery, MockPipelineFactory, SessionHandles};
