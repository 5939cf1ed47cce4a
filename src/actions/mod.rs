//! Action synthesizer (§4.7): turns a replayed stream of key/pointer
//! events into semantic user actions.

pub mod synth;
pub mod types;

pub use synth::{synthesize, ActionSynthesizer};
pub use types::{Action, ActionStep, ClickKind, MouseButton, ScrollDirection};
