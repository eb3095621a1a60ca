//! Shared protocol definitions for the Callroom wire format.

pub mod codec;
pub mod event;
pub mod room;
