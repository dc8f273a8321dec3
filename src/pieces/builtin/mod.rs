/// Built-in pieces
///
/// Pieces compiled into the engine binary. External integrations register
/// through the same `PieceRegistry::builder()` API.

pub mod delay;
pub mod http;
pub mod webhook;

use crate::pieces::{PieceRegistry, PieceRegistryBuilder};

/// Registry builder preloaded with the built-in pieces
pub fn builder() -> PieceRegistryBuilder {
    PieceRegistry::builder()
        .register(http::piece())
        .register(delay::piece())
        .register(webhook::piece())
}

/// Registry with only the built-in pieces
pub fn registry() -> PieceRegistry {
    builder().build()
}
