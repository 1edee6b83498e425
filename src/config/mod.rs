// =============================================================================
// Config & Credentials (C1)
// =============================================================================
//
// Replaces the source's module-level `APIConfig` singleton (lazily
// constructed on first import, touching the filesystem as a side effect —
// see spec.md §9 Design Notes) with an explicit struct built once at startup
// via `Credentials::from_env()` and handed to every component that needs it.
// Nothing here runs at import/construction time beyond what the caller asks
// for.

pub mod credentials;
pub mod token_manager;
pub mod token_store;

pub use credentials::{Credentials, Server};
pub use token_manager::TokenManager;
pub use token_store::{Token, TokenStore};
