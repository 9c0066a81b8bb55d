//! Repository traits for metadata operations.

pub mod assets;
pub mod bootstrap;
pub mod tokens;

pub use assets::AssetRepo;
pub use bootstrap::BootstrapRepo;
pub use tokens::TokenRepo;
