pub mod declaration;
pub mod manifest;
pub mod registry;
