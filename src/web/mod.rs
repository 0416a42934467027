//! HTTP front-end for observers and lifecycle commands.

pub mod assets;
pub mod server;

pub use assets::HtmlAssets;
pub use server::{WebContext, router, serve};
